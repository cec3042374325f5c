//! # Linear alignment kernels
//!
//! Affine-gap dynamic programming of a query against a linear reference
//! window. Two boundary regimes are used by the graph aligner: a pinned
//! alignment anchored at one end of both sequences (seed extension), and a
//! free alignment where both query ends may be softclipped (whole-window
//! realignment).
use crate::align::operations::{AlignmentScores, Operation, OperationKind};
use crate::utils::reference_base_matches;

const NEG_INF: i32 = i32::MIN / 4;

/// Outcome of a linear DP run. Softclips are not included in `operations`;
/// unconsumed query bases at the free end(s) are reported through
/// `query_start` and `query_consumed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinearAlignment {
    pub score: i32,
    pub operations: Vec<Operation>,
    /// Query bases clipped before the alignment begins.
    pub query_start: usize,
    pub query_consumed: usize,
    /// Reference bases of the window skipped before the alignment begins.
    pub reference_start: usize,
    pub reference_consumed: usize,
}

impl Default for LinearAlignment {
    fn default() -> Self {
        LinearAlignment {
            score: 0,
            operations: Vec::new(),
            query_start: 0,
            query_consumed: 0,
            reference_start: 0,
            reference_consumed: 0,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Start,
    Diagonal,
    Insertion,
    Deletion,
}

struct DpTables {
    rows: usize,
    cols: usize,
    diagonal: Vec<i32>,
    insertion: Vec<i32>,
    deletion: Vec<i32>,
    diagonal_from: Vec<State>,
    insertion_from: Vec<State>,
    deletion_from: Vec<State>,
}

impl DpTables {
    fn new(rows: usize, cols: usize) -> Self {
        let size = rows * cols;
        DpTables {
            rows,
            cols,
            diagonal: vec![NEG_INF; size],
            insertion: vec![NEG_INF; size],
            deletion: vec![NEG_INF; size],
            diagonal_from: vec![State::Start; size],
            insertion_from: vec![State::Start; size],
            deletion_from: vec![State::Start; size],
        }
    }

    fn at(&self, row: usize, col: usize) -> usize {
        debug_assert!(row < self.rows && col < self.cols);
        row * self.cols + col
    }
}

fn substitution_score(scores: &AlignmentScores, reference_base: u8, query_base: u8) -> (i32, bool) {
    let matches = reference_base_matches(reference_base as char, query_base as char);
    if matches {
        (scores.match_score, true)
    } else {
        (scores.mismatch_score, false)
    }
}

/// Alignment anchored at the start of both sequences; query tail may be
/// softclipped and the reference tail left uncovered, both for free.
pub fn align_pinned(reference: &str, query: &str, scores: &AlignmentScores) -> LinearAlignment {
    if query.is_empty() || reference.is_empty() {
        return LinearAlignment::default();
    }

    let reference = reference.as_bytes();
    let query = query.as_bytes();
    let rows = query.len() + 1;
    let cols = reference.len() + 1;
    let mut tables = DpTables::new(rows, cols);

    // Leading gaps right at the anchor.
    for row in 1..rows {
        let cell = tables.at(row, 0);
        if row == 1 {
            tables.insertion[cell] = scores.gap_open_score;
            tables.insertion_from[cell] = State::Start;
        } else {
            let above = tables.at(row - 1, 0);
            tables.insertion[cell] = saturating(tables.insertion[above], scores.gap_extend_score);
            tables.insertion_from[cell] = State::Insertion;
        }
    }
    for col in 1..cols {
        let cell = tables.at(0, col);
        if col == 1 {
            tables.deletion[cell] = scores.gap_open_score;
            tables.deletion_from[cell] = State::Start;
        } else {
            let left = tables.at(0, col - 1);
            tables.deletion[cell] = saturating(tables.deletion[left], scores.gap_extend_score);
            tables.deletion_from[cell] = State::Deletion;
        }
    }

    for row in 1..rows {
        for col in 1..cols {
            let cell = tables.at(row, col);
            let previous = tables.at(row - 1, col - 1);

            let (substitution, _) = substitution_score(scores, reference[col - 1], query[row - 1]);
            let start_score = if row == 1 && col == 1 { 0 } else { NEG_INF };
            let (best_previous, from) = best_of(
                tables.diagonal[previous],
                tables.insertion[previous],
                tables.deletion[previous],
                start_score,
            );
            tables.diagonal[cell] = saturating(best_previous, substitution);
            tables.diagonal_from[cell] = from;

            let above = tables.at(row - 1, col);
            let (open_source_score, open_source) =
                best_of(tables.diagonal[above], NEG_INF, tables.deletion[above], NEG_INF);
            let open = saturating(open_source_score, scores.gap_open_score);
            let extend = saturating(tables.insertion[above], scores.gap_extend_score);
            if open >= extend {
                tables.insertion[cell] = open;
                tables.insertion_from[cell] = open_source;
            } else {
                tables.insertion[cell] = extend;
                tables.insertion_from[cell] = State::Insertion;
            }

            let left = tables.at(row, col - 1);
            let (open_source_score, open_source) =
                best_of(tables.diagonal[left], tables.insertion[left], NEG_INF, NEG_INF);
            let open = saturating(open_source_score, scores.gap_open_score);
            let extend = saturating(tables.deletion[left], scores.gap_extend_score);
            if open >= extend {
                tables.deletion[cell] = open;
                tables.deletion_from[cell] = open_source;
            } else {
                tables.deletion[cell] = extend;
                tables.deletion_from[cell] = State::Deletion;
            }
        }
    }

    // The start corner (aligning nothing) is a valid outcome.
    let mut best_score = 0;
    let mut best_row = 0;
    let mut best_col = 0;
    let mut best_state = State::Start;
    for row in 1..rows {
        for col in 1..cols {
            let cell = tables.at(row, col);
            let (score, state) = best_of(
                tables.diagonal[cell],
                tables.insertion[cell],
                tables.deletion[cell],
                NEG_INF,
            );
            let better = score > best_score
                || (score == best_score && row > best_row)
                || (score == best_score && row == best_row && col < best_col);
            if better {
                best_score = score;
                best_row = row;
                best_col = col;
                best_state = state;
            }
        }
    }

    if best_state == State::Start {
        return LinearAlignment::default();
    }

    let operations = traceback(&tables, scores, reference, query, best_row, best_col, best_state);
    LinearAlignment {
        score: best_score,
        operations,
        query_start: 0,
        query_consumed: best_row,
        reference_start: 0,
        reference_consumed: best_col,
    }
}

/// Alignment anchored at the end of both sequences; computed by aligning the
/// reversed sequences with [`align_pinned`].
pub fn align_pinned_right(reference: &str, query: &str, scores: &AlignmentScores) -> LinearAlignment {
    let reversed_reference: String = reference.chars().rev().collect();
    let reversed_query: String = query.chars().rev().collect();
    let mut reversed = align_pinned(&reversed_reference, &reversed_query, scores);
    reversed.operations.reverse();
    LinearAlignment {
        score: reversed.score,
        operations: reversed.operations,
        query_start: query.len() - reversed.query_consumed,
        query_consumed: reversed.query_consumed,
        reference_start: reference.len() - reversed.reference_consumed,
        reference_consumed: reversed.reference_consumed,
    }
}

/// Alignment with both query ends softclippable for free and the reference
/// window open at both ends. Returns `None` when nothing scores above zero.
pub fn align_free(reference: &str, query: &str, scores: &AlignmentScores) -> Option<LinearAlignment> {
    if query.is_empty() || reference.is_empty() {
        return None;
    }

    let reference_bytes = reference.as_bytes();
    let query_bytes = query.as_bytes();
    let rows = query_bytes.len() + 1;
    let cols = reference_bytes.len() + 1;
    let mut tables = DpTables::new(rows, cols);

    for row in 1..rows {
        for col in 1..cols {
            let cell = tables.at(row, col);
            let previous = tables.at(row - 1, col - 1);

            let (substitution, _) =
                substitution_score(scores, reference_bytes[col - 1], query_bytes[row - 1]);
            // A fresh start clips the query prefix and skips the reference
            // prefix for free.
            let (best_previous, from) = best_of(
                tables.diagonal[previous],
                tables.insertion[previous],
                tables.deletion[previous],
                0,
            );
            tables.diagonal[cell] = saturating(best_previous, substitution);
            tables.diagonal_from[cell] = from;

            let above = tables.at(row - 1, col);
            let (open_source_score, open_source) =
                best_of(tables.diagonal[above], NEG_INF, tables.deletion[above], NEG_INF);
            let open = saturating(open_source_score, scores.gap_open_score);
            let extend = saturating(tables.insertion[above], scores.gap_extend_score);
            if open >= extend {
                tables.insertion[cell] = open;
                tables.insertion_from[cell] = open_source;
            } else {
                tables.insertion[cell] = extend;
                tables.insertion_from[cell] = State::Insertion;
            }

            let left = tables.at(row, col - 1);
            let (open_source_score, open_source) =
                best_of(tables.diagonal[left], tables.insertion[left], NEG_INF, NEG_INF);
            let open = saturating(open_source_score, scores.gap_open_score);
            let extend = saturating(tables.deletion[left], scores.gap_extend_score);
            if open >= extend {
                tables.deletion[cell] = open;
                tables.deletion_from[cell] = open_source;
            } else {
                tables.deletion[cell] = extend;
                tables.deletion_from[cell] = State::Deletion;
            }
        }
    }

    let mut best_score = 0;
    let mut best_row = 0;
    let mut best_col = 0;
    for row in 1..rows {
        for col in 1..cols {
            let cell = tables.at(row, col);
            let score = tables.diagonal[cell];
            let better = score > best_score
                || (score == best_score && row > best_row)
                || (score == best_score && row == best_row && col < best_col);
            if better {
                best_score = score;
                best_row = row;
                best_col = col;
            }
        }
    }

    if best_score <= 0 {
        return None;
    }

    let operations = traceback(
        &tables,
        scores,
        reference_bytes,
        query_bytes,
        best_row,
        best_col,
        State::Diagonal,
    );
    let query_consumed: usize = operations.iter().map(Operation::query_length).sum();
    let reference_consumed: usize = operations.iter().map(Operation::reference_length).sum();
    Some(LinearAlignment {
        score: best_score,
        operations,
        query_start: best_row - query_consumed,
        query_consumed,
        reference_start: best_col - reference_consumed,
        reference_consumed,
    })
}

fn best_of(diagonal: i32, insertion: i32, deletion: i32, start: i32) -> (i32, State) {
    // Fixed preference order keeps tracebacks deterministic.
    let mut best = (start, State::Start);
    if deletion > best.0 {
        best = (deletion, State::Deletion);
    }
    if insertion > best.0 {
        best = (insertion, State::Insertion);
    }
    if diagonal >= best.0 {
        best = (diagonal, State::Diagonal);
    }
    best
}

fn saturating(score: i32, delta: i32) -> i32 {
    if score <= NEG_INF {
        NEG_INF
    } else {
        score + delta
    }
}

fn traceback(
    tables: &DpTables,
    scores: &AlignmentScores,
    reference: &[u8],
    query: &[u8],
    end_row: usize,
    end_col: usize,
    end_state: State,
) -> Vec<Operation> {
    let mut operations: Vec<Operation> = Vec::new();
    let mut row = end_row;
    let mut col = end_col;
    let mut state = end_state;

    let mut push = |kind: OperationKind, operations: &mut Vec<Operation>| match operations.last_mut() {
        Some(last) if last.kind == kind => last.length += 1,
        _ => operations.push(Operation::new(kind, 1)),
    };

    while state != State::Start {
        let cell = tables.at(row, col);
        match state {
            State::Diagonal => {
                let (_, is_match) = substitution_score(scores, reference[col - 1], query[row - 1]);
                let kind = if is_match {
                    OperationKind::Match
                } else {
                    OperationKind::Mismatch
                };
                push(kind, &mut operations);
                state = tables.diagonal_from[cell];
                row -= 1;
                col -= 1;
            }
            State::Insertion => {
                push(OperationKind::Insertion, &mut operations);
                state = tables.insertion_from[cell];
                row -= 1;
            }
            State::Deletion => {
                push(OperationKind::Deletion, &mut operations);
                state = tables.deletion_from[cell];
                col -= 1;
            }
            State::Start => unreachable!(),
        }
    }

    operations.reverse();
    operations
}

/// Score of a gapless comparison of `query` against the same-length prefix
/// of `reference` starting at `reference_start`.
pub fn gapless_score(
    reference: &str,
    reference_start: usize,
    query: &str,
    scores: &AlignmentScores,
) -> i32 {
    let reference = reference.as_bytes();
    let query = query.as_bytes();
    assert!(reference.len() >= reference_start + query.len());
    query
        .iter()
        .enumerate()
        .map(|(index, &query_base)| {
            let (score, _) = substitution_score(scores, reference[reference_start + index], query_base);
            score
        })
        .sum()
}
