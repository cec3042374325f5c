//! # Consistent STR alignments
//!
//! Summaries of how a graph alignment relates to one repeat node, and the
//! machinery to recompute that summary under the hypothesis that the allele
//! holds a given number of motif copies. Excess or missing copies are either
//! clipped away from one end or attributed to a single stutter indel,
//! whichever scores best.
use std::fmt;

use log::warn;

use crate::align::operations::{AlignmentScores, GraphAlignment};
use crate::graph::NodeId;

const STUTTER_GAP_OPEN_SCORE: i32 = -24;
const STUTTER_GAP_EXTEND_SCORE: i32 = -12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StrAlignKind {
    Spanning,
    Flanking,
    InRepeat,
    Outside,
}

impl fmt::Display for StrAlignKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrAlignKind::Spanning => "Spanning",
            StrAlignKind::Flanking => "Flanking",
            StrAlignKind::InRepeat => "InRepeat",
            StrAlignKind::Outside => "Outside",
        };
        write!(f, "{name}")
    }
}

/// How a read aligns under a fixed allele-size hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrAlign {
    kind: StrAlignKind,
    num_motifs: i32,
    score: i32,
    num_indels: i32,
}

impl StrAlign {
    pub fn new(kind: StrAlignKind, num_motifs: i32, score: i32, num_indels: i32) -> Self {
        StrAlign {
            kind,
            num_motifs,
            score,
            num_indels,
        }
    }

    pub fn kind(&self) -> StrAlignKind {
        self.kind
    }

    pub fn num_motifs(&self) -> i32 {
        self.num_motifs
    }

    pub fn score(&self) -> i32 {
        self.score
    }

    pub fn num_indels(&self) -> i32 {
        self.num_indels
    }
}

impl fmt::Display for StrAlign {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "StrAlign({}, {}, {}, {})",
            self.kind, self.num_motifs, self.score, self.num_indels
        )
    }
}

/// Recomputes alignments against "the allele holds k motifs" hypotheses for
/// one repeat node.
pub struct ConsistentAlignmentCalculator {
    str_node: NodeId,
    scores: AlignmentScores,
}

struct NodeScores {
    left_flank_score: i32,
    str_score: i32,
    right_flank_score: i32,
    str_indel_count: i32,
}

impl ConsistentAlignmentCalculator {
    pub fn new(str_node: NodeId) -> Self {
        ConsistentAlignmentCalculator {
            str_node,
            scores: AlignmentScores::default(),
        }
    }

    pub fn str_node(&self) -> NodeId {
        self.str_node
    }

    fn score_nodes<F>(&self, alignment: &GraphAlignment, mut keep_motif: F) -> NodeScores
    where
        F: FnMut(usize) -> bool,
    {
        let mut summary = NodeScores {
            left_flank_score: 0,
            str_score: 0,
            right_flank_score: 0,
            str_indel_count: 0,
        };
        let mut motif_index = 0;

        for node_index in 0..alignment.node_count() {
            let node = alignment.path().node_id(node_index);
            let node_alignment = alignment.node_alignment(node_index);
            let node_score = node_alignment.linear_gap_score(&self.scores);

            if node < self.str_node {
                summary.left_flank_score += node_score;
            } else if node > self.str_node {
                summary.right_flank_score += node_score;
            } else {
                if keep_motif(motif_index) {
                    summary.str_score += node_score;
                    summary.str_indel_count += node_alignment.num_indel_bases() as i32;
                }
                motif_index += 1;
            }
        }

        summary.left_flank_score = summary.left_flank_score.max(0);
        summary.right_flank_score = summary.right_flank_score.max(0);
        summary
    }

    /// Longest consistent alignment obtained by discarding motif copies from
    /// the left end of the repeat.
    pub fn clip_from_left(&self, num_motifs_in_allele: i32, alignment: &GraphAlignment) -> StrAlign {
        let num_motifs_in_alignment = alignment.path().visit_count(self.str_node) as i32;
        let summary = self.score_nodes(alignment, |motif_index| {
            num_motifs_in_alignment - motif_index as i32 <= num_motifs_in_allele
        });
        self.summarize(num_motifs_in_allele, num_motifs_in_alignment, summary, true, alignment)
    }

    /// Longest consistent alignment obtained by discarding motif copies from
    /// the right end of the repeat.
    pub fn clip_from_right(&self, num_motifs_in_allele: i32, alignment: &GraphAlignment) -> StrAlign {
        let num_motifs_in_alignment = alignment.path().visit_count(self.str_node) as i32;
        let summary = self.score_nodes(alignment, |motif_index| {
            (motif_index as i32) < num_motifs_in_allele
        });
        self.summarize(num_motifs_in_allele, num_motifs_in_alignment, summary, false, alignment)
    }

    fn summarize(
        &self,
        num_motifs_in_allele: i32,
        num_motifs_in_alignment: i32,
        summary: NodeScores,
        clipped_from_left: bool,
        alignment: &GraphAlignment,
    ) -> StrAlign {
        let NodeScores {
            left_flank_score,
            str_score,
            right_flank_score,
            str_indel_count,
        } = summary;

        // Alignment does not overlap the repeat.
        if num_motifs_in_alignment == 0 && (left_flank_score == 0 || right_flank_score == 0) {
            let score = left_flank_score + right_flank_score;
            return StrAlign::new(StrAlignKind::Outside, 0, score, 0);
        }

        let num_compatible_motifs = num_motifs_in_alignment.min(num_motifs_in_allele);

        if left_flank_score == 0 && right_flank_score == 0 {
            return StrAlign::new(StrAlignKind::InRepeat, num_compatible_motifs, str_score, str_indel_count);
        }

        if left_flank_score > 0 && right_flank_score > 0 {
            if num_motifs_in_alignment == num_motifs_in_allele {
                let score = left_flank_score + str_score + right_flank_score;
                return StrAlign::new(StrAlignKind::Spanning, num_compatible_motifs, score, str_indel_count);
            }
            let score = if clipped_from_left {
                str_score + right_flank_score
            } else {
                left_flank_score + str_score
            };
            return StrAlign::new(StrAlignKind::Flanking, num_compatible_motifs, score, str_indel_count);
        }

        if clipped_from_left {
            if left_flank_score == 0 && right_flank_score > 0 {
                let score = str_score + right_flank_score;
                return StrAlign::new(StrAlignKind::Flanking, num_compatible_motifs, score, str_indel_count);
            }
            if left_flank_score > 0 && right_flank_score == 0 {
                // Kept motifs stay consistent only when they fit the allele.
                if num_motifs_in_alignment <= num_motifs_in_allele {
                    let score = left_flank_score + str_score;
                    return StrAlign::new(
                        StrAlignKind::Flanking,
                        num_compatible_motifs,
                        score,
                        str_indel_count,
                    );
                }
                return StrAlign::new(StrAlignKind::InRepeat, num_compatible_motifs, str_score, str_indel_count);
            }
        } else {
            if left_flank_score > 0 && right_flank_score == 0 {
                let score = left_flank_score + str_score;
                return StrAlign::new(StrAlignKind::Flanking, num_compatible_motifs, score, str_indel_count);
            }
            if left_flank_score == 0 && right_flank_score > 0 {
                if num_motifs_in_alignment <= num_motifs_in_allele {
                    let score = str_score + right_flank_score;
                    return StrAlign::new(
                        StrAlignKind::Flanking,
                        num_compatible_motifs,
                        score,
                        str_indel_count,
                    );
                }
                return StrAlign::new(StrAlignKind::InRepeat, num_compatible_motifs, str_score, str_indel_count);
            }
        }

        warn!(
            "Cannot summarize {alignment} for STR on node {}",
            self.str_node
        );
        StrAlign::new(StrAlignKind::Outside, 0, 0, 0)
    }

    /// Consistent alignment obtained by charging the motif-count discrepancy
    /// to a single stutter indel.
    pub fn remove_stutter(&self, num_motifs_in_allele: i32, alignment: &GraphAlignment) -> StrAlign {
        let summary = self.score_nodes(alignment, |motif_index| {
            (motif_index as i32) < num_motifs_in_allele
        });
        let NodeScores {
            left_flank_score,
            str_score,
            right_flank_score,
            str_indel_count,
        } = summary;

        if left_flank_score == 0 || right_flank_score == 0 {
            return StrAlign::new(StrAlignKind::Outside, 0, 0, 0);
        }

        let num_motifs_in_alignment = alignment.path().visit_count(self.str_node) as i32;
        let num_discrepant_motifs = (num_motifs_in_alignment - num_motifs_in_allele).abs();
        let motif_length = alignment.graph().node_length(self.str_node) as i32;
        let discrepant_length = motif_length * num_discrepant_motifs;
        let penalty = if num_discrepant_motifs > 0 {
            STUTTER_GAP_OPEN_SCORE + STUTTER_GAP_EXTEND_SCORE * (discrepant_length - 1)
        } else {
            0
        };
        let score = (left_flank_score + str_score + penalty + right_flank_score).max(0);

        StrAlign::new(StrAlignKind::Spanning, num_motifs_in_allele, score, str_indel_count)
    }

    /// Highest-scoring of the three consistent-alignment constructions.
    pub fn find_consistent_alignment(
        &self,
        num_motifs_in_allele: i32,
        alignment: &GraphAlignment,
    ) -> StrAlign {
        let stutter_free = self.remove_stutter(num_motifs_in_allele, alignment);
        let left_clip = self.clip_from_left(num_motifs_in_allele, alignment);
        let right_clip = self.clip_from_right(num_motifs_in_allele, alignment);

        if stutter_free.score() > left_clip.score() && stutter_free.score() > right_clip.score() {
            return stutter_free;
        }
        if left_clip.score() > right_clip.score() {
            left_clip
        } else {
            right_clip
        }
    }
}

/// Consistent alignments of every added read against every plausible allele
/// size; row `k` of a read holds its alignment under the size-`k`
/// hypothesis, with the last row reused for larger sizes.
pub struct AlignMatrix {
    str_node: NodeId,
    calculator: ConsistentAlignmentCalculator,
    best_aligns: Vec<StrAlign>,
    rows: Vec<Vec<StrAlign>>,
}

impl AlignMatrix {
    pub fn new(str_node: NodeId) -> Self {
        AlignMatrix {
            str_node,
            calculator: ConsistentAlignmentCalculator::new(str_node),
            best_aligns: Vec::new(),
            rows: Vec::new(),
        }
    }

    pub fn num_reads(&self) -> usize {
        self.rows.len()
    }

    /// Adds both mates when at least one overlaps the repeat node.
    pub fn add_pair(&mut self, read: &GraphAlignment, mate: &GraphAlignment) {
        let read_motifs = read.path().visit_count(self.str_node);
        let mate_motifs = mate.path().visit_count(self.str_node);
        if read_motifs != 0 || mate_motifs != 0 {
            self.add(read);
            self.add(mate);
        }
    }

    fn add(&mut self, alignment: &GraphAlignment) {
        let num_motifs = alignment.path().visit_count(self.str_node) as i32;
        let best = self.calculator.find_consistent_alignment(num_motifs, alignment);
        self.best_aligns.push(best);

        let mut row: Vec<StrAlign> = (0..num_motifs)
            .map(|allele_size| self.calculator.find_consistent_alignment(allele_size, alignment))
            .collect();
        row.push(best);

        let mut previous = *row.last().unwrap();
        let mut allele_size = num_motifs + 1;
        loop {
            let align = self.calculator.find_consistent_alignment(allele_size, alignment);
            if align.kind() == previous.kind() && align.score() == previous.score() {
                break;
            }
            row.push(align);
            previous = align;
            allele_size += 1;
        }

        self.rows.push(row);
    }

    pub fn align(&self, read_index: usize, allele_size: i32) -> StrAlign {
        let row = &self.rows[read_index];
        let index = allele_size as usize;
        if index < row.len() {
            row[index]
        } else {
            *row.last().expect("Align matrix rows are never empty")
        }
    }

    pub fn best_align(&self, read_index: usize) -> StrAlign {
        self.best_aligns[read_index]
    }

    /// Drops read pairs whose mates are both outside the repeat; they
    /// cannot inform any allele size.
    pub fn remove_outside_pairs(&mut self) {
        let mut index = 0;
        while index + 1 < self.num_reads() {
            let both_outside = self.best_aligns[index].kind() == StrAlignKind::Outside
                && self.best_aligns[index + 1].kind() == StrAlignKind::Outside;
            if both_outside {
                self.best_aligns.drain(index..index + 2);
                self.rows.drain(index..index + 2);
            } else {
                index += 2;
            }
        }
    }
}

/// Feeds `num_irr_pairs` copies of the best long in-repeat read into the
/// matrix. Only applied when the matrix already holds a long in-repeat
/// read, which keeps off-target evidence from inventing expansions.
pub fn add_irr_pairs_if_possible_expansion(
    max_motifs_in_read: i32,
    matrix: &mut AlignMatrix,
    num_irr_pairs: i32,
) {
    let long_irr_lower_bound = (0.90 * max_motifs_in_read as f64) as i32;

    let mut top_irr_index: Option<usize> = None;
    let mut top_irr_score = -1;
    for read_index in 0..matrix.num_reads() {
        let align = matrix.best_aligns[read_index];
        let is_long_irr =
            align.kind() == StrAlignKind::InRepeat && align.num_motifs() >= long_irr_lower_bound;
        if is_long_irr && align.score() > top_irr_score {
            top_irr_score = align.score();
            top_irr_index = Some(read_index);
        }
    }

    let Some(top_irr_index) = top_irr_index else {
        return;
    };

    let top_align = matrix.best_aligns[top_irr_index];
    let top_row = matrix.rows[top_irr_index].clone();
    for _ in 0..2 * num_irr_pairs {
        matrix.best_aligns.push(top_align);
        matrix.rows.push(top_row.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::operations::decode_graph_alignment;
    use crate::blueprint::{decode_features, make_graph};
    use crate::graph::Graph;

    fn make_graph_from(structure: &str) -> Graph {
        make_graph(&decode_features(structure).unwrap())
    }

    #[test]
    fn clipping_from_left_finds_compatible_alignments() {
        let graph = make_graph_from("ATTCGA(C)*ATGTCG");
        let calculator = ConsistentAlignmentCalculator::new(1);

        let spanning = decode_graph_alignment(0, "0[5M2I1M]1[1M]1[1M]1[1M]2[1M1D2M]", &graph).unwrap();
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 2, 17, 0),
            calculator.clip_from_left(2, &spanning)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Spanning, 3, 36, 0),
            calculator.clip_from_left(3, &spanning)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 3, 22, 0),
            calculator.clip_from_left(4, &spanning)
        );

        let right_flanking = decode_graph_alignment(0, "1[1M]1[1M]1[1M]2[4M]", &graph).unwrap();
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 2, 30, 0),
            calculator.clip_from_left(2, &right_flanking)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 3, 35, 0),
            calculator.clip_from_left(3, &right_flanking)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 3, 35, 0),
            calculator.clip_from_left(4, &right_flanking)
        );

        let left_flanking = decode_graph_alignment(3, "0[3M]1[1M]1[1M]1[1M]", &graph).unwrap();
        assert_eq!(
            StrAlign::new(StrAlignKind::InRepeat, 0, 0, 0),
            calculator.clip_from_left(0, &left_flanking)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::InRepeat, 2, 10, 0),
            calculator.clip_from_left(2, &left_flanking)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 3, 30, 0),
            calculator.clip_from_left(3, &left_flanking)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 3, 30, 0),
            calculator.clip_from_left(4, &left_flanking)
        );

        let in_repeat = decode_graph_alignment(0, "1[1M]1[1M]1[1M]", &graph).unwrap();
        assert_eq!(
            StrAlign::new(StrAlignKind::InRepeat, 0, 0, 0),
            calculator.clip_from_left(0, &in_repeat)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::InRepeat, 2, 10, 0),
            calculator.clip_from_left(2, &in_repeat)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::InRepeat, 3, 15, 0),
            calculator.clip_from_left(3, &in_repeat)
        );

        let inside_left_flank = decode_graph_alignment(0, "0[6M]", &graph).unwrap();
        assert_eq!(
            StrAlign::new(StrAlignKind::Outside, 0, 30, 0),
            calculator.clip_from_left(2, &inside_left_flank)
        );

        let inside_right_flank = decode_graph_alignment(1, "2[5M]", &graph).unwrap();
        assert_eq!(
            StrAlign::new(StrAlignKind::Outside, 0, 25, 0),
            calculator.clip_from_left(2, &inside_right_flank)
        );
    }

    #[test]
    fn clipping_from_right_finds_compatible_alignments() {
        let graph = make_graph_from("ATTCGA(C)*ATGTCG");
        let calculator = ConsistentAlignmentCalculator::new(1);

        let spanning = decode_graph_alignment(3, "0[3M]1[1M]1[1M]1[1M]2[4M]", &graph).unwrap();
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 2, 25, 0),
            calculator.clip_from_right(2, &spanning)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Spanning, 3, 50, 0),
            calculator.clip_from_right(3, &spanning)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 3, 30, 0),
            calculator.clip_from_right(4, &spanning)
        );

        let left_flanking = decode_graph_alignment(3, "0[3M]1[1M]1[1M]1[1M]", &graph).unwrap();
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 2, 25, 0),
            calculator.clip_from_right(2, &left_flanking)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 3, 30, 0),
            calculator.clip_from_right(3, &left_flanking)
        );

        let right_flanking = decode_graph_alignment(0, "1[1M]1[1M]1[1M]2[4M]", &graph).unwrap();
        assert_eq!(
            StrAlign::new(StrAlignKind::InRepeat, 0, 0, 0),
            calculator.clip_from_right(0, &right_flanking)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::InRepeat, 2, 10, 0),
            calculator.clip_from_right(2, &right_flanking)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 3, 35, 0),
            calculator.clip_from_right(3, &right_flanking)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 3, 35, 0),
            calculator.clip_from_right(4, &right_flanking)
        );
    }

    #[test]
    fn stutter_removal_pins_the_motif_count_to_the_allele() {
        let graph = make_graph_from("ATTCGA(AT)*ATGTCG");
        let calculator = ConsistentAlignmentCalculator::new(1);

        let flanking = decode_graph_alignment(0, "1[2M]1[2M]1[2M]2[4M]", &graph).unwrap();
        assert_eq!(
            StrAlign::new(StrAlignKind::Outside, 0, 0, 0),
            calculator.remove_stutter(3, &flanking)
        );

        let spanning = decode_graph_alignment(3, "0[3M]1[2M]1[2M]1[2M]2[4M]", &graph).unwrap();
        assert_eq!(
            StrAlign::new(StrAlignKind::Spanning, 0, 0, 0),
            calculator.remove_stutter(0, &spanning)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Spanning, 1, 0, 0),
            calculator.remove_stutter(1, &spanning)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Spanning, 2, 19, 0),
            calculator.remove_stutter(2, &spanning)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Spanning, 3, 65, 0),
            calculator.remove_stutter(3, &spanning)
        );
        assert_eq!(
            StrAlign::new(StrAlignKind::Spanning, 4, 29, 0),
            calculator.remove_stutter(4, &spanning)
        );
    }

    #[test]
    fn best_consistent_alignment_wins_across_constructions() {
        let graph = make_graph_from("ATTCGA(AT)*ATGTCG");
        let calculator = ConsistentAlignmentCalculator::new(1);

        let alignment = decode_graph_alignment(3, "0[3M]1[2M]1[2M]1[2M]2[4M]", &graph).unwrap();
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 2, 40, 0),
            calculator.find_consistent_alignment(2, &alignment)
        );

        let alignment = decode_graph_alignment(3, "0[3M]1[2M]1[2M]1[2M]2[2M]", &graph).unwrap();
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 2, 35, 0),
            calculator.find_consistent_alignment(2, &alignment)
        );

        let alignment = decode_graph_alignment(0, "0[6M]1[2M]1[2M]1[2M]2[6M]", &graph).unwrap();
        assert_eq!(
            StrAlign::new(StrAlignKind::Flanking, 2, 50, 0),
            calculator.find_consistent_alignment(2, &alignment)
        );
    }

    #[test]
    fn align_matrix_rows_cover_all_plausible_sizes() {
        let graph = make_graph_from("ATTCGA(C)*ATGTCG");
        let mut matrix = AlignMatrix::new(1);

        let read = decode_graph_alignment(3, "0[3M]1[1M]1[1M]1[1M]2[4M]", &graph).unwrap();
        let mate = decode_graph_alignment(4, "0[2M]1[1M]1[1M]1[1M]2[5M]", &graph).unwrap();
        matrix.add_pair(&read, &mate);

        assert_eq!(2, matrix.num_reads());
        assert_eq!(StrAlignKind::Spanning, matrix.best_align(0).kind());
        assert_eq!(3, matrix.best_align(0).num_motifs());

        // Hypotheses beyond the stable point reuse the last row entry.
        assert_eq!(matrix.align(0, 4), matrix.align(0, 50));
        // Clipped hypotheses are flanking.
        assert_eq!(StrAlignKind::Flanking, matrix.align(0, 2).kind());
    }

    #[test]
    fn pairs_without_repeat_overlap_are_not_added() {
        let graph = make_graph_from("ATTCGA(C)*ATGTCG");
        let mut matrix = AlignMatrix::new(1);

        let read = decode_graph_alignment(0, "0[6M]", &graph).unwrap();
        let mate = decode_graph_alignment(0, "2[6M]", &graph).unwrap();
        matrix.add_pair(&read, &mate);

        assert_eq!(0, matrix.num_reads());
    }

    #[test]
    fn irr_pair_injection_requires_a_long_in_repeat_read() {
        let graph = make_graph_from("ATTCGA(C)*ATGTCG");

        let mut matrix = AlignMatrix::new(1);
        let in_repeat = decode_graph_alignment(0, "1[1M]".repeat(10).as_str(), &graph).unwrap();
        let flanking = decode_graph_alignment(3, "0[3M]1[1M]1[1M]1[1M]", &graph).unwrap();
        matrix.add_pair(&in_repeat, &flanking);

        add_irr_pairs_if_possible_expansion(10, &mut matrix, 2);
        assert_eq!(6, matrix.num_reads());

        let mut no_irr_matrix = AlignMatrix::new(1);
        let spanning = decode_graph_alignment(3, "0[3M]1[1M]1[1M]1[1M]2[4M]", &graph).unwrap();
        no_irr_matrix.add_pair(&spanning, &flanking);
        add_irr_pairs_if_possible_expansion(10, &mut no_irr_matrix, 2);
        assert_eq!(2, no_irr_matrix.num_reads());
    }
}
