//! # Alignment operations
//!
//! Run-length alignment operations, per-node linear alignments, and graph
//! alignments (a path plus one linear alignment per visited node).
use std::fmt;

use anyhow::{bail, Context, Result};

use crate::graph::{Graph, NodeId, Path};

/// Integer scores for sequence alignment. Gaps are affine: a gap of length L
/// costs `gap_open + (L - 1) * gap_extend`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AlignmentScores {
    pub match_score: i32,
    pub mismatch_score: i32,
    pub gap_open_score: i32,
    pub gap_extend_score: i32,
}

impl Default for AlignmentScores {
    fn default() -> Self {
        AlignmentScores {
            match_score: 5,
            mismatch_score: -4,
            gap_open_score: -8,
            gap_extend_score: -2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    Match,
    Mismatch,
    /// Run of query bases absent from the reference.
    Insertion,
    /// Run of reference bases absent from the query.
    Deletion,
    Softclip,
}

impl OperationKind {
    pub fn encode(self) -> char {
        match self {
            OperationKind::Match => 'M',
            OperationKind::Mismatch => 'X',
            OperationKind::Insertion => 'I',
            OperationKind::Deletion => 'D',
            OperationKind::Softclip => 'S',
        }
    }

    pub fn decode(symbol: char) -> Result<Self> {
        Ok(match symbol {
            'M' => OperationKind::Match,
            'X' => OperationKind::Mismatch,
            'I' => OperationKind::Insertion,
            'D' => OperationKind::Deletion,
            'S' => OperationKind::Softclip,
            _ => bail!("Unknown operation symbol '{symbol}'"),
        })
    }

    pub fn consumes_query(self) -> bool {
        matches!(
            self,
            OperationKind::Match
                | OperationKind::Mismatch
                | OperationKind::Insertion
                | OperationKind::Softclip
        )
    }

    pub fn consumes_reference(self) -> bool {
        matches!(
            self,
            OperationKind::Match | OperationKind::Mismatch | OperationKind::Deletion
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub kind: OperationKind,
    pub length: usize,
}

impl Operation {
    pub fn new(kind: OperationKind, length: usize) -> Self {
        Operation { kind, length }
    }

    pub fn query_length(&self) -> usize {
        if self.kind.consumes_query() {
            self.length
        } else {
            0
        }
    }

    pub fn reference_length(&self) -> usize {
        if self.kind.consumes_reference() {
            self.length
        } else {
            0
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.length, self.kind.encode())
    }
}

/// Alignment of a query segment to a single node: a start offset on the node
/// plus a run of operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAlignment {
    reference_start: usize,
    operations: Vec<Operation>,
}

impl NodeAlignment {
    pub fn new(reference_start: usize, operations: Vec<Operation>) -> Self {
        NodeAlignment {
            reference_start,
            operations,
        }
    }

    pub fn reference_start(&self) -> usize {
        self.reference_start
    }

    pub fn reference_end(&self) -> usize {
        self.reference_start + self.reference_length()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn query_length(&self) -> usize {
        self.operations.iter().map(Operation::query_length).sum()
    }

    pub fn reference_length(&self) -> usize {
        self.operations.iter().map(Operation::reference_length).sum()
    }

    pub fn num_matches(&self) -> usize {
        self.count_kind(OperationKind::Match)
    }

    pub fn num_mismatches(&self) -> usize {
        self.count_kind(OperationKind::Mismatch)
    }

    fn count_kind(&self, kind: OperationKind) -> usize {
        self.operations
            .iter()
            .filter(|op| op.kind == kind)
            .map(|op| op.length)
            .sum()
    }

    pub fn num_indel_bases(&self) -> usize {
        self.count_kind(OperationKind::Insertion) + self.count_kind(OperationKind::Deletion)
    }

    /// Score of this node's alignment with every gapped base charged the
    /// full gap-open penalty. Used for sub-alignment quality checks, where
    /// gaps must not look cheap.
    pub fn linear_gap_score(&self, scores: &AlignmentScores) -> i32 {
        self.operations
            .iter()
            .map(|op| match op.kind {
                OperationKind::Match => scores.match_score * op.length as i32,
                OperationKind::Mismatch => scores.mismatch_score * op.length as i32,
                OperationKind::Insertion | OperationKind::Deletion => {
                    scores.gap_open_score * op.length as i32
                }
                OperationKind::Softclip => 0,
            })
            .sum()
    }
}

impl fmt::Display for NodeAlignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for operation in &self.operations {
            write!(f, "{operation}")?;
        }
        Ok(())
    }
}

/// A path with one linear alignment per visited node.
#[derive(Clone, PartialEq, Eq)]
pub struct GraphAlignment<'g> {
    path: Path<'g>,
    node_alignments: Vec<NodeAlignment>,
}

impl<'g> GraphAlignment<'g> {
    pub fn new(path: Path<'g>, node_alignments: Vec<NodeAlignment>) -> Result<Self> {
        if path.node_count() != node_alignments.len() {
            bail!(
                "Path visits {} nodes but {} node alignments were given",
                path.node_count(),
                node_alignments.len()
            );
        }
        let alignment = GraphAlignment {
            path,
            node_alignments,
        };
        alignment.assert_valid()?;
        Ok(alignment)
    }

    fn assert_valid(&self) -> Result<()> {
        for (index, node_alignment) in self.node_alignments.iter().enumerate() {
            let expected_start = if index == 0 { self.path.start_position() } else { 0 };
            if node_alignment.reference_start() != expected_start {
                bail!(
                    "Alignment to node index {index} starts at {} instead of {expected_start}",
                    node_alignment.reference_start()
                );
            }
            if node_alignment.reference_length() != self.path.node_overlap_length(index) {
                bail!(
                    "Alignment to node index {index} covers {} reference bases but the path covers {}",
                    node_alignment.reference_length(),
                    self.path.node_overlap_length(index)
                );
            }
            for (op_index, operation) in node_alignment.operations().iter().enumerate() {
                if operation.kind == OperationKind::Softclip {
                    let at_front = index == 0 && op_index == 0;
                    let at_back = index == self.node_alignments.len() - 1
                        && op_index == node_alignment.operations().len() - 1;
                    if !at_front && !at_back {
                        bail!("Softclip operations may only appear at the outer alignment ends");
                    }
                }
            }
        }
        Ok(())
    }

    pub fn path(&self) -> &Path<'g> {
        &self.path
    }

    pub fn graph(&self) -> &'g Graph {
        self.path.graph()
    }

    pub fn node_count(&self) -> usize {
        self.node_alignments.len()
    }

    pub fn node_alignments(&self) -> &[NodeAlignment] {
        &self.node_alignments
    }

    pub fn node_alignment(&self, index: usize) -> &NodeAlignment {
        &self.node_alignments[index]
    }

    pub fn query_length(&self) -> usize {
        self.node_alignments.iter().map(NodeAlignment::query_length).sum()
    }

    pub fn reference_length(&self) -> usize {
        self.node_alignments
            .iter()
            .map(NodeAlignment::reference_length)
            .sum()
    }

    pub fn num_matches(&self) -> usize {
        self.node_alignments.iter().map(NodeAlignment::num_matches).sum()
    }

    pub fn num_mismatches(&self) -> usize {
        self.node_alignments
            .iter()
            .map(NodeAlignment::num_mismatches)
            .sum()
    }

    pub fn front_softclip_length(&self) -> usize {
        match self.node_alignments[0].operations().first() {
            Some(op) if op.kind == OperationKind::Softclip => op.length,
            _ => 0,
        }
    }

    pub fn back_softclip_length(&self) -> usize {
        match self.node_alignments.last().unwrap().operations().last() {
            Some(op) if op.kind == OperationKind::Softclip => op.length,
            _ => 0,
        }
    }

    pub fn overlaps_node(&self, node: NodeId) -> bool {
        self.path.node_ids().contains(&node)
    }

    pub fn indexes_of_node(&self, node: NodeId) -> Vec<usize> {
        self.path
            .node_ids()
            .iter()
            .enumerate()
            .filter_map(|(index, &id)| if id == node { Some(index) } else { None })
            .collect()
    }

    /// Operation runs flattened across node boundaries, with adjacent runs
    /// of the same kind merged. A gap spanning a node boundary is one event.
    pub fn flattened_operations(&self) -> Vec<Operation> {
        let mut flattened: Vec<Operation> = Vec::new();
        for node_alignment in &self.node_alignments {
            for &operation in node_alignment.operations() {
                match flattened.last_mut() {
                    Some(last) if last.kind == operation.kind => last.length += operation.length,
                    _ => flattened.push(operation),
                }
            }
        }
        flattened
    }

    /// Alignment score with affine gaps. Softclips are free.
    pub fn score(&self, scores: &AlignmentScores) -> i32 {
        let mut total = 0;
        for operation in self.flattened_operations() {
            let length = operation.length as i32;
            total += match operation.kind {
                OperationKind::Match => scores.match_score * length,
                OperationKind::Mismatch => scores.mismatch_score * length,
                OperationKind::Insertion | OperationKind::Deletion => {
                    scores.gap_open_score + scores.gap_extend_score * (length - 1)
                }
                OperationKind::Softclip => 0,
            };
        }
        total
    }

    /// Number of gapped bases (inserted plus deleted).
    pub fn num_indel_bases(&self) -> usize {
        self.node_alignments
            .iter()
            .flat_map(|node_alignment| node_alignment.operations())
            .filter(|op| matches!(op.kind, OperationKind::Insertion | OperationKind::Deletion))
            .map(|op| op.length)
            .sum()
    }

    /// Softclip the leading alignment portion covering `reference_length`
    /// reference bases; freed query bases join the front softclip.
    pub fn shrink_start(&mut self, reference_length: usize) {
        if reference_length == 0 {
            return;
        }
        assert!(
            reference_length < self.reference_length(),
            "Cannot softclip the entire alignment"
        );

        let mut clipped_query = 0;
        let mut remaining = reference_length;

        while remaining > 0 {
            let node_reference_length = self.node_alignments[0].reference_length();
            if node_reference_length <= remaining && self.node_alignments.len() > 1 {
                clipped_query += self.node_alignments[0].query_length();
                self.node_alignments.remove(0);
                self.path.remove_start_node();
                remaining -= node_reference_length;
            } else {
                let (query_removed, trimmed_ops) =
                    trim_operations_front(self.node_alignments[0].operations(), remaining);
                clipped_query += query_removed;
                self.path.shrink_start_by(remaining);
                self.node_alignments[0] = NodeAlignment::new(self.path.start_position(), trimmed_ops);
                remaining = 0;
            }
        }

        clipped_query += self.take_front_softclip();
        if clipped_query > 0 {
            let mut operations = vec![Operation::new(OperationKind::Softclip, clipped_query)];
            operations.extend_from_slice(self.node_alignments[0].operations());
            self.node_alignments[0] =
                NodeAlignment::new(self.node_alignments[0].reference_start(), operations);
        }
    }

    /// Symmetric counterpart of [`GraphAlignment::shrink_start`].
    pub fn shrink_end(&mut self, reference_length: usize) {
        if reference_length == 0 {
            return;
        }
        assert!(
            reference_length < self.reference_length(),
            "Cannot softclip the entire alignment"
        );

        let mut clipped_query = 0;
        let mut remaining = reference_length;

        while remaining > 0 {
            let last = self.node_alignments.len() - 1;
            let node_reference_length = self.node_alignments[last].reference_length();
            if node_reference_length <= remaining && self.node_alignments.len() > 1 {
                clipped_query += self.node_alignments[last].query_length();
                self.node_alignments.pop();
                self.path.remove_end_node();
                remaining -= node_reference_length;
            } else {
                let (query_removed, trimmed_ops) =
                    trim_operations_back(self.node_alignments[last].operations(), remaining);
                clipped_query += query_removed;
                self.path.shrink_end_by(remaining);
                let reference_start = self.node_alignments[last].reference_start();
                self.node_alignments[last] = NodeAlignment::new(reference_start, trimmed_ops);
                remaining = 0;
            }
        }

        clipped_query += self.take_back_softclip();
        if clipped_query > 0 {
            let last = self.node_alignments.len() - 1;
            let mut operations = self.node_alignments[last].operations().to_vec();
            operations.push(Operation::new(OperationKind::Softclip, clipped_query));
            let reference_start = self.node_alignments[last].reference_start();
            self.node_alignments[last] = NodeAlignment::new(reference_start, operations);
        }
    }

    fn take_front_softclip(&mut self) -> usize {
        let first = &self.node_alignments[0];
        if let Some(op) = first.operations().first() {
            if op.kind == OperationKind::Softclip {
                let length = op.length;
                let operations = first.operations()[1..].to_vec();
                self.node_alignments[0] = NodeAlignment::new(first.reference_start(), operations);
                return length;
            }
        }
        0
    }

    fn take_back_softclip(&mut self) -> usize {
        let last_index = self.node_alignments.len() - 1;
        let last = &self.node_alignments[last_index];
        if let Some(op) = last.operations().last() {
            if op.kind == OperationKind::Softclip {
                let length = op.length;
                let operations = last.operations()[..last.operations().len() - 1].to_vec();
                self.node_alignments[last_index] =
                    NodeAlignment::new(last.reference_start(), operations);
                return length;
            }
        }
        0
    }

    /// Extend the alignment with softclips covering query bases that were
    /// never aligned.
    pub fn extend_with_softclip(mut self, front: usize, back: usize) -> Self {
        if front > 0 {
            let existing = self.take_front_softclip();
            let mut operations = vec![Operation::new(OperationKind::Softclip, front + existing)];
            operations.extend_from_slice(self.node_alignments[0].operations());
            self.node_alignments[0] =
                NodeAlignment::new(self.node_alignments[0].reference_start(), operations);
        }
        if back > 0 {
            let existing = self.take_back_softclip();
            let last = self.node_alignments.len() - 1;
            let mut operations = self.node_alignments[last].operations().to_vec();
            operations.push(Operation::new(OperationKind::Softclip, back + existing));
            let reference_start = self.node_alignments[last].reference_start();
            self.node_alignments[last] = NodeAlignment::new(reference_start, operations);
        }
        self
    }
}

fn trim_operations_front(operations: &[Operation], reference_length: usize) -> (usize, Vec<Operation>) {
    let mut query_removed = 0;
    let mut remaining = reference_length;
    let mut trimmed = Vec::with_capacity(operations.len());
    for (index, operation) in operations.iter().enumerate() {
        if remaining == 0 {
            trimmed.extend_from_slice(&operations[index..]);
            break;
        }
        if operation.reference_length() == 0 {
            query_removed += operation.query_length();
            continue;
        }
        if operation.reference_length() <= remaining {
            remaining -= operation.reference_length();
            query_removed += operation.query_length();
        } else {
            let kept = operation.length - remaining;
            if operation.kind.consumes_query() {
                query_removed += remaining;
            }
            trimmed.push(Operation::new(operation.kind, kept));
            remaining = 0;
        }
    }
    (query_removed, trimmed)
}

fn trim_operations_back(operations: &[Operation], reference_length: usize) -> (usize, Vec<Operation>) {
    let mut query_removed = 0;
    let mut remaining = reference_length;
    let mut trimmed_reversed = Vec::with_capacity(operations.len());
    for (index, operation) in operations.iter().enumerate().rev() {
        if remaining == 0 {
            trimmed_reversed.extend(operations[..=index].iter().rev().copied());
            break;
        }
        if operation.reference_length() == 0 {
            query_removed += operation.query_length();
            continue;
        }
        if operation.reference_length() <= remaining {
            remaining -= operation.reference_length();
            query_removed += operation.query_length();
        } else {
            let kept = operation.length - remaining;
            if operation.kind.consumes_query() {
                query_removed += remaining;
            }
            trimmed_reversed.push(Operation::new(operation.kind, kept));
            remaining = 0;
        }
    }
    trimmed_reversed.reverse();
    (query_removed, trimmed_reversed)
}

impl fmt::Display for GraphAlignment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, node_alignment) in self.node_alignments.iter().enumerate() {
            write!(f, "{}[{}]", self.path.node_id(index), node_alignment)?;
        }
        Ok(())
    }
}

impl fmt::Debug for GraphAlignment<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self}")
    }
}

/// Decodes an alignment like `0[4M]1[2M2X]` starting at `start_position` on
/// its first node. Test and debugging helper.
pub fn decode_graph_alignment<'g>(
    start_position: usize,
    encoding: &str,
    graph: &'g Graph,
) -> Result<GraphAlignment<'g>> {
    let mut nodes: Vec<NodeId> = Vec::new();
    let mut node_operations: Vec<Vec<Operation>> = Vec::new();

    let mut rest = encoding.trim();
    while !rest.is_empty() {
        let bracket = rest
            .find('[')
            .with_context(|| format!("Malformed alignment encoding {encoding}"))?;
        let node: NodeId = rest[..bracket]
            .parse()
            .with_context(|| format!("Malformed node id in {encoding}"))?;
        let close = rest
            .find(']')
            .with_context(|| format!("Malformed alignment encoding {encoding}"))?;
        let op_text = &rest[bracket + 1..close];

        let mut operations = Vec::new();
        let mut length_text = String::new();
        for symbol in op_text.chars() {
            if symbol.is_ascii_digit() {
                length_text.push(symbol);
            } else {
                let length: usize = length_text
                    .parse()
                    .with_context(|| format!("Malformed operation length in {encoding}"))?;
                operations.push(Operation::new(OperationKind::decode(symbol)?, length));
                length_text.clear();
            }
        }
        if !length_text.is_empty() {
            bail!("Trailing operation length in {encoding}");
        }

        nodes.push(node);
        node_operations.push(operations);
        rest = rest[close + 1..].trim_start();
    }

    if nodes.is_empty() {
        bail!("Alignment encoding {encoding} holds no nodes");
    }

    let reference_lengths: Vec<usize> = node_operations
        .iter()
        .map(|ops| ops.iter().map(Operation::reference_length).sum())
        .collect();
    let end_position = if nodes.len() == 1 {
        start_position + reference_lengths[0]
    } else {
        *reference_lengths.last().unwrap()
    };
    let path = Path::new(graph, nodes, start_position, end_position)?;

    let node_alignments: Vec<NodeAlignment> = node_operations
        .into_iter()
        .enumerate()
        .map(|(index, operations)| {
            let reference_start = if index == 0 { start_position } else { 0 };
            NodeAlignment::new(reference_start, operations)
        })
        .collect();

    GraphAlignment::new(path, node_alignments)
}

/// Verifies the bookkeeping invariants of an alignment against its query.
pub fn check_consistency(alignment: &GraphAlignment, query: &str) -> bool {
    alignment.query_length() == query.len()
        && alignment.reference_length() == alignment.path().length()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::Graph;

    fn make_str_graph() -> Graph {
        // ATTCGA(C)*ATGTCG
        let mut graph = Graph::new(3);
        graph.set_node_sequence(0, "ATTCGA");
        graph.set_node_sequence(1, "C");
        graph.set_node_sequence(2, "ATGTCG");
        graph.add_edge(0, 1);
        graph.add_edge(0, 2);
        graph.add_edge(1, 1);
        graph.add_edge(1, 2);
        graph
    }

    #[test]
    fn decoded_alignment_reports_derived_quantities() {
        let graph = make_str_graph();
        let alignment = decode_graph_alignment(3, "0[3M]1[1M]1[1M]1[1M]2[4M]", &graph).unwrap();

        assert_eq!(10, alignment.query_length());
        assert_eq!(10, alignment.reference_length());
        assert_eq!(10, alignment.num_matches());
        assert_eq!(0, alignment.num_mismatches());
        assert_eq!(50, alignment.score(&AlignmentScores::default()));
        assert!(check_consistency(&alignment, "CGACCCATGT"));
        assert_eq!("0[3M]1[1M]1[1M]1[1M]2[4M]", format!("{alignment}"));
    }

    #[test]
    fn alignment_scoring_uses_affine_gaps() {
        let graph = make_str_graph();
        let alignment = decode_graph_alignment(0, "0[5M2I1M]1[1M]1[1M]1[1M]2[1M1D2M]", &graph).unwrap();
        // 12 matches, one 2-base insertion, one 1-base deletion.
        let expected = 12 * 5 + (-8 - 2) + (-8);
        assert_eq!(expected, alignment.score(&AlignmentScores::default()));
        assert_eq!(3, alignment.num_indel_bases());
    }

    #[test]
    fn gaps_spanning_node_boundaries_count_once() {
        let graph = make_str_graph();
        let alignment = decode_graph_alignment(4, "0[2M]1[1D]1[1D]2[3M]", &graph).unwrap();
        let flattened = alignment.flattened_operations();
        assert_eq!(
            vec![
                Operation::new(OperationKind::Match, 2),
                Operation::new(OperationKind::Deletion, 2),
                Operation::new(OperationKind::Match, 3),
            ],
            flattened
        );
        assert_eq!(5 * 5 - 8 - 2, alignment.score(&AlignmentScores::default()));
    }

    #[test]
    fn softclips_only_allowed_at_outer_ends() {
        let graph = make_str_graph();
        assert!(decode_graph_alignment(3, "0[2S3M]1[1M]2[4M2S]", &graph).is_ok());
        assert!(decode_graph_alignment(3, "0[3M]1[1S1M]2[4M]", &graph).is_err());
    }

    #[test]
    fn shrinking_start_converts_query_bases_to_softclip() {
        let graph = make_str_graph();
        let mut alignment = decode_graph_alignment(3, "0[3M]1[1M]1[1M]1[1M]2[4M]", &graph).unwrap();
        alignment.shrink_start(4);

        let expected = decode_graph_alignment(0, "1[4S1M]1[1M]2[4M]", &graph).unwrap();
        assert_eq!(expected, alignment);
        assert_eq!(10, alignment.query_length());
    }

    #[test]
    fn shrinking_end_converts_query_bases_to_softclip() {
        let graph = make_str_graph();
        let mut alignment = decode_graph_alignment(3, "0[3M]1[1M]1[1M]1[1M]2[4M]", &graph).unwrap();
        alignment.shrink_end(5);

        let expected = decode_graph_alignment(3, "0[3M]1[1M]1[1M5S]", &graph).unwrap();
        assert_eq!(expected, alignment);
        assert_eq!(10, alignment.query_length());
    }

    #[test]
    fn shrinking_partial_operation_splits_the_run() {
        let graph = make_str_graph();
        let mut alignment = decode_graph_alignment(0, "0[6M]1[1M]2[6M]", &graph).unwrap();
        alignment.shrink_start(2);
        let expected = decode_graph_alignment(2, "0[2S4M]1[1M]2[6M]", &graph).unwrap();
        assert_eq!(expected, alignment);
    }

    #[test]
    fn extending_with_softclip_merges_existing_clips() {
        let graph = make_str_graph();
        let alignment = decode_graph_alignment(1, "0[3M]1[1M]", &graph).unwrap();
        let extended = alignment.extend_with_softclip(5, 4);
        let expected = decode_graph_alignment(1, "0[5S3M]1[1M4S]", &graph).unwrap();
        assert_eq!(expected, extended);
    }
}
