//! # Graph aligner
//!
//! Kmer-seeded alignment of a query to the locus graph. A unique kmer pins
//! the query to a graph path; the flanking query pieces are then aligned
//! into the graph around the seed. Two modes share this scheme:
//!
//! * the DAG aligner keeps the seed fixed and extends it with two pinned
//!   alignments over walks of the graph's predecessors and successors;
//! * the path aligner enumerates whole candidate windows around the seed
//!   and realigns the complete query against each of them.
//!
//! Both return every alignment tied for the top score; an empty list means
//! the query does not align.
use crate::align::kmer_index::KmerIndex;
use crate::align::linear::{align_free, align_pinned, align_pinned_right, LinearAlignment};
use crate::align::operations::{
    AlignmentScores, GraphAlignment, NodeAlignment, Operation, OperationKind,
};
use crate::align::HeuristicParameters;
use crate::graph::{compare_paths, Graph, Path};
use crate::utils::extract_kmers;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlignerKind {
    Dag,
    Path,
}

pub struct GraphAligner<'g> {
    graph: &'g Graph,
    kind: AlignerKind,
    scores: AlignmentScores,
    padding_length: usize,
    seed_affix_trim_length: usize,
    kmer_index: KmerIndex<'g>,
}

struct Seed<'g> {
    query_position: usize,
    path: Path<'g>,
}

impl<'g> GraphAligner<'g> {
    pub fn new(graph: &'g Graph, parameters: &HeuristicParameters) -> Self {
        GraphAligner {
            graph,
            kind: parameters.aligner_kind,
            scores: AlignmentScores::default(),
            padding_length: parameters.padding_length,
            seed_affix_trim_length: parameters.seed_affix_trim_length,
            kmer_index: KmerIndex::new(graph, parameters.kmer_length_for_alignment),
        }
    }

    pub fn scores(&self) -> &AlignmentScores {
        &self.scores
    }

    /// Aligns `query` to the graph, returning every top-scoring alignment.
    pub fn align(&self, query: &str) -> Vec<GraphAlignment<'g>> {
        let Some(seed) = self.find_seed(query) else {
            return Vec::new();
        };

        let scored = match self.kind {
            AlignerKind::Dag => self.align_by_seed_extension(query, &seed),
            AlignerKind::Path => self.align_by_window_realignment(query, &seed),
        };

        let Some(top_score) = scored.iter().map(|(score, _)| *score).max() else {
            return Vec::new();
        };

        let mut alignments: Vec<GraphAlignment<'g>> = Vec::new();
        for (score, alignment) in scored {
            if score == top_score && !alignments.contains(&alignment) {
                alignments.push(alignment);
            }
        }
        alignments.sort_by(|a, b| {
            compare_paths(a.path(), b.path()).then_with(|| format!("{a}").cmp(&format!("{b}")))
        });
        alignments
    }

    /// First unique seed kmer, preferring seeds clear of the query ends by
    /// the affix trim length.
    fn find_seed(&self, query: &str) -> Option<Seed<'g>> {
        let kmer_length = self.kmer_index.kmer_length();
        let kmers = extract_kmers(query, kmer_length);
        let unique_positions: Vec<usize> = kmers
            .iter()
            .enumerate()
            .filter(|(_, kmer)| self.kmer_index.path_count(kmer) == 1)
            .map(|(position, _)| position)
            .collect();

        let trim = self.seed_affix_trim_length;
        let well_placed = unique_positions
            .iter()
            .copied()
            .find(|&position| position >= trim && position + kmer_length + trim <= query.len());
        let position = well_placed.or_else(|| unique_positions.first().copied())?;

        let path = self.kmer_index.paths(kmers[position])[0].clone();
        Some(Seed {
            query_position: position,
            path,
        })
    }

    fn align_by_seed_extension(
        &self,
        query: &str,
        seed: &Seed<'g>,
    ) -> Vec<(i32, GraphAlignment<'g>)> {
        let kmer_length = self.kmer_index.kmer_length();
        let prefix_query = &query[..seed.query_position];
        let suffix_query = &query[seed.query_position + kmer_length..];

        let prefix_results = self.extend_prefix(prefix_query, seed);
        let suffix_results = self.extend_suffix(suffix_query, seed);

        let seed_score = kmer_length as i32 * self.scores.match_score;
        let mut assembled = Vec::new();
        for (prefix_path, prefix) in &prefix_results {
            for (suffix_path, suffix) in &suffix_results {
                let score = prefix.score + seed_score + suffix.score;

                let mut nodes = prefix_path.node_ids().to_vec();
                nodes.extend_from_slice(&suffix_path.node_ids()[seed.path.node_count()..]);
                let path = Path::new(
                    self.graph,
                    nodes,
                    prefix_path.start_position(),
                    suffix_path.end_position(),
                )
                .expect("Extension paths follow graph edges");

                let mut operations = Vec::new();
                if prefix.query_start > 0 {
                    operations.push(Operation::new(OperationKind::Softclip, prefix.query_start));
                }
                operations.extend_from_slice(&prefix.operations);
                operations.push(Operation::new(OperationKind::Match, kmer_length));
                operations.extend_from_slice(&suffix.operations);
                let clipped_tail = suffix_query.len() - suffix.query_consumed;
                if clipped_tail > 0 {
                    operations.push(Operation::new(OperationKind::Softclip, clipped_tail));
                }

                if let Some(alignment) = assemble(path, &operations) {
                    assembled.push((score, alignment));
                }
            }
        }
        assembled
    }

    /// Pinned alignments of the query prefix over walks reaching the seed.
    /// Returns trimmed paths that still contain the whole seed.
    fn extend_prefix(
        &self,
        prefix_query: &str,
        seed: &Seed<'g>,
    ) -> Vec<(Path<'g>, LinearAlignment)> {
        if prefix_query.is_empty() {
            return vec![(seed.path.clone(), LinearAlignment::default())];
        }

        let mut results: Vec<(Path<'g>, LinearAlignment)> = Vec::new();
        let mut top_score = i32::MIN;
        for extended in seed.path.extend_start_by(prefix_query.len() + self.padding_length) {
            let window_length = extended.length() - seed.path.length();
            let window_seq: String = extended.seq()[..window_length].to_string();
            let result = align_pinned_right(&window_seq, prefix_query, &self.scores);

            let mut trimmed = extended;
            trimmed.shrink_start_by(window_length - result.reference_consumed);

            if result.score > top_score {
                top_score = result.score;
                results.clear();
            }
            if result.score == top_score && !results.iter().any(|(path, r)| *path == trimmed && *r == result) {
                results.push((trimmed, result));
            }
        }
        results
    }

    fn extend_suffix(
        &self,
        suffix_query: &str,
        seed: &Seed<'g>,
    ) -> Vec<(Path<'g>, LinearAlignment)> {
        if suffix_query.is_empty() {
            return vec![(seed.path.clone(), LinearAlignment::default())];
        }

        let mut results: Vec<(Path<'g>, LinearAlignment)> = Vec::new();
        let mut top_score = i32::MIN;
        for extended in seed.path.extend_end_by(suffix_query.len() + self.padding_length) {
            let window_length = extended.length() - seed.path.length();
            let window_seq: String =
                extended.seq()[extended.length() - window_length..].to_string();
            let result = align_pinned(&window_seq, suffix_query, &self.scores);

            let mut trimmed = extended;
            trimmed.shrink_end_by(window_length - result.reference_consumed);

            if result.score > top_score {
                top_score = result.score;
                results.clear();
            }
            if result.score == top_score && !results.iter().any(|(path, r)| *path == trimmed && *r == result) {
                results.push((trimmed, result));
            }
        }
        results
    }

    fn align_by_window_realignment(
        &self,
        query: &str,
        seed: &Seed<'g>,
    ) -> Vec<(i32, GraphAlignment<'g>)> {
        let kmer_length = self.kmer_index.kmer_length();
        let prefix_length = seed.query_position;
        let suffix_length = query.len() - seed.query_position - kmer_length;

        let mut assembled = Vec::new();
        for start_extended in seed.path.extend_start_by(prefix_length + self.padding_length) {
            for window in start_extended.extend_end_by(suffix_length + self.padding_length) {
                let window_seq = window.seq();
                let Some(result) = align_free(&window_seq, query, &self.scores) else {
                    continue;
                };

                let mut trimmed = window.clone();
                trimmed.shrink_start_by(result.reference_start);
                trimmed.shrink_end_by(
                    window.length() - result.reference_start - result.reference_consumed,
                );

                let mut operations = Vec::new();
                if result.query_start > 0 {
                    operations.push(Operation::new(OperationKind::Softclip, result.query_start));
                }
                operations.extend_from_slice(&result.operations);
                let clipped_tail = query.len() - result.query_start - result.query_consumed;
                if clipped_tail > 0 {
                    operations.push(Operation::new(OperationKind::Softclip, clipped_tail));
                }

                if let Some(alignment) = assemble(trimmed, &operations) {
                    assembled.push((result.score, alignment));
                }
            }
        }
        assembled
    }
}

/// Splits a flat operation run over the nodes of `path`. Operations that do
/// not consume reference attach to the node the alignment has reached.
fn assemble<'g>(path: Path<'g>, operations: &[Operation]) -> Option<GraphAlignment<'g>> {
    let mut node_alignments: Vec<NodeAlignment> = Vec::new();
    let mut node_index = 0;
    let mut budget = path.node_overlap_length(0);
    let mut reference_start = path.start_position();
    let mut current: Vec<Operation> = Vec::new();

    fn push_merged(operations: &mut Vec<Operation>, kind: OperationKind, length: usize) {
        match operations.last_mut() {
            Some(last) if last.kind == kind => last.length += length,
            _ => operations.push(Operation::new(kind, length)),
        }
    }

    for operation in operations {
        if operation.length == 0 {
            continue;
        }
        if !operation.kind.consumes_reference() {
            push_merged(&mut current, operation.kind, operation.length);
            continue;
        }
        let mut remaining = operation.length;
        while remaining > 0 {
            if budget == 0 {
                if node_index + 1 >= path.node_count() {
                    return None;
                }
                node_alignments.push(NodeAlignment::new(reference_start, std::mem::take(&mut current)));
                node_index += 1;
                reference_start = 0;
                budget = path.node_overlap_length(node_index);
                continue;
            }
            let consumed = remaining.min(budget);
            push_merged(&mut current, operation.kind, consumed);
            budget -= consumed;
            remaining -= consumed;
        }
    }

    node_alignments.push(NodeAlignment::new(reference_start, current));
    if node_alignments.len() != path.node_count() || budget != 0 {
        return None;
    }

    GraphAlignment::new(path, node_alignments).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::operations::decode_graph_alignment;
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

    fn short_read_parameters(kind: AlignerKind) -> HeuristicParameters {
        HeuristicParameters {
            aligner_kind: kind,
            kmer_length_for_alignment: 3,
            padding_length: 10,
            seed_affix_trim_length: 0,
            orientation_kmer_length: 3,
            orientation_min_kmer_count: 2,
        }
    }

    #[test]
    fn dag_aligner_threads_reads_through_the_repeat() {
        let graph = make_str_graph();
        let aligner = GraphAligner::new(&graph, &short_read_parameters(AlignerKind::Dag));

        let alignments = aligner.align("CGACCCATGT");
        let expected = decode_graph_alignment(3, "0[3M]1[1M]1[1M]1[1M]2[4M]", &graph).unwrap();
        assert_eq!(vec![expected], alignments);

        let alignments = aligner.align("GACCCATGTC");
        let expected = decode_graph_alignment(4, "0[2M]1[1M]1[1M]1[1M]2[5M]", &graph).unwrap();
        assert_eq!(vec![expected], alignments);
    }

    #[test]
    fn dag_aligner_handles_contracted_repeats() {
        let graph = make_str_graph();
        let aligner = GraphAligner::new(&graph, &short_read_parameters(AlignerKind::Dag));

        let alignments = aligner.align("CGACATGT");
        let expected = decode_graph_alignment(3, "0[3M]1[1M]2[4M]", &graph).unwrap();
        assert_eq!(vec![expected], alignments);
    }

    #[test]
    fn path_aligner_agrees_on_clean_reads() {
        let graph = make_str_graph();
        let aligner = GraphAligner::new(&graph, &short_read_parameters(AlignerKind::Path));

        let alignments = aligner.align("CGACCCATGT");
        let expected = decode_graph_alignment(3, "0[3M]1[1M]1[1M]1[1M]2[4M]", &graph).unwrap();
        assert_eq!(vec![expected], alignments);
    }

    #[test]
    fn unalignable_reads_produce_no_alignments() {
        let graph = make_str_graph();
        let aligner = GraphAligner::new(&graph, &short_read_parameters(AlignerKind::Dag));
        assert!(aligner.align("GGGGGGGGGG").is_empty());
    }

    #[test]
    fn mismatching_tail_is_softclipped_by_extension() {
        let graph = make_str_graph();
        let aligner = GraphAligner::new(&graph, &short_read_parameters(AlignerKind::Dag));

        // TTCGA matches the left flank; GGGGG matches nothing downstream.
        let alignments = aligner.align("TTCGAGGGGG");
        assert!(!alignments.is_empty());
        for alignment in &alignments {
            assert_eq!(5, alignment.back_softclip_length());
        }
    }

    #[test]
    fn assembling_splits_operations_at_node_boundaries() {
        let graph = make_str_graph();
        let path = Path::new(&graph, vec![0, 1, 1, 2], 3, 4).unwrap();
        let operations = vec![
            Operation::new(OperationKind::Match, 5),
            Operation::new(OperationKind::Insertion, 1),
            Operation::new(OperationKind::Match, 4),
        ];
        let assembled = assemble(path, &operations).unwrap();
        let expected = decode_graph_alignment(3, "0[3M]1[1M]1[1M1I]2[4M]", &graph).unwrap();
        assert_eq!(expected, assembled);
    }
}
