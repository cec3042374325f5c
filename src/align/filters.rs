//! # Alignment quality filters
//!
//! Checks deciding whether alignments are trustworthy enough to contribute
//! evidence: local placement of a read pair, per-flank sub-alignment
//! quality around a node, and overall match-fraction filters.
use crate::align::operations::{AlignmentScores, GraphAlignment};
use crate::graph::NodeId;

/// Minimum fraction of matching bases, on both the clipped query and the
/// reference, for an alignment to count as evidence.
const MIN_PERCENT_MATCHES: usize = 80;

/// A flank sub-alignment is convincing once it scores at least this many
/// match-equivalents.
const MIN_FLANK_MATCHES: i32 = 8;

/// Score of the alignment restricted to nodes without self-loops. Repeat
/// nodes are excluded so that purely repetitive matches cannot anchor a
/// read pair to the locus.
pub fn score_to_nonloop_nodes(alignment: &GraphAlignment, scores: &AlignmentScores) -> i32 {
    let graph = alignment.graph();
    (0..alignment.node_count())
        .filter(|&index| !graph.has_self_loop(alignment.path().node_id(index)))
        .map(|index| alignment.node_alignment(index).linear_gap_score(scores))
        .sum()
}

/// Whether the combined non-repeat score of a read pair clears the
/// placement threshold.
pub fn check_locally_placed_pair(
    read_alignment: Option<&GraphAlignment>,
    mate_alignment: Option<&GraphAlignment>,
    min_nonrepeat_score: i32,
    scores: &AlignmentScores,
) -> bool {
    let mut nonrepeat_score = 0;
    if let Some(alignment) = read_alignment {
        nonrepeat_score += score_to_nonloop_nodes(alignment, scores);
    }
    if let Some(alignment) = mate_alignment {
        nonrepeat_score += score_to_nonloop_nodes(alignment, scores);
    }
    nonrepeat_score >= min_nonrepeat_score
}

/// Whether the sub-alignment upstream of the first visit to `node` is
/// convincing.
pub fn check_upstream_quality(
    node: NodeId,
    alignment: &GraphAlignment,
    scores: &AlignmentScores,
) -> bool {
    let indexes = alignment.indexes_of_node(node);
    let Some(&first_index) = indexes.first() else {
        return false;
    };

    let score: i32 = (0..first_index)
        .map(|index| alignment.node_alignment(index).linear_gap_score(scores))
        .sum();
    score >= MIN_FLANK_MATCHES * scores.match_score
}

/// Whether the sub-alignment downstream of the last visit to `node` is
/// convincing.
pub fn check_downstream_quality(
    node: NodeId,
    alignment: &GraphAlignment,
    scores: &AlignmentScores,
) -> bool {
    let indexes = alignment.indexes_of_node(node);
    let Some(&last_index) = indexes.last() else {
        return false;
    };

    let score: i32 = (last_index + 1..alignment.node_count())
        .map(|index| alignment.node_alignment(index).linear_gap_score(scores))
        .sum();
    score >= MIN_FLANK_MATCHES * scores.match_score
}

/// Match-fraction filters over the clipped query and the reference span.
pub fn passes_alignment_filters(alignment: &GraphAlignment) -> bool {
    let clipped_query_length = alignment.query_length()
        - alignment.front_softclip_length()
        - alignment.back_softclip_length();
    let reference_length = alignment.reference_length();
    if clipped_query_length == 0 || reference_length == 0 {
        return false;
    }

    let percent_query_matches = 100 * alignment.num_matches() / clipped_query_length;
    let percent_reference_matches = 100 * alignment.num_matches() / reference_length;

    percent_query_matches >= MIN_PERCENT_MATCHES && percent_reference_matches >= MIN_PERCENT_MATCHES
}

/// Number of times the alignment covers `node` end to end.
pub fn count_full_overlaps(node: NodeId, alignment: &GraphAlignment) -> usize {
    let node_length = alignment.graph().node_length(node);
    alignment
        .indexes_of_node(node)
        .into_iter()
        .filter(|&index| alignment.path().node_overlap_length(index) == node_length)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::operations::decode_graph_alignment;
    use crate::graph::Graph;

    fn make_repeat_graph() -> Graph {
        // ATAT(CCG)*ATTT
        let mut graph = Graph::new(3);
        graph.set_node_sequence(0, "ATAT");
        graph.set_node_sequence(1, "CCG");
        graph.set_node_sequence(2, "ATTT");
        graph.add_edge(0, 1);
        graph.add_edge(0, 2);
        graph.add_edge(1, 1);
        graph.add_edge(1, 2);
        graph
    }

    #[test]
    fn full_overlaps_require_complete_node_coverage() {
        let graph = make_repeat_graph();
        let repeat_node = 1;

        let alignment = decode_graph_alignment(0, "0[4M]", &graph).unwrap();
        assert_eq!(0, count_full_overlaps(repeat_node, &alignment));

        let alignment = decode_graph_alignment(2, "0[2M]1[3M]1[3M]2[2M]", &graph).unwrap();
        assert_eq!(2, count_full_overlaps(repeat_node, &alignment));

        let alignment = decode_graph_alignment(2, "0[2M]1[3M]1[3M]1[2M]", &graph).unwrap();
        assert_eq!(2, count_full_overlaps(repeat_node, &alignment));

        let alignment = decode_graph_alignment(0, "1[3M]1[3M]1[3M]1[2M]", &graph).unwrap();
        assert_eq!(3, count_full_overlaps(repeat_node, &alignment));

        let alignment = decode_graph_alignment(1, "1[1S2M]1[1M2D]1[3M]1[2M]", &graph).unwrap();
        assert_eq!(2, count_full_overlaps(repeat_node, &alignment));
    }

    #[test]
    fn nonloop_score_excludes_the_repeat_node() {
        let graph = make_repeat_graph();
        let scores = AlignmentScores::default();

        let alignment = decode_graph_alignment(2, "0[2M]1[3M]1[3M]2[2M]", &graph).unwrap();
        assert_eq!(4 * scores.match_score, score_to_nonloop_nodes(&alignment, &scores));
    }

    #[test]
    fn pair_placement_combines_both_mates() {
        let graph = make_repeat_graph();
        let scores = AlignmentScores::default();

        let read = decode_graph_alignment(0, "0[4M]1[3M]", &graph).unwrap();
        let mate = decode_graph_alignment(0, "1[3M]2[4M]", &graph).unwrap();

        assert!(check_locally_placed_pair(
            Some(&read),
            Some(&mate),
            8 * scores.match_score,
            &scores
        ));
        assert!(!check_locally_placed_pair(
            Some(&read),
            None,
            8 * scores.match_score,
            &scores
        ));
    }

    #[test]
    fn flank_quality_checks_score_each_side_of_the_node() {
        let graph = make_repeat_graph();
        let scores = AlignmentScores::default();

        let spanning = decode_graph_alignment(0, "0[4M]1[3M]1[3M]2[4M]", &graph).unwrap();
        // Each flank holds only 4 matches; 8 are required.
        assert!(!check_upstream_quality(1, &spanning, &scores));
        assert!(!check_downstream_quality(1, &spanning, &scores));

        let mut wide = Graph::new(3);
        wide.set_node_sequence(0, "ATATATATAT");
        wide.set_node_sequence(1, "CCG");
        wide.set_node_sequence(2, "GCGCGCGCGC");
        wide.add_edge(0, 1);
        wide.add_edge(1, 1);
        wide.add_edge(1, 2);
        let spanning = decode_graph_alignment(0, "0[10M]1[3M]2[10M]", &wide).unwrap();
        assert!(check_upstream_quality(1, &spanning, &scores));
        assert!(check_downstream_quality(1, &spanning, &scores));
    }

    #[test]
    fn match_fraction_filters_reject_gappy_alignments() {
        let graph = make_repeat_graph();
        let good = decode_graph_alignment(0, "0[4M]1[3M]2[4M]", &graph).unwrap();
        assert!(passes_alignment_filters(&good));

        let clipped = decode_graph_alignment(0, "0[2X2M]1[3M]", &graph).unwrap();
        // 5 matches of 7 clipped query bases is below 80%.
        assert!(!passes_alignment_filters(&clipped));
    }
}
