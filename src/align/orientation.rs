//! # Orientation prediction
//!
//! Decides whether a read matches the locus graph as-is, as its reverse
//! complement, or not at all, by counting graph kmer hits in both
//! orientations.
use crate::align::kmer_index::KmerIndex;
use crate::graph::Graph;
use crate::utils::reverse_complement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrientationPrediction {
    Forward,
    ReverseComplement,
    DoesNotAlign,
}

pub struct OrientationPredictor<'g> {
    min_kmer_count: usize,
    kmer_index: KmerIndex<'g>,
}

impl<'g> OrientationPredictor<'g> {
    pub fn new(graph: &'g Graph, kmer_length: usize, min_kmer_count: usize) -> Self {
        OrientationPredictor {
            min_kmer_count,
            kmer_index: KmerIndex::new(graph, kmer_length),
        }
    }

    pub fn predict(&self, sequence: &str) -> OrientationPrediction {
        let forward_count = self.kmer_index.count_matching_kmers(sequence);
        let reverse_count = self
            .kmer_index
            .count_matching_kmers(&reverse_complement(sequence));

        if forward_count.max(reverse_count) < self.min_kmer_count {
            OrientationPrediction::DoesNotAlign
        } else if forward_count >= reverse_count {
            OrientationPrediction::Forward
        } else {
            OrientationPrediction::ReverseComplement
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_graph() -> Graph {
        // AACCTT(CCG)*GGTTAA
        let mut graph = Graph::new(3);
        graph.set_node_sequence(0, "AACCTT");
        graph.set_node_sequence(1, "CCG");
        graph.set_node_sequence(2, "GGTTAA");
        graph.add_edge(0, 1);
        graph.add_edge(0, 2);
        graph.add_edge(1, 1);
        graph.add_edge(1, 2);
        graph
    }

    #[test]
    fn forward_reads_are_left_alone() {
        let graph = make_graph();
        let predictor = OrientationPredictor::new(&graph, 4, 3);
        assert_eq!(
            OrientationPrediction::Forward,
            predictor.predict("AACCTTCCGCCG")
        );
    }

    #[test]
    fn reverse_complemented_reads_are_recognized() {
        let graph = make_graph();
        let predictor = OrientationPredictor::new(&graph, 4, 3);
        assert_eq!(
            OrientationPrediction::ReverseComplement,
            predictor.predict(&reverse_complement("AACCTTCCGCCG"))
        );
    }

    #[test]
    fn prediction_flips_under_reverse_complement() {
        let graph = make_graph();
        let predictor = OrientationPredictor::new(&graph, 4, 3);
        let query = "CCTTCCGCCGGG";
        let verdict = predictor.predict(query);
        let flipped = predictor.predict(&reverse_complement(query));
        assert_eq!(OrientationPrediction::Forward, verdict);
        assert_eq!(OrientationPrediction::ReverseComplement, flipped);
    }

    #[test]
    fn unrelated_reads_do_not_align() {
        let graph = make_graph();
        let predictor = OrientationPredictor::new(&graph, 4, 3);
        assert_eq!(
            OrientationPrediction::DoesNotAlign,
            predictor.predict("TATATATATATA")
        );
    }
}
