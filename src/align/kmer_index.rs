//! # Kmer index
//!
//! Index from kmers to the graph paths spelling them, used for alignment
//! seeding and orientation prediction.
use std::collections::HashMap;

use crate::graph::{Graph, NodeId, Path};
use crate::utils::extract_kmers;

pub struct KmerIndex<'g> {
    kmer_length: usize,
    paths_by_kmer: HashMap<String, Vec<Path<'g>>>,
}

impl<'g> KmerIndex<'g> {
    pub fn new(graph: &'g Graph, kmer_length: usize) -> Self {
        let mut paths_by_kmer: HashMap<String, Vec<Path<'g>>> = HashMap::new();

        for node in 0..graph.node_count() as NodeId {
            for start in 0..graph.node_length(node) {
                let mut kmer = String::with_capacity(kmer_length);
                let mut nodes = vec![node];
                collect_kmer_paths(
                    graph,
                    kmer_length,
                    start,
                    node,
                    start,
                    &mut kmer,
                    &mut nodes,
                    &mut paths_by_kmer,
                );
            }
        }

        KmerIndex {
            kmer_length,
            paths_by_kmer,
        }
    }

    pub fn kmer_length(&self) -> usize {
        self.kmer_length
    }

    pub fn contains(&self, kmer: &str) -> bool {
        self.paths_by_kmer.contains_key(kmer)
    }

    pub fn path_count(&self, kmer: &str) -> usize {
        self.paths_by_kmer.get(kmer).map_or(0, Vec::len)
    }

    pub fn paths(&self, kmer: &str) -> &[Path<'g>] {
        self.paths_by_kmer.get(kmer).map_or(&[], Vec::as_slice)
    }

    /// Number of positions of `sequence` whose kmer occurs in the graph.
    pub fn count_matching_kmers(&self, sequence: &str) -> usize {
        extract_kmers(sequence, self.kmer_length)
            .into_iter()
            .filter(|kmer| self.contains(kmer))
            .count()
    }
}

#[allow(clippy::too_many_arguments)]
fn collect_kmer_paths<'g>(
    graph: &'g Graph,
    kmer_length: usize,
    path_start: usize,
    node: NodeId,
    offset: usize,
    kmer: &mut String,
    nodes: &mut Vec<NodeId>,
    paths_by_kmer: &mut HashMap<String, Vec<Path<'g>>>,
) {
    let node_seq = graph.node_sequence(node);
    let needed = kmer_length - kmer.len();
    let available = node_seq.len() - offset;

    if available >= needed {
        kmer.push_str(&node_seq[offset..offset + needed]);
        let path = Path::new(graph, nodes.clone(), path_start, offset + needed)
            .expect("Kmer walks follow graph edges");
        paths_by_kmer.entry(kmer.clone()).or_default().push(path);
        kmer.truncate(kmer.len() - needed);
        return;
    }

    kmer.push_str(&node_seq[offset..]);
    for &successor in graph.successors(node) {
        nodes.push(successor);
        collect_kmer_paths(
            graph,
            kmer_length,
            path_start,
            successor,
            0,
            kmer,
            nodes,
            paths_by_kmer,
        );
        nodes.pop();
    }
    kmer.truncate(kmer.len() - available);
}

#[cfg(test)]
mod tests {
    use super::*;

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
    fn kmers_within_one_node_are_indexed_once() {
        let graph = make_str_graph();
        let index = KmerIndex::new(&graph, 4);
        assert_eq!(1, index.path_count("TTCG"));
        assert_eq!(1, index.path_count("TGTC"));
        assert!(!index.contains("GGGG"));
    }

    #[test]
    fn kmers_crossing_edges_enumerate_all_walks() {
        let graph = make_str_graph();
        let index = KmerIndex::new(&graph, 3);
        // GAC arises only by following the flank into the repeat node.
        assert_eq!(1, index.path_count("GAC"));
        // CCC requires two self-loop traversals.
        assert_eq!(1, index.path_count("CCC"));
        // CAT arises from the repeat node into the right flank.
        assert_eq!(1, index.path_count("CAT"));
        // GAA: left flank directly into right flank (repeat skipped).
        assert_eq!(1, index.path_count("GAA"));
    }

    #[test]
    fn matching_kmer_count_reflects_query_orientation() {
        let graph = make_str_graph();
        let index = KmerIndex::new(&graph, 4);
        assert!(index.count_matching_kmers("TTCGACCC") > 0);
        assert_eq!(0, index.count_matching_kmers("GGGTATTA"));
    }
}
