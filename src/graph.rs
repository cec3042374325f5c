//! # Sequence graph
//!
//! Module containing the locus sequence graph and paths through it.
//! A [`Graph`] owns a fixed set of nodes, each holding a fragment of
//! (possibly degenerate) reference sequence. Edges always run from a node to
//! a node with an equal or higher id; a self-loop is the only permitted cycle
//! and marks a repeat node. [`Path`] is a walk through the graph together
//! with offsets into its first and last node.
use std::collections::BTreeSet;
use std::fmt;

use anyhow::{bail, Result};

pub type NodeId = u32;

#[derive(Debug, Default, Clone)]
struct Node {
    sequence: String,
    predecessors: BTreeSet<NodeId>,
    successors: BTreeSet<NodeId>,
}

/// Locus sequence graph. Nodes are allocated up front; setting node
/// sequences and adding edges are the only mutations. After a locus is
/// compiled the graph is shared immutably.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
}

impl Graph {
    pub fn new(node_count: usize) -> Self {
        Graph {
            nodes: vec![Node::default(); node_count],
        }
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn set_node_sequence(&mut self, node: NodeId, sequence: &str) {
        assert!((node as usize) < self.nodes.len(), "Invalid node id {node}");
        self.nodes[node as usize].sequence = sequence.to_string();
    }

    /// Edges may only point forward or back to the same node; any other
    /// cycle would make path enumeration unbounded.
    pub fn add_edge(&mut self, from: NodeId, to: NodeId) {
        assert!(
            (from as usize) < self.nodes.len() && (to as usize) < self.nodes.len(),
            "Invalid edge ({from}, {to})"
        );
        assert!(from <= to, "Edge ({from}, {to}) would create a non-loop cycle");
        self.nodes[from as usize].successors.insert(to);
        self.nodes[to as usize].predecessors.insert(from);
    }

    pub fn has_edge(&self, from: NodeId, to: NodeId) -> bool {
        self.nodes
            .get(from as usize)
            .map_or(false, |node| node.successors.contains(&to))
    }

    pub fn successors(&self, node: NodeId) -> &BTreeSet<NodeId> {
        &self.nodes[node as usize].successors
    }

    pub fn predecessors(&self, node: NodeId) -> &BTreeSet<NodeId> {
        &self.nodes[node as usize].predecessors
    }

    pub fn node_sequence(&self, node: NodeId) -> &str {
        &self.nodes[node as usize].sequence
    }

    pub fn node_length(&self, node: NodeId) -> usize {
        self.nodes[node as usize].sequence.len()
    }

    pub fn has_self_loop(&self, node: NodeId) -> bool {
        self.has_edge(node, node)
    }

    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|node| node.successors.len()).sum()
    }
}

/// A walk through the graph. `start_position` is the offset of the first
/// aligned base inside the first node; `end_position` is the offset one past
/// the last aligned base inside the last node. Consecutive nodes must be
/// joined by an edge (or be the same self-looping node).
#[derive(Clone)]
pub struct Path<'g> {
    graph: &'g Graph,
    nodes: Vec<NodeId>,
    start_position: usize,
    end_position: usize,
}

impl<'g> Path<'g> {
    pub fn new(
        graph: &'g Graph,
        nodes: Vec<NodeId>,
        start_position: usize,
        end_position: usize,
    ) -> Result<Self> {
        if nodes.is_empty() {
            bail!("A path must visit at least one node");
        }
        for window in nodes.windows(2) {
            if !graph.has_edge(window[0], window[1]) {
                bail!("Nodes {} and {} are not neighbors", window[0], window[1]);
            }
        }
        let first = nodes[0];
        let last = *nodes.last().unwrap();
        if start_position > graph.node_length(first) {
            bail!("Position {start_position} is outside node {first}");
        }
        if end_position > graph.node_length(last) {
            bail!("Position {end_position} is outside node {last}");
        }
        if nodes.len() == 1 && start_position > end_position {
            bail!("Path start {start_position} lies past its end {end_position}");
        }
        Ok(Path {
            graph,
            nodes,
            start_position,
            end_position,
        })
    }

    pub fn graph(&self) -> &'g Graph {
        self.graph
    }

    pub fn node_ids(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn node_id(&self, index: usize) -> NodeId {
        self.nodes[index]
    }

    pub fn first_node(&self) -> NodeId {
        self.nodes[0]
    }

    pub fn last_node(&self) -> NodeId {
        *self.nodes.last().unwrap()
    }

    pub fn start_position(&self) -> usize {
        self.start_position
    }

    pub fn end_position(&self) -> usize {
        self.end_position
    }

    /// Number of path bases falling on the node at `index`.
    pub fn node_overlap_length(&self, index: usize) -> usize {
        let node_length = self.graph.node_length(self.nodes[index]);
        let start = if index == 0 { self.start_position } else { 0 };
        let end = if index == self.nodes.len() - 1 {
            self.end_position
        } else {
            node_length
        };
        end - start
    }

    /// Path length in bases.
    pub fn length(&self) -> usize {
        (0..self.nodes.len())
            .map(|index| self.node_overlap_length(index))
            .sum()
    }

    /// Sequence spelled by the path.
    pub fn seq(&self) -> String {
        let mut sequence = String::with_capacity(self.length());
        for index in 0..self.nodes.len() {
            let node_seq = self.graph.node_sequence(self.nodes[index]);
            let start = if index == 0 { self.start_position } else { 0 };
            let end = if index == self.nodes.len() - 1 {
                self.end_position
            } else {
                node_seq.len()
            };
            sequence.push_str(&node_seq[start..end]);
        }
        sequence
    }

    /// Count of full traversals of `node` by this path.
    pub fn visit_count(&self, node: NodeId) -> usize {
        self.nodes.iter().filter(|&&id| id == node).count()
    }

    pub fn remove_start_node(&mut self) {
        assert!(self.nodes.len() > 1);
        self.nodes.remove(0);
        self.start_position = 0;
    }

    pub fn remove_end_node(&mut self) {
        assert!(self.nodes.len() > 1);
        self.nodes.pop();
        self.end_position = self.graph.node_length(*self.nodes.last().unwrap());
    }

    /// Move the path start forward by `length` bases, dropping nodes that
    /// fall out of the walk.
    pub fn shrink_start_by(&mut self, length: usize) {
        assert!(length <= self.length(), "Cannot shrink path below zero length");
        let mut remaining = length;
        while remaining > 0 {
            let overlap = self.node_overlap_length(0);
            if remaining >= overlap && self.nodes.len() > 1 {
                self.remove_start_node();
                remaining -= overlap;
            } else {
                self.start_position += remaining;
                remaining = 0;
            }
        }
    }

    /// Move the path end backward by `length` bases.
    pub fn shrink_end_by(&mut self, length: usize) {
        assert!(length <= self.length(), "Cannot shrink path below zero length");
        let mut remaining = length;
        while remaining > 0 {
            let last_index = self.nodes.len() - 1;
            let overlap = self.node_overlap_length(last_index);
            if remaining >= overlap && self.nodes.len() > 1 {
                self.remove_end_node();
                remaining -= overlap;
            } else {
                self.end_position -= remaining;
                remaining = 0;
            }
        }
    }

    /// Enumerate the walks obtained by extending the path start by exactly
    /// `length` bases. Walks that hit the graph boundary early are extended
    /// as far as the boundary allows.
    pub fn extend_start_by(&self, length: usize) -> Vec<Path<'g>> {
        let mut extensions = Vec::new();
        let available = self.start_position;
        if length <= available {
            let mut path = self.clone();
            path.start_position -= length;
            extensions.push(path);
            return extensions;
        }

        let mut path = self.clone();
        path.start_position = 0;
        let remaining = length - available;
        let first = path.first_node();
        let predecessors = self.graph.predecessors(first);
        if predecessors.is_empty() {
            extensions.push(path);
            return extensions;
        }
        for &predecessor in predecessors {
            let node_length = self.graph.node_length(predecessor);
            let mut prefixed = path.clone();
            prefixed.nodes.insert(0, predecessor);
            prefixed.start_position = node_length;
            extensions.extend(prefixed.extend_start_by(remaining));
        }
        extensions
    }

    /// Enumerate the walks obtained by extending the path end by exactly
    /// `length` bases, stopping early at the graph boundary.
    pub fn extend_end_by(&self, length: usize) -> Vec<Path<'g>> {
        let mut extensions = Vec::new();
        let last = self.last_node();
        let available = self.graph.node_length(last) - self.end_position;
        if length <= available {
            let mut path = self.clone();
            path.end_position += length;
            extensions.push(path);
            return extensions;
        }

        let mut path = self.clone();
        path.end_position = self.graph.node_length(last);
        let remaining = length - available;
        let successors = self.graph.successors(last);
        if successors.is_empty() {
            extensions.push(path);
            return extensions;
        }
        for &successor in successors {
            let mut suffixed = path.clone();
            suffixed.nodes.push(successor);
            suffixed.end_position = 0;
            extensions.extend(suffixed.extend_end_by(remaining));
        }
        extensions
    }
}

impl PartialEq for Path<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.graph, other.graph)
            && self.nodes == other.nodes
            && self.start_position == other.start_position
            && self.end_position == other.end_position
    }
}

impl Eq for Path<'_> {}

impl fmt::Debug for Path<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}@{})", self.nodes[0], self.start_position)?;
        for node in &self.nodes[1..] {
            write!(f, "-({node})")?;
        }
        write!(f, "@{}", self.end_position)
    }
}

/// Stable ordering used for canonical-alignment tie-breaks: lexicographic on
/// visited nodes, then on the start offset, then on the end offset.
pub fn compare_paths(a: &Path, b: &Path) -> std::cmp::Ordering {
    a.node_ids()
        .cmp(b.node_ids())
        .then(a.start_position().cmp(&b.start_position()))
        .then(a.end_position().cmp(&b.end_position()))
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
    fn graph_stores_edges_in_both_directions() {
        let graph = make_str_graph();
        assert!(graph.has_edge(0, 1));
        assert!(graph.has_edge(1, 1));
        assert!(graph.has_self_loop(1));
        assert!(!graph.has_self_loop(0));
        assert_eq!(vec![0, 1], graph.predecessors(1).iter().copied().collect::<Vec<_>>());
        assert_eq!(vec![1, 2], graph.successors(1).iter().copied().collect::<Vec<_>>());
    }

    #[test]
    fn path_computes_length_and_sequence() {
        let graph = make_str_graph();
        let path = Path::new(&graph, vec![0, 1, 1, 2], 3, 4).unwrap();
        assert_eq!(9, path.length());
        assert_eq!("CGACCATGT", path.seq());
        assert_eq!(2, path.visit_count(1));
    }

    #[test]
    fn path_rejects_disconnected_nodes() {
        let graph = make_str_graph();
        assert!(Path::new(&graph, vec![2, 0], 0, 3).is_err());
        assert!(Path::new(&graph, vec![0, 0], 0, 3).is_err());
    }

    #[test]
    fn path_shrinks_across_node_boundaries() {
        let graph = make_str_graph();
        let mut path = Path::new(&graph, vec![0, 1, 1, 2], 3, 4).unwrap();
        path.shrink_start_by(4);
        assert_eq!(&[1, 2], path.node_ids());
        assert_eq!(0, path.start_position());

        let mut path = Path::new(&graph, vec![0, 1, 1, 2], 3, 4).unwrap();
        path.shrink_end_by(5);
        assert_eq!(&[0, 1], path.node_ids());
        assert_eq!(1, path.end_position());
    }

    #[test]
    fn path_start_extension_enumerates_loop_traversals() {
        let graph = make_str_graph();
        let path = Path::new(&graph, vec![2], 0, 4).unwrap();
        let extensions = path.extend_start_by(2);
        let seqs: Vec<String> = extensions.iter().map(|p| p.seq()).collect();
        assert!(seqs.contains(&"GAATGT".to_string()));
        assert!(seqs.contains(&"CCATGT".to_string()));
        assert!(seqs.contains(&"ACATGT".to_string()));
    }

    #[test]
    fn path_extension_stops_at_graph_boundary() {
        let graph = make_str_graph();
        let path = Path::new(&graph, vec![0], 1, 4).unwrap();
        let extensions = path.extend_start_by(5);
        assert_eq!(1, extensions.len());
        assert_eq!(0, extensions[0].start_position());
    }
}
