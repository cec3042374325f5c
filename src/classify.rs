//! # Alignment classification
//!
//! Canonical-alignment selection, classification of alignments against the
//! variants of a locus, and breakpoint-spanning read counters.
use std::collections::BTreeSet;

use anyhow::{ensure, Result};

use crate::align::filters::{
    check_downstream_quality, check_upstream_quality, count_full_overlaps,
    passes_alignment_filters,
};
use crate::align::operations::{AlignmentScores, GraphAlignment};
use crate::graph::{Graph, NodeId};
use crate::purity::WeightedPurityCalculator;
use crate::stralign::{StrAlign, StrAlignKind};

/// Reference bases the alignment places on self-looping (repeat) nodes.
fn loop_reference_bases(alignment: &GraphAlignment) -> usize {
    let graph = alignment.graph();
    (0..alignment.node_count())
        .filter(|&index| graph.has_self_loop(alignment.path().node_id(index)))
        .map(|index| alignment.node_alignment(index).reference_length())
        .sum()
}

/// Picks the canonical alignment from a tied list: the one lying deepest
/// inside a repeat, with the list's deterministic order breaking ties in
/// favor of the earliest entry.
pub fn compute_canonical_alignment<'a, 'g>(
    alignments: &'a [GraphAlignment<'g>],
) -> Option<&'a GraphAlignment<'g>> {
    let mut best: Option<(&'a GraphAlignment<'g>, usize)> = None;
    for alignment in alignments {
        let loop_bases = loop_reference_bases(alignment);
        match best {
            Some((_, best_bases)) if loop_bases <= best_bases => {}
            _ => best = Some((alignment, loop_bases)),
        }
    }
    best.map(|(alignment, _)| alignment)
}

/// Classifier of alignments against one repeat node.
pub struct StrClassifier<'g> {
    repeat_node: NodeId,
    left_flank_nodes: BTreeSet<NodeId>,
    right_flank_nodes: BTreeSet<NodeId>,
    purity_calculator: WeightedPurityCalculator,
    scores: AlignmentScores,
}

impl<'g> StrClassifier<'g> {
    pub fn new(graph: &'g Graph, repeat_node: NodeId) -> Self {
        let mut left_flank_nodes: BTreeSet<NodeId> =
            graph.predecessors(repeat_node).iter().copied().collect();
        left_flank_nodes.remove(&repeat_node);

        let mut right_flank_nodes: BTreeSet<NodeId> =
            graph.successors(repeat_node).iter().copied().collect();
        right_flank_nodes.remove(&repeat_node);

        StrClassifier {
            repeat_node,
            left_flank_nodes,
            right_flank_nodes,
            purity_calculator: WeightedPurityCalculator::new(graph.node_sequence(repeat_node)),
            scores: AlignmentScores::default(),
        }
    }

    pub fn repeat_node(&self) -> NodeId {
        self.repeat_node
    }

    /// Classifies one alignment; `None` when it does not touch the repeat
    /// or its flanks.
    pub fn classify(&self, alignment: &GraphAlignment) -> Option<StrAlign> {
        let mut overlaps_left_flank = false;
        let mut overlaps_right_flank = false;
        for &node in alignment.path().node_ids() {
            if self.left_flank_nodes.contains(&node) {
                overlaps_left_flank = true;
            }
            if self.right_flank_nodes.contains(&node) {
                overlaps_right_flank = true;
            }
        }

        let num_units = count_full_overlaps(self.repeat_node, alignment) as i32;
        let overlaps_repeat = alignment.overlaps_node(self.repeat_node);

        if overlaps_left_flank && overlaps_right_flank {
            let score = self.portion_score(alignment, |_| true);
            return Some(StrAlign::new(StrAlignKind::Spanning, num_units, score, 0));
        }
        if (overlaps_left_flank || overlaps_right_flank) && overlaps_repeat {
            let score = self.portion_score(alignment, |node| node != self.repeat_node);
            return Some(StrAlign::new(StrAlignKind::Flanking, num_units, score, 0));
        }
        if overlaps_repeat {
            let score = self.portion_score(alignment, |node| node == self.repeat_node);
            return Some(StrAlign::new(StrAlignKind::InRepeat, num_units, score, 0));
        }
        None
    }

    fn portion_score(&self, alignment: &GraphAlignment, keep: impl Fn(NodeId) -> bool) -> i32 {
        (0..alignment.node_count())
            .filter(|&index| keep(alignment.path().node_id(index)))
            .map(|index| alignment.node_alignment(index).linear_gap_score(&self.scores))
            .sum()
    }

    /// Quality gate over a classified alignment. The flank checks only
    /// apply to reads long enough to anchor the required flank matches at
    /// all; shorter reads cannot be held to them.
    pub fn check_quality(
        &self,
        read_sequence: &str,
        alignment: &GraphAlignment,
        summary: &StrAlign,
    ) -> bool {
        if !passes_alignment_filters(alignment) {
            return false;
        }

        const MIN_FLANK_MATCHES: usize = 8;
        let motif_length = alignment.graph().node_length(self.repeat_node);
        let query_length = alignment.query_length();
        let good_left_flank = check_upstream_quality(self.repeat_node, alignment, &self.scores);
        let good_right_flank = check_downstream_quality(self.repeat_node, alignment, &self.scores);

        match summary.kind() {
            StrAlignKind::Flanking => {
                query_length < MIN_FLANK_MATCHES + motif_length
                    || good_left_flank
                    || good_right_flank
            }
            StrAlignKind::Spanning => {
                query_length < 2 * MIN_FLANK_MATCHES + motif_length
                    || (good_left_flank && good_right_flank)
            }
            StrAlignKind::InRepeat => {
                const PURITY_CUTOFF: f64 = 0.8;
                self.purity_calculator.score(read_sequence) >= PURITY_CUTOFF
            }
            StrAlignKind::Outside => true,
        }
    }

    /// Classification of the first confidently-classified alignment.
    pub fn classify_read(
        &self,
        read_sequence: &str,
        alignments: &[GraphAlignment],
    ) -> Option<StrAlign> {
        alignments.iter().find_map(|alignment| {
            self.classify(alignment)
                .filter(|summary| self.check_quality(read_sequence, alignment, summary))
        })
    }
}

/// How an alignment relates to a small variant's node bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmallVariantAlignment {
    Spanning(NodeId),
    UpstreamFlanking(NodeId),
    DownstreamFlanking(NodeId),
    Bypassing,
    Outside,
}

/// Classifier of alignments against a bundle of consecutive variant nodes.
pub struct SmallVariantClassifier {
    first_node: NodeId,
    last_node: NodeId,
}

impl SmallVariantClassifier {
    pub fn new(nodes: &[NodeId]) -> Result<Self> {
        ensure!(!nodes.is_empty(), "Cannot classify against an empty node bundle");
        for window in nodes.windows(2) {
            ensure!(
                window[1] == window[0] + 1,
                "Variant node bundles must be consecutive"
            );
        }
        Ok(SmallVariantClassifier {
            first_node: nodes[0],
            last_node: *nodes.last().unwrap(),
        })
    }

    pub fn classify(&self, alignment: &GraphAlignment) -> SmallVariantAlignment {
        let mut overlaps_upstream = false;
        let mut overlaps_downstream = false;
        let mut variant_node = None;
        for &node in alignment.path().node_ids() {
            if node < self.first_node {
                overlaps_upstream = true;
            } else if node > self.last_node {
                overlaps_downstream = true;
            } else if variant_node.is_none() {
                variant_node = Some(node);
            }
        }

        match (variant_node, overlaps_upstream, overlaps_downstream) {
            (Some(node), true, true) => SmallVariantAlignment::Spanning(node),
            (Some(node), true, false) => SmallVariantAlignment::UpstreamFlanking(node),
            (Some(node), false, true) => SmallVariantAlignment::DownstreamFlanking(node),
            (None, true, true) => SmallVariantAlignment::Bypassing,
            _ => SmallVariantAlignment::Outside,
        }
    }
}

/// Per-breakpoint coverage estimates for one variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VariantAlignmentStats {
    pub left_breakpoint_coverage: f64,
    pub right_breakpoint_coverage: f64,
}

enum BreakpointSupport {
    Left,
    Right,
    Both,
    Neither,
}

/// Counts reads anchored on each side of a variant's breakpoints.
pub struct VariantBreakpointCounter {
    first_node: NodeId,
    last_node: NodeId,
    min_match: usize,
    num_reads_over_left_breakpoint: i32,
    num_reads_over_right_breakpoint: i32,
}

impl VariantBreakpointCounter {
    pub fn new(nodes: &[NodeId]) -> Result<Self> {
        ensure!(!nodes.is_empty(), "Cannot count breakpoints of an empty node bundle");
        for window in nodes.windows(2) {
            ensure!(
                window[1] == window[0] + 1,
                "Variant node bundles must be consecutive"
            );
        }
        Ok(VariantBreakpointCounter {
            first_node: nodes[0],
            last_node: *nodes.last().unwrap(),
            min_match: 10,
            num_reads_over_left_breakpoint: 0,
            num_reads_over_right_breakpoint: 0,
        })
    }

    pub fn inspect(&mut self, alignment: &GraphAlignment) {
        match self.classify(alignment) {
            BreakpointSupport::Left => self.num_reads_over_left_breakpoint += 1,
            BreakpointSupport::Right => self.num_reads_over_right_breakpoint += 1,
            BreakpointSupport::Both => {
                self.num_reads_over_left_breakpoint += 1;
                self.num_reads_over_right_breakpoint += 1;
            }
            BreakpointSupport::Neither => {}
        }
    }

    fn classify(&self, alignment: &GraphAlignment) -> BreakpointSupport {
        let mut left_flank_span = 0;
        let mut variant_span = 0;
        let mut right_flank_span = 0;

        for index in 0..alignment.node_count() {
            let node = alignment.path().node_id(index);
            let node_span = alignment.node_alignment(index).reference_length();
            if node < self.first_node {
                left_flank_span += node_span;
            } else if node <= self.last_node {
                variant_span += node_span;
            } else {
                right_flank_span += node_span;
            }
        }

        let supports_left = left_flank_span >= self.min_match
            && variant_span + right_flank_span >= self.min_match;
        let supports_right = variant_span + left_flank_span >= self.min_match
            && right_flank_span >= self.min_match;

        match (supports_left, supports_right) {
            (true, true) => BreakpointSupport::Both,
            (true, false) => BreakpointSupport::Left,
            (false, true) => BreakpointSupport::Right,
            (false, false) => BreakpointSupport::Neither,
        }
    }

    pub fn stats(&self, read_length: i32) -> VariantAlignmentStats {
        VariantAlignmentStats {
            left_breakpoint_coverage: self
                .breakpoint_coverage(self.num_reads_over_left_breakpoint, read_length),
            right_breakpoint_coverage: self
                .breakpoint_coverage(self.num_reads_over_right_breakpoint, read_length),
        }
    }

    fn breakpoint_coverage(&self, num_reads: i32, read_length: i32) -> f64 {
        let informative_length = read_length - 2 * self.min_match as i32;
        if informative_length <= 0 {
            return 0.0;
        }
        (num_reads * read_length) as f64 / informative_length as f64
    }
}
