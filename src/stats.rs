//! # Locus statistics
//!
//! Read-length, fragment-length, and depth estimates accumulated from the
//! reads confidently placed at a locus.
use std::collections::BTreeMap;

use crate::align::operations::GraphAlignment;
use crate::graph::NodeId;
use crate::karyotype::AlleleCount;
use crate::locus::GenomicRegion;
use crate::utils::median;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocusStats {
    pub mean_read_length: i32,
    pub median_fragment_length: i32,
    pub depth: f64,
    pub allele_count: AlleleCount,
}

impl LocusStats {
    pub fn haplotype_depth(&self) -> f64 {
        match self.allele_count {
            AlleleCount::Two => self.depth / 2.0,
            AlleleCount::One => self.depth,
        }
    }
}

/// Accumulates locus stats from placed alignments. Depth is the number of
/// aligned bases over the combined flank length; fragment lengths are
/// estimated by projecting both mates onto reference coordinates.
pub struct LocusStatsCalculator<'a> {
    flank_length: i64,
    allele_count: AlleleCount,
    node_locations: &'a BTreeMap<NodeId, GenomicRegion>,
    read_length_sum: u64,
    read_count: u64,
    fragment_lengths: Vec<i64>,
}

impl<'a> LocusStatsCalculator<'a> {
    pub fn new(
        flank_length: i64,
        allele_count: AlleleCount,
        node_locations: &'a BTreeMap<NodeId, GenomicRegion>,
    ) -> Self {
        LocusStatsCalculator {
            flank_length,
            allele_count,
            node_locations,
            read_length_sum: 0,
            read_count: 0,
            fragment_lengths: Vec::new(),
        }
    }

    pub fn inspect_alignment(&mut self, alignment: &GraphAlignment) {
        self.read_length_sum += alignment.query_length() as u64;
        self.read_count += 1;
    }

    pub fn inspect_pair(&mut self, read: &GraphAlignment, mate: &GraphAlignment) {
        let read_span = self.projected_span(read);
        let mate_span = self.projected_span(mate);
        let fragment_length = (read_span.1.max(mate_span.1) - read_span.0.min(mate_span.0))
            .max(read.query_length().max(mate.query_length()) as i64);
        self.fragment_lengths.push(fragment_length);
    }

    /// Approximate reference interval covered by an alignment. Exact on the
    /// flanks; repeat traversals collapse onto the repeat node's interval.
    fn projected_span(&self, alignment: &GraphAlignment) -> (i64, i64) {
        let first_node = alignment.path().first_node();
        let last_node = alignment.path().last_node();
        let start =
            self.node_locations[&first_node].start + alignment.path().start_position() as i64;
        let end = self.node_locations[&last_node].start + alignment.path().end_position() as i64;
        (start, end.max(start))
    }

    pub fn stats(&self) -> LocusStats {
        let mean_read_length = if self.read_count == 0 {
            0
        } else {
            (self.read_length_sum as f64 / self.read_count as f64).round() as i32
        };
        let median_fragment_length =
            median(&self.fragment_lengths).unwrap_or(mean_read_length as i64) as i32;
        let depth = self.read_length_sum as f64 / (2 * self.flank_length) as f64;

        LocusStats {
            mean_read_length,
            median_fragment_length,
            depth,
            allele_count: self.allele_count,
        }
    }
}
