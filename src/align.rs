//! # Read-to-graph alignment
//!
//! Orientation prediction, kmer-seeded alignment of reads to the locus
//! graph, and the post-alignment softclipping of uncertain flanks.
use std::str::FromStr;

use anyhow::bail;

pub mod aligner;
pub mod filters;
pub mod kmer_index;
pub mod linear;
pub mod operations;
pub mod orientation;
pub mod softclip;

pub use aligner::{AlignerKind, GraphAligner};
pub use operations::{AlignmentScores, GraphAlignment, NodeAlignment, Operation, OperationKind};
pub use orientation::{OrientationPredictor, OrientationPrediction};

impl FromStr for AlignerKind {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "dag-aligner" => Ok(AlignerKind::Dag),
            "path-aligner" => Ok(AlignerKind::Path),
            _ => bail!("Unknown aligner '{name}'; expected dag-aligner or path-aligner"),
        }
    }
}

/// Knobs of the alignment heuristics. The defaults match the values the
/// whole pipeline is calibrated for; tests shrink the kmer lengths to work
/// with miniature graphs.
#[derive(Debug, Clone, Copy)]
pub struct HeuristicParameters {
    pub aligner_kind: AlignerKind,
    pub kmer_length_for_alignment: usize,
    pub padding_length: usize,
    pub seed_affix_trim_length: usize,
    pub orientation_kmer_length: usize,
    pub orientation_min_kmer_count: usize,
}

impl Default for HeuristicParameters {
    fn default() -> Self {
        HeuristicParameters {
            aligner_kind: AlignerKind::Dag,
            kmer_length_for_alignment: 14,
            padding_length: 10,
            seed_affix_trim_length: 14,
            orientation_kmer_length: 10,
            orientation_min_kmer_count: 3,
        }
    }
}

