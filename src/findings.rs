//! # Findings
//!
//! The per-locus results emitted at finalization: count tables, genotypes,
//! filter flags, and locus stats.
use std::collections::BTreeMap;

use crate::count_table::CountTable;
use crate::genotyping::repeat::RepeatGenotype;
use crate::genotyping::small_variant::{AlleleCheckSummary, SmallVariantGenotype};
use crate::stats::LocusStats;

/// Filter verdict attached to a genotype call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenotypeFilter {
    Pass,
    LowDepth,
}

impl GenotypeFilter {
    pub fn name(&self) -> &'static str {
        match self {
            GenotypeFilter::Pass => "PASS",
            GenotypeFilter::LowDepth => "LowDepth",
        }
    }
}

#[derive(Debug, Clone)]
pub struct RepeatFindings {
    pub spanning_reads: CountTable,
    pub flanking_reads: CountTable,
    pub inrepeat_reads: CountTable,
    pub genotype: Option<RepeatGenotype>,
    pub filter: GenotypeFilter,
}

#[derive(Debug, Clone)]
pub struct SmallVariantFindings {
    pub num_ref_reads: i32,
    pub num_alt_reads: i32,
    pub ref_allele_check: AlleleCheckSummary,
    pub alt_allele_check: AlleleCheckSummary,
    pub genotype: Option<SmallVariantGenotype>,
    pub filter: GenotypeFilter,
}

/// Findings for one variant; dispatch is by tag.
#[derive(Debug, Clone)]
pub enum VariantFindings {
    Repeat(RepeatFindings),
    SmallVariant(SmallVariantFindings),
}

#[derive(Debug)]
pub struct LocusFindings {
    pub locus_id: String,
    pub stats: LocusStats,
    pub variant_findings: BTreeMap<String, VariantFindings>,
}
