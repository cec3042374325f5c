//! # Findings output
//!
//! JSON serialization of the per-sample results.
use std::collections::BTreeMap;
use std::io::Write;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::count_table::CountTable;
use crate::findings::{LocusFindings, VariantFindings};
use crate::genotyping::repeat::RepeatGenotype;
use crate::karyotype::Sex;

#[derive(Serialize)]
struct SampleResults<'a> {
    sample_id: &'a str,
    sex: &'a str,
    loci: BTreeMap<String, LocusResult>,
}

#[derive(Serialize)]
struct LocusResult {
    mean_read_length: i32,
    median_fragment_length: i32,
    depth: f64,
    allele_count: u32,
    variants: BTreeMap<String, VariantResult>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum VariantResult {
    Repeat {
        variant_type: &'static str,
        counts_of_spanning_reads: BTreeMap<String, i32>,
        counts_of_flanking_reads: BTreeMap<String, i32>,
        counts_of_inrepeat_reads: BTreeMap<String, i32>,
        genotype: Option<RepeatGenotypeResult>,
        filter: &'static str,
    },
    SmallVariant {
        variant_type: &'static str,
        num_ref_reads: i32,
        num_alt_reads: i32,
        ref_allele: AlleleCheckResult,
        alt_allele: AlleleCheckResult,
        genotype: Option<String>,
        filter: &'static str,
    },
}

#[derive(Serialize)]
struct RepeatGenotypeResult {
    short: RepeatAlleleResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    long: Option<RepeatAlleleResult>,
}

#[derive(Serialize)]
struct RepeatAlleleResult {
    size: i32,
    ci_lower: i32,
    ci_upper: i32,
}

#[derive(Serialize)]
struct AlleleCheckResult {
    status: String,
    log10_likelihood_ratio: f64,
}

fn encode_count_table(table: &CountTable) -> BTreeMap<String, i32> {
    table
        .iter()
        .map(|(element, count)| (element.to_string(), count))
        .collect()
}

fn encode_repeat_genotype(genotype: &RepeatGenotype) -> RepeatGenotypeResult {
    let short = genotype.short_allele();
    let long = genotype.long_allele();
    RepeatGenotypeResult {
        short: RepeatAlleleResult {
            size: short.size,
            ci_lower: short.ci_lower,
            ci_upper: short.ci_upper,
        },
        long: (genotype.num_alleles() == 2).then_some(RepeatAlleleResult {
            size: long.size,
            ci_lower: long.ci_lower,
            ci_upper: long.ci_upper,
        }),
    }
}

fn encode_variant(findings: &VariantFindings) -> VariantResult {
    match findings {
        VariantFindings::Repeat(repeat) => VariantResult::Repeat {
            variant_type: "Repeat",
            counts_of_spanning_reads: encode_count_table(&repeat.spanning_reads),
            counts_of_flanking_reads: encode_count_table(&repeat.flanking_reads),
            counts_of_inrepeat_reads: encode_count_table(&repeat.inrepeat_reads),
            genotype: repeat.genotype.as_ref().map(encode_repeat_genotype),
            filter: repeat.filter.name(),
        },
        VariantFindings::SmallVariant(small) => VariantResult::SmallVariant {
            variant_type: "SmallVariant",
            num_ref_reads: small.num_ref_reads,
            num_alt_reads: small.num_alt_reads,
            ref_allele: AlleleCheckResult {
                status: small.ref_allele_check.status.to_string(),
                log10_likelihood_ratio: small.ref_allele_check.log10_likelihood_ratio,
            },
            alt_allele: AlleleCheckResult {
                status: small.alt_allele_check.status.to_string(),
                log10_likelihood_ratio: small.alt_allele_check.log10_likelihood_ratio,
            },
            genotype: small.genotype.as_ref().map(|genotype| genotype.to_string()),
            filter: small.filter.name(),
        },
    }
}

/// Writes all findings of one sample as a JSON document.
pub fn write_findings<W: Write>(
    writer: &mut W,
    sample_id: &str,
    sex: Sex,
    findings: &[LocusFindings],
) -> Result<()> {
    let loci: BTreeMap<String, LocusResult> = findings
        .iter()
        .map(|locus| {
            let variants = locus
                .variant_findings
                .iter()
                .map(|(variant_id, variant)| (variant_id.clone(), encode_variant(variant)))
                .collect();
            (
                locus.locus_id.clone(),
                LocusResult {
                    mean_read_length: locus.stats.mean_read_length,
                    median_fragment_length: locus.stats.median_fragment_length,
                    depth: locus.stats.depth,
                    allele_count: locus.stats.allele_count.count(),
                    variants,
                },
            )
        })
        .collect();

    let results = SampleResults {
        sample_id,
        sex: match sex {
            Sex::Male => "male",
            Sex::Female => "female",
        },
        loci,
    };

    serde_json::to_writer_pretty(&mut *writer, &results).context("Could not serialize findings")?;
    writeln!(writer).context("Could not serialize findings")?;
    Ok(())
}
