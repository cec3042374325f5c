//! # Small-variant genotyping
//!
//! Poisson-count genotyping of insertion/deletion/swap alleles and the
//! likelihood-ratio check for the presence of individual alleles.
use std::fmt;

use anyhow::{bail, ensure, Result};
use statrs::function::gamma::ln_gamma;

use crate::karyotype::AlleleCount;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlleleType {
    Ref,
    Alt,
}

impl fmt::Display for AlleleType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlleleType::Ref => write!(f, "REF"),
            AlleleType::Alt => write!(f, "ALT"),
        }
    }
}

/// Haploid or diploid categorical genotype over REF/ALT alleles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmallVariantGenotype {
    allele_types: Vec<AlleleType>,
}

impl SmallVariantGenotype {
    pub fn haploid(allele_type: AlleleType) -> Self {
        SmallVariantGenotype {
            allele_types: vec![allele_type],
        }
    }

    pub fn diploid(first: AlleleType, second: AlleleType) -> Self {
        SmallVariantGenotype {
            allele_types: vec![first, second],
        }
    }

    pub fn num_alleles(&self) -> usize {
        self.allele_types.len()
    }

    pub fn is_hom_ref(&self) -> bool {
        self.allele_types.iter().all(|&allele| allele == AlleleType::Ref)
    }

    pub fn is_hom_alt(&self) -> bool {
        self.allele_types.iter().all(|&allele| allele == AlleleType::Alt)
    }
}

impl fmt::Display for SmallVariantGenotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoded: Vec<String> = self
            .allele_types
            .iter()
            .map(|allele| allele.to_string())
            .collect();
        write!(f, "{}", encoded.join("/"))
    }
}

fn poisson_log_pmf(lambda: f64, count: f64) -> f64 {
    count * lambda.ln() - lambda - ln_gamma(count + 1.0)
}

fn log_beta(a: f64, b: f64) -> f64 {
    ln_gamma(a) + ln_gamma(b) - ln_gamma(a + b)
}

fn log_binom_coefficient(n: f64, k: f64) -> f64 {
    -(n.ln_1p()) - log_beta(n - k + 1.0, k + 1.0)
}

fn binomial_log_pmf(n: f64, p: f64, count: f64) -> f64 {
    log_binom_coefficient(n, count) + count * p.ln() + (n - count) * (-p).ln_1p()
}

/// Most-likely-genotype caller for one small variant.
pub struct SmallVariantGenotyper {
    haplotype_depth: f64,
    allele_count: AlleleCount,
    error_rate: f64,
}

impl SmallVariantGenotyper {
    pub fn new(haplotype_depth: f64, allele_count: AlleleCount, error_rate: f64) -> Self {
        SmallVariantGenotyper {
            haplotype_depth,
            allele_count,
            error_rate,
        }
    }

    /// Most likely genotype given the supporting read counts; `None` when no
    /// reads cover the variant.
    pub fn genotype(&self, ref_count: i32, alt_count: i32) -> Result<Option<SmallVariantGenotype>> {
        ensure!(
            ref_count >= 0 && alt_count >= 0,
            "Invalid read counts: {ref_count} {alt_count}"
        );

        if ref_count + alt_count == 0 {
            return Ok(None);
        }

        let possible_genotypes = self.possible_genotypes();
        let mut best: Option<(f64, SmallVariantGenotype)> = None;
        for genotype in possible_genotypes {
            let likelihood = self.genotype_log_likelihood(&genotype, ref_count, alt_count);
            match &best {
                Some((best_likelihood, _)) if likelihood <= *best_likelihood => {}
                _ => best = Some((likelihood, genotype)),
            }
        }

        Ok(best.map(|(_, genotype)| genotype))
    }

    fn possible_genotypes(&self) -> Vec<SmallVariantGenotype> {
        match self.allele_count {
            AlleleCount::One => vec![
                SmallVariantGenotype::haploid(AlleleType::Ref),
                SmallVariantGenotype::haploid(AlleleType::Alt),
            ],
            AlleleCount::Two => vec![
                SmallVariantGenotype::diploid(AlleleType::Ref, AlleleType::Ref),
                SmallVariantGenotype::diploid(AlleleType::Ref, AlleleType::Alt),
                SmallVariantGenotype::diploid(AlleleType::Alt, AlleleType::Alt),
            ],
        }
    }

    fn genotype_log_likelihood(
        &self,
        genotype: &SmallVariantGenotype,
        ref_count: i32,
        alt_count: i32,
    ) -> f64 {
        let error_lambda = self.error_rate * self.haplotype_depth;
        let is_homozygous = genotype.is_hom_ref() || genotype.is_hom_alt();
        let existing_allele_copies = if is_homozygous { 2.0 } else { 1.0 };
        let count_lambda = existing_allele_copies * self.haplotype_depth;

        let mut log_likelihood = if genotype.is_hom_ref() {
            poisson_log_pmf(error_lambda, alt_count as f64)
        } else {
            poisson_log_pmf(count_lambda, alt_count as f64)
        };
        log_likelihood += if genotype.is_hom_alt() {
            poisson_log_pmf(error_lambda, ref_count as f64)
        } else {
            poisson_log_pmf(count_lambda, ref_count as f64)
        };

        if log_likelihood.is_infinite() {
            log_likelihood = -f64::MAX;
        }
        log_likelihood
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlleleStatus {
    Present,
    Absent,
    Uncertain,
}

impl fmt::Display for AlleleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AlleleStatus::Present => "Present",
            AlleleStatus::Absent => "Absent",
            AlleleStatus::Uncertain => "Uncertain",
        };
        write!(f, "{name}")
    }
}

/// Presence verdict for one allele together with its log10 likelihood
/// ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AlleleCheckSummary {
    pub status: AlleleStatus,
    pub log10_likelihood_ratio: f64,
}

/// Likelihood-ratio test for the presence of an allele: real support should
/// look Poisson around the haplotype depth, while spurious support should
/// look like sequencing errors among the other allele's reads.
pub struct AlleleChecker {
    error_rate: f64,
    likelihood_ratio_threshold: f64,
}

impl AlleleChecker {
    pub fn new(error_rate: f64, likelihood_ratio_threshold: f64) -> Result<Self> {
        if error_rate <= 0.0 || error_rate >= 1.0 {
            bail!("Error rate must be positive and less than 1");
        }
        if likelihood_ratio_threshold < 0.0 {
            bail!("Likelihood ratio threshold must be positive");
        }
        Ok(AlleleChecker {
            error_rate,
            likelihood_ratio_threshold,
        })
    }

    pub fn check(
        &self,
        haplotype_depth: f64,
        target_allele_count: i32,
        other_allele_count: i32,
    ) -> Result<AlleleCheckSummary> {
        ensure!(haplotype_depth > 0.0, "Haplotype depth must be positive");
        ensure!(
            target_allele_count >= 0 && other_allele_count >= 0,
            "Negative read counts are not allowed"
        );

        let total_read_count = target_allele_count + other_allele_count;
        let log_likelihood_absent = if total_read_count > 0 {
            binomial_log_pmf(
                total_read_count as f64,
                self.error_rate,
                target_allele_count as f64,
            )
        } else {
            0.0
        };
        let log_likelihood_present = poisson_log_pmf(haplotype_depth, target_allele_count as f64);

        let log10_likelihood_ratio =
            (log_likelihood_present - log_likelihood_absent) / 10.0f64.ln();

        let log10_threshold = self.likelihood_ratio_threshold.log10();
        let status = if log10_likelihood_ratio < -log10_threshold {
            AlleleStatus::Absent
        } else if log10_likelihood_ratio > log10_threshold {
            AlleleStatus::Present
        } else {
            AlleleStatus::Uncertain
        };

        Ok(AlleleCheckSummary {
            status,
            log10_likelihood_ratio,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checker() -> AlleleChecker {
        AlleleChecker::new(0.02, 10000.0).unwrap()
    }

    #[test]
    fn typical_counts_are_genotyped() {
        let genotyper = SmallVariantGenotyper::new(30.0, AlleleCount::Two, 0.02);

        assert_eq!(
            SmallVariantGenotype::diploid(AlleleType::Ref, AlleleType::Ref),
            genotyper.genotype(20, 1).unwrap().unwrap()
        );
        assert_eq!(
            SmallVariantGenotype::diploid(AlleleType::Ref, AlleleType::Alt),
            genotyper.genotype(20, 19).unwrap().unwrap()
        );
        assert_eq!(
            SmallVariantGenotype::diploid(AlleleType::Alt, AlleleType::Alt),
            genotyper.genotype(1, 20).unwrap().unwrap()
        );
    }

    #[test]
    fn zero_reads_produce_a_missing_genotype() {
        let genotyper = SmallVariantGenotyper::new(30.0, AlleleCount::Two, 0.02);
        assert!(genotyper.genotype(0, 0).unwrap().is_none());
    }

    #[test]
    fn negative_counts_are_rejected() {
        let genotyper = SmallVariantGenotyper::new(30.0, AlleleCount::Two, 0.02);
        assert!(genotyper.genotype(-1, 20).is_err());
    }

    #[test]
    fn haploid_genotypes_carry_one_allele() {
        let genotyper = SmallVariantGenotyper::new(30.0, AlleleCount::One, 0.02);
        let genotype = genotyper.genotype(40, 1).unwrap().unwrap();
        assert_eq!(1, genotype.num_alleles());
        assert_eq!("REF", genotype.to_string());
    }

    #[test]
    fn invalid_checker_parameters_are_rejected() {
        assert!(AlleleChecker::new(1.0, 10000.0).is_err());
        assert!(AlleleChecker::new(0.01, -1.0).is_err());
        assert!(checker().check(0.0, 10, 20).is_err());
        assert!(checker().check(15.0, -1, 20).is_err());
    }

    #[test]
    fn supported_alleles_are_present() {
        let checker = checker();
        assert_eq!(AlleleStatus::Present, checker.check(15.0, 30, 30).unwrap().status);
        assert_eq!(AlleleStatus::Present, checker.check(15.0, 10, 45).unwrap().status);
        assert_eq!(AlleleStatus::Present, checker.check(15.0, 10, 0).unwrap().status);
        assert_eq!(AlleleStatus::Present, checker.check(150.0, 100, 450).unwrap().status);
    }

    #[test]
    fn unsupported_alleles_are_absent() {
        let checker = checker();
        assert_eq!(AlleleStatus::Absent, checker.check(15.0, 0, 0).unwrap().status);
        assert_eq!(AlleleStatus::Absent, checker.check(15.0, 0, 30).unwrap().status);
        assert_eq!(AlleleStatus::Absent, checker.check(15.0, 1, 60).unwrap().status);
        assert_eq!(AlleleStatus::Absent, checker.check(150.0, 20, 600).unwrap().status);
    }

    #[test]
    fn borderline_support_stays_uncertain() {
        let checker = checker();
        assert_eq!(AlleleStatus::Uncertain, checker.check(15.0, 5, 30).unwrap().status);
        assert_eq!(AlleleStatus::Uncertain, checker.check(15.0, 1, 0).unwrap().status);
        assert_eq!(AlleleStatus::Uncertain, checker.check(150.0, 40, 200).unwrap().status);
    }

    #[test]
    fn verdict_matches_the_likelihood_ratio_sign() {
        let checker = checker();
        let summary = checker.check(15.0, 30, 30).unwrap();
        assert!(summary.log10_likelihood_ratio > 10000.0f64.log10());
        let summary = checker.check(15.0, 0, 30).unwrap();
        assert!(summary.log10_likelihood_ratio < -(10000.0f64.log10()));
    }
}
