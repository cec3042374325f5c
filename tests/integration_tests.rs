use std::{
    fs, io,
    path::{Path, PathBuf},
};

use hex_literal::hex;
use sha2::{Digest, Sha256};

use strider::align::{AlignerKind, HeuristicParameters};
use strider::analyze::LocusAnalyzer;
use strider::findings::{GenotypeFilter, VariantFindings};
use strider::genotyping::small_variant::AlleleStatus;
use strider::io::{catalog, output::write_findings, NoOpRealignedReadSink};
use strider::karyotype::{AlleleCount, Sex};
use strider::locus::LocusSpec;
use strider::reads::{MateNumber, Read, ReadProvenance};
use strider::reference::InMemoryReference;
use strider::{compile_catalog, purity::WeightedPurityCalculator};

const CATALOG_FILE: &str = "catalog.json";

fn test_data_dir() -> PathBuf {
    Path::new("tests").join("data")
}

fn sha256_file_digest<P: AsRef<Path>>(path: P) -> Vec<u8> {
    let mut file =
        fs::File::open(&path).expect(&format!("Failed to open file: {}", path.as_ref().display()));
    let mut hasher = Sha256::new();
    _ = io::copy(&mut file, &mut hasher).expect(&format!(
        "Failed to read from file: {}",
        path.as_ref().display()
    ));
    hasher.finalize().to_vec()
}

fn make_reference() -> InMemoryReference {
    let chr1 = format!("{}{}{}", "ATCGATCGATTACAATTCGA", "CCC", "ATGTCGTTTACACGTACGTA");
    let chr2 = format!("{}{}{}", "ATCGATCGATTACAATTCGA", "TTTTT", "ATGTCGTTTACACGTACGTA");
    InMemoryReference::new(vec![("chr1".to_string(), chr1), ("chr2".to_string(), chr2)])
}

fn compile_test_loci() -> Vec<LocusSpec> {
    let catalog_path = test_data_dir().join(CATALOG_FILE);
    let descriptions = catalog::read_catalog(catalog_path).unwrap();
    compile_catalog(&make_reference(), &descriptions, 6).unwrap()
}

fn short_read_heuristics() -> HeuristicParameters {
    HeuristicParameters {
        aligner_kind: AlignerKind::Dag,
        kmer_length_for_alignment: 3,
        padding_length: 10,
        seed_affix_trim_length: 0,
        orientation_kmer_length: 3,
        orientation_min_kmer_count: 2,
    }
}

fn target_read(fragment: &str, mate: MateNumber, sequence: &str) -> Read {
    Read::new(fragment, mate, sequence, false, ReadProvenance::Target)
}

#[test]
/// Check the input files used for integration tests.
/// If this test fails, it means the catalog file has changed.
/// This is a problem if tests are not updated to reflect the new input file.
fn check_catalog_file() {
    let path = test_data_dir().join(CATALOG_FILE);
    let expect = hex!("6f1401508b2eb776bde7c81fda6f5b20b3334a5466b15a44145655fe222531c4");
    assert_eq!(sha256_file_digest(path)[..], expect[..]);
}

fn analyze_repeat_scenario(loci: &[LocusSpec]) -> strider::findings::LocusFindings {
    let locus = loci.iter().find(|locus| locus.locus_id == "toy_repeat").unwrap();
    let sink = NoOpRealignedReadSink;
    let mut analyzer =
        LocusAnalyzer::new(locus, AlleleCount::Two, &short_read_heuristics(), &sink).unwrap();

    analyzer
        .process_pair(
            target_read("frag_a", MateNumber::First, "CGACCCATGT"),
            target_read("frag_a", MateNumber::Second, "GACCCATGTC"),
        )
        .unwrap();
    analyzer
        .process_pair(
            target_read("frag_b", MateNumber::First, "CGACATGT"),
            target_read("frag_b", MateNumber::Second, "GACATGTC"),
        )
        .unwrap();

    analyzer.analyze()
}

#[test]
/// Two spanning pairs with different repeat contents produce a
/// heterozygous genotype whose intervals cover both observed sizes.
fn heterozygous_repeat_pairs_are_genotyped() {
    let loci = compile_test_loci();
    let findings = analyze_repeat_scenario(&loci);

    let VariantFindings::Repeat(repeat) = &findings.variant_findings["toy_repeat"] else {
        panic!("expected repeat findings");
    };

    assert_eq!(vec![1, 3], repeat.spanning_reads.elements_with_nonzero_counts());
    assert_eq!(2, repeat.spanning_reads.count_of(1));
    assert_eq!(2, repeat.spanning_reads.count_of(3));
    assert!(repeat.flanking_reads.is_empty());
    assert!(repeat.inrepeat_reads.is_empty());

    let genotype = repeat.genotype.as_ref().unwrap();
    assert_eq!(1, genotype.short_allele_size());
    assert_eq!(3, genotype.long_allele_size());
    assert!(genotype.short_allele().ci_lower <= 1 && 1 <= genotype.short_allele().ci_upper);
    assert!(genotype.long_allele().ci_lower <= 3 && 3 <= genotype.long_allele().ci_upper);

    // Two tiny pairs cannot clear the breakpoint-coverage floor.
    assert_eq!(GenotypeFilter::LowDepth, repeat.filter);
}

#[test]
/// The same pair stream always produces byte-identical findings.
fn repeat_analysis_is_deterministic() {
    let loci = compile_test_loci();

    let mut first = Vec::new();
    write_findings(&mut first, "sample", Sex::Female, &[analyze_repeat_scenario(&loci)]).unwrap();
    let mut second = Vec::new();
    write_findings(&mut second, "sample", Sex::Female, &[analyze_repeat_scenario(&loci)]).unwrap();

    assert_eq!(first, second);
}

#[test]
/// Reads spanning both swap alleles support a heterozygous call with both
/// alleles judged present.
fn swap_alleles_are_counted_and_checked() {
    let loci = compile_test_loci();
    let locus = loci.iter().find(|locus| locus.locus_id == "toy_swap").unwrap();
    let sink = NoOpRealignedReadSink;
    let mut analyzer =
        LocusAnalyzer::new(locus, AlleleCount::Two, &short_read_heuristics(), &sink).unwrap();

    for index in 0..3 {
        analyzer
            .process_pair(
                target_read(&format!("ref{index}"), MateNumber::First, "CGATTTTTATG"),
                target_read(&format!("ref{index}"), MateNumber::Second, "GATTTTTATGT"),
            )
            .unwrap();
        analyzer
            .process_pair(
                target_read(&format!("alt{index}"), MateNumber::First, "CGAGGGGGATG"),
                target_read(&format!("alt{index}"), MateNumber::Second, "GAGGGGGATGT"),
            )
            .unwrap();
    }

    let findings = analyzer.analyze();
    let VariantFindings::SmallVariant(small) = &findings.variant_findings["toy_swap"] else {
        panic!("expected small-variant findings");
    };

    assert_eq!(6, small.num_ref_reads);
    assert_eq!(6, small.num_alt_reads);
    assert_eq!("REF/ALT", small.genotype.as_ref().unwrap().to_string());
    assert_eq!(AlleleStatus::Present, small.ref_allele_check.status);
    assert_eq!(AlleleStatus::Present, small.alt_allele_check.status);
}

#[test]
/// Weighted purity follows the published reference values.
fn weighted_purity_reference_values() {
    let calculator = WeightedPurityCalculator::new("GGCCGG");
    assert!((calculator.score("GGCCCCGGCCCC") - 1.0).abs() < 0.005);

    let calculator = WeightedPurityCalculator::new("AACCCC");
    assert!((calculator.score("tCCCCttCCCCttCCCCttCCCCtTCCCCttCCCCT") - 0.75).abs() < 0.005);
}

#[test]
/// Pairs pulled from off-target regions only count when both mates look
/// like pure repeat and the locus carries a rare repeat.
fn offtarget_pairs_require_a_rare_repeat() {
    let loci = compile_test_loci();
    let locus = loci.iter().find(|locus| locus.locus_id == "toy_repeat").unwrap();
    let sink = NoOpRealignedReadSink;
    let mut analyzer =
        LocusAnalyzer::new(locus, AlleleCount::Two, &short_read_heuristics(), &sink).unwrap();

    // toy_repeat is a common repeat, so off-target pairs are dropped.
    analyzer
        .process_pair(
            Read::new("frag0", MateNumber::First, "CCCCCCCCCC", false, ReadProvenance::Offtarget),
            Read::new("frag0", MateNumber::Second, "CCCCCCCCCC", false, ReadProvenance::Offtarget),
        )
        .unwrap();

    let findings = analyzer.analyze();
    let VariantFindings::Repeat(repeat) = &findings.variant_findings["toy_repeat"] else {
        panic!("expected repeat findings");
    };
    assert!(repeat.genotype.is_none());
}
