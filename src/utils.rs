//! # Sequence utilities
//!
//! Helpers for nucleotide sequences: reverse complements, IUPAC-aware base
//! matching, and kmer extraction.
use anyhow::{Context, Result};

/// Complement of an IUPAC nucleotide code; case is preserved.
pub fn complement(base: char) -> char {
    match base {
        'A' => 'T',
        'C' => 'G',
        'G' => 'C',
        'T' => 'A',
        'R' => 'Y',
        'Y' => 'R',
        'K' => 'M',
        'M' => 'K',
        'S' => 'S',
        'W' => 'W',
        'B' => 'V',
        'V' => 'B',
        'D' => 'H',
        'H' => 'D',
        'N' => 'N',
        'a' => 't',
        'c' => 'g',
        'g' => 'c',
        't' => 'a',
        other => other,
    }
}

pub fn reverse_complement(sequence: &str) -> String {
    sequence.chars().rev().map(complement).collect()
}

/// Whether a (possibly degenerate) reference base matches a query base.
/// Query bases are expected to be ACGT; anything else matches nothing.
pub fn reference_base_matches(reference_base: char, query_base: char) -> bool {
    let expansion: &str = match reference_base.to_ascii_uppercase() {
        'A' => "A",
        'C' => "C",
        'G' => "G",
        'T' => "T",
        'R' => "AG",
        'Y' => "CT",
        'K' => "GT",
        'M' => "AC",
        'S' => "CG",
        'W' => "AT",
        'B' => "CGT",
        'D' => "AGT",
        'H' => "ACT",
        'V' => "ACG",
        'N' => "ACGT",
        _ => "",
    };
    expansion.contains(query_base.to_ascii_uppercase())
}

/// Kmers of `sequence` indexed by start position.
pub fn extract_kmers(sequence: &str, kmer_length: usize) -> Vec<&str> {
    if sequence.len() < kmer_length || kmer_length == 0 {
        return Vec::new();
    }
    (0..=sequence.len() - kmer_length)
        .map(|start| &sequence[start..start + kmer_length])
        .collect()
}

/// Infer a sample name from the filepath of an alignment file.
///
/// # Examples
///
/// ```
/// let filepath = "./path/to/alignment.bam";
/// let sample_name = strider::utils::sample_name_from_path(filepath).unwrap();
///
/// assert_eq!("alignment", sample_name);
/// ```
pub fn sample_name_from_path(filepath: &str) -> Result<String> {
    let context = || format!("Could not infer sample name from path {filepath}");
    let name = std::path::Path::new(filepath)
        .file_stem()
        .with_context(context)?
        .to_str()
        .with_context(context)?;

    Ok(String::from(name))
}

/// Median of an unsorted list; the upper middle element for even lengths.
/// Returns `None` on empty input.
pub fn median(values: &[i64]) -> Option<i64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    Some(sorted[sorted.len() / 2])
}
