//! # Weighted repeat purity
//!
//! Length-normalized score of a sequence against every circular permutation
//! of a repeat motif and of its reverse complement. Perfect hits score 1.0
//! per base; lowercase (low-quality) bases that disagree cost only 0.5;
//! everything else costs -1.0.
use crate::utils::{reference_base_matches, reverse_complement};

pub struct WeightedPurityCalculator {
    repeat_units: Vec<String>,
}

impl WeightedPurityCalculator {
    pub fn new(repeat_unit: &str) -> Self {
        let mut repeat_units = circular_permutations(repeat_unit);
        repeat_units.extend(circular_permutations(&reverse_complement(repeat_unit)));
        WeightedPurityCalculator { repeat_units }
    }

    /// Weighted purity of `query` in [-1.0, 1.0].
    pub fn score(&self, query: &str) -> f64 {
        self.repeat_units
            .iter()
            .map(|unit| Self::score_against(unit, query))
            .fold(f64::MIN, f64::max)
            / query.len() as f64
    }

    fn score_against(repeat_unit: &str, query: &str) -> f64 {
        let unit: Vec<char> = repeat_unit.chars().collect();
        query
            .chars()
            .enumerate()
            .map(|(position, query_base)| base_score(unit[position % unit.len()], query_base))
            .sum()
    }
}

fn base_score(unit_base: char, query_base: char) -> f64 {
    let is_low_quality = query_base.is_ascii_lowercase() && "acgt".contains(query_base);
    if !is_low_quality && !"ACGT".contains(query_base) {
        return -1.0;
    }
    if reference_base_matches(unit_base, query_base) {
        1.0
    } else if is_low_quality {
        0.5
    } else {
        -1.0
    }
}

fn circular_permutations(sequence: &str) -> Vec<String> {
    let mut permutations = Vec::with_capacity(sequence.len());
    let mut rotation = sequence.to_string();
    permutations.push(rotation.clone());
    for _ in 0..sequence.len().saturating_sub(1) {
        let head = rotation.remove(0);
        rotation.push(head);
        permutations.push(rotation.clone());
    }
    permutations
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_near(expected: f64, actual: f64) {
        assert!(
            (expected - actual).abs() < 0.005,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn perfect_repeats_score_one() {
        let calculator = WeightedPurityCalculator::new("GGCCGG");
        assert_near(1.0, calculator.score("GGCCCCGGCCCC"));
    }

    #[test]
    fn imperfect_repeats_are_discounted() {
        let calculator = WeightedPurityCalculator::new("AACCCC");
        assert_near(1.0, calculator.score("ACCCCAACCCCAACCCCAACCCCAACCCCAACCCCA"));
        assert_near(0.75, calculator.score("tCCCCttCCCCttCCCCttCCCCtTCCCCttCCCCT"));
    }

    #[test]
    fn reverse_complement_motifs_are_recognized() {
        let calculator = WeightedPurityCalculator::new("CAG");
        assert_near(1.0, calculator.score("CTGCTGCTGCTG"));
    }
}
