//! # Karyotype
//!
//! Sample sex and the contig copy-number model deciding how many alleles a
//! locus is genotyped with.
use std::str::FromStr;

use anyhow::bail;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sex {
    Male,
    Female,
}

impl FromStr for Sex {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name {
            "male" => Ok(Sex::Male),
            "female" => Ok(Sex::Female),
            _ => bail!("Sex must be male or female, not '{name}'"),
        }
    }
}

/// Number of alleles expected in a genotype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlleleCount {
    One,
    Two,
}

impl AlleleCount {
    pub fn count(self) -> u32 {
        match self {
            AlleleCount::One => 1,
            AlleleCount::Two => 2,
        }
    }
}

/// Copy number of a contig by sex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContigCopyNumber {
    TwoInFemaleTwoInMale,
    TwoInFemaleOneInMale,
    ZeroInFemaleOneInMale,
}

impl ContigCopyNumber {
    pub fn from_contig(contig: &str) -> Self {
        match contig {
            "chrY" | "Y" => ContigCopyNumber::ZeroInFemaleOneInMale,
            "chrX" | "X" => ContigCopyNumber::TwoInFemaleOneInMale,
            _ => ContigCopyNumber::TwoInFemaleTwoInMale,
        }
    }

    /// Expected allele count for a sample of the given sex; `None` when the
    /// contig is absent (Y in females).
    pub fn expected_allele_count(self, sex: Sex) -> Option<AlleleCount> {
        match (self, sex) {
            (ContigCopyNumber::TwoInFemaleTwoInMale, _) => Some(AlleleCount::Two),
            (ContigCopyNumber::TwoInFemaleOneInMale, Sex::Female) => Some(AlleleCount::Two),
            (ContigCopyNumber::TwoInFemaleOneInMale, Sex::Male) => Some(AlleleCount::One),
            (ContigCopyNumber::ZeroInFemaleOneInMale, Sex::Male) => Some(AlleleCount::One),
            (ContigCopyNumber::ZeroInFemaleOneInMale, Sex::Female) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contig_names_map_to_copy_number_models() {
        assert_eq!(
            ContigCopyNumber::TwoInFemaleTwoInMale,
            ContigCopyNumber::from_contig("chr4")
        );
        assert_eq!(
            ContigCopyNumber::TwoInFemaleOneInMale,
            ContigCopyNumber::from_contig("chrX")
        );
        assert_eq!(
            ContigCopyNumber::ZeroInFemaleOneInMale,
            ContigCopyNumber::from_contig("Y")
        );
    }

    #[test]
    fn allele_counts_depend_on_sex() {
        let autosome = ContigCopyNumber::TwoInFemaleTwoInMale;
        assert_eq!(Some(AlleleCount::Two), autosome.expected_allele_count(Sex::Male));

        let x = ContigCopyNumber::TwoInFemaleOneInMale;
        assert_eq!(Some(AlleleCount::One), x.expected_allele_count(Sex::Male));
        assert_eq!(Some(AlleleCount::Two), x.expected_allele_count(Sex::Female));

        let y = ContigCopyNumber::ZeroInFemaleOneInMale;
        assert_eq!(Some(AlleleCount::One), y.expected_allele_count(Sex::Male));
        assert_eq!(None, y.expected_allele_count(Sex::Female));
    }

    #[test]
    fn sex_parses_from_cli_arguments() {
        assert_eq!(Sex::Male, "male".parse().unwrap());
        assert_eq!(Sex::Female, "female".parse().unwrap());
        assert!("unknown".parse::<Sex>().is_err());
    }
}
