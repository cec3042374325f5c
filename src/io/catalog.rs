//! # Locus catalog
//!
//! JSON catalog of locus descriptions. Unknown fields and malformed
//! variant types are rejected outright; structural validation against the
//! locus graph happens at compilation.
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::locus::{
    GenomicRegion, LocusDescription, RepeatSubtype, SmallVariantSubtype, VariantKind,
};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct LocusEntry {
    locus_id: String,
    structure: String,
    reference_regions: Vec<GenomicRegion>,
    variant_ids: Vec<String>,
    variant_types: Vec<String>,
    #[serde(default)]
    target_regions: Vec<GenomicRegion>,
    #[serde(default)]
    offtarget_regions: Vec<GenomicRegion>,
    #[serde(default)]
    error_rate: Option<f64>,
    #[serde(default)]
    likelihood_ratio_threshold: Option<f64>,
    #[serde(default)]
    min_locus_coverage: Option<f64>,
}

fn decode_variant_type(name: &str, locus_id: &str) -> Result<VariantKind> {
    Ok(match name {
        "Repeat" => VariantKind::Repeat(RepeatSubtype::Common),
        "RareRepeat" => VariantKind::Repeat(RepeatSubtype::Rare),
        "Insertion" => VariantKind::SmallVariant(SmallVariantSubtype::Insertion),
        "Deletion" => VariantKind::SmallVariant(SmallVariantSubtype::Deletion),
        "Swap" => VariantKind::SmallVariant(SmallVariantSubtype::Swap),
        "SMN" => VariantKind::SmallVariant(SmallVariantSubtype::Smn),
        _ => bail!("Locus {locus_id} carries unknown variant type {name}"),
    })
}

impl LocusEntry {
    fn into_description(self) -> Result<LocusDescription> {
        let variant_kinds = self
            .variant_types
            .iter()
            .map(|name| decode_variant_type(name, &self.locus_id))
            .collect::<Result<Vec<_>>>()?;

        Ok(LocusDescription {
            locus_id: self.locus_id,
            structure: self.structure,
            reference_regions: self.reference_regions,
            variant_ids: self.variant_ids,
            variant_kinds,
            target_regions: self.target_regions,
            offtarget_regions: self.offtarget_regions,
            error_rate: self.error_rate,
            likelihood_ratio_threshold: self.likelihood_ratio_threshold,
            min_locus_coverage: self.min_locus_coverage,
        })
    }
}

/// Parses a catalog from JSON text.
pub fn parse_catalog(json: &str) -> Result<Vec<LocusDescription>> {
    let entries: Vec<LocusEntry> =
        serde_json::from_str(json).context("Could not parse the locus catalog")?;
    entries
        .into_iter()
        .map(LocusEntry::into_description)
        .collect()
}

/// Reads a catalog from a JSON file.
pub fn read_catalog<P: AsRef<Path>>(path: P) -> Result<Vec<LocusDescription>> {
    let file = File::open(&path)
        .with_context(|| format!("Could not read catalog {}", path.as_ref().display()))?;
    let entries: Vec<LocusEntry> = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Could not parse catalog {}", path.as_ref().display()))?;
    entries
        .into_iter()
        .map(LocusEntry::into_description)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_catalogs_parse() {
        let json = r#"[{
            "locus_id": "HTT",
            "structure": "(CAG)*CAACAG(CCG)*",
            "reference_regions": [
                {"contig": "chr4", "start": 3074876, "end": 3074933},
                {"contig": "chr4", "start": 3074939, "end": 3074966}
            ],
            "variant_ids": ["HTT_CAG", "HTT_CCG"],
            "variant_types": ["Repeat", "Repeat"]
        }]"#;

        let catalog = parse_catalog(json).unwrap();
        assert_eq!(1, catalog.len());
        assert_eq!("HTT", catalog[0].locus_id);
        assert_eq!(2, catalog[0].reference_regions.len());
        assert_eq!(
            VariantKind::Repeat(RepeatSubtype::Common),
            catalog[0].variant_kinds[0]
        );
        assert!(catalog[0].offtarget_regions.is_empty());
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let json = r#"[{
            "locus_id": "X",
            "structure": "(CAG)*",
            "reference_regions": [{"contig": "chr1", "start": 1, "end": 4}],
            "variant_ids": ["X"],
            "variant_types": ["Repeat"],
            "surprise": true
        }]"#;
        assert!(parse_catalog(json).is_err());
    }

    #[test]
    fn unknown_variant_types_are_rejected() {
        let json = r#"[{
            "locus_id": "X",
            "structure": "(CAG)*",
            "reference_regions": [{"contig": "chr1", "start": 1, "end": 4}],
            "variant_ids": ["X"],
            "variant_types": ["Inversion"]
        }]"#;
        assert!(parse_catalog(json).is_err());
    }

    #[test]
    fn genotyper_overrides_are_optional() {
        let json = r#"[{
            "locus_id": "C9orf72",
            "structure": "(GGGGCC)*",
            "reference_regions": [{"contig": "chr9", "start": 27573528, "end": 27573546}],
            "variant_ids": ["C9orf72"],
            "variant_types": ["RareRepeat"],
            "offtarget_regions": [{"contig": "chr2", "start": 87141540, "end": 87141618}],
            "error_rate": 0.01,
            "likelihood_ratio_threshold": 1000.0
        }]"#;

        let catalog = parse_catalog(json).unwrap();
        assert_eq!(Some(0.01), catalog[0].error_rate);
        assert_eq!(Some(1000.0), catalog[0].likelihood_ratio_threshold);
        assert_eq!(None, catalog[0].min_locus_coverage);
    }
}
