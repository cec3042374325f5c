//! # Locus specifications
//!
//! The compiled description of one locus: its graph, the reference
//! intervals behind every node, the variants embedded in the structure, and
//! the genotyping parameters. Compilation stitches reference flanks onto
//! the structure expression, builds the graph, and cross-checks the catalog
//! fields against it.
use std::collections::BTreeMap;
use std::fmt;

use anyhow::{bail, ensure, Context, Result};
use serde::Deserialize;

use crate::blueprint::{decode_features, make_graph, Blueprint, FeatureKind};
use crate::graph::{Graph, NodeId};
use crate::karyotype::ContigCopyNumber;
use crate::reference::ReferenceSequence;

/// Default flank length attached on each side of the locus structure.
pub const DEFAULT_FLANK_LENGTH: i64 = 1000;

/// Variants of one locus must lie within this distance of each other.
const MAX_VARIANT_MERGE_DISTANCE: i64 = 500;

const MAX_FLANK_N_COUNT: usize = 5;

/// Half-open reference interval.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GenomicRegion {
    pub contig: String,
    pub start: i64,
    pub end: i64,
}

impl GenomicRegion {
    pub fn new(contig: &str, start: i64, end: i64) -> Self {
        GenomicRegion {
            contig: contig.to_string(),
            start,
            end,
        }
    }

    pub fn extend(&self, length: i64) -> Self {
        GenomicRegion {
            contig: self.contig.clone(),
            start: self.start - length,
            end: self.end + length,
        }
    }
}

impl fmt::Display for GenomicRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.contig, self.start, self.end)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepeatSubtype {
    Common,
    Rare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmallVariantSubtype {
    Insertion,
    Deletion,
    Swap,
    Smn,
}

/// Closed classification of the variants a locus structure can embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Repeat(RepeatSubtype),
    SmallVariant(SmallVariantSubtype),
}

impl VariantKind {
    pub fn is_repeat(self) -> bool {
        matches!(self, VariantKind::Repeat(_))
    }

    pub fn is_rare_repeat(self) -> bool {
        matches!(self, VariantKind::Repeat(RepeatSubtype::Rare))
    }
}

#[derive(Debug, Clone)]
pub struct VariantSpec {
    pub id: String,
    pub kind: VariantKind,
    /// Graph nodes embodying the variant, in increasing id order.
    pub nodes: Vec<NodeId>,
    pub reference_region: GenomicRegion,
    /// For swap-shaped variants, the node spelling the reference allele.
    pub reference_node: Option<NodeId>,
}

/// Per-locus genotyping knobs, overridable from the catalog.
#[derive(Debug, Clone, Copy)]
pub struct GenotyperParameters {
    pub error_rate: f64,
    pub likelihood_ratio_threshold: f64,
    pub min_locus_coverage: f64,
    pub min_breakpoint_spanning_reads: i32,
}

impl Default for GenotyperParameters {
    fn default() -> Self {
        GenotyperParameters {
            error_rate: 0.02,
            likelihood_ratio_threshold: 10000.0,
            min_locus_coverage: 10.0,
            min_breakpoint_spanning_reads: 5,
        }
    }
}

/// A locus ready for analysis.
#[derive(Debug)]
pub struct LocusSpec {
    pub locus_id: String,
    pub contig_copy_number: ContigCopyNumber,
    pub target_regions: Vec<GenomicRegion>,
    pub offtarget_regions: Vec<GenomicRegion>,
    pub graph: Graph,
    pub node_locations: BTreeMap<NodeId, GenomicRegion>,
    pub variants: Vec<VariantSpec>,
    pub parameters: GenotyperParameters,
    pub flank_length: i64,
}

/// A locus as described by the catalog, before compilation.
#[derive(Debug, Clone)]
pub struct LocusDescription {
    pub locus_id: String,
    pub structure: String,
    pub reference_regions: Vec<GenomicRegion>,
    pub variant_ids: Vec<String>,
    pub variant_kinds: Vec<VariantKind>,
    pub target_regions: Vec<GenomicRegion>,
    pub offtarget_regions: Vec<GenomicRegion>,
    pub error_rate: Option<f64>,
    pub likelihood_ratio_threshold: Option<f64>,
    pub min_locus_coverage: Option<f64>,
}

/// Span covering all variants of a locus, after checking that they are
/// mergeable.
fn locus_location(description: &LocusDescription) -> Result<GenomicRegion> {
    let regions = &description.reference_regions;
    ensure!(
        !regions.is_empty(),
        "Locus {} defines no reference regions",
        description.locus_id
    );

    let contig = &regions[0].contig;
    let mut sorted: Vec<&GenomicRegion> = regions.iter().collect();
    sorted.sort_by_key(|region| (region.start, region.end));

    let mut merged = sorted[0].clone();
    for region in &sorted[1..] {
        ensure!(
            region.contig == *contig,
            "Locus {} mixes contigs {} and {}",
            description.locus_id,
            contig,
            region.contig
        );
        ensure!(
            region.start - merged.end <= MAX_VARIANT_MERGE_DISTANCE,
            "Distance between variants of locus {} exceeds {}bp",
            description.locus_id,
            MAX_VARIANT_MERGE_DISTANCE
        );
        merged.end = merged.end.max(region.end);
    }

    Ok(merged)
}

fn attach_flanks(
    reference: &dyn ReferenceSequence,
    description: &LocusDescription,
    location: &GenomicRegion,
    flank_length: i64,
) -> Result<String> {
    let left_flank = reference.sequence(
        &location.contig,
        location.start - flank_length,
        location.start,
    )?;
    let right_flank =
        reference.sequence(&location.contig, location.end, location.end + flank_length)?;

    let n_count = left_flank.matches('N').count() + right_flank.matches('N').count();
    ensure!(
        n_count <= MAX_FLANK_N_COUNT,
        "Flanks of locus {} contain {n_count} Ns; at most {MAX_FLANK_N_COUNT} are allowed",
        description.locus_id
    );

    Ok(format!("{left_flank}{}{right_flank}", description.structure))
}

/// Reference intervals for every blueprint feature: flanks and variants get
/// their own regions, interruptions the gap between their neighbors.
fn feature_locations(
    blueprint: &Blueprint,
    description: &LocusDescription,
    location: &GenomicRegion,
    flank_length: i64,
) -> Result<Vec<GenomicRegion>> {
    let contig = &location.contig;
    let mut anchor_regions = Vec::with_capacity(description.reference_regions.len() + 2);
    anchor_regions.push(GenomicRegion::new(
        contig,
        location.start - flank_length,
        location.start,
    ));
    anchor_regions.extend(description.reference_regions.iter().cloned());
    anchor_regions.push(GenomicRegion::new(
        contig,
        location.end,
        location.end + flank_length,
    ));

    let mut locations = Vec::with_capacity(blueprint.len());
    let mut region_index = 0;
    for feature in blueprint {
        if feature.kind == FeatureKind::Interruption {
            ensure!(
                region_index != 0 && region_index < anchor_regions.len(),
                "Locus {} structure does not match its reference regions",
                description.locus_id
            );
            let left = &anchor_regions[region_index - 1];
            let right = &anchor_regions[region_index];
            locations.push(GenomicRegion::new(contig, left.end, right.start));
        } else {
            ensure!(
                region_index < anchor_regions.len(),
                "Locus {} supplies more variants in its structure than reference regions",
                description.locus_id
            );
            locations.push(anchor_regions[region_index].clone());
            region_index += 1;
        }
    }

    ensure!(
        region_index == anchor_regions.len(),
        "Locus {} supplies {} reference regions but its structure defines {} variants",
        description.locus_id,
        description.reference_regions.len(),
        region_index.saturating_sub(2)
    );

    Ok(locations)
}

fn node_locations(
    blueprint: &Blueprint,
    graph: &Graph,
    locations: &[GenomicRegion],
) -> BTreeMap<NodeId, GenomicRegion> {
    let mut node_locations = BTreeMap::new();
    for (feature, location) in blueprint.iter().zip(locations) {
        for &node in &feature.nodes {
            let node_length = graph.node_length(node) as i64;
            node_locations.insert(
                node,
                GenomicRegion::new(&location.contig, location.start, location.start + node_length),
            );
        }
    }
    node_locations
}

fn expected_variant_kind(feature_kind: FeatureKind, kind: VariantKind) -> bool {
    match feature_kind {
        FeatureKind::SkippableRepeat | FeatureKind::UnskippableRepeat => kind.is_repeat(),
        FeatureKind::InsertionOrDeletion => matches!(
            kind,
            VariantKind::SmallVariant(SmallVariantSubtype::Insertion)
                | VariantKind::SmallVariant(SmallVariantSubtype::Deletion)
        ),
        FeatureKind::Swap => matches!(
            kind,
            VariantKind::SmallVariant(SmallVariantSubtype::Swap)
                | VariantKind::SmallVariant(SmallVariantSubtype::Smn)
        ),
        _ => false,
    }
}

fn resolve_reference_node(
    reference: &dyn ReferenceSequence,
    graph: &Graph,
    feature_nodes: &[NodeId],
    kind: VariantKind,
    region: &GenomicRegion,
    locus_id: &str,
) -> Result<Option<NodeId>> {
    match kind {
        VariantKind::SmallVariant(SmallVariantSubtype::Deletion) => Ok(Some(feature_nodes[0])),
        VariantKind::SmallVariant(SmallVariantSubtype::Insertion) => Ok(None),
        VariantKind::SmallVariant(SmallVariantSubtype::Smn) => Ok(Some(feature_nodes[0])),
        VariantKind::SmallVariant(SmallVariantSubtype::Swap) => {
            let reference_allele = reference.sequence(&region.contig, region.start, region.end)?;
            for &node in feature_nodes {
                if graph.node_sequence(node) == reference_allele {
                    return Ok(Some(node));
                }
            }
            bail!("Neither allele of a swap in locus {locus_id} matches the reference at {region}")
        }
        VariantKind::Repeat(_) => Ok(None),
    }
}

/// Compiles a catalog description into an analyzable locus.
pub fn compile_locus(
    reference: &dyn ReferenceSequence,
    description: &LocusDescription,
    flank_length: i64,
) -> Result<LocusSpec> {
    ensure!(
        description.variant_ids.len() == description.reference_regions.len()
            && description.variant_kinds.len() == description.reference_regions.len(),
        "Locus {} must supply one variant id and type per reference region",
        description.locus_id
    );

    let location = locus_location(description)?;
    let structure_with_flanks = attach_flanks(reference, description, &location, flank_length)?;

    let blueprint = decode_features(&structure_with_flanks)
        .with_context(|| format!("Could not compile the structure of locus {}", description.locus_id))?;
    let graph = make_graph(&blueprint);

    let locations = feature_locations(&blueprint, description, &location, flank_length)?;
    let node_locations = node_locations(&blueprint, &graph, &locations);

    let variant_features: Vec<&crate::blueprint::Feature> = blueprint
        .iter()
        .filter(|feature| feature.kind.defines_variant())
        .collect();
    ensure!(
        variant_features.len() == description.variant_ids.len(),
        "Locus {} supplies {} variant ids but its structure defines {} variants",
        description.locus_id,
        description.variant_ids.len(),
        variant_features.len()
    );

    let mut variants = Vec::with_capacity(variant_features.len());
    for (index, feature) in variant_features.iter().enumerate() {
        let kind = description.variant_kinds[index];
        ensure!(
            expected_variant_kind(feature.kind, kind),
            "Variant {} of locus {} does not match its structure feature",
            description.variant_ids[index],
            description.locus_id
        );
        let region = description.reference_regions[index].clone();
        let reference_node =
            resolve_reference_node(reference, &graph, &feature.nodes, kind, &region, &description.locus_id)?;
        variants.push(VariantSpec {
            id: description.variant_ids[index].clone(),
            kind,
            nodes: feature.nodes.clone(),
            reference_region: region,
            reference_node,
        });
    }

    let rare_repeat_count = variants
        .iter()
        .filter(|variant| variant.kind.is_rare_repeat())
        .count();
    ensure!(
        rare_repeat_count <= 1,
        "Locus {} is not permitted to have more than one rare repeat",
        description.locus_id
    );
    if description.offtarget_regions.is_empty() {
        ensure!(
            rare_repeat_count == 0,
            "Locus {} contains a rare repeat but no offtarget regions",
            description.locus_id
        );
    }

    let target_regions = if description.target_regions.is_empty() {
        vec![location.extend(flank_length)]
    } else {
        description
            .target_regions
            .iter()
            .map(|region| region.extend(flank_length))
            .collect()
    };

    let mut parameters = GenotyperParameters::default();
    if let Some(error_rate) = description.error_rate {
        parameters.error_rate = error_rate;
    }
    if let Some(threshold) = description.likelihood_ratio_threshold {
        parameters.likelihood_ratio_threshold = threshold;
    }
    if let Some(coverage) = description.min_locus_coverage {
        parameters.min_locus_coverage = coverage;
    }

    Ok(LocusSpec {
        locus_id: description.locus_id.clone(),
        contig_copy_number: ContigCopyNumber::from_contig(&location.contig),
        target_regions,
        offtarget_regions: description.offtarget_regions.clone(),
        graph,
        node_locations,
        variants,
        parameters,
        flank_length,
    })
}
