//! # Locus analysis
//!
//! One analyzer instance per locus feeds read pairs through orientation,
//! alignment, canonicalization, and per-variant classification, then
//! finalizes into locus findings. Analyzers own all their mutable state, so
//! loci can be processed on separate threads without sharing.
use std::collections::BTreeMap;

use anyhow::{bail, Result};
use log::{debug, trace};

use crate::align::filters::{check_locally_placed_pair, passes_alignment_filters};
use crate::align::operations::GraphAlignment;
use crate::align::softclip::{shrink_uncertain_prefix, shrink_uncertain_suffix};
use crate::align::{GraphAligner, HeuristicParameters, OrientationPredictor, OrientationPrediction};
use crate::classify::{
    compute_canonical_alignment, SmallVariantAlignment, SmallVariantClassifier, StrClassifier,
    VariantBreakpointCounter,
};
use crate::count_table::{collapse_top_elements, CountTable};
use crate::findings::{
    GenotypeFilter, LocusFindings, RepeatFindings, SmallVariantFindings, VariantFindings,
};
use crate::genotyping::repeat::genotype_repeat;
use crate::genotyping::small_variant::{
    AlleleCheckSummary, AlleleChecker, AlleleStatus, SmallVariantGenotyper,
};
use crate::graph::NodeId;
use crate::io::RealignedReadSink;
use crate::karyotype::AlleleCount;
use crate::locus::{
    GenotyperParameters, LocusSpec, SmallVariantSubtype, VariantKind, VariantSpec,
};
use crate::purity::WeightedPurityCalculator;
use crate::reads::{Read, ReadProvenance};
use crate::stats::{LocusStats, LocusStatsCalculator};
use crate::stralign::{add_irr_pairs_if_possible_expansion, AlignMatrix, StrAlignKind};

/// Reference length of the alignment affixes re-examined for softclipping.
const UNCERTAIN_AFFIX_LENGTH: usize = 10;

/// Weighted purity required of both mates of an off-target in-repeat pair.
const OFFTARGET_PURITY_CUTOFF: f64 = 0.90;

/// Breakpoint-coverage floor for haploid calls.
const HAPLOID_MIN_BREAKPOINT_SPANNING_READS: i32 = 2;

pub struct LocusAnalyzer<'a> {
    locus: &'a LocusSpec,
    allele_count: AlleleCount,
    sink: &'a dyn RealignedReadSink,
    orientation_predictor: OrientationPredictor<'a>,
    aligner: GraphAligner<'a>,
    stats_calculator: LocusStatsCalculator<'a>,
    variant_analyzers: Vec<VariantAnalyzer<'a>>,
    rare_repeat_unit: Option<String>,
    rare_purity_calculator: Option<WeightedPurityCalculator>,
}

impl<'a> LocusAnalyzer<'a> {
    pub fn new(
        locus: &'a LocusSpec,
        allele_count: AlleleCount,
        heuristics: &HeuristicParameters,
        sink: &'a dyn RealignedReadSink,
    ) -> Result<Self> {
        let mut variant_analyzers = Vec::with_capacity(locus.variants.len());
        let mut rare_repeat_unit = None;
        for variant in &locus.variants {
            match variant.kind {
                VariantKind::Repeat(_) => {
                    let analyzer = RepeatAnalyzer::new(&locus.graph, variant)?;
                    if variant.kind.is_rare_repeat() {
                        if rare_repeat_unit.is_some() {
                            bail!(
                                "Locus {} is not permitted to have more than one rare repeat",
                                locus.locus_id
                            );
                        }
                        rare_repeat_unit = Some(analyzer.repeat_unit.clone());
                    }
                    variant_analyzers.push(VariantAnalyzer::Repeat(analyzer));
                }
                VariantKind::SmallVariant(subtype) => {
                    variant_analyzers.push(VariantAnalyzer::SmallVariant(
                        SmallVariantAnalyzer::new(variant, subtype)?,
                    ));
                }
            }
        }

        let rare_purity_calculator = rare_repeat_unit
            .as_deref()
            .map(WeightedPurityCalculator::new);

        Ok(LocusAnalyzer {
            locus,
            allele_count,
            sink,
            orientation_predictor: OrientationPredictor::new(
                &locus.graph,
                heuristics.orientation_kmer_length,
                heuristics.orientation_min_kmer_count,
            ),
            aligner: GraphAligner::new(&locus.graph, heuristics),
            stats_calculator: LocusStatsCalculator::new(
                locus.flank_length,
                allele_count,
                &locus.node_locations,
            ),
            variant_analyzers,
            rare_repeat_unit,
            rare_purity_calculator,
        })
    }

    pub fn locus_id(&self) -> &str {
        &self.locus.locus_id
    }

    /// Feeds one read pair through the pipeline.
    pub fn process_pair(&mut self, read: Read, mate: Read) -> Result<()> {
        if read.provenance() == ReadProvenance::Offtarget
            || mate.provenance() == ReadProvenance::Offtarget
        {
            return self.process_offtarget_pair(&read, &mate);
        }
        self.process_ontarget_pair(read, mate)
    }

    fn process_ontarget_pair(&mut self, mut read: Read, mut mate: Read) -> Result<()> {
        let scores = *self.aligner.scores();
        let read_alignments = self.orient_and_align(&mut read);
        let mate_alignments = self.orient_and_align(&mut mate);

        let read_canonical = read_alignments
            .as_deref()
            .and_then(|alignments| self.canonicalize(read.sequence(), alignments));
        let mate_canonical = mate_alignments
            .as_deref()
            .and_then(|alignments| self.canonicalize(mate.sequence(), alignments));

        let num_matching_bases = ((read.sequence().len() as f64 / 7.5) as i32).max(10);
        let min_nonrepeat_score = num_matching_bases * scores.match_score;
        if !check_locally_placed_pair(
            read_canonical.as_ref(),
            mate_canonical.as_ref(),
            min_nonrepeat_score,
            &scores,
        ) {
            if self.rare_repeat_unit.is_some() {
                return self.process_offtarget_pair(&read, &mate);
            }
            trace!("Pair {} is not locally placed at {}", read, self.locus_id());
            return Ok(());
        }

        if let Some(alignment) = &read_canonical {
            self.stats_calculator.inspect_alignment(alignment);
        }
        if let Some(alignment) = &mate_canonical {
            self.stats_calculator.inspect_alignment(alignment);
        }

        let (Some(read_alignment), Some(mate_alignment)) = (read_canonical, mate_canonical) else {
            debug!(
                "Could not confidently align both mates of {} to {}",
                read,
                self.locus_id()
            );
            return Ok(());
        };

        self.stats_calculator.inspect_pair(&read_alignment, &mate_alignment);

        self.sink.write(
            self.locus_id(),
            read.fragment_id(),
            read.sequence(),
            read.is_first_mate(),
            read.is_reversed(),
            mate.is_reversed(),
            &read_alignment,
        )?;
        self.sink.write(
            self.locus_id(),
            mate.fragment_id(),
            mate.sequence(),
            mate.is_first_mate(),
            mate.is_reversed(),
            read.is_reversed(),
            &mate_alignment,
        )?;

        for analyzer in &mut self.variant_analyzers {
            analyzer.process_pair(&read, &read_alignment, &mate, &mate_alignment);
        }
        Ok(())
    }

    /// Counts fully in-repeat pairs recruited from off-target regions or
    /// rerouted after failing local placement.
    fn process_offtarget_pair(&mut self, read: &Read, mate: &Read) -> Result<()> {
        let (Some(unit), Some(purity_calculator)) =
            (&self.rare_repeat_unit, &self.rare_purity_calculator)
        else {
            trace!(
                "Dropping off-target pair {}: locus {} has no rare repeat",
                read,
                self.locus.locus_id
            );
            return Ok(());
        };

        let read_is_inrepeat = purity_calculator.score(read.sequence()) >= OFFTARGET_PURITY_CUTOFF;
        let mate_is_inrepeat = purity_calculator.score(mate.sequence()) >= OFFTARGET_PURITY_CUTOFF;
        if !read_is_inrepeat || !mate_is_inrepeat {
            return Ok(());
        }

        let mut analyzers_found = 0;
        for analyzer in &mut self.variant_analyzers {
            if let VariantAnalyzer::Repeat(repeat_analyzer) = analyzer {
                if repeat_analyzer.repeat_unit == *unit {
                    repeat_analyzer.add_inrepeat_read_pair();
                    analyzers_found += 1;
                }
            }
        }
        if analyzers_found != 1 {
            bail!("Encountered inconsistently-specified locus {}", self.locus.locus_id);
        }
        Ok(())
    }

    fn orient_and_align(&self, read: &mut Read) -> Option<Vec<GraphAlignment<'a>>> {
        match self.orientation_predictor.predict(read.sequence()) {
            OrientationPrediction::DoesNotAlign => return None,
            OrientationPrediction::ReverseComplement => read.reverse_complement(),
            OrientationPrediction::Forward => {}
        }

        let alignments = self.aligner.align(read.sequence());
        if alignments.is_empty() {
            None
        } else {
            Some(alignments)
        }
    }

    fn canonicalize(
        &self,
        read_sequence: &str,
        alignments: &[GraphAlignment<'a>],
    ) -> Option<GraphAlignment<'a>> {
        let mut canonical = compute_canonical_alignment(alignments)?.clone();
        if !passes_alignment_filters(&canonical) {
            return None;
        }
        shrink_uncertain_prefix(UNCERTAIN_AFFIX_LENGTH, read_sequence, &mut canonical);
        shrink_uncertain_suffix(UNCERTAIN_AFFIX_LENGTH, read_sequence, &mut canonical);
        Some(canonical)
    }

    /// Finalizes the locus, producing findings for every variant.
    pub fn analyze(mut self) -> LocusFindings {
        let stats = self.stats_calculator.stats();
        let parameters = self.locus.parameters;

        let mut variant_findings = BTreeMap::new();
        for analyzer in &mut self.variant_analyzers {
            let (variant_id, findings) = analyzer.analyze(&stats, &parameters, self.allele_count);
            variant_findings.insert(variant_id, findings);
        }

        LocusFindings {
            locus_id: self.locus.locus_id.clone(),
            stats,
            variant_findings,
        }
    }
}

enum VariantAnalyzer<'a> {
    Repeat(RepeatAnalyzer<'a>),
    SmallVariant(SmallVariantAnalyzer),
}

impl<'a> VariantAnalyzer<'a> {
    fn process_pair(
        &mut self,
        read: &Read,
        read_alignment: &GraphAlignment,
        mate: &Read,
        mate_alignment: &GraphAlignment,
    ) {
        match self {
            VariantAnalyzer::Repeat(analyzer) => {
                analyzer.process_pair(read, read_alignment, mate, mate_alignment)
            }
            VariantAnalyzer::SmallVariant(analyzer) => {
                analyzer.process_pair(read_alignment, mate_alignment)
            }
        }
    }

    fn analyze(
        &mut self,
        stats: &LocusStats,
        parameters: &GenotyperParameters,
        allele_count: AlleleCount,
    ) -> (String, VariantFindings) {
        match self {
            VariantAnalyzer::Repeat(analyzer) => (
                analyzer.variant_id.clone(),
                VariantFindings::Repeat(analyzer.analyze(stats, parameters, allele_count)),
            ),
            VariantAnalyzer::SmallVariant(analyzer) => (
                analyzer.variant_id.clone(),
                VariantFindings::SmallVariant(analyzer.analyze(stats, parameters, allele_count)),
            ),
        }
    }
}

fn breakpoint_threshold(parameters: &GenotyperParameters, allele_count: AlleleCount) -> i32 {
    match allele_count {
        AlleleCount::Two => parameters.min_breakpoint_spanning_reads,
        AlleleCount::One => HAPLOID_MIN_BREAKPOINT_SPANNING_READS,
    }
}

struct RepeatAnalyzer<'a> {
    variant_id: String,
    repeat_unit: String,
    repeat_node: NodeId,
    classifier: StrClassifier<'a>,
    breakpoint_counter: VariantBreakpointCounter,
    align_matrix: AlignMatrix,
    spanning_reads: CountTable,
    flanking_reads: CountTable,
    inrepeat_reads: CountTable,
    num_inrepeat_read_pairs: i32,
}

impl<'a> RepeatAnalyzer<'a> {
    fn new(graph: &'a crate::graph::Graph, variant: &VariantSpec) -> Result<Self> {
        let repeat_node = variant.nodes[0];
        Ok(RepeatAnalyzer {
            variant_id: variant.id.clone(),
            repeat_unit: graph.node_sequence(repeat_node).to_string(),
            repeat_node,
            classifier: StrClassifier::new(graph, repeat_node),
            breakpoint_counter: VariantBreakpointCounter::new(&variant.nodes)?,
            align_matrix: AlignMatrix::new(repeat_node),
            spanning_reads: CountTable::new(),
            flanking_reads: CountTable::new(),
            inrepeat_reads: CountTable::new(),
            num_inrepeat_read_pairs: 0,
        })
    }

    fn add_inrepeat_read_pair(&mut self) {
        self.num_inrepeat_read_pairs += 1;
    }

    fn process_pair(
        &mut self,
        read: &Read,
        read_alignment: &GraphAlignment,
        mate: &Read,
        mate_alignment: &GraphAlignment,
    ) {
        self.process_read(read, read_alignment);
        self.process_read(mate, mate_alignment);
        self.align_matrix.add_pair(read_alignment, mate_alignment);
    }

    fn process_read(&mut self, read: &Read, alignment: &GraphAlignment) {
        self.breakpoint_counter.inspect(alignment);

        let summary = self
            .classifier
            .classify_read(read.sequence(), std::slice::from_ref(alignment));
        let Some(summary) = summary else {
            debug!(
                "Could not confidently align {} to repeat node {} of {}",
                read, self.repeat_node, self.variant_id
            );
            return;
        };
        trace!("{} is {} for variant {}", read, summary.kind(), self.variant_id);

        match summary.kind() {
            StrAlignKind::Spanning => self.spanning_reads.increment_count_of(summary.num_motifs()),
            StrAlignKind::Flanking => self.flanking_reads.increment_count_of(summary.num_motifs()),
            StrAlignKind::InRepeat => self.inrepeat_reads.increment_count_of(summary.num_motifs()),
            StrAlignKind::Outside => {}
        }
    }

    fn analyze(
        &mut self,
        stats: &LocusStats,
        parameters: &GenotyperParameters,
        allele_count: AlleleCount,
    ) -> RepeatFindings {
        let motif_length = self.repeat_unit.len() as i32;
        let max_units_in_read =
            (stats.mean_read_length as f64 / motif_length as f64).ceil() as i32;

        let spanning = collapse_top_elements(&self.spanning_reads, max_units_in_read);
        let flanking = collapse_top_elements(&self.flanking_reads, max_units_in_read);
        let inrepeat = collapse_top_elements(&self.inrepeat_reads, max_units_in_read);

        if self.num_inrepeat_read_pairs > 0 {
            add_irr_pairs_if_possible_expansion(
                max_units_in_read,
                &mut self.align_matrix,
                self.num_inrepeat_read_pairs,
            );
        }

        let genotype = genotype_repeat(
            allele_count,
            motif_length,
            stats.mean_read_length,
            stats.median_fragment_length,
            &mut self.align_matrix,
        );

        let breakpoint_stats = self.breakpoint_counter.stats(stats.mean_read_length);
        let threshold = breakpoint_threshold(parameters, allele_count) as f64;
        let low_depth = breakpoint_stats.left_breakpoint_coverage < threshold
            || breakpoint_stats.right_breakpoint_coverage < threshold
            || stats.depth < parameters.min_locus_coverage;

        RepeatFindings {
            spanning_reads: spanning,
            flanking_reads: flanking,
            inrepeat_reads: inrepeat,
            genotype,
            filter: if low_depth {
                GenotypeFilter::LowDepth
            } else {
                GenotypeFilter::Pass
            },
        }
    }
}

struct SmallVariantAnalyzer {
    variant_id: String,
    subtype: SmallVariantSubtype,
    nodes: Vec<NodeId>,
    reference_node: Option<NodeId>,
    classifier: SmallVariantClassifier,
    breakpoint_counter: VariantBreakpointCounter,
    spanning_reads: CountTable,
    upstream_flanking_reads: CountTable,
    downstream_flanking_reads: CountTable,
    num_bypassing_reads: i32,
}

impl SmallVariantAnalyzer {
    fn new(variant: &VariantSpec, subtype: SmallVariantSubtype) -> Result<Self> {
        Ok(SmallVariantAnalyzer {
            variant_id: variant.id.clone(),
            subtype,
            nodes: variant.nodes.clone(),
            reference_node: variant.reference_node,
            classifier: SmallVariantClassifier::new(&variant.nodes)?,
            breakpoint_counter: VariantBreakpointCounter::new(&variant.nodes)?,
            spanning_reads: CountTable::new(),
            upstream_flanking_reads: CountTable::new(),
            downstream_flanking_reads: CountTable::new(),
            num_bypassing_reads: 0,
        })
    }

    fn process_pair(&mut self, read_alignment: &GraphAlignment, mate_alignment: &GraphAlignment) {
        self.process_alignment(read_alignment);
        self.process_alignment(mate_alignment);
    }

    fn process_alignment(&mut self, alignment: &GraphAlignment) {
        self.breakpoint_counter.inspect(alignment);

        match self.classifier.classify(alignment) {
            SmallVariantAlignment::Spanning(node) => {
                self.spanning_reads.increment_count_of(node as i32)
            }
            SmallVariantAlignment::UpstreamFlanking(node) => {
                self.upstream_flanking_reads.increment_count_of(node as i32)
            }
            SmallVariantAlignment::DownstreamFlanking(node) => {
                self.downstream_flanking_reads.increment_count_of(node as i32)
            }
            SmallVariantAlignment::Bypassing => self.num_bypassing_reads += 1,
            SmallVariantAlignment::Outside => {}
        }
    }

    /// Reads supporting an allele; `None` stands for the allele spelled by
    /// skipping the variant nodes.
    fn count_reads_supporting(&self, node: Option<NodeId>) -> i32 {
        let Some(node) = node else {
            return self.num_bypassing_reads;
        };
        let node = node as i32;
        let upstream_support =
            self.upstream_flanking_reads.count_of(node) + self.spanning_reads.count_of(node);
        let downstream_support =
            self.downstream_flanking_reads.count_of(node) + self.spanning_reads.count_of(node);
        (upstream_support + downstream_support) / 2
    }

    fn allele_nodes(&self) -> (Option<NodeId>, Option<NodeId>) {
        match self.subtype {
            SmallVariantSubtype::Insertion => (None, Some(self.nodes[0])),
            SmallVariantSubtype::Deletion => (self.reference_node, None),
            SmallVariantSubtype::Swap => {
                let reference = self.reference_node;
                let alternate = self
                    .nodes
                    .iter()
                    .copied()
                    .find(|&node| Some(node) != reference);
                (reference, alternate)
            }
            SmallVariantSubtype::Smn => (Some(self.nodes[0]), Some(self.nodes[1])),
        }
    }

    fn analyze(
        &mut self,
        stats: &LocusStats,
        parameters: &GenotyperParameters,
        allele_count: AlleleCount,
    ) -> SmallVariantFindings {
        let (ref_node, alt_node) = self.allele_nodes();
        let num_ref_reads = self.count_reads_supporting(ref_node);
        let num_alt_reads = self.count_reads_supporting(alt_node);

        let haplotype_depth = stats.haplotype_depth();

        let undetermined = AlleleCheckSummary {
            status: AlleleStatus::Uncertain,
            log10_likelihood_ratio: 0.0,
        };

        let (genotype, ref_allele_check, alt_allele_check) = if haplotype_depth > 0.0 {
            let genotyper =
                SmallVariantGenotyper::new(haplotype_depth, allele_count, parameters.error_rate);
            let genotype = genotyper
                .genotype(num_ref_reads, num_alt_reads)
                .unwrap_or_else(|error| {
                    debug!("Could not genotype {}: {error:?}", self.variant_id);
                    None
                });

            match AlleleChecker::new(parameters.error_rate, parameters.likelihood_ratio_threshold)
            {
                Ok(checker) => {
                    let ref_check = checker
                        .check(haplotype_depth, num_ref_reads, num_alt_reads)
                        .unwrap_or(undetermined);
                    let alt_check = checker
                        .check(haplotype_depth, num_alt_reads, num_ref_reads)
                        .unwrap_or(undetermined);
                    (genotype, ref_check, alt_check)
                }
                Err(error) => {
                    debug!("Could not check alleles of {}: {error:?}", self.variant_id);
                    (genotype, undetermined, undetermined)
                }
            }
        } else {
            (None, undetermined, undetermined)
        };

        let breakpoint_stats = self.breakpoint_counter.stats(stats.mean_read_length);
        let threshold = breakpoint_threshold(parameters, allele_count) as f64;
        let low_depth = breakpoint_stats.left_breakpoint_coverage < threshold
            || breakpoint_stats.right_breakpoint_coverage < threshold
            || stats.depth < parameters.min_locus_coverage;

        SmallVariantFindings {
            num_ref_reads,
            num_alt_reads,
            ref_allele_check,
            alt_allele_check,
            genotype,
            filter: if low_depth {
                GenotypeFilter::LowDepth
            } else {
                GenotypeFilter::Pass
            },
        }
    }
}
