//! # STRider
//!
//! Library backing the `STRider` binary: graph-based genotyping of short
//! tandem repeats and small variants at cataloged loci in short-read
//! alignments. Each locus is compiled into a sequence graph; reads
//! recruited near the locus are realigned to the graph, classified against
//! every variant, and fed into maximum-likelihood genotypers.
pub mod align;
pub mod analyze;
pub mod blueprint;
pub mod classify;
pub mod cli;
pub mod count_table;
pub mod findings;
pub mod genotyping;
pub mod graph;
pub mod io;
pub mod karyotype;
pub mod locus;
pub mod purity;
pub mod reads;
pub mod reference;
pub mod stats;
pub mod stralign;
pub mod utils;

use anyhow::Result;
use log::{debug, error, trace};

use crate::align::HeuristicParameters;
use crate::analyze::LocusAnalyzer;
use crate::findings::LocusFindings;
use crate::io::RealignedReadSink;
use crate::karyotype::Sex;
use crate::locus::{compile_locus, LocusDescription, LocusSpec};
use crate::reference::{ReferenceOutOfRange, ReferenceSequence};

/// Compiles every catalog entry, skipping loci whose descriptions are
/// invalid and aborting on reference lookups that cannot succeed.
pub fn compile_catalog(
    reference: &dyn ReferenceSequence,
    descriptions: &[LocusDescription],
    flank_length: i64,
) -> Result<Vec<LocusSpec>> {
    let mut loci = Vec::with_capacity(descriptions.len());
    for description in descriptions {
        match compile_locus(reference, description, flank_length) {
            Ok(locus) => loci.push(locus),
            Err(e) => {
                if e.chain()
                    .any(|cause| cause.downcast_ref::<ReferenceOutOfRange>().is_some())
                {
                    return Err(e);
                }
                error!("Skipping locus {}: {e:#}", description.locus_id);
            }
        }
    }
    Ok(loci)
}

/// The main work of `STRider` happens in this `run` function.
/// It is meant to be called from inside a rayon parallel iterator.
/// Each thread owns the analyzers of its loci exclusively; only the
/// realigned-read sink is shared, and it serializes internally. For each
/// locus, we pull the read pairs near its target (and off-target) regions,
/// feed them through the analyzer, and finalize into findings. If anything
/// goes wrong for one locus, we log the error and continue to the next.
pub fn run(
    loci: &[LocusSpec],
    sex: Sex,
    heuristics: &HeuristicParameters,
    alignment_path: &str,
    reference_path: Option<&str>,
    sink: &dyn RealignedReadSink,
    tidx: usize,
) -> Result<Vec<LocusFindings>> {
    trace!("Launching thread {tidx}");

    let mut findings = Vec::with_capacity(loci.len());
    for locus in loci {
        let Some(allele_count) = locus.contig_copy_number.expected_allele_count(sex) else {
            debug!(
                "Skipping locus {}: contig is absent in this sample",
                locus.locus_id
            );
            continue;
        };

        let mut analyzer = LocusAnalyzer::new(locus, allele_count, heuristics, sink)?;

        let pairs = match io::bam::extract_read_pairs(alignment_path, reference_path, locus) {
            Ok(pairs) => pairs,
            Err(e) => {
                debug!("Error fetching reads, skipping locus {}: {e:?}", locus.locus_id);
                continue;
            }
        };

        for (read, mate) in pairs {
            if let Err(e) = analyzer.process_pair(read, mate) {
                debug!("Error processing a pair at locus {}: {e:?}", locus.locus_id);
            }
        }

        findings.push(analyzer.analyze());
    }

    trace!("Finished on thread {tidx}");
    Ok(findings)
}
