//! # Read-pair extraction
//!
//! Pulls primary read pairs overlapping a locus' target and off-target
//! regions out of an indexed BAM/CRAM file.
use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use log::debug;
use rust_htslib::bam::{self, Read as BamRead};

use crate::locus::{GenomicRegion, LocusSpec};
use crate::reads::{MateNumber, Read, ReadProvenance};

/// Collects the read pairs of one locus, target regions first. Mates are
/// matched by fragment name; fragments whose mate never shows up inside the
/// fetched regions are dropped.
pub fn extract_read_pairs(
    alignment_path: &str,
    reference_path: Option<&str>,
    locus: &LocusSpec,
) -> Result<Vec<(Read, Read)>> {
    let mut reader = bam::IndexedReader::from_path(alignment_path)
        .with_context(|| format!("Could not open alignment file {alignment_path}"))?;
    if let Some(reference) = reference_path {
        reader
            .set_reference(reference)
            .with_context(|| format!("Could not attach reference {reference}"))?;
    }

    let mut pairs = Vec::new();
    let mut collector = PairCollector::new();
    collect_regions(
        &mut reader,
        &locus.target_regions,
        ReadProvenance::Target,
        &mut collector,
        &mut pairs,
    )?;
    collect_regions(
        &mut reader,
        &locus.offtarget_regions,
        ReadProvenance::Offtarget,
        &mut collector,
        &mut pairs,
    )?;

    if collector.num_unpaired() > 0 {
        debug!(
            "Dropping {} mateless reads near locus {}",
            collector.num_unpaired(),
            locus.locus_id
        );
    }

    Ok(pairs)
}

fn collect_regions(
    reader: &mut bam::IndexedReader,
    regions: &[GenomicRegion],
    provenance: ReadProvenance,
    collector: &mut PairCollector,
    pairs: &mut Vec<(Read, Read)>,
) -> Result<()> {
    for region in regions {
        let fetch_start = region.start.max(0);
        if reader
            .fetch((region.contig.as_str(), fetch_start, region.end))
            .is_err()
        {
            debug!("Could not fetch reads from {region}");
            continue;
        }

        let mut record = bam::Record::new();
        while let Some(result) = reader.read(&mut record) {
            result.with_context(|| format!("Encountered a faulty read in {region}"))?;
            if record.is_duplicate()
                || record.is_secondary()
                || record.is_supplementary()
                || record.is_quality_check_failed()
                || record.is_unmapped()
            {
                continue;
            }

            let fragment_id = String::from_utf8_lossy(record.qname()).to_string();
            let mate_number = if record.is_first_in_template() {
                MateNumber::First
            } else {
                MateNumber::Second
            };
            let sequence =
                String::from_utf8_lossy(&record.seq().as_bytes()).to_ascii_uppercase();
            let read = Read::new(
                &fragment_id,
                mate_number,
                &sequence,
                record.is_reverse(),
                provenance,
            );

            if let Some(pair) = collector.add(read) {
                pairs.push(pair);
            }
        }
    }
    Ok(())
}

struct PairCollector {
    pending: HashMap<String, Read>,
    completed: HashSet<String>,
}

impl PairCollector {
    fn new() -> Self {
        PairCollector {
            pending: HashMap::new(),
            completed: HashSet::new(),
        }
    }

    /// Returns the completed pair, first mate first, once both mates have
    /// been seen. Re-fetched fragments are ignored.
    fn add(&mut self, read: Read) -> Option<(Read, Read)> {
        let fragment_id = read.fragment_id().to_string();
        if self.completed.contains(&fragment_id) {
            return None;
        }

        match self.pending.remove(&fragment_id) {
            None => {
                self.pending.insert(fragment_id, read);
                None
            }
            Some(stored) if stored.mate_number() == read.mate_number() => {
                self.pending.insert(fragment_id, stored);
                None
            }
            Some(stored) => {
                self.completed.insert(fragment_id);
                if stored.is_first_mate() {
                    Some((stored, read))
                } else {
                    Some((read, stored))
                }
            }
        }
    }

    fn num_unpaired(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_read(fragment: &str, mate: MateNumber) -> Read {
        Read::new(fragment, mate, "ACGT", false, ReadProvenance::Target)
    }

    #[test]
    fn mates_pair_up_by_fragment_id() {
        let mut collector = PairCollector::new();
        assert!(collector.add(make_read("frag1", MateNumber::Second)).is_none());
        assert!(collector.add(make_read("frag2", MateNumber::First)).is_none());

        let (first, second) = collector.add(make_read("frag1", MateNumber::First)).unwrap();
        assert!(first.is_first_mate());
        assert_eq!("frag1", second.fragment_id());
        assert_eq!(1, collector.num_unpaired());
    }

    #[test]
    fn refetched_fragments_are_ignored() {
        let mut collector = PairCollector::new();
        collector.add(make_read("frag1", MateNumber::First));
        collector.add(make_read("frag1", MateNumber::Second)).unwrap();

        assert!(collector.add(make_read("frag1", MateNumber::First)).is_none());
        assert!(collector.add(make_read("frag1", MateNumber::Second)).is_none());
        assert_eq!(0, collector.num_unpaired());
    }

    #[test]
    fn duplicate_mate_records_do_not_pair() {
        let mut collector = PairCollector::new();
        collector.add(make_read("frag1", MateNumber::First));
        assert!(collector.add(make_read("frag1", MateNumber::First)).is_none());
        assert_eq!(1, collector.num_unpaired());
    }
}
