//! # Reference sequence access
//!
//! Uppercase reference bases by half-open 0-based coordinates, either from
//! an indexed FASTA or from in-memory contigs.
use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use rust_htslib::faidx;

/// A catalog region pointing outside the reference. Surfaced as its own
/// type so callers can treat it as fatal rather than skipping the locus.
#[derive(Debug)]
pub struct ReferenceOutOfRange {
    pub interval: String,
}

impl fmt::Display for ReferenceOutOfRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Reference interval {} cannot be fetched", self.interval)
    }
}

impl std::error::Error for ReferenceOutOfRange {}

fn out_of_range(contig: &str, start: i64, end: i64) -> anyhow::Error {
    anyhow::Error::new(ReferenceOutOfRange {
        interval: format!("{contig}:{start}-{end}"),
    })
}

/// Read-only access to reference bases. Out-of-range requests are errors,
/// never silently truncated.
pub trait ReferenceSequence: Sync {
    fn sequence(&self, contig: &str, start: i64, end: i64) -> Result<String>;
}

/// Indexed FASTA reference; the `.fai` index must sit next to the FASTA.
pub struct FastaReference {
    reader: faidx::Reader,
}

impl FastaReference {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let reader = faidx::Reader::from_path(&path).with_context(|| {
            format!("Could not open reference FASTA {}", path.as_ref().display())
        })?;
        Ok(FastaReference { reader })
    }
}

impl ReferenceSequence for FastaReference {
    fn sequence(&self, contig: &str, start: i64, end: i64) -> Result<String> {
        if start < 0 || end < start {
            return Err(out_of_range(contig, start, end));
        }
        if end == start {
            return Ok(String::new());
        }
        let bases = self
            .reader
            .fetch_seq(contig, start as usize, end as usize - 1)
            .map_err(|_| out_of_range(contig, start, end))?;
        if bases.len() as i64 != end - start {
            return Err(out_of_range(contig, start, end));
        }
        Ok(String::from_utf8_lossy(bases).to_ascii_uppercase())
    }
}

/// Contigs held in memory; the test and catalog-compilation backend.
pub struct InMemoryReference {
    contigs: Vec<(String, String)>,
}

impl InMemoryReference {
    pub fn new(contigs: Vec<(String, String)>) -> Self {
        InMemoryReference { contigs }
    }
}

impl ReferenceSequence for InMemoryReference {
    fn sequence(&self, contig: &str, start: i64, end: i64) -> Result<String> {
        let Some((_, bases)) = self.contigs.iter().find(|(name, _)| name == contig) else {
            return Err(out_of_range(contig, start, end));
        };
        if start < 0 || end < start || end > bases.len() as i64 {
            return Err(out_of_range(contig, start, end));
        }
        Ok(bases[start as usize..end as usize].to_ascii_uppercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_lookups_are_half_open() {
        let reference = InMemoryReference::new(vec![("chr1".to_string(), "acgtACGT".to_string())]);
        assert_eq!("GTAC", reference.sequence("chr1", 2, 6).unwrap());
        assert_eq!("", reference.sequence("chr1", 4, 4).unwrap());
    }

    #[test]
    fn out_of_range_lookups_fail_loudly() {
        let reference = InMemoryReference::new(vec![("chr1".to_string(), "ACGT".to_string())]);
        assert!(reference.sequence("chr1", 2, 6).is_err());
        assert!(reference.sequence("chr1", -1, 2).is_err());

        let error = reference.sequence("chr2", 0, 2).unwrap_err();
        assert!(error.is::<ReferenceOutOfRange>());
    }
}
