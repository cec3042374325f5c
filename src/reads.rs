//! # Reads
//!
//! The read representation the analyzers consume: a fragment id, a mate
//! number, the query bases, and where the pair was pulled from.
use std::fmt;

use crate::utils::reverse_complement;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MateNumber {
    First,
    Second,
}

/// Whether a pair was recruited from a target region of the locus or from
/// one of its off-target regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadProvenance {
    Target,
    Offtarget,
}

#[derive(Debug, Clone)]
pub struct Read {
    fragment_id: String,
    mate_number: MateNumber,
    sequence: String,
    is_reversed: bool,
    provenance: ReadProvenance,
}

impl Read {
    pub fn new(
        fragment_id: &str,
        mate_number: MateNumber,
        sequence: &str,
        is_reversed: bool,
        provenance: ReadProvenance,
    ) -> Self {
        Read {
            fragment_id: fragment_id.to_string(),
            mate_number,
            sequence: sequence.to_string(),
            is_reversed,
            provenance,
        }
    }

    pub fn fragment_id(&self) -> &str {
        &self.fragment_id
    }

    pub fn mate_number(&self) -> MateNumber {
        self.mate_number
    }

    pub fn is_first_mate(&self) -> bool {
        self.mate_number == MateNumber::First
    }

    pub fn sequence(&self) -> &str {
        &self.sequence
    }

    pub fn is_reversed(&self) -> bool {
        self.is_reversed
    }

    pub fn provenance(&self) -> ReadProvenance {
        self.provenance
    }

    /// Flips the read onto the other strand; every downstream consumer sees
    /// the flipped sequence.
    pub fn reverse_complement(&mut self) {
        self.sequence = reverse_complement(&self.sequence);
        self.is_reversed = !self.is_reversed;
    }
}

impl fmt::Display for Read {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mate = match self.mate_number {
            MateNumber::First => 1,
            MateNumber::Second => 2,
        };
        write!(f, "{}/{mate}", self.fragment_id)
    }
}
