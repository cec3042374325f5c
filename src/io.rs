//! # Input and output layers
//!
//! Catalog parsing, read-pair extraction from alignment files, findings
//! serialization, and the realigned-read sink.
use std::io::Write;
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::align::operations::GraphAlignment;

pub mod bam;
pub mod catalog;
pub mod output;

/// Sink for the realigned reads backing each reported genotype. Callers may
/// write from multiple threads; implementations serialize internally.
pub trait RealignedReadSink: Sync {
    #[allow(clippy::too_many_arguments)]
    fn write(
        &self,
        locus_id: &str,
        fragment_id: &str,
        sequence: &str,
        is_first_mate: bool,
        is_read_reversed: bool,
        is_mate_reversed: bool,
        alignment: &GraphAlignment,
    ) -> Result<()>;
}

/// Sink discarding all realigned reads.
pub struct NoOpRealignedReadSink;

impl RealignedReadSink for NoOpRealignedReadSink {
    fn write(
        &self,
        _locus_id: &str,
        _fragment_id: &str,
        _sequence: &str,
        _is_first_mate: bool,
        _is_read_reversed: bool,
        _is_mate_reversed: bool,
        _alignment: &GraphAlignment,
    ) -> Result<()> {
        Ok(())
    }
}

/// Tab-separated realigned-read log; one line per realigned mate.
pub struct TsvRealignedReadSink<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> TsvRealignedReadSink<W> {
    pub fn new(writer: W) -> Self {
        TsvRealignedReadSink {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().expect("Realigned-read sink was poisoned")
    }
}

impl<W: Write + Send> RealignedReadSink for TsvRealignedReadSink<W> {
    fn write(
        &self,
        locus_id: &str,
        fragment_id: &str,
        sequence: &str,
        is_first_mate: bool,
        is_read_reversed: bool,
        is_mate_reversed: bool,
        alignment: &GraphAlignment,
    ) -> Result<()> {
        let mate_number = if is_first_mate { 1 } else { 2 };
        let read_strand = if is_read_reversed { '-' } else { '+' };
        let mate_strand = if is_mate_reversed { '-' } else { '+' };
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("Realigned-read sink was poisoned"))?;
        writeln!(
            writer,
            "{locus_id}\t{fragment_id}/{mate_number}\t{read_strand}\t{mate_strand}\t{}\t{alignment}",
            sequence
        )
        .context("Could not write a realigned read")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::align::operations::decode_graph_alignment;
    use crate::graph::Graph;

    #[test]
    fn tsv_sink_renders_one_line_per_mate() {
        let mut graph = Graph::new(2);
        graph.set_node_sequence(0, "ACGT");
        graph.set_node_sequence(1, "TTTT");
        graph.add_edge(0, 1);
        let alignment = decode_graph_alignment(0, "0[4M]1[2M]", &graph).unwrap();

        let sink = TsvRealignedReadSink::new(Vec::new());
        sink.write("locus1", "frag9", "ACGTTT", true, false, true, &alignment)
            .unwrap();

        let written = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(
            "locus1\tfrag9/1\t+\t-\tACGTTT\t0[4M]1[2M]\n",
            written
        );
    }
}
