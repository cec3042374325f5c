//! # Command line interface for `STRider`
use anyhow::{bail, Context, Result};
use clap::Parser;
use log::info;

use crate::utils;

#[derive(Parser)]
#[command(
    name = "STRider",
    author,
    version,
    about = "Graph-based genotyping of short tandem repeats and small variants",
    long_about = None
)]
pub struct Cli {
    /// Locus catalog describing the repeat regions to genotype. Expected format is JSON
    #[arg(short, long)]
    pub catalog: String,

    /// Input file to genotype repeats from. Can be BAM or CRAM, position-sorted and indexed
    #[arg(short, long)]
    pub alignment: String,

    /// Reference genome. Expected format is FASTA, index file should exist right next to FASTA. Required if alignment is in CRAM format
    #[arg(short, long)]
    pub reference: String,

    /// Output path for the findings JSON; stdout when omitted
    #[arg(short, long)]
    pub output: Option<String>,

    /// Output path for a realigned-reads TSV
    #[arg(long)]
    pub realigned: Option<String>,

    /// Sample sex, used to pick per-contig allele counts
    #[arg(long, default_value = "female", value_parser = sex_from_name)]
    pub sex: crate::karyotype::Sex,

    /// Sample name
    #[arg(long)]
    pub sample: Option<String>,

    /// Read-to-graph aligner to use
    #[arg(long, default_value = "dag-aligner", value_parser = aligner_from_name)]
    pub aligner: crate::align::AlignerKind,

    /// Length of reference flank attached on each side of a locus structure
    #[arg(long, default_value_t = crate::locus::DEFAULT_FLANK_LENGTH)]
    pub flank_length: i64,

    /// Number of threads to use
    #[arg(long, default_value_t = 1, value_parser = threads_in_range)]
    pub threads: usize,
}

impl Cli {
    pub fn get_sample_name(&self) -> Result<String> {
        if let Some(name) = &self.sample {
            return Ok(name.clone());
        }
        let name = utils::sample_name_from_path(&self.alignment)?;
        info!("Inferring sample name from filename: {name}");
        Ok(name)
    }
}

fn sex_from_name(name: &str) -> Result<crate::karyotype::Sex> {
    name.parse()
}

fn aligner_from_name(name: &str) -> Result<crate::align::AlignerKind> {
    name.parse()
}

fn threads_in_range(s: &str) -> Result<usize> {
    let threads = s
        .parse()
        .context("Could not parse value passed to --threads to integer")?;
    if threads < 1 {
        bail!("--threads must be at least 1");
    }
    Ok(threads)
}
