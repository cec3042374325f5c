use std::fs::File;
use std::io::{self, BufWriter, Write};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;

use strider::align::HeuristicParameters;
use strider::cli::Cli;
use strider::findings::LocusFindings;
use strider::io::{
    catalog::read_catalog, output::write_findings, NoOpRealignedReadSink, RealignedReadSink,
    TsvRealignedReadSink,
};
use strider::reference::FastaReference;
use strider::{compile_catalog, run};

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let sample_name = cli.get_sample_name()?;

    let descriptions = read_catalog(&cli.catalog)?;
    info!("Read {} locus descriptions", descriptions.len());

    let reference = FastaReference::open(&cli.reference)?;
    let loci = compile_catalog(&reference, &descriptions, cli.flank_length)?;
    info!("Compiled {} loci", loci.len());

    let heuristics = HeuristicParameters {
        aligner_kind: cli.aligner,
        ..HeuristicParameters::default()
    };

    let realigned_sink: Box<dyn RealignedReadSink> = match &cli.realigned {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Could not create realigned-read output {path}"))?;
            Box::new(TsvRealignedReadSink::new(BufWriter::new(file)))
        }
        None => Box::new(NoOpRealignedReadSink),
    };

    info!("Launching {} thread(s) for genotyping", cli.threads);
    ThreadPoolBuilder::new()
        .num_threads(cli.threads)
        .build_global()
        .context("Could not initialize the thread pool")?;

    let chunk_size = loci.len() / cli.threads + 1;
    let mut findings: Vec<LocusFindings> = loci
        .par_chunks(chunk_size)
        .enumerate()
        .map(|(tidx, chunk)| {
            run(
                chunk,
                cli.sex,
                &heuristics,
                &cli.alignment,
                Some(cli.reference.as_str()),
                realigned_sink.as_ref(),
                tidx,
            )
        })
        .collect::<Result<Vec<_>>>()?
        .into_iter()
        .flatten()
        .collect();
    findings.sort_by(|a, b| a.locus_id.cmp(&b.locus_id));

    match &cli.output {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Could not create output file {path}"))?;
            let mut writer = BufWriter::new(file);
            write_findings(&mut writer, &sample_name, cli.sex, &findings)?;
            writer.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut writer = stdout.lock();
            write_findings(&mut writer, &sample_name, cli.sex, &findings)?;
        }
    }

    Ok(())
}
