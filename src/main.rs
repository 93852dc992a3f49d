// ==============================================================================
// main.rs - Imputation QC Entry Point
// ==============================================================================
// Description: Command line entry point for VCF quality control and chunking
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-02-03
// Version: 2.0.0
// ==============================================================================

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use imputation_qc::models::GenomeBuild;
use imputation_qc::{EventLog, QcConfig, QualityControl, RefPanel};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input VCF files or directories (*.vcf, *.vcf.gz)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Reference panel descriptor (JSON)
    #[arg(short, long)]
    reference: PathBuf,

    /// Population id of the reference panel
    #[arg(short, long)]
    population: String,

    /// Genome build of the uploaded files (hg19 or hg38)
    #[arg(short, long, default_value = "hg19")]
    build: GenomeBuild,

    /// Chunk size in base pairs
    #[arg(long, default_value_t = 20_000_000)]
    chunksize: u64,

    /// Flank added on both sides of each chunk
    #[arg(long, default_value_t = 5_000_000)]
    phasing_window: u64,

    /// Directory receiving the chunk files
    #[arg(long, default_value = "chunks")]
    chunks_out: PathBuf,

    /// Directory receiving one chunk manifest per contig
    #[arg(long, default_value = "metafiles")]
    metafiles_out: PathBuf,

    /// Directory receiving the QC report tables
    #[arg(long, default_value = "statistics")]
    statistics_out: PathBuf,

    /// Allele frequency comparison table
    #[arg(long)]
    maf_output: Option<PathBuf>,

    /// JSON run report (events, counters, statistics, decision)
    #[arg(long)]
    report: Option<PathBuf>,

    /// Number of files processed in parallel
    #[arg(short, long, default_value_t = 1)]
    threads: usize,

    /// tabix binary used to index accepted chunks
    #[arg(long, env = "IMPUTATION_QC_TABIX")]
    tabix: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "imputation_qc=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    info!("Imputation QC starting...");

    let panel = RefPanel::load(&args.reference)?;

    let mut config = QcConfig::new(args.population.clone())
        .with_build(args.build)
        .with_chunk_size(args.chunksize)
        .with_phasing_window(args.phasing_window)
        .with_output_dirs(args.chunks_out, args.metafiles_out, args.statistics_out)
        .with_threads(args.threads);
    if let Some(maf) = args.maf_output {
        config = config.with_maf_file(maf);
    }
    if let Some(tabix) = args.tabix {
        config = config.with_tabix(tabix);
    }

    let log = Arc::new(EventLog::new());
    let qc = QualityControl::new(config, panel, log.clone());
    let outcome = qc.run(&args.inputs).await?;

    if let Some(report) = &args.report {
        log.write_json(report, &outcome)?;
    }

    println!("{}", outcome.decision.message());

    if !outcome.is_accepted() {
        warn!("QC rejected the uploaded data");
        std::process::exit(1);
    }

    info!(
        "QC passed: {} chunk(s) ready for imputation",
        outcome.statistics.remaining_chunks()
    );
    Ok(())
}
