// ==============================================================================
// processor.rs - QC Run Orchestration
// ==============================================================================
// Description: Inspects, chunks and evaluates a cohort of VCF files
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-02-10
// Version: 3.0.0
// ==============================================================================
// Pipeline:
//   1. Configuration, population and build checks (fail before any input is read)
//   2. Input expansion and whole-file inspection
//   3. One blocking worker per file (chrX split, chunking, report fragment)
//   4. Statistics merge, report merge, aggregate decision
// ==============================================================================

use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::chrx::{ChrXPreprocessor, CHRX_LEGEND_CHROMOSOME};
use crate::chunker::{process_stream, ChunkingSettings, StreamInput};
use crate::classifier::VariantClassifier;
use crate::decision::{decide, QcDecision};
use crate::error::QcError;
use crate::models::{GenomeBuild, QcThresholds, RangeEntry};
use crate::output::QcReports;
use crate::parsers::LegendReader;
use crate::reference_panel::RefPanel;
use crate::reporter::Reporter;
use crate::statistics::{format_count, QcStatistics};
use crate::validator::{inspect_vcf, VcfFileInfo};

/// Engine configuration of a QC run
#[derive(Debug, Clone)]
pub struct QcConfig {
    pub chunk_size: u64,
    pub phasing_window: u64,
    /// Build of the uploaded files
    pub build: GenomeBuild,
    pub population: String,
    pub chunks_dir: PathBuf,
    pub metafiles_dir: PathBuf,
    pub statistics_dir: PathBuf,
    /// Allele frequency table, written only when the population has reference samples
    pub maf_file: Option<PathBuf>,
    /// Files processed in parallel
    pub threads: usize,
    pub tabix: Option<PathBuf>,
}

impl Default for QcConfig {
    fn default() -> Self {
        Self {
            chunk_size: 20_000_000,
            phasing_window: 5_000_000,
            build: GenomeBuild::Hg19,
            population: "eur".to_string(),
            chunks_dir: PathBuf::from("chunks"),
            metafiles_dir: PathBuf::from("metafiles"),
            statistics_dir: PathBuf::from("statistics"),
            maf_file: None,
            threads: 1,
            tabix: None,
        }
    }
}

impl QcConfig {
    pub fn new(population: impl Into<String>) -> Self {
        Self {
            population: population.into(),
            ..Default::default()
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: u64) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_phasing_window(mut self, phasing_window: u64) -> Self {
        self.phasing_window = phasing_window;
        self
    }

    pub fn with_build(mut self, build: GenomeBuild) -> Self {
        self.build = build;
        self
    }

    /// Chunk, manifest and statistics output directories
    pub fn with_output_dirs(
        mut self,
        chunks_dir: impl Into<PathBuf>,
        metafiles_dir: impl Into<PathBuf>,
        statistics_dir: impl Into<PathBuf>,
    ) -> Self {
        self.chunks_dir = chunks_dir.into();
        self.metafiles_dir = metafiles_dir.into();
        self.statistics_dir = statistics_dir.into();
        self
    }

    pub fn with_maf_file(mut self, maf_file: impl Into<PathBuf>) -> Self {
        self.maf_file = Some(maf_file.into());
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_tabix(mut self, tabix: impl Into<PathBuf>) -> Self {
        self.tabix = Some(tabix.into());
        self
    }

    pub fn validate(&self) -> Result<(), QcError> {
        if self.threads == 0 {
            return Err(QcError::Config("threads must be at least 1".to_string()));
        }
        if self.population.trim().is_empty() {
            return Err(QcError::Config("population must not be empty".to_string()));
        }
        self.chunking_settings(QcThresholds::default(), 0).validate()
    }

    fn chunking_settings(&self, thresholds: QcThresholds, reference_samples: u64) -> ChunkingSettings {
        ChunkingSettings {
            chunk_size: self.chunk_size,
            phasing_window: self.phasing_window,
            chunks_dir: self.chunks_dir.clone(),
            metafiles_dir: self.metafiles_dir.clone(),
            thresholds,
            reference_samples,
            tabix: self.tabix.clone(),
        }
    }
}

/// Converts uploaded files between genome builds
pub trait LiftOver: Send + Sync {
    /// Lift every input from one build to another
    ///
    /// # Returns
    /// * Replacement input files, in the same order
    fn lift(&self, inputs: &[PathBuf], from: GenomeBuild, to: GenomeBuild) -> Result<Vec<PathBuf>>;
}

/// Result of a completed QC pass
#[derive(Debug, Clone, Serialize)]
pub struct QcOutcome {
    pub statistics: QcStatistics,
    pub decision: QcDecision,
    pub files: Vec<VcfFileInfo>,
}

impl QcOutcome {
    pub fn is_accepted(&self) -> bool {
        self.decision.is_accepted()
    }
}

/// Everything a worker shares with the others
struct WorkerContext {
    settings: ChunkingSettings,
    classifier: VariantClassifier,
    panel: Arc<RefPanel>,
    population: String,
    build: GenomeBuild,
    statistics_dir: PathBuf,
    with_maf: bool,
}

/// QC run over a cohort of VCF files
pub struct QualityControl {
    config: QcConfig,
    panel: Arc<RefPanel>,
    reporter: Arc<dyn Reporter>,
    liftover: Option<Arc<dyn LiftOver>>,
}

impl QualityControl {
    pub fn new(config: QcConfig, panel: RefPanel, reporter: Arc<dyn Reporter>) -> Self {
        Self {
            config,
            panel: Arc::new(panel),
            reporter,
            liftover: None,
        }
    }

    pub fn with_liftover(mut self, liftover: Arc<dyn LiftOver>) -> Self {
        self.liftover = Some(liftover);
        self
    }

    /// Run the complete QC pass
    ///
    /// # Arguments
    /// * `inputs` - VCF files or directories containing them
    ///
    /// # Returns
    /// * `Ok(QcOutcome)` - Statistics and decision; a rejected cohort is still `Ok`
    /// * `Err` - Configuration, input or output failure that aborted the run
    pub async fn run(&self, inputs: &[PathBuf]) -> Result<QcOutcome> {
        let config = &self.config;
        config.validate()?;

        if let Err(e) = self.panel.check_population(&config.population) {
            self.reporter.error(&e.to_string());
            return Err(e.into());
        }

        let thresholds = self.panel.thresholds()?;
        let ranges = self.panel.ranges()?;

        let reference_samples = self.panel.samples_by_population(&config.population);
        if reference_samples <= 0 {
            self.reporter.warn("Skip allele frequency check.");
        }
        let reference_samples = reference_samples.max(0) as u64;

        self.reporter.info(&ranges_message(&ranges));

        let mut inputs = expand_inputs(inputs)?;
        if inputs.is_empty() {
            anyhow::bail!("No VCF files found in the provided input");
        }

        if config.build != self.panel.build {
            self.reporter.warn(&format!(
                "Uploaded data is {} and reference is {}.",
                config.build, self.panel.build
            ));

            match &self.liftover {
                Some(liftover) => {
                    inputs = liftover
                        .lift(&inputs, config.build, self.panel.build)
                        .context("LiftOver failed")?;
                }
                None => {
                    let message = format!(
                        "Currently we do not support liftOver from {} to {}",
                        config.build, self.panel.build
                    );
                    self.reporter.error(&message);
                    anyhow::bail!(message);
                }
            }
        }

        for dir in [&config.chunks_dir, &config.metafiles_dir, &config.statistics_dir] {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create output directory {:?}", dir))?;
        }

        let files = inspect_inputs(&inputs).await?;
        check_distinct_chromosomes(&files)?;

        let with_maf = reference_samples > 0 && config.maf_file.is_some();
        let context = Arc::new(WorkerContext {
            settings: config.chunking_settings(thresholds.clone(), reference_samples),
            classifier: VariantClassifier::new(config.phasing_window).with_ranges(ranges.clone()),
            panel: Arc::clone(&self.panel),
            population: config.population.clone(),
            build: self.panel.build,
            statistics_dir: config.statistics_dir.clone(),
            with_maf,
        });

        let worker_stats = self.run_workers(&context, &files).await?;

        let mut statistics = QcStatistics::default();
        let mut reports = QcReports::new(
            &config.statistics_dir,
            config.maf_file.as_deref().filter(|_| with_maf),
        );
        for (index, stats) in worker_stats.iter().enumerate() {
            statistics += stats;
            reports.merge_fragment(&QcReports::fragment_dir(&config.statistics_dir, index))?;
        }
        reports.flush()?;

        let decision = decide(&statistics, &thresholds, &ranges);
        self.report(&statistics, &decision);

        Ok(QcOutcome {
            statistics,
            decision,
            files,
        })
    }

    /// One blocking task per file, at most `threads` at a time
    async fn run_workers(
        &self,
        context: &Arc<WorkerContext>,
        files: &[VcfFileInfo],
    ) -> Result<Vec<QcStatistics>> {
        let semaphore = Arc::new(Semaphore::new(self.config.threads));
        let mut tasks = JoinSet::new();

        for (index, file) in files.iter().cloned().enumerate() {
            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .context("Worker pool closed")?;
            let context = Arc::clone(context);

            tasks.spawn_blocking(move || {
                let _permit = permit;
                (index, process_file(&context, index, &file))
            });
        }

        let mut results: Vec<Option<QcStatistics>> = vec![None; files.len()];
        while let Some(joined) = tasks.join_next().await {
            let (index, result) = joined.context("QC worker panicked")?;
            match result {
                Ok(stats) => results[index] = Some(stats),
                Err(e) => {
                    tasks.abort_all();
                    let path = files.get(index).map(|f| f.path.display().to_string());
                    self.reporter.error(&e.to_string());
                    return Err(anyhow::Error::new(e)
                        .context(format!("QC failed for {}", path.unwrap_or_default())));
                }
            }
        }

        Ok(results.into_iter().flatten().collect())
    }

    fn report(&self, statistics: &QcStatistics, decision: &QcDecision) {
        let counters = [
            ("alternativeAlleles", statistics.alternative_alleles),
            ("filtered", statistics.filtered),
            ("remainingSnps", statistics.overall_snps),
            ("typedOnly", statistics.not_found_in_legend),
            ("overallChunks", statistics.overall_chunks),
            ("excludedChunks", statistics.excluded_chunks()),
            ("remainingChunks", statistics.remaining_chunks()),
        ];
        for (name, value) in counters {
            self.reporter.counter(name, value as i64);
        }

        if !decision.is_accepted() {
            self.reporter.error(&decision.message());
        } else if statistics.excluded_chunks() > 0 {
            self.reporter.warn(&decision.message());
        } else {
            self.reporter.info(&decision.message());
        }

        info!(
            "QC finished: {} remaining sites, {} of {} chunks remaining",
            format_count(statistics.overall_snps),
            statistics.remaining_chunks(),
            statistics.overall_chunks
        );
    }
}

fn ranges_message(ranges: &[RangeEntry]) -> String {
    if ranges.is_empty() {
        "Reference Panel Ranges: genome-wide".to_string()
    } else {
        let ranges: Vec<String> = ranges.iter().map(|r| r.to_string()).collect();
        format!("Reference Panel Ranges: {}", ranges.join(","))
    }
}

fn is_vcf_file(path: &Path) -> bool {
    let name = path.to_string_lossy();
    name.ends_with(".vcf") || name.ends_with(".vcf.gz")
}

/// Replace directories by their VCF files and sort everything by path
pub fn expand_inputs(inputs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    for input in inputs {
        if input.is_dir() {
            for entry in WalkDir::new(input).follow_links(true) {
                let entry = entry.with_context(|| format!("Failed to read directory {:?}", input))?;
                if entry.file_type().is_file() && is_vcf_file(entry.path()) {
                    files.push(entry.into_path());
                }
            }
        } else if input.exists() {
            files.push(input.clone());
        } else {
            anyhow::bail!("Input file not found: {:?}", input);
        }
    }

    files.sort();
    files.dedup();
    Ok(files)
}

/// Inspect every input on the blocking pool, keeping input order
async fn inspect_inputs(inputs: &[PathBuf]) -> Result<Vec<VcfFileInfo>> {
    let mut tasks = JoinSet::new();
    for (index, path) in inputs.iter().cloned().enumerate() {
        tasks.spawn_blocking(move || (index, inspect_vcf(&path)));
    }

    let mut files: Vec<Option<VcfFileInfo>> = vec![None; inputs.len()];
    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.context("File inspection panicked")?;
        let info = result.with_context(|| format!("Invalid VCF file {:?}", inputs[index]))?;
        files[index] = Some(info);
    }

    Ok(files.into_iter().flatten().collect())
}

/// Two files of one chromosome would write the same chunk files
fn check_distinct_chromosomes(files: &[VcfFileInfo]) -> Result<(), QcError> {
    let mut seen = HashSet::new();
    for file in files {
        if !seen.insert(file.chromosome.as_str()) {
            return Err(QcError::Config(format!(
                "Chromosome {} is provided by more than one file",
                file.chromosome
            )));
        }
    }
    Ok(())
}

/// Worker body: chunk one inspected file against its legend
fn process_file(
    context: &WorkerContext,
    index: usize,
    file: &VcfFileInfo,
) -> Result<QcStatistics, QcError> {
    let mut stats = QcStatistics::default();
    let mut reports = QcReports::fragment(&context.statistics_dir, index, context.with_maf)?;

    let legend_chromosome = if file.chr_x {
        CHRX_LEGEND_CHROMOSOME.to_string()
    } else {
        file.chromosome.clone()
    };

    let legend_path = context.panel.legend_path(&legend_chromosome);
    if !legend_path.exists() {
        return Err(QcError::UnsupportedChromosome {
            chromosome: legend_chromosome,
            path: legend_path.display().to_string(),
        });
    }
    let mut legend = LegendReader::open(&legend_path, &context.population)?;

    if file.chr_x {
        // removed on drop, also when a split fails to process
        let scratch = tempfile::Builder::new()
            .prefix(&format!(".chrX-{}-", index))
            .tempdir_in(&context.settings.chunks_dir)?;
        let mut preprocessor =
            ChrXPreprocessor::new(context.build, context.settings.thresholds.mixed_genotypes_chrx);
        let splits = preprocessor.split(&file.path, scratch.path(), &mut stats, &mut reports)?;

        for split in &splits {
            let info = inspect_vcf(&split.path)?;
            let input = StreamInput {
                path: split.path.clone(),
                contig: split.region.contig().to_string(),
                legend_chromosome: legend_chromosome.clone(),
                phased: info.phased,
            };
            process_stream(
                &context.settings,
                &context.classifier,
                &input,
                &mut legend,
                &mut stats,
                &mut reports,
            )?;
        }

        scratch.close()?;
    } else {
        let input = StreamInput {
            path: file.path.clone(),
            contig: file.contig.clone(),
            legend_chromosome,
            phased: file.phased,
        };
        process_stream(
            &context.settings,
            &context.classifier,
            &input,
            &mut legend,
            &mut stats,
            &mut reports,
        )?;
    }

    reports.flush()?;
    debug!(
        "Worker {} finished {:?}: {} chunks, {} remaining sites",
        index, file.path, stats.overall_chunks, stats.overall_snps
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::ManifestEntry;
    use crate::decision::RejectionReason;
    use crate::output::{CHRX_INFO_FILE, EXCLUDED_SNPS_FILE};
    use crate::parsers::legend::testing::write_indexed_legend;
    use crate::reporter::EventLog;
    use tempfile::TempDir;

    const VCF_HEADER: &str =
        "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\n";
    const LEGEND_HEADER: &str = "#CHROM\tPOS\tID\tREF\tALT\tAAF_EUR\n";

    struct Workspace {
        dir: TempDir,
    }

    impl Workspace {
        fn new() -> Self {
            Self {
                dir: TempDir::new().unwrap(),
            }
        }

        fn path(&self, name: &str) -> PathBuf {
            self.dir.path().join(name)
        }

        /// Legend rows A/G at the given positions
        fn legend(&self, chromosome: &str, positions: &[u64]) {
            std::fs::create_dir_all(self.path("legends")).unwrap();
            let mut text = LEGEND_HEADER.to_string();
            for p in positions {
                text.push_str(&format!("{}\t{}\trs{}\tA\tG\t0.3\n", chromosome, p, p));
            }
            write_indexed_legend(&self.path(&format!("legends/chr{}.legend.gz", chromosome)), &text);
        }

        fn panel(&self, build: &str, filters: &str) -> RefPanel {
            let json = format!(
                r#"{{
                    "id": "test-panel",
                    "build": "{}",
                    "genotypes": "m3vcfs/chr$chr.m3vcf.gz",
                    "legend": "{}/legends/chr$chr.legend.gz",
                    "populations": [ {{ "id": "eur", "name": "EUR", "samples": 100 }},
                                     {{ "id": "mixed", "name": "Mixed", "samples": -1 }} ],
                    "qcFilter": {{ {} }}
                }}"#,
                build,
                self.dir.path().display(),
                filters
            );
            RefPanel::from_json(&json).unwrap()
        }

        fn vcf(&self, name: &str, rows: &[String]) -> PathBuf {
            std::fs::create_dir_all(self.path("input")).unwrap();
            let path = self.path(&format!("input/{}", name));
            let mut text = VCF_HEADER.to_string();
            for row in rows {
                text.push_str(row);
                text.push('\n');
            }
            std::fs::write(&path, text).unwrap();
            path
        }

        fn config(&self) -> QcConfig {
            QcConfig::new("eur")
                .with_chunk_size(1000)
                .with_phasing_window(100)
                .with_output_dirs(self.path("chunks"), self.path("metafiles"), self.path("statistics"))
                .with_maf_file(self.path("statistics/maf.txt"))
        }

        /// Leftover chrX split directories in the chunks directory
        fn scratch_dirs(&self) -> Vec<PathBuf> {
            std::fs::read_dir(self.path("chunks"))
                .unwrap()
                .map(|e| e.unwrap().path())
                .filter(|p| p.file_name().unwrap().to_string_lossy().starts_with(".chrX-"))
                .collect()
        }

        fn manifest(&self, contig: &str) -> Vec<ManifestEntry> {
            std::fs::read_to_string(self.path(&format!("metafiles/{}", contig)))
                .unwrap()
                .lines()
                .map(|l| l.parse().unwrap())
                .collect()
        }
    }

    fn snp(chromosome: &str, position: u64, genotypes: &str) -> String {
        format!(
            "{}\t{}\trs{}\tA\tG\t.\tPASS\t.\tGT\t{}",
            chromosome, position, position, genotypes
        )
    }

    fn quality_control(config: QcConfig, panel: RefPanel) -> (QualityControl, Arc<EventLog>) {
        let log = Arc::new(EventLog::new());
        let qc = QualityControl::new(config, panel, log.clone());
        (qc, log)
    }

    #[tokio::test]
    async fn test_accepted_run() {
        let ws = Workspace::new();
        let positions: Vec<u64> = (1..=10).map(|i| i * 50).collect();
        ws.legend("20", &positions);

        let mut rows: Vec<String> = positions.iter().map(|&p| snp("20", p, "0|1\t0|0")).collect();
        // typed-only and monomorphic sites
        rows.push(snp("20", 600, "0|1\t0|0"));
        rows.push(snp("20", 650, "0|0\t0|0"));
        rows.sort_by_key(|r| r.split('\t').nth(1).unwrap().parse::<u64>().unwrap());
        let input = ws.vcf("chr20.vcf", &rows);

        let (qc, log) = quality_control(ws.config(), ws.panel("hg19", ""));
        let outcome = qc.run(&[input]).await.unwrap();

        assert!(outcome.is_accepted(), "{}", outcome.decision.message());
        assert_eq!(outcome.statistics.overall_snps, 10);
        assert_eq!(outcome.statistics.not_found_in_legend, 1);
        assert_eq!(outcome.statistics.monomorphic, 1);
        assert_eq!(outcome.statistics.overall_chunks, 1);
        assert_eq!(outcome.files.len(), 1);

        let manifest = ws.manifest("20");
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].snps, 10);
        assert!(manifest[0].phased);
        assert!(manifest[0].path.exists());

        assert!(ws.path("statistics").join(EXCLUDED_SNPS_FILE).exists());
        assert!(ws.path("statistics/maf.txt").exists());
        assert!(!QcReports::fragment_dir(&ws.path("statistics"), 0).exists());

        assert_eq!(log.counter_value("remainingSnps"), 10);
        let events = log.events();
        assert!(events
            .iter()
            .any(|e| e.message == "Reference Panel Ranges: genome-wide"));
        assert!(events
            .iter()
            .any(|e| e.message.contains("Remaining sites in total: 10")));
    }

    #[tokio::test]
    async fn test_no_chunk_passes() {
        let ws = Workspace::new();
        ws.legend("20", &[50, 100]);
        let input = ws.vcf(
            "chr20.vcf",
            &[snp("20", 50, "0|1\t0|0"), snp("20", 100, "0|1\t0|0")],
        );

        let (qc, log) = quality_control(ws.config(), ws.panel("hg19", ""));
        let outcome = qc.run(&[input]).await.unwrap();

        assert_eq!(outcome.decision.rejection, Some(RejectionReason::NoChunksPassed));
        assert_eq!(outcome.statistics.removed_chunks_snps, 1);
        assert!(ws.manifest("20").is_empty());
        assert!(log
            .events()
            .iter()
            .any(|e| e.message.ends_with("No chunks passed QC. Imputation cannot be started!")));
    }

    #[tokio::test]
    async fn test_parallel_files_merge_in_order() {
        let ws = Workspace::new();
        let positions: Vec<u64> = (1..=5).map(|i| i * 10).collect();
        ws.legend("1", &positions);
        ws.legend("2", &positions);

        for chromosome in ["1", "2"] {
            let mut rows: Vec<String> = positions
                .iter()
                .map(|&p| snp(chromosome, p, "0|1\t0|0"))
                .collect();
            rows.push(format!("{}\t60\trs60\tA\tG\t.\tLowQual\t.\tGT\t0|1\t0|0", chromosome));
            ws.vcf(&format!("chr{}.vcf", chromosome), &rows);
        }

        let (qc, _) = quality_control(ws.config().with_threads(2), ws.panel("hg19", ""));
        let outcome = qc.run(&[ws.path("input")]).await.unwrap();

        assert!(outcome.is_accepted());
        assert_eq!(outcome.files.len(), 2);
        assert_eq!(outcome.files[0].chromosome, "1");
        assert_eq!(outcome.statistics.overall_snps, 10);
        assert_eq!(outcome.statistics.filter_flag, 2);

        let text = std::fs::read_to_string(ws.path("statistics").join(EXCLUDED_SNPS_FILE)).unwrap();
        let rows: Vec<&str> = text.lines().collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].starts_with("rs60\t1\t60"));
        assert!(rows[2].starts_with("rs60\t2\t60"));
    }

    #[tokio::test]
    async fn test_chrx_run() {
        let ws = Workspace::new();
        let par1: Vec<u64> = (1..=5).map(|i| 100_000 + i).collect();
        let non_par: Vec<u64> = (1..=5).map(|i| 3_000_000 + i).collect();
        let positions: Vec<u64> = par1.iter().chain(non_par.iter()).copied().collect();
        ws.legend("X", &positions);

        let mut rows: Vec<String> = par1.iter().map(|&p| snp("X", p, "0|1\t0|1")).collect();
        rows.push(snp("X", non_par[0], "1\t0|1"));
        for &p in &non_par[1..] {
            rows.push(snp("X", p, "0|1\t0|1"));
        }
        let input = ws.vcf("chrX.vcf", &rows);

        let config = ws.config().with_chunk_size(10_000_000).with_phasing_window(1_000_000);
        let (qc, _) = quality_control(config, ws.panel("hg19", ""));
        let outcome = qc.run(&[input]).await.unwrap();

        assert!(outcome.files[0].chr_x);
        assert_eq!(ws.manifest("X.PAR1").len(), 1);
        assert_eq!(ws.manifest("X.nonPAR").len(), 1);
        assert!(!ws.path("metafiles/X.PAR2").exists());
        assert!(ws.scratch_dirs().is_empty());

        // S1 turns diploid after a haploid call
        assert!(outcome.statistics.chrx_ploidy_error);
        assert_eq!(outcome.decision.rejection, Some(RejectionReason::ChrXPloidy));
        let info = std::fs::read_to_string(ws.path("statistics").join(CHRX_INFO_FILE)).unwrap();
        assert_eq!(info.lines().count(), 5);
    }

    #[tokio::test]
    async fn test_chrx_failure_removes_split_files() {
        let ws = Workspace::new();
        let non_par: Vec<u64> = (1..=5).map(|i| 3_000_000 + i).collect();

        // the frequency of the third site does not parse
        std::fs::create_dir_all(ws.path("legends")).unwrap();
        let mut text = LEGEND_HEADER.to_string();
        for (i, p) in non_par.iter().enumerate() {
            let frequency = if i == 2 { "abc" } else { "0.3" };
            text.push_str(&format!("X\t{}\trs{}\tA\tG\t{}\n", p, p, frequency));
        }
        write_indexed_legend(&ws.path("legends/chrX.legend.gz"), &text);

        let rows: Vec<String> = non_par.iter().map(|&p| snp("X", p, "0|1\t0|1")).collect();
        let input = ws.vcf("chrX.vcf", &rows);

        let config = ws.config().with_chunk_size(10_000_000).with_phasing_window(1_000_000);
        let (qc, _) = quality_control(config, ws.panel("hg19", ""));
        let err = qc.run(&[input]).await.unwrap_err();

        assert!(format!("{:#}", err).contains("invalid frequency 'abc'"));
        assert!(ws.scratch_dirs().is_empty());
    }

    #[tokio::test]
    async fn test_unsupported_population() {
        let ws = Workspace::new();
        let input = ws.vcf("chr20.vcf", &[snp("20", 50, "0|1\t0|0")]);

        let (qc, log) = quality_control(QcConfig::new("afr"), ws.panel("hg19", ""));
        let err = qc.run(&[input]).await.unwrap_err();

        assert!(err
            .to_string()
            .contains("Population 'afr' is not supported by reference panel 'test-panel'."));
        assert_eq!(log.events().len(), 1);
    }

    #[tokio::test]
    async fn test_skip_allele_frequency_check() {
        let ws = Workspace::new();
        let positions: Vec<u64> = (1..=5).map(|i| i * 10).collect();
        ws.legend("20", &positions);
        let rows: Vec<String> = positions.iter().map(|&p| snp("20", p, "0|1\t0|0")).collect();
        let input = ws.vcf("chr20.vcf", &rows);

        let mut config = ws.config();
        config.population = "mixed".to_string();
        let (qc, log) = quality_control(config, ws.panel("hg19", ""));
        let outcome = qc.run(&[input]).await.unwrap();

        assert!(outcome.is_accepted());
        assert!(log
            .events()
            .iter()
            .any(|e| e.message == "Skip allele frequency check."));
        assert!(!ws.path("statistics/maf.txt").exists());
    }

    #[tokio::test]
    async fn test_build_mismatch() {
        let ws = Workspace::new();
        ws.legend("20", &[50]);
        let input = ws.vcf("chr20.vcf", &[snp("20", 50, "0|1\t0|0")]);

        let (qc, log) = quality_control(ws.config(), ws.panel("hg38", ""));
        let err = qc.run(&[input.clone()]).await.unwrap_err();
        assert_eq!(err.to_string(), "Currently we do not support liftOver from hg19 to hg38");
        assert!(log
            .events()
            .iter()
            .any(|e| e.message == "Uploaded data is hg19 and reference is hg38."));

        struct Identity;
        impl LiftOver for Identity {
            fn lift(&self, inputs: &[PathBuf], _: GenomeBuild, _: GenomeBuild) -> Result<Vec<PathBuf>> {
                Ok(inputs.to_vec())
            }
        }

        let (qc, _) = quality_control(ws.config(), ws.panel("hg38", ""));
        let qc = qc.with_liftover(Arc::new(Identity));
        assert!(qc.run(&[input]).await.is_ok());
    }

    #[tokio::test]
    async fn test_missing_legend() {
        let ws = Workspace::new();
        ws.legend("20", &[50]);
        let input = ws.vcf("chr21.vcf", &[snp("21", 50, "0|1\t0|0")]);

        let (qc, _) = quality_control(ws.config(), ws.panel("hg19", ""));
        let err = qc.run(&[input]).await.unwrap_err();
        let message = format!("{:#}", err);
        assert!(message.contains("This reference panel doesn't support chromosome 21."));
    }

    #[tokio::test]
    async fn test_invalid_configuration() {
        let ws = Workspace::new();
        let input = ws.vcf("chr20.vcf", &[snp("20", 50, "0|1\t0|0")]);

        let config = ws.config().with_phasing_window(1000);
        let (qc, _) = quality_control(config, ws.panel("hg19", ""));
        let err = qc.run(&[input.clone()]).await.unwrap_err();
        assert!(matches!(err.downcast_ref::<QcError>(), Some(QcError::Config(_))));

        // one chromosome in two files
        let second = ws.vcf("chr20b.vcf", &[snp("chr20", 60, "0|1\t0|0")]);
        let (qc, _) = quality_control(ws.config(), ws.panel("hg19", ""));
        let err = qc.run(&[input, second]).await.unwrap_err();
        assert!(err.to_string().contains("Chromosome 20 is provided by more than one file"));
    }

    #[tokio::test]
    async fn test_strand_flip_limit() {
        let ws = Workspace::new();
        let positions: Vec<u64> = (1..=8).map(|i| i * 10).collect();
        ws.legend("20", &positions);

        let mut rows: Vec<String> = positions[..5].iter().map(|&p| snp("20", p, "0|1\t0|0")).collect();
        for &p in &positions[5..] {
            // T/C is the complement of the legend's A/G
            rows.push(format!("20\t{}\trs{}\tT\tC\t.\tPASS\t.\tGT\t0|1\t0|0", p, p));
        }
        let input = ws.vcf("chr20.vcf", &rows);

        let (qc, _) = quality_control(ws.config(), ws.panel("hg19", "\"strandFlips\": 2"));
        let outcome = qc.run(&[input]).await.unwrap();

        assert_eq!(outcome.statistics.strand_flip, 3);
        assert_eq!(
            outcome.decision.rejection,
            Some(RejectionReason::StrandFlips { limit: 2 })
        );
    }

    fn fixtures() -> Option<PathBuf> {
        std::env::var_os("IMPUTATION_QC_FIXTURES").map(PathBuf::from)
    }

    async fn run_fixture(fixtures: &Path, data: &str, panel: &str) -> (QcOutcome, TempDir) {
        let out = TempDir::new().unwrap();
        let panel = RefPanel::load(fixtures.join("configs").join(panel)).unwrap();
        let config = QcConfig::new("eur").with_output_dirs(
            out.path().join("chunks"),
            out.path().join("metafiles"),
            out.path().join("statistics"),
        );
        let (qc, _) = quality_control(config, panel);
        let outcome = qc.run(&[fixtures.join("data").join(data)]).await.unwrap();
        (outcome, out)
    }

    #[tokio::test]
    #[ignore = "requires IMPUTATION_QC_FIXTURES"]
    async fn test_hapmap_single_sample_statistics() {
        let Some(fixtures) = fixtures() else { return };
        let (outcome, _out) = run_fixture(&fixtures, "single", "hapmap-chr1/hapmap2.json").await;

        let summary = &outcome.decision.summary;
        assert!(summary.contains("Alternative allele frequency > 0.5 sites: 185"));
        assert!(summary.contains("Monomorphic sites: 331"));
        assert!(summary.contains("Excluded sites in total: 336"));
        assert!(summary.contains("Remaining sites in total: 96"));
    }

    #[tokio::test]
    #[ignore = "requires IMPUTATION_QC_FIXTURES"]
    async fn test_simulated_three_chromosome_cohort() {
        let Some(fixtures) = fixtures() else { return };
        let (outcome, out) = run_fixture(
            &fixtures,
            "simulated-chip-3chr-imputation",
            "hapmap-3chr/hapmap2.json",
        )
        .await;

        assert!(outcome.is_accepted());
        assert_eq!(outcome.statistics.filtered, 3_058);
        assert_eq!(outcome.statistics.overall_snps, 117_498);

        let chunk_files = std::fs::read_dir(out.path().join("chunks"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".gz"))
            .count();
        assert_eq!(chunk_files, 13 + 13 + 10);
    }
}
