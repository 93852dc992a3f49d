// ==============================================================================
// chunker.rs - Chunk Manager
// ==============================================================================
// Description: Streams one chromosome into overlapping fixed-size chunk files
// Author: Matt Barham
// Created: 2026-02-03
// Modified: 2026-02-03
// Version: 1.0.0
// ==============================================================================
// Chunk k covers the core window [k*size+1, (k+1)*size]. Each chunk also
// receives the variants of the phasing window on either side, so at most two
// chunks are open at a time:
//
//        |<- pw ->|<-------- core k -------->|<- pw ->|
//                                   |<- pw ->|<-------- core k+1 ------
//
// Counters only see a variant in the chunk whose core holds it.
// ==============================================================================

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, info};

use crate::chunk::{chunk_index, index_with_tabix, Chunk, ChunkWindow};
use crate::classifier::{allele_frequency_stats, Classification, VariantClassifier, Verdict};
use crate::error::QcError;
use crate::evaluator::evaluate_chunk;
use crate::models::QcThresholds;
use crate::output::QcReports;
use crate::parsers::{LegendReader, ReferenceSite, VariantRecord, VcfReader};
use crate::statistics::QcStatistics;

/// Settings shared by every stream of a run
#[derive(Debug, Clone)]
pub struct ChunkingSettings {
    pub chunk_size: u64,
    pub phasing_window: u64,
    pub chunks_dir: PathBuf,
    pub metafiles_dir: PathBuf,
    pub thresholds: QcThresholds,
    /// Reference samples of the population, 0 disables the allele frequency check
    pub reference_samples: u64,
    /// `tabix` binary used to index accepted chunks
    pub tabix: Option<PathBuf>,
}

impl ChunkingSettings {
    /// The look-ahead only ever opens the next chunk, which needs `pw < size`
    pub fn validate(&self) -> Result<(), QcError> {
        if self.chunk_size == 0 {
            return Err(QcError::Config("chunk size must be greater than 0".to_string()));
        }
        if self.phasing_window >= self.chunk_size {
            return Err(QcError::Config(format!(
                "phasing window ({}) must be smaller than the chunk size ({})",
                self.phasing_window, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// One VCF stream to chunk
#[derive(Debug, Clone)]
pub struct StreamInput {
    pub path: PathBuf,
    /// Label used for chunk names and the manifest file (`20`, `X.nonPAR`)
    pub contig: String,
    /// Chromosome queried in the legend
    pub legend_chromosome: String,
    pub phased: bool,
}

/// Open chunks of a single stream
pub struct ChunkManager<'a> {
    settings: &'a ChunkingSettings,
    classifier: &'a VariantClassifier,
    contig: String,
    phased: bool,
    header: Vec<String>,
    samples: usize,
    chunks: BTreeMap<u64, Chunk>,
    manifest: BufWriter<File>,
}

impl<'a> ChunkManager<'a> {
    pub fn new(
        settings: &'a ChunkingSettings,
        classifier: &'a VariantClassifier,
        contig: &str,
        phased: bool,
        header: Vec<String>,
        samples: usize,
        manifest: File,
    ) -> Self {
        Self {
            settings,
            classifier,
            contig: contig.to_string(),
            phased,
            header,
            samples,
            chunks: BTreeMap::new(),
            manifest: BufWriter::new(manifest),
        }
    }

    /// Number of chunks currently open
    pub fn open_chunks(&self) -> usize {
        self.chunks.len()
    }

    fn open_chunk(&mut self, index: u64, stats: &mut QcStatistics) -> Result<(), QcError> {
        if self.chunks.contains_key(&index) {
            return Ok(());
        }

        let window = ChunkWindow::for_index(index, self.settings.chunk_size);
        let chunk = Chunk::create(
            &self.settings.chunks_dir,
            &self.contig,
            window,
            self.phased,
            self.samples,
            &self.header,
        )?;
        self.chunks.insert(index, chunk);
        stats.overall_chunks += 1;
        Ok(())
    }

    /// Route one variant through every open chunk
    ///
    /// # Arguments
    /// * `variant` - Next variant of the stream (ascending position)
    /// * `site` - Legend entry at the variant's position
    /// * `stats` - Run counters
    /// * `reports` - Report tables of this worker
    pub fn process(
        &mut self,
        variant: &VariantRecord,
        site: Option<&ReferenceSite>,
        stats: &mut QcStatistics,
        reports: &mut QcReports,
    ) -> Result<(), QcError> {
        let position = variant.position;
        let chunk_size = self.settings.chunk_size;
        let phasing_window = self.settings.phasing_window;

        let index = chunk_index(position, chunk_size);
        self.open_chunk(index, stats)?;

        let next_start = (index + 1) * chunk_size + 1;
        if next_start > phasing_window && position + phasing_window >= next_start {
            self.open_chunk(index + 1, stats)?;
        }

        let indices: Vec<u64> = self.chunks.keys().copied().collect();
        for key in indices {
            let end = match self.chunks.get(&key) {
                Some(chunk) => chunk.end(),
                None => continue,
            };

            if position <= end + phasing_window {
                if let Some(chunk) = self.chunks.get_mut(&key) {
                    let classification = self.classifier.classify(variant, site, chunk.window);
                    apply_classification(
                        chunk,
                        &classification,
                        variant,
                        site,
                        self.settings.reference_samples,
                        stats,
                        reports,
                    )?;
                }
            } else if let Some(chunk) = self.chunks.remove(&key) {
                self.summarize(chunk, stats, reports)?;
            }
        }

        Ok(())
    }

    /// Evaluate a closed chunk and either list it in the manifest or drop it
    fn summarize(
        &mut self,
        mut chunk: Chunk,
        stats: &mut QcStatistics,
        reports: &mut QcReports,
    ) -> Result<(), QcError> {
        chunk.close()?;
        let evaluation = evaluate_chunk(&chunk, &self.settings.thresholds);

        match evaluation.rejection {
            None => {
                writeln!(self.manifest, "{}", chunk.manifest_entry())?;
                if let Some(tabix) = &self.settings.tabix {
                    index_with_tabix(tabix, &chunk.path)?;
                }
                debug!(
                    "Chunk {} accepted ({} SNPs, overlap {:.4})",
                    chunk.id(),
                    chunk.overall_snps,
                    evaluation.overlap
                );
            }
            Some(bucket) => {
                reports.excluded_chunk(
                    &chunk.id(),
                    chunk.overall_snps,
                    evaluation.overlap,
                    evaluation.low_call_rate_samples,
                )?;
                stats.record_rejected_chunk(bucket);
                debug!("Chunk {} rejected ({:?})", chunk.id(), bucket);
                chunk.discard()?;
            }
        }

        Ok(())
    }

    /// Close the remaining chunks at the end of the stream
    ///
    /// A chunk that never saw a variant inside its core was only opened for
    /// look-ahead; it is deleted and not counted.
    pub fn finish(mut self, stats: &mut QcStatistics, reports: &mut QcReports) -> Result<(), QcError> {
        let chunks = std::mem::take(&mut self.chunks);
        for (_, chunk) in chunks {
            if chunk.window.last_pos >= chunk.start() {
                self.summarize(chunk, stats, reports)?;
            } else {
                debug!("Discarding empty look-ahead chunk {}", chunk.id());
                chunk.discard()?;
                stats.overall_chunks = stats.overall_chunks.saturating_sub(1);
            }
        }

        self.manifest.flush()?;
        Ok(())
    }
}

/// Apply the counters, report rows and chunk writes of one classification
fn apply_classification(
    chunk: &mut Chunk,
    classification: &Classification,
    variant: &VariantRecord,
    site: Option<&ReferenceSite>,
    reference_samples: u64,
    stats: &mut QcStatistics,
    reports: &mut QcReports,
) -> Result<(), QcError> {
    let core = classification.inside_core;

    if classification.advances_position() {
        chunk.window.last_pos = variant.position;
    }

    if classification.high_alternate_frequency && core {
        stats.alternative_alleles += 1;
    }

    match &classification.verdict {
        Verdict::OutOfRange => {}

        Verdict::Excluded(exclusion) => {
            if core {
                if exclusion.found_in_legend() {
                    stats.found_in_legend += 1;
                    chunk.found_in_legend += 1;
                }
                stats.record_exclusion(exclusion);
                reports.excluded_snp(variant, &exclusion.to_string())?;
            }
        }

        Verdict::TypedOnly => {
            if core {
                stats.not_found_in_legend += 1;
                chunk.not_found_in_legend += 1;
                chunk.write_line(&variant.raw)?;
                reports.typed_only(variant)?;
            }
        }

        Verdict::Kept(relation) => {
            if core {
                stats.found_in_legend += 1;
                chunk.found_in_legend += 1;
                stats.record_relation(*relation);

                if reference_samples > 0 {
                    if let Some(site) = site.filter(|s| s.has_frequencies()) {
                        if let Some(af) =
                            allele_frequency_stats(variant, site, reference_samples, *relation)
                        {
                            reports.allele_frequency(variant, site, &af)?;
                        }
                    }
                }

                stats.overall_snps += 1;
                chunk.overall_snps += 1;
            }

            if classification.in_write_window {
                chunk.write_line(&variant.raw)?;
                chunk.valid_snps += 1;

                if core {
                    for (sample, called) in chunk.called_per_sample.iter_mut().enumerate() {
                        if variant.is_called(sample) {
                            *called += 1;
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// Chunk one VCF stream against its legend
///
/// # Arguments
/// * `settings` - Chunk size, phasing window, output directories, thresholds
/// * `classifier` - Variant classifier of the run
/// * `input` - VCF stream and its contig label
/// * `legend` - Legend of the stream's chromosome
/// * `stats` - Run counters
/// * `reports` - Report tables of this worker
pub fn process_stream(
    settings: &ChunkingSettings,
    classifier: &VariantClassifier,
    input: &StreamInput,
    legend: &mut LegendReader,
    stats: &mut QcStatistics,
    reports: &mut QcReports,
) -> Result<(), QcError> {
    let reader = VcfReader::open(&input.path)?;
    let header = reader.header().lines.clone();
    let samples = reader.samples();

    let manifest_path = settings.metafiles_dir.join(&input.contig);
    let manifest = File::create(&manifest_path)?;

    info!(
        "Chunking {:?} as {} ({} samples, {})",
        input.path,
        input.contig,
        samples,
        if input.phased { "phased" } else { "unphased" }
    );

    let mut manager = ChunkManager::new(
        settings,
        classifier,
        &input.contig,
        input.phased,
        header,
        samples,
        manifest,
    );

    for variant in reader {
        let variant = variant?;
        let site = legend.find(&input.legend_chromosome, variant.position)?;
        manager.process(&variant, site.as_ref(), stats, reports)?;
    }

    manager.finish(stats, reports)?;
    reports.flush()?;
    Ok(())
}
