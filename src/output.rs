// ==============================================================================
// output.rs - QC Report Tables
// ==============================================================================
// Description: Tab-separated QC reports, created on their first row
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-02-10
// Version: 2.0.0
// ==============================================================================
// Reports (statistics directory unless noted):
//   snps-excluded.txt     ID  CHROM  POS  REF  ALT  INFO
//   chunks-excluded.txt   CHUNK  SNPS  REFERENCE_OVERLAP  SAMPLES_LOW_CALL_RATE
//   snps-typed-only.txt   ID  CHROM  POS  REF  ALT
//   chrX-info.txt         SAMPLE  POSITION
//   <maf file>            ID CHROM POS REF ALT AAF REFERENCE_REF REFERENCE_ALT
//                         REFERENCE_AAF CHISQ OVERLAP_WITH_REFERENCE TYPE
//
// Parallel workers write into `.worker-<n>/` fragments that are appended to the
// final tables in input order once every worker is done.
// ==============================================================================

use csv::{QuoteStyle, ReaderBuilder, WriterBuilder};
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::classifier::AlleleFrequencyStats;
use crate::error::QcError;
use crate::parsers::{ReferenceSite, VariantRecord};

pub const EXCLUDED_SNPS_FILE: &str = "snps-excluded.txt";
pub const EXCLUDED_CHUNKS_FILE: &str = "chunks-excluded.txt";
pub const TYPED_ONLY_FILE: &str = "snps-typed-only.txt";
pub const CHRX_INFO_FILE: &str = "chrX-info.txt";
const FRAGMENT_MAF_FILE: &str = "maf.txt";

const EXCLUDED_SNPS_HEADER: &[&str] = &["ID", "CHROM", "POS", "REF", "ALT", "INFO"];
const EXCLUDED_CHUNKS_HEADER: &[&str] =
    &["CHUNK", "SNPS", "REFERENCE_OVERLAP", "SAMPLES_LOW_CALL_RATE"];
const TYPED_ONLY_HEADER: &[&str] = &["ID", "CHROM", "POS", "REF", "ALT"];
const CHRX_INFO_HEADER: &[&str] = &["SAMPLE", "POSITION"];
const MAF_HEADER: &[&str] = &[
    "ID",
    "CHROM",
    "POS",
    "REF",
    "ALT",
    "AAF",
    "REFERENCE_REF",
    "REFERENCE_ALT",
    "REFERENCE_AAF",
    "CHISQ",
    "OVERLAP_WITH_REFERENCE",
    "TYPE",
];

/// Format a double the way the report consumers expect (`1.0`, `0.25`, `NaN`)
pub fn format_double(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e7 {
        format!("{:.1}", value)
    } else {
        format!("{}", value)
    }
}

/// MAF table cells write undefined values as `NA`
fn format_frequency_cell(value: f64) -> String {
    if value.is_nan() {
        "NA".to_string()
    } else {
        format_double(value)
    }
}

/// Tab-separated table whose file and header appear with the first row
pub struct TableWriter {
    path: PathBuf,
    header: &'static [&'static str],
    writer: Option<csv::Writer<File>>,
    rows: u64,
}

impl TableWriter {
    pub fn new(path: impl Into<PathBuf>, header: &'static [&'static str]) -> Self {
        Self {
            path: path.into(),
            header,
            writer: None,
            rows: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Data rows written so far
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn write_row<I, T>(&mut self, record: I) -> Result<(), QcError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        if self.writer.is_none() {
            debug!("Creating report {:?}", self.path);
            let mut writer = WriterBuilder::new()
                .delimiter(b'\t')
                .quote_style(QuoteStyle::Never)
                .from_path(&self.path)?;
            writer.write_record(self.header)?;
            self.writer = Some(writer);
        }

        if let Some(writer) = self.writer.as_mut() {
            writer.write_record(record)?;
            self.rows += 1;
        }
        Ok(())
    }

    /// Append every data row of another table file with the same layout
    pub fn append_file(&mut self, path: &Path) -> Result<(), QcError> {
        if !path.exists() {
            return Ok(());
        }

        let mut reader = ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .quoting(false)
            .from_path(path)?;

        for record in reader.records() {
            self.write_row(&record?)?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<(), QcError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }
}

/// Every report table of a QC run (or of one worker)
pub struct QcReports {
    excluded_snps: TableWriter,
    excluded_chunks: TableWriter,
    typed_only: TableWriter,
    chrx_info: TableWriter,
    maf: Option<TableWriter>,
}

impl QcReports {
    /// Reports in the statistics directory
    ///
    /// # Arguments
    /// * `statistics_dir` - Directory for the excluded/typed-only/chrX tables
    /// * `maf_file` - Allele frequency table, `None` disables it
    pub fn new(statistics_dir: &Path, maf_file: Option<&Path>) -> Self {
        Self {
            excluded_snps: TableWriter::new(statistics_dir.join(EXCLUDED_SNPS_FILE), EXCLUDED_SNPS_HEADER),
            excluded_chunks: TableWriter::new(
                statistics_dir.join(EXCLUDED_CHUNKS_FILE),
                EXCLUDED_CHUNKS_HEADER,
            ),
            typed_only: TableWriter::new(statistics_dir.join(TYPED_ONLY_FILE), TYPED_ONLY_HEADER),
            chrx_info: TableWriter::new(statistics_dir.join(CHRX_INFO_FILE), CHRX_INFO_HEADER),
            maf: maf_file.map(|path| TableWriter::new(path, MAF_HEADER)),
        }
    }

    /// Directory holding the fragment of worker `index`
    pub fn fragment_dir(statistics_dir: &Path, index: usize) -> PathBuf {
        statistics_dir.join(format!(".worker-{}", index))
    }

    /// Reports of one parallel worker
    pub fn fragment(statistics_dir: &Path, index: usize, with_maf: bool) -> Result<Self, QcError> {
        let dir = Self::fragment_dir(statistics_dir, index);
        std::fs::create_dir_all(&dir)?;
        let maf = dir.join(FRAGMENT_MAF_FILE);
        Ok(Self::new(&dir, with_maf.then_some(maf.as_path())))
    }

    pub fn excluded_snp(&mut self, variant: &VariantRecord, reason: &str) -> Result<(), QcError> {
        let position = variant.position.to_string();
        self.excluded_snps.write_row([
            variant.id.as_str(),
            variant.contig.as_str(),
            position.as_str(),
            variant.reference.as_str(),
            variant.alternate.as_str(),
            reason,
        ])
    }

    pub fn typed_only(&mut self, variant: &VariantRecord) -> Result<(), QcError> {
        let position = variant.position.to_string();
        self.typed_only.write_row([
            variant.id.as_str(),
            variant.contig.as_str(),
            position.as_str(),
            variant.reference.as_str(),
            variant.alternate.as_str(),
        ])
    }

    pub fn excluded_chunk(
        &mut self,
        chunk_id: &str,
        snps: u64,
        overlap: f64,
        low_call_rate_samples: u64,
    ) -> Result<(), QcError> {
        self.excluded_chunks.write_row([
            chunk_id.to_string(),
            snps.to_string(),
            format_double(overlap),
            low_call_rate_samples.to_string(),
        ])
    }

    pub fn chrx_info(&mut self, sample: &str, position: &str) -> Result<(), QcError> {
        self.chrx_info.write_row([sample, position])
    }

    /// Allele frequency row of a kept SNP, ignored when the table is disabled
    pub fn allele_frequency(
        &mut self,
        variant: &VariantRecord,
        site: &ReferenceSite,
        stats: &AlleleFrequencyStats,
    ) -> Result<(), QcError> {
        let maf = match self.maf.as_mut() {
            Some(maf) => maf,
            None => return Ok(()),
        };

        maf.write_row([
            variant.id.clone(),
            variant.contig.clone(),
            variant.position.to_string(),
            variant.reference.clone(),
            variant.alternate.clone(),
            format_frequency_cell(stats.alternate_frequency),
            site.reference.to_string(),
            site.alternate.to_string(),
            format_frequency_cell(stats.reference_alternate_frequency),
            format_frequency_cell(stats.chisq),
            "true".to_string(),
            stats.relation.label().to_string(),
        ])
    }

    pub fn excluded_snp_rows(&self) -> u64 {
        self.excluded_snps.rows()
    }

    pub fn typed_only_rows(&self) -> u64 {
        self.typed_only.rows()
    }

    pub fn excluded_chunk_rows(&self) -> u64 {
        self.excluded_chunks.rows()
    }

    pub fn chrx_info_rows(&self) -> u64 {
        self.chrx_info.rows()
    }

    pub fn flush(&mut self) -> Result<(), QcError> {
        self.excluded_snps.flush()?;
        self.excluded_chunks.flush()?;
        self.typed_only.flush()?;
        self.chrx_info.flush()?;
        if let Some(maf) = self.maf.as_mut() {
            maf.flush()?;
        }
        Ok(())
    }

    /// Append a worker fragment directory and remove it
    pub fn merge_fragment(&mut self, dir: &Path) -> Result<(), QcError> {
        self.excluded_snps.append_file(&dir.join(EXCLUDED_SNPS_FILE))?;
        self.excluded_chunks.append_file(&dir.join(EXCLUDED_CHUNKS_FILE))?;
        self.typed_only.append_file(&dir.join(TYPED_ONLY_FILE))?;
        self.chrx_info.append_file(&dir.join(CHRX_INFO_FILE))?;
        if let Some(maf) = self.maf.as_mut() {
            maf.append_file(&dir.join(FRAGMENT_MAF_FILE))?;
        }

        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        debug!("Merged report fragment {:?}", dir);
        Ok(())
    }
}
