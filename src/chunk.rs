// ==============================================================================
// chunk.rs - Genomic Chunk Files
// ==============================================================================
// Description: Fixed-size genomic windows written as BGZF VCF chunk files
// Author: Matt Barham
// Created: 2026-02-03
// Modified: 2026-02-03
// Version: 1.0.0
// ==============================================================================
// Naming: chunk_<contig>_<start %010d>_<end %010d>.vcf.gz
// Manifest line (tab-separated):
//   contig  start  end  VCF-PHASED|VCF-UNPHASED  file  snps  inReference
// ==============================================================================

use std::fmt;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;
use std::str::FromStr;

use noodles_bgzf as bgzf;
use tracing::debug;

use crate::error::QcError;

/// Core window of a chunk plus its last recorded position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkWindow {
    pub start: u64,
    pub end: u64,
    pub last_pos: u64,
}

impl ChunkWindow {
    /// Window of chunk `index` (0-based) for a given chunk size
    pub fn for_index(index: u64, chunk_size: u64) -> Self {
        let start = index * chunk_size + 1;
        Self {
            start,
            end: start + chunk_size - 1,
            last_pos: 0,
        }
    }

    pub fn contains(&self, position: u64) -> bool {
        position >= self.start && position <= self.end
    }
}

/// Index of the chunk whose core window holds a 1-based position
pub fn chunk_index(position: u64, chunk_size: u64) -> u64 {
    position.saturating_sub(1) / chunk_size
}

/// Chunk identifier used in reports and file names
pub fn chunk_id(contig: &str, start: u64, end: u64) -> String {
    format!("chunk_{}_{:010}_{:010}", contig, start, end)
}

type ChunkWriter = BufWriter<bgzf::io::Writer<File>>;

/// An open chunk and its running counters
pub struct Chunk {
    pub contig: String,
    pub window: ChunkWindow,
    pub phased: bool,
    pub path: PathBuf,

    /// Core SNPs that passed every check
    pub overall_snps: u64,
    /// Lines written from the found-in-reference path, including flanks
    pub valid_snps: u64,
    pub found_in_legend: u64,
    pub not_found_in_legend: u64,

    /// Called genotypes per sample over core SNPs
    pub called_per_sample: Vec<u64>,

    writer: Option<ChunkWriter>,
}

impl Chunk {
    /// Create the chunk file and write the VCF header into it
    ///
    /// # Arguments
    /// * `dir` - Chunk output directory
    /// * `contig` - Contig label used in the chunk name
    /// * `window` - Core window
    /// * `phased` - Whether the source file is phased
    /// * `samples` - Number of samples in the source file
    /// * `header` - Header lines of the source file
    pub fn create(
        dir: &Path,
        contig: &str,
        window: ChunkWindow,
        phased: bool,
        samples: usize,
        header: &[String],
    ) -> Result<Self, QcError> {
        let path = dir.join(format!("{}.vcf.gz", chunk_id(contig, window.start, window.end)));
        let file = File::create(&path)?;
        let mut writer = BufWriter::new(bgzf::io::Writer::new(file));
        for line in header {
            writeln!(writer, "{}", line)?;
        }

        debug!("Opened chunk {:?}", path);

        Ok(Self {
            contig: contig.to_string(),
            window,
            phased,
            path,
            overall_snps: 0,
            valid_snps: 0,
            found_in_legend: 0,
            not_found_in_legend: 0,
            called_per_sample: vec![0; samples],
            writer: Some(writer),
        })
    }

    pub fn id(&self) -> String {
        chunk_id(&self.contig, self.window.start, self.window.end)
    }

    pub fn start(&self) -> u64 {
        self.window.start
    }

    pub fn end(&self) -> u64 {
        self.window.end
    }

    pub fn write_line(&mut self, line: &str) -> Result<(), QcError> {
        if let Some(writer) = self.writer.as_mut() {
            writeln!(writer, "{}", line)?;
        }
        Ok(())
    }

    /// Flush buffers and append the BGZF EOF block
    pub fn close(&mut self) -> Result<(), QcError> {
        if let Some(writer) = self.writer.take() {
            let inner = writer.into_inner().map_err(|e| e.into_error())?;
            inner.finish()?;
        }
        Ok(())
    }

    /// Close and remove the chunk file
    pub fn discard(mut self) -> Result<(), QcError> {
        self.close()?;
        if self.path.exists() {
            std::fs::remove_file(&self.path)?;
        }
        Ok(())
    }

    pub fn manifest_entry(&self) -> ManifestEntry {
        ManifestEntry {
            contig: self.contig.clone(),
            start: self.window.start,
            end: self.window.end,
            phased: self.phased,
            path: self.path.clone(),
            snps: self.overall_snps,
            in_reference: self.found_in_legend,
        }
    }
}

/// One accepted chunk in a manifest ("metafile")
#[derive(Debug, Clone, PartialEq)]
pub struct ManifestEntry {
    pub contig: String,
    pub start: u64,
    pub end: u64,
    pub phased: bool,
    pub path: PathBuf,
    pub snps: u64,
    pub in_reference: u64,
}

impl fmt::Display for ManifestEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.contig,
            self.start,
            self.end,
            if self.phased { "VCF-PHASED" } else { "VCF-UNPHASED" },
            self.path.display(),
            self.snps,
            self.in_reference
        )
    }
}

impl FromStr for ManifestEntry {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() != 7 {
            return Err(format!("expected 7 manifest columns, found {}", fields.len()));
        }

        let number = |value: &str| {
            value
                .parse::<u64>()
                .map_err(|_| format!("invalid number '{}' in manifest", value))
        };

        let phased = match fields[3] {
            "VCF-PHASED" => true,
            "VCF-UNPHASED" => false,
            other => return Err(format!("invalid phasing flag '{}'", other)),
        };

        Ok(Self {
            contig: fields[0].to_string(),
            start: number(fields[1])?,
            end: number(fields[2])?,
            phased,
            path: PathBuf::from(fields[4]),
            snps: number(fields[5])?,
            in_reference: number(fields[6])?,
        })
    }
}

/// Build a tabix index next to a BGZF VCF file
pub fn index_with_tabix(tabix: &Path, vcf: &Path) -> Result<(), QcError> {
    let output = Command::new(tabix)
        .args(["-f", "-p", "vcf"])
        .arg(vcf)
        .output()
        .map_err(|e| QcError::Index {
            path: vcf.display().to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        return Err(QcError::Index {
            path: vcf.display().to_string(),
            reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}
