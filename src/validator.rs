// ==============================================================================
// validator.rs - Input File Inspection
// ==============================================================================
// Description: Whole-file pre-check of uploaded VCF files before QC
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2026-02-10
// Version: 2.0.1
// ==============================================================================
// Checks, in file order:
//   - gzip magic number for `.gz` files
//   - `#CHROM` header with unique sample names
//   - data lines are tab-delimited (>= 3 columns)
//   - a single chromosome (ignoring the `chr` prefix)
//   - REF != ALT
// ==============================================================================

use serde::Serialize;
use std::fs::File;
use std::io::{BufRead, Read};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::genotype::is_unphased;
use crate::models::{is_chr_mt, is_chr_x, normalize_chromosome};
use crate::parsers::{open_text, VcfHeader, VcfParseError};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Summary of an inspected VCF file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VcfFileInfo {
    pub path: PathBuf,
    /// Chromosome without `chr` prefix, `23` reported as `X`
    pub chromosome: String,
    /// Contig exactly as written in the file
    pub contig: String,
    pub samples: Vec<String>,
    pub variants: u64,
    pub phased: bool,
    pub chr_x: bool,
    /// `##fileformat` value, e.g. `VCFv4.2`
    pub file_format: String,
}

impl VcfFileInfo {
    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }
}

fn read_magic_number(path: &Path) -> std::io::Result<Vec<u8>> {
    let mut file = File::open(path)?;
    let mut buffer = vec![0u8; 2];
    let read = file.read(&mut buffer)?;
    buffer.truncate(read);
    Ok(buffer)
}

/// Inspect a VCF file
///
/// # Arguments
/// * `path` - `.vcf` or `.vcf.gz` file
///
/// # Returns
/// * `Ok(VcfFileInfo)` - Chromosome, samples, variant count and phasing
/// * `Err(VcfParseError)` - First violated check
pub fn inspect_vcf(path: impl AsRef<Path>) -> Result<VcfFileInfo, VcfParseError> {
    let path = path.as_ref();
    let open_error = |e: std::io::Error| VcfParseError::FileOpenError(format!("{}: {}", path.display(), e));

    if path.to_string_lossy().ends_with(".gz") {
        let magic = read_magic_number(path).map_err(open_error)?;
        if magic != GZIP_MAGIC {
            return Err(VcfParseError::FileOpenError(format!(
                "{}: magic number mismatch for .gz file",
                path.display()
            )));
        }
    }

    let reader = open_text(path).map_err(open_error)?;

    let mut header_lines = Vec::new();
    let mut header: Option<VcfHeader> = None;
    let mut contig: Option<String> = None;
    let mut chromosome: Option<String> = None;
    let mut variants = 0u64;
    let mut phased = true;

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        if line.starts_with('#') {
            header_lines.push(line);
            continue;
        }

        if header.is_none() {
            header = Some(VcfHeader::from_lines(
                std::mem::take(&mut header_lines),
                &path.display().to_string(),
            )?);
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 3 {
            return Err(VcfParseError::NotTabDelimited);
        }

        let normalized = normalize_chromosome(fields[0]);
        match &chromosome {
            None => {
                contig = Some(fields[0].to_string());
                chromosome = Some(normalized);
            }
            Some(current) if *current != normalized => {
                return Err(VcfParseError::MultipleChromosomes);
            }
            Some(_) => {}
        }

        if let (Some(reference), Some(alternate)) = (fields.get(3), fields.get(4)) {
            if reference == alternate {
                return Err(VcfParseError::IdenticalAlleles {
                    id: fields[2].to_string(),
                    reference: reference.to_string(),
                    alternate: alternate.to_string(),
                });
            }
        }

        if let Some(first_sample) = fields.get(9) {
            if is_unphased(first_sample) {
                phased = false;
            }
        }

        variants += 1;
    }

    let header = match header {
        Some(header) => header,
        None => VcfHeader::from_lines(header_lines, &path.display().to_string())?,
    };

    let chromosome = chromosome.unwrap_or_default();
    let contig = contig.unwrap_or_default();

    // mitochondrial genotypes are haploid and always treated as phased
    if is_chr_mt(&chromosome) {
        phased = true;
    }

    let info = VcfFileInfo {
        path: path.to_path_buf(),
        chr_x: is_chr_x(&chromosome),
        chromosome,
        contig,
        samples: header.samples,
        variants,
        phased,
        file_format: header.file_format,
    };

    info!(
        "Inspected {:?}: chromosome {}, {} samples, {} variants, {}",
        info.path,
        info.chromosome,
        info.sample_count(),
        info.variants,
        if info.phased { "phased" } else { "unphased" }
    );

    Ok(info)
}
