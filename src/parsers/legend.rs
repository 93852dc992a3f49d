// ==============================================================================
// parsers/legend.rs - Reference legend (sites) reader
// ==============================================================================
// Description: Indexed position lookup of reference alleles and frequencies
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2026-02-10
// Version: 2.1.0
// ==============================================================================
// Format (tab-separated, bgzip-compressed, sorted by position):
//   #CHROM  POS     ID          REF  ALT  AAF_EUR  AAF_AFR ...
//   20      60343   rs527639301 G    A    0.0      0.002
// A position index (<legend>.tbi or <legend>.csi) must sit next to the file.
// Column names are matched case-insensitively. A frequency of '.' means the
// population has no frequency for that site.
// ==============================================================================

use std::collections::HashMap;
use std::fs::File;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use noodles_bgzf as bgzf;
use noodles_core::{region::Interval, Position};
use noodles_csi::{self as csi, BinningIndex};
use noodles_tabix as tabix;
use thiserror::Error;
use tracing::debug;

use crate::models::normalize_chromosome;

pub const COLUMN_ID: &str = "ID";
pub const COLUMN_REF: &str = "REF";
pub const COLUMN_ALT: &str = "ALT";
pub const COLUMN_CHROM: &str = "CHROM";
pub const COLUMN_POS: &str = "POS";
pub const COLUMN_AAF_PREFIX: &str = "AAF_";

/// Legend reading errors
#[derive(Error, Debug)]
pub enum LegendError {
    #[error("File '{0}' not found.")]
    NotFound(String),

    #[error("File '{0}' is empty.")]
    Empty(String),

    #[error("Index for '{0}' not found (expected .tbi or .csi next to the file).")]
    MissingIndex(String),

    #[error("Invalid index for '{path}': {reason}")]
    InvalidIndex { path: String, reason: String },

    #[error("Column '{0}' not found in file.")]
    MissingColumn(&'static str),

    #[error("{path}: {chromosome}:{position}: {reason}")]
    InvalidRow {
        path: String,
        chromosome: String,
        position: u64,
        reason: String,
    },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Reference panel entry at one position
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceSite {
    pub id: String,
    pub reference: char,
    pub alternate: char,
    /// Population alternate allele frequency, `None` without frequencies
    pub alternate_frequency: Option<f64>,
}

impl ReferenceSite {
    pub fn has_frequencies(&self) -> bool {
        self.alternate_frequency.is_some()
    }

    pub fn reference_frequency(&self) -> Option<f64> {
        self.alternate_frequency.map(|aaf| 1.0 - aaf)
    }
}

#[derive(Debug, Clone, Copy)]
struct LegendColumns {
    chromosome: usize,
    position: usize,
    id: usize,
    reference: usize,
    alternate: usize,
    population: Option<usize>,
}

impl LegendColumns {
    fn parse(header: &str, population: &str) -> Result<Self, LegendError> {
        let mut chromosome = None;
        let mut position = None;
        let mut id = None;
        let mut reference = None;
        let mut alternate = None;
        let mut frequency = None;
        let population_column = format!("{}{}", COLUMN_AAF_PREFIX, population);

        for (i, name) in header.split('\t').enumerate() {
            let name = name.trim().trim_start_matches('#');
            if name.eq_ignore_ascii_case(COLUMN_CHROM) || name.eq_ignore_ascii_case("CHR") {
                chromosome = Some(i);
            } else if name.eq_ignore_ascii_case(COLUMN_POS) || name.eq_ignore_ascii_case("POSITION") {
                position = Some(i);
            } else if name.eq_ignore_ascii_case(COLUMN_ID) {
                id = Some(i);
            } else if name.eq_ignore_ascii_case(COLUMN_REF) {
                reference = Some(i);
            } else if name.eq_ignore_ascii_case(COLUMN_ALT) {
                alternate = Some(i);
            } else if name.eq_ignore_ascii_case(&population_column) {
                frequency = Some(i);
            }
        }

        Ok(Self {
            id: id.ok_or(LegendError::MissingColumn(COLUMN_ID))?,
            reference: reference.ok_or(LegendError::MissingColumn(COLUMN_REF))?,
            alternate: alternate.ok_or(LegendError::MissingColumn(COLUMN_ALT))?,
            chromosome: chromosome.ok_or(LegendError::MissingColumn(COLUMN_CHROM))?,
            position: position.ok_or(LegendError::MissingColumn(COLUMN_POS))?,
            population: frequency,
        })
    }
}

/// Indexed legend lookup by (chromosome, position)
///
/// Every query asks the position index for the BGZF chunks overlapping the
/// position, seeks to them and reads only those rows. When several rows
/// share a position the first one wins.
pub struct LegendReader {
    path: PathBuf,
    columns: LegendColumns,
    index: Box<dyn BinningIndex>,
    /// Normalized chromosome name -> reference sequence id in the index
    reference_ids: HashMap<String, usize>,
    reader: bgzf::io::Reader<File>,
}

impl LegendReader {
    /// Open a legend file, validate its header and load its position index
    ///
    /// # Arguments
    /// * `path` - bgzip-compressed legend with a `.tbi` or `.csi` next to it
    /// * `population` - Population id selecting the `AAF_<population>` column
    pub fn open(path: impl AsRef<Path>, population: &str) -> Result<Self, LegendError> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(LegendError::NotFound(path.display().to_string()));
        }

        let mut reader = bgzf::io::Reader::new(File::open(&path)?);
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 {
            return Err(LegendError::Empty(path.display().to_string()));
        }
        let columns = LegendColumns::parse(header.trim_end_matches(['\n', '\r']), population)?;

        let index = read_index(&path)?;
        let reference_ids = reference_ids(&path, &*index)?;

        debug!(
            "Opened legend {:?} ({} indexed chromosome(s), population column: {})",
            path,
            reference_ids.len(),
            columns.population.is_some()
        );

        Ok(Self {
            path,
            columns,
            index,
            reference_ids,
            reader,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Look up the reference site at a position
    ///
    /// # Returns
    /// * `Ok(Some(site))` - First legend row at that position
    /// * `Ok(None)` - Position not in the reference panel
    pub fn find(
        &mut self,
        chromosome: &str,
        position: u64,
    ) -> Result<Option<ReferenceSite>, LegendError> {
        let chromosome = normalize_chromosome(chromosome);
        let Some(&reference_id) = self.reference_ids.get(&chromosome) else {
            return Ok(None);
        };
        let Some(target) = usize::try_from(position)
            .ok()
            .and_then(|p| Position::try_from(p).ok())
        else {
            return Ok(None);
        };

        let chunks = self
            .index
            .query(reference_id, Interval::from(target..=target))?;

        let mut line = String::new();
        for chunk in chunks {
            self.reader.seek(chunk.start())?;

            while self.reader.virtual_position() < chunk.end() {
                line.clear();
                if self.reader.read_line(&mut line)? == 0 {
                    break;
                }

                let row = line.trim_end_matches(['\n', '\r']);
                if row.is_empty() || row.starts_with('#') {
                    continue;
                }

                let fields: Vec<&str> = row.split('\t').collect();
                let same_chromosome = fields
                    .get(self.columns.chromosome)
                    .map(|c| normalize_chromosome(c) == chromosome)
                    .unwrap_or(false);
                if !same_chromosome {
                    continue;
                }

                let row_position = fields
                    .get(self.columns.position)
                    .and_then(|p| p.trim().parse::<u64>().ok())
                    .ok_or_else(|| {
                        self.invalid_row(&chromosome, position, "missing or invalid position")
                    })?;

                if row_position == position {
                    return self.parse_site(&fields, &chromosome, position).map(Some);
                } else if row_position > position {
                    return Ok(None);
                }
            }
        }

        Ok(None)
    }

    fn invalid_row(&self, chromosome: &str, position: u64, reason: &str) -> LegendError {
        LegendError::InvalidRow {
            path: self.path.display().to_string(),
            chromosome: chromosome.to_string(),
            position,
            reason: reason.to_string(),
        }
    }

    fn parse_site(
        &self,
        fields: &[&str],
        chromosome: &str,
        position: u64,
    ) -> Result<ReferenceSite, LegendError> {
        let allele = |index: usize, name: &str| {
            fields
                .get(index)
                .and_then(|a| a.trim().chars().next())
                .map(|c| c.to_ascii_uppercase())
                .ok_or_else(|| {
                    self.invalid_row(chromosome, position, &format!("missing {} allele", name))
                })
        };

        let id = fields
            .get(self.columns.id)
            .map(|id| id.to_string())
            .ok_or_else(|| self.invalid_row(chromosome, position, "missing ID"))?;
        let reference = allele(self.columns.reference, COLUMN_REF)?;
        let alternate = allele(self.columns.alternate, COLUMN_ALT)?;

        let alternate_frequency = match self.columns.population.and_then(|i| fields.get(i)) {
            Some(value) if value.trim() != "." => Some(value.trim().parse::<f64>().map_err(|_| {
                self.invalid_row(chromosome, position, &format!("invalid frequency '{}'", value))
            })?),
            _ => None,
        };

        Ok(ReferenceSite {
            id,
            reference,
            alternate,
            alternate_frequency,
        })
    }
}

/// `<legend>.<extension>`
fn index_path(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".");
    name.push(extension);
    PathBuf::from(name)
}

/// Load the tabix index, falling back to a CSI index
fn read_index(path: &Path) -> Result<Box<dyn BinningIndex>, LegendError> {
    let invalid = |e: std::io::Error| LegendError::InvalidIndex {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    let tbi = index_path(path, "tbi");
    if tbi.exists() {
        let index = tabix::fs::read(&tbi).map_err(invalid)?;
        return Ok(Box::new(index));
    }

    let csi_path = index_path(path, "csi");
    if csi_path.exists() {
        let index = csi::fs::read(&csi_path).map_err(invalid)?;
        return Ok(Box::new(index));
    }

    Err(LegendError::MissingIndex(path.display().to_string()))
}

fn reference_ids(
    path: &Path,
    index: &dyn BinningIndex,
) -> Result<HashMap<String, usize>, LegendError> {
    let header = index.header().ok_or_else(|| LegendError::InvalidIndex {
        path: path.display().to_string(),
        reason: "index carries no chromosome names".to_string(),
    })?;

    Ok(header
        .reference_sequence_names()
        .iter()
        .enumerate()
        .map(|(id, name)| (normalize_chromosome(&name.to_string()), id))
        .collect())
}
