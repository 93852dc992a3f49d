// ==============================================================================
// models.rs - Shared QC Data Models
// ==============================================================================
// Description: Genome builds, target ranges, QC thresholds and chromosome naming
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2026-02-03
// Version: 3.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Human genome assembly a VCF or reference panel is aligned to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum GenomeBuild {
    Hg19,
    Hg38,
}

/// Error for unknown genome build tags
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Unknown genome build: '{0}' (expected hg19 or hg38)")]
pub struct UnknownBuildError(pub String);

impl GenomeBuild {
    pub fn as_str(&self) -> &'static str {
        match self {
            GenomeBuild::Hg19 => "hg19",
            GenomeBuild::Hg38 => "hg38",
        }
    }

    /// Inclusive bounds of the chromosome X non-pseudoautosomal region
    pub fn non_par_region(&self) -> (u64, u64) {
        match self {
            GenomeBuild::Hg19 => (2_699_520, 154_931_044),
            GenomeBuild::Hg38 => (2_781_479, 155_701_383),
        }
    }
}

impl Default for GenomeBuild {
    fn default() -> Self {
        GenomeBuild::Hg19
    }
}

impl fmt::Display for GenomeBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GenomeBuild {
    type Err = UnknownBuildError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hg19" | "grch37" | "b37" => Ok(GenomeBuild::Hg19),
            "hg38" | "grch38" | "b38" => Ok(GenomeBuild::Hg38),
            _ => Err(UnknownBuildError(s.to_string())),
        }
    }
}

impl TryFrom<String> for GenomeBuild {
    type Error = UnknownBuildError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<GenomeBuild> for String {
    fn from(build: GenomeBuild) -> Self {
        build.as_str().to_string()
    }
}

/// Target region restricting which positions are classified
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeEntry {
    pub chromosome: String,
    pub start: u64,
    pub end: u64,
}

/// Errors parsing a `chr:start-end,...` range list
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RangeParseError {
    #[error("Invalid range '{0}' (expected chromosome:start-end)")]
    InvalidFormat(String),

    #[error("Invalid coordinate '{value}' in range '{range}'")]
    InvalidCoordinate { range: String, value: String },
}

impl RangeEntry {
    pub fn contains(&self, contig: &str, position: u64) -> bool {
        normalize_chromosome(&self.chromosome) == normalize_chromosome(contig)
            && position >= self.start
            && position <= self.end
    }

    /// Parse a comma separated list such as `20:1-2000000,21:5000-90000`
    pub fn parse_list(ranges: &str) -> Result<Vec<RangeEntry>, RangeParseError> {
        ranges
            .split(',')
            .filter(|r| !r.trim().is_empty())
            .map(|r| r.parse())
            .collect()
    }
}

impl FromStr for RangeEntry {
    type Err = RangeParseError;

    fn from_str(range: &str) -> Result<Self, Self::Err> {
        let range = range.trim();
        let (chromosome, region) = range
            .split_once(':')
            .ok_or_else(|| RangeParseError::InvalidFormat(range.to_string()))?;
        let (start, end) = region
            .split_once('-')
            .ok_or_else(|| RangeParseError::InvalidFormat(range.to_string()))?;

        let coordinate = |value: &str| {
            value.trim().parse::<u64>().map_err(|_| RangeParseError::InvalidCoordinate {
                range: range.to_string(),
                value: value.trim().to_string(),
            })
        };

        Ok(RangeEntry {
            chromosome: chromosome.trim().to_string(),
            start: coordinate(start)?,
            end: coordinate(end)?,
        })
    }
}

impl fmt::Display for RangeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}-{}", self.chromosome, self.start, self.end)
    }
}

/// Per reference panel acceptance thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QcThresholds {
    /// Minimum SNPs found in the reference for a chunk to be kept
    pub min_snps: u64,
    /// Minimum per-sample call rate within a chunk (0-1)
    pub sample_callrate: f64,
    /// Minimum fraction of chunk SNPs present in the reference (0-1)
    pub reference_overlap: f64,
    /// Maximum per-sample mixed genotype rate on chrX nonPAR (0-1)
    pub mixed_genotypes_chrx: f64,
    pub max_strand_flips: i64,
    pub max_allele_switches: i64,
}

impl Default for QcThresholds {
    fn default() -> Self {
        Self {
            min_snps: 3,
            sample_callrate: 0.5,
            reference_overlap: 0.5,
            mixed_genotypes_chrx: 0.1,
            max_strand_flips: 100,
            max_allele_switches: i32::MAX as i64,
        }
    }
}

/// Strip the `chr` prefix and map the numeric alias 23 to X
pub fn normalize_chromosome(name: &str) -> String {
    let stripped = name.strip_prefix("chr").unwrap_or(name);
    match stripped {
        "23" => "X".to_string(),
        other => other.to_string(),
    }
}

pub fn is_chr_x(chromosome: &str) -> bool {
    normalize_chromosome(chromosome) == "X"
}

pub fn is_chr_mt(chromosome: &str) -> bool {
    matches!(normalize_chromosome(chromosome).as_str(), "MT" | "M")
}
