// ==============================================================================
// reference_panel.rs - Reference Panel Descriptor
// ==============================================================================
// Description: Typed reference panel configuration (legend, populations, QC filters)
// Author: Matt Barham
// Created: 2025-11-12
// Modified: 2026-02-03
// Version: 2.0.0
// ==============================================================================
// Example descriptor:
//   {
//     "id": "hapmap2",
//     "build": "hg19",
//     "genotypes": "m3vcfs/hapmap_r22.chr$chr.CEU.hg19.m3vcf.gz",
//     "legend": "legends/hapmap_r22.chr$chr.CEU.hg19_impute.legend.gz",
//     "populations": [ { "id": "eur", "name": "EUR", "samples": 60 } ],
//     "qcFilter": { "overlap": 0.5, "minSnps": 3 }
//   }
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::models::{GenomeBuild, QcThresholds, RangeEntry, RangeParseError};

/// Reference panel configuration errors
#[derive(Error, Debug)]
pub enum PanelError {
    #[error("Reference not found: {0}")]
    NotFound(String),

    #[error("Unable to parse reference panel {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Reference panel is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("Invalid value for qcFilter '{key}': {value}")]
    InvalidFilter { key: String, value: String },

    #[error("Invalid reference panel range: {0}")]
    InvalidRange(#[from] RangeParseError),

    #[error("{0}")]
    UnsupportedPopulation(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Population shipped with a reference panel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefPanelPopulation {
    pub id: String,
    #[serde(default)]
    pub name: String,
    /// Number of reference samples; zero or negative disables the frequency check
    #[serde(default)]
    pub samples: i64,
}

/// Reference panel descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefPanel {
    pub id: String,

    #[serde(default)]
    pub build: GenomeBuild,

    pub genotypes: String,

    /// Legend path template, `$chr` / `${chr}` is replaced by the chromosome
    pub legend: String,

    /// Optional target regions (`chr:start-end,...`)
    #[serde(default)]
    pub range: Option<String>,

    pub populations: Vec<RefPanelPopulation>,

    #[serde(default, rename = "qcFilter")]
    pub qc_filter: HashMap<String, serde_json::Value>,

    /// Directory relative legend paths are resolved against
    #[serde(skip)]
    pub base_dir: Option<PathBuf>,
}

impl RefPanel {
    /// Load and validate a descriptor from a JSON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, PanelError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(PanelError::NotFound(path.display().to_string()));
        }

        let file = std::fs::File::open(path)?;
        let mut panel: RefPanel =
            serde_json::from_reader(std::io::BufReader::new(file)).map_err(|source| {
                PanelError::Malformed {
                    path: path.display().to_string(),
                    source,
                }
            })?;
        panel.base_dir = path.parent().map(|p| p.to_path_buf());
        panel.validate()?;

        info!(
            "Loaded reference panel '{}' ({}, {} populations)",
            panel.id,
            panel.build,
            panel.populations.len()
        );

        Ok(panel)
    }

    /// Parse a descriptor from a JSON string
    pub fn from_json(json: &str) -> Result<Self, PanelError> {
        let panel: RefPanel = serde_json::from_str(json).map_err(|source| PanelError::Malformed {
            path: "<inline>".to_string(),
            source,
        })?;
        panel.validate()?;
        Ok(panel)
    }

    fn validate(&self) -> Result<(), PanelError> {
        if self.id.trim().is_empty() {
            return Err(PanelError::MissingField("id"));
        }
        if self.legend.trim().is_empty() {
            return Err(PanelError::MissingField("legend"));
        }
        if self.populations.is_empty() {
            return Err(PanelError::MissingField("populations"));
        }
        // fail on malformed filters and ranges now rather than mid-run
        self.thresholds()?;
        self.ranges()?;
        Ok(())
    }

    /// Population ids are matched case-insensitively
    pub fn population(&self, population: &str) -> Option<&RefPanelPopulation> {
        self.populations
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(population))
    }

    pub fn supports_population(&self, population: &str) -> bool {
        self.population(population).is_some()
    }

    /// Reference sample count of a population, 0 if unknown
    pub fn samples_by_population(&self, population: &str) -> i64 {
        self.population(population).map(|p| p.samples).unwrap_or(0)
    }

    /// Fail with the list of available populations when unsupported
    pub fn check_population(&self, population: &str) -> Result<(), PanelError> {
        if self.supports_population(population) {
            return Ok(());
        }

        let mut report = format!(
            "Population '{}' is not supported by reference panel '{}'.\n",
            population, self.id
        );
        report.push_str("Available populations:");
        for p in &self.populations {
            report.push_str(&format!("\n - {}", p.id));
        }
        Err(PanelError::UnsupportedPopulation(report))
    }

    fn filter_value(&self, key: &str) -> Result<Option<f64>, PanelError> {
        let value = match self.qc_filter.get(key) {
            Some(value) => value,
            None => return Ok(None),
        };

        let parsed = match value {
            serde_json::Value::Number(n) => n.as_f64(),
            serde_json::Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        };

        parsed.map(Some).ok_or_else(|| PanelError::InvalidFilter {
            key: key.to_string(),
            value: value.to_string(),
        })
    }

    /// QC thresholds with defaults for keys absent from `qcFilter`
    pub fn thresholds(&self) -> Result<QcThresholds, PanelError> {
        let defaults = QcThresholds::default();

        Ok(QcThresholds {
            reference_overlap: self
                .filter_value("overlap")?
                .unwrap_or(defaults.reference_overlap),
            min_snps: self
                .filter_value("minSnps")?
                .map(|v| v.max(0.0) as u64)
                .unwrap_or(defaults.min_snps),
            sample_callrate: self
                .filter_value("sampleCallrate")?
                .unwrap_or(defaults.sample_callrate),
            mixed_genotypes_chrx: self
                .filter_value("mixedGenotypeschrX")?
                .unwrap_or(defaults.mixed_genotypes_chrx),
            max_strand_flips: self
                .filter_value("strandFlips")?
                .map(|v| v as i64)
                .unwrap_or(defaults.max_strand_flips),
            max_allele_switches: self
                .filter_value("alleleSwitches")?
                .map(|v| v as i64)
                .unwrap_or(defaults.max_allele_switches),
        })
    }

    /// Target regions, empty for genome-wide panels
    pub fn ranges(&self) -> Result<Vec<RangeEntry>, PanelError> {
        match &self.range {
            Some(range) => Ok(RangeEntry::parse_list(range)?),
            None => Ok(Vec::new()),
        }
    }

    /// Legend file for a chromosome
    pub fn legend_path(&self, chromosome: &str) -> PathBuf {
        let resolved = self
            .legend
            .replace("${chr}", chromosome)
            .replace("$chr", chromosome);
        let path = PathBuf::from(resolved);

        match &self.base_dir {
            Some(base) if path.is_relative() && !self.legend.starts_with("./") => base.join(path),
            _ => path,
        }
    }
}
