// ==============================================================================
// error.rs - QC Engine Errors
// ==============================================================================
// Description: Fatal error type for a QC run (configuration, input, output)
// Author: Matt Barham
// Created: 2026-02-03
// Modified: 2026-02-03
// Version: 1.0.0
// ==============================================================================

use thiserror::Error;

use crate::parsers::{LegendError, VcfParseError};
use crate::reference_panel::PanelError;

/// Errors that abort a QC run
///
/// Per-variant and per-chunk exclusions are not errors; they are counted and
/// written to the reports.
#[derive(Error, Debug)]
pub enum QcError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Panel(#[from] PanelError),

    #[error(transparent)]
    Vcf(#[from] VcfParseError),

    #[error(transparent)]
    Legend(#[from] LegendError),

    #[error("This reference panel doesn't support chromosome {chromosome}. File {path} not found.")]
    UnsupportedChromosome { chromosome: String, path: String },

    #[error("Failed to write report: {0}")]
    Report(#[from] csv::Error),

    #[error("tabix failed for {path}: {reason}")]
    Index { path: String, reason: String },

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
