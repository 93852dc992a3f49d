// ==============================================================================
// lib.rs - Imputation QC Library
// ==============================================================================
// Description: Library interface for VCF quality control and chunking modules
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-02-03
// Version: 2.0.0
// ==============================================================================

pub mod parsers;
pub mod validator;
pub mod models;
pub mod reference_panel;
pub mod genotype;
pub mod classifier;
pub mod chunk;
pub mod evaluator;
pub mod chunker;
pub mod chrx;
pub mod statistics;
pub mod decision;
pub mod reporter;
pub mod error;
pub mod processor;
pub mod output;

pub use error::QcError;
pub use processor::{LiftOver, QcConfig, QcOutcome, QualityControl};
pub use reference_panel::RefPanel;
pub use reporter::{EventLog, Reporter};
