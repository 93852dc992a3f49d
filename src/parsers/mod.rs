// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: Readers for study VCF files and reference legend files
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-02-03
// Version: 2.0.0
// ==============================================================================

pub mod legend;
pub mod vcf;

pub use legend::{LegendError, LegendReader, ReferenceSite};
pub use vcf::{open_text, GenotypeTallies, VariantRecord, VcfHeader, VcfParseError, VcfReader};
