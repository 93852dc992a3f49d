// ==============================================================================
// evaluator.rs - Chunk QC Evaluation
// ==============================================================================
// Description: Accept/reject decision for a closed chunk
// Author: Matt Barham
// Created: 2026-02-03
// Modified: 2026-02-03
// Version: 1.0.0
// ==============================================================================

use crate::chunk::Chunk;
use crate::models::QcThresholds;

/// Single bucket a rejected chunk is reported under
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectionBucket {
    ReferenceOverlap,
    TooFewSnps,
    SampleCallRate,
}

/// Result of evaluating one chunk
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkEvaluation {
    /// Fraction of core SNPs found in the reference, 0 without any lookups
    pub overlap: f64,
    pub low_call_rate_samples: u64,
    /// `None` when the chunk is accepted
    pub rejection: Option<RejectionBucket>,
}

impl ChunkEvaluation {
    pub fn is_accepted(&self) -> bool {
        self.rejection.is_none()
    }
}

/// Evaluate a closed chunk against the panel thresholds
///
/// # Arguments
/// * `chunk` - Closed chunk with its final counters
/// * `thresholds` - Reference panel QC thresholds
///
/// # Returns
/// * `ChunkEvaluation` - Overlap, low call rate sample count and, when
///   rejected, the first failing bucket (overlap, then SNPs, then call rate)
pub fn evaluate_chunk(chunk: &Chunk, thresholds: &QcThresholds) -> ChunkEvaluation {
    evaluate_counts(
        chunk.found_in_legend,
        chunk.not_found_in_legend,
        chunk.valid_snps,
        chunk.overall_snps,
        &chunk.called_per_sample,
        thresholds,
    )
}

/// Evaluation on raw chunk counters
pub fn evaluate_counts(
    found_in_legend: u64,
    not_found_in_legend: u64,
    valid_snps: u64,
    overall_snps: u64,
    called_per_sample: &[u64],
    thresholds: &QcThresholds,
) -> ChunkEvaluation {
    // a chunk without core SNPs gives NaN rates, which never count as low
    let low_call_rate_samples = called_per_sample
        .iter()
        .filter(|&&called| (called as f64 / overall_snps as f64) < thresholds.sample_callrate)
        .count() as u64;
    let low_sample_call_rate = low_call_rate_samples > 0;

    let looked_up = found_in_legend + not_found_in_legend;
    let overlap = if looked_up == 0 {
        0.0
    } else {
        found_in_legend as f64 / looked_up as f64
    };

    let too_few_snps = found_in_legend < thresholds.min_snps || valid_snps < thresholds.min_snps;

    let rejection = if overlap < thresholds.reference_overlap {
        Some(RejectionBucket::ReferenceOverlap)
    } else if too_few_snps {
        Some(RejectionBucket::TooFewSnps)
    } else if low_sample_call_rate {
        Some(RejectionBucket::SampleCallRate)
    } else {
        None
    };

    ChunkEvaluation {
        overlap,
        low_call_rate_samples,
        rejection,
    }
}
