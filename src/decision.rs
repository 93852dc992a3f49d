// ==============================================================================
// decision.rs - Aggregate QC Decision
// ==============================================================================
// Description: Cohort-wide accept/reject after every file has been processed
// Author: Matt Barham
// Created: 2026-02-03
// Modified: 2026-02-03
// Version: 1.0.0
// ==============================================================================

use serde::Serialize;
use std::fmt;

use crate::models::{QcThresholds, RangeEntry};
use crate::statistics::QcStatistics;

/// Global condition that stops the run, in evaluation order
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    NoChunksPassed,
    StrandFlips { limit: i64 },
    AlleleSwitches { limit: i64 },
    ChrXMixedGenotypes,
    ChrXPloidy,
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::NoChunksPassed => {
                f.write_str("No chunks passed QC. Imputation cannot be started!")
            }
            RejectionReason::StrandFlips { limit } => write!(
                f,
                "More than {} obvious strand flips have been detected. Please check strand. Imputation cannot be started!",
                limit
            ),
            RejectionReason::AlleleSwitches { limit } => write!(
                f,
                "More than {} allele switches have been detected. Imputation cannot be started!",
                limit
            ),
            RejectionReason::ChrXMixedGenotypes => f.write_str(
                "Chromosome X nonPAR region includes > 10 % mixed genotypes. Imputation cannot be started!",
            ),
            RejectionReason::ChrXPloidy => f.write_str(
                "ChrX nonPAR region includes ambiguous samples (haploid and diploid positions). Imputation cannot be started! See chrX-info.txt",
            ),
        }
    }
}

/// Outcome of a QC run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QcDecision {
    /// `None` when imputation may start
    pub rejection: Option<RejectionReason>,
    /// Statistics, totals and warnings, always present
    pub summary: String,
}

impl QcDecision {
    pub fn is_accepted(&self) -> bool {
        self.rejection.is_none()
    }

    /// Summary followed by the rejection line, if any
    pub fn message(&self) -> String {
        match &self.rejection {
            Some(reason) => format!("{}\n\n{}", self.summary, reason),
            None => self.summary.clone(),
        }
    }
}

/// First failing global condition, if any
pub fn rejection_reason(
    stats: &QcStatistics,
    thresholds: &QcThresholds,
) -> Option<RejectionReason> {
    let strand_flips = (stats.strand_flip + stats.strand_flip_and_allele_switch) as i64;
    let allele_switches = (stats.allele_switch + stats.strand_flip_and_allele_switch) as i64;

    if stats.excluded_chunks() == stats.overall_chunks {
        Some(RejectionReason::NoChunksPassed)
    } else if strand_flips > thresholds.max_strand_flips {
        Some(RejectionReason::StrandFlips {
            limit: thresholds.max_strand_flips,
        })
    } else if allele_switches > thresholds.max_allele_switches {
        Some(RejectionReason::AlleleSwitches {
            limit: thresholds.max_allele_switches,
        })
    } else if stats.chrx_missing_rate {
        Some(RejectionReason::ChrXMixedGenotypes)
    } else if stats.chrx_ploidy_error {
        Some(RejectionReason::ChrXPloidy)
    } else {
        None
    }
}

/// Decide on the merged statistics of a complete pass
///
/// # Arguments
/// * `stats` - Merged statistics of every input file
/// * `thresholds` - Reference panel QC thresholds
/// * `ranges` - Target regions, listed in the summary when present
pub fn decide(stats: &QcStatistics, thresholds: &QcThresholds, ranges: &[RangeEntry]) -> QcDecision {
    let summary = format!(
        "{}\n\n{}",
        stats.statistics_text(ranges),
        stats.totals_text(thresholds)
    );

    QcDecision {
        rejection: rejection_reason(stats, thresholds),
        summary,
    }
}
