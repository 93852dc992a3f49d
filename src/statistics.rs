// ==============================================================================
// statistics.rs - QC Run Statistics
// ==============================================================================
// Description: Cohort-wide QC counters, merging and the statistics summary text
// Author: Matt Barham
// Created: 2026-02-03
// Modified: 2026-02-03
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

use crate::classifier::{AlleleRelation, Exclusion};
use crate::evaluator::RejectionBucket;
use crate::models::{QcThresholds, RangeEntry};

/// Counters accumulated over every processed file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QcStatistics {
    pub alternative_alleles: u64,
    pub found_in_legend: u64,
    pub not_found_in_legend: u64,

    pub matched: u64,
    pub allele_switch: u64,
    pub strand_flip: u64,
    pub strand_flip_and_allele_switch: u64,
    pub complicated_genotypes: u64,

    pub filter_flag: u64,
    pub invalid_alleles: u64,
    pub multiallelic_sites: u64,
    pub duplicates: u64,
    pub non_snps: u64,
    pub monomorphic: u64,
    pub allele_mismatch: u64,
    pub low_call_rate: u64,

    /// Excluded sites in total
    pub filtered: u64,
    /// Remaining sites in total
    pub overall_snps: u64,

    pub overall_chunks: u64,
    pub removed_chunks_snps: u64,
    pub removed_chunks_call_rate: u64,
    pub removed_chunks_overlap: u64,

    /// Some chrX nonPAR sample exceeds the mixed genotype rate
    pub chrx_missing_rate: bool,
    /// Some chrX nonPAR sample switches between haploid and diploid calls
    pub chrx_ploidy_error: bool,
}

impl QcStatistics {
    /// Count a core exclusion in its category and in `filtered`
    pub fn record_exclusion(&mut self, exclusion: &Exclusion) {
        self.filtered += 1;
        match exclusion {
            Exclusion::Multiallelic => self.multiallelic_sites += 1,
            Exclusion::InvalidAlleles => self.invalid_alleles += 1,
            Exclusion::Duplicate | Exclusion::FilterDuplicate => self.duplicates += 1,
            Exclusion::FilterOther => self.filter_flag += 1,
            Exclusion::InDel => self.non_snps += 1,
            Exclusion::Monomorphic => self.monomorphic += 1,
            Exclusion::AlleleSwitch { .. } => self.allele_switch += 1,
            Exclusion::StrandFlip { .. } => self.strand_flip += 1,
            Exclusion::StrandFlipAndSwitch { .. } => self.strand_flip_and_allele_switch += 1,
            Exclusion::AlleleMismatch { .. } => self.allele_mismatch += 1,
            Exclusion::LowCallRate { .. } => self.low_call_rate += 1,
        }
    }

    /// Count the allele relation of a kept core SNP
    pub fn record_relation(&mut self, relation: AlleleRelation) {
        match relation {
            AlleleRelation::Match => self.matched += 1,
            AlleleRelation::Complicated => self.complicated_genotypes += 1,
            // excluded relations are counted through `record_exclusion`
            _ => {}
        }
    }

    pub fn record_rejected_chunk(&mut self, bucket: RejectionBucket) {
        match bucket {
            RejectionBucket::ReferenceOverlap => self.removed_chunks_overlap += 1,
            RejectionBucket::TooFewSnps => self.removed_chunks_snps += 1,
            RejectionBucket::SampleCallRate => self.removed_chunks_call_rate += 1,
        }
    }

    pub fn excluded_chunks(&self) -> u64 {
        self.removed_chunks_snps + self.removed_chunks_call_rate + self.removed_chunks_overlap
    }

    pub fn remaining_chunks(&self) -> u64 {
        self.overall_chunks.saturating_sub(self.excluded_chunks())
    }

    /// Percentage of looked-up core sites present in the reference
    pub fn reference_overlap_percent(&self) -> f64 {
        let looked_up = self.found_in_legend + self.not_found_in_legend;
        if looked_up == 0 {
            return 0.0;
        }
        self.found_in_legend as f64 / looked_up as f64 * 100.0
    }

    /// `Statistics:` and `Filtered sites:` blocks
    pub fn statistics_text(&self, ranges: &[RangeEntry]) -> String {
        let mut text = String::from("Statistics:\n");
        if !ranges.is_empty() {
            let ranges: Vec<String> = ranges.iter().map(|r| r.to_string()).collect();
            text.push_str(&format!("Ref. Panel Range: {}\n", ranges.join(",")));
        }
        text.push_str(&format!(
            "Alternative allele frequency > 0.5 sites: {}\n",
            format_count(self.alternative_alleles)
        ));
        text.push_str(&format!(
            "Reference Overlap: {:.2} %\n",
            self.reference_overlap_percent()
        ));
        text.push_str(&format!("Match: {}\n", format_count(self.matched)));
        text.push_str(&format!("Allele switch: {}\n", format_count(self.allele_switch)));
        text.push_str(&format!("Strand flip: {}\n", format_count(self.strand_flip)));
        text.push_str(&format!(
            "Strand flip and allele switch: {}\n",
            format_count(self.strand_flip_and_allele_switch)
        ));
        text.push_str(&format!(
            "A/T, C/G genotypes: {}\n",
            format_count(self.complicated_genotypes)
        ));

        text.push_str("Filtered sites:\n");
        text.push_str(&format!("Filter flag set: {}\n", format_count(self.filter_flag)));
        text.push_str(&format!("Invalid alleles: {}\n", format_count(self.invalid_alleles)));
        text.push_str(&format!(
            "Multiallelic sites: {}\n",
            format_count(self.multiallelic_sites)
        ));
        text.push_str(&format!("Duplicated sites: {}\n", format_count(self.duplicates)));
        text.push_str(&format!("NonSNP sites: {}\n", format_count(self.non_snps)));
        text.push_str(&format!("Monomorphic sites: {}\n", format_count(self.monomorphic)));
        text.push_str(&format!("Allele mismatch: {}\n", format_count(self.allele_mismatch)));
        text.push_str(&format!("SNPs call rate < 90%: {}", format_count(self.low_call_rate)));
        text
    }

    /// Totals and chunk warnings following the statistics blocks
    pub fn totals_text(&self, thresholds: &QcThresholds) -> String {
        let mut text = format!(
            "Excluded sites in total: {}\nRemaining sites in total: {}\n",
            format_count(self.filtered),
            format_count(self.overall_snps)
        );

        if self.filtered > 0 {
            text.push_str("See snps-excluded.txt for details\n");
        }

        if self.not_found_in_legend > 0 {
            text.push_str(&format!(
                "Typed only sites: {}\nSee snps-typed-only.txt for details\n",
                format_count(self.not_found_in_legend)
            ));
        }

        if self.removed_chunks_snps > 0 {
            text.push_str(&format!(
                "\nWarning: {} Chunk(s) excluded: < {} SNPs (see chunks-excluded.txt for details).",
                format_count(self.removed_chunks_snps),
                thresholds.min_snps
            ));
        }

        if self.removed_chunks_call_rate > 0 {
            text.push_str(&format!(
                "\nWarning: {} Chunk(s) excluded: at least one sample has a call rate < {}% (see chunks-excluded.txt for details).",
                format_count(self.removed_chunks_call_rate),
                thresholds.sample_callrate * 100.0
            ));
        }

        if self.removed_chunks_overlap > 0 {
            text.push_str(&format!(
                "\nWarning: {} Chunk(s) excluded: reference overlap < {}% (see chunks-excluded.txt for details).",
                format_count(self.removed_chunks_overlap),
                thresholds.reference_overlap * 100.0
            ));
        }

        if self.excluded_chunks() > 0 {
            text.push_str(&format!(
                "\nRemaining chunk(s): {}",
                format_count(self.remaining_chunks())
            ));
        }

        text
    }
}

impl AddAssign<&QcStatistics> for QcStatistics {
    fn add_assign(&mut self, other: &QcStatistics) {
        self.alternative_alleles += other.alternative_alleles;
        self.found_in_legend += other.found_in_legend;
        self.not_found_in_legend += other.not_found_in_legend;
        self.matched += other.matched;
        self.allele_switch += other.allele_switch;
        self.strand_flip += other.strand_flip;
        self.strand_flip_and_allele_switch += other.strand_flip_and_allele_switch;
        self.complicated_genotypes += other.complicated_genotypes;
        self.filter_flag += other.filter_flag;
        self.invalid_alleles += other.invalid_alleles;
        self.multiallelic_sites += other.multiallelic_sites;
        self.duplicates += other.duplicates;
        self.non_snps += other.non_snps;
        self.monomorphic += other.monomorphic;
        self.allele_mismatch += other.allele_mismatch;
        self.low_call_rate += other.low_call_rate;
        self.filtered += other.filtered;
        self.overall_snps += other.overall_snps;
        self.overall_chunks += other.overall_chunks;
        self.removed_chunks_snps += other.removed_chunks_snps;
        self.removed_chunks_call_rate += other.removed_chunks_call_rate;
        self.removed_chunks_overlap += other.removed_chunks_overlap;
        self.chrx_missing_rate |= other.chrx_missing_rate;
        self.chrx_ploidy_error |= other.chrx_ploidy_error;
    }
}

/// Group digits in thousands, e.g. `117498` → `117,498`
pub fn format_count(value: u64) -> String {
    let digits = value.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}
