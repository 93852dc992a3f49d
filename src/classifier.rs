// ==============================================================================
// classifier.rs - Variant Classification Against the Reference Panel
// ==============================================================================
// Description: Ordered QC cascade deciding whether a study variant is kept
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-02-03
// Version: 2.0.0
// ==============================================================================
// Cascade (first match governs):
//   1. Multiallelic site           6. InDel
//   2. Invalid alleles             7. Monomorphic
//   3. Duplicate position          8. Reference lookup (typed-only / allele relation)
//   4. FILTER set                  9. Low call rate
//   5. AAF > 0.5 bookkeeping      10. Kept
//
// Allele relation against the legend, checked in this exact order:
//   Match → A/T,C/G ambiguous → allele switch → strand flip →
//   strand flip + allele switch → mismatch
// Ambiguous pairs must be caught before the flip/switch checks because a
// self-complementary pair satisfies several of them at once.
// ==============================================================================

use std::fmt;

use crate::chunk::ChunkWindow;
use crate::models::RangeEntry;
use crate::parsers::{ReferenceSite, VariantRecord};

/// Maximum fraction of missing genotypes for a site to be kept
pub const MAX_NO_CALL_RATE: f64 = 0.10;

/// Single-character alleles must be a nucleotide; longer alleles are left to the InDel check
pub fn is_valid_allele(allele: &str) -> bool {
    let mut chars = allele.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => matches!(c.to_ascii_uppercase(), 'A' | 'C' | 'G' | 'T'),
        (Some(_), Some(_)) => true,
        (None, _) => false,
    }
}

/// Watson-Crick complement, other characters map to themselves
pub fn complement(base: char) -> char {
    match base.to_ascii_uppercase() {
        'A' => 'T',
        'T' => 'A',
        'C' => 'G',
        'G' => 'C',
        other => other,
    }
}

/// A/T or C/G pair, identical to its own complement
pub fn is_ambiguous_pair(reference: char, alternate: char) -> bool {
    matches!(
        (reference.to_ascii_uppercase(), alternate.to_ascii_uppercase()),
        ('A', 'T') | ('T', 'A') | ('C', 'G') | ('G', 'C')
    )
}

/// How a study SNP's alleles relate to the reference panel's
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlleleRelation {
    Match,
    /// A/T or C/G on both sides; strand cannot be resolved
    Complicated,
    AlleleSwitch,
    StrandFlip,
    StrandFlipAndSwitch,
    Mismatch,
}

impl AlleleRelation {
    /// Classify a biallelic SNP against a legend entry
    ///
    /// # Examples
    /// ```
    /// use imputation_qc::classifier::AlleleRelation;
    ///
    /// assert_eq!(AlleleRelation::classify('A', 'G', 'A', 'G'), AlleleRelation::Match);
    /// assert_eq!(AlleleRelation::classify('G', 'A', 'A', 'G'), AlleleRelation::AlleleSwitch);
    /// assert_eq!(AlleleRelation::classify('T', 'C', 'A', 'G'), AlleleRelation::StrandFlip);
    /// assert_eq!(AlleleRelation::classify('C', 'T', 'A', 'G'), AlleleRelation::StrandFlipAndSwitch);
    /// assert_eq!(AlleleRelation::classify('A', 'T', 'T', 'A'), AlleleRelation::Complicated);
    /// ```
    pub fn classify(
        reference: char,
        alternate: char,
        legend_reference: char,
        legend_alternate: char,
    ) -> Self {
        let (r, a) = (reference.to_ascii_uppercase(), alternate.to_ascii_uppercase());
        let (lr, la) = (
            legend_reference.to_ascii_uppercase(),
            legend_alternate.to_ascii_uppercase(),
        );

        if r == lr && a == la {
            AlleleRelation::Match
        } else if is_ambiguous_pair(r, a) && is_ambiguous_pair(lr, la) {
            AlleleRelation::Complicated
        } else if r == la && a == lr {
            AlleleRelation::AlleleSwitch
        } else if complement(r) == lr && complement(a) == la {
            AlleleRelation::StrandFlip
        } else if complement(r) == la && complement(a) == lr {
            AlleleRelation::StrandFlipAndSwitch
        } else {
            AlleleRelation::Mismatch
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlleleRelation::Match => "Match",
            AlleleRelation::Complicated => "Complicated genotype",
            AlleleRelation::AlleleSwitch => "Allele switch",
            AlleleRelation::StrandFlip => "Strand flip",
            AlleleRelation::StrandFlipAndSwitch => "Strand flip and Allele switch",
            AlleleRelation::Mismatch => "Allele mismatch",
        }
    }
}

/// Why a variant was excluded
#[derive(Debug, Clone, PartialEq)]
pub enum Exclusion {
    Multiallelic,
    InvalidAlleles,
    Duplicate,
    FilterDuplicate,
    FilterOther,
    InDel,
    Monomorphic,
    /// Legend alleles carried for the report
    AlleleSwitch { reference: char, alternate: char },
    StrandFlip { reference: char, alternate: char },
    StrandFlipAndSwitch { reference: char, alternate: char },
    AlleleMismatch { reference: char, alternate: char },
    LowCallRate { call_rate: f64 },
}

impl Exclusion {
    /// Whether the variant was looked up and found in the legend first
    pub fn found_in_legend(&self) -> bool {
        matches!(
            self,
            Exclusion::AlleleSwitch { .. }
                | Exclusion::StrandFlip { .. }
                | Exclusion::StrandFlipAndSwitch { .. }
                | Exclusion::AlleleMismatch { .. }
                | Exclusion::LowCallRate { .. }
        )
    }
}

impl fmt::Display for Exclusion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exclusion::Multiallelic => f.write_str("Multiallelic Site"),
            Exclusion::InvalidAlleles => f.write_str("Invalid Alleles"),
            Exclusion::Duplicate => f.write_str("Duplicate"),
            Exclusion::FilterDuplicate => f.write_str("Filter Duplicate"),
            Exclusion::FilterOther => f.write_str("Filter Other"),
            Exclusion::InDel => f.write_str("InDel"),
            Exclusion::Monomorphic => f.write_str("Monomorphic"),
            Exclusion::AlleleSwitch { reference, alternate } => {
                write!(f, "Allele switch. Reference Panel: {}/{}", reference, alternate)
            }
            Exclusion::StrandFlip { reference, alternate } => {
                write!(f, "Strand flip. Reference Panel: {}/{}", reference, alternate)
            }
            Exclusion::StrandFlipAndSwitch { reference, alternate } => write!(
                f,
                "Strand flip and Allele switch. Reference Panel: {}/{}",
                reference, alternate
            ),
            Exclusion::AlleleMismatch { reference, alternate } => {
                write!(f, "Allele mismatch. Reference Panel: {}/{}", reference, alternate)
            }
            Exclusion::LowCallRate { call_rate } => write!(f, "Low call rate: {}", call_rate),
        }
    }
}

/// Outcome of the cascade for one (variant, chunk) pair
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    /// Outside all configured target ranges; no bookkeeping at all
    OutOfRange,
    Excluded(Exclusion),
    /// Not in the reference panel; kept and written, not counted as a SNP
    TypedOnly,
    Kept(AlleleRelation),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub verdict: Verdict,
    /// Position inside the chunk's core window; only these are counted
    pub inside_core: bool,
    /// Position inside the core window extended by the phasing window
    pub in_write_window: bool,
    /// Alternate allele frequency above 0.5 (informational)
    pub high_alternate_frequency: bool,
}

impl Classification {
    /// Whether the chunk's last recorded position moves to this variant
    pub fn advances_position(&self) -> bool {
        !matches!(
            self.verdict,
            Verdict::OutOfRange
                | Verdict::Excluded(Exclusion::Multiallelic)
                | Verdict::Excluded(Exclusion::InvalidAlleles)
                | Verdict::Excluded(Exclusion::FilterDuplicate)
                | Verdict::Excluded(Exclusion::FilterOther)
        )
    }

    /// Whether the variant was found in the reference legend
    pub fn found_in_legend(&self) -> bool {
        match &self.verdict {
            Verdict::Kept(_) => true,
            Verdict::Excluded(exclusion) => exclusion.found_in_legend(),
            _ => false,
        }
    }
}

/// Per-variant QC cascade
#[derive(Debug, Clone, Default)]
pub struct VariantClassifier {
    ranges: Vec<RangeEntry>,
    phasing_window: u64,
}

impl VariantClassifier {
    pub fn new(phasing_window: u64) -> Self {
        Self {
            ranges: Vec::new(),
            phasing_window,
        }
    }

    /// Restrict classification to target regions
    pub fn with_ranges(mut self, ranges: Vec<RangeEntry>) -> Self {
        self.ranges = ranges;
        self
    }

    fn in_ranges(&self, variant: &VariantRecord) -> bool {
        self.ranges.is_empty()
            || self
                .ranges
                .iter()
                .any(|range| range.contains(&variant.contig, variant.position))
    }

    /// Classify a variant for one open chunk
    ///
    /// # Arguments
    /// * `variant` - Parsed study variant
    /// * `site` - Legend entry at the variant's position, if any
    /// * `window` - Core window and last recorded position of the chunk
    ///
    /// # Returns
    /// * `Classification` - Verdict plus the window flags the caller needs to
    ///   attribute counters and write the line
    pub fn classify(
        &self,
        variant: &VariantRecord,
        site: Option<&ReferenceSite>,
        window: ChunkWindow,
    ) -> Classification {
        let position = variant.position;
        let extended_start = window.start.saturating_sub(self.phasing_window).max(1);
        let extended_end = window.end.saturating_add(self.phasing_window);

        let mut result = Classification {
            verdict: Verdict::OutOfRange,
            inside_core: window.contains(position),
            in_write_window: position >= extended_start && position <= extended_end,
            high_alternate_frequency: false,
        };

        if !self.in_ranges(variant) {
            return result;
        }

        result.verdict = self.cascade(variant, site, window, &mut result.high_alternate_frequency);
        result
    }

    fn cascade(
        &self,
        variant: &VariantRecord,
        site: Option<&ReferenceSite>,
        window: ChunkWindow,
        high_alternate_frequency: &mut bool,
    ) -> Verdict {
        if variant.is_multiallelic() {
            return Verdict::Excluded(Exclusion::Multiallelic);
        }

        if !is_valid_allele(&variant.reference) || !is_valid_allele(&variant.alternate) {
            return Verdict::Excluded(Exclusion::InvalidAlleles);
        }

        if window.last_pos > 0 && window.last_pos == variant.position {
            return Verdict::Excluded(Exclusion::Duplicate);
        }

        if variant.is_filtered() {
            return if variant.filter.contains("DUP") {
                Verdict::Excluded(Exclusion::FilterDuplicate)
            } else {
                Verdict::Excluded(Exclusion::FilterOther)
            };
        }

        if variant.alternate_allele_frequency() > 0.5 {
            *high_alternate_frequency = true;
        }

        if variant.is_indel() {
            return Verdict::Excluded(Exclusion::InDel);
        }

        if variant.tallies.samples > 1 && variant.is_monomorphic() {
            return Verdict::Excluded(Exclusion::Monomorphic);
        }

        let site = match site {
            Some(site) => site,
            None => return Verdict::TypedOnly,
        };

        let (reference, alternate) = match (
            variant.reference.chars().next(),
            variant.alternate.chars().next(),
        ) {
            (Some(r), Some(a)) => (r, a),
            _ => return Verdict::Excluded(Exclusion::InvalidAlleles),
        };

        let relation = AlleleRelation::classify(reference, alternate, site.reference, site.alternate);
        let (lr, la) = (site.reference, site.alternate);
        match relation {
            AlleleRelation::Match | AlleleRelation::Complicated => {}
            AlleleRelation::AlleleSwitch => {
                return Verdict::Excluded(Exclusion::AlleleSwitch { reference: lr, alternate: la })
            }
            AlleleRelation::StrandFlip => {
                return Verdict::Excluded(Exclusion::StrandFlip { reference: lr, alternate: la })
            }
            AlleleRelation::StrandFlipAndSwitch => {
                return Verdict::Excluded(Exclusion::StrandFlipAndSwitch {
                    reference: lr,
                    alternate: la,
                })
            }
            AlleleRelation::Mismatch => {
                return Verdict::Excluded(Exclusion::AlleleMismatch { reference: lr, alternate: la })
            }
        }

        let no_call_rate = variant.no_call_rate();
        if no_call_rate > MAX_NO_CALL_RATE {
            return Verdict::Excluded(Exclusion::LowCallRate {
                call_rate: 1.0 - no_call_rate,
            });
        }

        Verdict::Kept(relation)
    }
}

/// Study vs reference allele frequency comparison of a kept SNP
#[derive(Debug, Clone, PartialEq)]
pub struct AlleleFrequencyStats {
    pub alternate_frequency: f64,
    pub reference_alternate_frequency: f64,
    /// Pearson chi-square of the 2x2 allele count table, NaN when undefined
    pub chisq: f64,
    pub relation: AlleleRelation,
}

/// Compare study allele counts to reference allele counts
///
/// # Arguments
/// * `variant` - Kept study variant
/// * `site` - Legend entry with a population frequency
/// * `reference_samples` - Number of reference panel samples in the population
/// * `relation` - Allele relation the variant was kept under
///
/// # Returns
/// * `None` if the legend entry carries no frequency
pub fn allele_frequency_stats(
    variant: &VariantRecord,
    site: &ReferenceSite,
    reference_samples: u64,
    relation: AlleleRelation,
) -> Option<AlleleFrequencyStats> {
    let reference_aaf = site.alternate_frequency?;

    let study_alt = (variant.tallies.het + 2 * variant.tallies.hom_var) as f64;
    let study_total = ((variant.tallies.samples - variant.tallies.no_call) * 2) as f64;
    let study_ref = study_total - study_alt;

    let reference_total = (reference_samples * 2) as f64;
    let reference_alt = reference_total * reference_aaf;
    let reference_ref = reference_total - reference_alt;

    Some(AlleleFrequencyStats {
        alternate_frequency: study_alt / study_total,
        reference_alternate_frequency: reference_aaf,
        chisq: chi_square_2x2(study_alt, study_ref, reference_alt, reference_ref),
        relation,
    })
}

/// Pearson chi-square for the table [[a, b], [c, d]]
pub fn chi_square_2x2(a: f64, b: f64, c: f64, d: f64) -> f64 {
    let n = a + b + c + d;
    let denominator = (a + b) * (c + d) * (a + c) * (b + d);
    if denominator == 0.0 {
        return f64::NAN;
    }
    let cross = a * d - b * c;
    n * cross * cross / denominator
}

#[cfg(test)]
mod tests {
    use super::*;

    fn variant(line: &str, samples: usize) -> VariantRecord {
        VariantRecord::parse(line, 1, samples).unwrap()
    }

    fn site(reference: char, alternate: char) -> ReferenceSite {
        ReferenceSite {
            id: "rs1".to_string(),
            reference,
            alternate,
            alternate_frequency: Some(0.2),
        }
    }

    fn window() -> ChunkWindow {
        ChunkWindow {
            start: 1,
            end: 1000,
            last_pos: 0,
        }
    }

    const GENOTYPES: &str = "GT\t0|1\t0|0\t1|0\t0|0";

    fn snp(position: u64, reference: &str, alternate: &str) -> VariantRecord {
        variant(
            &format!("1\t{}\t.\t{}\t{}\t.\tPASS\t.\t{}", position, reference, alternate, GENOTYPES),
            4,
        )
    }

    #[test]
    fn test_allele_validity() {
        assert!(is_valid_allele("A"));
        assert!(is_valid_allele("t"));
        assert!(!is_valid_allele("N"));
        assert!(!is_valid_allele("*"));
        assert!(!is_valid_allele(""));
        assert!(is_valid_allele("AT"));
    }

    #[test]
    fn test_relation_order() {
        // ambiguous pairs never count as flips or switches
        assert_eq!(AlleleRelation::classify('A', 'T', 'T', 'A'), AlleleRelation::Complicated);
        assert_eq!(AlleleRelation::classify('C', 'G', 'C', 'G'), AlleleRelation::Match);
        assert_eq!(AlleleRelation::classify('G', 'C', 'C', 'G'), AlleleRelation::Complicated);
        assert_eq!(AlleleRelation::classify('A', 'C', 'A', 'G'), AlleleRelation::Mismatch);
        assert_eq!(AlleleRelation::classify('a', 'g', 'A', 'G'), AlleleRelation::Match);
    }

    #[test]
    fn test_strand_flip_definition() {
        for (r, a, lr, la) in [('T', 'C', 'A', 'G'), ('A', 'C', 'T', 'G'), ('G', 'T', 'C', 'A')] {
            assert_eq!(AlleleRelation::classify(r, a, lr, la), AlleleRelation::StrandFlip);
            assert_eq!(complement(r), lr);
            assert_eq!(complement(a), la);
            assert!(!is_ambiguous_pair(r, a));
        }
    }

    #[test]
    fn test_match_is_kept() {
        let classifier = VariantClassifier::new(100);
        let result = classifier.classify(&snp(10, "A", "G"), Some(&site('A', 'G')), window());
        assert_eq!(result.verdict, Verdict::Kept(AlleleRelation::Match));
        assert!(result.inside_core);
        assert!(result.found_in_legend());
        assert!(result.advances_position());
    }

    #[test]
    fn test_typed_only() {
        let classifier = VariantClassifier::new(100);
        let result = classifier.classify(&snp(10, "A", "G"), None, window());
        assert_eq!(result.verdict, Verdict::TypedOnly);
        assert!(!result.found_in_legend());
    }

    #[test]
    fn test_cascade_order() {
        let classifier = VariantClassifier::new(100);

        let multi = snp(10, "A", "G,T");
        assert_eq!(
            classifier.classify(&multi, None, window()).verdict,
            Verdict::Excluded(Exclusion::Multiallelic)
        );

        let invalid = snp(10, "A", "N");
        assert_eq!(
            classifier.classify(&invalid, None, window()).verdict,
            Verdict::Excluded(Exclusion::InvalidAlleles)
        );

        // duplicate wins over FILTER and InDel
        let duplicate = variant(&format!("1\t10\t.\tAT\tG\t.\tDUP\t.\t{}", GENOTYPES), 4);
        let mut w = window();
        w.last_pos = 10;
        assert_eq!(
            classifier.classify(&duplicate, None, w).verdict,
            Verdict::Excluded(Exclusion::Duplicate)
        );

        let filter_dup = variant(&format!("1\t10\t.\tA\tG\t.\tDUP\t.\t{}", GENOTYPES), 4);
        let result = classifier.classify(&filter_dup, None, window());
        assert_eq!(result.verdict, Verdict::Excluded(Exclusion::FilterDuplicate));
        assert!(!result.advances_position());

        let filter_other = variant(&format!("1\t10\t.\tA\tG\t.\tLowQual\t.\t{}", GENOTYPES), 4);
        assert_eq!(
            classifier.classify(&filter_other, None, window()).verdict,
            Verdict::Excluded(Exclusion::FilterOther)
        );

        assert_eq!(
            classifier.classify(&snp(10, "AT", "A"), None, window()).verdict,
            Verdict::Excluded(Exclusion::InDel)
        );
    }

    #[test]
    fn test_monomorphic_needs_several_samples() {
        let classifier = VariantClassifier::new(100);
        let mono = variant("1\t10\t.\tA\tG\t.\t.\t.\tGT\t0|0\t0|0\t.|.", 3);
        assert_eq!(
            classifier.classify(&mono, Some(&site('A', 'G')), window()).verdict,
            Verdict::Excluded(Exclusion::Monomorphic)
        );

        let single = variant("1\t10\t.\tA\tG\t.\t.\t.\tGT\t0|0", 1);
        assert_eq!(
            classifier.classify(&single, Some(&site('A', 'G')), window()).verdict,
            Verdict::Kept(AlleleRelation::Match)
        );
    }

    #[test]
    fn test_high_alternate_frequency_is_informational() {
        let classifier = VariantClassifier::new(100);
        let high = variant("1\t10\t.\tA\tG\t.\t.\t.\tGT\t1|1\t0|1", 2);
        let result = classifier.classify(&high, Some(&site('A', 'G')), window());
        assert!(result.high_alternate_frequency);
        assert_eq!(result.verdict, Verdict::Kept(AlleleRelation::Match));
    }

    #[test]
    fn test_reference_exclusions() {
        let classifier = VariantClassifier::new(100);
        let cases = [
            ("G", "A", Exclusion::AlleleSwitch { reference: 'A', alternate: 'G' }),
            ("T", "C", Exclusion::StrandFlip { reference: 'A', alternate: 'G' }),
            ("C", "T", Exclusion::StrandFlipAndSwitch { reference: 'A', alternate: 'G' }),
            ("A", "C", Exclusion::AlleleMismatch { reference: 'A', alternate: 'G' }),
        ];

        for (reference, alternate, expected) in cases {
            let result = classifier.classify(&snp(10, reference, alternate), Some(&site('A', 'G')), window());
            assert!(result.found_in_legend());
            assert_eq!(result.verdict, Verdict::Excluded(expected));
        }

        assert_eq!(
            Exclusion::StrandFlip { reference: 'A', alternate: 'G' }.to_string(),
            "Strand flip. Reference Panel: A/G"
        );
    }

    #[test]
    fn test_low_call_rate() {
        let classifier = VariantClassifier::new(100);
        let sparse = variant("1\t10\t.\tA\tG\t.\t.\t.\tGT\t0|1\t.|.\t0|0\t0|0", 4);
        match classifier.classify(&sparse, Some(&site('A', 'G')), window()).verdict {
            Verdict::Excluded(Exclusion::LowCallRate { call_rate }) => {
                assert!((call_rate - 0.75).abs() < 1e-12)
            }
            other => panic!("Expected LowCallRate, got {:?}", other),
        }

        // missing data does not matter for typed-only sites
        assert_eq!(classifier.classify(&sparse, None, window()).verdict, Verdict::TypedOnly);
    }

    #[test]
    fn test_windows() {
        let classifier = VariantClassifier::new(100);
        let w = ChunkWindow {
            start: 1001,
            end: 2000,
            last_pos: 0,
        };

        let before = classifier.classify(&snp(950, "A", "G"), None, w);
        assert!(!before.inside_core);
        assert!(before.in_write_window);

        let after = classifier.classify(&snp(2100, "A", "G"), None, w);
        assert!(!after.inside_core);
        assert!(after.in_write_window);

        let outside = classifier.classify(&snp(2101, "A", "G"), None, w);
        assert!(!outside.in_write_window);
    }

    #[test]
    fn test_ranges_skip_silently() {
        let classifier = VariantClassifier::new(100).with_ranges(vec![RangeEntry {
            chromosome: "1".to_string(),
            start: 1,
            end: 5,
        }]);
        let result = classifier.classify(&snp(10, "A", "N"), None, window());
        assert_eq!(result.verdict, Verdict::OutOfRange);
        assert!(!result.advances_position());
    }

    #[test]
    fn test_chi_square() {
        assert!(chi_square_2x2(10.0, 10.0, 10.0, 10.0).abs() < 1e-12);
        assert!((chi_square_2x2(20.0, 0.0, 0.0, 20.0) - 40.0).abs() < 1e-9);
        assert!(chi_square_2x2(0.0, 0.0, 5.0, 5.0).is_nan());

        let v = snp(10, "A", "G");
        let stats = allele_frequency_stats(&v, &site('A', 'G'), 60, AlleleRelation::Match).unwrap();
        assert!((stats.alternate_frequency - 0.25).abs() < 1e-12);
        assert_eq!(stats.reference_alternate_frequency, 0.2);
        assert!(stats.chisq >= 0.0);
    }
}
