// ==============================================================================
// genotype.rs - GT Field Interpretation
// ==============================================================================
// Description: Parses VCF GT values into ploidy, missingness and zygosity
// Author: Matt Barham
// Created: 2025-11-06
// Modified: 2026-02-03
// Version: 2.0.0
// ==============================================================================
// Algorithm:
//   Alleles are split on '/' (unphased) or '|' (phased):
//   - all alleles missing ('.')        → NoCall
//   - some missing, some called (./1)  → Mixed (called, not tallied)
//   - all called and all '0'           → HomRef
//   - all called and equal, non-zero   → HomVar
//   - otherwise                        → Het
//   Haploid calls ("0", "1", ".") follow the same rules.
// ==============================================================================

use thiserror::Error;

/// Errors that can occur while reading a GT value
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenotypeParseError {
    #[error("Empty genotype")]
    Empty,

    #[error("Invalid allele '{allele}' in genotype '{genotype}'")]
    InvalidAllele { genotype: String, allele: String },
}

/// Zygosity class of a single sample call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenotypeClass {
    HomRef,
    Het,
    HomVar,
    NoCall,
    Mixed,
}

/// Summary of one sample's GT value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Genotype {
    pub ploidy: u8,
    pub missing: u8,
    pub class: GenotypeClass,
}

impl Genotype {
    /// Whether at least one allele was called
    pub fn is_called(&self) -> bool {
        self.class != GenotypeClass::NoCall
    }

    /// Exactly one missing allele next to called ones, e.g. `./1`
    pub fn has_single_missing_allele(&self) -> bool {
        self.ploidy > 1 && self.missing == 1
    }
}

/// Parse a sample column (`GT[:...]`) into a [`Genotype`]
///
/// # Arguments
/// * `sample` - Raw sample column; only the first `:`-separated key is read
///
/// # Returns
/// * `Ok(Genotype)` - Parsed call
/// * `Err(GenotypeParseError)` - Empty value or non-numeric allele index
///
/// # Examples
/// ```
/// use imputation_qc::genotype::{parse_genotype, GenotypeClass};
///
/// assert_eq!(parse_genotype("0|1:0.98").unwrap().class, GenotypeClass::Het);
/// assert_eq!(parse_genotype("./.").unwrap().class, GenotypeClass::NoCall);
/// assert_eq!(parse_genotype("1").unwrap().ploidy, 1);
/// ```
pub fn parse_genotype(sample: &str) -> Result<Genotype, GenotypeParseError> {
    let gt = sample.split(':').next().unwrap_or_default();
    if gt.is_empty() {
        return Err(GenotypeParseError::Empty);
    }

    let mut ploidy: u8 = 0;
    let mut missing: u8 = 0;
    let mut first_called: Option<u32> = None;
    let mut all_ref = true;
    let mut all_same = true;

    for allele in gt.split(['/', '|']) {
        ploidy = ploidy.saturating_add(1);

        if allele == "." {
            missing = missing.saturating_add(1);
            continue;
        }

        let index = allele
            .parse::<u32>()
            .map_err(|_| GenotypeParseError::InvalidAllele {
                genotype: gt.to_string(),
                allele: allele.to_string(),
            })?;

        if index != 0 {
            all_ref = false;
        }
        match first_called {
            None => first_called = Some(index),
            Some(first) if first != index => all_same = false,
            Some(_) => {}
        }
    }

    let class = if missing == ploidy {
        GenotypeClass::NoCall
    } else if missing > 0 {
        GenotypeClass::Mixed
    } else if all_ref {
        GenotypeClass::HomRef
    } else if all_same {
        GenotypeClass::HomVar
    } else {
        GenotypeClass::Het
    };

    Ok(Genotype {
        ploidy,
        missing,
        class,
    })
}

/// Whether a sample column carries an unphased GT separator
pub fn is_unphased(sample: &str) -> bool {
    sample.split(':').next().unwrap_or_default().contains('/')
}
