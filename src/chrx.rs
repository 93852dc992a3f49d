// ==============================================================================
// chrx.rs - Chromosome X Preprocessing
// ==============================================================================
// Description: PAR1/nonPAR/PAR2 split with ploidy and mixed genotype checks
// Author: Matt Barham
// Created: 2026-02-03
// Modified: 2026-02-03
// Version: 1.0.0
// ==============================================================================
// Regions by build (inclusive nonPAR bounds):
//   hg19: PAR1 < 2,699,520 <= nonPAR <= 154,931,044 < PAR2
//   hg38: PAR1 < 2,781,479 <= nonPAR <= 155,701,383 < PAR2
//
// Males are haploid on nonPAR, so a sample seen with a haploid call there must
// never show a diploid one afterwards. Calls like `./1` count as mixed.
// ==============================================================================

use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use noodles_bgzf as bgzf;
use tracing::{debug, info, warn};

use crate::classifier::{is_valid_allele, Exclusion};
use crate::error::QcError;
use crate::models::GenomeBuild;
use crate::output::QcReports;
use crate::parsers::VcfReader;
use crate::statistics::QcStatistics;

/// Legend chromosome used by every chrX sub-stream
pub const CHRX_LEGEND_CHROMOSOME: &str = "X";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChrXRegion {
    Par1,
    NonPar,
    Par2,
}

impl ChrXRegion {
    /// Region of a position given the nonPAR bounds
    pub fn of(position: u64, (start, end): (u64, u64)) -> Self {
        if position < start {
            ChrXRegion::Par1
        } else if position <= end {
            ChrXRegion::NonPar
        } else {
            ChrXRegion::Par2
        }
    }

    /// Contig label used for chunk names and manifests
    pub fn contig(&self) -> &'static str {
        match self {
            ChrXRegion::Par1 => "X.PAR1",
            ChrXRegion::NonPar => "X.nonPAR",
            ChrXRegion::Par2 => "X.PAR2",
        }
    }

    fn slot(&self) -> usize {
        match self {
            ChrXRegion::Par1 => 0,
            ChrXRegion::NonPar => 1,
            ChrXRegion::Par2 => 2,
        }
    }
}

const REGIONS: [ChrXRegion; 3] = [ChrXRegion::Par1, ChrXRegion::NonPar, ChrXRegion::Par2];

/// One non-empty chrX sub-stream
#[derive(Debug, Clone, PartialEq)]
pub struct ChrXSplit {
    pub region: ChrXRegion,
    pub path: PathBuf,
    pub variants: u64,
}

struct SplitWriter {
    path: PathBuf,
    writer: BufWriter<bgzf::io::Writer<File>>,
    variants: u64,
}

impl SplitWriter {
    fn create(path: PathBuf, header: &[String]) -> Result<Self, QcError> {
        let mut writer = BufWriter::new(bgzf::io::Writer::new(File::create(&path)?));
        for line in header {
            writeln!(writer, "{}", line)?;
        }
        Ok(Self {
            path,
            writer,
            variants: 0,
        })
    }

    fn finish(self) -> Result<(PathBuf, u64), QcError> {
        let inner = self.writer.into_inner().map_err(|e| e.into_error())?;
        inner.finish()?;
        Ok((self.path, self.variants))
    }
}

/// Rewrite the numeric chrX alias of a contig (`23` → `X`, `chr23` → `chrX`)
pub fn normalize_contig_alias(contig: &str) -> Option<&'static str> {
    match contig {
        "23" => Some("X"),
        "chr23" => Some("chrX"),
        _ => None,
    }
}

/// Splits chrX files and tracks nonPAR ploidy across them
pub struct ChrXPreprocessor {
    non_par: (u64, u64),
    mixed_genotypes_threshold: f64,
    haploid_samples: HashSet<String>,
}

impl ChrXPreprocessor {
    pub fn new(build: GenomeBuild, mixed_genotypes_threshold: f64) -> Self {
        Self {
            non_par: build.non_par_region(),
            mixed_genotypes_threshold,
            haploid_samples: HashSet::new(),
        }
    }

    /// Samples seen with a haploid nonPAR call so far
    pub fn haploid_samples(&self) -> &HashSet<String> {
        &self.haploid_samples
    }

    /// Split a chrX VCF into its PAR1, nonPAR and PAR2 parts
    ///
    /// # Arguments
    /// * `input` - chrX VCF file
    /// * `scratch_dir` - Directory receiving `X.PAR1.vcf.gz` etc.
    /// * `stats` - Run counters (invalid alleles, chrX flags)
    /// * `reports` - Report tables (excluded SNPs, chrX info)
    ///
    /// # Returns
    /// * Sub-streams that received at least one variant, in region order
    pub fn split(
        &mut self,
        input: &Path,
        scratch_dir: &Path,
        stats: &mut QcStatistics,
        reports: &mut QcReports,
    ) -> Result<Vec<ChrXSplit>, QcError> {
        std::fs::create_dir_all(scratch_dir)?;

        let reader = VcfReader::open(input)?;
        let header = reader.header().lines.clone();
        let samples = reader.header().samples.clone();

        let mut writers: [Option<SplitWriter>; 3] = [None, None, None];
        let mut mixed_genotypes = vec![0u64; samples.len()];
        let mut non_par_variants = 0u64;

        for variant in reader {
            let mut variant = variant?;

            if !is_valid_allele(&variant.reference) || !is_valid_allele(&variant.alternate) {
                let exclusion = Exclusion::InvalidAlleles;
                stats.record_exclusion(&exclusion);
                reports.excluded_snp(&variant, &exclusion.to_string())?;
                continue;
            }

            if let Some(alias) = normalize_contig_alias(&variant.contig) {
                let rest = variant
                    .raw
                    .split_once('\t')
                    .map(|(_, rest)| rest.to_string())
                    .unwrap_or_default();
                variant.raw = format!("{}\t{}", alias, rest);
                variant.contig = alias.to_string();
            }

            let region = ChrXRegion::of(variant.position, self.non_par);

            if region == ChrXRegion::NonPar {
                non_par_variants += 1;

                for (index, genotype) in variant.genotypes.iter().enumerate() {
                    let name = match samples.get(index) {
                        Some(name) => name,
                        None => continue,
                    };

                    if genotype.ploidy != 1 && self.haploid_samples.contains(name) {
                        reports.chrx_info(
                            name,
                            &format!("{}:{}", variant.contig, variant.position),
                        )?;
                        stats.chrx_ploidy_error = true;
                    }

                    if genotype.ploidy == 1 {
                        self.haploid_samples.insert(name.clone());
                    }

                    if genotype.has_single_missing_allele() {
                        mixed_genotypes[index] += 1;
                    }
                }
            }

            let slot = &mut writers[region.slot()];
            if slot.is_none() {
                let path = scratch_dir.join(format!("{}.vcf.gz", region.contig()));
                *slot = Some(SplitWriter::create(path, &header)?);
            }
            if let Some(writer) = slot.as_mut() {
                writeln!(writer.writer, "{}", variant.raw)?;
                writer.variants += 1;
            }
        }

        if non_par_variants > 0 {
            let exceeded = mixed_genotypes
                .iter()
                .any(|&mixed| mixed as f64 / non_par_variants as f64 > self.mixed_genotypes_threshold);
            if exceeded {
                warn!("chrX nonPAR mixed genotype rate above {}", self.mixed_genotypes_threshold);
                stats.chrx_missing_rate = true;
            }
        }

        let mut splits = Vec::new();
        for (region, writer) in REGIONS.iter().zip(writers) {
            if let Some(writer) = writer {
                let (path, variants) = writer.finish()?;
                debug!("{} has {} variants", region.contig(), variants);
                splits.push(ChrXSplit {
                    region: *region,
                    path,
                    variants,
                });
            }
        }

        info!(
            "Split {:?} into {} chrX region(s) ({} nonPAR variants)",
            input,
            splits.len(),
            non_par_variants
        );

        Ok(splits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CHRX_INFO_FILE;
    use flate2::read::MultiGzDecoder;
    use std::io::Read;
    use tempfile::TempDir;

    const HEADER: &str = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tM1\tF1\n";

    fn write_vcf(dir: &Path, rows: &[&str]) -> PathBuf {
        let path = dir.join("chrX.vcf");
        let mut text = HEADER.to_string();
        for row in rows {
            text.push_str(row);
            text.push('\n');
        }
        std::fs::write(&path, text).unwrap();
        path
    }

    fn read_bgzf(path: &Path) -> String {
        let mut text = String::new();
        MultiGzDecoder::new(File::open(path).unwrap())
            .read_to_string(&mut text)
            .unwrap();
        text
    }

    #[test]
    fn test_region_boundaries() {
        let bounds = GenomeBuild::Hg19.non_par_region();
        assert_eq!(ChrXRegion::of(2_699_519, bounds), ChrXRegion::Par1);
        assert_eq!(ChrXRegion::of(2_699_520, bounds), ChrXRegion::NonPar);
        assert_eq!(ChrXRegion::of(154_931_044, bounds), ChrXRegion::NonPar);
        assert_eq!(ChrXRegion::of(154_931_045, bounds), ChrXRegion::Par2);

        let bounds = GenomeBuild::Hg38.non_par_region();
        assert_eq!(ChrXRegion::of(2_781_478, bounds), ChrXRegion::Par1);
        assert_eq!(ChrXRegion::of(155_701_384, bounds), ChrXRegion::Par2);
    }

    #[test]
    fn test_split_and_alias() {
        let dir = TempDir::new().unwrap();
        let input = write_vcf(
            dir.path(),
            &[
                "23\t60000\trs1\tA\tG\t.\tPASS\t.\tGT\t0|1\t0|1",
                "23\t3000000\trs2\tC\tT\t.\tPASS\t.\tGT\t1\t0|1",
                "23\t3000100\trs3\tC\tN\t.\tPASS\t.\tGT\t1\t0|1",
            ],
        );

        let mut stats = QcStatistics::default();
        let mut reports = QcReports::new(dir.path(), None);
        let mut preprocessor = ChrXPreprocessor::new(GenomeBuild::Hg19, 0.1);
        let splits = preprocessor
            .split(&input, &dir.path().join("scratch"), &mut stats, &mut reports)
            .unwrap();

        // no PAR2 variants, so no PAR2 file
        assert_eq!(splits.len(), 2);
        assert_eq!(splits[0].region, ChrXRegion::Par1);
        assert_eq!(splits[1].region, ChrXRegion::NonPar);
        assert!(splits[1].path.ends_with("X.nonPAR.vcf.gz"));
        assert!(!dir.path().join("scratch").join("X.PAR2.vcf.gz").exists());

        let text = read_bgzf(&splits[0].path);
        assert!(text.starts_with("##fileformat=VCFv4.2\n"));
        assert!(text.contains("\nX\t60000\trs1\t"));

        assert_eq!(stats.invalid_alleles, 1);
        assert_eq!(stats.filtered, 1);
        assert_eq!(reports.excluded_snp_rows(), 1);
        assert!(preprocessor.haploid_samples().contains("M1"));
        assert!(!stats.chrx_ploidy_error);
    }

    #[test]
    fn test_ploidy_violation_after_haploid_call() {
        let dir = TempDir::new().unwrap();
        let input = write_vcf(
            dir.path(),
            &[
                // diploid before haploid is not a violation
                "X\t3000000\trs1\tA\tG\t.\tPASS\t.\tGT\t0|1\t0|1",
                "X\t3000100\trs2\tA\tG\t.\tPASS\t.\tGT\t1\t0|1",
                "X\t3000200\trs3\tA\tG\t.\tPASS\t.\tGT\t0|1\t1|1",
            ],
        );

        let mut stats = QcStatistics::default();
        let mut reports = QcReports::new(dir.path(), None);
        let mut preprocessor = ChrXPreprocessor::new(GenomeBuild::Hg19, 0.1);
        preprocessor
            .split(&input, &dir.path().join("scratch"), &mut stats, &mut reports)
            .unwrap();
        reports.flush().unwrap();

        assert!(stats.chrx_ploidy_error);
        assert_eq!(reports.chrx_info_rows(), 1);
        let text = std::fs::read_to_string(dir.path().join(CHRX_INFO_FILE)).unwrap();
        assert_eq!(text, "SAMPLE\tPOSITION\nM1\tX:3000200\n");
    }

    #[test]
    fn test_mixed_genotype_rate() {
        let dir = TempDir::new().unwrap();
        let input = write_vcf(
            dir.path(),
            &[
                "X\t3000000\trs1\tA\tG\t.\tPASS\t.\tGT\t0|1\t.|1",
                "X\t3000100\trs2\tA\tG\t.\tPASS\t.\tGT\t0|1\t0|1",
            ],
        );

        let mut stats = QcStatistics::default();
        let mut reports = QcReports::new(dir.path(), None);
        let mut preprocessor = ChrXPreprocessor::new(GenomeBuild::Hg19, 0.1);
        preprocessor
            .split(&input, &dir.path().join("scratch"), &mut stats, &mut reports)
            .unwrap();
        assert!(stats.chrx_missing_rate);

        let mut stats = QcStatistics::default();
        let mut preprocessor = ChrXPreprocessor::new(GenomeBuild::Hg19, 0.5);
        preprocessor
            .split(&input, &dir.path().join("scratch"), &mut stats, &mut reports)
            .unwrap();
        assert!(!stats.chrx_missing_rate);
    }
}
