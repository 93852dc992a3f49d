// ==============================================================================
// parsers/vcf.rs - Streaming VCF reader
// ==============================================================================
// Description: Single-pass reader decoding VCF lines into minimal variant records
// Author: Matt Barham
// Created: 2025-11-03
// Modified: 2026-02-10
// Version: 2.0.1
// ==============================================================================
// References:
// - VCF 4.2 Spec: https://samtools.github.io/hts-specs/VCFv4.2.pdf
// ==============================================================================

use flate2::read::MultiGzDecoder;
use noodles_vcf::{self as vcf, header::ParseError};
use std::fs::File;
use std::io::{BufRead, BufReader, Lines, Read, Seek, SeekFrom};
use std::path::Path;
use thiserror::Error;

use crate::genotype::{parse_genotype, Genotype, GenotypeClass, GenotypeParseError};

/// Columns before the first sample (CHROM..FORMAT)
pub const FIXED_COLUMNS: usize = 9;

/// Minimum columns of a site line (CHROM..INFO)
pub const MIN_COLUMNS: usize = 8;

/// VCF parsing errors
#[derive(Error, Debug)]
pub enum VcfParseError {
    #[error("Failed to open VCF file: {0}")]
    FileOpenError(String),

    #[error("Header line '#CHROM' not found in file {0}")]
    MissingHeader(String),

    #[error("Two individuals or more have the following ID: {0}")]
    DuplicateSample(String),

    #[error("Invalid VCF header: {0}")]
    HeaderError(String),

    #[error("Line {line}: expected at least {expected} tab-separated columns, found {found}")]
    TooFewColumns {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("Line {0}: different number of samples.")]
    SampleCountMismatch(usize),

    #[error("Line {line}: invalid position '{value}'")]
    InvalidPosition { line: usize, value: String },

    #[error("Line {line}: {source}")]
    InvalidGenotype {
        line: usize,
        #[source]
        source: GenotypeParseError,
    },

    #[error("The provided VCF file is malformed at variation {id}: reference allele ({reference}) and alternate allele ({alternate}) are the same.")]
    IdenticalAlleles {
        id: String,
        reference: String,
        alternate: String,
    },

    #[error("The provided VCF file is not tab-delimited")]
    NotTabDelimited,

    #[error("The provided VCF file contains more than one chromosome. Please split your input VCF file by chromosome")]
    MultipleChromosomes,

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Aggregate genotype counts of one site
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GenotypeTallies {
    pub het: usize,
    pub hom_ref: usize,
    pub hom_var: usize,
    pub no_call: usize,
    pub samples: usize,
}

/// One VCF data line with the fields the QC pass needs
#[derive(Debug, Clone)]
pub struct VariantRecord {
    pub contig: String,

    /// 1-based position
    pub position: u64,

    /// ID column, or `contig:pos:ref:alt` when the column is `.`
    pub id: String,

    pub reference: String,

    /// Raw ALT column; a comma marks a multiallelic site
    pub alternate: String,

    /// Raw FILTER column
    pub filter: String,

    /// Per-sample calls in header order
    pub genotypes: Vec<Genotype>,

    pub tallies: GenotypeTallies,

    /// Original text line, written through to chunk files
    pub raw: String,
}

impl VariantRecord {
    /// Decode one tab-separated data line
    ///
    /// # Arguments
    /// * `line` - Data line without trailing newline
    /// * `line_number` - 1-based line number for error messages
    /// * `expected_samples` - Sample count declared by the header
    pub fn parse(
        line: &str,
        line_number: usize,
        expected_samples: usize,
    ) -> Result<Self, VcfParseError> {
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < MIN_COLUMNS {
            return Err(VcfParseError::TooFewColumns {
                line: line_number,
                expected: MIN_COLUMNS,
                found: fields.len(),
            });
        }

        let declared_samples = fields.len().saturating_sub(FIXED_COLUMNS);
        if declared_samples != expected_samples {
            return Err(VcfParseError::SampleCountMismatch(line_number));
        }

        let contig = fields[0].to_string();
        let position = fields[1]
            .parse::<u64>()
            .map_err(|_| VcfParseError::InvalidPosition {
                line: line_number,
                value: fields[1].to_string(),
            })?;
        let reference = fields[3].to_string();
        let alternate = fields[4].to_string();

        let id = if fields[2].is_empty() || fields[2] == "." {
            format!("{}:{}:{}:{}", contig, position, reference, alternate)
        } else {
            fields[2].to_string()
        };

        if reference == alternate {
            return Err(VcfParseError::IdenticalAlleles {
                id,
                reference,
                alternate,
            });
        }

        let mut tallies = GenotypeTallies {
            samples: declared_samples,
            ..Default::default()
        };
        let mut genotypes = Vec::with_capacity(declared_samples);

        for sample in fields.iter().skip(FIXED_COLUMNS) {
            let genotype = parse_genotype(sample).map_err(|source| {
                VcfParseError::InvalidGenotype {
                    line: line_number,
                    source,
                }
            })?;

            match genotype.class {
                GenotypeClass::HomRef => tallies.hom_ref += 1,
                GenotypeClass::Het => tallies.het += 1,
                GenotypeClass::HomVar => tallies.hom_var += 1,
                GenotypeClass::NoCall => tallies.no_call += 1,
                GenotypeClass::Mixed => {}
            }
            genotypes.push(genotype);
        }

        Ok(VariantRecord {
            contig,
            position,
            id,
            reference,
            alternate,
            filter: fields[6].to_string(),
            genotypes,
            tallies,
            raw: line.to_string(),
        })
    }

    pub fn is_multiallelic(&self) -> bool {
        self.alternate.contains(',')
    }

    pub fn is_indel(&self) -> bool {
        self.reference.len() > 1 || self.alternate.len() > 1
    }

    /// FILTER is set to anything other than `PASS` or missing
    pub fn is_filtered(&self) -> bool {
        !(self.filter.is_empty() || self.filter == "." || self.filter == "PASS")
    }

    /// All samples are homozygous reference or missing
    pub fn is_monomorphic(&self) -> bool {
        self.tallies.hom_ref + self.tallies.no_call == self.tallies.samples
    }

    /// Alternate allele frequency over called diploid samples
    pub fn alternate_allele_frequency(&self) -> f64 {
        let alt = (self.tallies.het + 2 * self.tallies.hom_var) as f64;
        let called = (self.tallies.samples - self.tallies.no_call) as f64;
        alt / (called * 2.0)
    }

    /// Fraction of samples without a call
    pub fn no_call_rate(&self) -> f64 {
        self.tallies.no_call as f64 / self.tallies.samples as f64
    }

    pub fn is_called(&self, sample: usize) -> bool {
        self.genotypes
            .get(sample)
            .map(|gt| gt.is_called())
            .unwrap_or(false)
    }
}

/// Header block of a VCF file
#[derive(Debug, Clone, Default)]
pub struct VcfHeader {
    /// All `#`-prefixed lines in file order
    pub lines: Vec<String>,
    pub samples: Vec<String>,
    /// `##fileformat` value, e.g. `VCFv4.2`
    pub file_format: String,
}

impl VcfHeader {
    /// Parse the header lines with noodles, validating the `#CHROM` sample columns
    pub fn from_lines(lines: Vec<String>, source: &str) -> Result<Self, VcfParseError> {
        if !lines.iter().any(|l| l.starts_with("#CHROM")) {
            return Err(VcfParseError::MissingHeader(source.to_string()));
        }

        let header: vcf::Header = lines.join("\n").parse().map_err(|e| match e {
            ParseError::DuplicateSampleName(name) => VcfParseError::DuplicateSample(name),
            ParseError::MissingHeader => VcfParseError::MissingHeader(source.to_string()),
            e => VcfParseError::HeaderError(format!("{}: {}", source, e)),
        })?;

        let samples = header.sample_names().iter().cloned().collect();
        let format = header.file_format();

        Ok(Self {
            lines,
            samples,
            file_format: format!("VCFv{}.{}", format.major(), format.minor()),
        })
    }

    /// Header as VCF text, one line per entry
    pub fn to_text(&self) -> String {
        let mut text = self.lines.join("\n");
        text.push('\n');
        text
    }
}

/// Open a text file, transparently decompressing gzip and BGZF
pub fn open_text(path: &Path) -> std::io::Result<Box<dyn BufRead + Send>> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 2];
    let read = file.read(&mut magic)?;
    file.seek(SeekFrom::Start(0))?;

    if read == 2 && magic == [0x1f, 0x8b] {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

/// Forward-only VCF reader
pub struct VcfReader {
    header: VcfHeader,
    lines: Lines<Box<dyn BufRead + Send>>,
    line_number: usize,
    pending: Option<String>,
}

impl VcfReader {
    /// Open a VCF file and read its header block
    ///
    /// # Arguments
    /// * `path` - Path to a `.vcf` or `.vcf.gz` file
    ///
    /// # Returns
    /// * `Result<VcfReader, VcfParseError>` - Reader positioned at the first data line
    pub fn open(path: impl AsRef<Path>) -> Result<Self, VcfParseError> {
        let path = path.as_ref();
        let reader = open_text(path)
            .map_err(|e| VcfParseError::FileOpenError(format!("{}: {}", path.display(), e)))?;

        let mut lines = reader.lines();
        let mut header_lines = Vec::new();
        let mut line_number = 0;
        let mut pending = None;

        for line in lines.by_ref() {
            let line = line?;
            line_number += 1;
            if line.starts_with('#') {
                header_lines.push(line);
            } else {
                pending = Some(line);
                break;
            }
        }

        let header = VcfHeader::from_lines(header_lines, &path.display().to_string())?;

        Ok(Self {
            header,
            lines,
            line_number,
            pending,
        })
    }

    pub fn header(&self) -> &VcfHeader {
        &self.header
    }

    pub fn samples(&self) -> usize {
        self.header.samples.len()
    }

    /// Next non-empty data line and its 1-based line number
    fn next_line(&mut self) -> Option<Result<(usize, String), VcfParseError>> {
        if let Some(line) = self.pending.take() {
            if !line.trim().is_empty() {
                return Some(Ok((self.line_number, line)));
            }
        }

        for line in self.lines.by_ref() {
            self.line_number += 1;
            match line {
                Ok(line) if line.trim().is_empty() => continue,
                Ok(line) => return Some(Ok((self.line_number, line))),
                Err(e) => return Some(Err(e.into())),
            }
        }

        None
    }
}

impl Iterator for VcfReader {
    type Item = Result<VariantRecord, VcfParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        let samples = self.samples();
        self.next_line().map(|line| {
            line.and_then(|(number, text)| VariantRecord::parse(&text, number, samples))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\tS3\n";

    fn create_test_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_record() {
        let line = "1\t100\trs1\tA\tG\t.\tPASS\t.\tGT\t0|1\t1|1\t.|.";
        let record = VariantRecord::parse(line, 3, 3).unwrap();

        assert_eq!(record.contig, "1");
        assert_eq!(record.position, 100);
        assert_eq!(record.id, "rs1");
        assert_eq!(record.tallies.het, 1);
        assert_eq!(record.tallies.hom_var, 1);
        assert_eq!(record.tallies.no_call, 1);
        assert!(!record.is_filtered());
        assert!(record.is_called(0));
        assert!(!record.is_called(2));
        assert_eq!(record.raw, line);
        // (1 + 2*2) / ((3 - 1) * 2)
        assert!((record.alternate_allele_frequency() - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_derived_id() {
        let line = "20\t1234\t.\tC\tT\t.\t.\t.\tGT\t0/0";
        let record = VariantRecord::parse(line, 1, 1).unwrap();
        assert_eq!(record.id, "20:1234:C:T");
    }

    #[test]
    fn test_site_classification() {
        let multi = VariantRecord::parse("1\t1\t.\tA\tG,T\t.\t.\t.\tGT\t0/1", 1, 1).unwrap();
        assert!(multi.is_multiallelic());

        let indel = VariantRecord::parse("1\t1\t.\tAT\tA\t.\t.\t.\tGT\t0/1", 1, 1).unwrap();
        assert!(indel.is_indel());

        let filtered = VariantRecord::parse("1\t1\t.\tA\tG\t.\tLowQual\t.\tGT\t0/1", 1, 1).unwrap();
        assert!(filtered.is_filtered());

        let mono = VariantRecord::parse("1\t1\t.\tA\tG\t.\t.\t.\tGT\t0/0\t./.", 1, 2).unwrap();
        assert!(mono.is_monomorphic());
    }

    #[test]
    fn test_identical_alleles() {
        let result = VariantRecord::parse("1\t100\trs9\tA\tA\t.\t.\t.\tGT\t0/1", 7, 1);
        match result.unwrap_err() {
            VcfParseError::IdenticalAlleles { id, reference, .. } => {
                assert_eq!(id, "rs9");
                assert_eq!(reference, "A");
            }
            e => panic!("Expected IdenticalAlleles error, got {:?}", e),
        }
    }

    #[test]
    fn test_too_few_columns() {
        let result = VariantRecord::parse("1\t100\trs1\tA", 4, 0);
        match result.unwrap_err() {
            VcfParseError::TooFewColumns { line, found, .. } => {
                assert_eq!(line, 4);
                assert_eq!(found, 4);
            }
            e => panic!("Expected TooFewColumns error, got {:?}", e),
        }
    }

    #[test]
    fn test_reader_plain_text() {
        let content = format!(
            "{}1\t100\trs1\tA\tG\t.\tPASS\t.\tGT\t0|1\t0|0\t1|1\n1\t200\trs2\tC\tT\t.\tPASS\t.\tGT\t0|0\t0|0\t0|1\n",
            HEADER
        );
        let file = create_test_file(&content);

        let reader = VcfReader::open(file.path()).unwrap();
        assert_eq!(reader.header().samples, vec!["S1", "S2", "S3"]);
        assert_eq!(reader.header().lines.len(), 2);

        let records: Vec<_> = reader.collect::<Result<_, _>>().unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].position, 200);
    }

    #[test]
    fn test_reader_gzip() {
        let content = format!("{}1\t100\trs1\tA\tG\t.\tPASS\t.\tGT\t0|1\t0|0\t1|1\n", HEADER);
        let mut file = NamedTempFile::new().unwrap();
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        file.write_all(&encoder.finish().unwrap()).unwrap();
        file.flush().unwrap();

        let records: Vec<_> = VcfReader::open(file.path())
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "rs1");
    }

    #[test]
    fn test_sample_count_mismatch() {
        let content = format!(
            "{}1\t100\trs1\tA\tG\t.\tPASS\t.\tGT\t0|1\t0|0\t1|1\n1\t200\trs2\tC\tT\t.\tPASS\t.\tGT\t0|0\n",
            HEADER
        );
        let file = create_test_file(&content);

        let results: Vec<_> = VcfReader::open(file.path()).unwrap().collect();
        assert!(results[0].is_ok());
        match &results[1] {
            Err(e @ VcfParseError::SampleCountMismatch(4)) => {
                assert_eq!(e.to_string(), "Line 4: different number of samples.");
            }
            other => panic!("Expected SampleCountMismatch error, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_sample() {
        let content = "##fileformat=VCFv4.2\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\tS2\tS1\n";
        let file = create_test_file(content);

        match VcfReader::open(file.path()) {
            Err(VcfParseError::DuplicateSample(sample)) => assert_eq!(sample, "S1"),
            Err(e) => panic!("Expected DuplicateSample error, got {:?}", e),
            Ok(_) => panic!("Expected DuplicateSample error"),
        }
    }

    #[test]
    fn test_header_from_noodles() {
        let content = format!("{}1\t100\trs1\tA\tG\t.\tPASS\t.\tGT\t0|1\t0|0\t1|1\n", HEADER);
        let file = create_test_file(&content);

        let reader = VcfReader::open(file.path()).unwrap();
        assert_eq!(reader.header().samples, vec!["S1", "S2", "S3"]);
        assert_eq!(reader.header().file_format, "VCFv4.2");
        assert_eq!(reader.header().lines.len(), 2);
    }

    #[test]
    fn test_invalid_header() {
        let content = "##fileformat=VCFv4.2\n##INFO=<ID=DP\n#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";
        let file = create_test_file(content);
        assert!(matches!(
            VcfReader::open(file.path()),
            Err(VcfParseError::HeaderError(_))
        ));
    }

    #[test]
    fn test_missing_header() {
        let file = create_test_file("1\t100\trs1\tA\tG\t.\tPASS\t.\n");
        assert!(matches!(
            VcfReader::open(file.path()),
            Err(VcfParseError::MissingHeader(_))
        ));
    }
}
