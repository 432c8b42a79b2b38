/// Concatenation, header-keyword subsets and ID-based extraction of FASTA records.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};

use bio::io::fasta;
use csv::ReaderBuilder;
use regex::{Regex, RegexBuilder};
use thiserror::Error;
use tracing::{info, warn};

use crate::sequence::constants::HEADER_DELIMITER;
use crate::sequence::fasta::{read_records, FastaError, FastaSink};
use crate::sequence::header::lookup_key;
use crate::util::{delimiter_for, list_fasta_files, open_reader, read_id_list, unit_name};

#[derive(Error, Debug)]
pub enum SubsetError {
    #[error("Regex pattern error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("FASTA error: {0}")]
    Fasta(#[from] FastaError),

    #[error("No FASTA files found in {0}")]
    NoInput(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Malformed table {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Column '{column}' not found in {path}")]
    MissingColumn { path: PathBuf, column: String },
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConcatReport {
    pub files: usize,
    pub failed_files: Vec<String>,
    pub written: usize,
    pub invalid: usize,
}

/// Concatenates every FASTA file in `input_dir` into `output`, dropping
/// records with an empty ID or sequence.
pub fn concatenate(input_dir: &Path, output: &Path) -> Result<ConcatReport, SubsetError> {
    let files = list_fasta_files(input_dir).map_err(|source| SubsetError::Io {
        path: input_dir.to_path_buf(),
        source,
    })?;
    if files.is_empty() {
        return Err(SubsetError::NoInput(input_dir.to_path_buf()));
    }
    info!("Concatenating {} FASTA files into {}", files.len(), output.display());

    let mut sink = FastaSink::create(output)?;
    let mut report = ConcatReport::default();

    for path in &files {
        let records = match read_records(path) {
            Ok(records) => records,
            Err(e) => {
                warn!("Could not read {}: {}", path.display(), e);
                report.failed_files.push(path.display().to_string());
                continue;
            }
        };
        for record in &records {
            if record.id().is_empty() || record.seq().is_empty() {
                warn!("Skipping invalid record '{}' in {}", record.id(), path.display());
                report.invalid += 1;
                continue;
            }
            sink.write_record(record)?;
        }
        report.files += 1;
    }

    report.written = sink.finish()?;
    info!("Wrote {} records from {} files", report.written, report.files);
    Ok(report)
}

/// Keeps records whose header name field is blank or mentions a keyword.
pub struct KeywordSubset {
    patterns: Vec<Regex>,
    field_index: usize,
}

impl KeywordSubset {
    pub fn new<S: AsRef<str>>(keywords: &[S], field_index: usize) -> Result<Self, SubsetError> {
        let patterns = keywords
            .iter()
            .map(|kw| {
                RegexBuilder::new(&regex::escape(kw.as_ref()))
                    .case_insensitive(true)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(KeywordSubset { patterns, field_index })
    }

    pub fn keeps(&self, id: &str) -> bool {
        let fields: Vec<&str> = id.split(HEADER_DELIMITER).collect();
        let Some(name) = fields.get(self.field_index) else {
            warn!("Header has fewer than {} fields, keeping: {}", self.field_index + 1, id);
            return true;
        };
        let name = name.trim();
        name.is_empty() || self.patterns.iter().any(|p| p.is_match(name))
    }

    /// Writes the matching records of `input` to `output`; returns (read, written).
    pub fn apply(&self, input: &Path, output: &Path) -> Result<(usize, usize), SubsetError> {
        let records = read_records(input)?;
        let mut sink = FastaSink::create(output)?;
        for record in records.iter().filter(|r| self.keeps(r.id())) {
            sink.write_record(record)?;
        }
        let written = sink.finish()?;
        info!("Kept {}/{} records matching header keywords", written, records.len());
        Ok((records.len(), written))
    }
}

/// In-memory reference FASTA addressable by full ID or by lookup key.
pub struct ReferenceIndex {
    records: Vec<fasta::Record>,
    by_id: HashMap<String, usize>,
    by_key: HashMap<String, usize>,
}

impl ReferenceIndex {
    pub fn from_path(path: &Path) -> Result<Self, SubsetError> {
        info!("Indexing reference FASTA {}", path.display());
        Ok(Self::from_records(read_records(path)?))
    }

    pub fn from_records(records: Vec<fasta::Record>) -> Self {
        let mut by_id = HashMap::new();
        let mut by_key = HashMap::new();
        let mut duplicates = 0usize;

        for (index, record) in records.iter().enumerate() {
            by_id.entry(record.id().to_string()).or_insert(index);
            let key = lookup_key(record.id());
            if key.is_empty() {
                continue;
            }
            if by_key.contains_key(key) {
                duplicates += 1;
            } else {
                by_key.insert(key.to_string(), index);
            }
        }
        if duplicates > 0 {
            warn!("{} lookup keys map to several records; the first record is used", duplicates);
        }
        info!("Indexed {} sequences", records.len());

        ReferenceIndex { records, by_id, by_key }
    }

    pub fn get(&self, id: &str) -> Option<&fasta::Record> {
        let id = id.trim();
        self.by_id
            .get(id)
            .or_else(|| self.by_key.get(lookup_key(id)))
            .map(|&i| &self.records[i])
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Reads IDs either from a plain list or from a named column of a hits table.
pub fn read_ids(path: &Path, column: Option<&str>) -> Result<Vec<String>, SubsetError> {
    let Some(column) = column else {
        return read_id_list(path).map_err(|source| SubsetError::Io {
            path: path.to_path_buf(),
            source,
        });
    };

    let reader = open_reader(path).map_err(|source| SubsetError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(delimiter_for(path))
        .flexible(true)
        .from_reader(reader);
    let csv_err = |source| SubsetError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let headers = csv_reader.headers().map_err(csv_err)?.clone();
    let index = headers
        .iter()
        .position(|h| h.trim() == column)
        .ok_or_else(|| SubsetError::MissingColumn {
            path: path.to_path_buf(),
            column: column.to_string(),
        })?;

    let mut seen = BTreeSet::new();
    let mut ids = Vec::new();
    for record in csv_reader.records() {
        let record = record.map_err(csv_err)?;
        if let Some(id) = record.get(index).map(str::trim).filter(|v| !v.is_empty()) {
            if seen.insert(id.to_string()) {
                ids.push(id.to_string());
            }
        }
    }
    Ok(ids)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractReport {
    pub unit: String,
    pub requested: usize,
    pub written: usize,
    pub missing: Vec<String>,
}

/// Writes one FASTA per ID list; output is `<unit>_extracted_sequences.fasta`.
pub fn extract_by_ids(
    index: &ReferenceIndex,
    id_files: &[PathBuf],
    column: Option<&str>,
    output_dir: &Path,
) -> Result<Vec<ExtractReport>, SubsetError> {
    std::fs::create_dir_all(output_dir).map_err(|source| SubsetError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;

    let mut reports = Vec::new();
    for file in id_files {
        let unit = unit_name(file, "");
        let ids = match read_ids(file, column) {
            Ok(ids) => ids,
            Err(e) => {
                warn!("Skipping {}: {}", file.display(), e);
                continue;
            }
        };

        let output = output_dir.join(format!("{}_extracted_sequences.fasta", unit));
        let mut sink = FastaSink::create(&output)?;
        let mut missing = Vec::new();
        for id in &ids {
            match index.get(id) {
                Some(record) => sink.write_record(record)?,
                None => missing.push(id.clone()),
            }
        }
        let written = sink.finish()?;
        if !missing.is_empty() {
            warn!("{}: {} of {} IDs not found in reference", unit, missing.len(), ids.len());
        }
        reports.push(ExtractReport {
            unit,
            requested: ids.len(),
            written,
            missing,
        });
    }
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequence::constants::{DEFAULT_HYPOTHETICAL_KEYWORDS, NAME_FIELD_INDEX};

    #[test]
    fn test_keyword_subset() {
        let subset = KeywordSubset::new(&DEFAULT_HYPOTHETICAL_KEYWORDS, NAME_FIELD_INDEX).unwrap();
        assert!(subset.keeps("P1|G|S|hypothetical|"));
        assert!(subset.keeps("P2|G|S|annotated|DUF3524_domain_protein"));
        assert!(subset.keeps("P3|G|S|annotated|Uncharacterized_protein"));
        assert!(!subset.keeps("P4|G|S|annotated|DNA_polymerase"));
        assert!(subset.keeps("P5|short"));
    }

    #[test]
    fn test_reference_index_falls_back_to_lookup_key() {
        let records = vec![
            fasta::Record::with_attrs("P1|G|S|annotated|Kinase", None, b"MK"),
            fasta::Record::with_attrs("P2|G|S|hypothetical|", None, b"MKL"),
            fasta::Record::with_attrs("P1|G2|S|hypothetical|", None, b"MA"),
        ];
        let index = ReferenceIndex::from_records(records);
        assert_eq!(index.get("P2").unwrap().seq(), b"MKL");
        assert_eq!(index.get("P1").unwrap().seq(), b"MK");
        assert_eq!(index.get("P1|G2|S|hypothetical|").unwrap().seq(), b"MA");
        assert!(index.get("P9").is_none());
    }

    #[test]
    fn test_extract_from_hits_column() {
        let dir = tempfile::tempdir().unwrap();
        let hits = dir.path().join("OG0000001_hits.tsv");
        std::fs::write(&hits, "qseqid\tsseqid\nq\tP1\nq\tP9\nq\tP1\n").unwrap();

        let index = ReferenceIndex::from_records(vec![fasta::Record::with_attrs("P1|G|S|annotated|K", None, b"MK")]);
        let out = dir.path().join("out");
        let reports = extract_by_ids(&index, &[hits], Some("sseqid"), &out).unwrap();

        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].unit, "OG0000001_hits");
        assert_eq!(reports[0].requested, 2);
        assert_eq!(reports[0].written, 1);
        assert_eq!(reports[0].missing, vec!["P9".to_string()]);
        assert!(out.join("OG0000001_hits_extracted_sequences.fasta").exists());
    }

    #[test]
    fn test_concatenate_skips_empty_records() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(input.join("a.faa"), ">A1\nMK\n>A2\n\n").unwrap();
        std::fs::write(input.join("b.fasta"), ">B1\nMKL\n").unwrap();

        let output = dir.path().join("all.faa");
        let report = concatenate(&input, &output).unwrap();
        assert_eq!(report.files, 2);
        assert_eq!(report.written, 2);
        assert_eq!(report.invalid, 1);
    }
}
