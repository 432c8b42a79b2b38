/// Partitions protein sequences by length, ambiguous residues and predicted disorder.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use csv::Writer;
use serde::Deserialize;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::sequence::constants;
use crate::sequence::disorder::DisorderScores;
use crate::sequence::fasta::{read_records, FastaError, FastaSink};
use crate::util::{list_fasta_files, plain_file_name};

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("Invalid length bounds: min {min} > max {max}")]
    InvalidBounds { min: usize, max: usize },

    #[error("Invalid disorder threshold: {0}")]
    InvalidThreshold(f64),

    #[error("No FASTA files found in {0}")]
    NoInput(PathBuf),

    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("FASTA error: {0}")]
    Fasta(#[from] FastaError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// The four output buckets. Every input sequence lands in exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumIter)]
pub enum Bucket {
    #[strum(serialize = "length_rejected")]
    LengthRejected,
    #[strum(serialize = "skipped")]
    Skipped,
    #[strum(serialize = "disorder_rejected")]
    DisorderRejected,
    #[strum(serialize = "retained")]
    Retained,
}

#[derive(Debug, Clone, Copy, PartialEq, Display)]
pub enum SkipReason {
    #[strum(serialize = "ambiguous residue")]
    AmbiguousResidue,
    #[strum(serialize = "no disorder score")]
    NoDisorderScore,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    LengthRejected { length: usize },
    Skipped(SkipReason),
    DisorderRejected { score: f64 },
    Retained { score: Option<f64> },
}

impl Verdict {
    pub fn bucket(&self) -> Bucket {
        match self {
            Verdict::LengthRejected { .. } => Bucket::LengthRejected,
            Verdict::Skipped(_) => Bucket::Skipped,
            Verdict::DisorderRejected { .. } => Bucket::DisorderRejected,
            Verdict::Retained { .. } => Bucket::Retained,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterParams {
    pub min_length: usize,
    pub max_length: usize,
    pub disorder_threshold: Option<f64>,
    pub ambiguous_residues: String,
}

impl Default for FilterParams {
    fn default() -> Self {
        FilterParams {
            min_length: constants::DEFAULT_MIN_LENGTH,
            max_length: constants::DEFAULT_MAX_LENGTH,
            disorder_threshold: Some(constants::DEFAULT_DISORDER_THRESHOLD),
            ambiguous_residues: constants::DEFAULT_AMBIGUOUS_RESIDUES.to_string(),
        }
    }
}

impl FilterParams {
    pub fn validate(&self) -> Result<(), FilterError> {
        if self.min_length > self.max_length {
            return Err(FilterError::InvalidBounds {
                min: self.min_length,
                max: self.max_length,
            });
        }
        if let Some(threshold) = self.disorder_threshold {
            if !threshold.is_finite() {
                return Err(FilterError::InvalidThreshold(threshold));
            }
        }
        Ok(())
    }

    fn is_ambiguous(&self, residue: u8) -> bool {
        let residue = residue.to_ascii_uppercase();
        self.ambiguous_residues
            .bytes()
            .any(|code| code.to_ascii_uppercase() == residue)
    }

    /// Classifies one sequence. Length is checked first, then ambiguous
    /// residues, then disorder; `score >= threshold` counts as disordered.
    pub fn classify(&self, seq: &[u8], score: Option<f64>) -> Verdict {
        let length = seq.len();
        if length < self.min_length || length > self.max_length {
            return Verdict::LengthRejected { length };
        }

        if seq.iter().any(|&r| self.is_ambiguous(r)) {
            return Verdict::Skipped(SkipReason::AmbiguousResidue);
        }

        let Some(threshold) = self.disorder_threshold else {
            return Verdict::Retained { score };
        };

        match score {
            None => Verdict::Skipped(SkipReason::NoDisorderScore),
            Some(score) if score >= threshold => Verdict::DisorderRejected { score },
            Some(score) => Verdict::Retained { score: Some(score) },
        }
    }
}

/// Number of sequences that ended up in each bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketCounts {
    counts: BTreeMap<Bucket, u64>,
}

impl BucketCounts {
    pub fn add(&mut self, bucket: Bucket) {
        *self.counts.entry(bucket).or_insert(0) += 1;
    }

    pub fn add_many(&mut self, bucket: Bucket, n: u64) {
        if n > 0 {
            *self.counts.entry(bucket).or_insert(0) += n;
        }
    }

    pub fn get(&self, bucket: Bucket) -> u64 {
        self.counts.get(&bucket).copied().unwrap_or(0)
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    pub fn write_csv(&self, path: &Path) -> Result<(), FilterError> {
        let mut wtr = Writer::from_path(path)?;
        wtr.write_record(["Bucket", "Count"])?;
        for bucket in Bucket::iter() {
            wtr.write_record([bucket.to_string(), self.get(bucket).to_string()])?;
        }
        wtr.write_record(["total".to_string(), self.total().to_string()])?;
        wtr.flush().map_err(|source| FilterError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }
}

/// Writers for the rejected buckets, shared across all input files.
pub struct RejectSinks {
    length: FastaSink,
    skipped: FastaSink,
    disordered: FastaSink,
}

impl RejectSinks {
    pub fn create(dir: &Path) -> Result<Self, FilterError> {
        Ok(RejectSinks {
            length: FastaSink::create(&dir.join(format!("{}.fasta", Bucket::LengthRejected)))?,
            skipped: FastaSink::create(&dir.join(format!("{}.fasta", Bucket::Skipped)))?,
            disordered: FastaSink::create(&dir.join(format!("{}.fasta", Bucket::DisorderRejected)))?,
        })
    }

    fn sink_for(&mut self, bucket: Bucket) -> Option<&mut FastaSink> {
        match bucket {
            Bucket::LengthRejected => Some(&mut self.length),
            Bucket::Skipped => Some(&mut self.skipped),
            Bucket::DisorderRejected => Some(&mut self.disordered),
            Bucket::Retained => None,
        }
    }

    pub fn finish(self) -> Result<(), FilterError> {
        self.length.finish()?;
        self.skipped.finish()?;
        self.disordered.finish()?;
        Ok(())
    }
}

/// Filters one FASTA file; retained records go to `retained_path`, which is
/// only created when something is retained.
///
/// `counts` only receives records that reached disk. Rejected records are
/// counted as they are written to the shared sinks; retained records are
/// counted once their file is complete. On error the partial retained file is
/// removed, so the counts still describe the FASTA files left behind.
pub fn filter_file(
    input: &Path,
    retained_path: &Path,
    params: &FilterParams,
    scores: Option<&DisorderScores>,
    rejects: &mut RejectSinks,
    counts: &mut BucketCounts,
) -> Result<(), FilterError> {
    let records = read_records(input)?;
    let mut retained: Option<FastaSink> = None;
    let mut retained_count = 0u64;

    let written = (|| -> Result<(), FilterError> {
        for record in &records {
            let score = scores.and_then(|s| s.get(record.id()));
            let verdict = params.classify(record.seq(), score);
            let bucket = verdict.bucket();

            if let Verdict::Skipped(reason) = verdict {
                tracing::debug!("Skipping '{}' in {}: {}", record.id(), input.display(), reason);
            }

            match rejects.sink_for(bucket) {
                Some(sink) => {
                    sink.write_record(record)?;
                    counts.add(bucket);
                }
                None => {
                    if retained.is_none() {
                        retained = Some(FastaSink::create(retained_path)?);
                    }
                    if let Some(sink) = retained.as_mut() {
                        sink.write_record(record)?;
                        retained_count += 1;
                    }
                }
            }
        }
        if let Some(sink) = retained.take() {
            sink.finish()?;
        }
        Ok(())
    })();

    match written {
        Ok(()) => {
            counts.add_many(Bucket::Retained, retained_count);
            Ok(())
        }
        Err(e) => {
            // close the writer before removing its file
            if retained.take().is_some() || retained_count > 0 {
                if let Err(remove) = std::fs::remove_file(retained_path) {
                    warn!("Cannot remove partial {}: {}", retained_path.display(), remove);
                }
            }
            Err(e)
        }
    }
}

#[derive(Debug, Default)]
pub struct FilterReport {
    pub counts: BucketCounts,
    pub files_processed: usize,
    pub failed_files: Vec<String>,
}

/// Filters every FASTA file in `input_dir`. A file that fails to parse is
/// logged and reported; the remaining files are still processed.
pub fn filter_directory(
    input_dir: &Path,
    output_dir: &Path,
    rejected_dir: &Path,
    params: &FilterParams,
    scores: Option<&DisorderScores>,
) -> Result<FilterReport, FilterError> {
    params.validate()?;

    let files = list_fasta_files(input_dir).map_err(|source| FilterError::Io {
        path: input_dir.to_path_buf(),
        source,
    })?;
    if files.is_empty() {
        return Err(FilterError::NoInput(input_dir.to_path_buf()));
    }

    for dir in [output_dir, rejected_dir] {
        std::fs::create_dir_all(dir).map_err(|source| FilterError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    info!("Filtering {} FASTA files from {}", files.len(), input_dir.display());
    info!(
        "Length {}-{}, disorder threshold {:?}, ambiguous residues '{}'",
        params.min_length, params.max_length, params.disorder_threshold, params.ambiguous_residues
    );

    let mut rejects = RejectSinks::create(rejected_dir)?;
    let mut report = FilterReport::default();

    for (index, path) in files.iter().enumerate() {
        let name = plain_file_name(path);
        let retained_path = output_dir.join(&name);
        info!("Processing file {}/{}: {}", index + 1, files.len(), name);

        match filter_file(path, &retained_path, params, scores, &mut rejects, &mut report.counts) {
            Ok(()) => report.files_processed += 1,
            Err(e) => {
                error!("Failed to filter {}: {}", name, e);
                report.failed_files.push(name);
            }
        }
    }

    rejects.finish()?;
    report.counts.write_csv(&rejected_dir.join("bucket_counts.csv"))?;

    info!(
        "Retained {}/{} sequences ({} length, {} skipped, {} disordered)",
        report.counts.get(Bucket::Retained),
        report.counts.total(),
        report.counts.get(Bucket::LengthRejected),
        report.counts.get(Bucket::Skipped),
        report.counts.get(Bucket::DisorderRejected),
    );
    if !report.failed_files.is_empty() {
        warn!("Filtering failed for {} files: {}", report.failed_files.len(), report.failed_files.join(", "));
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(min: usize, max: usize, threshold: Option<f64>) -> FilterParams {
        FilterParams {
            min_length: min,
            max_length: max,
            disorder_threshold: threshold,
            ambiguous_residues: "BJXZ".to_string(),
        }
    }

    #[test]
    fn test_length_bounds_are_inclusive() {
        let p = params(80, 100, None);
        assert_eq!(p.classify(&[b'A'; 80], None).bucket(), Bucket::Retained);
        assert_eq!(p.classify(&[b'A'; 100], None).bucket(), Bucket::Retained);
        assert_eq!(p.classify(&[b'A'; 79], None).bucket(), Bucket::LengthRejected);
        assert_eq!(p.classify(&[b'A'; 101], None).bucket(), Bucket::LengthRejected);
    }

    #[test]
    fn test_ambiguous_residue_beats_disorder() {
        let p = params(1, 1000, Some(0.5));
        let mut seq = vec![b'M'; 120];
        seq[10] = b'x';
        assert_eq!(
            p.classify(&seq, Some(0.9)),
            Verdict::Skipped(SkipReason::AmbiguousResidue)
        );
        assert_eq!(
            p.classify(&seq, Some(0.1)),
            Verdict::Skipped(SkipReason::AmbiguousResidue)
        );
    }

    #[test]
    fn test_disorder_threshold_boundary() {
        let p = params(1, 1000, Some(0.5));
        let seq = vec![b'M'; 120];
        assert_eq!(p.classify(&seq, Some(0.5)).bucket(), Bucket::DisorderRejected);
        assert_eq!(p.classify(&seq, Some(0.49)).bucket(), Bucket::Retained);
        assert_eq!(
            p.classify(&seq, None),
            Verdict::Skipped(SkipReason::NoDisorderScore)
        );
    }

    #[test]
    fn test_invalid_bounds() {
        assert!(matches!(
            params(100, 10, None).validate(),
            Err(FilterError::InvalidBounds { .. })
        ));
    }

    #[test]
    fn test_three_sequence_scenario_partitions_input() {
        let dir = tempfile::tempdir().unwrap();
        let input_dir = dir.path().join("in");
        std::fs::create_dir_all(&input_dir).unwrap();

        let mut sink = FastaSink::create(&input_dir.join("genome.faa")).unwrap();
        sink.write("short", &[b'M'; 50]).unwrap();
        sink.write("floppy", &[b'S'; 120]).unwrap();
        sink.write("globular", &[b'L'; 200]).unwrap();
        sink.finish().unwrap();

        let mut scores = DisorderScores::default();
        scores.insert("short", 0.1);
        scores.insert("floppy", 0.8);
        scores.insert("globular", 0.2);

        let out = dir.path().join("out");
        let rejected = dir.path().join("rejected");
        let report =
            filter_directory(&input_dir, &out, &rejected, &params(80, 1000, Some(0.5)), Some(&scores)).unwrap();

        assert_eq!(report.counts.get(Bucket::LengthRejected), 1);
        assert_eq!(report.counts.get(Bucket::DisorderRejected), 1);
        assert_eq!(report.counts.get(Bucket::Retained), 1);
        assert_eq!(report.counts.get(Bucket::Skipped), 0);
        assert_eq!(report.counts.total(), 3);

        let kept = read_records(&out.join("genome.faa")).unwrap();
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id(), "globular");

        let disordered = read_records(&rejected.join("disorder_rejected.fasta")).unwrap();
        assert_eq!(disordered[0].id(), "floppy");
        let short = read_records(&rejected.join("length_rejected.fasta")).unwrap();
        assert_eq!(short[0].id(), "short");

        let summary = std::fs::read_to_string(rejected.join("bucket_counts.csv")).unwrap();
        assert!(summary.contains("retained,1"));
        assert!(summary.contains("total,3"));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let p = params(10, 500, Some(0.4));
        let seqs: Vec<Vec<u8>> = vec![vec![b'A'; 5], vec![b'X'; 20], vec![b'G'; 30], vec![b'G'; 40]];
        let scores = [Some(0.9), Some(0.1), Some(0.4), None];

        let first: Vec<Bucket> = seqs.iter().zip(scores).map(|(s, sc)| p.classify(s, sc).bucket()).collect();
        let second: Vec<Bucket> = seqs.iter().zip(scores).map(|(s, sc)| p.classify(s, sc).bucket()).collect();
        assert_eq!(first, second);
        assert_eq!(
            first,
            vec![Bucket::LengthRejected, Bucket::Skipped, Bucket::DisorderRejected, Bucket::Skipped]
        );
    }

    #[test]
    fn test_failed_file_counts_only_records_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let input_dir = dir.path().join("in");
        std::fs::create_dir_all(&input_dir).unwrap();

        let mut sink = FastaSink::create(&input_dir.join("genome.faa")).unwrap();
        sink.write("short", &[b'M'; 20]).unwrap();
        sink.write("globular", &[b'L'; 200]).unwrap();
        sink.finish().unwrap();

        // the retained output cannot be created over a directory
        let out = dir.path().join("out");
        std::fs::create_dir_all(out.join("genome.faa")).unwrap();
        let rejected = dir.path().join("rejected");
        let report = filter_directory(&input_dir, &out, &rejected, &params(80, 1000, None), None).unwrap();

        assert_eq!(report.failed_files, vec!["genome.faa"]);
        assert_eq!(report.files_processed, 0);
        assert_eq!(report.counts.get(Bucket::LengthRejected), 1);
        assert_eq!(report.counts.get(Bucket::Retained), 0);
        assert_eq!(report.counts.total(), 1);

        let short = read_records(&rejected.join("length_rejected.fasta")).unwrap();
        assert_eq!(short.len(), 1);
        let summary = std::fs::read_to_string(rejected.join("bucket_counts.csv")).unwrap();
        assert!(summary.contains("length_rejected,1"));
        assert!(summary.contains("total,1"));
    }
}
