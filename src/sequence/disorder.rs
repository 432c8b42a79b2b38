/// Mean disorder scores produced by an external predictor (e.g. Metapredict).

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;
use tracing::warn;

use crate::sequence::header::lookup_key;
use crate::util::{delimiter_for, open_reader};

#[derive(Error, Debug)]
pub enum DisorderError {
    #[error("Cannot read disorder scores {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Malformed disorder table {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Disorder table {0} contains no scores")]
    Empty(PathBuf),
}

#[derive(Debug, Default, Clone)]
pub struct DisorderScores {
    scores: HashMap<String, f64>,
    pub invalid_rows: usize,
}

impl DisorderScores {
    /// Loads `id, score[, score...]` rows. Several numeric columns are treated
    /// as per-residue scores and averaged. A header row is detected and skipped.
    pub fn from_path(path: &Path) -> Result<Self, DisorderError> {
        let reader = open_reader(path).map_err(|source| DisorderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(delimiter_for(path))
            .has_headers(false)
            .flexible(true)
            .comment(Some(b'#'))
            .from_reader(reader);

        let mut table = DisorderScores::default();

        for (index, record) in csv_reader.records().enumerate() {
            let record = record.map_err(|source| DisorderError::Csv {
                path: path.to_path_buf(),
                source,
            })?;
            let Some(id) = record.get(0).map(str::trim).filter(|id| !id.is_empty()) else {
                continue;
            };

            match mean_score(record.iter().skip(1)) {
                Some(score) => {
                    if !table.insert(id, score) {
                        warn!("Duplicate disorder score for '{}' in {}, keeping the first", id, path.display());
                        table.invalid_rows += 1;
                    }
                }
                None if index == 0 => {}
                None => {
                    warn!("No numeric disorder score for '{}' in {}", id, path.display());
                    table.invalid_rows += 1;
                }
            }
        }

        if table.scores.is_empty() {
            return Err(DisorderError::Empty(path.to_path_buf()));
        }
        Ok(table)
    }

    /// Adds a score unless `id` already has one. Returns false for duplicates.
    pub fn insert(&mut self, id: &str, score: f64) -> bool {
        match self.scores.entry(id.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(score);
                true
            }
        }
    }

    /// Score for a record ID, matching the full ID first and then its lookup key.
    pub fn get(&self, id: &str) -> Option<f64> {
        self.scores
            .get(id)
            .or_else(|| self.scores.get(lookup_key(id)))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}

fn mean_score<'a>(values: impl Iterator<Item = &'a str>) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for value in values {
        let value = value.trim();
        if value.is_empty() {
            continue;
        }
        match value.parse::<f64>() {
            Ok(v) if v.is_finite() => {
                sum += v;
                count += 1;
            }
            _ => return None,
        }
    }
    if count == 0 {
        None
    } else {
        Some(sum / count as f64)
    }
}
