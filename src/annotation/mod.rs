/// Parsers for external annotation tool outputs.
///
/// Every parser yields typed records keyed by protein ID plus the optional
/// fields it actually found, and can flatten itself into a `SourceTable` that
/// the database assembler joins onto the base protein table.

pub mod homology;
pub mod interpro;
pub mod orthofinder;
pub mod outgroup;
pub mod signal;

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use thiserror::Error;
use tracing::{info, warn};

use crate::util::{delimiter_for, open_reader};

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Malformed table {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("Mandatory column '{column}' not found in {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("{path}:{line}: expected at least {expected} fields, got {found}")]
    TooFewFields {
        path: PathBuf,
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("{path}:{line}: invalid {field} '{value}'")]
    InvalidField {
        path: PathBuf,
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("Protein '{protein}' is assigned to both {first} and {second}")]
    DuplicateMember {
        protein: String,
        first: String,
        second: String,
    },

    #[error("Regex pattern error: {0}")]
    RegexError(#[from] regex::Error),
}

/// Optional fields a parser found in one input.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Capabilities {
    present: BTreeSet<&'static str>,
}

impl Capabilities {
    pub fn mark(&mut self, field: &'static str) {
        self.present.insert(field);
    }

    pub fn has(&self, field: &str) -> bool {
        self.present.contains(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = &&'static str> {
        self.present.iter()
    }
}

/// `-`, blank and `NA` cells are absent values.
pub(crate) fn optional(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty() && *v != "-" && *v != "NA")
        .map(str::to_string)
}

/// One annotation source flattened to a single row per protein.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceTable {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: BTreeMap<String, Vec<Option<String>>>,
}

impl SourceTable {
    pub fn new<S: Into<String>>(name: S, columns: Vec<String>) -> Self {
        SourceTable {
            name: name.into(),
            columns,
            rows: BTreeMap::new(),
        }
    }

    /// Adds a row; the first row of an ID is kept.
    pub fn insert(&mut self, id: &str, values: Vec<Option<String>>) -> bool {
        if self.rows.contains_key(id) {
            return false;
        }
        let mut values = values;
        values.resize(self.columns.len(), None);
        self.rows.insert(id.to_string(), values);
        true
    }

    pub fn get(&self, id: &str, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(id)?.get(index)?.as_deref()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Loads any delimited file with a header row, keyed by `key_column`.
    pub fn from_delimited(name: &str, path: &Path, key_column: &str) -> Result<Self, ParseError> {
        let reader = open_reader(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut csv_reader = ReaderBuilder::new()
            .delimiter(delimiter_for(path))
            .flexible(true)
            .from_reader(reader);
        let csv_err = |source| ParseError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let headers = csv_reader.headers().map_err(csv_err)?.clone();
        let key_index = headers
            .iter()
            .position(|h| h.trim() == key_column)
            .ok_or_else(|| ParseError::MissingColumn {
                path: path.to_path_buf(),
                column: key_column.to_string(),
            })?;

        let value_indices: Vec<usize> = (0..headers.len()).filter(|&i| i != key_index).collect();
        let columns = value_indices.iter().map(|&i| headers[i].trim().to_string()).collect();
        let mut table = SourceTable::new(name, columns);
        let mut duplicates = 0usize;

        for record in csv_reader.records() {
            let record = record.map_err(csv_err)?;
            let Some(id) = record.get(key_index).map(str::trim).filter(|v| !v.is_empty()) else {
                continue;
            };
            let values = value_indices.iter().map(|&i| optional(record.get(i))).collect();
            if !table.insert(id, values) {
                duplicates += 1;
            }
        }

        if duplicates > 0 {
            warn!("{}: {} duplicate '{}' rows ignored", path.display(), duplicates, key_column);
        }
        info!("Loaded source '{}' with {} rows from {}", name, table.len(), path.display());
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_delimited_keeps_first_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uspnet.csv");
        std::fs::write(&path, "Score,ProteinID,Type\n0.9,P1,SP\n-,P2,NO_SP\n0.1,P1,TAT\n").unwrap();

        let table = SourceTable::from_delimited("uspnet", &path, "ProteinID").unwrap();
        assert_eq!(table.columns, vec!["Score", "Type"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.get("P1", "Type"), Some("SP"));
        assert_eq!(table.get("P2", "Score"), None);
    }

    #[test]
    fn test_from_delimited_missing_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.tsv");
        std::fs::write(&path, "A\tB\n1\t2\n").unwrap();
        assert!(matches!(
            SourceTable::from_delimited("t", &path, "ProteinID"),
            Err(ParseError::MissingColumn { .. })
        ));
    }
}
