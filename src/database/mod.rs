pub mod assemble;
pub mod version;

use std::path::PathBuf;

use thiserror::Error;

use crate::annotation::ParseError;
use crate::sequence::disorder::DisorderError;
use crate::sequence::fasta::FastaError;

#[derive(Error, Debug)]
pub enum AssembleError {
    #[error("FASTA error: {0}")]
    Fasta(#[from] FastaError),

    #[error("Disorder scores: {0}")]
    Disorder(#[from] DisorderError),

    #[error("Source error: {0}")]
    Source(#[from] ParseError),

    #[error("Protein ID '{0}' occurs more than once in the base table")]
    DuplicateId(String),

    #[error("Source name '{0}' is given more than once")]
    DuplicateSource(String),

    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("CSV error on {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Version {version} would drop columns {columns:?} of the previous version")]
    DroppedColumns { version: u32, columns: Vec<String> },

    #[error("{0} already exists")]
    Exists(PathBuf),
}
