pub mod external;
pub mod pool;

use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Failed to build worker pool: {0}")]
    Build(#[from] rayon::ThreadPoolBuildError),

    #[error("Executable '{program}' not found: {source}")]
    MissingExecutable { program: String, source: which::Error },

    #[error("No '*{suffix}' files in {dir}")]
    NoUnits { dir: PathBuf, suffix: String },

    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("CSV error on {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
}
