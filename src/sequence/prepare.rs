/// Rewrites per-genome NCBI protein files with standardized headers.

use std::path::{Path, PathBuf};

use tracing::{error, info, warn};

use crate::sequence::fasta::{read_records, FastaError, FastaSink};
use crate::sequence::header::{HeaderCleaner, HeaderError};

#[derive(thiserror::Error, Debug)]
pub enum PrepareError {
    #[error("Header error: {0}")]
    Header(#[from] HeaderError),

    #[error("FASTA error: {0}")]
    Fasta(#[from] FastaError),

    #[error("Cannot scan {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, Default)]
pub struct PrepareReport {
    pub genomes: usize,
    pub skipped: Vec<String>,
    pub failed: Vec<String>,
    pub proteins_read: usize,
    pub proteins_written: usize,
}

/// Standardizes one genome's protein file into `<output_dir>/<genome>.fasta`.
/// Returns (read, written).
pub fn prepare_genome(
    cleaner: &HeaderCleaner,
    genome_id: &str,
    input: &Path,
    output_dir: &Path,
) -> Result<(usize, usize), PrepareError> {
    let records = read_records(input)?;
    let output = output_dir.join(format!("{}.fasta", genome_id));
    let mut sink: Option<FastaSink> = None;

    for record in &records {
        if record.id().is_empty() || record.seq().is_empty() {
            warn!("Skipping invalid record '{}' in {}", record.id(), input.display());
            continue;
        }
        let header = cleaner.standardize(record.id(), record.desc().unwrap_or(""), genome_id);
        if sink.is_none() {
            sink = Some(FastaSink::create(&output)?);
        }
        if let Some(sink) = sink.as_mut() {
            sink.write(&header.to_string(), record.seq())?;
        }
    }

    let written = match sink {
        Some(sink) => sink.finish()?,
        None => 0,
    };
    Ok((records.len(), written))
}

/// Processes every genome directory under `input_base` holding `faa_name`.
pub fn prepare_genomes(input_base: &Path, output_dir: &Path, faa_name: &str) -> Result<PrepareReport, PrepareError> {
    let cleaner = HeaderCleaner::new()?;
    let io_err = |source| PrepareError::Io {
        path: input_base.to_path_buf(),
        source,
    };

    let mut genome_dirs = Vec::new();
    for entry in std::fs::read_dir(input_base).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        if path.is_dir() {
            genome_dirs.push(path);
        }
    }
    genome_dirs.sort();
    std::fs::create_dir_all(output_dir).map_err(|source| PrepareError::Io {
        path: output_dir.to_path_buf(),
        source,
    })?;
    info!("Found {} genome directories in {}", genome_dirs.len(), input_base.display());

    let mut report = PrepareReport::default();
    for dir in &genome_dirs {
        let genome_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let input = dir.join(faa_name);
        if !input.is_file() {
            warn!("'{}' not found in {}, skipping genome", faa_name, dir.display());
            report.skipped.push(genome_id);
            continue;
        }

        match prepare_genome(&cleaner, &genome_id, &input, output_dir) {
            Ok((read, written)) => {
                info!("{}: wrote {}/{} proteins", genome_id, written, read);
                report.genomes += 1;
                report.proteins_read += read;
                report.proteins_written += written;
            }
            Err(e) => {
                error!("Error processing {}: {}", input.display(), e);
                report.failed.push(genome_id);
            }
        }
    }
    Ok(report)
}
