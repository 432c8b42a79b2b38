use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use bio::io::fasta;
use thiserror::Error;

use crate::sequence::constants::LINE_WIDTH;
use crate::util::open_reader;

#[derive(Error, Debug)]
pub enum FastaError {
    #[error("Cannot open {path}: {source}")]
    Open { path: PathBuf, source: io::Error },

    #[error("Malformed FASTA in {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("Cannot write {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Reads every record of a (possibly gzipped) FASTA file.
pub fn read_records(path: &Path) -> Result<Vec<fasta::Record>, FastaError> {
    let reader = open_reader(path).map_err(|source| FastaError::Open {
        path: path.to_path_buf(),
        source,
    })?;

    fasta::Reader::new(reader)
        .records()
        .map(|r| {
            r.map_err(|source| FastaError::Read {
                path: path.to_path_buf(),
                source,
            })
        })
        .collect()
}

/// Full header text of a record, as it appeared after `>`.
pub fn header_of(record: &fasta::Record) -> String {
    match record.desc() {
        Some(desc) if !desc.is_empty() => format!("{} {}", record.id(), desc),
        _ => record.id().to_string(),
    }
}

/// Buffered FASTA writer wrapping sequences at a fixed line width.
pub struct FastaSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: usize,
}

impl FastaSink {
    pub fn create(path: &Path) -> Result<Self, FastaError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| FastaError::Write {
                    path: path.to_path_buf(),
                    source,
                })?;
            }
        }
        let file = File::create(path).map_err(|source| FastaError::Write {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(FastaSink {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn write_record(&mut self, record: &fasta::Record) -> Result<(), FastaError> {
        self.write(&header_of(record), record.seq())
    }

    pub fn write(&mut self, header: &str, seq: &[u8]) -> Result<(), FastaError> {
        self.write_lines(header, seq).map_err(|source| FastaError::Write {
            path: self.path.clone(),
            source,
        })?;
        self.written += 1;
        Ok(())
    }

    fn write_lines(&mut self, header: &str, seq: &[u8]) -> io::Result<()> {
        writeln!(self.writer, ">{}", header)?;
        for chunk in seq.chunks(LINE_WIDTH) {
            self.writer.write_all(chunk)?;
            self.writer.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Flushes the file and returns how many records were written.
    pub fn finish(mut self) -> Result<usize, FastaError> {
        self.writer.flush().map_err(|source| FastaError::Write {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.written)
    }
}
