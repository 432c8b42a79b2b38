use std::collections::BTreeSet;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use flate2::read::MultiGzDecoder;

/// Opens a file for buffered reading, transparently decompressing `.gz` files.
pub fn open_reader(path: &Path) -> io::Result<Box<dyn BufRead>> {
    let file = File::open(path)?;
    let reader: Box<dyn Read> = if is_gzipped(path) {
        Box::new(MultiGzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(Box::new(BufReader::new(reader)))
}

pub fn is_gzipped(path: &Path) -> bool {
    path.extension().and_then(|e| e.to_str()) == Some("gz")
}

/// File name with a trailing `.gz` removed.
pub fn plain_file_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    name.strip_suffix(".gz").map(str::to_string).unwrap_or(name)
}

const FASTA_EXTENSIONS: [&str; 3] = [".fasta", ".faa", ".fa"];

pub fn is_fasta_path(path: &Path) -> bool {
    let name = plain_file_name(path);
    FASTA_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}

/// Lists FASTA files (plain or gzipped) in a directory, sorted and deduplicated.
pub fn list_fasta_files(dir: &Path) -> io::Result<Vec<PathBuf>> {
    list_files(dir, is_fasta_path)
}

/// Lists regular files in a directory whose name ends with `suffix`.
pub fn list_files_with_suffix(dir: &Path, suffix: &str) -> io::Result<Vec<PathBuf>> {
    list_files(dir, |p| plain_file_name(p).ends_with(suffix))
}

fn list_files<F: Fn(&Path) -> bool>(dir: &Path, keep: F) -> io::Result<Vec<PathBuf>> {
    let mut files = BTreeSet::new();
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && keep(&path) {
            files.insert(path);
        }
    }
    Ok(files.into_iter().collect())
}

/// Strips `suffix` from the file name, falling back to the stem.
pub fn unit_name(path: &Path, suffix: &str) -> String {
    let name = plain_file_name(path);
    if !suffix.is_empty() {
        if let Some(stripped) = name.strip_suffix(suffix) {
            if !stripped.is_empty() {
                return stripped.to_string();
            }
        }
    }
    Path::new(&name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or(name)
}

/// Reads one identifier per line, trimming whitespace and dropping blanks and
/// duplicates while keeping first-seen order.
pub fn read_id_list(path: &Path) -> io::Result<Vec<String>> {
    let reader = open_reader(path)?;
    let mut seen = BTreeSet::new();
    let mut ids = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let id = line.trim();
        if id.is_empty() {
            continue;
        }
        if seen.insert(id.to_string()) {
            ids.push(id.to_string());
        }
    }
    Ok(ids)
}

/// Guesses the delimiter of a table from its file name.
pub fn delimiter_for(path: &Path) -> u8 {
    if plain_file_name(path).ends_with(".csv") {
        b','
    } else {
        b'\t'
    }
}
