/// BLAST-like tabular hits (DIAMOND, MMseqs2, BLAST outfmt 6) and best-hit selection.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;

use csv::WriterBuilder;
use serde::Deserialize;
use strum::IntoEnumIterator;
use strum_macros::{Display, EnumIter, EnumString};
use tracing::{debug, info};

use crate::annotation::{Capabilities, ParseError, SourceTable};
use crate::util::{open_reader, plain_file_name};

pub const FIELD_QLEN: &str = "qlen";
pub const FIELD_SLEN: &str = "slen";

/// Reference database a hit file was searched against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum DatabaseTag {
    #[strum(serialize = "PDB")]
    Pdb,
    #[strum(serialize = "AFDB")]
    Afdb,
    #[strum(serialize = "MGnify")]
    Mgnify,
    #[strum(serialize = "UniRef")]
    Uniref,
    #[strum(serialize = "Other")]
    Other,
}

impl DatabaseTag {
    /// Guesses the tag from a file name such as `loki_vs_pdb.tsv`.
    pub fn from_file_name(path: &Path) -> DatabaseTag {
        let name = plain_file_name(path).to_lowercase();
        DatabaseTag::iter()
            .filter(|t| *t != DatabaseTag::Other)
            .find(|t| name.contains(&t.to_string().to_lowercase()))
            .unwrap_or(DatabaseTag::Other)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HomologyHit {
    pub query: String,
    pub subject: String,
    pub identity: f64,
    pub length: u32,
    pub mismatches: u32,
    pub gap_opens: u32,
    pub query_start: u32,
    pub query_end: u32,
    pub subject_start: u32,
    pub subject_end: u32,
    pub evalue: f64,
    pub bitscore: f64,
    pub query_length: Option<u32>,
    pub subject_length: Option<u32>,
    pub database: DatabaseTag,
}

impl HomologyHit {
    pub fn query_coverage(&self) -> Option<f64> {
        self.query_length
            .filter(|&l| l > 0)
            .map(|l| self.length as f64 / l as f64)
    }

    pub fn subject_coverage(&self) -> Option<f64> {
        self.subject_length
            .filter(|&l| l > 0)
            .map(|l| self.length as f64 / l as f64)
    }

    /// Higher bitscore, then lower e-value, then subject ID.
    pub fn rank(&self, other: &HomologyHit) -> Ordering {
        other
            .bitscore
            .total_cmp(&self.bitscore)
            .then_with(|| self.evalue.total_cmp(&other.evalue))
            .then_with(|| self.subject.cmp(&other.subject))
    }
}

#[derive(Debug, Clone, Default)]
pub struct HomologyHits {
    pub hits: Vec<HomologyHit>,
    pub capabilities: Capabilities,
}

fn parse_number<T: std::str::FromStr>(
    path: &Path,
    line: usize,
    field: &'static str,
    value: &str,
) -> Result<T, ParseError> {
    value.trim().parse::<T>().map_err(|_| ParseError::InvalidField {
        path: path.to_path_buf(),
        line,
        field,
        value: value.to_string(),
    })
}

/// Parses one tabular hit line: 12 mandatory columns, then optional `qlen`, `slen`.
pub fn parse_hit_line(
    path: &Path,
    line_number: usize,
    line: &str,
    database: DatabaseTag,
) -> Result<HomologyHit, ParseError> {
    let f: Vec<&str> = line.split('\t').collect();
    if f.len() < 12 {
        return Err(ParseError::TooFewFields {
            path: path.to_path_buf(),
            line: line_number,
            expected: 12,
            found: f.len(),
        });
    }
    let optional_length = |i: usize| f.get(i).and_then(|v| v.trim().parse::<u32>().ok());

    Ok(HomologyHit {
        query: f[0].trim().to_string(),
        subject: f[1].trim().to_string(),
        identity: parse_number(path, line_number, "pident", f[2])?,
        length: parse_number(path, line_number, "length", f[3])?,
        mismatches: parse_number(path, line_number, "mismatch", f[4])?,
        gap_opens: parse_number(path, line_number, "gapopen", f[5])?,
        query_start: parse_number(path, line_number, "qstart", f[6])?,
        query_end: parse_number(path, line_number, "qend", f[7])?,
        subject_start: parse_number(path, line_number, "sstart", f[8])?,
        subject_end: parse_number(path, line_number, "send", f[9])?,
        evalue: parse_number(path, line_number, "evalue", f[10])?,
        bitscore: parse_number(path, line_number, "bitscore", f[11])?,
        query_length: optional_length(12),
        subject_length: optional_length(13),
        database,
    })
}

pub fn parse_hits(path: &Path, database: DatabaseTag) -> Result<HomologyHits, ParseError> {
    let reader = open_reader(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut parsed = HomologyHits::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let hit = parse_hit_line(path, index + 1, &line, database)?;
        if hit.query_length.is_some() {
            parsed.capabilities.mark(FIELD_QLEN);
        }
        if hit.subject_length.is_some() {
            parsed.capabilities.mark(FIELD_SLEN);
        }
        parsed.hits.push(hit);
    }

    debug!("Parsed {} {} hits from {}", parsed.hits.len(), database, path.display());
    Ok(parsed)
}

/// Optional e-value and coverage cut-offs. A coverage cut-off rejects hits
/// whose coverage cannot be computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HitFilter {
    pub max_evalue: Option<f64>,
    pub min_query_coverage: Option<f64>,
    pub min_subject_coverage: Option<f64>,
}

impl HitFilter {
    pub fn passes(&self, hit: &HomologyHit) -> bool {
        if let Some(max) = self.max_evalue {
            if hit.evalue > max {
                return false;
            }
        }
        if let Some(min) = self.min_query_coverage {
            if !hit.query_coverage().is_some_and(|c| c >= min) {
                return false;
            }
        }
        if let Some(min) = self.min_subject_coverage {
            if !hit.subject_coverage().is_some_and(|c| c >= min) {
                return false;
            }
        }
        true
    }
}

/// Best hit per (query, database), ordered by query then database.
pub fn best_hits(hits: &[HomologyHit], filter: &HitFilter) -> Vec<HomologyHit> {
    let mut best: BTreeMap<(&str, DatabaseTag), &HomologyHit> = BTreeMap::new();
    let mut rejected = 0usize;

    for hit in hits {
        if !filter.passes(hit) {
            rejected += 1;
            continue;
        }
        best.entry((hit.query.as_str(), hit.database))
            .and_modify(|current| {
                if hit.rank(*current) == Ordering::Less {
                    *current = hit;
                }
            })
            .or_insert(hit);
    }

    info!(
        "Selected {} best hits from {} ({} filtered out)",
        best.len(),
        hits.len(),
        rejected
    );
    best.into_values().cloned().collect()
}

const BEST_HIT_HEADER: [&str; 9] = [
    "Query", "Database", "Subject", "Identity", "Length", "Evalue", "Bitscore", "Query_Coverage", "Subject_Coverage",
];

fn format_coverage(coverage: Option<f64>) -> String {
    coverage.map(|c| format!("{:.3}", c)).unwrap_or_default()
}

pub fn write_best_hits(path: &Path, hits: &[HomologyHit]) -> Result<(), ParseError> {
    let csv_err = |source| ParseError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut wtr = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(csv_err)?;
    wtr.write_record(BEST_HIT_HEADER).map_err(csv_err)?;
    for hit in hits {
        wtr.write_record([
            hit.query.clone(),
            hit.database.to_string(),
            hit.subject.clone(),
            format!("{:.2}", hit.identity),
            hit.length.to_string(),
            format!("{:e}", hit.evalue),
            format!("{:.1}", hit.bitscore),
            format_coverage(hit.query_coverage()),
            format_coverage(hit.subject_coverage()),
        ])
        .map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })
}

/// Columns `<DB>_Hit`, `<DB>_Identity`, `<DB>_Evalue`, `<DB>_Bitscore`,
/// `<DB>_Coverage` for every database present in `best`.
pub fn to_source_table(best: &[HomologyHit]) -> SourceTable {
    let mut databases: Vec<DatabaseTag> = best.iter().map(|h| h.database).collect();
    databases.sort();
    databases.dedup();

    let mut columns = Vec::new();
    for db in &databases {
        for suffix in ["Hit", "Identity", "Evalue", "Bitscore", "Coverage"] {
            columns.push(format!("{}_{}", db, suffix));
        }
    }

    let mut rows: BTreeMap<&str, Vec<Option<String>>> = BTreeMap::new();
    for hit in best {
        let Some(slot) = databases.iter().position(|d| *d == hit.database) else {
            continue;
        };
        let row = rows
            .entry(hit.query.as_str())
            .or_insert_with(|| vec![None; columns.len()]);
        let base = slot * 5;
        row[base] = Some(hit.subject.clone());
        row[base + 1] = Some(format!("{:.2}", hit.identity));
        row[base + 2] = Some(format!("{:e}", hit.evalue));
        row[base + 3] = Some(format!("{:.1}", hit.bitscore));
        row[base + 4] = hit.query_coverage().map(|c| format!("{:.3}", c));
    }

    let mut table = SourceTable::new("homology", columns);
    for (query, values) in rows {
        table.insert(query, values);
    }
    table
}
