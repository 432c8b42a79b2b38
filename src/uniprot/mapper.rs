/// Batch resolution of protein IDs into external identifier spaces.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::{BufRead, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use csv::{ReaderBuilder, WriterBuilder};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::uniprot::models::{IdSpace, LookupFailure, MappingOutcome};
use crate::util::open_reader;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {status} for '{id}'")]
    Status { id: String, status: u16 },

    #[error("Unexpected response for '{id}': {detail}")]
    UnexpectedResponse { id: String, detail: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("CSV error on {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },
}

/// A service that resolves one identifier at a time.
///
/// `Ok(None)` means the ID has no counterpart in the target space, which is an
/// expected outcome. `Err` means the lookup itself failed.
pub trait AccessionService {
    fn space(&self) -> IdSpace;

    /// Remote services are throttled by the batch rate limiter.
    fn is_remote(&self) -> bool {
        true
    }

    fn lookup(&self, id: &str) -> Result<Option<String>, MapperError>;
}

/// Enforces a minimum delay between consecutive requests of this process.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration) -> Self {
        RateLimiter {
            min_delay,
            last: Mutex::new(None),
        }
    }

    pub fn min_delay(&self) -> Duration {
        self.min_delay
    }

    /// Blocks until at least `min_delay` has passed since the previous call.
    pub fn wait(&self) {
        let mut last = self.last.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                std::thread::sleep(self.min_delay - elapsed);
            }
        }
        *last = Some(Instant::now());
    }
}

/// Resolves every ID with `service`. A failed lookup never aborts the batch;
/// it is logged, listed as not found and described in `failures`.
pub fn map_batch(ids: &[String], service: &dyn AccessionService, limiter: &RateLimiter) -> MappingOutcome {
    let mut outcome = MappingOutcome::default();
    let mut seen = BTreeSet::new();
    let total = ids.len();

    for (index, raw) in ids.iter().enumerate() {
        let id = raw.trim();
        if id.is_empty() || !seen.insert(id.to_string()) {
            continue;
        }
        if (index + 1) % 100 == 0 || index + 1 == total {
            info!("Processing {}/{}: {}", index + 1, total, id);
        }

        if service.is_remote() {
            limiter.wait();
        }

        match service.lookup(id) {
            Ok(Some(target)) => {
                debug!("Resolved {} -> {}", id, target);
                outcome.resolved.insert(id.to_string(), target);
            }
            Ok(None) => {
                debug!("No {} entry for {}", service.space(), id);
                outcome.not_found.push(id.to_string());
            }
            Err(e) => {
                warn!("Lookup failed for {}: {}", id, e);
                outcome.not_found.push(id.to_string());
                outcome.failures.push(LookupFailure {
                    id: id.to_string(),
                    error: e.to_string(),
                });
            }
        }
    }

    outcome.not_found.sort();
    outcome
}

/// In-memory two-column mapping (`query<TAB>target`), first row per query wins.
#[derive(Debug, Default, Clone)]
pub struct ReferenceTable {
    entries: HashMap<String, String>,
}

impl ReferenceTable {
    pub fn from_path(path: &Path) -> Result<Self, MapperError> {
        let reader = open_reader(path).map_err(|source| MapperError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut entries = HashMap::new();
        for line in reader.lines() {
            let line = line.map_err(|source| MapperError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if line.trim().is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let query = fields.next().unwrap_or("").trim();
            let target = fields.next().unwrap_or("").trim();
            if query.is_empty() || target.is_empty() {
                continue;
            }
            entries
                .entry(query.to_string())
                .or_insert_with(|| target.to_string());
        }
        info!("Loaded {} reference mappings from {}", entries.len(), path.display());
        Ok(ReferenceTable { entries })
    }

    pub fn insert(&mut self, query: &str, target: &str) {
        self.entries.insert(query.to_string(), target.to_string());
    }
}

impl AccessionService for ReferenceTable {
    fn space(&self) -> IdSpace {
        IdSpace::Table
    }

    fn is_remote(&self) -> bool {
        false
    }

    fn lookup(&self, id: &str) -> Result<Option<String>, MapperError> {
        Ok(self.entries.get(id).cloned())
    }
}

/// Paths of the three files produced for one mapping run.
#[derive(Debug, Clone)]
pub struct MappingFiles {
    pub mapping: PathBuf,
    pub not_found: PathBuf,
    pub errors: PathBuf,
}

impl MappingFiles {
    pub fn new(dir: &Path, prefix: &str, space: IdSpace) -> Self {
        MappingFiles {
            mapping: dir.join(format!("{}_{}_mapping.tsv", prefix, space)),
            not_found: dir.join(format!("{}_{}_notfound.txt", prefix, space)),
            errors: dir.join(format!("{}_{}_errors.json", prefix, space)),
        }
    }

    /// Outcome of an earlier run, without its failures so they are retried.
    pub fn load_previous(&self) -> Result<MappingOutcome, MapperError> {
        let mut previous = MappingOutcome::default();

        if self.mapping.is_file() {
            let mut reader = ReaderBuilder::new()
                .delimiter(b'\t')
                .flexible(true)
                .from_path(&self.mapping)
                .map_err(|source| MapperError::Csv {
                    path: self.mapping.clone(),
                    source,
                })?;
            for record in reader.records() {
                let record = record.map_err(|source| MapperError::Csv {
                    path: self.mapping.clone(),
                    source,
                })?;
                if let (Some(query), Some(target)) = (record.get(0), record.get(1)) {
                    if !query.is_empty() {
                        previous.resolved.insert(query.to_string(), target.to_string());
                    }
                }
            }
        }

        if self.not_found.is_file() {
            let failed: BTreeSet<String> = self.previous_failures()?;
            let reader = open_reader(&self.not_found).map_err(|source| MapperError::Io {
                path: self.not_found.clone(),
                source,
            })?;
            for line in reader.lines() {
                let line = line.map_err(|source| MapperError::Io {
                    path: self.not_found.clone(),
                    source,
                })?;
                let id = line.trim();
                if !id.is_empty() && !failed.contains(id) {
                    previous.not_found.push(id.to_string());
                }
            }
        }

        Ok(previous)
    }

    fn previous_failures(&self) -> Result<BTreeSet<String>, MapperError> {
        if !self.errors.is_file() {
            return Ok(BTreeSet::new());
        }
        let text = std::fs::read_to_string(&self.errors).map_err(|source| MapperError::Io {
            path: self.errors.clone(),
            source,
        })?;
        let value: serde_json::Value = serde_json::from_str(&text)?;
        Ok(value
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| item.get("id").and_then(|id| id.as_str()))
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default())
    }

    /// Writes mapping TSV, sorted not-found list and the error log.
    pub fn write(&self, outcome: &MappingOutcome, space: IdSpace) -> Result<(), MapperError> {
        let mut wtr = WriterBuilder::new()
            .delimiter(b'\t')
            .from_path(&self.mapping)
            .map_err(|source| MapperError::Csv {
                path: self.mapping.clone(),
                source,
            })?;
        let csv_err = |source| MapperError::Csv {
            path: self.mapping.clone(),
            source,
        };
        wtr.write_record(["Input_ID", space.column()]).map_err(csv_err)?;
        for (query, target) in &outcome.resolved {
            wtr.write_record([query, target]).map_err(csv_err)?;
        }
        wtr.flush().map_err(|source| MapperError::Io {
            path: self.mapping.clone(),
            source,
        })?;

        let not_found: BTreeSet<&String> = outcome.not_found.iter().collect();
        write_lines(&self.not_found, not_found.into_iter())?;

        let json = serde_json::to_string_pretty(&outcome.failures)?;
        std::fs::write(&self.errors, json).map_err(|source| MapperError::Io {
            path: self.errors.clone(),
            source,
        })?;
        Ok(())
    }
}

fn write_lines<'a>(path: &Path, lines: impl Iterator<Item = &'a String>) -> Result<(), MapperError> {
    let io_err = |source| MapperError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut writer = BufWriter::new(File::create(path).map_err(io_err)?);
    for line in lines {
        writeln!(writer, "{}", line).map_err(io_err)?;
    }
    writer.flush().map_err(io_err)
}

/// Merges a resumed run into the outcome of the earlier one.
pub fn merge_outcomes(previous: MappingOutcome, current: MappingOutcome) -> MappingOutcome {
    let mut resolved: BTreeMap<String, String> = previous.resolved;
    resolved.extend(current.resolved);

    let mut not_found: BTreeSet<String> = previous.not_found.into_iter().collect();
    not_found.extend(current.not_found);
    not_found.retain(|id| !resolved.contains_key(id));

    MappingOutcome {
        resolved,
        not_found: not_found.into_iter().collect(),
        failures: current.failures,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    /// Fails for every ID ending in a digit divisible by 20.
    struct FlakyService {
        calls: Cell<usize>,
    }

    impl AccessionService for FlakyService {
        fn space(&self) -> IdSpace {
            IdSpace::Uniparc
        }

        fn lookup(&self, id: &str) -> Result<Option<String>, MapperError> {
            self.calls.set(self.calls.get() + 1);
            let n: usize = id.trim_start_matches("P").parse().unwrap();
            if n % 20 == 0 {
                Err(MapperError::Status {
                    id: id.to_string(),
                    status: 503,
                })
            } else {
                Ok(Some(format!("UPI{:010}", n)))
            }
        }
    }

    #[test]
    fn test_partial_failure_does_not_abort_batch() {
        let ids: Vec<String> = (1..=100).map(|n| format!("P{}", n)).collect();
        let service = FlakyService { calls: Cell::new(0) };
        let limiter = RateLimiter::new(Duration::ZERO);

        let outcome = map_batch(&ids, &service, &limiter);

        assert_eq!(service.calls.get(), 100);
        assert_eq!(outcome.resolved.len(), 95);
        assert_eq!(outcome.not_found.len(), 5);
        assert_eq!(outcome.failures.len(), 5);
        assert_eq!(outcome.resolved.get("P1").map(String::as_str), Some("UPI0000000001"));
        assert!(outcome.not_found.contains(&"P40".to_string()));
    }

    #[test]
    fn test_reference_table_lookup_and_dedup() {
        let mut table = ReferenceTable::default();
        table.insert("WP_1", "P12345");
        let ids = vec!["WP_1".to_string(), "WP_2".to_string(), " WP_1 ".to_string()];
        let outcome = map_batch(&ids, &table, &RateLimiter::new(Duration::from_secs(10)));

        assert_eq!(outcome.resolved.len(), 1);
        assert_eq!(outcome.not_found, vec!["WP_2".to_string()]);
        assert!(outcome.failures.is_empty());
    }

    #[test]
    fn test_rate_limiter_enforces_min_delay() {
        let limiter = RateLimiter::new(Duration::from_millis(30));
        let start = Instant::now();
        limiter.wait();
        limiter.wait();
        limiter.wait();
        assert!(start.elapsed() >= Duration::from_millis(60));
    }

    #[test]
    fn test_write_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let files = MappingFiles::new(dir.path(), "loki", IdSpace::Uniparc);

        let mut first = MappingOutcome::default();
        first.resolved.insert("A".into(), "UPI1".into());
        first.not_found = vec!["B".into(), "C".into()];
        first.failures.push(LookupFailure {
            id: "C".into(),
            error: "timeout".into(),
        });
        files.write(&first, IdSpace::Uniparc).unwrap();

        let previous = files.load_previous().unwrap();
        assert_eq!(previous.resolved.get("A").map(String::as_str), Some("UPI1"));
        assert_eq!(previous.not_found, vec!["B".to_string()]);

        let mut second = MappingOutcome::default();
        second.resolved.insert("C".into(), "UPI3".into());
        let merged = merge_outcomes(previous, second);
        assert_eq!(merged.resolved.len(), 2);
        assert_eq!(merged.not_found, vec!["B".to_string()]);

        let text = std::fs::read_to_string(&files.mapping).unwrap();
        assert!(text.starts_with("Input_ID\tUniParc_ID\n"));
    }
}
