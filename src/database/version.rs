/// Versioned snapshots of the integrated database.
///
/// Each write produces `<stem>_v<N>.tsv` next to a `<stem>_v<N>.manifest.json`.
/// Existing versions are never overwritten.

use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use csv::WriterBuilder;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::database::assemble::{Assembled, KEY_COLUMN};
use crate::database::AssembleError;
use crate::util::open_reader;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSummary {
    pub name: String,
    pub rows: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub version: u32,
    pub created_unix: u64,
    pub previous: Option<String>,
    pub sources: Vec<SourceSummary>,
    pub precedence: Vec<String>,
    pub rows: usize,
    pub columns: Vec<String>,
    pub dropped_columns: Vec<String>,
    pub unmatched_source_rows: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct WrittenVersion {
    pub version: u32,
    pub table: PathBuf,
    pub manifest: PathBuf,
    pub dropped_columns: Vec<String>,
}

/// Highest existing `<stem>_v<N>.tsv` in `dir`, if any.
pub fn latest_version(dir: &Path, stem: &str) -> Result<Option<(u32, PathBuf)>, AssembleError> {
    if !dir.is_dir() {
        return Ok(None);
    }
    let prefix = format!("{}_v", stem);
    let mut latest: Option<(u32, PathBuf)> = None;

    for entry in std::fs::read_dir(dir).map_err(|source| AssembleError::Io {
        path: dir.to_path_buf(),
        source,
    })? {
        let path = entry
            .map_err(|source| AssembleError::Io {
                path: dir.to_path_buf(),
                source,
            })?
            .path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(version) = name
            .strip_prefix(&prefix)
            .and_then(|rest| rest.strip_suffix(".tsv"))
            .and_then(|n| n.parse::<u32>().ok())
        else {
            continue;
        };
        if latest.as_ref().map_or(true, |(v, _)| version > *v) {
            latest = Some((version, path));
        }
    }
    Ok(latest)
}

fn read_columns(path: &Path) -> Result<Vec<String>, AssembleError> {
    let io_err = |source| AssembleError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut reader = open_reader(path).map_err(io_err)?;
    let mut header = String::new();
    reader.read_line(&mut header).map_err(io_err)?;
    Ok(header
        .trim_end_matches(['\n', '\r'])
        .split('\t')
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect())
}

pub struct VersionWriter<'a> {
    pub dir: &'a Path,
    pub stem: &'a str,
    pub allow_dropped_columns: bool,
}

impl VersionWriter<'_> {
    /// Writes the next version. Columns present in the previous version but
    /// absent now abort the write unless explicitly allowed.
    pub fn write(
        &self,
        db: &Assembled,
        sources: Vec<SourceSummary>,
        precedence: &[String],
    ) -> Result<WrittenVersion, AssembleError> {
        std::fs::create_dir_all(self.dir).map_err(|source| AssembleError::Io {
            path: self.dir.to_path_buf(),
            source,
        })?;

        let previous = latest_version(self.dir, self.stem)?;
        let version = previous.as_ref().map_or(1, |(v, _)| v + 1);

        let mut new_columns = vec![KEY_COLUMN.to_string()];
        new_columns.extend(db.columns.iter().cloned());

        let dropped_columns: Vec<String> = match &previous {
            Some((_, path)) => read_columns(path)?
                .into_iter()
                .filter(|c| !new_columns.contains(c))
                .collect(),
            None => Vec::new(),
        };
        if !dropped_columns.is_empty() {
            if !self.allow_dropped_columns {
                return Err(AssembleError::DroppedColumns {
                    version,
                    columns: dropped_columns,
                });
            }
            warn!("Version {} drops columns {:?}", version, dropped_columns);
        }

        let table = self.dir.join(format!("{}_v{}.tsv", self.stem, version));
        let manifest_path = self.dir.join(format!("{}_v{}.manifest.json", self.stem, version));

        let manifest = Manifest {
            version,
            created_unix: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or_default(),
            previous: previous
                .as_ref()
                .and_then(|(_, p)| p.file_name())
                .map(|n| n.to_string_lossy().to_string()),
            sources,
            precedence: precedence.to_vec(),
            rows: db.rows.len(),
            columns: new_columns.clone(),
            dropped_columns: dropped_columns.clone(),
            unmatched_source_rows: db.unmatched.clone(),
        };

        // claim the manifest first; a table without one would count as a version
        let manifest_file = create_new(&manifest_path)?;
        if let Err(e) = write_table(&table, &new_columns, db) {
            if !matches!(e, AssembleError::Exists(_)) {
                remove_partial(&table);
            }
            remove_partial(&manifest_path);
            return Err(e);
        }
        if let Err(e) = serde_json::to_writer_pretty(manifest_file, &manifest) {
            remove_partial(&table);
            remove_partial(&manifest_path);
            return Err(e.into());
        }

        info!("Wrote database version {} to {}", version, table.display());
        Ok(WrittenVersion {
            version,
            table,
            manifest: manifest_path,
            dropped_columns,
        })
    }
}

fn remove_partial(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        warn!("Cannot remove partial {}: {}", path.display(), e);
    }
}

fn create_new(path: &Path) -> Result<std::fs::File, AssembleError> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|source| {
            if source.kind() == std::io::ErrorKind::AlreadyExists {
                AssembleError::Exists(path.to_path_buf())
            } else {
                AssembleError::Io {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })
}

fn write_table(path: &Path, columns: &[String], db: &Assembled) -> Result<(), AssembleError> {
    let csv_err = |source| AssembleError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut wtr = WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(create_new(path)?);
    wtr.write_record(columns).map_err(csv_err)?;
    for (id, row) in &db.rows {
        let mut record = Vec::with_capacity(columns.len());
        record.push(id.as_str());
        record.extend(row.iter().map(|v| v.as_deref().unwrap_or("")));
        wtr.write_record(&record).map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| AssembleError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db(columns: &[&str]) -> Assembled {
        let mut rows = BTreeMap::new();
        rows.insert(
            "P1".to_string(),
            columns.iter().map(|c| Some(format!("{}_value", c))).collect(),
        );
        Assembled {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows,
            unmatched: BTreeMap::new(),
        }
    }

    #[test]
    fn test_versions_increment_and_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let writer = VersionWriter {
            dir: dir.path(),
            stem: "integrated",
            allow_dropped_columns: false,
        };

        let v1 = writer.write(&db(&["Length"]), Vec::new(), &[]).unwrap();
        assert_eq!(v1.version, 1);
        let v2 = writer.write(&db(&["Length", "Orthogroup"]), Vec::new(), &[]).unwrap();
        assert_eq!(v2.version, 2);
        assert!(v2.table.ends_with("integrated_v2.tsv"));

        let text = std::fs::read_to_string(&v1.table).unwrap();
        assert_eq!(text, "ProteinID\tLength\nP1\tLength_value\n");

        let manifest: Manifest = serde_json::from_str(&std::fs::read_to_string(&v2.manifest).unwrap()).unwrap();
        assert_eq!(manifest.previous.as_deref(), Some("integrated_v1.tsv"));
        assert_eq!(manifest.columns, vec!["ProteinID", "Length", "Orthogroup"]);
    }

    #[test]
    fn test_dropped_columns_need_permission() {
        let dir = tempfile::tempdir().unwrap();
        let strict = VersionWriter {
            dir: dir.path(),
            stem: "db",
            allow_dropped_columns: false,
        };
        strict.write(&db(&["Length", "Orthogroup"]), Vec::new(), &[]).unwrap();

        let err = strict.write(&db(&["Length"]), Vec::new(), &[]).unwrap_err();
        assert!(matches!(err, AssembleError::DroppedColumns { version: 2, .. }));
        assert!(!dir.path().join("db_v2.tsv").exists());

        let lenient = VersionWriter {
            allow_dropped_columns: true,
            ..strict
        };
        let written = lenient.write(&db(&["Length"]), Vec::new(), &[]).unwrap();
        assert_eq!(written.dropped_columns, vec!["Orthogroup"]);
        let manifest: Manifest = serde_json::from_str(&std::fs::read_to_string(&written.manifest).unwrap()).unwrap();
        assert_eq!(manifest.dropped_columns, vec!["Orthogroup"]);
    }

    #[test]
    fn test_failed_manifest_leaves_no_table() {
        let dir = tempfile::tempdir().unwrap();
        let writer = VersionWriter {
            dir: dir.path(),
            stem: "db",
            allow_dropped_columns: false,
        };
        let stale = dir.path().join("db_v1.manifest.json");
        std::fs::write(&stale, "{}").unwrap();

        let err = writer.write(&db(&["Length"]), Vec::new(), &[]).unwrap_err();
        assert!(matches!(err, AssembleError::Exists(ref p) if *p == stale));
        assert!(!dir.path().join("db_v1.tsv").exists());
        assert_eq!(std::fs::read_to_string(&stale).unwrap(), "{}");
        assert!(latest_version(dir.path(), "db").unwrap().is_none());

        std::fs::remove_file(&stale).unwrap();
        let written = writer.write(&db(&["Length"]), Vec::new(), &[]).unwrap();
        assert_eq!(written.version, 1);
        assert!(written.manifest.exists());
    }
}
