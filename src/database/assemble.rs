/// Left join of annotation sources onto the base protein table.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::PathBuf;

use tracing::{info, warn};

use crate::annotation::SourceTable;
use crate::database::AssembleError;
use crate::sequence::disorder::DisorderScores;
use crate::sequence::fasta::read_records;
use crate::sequence::header::{lookup_key, StandardHeader};
use crate::uniprot::models::{IdSpace, StructureStatus};

pub const KEY_COLUMN: &str = "ProteinID";
const BASE_COLUMNS: [&str; 5] = ["GenomeID", "Source", "AnnotationType", "Name", "Length"];

/// Builds the base identity table from standardized FASTA files. Records whose
/// header is not standardized keep their ID and length only.
pub fn base_from_fasta(
    fasta_files: &[PathBuf],
    disorder: Option<(&DisorderScores, f64)>,
) -> Result<SourceTable, AssembleError> {
    let mut columns: Vec<String> = BASE_COLUMNS.iter().map(|c| c.to_string()).collect();
    if disorder.is_some() {
        columns.push("Percent_Disorder".to_string());
        columns.push("Globular".to_string());
    }
    let mut base = SourceTable::new("base", columns);
    let mut unstandardized = 0usize;

    for path in fasta_files {
        for record in read_records(path)? {
            let (id, mut values) = match StandardHeader::parse(record.id()) {
                Ok(h) => (
                    h.protein_id.clone(),
                    vec![
                        Some(h.genome_id),
                        Some(h.source),
                        Some(h.annotation_type.to_string()),
                        h.name,
                    ],
                ),
                Err(_) => {
                    unstandardized += 1;
                    (record.id().to_string(), vec![None, None, None, None])
                }
            };
            values.push(Some(record.seq().len().to_string()));

            if let Some((scores, threshold)) = disorder {
                let score = scores.get(record.id()).or_else(|| scores.get(&id));
                values.push(score.map(|s| format!("{:.2}", s * 100.0)));
                values.push(score.map(|s| if s < threshold { "True" } else { "False" }.to_string()));
            }

            if !base.insert(&id, values) {
                return Err(AssembleError::DuplicateId(id));
            }
        }
    }

    if unstandardized > 0 {
        warn!("{} records without standardized headers in the base table", unstandardized);
    }
    info!("Base table holds {} proteins from {} files", base.len(), fasta_files.len());
    Ok(base)
}

/// The joined table.
#[derive(Debug, Clone, PartialEq)]
pub struct Assembled {
    pub columns: Vec<String>,
    pub rows: BTreeMap<String, Vec<Option<String>>>,
    /// Source rows whose ID is not in the base table, per source.
    pub unmatched: BTreeMap<String, usize>,
}

impl Assembled {
    pub fn get(&self, id: &str, column: &str) -> Option<&str> {
        let index = self.columns.iter().position(|c| c == column)?;
        self.rows.get(id)?.get(index)?.as_deref()
    }

    /// Derives `Known_Structure` and `Structure_Status` from the PDB and
    /// AlphaFold DB mapping columns. Returns false when neither is present.
    pub fn add_structure_status(&mut self, plddt_cutoff: f64) -> bool {
        let pdb = self.columns.iter().position(|c| c == IdSpace::Pdb.column());
        let afdb = self.columns.iter().position(|c| c == IdSpace::Afdb.column());
        if pdb.is_none() && afdb.is_none() {
            return false;
        }
        self.columns.push("Known_Structure".to_string());
        self.columns.push("Structure_Status".to_string());

        let mut counts: BTreeMap<String, usize> = BTreeMap::new();
        for row in self.rows.values_mut() {
            let pdb_ids = pdb.and_then(|i| row[i].as_deref());
            let plddt = afdb.and_then(|i| row[i].as_deref()).and_then(|v| v.parse::<f64>().ok());
            let status = StructureStatus::classify(pdb_ids, plddt, plddt_cutoff);
            let known = status != StructureStatus::Dark;
            row.push(Some(if known { "True" } else { "False" }.to_string()));
            row.push(Some(status.to_string()));
            *counts.entry(status.to_string()).or_default() += 1;
        }
        info!("Structure status (pLDDT cutoff {}): {:?}", plddt_cutoff, counts);
        true
    }

    /// All non-key columns with their values, independent of column order.
    pub fn cells(&self) -> BTreeMap<(&str, &str), Option<&str>> {
        let mut cells = BTreeMap::new();
        for (id, row) in &self.rows {
            for (column, value) in self.columns.iter().zip(row) {
                cells.insert((id.as_str(), column.as_str()), value.as_deref());
            }
        }
        cells
    }
}

/// Fails when two sources, or a source and the base table, share a name.
/// Their precedence would otherwise fall back to input order.
pub fn check_source_names(base: &SourceTable, sources: &[SourceTable]) -> Result<(), AssembleError> {
    let mut seen: BTreeSet<&str> = BTreeSet::from([base.name.as_str()]);
    for source in sources {
        if !seen.insert(source.name.as_str()) {
            return Err(AssembleError::DuplicateSource(source.name.clone()));
        }
    }
    Ok(())
}

/// Orders sources by the precedence list; unlisted sources follow, by name.
fn precedence_rank(precedence: &[String], a: &SourceTable, b: &SourceTable) -> Ordering {
    let position = |s: &SourceTable| precedence.iter().position(|p| *p == s.name);
    match (position(a), position(b)) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.name.cmp(&b.name),
    }
}

/// Left-joins `sources` onto `base` by protein ID.
///
/// A source row is matched on its full ID first, then on its lookup key. Same
/// named columns are one field; the base table always wins, then the first
/// source in precedence order holding a non-empty value.
pub fn assemble(base: &SourceTable, sources: &[SourceTable], precedence: &[String]) -> Assembled {
    let mut columns: Vec<String> = base.columns.clone();
    for source in sources {
        for column in &source.columns {
            if !columns.contains(column) && column != KEY_COLUMN {
                columns.push(column.clone());
            }
        }
    }
    let column_index: HashMap<&str, usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| (c.as_str(), i))
        .collect();

    let mut ranked: Vec<&SourceTable> = sources.iter().collect();
    ranked.sort_by(|a, b| precedence_rank(precedence, a, b));

    let mut rows: BTreeMap<String, Vec<Option<String>>> = base
        .rows
        .iter()
        .map(|(id, values)| {
            let mut row = values.clone();
            row.resize(columns.len(), None);
            (id.clone(), row)
        })
        .collect();
    let mut unmatched: BTreeMap<String, usize> = BTreeMap::new();

    for source in ranked {
        let mut missing = 0usize;
        for (source_id, values) in &source.rows {
            let id = if rows.contains_key(source_id) {
                source_id.as_str()
            } else {
                lookup_key(source_id)
            };
            let Some(row) = rows.get_mut(id) else {
                missing += 1;
                continue;
            };
            for (column, value) in source.columns.iter().zip(values) {
                let Some(&index) = column_index.get(column.as_str()) else {
                    continue;
                };
                if row[index].is_none() && value.as_deref().is_some_and(|v| !v.is_empty()) {
                    row[index] = value.clone();
                }
            }
        }
        if missing > 0 {
            warn!("{}: {} rows do not match any base protein", source.name, missing);
        }
        unmatched.insert(source.name.clone(), missing);
    }

    let names: BTreeSet<&str> = sources.iter().map(|s| s.name.as_str()).collect();
    info!(
        "Assembled {} proteins x {} columns from {} sources",
        rows.len(),
        columns.len(),
        names.len()
    );
    Assembled {
        columns,
        rows,
        unmatched,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> SourceTable {
        let mut base = SourceTable::new("base", vec!["GenomeID".into(), "Length".into()]);
        base.insert("P1", vec![Some("G1".into()), Some("120".into())]);
        base.insert("P2", vec![Some("G1".into()), Some("300".into())]);
        base.insert("P3", vec![Some("G2".into()), Some("90".into())]);
        base
    }

    fn source(name: &str, columns: &[&str], rows: Vec<(&str, Vec<Option<&str>>)>) -> SourceTable {
        let mut table = SourceTable::new(name, columns.iter().map(|c| c.to_string()).collect());
        for (id, values) in rows {
            table.insert(id, values.into_iter().map(|v| v.map(str::to_string)).collect());
        }
        table
    }

    fn sources() -> Vec<SourceTable> {
        vec![
            source(
                "interpro",
                &["IPR_IDs", "Name"],
                vec![
                    ("P1|G1|S|annotated|Kinase", vec![Some("IPR000719"), Some("kinase")]),
                    ("P2", vec![None, Some("ipr name")]),
                ],
            ),
            source(
                "orthofinder",
                &["Orthogroup"],
                vec![("P1", vec![Some("OG1")]), ("P3", vec![Some("OG2")]), ("X9", vec![Some("OG3")])],
            ),
            source("curated", &["Name"], vec![("P2", vec![Some("ESCRT-III")])]),
        ]
    }

    #[test]
    fn test_left_join_with_precedence() {
        let precedence = vec!["curated".to_string(), "interpro".to_string()];
        let db = assemble(&base(), &sources(), &precedence);

        assert_eq!(db.rows.len(), 3);
        assert_eq!(db.get("P1", "IPR_IDs"), Some("IPR000719"));
        assert_eq!(db.get("P1", "Name"), Some("kinase"));
        assert_eq!(db.get("P2", "Name"), Some("ESCRT-III"));
        assert_eq!(db.get("P3", "Orthogroup"), Some("OG2"));
        assert_eq!(db.get("P3", "IPR_IDs"), None);
        assert_eq!(db.unmatched["orthofinder"], 1);
    }

    #[test]
    fn test_join_is_independent_of_source_order() {
        let precedence = vec!["interpro".to_string()];
        let forward = sources();
        let mut rotated = sources();
        rotated.rotate_left(2);

        let a = assemble(&base(), &forward, &precedence);
        let b = assemble(&base(), &rotated, &precedence);
        assert_ne!(a.columns, b.columns);
        assert_eq!(a.cells(), b.cells());
        assert_eq!(a.get("P2", "Name"), Some("ipr name"));
    }

    #[test]
    fn test_structure_status() {
        let structure = source(
            "structure",
            &["PDB_IDs", "Avg_pLDDT"],
            vec![("P1", vec![Some("1ABC"), None]), ("P2", vec![None, Some("81.50")])],
        );
        let mut db = assemble(&base(), &[structure], &[]);
        assert!(db.add_structure_status(70.0));
        assert_eq!(db.get("P1", "Structure_Status"), Some("Experimental"));
        assert_eq!(db.get("P2", "Structure_Status"), Some("Predicted"));
        assert_eq!(db.get("P3", "Structure_Status"), Some("Dark"));
        assert_eq!(db.get("P3", "Known_Structure"), Some("False"));

        let mut plain = assemble(&base(), &[], &[]);
        assert!(!plain.add_structure_status(70.0));
    }

    #[test]
    fn test_base_from_fasta_with_disorder() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("GCA_1.fasta");
        std::fs::write(&path, ">P1|GCA_1|Loki|annotated|Kinase\nMKLV\n>raw_id\nMK\n").unwrap();
        let mut scores = DisorderScores::default();
        scores.insert("P1", 0.25);

        let base = base_from_fasta(&[path.clone()], Some((&scores, 0.5))).unwrap();
        assert_eq!(base.get("P1", "Name"), Some("Kinase"));
        assert_eq!(base.get("P1", "Length"), Some("4"));
        assert_eq!(base.get("P1", "Percent_Disorder"), Some("25.00"));
        assert_eq!(base.get("P1", "Globular"), Some("True"));
        assert_eq!(base.get("raw_id", "Length"), Some("2"));
        assert_eq!(base.get("raw_id", "Globular"), None);

        assert!(matches!(
            base_from_fasta(&[path.clone(), path], None),
            Err(AssembleError::DuplicateId(_))
        ));
    }

    #[test]
    fn test_duplicate_source_names_are_rejected() {
        let first = source("uniparc", &["Mapped_ID"], vec![("P1", vec![Some("A")])]);
        let second = source("uniparc", &["Mapped_ID"], vec![("P1", vec![Some("B")])]);
        let sources = vec![first, second];
        assert!(matches!(
            check_source_names(&base(), &sources),
            Err(AssembleError::DuplicateSource(name)) if name == "uniparc"
        ));

        let shadow = source("base", &["Orthogroup"], vec![]);
        assert!(matches!(
            check_source_names(&base(), &[shadow]),
            Err(AssembleError::DuplicateSource(_))
        ));

        let mut distinct = sources;
        distinct[1].name = "uniparc_2".to_string();
        assert!(check_source_names(&base(), &distinct).is_ok());
    }
}
