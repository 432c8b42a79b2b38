/// OrthoFinder `Orthogroups.tsv` tables.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::BufRead;
use std::path::Path;

use tracing::info;

use crate::annotation::{ParseError, SourceTable};
use crate::util::open_reader;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrthogroupAssignment {
    pub id: String,
    pub members: BTreeSet<String>,
    /// Number of members contributed by each genome column.
    pub genome_counts: BTreeMap<String, usize>,
}

impl OrthogroupAssignment {
    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn genomes_present(&self) -> usize {
        self.genome_counts.values().filter(|&&n| n > 0).count()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Orthogroups {
    pub genomes: Vec<String>,
    pub groups: Vec<OrthogroupAssignment>,
    index: HashMap<String, usize>,
}

fn split_members(cell: &str) -> impl Iterator<Item = &str> {
    cell.split([',', ';'])
        .map(str::trim)
        .filter(|m| !m.is_empty())
}

impl Orthogroups {
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let reader = open_reader(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut lines = reader.lines().enumerate();
        let io_err = |source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        };

        let header = match lines.next() {
            Some((_, line)) => line.map_err(io_err)?,
            None => String::new(),
        };
        let columns: Vec<&str> = header.split('\t').map(str::trim).collect();
        if columns.first() != Some(&"Orthogroup") {
            return Err(ParseError::MissingColumn {
                path: path.to_path_buf(),
                column: "Orthogroup".to_string(),
            });
        }

        let mut table = Orthogroups {
            genomes: columns[1..].iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        };

        for (index, line) in lines {
            let line = line.map_err(io_err)?;
            if line.trim().is_empty() {
                continue;
            }
            let cells: Vec<&str> = line.split('\t').collect();
            let id = cells[0].trim();
            if id.is_empty() {
                return Err(ParseError::InvalidField {
                    path: path.to_path_buf(),
                    line: index + 1,
                    field: "orthogroup ID",
                    value: String::new(),
                });
            }

            let mut assignment = OrthogroupAssignment {
                id: id.to_string(),
                members: BTreeSet::new(),
                genome_counts: BTreeMap::new(),
            };
            for (column, genome) in table.genomes.iter().enumerate() {
                let cell = cells.get(column + 1).copied().unwrap_or("");
                let mut count = 0;
                for member in split_members(cell) {
                    assignment.members.insert(member.to_string());
                    count += 1;
                }
                assignment.genome_counts.insert(genome.clone(), count);
            }
            table.push(assignment)?;
        }

        info!(
            "Loaded {} orthogroups over {} genomes from {}",
            table.groups.len(),
            table.genomes.len(),
            path.display()
        );
        Ok(table)
    }

    /// Adds a group, rejecting proteins already assigned elsewhere.
    pub fn push(&mut self, assignment: OrthogroupAssignment) -> Result<(), ParseError> {
        let position = self.groups.len();
        for member in &assignment.members {
            if let Some(&other) = self.index.get(member) {
                return Err(ParseError::DuplicateMember {
                    protein: member.clone(),
                    first: self.groups[other].id.clone(),
                    second: assignment.id.clone(),
                });
            }
            self.index.insert(member.clone(), position);
        }
        self.groups.push(assignment);
        Ok(())
    }

    pub fn orthogroup_of(&self, protein: &str) -> Option<&OrthogroupAssignment> {
        self.index.get(protein).map(|&i| &self.groups[i])
    }

    pub fn get(&self, id: &str) -> Option<&OrthogroupAssignment> {
        self.groups.iter().find(|g| g.id == id)
    }

    pub fn to_source_table(&self) -> SourceTable {
        let columns = vec![
            "Orthogroup".to_string(),
            "Orthogroup_Size".to_string(),
            "Orthogroup_Genomes".to_string(),
        ];
        let mut table = SourceTable::new("orthofinder", columns);
        for group in &self.groups {
            let values = vec![
                Some(group.id.clone()),
                Some(group.size().to_string()),
                Some(group.genomes_present().to_string()),
            ];
            for member in &group.members {
                table.insert(member, values.clone());
            }
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_orthogroups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Orthogroups.tsv");
        std::fs::write(
            &path,
            "Orthogroup\tLoki\tHeimdall\nOG0000000\tL1, L2\tH1\nOG0000001\t\tH2;H3\nOG0000002\tL3\n",
        )
        .unwrap();

        let ogs = Orthogroups::from_path(&path).unwrap();
        assert_eq!(ogs.genomes, vec!["Loki", "Heimdall"]);
        assert_eq!(ogs.groups.len(), 3);

        let og0 = ogs.get("OG0000000").unwrap();
        assert_eq!(og0.size(), 3);
        assert_eq!(og0.genome_counts["Loki"], 2);
        assert_eq!(ogs.orthogroup_of("H3").unwrap().id, "OG0000001");
        assert_eq!(ogs.get("OG0000001").unwrap().genomes_present(), 1);
        assert_eq!(ogs.get("OG0000002").unwrap().genome_counts["Heimdall"], 0);

        let table = ogs.to_source_table();
        assert_eq!(table.get("L2", "Orthogroup_Size"), Some("3"));
    }

    #[test]
    fn test_duplicate_member_is_structural_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Orthogroups.tsv");
        std::fs::write(&path, "Orthogroup\tA\nOG1\tP1\nOG2\tP1\n").unwrap();
        assert!(matches!(
            Orthogroups::from_path(&path),
            Err(ParseError::DuplicateMember { .. })
        ));
    }

    #[test]
    fn test_missing_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tsv");
        std::fs::write(&path, "OG1\tP1\n").unwrap();
        assert!(matches!(Orthogroups::from_path(&path), Err(ParseError::MissingColumn { .. })));
    }
}
