use std::collections::BTreeMap;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Identifier spaces a protein ID can be resolved into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, ValueEnum, Deserialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum IdSpace {
    /// UniParc identifiers (UPI...)
    Uniparc,
    /// PDB cross-references of a UniProtKB accession
    Pdb,
    /// Average pLDDT of the AlphaFold DB model
    Afdb,
    /// Two-column reference table
    Table,
}

impl IdSpace {
    /// Header of the target column in mapping files.
    pub fn column(&self) -> &'static str {
        match self {
            IdSpace::Uniparc => "UniParc_ID",
            IdSpace::Pdb => "PDB_IDs",
            IdSpace::Afdb => "Avg_pLDDT",
            IdSpace::Table => "Mapped_ID",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LookupFailure {
    pub id: String,
    pub error: String,
}

/// Result of resolving a batch of IDs. Every query ID ends up either in
/// `resolved` or in `not_found`; failed lookups are also described in `failures`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappingOutcome {
    pub resolved: BTreeMap<String, String>,
    pub not_found: Vec<String>,
    pub failures: Vec<LookupFailure>,
}

impl MappingOutcome {
    pub fn total(&self) -> usize {
        self.resolved.len() + self.not_found.len()
    }
}

/// Structural evidence available for a protein.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum StructureStatus {
    /// Has at least one PDB entry
    Experimental,
    /// AlphaFold DB model with average pLDDT at or above the cutoff
    Predicted,
    /// Neither of the above
    Dark,
}

impl StructureStatus {
    pub fn classify(pdb_ids: Option<&str>, avg_plddt: Option<f64>, plddt_cutoff: f64) -> Self {
        if pdb_ids.map(|p| !p.trim().is_empty()).unwrap_or(false) {
            StructureStatus::Experimental
        } else if avg_plddt.map(|s| s >= plddt_cutoff).unwrap_or(false) {
            StructureStatus::Predicted
        } else {
            StructureStatus::Dark
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structure_status() {
        assert_eq!(StructureStatus::classify(Some("1ABC;2XYZ"), None, 70.0), StructureStatus::Experimental);
        assert_eq!(StructureStatus::classify(Some(""), Some(85.2), 70.0), StructureStatus::Predicted);
        assert_eq!(StructureStatus::classify(None, Some(70.0), 70.0), StructureStatus::Predicted);
        assert_eq!(StructureStatus::classify(None, Some(42.0), 70.0), StructureStatus::Dark);
        assert_eq!(StructureStatus::classify(None, None, 70.0), StructureStatus::Dark);
    }

    #[test]
    fn test_id_space_parse() {
        assert_eq!("uniparc".parse::<IdSpace>().unwrap(), IdSpace::Uniparc);
        assert_eq!(IdSpace::Pdb.to_string(), "pdb");
        assert_eq!(IdSpace::Afdb.column(), "Avg_pLDDT");
    }
}
