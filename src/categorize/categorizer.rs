/// Assigns one functional category per protein from its InterPro evidence.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use csv::WriterBuilder;
use thiserror::Error;
use tracing::{debug, info};

use crate::annotation::interpro::{EntryList, EntryType, InterProResults};
use crate::annotation::SourceTable;
use crate::categorize::rules::{Matcher, RuleSet};
use crate::sequence::header::StandardHeader;

pub const NO_IPR_CATEGORY: &str = "No_IPR_Hit";
pub const UNCLASSIFIED_CATEGORY: &str = "Unclassified_IPR";

#[derive(Error, Debug)]
pub enum CategorizeError {
    #[error("Cannot write {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("IO error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
}

/// Everything the rules can look at for one protein. Sets keep evaluation
/// independent of annotation order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProteinEvidence {
    pub protein_id: String,
    pub ipr_ids: BTreeSet<String>,
    pub entry_types: BTreeSet<EntryType>,
    pub texts: BTreeSet<String>,
    pub has_matches: bool,
}

impl ProteinEvidence {
    pub fn new(protein_id: &str) -> Self {
        ProteinEvidence {
            protein_id: protein_id.to_string(),
            ..Default::default()
        }
    }
}

/// Builds evidence for every protein in `proteins` plus every protein with
/// InterProScan matches. Header annotation names join the keyword haystack.
pub fn collect_evidence(
    results: &InterProResults,
    entries: &EntryList,
    proteins: &[String],
) -> BTreeMap<String, ProteinEvidence> {
    let mut evidence: BTreeMap<String, ProteinEvidence> = proteins
        .iter()
        .map(|id| (id.clone(), ProteinEvidence::new(id)))
        .collect();

    for m in &results.matches {
        let record = evidence
            .entry(m.protein_id.clone())
            .or_insert_with(|| ProteinEvidence::new(&m.protein_id));
        record.has_matches = true;
        if let Some(desc) = &m.signature_description {
            record.texts.insert(desc.clone());
        }
        if let Some(desc) = &m.interpro_description {
            record.texts.insert(desc.clone());
        }
        if let Some(ipr) = &m.interpro_accession {
            record.ipr_ids.insert(ipr.clone());
            if let Some(entry) = entries.get(ipr) {
                record.entry_types.insert(entry.entry_type);
                record.texts.insert(entry.name.clone());
            }
        }
    }

    for record in evidence.values_mut() {
        if let Ok(header) = StandardHeader::parse(&record.protein_id) {
            if let Some(name) = header.name {
                record.texts.insert(name.replace('_', " "));
            }
        }
    }
    evidence
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub protein_id: String,
    pub category: String,
    pub trigger: String,
    pub ipr_ids: BTreeSet<String>,
}

pub struct Categorizer {
    rules: RuleSet,
}

impl Categorizer {
    pub fn new(rules: RuleSet) -> Self {
        Categorizer { rules }
    }

    /// First matching rule wins; otherwise the type-based fallback applies.
    pub fn assign(&self, evidence: &ProteinEvidence) -> Assignment {
        let assignment = |category: &str, trigger: String| Assignment {
            protein_id: evidence.protein_id.clone(),
            category: category.to_string(),
            trigger,
            ipr_ids: evidence.ipr_ids.clone(),
        };

        if !evidence.has_matches {
            return assignment(NO_IPR_CATEGORY, String::new());
        }

        for rule in self.rules.rules() {
            let fired = match &rule.matcher {
                Matcher::ExactId(id) => evidence.ipr_ids.contains(id),
                Matcher::Keyword { pattern, .. } => evidence.texts.iter().any(|t| pattern.is_match(t)),
                Matcher::EntryType(t) => evidence.entry_types.contains(t),
            };
            if fired {
                debug!("{}: rule {} -> {}", evidence.protein_id, rule.matcher.value(), rule.category);
                return assignment(&rule.category, rule.matcher.value());
            }
        }

        if let Some(best) = evidence.entry_types.iter().next() {
            assignment(&format!("Other_{}", best), best.to_string())
        } else if !evidence.ipr_ids.is_empty() {
            assignment(UNCLASSIFIED_CATEGORY, String::new())
        } else {
            assignment(NO_IPR_CATEGORY, String::new())
        }
    }

    pub fn assign_all(&self, evidence: &BTreeMap<String, ProteinEvidence>) -> Vec<Assignment> {
        let assignments: Vec<Assignment> = evidence.values().map(|e| self.assign(e)).collect();
        info!("Categorized {} proteins", assignments.len());
        assignments
    }
}

/// Proteins per category, most populated first.
pub fn summarize(assignments: &[Assignment]) -> Vec<(String, usize)> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for a in assignments {
        *counts.entry(a.category.as_str()).or_default() += 1;
    }
    let mut summary: Vec<(String, usize)> = counts.into_iter().map(|(c, n)| (c.to_string(), n)).collect();
    summary.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    summary
}

pub fn write_assignments(path: &Path, assignments: &[Assignment]) -> Result<(), CategorizeError> {
    let csv_err = |source| CategorizeError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut wtr = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(csv_err)?;
    wtr.write_record(["ProteinID", "Specific_Functional_Category", "Category_Trigger", "IPR_IDs"])
        .map_err(csv_err)?;
    for a in assignments {
        let iprs = a.ipr_ids.iter().cloned().collect::<Vec<_>>().join(";");
        wtr.write_record([a.protein_id.as_str(), &a.category, &a.trigger, &iprs])
            .map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| CategorizeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_summary(path: &Path, assignments: &[Assignment]) -> Result<(), CategorizeError> {
    let csv_err = |source| CategorizeError::Csv {
        path: path.to_path_buf(),
        source,
    };
    let mut wtr = WriterBuilder::new()
        .delimiter(b'\t')
        .from_path(path)
        .map_err(csv_err)?;
    wtr.write_record(["Category", "Proteins"]).map_err(csv_err)?;
    for (category, count) in summarize(assignments) {
        wtr.write_record([category, count.to_string()]).map_err(csv_err)?;
    }
    wtr.flush().map_err(|source| CategorizeError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub fn to_source_table(assignments: &[Assignment]) -> SourceTable {
    let columns = vec![
        "Specific_Functional_Category".to_string(),
        "Category_Trigger".to_string(),
    ];
    let mut table = SourceTable::new("functional_category", columns);
    for a in assignments {
        let trigger = Some(a.trigger.clone()).filter(|t| !t.is_empty());
        table.insert(&a.protein_id, vec![Some(a.category.clone()), trigger]);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::interpro::{InterProEntry, InterProMatch};
    use crate::categorize::rules::KeywordMode;

    const RULES: &str = "match_type,match_value,category,priority\n\
        keyword,kinase,Signalling,0\n\
        ipr_id,IPR000001,Kinase,10\n\
        keyword,ESCRT,Membrane_Trafficking,5\n\
        ipr_type,Repeat,Repeat_Protein,1\n";

    fn rules(mode: KeywordMode) -> RuleSet {
        RuleSet::from_reader(RULES.as_bytes(), Path::new("rules.csv"), mode).unwrap()
    }

    fn ipr_match(protein: &str, ipr: Option<&str>, desc: &str) -> InterProMatch {
        InterProMatch {
            protein_id: protein.to_string(),
            md5: None,
            length: None,
            analysis: "Pfam".to_string(),
            signature: "PF00001".to_string(),
            signature_description: Some(desc.to_string()),
            start: 1,
            stop: 50,
            score: None,
            status: None,
            date: None,
            interpro_accession: ipr.map(str::to_string),
            interpro_description: None,
            go_terms: Vec::new(),
            pathways: Vec::new(),
        }
    }

    fn entries() -> EntryList {
        let mut list = EntryList::default();
        for (acc, entry_type, name) in [
            ("IPR000001", EntryType::Domain, "Kringle"),
            ("IPR000002", EntryType::Family, "Cdc20/Fizzy"),
            ("IPR000003", EntryType::Domain, "Retinoid X receptor"),
        ] {
            list.insert(InterProEntry {
                accession: acc.to_string(),
                entry_type,
                name: name.to_string(),
            });
        }
        list
    }

    fn categorize(matches: Vec<InterProMatch>, proteins: &[&str], mode: KeywordMode) -> Vec<Assignment> {
        let results = InterProResults {
            matches,
            ..Default::default()
        };
        let proteins: Vec<String> = proteins.iter().map(|p| p.to_string()).collect();
        let evidence = collect_evidence(&results, &entries(), &proteins);
        Categorizer::new(rules(mode)).assign_all(&evidence)
    }

    #[test]
    fn test_exact_id_rule() {
        let out = categorize(vec![ipr_match("P1", Some("IPR000001"), "Kringle domain")], &[], KeywordMode::Substring);
        assert_eq!(out[0].category, "Kinase");
        assert_eq!(out[0].trigger, "IPR000001");
    }

    #[test]
    fn test_exact_id_beats_keyword() {
        let out = categorize(
            vec![ipr_match("P1", Some("IPR000001"), "Serine/threonine kinase")],
            &[],
            KeywordMode::Substring,
        );
        assert_eq!(out[0].category, "Kinase");
    }

    #[test]
    fn test_no_ipr_hit_sentinel() {
        let out = categorize(Vec::new(), &["P9|G|S|hypothetical|"], KeywordMode::Substring);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].category, NO_IPR_CATEGORY);
        assert_eq!(out[0].trigger, "");
        assert!(out[0].ipr_ids.is_empty());
    }

    #[test]
    fn test_keyword_substring_and_word_boundary() {
        let matches = vec![ipr_match("P1", None, "Pseudokinases family")];
        let loose = categorize(matches.clone(), &[], KeywordMode::Substring);
        assert_eq!(loose[0].category, "Signalling");
        assert_eq!(loose[0].trigger, "kinase");

        let strict = categorize(matches, &[], KeywordMode::WordBoundary);
        assert_eq!(strict[0].category, NO_IPR_CATEGORY);
    }

    #[test]
    fn test_header_name_joins_keyword_haystack() {
        let id = "P3|G|S|annotated|ESCRT-III_protein";
        let out = categorize(vec![ipr_match(id, Some("IPR000003"), "Retinoid")], &[], KeywordMode::Substring);
        assert_eq!(out[0].category, "Membrane_Trafficking");
    }

    #[test]
    fn test_type_fallback() {
        let out = categorize(
            vec![
                ipr_match("P1", Some("IPR000003"), "Retinoid X receptor"),
                ipr_match("P1", Some("IPR000002"), "WD40 propeller"),
                ipr_match("P2", Some("IPR999999"), "Unlisted"),
            ],
            &[],
            KeywordMode::Substring,
        );
        assert_eq!(out[0].category, "Other_Family");
        assert_eq!(out[1].category, UNCLASSIFIED_CATEGORY);
    }

    #[test]
    fn test_idempotent_and_order_independent() {
        let forward = vec![
            ipr_match("P1", Some("IPR000002"), "WD40"),
            ipr_match("P1", Some("IPR000003"), "ESCRT"),
            ipr_match("P2", Some("IPR000001"), "x"),
        ];
        let mut reversed = forward.clone();
        reversed.reverse();

        let a = categorize(forward.clone(), &[], KeywordMode::Substring);
        let b = categorize(forward, &[], KeywordMode::Substring);
        let c = categorize(reversed, &[], KeywordMode::Substring);
        assert_eq!(a, b);
        assert_eq!(a, c);
    }

    #[test]
    fn test_summary_and_outputs() {
        let out = categorize(
            vec![
                ipr_match("P1", Some("IPR000001"), "x"),
                ipr_match("P2", Some("IPR000001"), "x"),
            ],
            &["P3"],
            KeywordMode::Substring,
        );
        assert_eq!(
            summarize(&out),
            vec![("Kinase".to_string(), 2), (NO_IPR_CATEGORY.to_string(), 1)]
        );

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("categories.tsv");
        write_assignments(&path, &out).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("ProteinID\tSpecific_Functional_Category\tCategory_Trigger\tIPR_IDs\n"));
        assert!(text.contains("P1\tKinase\tIPR000001\tIPR000001\n"));

        let table = to_source_table(&out);
        assert_eq!(table.get("P3", "Category_Trigger"), None);
    }
}
