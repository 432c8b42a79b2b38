/// InterProScan results (TSV and GFF3) and the InterPro `entry.list` catalogue.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::io::BufRead;
use std::path::Path;

use strum_macros::{Display, EnumIter, EnumString};
use tracing::{debug, info, warn};

use crate::annotation::{optional, Capabilities, ParseError, SourceTable};
use crate::util::open_reader;

pub const FIELD_MD5: &str = "md5";
pub const FIELD_LENGTH: &str = "length";
pub const FIELD_SCORE: &str = "score";
pub const FIELD_STATUS: &str = "status";
pub const FIELD_DATE: &str = "date";
pub const FIELD_INTERPRO: &str = "interpro";
pub const FIELD_GO: &str = "go_terms";
pub const FIELD_PATHWAYS: &str = "pathways";

/// InterPro entry types, ordered by how informative they are as a fallback label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString, EnumIter)]
#[strum(ascii_case_insensitive)]
pub enum EntryType {
    Family,
    Domain,
    #[strum(serialize = "Homologous_superfamily")]
    HomologousSuperfamily,
    Repeat,
    #[strum(serialize = "Conserved_site")]
    ConservedSite,
    #[strum(serialize = "Binding_site")]
    BindingSite,
    #[strum(serialize = "Active_site")]
    ActiveSite,
    #[strum(serialize = "PTM")]
    Ptm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterProEntry {
    pub accession: String,
    pub entry_type: EntryType,
    pub name: String,
}

/// `IPR` followed by six digits.
pub fn is_ipr_accession(value: &str) -> bool {
    value.len() == 9 && value.starts_with("IPR") && value[3..].bytes().all(|b| b.is_ascii_digit())
}

/// One member-database match reported by InterProScan.
#[derive(Debug, Clone, PartialEq)]
pub struct InterProMatch {
    pub protein_id: String,
    pub md5: Option<String>,
    pub length: Option<u32>,
    pub analysis: String,
    pub signature: String,
    pub signature_description: Option<String>,
    pub start: u32,
    pub stop: u32,
    pub score: Option<String>,
    pub status: Option<String>,
    pub date: Option<String>,
    pub interpro_accession: Option<String>,
    pub interpro_description: Option<String>,
    pub go_terms: Vec<String>,
    pub pathways: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct InterProResults {
    pub matches: Vec<InterProMatch>,
    pub capabilities: Capabilities,
}

impl InterProResults {
    /// Matches grouped per protein, each list in file order.
    pub fn by_protein(&self) -> BTreeMap<&str, Vec<&InterProMatch>> {
        let mut grouped: BTreeMap<&str, Vec<&InterProMatch>> = BTreeMap::new();
        for m in &self.matches {
            grouped.entry(m.protein_id.as_str()).or_default().push(m);
        }
        grouped
    }

    pub fn extend(&mut self, other: InterProResults) {
        self.matches.extend(other.matches);
        for field in other.capabilities.fields() {
            self.capabilities.mark(*field);
        }
    }

    /// One row per protein: sorted unique IPR accessions, their descriptions,
    /// member signatures and GO terms, each `;`-joined.
    pub fn to_source_table(&self) -> SourceTable {
        let columns = ["IPR_IDs", "IPR_Descriptions", "Signatures", "GO_Terms"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let mut table = SourceTable::new("interproscan", columns);

        for (protein, matches) in self.by_protein() {
            let mut iprs = BTreeSet::new();
            let mut descriptions = BTreeSet::new();
            let mut signatures = BTreeSet::new();
            let mut go_terms = BTreeSet::new();
            for m in matches {
                if let Some(ipr) = &m.interpro_accession {
                    iprs.insert(ipr.as_str());
                }
                if let Some(desc) = &m.interpro_description {
                    descriptions.insert(desc.as_str());
                }
                signatures.insert(m.signature.as_str());
                go_terms.extend(m.go_terms.iter().map(String::as_str));
            }
            table.insert(
                protein,
                vec![join(&iprs), join(&descriptions), join(&signatures), join(&go_terms)],
            );
        }
        table
    }
}

fn join(values: &BTreeSet<&str>) -> Option<String> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().copied().collect::<Vec<_>>().join(";"))
    }
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split('|')
                .map(str::trim)
                .filter(|s| !s.is_empty() && *s != "-")
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn parse_position(path: &Path, line: usize, field: &'static str, value: &str) -> Result<u32, ParseError> {
    value.trim().parse::<u32>().map_err(|_| ParseError::InvalidField {
        path: path.to_path_buf(),
        line,
        field,
        value: value.to_string(),
    })
}

/// Parses one InterProScan TSV line. The 15-column layout carries MD5 and
/// sequence length after the protein ID; the 13-column layout does not. The
/// layout is recognised by a numeric third field.
pub fn parse_tsv_line(
    path: &Path,
    line_number: usize,
    line: &str,
    capabilities: &mut Capabilities,
) -> Result<InterProMatch, ParseError> {
    let fields: Vec<&str> = line.split('\t').collect();
    let full_layout = fields.len() >= 3 && !fields[2].is_empty() && fields[2].trim().bytes().all(|b| b.is_ascii_digit());
    let offset = if full_layout { 2 } else { 0 };
    let expected = 5 + offset + 1;
    if fields.len() < expected {
        return Err(ParseError::TooFewFields {
            path: path.to_path_buf(),
            line: line_number,
            expected,
            found: fields.len(),
        });
    }

    let protein_id = fields[0].trim();
    if protein_id.is_empty() {
        return Err(ParseError::InvalidField {
            path: path.to_path_buf(),
            line: line_number,
            field: "protein ID",
            value: String::new(),
        });
    }
    let get = |i: usize| optional(fields.get(i + offset).copied());

    let (md5, length) = if full_layout {
        capabilities.mark(FIELD_MD5);
        capabilities.mark(FIELD_LENGTH);
        (optional(fields.get(1).copied()), fields[2].trim().parse::<u32>().ok())
    } else {
        (None, None)
    };

    let record = InterProMatch {
        protein_id: protein_id.to_string(),
        md5,
        length,
        analysis: fields[1 + offset].trim().to_string(),
        signature: fields[2 + offset].trim().to_string(),
        signature_description: get(3),
        start: parse_position(path, line_number, "start", fields[4 + offset])?,
        stop: parse_position(path, line_number, "stop", fields[5 + offset])?,
        score: get(6),
        status: get(7),
        date: get(8),
        interpro_accession: get(9),
        interpro_description: get(10),
        go_terms: split_list(get(11)),
        pathways: split_list(get(12)),
    };

    for (field, present) in [
        (FIELD_SCORE, record.score.is_some()),
        (FIELD_STATUS, record.status.is_some()),
        (FIELD_DATE, record.date.is_some()),
        (FIELD_INTERPRO, record.interpro_accession.is_some()),
        (FIELD_GO, !record.go_terms.is_empty()),
        (FIELD_PATHWAYS, !record.pathways.is_empty()),
    ] {
        if present {
            capabilities.mark(field);
        }
    }
    Ok(record)
}

/// Reads an InterProScan TSV file. A structurally broken line fails the file.
pub fn parse_tsv(path: &Path) -> Result<InterProResults, ParseError> {
    let reader = open_reader(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut results = InterProResults::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let record = parse_tsv_line(path, index + 1, &line, &mut results.capabilities)?;
        results.matches.push(record);
    }

    info!("Parsed {} InterProScan matches from {}", results.matches.len(), path.display());
    Ok(results)
}

fn gff_attributes(field: &str) -> HashMap<String, String> {
    field
        .split(';')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.trim().to_string(), v.trim().trim_matches('"').to_string()))
        .collect()
}

/// Reads `protein_match` features of an InterProScan GFF3 file.
pub fn parse_gff3(path: &Path) -> Result<InterProResults, ParseError> {
    let reader = open_reader(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut results = InterProResults::default();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        if line.starts_with("##FASTA") {
            break;
        }
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 9 {
            return Err(ParseError::TooFewFields {
                path: path.to_path_buf(),
                line: index + 1,
                expected: 9,
                found: fields.len(),
            });
        }
        if fields[2] != "protein_match" {
            continue;
        }

        let attributes = gff_attributes(fields[8]);
        let mut interpro_accession = None;
        let mut go_terms = Vec::new();
        if let Some(xrefs) = attributes.get("Dbxref") {
            for xref in xrefs.split(',').map(|x| x.trim().trim_matches('"')) {
                if let Some(ipr) = xref.strip_prefix("InterPro:") {
                    interpro_accession.get_or_insert_with(|| ipr.to_string());
                } else if xref.starts_with("GO:") {
                    go_terms.push(xref.to_string());
                }
            }
        }
        if let Some(ontology) = attributes.get("Ontology_term") {
            go_terms.extend(
                ontology
                    .split(',')
                    .map(|t| t.trim().trim_matches('"').to_string())
                    .filter(|t| !t.is_empty()),
            );
        }
        go_terms.sort();
        go_terms.dedup();

        let record = InterProMatch {
            protein_id: fields[0].trim().to_string(),
            md5: attributes.get("md5").cloned(),
            length: None,
            analysis: fields[1].trim().to_string(),
            signature: attributes.get("Name").cloned().unwrap_or_default(),
            signature_description: attributes.get("signature_desc").cloned(),
            start: parse_position(path, index + 1, "start", fields[3])?,
            stop: parse_position(path, index + 1, "stop", fields[4])?,
            score: optional(Some(fields[5])).filter(|s| s != "."),
            status: attributes.get("status").cloned(),
            date: attributes.get("date").cloned(),
            interpro_accession,
            interpro_description: None,
            go_terms,
            pathways: Vec::new(),
        };
        if record.interpro_accession.is_some() {
            results.capabilities.mark(FIELD_INTERPRO);
        }
        if !record.go_terms.is_empty() {
            results.capabilities.mark(FIELD_GO);
        }
        results.matches.push(record);
    }

    info!("Parsed {} protein_match features from {}", results.matches.len(), path.display());
    Ok(results)
}

/// InterPro entry catalogue keyed by accession.
#[derive(Debug, Clone, Default)]
pub struct EntryList {
    entries: HashMap<String, InterProEntry>,
}

impl EntryList {
    pub fn from_path(path: &Path) -> Result<Self, ParseError> {
        let reader = open_reader(path).map_err(|source| ParseError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut list = EntryList::default();
        let mut skipped = 0usize;

        for (index, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| ParseError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            if line.trim().is_empty() || line.starts_with('#') || line.starts_with("ENTRY_AC") {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() < 3 {
                return Err(ParseError::TooFewFields {
                    path: path.to_path_buf(),
                    line: index + 1,
                    expected: 3,
                    found: fields.len(),
                });
            }
            let accession = fields[0].trim();
            let Ok(entry_type) = fields[1].trim().parse::<EntryType>() else {
                debug!("Unknown entry type '{}' for {}", fields[1], accession);
                skipped += 1;
                continue;
            };
            list.insert(InterProEntry {
                accession: accession.to_string(),
                entry_type,
                name: fields[2].trim().to_string(),
            });
        }

        if skipped > 0 {
            warn!("{}: {} entries with unknown type ignored", path.display(), skipped);
        }
        info!("Loaded {} InterPro entries from {}", list.len(), path.display());
        Ok(list)
    }

    pub fn insert(&mut self, entry: InterProEntry) {
        self.entries.insert(entry.accession.clone(), entry);
    }

    pub fn get(&self, accession: &str) -> Option<&InterProEntry> {
        self.entries.get(accession)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TSV_15: &str = "P1|G|S|hypothetical|\tabc\t310\tPfam\tPF00069\tProtein kinase domain\t10\t250\t1.2E-40\tT\t01-05-2024\tIPR000719\tProtein kinase domain\tGO:0004672|GO:0005524\t-\n";
    const TSV_13: &str = "P2\tPANTHER\tPTHR1\t-\t1\t90\t-\tT\t01-05-2024\n";

    #[test]
    fn test_parse_tsv_both_layouts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ips.tsv");
        std::fs::write(&path, format!("# comment\n{}{}\n", TSV_15, TSV_13)).unwrap();

        let results = parse_tsv(&path).unwrap();
        assert_eq!(results.matches.len(), 2);

        let kinase = &results.matches[0];
        assert_eq!(kinase.length, Some(310));
        assert_eq!(kinase.signature, "PF00069");
        assert_eq!(kinase.interpro_accession.as_deref(), Some("IPR000719"));
        assert_eq!(kinase.go_terms, vec!["GO:0004672", "GO:0005524"]);
        assert!(kinase.pathways.is_empty());

        let panther = &results.matches[1];
        assert_eq!(panther.analysis, "PANTHER");
        assert_eq!(panther.stop, 90);
        assert_eq!(panther.interpro_accession, None);

        assert!(results.capabilities.has(FIELD_LENGTH));
        assert!(results.capabilities.has(FIELD_GO));
        assert!(!results.capabilities.has(FIELD_PATHWAYS));
    }

    #[test]
    fn test_parse_tsv_rejects_bad_positions() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tsv");
        std::fs::write(&path, "P2\tPfam\tPF1\tdesc\tten\t90\n").unwrap();
        assert!(matches!(parse_tsv(&path), Err(ParseError::InvalidField { field: "start", .. })));
    }

    #[test]
    fn test_parse_gff3() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ips.gff3");
        std::fs::write(
            &path,
            "##gff-version 3\n\
             P1\t.\tpolypeptide\t1\t310\t.\t+\t.\tID=P1\n\
             P1\tPfam\tprotein_match\t10\t250\t1.2E-40\t+\t.\tName=PF00069;signature_desc=Protein kinase domain;Dbxref=\"InterPro:IPR000719\",\"GO:0004672\"\n\
             ##FASTA\n>P1\nMK\n",
        )
        .unwrap();

        let results = parse_gff3(&path).unwrap();
        assert_eq!(results.matches.len(), 1);
        assert_eq!(results.matches[0].interpro_accession.as_deref(), Some("IPR000719"));
        assert_eq!(results.matches[0].go_terms, vec!["GO:0004672"]);
        assert_eq!(results.matches[0].signature_description.as_deref(), Some("Protein kinase domain"));
    }

    #[test]
    fn test_entry_list_and_source_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("entry.list");
        std::fs::write(
            &path,
            "ENTRY_AC\tENTRY_TYPE\tENTRY_NAME\nIPR000719\tDomain\tProtein kinase domain\nIPR999999\tUnknownKind\tx\n",
        )
        .unwrap();
        let entries = EntryList::from_path(&path).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries.get("IPR000719").unwrap().entry_type, EntryType::Domain);
        assert_eq!("homologous_superfamily".parse::<EntryType>().unwrap(), EntryType::HomologousSuperfamily);

        let mut caps = Capabilities::default();
        let m = parse_tsv_line(Path::new("x"), 1, TSV_15.trim_end(), &mut caps).unwrap();
        let results = InterProResults {
            matches: vec![m.clone(), m],
            capabilities: caps,
        };
        let table = results.to_source_table();
        assert_eq!(table.get("P1|G|S|hypothetical|", "IPR_IDs"), Some("IPR000719"));
    }

    #[test]
    fn test_is_ipr_accession() {
        assert!(is_ipr_accession("IPR000001"));
        assert!(!is_ipr_accession("IPR00001"));
        assert!(!is_ipr_accession("PF00069"));
    }
}
