/// Outgroup selection from per-orthogroup DIAMOND hits against non-Asgard archaea.

use std::collections::BTreeSet;
use std::path::Path;

use csv::Writer;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use strum_macros::Display;
use tracing::{debug, info, warn};

use crate::annotation::homology::{parse_hits, DatabaseTag, HomologyHit};
use crate::annotation::ParseError;
use crate::util::{list_files_with_suffix, unit_name};

pub const DEFAULT_TACK_KEYWORDS: [&str; 23] = [
    "Thermoproteota", "Crenarchaeota", "Nitrososphaerota", "Thaumarchaeota", "Korarchaeota",
    "Aigarchaeota", "Bathyarchaeota", "Thermoprotei", "Nitrososphaeria", "Korarchaeia",
    "Sulfolobus", "Thermoproteus", "Pyrobaculum", "Desulfurococcus", "Ignicoccus",
    "Nitrosopumilus", "Nitrososphaera", "Nitrosotalea", "Nitrosocaldus", "Korarchaeum",
    "Caldiarchaeum", "Cenarchaeum", "Thermosphaera",
];

pub const DEFAULT_EURY_KEYWORDS: [&str; 30] = [
    "Euryarchaeota", "Methanobacteria", "Methanococci", "Methanomicrobia", "Halobacteria",
    "Thermococci", "Archaeoglobi", "Thermoplasmata", "Methanopyri", "Methanobacterium",
    "Methanobrevibacter", "Methanococcus", "Methanosarcina", "Methanothrix", "Halobacterium",
    "Haloarcula", "Halorubrum", "Thermococcus", "Pyrococcus", "Archaeoglobus",
    "Thermoplasma", "Picrophilus", "Ferroplasma", "Methanopyrus", "Methanoperedens",
    "ANME-1", "ANME-2", "Hadesarchaea", "Marine_Group_II", "Marine_Group_III",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Clade {
    #[strum(serialize = "TACK")]
    Tack,
    Euryarchaeota,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutgroupParams {
    pub max_evalue: f64,
    pub min_coverage: f64,
    pub max_outgroups: usize,
    pub hits_suffix: String,
    pub tack_keywords: Vec<String>,
    pub eury_keywords: Vec<String>,
}

impl Default for OutgroupParams {
    fn default() -> Self {
        OutgroupParams {
            max_evalue: 1e-10,
            min_coverage: 0.5,
            max_outgroups: 3,
            hits_suffix: "_hits.tsv".to_string(),
            tack_keywords: DEFAULT_TACK_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            eury_keywords: DEFAULT_EURY_KEYWORDS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

fn clade_pattern(keywords: &[String]) -> Result<Option<Regex>, regex::Error> {
    if keywords.is_empty() {
        return Ok(None);
    }
    let alternatives: Vec<String> = keywords.iter().map(|k| regex::escape(k)).collect();
    let pattern = format!(r"(?:^|\b|_|\|)(?:{})(?:$|\b|_|\|)", alternatives.join("|"));
    RegexBuilder::new(&pattern).case_insensitive(true).build().map(Some)
}

pub struct OutgroupSelector {
    tack: Option<Regex>,
    eury: Option<Regex>,
    params: OutgroupParams,
}

impl OutgroupSelector {
    pub fn new(params: OutgroupParams) -> Result<Self, ParseError> {
        Ok(OutgroupSelector {
            tack: clade_pattern(&params.tack_keywords)?,
            eury: clade_pattern(&params.eury_keywords)?,
            params,
        })
    }

    /// TACK keywords are checked before Euryarchaeota keywords.
    pub fn classify(&self, subject: &str) -> Option<Clade> {
        if self.tack.as_ref().is_some_and(|r| r.is_match(subject)) {
            Some(Clade::Tack)
        } else if self.eury.as_ref().is_some_and(|r| r.is_match(subject)) {
            Some(Clade::Euryarchaeota)
        } else {
            None
        }
    }

    fn passes(&self, hit: &HomologyHit) -> bool {
        let min = self.params.min_coverage;
        hit.evalue <= self.params.max_evalue
            && hit.query_coverage().is_some_and(|c| c >= min)
            && hit.subject_coverage().is_some_and(|c| c >= min)
    }

    /// Best hit of each clade first, then the next best distinct subjects.
    pub fn select(&self, hits: &[HomologyHit]) -> Vec<String> {
        let mut kept: Vec<(&HomologyHit, Clade)> = hits
            .iter()
            .filter(|h| self.passes(h))
            .filter_map(|h| self.classify(&h.subject).map(|c| (h, c)))
            .collect();
        kept.sort_by(|a, b| a.0.rank(b.0));

        let mut chosen: Vec<&HomologyHit> = Vec::new();
        for clade in [Clade::Tack, Clade::Euryarchaeota] {
            if let Some((hit, _)) = kept.iter().find(|(_, c)| *c == clade) {
                if !chosen.iter().any(|h| h.subject == hit.subject) {
                    chosen.push(hit);
                }
            }
        }
        chosen.sort_by(|a, b| a.rank(b));

        let mut selected: Vec<String> = chosen.iter().map(|h| h.subject.clone()).collect();
        selected.truncate(self.params.max_outgroups);
        let mut seen: BTreeSet<String> = selected.iter().cloned().collect();
        for (hit, _) in &kept {
            if selected.len() >= self.params.max_outgroups {
                break;
            }
            if seen.insert(hit.subject.clone()) {
                selected.push(hit.subject.clone());
            }
        }
        selected
    }
}

#[derive(Debug, Default)]
pub struct OutgroupReport {
    pub orthogroups: usize,
    pub with_outgroups: usize,
    pub failed: Vec<String>,
}

/// Processes every `<OG><hits_suffix>` file in `input_dir` and writes
/// `Orthogroup,Outgroups` (outgroups `;`-joined) to `output`.
pub fn select_outgroups(
    selector: &OutgroupSelector,
    input_dir: &Path,
    output: &Path,
) -> Result<OutgroupReport, ParseError> {
    let suffix = selector.params.hits_suffix.as_str();
    let files = list_files_with_suffix(input_dir, suffix).map_err(|source| ParseError::Io {
        path: input_dir.to_path_buf(),
        source,
    })?;
    info!("Selecting outgroups for {} hit files in {}", files.len(), input_dir.display());

    let csv_err = |source| ParseError::Csv {
        path: output.to_path_buf(),
        source,
    };
    let mut wtr = Writer::from_path(output).map_err(csv_err)?;
    wtr.write_record(["Orthogroup", "Outgroups"]).map_err(csv_err)?;

    let mut report = OutgroupReport::default();
    for file in &files {
        let orthogroup = unit_name(file, suffix);
        let hits = match parse_hits(file, DatabaseTag::Other) {
            Ok(parsed) => parsed.hits,
            Err(e) => {
                warn!("Skipping {}: {}", orthogroup, e);
                report.failed.push(orthogroup);
                continue;
            }
        };
        let selected = selector.select(&hits);
        debug!("{}: {:?}", orthogroup, selected);
        if selected.is_empty() {
            info!("No hits passed e-value/coverage/clade filters for {}", orthogroup);
        } else {
            report.with_outgroups += 1;
        }
        report.orthogroups += 1;
        wtr.write_record([orthogroup, selected.join(";")]).map_err(csv_err)?;
    }

    wtr.flush().map_err(|source| ParseError::Io {
        path: output.to_path_buf(),
        source,
    })?;
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(subject: &str, evalue: f64, bitscore: f64) -> HomologyHit {
        HomologyHit {
            query: "Q".into(),
            subject: subject.into(),
            identity: 40.0,
            length: 90,
            mismatches: 0,
            gap_opens: 0,
            query_start: 1,
            query_end: 90,
            subject_start: 1,
            subject_end: 90,
            evalue,
            bitscore,
            query_length: Some(100),
            subject_length: Some(120),
            database: DatabaseTag::Other,
        }
    }

    #[test]
    fn test_classify_token_boundaries() {
        let selector = OutgroupSelector::new(OutgroupParams::default()).unwrap();
        assert_eq!(selector.classify("WP_1|Sulfolobus_acidocaldarius"), Some(Clade::Tack));
        assert_eq!(selector.classify("tr|X|METHANOSARCINA_mazei"), Some(Clade::Euryarchaeota));
        assert_eq!(selector.classify("Lokiarchaeota_1"), None);
    }

    #[test]
    fn test_select_prefers_one_per_clade() {
        let selector = OutgroupSelector::new(OutgroupParams::default()).unwrap();
        let hits = vec![
            hit("Sulfolobus_a", 1e-50, 300.0),
            hit("Pyrobaculum_b", 1e-45, 280.0),
            hit("Thermococcus_c", 1e-20, 150.0),
            hit("Nitrosopumilus_d", 1e-12, 100.0),
            hit("Halobacterium_weak", 1e-3, 500.0),
            hit("Unknown_e", 1e-60, 900.0),
        ];
        let selected = selector.select(&hits);
        assert_eq!(selected, vec!["Sulfolobus_a", "Thermococcus_c", "Pyrobaculum_b"]);
    }

    #[test]
    fn test_select_outgroups_writes_csv() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("hits");
        std::fs::create_dir_all(&input).unwrap();
        std::fs::write(
            input.join("OG0000001_hits.tsv"),
            "Q\tSulfolobus_a\t40\t90\t0\t0\t1\t90\t1\t90\t1e-50\t300\t100\t120\n",
        )
        .unwrap();
        std::fs::write(input.join("OG0000002_hits.tsv"), "").unwrap();

        let selector = OutgroupSelector::new(OutgroupParams::default()).unwrap();
        let output = dir.path().join("outgroups.csv");
        let report = select_outgroups(&selector, &input, &output).unwrap();

        assert_eq!(report.orthogroups, 2);
        assert_eq!(report.with_outgroups, 1);
        let text = std::fs::read_to_string(&output).unwrap();
        assert_eq!(text, "Orthogroup,Outgroups\nOG0000001,Sulfolobus_a\nOG0000002,\n");
    }
}
