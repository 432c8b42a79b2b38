/// Functional category rule tables.
///
/// A rule table is a CSV with the columns `match_type,match_value,category,priority`.
/// Rules are validated once at load time and never change afterwards; any
/// malformed entry rejects the whole table.

use std::collections::HashMap;
use std::io::Read;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use csv::ReaderBuilder;
use regex::{Regex, RegexBuilder};
use serde::Deserialize;
use strum_macros::{Display, EnumString};
use thiserror::Error;
use tracing::info;

use crate::annotation::interpro::{is_ipr_accession, EntryType};

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("Cannot read rule table {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("Malformed rule table {path}: {source}")]
    Csv { path: PathBuf, source: csv::Error },

    #[error("{path}: missing column '{column}'")]
    MissingColumn { path: PathBuf, column: &'static str },

    #[error("{path}:{line}: unknown match type '{value}'")]
    UnknownMatchType { path: PathBuf, line: usize, value: String },

    #[error("{path}:{line}: empty {field}")]
    EmptyField { path: PathBuf, line: usize, field: &'static str },

    #[error("{path}:{line}: priority '{value}' is not an integer")]
    InvalidPriority { path: PathBuf, line: usize, value: String },

    #[error("{path}:{line}: '{value}' is not an InterPro accession")]
    InvalidAccession { path: PathBuf, line: usize, value: String },

    #[error("{path}:{line}: '{value}' is not an InterPro entry type")]
    InvalidEntryType { path: PathBuf, line: usize, value: String },

    #[error("{path}:{line}: {match_type} '{value}' maps to both '{first}' and '{second}'")]
    ConflictingCategory {
        path: PathBuf,
        line: usize,
        match_type: MatchType,
        value: String,
        first: String,
        second: String,
    },

    #[error("Regex pattern error: {0}")]
    RegexError(#[from] regex::Error),
}

/// Rule kinds in evaluation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, EnumString)]
#[strum(serialize_all = "snake_case")]
pub enum MatchType {
    IprId,
    Keyword,
    IprType,
}

/// How keyword rules compare against annotation text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, ValueEnum, Deserialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum KeywordMode {
    /// Case-insensitive match anywhere, including inside longer words
    #[default]
    Substring,
    /// Case-insensitive match on whole words only
    WordBoundary,
}

#[derive(Debug, Clone)]
pub enum Matcher {
    ExactId(String),
    Keyword { keyword: String, pattern: Regex },
    EntryType(EntryType),
}

impl Matcher {
    pub fn match_type(&self) -> MatchType {
        match self {
            Matcher::ExactId(_) => MatchType::IprId,
            Matcher::Keyword { .. } => MatchType::Keyword,
            Matcher::EntryType(_) => MatchType::IprType,
        }
    }

    /// Text recorded as the trigger when this matcher fires.
    pub fn value(&self) -> String {
        match self {
            Matcher::ExactId(id) => id.clone(),
            Matcher::Keyword { keyword, .. } => keyword.clone(),
            Matcher::EntryType(t) => t.to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Rule {
    pub matcher: Matcher,
    pub category: String,
    pub priority: i64,
    /// Position in the rule table, used to break priority ties.
    pub order: usize,
}

#[derive(Debug, Clone)]
pub struct RuleSet {
    rules: Vec<Rule>,
    mode: KeywordMode,
}

fn keyword_pattern(keyword: &str, mode: KeywordMode) -> Result<Regex, regex::Error> {
    let escaped = regex::escape(keyword);
    let pattern = match mode {
        KeywordMode::Substring => escaped,
        KeywordMode::WordBoundary => format!(r"\b{}\b", escaped),
    };
    RegexBuilder::new(&pattern).case_insensitive(true).build()
}

impl RuleSet {
    pub fn from_path(path: &Path, mode: KeywordMode) -> Result<Self, RuleError> {
        let file = std::fs::File::open(path).map_err(|source| RuleError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let rules = Self::from_reader(file, path, mode)?;
        info!("Loaded {} categorization rules from {}", rules.len(), path.display());
        Ok(rules)
    }

    pub fn from_reader<R: Read>(reader: R, path: &Path, mode: KeywordMode) -> Result<Self, RuleError> {
        let mut csv_reader = ReaderBuilder::new()
            .trim(csv::Trim::All)
            .comment(Some(b'#'))
            .from_reader(reader);
        let csv_err = |source| RuleError::Csv {
            path: path.to_path_buf(),
            source,
        };

        let headers = csv_reader.headers().map_err(csv_err)?.clone();
        let column = |name: &'static str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(name))
                .ok_or_else(|| RuleError::MissingColumn {
                    path: path.to_path_buf(),
                    column: name,
                })
        };
        let (type_col, value_col, category_col, priority_col) =
            (column("match_type")?, column("match_value")?, column("category")?, column("priority")?);

        let mut rules = Vec::new();
        let mut bound: HashMap<(MatchType, String), String> = HashMap::new();

        for (order, record) in csv_reader.records().enumerate() {
            let record = record.map_err(csv_err)?;
            let line = record.position().map(|p| p.line() as usize).unwrap_or(order + 2);
            let field = |i: usize| record.get(i).unwrap_or("");

            let match_type: MatchType = field(type_col).to_lowercase().parse().map_err(|_| {
                RuleError::UnknownMatchType {
                    path: path.to_path_buf(),
                    line,
                    value: field(type_col).to_string(),
                }
            })?;
            let value = field(value_col);
            if value.is_empty() {
                return Err(RuleError::EmptyField {
                    path: path.to_path_buf(),
                    line,
                    field: "match_value",
                });
            }
            let category = field(category_col);
            if category.is_empty() {
                return Err(RuleError::EmptyField {
                    path: path.to_path_buf(),
                    line,
                    field: "category",
                });
            }
            let priority: i64 = field(priority_col).parse().map_err(|_| RuleError::InvalidPriority {
                path: path.to_path_buf(),
                line,
                value: field(priority_col).to_string(),
            })?;

            let matcher = match match_type {
                MatchType::IprId => {
                    let id = value.to_uppercase();
                    if !is_ipr_accession(&id) {
                        return Err(RuleError::InvalidAccession {
                            path: path.to_path_buf(),
                            line,
                            value: value.to_string(),
                        });
                    }
                    Matcher::ExactId(id)
                }
                MatchType::Keyword => Matcher::Keyword {
                    keyword: value.to_string(),
                    pattern: keyword_pattern(value, mode)?,
                },
                MatchType::IprType => {
                    let entry_type = value.parse::<EntryType>().map_err(|_| RuleError::InvalidEntryType {
                        path: path.to_path_buf(),
                        line,
                        value: value.to_string(),
                    })?;
                    Matcher::EntryType(entry_type)
                }
            };

            let key = (match_type, matcher.value().to_lowercase());
            if let Some(existing) = bound.get(&key) {
                if existing != category {
                    return Err(RuleError::ConflictingCategory {
                        path: path.to_path_buf(),
                        line,
                        match_type,
                        value: value.to_string(),
                        first: existing.clone(),
                        second: category.to_string(),
                    });
                }
            } else {
                bound.insert(key, category.to_string());
            }

            rules.push(Rule {
                matcher,
                category: category.to_string(),
                priority,
                order,
            });
        }

        rules.sort_by(|a, b| {
            a.matcher
                .match_type()
                .cmp(&b.matcher.match_type())
                .then(a.priority.cmp(&b.priority))
                .then(a.order.cmp(&b.order))
        });
        Ok(RuleSet { rules, mode })
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn mode(&self) -> KeywordMode {
        self.mode
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn load(text: &str) -> Result<RuleSet, RuleError> {
        RuleSet::from_reader(text.as_bytes(), Path::new("rules.csv"), KeywordMode::Substring)
    }

    #[test]
    fn test_rules_sorted_by_kind_then_priority() {
        let rules = load(
            "match_type,match_value,category,priority\n\
             keyword,ESCRT,Membrane_Trafficking,1\n\
             ipr_type,Domain,Domain_Only,0\n\
             ipr_id,IPR000719,Kinase,50\n\
             ipr_id,IPR001245,Kinase,10\n",
        )
        .unwrap();
        let order: Vec<String> = rules.rules().iter().map(|r| r.matcher.value()).collect();
        assert_eq!(order, vec!["IPR001245", "IPR000719", "ESCRT", "Domain"]);
    }

    #[test]
    fn test_invalid_tables_are_rejected() {
        let header = "match_type,match_value,category,priority\n";
        assert!(matches!(
            load(&format!("{}regex,foo,Bar,1\n", header)),
            Err(RuleError::UnknownMatchType { .. })
        ));
        assert!(matches!(
            load(&format!("{}ipr_id,IPR12,Bar,1\n", header)),
            Err(RuleError::InvalidAccession { .. })
        ));
        assert!(matches!(
            load(&format!("{}keyword,kinase,Kinase,high\n", header)),
            Err(RuleError::InvalidPriority { .. })
        ));
        assert!(matches!(
            load(&format!("{}keyword,,Kinase,1\n", header)),
            Err(RuleError::EmptyField { field: "match_value", .. })
        ));
        assert!(matches!(
            load(&format!("{}ipr_type,Motif,Bar,1\n", header)),
            Err(RuleError::InvalidEntryType { .. })
        ));
        assert!(matches!(
            load(&format!("{}keyword,Kinase,Kinase,1\nkeyword,kinase,Signalling,2\n", header)),
            Err(RuleError::ConflictingCategory { .. })
        ));
        assert!(matches!(
            load("type,value,category,priority\n"),
            Err(RuleError::MissingColumn { column: "match_type", .. })
        ));
    }

    #[test]
    fn test_word_boundary_pattern() {
        let substring = keyword_pattern("ras", KeywordMode::Substring).unwrap();
        let word = keyword_pattern("ras", KeywordMode::WordBoundary).unwrap();
        assert!(substring.is_match("Hydrolase, Ras-like"));
        assert!(substring.is_match("Kinase, transferase"));
        assert!(word.is_match("Small GTPase Ras"));
        assert!(!word.is_match("transferase"));
    }
}
