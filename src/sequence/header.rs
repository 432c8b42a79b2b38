/// Standardized protein headers: `ProteinID|GenomeID|Source|AnnotationType|Name`.

use std::fmt;

use regex::Regex;
use strum_macros::{Display, EnumString};
use thiserror::Error;

use crate::sequence::constants::{HEADER_DELIMITER, HEADER_FIELD_COUNT, UNKNOWN_SOURCE};

#[derive(Error, Debug)]
pub enum HeaderError {
    #[error("Regex pattern error: {0}")]
    RegexError(#[from] regex::Error),

    #[error("Header '{0}' has fewer than five '|' fields")]
    TooFewFields(String),

    #[error("Header '{0}' has an empty protein ID")]
    EmptyId(String),

    #[error("Unknown annotation type '{0}'")]
    AnnotationType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum AnnotationType {
    Hypothetical,
    Annotated,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardHeader {
    pub protein_id: String,
    pub genome_id: String,
    pub source: String,
    pub annotation_type: AnnotationType,
    pub name: Option<String>,
}

impl StandardHeader {
    /// Parses a header written by [`HeaderCleaner::standardize`].
    pub fn parse(header: &str) -> Result<Self, HeaderError> {
        let id_part = header.split_whitespace().next().unwrap_or("");
        let fields: Vec<&str> = id_part.split(HEADER_DELIMITER).collect();
        if fields.len() < HEADER_FIELD_COUNT {
            return Err(HeaderError::TooFewFields(header.to_string()));
        }
        if fields[0].is_empty() {
            return Err(HeaderError::EmptyId(header.to_string()));
        }

        let annotation_type = fields[3]
            .parse::<AnnotationType>()
            .map_err(|_| HeaderError::AnnotationType(fields[3].to_string()))?;

        Ok(StandardHeader {
            protein_id: fields[0].to_string(),
            genome_id: fields[1].to_string(),
            source: fields[2].to_string(),
            annotation_type,
            name: Some(fields[4].to_string()).filter(|n| !n.is_empty()),
        })
    }
}

impl fmt::Display for StandardHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}|{}",
            self.protein_id,
            self.genome_id,
            self.source,
            self.annotation_type,
            self.name.as_deref().unwrap_or("")
        )
    }
}

/// Lookup key used to match IDs from other tools: the text before the first `|`.
pub fn lookup_key(id: &str) -> &str {
    id.split(HEADER_DELIMITER).next().unwrap_or(id).trim()
}

/// Compiled patterns used to clean NCBI-style protein descriptions.
pub struct HeaderCleaner {
    separators: Regex,
    disallowed: Regex,
    underscores: Regex,
    generic_name: Regex,
    bracket: Regex,
    bracket_separators: Regex,
    hypothetical: Regex,
}

impl HeaderCleaner {
    pub fn new() -> Result<Self, HeaderError> {
        Ok(HeaderCleaner {
            separators: Regex::new(r"[\s,;()\[\]{}:/\\]+")?,
            disallowed: Regex::new(r"[^a-zA-Z0-9_.\-]")?,
            underscores: Regex::new(r"_+")?,
            generic_name: Regex::new(
                r"(?i)^(hypothetical_protein|unknown|predicted_protein|uncharacterized_protein|protein_of_unknown_function|possible_protein|orf|DUF.*)$",
            )?,
            bracket: Regex::new(r"\[([^\]]+)\]")?,
            bracket_separators: Regex::new(r"[\s/]+")?,
            hypothetical: Regex::new(
                r"(?i)(hypothetical|unknown|predicted|uncharacterized|domain_of_unknown_function)",
            )?,
        })
    }

    /// Cleans the annotation text before the first `[`; generic names yield `None`.
    pub fn clean_name(&self, description: &str) -> Option<String> {
        let before = description.split('[').next().unwrap_or("").trim();
        if before.is_empty() {
            return None;
        }

        let cleaned = self.separators.replace_all(before, "_");
        let cleaned = self.disallowed.replace_all(&cleaned, "");
        let cleaned = self.underscores.replace_all(&cleaned, "_");
        let cleaned = cleaned.trim_matches('_');

        if cleaned.is_empty() || self.generic_name.is_match(cleaned) {
            return None;
        }
        Some(cleaned.to_string())
    }

    /// Cleans the content of the first `[...]`, usually the organism.
    pub fn clean_source(&self, description: &str) -> String {
        let Some(caps) = self.bracket.captures(description) else {
            return UNKNOWN_SOURCE.to_string();
        };
        let raw = caps.get(1).map(|m| m.as_str().trim()).unwrap_or("");
        let cleaned = self.bracket_separators.replace_all(raw, "_");
        let cleaned = self.disallowed.replace_all(&cleaned, "");

        if cleaned.is_empty() {
            UNKNOWN_SOURCE.to_string()
        } else {
            cleaned.to_string()
        }
    }

    /// Builds the standardized header for one protein of a genome.
    pub fn standardize(&self, protein_id: &str, description: &str, genome_id: &str) -> StandardHeader {
        let source = self.clean_source(description);
        let cleaned = self.clean_name(description);

        let (annotation_type, name) = if self.hypothetical.is_match(description) {
            (AnnotationType::Hypothetical, None)
        } else if let Some(name) = cleaned {
            (AnnotationType::Annotated, Some(name))
        } else {
            (AnnotationType::Hypothetical, None)
        };

        StandardHeader {
            protein_id: protein_id.to_string(),
            genome_id: genome_id.to_string(),
            source,
            annotation_type,
            name,
        }
    }
}
