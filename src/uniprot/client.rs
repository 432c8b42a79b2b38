/// Remote lookups against UniProt REST and AlphaFold DB.

use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use tracing::debug;

use crate::uniprot::mapper::{AccessionService, MapperError};
use crate::uniprot::models::IdSpace;

pub const UNIPROT_REST_URL: &str = "https://rest.uniprot.org";
pub const AFDB_FILES_URL: &str = "https://alphafold.ebi.ac.uk/files";

fn build_client(timeout: Duration) -> Result<Client, MapperError> {
    Ok(Client::builder()
        .timeout(timeout)
        .user_agent(concat!("dark-proteome/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

fn check_status(id: &str, response: &Response) -> Result<(), MapperError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(MapperError::Status {
            id: id.to_string(),
            status: status.as_u16(),
        })
    }
}

/// First `UPI...` value of a UniParc search TSV response.
pub fn parse_uniparc_tsv(id: &str, body: &str) -> Result<Option<String>, MapperError> {
    let mut lines = body.trim().lines();
    lines.next();
    let Some(row) = lines.next() else {
        return Ok(None);
    };
    let upi = row.split('\t').next().unwrap_or("").trim();
    if upi.is_empty() {
        return Ok(None);
    }
    if !upi.starts_with("UPI") {
        return Err(MapperError::UnexpectedResponse {
            id: id.to_string(),
            detail: format!("first column is '{}'", upi),
        });
    }
    Ok(Some(upi.to_string()))
}

/// PDB IDs from a UniProtKB `xref_pdb` TSV response, `;`-separated.
pub fn parse_pdb_xrefs(body: &str) -> Option<String> {
    let row = body.trim().lines().nth(1)?;
    let field = row.split('\t').last()?.trim().trim_end_matches(';');
    let ids: Vec<&str> = field
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if ids.is_empty() {
        None
    } else {
        Some(ids.join(";"))
    }
}

/// Average `confidenceScore` of an AFDB confidence document, two decimals.
pub fn average_confidence(id: &str, value: &serde_json::Value) -> Result<Option<f64>, MapperError> {
    let document = match value {
        serde_json::Value::Array(items) => items.first(),
        other => Some(other),
    };
    let Some(scores) = document
        .and_then(|d| d.get("confidenceScore"))
        .and_then(|s| s.as_array())
    else {
        return Err(MapperError::UnexpectedResponse {
            id: id.to_string(),
            detail: "no confidenceScore array".to_string(),
        });
    };
    if scores.is_empty() {
        return Ok(None);
    }

    let mut sum = 0.0;
    for score in scores {
        sum += score.as_f64().ok_or_else(|| MapperError::UnexpectedResponse {
            id: id.to_string(),
            detail: format!("non-numeric confidence score {}", score),
        })?;
    }
    let mean = sum / scores.len() as f64;
    Ok(Some((mean * 100.0).round() / 100.0))
}

/// Resolves any sequence database accession to its UniParc UPI.
pub struct UniParcSearch {
    client: Client,
    base_url: String,
}

impl UniParcSearch {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MapperError> {
        Ok(UniParcSearch {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl AccessionService for UniParcSearch {
    fn space(&self) -> IdSpace {
        IdSpace::Uniparc
    }

    fn lookup(&self, id: &str) -> Result<Option<String>, MapperError> {
        let url = format!("{}/uniparc/search", self.base_url);
        debug!("GET {} query={}", url, id);
        let response = self
            .client
            .get(&url)
            .query(&[("query", id), ("format", "tsv"), ("fields", "upi"), ("size", "1")])
            .send()?;
        check_status(id, &response)?;
        parse_uniparc_tsv(id, &response.text()?)
    }
}

/// PDB cross-references of a UniProtKB accession.
pub struct PdbCrossRefs {
    client: Client,
    base_url: String,
}

impl PdbCrossRefs {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MapperError> {
        Ok(PdbCrossRefs {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl AccessionService for PdbCrossRefs {
    fn space(&self) -> IdSpace {
        IdSpace::Pdb
    }

    fn lookup(&self, id: &str) -> Result<Option<String>, MapperError> {
        let url = format!("{}/uniprotkb/{}", self.base_url, id);
        debug!("GET {}", url);
        let response = self
            .client
            .get(&url)
            .query(&[("fields", "xref_pdb"), ("format", "tsv")])
            .send()?;
        // obsolete or unknown accessions
        if matches!(response.status(), StatusCode::NOT_FOUND | StatusCode::GONE) {
            return Ok(None);
        }
        check_status(id, &response)?;
        Ok(parse_pdb_xrefs(&response.text()?))
    }
}

/// Average pLDDT of the AlphaFold DB model for a UniProt accession.
pub struct AfdbConfidence {
    client: Client,
    base_url: String,
}

impl AfdbConfidence {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MapperError> {
        Ok(AfdbConfidence {
            client: build_client(timeout)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

impl AccessionService for AfdbConfidence {
    fn space(&self) -> IdSpace {
        IdSpace::Afdb
    }

    fn lookup(&self, id: &str) -> Result<Option<String>, MapperError> {
        let url = format!("{}/AF-{}-F1-confidence_v4.json", self.base_url, id);
        debug!("GET {}", url);
        let response = self.client.get(&url).send()?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status(id, &response)?;
        let value: serde_json::Value = serde_json::from_str(&response.text()?)?;
        Ok(average_confidence(id, &value)?.map(|avg| format!("{:.2}", avg)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_uniparc_tsv() {
        assert_eq!(
            parse_uniparc_tsv("WP_1", "UniParc\nUPI0001A2B3C4\n").unwrap(),
            Some("UPI0001A2B3C4".to_string())
        );
        assert_eq!(parse_uniparc_tsv("WP_1", "UniParc\n").unwrap(), None);
        assert!(parse_uniparc_tsv("WP_1", "UniParc\nnonsense\n").is_err());
    }

    #[test]
    fn test_parse_pdb_xrefs() {
        assert_eq!(
            parse_pdb_xrefs("Entry\tPDB\nP12345\t1ABC;2XYZ;\n"),
            Some("1ABC;2XYZ".to_string())
        );
        assert_eq!(parse_pdb_xrefs("Entry\tPDB\nP12345\t\n"), None);
        assert_eq!(parse_pdb_xrefs("Entry\tPDB\n"), None);
    }

    #[test]
    fn test_average_confidence() {
        let doc = json!({"residueNumber": [1, 2, 3], "confidenceScore": [90.0, 80.0, 71.5]});
        assert_eq!(average_confidence("P1", &doc).unwrap(), Some(80.5));

        let listed = json!([{"confidenceScore": [50, 51]}]);
        assert_eq!(average_confidence("P1", &listed).unwrap(), Some(50.5));

        assert!(average_confidence("P1", &json!({"other": 1})).is_err());
        assert_eq!(average_confidence("P1", &json!({"confidenceScore": []})).unwrap(), None);
    }
}
