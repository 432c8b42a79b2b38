/// Signal peptide predictions (USPNet-style CSV/TSV).

use std::path::Path;

use csv::{ReaderBuilder, StringRecord};
use tracing::info;

use crate::annotation::{optional, Capabilities, ParseError, SourceTable};
use crate::util::{delimiter_for, open_reader};

const KEY_COLUMNS: [&str; 4] = ["ID", "Sequence_ID", "id", "protein_id"];
const PREDICTION_COLUMNS: [&str; 4] = ["prediction", "predicted_type", "type", "signal_type"];
const PROBABILITY_COLUMNS: [&str; 4] = ["probability", "prob", "score", "confidence"];
const CLEAVAGE_COLUMNS: [&str; 3] = ["cleavage_site", "cleavage", "cs_position"];

pub const FIELD_PREDICTION: &str = "prediction";
pub const FIELD_PROBABILITY: &str = "probability";
pub const FIELD_CLEAVAGE: &str = "cleavage_site";

#[derive(Debug, Clone, PartialEq)]
pub struct SignalPrediction {
    pub protein_id: String,
    pub prediction: Option<String>,
    pub probability: Option<f64>,
    pub cleavage_site: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct SignalPredictions {
    pub records: Vec<SignalPrediction>,
    pub capabilities: Capabilities,
}

fn find_column(headers: &StringRecord, candidates: &[&str]) -> Option<usize> {
    candidates.iter().find_map(|candidate| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(candidate))
    })
}

pub fn parse_signal(path: &Path) -> Result<SignalPredictions, ParseError> {
    let reader = open_reader(path).map_err(|source| ParseError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut csv_reader = ReaderBuilder::new()
        .delimiter(delimiter_for(path))
        .flexible(true)
        .comment(Some(b'#'))
        .from_reader(reader);
    let csv_err = |source| ParseError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let headers = csv_reader.headers().map_err(csv_err)?.clone();
    let key = KEY_COLUMNS
        .iter()
        .find_map(|k| headers.iter().position(|h| h.trim() == *k))
        .ok_or_else(|| ParseError::MissingColumn {
            path: path.to_path_buf(),
            column: KEY_COLUMNS.join("|"),
        })?;
    let prediction = find_column(&headers, &PREDICTION_COLUMNS);
    let probability = find_column(&headers, &PROBABILITY_COLUMNS);
    let cleavage = find_column(&headers, &CLEAVAGE_COLUMNS);

    let mut parsed = SignalPredictions::default();
    for (column, field) in [
        (prediction, FIELD_PREDICTION),
        (probability, FIELD_PROBABILITY),
        (cleavage, FIELD_CLEAVAGE),
    ] {
        if column.is_some() {
            parsed.capabilities.mark(field);
        }
    }

    for (index, record) in csv_reader.records().enumerate() {
        let record = record.map_err(csv_err)?;
        let Some(id) = record.get(key).map(str::trim).filter(|v| !v.is_empty()) else {
            continue;
        };
        let cell = |column: Option<usize>| column.and_then(|c| optional(record.get(c)));

        let score = match cell(probability) {
            Some(value) => Some(value.parse::<f64>().map_err(|_| ParseError::InvalidField {
                path: path.to_path_buf(),
                line: index + 2,
                field: "probability",
                value,
            })?),
            None => None,
        };
        parsed.records.push(SignalPrediction {
            protein_id: id.to_string(),
            prediction: cell(prediction),
            probability: score,
            cleavage_site: cell(cleavage),
        });
    }

    info!("Parsed {} signal peptide predictions from {}", parsed.records.len(), path.display());
    Ok(parsed)
}

impl SignalPredictions {
    pub fn to_source_table(&self) -> SourceTable {
        let columns = vec![
            "SignalPeptide_Type".to_string(),
            "SignalPeptide_Probability".to_string(),
            "SignalPeptide_Cleavage".to_string(),
        ];
        let mut table = SourceTable::new("signal_peptide", columns);
        for record in &self.records {
            table.insert(
                &record.protein_id,
                vec![
                    record.prediction.clone(),
                    record.probability.map(|p| format!("{:.3}", p)),
                    record.cleavage_site.clone(),
                ],
            );
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_uspnet_csv() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uspnet.csv");
        std::fs::write(&path, "ID,Prediction,Probability\nP1,SP,0.97\nP2,NO_SP,\n").unwrap();

        let parsed = parse_signal(&path).unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[0].prediction.as_deref(), Some("SP"));
        assert_eq!(parsed.records[1].probability, None);
        assert!(parsed.capabilities.has(FIELD_PROBABILITY));
        assert!(!parsed.capabilities.has(FIELD_CLEAVAGE));

        let table = parsed.to_source_table();
        assert_eq!(table.get("P1", "SignalPeptide_Probability"), Some("0.970"));
    }

    #[test]
    fn test_missing_key_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("uspnet.tsv");
        std::fs::write(&path, "Name\tPrediction\nP1\tSP\n").unwrap();
        assert!(matches!(parse_signal(&path), Err(ParseError::MissingColumn { .. })));
    }
}
