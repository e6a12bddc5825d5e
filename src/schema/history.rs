//! History documents
//!
//! Rows are flat objects with a user id, a date and arbitrary value columns.
//! Exported files use several column spellings and date formats, so every row
//! goes through [`Normalizer::normalize_row`] first.

use chrono::NaiveDate;
use serde_json::{Map, Value};
use std::collections::HashMap;

use super::parse_documents;
use crate::error::EngineError;
use crate::normalizer::Normalizer;
use crate::types::HistoricalRecord;

/// Parses history documents into records
pub struct HistoryLoader;

impl HistoryLoader {
    /// Parse a JSON array or NDJSON history document
    pub fn parse(input: &str) -> Result<Vec<HistoricalRecord>, EngineError> {
        let rows: Vec<Map<String, Value>> = parse_documents(input)?;
        Ok(Self::from_rows(rows))
    }

    /// Convert raw rows, skipping rows without a user id or a readable date
    pub fn from_rows(rows: Vec<Map<String, Value>>) -> Vec<HistoricalRecord> {
        let total = rows.len();

        let records: Vec<HistoricalRecord> = rows
            .into_iter()
            .enumerate()
            .filter_map(|(index, row)| match Self::record_from_row(row) {
                Ok(record) => Some(record),
                Err(e) => {
                    tracing::warn!(row = index + 1, error = %e, "skipping history row");
                    None
                }
            })
            .collect();

        tracing::debug!(rows = total, kept = records.len(), "converted history rows");
        records
    }

    /// Build a record from one raw row
    pub fn record_from_row(row: Map<String, Value>) -> Result<HistoricalRecord, EngineError> {
        let mut row = Normalizer::normalize_row(row);

        let user_id = match row.remove("user_id") {
            Some(Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
            Some(Value::Number(n)) => n.to_string(),
            _ => return Err(EngineError::MissingField("user_id".to_string())),
        };

        let date = match row.remove("date") {
            Some(Value::String(s)) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                .map_err(|_| EngineError::DateParseError(s.clone()))?,
            Some(other) => return Err(EngineError::DateParseError(other.to_string())),
            None => return Err(EngineError::MissingField("date".to_string())),
        };

        let values: HashMap<String, Value> = row.into_iter().collect();
        Ok(HistoricalRecord {
            user_id,
            date,
            values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_aliases_and_dates() {
        let records = HistoryLoader::parse(
            r#"[
                {"patient_id": "p1", "calculation_date": "03/02/2024", "low_intensity_minutes": "30", "steps": 4000},
                {"user_id": "p1", "date": "2024-02-04T08:00:00", "resting_heart_rate_bpm": 61}
            ]"#,
        )
        .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].user_id, "p1");
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2024, 2, 3).unwrap());
        assert_eq!(records[0].value("minutes_light"), Some(&json!("30")));
        assert_eq!(records[0].value("steps"), Some(&json!(4000)));
        assert!(records[0].value("user_id").is_none());
        assert_eq!(records[1].date, NaiveDate::from_ymd_opt(2024, 2, 4).unwrap());
        assert_eq!(records[1].value("resting_heart_rate"), Some(&json!(61)));
    }

    #[test]
    fn test_bad_rows_skipped() {
        let records = HistoryLoader::parse(
            "{\"user_id\": \"u1\", \"date\": \"2024-01-01\"}\n\
             {\"user_id\": \"u1\", \"date\": \"someday\"}\n\
             {\"date\": \"2024-01-02\"}\n\
             {\"user_id\": 42, \"date\": \"2024-01-03\"}\n",
        )
        .unwrap();

        let users: Vec<&str> = records.iter().map(|r| r.user_id.as_str()).collect();
        assert_eq!(users, vec!["u1", "42"]);
    }

    #[test]
    fn test_record_from_row_errors() {
        let row = json!({"user_id": "u1"}).as_object().unwrap().clone();
        assert!(matches!(
            HistoryLoader::record_from_row(row),
            Err(EngineError::MissingField(field)) if field == "date"
        ));
    }

    #[test]
    fn test_malformed_document_is_error() {
        assert!(HistoryLoader::parse("[{\"user_id\": ").is_err());
    }
}
