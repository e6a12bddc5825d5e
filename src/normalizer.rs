//! Raw value normalization
//!
//! This module normalizes raw history columns before feature derivation:
//! - Raw values coerced to finite numbers (anything else is absent)
//! - Vendor column names mapped to canonical variable names
//! - Lenient date parsing for exported spreadsheets

use chrono::NaiveDate;
use serde_json::{Map, Value};

/// Column aliases seen in vendor exports, mapped to canonical names
pub const COLUMN_ALIASES: &[(&str, &str)] = &[
    ("patient_id", "user_id"),
    ("calculation_date", "date"),
    ("low_intensity_minutes", "minutes_light"),
    ("moderate_intensity_minutes", "minutes_moderate"),
    ("vigorous_intensity_minutes", "minutes_vigorous"),
    ("resting_heart_rate_bpm", "resting_heart_rate"),
];

/// Normalizer for raw history values
pub struct Normalizer;

impl Normalizer {
    /// Coerce a raw value to a finite number.
    ///
    /// Numbers pass through, strings are trimmed and parsed. Null, booleans,
    /// blank strings, NaN and infinities are all treated as absent.
    pub fn to_number(value: &Value) -> Option<f64> {
        let number = match value {
            Value::Number(n) => n.as_f64()?,
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    return None;
                }
                trimmed.parse::<f64>().ok()?
            }
            _ => return None,
        };

        number.is_finite().then_some(number)
    }

    /// Canonical name for a column, lowercased and with aliases applied
    pub fn canonical_column(name: &str) -> String {
        let lowered = name.trim().to_lowercase();
        COLUMN_ALIASES
            .iter()
            .find(|(alias, _)| *alias == lowered)
            .map(|(_, canonical)| canonical.to_string())
            .unwrap_or(lowered)
    }

    /// Rename aliased columns of a raw history row and normalize its date.
    ///
    /// Empty string cells are dropped. When both an alias and its canonical
    /// column are present, the canonical column wins.
    pub fn normalize_row(row: Map<String, Value>) -> Map<String, Value> {
        let mut normalized = Map::with_capacity(row.len());
        let mut aliased = Vec::new();

        for (key, value) in row {
            if matches!(&value, Value::String(s) if s.trim().is_empty()) {
                continue;
            }
            let canonical = Self::canonical_column(&key);
            if canonical != key.trim().to_lowercase() {
                aliased.push((canonical, value));
            } else {
                normalized.insert(canonical, value);
            }
        }

        for (key, value) in aliased {
            normalized.entry(key).or_insert(value);
        }

        let parsed_date = match normalized.get("date") {
            Some(Value::String(raw)) => parse_date(raw),
            _ => None,
        };
        if let Some(date) = parsed_date {
            normalized.insert("date".to_string(), Value::String(date.to_string()));
        }

        normalized
    }
}

/// Parse a date in any of the accepted export formats.
///
/// Accepts `YYYY-MM-DD`, `DD/MM/YYYY`, `MM/DD/YYYY` (only when the day-first
/// reading is invalid) and datetimes whose first ten characters are an ISO date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%d/%m/%Y") {
        return Some(date);
    }
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%m/%d/%Y") {
        return Some(date);
    }

    trimmed
        .get(..10)
        .filter(|_| trimmed.len() > 10)
        .and_then(|prefix| NaiveDate::parse_from_str(prefix, "%Y-%m-%d").ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_number() {
        assert_eq!(Normalizer::to_number(&json!(42)), Some(42.0));
        assert_eq!(Normalizer::to_number(&json!(4.5)), Some(4.5));
        assert_eq!(Normalizer::to_number(&json!(" 7.25 ")), Some(7.25));
        assert_eq!(Normalizer::to_number(&json!("")), None);
        assert_eq!(Normalizer::to_number(&json!("n/a")), None);
        assert_eq!(Normalizer::to_number(&json!("NaN")), None);
        assert_eq!(Normalizer::to_number(&json!("inf")), None);
        assert_eq!(Normalizer::to_number(&json!(true)), None);
        assert_eq!(Normalizer::to_number(&Value::Null), None);
    }

    #[test]
    fn test_canonical_column() {
        assert_eq!(Normalizer::canonical_column("patient_id"), "user_id");
        assert_eq!(Normalizer::canonical_column(" Steps "), "steps");
        assert_eq!(
            Normalizer::canonical_column("resting_heart_rate_bpm"),
            "resting_heart_rate"
        );
    }

    #[test]
    fn test_normalize_row() {
        let row = json!({
            "patient_id": "u1",
            "calculation_date": "2024-01-15T00:00:00",
            "low_intensity_minutes": 30,
            "steps": "",
            "readiness_score": 70
        });
        let Value::Object(map) = row else { unreachable!() };

        let normalized = Normalizer::normalize_row(map);
        assert_eq!(normalized["user_id"], json!("u1"));
        assert_eq!(normalized["date"], json!("2024-01-15"));
        assert_eq!(normalized["minutes_light"], json!(30));
        assert!(!normalized.contains_key("steps"));
        assert_eq!(normalized["readiness_score"], json!(70));
    }

    #[test]
    fn test_canonical_column_wins_over_alias() {
        let Value::Object(map) = json!({"user_id": "canonical", "patient_id": "alias"}) else {
            unreachable!()
        };
        let normalized = Normalizer::normalize_row(map);
        assert_eq!(normalized["user_id"], json!("canonical"));
    }

    #[test]
    fn test_parse_date_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15).unwrap();
        assert_eq!(parse_date("2024-01-15"), Some(expected));
        assert_eq!(parse_date("15/01/2024"), Some(expected));
        assert_eq!(parse_date("01/15/2024"), Some(expected));
        assert_eq!(parse_date("2024-01-15 08:30:00"), Some(expected));
        assert_eq!(parse_date("2024-01-15T08:30:00"), Some(expected));
        assert_eq!(parse_date("yesterday"), None);
    }
}
