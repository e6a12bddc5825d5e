//! Input documents
//!
//! Rules, history and the variable catalog arrive as JSON documents, either a
//! single array or NDJSON (one object per line). This module parses them into
//! engine types and validates rule definitions.

mod history;
mod rules;
mod variables;

pub use history::HistoryLoader;
pub use rules::{RuleLoader, ValidationError};
pub use variables::{CatalogIssue, Variable, VariableCatalog, VariableType};

use serde::de::DeserializeOwned;

use crate::error::EngineError;

/// Parse a JSON array or NDJSON document into items
pub fn parse_documents<T: DeserializeOwned>(input: &str) -> Result<Vec<T>, EngineError> {
    if input.trim_start().starts_with('[') {
        parse_array(input)
    } else {
        parse_ndjson(input)
    }
}

/// Parse a JSON string containing an array of items
pub fn parse_array<T: DeserializeOwned>(json: &str) -> Result<Vec<T>, EngineError> {
    let items: Vec<T> = serde_json::from_str(json)?;
    Ok(items)
}

/// Parse NDJSON (newline-delimited JSON), skipping blank lines
pub fn parse_ndjson<T: DeserializeOwned>(ndjson: &str) -> Result<Vec<T>, EngineError> {
    let mut items = Vec::new();
    for (line_num, line) in ndjson.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<T>(trimmed) {
            Ok(item) => items.push(item),
            Err(e) => {
                return Err(EngineError::ParseError(format!(
                    "Failed to parse line {}: {}",
                    line_num + 1,
                    e
                )));
            }
        }
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn test_array_and_ndjson_agree() {
        let from_array: Vec<Value> = parse_documents(r#"  [{"a": 1}, {"a": 2}]"#).unwrap();
        let from_lines: Vec<Value> = parse_documents("{\"a\": 1}\n\n{\"a\": 2}\n").unwrap();
        assert_eq!(from_array, from_lines);
    }

    #[test]
    fn test_ndjson_reports_line() {
        let err = parse_ndjson::<Value>("{\"a\": 1}\n{oops\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn test_empty_input() {
        assert!(parse_documents::<Value>("").unwrap().is_empty());
    }
}
