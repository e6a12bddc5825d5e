//! Error types for Synheart Rules

use thiserror::Error;

/// Errors that abort a single engine call
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Failed to parse input: {0}")]
    ParseError(String),

    #[error("Invalid JSON: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Date parse error: {0}")]
    DateParseError(String),

    #[error("History provider unavailable: {0}")]
    HistoryUnavailable(String),

    #[error("Rule provider unavailable: {0}")]
    RulesUnavailable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid rule {rule_id}: {reason}")]
    InvalidRule { rule_id: String, reason: String },
}

/// Malformed condition logic.
///
/// Raised while parsing a rule's stored logic. The orchestrator catches it per
/// rule, so one bad rule never stops the others.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DslError {
    #[error("logic node must be a JSON object, got {0}")]
    NotAnObject(String),

    #[error("unknown logic node shape with keys [{0}]")]
    UnknownShape(String),

    #[error("missing required key '{0}'")]
    MissingKey(&'static str),

    #[error("key '{key}' has the wrong type (expected {expected})")]
    WrongType { key: &'static str, expected: &'static str },

    #[error("unsupported operator '{op}' for {node} condition")]
    UnsupportedOperator { op: String, node: &'static str },
}
