//! Evaluation trace records
//!
//! One record per evaluated node. Container records nest the records of the
//! children they actually evaluated, so a short-circuited `all` shows exactly
//! which child stopped it.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Feature operand of a relative comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperandTrace {
    pub var: String,
    pub agg: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<f64>,
    /// Resolved value after scaling
    pub value: Option<f64>,
}

/// Trace of one evaluated node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TraceRecord {
    All {
        result: bool,
        children_count: usize,
        children: Vec<TraceRecord>,
    },
    Any {
        result: bool,
        children_count: usize,
        children: Vec<TraceRecord>,
    },
    #[serde(rename = "none")]
    NoneOf {
        result: bool,
        children_count: usize,
        children: Vec<TraceRecord>,
    },
    Numeric {
        var: String,
        agg: String,
        op: String,
        threshold: Value,
        observed: Option<f64>,
        required: bool,
        result: bool,
    },
    Relative {
        left: OperandTrace,
        op: String,
        right: OperandTrace,
        required: bool,
        result: bool,
    },
}

impl TraceRecord {
    pub fn result(&self) -> bool {
        match self {
            TraceRecord::All { result, .. }
            | TraceRecord::Any { result, .. }
            | TraceRecord::NoneOf { result, .. }
            | TraceRecord::Numeric { result, .. }
            | TraceRecord::Relative { result, .. } => *result,
        }
    }

    /// Child records of a container; empty for leaves
    pub fn children(&self) -> &[TraceRecord] {
        match self {
            TraceRecord::All { children, .. }
            | TraceRecord::Any { children, .. }
            | TraceRecord::NoneOf { children, .. } => children,
            TraceRecord::Numeric { .. } | TraceRecord::Relative { .. } => &[],
        }
    }

    /// Number of records in this subtree, including this one
    pub fn node_count(&self) -> usize {
        1 + self.children().iter().map(TraceRecord::node_count).sum::<usize>()
    }
}
