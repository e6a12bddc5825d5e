//! Variable catalog
//!
//! Describes the variables rules may reference and which aggregators each one
//! supports. Checking a condition against the catalog is advisory: the
//! evaluator treats unknown variables as missing, so these are warnings for
//! rule authors rather than evaluation errors.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use super::parse_documents;
use crate::dsl::ConditionNode;
use crate::error::EngineError;
use crate::features::Aggregator;
use crate::types::DEFAULT_TENANT;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    #[default]
    Number,
    Boolean,
    Category,
}

/// One catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub key: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default, rename = "type")]
    pub var_type: VariableType,
    #[serde(default = "all_aggregators")]
    pub allowed_aggregators: Vec<String>,
    #[serde(default)]
    pub valid_min: Option<f64>,
    #[serde(default)]
    pub valid_max: Option<f64>,
    #[serde(default)]
    pub decimals: Option<u8>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_tenant")]
    pub tenant_id: String,
}

fn all_aggregators() -> Vec<String> {
    Aggregator::ALL.iter().map(|a| a.as_str().to_string()).collect()
}

fn default_tenant() -> String {
    DEFAULT_TENANT.to_string()
}

impl Variable {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            label: None,
            description: None,
            unit: None,
            var_type: VariableType::Number,
            allowed_aggregators: all_aggregators(),
            valid_min: None,
            valid_max: None,
            decimals: None,
            category: None,
            tenant_id: default_tenant(),
        }
    }

    pub fn with_aggregators<I, S>(mut self, aggregators: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.allowed_aggregators = aggregators.into_iter().map(Into::into).collect();
        self
    }

    pub fn allows(&self, agg: &str) -> bool {
        self.allowed_aggregators.iter().any(|a| a == agg)
    }

    /// Whether a raw value sits inside the declared valid range
    pub fn in_range(&self, value: f64) -> bool {
        self.valid_min.map_or(true, |min| value >= min) && self.valid_max.map_or(true, |max| value <= max)
    }
}

/// Reference in a condition that the catalog does not support
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "issue", rename_all = "snake_case")]
pub enum CatalogIssue {
    UnknownVariable { var: String },
    UnknownAggregator { var: String, agg: String },
    DisallowedAggregator { var: String, agg: String },
}

impl fmt::Display for CatalogIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogIssue::UnknownVariable { var } => write!(f, "unknown variable '{var}'"),
            CatalogIssue::UnknownAggregator { var, agg } => {
                write!(f, "unknown aggregator '{agg}' on '{var}'")
            }
            CatalogIssue::DisallowedAggregator { var, agg } => {
                write!(f, "aggregator '{agg}' is not allowed for '{var}'")
            }
        }
    }
}

/// Variables keyed by name
#[derive(Debug, Clone, Default)]
pub struct VariableCatalog {
    variables: HashMap<String, Variable>,
}

impl VariableCatalog {
    pub fn new(variables: impl IntoIterator<Item = Variable>) -> Self {
        Self {
            variables: variables.into_iter().map(|v| (v.key.clone(), v)).collect(),
        }
    }

    /// Parse a JSON array or NDJSON catalog document
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        let variables: Vec<Variable> = parse_documents(input)?;
        Ok(Self::new(variables))
    }

    pub fn get(&self, key: &str) -> Option<&Variable> {
        self.variables.get(key)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Issues for every feature reference in the tree, in order, deduplicated
    pub fn check_condition(&self, node: &ConditionNode) -> Vec<CatalogIssue> {
        let mut issues = Vec::new();
        node.for_each_reference(&mut |var, agg| {
            let issue = if agg.parse::<Aggregator>().is_err() {
                Some(CatalogIssue::UnknownAggregator {
                    var: var.to_string(),
                    agg: agg.to_string(),
                })
            } else {
                match self.variables.get(var) {
                    None => Some(CatalogIssue::UnknownVariable { var: var.to_string() }),
                    Some(variable) if !variable.allows(agg) => Some(CatalogIssue::DisallowedAggregator {
                        var: var.to_string(),
                        agg: agg.to_string(),
                    }),
                    Some(_) => None,
                }
            };
            if let Some(issue) = issue {
                if !issues.contains(&issue) {
                    issues.push(issue);
                }
            }
        });
        issues
    }
}
