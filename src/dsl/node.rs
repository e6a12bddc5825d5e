//! Condition tree node types

use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Comparison operator of a leaf condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    /// Inclusive `[min, max]` range, numeric leaves only
    Between,
    /// Membership in a list, numeric leaves only
    In,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Eq => "==",
            Operator::Between => "between",
            Operator::In => "in",
        }
    }

    /// Whether the operator compares two scalars
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Operator::Between | Operator::In)
    }

    /// Apply a scalar operator. Range and membership operators never match here.
    pub fn compare(&self, left: f64, right: f64) -> bool {
        match self {
            Operator::Lt => left < right,
            Operator::Le => left <= right,
            Operator::Gt => left > right,
            Operator::Ge => left >= right,
            Operator::Eq => left == right,
            Operator::Between | Operator::In => false,
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "<" => Ok(Operator::Lt),
            "<=" => Ok(Operator::Le),
            ">" => Ok(Operator::Gt),
            ">=" => Ok(Operator::Ge),
            "==" => Ok(Operator::Eq),
            "between" => Ok(Operator::Between),
            "in" => Ok(Operator::In),
            other => Err(other.to_string()),
        }
    }
}

/// Reference to a feature, optionally scaled
#[derive(Debug, Clone, PartialEq)]
pub struct VarRef {
    pub var: String,
    pub agg: String,
    pub scale: Option<f64>,
}

/// Compares one feature against a literal threshold
#[derive(Debug, Clone, PartialEq)]
pub struct NumericLeaf {
    pub var: String,
    pub agg: String,
    pub op: Operator,
    /// Scalar for comparisons, `[min, max]` for `between`, list for `in`
    pub threshold: Value,
    /// Accepted for compatibility; a missing feature is false either way
    pub required: bool,
}

/// Compares two features against each other
#[derive(Debug, Clone, PartialEq)]
pub struct RelativeLeaf {
    pub left: VarRef,
    pub op: Operator,
    pub right: VarRef,
    pub required: bool,
}

/// Boolean condition tree of a rule
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionNode {
    All(Vec<ConditionNode>),
    Any(Vec<ConditionNode>),
    NoneOf(Vec<ConditionNode>),
    Numeric(NumericLeaf),
    Relative(RelativeLeaf),
}

impl ConditionNode {
    /// Visit every leaf feature reference, left to right
    pub fn for_each_reference<'a>(&'a self, visit: &mut impl FnMut(&'a str, &'a str)) {
        match self {
            ConditionNode::All(children)
            | ConditionNode::Any(children)
            | ConditionNode::NoneOf(children) => {
                for child in children {
                    child.for_each_reference(visit);
                }
            }
            ConditionNode::Numeric(leaf) => visit(&leaf.var, &leaf.agg),
            ConditionNode::Relative(leaf) => {
                visit(&leaf.left.var, &leaf.left.agg);
                visit(&leaf.right.var, &leaf.right.agg);
            }
        }
    }

    /// Depth of the tree; leaves and empty containers have depth 1
    pub fn depth(&self) -> usize {
        match self {
            ConditionNode::All(children)
            | ConditionNode::Any(children)
            | ConditionNode::NoneOf(children) => {
                1 + children.iter().map(ConditionNode::depth).max().unwrap_or(0)
            }
            ConditionNode::Numeric(_) | ConditionNode::Relative(_) => 1,
        }
    }
}
