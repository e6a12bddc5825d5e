//! Condition tree DSL
//!
//! Rules carry their condition as JSON:
//! - containers `{"all": [...]}`, `{"any": [...]}`, `{"none": [...]}`
//! - numeric leaves `{"var", "agg", "op", "value", "required"}`
//! - relative leaves `{"left": {...}, "op", "right": {...}, "required"}`
//!
//! The JSON is parsed once into a [`ConditionNode`] tree which evaluates to a
//! boolean plus a [`TraceRecord`] explaining the outcome.

mod evaluator;
mod node;
mod parser;
mod trace;

pub use node::{ConditionNode, NumericLeaf, Operator, RelativeLeaf, VarRef};
pub use parser::{parse, parse_str};
pub use trace::{OperandTrace, TraceRecord};
