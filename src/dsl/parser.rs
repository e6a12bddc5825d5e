//! Parser from the JSON wire format to condition trees
//!
//! Node shape is decided by key: `all` / `any` / `none` containers first, then
//! relative leaves (`left` + `right`), then numeric leaves (`var`).

use serde_json::{Map, Value};

use super::node::{ConditionNode, NumericLeaf, Operator, RelativeLeaf, VarRef};
use crate::error::DslError;
use crate::features::Aggregator;

/// Parse a rule's stored logic into a condition tree
pub fn parse(logic: &Value) -> Result<ConditionNode, DslError> {
    let obj = logic
        .as_object()
        .ok_or_else(|| DslError::NotAnObject(json_kind(logic).to_string()))?;

    if let Some(children) = obj.get("all") {
        return Ok(ConditionNode::All(parse_children(children, "all")?));
    }
    if let Some(children) = obj.get("any") {
        return Ok(ConditionNode::Any(parse_children(children, "any")?));
    }
    if let Some(children) = obj.get("none") {
        return Ok(ConditionNode::NoneOf(parse_children(children, "none")?));
    }
    if obj.contains_key("left") || obj.contains_key("right") {
        return parse_relative(obj).map(ConditionNode::Relative);
    }
    if obj.contains_key("var") {
        return parse_numeric(obj).map(ConditionNode::Numeric);
    }

    let keys: Vec<&str> = obj.keys().map(String::as_str).collect();
    Err(DslError::UnknownShape(keys.join(", ")))
}

/// Parse logic stored as a JSON string
pub fn parse_str(logic: &str) -> Result<ConditionNode, DslError> {
    let value: Value = serde_json::from_str(logic)
        .map_err(|_| DslError::NotAnObject("invalid JSON text".to_string()))?;
    parse(&value)
}

fn parse_children(value: &Value, key: &'static str) -> Result<Vec<ConditionNode>, DslError> {
    value
        .as_array()
        .ok_or(DslError::WrongType {
            key,
            expected: "array",
        })?
        .iter()
        .map(parse)
        .collect()
}

fn parse_numeric(obj: &Map<String, Value>) -> Result<NumericLeaf, DslError> {
    let var = required_str(obj, "var")?;
    let agg = optional_agg(obj)?;
    let op = parse_operator(obj, "numeric")?;
    let threshold = obj.get("value").cloned().ok_or(DslError::MissingKey("value"))?;
    let required = optional_bool(obj, "required")?;

    Ok(NumericLeaf {
        var,
        agg,
        op,
        threshold,
        required,
    })
}

fn parse_relative(obj: &Map<String, Value>) -> Result<RelativeLeaf, DslError> {
    let left = parse_var_ref(obj, "left")?;
    let right = parse_var_ref(obj, "right")?;
    let op = parse_operator(obj, "relative")?;
    if !op.is_scalar() {
        return Err(DslError::UnsupportedOperator {
            op: op.to_string(),
            node: "relative",
        });
    }
    let required = optional_bool(obj, "required")?;

    Ok(RelativeLeaf {
        left,
        op,
        right,
        required,
    })
}

fn parse_var_ref(obj: &Map<String, Value>, key: &'static str) -> Result<VarRef, DslError> {
    let side = obj
        .get(key)
        .ok_or(DslError::MissingKey(key))?
        .as_object()
        .ok_or(DslError::WrongType {
            key,
            expected: "object",
        })?;

    let scale = match side.get("scale") {
        None | Some(Value::Null) => None,
        Some(value) => Some(value.as_f64().ok_or(DslError::WrongType {
            key: "scale",
            expected: "number",
        })?),
    };

    Ok(VarRef {
        var: required_str(side, "var")?,
        agg: optional_agg(side)?,
        scale,
    })
}

fn parse_operator(obj: &Map<String, Value>, node: &'static str) -> Result<Operator, DslError> {
    let op = required_str(obj, "op")?;
    op.parse::<Operator>()
        .map_err(|op| DslError::UnsupportedOperator { op, node })
}

fn required_str(obj: &Map<String, Value>, key: &'static str) -> Result<String, DslError> {
    match obj.get(key) {
        None => Err(DslError::MissingKey(key)),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(DslError::WrongType {
            key,
            expected: "string",
        }),
    }
}

fn optional_agg(obj: &Map<String, Value>) -> Result<String, DslError> {
    match obj.get("agg") {
        None | Some(Value::Null) => Ok(Aggregator::Current.as_str().to_string()),
        Some(Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(DslError::WrongType {
            key: "agg",
            expected: "string",
        }),
    }
}

fn optional_bool(obj: &Map<String, Value>, key: &'static str) -> Result<bool, DslError> {
    match obj.get(key) {
        None | Some(Value::Null) => Ok(false),
        Some(Value::Bool(b)) => Ok(*b),
        Some(_) => Err(DslError::WrongType {
            key,
            expected: "boolean",
        }),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
