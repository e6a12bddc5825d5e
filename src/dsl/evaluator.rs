//! Condition tree evaluation
//!
//! Evaluation never fails: missing features and non-numeric operands make the
//! affected leaf false. The trace is returned alongside the result.

use serde_json::Value;

use super::node::{ConditionNode, NumericLeaf, Operator, RelativeLeaf, VarRef};
use super::trace::{OperandTrace, TraceRecord};
use crate::features::FeatureSnapshot;
use crate::normalizer::Normalizer;

impl ConditionNode {
    /// Evaluate the tree against a feature snapshot
    pub fn eval(&self, features: &FeatureSnapshot) -> (bool, TraceRecord) {
        match self {
            ConditionNode::All(children) => {
                let mut traces = Vec::with_capacity(children.len());
                let mut result = true;
                for child in children {
                    let (child_result, trace) = child.eval(features);
                    traces.push(trace);
                    if !child_result {
                        result = false;
                        break;
                    }
                }
                (
                    result,
                    TraceRecord::All {
                        result,
                        children_count: children.len(),
                        children: traces,
                    },
                )
            }
            ConditionNode::Any(children) => {
                // No short-circuit: every child is traced
                let (results, traces) = eval_all(children, features);
                let result = results.iter().any(|r| *r);
                (
                    result,
                    TraceRecord::Any {
                        result,
                        children_count: children.len(),
                        children: traces,
                    },
                )
            }
            ConditionNode::NoneOf(children) => {
                let (results, traces) = eval_all(children, features);
                let result = !results.iter().any(|r| *r);
                (
                    result,
                    TraceRecord::NoneOf {
                        result,
                        children_count: children.len(),
                        children: traces,
                    },
                )
            }
            ConditionNode::Numeric(leaf) => eval_numeric(leaf, features),
            ConditionNode::Relative(leaf) => eval_relative(leaf, features),
        }
    }
}

fn eval_all(children: &[ConditionNode], features: &FeatureSnapshot) -> (Vec<bool>, Vec<TraceRecord>) {
    children.iter().map(|child| child.eval(features)).unzip()
}

fn eval_numeric(leaf: &NumericLeaf, features: &FeatureSnapshot) -> (bool, TraceRecord) {
    let observed = features.get(&leaf.var, &leaf.agg);

    // A missing feature is false whether or not the leaf is marked required
    let result = observed
        .map(|value| compare_threshold(leaf.op, value, &leaf.threshold))
        .unwrap_or(false);

    (
        result,
        TraceRecord::Numeric {
            var: leaf.var.clone(),
            agg: leaf.agg.clone(),
            op: leaf.op.to_string(),
            threshold: leaf.threshold.clone(),
            observed,
            required: leaf.required,
            result,
        },
    )
}

fn eval_relative(leaf: &RelativeLeaf, features: &FeatureSnapshot) -> (bool, TraceRecord) {
    let left = resolve(&leaf.left, features);
    let right = resolve(&leaf.right, features);

    let result = match (left.value, right.value) {
        (Some(l), Some(r)) => leaf.op.compare(l, r),
        _ => false,
    };

    (
        result,
        TraceRecord::Relative {
            left,
            op: leaf.op.to_string(),
            right,
            required: leaf.required,
            result,
        },
    )
}

fn resolve(var_ref: &VarRef, features: &FeatureSnapshot) -> OperandTrace {
    let value = features
        .get(&var_ref.var, &var_ref.agg)
        .map(|v| v * var_ref.scale.unwrap_or(1.0))
        .filter(|v| v.is_finite());

    OperandTrace {
        var: var_ref.var.clone(),
        agg: var_ref.agg.clone(),
        scale: var_ref.scale,
        value,
    }
}

/// Compare an observed feature value against a leaf threshold.
///
/// Scalar operators coerce the threshold to a number (numeric strings count).
/// `between` needs a two-element `[min, max]` list and is inclusive. `in`
/// matches list items by raw or numeric equality.
fn compare_threshold(op: Operator, observed: f64, threshold: &Value) -> bool {
    match op {
        Operator::Between => match threshold.as_array().map(Vec::as_slice) {
            Some([min, max]) => match (Normalizer::to_number(min), Normalizer::to_number(max)) {
                (Some(min), Some(max)) => observed >= min && observed <= max,
                _ => false,
            },
            _ => false,
        },
        Operator::In => match threshold.as_array() {
            Some(items) => {
                let raw = Value::from(observed);
                items
                    .iter()
                    .any(|item| *item == raw || item.as_f64() == Some(observed))
            }
            None => false,
        },
        scalar => Normalizer::to_number(threshold)
            .map(|t| scalar.compare(observed, t))
            .unwrap_or(false),
    }
}
