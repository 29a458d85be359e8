//! Filter expression evaluation.
//!
//! Evaluation is total: missing fields, mismatched types and malformed
//! operands make a condition false (or true for the negative operators) and
//! are logged at debug level, never raised.
use tracing::debug;

use crate::model::path::{FieldPath, Namespace};
use crate::model::{Traveler, Value};
use crate::query::{Condition, HasExpression, Operator};

/// Evaluates an expression tree against a traveler.
pub fn matches(traveler: &Traveler, expr: &HasExpression) -> bool {
    match expr {
        HasExpression::And(items) => items.iter().all(|e| matches(traveler, e)),
        HasExpression::Or(items) => items.iter().any(|e| matches(traveler, e)),
        HasExpression::Not(inner) => !matches(traveler, inner),
        HasExpression::Condition(cond) => matches_condition(traveler, cond),
    }
}

/// Resolves a condition operand. Strings addressing the current element or a
/// mark the traveler carries are read from the traveler; anything else is
/// used literally.
fn operand(traveler: &Traveler, value: &Value) -> Option<Value> {
    if let Value::String(s) = value {
        if s.starts_with("$.") || s == "$" {
            return traveler.resolve(&FieldPath::parse(s));
        }
        if s.starts_with('$') {
            let path = FieldPath::parse(s);
            if let Namespace::Mark(name) = &path.namespace {
                if traveler.has_mark(name) {
                    return traveler.resolve(&path);
                }
            }
        }
    }
    Some(value.clone())
}

fn bounds(cond: &Condition, value: Option<&Value>) -> Option<(f64, f64)> {
    let parsed = match value.and_then(Value::as_list) {
        Some([low, high]) => low.as_f64().zip(high.as_f64()),
        _ => None,
    };
    if parsed.is_none() {
        debug!(key = %cond.key, op = ?cond.condition, "engine.eval.bad_bounds");
    }
    parsed
}

fn numeric(cond: &Condition, left: &Option<Value>, right: &Option<Value>) -> Option<(f64, f64)> {
    let pair = left
        .as_ref()
        .and_then(Value::as_f64)
        .zip(right.as_ref().and_then(Value::as_f64));
    if pair.is_none() {
        let left_type = left.as_ref().map_or("absent", |v| v.type_name());
        let right_type = right.as_ref().map_or("absent", |v| v.type_name());
        debug!(
            key = %cond.key,
            op = ?cond.condition,
            left = left_type,
            right = right_type,
            "engine.eval.non_numeric"
        );
    }
    pair
}

/// Evaluates one leaf condition.
pub fn matches_condition(traveler: &Traveler, cond: &Condition) -> bool {
    let left = traveler.resolve(&FieldPath::parse(&cond.key));
    let right = operand(traveler, &cond.value);
    match cond.condition {
        Operator::Eq => left.is_some() && left == right,
        Operator::Neq => !(left.is_some() && left == right),
        Operator::Gt => numeric(cond, &left, &right).is_some_and(|(l, r)| l > r),
        Operator::Gte => numeric(cond, &left, &right).is_some_and(|(l, r)| l >= r),
        Operator::Lt => numeric(cond, &left, &right).is_some_and(|(l, r)| l < r),
        Operator::Lte => numeric(cond, &left, &right).is_some_and(|(l, r)| l <= r),
        Operator::Inside | Operator::Outside | Operator::Between => {
            let Some(v) = left.as_ref().and_then(Value::as_f64) else {
                return false;
            };
            let Some((low, high)) = bounds(cond, right.as_ref()) else {
                return false;
            };
            match cond.condition {
                Operator::Inside => low < v && v < high,
                Operator::Outside => !(low < v && v < high),
                _ => low <= v && v < high,
            }
        }
        Operator::Within | Operator::Without => {
            let found = match right.as_ref() {
                None | Some(Value::Null) => Some(false),
                Some(Value::List(items)) => Some(left.as_ref().is_some_and(|l| items.contains(l))),
                Some(other) => {
                    debug!(key = %cond.key, right = other.type_name(), "engine.eval.expected_list");
                    None
                }
            };
            match (cond.condition, found) {
                (Operator::Within, Some(found)) => found,
                (Operator::Without, Some(found)) => !found,
                _ => false,
            }
        }
        Operator::Contains => match (left.as_ref(), right.as_ref()) {
            (Some(Value::List(items)), Some(needle)) => items.contains(needle),
            (Some(other), _) => {
                debug!(key = %cond.key, left = other.type_name(), "engine.eval.expected_list");
                false
            }
            _ => false,
        },
    }
}
