//! Condition evaluation against instance data

use super::ast::{CompareOp, Expression, Literal};
use crate::base::instance::Payload;
use crate::base::payload::get_path;
use serde_json::Value;

/// Evaluate a condition against an instance's `data`. Missing paths compare
/// equal to `null` and fail every other comparison.
pub fn evaluate(expr: &Expression, data: &Payload) -> bool {
    match expr {
        Expression::True => true,
        Expression::False => false,
        Expression::Compare { path, op, value } => compare(get_path(data, path), *op, value),
        Expression::And(left, right) => evaluate(left, data) && evaluate(right, data),
        Expression::Or(left, right) => evaluate(left, data) || evaluate(right, data),
        Expression::Not(inner) => !evaluate(inner, data),
    }
}

fn compare(actual: Option<&Value>, op: CompareOp, expected: &Literal) -> bool {
    match op {
        CompareOp::Eq => equals(actual, expected),
        CompareOp::NotEq => !equals(actual, expected),
        CompareOp::Gt => numeric(actual, expected, |a, b| a > b),
        CompareOp::Gte => numeric(actual, expected, |a, b| a >= b),
        CompareOp::Lt => numeric(actual, expected, |a, b| a < b),
        CompareOp::Lte => numeric(actual, expected, |a, b| a <= b),
        CompareOp::Contains => contains(actual, expected),
    }
}

fn equals(actual: Option<&Value>, expected: &Literal) -> bool {
    match (actual, expected) {
        (None, Literal::Null) | (Some(Value::Null), Literal::Null) => true,
        (Some(value), literal) => matches_literal(value, literal),
        (None, _) => false,
    }
}

fn matches_literal(value: &Value, literal: &Literal) -> bool {
    match (value, literal) {
        (Value::String(s), Literal::String(expected)) => s == expected,
        (Value::Bool(b), Literal::Boolean(expected)) => b == expected,
        (Value::Number(n), Literal::Number(expected)) => n
            .as_f64()
            .is_some_and(|f| (f - expected).abs() < f64::EPSILON),
        _ => false,
    }
}

fn numeric<F>(actual: Option<&Value>, expected: &Literal, cmp: F) -> bool
where
    F: Fn(f64, f64) -> bool,
{
    match (actual.and_then(Value::as_f64), expected) {
        (Some(a), Literal::Number(b)) => cmp(a, *b),
        _ => false,
    }
}

fn contains(actual: Option<&Value>, expected: &Literal) -> bool {
    match (actual, expected) {
        (Some(Value::String(s)), Literal::String(needle)) => s.contains(needle.as_str()),
        (Some(Value::Array(items)), literal) => {
            items.iter().any(|item| matches_literal(item, literal))
        }
        _ => false,
    }
}
