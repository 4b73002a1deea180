// SPDX-License-Identifier: MIT

//! Condition parser
//!
//! Precedence from loosest to tightest: `or`, `and`, `not`, parentheses,
//! comparison. Operators inside quoted strings are ignored.

use super::ast::{CompareOp, Expression, Literal};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ConditionError {
    #[error("empty condition")]
    Empty,

    #[error("unbalanced parentheses in '{0}'")]
    UnbalancedParentheses(String),

    #[error("unterminated string in '{0}'")]
    UnterminatedString(String),

    #[error("no comparison operator in '{0}'")]
    MissingOperator(String),

    #[error("invalid path '{0}'")]
    InvalidPath(String),

    #[error("invalid literal '{0}'")]
    InvalidLiteral(String),
}

/// Operators tried longest first so `>=` is not read as `>`
const OPERATORS: [(&str, CompareOp); 7] = [
    ("!=", CompareOp::NotEq),
    (">=", CompareOp::Gte),
    ("<=", CompareOp::Lte),
    ("==", CompareOp::Eq),
    (">", CompareOp::Gt),
    ("<", CompareOp::Lt),
    (" contains ", CompareOp::Contains),
];

pub fn parse(input: &str) -> Result<Expression, ConditionError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ConditionError::Empty);
    }

    if let Some((left, right)) = split_top_level(input, " or ")? {
        return Ok(Expression::Or(Box::new(parse(left)?), Box::new(parse(right)?)));
    }
    if let Some((left, right)) = split_top_level(input, " and ")? {
        return Ok(Expression::And(
            Box::new(parse(left)?),
            Box::new(parse(right)?),
        ));
    }
    if let Some(rest) = input.strip_prefix("not ") {
        return Ok(Expression::Not(Box::new(parse(rest)?)));
    }
    if is_wrapped(input) {
        return parse(&input[1..input.len() - 1]);
    }

    match input {
        "true" => Ok(Expression::True),
        "false" => Ok(Expression::False),
        _ => parse_comparison(input),
    }
}

/// Split at the first occurrence of `word` outside quotes and parentheses.
fn split_top_level<'a>(
    input: &'a str,
    word: &str,
) -> Result<Option<(&'a str, &'a str)>, ConditionError> {
    let mut depth: i32 = 0;
    let mut quote: Option<char> = None;
    let mut found = None;

    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth < 0 {
                    return Err(ConditionError::UnbalancedParentheses(input.to_string()));
                }
            }
            (None, _) => {
                if depth == 0 && found.is_none() && input[i..].starts_with(word) {
                    found = Some(i);
                }
            }
        }
    }

    if quote.is_some() {
        return Err(ConditionError::UnterminatedString(input.to_string()));
    }
    if depth != 0 {
        return Err(ConditionError::UnbalancedParentheses(input.to_string()));
    }
    Ok(found.map(|i| (&input[..i], &input[i + word.len()..])))
}

/// True when the first `(` closes at the very last character.
fn is_wrapped(input: &str) -> bool {
    if !input.starts_with('(') || !input.ends_with(')') {
        return false;
    }
    let mut depth = 0;
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') => quote = Some(c),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return i == input.len() - 1;
                }
            }
            _ => {}
        }
    }
    false
}

fn parse_comparison(input: &str) -> Result<Expression, ConditionError> {
    for (symbol, op) in OPERATORS {
        if let Some(pos) = find_operator(input, symbol) {
            let path = input[..pos].trim();
            if path.is_empty() || path.contains(char::is_whitespace) {
                return Err(ConditionError::InvalidPath(path.to_string()));
            }
            let value = parse_literal(&input[pos + symbol.len()..])?;
            return Ok(Expression::Compare {
                path: path.to_string(),
                op,
                value,
            });
        }
    }
    Err(ConditionError::MissingOperator(input.to_string()))
}

fn find_operator(input: &str, symbol: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'') | (None, '"') => quote = Some(c),
            (None, _) if input[i..].starts_with(symbol) => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_literal(input: &str) -> Result<Literal, ConditionError> {
    let input = input.trim();
    match input {
        "null" => return Ok(Literal::Null),
        "true" => return Ok(Literal::Boolean(true)),
        "false" => return Ok(Literal::Boolean(false)),
        _ => {}
    }

    let quoted = input.len() >= 2
        && ((input.starts_with('\'') && input.ends_with('\''))
            || (input.starts_with('"') && input.ends_with('"')));
    if quoted {
        return Ok(Literal::String(input[1..input.len() - 1].to_string()));
    }

    input
        .parse::<f64>()
        .map(Literal::Number)
        .map_err(|_| ConditionError::InvalidLiteral(input.to_string()))
}
