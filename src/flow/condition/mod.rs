// SPDX-License-Identifier: MIT

//! Decision gateway conditions
//!
//! Conditions are small boolean expressions over dot-paths into the
//! instance data:
//! - `x > 5`
//! - `applicant.country == 'NZ'`
//! - `score >= 700 and not flags contains 'fraud'`
//! - `(a == 1 or b == 2) and c != null`

mod ast;
mod evaluator;
mod parser;

pub use ast::{CompareOp, Expression, Literal};
pub use evaluator::evaluate;
pub use parser::{parse, ConditionError};
