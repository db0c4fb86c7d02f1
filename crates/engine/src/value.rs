//! Cell values and in-band formula errors.
//!
//! A [`FormulaError`] is a value, not a failure: a formula that divides by
//! zero still *has* a value (`#DIV/0!`), it is cached like any number, and
//! formulas that read the faulty cell inherit the error.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Runtime formula fault, printed with its Excel-style code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FormulaError {
    /// `#REF!`: reference to a position outside the grid.
    Ref,
    /// `#VALUE!`: non-numeric text used where a number is required.
    Value,
    /// `#DIV/0!`: division by zero, or a non-finite arithmetic result.
    Div0,
}

impl FormulaError {
    pub fn as_code(&self) -> &'static str {
        match self {
            FormulaError::Ref => "#REF!",
            FormulaError::Value => "#VALUE!",
            FormulaError::Div0 => "#DIV/0!",
        }
    }
}

impl fmt::Display for FormulaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_code())
    }
}

impl std::error::Error for FormulaError {}

/// What a cell evaluates to.
///
/// Numbers are always finite: the evaluator converts non-finite results
/// into [`FormulaError::Div0`] before they can land here.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Number(f64),
    Text(String),
    Error(FormulaError),
}

impl Value {
    /// The empty cell's value.
    pub fn empty() -> Value {
        Value::Text(String::new())
    }

    /// Coerce to a number for use inside a formula.
    ///
    /// Empty text is 0. Non-empty text must parse as a number in its
    /// entirety (trailing garbage fails). An error value passes through.
    pub fn to_number(&self) -> Result<f64, FormulaError> {
        match self {
            Value::Number(n) => Ok(*n),
            Value::Text(s) if s.is_empty() => Ok(0.0),
            Value::Text(s) => s.parse::<f64>().map_err(|_| FormulaError::Value),
            Value::Error(e) => Err(*e),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
            Value::Error(e) => f.write_str(e.as_code()),
        }
    }
}
