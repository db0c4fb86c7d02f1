//! Error types for sheet edits.
//!
//! These are the failures the sheet API raises. Runtime formula faults are
//! not here: they are values ([`crate::value::FormulaError`]) so that
//! neighboring cells stay computable and printable.

use thiserror::Error;

use crate::position::Position;

/// Errors raised by sheet operations. Every raising path leaves the sheet
/// observationally unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SheetError {
    #[error("position out of range: ({}, {})", .0.row, .0.col)]
    InvalidPosition(Position),

    #[error("setting {0} would create a circular dependency")]
    CircularDependency(Position),

    #[error("formula parse error: {0}")]
    Formula(String),
}

pub type Result<T> = std::result::Result<T, SheetError>;
