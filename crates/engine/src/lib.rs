//! Spreadsheet computation core.
//!
//! A sparse grid of cells holding text or arithmetic formulas over other
//! cells. The sheet maintains the dependency graph across edits, rejects
//! edits that would close a cycle, evaluates formulas lazily with
//! memoization, and invalidates every transitive dependent when an input
//! changes. Runtime formula faults (`#REF!`, `#VALUE!`, `#DIV/0!`) are
//! values, not errors, so the rest of the sheet stays computable.

pub mod cell;
pub mod error;
pub mod formula;
pub mod position;
pub mod sheet;
pub mod value;
