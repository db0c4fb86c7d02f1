// Expression evaluator - walks the AST against a cell lookup.
// Errors short-circuit: any faulted operand makes the whole expression fault.

use crate::position::Position;
use crate::value::FormulaError;

use super::parser::{Expr, Op, UnaryOp};

/// Source of numeric cell values for formula evaluation.
///
/// The contract for implementors:
/// - invalid position → `Err(FormulaError::Ref)`
/// - absent cell → `Ok(0.0)`
/// - present cell → its value coerced to a number (`#VALUE!` for
///   non-numeric text, an error value passed through unchanged)
pub trait CellLookup {
    fn number_at(&self, pos: Position) -> Result<f64, FormulaError>;
}

/// Evaluate an expression. The result is always finite.
pub fn evaluate<L: CellLookup>(expr: &Expr, lookup: &L) -> Result<f64, FormulaError> {
    match expr {
        Expr::Number(n) => Ok(*n),
        Expr::CellRef(pos) => lookup.number_at(*pos),
        Expr::UnaryOp { op, operand } => {
            let value = evaluate(operand, lookup)?;
            Ok(match op {
                UnaryOp::Plus => value,
                UnaryOp::Neg => -value,
            })
        }
        Expr::BinaryOp { op, left, right } => {
            let lhs = evaluate(left, lookup)?;
            let rhs = evaluate(right, lookup)?;
            let result = match op {
                Op::Add => lhs + rhs,
                Op::Sub => lhs - rhs,
                Op::Mul => lhs * rhs,
                Op::Div => {
                    if rhs == 0.0 {
                        return Err(FormulaError::Div0);
                    }
                    lhs / rhs
                }
            };
            // Overflow is reported the same way as division by zero
            if result.is_finite() {
                Ok(result)
            } else {
                Err(FormulaError::Div0)
            }
        }
    }
}
