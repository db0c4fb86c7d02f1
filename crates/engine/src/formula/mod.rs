//! Formula AST facade: parse once, then execute, inspect references, or
//! re-print in canonical form.
//!
//! The canonical form is what [`Formula::expression`] returns: operator
//! precedence is made explicit by the tree, so printing inserts only the
//! parentheses needed to reparse to an equivalent expression. `GetText` of a
//! formula cell is `"=" + expression()`, and feeding that text back into the
//! sheet is a no-op.

pub mod eval;
pub mod parser;

use crate::position::Position;
use crate::value::FormulaError;

use eval::CellLookup;
use parser::{Expr, Op, UnaryOp};

/// A parsed formula expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    expr: Expr,
}

impl Formula {
    /// Parse an expression string (without the leading `=`).
    pub fn parse(expression: &str) -> Result<Formula, String> {
        parser::parse(expression).map(|expr| Formula { expr })
    }

    /// Evaluate against a cell lookup.
    pub fn execute<L: CellLookup>(&self, lookup: &L) -> Result<f64, FormulaError> {
        eval::evaluate(&self.expr, lookup)
    }

    /// Cells the expression references, sorted and deduplicated.
    ///
    /// Syntactically well-formed but out-of-range references are not
    /// included: the sheet cannot store a cell there, and evaluation
    /// reports them as `#REF!` on its own.
    pub fn referenced_cells(&self) -> Vec<Position> {
        let mut refs = Vec::new();
        collect_refs(&self.expr, &mut refs);
        refs.sort_unstable();
        refs.dedup();
        refs
    }

    /// Canonical re-print with minimal parentheses.
    pub fn expression(&self) -> String {
        let mut out = String::new();
        write_expr(&mut out, &self.expr);
        out
    }
}

fn collect_refs(expr: &Expr, refs: &mut Vec<Position>) {
    match expr {
        Expr::Number(_) => {}
        Expr::CellRef(pos) => {
            if pos.is_valid() {
                refs.push(*pos);
            }
        }
        Expr::UnaryOp { operand, .. } => collect_refs(operand, refs),
        Expr::BinaryOp { left, right, .. } => {
            collect_refs(left, refs);
            collect_refs(right, refs);
        }
    }
}

// Printing precedence: atoms bind tightest, +/- loosest.
fn precedence(expr: &Expr) -> u8 {
    match expr {
        Expr::Number(_) | Expr::CellRef(_) => 3,
        Expr::UnaryOp { .. } => 2,
        Expr::BinaryOp { op: Op::Mul | Op::Div, .. } => 1,
        Expr::BinaryOp { op: Op::Add | Op::Sub, .. } => 0,
    }
}

fn write_expr(out: &mut String, expr: &Expr) {
    match expr {
        Expr::Number(n) => out.push_str(&n.to_string()),
        Expr::CellRef(pos) => out.push_str(&pos.to_a1()),
        Expr::UnaryOp { op, operand } => {
            out.push(match op {
                UnaryOp::Plus => '+',
                UnaryOp::Neg => '-',
            });
            write_child(out, operand, precedence(operand) < precedence(expr));
        }
        Expr::BinaryOp { op, left, right } => {
            let prec = precedence(expr);
            write_child(out, left, precedence(left) < prec);
            out.push(match op {
                Op::Add => '+',
                Op::Sub => '-',
                Op::Mul => '*',
                Op::Div => '/',
            });
            // Subtraction and division do not associate to the right
            let right_parens = precedence(right) < prec
                || (precedence(right) == prec && matches!(op, Op::Sub | Op::Div));
            write_child(out, right, right_parens);
        }
    }
}

fn write_child(out: &mut String, child: &Expr, parens: bool) {
    if parens {
        out.push('(');
        write_expr(out, child);
        out.push(')');
    } else {
        write_expr(out, child);
    }
}
