//! One grid slot: a content variant, its dependency edges, and a cached value.
//!
//! Content is fixed for the cell's lifetime: editing a position installs a
//! *new* cell that inherits the old one's parents. The `children` list is
//! derived from the content once, at construction; the `parents` set is
//! owned by the sheet's wiring and mutated as other cells are edited.

use std::cell::RefCell;

use rustc_hash::FxHashSet;

use crate::error::SheetError;
use crate::formula::Formula;
use crate::position::Position;
use crate::sheet::Sheet;
use crate::value::Value;

/// Prefix marking a formula cell.
pub const FORMULA_SIGN: char = '=';
/// Prefix marking literal text; stripped when the value is rendered.
pub const ESCAPE_SIGN: char = '\'';

#[derive(Debug, Clone, PartialEq)]
pub enum CellContent {
    Empty,
    Text(String),
    Formula(Formula),
}

/// A cell in the grid.
///
/// `value()` is logically const but memoizes through a `RefCell`; the sheet
/// clears the cache when any transitive input changes.
#[derive(Debug)]
pub struct Cell {
    content: CellContent,
    /// Positions this cell's formula reads. Sorted, deduplicated, fixed.
    children: Vec<Position>,
    /// Cells whose formulas read this one. Maintained by the sheet.
    parents: FxHashSet<Position>,
    cache: RefCell<Option<Value>>,
}

impl Cell {
    /// An empty placeholder, as created implicitly for referenced positions.
    pub(crate) fn empty() -> Cell {
        Cell {
            content: CellContent::Empty,
            children: Vec::new(),
            parents: FxHashSet::default(),
            cache: RefCell::new(None),
        }
    }

    /// Parse user input into a fresh cell.
    ///
    /// `=`-prefixed input longer than the sign alone is a formula; a parse
    /// failure surfaces as [`SheetError::Formula`] and no cell is produced.
    /// `=` by itself, like any other non-empty non-formula input, is text.
    pub(crate) fn from_input(text: &str) -> Result<Cell, SheetError> {
        if text.is_empty() {
            return Ok(Cell::empty());
        }
        if let Some(expr) = text.strip_prefix(FORMULA_SIGN) {
            if !expr.is_empty() {
                let formula = Formula::parse(expr).map_err(SheetError::Formula)?;
                let children = formula.referenced_cells();
                return Ok(Cell {
                    content: CellContent::Formula(formula),
                    children,
                    parents: FxHashSet::default(),
                    cache: RefCell::new(None),
                });
            }
        }
        Ok(Cell {
            content: CellContent::Text(text.to_string()),
            children: Vec::new(),
            parents: FxHashSet::default(),
            cache: RefCell::new(None),
        })
    }

    /// The cell's value, memoized. For formulas this may read other cells
    /// through the sheet; a runtime fault becomes an error *value*.
    pub fn value(&self, sheet: &Sheet) -> Value {
        if let Some(cached) = self.cache.borrow().clone() {
            return cached;
        }
        let value = self.compute(sheet);
        *self.cache.borrow_mut() = Some(value.clone());
        value
    }

    fn compute(&self, sheet: &Sheet) -> Value {
        match &self.content {
            CellContent::Empty => Value::empty(),
            CellContent::Text(text) => match text.strip_prefix(ESCAPE_SIGN) {
                Some(rest) => Value::Text(rest.to_string()),
                None => Value::Text(text.clone()),
            },
            CellContent::Formula(formula) => match formula.execute(sheet) {
                Ok(number) => Value::Number(number),
                Err(error) => Value::Error(error),
            },
        }
    }

    /// The text form: empty string, the stored text verbatim (escape sign
    /// included), or `=` plus the canonical expression.
    pub fn text(&self) -> String {
        match &self.content {
            CellContent::Empty => String::new(),
            CellContent::Text(text) => text.clone(),
            CellContent::Formula(formula) => format!("{}{}", FORMULA_SIGN, formula.expression()),
        }
    }

    /// Positions this cell's content depends on.
    pub fn referenced_cells(&self) -> &[Position] {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        matches!(self.content, CellContent::Empty)
    }

    pub fn content(&self) -> &CellContent {
        &self.content
    }

    pub(crate) fn children(&self) -> &[Position] {
        &self.children
    }

    pub(crate) fn parents(&self) -> &FxHashSet<Position> {
        &self.parents
    }

    pub(crate) fn has_parents(&self) -> bool {
        !self.parents.is_empty()
    }

    pub(crate) fn add_parent(&mut self, parent: Position) {
        self.parents.insert(parent);
    }

    pub(crate) fn remove_parent(&mut self, parent: Position) {
        self.parents.remove(&parent);
    }

    pub(crate) fn set_parents(&mut self, parents: FxHashSet<Position>) {
        self.parents = parents;
    }

    pub(crate) fn into_parents(self) -> FxHashSet<Position> {
        self.parents
    }

    pub(crate) fn invalidate(&self) {
        self.cache.borrow_mut().take();
    }

    #[cfg(test)]
    pub(crate) fn is_cached(&self) -> bool {
        self.cache.borrow().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_input_is_empty_cell() {
        let cell = Cell::from_input("").unwrap();
        assert!(cell.is_empty());
        assert_eq!(cell.text(), "");
    }

    #[test]
    fn test_plain_text() {
        let cell = Cell::from_input("hello").unwrap();
        assert!(!cell.is_empty());
        assert_eq!(cell.text(), "hello");
        assert!(cell.referenced_cells().is_empty());
    }

    #[test]
    fn test_escape_stripped_in_value_only() {
        let sheet = Sheet::new();
        let cell = Cell::from_input("'=notformula").unwrap();
        assert_eq!(cell.text(), "'=notformula");
        assert_eq!(cell.value(&sheet), Value::Text("=notformula".to_string()));
    }

    #[test]
    fn test_lone_formula_sign_is_text() {
        let sheet = Sheet::new();
        let cell = Cell::from_input("=").unwrap();
        assert_eq!(cell.text(), "=");
        assert_eq!(cell.value(&sheet), Value::Text("=".to_string()));
    }

    #[test]
    fn test_formula_children_sorted_dedup() {
        let cell = Cell::from_input("=B2+A1+B2").unwrap();
        assert_eq!(
            cell.referenced_cells(),
            &[
                Position::from_a1("A1").unwrap(),
                Position::from_a1("B2").unwrap(),
            ]
        );
    }

    #[test]
    fn test_formula_parse_failure() {
        assert!(matches!(
            Cell::from_input("=1+"),
            Err(SheetError::Formula(_))
        ));
    }

    #[test]
    fn test_formula_text_is_canonical() {
        let cell = Cell::from_input("= 1 + (2*3) ").unwrap();
        assert_eq!(cell.text(), "=1+2*3");
    }

    #[test]
    fn test_value_is_memoized() {
        let sheet = Sheet::new();
        let cell = Cell::from_input("=1+2").unwrap();
        assert!(!cell.is_cached());
        assert_eq!(cell.value(&sheet), Value::Number(3.0));
        assert!(cell.is_cached());
        cell.invalidate();
        assert!(!cell.is_cached());
    }
}
