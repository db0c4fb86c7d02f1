//! The grid container: cell storage, dependency wiring, cycle rejection,
//! cache invalidation, occupancy accounting, and printing.
//!
//! # Edge discipline
//!
//! Dependency edges are stored on the cells themselves, keyed by
//! [`Position`]: `children` on the reading cell, `parents` on the cell
//! being read.
//!
//! # Invariants
//!
//! 1. **Bidirectional consistency:** p ∈ children(C) iff C ∈ parents(cell
//!    at p). Referenced positions always hold a cell, if only an empty
//!    placeholder.
//! 2. **Acyclicity:** `set_cell` rejects any edit that would close a cycle,
//!    before mutating anything.
//! 3. **No dead slots:** a cell is stored iff it is non-empty or some
//!    formula references it; empty unreferenced cells are removed, not kept.
//! 4. **Occupancy:** `row_cells_count[r]` / `col_cells_count[c]` count
//!    non-empty cells only; entries that reach zero are removed, not stored.
//! 5. **Cache coherence:** a populated cache always equals what
//!    re-evaluation against the current sheet would produce.

use std::collections::BTreeMap;
use std::io::{self, Write};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell::{Cell, CellContent};
use crate::error::SheetError;
use crate::formula::eval::CellLookup;
use crate::position::{Position, Size};
use crate::value::{FormulaError, Value};

/// Field separator within a printed row.
pub const COL_DELIMITER: char = '\t';
/// Row terminator; emitted after every row, including the last.
pub const ROW_DELIMITER: char = '\n';

/// A sparse spreadsheet grid.
#[derive(Debug, Default)]
pub struct Sheet {
    cells: FxHashMap<Position, Cell>,
    /// Non-empty cells per row, keyed by row index. Ordered so the largest
    /// occupied row is one lookup away.
    row_cells_count: BTreeMap<usize, usize>,
    /// Symmetric to `row_cells_count`, for columns.
    col_cells_count: BTreeMap<usize, usize>,
}

/// Read-only handle to a cell, paired with the sheet it lives in so that
/// formula evaluation can resolve references.
#[derive(Clone, Copy, Debug)]
pub struct CellHandle<'a> {
    sheet: &'a Sheet,
    cell: &'a Cell,
}

impl<'a> CellHandle<'a> {
    /// The cell's value, memoized across calls until an input changes.
    pub fn value(&self) -> Value {
        self.cell.value(self.sheet)
    }

    /// The cell's text form (canonical for formulas).
    pub fn text(&self) -> String {
        self.cell.text()
    }

    /// Positions the cell's content depends on.
    pub fn referenced_cells(&self) -> &'a [Position] {
        self.cell.referenced_cells()
    }

    /// True for empty placeholders retained only because other cells
    /// reference this position.
    pub fn is_empty(&self) -> bool {
        self.cell.is_empty()
    }
}

/// Point-in-time counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SheetStats {
    /// Stored cells, including empty placeholders kept for their parents.
    pub cells: usize,
    /// Cells whose content is a formula.
    pub formula_cells: usize,
    /// Dependency edges (formula → referenced cell).
    pub edges: usize,
}

impl Sheet {
    /// Create an empty sheet.
    pub fn new() -> Sheet {
        Sheet::default()
    }

    /// Set the cell at `pos` from user input.
    ///
    /// The input is parsed first (empty → empty, `=expr` → formula, `'`
    /// or anything else → text), then the edit is checked for cycles.
    /// Both failures leave the sheet untouched; past the cycle check the
    /// remaining steps cannot fail, so no rollback is needed.
    pub fn set_cell(&mut self, pos: Position, text: &str) -> Result<(), SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition(pos));
        }
        let mut new_cell = Cell::from_input(text)?;

        // Setting empty content is a clear: it must not occupy the slot.
        if new_cell.is_empty() {
            return self.clear_cell(pos);
        }

        if self.closes_cycle(pos, new_cell.children()) {
            return Err(SheetError::CircularDependency(pos));
        }

        let mut old_was_empty = true;
        if let Some(old) = self.cells.remove(&pos) {
            old_was_empty = old.is_empty();
            for &child in old.children() {
                self.remove_parent(child, pos);
            }
            // The new cell answers for every formula that read the old one
            new_cell.set_parents(old.into_parents());
        }

        for &child in new_cell.children() {
            self.cells
                .entry(child)
                .or_insert_with(Cell::empty)
                .add_parent(pos);
        }

        if old_was_empty {
            *self.row_cells_count.entry(pos.row).or_insert(0) += 1;
            *self.col_cells_count.entry(pos.col).or_insert(0) += 1;
        }

        self.cells.insert(pos, new_cell);
        self.invalidate_from(pos);
        Ok(())
    }

    /// Look up the cell at `pos`. `None` if the slot is unoccupied.
    pub fn get_cell(&self, pos: Position) -> Result<Option<CellHandle<'_>>, SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition(pos));
        }
        Ok(self
            .cells
            .get(&pos)
            .map(|cell| CellHandle { sheet: self, cell }))
    }

    /// Clear the cell at `pos`. No-op for unoccupied or already-empty slots.
    ///
    /// A cleared cell that other formulas still reference is replaced by an
    /// empty placeholder carrying its parents; otherwise the slot is freed.
    pub fn clear_cell(&mut self, pos: Position) -> Result<(), SheetError> {
        if !pos.is_valid() {
            return Err(SheetError::InvalidPosition(pos));
        }
        let occupied = self.cells.get(&pos).is_some_and(|cell| !cell.is_empty());
        if !occupied {
            return Ok(());
        }
        let old = match self.cells.remove(&pos) {
            Some(old) => old,
            None => return Ok(()),
        };

        for &child in old.children() {
            self.remove_parent(child, pos);
        }

        if old.has_parents() {
            let mut placeholder = Cell::empty();
            placeholder.set_parents(old.into_parents());
            self.cells.insert(pos, placeholder);
        }

        self.decrement_occupancy(pos);
        self.invalidate_from(pos);
        Ok(())
    }

    /// Bounding box from the origin containing every non-empty cell, or
    /// `(0, 0)` if there are none.
    pub fn printable_size(&self) -> Size {
        match (
            self.row_cells_count.last_key_value(),
            self.col_cells_count.last_key_value(),
        ) {
            (Some((&max_row, _)), Some((&max_col, _))) => Size::new(max_row + 1, max_col + 1),
            _ => Size::default(),
        }
    }

    /// Print cell values over the printable rectangle, tab-separated, one
    /// line per row. Errors print as their code (`#REF!`, `#VALUE!`,
    /// `#DIV/0!`); absent and empty cells print as empty fields.
    pub fn print_values<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_cells(out, |cell, sheet| cell.value(sheet).to_string())
    }

    /// Print cell texts over the printable rectangle. Formula cells print
    /// their canonical `=`-form, text cells verbatim (escape sign included).
    pub fn print_texts<W: Write>(&self, out: &mut W) -> io::Result<()> {
        self.print_cells(out, |cell, _| cell.text())
    }

    /// Cells that directly depend on `pos`, sorted. Empty for untracked
    /// positions.
    pub fn dependents(&self, pos: Position) -> Vec<Position> {
        let mut parents: Vec<Position> = self
            .cells
            .get(&pos)
            .map(|cell| cell.parents().iter().copied().collect())
            .unwrap_or_default();
        parents.sort_unstable();
        parents
    }

    /// Counters snapshot for diagnostics.
    pub fn stats(&self) -> SheetStats {
        let mut stats = SheetStats {
            cells: self.cells.len(),
            ..SheetStats::default()
        };
        for cell in self.cells.values() {
            if matches!(cell.content(), CellContent::Formula(_)) {
                stats.formula_cells += 1;
            }
            stats.edges += cell.referenced_cells().len();
        }
        stats
    }

    fn print_cells<W: Write>(
        &self,
        out: &mut W,
        render: impl Fn(&Cell, &Sheet) -> String,
    ) -> io::Result<()> {
        let size = self.printable_size();
        for row in 0..size.rows {
            for col in 0..size.cols {
                if col > 0 {
                    write!(out, "{}", COL_DELIMITER)?;
                }
                if let Some(cell) = self.cells.get(&Position::new(row, col)) {
                    write!(out, "{}", render(cell, self))?;
                }
            }
            write!(out, "{}", ROW_DELIMITER)?;
        }
        Ok(())
    }

    /// DFS over existing children edges from each prospective child of the
    /// cell being installed at `target`. Reaching `target` closes a cycle.
    /// Absent cells act as leaves; the visited set keeps shared DAG
    /// substructure from blowing up the search.
    fn closes_cycle(&self, target: Position, children: &[Position]) -> bool {
        if children.is_empty() {
            return false;
        }
        let mut visited = FxHashSet::default();
        let mut stack: Vec<Position> = children.to_vec();
        while let Some(pos) = stack.pop() {
            if pos == target {
                return true;
            }
            if !visited.insert(pos) {
                continue;
            }
            if let Some(cell) = self.cells.get(&pos) {
                stack.extend(cell.children().iter().copied());
            }
        }
        false
    }

    /// Clear the cached value at `pos` and of every transitive dependent.
    /// Idempotent: already-clean ancestors are cleared again harmlessly.
    fn invalidate_from(&self, pos: Position) {
        let mut visited = FxHashSet::default();
        let mut stack = vec![pos];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            if let Some(cell) = self.cells.get(&current) {
                cell.invalidate();
                stack.extend(cell.parents().iter().copied());
            }
        }
    }

    /// Drop `parent` from the parents of the cell at `pos`, removing the
    /// cell entirely once it is both empty and unreferenced.
    fn remove_parent(&mut self, pos: Position, parent: Position) {
        if let Some(cell) = self.cells.get_mut(&pos) {
            cell.remove_parent(parent);
            if cell.is_empty() && !cell.has_parents() {
                self.cells.remove(&pos);
            }
        }
    }

    fn decrement_occupancy(&mut self, pos: Position) {
        if let Some(count) = self.row_cells_count.get_mut(&pos.row) {
            *count -= 1;
            if *count == 0 {
                self.row_cells_count.remove(&pos.row);
            }
        }
        if let Some(count) = self.col_cells_count.get_mut(&pos.col) {
            *count -= 1;
            if *count == 0 {
                self.col_cells_count.remove(&pos.col);
            }
        }
    }
}

impl CellLookup for Sheet {
    /// The lookup formulas evaluate through: invalid position → `#REF!`,
    /// absent cell → 0, present cell → its value coerced to a number.
    fn number_at(&self, pos: Position) -> Result<f64, FormulaError> {
        if !pos.is_valid() {
            return Err(FormulaError::Ref);
        }
        match self.cells.get(&pos) {
            None => Ok(0.0),
            Some(cell) => cell.value(self).to_number(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos(a1: &str) -> Position {
        Position::from_a1(a1).unwrap()
    }

    fn cell_value(sheet: &Sheet, a1: &str) -> Value {
        sheet.get_cell(pos(a1)).unwrap().unwrap().value()
    }

    #[test]
    fn test_get_cell_unoccupied() {
        let sheet = Sheet::new();
        assert!(sheet.get_cell(pos("A1")).unwrap().is_none());
    }

    #[test]
    fn test_get_cell_invalid_position() {
        let sheet = Sheet::new();
        let bad = Position::new(0, crate::position::MAX_COLS);
        assert_eq!(
            sheet.get_cell(bad).unwrap_err(),
            SheetError::InvalidPosition(bad)
        );
    }

    #[test]
    fn test_set_cell_empty_text_does_not_occupy() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("B2"), "").unwrap();
        assert!(sheet.get_cell(pos("B2")).unwrap().is_none());
        assert_eq!(sheet.printable_size(), Size::default());
    }

    #[test]
    fn test_set_cell_empty_text_clears() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("B2"), "x").unwrap();
        sheet.set_cell(pos("B2"), "").unwrap();
        assert!(sheet.get_cell(pos("B2")).unwrap().is_none());
        assert_eq!(sheet.printable_size(), Size::default());
    }

    #[test]
    fn test_referenced_position_gets_placeholder() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "=B1").unwrap();
        let b1 = sheet.get_cell(pos("B1")).unwrap().expect("placeholder exists");
        assert!(b1.is_empty());
        assert_eq!(sheet.dependents(pos("B1")), vec![pos("A1")]);
    }

    #[test]
    fn test_placeholder_does_not_count_in_printable_size() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "=C3").unwrap();
        assert_eq!(sheet.printable_size(), Size::new(1, 1));
    }

    #[test]
    fn test_replacing_formula_rewires_edges() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "=B1").unwrap();
        sheet.set_cell(pos("A1"), "=C1").unwrap();
        // B1's placeholder lost its last parent and was removed
        assert!(sheet.get_cell(pos("B1")).unwrap().is_none());
        assert_eq!(sheet.dependents(pos("C1")), vec![pos("A1")]);
    }

    #[test]
    fn test_parents_survive_content_replacement() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "=B1+1").unwrap();
        sheet.set_cell(pos("B1"), "5").unwrap();
        assert_eq!(cell_value(&sheet, "A1"), Value::Number(6.0));
        // Replacing B1's content keeps A1 in its parents and invalidates A1
        sheet.set_cell(pos("B1"), "7").unwrap();
        assert_eq!(sheet.dependents(pos("B1")), vec![pos("A1")]);
        assert_eq!(cell_value(&sheet, "A1"), Value::Number(8.0));
    }

    #[test]
    fn test_self_reference_rejected() {
        let mut sheet = Sheet::new();
        assert_eq!(
            sheet.set_cell(pos("A1"), "=A1"),
            Err(SheetError::CircularDependency(pos("A1")))
        );
        assert!(sheet.get_cell(pos("A1")).unwrap().is_none());
    }

    #[test]
    fn test_diamond_dependencies_are_not_cycles() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "1").unwrap();
        sheet.set_cell(pos("B1"), "=A1").unwrap();
        sheet.set_cell(pos("B2"), "=A1").unwrap();
        sheet.set_cell(pos("C1"), "=B1+B2").unwrap();
        assert_eq!(cell_value(&sheet, "C1"), Value::Number(2.0));
    }

    #[test]
    fn test_formula_reading_error_cell_inherits_error() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "=1/0").unwrap();
        sheet.set_cell(pos("B1"), "=A1+1").unwrap();
        assert_eq!(cell_value(&sheet, "A1"), Value::Error(FormulaError::Div0));
        assert_eq!(cell_value(&sheet, "B1"), Value::Error(FormulaError::Div0));
    }

    #[test]
    fn test_stats() {
        let mut sheet = Sheet::new();
        sheet.set_cell(pos("A1"), "1").unwrap();
        sheet.set_cell(pos("B1"), "=A1+C1").unwrap();
        let stats = sheet.stats();
        // A1, B1, and the C1 placeholder
        assert_eq!(stats.cells, 3);
        assert_eq!(stats.formula_cells, 1);
        assert_eq!(stats.edges, 2);
    }
}
