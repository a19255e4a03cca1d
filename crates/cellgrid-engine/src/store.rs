//! Sparse cell storage keyed by stable identifiers.

use crate::anchor::Expr;
use crate::axis::{ColId, RowId};
use cellgrid_common::Scalar;
use rustc_hash::FxHashMap;
use std::sync::Arc;

/// Stable identity of a cell: the ordered pair of its axis identifiers.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellKey {
    pub row: RowId,
    pub col: ColId,
}

impl CellKey {
    pub fn new(row: RowId, col: ColId) -> Self {
        Self { row, col }
    }
}

/// A populated cell. Absence from the store denotes emptiness.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Value(Scalar),
    Formula {
        /// Anchor-form AST. Shared so splice transforms can keep untouched
        /// formulas without copying.
        ast: Arc<Expr>,
        cached: Option<Scalar>,
    },
}

impl Cell {
    pub fn is_formula(&self) -> bool {
        matches!(self, Cell::Formula { .. })
    }
}

/// Sparse mapping `(RowId, ColId) → Cell`. Iteration order is unspecified.
#[derive(Debug, Default)]
pub struct CellStore {
    cells: FxHashMap<CellKey, Cell>,
}

impl CellStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: CellKey) -> Option<&Cell> {
        self.cells.get(&key)
    }

    pub fn get_mut(&mut self, key: CellKey) -> Option<&mut Cell> {
        self.cells.get_mut(&key)
    }

    pub fn set(&mut self, key: CellKey, cell: Cell) {
        self.cells.insert(key, cell);
    }

    pub fn remove(&mut self, key: CellKey) -> Option<Cell> {
        self.cells.remove(&key)
    }

    pub fn contains(&self, key: CellKey) -> bool {
        self.cells.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (CellKey, &Cell)> {
        self.cells.iter().map(|(k, c)| (*k, c))
    }

    pub fn keys(&self) -> impl Iterator<Item = CellKey> + '_ {
        self.cells.keys().copied()
    }

    /// Drop every cell whose row identifier is being retired. Returns the
    /// removed keys so the caller can retract edges and watches.
    pub fn remove_rows(&mut self, rows: &[RowId]) -> Vec<CellKey> {
        if rows.is_empty() {
            return Vec::new();
        }
        let doomed: rustc_hash::FxHashSet<RowId> = rows.iter().copied().collect();
        let mut removed = Vec::new();
        self.cells.retain(|key, _| {
            if doomed.contains(&key.row) {
                removed.push(*key);
                false
            } else {
                true
            }
        });
        removed
    }

    /// Column analogue of [`CellStore::remove_rows`].
    pub fn remove_cols(&mut self, cols: &[ColId]) -> Vec<CellKey> {
        if cols.is_empty() {
            return Vec::new();
        }
        let doomed: rustc_hash::FxHashSet<ColId> = cols.iter().copied().collect();
        let mut removed = Vec::new();
        self.cells.retain(|key, _| {
            if doomed.contains(&key.col) {
                removed.push(*key);
                false
            } else {
                true
            }
        });
        removed
    }
}
