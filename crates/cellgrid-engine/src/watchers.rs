//! Range observation tables.
//!
//! The dependency graph carries per-cell edges as the primary invalidation
//! channel. Watchers supplement it: a formula observing a rectangle must be
//! invalidated when a *previously empty* address inside it is populated,
//! even though no edge existed before the write.
//!
//! Small rectangles register per-cell entries; rectangles past the engine's
//! expansion limit are kept as coarse ranges probed at write time, so memory
//! stays proportional to populated cells rather than observed area.

use crate::anchor::RangeRef;
use crate::store::CellKey;
use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

#[derive(Debug, Default)]
pub struct RangeWatchers {
    /// Per-cell channel: address → observing formulas.
    watchers: FxHashMap<CellKey, FxHashSet<CellKey>>,
    /// Per-formula bookkeeping, consulted when a formula is retired.
    formula_cells: FxHashMap<CellKey, FxHashSet<CellKey>>,
    formula_ranges: FxHashMap<CellKey, SmallVec<[RangeRef; 2]>>,
    /// Coarse channel for rectangles too large to enumerate.
    coarse: FxHashMap<CellKey, SmallVec<[RangeRef; 2]>>,
}

impl RangeWatchers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `formula` observes `range`. Idempotent.
    pub fn add_watch(&mut self, range: RangeRef, formula: CellKey) {
        let ranges = self.formula_ranges.entry(formula).or_default();
        if !ranges.contains(&range) {
            ranges.push(range);
        }
    }

    /// Record `formula` as coarse observer of `range` (no per-cell entries).
    pub fn add_coarse_watch(&mut self, range: RangeRef, formula: CellKey) {
        self.add_watch(range, formula);
        let ranges = self.coarse.entry(formula).or_default();
        if !ranges.contains(&range) {
            ranges.push(range);
        }
    }

    /// Register one in-range address for `formula`. Idempotent.
    pub fn register_cell(&mut self, cell: CellKey, formula: CellKey) {
        self.watchers.entry(cell).or_default().insert(formula);
        self.formula_cells.entry(formula).or_default().insert(cell);
    }

    /// Formulas observing `cell` through the per-cell channel.
    pub fn watchers_of(&self, cell: CellKey) -> impl Iterator<Item = CellKey> + '_ {
        self.watchers
            .get(&cell)
            .into_iter()
            .flat_map(|set| set.iter().copied())
    }

    /// Coarse observers and their rectangles; the caller resolves the
    /// rectangles against the current axes to test membership.
    pub fn coarse_watchers(&self) -> impl Iterator<Item = (CellKey, &RangeRef)> + '_ {
        self.coarse
            .iter()
            .flat_map(|(&formula, ranges)| ranges.iter().map(move |r| (formula, r)))
    }

    pub fn ranges_of(&self, formula: CellKey) -> &[RangeRef] {
        self.formula_ranges
            .get(&formula)
            .map(|r| r.as_slice())
            .unwrap_or(&[])
    }

    /// Retire every watch a formula declared.
    pub fn remove_watches(&mut self, formula: CellKey) {
        if let Some(cells) = self.formula_cells.remove(&formula) {
            for cell in cells {
                if let Some(set) = self.watchers.get_mut(&cell) {
                    set.remove(&formula);
                    if set.is_empty() {
                        self.watchers.remove(&cell);
                    }
                }
            }
        }
        self.formula_ranges.remove(&formula);
        self.coarse.remove(&formula);
    }

    /// Drop every table entry mentioning a cell key the predicate marks as
    /// retired, observer and observed alike. Retired identifiers can never
    /// be written again, so only memory is at stake, not correctness.
    pub fn purge_retired(&mut self, doomed: impl Fn(CellKey) -> bool) {
        let dead_cells: Vec<CellKey> = self.watchers.keys().copied().filter(|&k| doomed(k)).collect();
        for cell in dead_cells {
            if let Some(observers) = self.watchers.remove(&cell) {
                for formula in observers {
                    if let Some(cells) = self.formula_cells.get_mut(&formula) {
                        cells.remove(&cell);
                    }
                }
            }
        }
        let dead_formulas: Vec<CellKey> = self
            .formula_ranges
            .keys()
            .chain(self.formula_cells.keys())
            .copied()
            .filter(|&k| doomed(k))
            .collect();
        for formula in dead_formulas {
            self.remove_watches(formula);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.watchers.is_empty() && self.formula_ranges.is_empty() && self.coarse.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::{Anchor, AxisMode};
    use crate::axis::{AxisId, ColId, RowId};

    fn key(r: u32, c: u32) -> CellKey {
        CellKey::new(RowId::from_raw(r), ColId::from_raw(c))
    }

    fn range(base: CellKey) -> RangeRef {
        let anchor = |d_row| Anchor {
            base,
            row_mode: AxisMode::Rel,
            col_mode: AxisMode::Rel,
            d_row,
            d_col: 0,
        };
        RangeRef {
            start: anchor(-4),
            end: anchor(-1),
        }
    }

    #[test]
    fn registration_is_idempotent() {
        let mut w = RangeWatchers::new();
        let formula = key(5, 1);
        w.add_watch(range(formula), formula);
        w.add_watch(range(formula), formula);
        assert_eq!(w.ranges_of(formula).len(), 1);
        w.register_cell(key(1, 1), formula);
        w.register_cell(key(1, 1), formula);
        assert_eq!(w.watchers_of(key(1, 1)).count(), 1);
    }

    #[test]
    fn remove_watches_clears_all_channels() {
        let mut w = RangeWatchers::new();
        let formula = key(5, 1);
        w.add_coarse_watch(range(formula), formula);
        w.register_cell(key(1, 1), formula);
        w.register_cell(key(2, 1), formula);
        w.remove_watches(formula);
        assert_eq!(w.watchers_of(key(1, 1)).count(), 0);
        assert_eq!(w.coarse_watchers().count(), 0);
        assert!(w.ranges_of(formula).is_empty());
        assert!(w.is_empty());
    }

    #[test]
    fn two_observers_of_one_cell() {
        let mut w = RangeWatchers::new();
        let (f1, f2) = (key(5, 1), key(6, 1));
        w.register_cell(key(1, 1), f1);
        w.register_cell(key(1, 1), f2);
        w.remove_watches(f1);
        let left: Vec<_> = w.watchers_of(key(1, 1)).collect();
        assert_eq!(left, vec![f2]);
    }

    #[test]
    fn purge_detaches_dead_cells_and_dead_observers() {
        let mut w = RangeWatchers::new();
        let formula = key(5, 1);
        w.register_cell(key(1, 1), formula);
        w.register_cell(key(2, 1), formula);
        // Retire the watched address only.
        w.purge_retired(|k| k == key(1, 1));
        assert_eq!(w.watchers_of(key(1, 1)).count(), 0);
        assert_eq!(w.watchers_of(key(2, 1)).count(), 1);
        // Retire the observing formula itself.
        w.purge_retired(|k| k == formula);
        assert!(w.is_empty());
    }
}
