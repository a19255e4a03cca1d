//! The engine coordinator.
//!
//! All mutation flows through [`Engine`]: it owns the axis indexes, the cell
//! store, the dependency graph, and the watcher tables, and it drains the
//! recalculation set synchronously before every public operation returns.
//! Callers observe a fully consistent post-state; no component leaks
//! interior references that would permit out-of-band mutation.

mod config;
mod eval;
mod functions;
mod splice;

#[cfg(test)]
mod tests;

pub use self::config::EngineConfig;
pub use self::splice::{Splice, Transformed};

use crate::anchor::{self, Expr, RangeRef};
use crate::axis::{AxisIndex, ColId, RowId};
use crate::graph::DepGraph;
use crate::store::{Cell, CellKey, CellStore};
use crate::watchers::RangeWatchers;
use cellgrid_common::{Axis, CalcErrorKind, Pos, Scalar};
use cellgrid_parse::render_formula;
use self::eval::{Evaluator, key_at};
use rustc_hash::FxHashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, trace};

/// Structural-edit precondition failures. Public convenience operations
/// (`insert_rows` and friends) translate these into the documented no-op
/// behaviour; [`Engine::splice`] surfaces them.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("position {pos} is out of range on the {axis} axis")]
    OutOfRange { axis: Axis, pos: u32 },
    #[error("splice inserts and deletes nothing")]
    EmptySplice,
    #[error("{axis} capacity exceeded: {requested} requested, {max} available")]
    CapacityExceeded { axis: Axis, requested: u64, max: u32 },
}

/// What one splice did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SpliceSummary {
    pub minted: usize,
    pub retired: usize,
    pub cells_removed: usize,
    pub formulas_rewritten: usize,
    pub formulas_collapsed: usize,
}

pub struct Engine {
    rows: AxisIndex<RowId>,
    cols: AxisIndex<ColId>,
    store: CellStore,
    graph: DepGraph,
    watchers: RangeWatchers,
    config: EngineConfig,
}

impl Engine {
    /// New sheet with the given live extent.
    pub fn new(initial_rows: u32, initial_cols: u32) -> Self {
        Self::with_config(initial_rows, initial_cols, EngineConfig::default())
    }

    pub fn with_config(initial_rows: u32, initial_cols: u32, config: EngineConfig) -> Self {
        Self {
            rows: AxisIndex::new(initial_rows.min(config.max_rows)),
            cols: AxisIndex::new(initial_cols.min(config.max_cols)),
            store: CellStore::new(),
            graph: DepGraph::new(),
            watchers: RangeWatchers::new(),
            config,
        }
    }

    /* ===================  inspection  =================== */

    pub fn row_count(&self) -> u32 {
        self.rows.max_pos()
    }

    pub fn col_count(&self) -> u32 {
        self.cols.max_pos()
    }

    pub fn cell_count(&self) -> usize {
        self.store.len()
    }

    /// Maximum populated position per axis, `(0, 0)` when nothing is set.
    pub fn used_extent(&self) -> (u32, u32) {
        let mut extent = (0, 0);
        for key in self.store.keys() {
            if let Some(pos) = self.pos_of(key) {
                extent.0 = extent.0.max(pos.row);
                extent.1 = extent.1.max(pos.col);
            }
        }
        extent
    }

    pub fn graph(&self) -> &DepGraph {
        &self.graph
    }

    pub fn rows(&self) -> &AxisIndex<RowId> {
        &self.rows
    }

    pub fn cols(&self) -> &AxisIndex<ColId> {
        &self.cols
    }

    #[cfg(test)]
    pub(crate) fn store(&self) -> &CellStore {
        &self.store
    }

    #[cfg(test)]
    pub(crate) fn watchers(&self) -> &RangeWatchers {
        &self.watchers
    }

    fn key_at(&self, pos: Pos) -> Option<CellKey> {
        key_at(&self.rows, &self.cols, pos)
    }

    fn pos_of(&self, key: CellKey) -> Option<Pos> {
        Some(Pos::new(
            self.rows.id_to_pos(key.row)?,
            self.cols.id_to_pos(key.col)?,
        ))
    }

    /* ===================  cell operations  =================== */

    pub fn set_value(&mut self, pos: impl Into<Pos>, value: f64) {
        self.set_scalar(pos, Scalar::Number(value));
    }

    /// Store a literal. Out-of-range positions are a no-op.
    pub fn set_scalar(&mut self, pos: impl Into<Pos>, value: Scalar) {
        let pos = pos.into();
        let Some(key) = self.key_at(pos) else {
            return;
        };
        self.retire_formula_state(key);
        self.store.set(key, Cell::Value(value));

        let mut dirty = FxHashSet::default();
        dirty.insert(key);
        self.collect_watcher_hits(key, pos, &mut dirty);
        self.recalc(dirty);
    }

    /// Parse, bind, and install a formula. A parse failure stores `#REF!`;
    /// a formula whose producers would close a cycle keeps its AST with a
    /// cached `#CYCLE!` and installs no edges.
    pub fn set_formula(&mut self, pos: impl Into<Pos>, text: &str) {
        let pos = pos.into();
        let Some(key) = self.key_at(pos) else {
            return;
        };
        let expr = match cellgrid_parse::parse(text) {
            Ok(ast) => Arc::new(anchor::bind(&ast, pos, key)),
            Err(err) => {
                debug!(%pos, error = %err, "formula rejected");
                self.retire_formula_state(key);
                self.store.set(key, Cell::Value(CalcErrorKind::Ref.into()));
                let mut dirty = FxHashSet::default();
                dirty.insert(key);
                self.collect_watcher_hits(key, pos, &mut dirty);
                self.recalc(dirty);
                return;
            }
        };

        let producers = self.producers_of(&expr);
        let closes_cycle = producers
            .iter()
            .any(|&p| p == key || self.graph.would_create_cycle(p, key));

        self.watchers.remove_watches(key);
        if closes_cycle {
            trace!(%pos, "formula closes a cycle, stored without edges");
            self.graph.replace_all_inbound(key, &[]);
            self.store.set(
                key,
                Cell::Formula {
                    ast: expr,
                    cached: Some(CalcErrorKind::Cycle.into()),
                },
            );
            let mut dirty: FxHashSet<CellKey> =
                self.graph.dependents_of(key).into_iter().collect();
            self.collect_watcher_hits(key, pos, &mut dirty);
            self.recalc(dirty);
            return;
        }

        self.graph.replace_all_inbound(key, &producers);
        self.register_watches(key, &expr);
        self.store.set(
            key,
            Cell::Formula {
                ast: expr,
                cached: None,
            },
        );
        let mut dirty = FxHashSet::default();
        dirty.insert(key);
        self.collect_watcher_hits(key, pos, &mut dirty);
        self.recalc(dirty);
    }

    /// Remove a cell entirely. Dependents see it as empty.
    pub fn clear_cell(&mut self, pos: impl Into<Pos>) {
        let pos = pos.into();
        let Some(key) = self.key_at(pos) else {
            return;
        };
        let Some(cell) = self.store.remove(key) else {
            return;
        };
        if cell.is_formula() {
            self.graph.replace_all_inbound(key, &[]);
            self.watchers.remove_watches(key);
        }
        let mut dirty: FxHashSet<CellKey> = self.graph.dependents_of(key).into_iter().collect();
        self.collect_watcher_hits(key, pos, &mut dirty);
        self.recalc(dirty);
    }

    /// Current scalar at `pos`: `Empty` for unpopulated addresses, cached
    /// results for formulas (evaluated on demand iff not cached).
    pub fn get_value(&mut self, pos: impl Into<Pos>) -> Scalar {
        let Some(key) = self.key_at(pos.into()) else {
            return Scalar::Empty;
        };
        Evaluator::new(&self.rows, &self.cols, &mut self.store).eval_cell(key)
    }

    /// Source text of a cell: canonical formula text re-printed through the
    /// current axis state, or the literal's display form.
    pub fn get_source(&mut self, pos: impl Into<Pos>) -> Option<String> {
        let key = self.key_at(pos.into())?;
        match self.store.get(key)? {
            Cell::Value(v) => Some(v.to_string()),
            Cell::Formula { ast, .. } => {
                Some(render_formula(&anchor::unbind(ast, &self.rows, &self.cols)))
            }
        }
    }

    /* ===================  structural operations  =================== */

    pub fn insert_rows(&mut self, at_pos: u32, count: u32) {
        let _ = self.splice(Splice::insert(Axis::Row, at_pos, count));
    }

    pub fn insert_cols(&mut self, at_pos: u32, count: u32) {
        let _ = self.splice(Splice::insert(Axis::Col, at_pos, count));
    }

    pub fn delete_rows(&mut self, from: u32, to: u32) {
        if from == 0 || to < from {
            return;
        }
        let _ = self.splice(Splice::delete(Axis::Row, from, to));
    }

    pub fn delete_cols(&mut self, from: u32, to: u32) {
        if from == 0 || to < from {
            return;
        }
        let _ = self.splice(Splice::delete(Axis::Col, from, to));
    }

    /// Execute one structural edit under the four-step protocol: transform
    /// formulas against pre-splice positions, mutate the axis, bulk-remove
    /// cells of retired identifiers, then drain the recalculation set.
    pub fn splice(&mut self, mut splice: Splice) -> Result<SpliceSummary, EditError> {
        let (live, max) = match splice.axis {
            Axis::Row => (self.rows.max_pos(), self.config.max_rows),
            Axis::Col => (self.cols.max_pos(), self.config.max_cols),
        };
        if splice.at_pos == 0 {
            return Err(EditError::OutOfRange {
                axis: splice.axis,
                pos: 0,
            });
        }
        if splice.ins == 0 && splice.del == 0 {
            return Err(EditError::EmptySplice);
        }
        if splice.ins > 0 && live as u64 + splice.ins as u64 > max as u64 {
            return Err(EditError::CapacityExceeded {
                axis: splice.axis,
                requested: live as u64 + splice.ins as u64,
                max,
            });
        }
        if splice.del > 0 {
            if splice.at_pos > live {
                return Err(EditError::OutOfRange {
                    axis: splice.axis,
                    pos: splice.at_pos,
                });
            }
            // Clamp the deleted span to the live extent.
            splice.del = splice.del.min(live - splice.at_pos + 1);
        } else {
            // Inserting beyond the end appends.
            splice.at_pos = splice.at_pos.min(live + 1);
        }

        debug!(
            axis = %splice.axis,
            at = splice.at_pos,
            ins = splice.ins,
            del = splice.del,
            "splice"
        );
        Ok(self.apply_splice(splice))
    }

    fn apply_splice(&mut self, splice: Splice) -> SpliceSummary {
        let mut summary = SpliceSummary::default();
        let mut dirty: FxHashSet<CellKey> = FxHashSet::default();

        // Step 1: transform every formula AST while the axis indexes still
        // reflect pre-splice positions.
        let formula_keys: Vec<CellKey> = self
            .store
            .iter()
            .filter(|(_, cell)| cell.is_formula())
            .map(|(key, _)| key)
            .collect();
        for key in formula_keys {
            let Some(Cell::Formula { ast, cached }) = self.store.get(key) else {
                continue;
            };
            let (ast, cached) = (ast.clone(), cached.clone());
            match splice::transform_expr(&ast, &splice, &self.rows, &self.cols) {
                Transformed::Unchanged => {}
                Transformed::Rewritten(ast) => {
                    self.store.set(key, Cell::Formula { ast, cached });
                    dirty.insert(key);
                    summary.formulas_rewritten += 1;
                }
                Transformed::Collapsed => {
                    self.watchers.remove_watches(key);
                    self.graph.replace_all_inbound(key, &[]);
                    self.store.set(key, Cell::Value(CalcErrorKind::Ref.into()));
                    dirty.insert(key);
                    summary.formulas_collapsed += 1;
                }
            }
        }

        // Step 2: mutate the axis (insert, then optionally remove), and
        // step 3: bulk-remove cells whose identifiers were retired.
        let removed_cells = match splice.axis {
            Axis::Row => {
                if splice.ins > 0 {
                    summary.minted = self.rows.insert(splice.at_pos, splice.ins).len();
                }
                if splice.del > 0 {
                    let from = splice.at_pos + splice.ins;
                    let retired = self.rows.remove(from, from + splice.del - 1);
                    summary.retired = retired.len();
                    let removed = self.store.remove_rows(&retired);
                    let doomed: FxHashSet<RowId> = retired.into_iter().collect();
                    self.watchers.purge_retired(|key| doomed.contains(&key.row));
                    removed
                } else {
                    Vec::new()
                }
            }
            Axis::Col => {
                if splice.ins > 0 {
                    summary.minted = self.cols.insert(splice.at_pos, splice.ins).len();
                }
                if splice.del > 0 {
                    let from = splice.at_pos + splice.ins;
                    let retired = self.cols.remove(from, from + splice.del - 1);
                    summary.retired = retired.len();
                    let removed = self.store.remove_cols(&retired);
                    let doomed: FxHashSet<ColId> = retired.into_iter().collect();
                    self.watchers.purge_retired(|key| doomed.contains(&key.col));
                    removed
                } else {
                    Vec::new()
                }
            }
        };

        summary.cells_removed = removed_cells.len();
        for key in removed_cells {
            dirty.remove(&key);
            for consumer in self.graph.dependents_of(key) {
                dirty.insert(consumer);
            }
            self.graph.remove_all(key);
            self.watchers.remove_watches(key);
        }

        // Step 4: recalculate the accumulated dirty set.
        self.recalc(dirty);
        summary
    }

    /* ===================  internals  =================== */

    /// Retract the producer edges and range watches a formula at `key`
    /// declared. Consumer edges are untouched.
    fn retire_formula_state(&mut self, key: CellKey) {
        if matches!(self.store.get(key), Some(Cell::Formula { .. })) {
            self.graph.replace_all_inbound(key, &[]);
            self.watchers.remove_watches(key);
        }
    }

    /// Formulas invalidated by a write at `key`/`pos` through either
    /// watcher channel.
    fn collect_watcher_hits(&self, key: CellKey, pos: Pos, dirty: &mut FxHashSet<CellKey>) {
        for formula in self.watchers.watchers_of(key) {
            dirty.insert(formula);
        }
        for (formula, range) in self.watchers.coarse_watchers() {
            if let Some((start, end)) = range.resolve(&self.rows, &self.cols) {
                if pos.row >= start.row
                    && pos.row <= end.row
                    && pos.col >= start.col
                    && pos.col <= end.col
                {
                    dirty.insert(formula);
                }
            }
        }
    }

    /// The producer set of a formula: one address per reference anchor,
    /// every address of each small rectangle, and the populated addresses
    /// of large ones (watchers cover their empties).
    fn producers_of(&self, expr: &Expr) -> Vec<CellKey> {
        let mut producers: FxHashSet<CellKey> = FxHashSet::default();
        collect(expr, &mut |node| match node {
            Expr::Ref(anchor) => {
                if let Some(pos) = anchor.resolve(&self.rows, &self.cols) {
                    if let Some(key) = key_at(&self.rows, &self.cols, pos) {
                        producers.insert(key);
                    }
                }
            }
            Expr::Range(range) => self.rect_producers(range, &mut producers),
            _ => {}
        });
        producers.into_iter().collect()
    }

    fn rect_producers(&self, range: &RangeRef, producers: &mut FxHashSet<CellKey>) {
        let Some((start, end)) = range.resolve(&self.rows, &self.cols) else {
            return;
        };
        let end = Pos::new(
            end.row.min(self.rows.max_pos()),
            end.col.min(self.cols.max_pos()),
        );
        if start.row > end.row || start.col > end.col {
            return;
        }
        let area = (end.row - start.row + 1) as u64 * (end.col - start.col + 1) as u64;
        if area <= self.config.range_expansion_limit as u64 {
            for row in start.row..=end.row {
                for col in start.col..=end.col {
                    if let Some(key) = self.key_at(Pos::new(row, col)) {
                        producers.insert(key);
                    }
                }
            }
        } else {
            for key in self.store.keys() {
                if let Some(pos) = self.pos_of(key) {
                    if pos.row >= start.row
                        && pos.row <= end.row
                        && pos.col >= start.col
                        && pos.col <= end.col
                    {
                        producers.insert(key);
                    }
                }
            }
        }
    }

    /// Install watch entries for every rectangle a formula observes.
    fn register_watches(&mut self, key: CellKey, expr: &Expr) {
        let mut ranges: Vec<RangeRef> = Vec::new();
        expr.for_each_range(&mut |r| ranges.push(*r));
        for range in ranges {
            let Some((start, end)) = range.resolve(&self.rows, &self.cols) else {
                self.watchers.add_watch(range, key);
                continue;
            };
            let clamped_end = Pos::new(
                end.row.min(self.rows.max_pos()),
                end.col.min(self.cols.max_pos()),
            );
            let area = (clamped_end.row.saturating_sub(start.row) + 1) as u64
                * (clamped_end.col.saturating_sub(start.col) + 1) as u64;
            if area <= self.config.range_expansion_limit as u64 {
                self.watchers.add_watch(range, key);
                for row in start.row..=clamped_end.row {
                    for col in start.col..=clamped_end.col {
                        if let Some(cell) = self.key_at(Pos::new(row, col)) {
                            self.watchers.register_cell(cell, key);
                        }
                    }
                }
            } else {
                self.watchers.add_coarse_watch(range, key);
            }
        }
    }

    /// Recalculation driver: clear stale caches, close over consumers, mark
    /// cycles, then re-evaluate in topological order. Range formulas get
    /// their inbound edges and watch entries refreshed, because a splice can
    /// change which addresses a rectangle spans.
    fn recalc(&mut self, dirty: FxHashSet<CellKey>) {
        if dirty.is_empty() {
            return;
        }
        let affected = self.graph.affected_from(&dirty);
        debug!(dirty = dirty.len(), affected = affected.len(), "recalc");

        let cycles = self.graph.cycle_members(&affected);
        for &key in &affected {
            if let Some(Cell::Formula { cached, .. }) = self.store.get_mut(key) {
                *cached = if cycles.contains(&key) {
                    Some(CalcErrorKind::Cycle.into())
                } else {
                    None
                };
            }
        }

        let order = self.graph.topo_order(&affected);
        for key in order {
            if cycles.contains(&key) {
                continue;
            }
            let Some(Cell::Formula { ast, .. }) = self.store.get(key) else {
                continue;
            };
            let ast = ast.clone();

            // Refresh the producer set; resolution may have moved under a
            // splice or a watcher-triggered write.
            let producers = self.producers_of(&ast);
            let closes_cycle = producers
                .iter()
                .any(|&p| p == key || self.graph.would_create_cycle(p, key));
            if closes_cycle {
                self.graph.replace_all_inbound(key, &[]);
                self.watchers.remove_watches(key);
                if let Some(Cell::Formula { cached, .. }) = self.store.get_mut(key) {
                    *cached = Some(CalcErrorKind::Cycle.into());
                }
                continue;
            }
            self.graph.replace_all_inbound(key, &producers);
            self.watchers.remove_watches(key);
            self.register_watches(key, &ast);

            let value = Evaluator::new(&self.rows, &self.cols, &mut self.store).eval_cell(key);
            trace!(?key, %value, "evaluated");
        }
    }
}

fn collect(expr: &Expr, f: &mut impl FnMut(&Expr)) {
    f(expr);
    match expr {
        Expr::Literal(_) | Expr::Ref(_) | Expr::Range(_) => {}
        Expr::Unary { expr, .. } => collect(expr, f),
        Expr::Binary { lhs, rhs, .. } => {
            collect(lhs, f);
            collect(rhs, f);
        }
        Expr::Function { args, .. } => {
            for arg in args {
                collect(arg, f);
            }
        }
    }
}
