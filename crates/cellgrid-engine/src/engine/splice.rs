//! Structural-edit description and the formula transformation it induces.
//!
//! A splice `{axis, at_pos, ins, del}` describes one row/column insertion
//! and/or deletion. The transformation here runs while the axis indexes
//! still reflect *pre-splice* positions: it reads each anchor's base through
//! `id_to_pos`, maps base and target through the splice's position image,
//! and rewrites the stored offsets. Mutating the index first would make
//! `id_to_pos` report post-splice positions and double-apply the shift.

use crate::anchor::{Anchor, AxisMode, Expr, RangeRef};
use crate::axis::{AxisIndex, ColId, RowId};
use cellgrid_common::Axis;
use std::sync::Arc;

/// One structural edit on one axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Splice {
    pub axis: Axis,
    /// 1-based position the edit applies at.
    pub at_pos: u32,
    /// Positions inserted at `at_pos`.
    pub ins: u32,
    /// Positions deleted starting at `at_pos`.
    pub del: u32,
}

impl Splice {
    pub fn insert(axis: Axis, at_pos: u32, count: u32) -> Self {
        Self {
            axis,
            at_pos,
            ins: count,
            del: 0,
        }
    }

    pub fn delete(axis: Axis, from: u32, to: u32) -> Self {
        Self {
            axis,
            at_pos: from,
            ins: 0,
            del: to - from + 1,
        }
    }

    /// Image of a pre-splice position, `None` when the position dies.
    pub fn apply(&self, pos: u32) -> Option<u32> {
        if self.del > 0 && pos >= self.at_pos && pos < self.at_pos + self.del {
            return None;
        }
        if pos >= self.at_pos + self.del {
            return Some(pos - self.del + self.ins);
        }
        if self.ins > 0 && pos >= self.at_pos {
            return Some(pos + self.ins);
        }
        Some(pos)
    }
}

/// Result of transforming one formula AST through a splice.
#[derive(Debug)]
pub enum Transformed {
    Unchanged,
    Rewritten(Arc<Expr>),
    /// An anchor died or a range inverted: the formula becomes `#REF!`.
    Collapsed,
}

struct AnchorOutcome {
    anchor: Anchor,
    changed: bool,
    /// Post-transform target position along the splice axis, used for the
    /// range normalisation check.
    target: u32,
}

/// Transform one anchor. `None` means the anchor is dead.
///
/// Relative targets follow the position image; absolute targets stay pinned
/// to their stated position. Death applies to both modes: a target inside
/// the deleted span is gone regardless of anchoring.
fn transform_anchor(
    anchor: &Anchor,
    splice: &Splice,
    rows: &AxisIndex<RowId>,
    cols: &AxisIndex<ColId>,
) -> Option<AnchorOutcome> {
    let (base_pos, delta, mode) = match splice.axis {
        Axis::Row => (
            rows.id_to_pos(anchor.base.row)?,
            anchor.d_row,
            anchor.row_mode,
        ),
        Axis::Col => (
            cols.id_to_pos(anchor.base.col)?,
            anchor.d_col,
            anchor.col_mode,
        ),
    };
    let target = base_pos as i64 + delta;
    if target < 1 {
        return None;
    }
    let target = target as u32;

    if splice.del > 0 && target >= splice.at_pos && target < splice.at_pos + splice.del {
        return None;
    }
    let new_base = splice.apply(base_pos)?;
    let new_target = match mode {
        AxisMode::Rel => splice.apply(target)?,
        AxisMode::Abs => target,
    };
    let new_delta = new_target as i64 - new_base as i64;

    let mut out = *anchor;
    match splice.axis {
        Axis::Row => out.d_row = new_delta,
        Axis::Col => out.d_col = new_delta,
    }
    Some(AnchorOutcome {
        anchor: out,
        changed: new_delta != delta,
        target: new_target,
    })
}

fn transform_range(
    range: &RangeRef,
    splice: &Splice,
    rows: &AxisIndex<RowId>,
    cols: &AxisIndex<ColId>,
) -> Option<(RangeRef, bool)> {
    let start = transform_anchor(&range.start, splice, rows, cols)?;
    let end = transform_anchor(&range.end, splice, rows, cols)?;
    // Normalisation invariant along the spliced axis; the other axis is
    // untouched by this edit.
    if start.target > end.target {
        return None;
    }
    Some((
        RangeRef {
            start: start.anchor,
            end: end.anchor,
        },
        start.changed || end.changed,
    ))
}

/// Transform a whole AST. Shares unaffected sub-trees with the input.
pub fn transform_expr(
    expr: &Arc<Expr>,
    splice: &Splice,
    rows: &AxisIndex<RowId>,
    cols: &AxisIndex<ColId>,
) -> Transformed {
    match walk(expr, splice, rows, cols) {
        None => Transformed::Collapsed,
        Some((_, false)) => Transformed::Unchanged,
        Some((new_expr, true)) => Transformed::Rewritten(new_expr),
    }
}

fn walk(
    expr: &Arc<Expr>,
    splice: &Splice,
    rows: &AxisIndex<RowId>,
    cols: &AxisIndex<ColId>,
) -> Option<(Arc<Expr>, bool)> {
    match expr.as_ref() {
        Expr::Literal(_) => Some((expr.clone(), false)),
        Expr::Ref(anchor) => {
            let out = transform_anchor(anchor, splice, rows, cols)?;
            if out.changed {
                Some((Arc::new(Expr::Ref(out.anchor)), true))
            } else {
                Some((expr.clone(), false))
            }
        }
        Expr::Range(range) => {
            let (new_range, changed) = transform_range(range, splice, rows, cols)?;
            if changed {
                Some((Arc::new(Expr::Range(new_range)), true))
            } else {
                Some((expr.clone(), false))
            }
        }
        Expr::Unary { op, expr: inner } => {
            let (new_inner, changed) = walk(inner, splice, rows, cols)?;
            if changed {
                Some((
                    Arc::new(Expr::Unary {
                        op: *op,
                        expr: new_inner,
                    }),
                    true,
                ))
            } else {
                Some((expr.clone(), false))
            }
        }
        Expr::Binary { op, lhs, rhs } => {
            let (new_lhs, l_changed) = walk(lhs, splice, rows, cols)?;
            let (new_rhs, r_changed) = walk(rhs, splice, rows, cols)?;
            if l_changed || r_changed {
                Some((
                    Arc::new(Expr::Binary {
                        op: *op,
                        lhs: new_lhs,
                        rhs: new_rhs,
                    }),
                    true,
                ))
            } else {
                Some((expr.clone(), false))
            }
        }
        Expr::Function { name, args } => {
            let mut changed = false;
            let mut new_args = Vec::with_capacity(args.len());
            for arg in args {
                let (new_arg, arg_changed) = walk(arg, splice, rows, cols)?;
                changed |= arg_changed;
                new_args.push(new_arg);
            }
            if changed {
                Some((
                    Arc::new(Expr::Function {
                        name: name.clone(),
                        args: new_args,
                    }),
                    true,
                ))
            } else {
                Some((expr.clone(), false))
            }
        }
    }
}
