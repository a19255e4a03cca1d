//! Position-independent references and the anchor-form formula AST.
//!
//! An anchor names a cell by *identity plus offset*: the stable identifiers
//! of the formula's own cell, per-axis relative/absolute modes, and signed
//! deltas. At read time the anchor resolves by looking up the base's current
//! position and adding the deltas, so moving the base moves the reference
//! with it; reshaping an axis is handled by the splice transformation, which
//! rewrites deltas while positions are still pre-splice.

use crate::axis::{AxisIndex, ColId, RowId};
use crate::store::CellKey;
use cellgrid_common::{Pos, Scalar};
use cellgrid_parse::{Ast, BinaryOp, CellRef, RangeExpr, UnaryOp};
use std::sync::Arc;

/// Per-axis reference mode. `Rel` tracks the referenced identifier across
/// structural edits; `Abs` stays pinned to the stated position.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AxisMode {
    Rel,
    Abs,
}

/// A self-correcting cell reference.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Anchor {
    /// The formula's own cell. The anchor dies with it.
    pub base: CellKey,
    pub row_mode: AxisMode,
    pub col_mode: AxisMode,
    pub d_row: i64,
    pub d_col: i64,
}

impl Anchor {
    /// Address the anchor currently denotes, or `None` when the base is
    /// retired or the offset walks off the top or left edge.
    pub fn resolve(&self, rows: &AxisIndex<RowId>, cols: &AxisIndex<ColId>) -> Option<Pos> {
        let base_row = rows.id_to_pos(self.base.row)? as i64;
        let base_col = cols.id_to_pos(self.base.col)? as i64;
        let row = base_row + self.d_row;
        let col = base_col + self.d_col;
        if row < 1 || col < 1 {
            return None;
        }
        Some(Pos::new(row as u32, col as u32))
    }
}

/// A rectangular reference between two anchors sharing the formula's base.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RangeRef {
    pub start: Anchor,
    pub end: Anchor,
}

impl RangeRef {
    /// Resolved corners, normalised invariant intact: `None` when either
    /// anchor is dead or the rectangle is inverted.
    pub fn resolve(
        &self,
        rows: &AxisIndex<RowId>,
        cols: &AxisIndex<ColId>,
    ) -> Option<(Pos, Pos)> {
        let start = self.start.resolve(rows, cols)?;
        let end = self.end.resolve(rows, cols)?;
        if start.row > end.row || start.col > end.col {
            return None;
        }
        Some((start, end))
    }
}

/// Anchor-form formula AST.
///
/// Mirrors the parse-side node set with references bound to anchors.
/// `Range` is only legal as a function argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Scalar),
    Ref(Anchor),
    Range(RangeRef),
    Unary {
        op: UnaryOp,
        expr: Arc<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Arc<Expr>,
        rhs: Arc<Expr>,
    },
    Function {
        name: String,
        args: Vec<Arc<Expr>>,
    },
}

impl Expr {
    /// Visit every anchor in the tree.
    pub fn for_each_anchor(&self, f: &mut impl FnMut(&Anchor)) {
        match self {
            Expr::Literal(_) => {}
            Expr::Ref(a) => f(a),
            Expr::Range(r) => {
                f(&r.start);
                f(&r.end);
            }
            Expr::Unary { expr, .. } => expr.for_each_anchor(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_anchor(f);
                rhs.for_each_anchor(f);
            }
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.for_each_anchor(f);
                }
            }
        }
    }

    /// Visit every range in the tree.
    pub fn for_each_range(&self, f: &mut impl FnMut(&RangeRef)) {
        match self {
            Expr::Literal(_) | Expr::Ref(_) => {}
            Expr::Range(r) => f(r),
            Expr::Unary { expr, .. } => expr.for_each_range(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.for_each_range(f);
                rhs.for_each_range(f);
            }
            Expr::Function { args, .. } => {
                for arg in args {
                    arg.for_each_range(f);
                }
            }
        }
    }
}

fn bind_mode(abs: bool) -> AxisMode {
    if abs { AxisMode::Abs } else { AxisMode::Rel }
}

fn bind_cell_ref(cell: &CellRef, base_pos: Pos, base: CellKey) -> Anchor {
    Anchor {
        base,
        row_mode: bind_mode(cell.row_abs),
        col_mode: bind_mode(cell.col_abs),
        d_row: cell.row as i64 - base_pos.row as i64,
        d_col: cell.col as i64 - base_pos.col as i64,
    }
}

fn bind_range(range: &RangeExpr, base_pos: Pos, base: CellKey) -> RangeRef {
    // Normalise corners so the start ≤ end invariant holds from birth.
    let (mut start, mut end) = (range.start, range.end);
    if start.row > end.row {
        std::mem::swap(&mut start.row, &mut end.row);
        std::mem::swap(&mut start.row_abs, &mut end.row_abs);
    }
    if start.col > end.col {
        std::mem::swap(&mut start.col, &mut end.col);
        std::mem::swap(&mut start.col_abs, &mut end.col_abs);
    }
    RangeRef {
        start: bind_cell_ref(&start, base_pos, base),
        end: bind_cell_ref(&end, base_pos, base),
    }
}

/// Bind a parsed position-form AST to anchor form, using the formula's own
/// cell as every anchor's base.
pub fn bind(ast: &Ast, base_pos: Pos, base: CellKey) -> Expr {
    match ast {
        Ast::Literal(v) => Expr::Literal(v.clone()),
        Ast::Reference(cell) => Expr::Ref(bind_cell_ref(cell, base_pos, base)),
        Ast::Range(range) => Expr::Range(bind_range(range, base_pos, base)),
        Ast::UnaryOp { op, expr } => Expr::Unary {
            op: *op,
            expr: Arc::new(bind(expr, base_pos, base)),
        },
        Ast::BinaryOp { op, lhs, rhs } => Expr::Binary {
            op: *op,
            lhs: Arc::new(bind(lhs, base_pos, base)),
            rhs: Arc::new(bind(rhs, base_pos, base)),
        },
        Ast::Function { name, args } => Expr::Function {
            name: name.clone(),
            args: args
                .iter()
                .map(|a| Arc::new(bind(a, base_pos, base)))
                .collect(),
        },
    }
}

fn unbind_anchor(
    anchor: &Anchor,
    rows: &AxisIndex<RowId>,
    cols: &AxisIndex<ColId>,
) -> Option<CellRef> {
    let pos = anchor.resolve(rows, cols)?;
    Some(CellRef::new(pos.row, pos.col).with_abs(
        anchor.row_mode == AxisMode::Abs,
        anchor.col_mode == AxisMode::Abs,
    ))
}

/// Project the anchor AST back onto positions for rendering. Anchors that no
/// longer resolve render as the `#REF!` literal.
pub fn unbind(expr: &Expr, rows: &AxisIndex<RowId>, cols: &AxisIndex<ColId>) -> Ast {
    let ref_error = || Ast::Literal(Scalar::Error(cellgrid_common::CalcErrorKind::Ref.into()));
    match expr {
        Expr::Literal(v) => Ast::Literal(v.clone()),
        Expr::Ref(anchor) => match unbind_anchor(anchor, rows, cols) {
            Some(cell) => Ast::Reference(cell),
            None => ref_error(),
        },
        Expr::Range(range) => {
            match (
                unbind_anchor(&range.start, rows, cols),
                unbind_anchor(&range.end, rows, cols),
            ) {
                (Some(start), Some(end)) => Ast::Range(RangeExpr { start, end }),
                _ => ref_error(),
            }
        }
        Expr::Unary { op, expr } => Ast::UnaryOp {
            op: *op,
            expr: Box::new(unbind(expr, rows, cols)),
        },
        Expr::Binary { op, lhs, rhs } => Ast::BinaryOp {
            op: *op,
            lhs: Box::new(unbind(lhs, rows, cols)),
            rhs: Box::new(unbind(rhs, rows, cols)),
        },
        Expr::Function { name, args } => Ast::Function {
            name: name.clone(),
            args: args.iter().map(|a| unbind(a, rows, cols)).collect(),
        },
    }
}
