//! AST evaluation against current sheet state.
//!
//! Evaluation is demand-driven: reading a formula cell whose cache is empty
//! evaluates it on the spot, with a visiting stack that turns re-entry into
//! the `#CYCLE!` sentinel. Errors short-circuit left-to-right; the first
//! error seen wins.

use crate::anchor::{Anchor, Expr, RangeRef};
use crate::axis::{AxisIndex, ColId, RowId};
use crate::store::{Cell, CellKey, CellStore};
use cellgrid_common::{CalcError, CalcErrorKind, Pos, Scalar};
use cellgrid_parse::{BinaryOp, UnaryOp};

use super::functions;

pub(crate) struct Evaluator<'a> {
    pub rows: &'a AxisIndex<RowId>,
    pub cols: &'a AxisIndex<ColId>,
    pub store: &'a mut CellStore,
    visiting: Vec<CellKey>,
}

pub(crate) fn key_at(rows: &AxisIndex<RowId>, cols: &AxisIndex<ColId>, pos: Pos) -> Option<CellKey> {
    Some(CellKey::new(
        rows.pos_to_id(pos.row)?,
        cols.pos_to_id(pos.col)?,
    ))
}

impl<'a> Evaluator<'a> {
    pub fn new(
        rows: &'a AxisIndex<RowId>,
        cols: &'a AxisIndex<ColId>,
        store: &'a mut CellStore,
    ) -> Self {
        Self {
            rows,
            cols,
            store,
            visiting: Vec::new(),
        }
    }

    /// Scalar of a cell, evaluating and caching formulas on demand.
    pub fn eval_cell(&mut self, key: CellKey) -> Scalar {
        match self.store.get(key) {
            None => Scalar::Empty,
            Some(Cell::Value(v)) => v.clone(),
            Some(Cell::Formula {
                cached: Some(v), ..
            }) => v.clone(),
            Some(Cell::Formula { ast, cached: None }) => {
                if self.visiting.contains(&key) {
                    return CalcErrorKind::Cycle.into();
                }
                let ast = ast.clone();
                self.visiting.push(key);
                let value = self.eval_expr(&ast);
                self.visiting.pop();
                if let Some(Cell::Formula { cached, .. }) = self.store.get_mut(key) {
                    *cached = Some(value.clone());
                }
                value
            }
        }
    }

    pub fn eval_expr(&mut self, expr: &Expr) -> Scalar {
        match expr {
            Expr::Literal(v) => v.clone(),
            Expr::Ref(anchor) => self.eval_ref(anchor),
            // A bare rectangle has no scalar meaning.
            Expr::Range(_) => CalcError::new(CalcErrorKind::Value)
                .with_message("range used as a scalar")
                .into(),
            Expr::Unary { op, expr } => self.eval_unary(*op, expr),
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            Expr::Function { name, args } => functions::eval_function(self, name, args),
        }
    }

    fn eval_ref(&mut self, anchor: &Anchor) -> Scalar {
        let Some(pos) = anchor.resolve(self.rows, self.cols) else {
            return CalcErrorKind::Ref.into();
        };
        let Some(key) = key_at(self.rows, self.cols, pos) else {
            return CalcErrorKind::Ref.into();
        };
        match self.eval_cell(key) {
            // A directly referenced empty address reads as zero.
            Scalar::Empty => Scalar::Number(0.0),
            v => v,
        }
    }

    fn eval_unary(&mut self, op: UnaryOp, expr: &Expr) -> Scalar {
        let v = self.eval_expr(expr);
        if v.is_error() {
            return v;
        }
        let n = match v.coerce_number() {
            Ok(n) => n,
            Err(e) => return e.into(),
        };
        match op {
            UnaryOp::Plus => Scalar::Number(n),
            UnaryOp::Neg => Scalar::Number(-n),
            UnaryOp::Percent => Scalar::Number(n / 100.0),
        }
    }

    fn eval_binary(&mut self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Scalar {
        let l = self.eval_expr(lhs);
        if l.is_error() {
            return l;
        }
        let r = self.eval_expr(rhs);
        if r.is_error() {
            return r;
        }
        match op {
            BinaryOp::Add => self.numeric(l, r, |a, b| a + b),
            BinaryOp::Sub => self.numeric(l, r, |a, b| a - b),
            BinaryOp::Mul => self.numeric(l, r, |a, b| a * b),
            BinaryOp::Div => self.divide(l, r),
            BinaryOp::Pow => self.power(l, r),
            BinaryOp::Concat => {
                Scalar::Text(format!("{}{}", coerce_text(&l), coerce_text(&r)))
            }
            BinaryOp::Eq => Scalar::Boolean(scalars_equal(&l, &r)),
            BinaryOp::Ne => Scalar::Boolean(!scalars_equal(&l, &r)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => self.compare(op, l, r),
        }
    }

    fn numeric(&self, l: Scalar, r: Scalar, f: impl Fn(f64, f64) -> f64) -> Scalar {
        match (l.coerce_number(), r.coerce_number()) {
            (Ok(a), Ok(b)) => Scalar::Number(f(a, b)),
            (Err(e), _) | (_, Err(e)) => e.into(),
        }
    }

    fn divide(&self, l: Scalar, r: Scalar) -> Scalar {
        match (l.coerce_number(), r.coerce_number()) {
            (Ok(_), Ok(b)) if b == 0.0 => CalcErrorKind::Div0.into(),
            (Ok(a), Ok(b)) => Scalar::Number(a / b),
            (Err(e), _) | (_, Err(e)) => e.into(),
        }
    }

    fn power(&self, l: Scalar, r: Scalar) -> Scalar {
        match (l.coerce_number(), r.coerce_number()) {
            (Ok(a), Ok(b)) => {
                if a == 0.0 && b == 0.0 {
                    return CalcErrorKind::Num.into();
                }
                let p = a.powf(b);
                if p.is_finite() {
                    Scalar::Number(p)
                } else {
                    CalcErrorKind::Num.into()
                }
            }
            (Err(e), _) | (_, Err(e)) => e.into(),
        }
    }

    fn compare(&self, op: BinaryOp, l: Scalar, r: Scalar) -> Scalar {
        let ord = match (l.as_number(), r.as_number()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => match (&l, &r) {
                (Scalar::Text(a), Scalar::Text(b)) => {
                    Some(a.to_lowercase().cmp(&b.to_lowercase()))
                }
                _ => None,
            },
        };
        let Some(ord) = ord else {
            return CalcError::new(CalcErrorKind::Value)
                .with_message("incomparable operands")
                .into();
        };
        Scalar::Boolean(match op {
            BinaryOp::Lt => ord.is_lt(),
            BinaryOp::Le => ord.is_le(),
            BinaryOp::Gt => ord.is_gt(),
            BinaryOp::Ge => ord.is_ge(),
            _ => unreachable!("compare only handles orderings"),
        })
    }

    /// Scalars of the populated cells inside a rectangle, row-major, with
    /// formulas evaluated on demand. `Err` when the range no longer
    /// resolves.
    pub fn range_scalars(&mut self, range: &RangeRef) -> Result<Vec<Scalar>, CalcError> {
        let Some((start, end)) = range.resolve(self.rows, self.cols) else {
            return Err(CalcError::new(CalcErrorKind::Ref));
        };
        let end = Pos::new(
            end.row.min(self.rows.max_pos()),
            end.col.min(self.cols.max_pos()),
        );
        if start.row > end.row || start.col > end.col {
            return Ok(Vec::new());
        }

        let area = (end.row - start.row + 1) as u64 * (end.col - start.col + 1) as u64;
        let mut keys: Vec<(Pos, CellKey)> = Vec::new();
        if area <= self.store.len() as u64 {
            for row in start.row..=end.row {
                for col in start.col..=end.col {
                    let pos = Pos::new(row, col);
                    if let Some(key) = key_at(self.rows, self.cols, pos) {
                        if self.store.contains(key) {
                            keys.push((pos, key));
                        }
                    }
                }
            }
        } else {
            // Sparse sheet, huge rectangle: walk the store instead of the
            // area, then restore row-major order for deterministic error
            // propagation.
            for key in self.store.keys().collect::<Vec<_>>() {
                let (Some(row), Some(col)) =
                    (self.rows.id_to_pos(key.row), self.cols.id_to_pos(key.col))
                else {
                    continue;
                };
                if row >= start.row && row <= end.row && col >= start.col && col <= end.col {
                    keys.push((Pos::new(row, col), key));
                }
            }
            keys.sort_unstable_by_key(|(pos, _)| (pos.row, pos.col));
        }

        Ok(keys
            .into_iter()
            .map(|(_, key)| self.eval_cell(key))
            .collect())
    }
}

pub(crate) fn coerce_text(v: &Scalar) -> String {
    match v {
        Scalar::Empty => String::new(),
        other => other.to_string(),
    }
}

fn scalars_equal(l: &Scalar, r: &Scalar) -> bool {
    if let (Some(a), Some(b)) = (l.as_number(), r.as_number()) {
        return a == b;
    }
    match (l, r) {
        (Scalar::Text(a), Scalar::Text(b)) => a.eq_ignore_ascii_case(b),
        _ => false,
    }
}
