//! Builtin function set.
//!
//! Aggregators treat range arguments the conventional way: numeric cells
//! participate, text and booleans inside rectangles are ignored, empties are
//! skipped entirely. Scalar arguments are coerced, and any error operand
//! propagates first-seen in left-to-right order.

use crate::anchor::Expr;
use cellgrid_common::{CalcError, CalcErrorKind, Scalar};
use std::sync::Arc;

use super::eval::Evaluator;

pub(crate) fn eval_function(ev: &mut Evaluator<'_>, name: &str, args: &[Arc<Expr>]) -> Scalar {
    match name {
        "SUM" => fold_numeric(ev, args, 0.0, |acc, n| acc + n).map_or_else(Scalar::from, |(sum, _)| Scalar::Number(sum)),
        "COUNT" => fold_numeric(ev, args, 0.0, |acc, _| acc)
            .map_or_else(Scalar::from, |(_, count)| Scalar::Number(count as f64)),
        "AVERAGE" => match fold_numeric(ev, args, 0.0, |acc, n| acc + n) {
            Err(e) => e.into(),
            Ok((_, 0)) => CalcErrorKind::Div0.into(),
            Ok((sum, count)) => Scalar::Number(sum / count as f64),
        },
        "MAX" => extremum(ev, args, |a, b| if b > a { b } else { a }),
        "MIN" => extremum(ev, args, |a, b| if b < a { b } else { a }),
        "IF" => eval_if(ev, args),
        "AND" => eval_logic(ev, args, true, |acc, b| acc && b),
        "OR" => eval_logic(ev, args, false, |acc, b| acc || b),
        "NOT" => eval_not(ev, args),
        _ => CalcError::new(CalcErrorKind::Name)
            .with_message(format!("unknown function {name}"))
            .into(),
    }
}

/// Fold numeric argument values: scalars coerce, range cells participate
/// only when numeric. Returns the fold result and the numeric count.
fn fold_numeric(
    ev: &mut Evaluator<'_>,
    args: &[Arc<Expr>],
    init: f64,
    mut f: impl FnMut(f64, f64) -> f64,
) -> Result<(f64, usize), CalcError> {
    let mut acc = init;
    let mut count = 0usize;
    for arg in args {
        match arg.as_ref() {
            Expr::Range(range) => {
                for v in ev.range_scalars(range)? {
                    match v {
                        Scalar::Number(n) => {
                            acc = f(acc, n);
                            count += 1;
                        }
                        Scalar::Error(e) => return Err(e),
                        // Text, booleans, and empties inside a rectangle
                        // don't participate.
                        _ => {}
                    }
                }
            }
            _ => {
                let v = ev.eval_expr(arg);
                if let Scalar::Error(e) = v {
                    return Err(e);
                }
                if v.is_empty() {
                    continue;
                }
                let n = v.coerce_number()?;
                acc = f(acc, n);
                count += 1;
            }
        }
    }
    Ok((acc, count))
}

fn extremum(ev: &mut Evaluator<'_>, args: &[Arc<Expr>], pick: impl Fn(f64, f64) -> f64) -> Scalar {
    let mut best: Option<f64> = None;
    match fold_into(ev, args, &mut |n| {
        best = Some(match best {
            None => n,
            Some(b) => pick(b, n),
        });
    }) {
        Err(e) => e.into(),
        // Empty input conventionally yields zero.
        Ok(()) => Scalar::Number(best.unwrap_or(0.0)),
    }
}

fn fold_into(
    ev: &mut Evaluator<'_>,
    args: &[Arc<Expr>],
    f: &mut impl FnMut(f64),
) -> Result<(), CalcError> {
    fold_numeric(ev, args, 0.0, |acc, n| {
        f(n);
        acc
    })
    .map(|_| ())
}

fn eval_if(ev: &mut Evaluator<'_>, args: &[Arc<Expr>]) -> Scalar {
    if args.len() < 2 || args.len() > 3 {
        return CalcError::new(CalcErrorKind::Value)
            .with_message("IF takes 2 or 3 arguments")
            .into();
    }
    let cond = ev.eval_expr(&args[0]);
    if cond.is_error() {
        return cond;
    }
    // Only the taken branch is evaluated.
    if cond.is_truthy() {
        ev.eval_expr(&args[1])
    } else if let Some(else_branch) = args.get(2) {
        ev.eval_expr(else_branch)
    } else {
        Scalar::Boolean(false)
    }
}

fn eval_logic(
    ev: &mut Evaluator<'_>,
    args: &[Arc<Expr>],
    init: bool,
    combine: impl Fn(bool, bool) -> bool,
) -> Scalar {
    if args.is_empty() {
        return CalcError::new(CalcErrorKind::Value)
            .with_message("missing arguments")
            .into();
    }
    let mut acc = init;
    let mut saw_operand = false;
    for arg in args {
        match arg.as_ref() {
            Expr::Range(range) => {
                let values = match ev.range_scalars(range) {
                    Ok(v) => v,
                    Err(e) => return e.into(),
                };
                for v in values {
                    match v {
                        Scalar::Error(e) => return e.into(),
                        // Text inside a rectangle doesn't participate.
                        Scalar::Text(_) | Scalar::Empty => {}
                        other => {
                            acc = combine(acc, other.is_truthy());
                            saw_operand = true;
                        }
                    }
                }
            }
            _ => {
                let v = ev.eval_expr(arg);
                match v {
                    Scalar::Error(e) => return e.into(),
                    Scalar::Text(_) => {
                        return CalcError::new(CalcErrorKind::Value)
                            .with_message("expected a logical value")
                            .into();
                    }
                    Scalar::Empty => {}
                    other => {
                        acc = combine(acc, other.is_truthy());
                        saw_operand = true;
                    }
                }
            }
        }
    }
    if !saw_operand {
        return CalcError::new(CalcErrorKind::Value)
            .with_message("no logical operands")
            .into();
    }
    Scalar::Boolean(acc)
}

fn eval_not(ev: &mut Evaluator<'_>, args: &[Arc<Expr>]) -> Scalar {
    if args.len() != 1 {
        return CalcError::new(CalcErrorKind::Value)
            .with_message("NOT takes 1 argument")
            .into();
    }
    let v = ev.eval_expr(&args[0]);
    match v {
        Scalar::Error(_) => v,
        Scalar::Text(_) => CalcError::new(CalcErrorKind::Value)
            .with_message("expected a logical value")
            .into(),
        other => Scalar::Boolean(!other.is_truthy()),
    }
}
