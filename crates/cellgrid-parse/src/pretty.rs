//! Canonical rendering of the position-form AST back to formula text.
//!
//! `parse(render_formula(ast))` reproduces the AST exactly: parentheses are
//! emitted only where precedence demands them, references render uppercase
//! with their `$` markers, and numbers use the shortest round-trip form.

use crate::parser::{Ast, BinaryOp, CellRef, RangeExpr, UnaryOp};
use cellgrid_common::{Scalar, column_to_letters};
use once_cell::sync::Lazy;
use std::fmt::Write;

// Precomputed letters for the common columns (A-ZZ = 702 columns).
static COLUMN_LOOKUP: Lazy<Vec<String>> = Lazy::new(|| {
    (1..=702u32).map(column_to_letters).collect()
});

fn column_letters(col: u32) -> String {
    COLUMN_LOOKUP
        .get(col as usize - 1)
        .cloned()
        .unwrap_or_else(|| column_to_letters(col))
}

/// Render a full formula, `=` prefix included.
pub fn render_formula(ast: &Ast) -> String {
    let mut out = String::from("=");
    render_expr(ast, 0, &mut out);
    out
}

fn render_expr(ast: &Ast, min_precedence: u8, out: &mut String) {
    match ast {
        Ast::Literal(v) => render_literal(v, out),
        Ast::Reference(cell) => render_cell_ref(cell, out),
        Ast::Range(range) => render_range(range, out),
        Ast::UnaryOp { op, expr } => match op {
            UnaryOp::Percent => {
                render_expr(expr, u8::MAX, out);
                out.push('%');
            }
            _ => {
                out.push_str(op.symbol());
                render_expr(expr, u8::MAX, out);
            }
        },
        Ast::BinaryOp { op, lhs, rhs } => {
            let prec = op.precedence();
            let parens = prec < min_precedence;
            if parens {
                out.push('(');
            }
            render_expr(lhs, prec, out);
            out.push_str(op.symbol());
            // Left associativity: a right child at equal precedence needs
            // parentheses to survive a round-trip (1-(2-3)).
            render_expr(rhs, prec + 1, out);
            if parens {
                out.push(')');
            }
        }
        Ast::Function { name, args } => {
            out.push_str(name);
            out.push('(');
            for (i, arg) in args.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                render_expr(arg, 0, out);
            }
            out.push(')');
        }
    }
}

fn render_literal(v: &Scalar, out: &mut String) {
    match v {
        Scalar::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Scalar::Boolean(b) => out.push_str(if *b { "TRUE" } else { "FALSE" }),
        Scalar::Text(s) => {
            out.push('"');
            out.push_str(&s.replace('"', "\"\""));
            out.push('"');
        }
        Scalar::Empty => {}
        Scalar::Error(e) => {
            let _ = write!(out, "{}", e.kind);
        }
    }
}

fn render_cell_ref(cell: &CellRef, out: &mut String) {
    if cell.col_abs {
        out.push('$');
    }
    out.push_str(&column_letters(cell.col));
    if cell.row_abs {
        out.push('$');
    }
    let _ = write!(out, "{}", cell.row);
}

fn render_range(range: &RangeExpr, out: &mut String) {
    render_cell_ref(&range.start, out);
    out.push(':');
    render_cell_ref(&range.end, out);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    fn roundtrip(text: &str) {
        let ast = parse(text).unwrap();
        assert_eq!(render_formula(&ast), text);
        assert_eq!(parse(&render_formula(&ast)).unwrap(), ast);
    }

    #[test]
    fn renders_references() {
        roundtrip("=A1");
        roundtrip("=$A$1");
        roundtrip("=A$1");
        roundtrip("=$AA17");
    }

    #[test]
    fn renders_ranges_and_functions() {
        roundtrip("=SUM(A1:A4)");
        roundtrip("=IF(A1>0,SUM(B1:B2),MIN(1,2))");
    }

    #[test]
    fn minimal_parentheses() {
        roundtrip("=1+2*3");
        roundtrip("=(1+2)*3");
        roundtrip("=1-(2-3)");
        roundtrip("=-A1%");
    }

    #[test]
    fn string_escaping_roundtrips() {
        roundtrip("=\"he said \"\"hi\"\"\"&A1");
    }

    #[test]
    fn ast_reparse_equivalence() {
        // The round-trip law: parse(render(ast)) == ast for arbitrary input
        // spellings (extra parens, lowercase refs collapse to canonical).
        let ast = parse("=((a1))+SUM($b2:B9)").unwrap();
        let canon = render_formula(&ast);
        assert_eq!(canon, "=A1+SUM($B2:B9)");
        assert_eq!(parse(&canon).unwrap(), ast);
    }
}
