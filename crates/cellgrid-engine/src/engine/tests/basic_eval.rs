//! Evaluation semantics: literals, operators, functions, error sentinels.

use super::common::*;
use cellgrid_common::{CalcErrorKind, Scalar};

#[test]
fn value_roundtrip() {
    let mut e = engine();
    e.set_value((1, 1), 42.0);
    assert_eq!(num(&mut e, 1, 1), 42.0);
    assert_eq!(e.get_source((1, 1)).as_deref(), Some("42"));
}

#[test]
fn unpopulated_reads_empty() {
    let mut e = engine();
    assert_eq!(e.get_value((3, 3)), Scalar::Empty);
    assert_eq!(e.get_source((3, 3)), None);
}

#[test]
fn out_of_range_write_is_noop() {
    let mut e = engine();
    e.set_value((1000, 1), 1.0);
    e.set_value((0, 0), 1.0);
    assert_eq!(e.cell_count(), 0);
}

#[test]
fn reference_reads_through() {
    let mut e = engine();
    e.set_value((1, 1), 10.0);
    e.set_formula((2, 1), "=A1");
    assert_eq!(num(&mut e, 2, 1), 10.0);
}

#[test]
fn reference_to_empty_reads_zero() {
    let mut e = engine();
    e.set_formula((1, 1), "=B9");
    assert_eq!(num(&mut e, 1, 1), 0.0);
}

#[test]
fn arithmetic_and_precedence() {
    let mut e = engine();
    e.set_value((1, 1), 2.0);
    e.set_formula((2, 1), "=1+A1*3");
    assert_eq!(num(&mut e, 2, 1), 7.0);
    e.set_formula((3, 1), "=(1+A1)*3");
    assert_eq!(num(&mut e, 3, 1), 9.0);
    e.set_formula((4, 1), "=-A1%");
    assert_eq!(num(&mut e, 4, 1), -0.02);
}

#[test]
fn division_by_zero() {
    let mut e = engine();
    e.set_formula((1, 1), "=1/0");
    assert_eq!(err_kind(&mut e, 1, 1), CalcErrorKind::Div0);
    // An empty cell is numerically zero.
    e.set_formula((2, 1), "=5/B9");
    assert_eq!(err_kind(&mut e, 2, 1), CalcErrorKind::Div0);
}

#[test]
fn zero_to_the_zero_is_num_error() {
    let mut e = engine();
    e.set_formula((1, 1), "=0^0");
    assert_eq!(err_kind(&mut e, 1, 1), CalcErrorKind::Num);
}

#[test]
fn unknown_function_is_name_error() {
    let mut e = engine();
    e.set_formula((1, 1), "=FROBNICATE(1)");
    assert_eq!(err_kind(&mut e, 1, 1), CalcErrorKind::Name);
}

#[test]
fn coercion_failure_is_value_error() {
    let mut e = engine();
    e.set_scalar((1, 1), Scalar::Text("abc".into()));
    e.set_formula((2, 1), "=A1+1");
    assert_eq!(err_kind(&mut e, 2, 1), CalcErrorKind::Value);
}

#[test]
fn parse_failure_stores_ref_error() {
    let mut e = engine();
    e.set_formula((1, 1), "=SUM(A1:A2");
    assert_eq!(err_kind(&mut e, 1, 1), CalcErrorKind::Ref);
    e.set_formula((2, 1), "A1");
    assert_eq!(err_kind(&mut e, 2, 1), CalcErrorKind::Ref);
}

#[test]
fn errors_propagate_first_seen_left_to_right() {
    let mut e = engine();
    e.set_formula((1, 1), "=1/0");
    e.set_formula((2, 1), "=FROBNICATE(1)");
    e.set_formula((3, 1), "=A1+A2");
    assert_eq!(err_kind(&mut e, 3, 1), CalcErrorKind::Div0);
    e.set_formula((4, 1), "=A2+A1");
    assert_eq!(err_kind(&mut e, 4, 1), CalcErrorKind::Name);
}

#[test]
fn sum_over_empty_rectangle_is_zero() {
    let mut e = engine();
    e.set_formula((5, 1), "=SUM(A1:A4)");
    assert_eq!(num(&mut e, 5, 1), 0.0);
}

#[test]
fn sum_skips_non_numeric_cells() {
    let mut e = engine();
    e.set_value((1, 1), 1.0);
    e.set_scalar((2, 1), Scalar::Text("x".into()));
    e.set_scalar((3, 1), Scalar::Boolean(true));
    e.set_value((4, 1), 2.5);
    e.set_formula((5, 1), "=SUM(A1:A4)");
    assert_eq!(num(&mut e, 5, 1), 3.5);
}

#[test]
fn aggregate_functions() {
    let mut e = engine();
    e.set_value((1, 1), 4.0);
    e.set_value((2, 1), 8.0);
    e.set_value((3, 1), 6.0);
    e.set_formula((1, 2), "=AVERAGE(A1:A3)");
    e.set_formula((2, 2), "=COUNT(A1:A4)");
    e.set_formula((3, 2), "=MAX(A1:A3)");
    e.set_formula((4, 2), "=MIN(A1:A3)");
    assert_eq!(num(&mut e, 1, 2), 6.0);
    assert_eq!(num(&mut e, 2, 2), 3.0);
    assert_eq!(num(&mut e, 3, 2), 8.0);
    assert_eq!(num(&mut e, 4, 2), 4.0);
}

#[test]
fn average_of_nothing_is_div0() {
    let mut e = engine();
    e.set_formula((1, 1), "=AVERAGE(B1:B5)");
    assert_eq!(err_kind(&mut e, 1, 1), CalcErrorKind::Div0);
}

#[test]
fn logic_functions() {
    let mut e = engine();
    e.set_value((1, 1), 5.0);
    e.set_formula((2, 1), "=IF(A1>3,A1*2,0)");
    assert_eq!(num(&mut e, 2, 1), 10.0);
    e.set_formula((3, 1), "=AND(A1>0,A1<10)");
    assert_eq!(e.get_value((3, 1)), Scalar::Boolean(true));
    e.set_formula((4, 1), "=OR(A1<0,NOT(A1=5))");
    assert_eq!(e.get_value((4, 1)), Scalar::Boolean(false));
}

#[test]
fn if_only_evaluates_taken_branch() {
    let mut e = engine();
    e.set_value((1, 1), 1.0);
    e.set_formula((2, 1), "=IF(A1>0,7,1/0)");
    assert_eq!(num(&mut e, 2, 1), 7.0);
}

#[test]
fn concat_and_comparison() {
    let mut e = engine();
    e.set_scalar((1, 1), Scalar::Text("a".into()));
    e.set_formula((2, 1), "=A1&\"b\"");
    assert_eq!(e.get_value((2, 1)), Scalar::Text("ab".into()));
    e.set_formula((3, 1), "=1<2");
    assert_eq!(e.get_value((3, 1)), Scalar::Boolean(true));
}

#[test]
fn formula_source_is_canonical() {
    let mut e = engine();
    e.set_formula((2, 2), "=sum(a1:a4)+$a$9");
    assert_eq!(e.get_source((2, 2)).as_deref(), Some("=SUM(A1:A4)+$A$9"));
}

#[test]
fn cached_value_matches_fresh_evaluation() {
    let mut e = engine();
    e.set_value((1, 1), 3.0);
    e.set_value((2, 1), 4.0);
    e.set_formula((3, 1), "=SUM(A1:A2)*2");
    let cached = e.get_value((3, 1));
    // Re-installing the identical formula forces a from-scratch evaluation.
    e.set_formula((3, 1), "=SUM(A1:A2)*2");
    assert_eq!(e.get_value((3, 1)), cached);
}
