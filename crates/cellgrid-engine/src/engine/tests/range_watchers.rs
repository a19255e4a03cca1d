//! Writes into observed rectangles invalidate the observing formulas, with
//! or without a pre-existing dependency edge.

use super::common::*;
use cellgrid_common::Scalar;

#[test]
fn populating_an_empty_in_range_cell_invalidates_sum() {
    let mut e = engine();
    e.set_formula((5, 1), "=SUM(A1:A4)");
    assert_eq!(num(&mut e, 5, 1), 0.0);
    e.set_value((2, 1), 7.0);
    assert_eq!(num(&mut e, 5, 1), 7.0);
}

#[test]
fn coarse_channel_covers_rectangles_past_the_expansion_limit() {
    // Limit of two addresses forces SUM(A1:A4) onto the coarse channel.
    let mut e = engine_with_limit(2);
    e.set_formula((5, 1), "=SUM(A1:A4)");
    assert_eq!(num(&mut e, 5, 1), 0.0);

    // No per-address edges were materialised for the empty rectangle.
    let f = key_at(&e, 5, 1);
    assert!(e.graph().dependencies_of(f).is_empty());

    e.set_value((2, 1), 7.0);
    assert_eq!(num(&mut e, 5, 1), 7.0);
    // The populated address is now a real producer.
    let a2 = key_at(&e, 2, 1);
    assert!(e.graph().has_edge(a2, f));

    e.set_value((3, 1), 5.0);
    assert_eq!(num(&mut e, 5, 1), 12.0);
}

#[test]
fn writes_outside_the_rectangle_do_not_invalidate() {
    let mut e = engine_with_limit(2);
    e.set_formula((5, 1), "=SUM(A1:A4)");
    e.set_value((9, 9), 1.0);
    assert_eq!(num(&mut e, 5, 1), 0.0);
}

#[test]
fn retiring_a_formula_drops_its_watches() {
    let mut e = engine();
    e.set_formula((5, 1), "=SUM(A1:A4)");
    e.set_value((5, 1), 0.0); // overwrite the observer with a literal
    assert!(e.watchers().is_empty());
    // Writing in the old rectangle leaves the literal untouched.
    e.set_value((1, 1), 3.0);
    assert_eq!(num(&mut e, 5, 1), 0.0);
}

#[test]
fn formula_write_inside_rectangle_invalidates_observer() {
    let mut e = engine();
    e.set_value((1, 1), 4.0);
    e.set_formula((5, 1), "=SUM(A1:A4)");
    assert_eq!(num(&mut e, 5, 1), 4.0);
    e.set_formula((2, 1), "=A1*10");
    assert_eq!(num(&mut e, 5, 1), 44.0);
    // And transitively through the new formula's own producer.
    e.set_value((1, 1), 5.0);
    assert_eq!(num(&mut e, 5, 1), 55.0);
}

#[test]
fn clearing_an_observed_cell_shrinks_the_sum() {
    let mut e = engine();
    e.set_value((1, 1), 4.0);
    e.set_value((2, 1), 6.0);
    e.set_formula((5, 1), "=SUM(A1:A4)");
    assert_eq!(num(&mut e, 5, 1), 10.0);
    e.clear_cell((2, 1));
    assert_eq!(num(&mut e, 5, 1), 4.0);
}

#[test]
fn two_observers_of_one_rectangle() {
    let mut e = engine();
    e.set_formula((5, 1), "=SUM(A1:A4)");
    e.set_formula((6, 1), "=COUNT(A1:A4)");
    e.set_value((1, 1), 1.0);
    e.set_scalar((2, 1), Scalar::Text("noise".into()));
    assert_eq!(num(&mut e, 5, 1), 1.0);
    assert_eq!(num(&mut e, 6, 1), 1.0);
}
