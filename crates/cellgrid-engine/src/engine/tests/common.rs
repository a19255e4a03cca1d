use crate::engine::{Engine, EngineConfig};
use crate::store::CellKey;
use cellgrid_common::Scalar;

/// Route engine debug/trace events into the test harness. Safe to call from
/// every test; only the first registration wins.
fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

pub fn engine() -> Engine {
    init_tracing();
    Engine::new(100, 26)
}

pub fn engine_with_limit(limit: u32) -> Engine {
    init_tracing();
    Engine::with_config(
        100,
        26,
        EngineConfig::default().with_range_expansion_limit(limit),
    )
}

pub fn num(engine: &mut Engine, row: u32, col: u32) -> f64 {
    match engine.get_value((row, col)) {
        Scalar::Number(n) => n,
        other => panic!("expected a number at ({row},{col}), got {other:?}"),
    }
}

pub fn err_kind(engine: &mut Engine, row: u32, col: u32) -> cellgrid_common::CalcErrorKind {
    match engine.get_value((row, col)) {
        Scalar::Error(e) => e.kind,
        other => panic!("expected an error at ({row},{col}), got {other:?}"),
    }
}

pub fn key_at(engine: &Engine, row: u32, col: u32) -> CellKey {
    CellKey::new(
        engine.rows().pos_to_id(row).expect("live row"),
        engine.cols().pos_to_id(col).expect("live col"),
    )
}
