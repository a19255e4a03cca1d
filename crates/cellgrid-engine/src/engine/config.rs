//! Engine configuration.

use cellgrid_common::{MAX_COLS, MAX_ROWS};

/// Tuning knobs for a sheet's evaluation engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard capacity bounds. Structural inserts clamp against these.
    pub max_rows: u32,
    pub max_cols: u32,

    /// Rectangles with at most this many addresses are expanded into
    /// per-address dependency edges and per-cell watch entries. Larger
    /// rectangles get edges for populated addresses only and are observed
    /// through the coarse watcher channel, keeping memory proportional to
    /// populated cells.
    pub range_expansion_limit: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_rows: MAX_ROWS,
            max_cols: MAX_COLS,
            range_expansion_limit: 64,
        }
    }
}

impl EngineConfig {
    #[inline]
    pub fn with_range_expansion_limit(mut self, limit: u32) -> Self {
        self.range_expansion_limit = limit;
        self
    }

    #[inline]
    pub fn with_capacity(mut self, max_rows: u32, max_cols: u32) -> Self {
        self.max_rows = max_rows.min(MAX_ROWS);
        self.max_cols = max_cols.min(MAX_COLS);
        self
    }
}
