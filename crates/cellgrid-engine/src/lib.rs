//! Evaluation core of a sparse spreadsheet engine.
//!
//! The sheet's logical extent may reach ~10^6 rows × 1.6·10^4 columns while
//! memory stays proportional to the number of populated cells. Positions are
//! what the user sees; identity lives in stable per-axis identifiers, and
//! formulas reference cells through position-independent anchors that the
//! splice engine rewrites across row/column insertion and deletion.

pub mod anchor;
pub mod axis;
pub mod engine;
pub mod graph;
pub mod store;
pub mod watchers;

pub use anchor::{Anchor, AxisMode, Expr, RangeRef};
pub use axis::{AxisId, AxisIndex, ColId, RowId};
pub use engine::{EditError, Engine, EngineConfig, Splice, SpliceSummary};
pub use graph::DepGraph;
pub use store::{Cell, CellKey, CellStore};
pub use watchers::RangeWatchers;

pub use cellgrid_common::{Axis, CalcError, CalcErrorKind, Pos, Scalar};
