//! Meta crate that re-exports the cellgrid building blocks with sensible
//! defaults. Downstream users can depend on this crate and opt into specific
//! layers via feature flags while keeping access to the underlying crates
//! when deeper integration is required.

#[cfg(feature = "common")]
pub use cellgrid_common as common;

#[cfg(feature = "parse")]
pub use cellgrid_parse as parse;

#[cfg(feature = "engine")]
pub use cellgrid_engine as engine;

#[cfg(feature = "common")]
pub use cellgrid_common::{Axis, CalcError, CalcErrorKind, Pos, Scalar};

#[cfg(feature = "engine")]
pub use cellgrid_engine::{EditError, Engine, EngineConfig, Splice, SpliceSummary};
