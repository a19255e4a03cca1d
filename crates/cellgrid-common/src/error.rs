//! In-band error sentinels.
//!
//! Every recoverable failure in the engine becomes a scalar sentinel stored
//! in a cell; nothing fatal crosses a public operation boundary.
//!
//! - **`CalcErrorKind`** : the canonical sentinel codes
//! - **`CalcError`**     : kind plus an optional human explanation

use std::{error::Error, fmt};

use crate::Scalar;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// All recognised sentinel codes.
///
/// **Note:** names are CamelCase (idiomatic Rust) while `Display` renders
/// them as they appear in a cell (`#REF!`, `#CYCLE!`, …).
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum CalcErrorKind {
    /// Reference targets a retired identifier or an out-of-range position.
    Ref,
    /// Formula would close a dependency cycle.
    Cycle,
    /// Division by zero.
    Div0,
    /// Unknown function name.
    Name,
    /// Type coercion failure.
    Value,
    /// Numeric domain fault (e.g. `0^0`).
    Num,
}

impl fmt::Display for CalcErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Ref => "#REF!",
            Self::Cycle => "#CYCLE!",
            Self::Div0 => "#DIV0!",
            Self::Name => "#NAME!",
            Self::Value => "#VALUE!",
            Self::Num => "#NUM!",
        })
    }
}

impl CalcErrorKind {
    /// Parse a sentinel literal as it appears in formula text.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "#REF!" => Some(Self::Ref),
            "#CYCLE!" => Some(Self::Cycle),
            "#DIV0!" => Some(Self::Div0),
            "#NAME!" => Some(Self::Name),
            "#VALUE!" => Some(Self::Value),
            "#NUM!" => Some(Self::Num),
            _ => None,
        }
    }
}

/// The sentinel struct the engine passes around.
///
/// Combines the mandatory code with an optional human explanation. Build the
/// bare value with `CalcError::from(kind)` when no message is needed.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CalcError {
    pub kind: CalcErrorKind,
    pub message: Option<String>,
}

impl From<CalcErrorKind> for CalcError {
    fn from(kind: CalcErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }
}

impl CalcError {
    pub fn new(kind: CalcErrorKind) -> Self {
        kind.into()
    }

    /// Attach a human-readable explanation.
    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }
}

impl fmt::Display for CalcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl Error for CalcError {}

impl From<CalcError> for Scalar {
    fn from(error: CalcError) -> Self {
        Scalar::Error(error)
    }
}

impl From<CalcErrorKind> for Scalar {
    fn from(kind: CalcErrorKind) -> Self {
        Scalar::Error(CalcError::new(kind))
    }
}

impl PartialEq<str> for CalcError {
    fn eq(&self, other: &str) -> bool {
        self.kind.to_string() == other
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_rendering() {
        assert_eq!(CalcErrorKind::Ref.to_string(), "#REF!");
        assert_eq!(CalcErrorKind::Cycle.to_string(), "#CYCLE!");
        assert_eq!(CalcErrorKind::Div0.to_string(), "#DIV0!");
    }

    #[test]
    fn sentinel_parse_roundtrip() {
        for kind in [
            CalcErrorKind::Ref,
            CalcErrorKind::Cycle,
            CalcErrorKind::Div0,
            CalcErrorKind::Name,
            CalcErrorKind::Value,
            CalcErrorKind::Num,
        ] {
            assert_eq!(CalcErrorKind::parse(&kind.to_string()), Some(kind));
        }
        assert_eq!(CalcErrorKind::parse("#BOGUS!"), None);
    }

    #[test]
    fn message_is_appended() {
        let e = CalcError::new(CalcErrorKind::Name).with_message("no such function FROB");
        assert_eq!(e.to_string(), "#NAME!: no such function FROB");
    }
}
