use std::fmt::{self, Display};
use std::hash::{Hash, Hasher};

use crate::{CalcError, CalcErrorKind};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A scalar as stored in a cell or produced by evaluation.
///
/// This is distinct from the formula AST: evaluation always reduces to one
/// of these, and arithmetic short-circuits on the `Error` variant.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(f64),
    Boolean(bool),
    Text(String),
    /// Unpopulated address. Contributes 0 to arithmetic, skipped by
    /// aggregation counts, blank when displayed.
    Empty,
    Error(CalcError),
}

impl Hash for Scalar {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Scalar::Number(n) => n.to_bits().hash(state),
            Scalar::Boolean(b) => b.hash(state),
            Scalar::Text(s) => s.hash(state),
            Scalar::Empty => state.write_u8(0),
            Scalar::Error(e) => e.hash(state),
        }
    }
}

impl Eq for Scalar {}

impl Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Number(n) => write!(f, "{n}"),
            Scalar::Boolean(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Scalar::Text(s) => write!(f, "{s}"),
            Scalar::Empty => write!(f, ""),
            Scalar::Error(e) => write!(f, "{}", e.kind),
        }
    }
}

impl From<f64> for Scalar {
    fn from(n: f64) -> Self {
        Scalar::Number(n)
    }
}

impl From<bool> for Scalar {
    fn from(b: bool) -> Self {
        Scalar::Boolean(b)
    }
}

impl From<&str> for Scalar {
    fn from(s: &str) -> Self {
        Scalar::Text(s.to_string())
    }
}

impl Scalar {
    pub fn is_error(&self) -> bool {
        matches!(self, Scalar::Error(_))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Scalar::Empty)
    }

    /// The error inside, if any. Evaluation uses this to short-circuit.
    pub fn as_error(&self) -> Option<&CalcError> {
        match self {
            Scalar::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Numeric view used by arithmetic: numbers pass through, booleans count
    /// as 0/1, empties as 0. Text and errors do not coerce.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Scalar::Number(n) => Some(*n),
            Scalar::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            Scalar::Empty => Some(0.0),
            _ => None,
        }
    }

    /// Numeric coercion for operator evaluation. Failure is the `#VALUE!`
    /// sentinel rather than a Rust error.
    pub fn coerce_number(&self) -> Result<f64, CalcError> {
        self.as_number().ok_or_else(|| {
            CalcError::new(CalcErrorKind::Value).with_message("expected a number")
        })
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Scalar::Number(n) => *n != 0.0,
            Scalar::Boolean(b) => *b,
            Scalar::Text(s) => !s.is_empty(),
            Scalar::Empty => false,
            Scalar::Error(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_coerces_to_zero() {
        assert_eq!(Scalar::Empty.as_number(), Some(0.0));
        assert_eq!(Scalar::Boolean(true).as_number(), Some(1.0));
        assert_eq!(Scalar::Text("x".into()).as_number(), None);
    }

    #[test]
    fn coercion_failure_is_value_error() {
        let err = Scalar::Text("abc".into()).coerce_number().unwrap_err();
        assert_eq!(err.kind, CalcErrorKind::Value);
    }

    #[test]
    fn display_forms() {
        assert_eq!(Scalar::Number(1.5).to_string(), "1.5");
        assert_eq!(Scalar::Boolean(true).to_string(), "TRUE");
        assert_eq!(Scalar::Empty.to_string(), "");
        assert_eq!(
            Scalar::Error(CalcError::new(CalcErrorKind::Ref)).to_string(),
            "#REF!"
        );
    }
}
