pub mod parser;
pub mod pretty;
pub mod tokenizer;

pub use parser::{Ast, BinaryOp, CellRef, ParserError, RangeExpr, UnaryOp, parse};
pub use pretty::render_formula;
pub use tokenizer::{Token, TokenSubType, TokenType, Tokenizer, TokenizerError};

// Re-export common types
pub use cellgrid_common::{CalcError, CalcErrorKind, Scalar};
