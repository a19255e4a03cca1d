use crate::tokenizer::{Associativity, Token, TokenSubType, TokenType, Tokenizer, TokenizerError};
use cellgrid_common::{CalcError, CalcErrorKind, Scalar, letters_to_column};
use std::error::Error;
use std::fmt::{self, Display};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A custom error type for the parser.
#[derive(Debug)]
pub struct ParserError {
    pub message: String,
    pub position: Option<usize>,
}

impl Display for ParserError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pos) = self.position {
            write!(f, "ParserError at token {}: {}", pos, self.message)
        } else {
            write!(f, "ParserError: {}", self.message)
        }
    }
}

impl Error for ParserError {}

impl From<TokenizerError> for ParserError {
    fn from(e: TokenizerError) -> Self {
        ParserError {
            message: e.message,
            position: Some(e.pos),
        }
    }
}

/// A cell reference as written: an absolute 1-based position plus the
/// per-axis `$` markers. The engine rebinds these to anchors relative to the
/// formula's own cell.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub row: u32,
    pub col: u32,
    pub row_abs: bool,
    pub col_abs: bool,
}

impl CellRef {
    pub fn new(row: u32, col: u32) -> Self {
        Self {
            row,
            col,
            row_abs: false,
            col_abs: false,
        }
    }

    pub fn with_abs(mut self, row_abs: bool, col_abs: bool) -> Self {
        self.row_abs = row_abs;
        self.col_abs = col_abs;
        self
    }
}

/// A rectangular reference `start:end`, both corners as written.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RangeExpr {
    pub start: CellRef,
    pub end: CellRef,
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Neg,
    Percent,
}

impl UnaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Neg => "-",
            UnaryOp::Percent => "%",
        }
    }
}

#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Concat,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl BinaryOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Concat => "&",
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
        }
    }

    /// Binding power, mirroring the tokenizer's infix table.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Eq
            | BinaryOp::Ne
            | BinaryOp::Lt
            | BinaryOp::Le
            | BinaryOp::Gt
            | BinaryOp::Ge => 1,
            BinaryOp::Concat => 2,
            BinaryOp::Add | BinaryOp::Sub => 3,
            BinaryOp::Mul | BinaryOp::Div => 4,
            BinaryOp::Pow => 5,
        }
    }

    fn from_symbol(s: &str) -> Option<Self> {
        Some(match s {
            "+" => BinaryOp::Add,
            "-" => BinaryOp::Sub,
            "*" => BinaryOp::Mul,
            "/" => BinaryOp::Div,
            "^" => BinaryOp::Pow,
            "&" => BinaryOp::Concat,
            "=" => BinaryOp::Eq,
            "<>" => BinaryOp::Ne,
            "<" => BinaryOp::Lt,
            "<=" => BinaryOp::Le,
            ">" => BinaryOp::Gt,
            ">=" => BinaryOp::Ge,
            _ => return None,
        })
    }
}

/// Position-form formula AST.
///
/// `Range` is only meaningful as a function argument; the evaluator rejects
/// it in scalar position.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Ast {
    Literal(Scalar),
    Reference(CellRef),
    Range(RangeExpr),
    UnaryOp { op: UnaryOp, expr: Box<Ast> },
    BinaryOp { op: BinaryOp, lhs: Box<Ast>, rhs: Box<Ast> },
    Function { name: String, args: Vec<Ast> },
}

/// Parse formula text. The leading `=` is required; everything after it is
/// the expression grammar.
pub fn parse(text: &str) -> Result<Ast, ParserError> {
    let body = text.strip_prefix('=').ok_or_else(|| ParserError {
        message: "formula must start with '='".to_string(),
        position: None,
    })?;
    let tokens = Tokenizer::new(body).tokenize()?;
    Parser::new(tokens).parse()
}

pub struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            position: 0,
        }
    }

    pub fn parse(&mut self) -> Result<Ast, ParserError> {
        if self.tokens.is_empty() {
            return Err(ParserError {
                message: "empty formula".to_string(),
                position: None,
            });
        }
        let ast = self.parse_expression()?;
        if self.position < self.tokens.len() {
            return Err(ParserError {
                message: format!("unexpected token {:?}", self.tokens[self.position].value),
                position: Some(self.position),
            });
        }
        Ok(ast)
    }

    fn parse_expression(&mut self) -> Result<Ast, ParserError> {
        self.parse_binary_op(0)
    }

    fn parse_binary_op(&mut self, min_precedence: u8) -> Result<Ast, ParserError> {
        let mut left = self.parse_unary_op()?;

        while self.position < self.tokens.len() {
            let token = &self.tokens[self.position];
            if token.token_type != TokenType::OpInfix {
                break;
            }
            let Some((precedence, associativity)) = token.get_precedence() else {
                break;
            };
            if precedence < min_precedence {
                break;
            }
            let op = BinaryOp::from_symbol(&token.value).ok_or_else(|| ParserError {
                message: format!("unknown operator '{}'", token.value),
                position: Some(self.position),
            })?;
            self.position += 1;

            let next_min_precedence = if associativity == Associativity::Left {
                precedence + 1
            } else {
                precedence
            };
            let right = self.parse_binary_op(next_min_precedence)?;
            left = Ast::BinaryOp {
                op,
                lhs: Box::new(left),
                rhs: Box::new(right),
            };
        }

        Ok(left)
    }

    fn parse_unary_op(&mut self) -> Result<Ast, ParserError> {
        if self.position < self.tokens.len()
            && self.tokens[self.position].token_type == TokenType::OpPrefix
        {
            let op = if self.tokens[self.position].value == "-" {
                UnaryOp::Neg
            } else {
                UnaryOp::Plus
            };
            self.position += 1;
            let expr = self.parse_unary_op()?;
            return Ok(Ast::UnaryOp {
                op,
                expr: Box::new(expr),
            });
        }
        self.parse_postfix_op()
    }

    fn parse_postfix_op(&mut self) -> Result<Ast, ParserError> {
        let mut expr = self.parse_primary()?;
        while self.position < self.tokens.len()
            && self.tokens[self.position].token_type == TokenType::OpPostfix
        {
            self.position += 1;
            expr = Ast::UnaryOp {
                op: UnaryOp::Percent,
                expr: Box::new(expr),
            };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Ast, ParserError> {
        let Some(token) = self.tokens.get(self.position).cloned() else {
            return Err(ParserError {
                message: "unexpected end of formula".to_string(),
                position: Some(self.position),
            });
        };

        match token.token_type {
            TokenType::Operand => {
                self.position += 1;
                self.parse_operand(token)
            }
            TokenType::Func => {
                self.position += 1;
                self.parse_function(token)
            }
            TokenType::Paren if token.subtype == TokenSubType::Open => {
                self.position += 1;
                let expr = self.parse_expression()?;
                self.expect_close_paren()?;
                Ok(expr)
            }
            _ => Err(ParserError {
                message: format!("unexpected token '{}'", token.value),
                position: Some(self.position),
            }),
        }
    }

    fn parse_operand(&mut self, token: Token) -> Result<Ast, ParserError> {
        match token.subtype {
            TokenSubType::Number => {
                let value = token.value.parse::<f64>().map_err(|_| ParserError {
                    message: format!("invalid number '{}'", token.value),
                    position: Some(self.position),
                })?;
                Ok(Ast::Literal(Scalar::Number(value)))
            }
            TokenSubType::Text => Ok(Ast::Literal(Scalar::Text(token.value))),
            TokenSubType::Logical => Ok(Ast::Literal(Scalar::Boolean(token.value == "TRUE"))),
            TokenSubType::Error => {
                let kind = CalcErrorKind::parse(&token.value).ok_or_else(|| ParserError {
                    message: format!("unknown error literal '{}'", token.value),
                    position: Some(self.position),
                })?;
                Ok(Ast::Literal(Scalar::Error(CalcError::new(kind))))
            }
            TokenSubType::Reference => {
                let cell = parse_cell_ref(&token.value).ok_or_else(|| ParserError {
                    message: format!("invalid reference '{}'", token.value),
                    position: Some(self.position),
                })?;
                Ok(Ast::Reference(cell))
            }
            TokenSubType::Range => {
                let (start_text, end_text) =
                    token.value.split_once(':').ok_or_else(|| ParserError {
                        message: format!("invalid range '{}'", token.value),
                        position: Some(self.position),
                    })?;
                let start = parse_cell_ref(start_text).ok_or_else(|| ParserError {
                    message: format!("invalid range start '{start_text}'"),
                    position: Some(self.position),
                })?;
                let end = parse_cell_ref(end_text).ok_or_else(|| ParserError {
                    message: format!("invalid range end '{end_text}'"),
                    position: Some(self.position),
                })?;
                Ok(Ast::Range(RangeExpr { start, end }))
            }
            _ => Err(ParserError {
                message: format!("unexpected operand '{}'", token.value),
                position: Some(self.position),
            }),
        }
    }

    fn parse_function(&mut self, token: Token) -> Result<Ast, ParserError> {
        // The tokenizer guarantees an argument list follows.
        let open = self.tokens.get(self.position);
        if open.map(|t| t.subtype) != Some(TokenSubType::Open) {
            return Err(ParserError {
                message: format!("expected '(' after {}", token.value),
                position: Some(self.position),
            });
        }
        self.position += 1;

        let mut args = Vec::new();
        if self.tokens.get(self.position).map(|t| t.subtype) == Some(TokenSubType::Close) {
            self.position += 1;
            return Ok(Ast::Function {
                name: token.value,
                args,
            });
        }
        loop {
            args.push(self.parse_expression()?);
            match self.tokens.get(self.position) {
                Some(t) if t.token_type == TokenType::Sep => {
                    self.position += 1;
                }
                Some(t) if t.subtype == TokenSubType::Close => {
                    self.position += 1;
                    break;
                }
                _ => {
                    return Err(ParserError {
                        message: "expected ',' or ')' in argument list".to_string(),
                        position: Some(self.position),
                    });
                }
            }
        }
        Ok(Ast::Function {
            name: token.value,
            args,
        })
    }

    fn expect_close_paren(&mut self) -> Result<(), ParserError> {
        match self.tokens.get(self.position) {
            Some(t) if t.token_type == TokenType::Paren && t.subtype == TokenSubType::Close => {
                self.position += 1;
                Ok(())
            }
            _ => Err(ParserError {
                message: "expected closing parenthesis".to_string(),
                position: Some(self.position),
            }),
        }
    }
}

/// Parse one `[$]letters[$]digits` reference body into a `CellRef`.
/// Lowercase column letters are accepted and canonicalised to uppercase.
fn parse_cell_ref(text: &str) -> Option<CellRef> {
    let bytes = text.as_bytes();
    let mut i = 0;
    let col_abs = bytes.first() == Some(&b'$');
    if col_abs {
        i += 1;
    }
    let letters_start = i;
    while bytes.get(i).is_some_and(|c| c.is_ascii_alphabetic()) {
        i += 1;
    }
    let letters: String = text[letters_start..i].to_ascii_uppercase();
    let col = letters_to_column(&letters)?;
    let row_abs = bytes.get(i) == Some(&b'$');
    if row_abs {
        i += 1;
    }
    let row: u32 = text[i..].parse().ok()?;
    if row == 0 {
        return None;
    }
    Some(CellRef::new(row, col).with_abs(row_abs, col_abs))
}
