use std::error::Error;
use std::fmt::{self, Display};

use cellgrid_common::CalcErrorKind;

/// Represents operator associativity.
#[derive(Debug, PartialEq, Eq)]
pub enum Associativity {
    Left,
    Right,
}

/// A custom error type for the tokenizer.
#[derive(Debug)]
pub struct TokenizerError {
    pub message: String,
    pub pos: usize,
}

impl fmt::Display for TokenizerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenizerError at {}: {}", self.pos, self.message)
    }
}

impl Error for TokenizerError {}

/// The type of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenType {
    Operand,
    Func,
    Paren,
    Sep,
    OpPrefix,
    OpInfix,
    OpPostfix,
}

/// The subtype of a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenSubType {
    None,
    Number,
    Text,
    Logical,
    Error,
    Reference,
    Range,
    Open,
    Close,
}

/// A token in a formula.
#[derive(Debug, Clone, PartialEq, Hash)]
pub struct Token {
    pub value: String,
    pub token_type: TokenType,
    pub subtype: TokenSubType,
}

impl Token {
    pub fn new(value: impl Into<String>, token_type: TokenType, subtype: TokenSubType) -> Self {
        Self {
            value: value.into(),
            token_type,
            subtype,
        }
    }

    /// Binding power for infix operators. Higher binds tighter.
    pub fn get_precedence(&self) -> Option<(u8, Associativity)> {
        if self.token_type != TokenType::OpInfix {
            return None;
        }
        match self.value.as_str() {
            "=" | "<>" | "<" | "<=" | ">" | ">=" => Some((1, Associativity::Left)),
            "&" => Some((2, Associativity::Left)),
            "+" | "-" => Some((3, Associativity::Left)),
            "*" | "/" => Some((4, Associativity::Left)),
            "^" => Some((5, Associativity::Left)),
            _ => None,
        }
    }
}

/// Scans formula body text (the part after the leading `=`) into tokens.
///
/// References are recognised here, including the `$` absolute markers and the
/// `ref:ref` range form, so the parser only sees whole operands.
pub struct Tokenizer<'a> {
    input: &'a [u8],
    pos: usize,
    tokens: Vec<Token>,
}

impl<'a> Tokenizer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input: input.as_bytes(),
            pos: 0,
            tokens: Vec::new(),
        }
    }

    pub fn tokenize(mut self) -> Result<Vec<Token>, TokenizerError> {
        while let Some(&c) = self.input.get(self.pos) {
            match c {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.pos += 1;
                }
                b'0'..=b'9' | b'.' => self.scan_number()?,
                b'"' => self.scan_string()?,
                b'#' => self.scan_error_literal()?,
                b'$' | b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.scan_word()?,
                b'(' => self.push_simple("(", TokenType::Paren, TokenSubType::Open),
                b')' => self.push_simple(")", TokenType::Paren, TokenSubType::Close),
                b',' => self.push_simple(",", TokenType::Sep, TokenSubType::None),
                b'+' | b'-' => {
                    // Prefix when at the start or after an operator/open paren/sep.
                    let prefix = match self.tokens.last() {
                        None => true,
                        Some(t) => matches!(
                            t.token_type,
                            TokenType::OpInfix | TokenType::OpPrefix | TokenType::Sep
                        ) || t.subtype == TokenSubType::Open,
                    };
                    let ty = if prefix {
                        TokenType::OpPrefix
                    } else {
                        TokenType::OpInfix
                    };
                    let s = if c == b'+' { "+" } else { "-" };
                    self.push_simple(s, ty, TokenSubType::None);
                }
                b'*' => self.push_simple("*", TokenType::OpInfix, TokenSubType::None),
                b'/' => self.push_simple("/", TokenType::OpInfix, TokenSubType::None),
                b'^' => self.push_simple("^", TokenType::OpInfix, TokenSubType::None),
                b'&' => self.push_simple("&", TokenType::OpInfix, TokenSubType::None),
                b'%' => self.push_simple("%", TokenType::OpPostfix, TokenSubType::None),
                b'=' => self.push_simple("=", TokenType::OpInfix, TokenSubType::None),
                b'<' => {
                    if self.input.get(self.pos + 1) == Some(&b'>') {
                        self.push_wide("<>", TokenType::OpInfix);
                    } else if self.input.get(self.pos + 1) == Some(&b'=') {
                        self.push_wide("<=", TokenType::OpInfix);
                    } else {
                        self.push_simple("<", TokenType::OpInfix, TokenSubType::None);
                    }
                }
                b'>' => {
                    if self.input.get(self.pos + 1) == Some(&b'=') {
                        self.push_wide(">=", TokenType::OpInfix);
                    } else {
                        self.push_simple(">", TokenType::OpInfix, TokenSubType::None);
                    }
                }
                _ => {
                    return Err(TokenizerError {
                        message: format!("unexpected character '{}'", c as char),
                        pos: self.pos,
                    });
                }
            }
        }
        Ok(self.tokens)
    }

    fn push_simple(&mut self, value: &str, token_type: TokenType, subtype: TokenSubType) {
        self.tokens.push(Token::new(value, token_type, subtype));
        self.pos += 1;
    }

    fn push_wide(&mut self, value: &str, token_type: TokenType) {
        self.tokens
            .push(Token::new(value, token_type, TokenSubType::None));
        self.pos += value.len();
    }

    fn scan_number(&mut self) -> Result<(), TokenizerError> {
        let start = self.pos;
        let mut seen_dot = false;
        let mut seen_exp = false;
        while let Some(&c) = self.input.get(self.pos) {
            match c {
                b'0'..=b'9' => self.pos += 1,
                b'.' if !seen_dot && !seen_exp => {
                    seen_dot = true;
                    self.pos += 1;
                }
                b'e' | b'E' if !seen_exp => {
                    // Exponent marker only if followed by a digit or sign+digit.
                    let next = self.input.get(self.pos + 1);
                    let next2 = self.input.get(self.pos + 2);
                    let digit = |b: Option<&u8>| b.is_some_and(|b| b.is_ascii_digit());
                    if digit(next) || (matches!(next, Some(b'+') | Some(b'-')) && digit(next2)) {
                        seen_exp = true;
                        self.pos += 2; // marker plus digit or sign
                    } else {
                        break;
                    }
                }
                _ => break,
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap();
        if text == "." {
            return Err(TokenizerError {
                message: "invalid number".to_string(),
                pos: start,
            });
        }
        self.tokens
            .push(Token::new(text, TokenType::Operand, TokenSubType::Number));
        Ok(())
    }

    fn scan_string(&mut self) -> Result<(), TokenizerError> {
        let start = self.pos;
        self.pos += 1; // opening quote
        let mut bytes = Vec::new();
        loop {
            match self.input.get(self.pos) {
                Some(b'"') => {
                    // Doubled quote is an escaped quote.
                    if self.input.get(self.pos + 1) == Some(&b'"') {
                        bytes.push(b'"');
                        self.pos += 2;
                    } else {
                        self.pos += 1;
                        break;
                    }
                }
                Some(&c) => {
                    bytes.push(c);
                    self.pos += 1;
                }
                None => {
                    return Err(TokenizerError {
                        message: "unterminated string literal".to_string(),
                        pos: start,
                    });
                }
            }
        }
        // The input came in as &str, so the collected bytes are valid UTF-8.
        let text = String::from_utf8(bytes).map_err(|_| TokenizerError {
            message: "invalid string literal".to_string(),
            pos: start,
        })?;
        self.tokens
            .push(Token::new(text, TokenType::Operand, TokenSubType::Text));
        Ok(())
    }

    fn scan_error_literal(&mut self) -> Result<(), TokenizerError> {
        let start = self.pos;
        self.pos += 1;
        while let Some(&c) = self.input.get(self.pos) {
            if c.is_ascii_alphanumeric() {
                self.pos += 1;
            } else if c == b'!' {
                self.pos += 1;
                break;
            } else {
                break;
            }
        }
        let text = std::str::from_utf8(&self.input[start..self.pos]).unwrap();
        if CalcErrorKind::parse(text).is_none() {
            return Err(TokenizerError {
                message: format!("unknown error literal '{text}'"),
                pos: start,
            });
        }
        self.tokens
            .push(Token::new(text, TokenType::Operand, TokenSubType::Error));
        Ok(())
    }

    /// Scan a `$`-prefixed or bare word: a cell reference, a range, a
    /// boolean, or a function name (when followed by `(`).
    fn scan_word(&mut self) -> Result<(), TokenizerError> {
        let start = self.pos;
        if let Some(end) = self.try_reference(self.pos) {
            let first = std::str::from_utf8(&self.input[start..end]).unwrap();
            // `ref:ref` merges into one range token.
            if self.input.get(end) == Some(&b':') {
                if let Some(end2) = self.try_reference(end + 1) {
                    let text = std::str::from_utf8(&self.input[start..end2]).unwrap();
                    self.tokens
                        .push(Token::new(text, TokenType::Operand, TokenSubType::Range));
                    self.pos = end2;
                    return Ok(());
                }
                return Err(TokenizerError {
                    message: "expected reference after ':'".to_string(),
                    pos: end + 1,
                });
            }
            self.tokens.push(Token::new(
                first,
                TokenType::Operand,
                TokenSubType::Reference,
            ));
            self.pos = end;
            return Ok(());
        }

        if self.input[start] == b'$' {
            return Err(TokenizerError {
                message: "'$' must prefix a reference".to_string(),
                pos: start,
            });
        }

        let mut end = start;
        while let Some(&c) = self.input.get(end) {
            if c.is_ascii_alphanumeric() || c == b'_' || c == b'.' {
                end += 1;
            } else {
                break;
            }
        }
        let word = std::str::from_utf8(&self.input[start..end]).unwrap();
        self.pos = end;

        if word.eq_ignore_ascii_case("TRUE") || word.eq_ignore_ascii_case("FALSE") {
            self.tokens.push(Token::new(
                word.to_ascii_uppercase(),
                TokenType::Operand,
                TokenSubType::Logical,
            ));
            return Ok(());
        }

        // Skip whitespace between a name and its argument list.
        let mut look = end;
        while self.input.get(look).is_some_and(|c| *c == b' ') {
            look += 1;
        }
        if self.input.get(look) == Some(&b'(') {
            self.tokens.push(Token::new(
                word.to_ascii_uppercase(),
                TokenType::Func,
                TokenSubType::None,
            ));
            return Ok(());
        }

        Err(TokenizerError {
            message: format!("unknown identifier '{word}'"),
            pos: start,
        })
    }

    /// Try to match `[$]letters[$]digits` starting at `at`. Returns the end
    /// offset on success. Letters may be either case; digits must form a
    /// positive integer.
    fn try_reference(&self, at: usize) -> Option<usize> {
        let mut i = at;
        if self.input.get(i) == Some(&b'$') {
            i += 1;
        }
        let letters_start = i;
        while self.input.get(i).is_some_and(|c| c.is_ascii_alphabetic()) {
            i += 1;
        }
        if i == letters_start || i - letters_start > 3 {
            return None;
        }
        if self.input.get(i) == Some(&b'$') {
            i += 1;
        }
        let digits_start = i;
        while self.input.get(i).is_some_and(|c| c.is_ascii_digit()) {
            i += 1;
        }
        if i == digits_start {
            return None;
        }
        if self.input[digits_start] == b'0' {
            return None; // rows are 1-based, no leading zeros
        }
        // A reference must not run into more identifier characters (e.g.
        // `A1B` is an identifier, not a reference followed by junk).
        if self
            .input
            .get(i)
            .is_some_and(|c| c.is_ascii_alphanumeric() || *c == b'_' || *c == b'.')
        {
            return None;
        }
        Some(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(input: &str) -> Vec<(TokenType, TokenSubType)> {
        Tokenizer::new(input)
            .tokenize()
            .unwrap()
            .into_iter()
            .map(|t| (t.token_type, t.subtype))
            .collect()
    }

    #[test]
    fn scans_reference_and_number() {
        let toks = Tokenizer::new("A1+2.5").tokenize().unwrap();
        assert_eq!(toks.len(), 3);
        assert_eq!(toks[0].value, "A1");
        assert_eq!(toks[0].subtype, TokenSubType::Reference);
        assert_eq!(toks[1].token_type, TokenType::OpInfix);
        assert_eq!(toks[2].value, "2.5");
    }

    #[test]
    fn absolute_markers_stay_in_token() {
        let toks = Tokenizer::new("$A$1").tokenize().unwrap();
        assert_eq!(toks[0].value, "$A$1");
        assert_eq!(toks[0].subtype, TokenSubType::Reference);
    }

    #[test]
    fn range_merges_to_one_token() {
        let toks = Tokenizer::new("SUM(A1:B4)").tokenize().unwrap();
        assert_eq!(toks[0].token_type, TokenType::Func);
        assert_eq!(toks[0].value, "SUM");
        assert_eq!(toks[2].subtype, TokenSubType::Range);
        assert_eq!(toks[2].value, "A1:B4");
    }

    #[test]
    fn prefix_vs_infix_minus() {
        assert_eq!(
            kinds("-A1-2"),
            vec![
                (TokenType::OpPrefix, TokenSubType::None),
                (TokenType::Operand, TokenSubType::Reference),
                (TokenType::OpInfix, TokenSubType::None),
                (TokenType::Operand, TokenSubType::Number),
            ]
        );
    }

    #[test]
    fn comparison_digraphs() {
        let toks = Tokenizer::new("A1<>B1").tokenize().unwrap();
        assert_eq!(toks[1].value, "<>");
        let toks = Tokenizer::new("A1>=1").tokenize().unwrap();
        assert_eq!(toks[1].value, ">=");
    }

    #[test]
    fn string_with_escaped_quote() {
        let toks = Tokenizer::new("\"he said \"\"hi\"\"\"").tokenize().unwrap();
        assert_eq!(toks[0].value, "he said \"hi\"");
        assert_eq!(toks[0].subtype, TokenSubType::Text);
    }

    #[test]
    fn error_literal() {
        let toks = Tokenizer::new("#REF!").tokenize().unwrap();
        assert_eq!(toks[0].subtype, TokenSubType::Error);
        assert!(Tokenizer::new("#WAT!").tokenize().is_err());
    }

    #[test]
    fn identifier_without_call_is_rejected() {
        assert!(Tokenizer::new("frobnicate").tokenize().is_err());
        assert!(Tokenizer::new("SUM(1)").tokenize().is_ok());
    }

    #[test]
    fn unterminated_string_is_rejected() {
        assert!(Tokenizer::new("\"open").tokenize().is_err());
    }
}
