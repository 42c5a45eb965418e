//! Single-pass tokenizer for Excel-style formula text.
//!
//! The tokenizer is byte-driven and never aborts: anything it cannot
//! classify becomes an [`TokenKind::Invalid`] token the parser turns
//! into a positioned failure. Whitespace is consumed and dropped. The
//! stream always ends with an [`TokenKind::Eof`] token whose span sits
//! at the input length.

use std::fmt::{self, Display};

use formulon_common::{ErrorKind, column_index};

/// Binary and comparison operator lexemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpToken {
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Percent,
    Ampersand,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl OpToken {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Caret => "^",
            Self::Percent => "%",
            Self::Ampersand => "&",
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }
}

impl Display for OpToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Token kinds with their semantic payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(ErrorKind),
    /// An A1 cell reference; column letters already resolved to a
    /// zero-based index, row already zero-based.
    CellRef {
        row: u32,
        col: u32,
        row_abs: bool,
        col_abs: bool,
    },
    /// A sheet qualifier; the trailing `!` has been consumed.
    SheetName(String),
    /// An identifier followed by `(`; uppercased so dispatch is
    /// case-insensitive.
    FuncName(String),
    /// A bare identifier: a named range.
    Name(String),
    Op(OpToken),
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    Comma,
    Semicolon,
    Colon,
    /// A character (or malformed construct) the grammar has no use
    /// for. The parser reports it; the tokenizer carries on.
    Invalid(char),
    Eof,
}

/// A token with its byte span in the source.
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub start: usize,
    pub end: usize,
}

impl Token {
    fn new(kind: TokenKind, start: usize, end: usize) -> Self {
        Token { kind, start, end }
    }
}

/// Tokenize a formula body (without the leading `=`).
pub fn tokenize(src: &str) -> Vec<Token> {
    Lexer::new(src).run()
}

struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    pos: usize,
    out: Vec<Token>,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Lexer {
            src,
            bytes: src.as_bytes(),
            pos: 0,
            out: Vec::with_capacity(src.len() / 2 + 1),
        }
    }

    #[inline]
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    #[inline]
    fn peek_at(&self, offset: usize) -> Option<u8> {
        self.bytes.get(self.pos + offset).copied()
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        self.out.push(Token::new(kind, start, self.pos));
    }

    fn run(mut self) -> Vec<Token> {
        while let Some(b) = self.peek() {
            let start = self.pos;
            match b {
                b' ' | b'\t' | b'\r' | b'\n' => {
                    self.pos += 1;
                }
                b'0'..=b'9' => self.lex_number(start),
                b'.' if self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) => {
                    self.lex_number(start)
                }
                b'"' => self.lex_string(start),
                b'#' => self.lex_error_literal(start),
                b'\'' => self.lex_quoted_sheet(start),
                b'<' => {
                    self.pos += 1;
                    let op = match self.peek() {
                        Some(b'=') => {
                            self.pos += 1;
                            OpToken::Le
                        }
                        Some(b'>') => {
                            self.pos += 1;
                            OpToken::Ne
                        }
                        _ => OpToken::Lt,
                    };
                    self.push(TokenKind::Op(op), start);
                }
                b'>' => {
                    self.pos += 1;
                    let op = if self.peek() == Some(b'=') {
                        self.pos += 1;
                        OpToken::Ge
                    } else {
                        OpToken::Gt
                    };
                    self.push(TokenKind::Op(op), start);
                }
                b'=' => {
                    self.pos += 1;
                    self.push(TokenKind::Op(OpToken::Eq), start);
                }
                b'+' => self.lex_single(TokenKind::Op(OpToken::Plus)),
                b'-' => self.lex_single(TokenKind::Op(OpToken::Minus)),
                b'*' => self.lex_single(TokenKind::Op(OpToken::Star)),
                b'/' => self.lex_single(TokenKind::Op(OpToken::Slash)),
                b'^' => self.lex_single(TokenKind::Op(OpToken::Caret)),
                b'%' => self.lex_single(TokenKind::Op(OpToken::Percent)),
                b'&' => self.lex_single(TokenKind::Op(OpToken::Ampersand)),
                b'(' => self.lex_single(TokenKind::OpenParen),
                b')' => self.lex_single(TokenKind::CloseParen),
                b'{' => self.lex_single(TokenKind::OpenBrace),
                b'}' => self.lex_single(TokenKind::CloseBrace),
                b',' => self.lex_single(TokenKind::Comma),
                b';' => self.lex_single(TokenKind::Semicolon),
                b':' => self.lex_single(TokenKind::Colon),
                b'$' | b'_' => self.lex_identifier(start),
                c if c.is_ascii_alphabetic() => self.lex_identifier(start),
                _ => {
                    // Advance one full character, not one byte.
                    let ch = self.src[self.pos..].chars().next().unwrap_or('\u{fffd}');
                    self.pos += ch.len_utf8();
                    self.push(TokenKind::Invalid(ch), start);
                }
            }
        }
        let len = self.src.len();
        self.out.push(Token::new(TokenKind::Eof, len, len));
        self.out
    }

    fn lex_single(&mut self, kind: TokenKind) {
        let start = self.pos;
        self.pos += 1;
        self.push(kind, start);
    }

    /// Number: optional integer part, optional fraction requiring at
    /// least one digit, optional exponent `[eE][+-]?digits`.
    fn lex_number(&mut self, start: usize) {
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.peek() == Some(b'.') && self.peek_at(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            let mut probe = self.pos + 1;
            if matches!(self.bytes.get(probe).copied(), Some(b'+' | b'-')) {
                probe += 1;
            }
            if self.bytes.get(probe).is_some_and(|b| b.is_ascii_digit()) {
                self.pos = probe;
                while self.peek().is_some_and(|b| b.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
        }
        let lexeme = &self.src[start..self.pos];
        match lexeme.parse::<f64>() {
            // An overflowing literal (1e999) is not a number.
            Ok(n) if n.is_finite() => self.push(TokenKind::Number(n), start),
            _ => self.push(TokenKind::Invalid('.'), start),
        }
    }

    /// Double-quoted string; `""` encodes a literal quote. No other
    /// escapes. An unterminated string is an invalid token.
    fn lex_string(&mut self, start: usize) {
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.peek() {
                Some(b'"') => {
                    self.pos += 1;
                    if self.peek() == Some(b'"') {
                        self.pos += 1;
                        text.push('"');
                    } else {
                        self.push(TokenKind::Text(text), start);
                        return;
                    }
                }
                Some(_) => {
                    let ch = self.src[self.pos..].chars().next().unwrap_or('\u{fffd}');
                    self.pos += ch.len_utf8();
                    text.push(ch);
                }
                None => {
                    self.push(TokenKind::Invalid('"'), start);
                    return;
                }
            }
        }
    }

    /// `#` followed by the error-code alphabet, validated against the
    /// known set. Unknown codes become an invalid token, not an error
    /// value.
    fn lex_error_literal(&mut self, start: usize) {
        self.pos += 1;
        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || matches!(b, b'!' | b'?' | b'/' | b'_'))
        {
            self.pos += 1;
        }
        let lexeme = &self.src[start..self.pos];
        match ErrorKind::parse(lexeme) {
            Some(kind) => self.push(TokenKind::Error(kind), start),
            None => self.push(TokenKind::Invalid('#'), start),
        }
    }

    /// `'name with spaces'`; `''` encodes a literal quote. The
    /// trailing `!` is consumed when present.
    fn lex_quoted_sheet(&mut self, start: usize) {
        self.pos += 1;
        let mut name = String::new();
        loop {
            match self.peek() {
                Some(b'\'') => {
                    self.pos += 1;
                    if self.peek() == Some(b'\'') {
                        self.pos += 1;
                        name.push('\'');
                    } else {
                        if self.peek() == Some(b'!') {
                            self.pos += 1;
                        }
                        self.push(TokenKind::SheetName(name), start);
                        return;
                    }
                }
                Some(_) => {
                    let ch = self.src[self.pos..].chars().next().unwrap_or('\u{fffd}');
                    self.pos += ch.len_utf8();
                    name.push(ch);
                }
                None => {
                    self.push(TokenKind::Invalid('\''), start);
                    return;
                }
            }
        }
    }

    /// Identifier starting with a letter, `_`, or `$`. Cell-reference
    /// recognition runs first: optional `$`, a column-letter run,
    /// optional `$`, then row digits. Everything else extends over
    /// `[A-Za-z0-9_.]` and classifies by what follows.
    fn lex_identifier(&mut self, start: usize) {
        if let Some(len) = self.try_cell_ref(start) {
            self.pos = start + len;
            return;
        }

        if self.peek() == Some(b'$') {
            // A `$` that does not open a cell reference belongs to nothing.
            self.pos += 1;
            self.push(TokenKind::Invalid('$'), start);
            return;
        }

        while self
            .peek()
            .is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.')
        {
            self.pos += 1;
        }
        let lexeme = &self.src[start..self.pos];
        let upper = lexeme.to_ascii_uppercase();

        // TRUE/FALSE are literals unless they open a call like TRUE().
        if self.peek() != Some(b'(') {
            if upper == "TRUE" {
                self.push(TokenKind::Boolean(true), start);
                return;
            }
            if upper == "FALSE" {
                self.push(TokenKind::Boolean(false), start);
                return;
            }
        }

        match self.peek() {
            Some(b'(') => self.push(TokenKind::FuncName(upper), start),
            Some(b'!') => {
                let name = lexeme.to_string();
                self.pos += 1; // consume '!'
                self.push(TokenKind::SheetName(name), start);
            }
            _ => {
                let name = lexeme.to_string();
                self.push(TokenKind::Name(name), start);
            }
        }
    }

    /// Try to read `$?letters$?digits` at `start`; returns the match
    /// length and pushes the token on success.
    fn try_cell_ref(&mut self, start: usize) -> Option<usize> {
        let bytes = &self.bytes[start..];
        let mut i = 0;

        let col_abs = bytes.first() == Some(&b'$');
        if col_abs {
            i += 1;
        }
        let col_start = i;
        while bytes.get(i).is_some_and(|b| b.is_ascii_alphabetic()) {
            i += 1;
        }
        if i == col_start {
            return None;
        }
        let col_letters = &self.src[start + col_start..start + i];

        let row_abs = bytes.get(i) == Some(&b'$');
        if row_abs {
            i += 1;
        }
        let row_start = i;
        while bytes.get(i).is_some_and(|b| b.is_ascii_digit()) {
            i += 1;
        }
        if i == row_start {
            return None;
        }

        // The reference must end here; `A1B` is an identifier.
        if bytes
            .get(i)
            .is_some_and(|&b| b.is_ascii_alphanumeric() || b == b'_' || b == b'.')
        {
            return None;
        }

        let col = column_index(col_letters).ok()?;
        let row_1based: u32 = self.src[start + row_start..start + i].parse().ok()?;
        if row_1based == 0 {
            return None;
        }

        self.out.push(Token::new(
            TokenKind::CellRef {
                row: row_1based - 1,
                col,
                row_abs,
                col_abs,
            },
            start,
            start + i,
        ));
        Some(i)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn numbers() {
        assert_eq!(kinds("1"), vec![TokenKind::Number(1.0), TokenKind::Eof]);
        assert_eq!(
            kinds("3.25"),
            vec![TokenKind::Number(3.25), TokenKind::Eof]
        );
        assert_eq!(
            kinds("1e3"),
            vec![TokenKind::Number(1000.0), TokenKind::Eof]
        );
        assert_eq!(
            kinds("2.5E-2"),
            vec![TokenKind::Number(0.025), TokenKind::Eof]
        );
        assert_eq!(
            kinds(".5"),
            vec![TokenKind::Number(0.5), TokenKind::Eof]
        );
        // A dot with no following digit is not a fraction.
        assert_eq!(
            kinds("1."),
            vec![
                TokenKind::Number(1.0),
                TokenKind::Invalid('.'),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn strings_with_doubled_quotes() {
        assert_eq!(
            kinds("\"he said \"\"hi\"\"\""),
            vec![TokenKind::Text("he said \"hi\"".into()), TokenKind::Eof]
        );
        assert_eq!(
            kinds("\"open"),
            vec![TokenKind::Invalid('"'), TokenKind::Eof]
        );
    }

    #[test]
    fn error_literals() {
        assert_eq!(
            kinds("#DIV/0!"),
            vec![TokenKind::Error(ErrorKind::Div), TokenKind::Eof]
        );
        assert_eq!(
            kinds("#N/A"),
            vec![TokenKind::Error(ErrorKind::Na), TokenKind::Eof]
        );
        assert_eq!(
            kinds("#GETTING_DATA"),
            vec![TokenKind::Error(ErrorKind::GettingData), TokenKind::Eof]
        );
        assert_eq!(
            kinds("#WHAT?"),
            vec![TokenKind::Invalid('#'), TokenKind::Eof]
        );
    }

    #[test]
    fn cell_references() {
        assert_eq!(
            kinds("A1"),
            vec![
                TokenKind::CellRef {
                    row: 0,
                    col: 0,
                    row_abs: false,
                    col_abs: false
                },
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("$b$12"),
            vec![
                TokenKind::CellRef {
                    row: 11,
                    col: 1,
                    row_abs: true,
                    col_abs: true
                },
                TokenKind::Eof
            ]
        );
        // Trailing identifier chars defeat the reference reading.
        assert_eq!(
            kinds("A1B"),
            vec![TokenKind::Name("A1B".into()), TokenKind::Eof]
        );
    }

    #[test]
    fn sheet_qualifiers() {
        assert_eq!(
            kinds("Sheet1!A1"),
            vec![
                TokenKind::SheetName("Sheet1".into()),
                TokenKind::CellRef {
                    row: 0,
                    col: 0,
                    row_abs: false,
                    col_abs: false
                },
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("'My Sheet'!B2"),
            vec![
                TokenKind::SheetName("My Sheet".into()),
                TokenKind::CellRef {
                    row: 1,
                    col: 1,
                    row_abs: false,
                    col_abs: false
                },
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("'It''s'!A1"),
            vec![
                TokenKind::SheetName("It's".into()),
                TokenKind::CellRef {
                    row: 0,
                    col: 0,
                    row_abs: false,
                    col_abs: false
                },
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn identifiers_classify_by_lookahead() {
        assert_eq!(
            kinds("sum(1)"),
            vec![
                TokenKind::FuncName("SUM".into()),
                TokenKind::OpenParen,
                TokenKind::Number(1.0),
                TokenKind::CloseParen,
                TokenKind::Eof
            ]
        );
        assert_eq!(
            kinds("TotalSales"),
            vec![TokenKind::Name("TotalSales".into()), TokenKind::Eof]
        );
        assert_eq!(
            kinds("true"),
            vec![TokenKind::Boolean(true), TokenKind::Eof]
        );
        // TRUE( opens a call, not a literal.
        assert_eq!(
            kinds("TRUE()"),
            vec![
                TokenKind::FuncName("TRUE".into()),
                TokenKind::OpenParen,
                TokenKind::CloseParen,
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn operators_two_char_before_one() {
        assert_eq!(
            kinds("<= <> >= < > ="),
            vec![
                TokenKind::Op(OpToken::Le),
                TokenKind::Op(OpToken::Ne),
                TokenKind::Op(OpToken::Ge),
                TokenKind::Op(OpToken::Lt),
                TokenKind::Op(OpToken::Gt),
                TokenKind::Op(OpToken::Eq),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn stray_characters_become_invalid_tokens() {
        let toks = kinds("1 @ 2");
        assert_eq!(
            toks,
            vec![
                TokenKind::Number(1.0),
                TokenKind::Invalid('@'),
                TokenKind::Number(2.0),
                TokenKind::Eof
            ]
        );
    }

    #[test]
    fn eof_spans_input_length() {
        let toks = tokenize("1+2");
        let eof = toks.last().unwrap();
        assert_eq!(eof.kind, TokenKind::Eof);
        assert_eq!((eof.start, eof.end), (3, 3));
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn decimal_literals_tokenize_to_their_value(n in 0f64..1e9) {
                let printed = format!("{n}");
                let toks = tokenize(&printed);
                prop_assert_eq!(toks.len(), 2);
                match toks[0].kind {
                    TokenKind::Number(v) => prop_assert_eq!(v, n),
                    ref other => prop_assert!(false, "unexpected token {:?}", other),
                }
            }
        }
    }
}
