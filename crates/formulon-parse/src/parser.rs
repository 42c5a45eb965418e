//! Pratt parser producing the formula AST.
//!
//! Precedence, tightest first: postfix `%`, unary `+ -`, `^` (right
//! associative), `* /`, `+ -`, `&`, comparisons. The range operator
//! `:` never reaches the operator table: it is folded into a
//! [`Expr::Range`] node immediately after its left cell reference is
//! read, and both of its operands must be cell references.

use std::error::Error;
use std::fmt::{self, Display};

use smallvec::{SmallVec, smallvec};

use crate::tokenizer::{OpToken, Token, TokenKind, tokenize};
use formulon_common::{CellError, CellRef, Coord, ErrorKind, RangeRef};

/// Unary operators. `Percent` is the postfix `%`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Minus,
    Percent,
}

impl UnaryOp {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Percent => "%",
        }
    }
}

/// Binary operators, including the comparison family.
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
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
            Self::Concat => "&",
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
        }
    }

    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge
        )
    }
}

/// A parsed formula expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    Error(ErrorKind),
    Cell(CellRef),
    Range(RangeRef),
    /// A named range, resolved at evaluation time.
    Name(String),
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        /// Uppercased at tokenization time; dispatch is case-insensitive.
        name: String,
        args: Vec<Expr>,
    },
    /// Rectangular literal `{a,b;c,d}`, row-major.
    Array(Vec<Vec<Expr>>),
}

/// Borrowed view of a reference met during an AST walk.
#[derive(Debug, Clone, Copy)]
pub enum RefView<'a> {
    Cell(&'a CellRef),
    Range(&'a RangeRef),
}

impl Expr {
    /// Visit every cell and range reference without recursing on the
    /// expression depth.
    pub fn visit_refs<V: FnMut(RefView<'_>)>(&self, mut visitor: V) {
        let mut stack: SmallVec<[&Expr; 8]> = smallvec![self];
        while let Some(node) = stack.pop() {
            match node {
                Expr::Cell(r) => visitor(RefView::Cell(r)),
                Expr::Range(r) => visitor(RefView::Range(r)),
                Expr::Unary { operand, .. } => stack.push(operand),
                Expr::Binary { lhs, rhs, .. } => {
                    // Right pushed first so the left side is visited first.
                    stack.push(rhs);
                    stack.push(lhs);
                }
                Expr::Call { args, .. } => {
                    for arg in args.iter().rev() {
                        stack.push(arg);
                    }
                }
                Expr::Array(rows) => {
                    for row in rows.iter().rev() {
                        for item in row.iter().rev() {
                            stack.push(item);
                        }
                    }
                }
                Expr::Number(_)
                | Expr::Text(_)
                | Expr::Boolean(_)
                | Expr::Error(_)
                | Expr::Name(_) => {}
            }
        }
    }

    /// Whether the expression reads any cell or range.
    pub fn has_references(&self) -> bool {
        let mut found = false;
        self.visit_refs(|_| found = true);
        found
    }
}

/// A positioned parse failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseError {
    pub message: String,
    pub position: Option<usize>,
    /// The error code a cell shows when this formula is assigned to it.
    pub kind: ErrorKind,
}

impl ParseError {
    fn new(message: impl Into<String>, position: usize) -> Self {
        ParseError {
            message: message.into(),
            position: Some(position),
            kind: ErrorKind::Value,
        }
    }

    fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }
}

impl Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(pos) = self.position {
            write!(f, "parse error at position {}: {}", pos, self.message)
        } else {
            write!(f, "parse error: {}", self.message)
        }
    }
}

impl Error for ParseError {}

impl From<ParseError> for CellError {
    fn from(err: ParseError) -> Self {
        let kind = err.kind;
        CellError::new(kind).with_message(err.to_string())
    }
}

/// Parse a formula. A leading `=` is accepted and skipped so callers
/// can hand over raw cell text.
pub fn parse_formula(src: &str) -> Result<Expr, ParseError> {
    let body = src.strip_prefix('=').unwrap_or(src);
    let offset = src.len() - body.len();
    let mut parser = Parser {
        tokens: tokenize(body),
        pos: 0,
        offset,
    };
    let expr = parser.parse_expr(0)?;
    match parser.peek().kind {
        TokenKind::Eof => Ok(expr),
        _ => Err(parser.error_here("unexpected input after expression")),
    }
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Byte offset of the body inside the original text (1 when a
    /// leading `=` was stripped), so error positions match the input.
    offset: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos.min(self.tokens.len() - 1)].clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    fn error_here(&self, message: impl Into<String>) -> ParseError {
        ParseError::new(message, self.peek().start + self.offset)
    }

    fn expect_close_paren(&mut self) -> Result<(), ParseError> {
        match self.peek().kind {
            TokenKind::CloseParen => {
                self.advance();
                Ok(())
            }
            _ => Err(self.error_here("expected ')'")),
        }
    }

    /* ───────────────────── expression levels ───────────────────── */

    fn parse_expr(&mut self, min_bp: u8) -> Result<Expr, ParseError> {
        let mut lhs = self.parse_prefix()?;

        loop {
            match self.peek().kind {
                TokenKind::Op(OpToken::Percent) => {
                    if POSTFIX_BP < min_bp {
                        break;
                    }
                    self.advance();
                    lhs = Expr::Unary {
                        op: UnaryOp::Percent,
                        operand: Box::new(lhs),
                    };
                }
                TokenKind::Op(op) => {
                    let Some((bin, lbp, rbp)) = infix_binding(op) else {
                        break;
                    };
                    if lbp < min_bp {
                        break;
                    }
                    self.advance();
                    let rhs = self.parse_expr(rbp)?;
                    lhs = Expr::Binary {
                        op: bin,
                        lhs: Box::new(lhs),
                        rhs: Box::new(rhs),
                    };
                }
                TokenKind::Colon => {
                    // A ':' surviving to operator position means its left
                    // side was not a plain cell reference.
                    return Err(self
                        .error_here("':' requires cell references on both sides")
                        .with_kind(ErrorKind::Ref));
                }
                _ => break,
            }
        }

        Ok(lhs)
    }

    fn parse_prefix(&mut self) -> Result<Expr, ParseError> {
        match self.peek().kind {
            TokenKind::Op(OpToken::Plus) => {
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Plus,
                    operand: Box::new(self.parse_expr(PREFIX_BP)?),
                })
            }
            TokenKind::Op(OpToken::Minus) => {
                self.advance();
                Ok(Expr::Unary {
                    op: UnaryOp::Minus,
                    operand: Box::new(self.parse_expr(PREFIX_BP)?),
                })
            }
            _ => self.parse_primary(),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self.advance();
        match tok.kind {
            TokenKind::Number(n) => Ok(Expr::Number(n)),
            TokenKind::Text(s) => Ok(Expr::Text(s)),
            TokenKind::Boolean(b) => Ok(Expr::Boolean(b)),
            TokenKind::Error(kind) => Ok(Expr::Error(kind)),
            TokenKind::Name(name) => Ok(Expr::Name(name)),
            TokenKind::OpenParen => {
                let inner = self.parse_expr(0)?;
                self.expect_close_paren()?;
                Ok(inner)
            }
            TokenKind::OpenBrace => self.parse_array(),
            TokenKind::FuncName(name) => self.parse_call(name),
            TokenKind::CellRef {
                row,
                col,
                row_abs,
                col_abs,
            } => {
                let cell = CellRef::new(Coord::with_anchors(row, col, row_abs, col_abs));
                self.maybe_fold_range(cell)
            }
            TokenKind::SheetName(sheet) => {
                let cell = self.expect_cell_after_sheet(sheet)?;
                self.maybe_fold_range(cell)
            }
            TokenKind::Eof => Err(ParseError::new(
                "unexpected end of formula",
                tok.start + self.offset,
            )),
            TokenKind::Invalid(c) => Err(ParseError::new(
                format!("unexpected character '{c}'"),
                tok.start + self.offset,
            )),
            other => Err(ParseError::new(
                format!("unexpected token {other:?}"),
                tok.start + self.offset,
            )),
        }
    }

    /* ───────────────────── primaries ───────────────────── */

    fn expect_cell_after_sheet(&mut self, sheet: String) -> Result<CellRef, ParseError> {
        match self.peek().kind {
            TokenKind::CellRef {
                row,
                col,
                row_abs,
                col_abs,
            } => {
                self.advance();
                Ok(CellRef::with_sheet(
                    sheet,
                    Coord::with_anchors(row, col, row_abs, col_abs),
                ))
            }
            _ => Err(self
                .error_here("expected a cell reference after sheet qualifier")
                .with_kind(ErrorKind::Ref)),
        }
    }

    /// Fold `left : right` into a range node right away; both sides
    /// must be cell references and any sheet qualifiers must agree.
    fn maybe_fold_range(&mut self, left: CellRef) -> Result<Expr, ParseError> {
        if self.peek().kind != TokenKind::Colon {
            return Ok(Expr::Cell(left));
        }
        self.advance();

        let right = match self.advance() {
            Token {
                kind:
                    TokenKind::CellRef {
                        row,
                        col,
                        row_abs,
                        col_abs,
                    },
                ..
            } => CellRef::new(Coord::with_anchors(row, col, row_abs, col_abs)),
            Token {
                kind: TokenKind::SheetName(sheet),
                ..
            } => self.expect_cell_after_sheet(sheet)?,
            tok => {
                return Err(ParseError::new(
                    "':' requires cell references on both sides",
                    tok.start + self.offset,
                )
                .with_kind(ErrorKind::Ref));
            }
        };

        let range = RangeRef::from_endpoints(left, right).map_err(|_| {
            self.error_here("range endpoints refer to different sheets")
                .with_kind(ErrorKind::Ref)
        })?;
        Ok(Expr::Range(range))
    }

    fn parse_call(&mut self, name: String) -> Result<Expr, ParseError> {
        match self.peek().kind {
            TokenKind::OpenParen => {
                self.advance();
            }
            _ => return Err(self.error_here("expected '(' after function name")),
        }

        let mut args = Vec::new();
        if self.peek().kind == TokenKind::CloseParen {
            self.advance();
            return Ok(Expr::Call { name, args });
        }

        loop {
            args.push(self.parse_expr(0)?);
            match self.peek().kind {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::CloseParen => {
                    self.advance();
                    return Ok(Expr::Call { name, args });
                }
                _ => return Err(self.error_here("expected ',' or ')' in argument list")),
            }
        }
    }

    /// `{row1; row2; …}` with `,` between row elements. Rows must be
    /// the same length.
    fn parse_array(&mut self) -> Result<Expr, ParseError> {
        let mut rows: Vec<Vec<Expr>> = Vec::new();
        let mut row: Vec<Expr> = Vec::new();

        if self.peek().kind == TokenKind::CloseBrace {
            return Err(self
                .error_here("array literal cannot be empty")
                .with_kind(ErrorKind::Value));
        }

        loop {
            row.push(self.parse_expr(0)?);
            match self.peek().kind {
                TokenKind::Comma => {
                    self.advance();
                }
                TokenKind::Semicolon => {
                    self.advance();
                    rows.push(std::mem::take(&mut row));
                }
                TokenKind::CloseBrace => {
                    self.advance();
                    rows.push(row);
                    break;
                }
                _ => return Err(self.error_here("expected ',', ';' or '}' in array literal")),
            }
        }

        let width = rows[0].len();
        if rows.iter().any(|r| r.len() != width) {
            return Err(self
                .error_here("array rows have different lengths")
                .with_kind(ErrorKind::Value));
        }
        Ok(Expr::Array(rows))
    }
}

/* ───────────────────── binding powers ───────────────────── */

const POSTFIX_BP: u8 = 11;
const PREFIX_BP: u8 = 11;

fn infix_binding(op: OpToken) -> Option<(BinaryOp, u8, u8)> {
    Some(match op {
        OpToken::Eq => (BinaryOp::Eq, 1, 2),
        OpToken::Ne => (BinaryOp::Ne, 1, 2),
        OpToken::Lt => (BinaryOp::Lt, 1, 2),
        OpToken::Le => (BinaryOp::Le, 1, 2),
        OpToken::Gt => (BinaryOp::Gt, 1, 2),
        OpToken::Ge => (BinaryOp::Ge, 1, 2),
        OpToken::Ampersand => (BinaryOp::Concat, 3, 4),
        OpToken::Plus => (BinaryOp::Add, 5, 6),
        OpToken::Minus => (BinaryOp::Sub, 5, 6),
        OpToken::Star => (BinaryOp::Mul, 7, 8),
        OpToken::Slash => (BinaryOp::Div, 7, 8),
        // Right associative: right binding power below the left.
        OpToken::Caret => (BinaryOp::Pow, 10, 9),
        OpToken::Percent => return None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Expr {
        parse_formula(src).unwrap()
    }

    fn cell(row: u32, col: u32) -> Expr {
        Expr::Cell(CellRef::new(Coord::new(row, col)))
    }

    #[test]
    fn precedence_mul_over_add() {
        let ast = parse("1+2*3");
        assert_eq!(
            ast,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(Expr::Number(1.0)),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: Box::new(Expr::Number(2.0)),
                    rhs: Box::new(Expr::Number(3.0)),
                }),
            }
        );
    }

    #[test]
    fn parens_override_precedence() {
        let ast = parse("(1+2)*3");
        assert_eq!(
            ast,
            Expr::Binary {
                op: BinaryOp::Mul,
                lhs: Box::new(Expr::Binary {
                    op: BinaryOp::Add,
                    lhs: Box::new(Expr::Number(1.0)),
                    rhs: Box::new(Expr::Number(2.0)),
                }),
                rhs: Box::new(Expr::Number(3.0)),
            }
        );
    }

    #[test]
    fn power_is_right_associative() {
        let ast = parse("2^3^2");
        assert_eq!(
            ast,
            Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(Expr::Number(2.0)),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Pow,
                    lhs: Box::new(Expr::Number(3.0)),
                    rhs: Box::new(Expr::Number(2.0)),
                }),
            }
        );
    }

    #[test]
    fn unary_minus_binds_tighter_than_power() {
        let ast = parse("-2^2");
        assert_eq!(
            ast,
            Expr::Binary {
                op: BinaryOp::Pow,
                lhs: Box::new(Expr::Unary {
                    op: UnaryOp::Minus,
                    operand: Box::new(Expr::Number(2.0)),
                }),
                rhs: Box::new(Expr::Number(2.0)),
            }
        );
    }

    #[test]
    fn percent_is_postfix() {
        let ast = parse("50%");
        assert_eq!(
            ast,
            Expr::Unary {
                op: UnaryOp::Percent,
                operand: Box::new(Expr::Number(50.0)),
            }
        );
    }

    #[test]
    fn comparison_does_not_chain() {
        // 1 < 2 < 3 parses left-nested: (1<2)<3.
        let ast = parse("1<2<3");
        match ast {
            Expr::Binary {
                op: BinaryOp::Lt,
                lhs,
                ..
            } => assert!(matches!(
                *lhs,
                Expr::Binary {
                    op: BinaryOp::Lt,
                    ..
                }
            )),
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn leading_equals_is_accepted() {
        assert_eq!(parse("=A1"), cell(0, 0));
    }

    #[test]
    fn range_folds_immediately() {
        let ast = parse("A1:B10");
        assert_eq!(
            ast,
            Expr::Range(RangeRef::new(None, Coord::new(0, 0), Coord::new(9, 1)))
        );
    }

    #[test]
    fn sheet_qualified_range_takes_its_sheet() {
        let ast = parse("Data!A1:B2");
        assert_eq!(
            ast,
            Expr::Range(RangeRef::new(
                Some("Data".into()),
                Coord::new(0, 0),
                Coord::new(1, 1)
            ))
        );
    }

    #[test]
    fn range_sheet_mismatch_is_a_ref_error() {
        let err = parse_formula("Data!A1:Other!B2").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Ref);
    }

    #[test]
    fn range_requires_cell_references() {
        let err = parse_formula("SUM(1):B2").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Ref);
        let err = parse_formula("A1:5").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Ref);
    }

    #[test]
    fn call_with_arguments() {
        let ast = parse("if(A1>0,\"yes\",\"no\")");
        match ast {
            Expr::Call { name, args } => {
                assert_eq!(name, "IF");
                assert_eq!(args.len(), 3);
            }
            other => panic!("unexpected shape: {other:?}"),
        }
    }

    #[test]
    fn call_with_no_arguments() {
        assert_eq!(
            parse("PI()"),
            Expr::Call {
                name: "PI".into(),
                args: vec![]
            }
        );
    }

    #[test]
    fn trailing_comma_is_a_syntax_error() {
        assert!(parse_formula("SUM(1,2,)").is_err());
    }

    #[test]
    fn array_literal_rows() {
        let ast = parse("{1,2;3,4}");
        assert_eq!(
            ast,
            Expr::Array(vec![
                vec![Expr::Number(1.0), Expr::Number(2.0)],
                vec![Expr::Number(3.0), Expr::Number(4.0)],
            ])
        );
    }

    #[test]
    fn ragged_array_is_a_value_error() {
        let err = parse_formula("{1,2;3}").unwrap_err();
        assert_eq!(err.kind, ErrorKind::Value);
    }

    #[test]
    fn error_literal_parses_to_error_node() {
        assert_eq!(parse("#REF!"), Expr::Error(ErrorKind::Ref));
    }

    #[test]
    fn partial_parse_fails() {
        assert!(parse_formula("1+2 3").is_err());
        assert!(parse_formula("1+").is_err());
        assert!(parse_formula("").is_err());
    }

    #[test]
    fn error_position_accounts_for_leading_equals() {
        let err = parse_formula("=1+").unwrap_err();
        assert_eq!(err.position, Some(3));
    }

    #[test]
    fn visit_refs_walks_every_reference() {
        let ast = parse("SUM(A1:A5)+Sheet2!B1*C3");
        let mut cells = 0;
        let mut ranges = 0;
        ast.visit_refs(|r| match r {
            RefView::Cell(_) => cells += 1,
            RefView::Range(_) => ranges += 1,
        });
        assert_eq!((cells, ranges), (2, 1));
        assert!(ast.has_references());
        assert!(!parse("1+2").has_references());
    }
}
