//! Tokenizer and parser for Excel-style formulas.

pub mod parser;
pub mod tokenizer;

pub use parser::{BinaryOp, Expr, ParseError, RefView, UnaryOp, parse_formula};
pub use tokenizer::{OpToken, Token, TokenKind, tokenize};

pub use formulon_common::{CellError, CellRef, Coord, ErrorKind, RangeRef, Value};
