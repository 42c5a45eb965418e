//! Excel-style error representation shared by every layer of the engine.
//!
//! - **`ErrorKind`** : the canonical set of Excel error codes
//! - **`CellError`** : a code plus an optional human explanation
//!
//! `Display` renders codes exactly as Excel spells them (`#DIV/0!`, …);
//! the spellings are part of the formula grammar, so they must stay
//! bit-exact.

use std::{error::Error, fmt};

use crate::Value;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// All recognised Excel error codes.
///
/// Names are CamelCase (idiomatic Rust) while `Display` renders the
/// exact Excel spelling.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Div,
    Name,
    Na,
    Null,
    Num,
    Ref,
    Value,
    Circular,
    GettingData,
    Spill,
    Calc,
}

impl ErrorKind {
    /// The canonical spelling, as it appears in formulas and in cells.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Div => "#DIV/0!",
            Self::Name => "#NAME?",
            Self::Na => "#N/A",
            Self::Null => "#NULL!",
            Self::Num => "#NUM!",
            Self::Ref => "#REF!",
            Self::Value => "#VALUE!",
            Self::Circular => "#CIRCULAR!",
            Self::GettingData => "#GETTING_DATA",
            Self::Spill => "#SPILL!",
            Self::Calc => "#CALC!",
        }
    }

    /// Parse a spelling back into a kind. Case-insensitive.
    ///
    /// Returns `None` for anything outside the known set; the lexer
    /// relies on this to turn unknown `#...` sequences into invalid
    /// tokens rather than error values.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "#DIV/0!" => Some(Self::Div),
            "#NAME?" => Some(Self::Name),
            "#N/A" => Some(Self::Na),
            "#NULL!" => Some(Self::Null),
            "#NUM!" => Some(Self::Num),
            "#REF!" => Some(Self::Ref),
            "#VALUE!" => Some(Self::Value),
            "#CIRCULAR!" => Some(Self::Circular),
            "#GETTING_DATA" => Some(Self::GettingData),
            "#SPILL!" => Some(Self::Spill),
            "#CALC!" => Some(Self::Calc),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error value that flows through evaluation.
///
/// Operators and functions propagate these unchanged; only `IFERROR`
/// and the `ISERROR` family observe them without re-raising.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellError {
    pub kind: ErrorKind,
    pub message: Option<String>,
}

impl From<ErrorKind> for CellError {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: None,
        }
    }
}

impl CellError {
    pub fn new(kind: ErrorKind) -> Self {
        kind.into()
    }

    /// Attach a human-readable explanation.
    pub fn with_message<S: Into<String>>(mut self, msg: S) -> Self {
        self.message = Some(msg.into());
        self
    }
}

impl fmt::Display for CellError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if let Some(ref msg) = self.message {
            write!(f, ": {msg}")?;
        }
        Ok(())
    }
}

impl Error for CellError {}

impl From<CellError> for Value {
    fn from(error: CellError) -> Self {
        Value::Error(error)
    }
}

impl From<ErrorKind> for Value {
    fn from(kind: ErrorKind) -> Self {
        Value::Error(CellError::new(kind))
    }
}

impl PartialEq<str> for CellError {
    fn eq(&self, other: &str) -> bool {
        self.kind.as_str() == other
    }
}

impl PartialEq<&str> for CellError {
    fn eq(&self, other: &&str) -> bool {
        self.kind.as_str() == *other
    }
}
