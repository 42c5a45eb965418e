//! A1-style cell coordinates with absolute anchors.
//!
//! Rows and columns are zero-based internally; the textual A1 form is
//! 1-based for rows and alphabetic for columns. `$` anchors survive
//! parsing and printing but never affect evaluation (they matter only
//! to fill/copy surfaces outside this engine).

use std::error::Error;
use std::fmt::{self, Display};

use once_cell::sync::Lazy;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

// Precomputed labels for the common columns (A-ZZ = 702 columns).
static COLUMN_LABELS: Lazy<Vec<String>> = Lazy::new(|| {
    let mut cols = Vec::with_capacity(702);
    for c in b'A'..=b'Z' {
        cols.push(String::from(c as char));
    }
    for c1 in b'A'..=b'Z' {
        for c2 in b'A'..=b'Z' {
            cols.push(format!("{}{}", c1 as char, c2 as char));
        }
    }
    cols
});

/// Errors produced while parsing an A1 reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct A1ParseError {
    pub message: String,
}

impl A1ParseError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Display for A1ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid A1 reference: {}", self.message)
    }
}

impl Error for A1ParseError {}

/// Convert a column label ("A", "BC") to a zero-based column index.
pub fn column_index(label: &str) -> Result<u32, A1ParseError> {
    let bytes = label.as_bytes();
    // Excel stops at XFD; anything longer than 3 letters is not a column.
    if bytes.is_empty() || bytes.len() > 3 {
        return Err(A1ParseError::new(format!("bad column '{label}'")));
    }
    let mut result = 0u32;
    for &b in bytes {
        if !b.is_ascii_alphabetic() {
            return Err(A1ParseError::new(format!("bad column '{label}'")));
        }
        result = result * 26 + (b.to_ascii_uppercase() - b'A' + 1) as u32;
    }
    Ok(result - 1)
}

/// Convert a zero-based column index to its alphabetic label.
pub fn column_label(index: u32) -> String {
    if (index as usize) < COLUMN_LABELS.len() {
        return COLUMN_LABELS[index as usize].clone();
    }
    let mut num = index + 1;
    let mut result = String::with_capacity(3);
    while num > 0 {
        num -= 1;
        result.insert(0, ((num % 26) as u8 + b'A') as char);
        num /= 26;
    }
    result
}

/// A zero-based cell coordinate with `$` anchor flags.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coord {
    pub row: u32,
    pub col: u32,
    pub row_abs: bool,
    pub col_abs: bool,
}

impl Coord {
    pub fn new(row: u32, col: u32) -> Self {
        Coord {
            row,
            col,
            row_abs: false,
            col_abs: false,
        }
    }

    pub fn with_anchors(row: u32, col: u32, row_abs: bool, col_abs: bool) -> Self {
        Coord {
            row,
            col,
            row_abs,
            col_abs,
        }
    }

    /// Parse an A1 reference like `B12` or `$B$12`.
    pub fn parse_a1(reference: &str) -> Result<Self, A1ParseError> {
        let bytes = reference.as_bytes();
        let mut i = 0;

        let col_abs = bytes.first() == Some(&b'$');
        if col_abs {
            i += 1;
        }
        let col_start = i;
        while i < bytes.len() && bytes[i].is_ascii_alphabetic() {
            i += 1;
        }
        if i == col_start {
            return Err(A1ParseError::new(format!("no column in '{reference}'")));
        }
        let col = column_index(&reference[col_start..i])?;

        let row_abs = bytes.get(i) == Some(&b'$');
        if row_abs {
            i += 1;
        }
        let row_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == row_start || i != bytes.len() {
            return Err(A1ParseError::new(format!("no row in '{reference}'")));
        }
        let row_1based: u32 = reference[row_start..i]
            .parse()
            .map_err(|_| A1ParseError::new(format!("bad row in '{reference}'")))?;
        if row_1based == 0 {
            return Err(A1ParseError::new("row numbers are 1-based"));
        }

        Ok(Coord::with_anchors(row_1based - 1, col, row_abs, col_abs))
    }
}

impl Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.col_abs {
            f.write_str("$")?;
        }
        f.write_str(&column_label(self.col))?;
        if self.row_abs {
            f.write_str("$")?;
        }
        write!(f, "{}", self.row + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn column_conversions() {
        assert_eq!(column_index("A").unwrap(), 0);
        assert_eq!(column_index("Z").unwrap(), 25);
        assert_eq!(column_index("AA").unwrap(), 26);
        assert_eq!(column_index("ZZ").unwrap(), 701);
        assert_eq!(column_index("AAA").unwrap(), 702);
        assert_eq!(column_label(0), "A");
        assert_eq!(column_label(27), "AB");
        assert_eq!(column_label(702), "AAA");
        assert!(column_index("").is_err());
        assert!(column_index("A1").is_err());
        assert!(column_index("ABCD").is_err());
    }

    #[test]
    fn parse_a1_with_anchors() {
        let c = Coord::parse_a1("B12").unwrap();
        assert_eq!((c.row, c.col), (11, 1));
        assert!(!c.row_abs && !c.col_abs);

        let c = Coord::parse_a1("$B$12").unwrap();
        assert!(c.row_abs && c.col_abs);

        let c = Coord::parse_a1("C$3").unwrap();
        assert!(c.row_abs && !c.col_abs);

        assert!(Coord::parse_a1("12").is_err());
        assert!(Coord::parse_a1("B").is_err());
        assert!(Coord::parse_a1("B0").is_err());
        assert!(Coord::parse_a1("B1C").is_err());
    }

    proptest! {
        #[test]
        fn a1_round_trip(row in 0u32..1_000_000, col in 0u32..16_384,
                         row_abs: bool, col_abs: bool) {
            let coord = Coord::with_anchors(row, col, row_abs, col_abs);
            prop_assert_eq!(Coord::parse_a1(&coord.to_string()).unwrap(), coord);
        }

        #[test]
        fn column_label_round_trip(col in 0u32..18_278) {
            prop_assert_eq!(column_index(&column_label(col)).unwrap(), col);
        }
    }
}
