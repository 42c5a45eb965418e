//! Sheet-qualified cell and range references.

use std::error::Error;
use std::fmt::{self, Display};

use crate::coord::Coord;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Errors produced while combining references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Range endpoints refer to different sheets.
    MismatchedSheets,
}

impl Display for AddressError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AddressError::MismatchedSheets => {
                write!(f, "range endpoints refer to different sheets")
            }
        }
    }
}

impl Error for AddressError {}

/// Check whether a sheet name needs single-quoting in formula text.
pub fn sheet_name_needs_quoting(name: &str) -> bool {
    if name.is_empty() {
        return true;
    }
    let bytes = name.as_bytes();
    if bytes[0].is_ascii_digit() {
        return true;
    }
    bytes
        .iter()
        .any(|&b| !(b.is_ascii_alphanumeric() || b == b'_' || b == b'.'))
}

fn write_sheet_prefix(f: &mut fmt::Formatter<'_>, sheet: &str) -> fmt::Result {
    if sheet_name_needs_quoting(sheet) {
        // Embedded single quotes double.
        write!(f, "'{}'!", sheet.replace('\'', "''"))
    } else {
        write!(f, "{sheet}!")
    }
}

/// A single-cell reference, optionally sheet-qualified.
///
/// The sheet is `None` for references inside the owning sheet's own
/// formulas.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CellRef {
    pub sheet: Option<String>,
    pub coord: Coord,
}

impl CellRef {
    pub fn new(coord: Coord) -> Self {
        CellRef { sheet: None, coord }
    }

    pub fn with_sheet(sheet: impl Into<String>, coord: Coord) -> Self {
        CellRef {
            sheet: Some(sheet.into()),
            coord,
        }
    }
}

impl Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref sheet) = self.sheet {
            write_sheet_prefix(f, sheet)?;
        }
        write!(f, "{}", self.coord)
    }
}

/// An axis-aligned rectangle of cells, optionally sheet-qualified.
///
/// Endpoints may arrive in any order; iteration always walks the
/// normalised rectangle row-major.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RangeRef {
    pub sheet: Option<String>,
    pub start: Coord,
    pub end: Coord,
}

impl RangeRef {
    pub fn new(sheet: Option<String>, start: Coord, end: Coord) -> Self {
        RangeRef { sheet, start, end }
    }

    /// Join two cell references into a range. The sheet comes from
    /// whichever endpoint carries one; if both carry, they must match.
    pub fn from_endpoints(start: CellRef, end: CellRef) -> Result<Self, AddressError> {
        let sheet = match (start.sheet, end.sheet) {
            (Some(a), Some(b)) if a != b => return Err(AddressError::MismatchedSheets),
            (Some(a), _) => Some(a),
            (None, b) => b,
        };
        Ok(RangeRef::new(sheet, start.coord, end.coord))
    }

    pub fn min_row(&self) -> u32 {
        self.start.row.min(self.end.row)
    }

    pub fn max_row(&self) -> u32 {
        self.start.row.max(self.end.row)
    }

    pub fn min_col(&self) -> u32 {
        self.start.col.min(self.end.col)
    }

    pub fn max_col(&self) -> u32 {
        self.start.col.max(self.end.col)
    }

    pub fn height(&self) -> u32 {
        self.max_row() - self.min_row() + 1
    }

    pub fn width(&self) -> u32 {
        self.max_col() - self.min_col() + 1
    }

    pub fn len(&self) -> usize {
        self.height() as usize * self.width() as usize
    }

    pub fn is_empty(&self) -> bool {
        false // A range always spans at least one cell.
    }

    /// Lazy row-major walk over `(row, col)` pairs.
    pub fn cells(&self) -> impl Iterator<Item = (u32, u32)> + use<> {
        let (min_r, max_r) = (self.min_row(), self.max_row());
        let (min_c, max_c) = (self.min_col(), self.max_col());
        (min_r..=max_r).flat_map(move |r| (min_c..=max_c).map(move |c| (r, c)))
    }
}

impl Display for RangeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(ref sheet) = self.sheet {
            write_sheet_prefix(f, sheet)?;
        }
        write!(f, "{}:{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_awkward_sheet_names() {
        let plain = CellRef::with_sheet("Data", Coord::new(0, 0));
        assert_eq!(plain.to_string(), "Data!A1");

        let spaced = CellRef::with_sheet("My Sheet", Coord::new(2, 1));
        assert_eq!(spaced.to_string(), "'My Sheet'!B3");

        let quoted = CellRef::with_sheet("It's", Coord::new(0, 0));
        assert_eq!(quoted.to_string(), "'It''s'!A1");
    }

    #[test]
    fn endpoints_merge_sheets() {
        let a = CellRef::with_sheet("S", Coord::new(0, 0));
        let b = CellRef::new(Coord::new(1, 1));
        let r = RangeRef::from_endpoints(a, b).unwrap();
        assert_eq!(r.sheet.as_deref(), Some("S"));

        let a = CellRef::with_sheet("S", Coord::new(0, 0));
        let b = CellRef::with_sheet("T", Coord::new(1, 1));
        assert_eq!(
            RangeRef::from_endpoints(a, b),
            Err(AddressError::MismatchedSheets)
        );
    }

    #[test]
    fn iteration_is_row_major_and_order_free() {
        // Endpoints reversed on both axes.
        let r = RangeRef::new(None, Coord::new(1, 1), Coord::new(0, 0));
        let cells: Vec<_> = r.cells().collect();
        assert_eq!(cells, vec![(0, 0), (0, 1), (1, 0), (1, 1)]);
        assert_eq!(r.len(), 4);
        assert_eq!((r.height(), r.width()), (2, 2));
    }
}
