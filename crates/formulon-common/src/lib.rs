//! Shared value, error, and coordinate types for the Formulon engine.

pub mod address;
pub mod coord;
pub mod error;
pub mod value;

pub use address::{AddressError, CellRef, RangeRef, sheet_name_needs_quoting};
pub use coord::{A1ParseError, Coord, column_index, column_label};
pub use error::{CellError, ErrorKind};
pub use value::{Value, compare_values, format_number, parse_input, values_equal};
