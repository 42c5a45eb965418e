//! Workbook façade over the Formulon engine: sheets, cells, named
//! ranges, and recalculation.

pub mod error;
pub mod workbook;
pub mod worksheet;

pub use error::WorkbookError;
pub use workbook::{NamedRange, Workbook};
pub use worksheet::{Cell, Sheet};

// Re-export for convenience.
pub use formulon_common::{CellError, ErrorKind, Value};
pub use formulon_eval::{CellKey, Function, SheetId};
