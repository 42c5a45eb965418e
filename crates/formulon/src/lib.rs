//! Meta crate that re-exports the Formulon building blocks. Depend on
//! this crate for the full stack, or trim it with feature flags while
//! keeping access to the underlying layers.

#[cfg(feature = "common")]
pub use formulon_common as common;

#[cfg(feature = "parse")]
pub use formulon_parse as parse;

#[cfg(feature = "eval")]
pub use formulon_eval as eval;

#[cfg(feature = "workbook")]
pub use formulon_workbook as workbook;

#[cfg(feature = "common")]
pub use formulon_common::{CellError, ErrorKind, Value};

#[cfg(feature = "parse")]
pub use formulon_parse::{Expr, parse_formula};

#[cfg(feature = "eval")]
pub use formulon_eval::{CellKey, DependencyGraph, Function, Interpreter};

#[cfg(feature = "workbook")]
pub use formulon_workbook::{Workbook, WorkbookError};
