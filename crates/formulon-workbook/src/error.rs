use thiserror::Error;

/// Failures of the workbook surface itself. Formula failures never
/// appear here; they become error values on cells.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkbookError {
    #[error("unknown sheet '{0}'")]
    UnknownSheet(String),

    #[error("sheet '{0}' already exists")]
    DuplicateSheet(String),

    #[error("cell ({row}, {col}) is out of bounds")]
    OutOfBounds { row: u32, col: u32 },
}
