//! Core object-safe traits of the evaluation layer.

use std::sync::Arc;

use formulon_common::{CellError, Value};
use formulon_parse::Expr;

use crate::engine::CellKey;
use crate::function::Function;
use crate::interpreter::Interpreter;

/// What the interpreter needs from its host (the workbook façade, or
/// a test fixture).
pub trait EvaluationContext {
    /// Name of the sheet that owns the formula being evaluated.
    fn current_sheet(&self) -> &str;

    /// Computed value of a cell. `sheet = None` means the current
    /// sheet; an unknown sheet name is a `#REF!`. Never-set cells
    /// resolve to `Value::Empty`.
    fn cell_value(&self, sheet: Option<&str>, row: u32, col: u32) -> Result<Value, CellError>;

    /// Graph key of a cell, used for cycle bookkeeping. `None` when
    /// the sheet name does not resolve.
    fn cell_key(&self, sheet: Option<&str>, row: u32, col: u32) -> Option<CellKey>;

    /// Definition text of a named range; lookup is case-insensitive.
    fn named_range(&self, name: &str) -> Option<String>;

    /// Function lookup. The default goes straight to the global
    /// registry; hosts with an overlay consult it first.
    fn function(&self, name: &str) -> Option<Arc<dyn Function>> {
        crate::function_registry::get(name)
    }
}

/// A lazily evaluated function argument: the unevaluated AST node plus
/// the interpreter it would run in.
///
/// Functions pull what they need: `value()` for a scalar, or
/// `flat_values()` to expand a range row-major. Because nothing is
/// evaluated up front, `IF` touches only the selected branch, `AND`/
/// `OR` short-circuit, and `IFERROR` leaves its fallback alone unless
/// the subject errored.
pub struct ArgumentHandle<'a, 'b> {
    node: &'a Expr,
    interp: &'a Interpreter<'b>,
}

impl<'a, 'b> ArgumentHandle<'a, 'b> {
    pub(crate) fn new(node: &'a Expr, interp: &'a Interpreter<'b>) -> Self {
        Self { node, interp }
    }

    /// Evaluate to a scalar. A range collapses to its first cell.
    pub fn value(&self) -> Value {
        self.interp.evaluate(self.node)
    }

    /// Evaluate to a flat row-major sequence. Ranges and array
    /// literals expand; a named range whose definition is a range
    /// expands too; anything else is a one-element sequence.
    pub fn flat_values(&self) -> Vec<Value> {
        match self.node {
            Expr::Range(r) => self.interp.range_values(r),
            Expr::Array(rows) => rows
                .iter()
                .flatten()
                .map(|e| self.interp.evaluate(e))
                .collect(),
            Expr::Name(name) => match self.interp.named_definition(name) {
                Ok(Expr::Range(r)) => self.interp.range_values(&r),
                _ => vec![self.value()],
            },
            _ => vec![self.value()],
        }
    }

    /// Whether this argument is a range (or expands like one).
    pub fn is_range(&self) -> bool {
        matches!(self.node, Expr::Range(_) | Expr::Array(_))
    }

    pub fn ast(&self) -> &'a Expr {
        self.node
    }
}
