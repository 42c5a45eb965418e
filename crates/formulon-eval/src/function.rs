//! The `Function` trait every built-in and embedder function implements.

use formulon_common::{CellError, Value};

use crate::traits::{ArgumentHandle, EvaluationContext};

/// An Excel-style function.
///
/// Contracts the interpreter enforces before `eval` runs:
/// - the argument count is within `min_args ..= max_args`;
/// - arguments arrive in positional order, unevaluated.
///
/// Contracts the implementation must observe:
/// - an error argument propagates unchanged unless the function
///   explicitly catches it (`IFERROR` and the `ISERROR` family do);
/// - failures surface as error *values* (`Ok(Value::Error(..))`);
///   the `Err` channel is for implementation faults, which the
///   interpreter converts to `#VALUE!` carrying the message.
pub trait Function: Send + Sync + 'static {
    /// Uppercase canonical name.
    fn name(&self) -> &'static str;

    fn min_args(&self) -> usize;

    /// `None` means unbounded.
    fn max_args(&self) -> Option<usize>;

    fn eval(
        &self,
        args: &[ArgumentHandle<'_, '_>],
        ctx: &dyn EvaluationContext,
    ) -> Result<Value, CellError>;
}
