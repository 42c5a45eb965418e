//! Logical functions: IF, AND, OR, NOT, TRUE, FALSE, IFERROR.
//!
//! These are the functions the lazy-argument model exists for: IF
//! evaluates only the selected branch, AND/OR stop at the first
//! deciding value, and IFERROR leaves its fallback untouched unless
//! the subject errored.

use std::sync::Arc;

use formulon_common::{CellError, ErrorKind, Value};

use crate::builtins::math::unwrap_or_return;
use crate::builtins::utils::boolean_arg;
use crate::function::Function;
use crate::function_registry::register_function;
use crate::traits::{ArgumentHandle, EvaluationContext};

/* ─────────────────────────── IF ───────────────────────────── */

#[derive(Debug)]
pub struct IfFn;

impl Function for IfFn {
    fn name(&self) -> &'static str {
        "IF"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn eval(
        &self,
        args: &[ArgumentHandle<'_, '_>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, CellError> {
        let condition = unwrap_or_return!(boolean_arg(&args[0]));
        if condition {
            Ok(args[1].value())
        } else if let Some(alt) = args.get(2) {
            Ok(alt.value())
        } else {
            Ok(Value::Boolean(false))
        }
    }
}

/* ───────────────────────── AND / OR ───────────────────────── */

/// Walk the logical population of the arguments, stopping as soon as
/// one equals `decides`. Empties are skipped; errors propagate.
fn short_circuit(
    args: &[ArgumentHandle<'_, '_>],
    decides: bool,
) -> Result<Value, CellError> {
    let mut seen = false;
    for arg in args {
        for v in arg.flat_values() {
            if v.is_empty() {
                continue;
            }
            match v.as_boolean() {
                Ok(b) if b == decides => return Ok(Value::Boolean(decides)),
                Ok(_) => seen = true,
                Err(e) => return Ok(Value::Error(e)),
            }
        }
    }
    if seen {
        Ok(Value::Boolean(!decides))
    } else {
        Ok(Value::Error(
            CellError::new(ErrorKind::Value).with_message("No logical values"),
        ))
    }
}

#[derive(Debug)]
pub struct AndFn;

impl Function for AndFn {
    fn name(&self) -> &'static str {
        "AND"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        None
    }

    fn eval(
        &self,
        args: &[ArgumentHandle<'_, '_>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, CellError> {
        short_circuit(args, false)
    }
}

#[derive(Debug)]
pub struct OrFn;

impl Function for OrFn {
    fn name(&self) -> &'static str {
        "OR"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        None
    }

    fn eval(
        &self,
        args: &[ArgumentHandle<'_, '_>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, CellError> {
        short_circuit(args, true)
    }
}

/* ─────────────────────────── NOT ──────────────────────────── */

#[derive(Debug)]
pub struct NotFn;

impl Function for NotFn {
    fn name(&self) -> &'static str {
        "NOT"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(1)
    }

    fn eval(
        &self,
        args: &[ArgumentHandle<'_, '_>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, CellError> {
        let b = unwrap_or_return!(boolean_arg(&args[0]));
        Ok(Value::Boolean(!b))
    }
}

/* ───────────────────── TRUE / FALSE ───────────────────────── */

#[derive(Debug)]
pub struct TrueFn;

impl Function for TrueFn {
    fn name(&self) -> &'static str {
        "TRUE"
    }
    fn min_args(&self) -> usize {
        0
    }
    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn eval(
        &self,
        _args: &[ArgumentHandle<'_, '_>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, CellError> {
        Ok(Value::Boolean(true))
    }
}

#[derive(Debug)]
pub struct FalseFn;

impl Function for FalseFn {
    fn name(&self) -> &'static str {
        "FALSE"
    }
    fn min_args(&self) -> usize {
        0
    }
    fn max_args(&self) -> Option<usize> {
        Some(0)
    }

    fn eval(
        &self,
        _args: &[ArgumentHandle<'_, '_>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, CellError> {
        Ok(Value::Boolean(false))
    }
}

/* ───────────────────────── IFERROR ────────────────────────── */

#[derive(Debug)]
pub struct IfErrorFn;

impl Function for IfErrorFn {
    fn name(&self) -> &'static str {
        "IFERROR"
    }
    fn min_args(&self) -> usize {
        2
    }
    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval(
        &self,
        args: &[ArgumentHandle<'_, '_>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, CellError> {
        let subject = args[0].value();
        if subject.is_error() {
            Ok(args[1].value())
        } else {
            Ok(subject)
        }
    }
}

pub fn register() {
    register_function(Arc::new(IfFn));
    register_function(Arc::new(AndFn));
    register_function(Arc::new(OrFn));
    register_function(Arc::new(NotFn));
    register_function(Arc::new(TrueFn));
    register_function(Arc::new(FalseFn));
    register_function(Arc::new(IfErrorFn));
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestCtx;
    use formulon_common::{ErrorKind, Value};

    #[test]
    fn if_selects_a_branch() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("IF(1>0,\"yes\",\"no\")"), Value::Text("yes".into()));
        assert_eq!(ctx.eval("IF(1<0,\"yes\",\"no\")"), Value::Text("no".into()));
        // Missing else defaults to FALSE.
        assert_eq!(ctx.eval("IF(1<0,\"yes\")"), Value::Boolean(false));
    }

    #[test]
    fn if_does_not_touch_the_unselected_branch() {
        // The untaken branch divides by zero; laziness keeps it inert.
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("IF(TRUE,1,1/0)"), Value::Number(1.0));
        assert_eq!(ctx.eval("IF(FALSE,1/0,2)"), Value::Number(2.0));
    }

    #[test]
    fn and_or_short_circuit() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("AND(TRUE,TRUE)"), Value::Boolean(true));
        assert_eq!(ctx.eval("AND(TRUE,FALSE)"), Value::Boolean(false));
        assert_eq!(ctx.eval("OR(FALSE,TRUE)"), Value::Boolean(true));
        assert_eq!(ctx.eval("OR(FALSE,FALSE)"), Value::Boolean(false));
        // The deciding value stops evaluation before the error.
        assert_eq!(ctx.eval("AND(FALSE,1/0)"), Value::Boolean(false));
        assert_eq!(ctx.eval("OR(TRUE,1/0)"), Value::Boolean(true));
        // Numbers coerce.
        assert_eq!(ctx.eval("AND(1,2)"), Value::Boolean(true));
        assert_eq!(ctx.eval("OR(0,0)"), Value::Boolean(false));
    }

    #[test]
    fn not_negates() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("NOT(TRUE)"), Value::Boolean(false));
        assert_eq!(ctx.eval("NOT(0)"), Value::Boolean(true));
    }

    #[test]
    fn true_false_constants() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("TRUE()"), Value::Boolean(true));
        assert_eq!(ctx.eval("FALSE()"), Value::Boolean(false));
    }

    #[test]
    fn iferror_rescues() {
        let ctx = TestCtx::default();
        assert_eq!(
            ctx.eval("IFERROR(1/0,\"n/a\")"),
            Value::Text("n/a".into())
        );
        assert_eq!(ctx.eval("IFERROR(1/1,\"n/a\")"), Value::Number(1.0));
    }

    #[test]
    fn error_conditions_propagate_through_if() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("IF(1/0,1,2)"), Value::error(ErrorKind::Div));
    }
}
