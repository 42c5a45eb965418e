//! Text functions: LEN, LEFT, RIGHT, MID, CONCATENATE, UPPER, LOWER,
//! TRIM, TEXT.
//!
//! Positions and lengths are in characters, not bytes; MID's start is
//! 1-based as in Excel.

use std::sync::Arc;

use formulon_common::{CellError, ErrorKind, Value};

use crate::builtins::math::unwrap_or_return;
use crate::builtins::utils::{number_arg, text_arg};
use crate::function::Function;
use crate::function_registry::register_function;
use crate::traits::{ArgumentHandle, EvaluationContext};

/* ─────────────────────────── LEN ──────────────────────────── */

#[derive(Debug)]
pub struct LenFn;

impl Function for LenFn {
    fn name(&self) -> &'static str {
        "LEN"
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
        let s = unwrap_or_return!(text_arg(&args[0]));
        Ok(Value::Number(s.chars().count() as f64))
    }
}

/* ───────────────────── LEFT / RIGHT / MID ─────────────────── */

fn count_arg(
    args: &[ArgumentHandle<'_, '_>],
    index: usize,
    default: f64,
) -> Result<usize, Value> {
    let n = match args.get(index) {
        Some(arg) => number_arg(arg)?,
        None => default,
    };
    if n < 0.0 {
        return Err(Value::Error(
            CellError::new(ErrorKind::Value).with_message("Count cannot be negative"),
        ));
    }
    Ok(n.trunc() as usize)
}

#[derive(Debug)]
pub struct LeftFn;

impl Function for LeftFn {
    fn name(&self) -> &'static str {
        "LEFT"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval(
        &self,
        args: &[ArgumentHandle<'_, '_>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, CellError> {
        let s = unwrap_or_return!(text_arg(&args[0]));
        let n = unwrap_or_return!(count_arg(args, 1, 1.0));
        Ok(Value::Text(s.chars().take(n).collect()))
    }
}

#[derive(Debug)]
pub struct RightFn;

impl Function for RightFn {
    fn name(&self) -> &'static str {
        "RIGHT"
    }
    fn min_args(&self) -> usize {
        1
    }
    fn max_args(&self) -> Option<usize> {
        Some(2)
    }

    fn eval(
        &self,
        args: &[ArgumentHandle<'_, '_>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, CellError> {
        let s = unwrap_or_return!(text_arg(&args[0]));
        let n = unwrap_or_return!(count_arg(args, 1, 1.0));
        let len = s.chars().count();
        Ok(Value::Text(s.chars().skip(len.saturating_sub(n)).collect()))
    }
}

#[derive(Debug)]
pub struct MidFn;

impl Function for MidFn {
    fn name(&self) -> &'static str {
        "MID"
    }
    fn min_args(&self) -> usize {
        3
    }
    fn max_args(&self) -> Option<usize> {
        Some(3)
    }

    fn eval(
        &self,
        args: &[ArgumentHandle<'_, '_>],
        _ctx: &dyn EvaluationContext,
    ) -> Result<Value, CellError> {
        let s = unwrap_or_return!(text_arg(&args[0]));
        let start = unwrap_or_return!(number_arg(&args[1]));
        if start < 1.0 {
            return Ok(Value::Error(
                CellError::new(ErrorKind::Value).with_message("MID start is 1-based"),
            ));
        }
        let len = unwrap_or_return!(count_arg(args, 2, 0.0));
        let start = start.trunc() as usize - 1;
        Ok(Value::Text(s.chars().skip(start).take(len).collect()))
    }
}

/* ───────────────────── CONCATENATE ────────────────────────── */

#[derive(Debug)]
pub struct ConcatenateFn;

impl Function for ConcatenateFn {
    fn name(&self) -> &'static str {
        "CONCATENATE"
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
        let mut out = String::new();
        for arg in args {
            out.push_str(&unwrap_or_return!(text_arg(arg)));
        }
        Ok(Value::Text(out))
    }
}

/* ───────────────────── UPPER / LOWER / TRIM ───────────────── */

#[derive(Debug)]
pub struct UpperFn;

impl Function for UpperFn {
    fn name(&self) -> &'static str {
        "UPPER"
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
        let s = unwrap_or_return!(text_arg(&args[0]));
        Ok(Value::Text(s.to_uppercase()))
    }
}

#[derive(Debug)]
pub struct LowerFn;

impl Function for LowerFn {
    fn name(&self) -> &'static str {
        "LOWER"
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
        let s = unwrap_or_return!(text_arg(&args[0]));
        Ok(Value::Text(s.to_lowercase()))
    }
}

#[derive(Debug)]
pub struct TrimFn;

impl Function for TrimFn {
    fn name(&self) -> &'static str {
        "TRIM"
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
        let s = unwrap_or_return!(text_arg(&args[0]));
        // Strip the ends and collapse interior whitespace runs.
        Ok(Value::Text(
            s.split_whitespace().collect::<Vec<_>>().join(" "),
        ))
    }
}

/* ─────────────────────────── TEXT ─────────────────────────── */

#[derive(Debug)]
pub struct TextFn;

impl Function for TextFn {
    fn name(&self) -> &'static str {
        "TEXT"
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
        let subject = unwrap_or_return!(text_arg(&args[0]));
        // The format argument is validated for errors but otherwise
        // unused; format codes are not part of this engine.
        let _format = unwrap_or_return!(text_arg(&args[1]));
        Ok(Value::Text(subject))
    }
}

pub fn register() {
    register_function(Arc::new(LenFn));
    register_function(Arc::new(LeftFn));
    register_function(Arc::new(RightFn));
    register_function(Arc::new(MidFn));
    register_function(Arc::new(ConcatenateFn));
    register_function(Arc::new(UpperFn));
    register_function(Arc::new(LowerFn));
    register_function(Arc::new(TrimFn));
    register_function(Arc::new(TextFn));
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestCtx;
    use formulon_common::Value;

    #[test]
    fn len_counts_characters() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("LEN(\"héllo\")"), Value::Number(5.0));
        assert_eq!(ctx.eval("LEN(\"\")"), Value::Number(0.0));
        assert_eq!(ctx.eval("LEN(123)"), Value::Number(3.0));
    }

    #[test]
    fn left_right_mid() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("LEFT(\"hello\",2)"), Value::Text("he".into()));
        assert_eq!(ctx.eval("LEFT(\"hello\")"), Value::Text("h".into()));
        assert_eq!(ctx.eval("RIGHT(\"hello\",3)"), Value::Text("llo".into()));
        assert_eq!(ctx.eval("RIGHT(\"hi\",10)"), Value::Text("hi".into()));
        assert_eq!(ctx.eval("MID(\"hello\",2,3)"), Value::Text("ell".into()));
        assert!(ctx.eval("MID(\"hello\",0,3)").is_error());
    }

    #[test]
    fn concatenate_coerces() {
        let ctx = TestCtx::default();
        assert_eq!(
            ctx.eval("CONCATENATE(\"a\",1,TRUE)"),
            Value::Text("a1TRUE".into())
        );
    }

    #[test]
    fn case_and_trim() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("UPPER(\"abc\")"), Value::Text("ABC".into()));
        assert_eq!(ctx.eval("LOWER(\"AbC\")"), Value::Text("abc".into()));
        assert_eq!(
            ctx.eval("TRIM(\"  a   b  \")"),
            Value::Text("a b".into())
        );
    }

    #[test]
    fn text_ignores_its_format() {
        let ctx = TestCtx::default();
        assert_eq!(
            ctx.eval("TEXT(1234.5,\"#,##0.00\")"),
            Value::Text("1234.5".into())
        );
    }

    #[test]
    fn errors_propagate() {
        let ctx = TestCtx::default();
        assert!(ctx.eval("UPPER(1/0)").is_error());
        assert!(ctx.eval("CONCATENATE(\"a\",#N/A)").is_error());
    }
}
