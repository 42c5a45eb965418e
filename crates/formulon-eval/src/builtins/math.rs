//! Arithmetic functions: SUM, AVERAGE, MIN, MAX, ABS, ROUND, SQRT,
//! POWER.
//!
//! The aggregates flatten their arguments and work on the numeric
//! population (numbers plus booleans as 1/0); text and empty cells are
//! ignored, exactly as a range full of mixed content behaves in Excel.

use std::sync::Arc;

use formulon_common::{CellError, ErrorKind, Value};

use crate::builtins::utils::{number_arg, numeric_stream};
use crate::function::Function;
use crate::function_registry::register_function;
use crate::traits::{ArgumentHandle, EvaluationContext};

macro_rules! unwrap_or_return {
    ($expr:expr) => {
        match $expr {
            Ok(v) => v,
            Err(value) => return Ok(value),
        }
    };
}
pub(crate) use unwrap_or_return;

/* ─────────────────────────── SUM ──────────────────────────── */

#[derive(Debug)]
pub struct SumFn;

impl Function for SumFn {
    fn name(&self) -> &'static str {
        "SUM"
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
        let numbers = unwrap_or_return!(numeric_stream(args));
        Ok(Value::Number(numbers.iter().sum()))
    }
}

/* ───────────────────────── AVERAGE ────────────────────────── */

#[derive(Debug)]
pub struct AverageFn;

impl Function for AverageFn {
    fn name(&self) -> &'static str {
        "AVERAGE"
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
        let numbers = unwrap_or_return!(numeric_stream(args));
        if numbers.is_empty() {
            return Ok(Value::Error(
                CellError::new(ErrorKind::Div).with_message("AVERAGE of an empty selection"),
            ));
        }
        Ok(Value::Number(
            numbers.iter().sum::<f64>() / numbers.len() as f64,
        ))
    }
}

/* ───────────────────────── MIN / MAX ──────────────────────── */

#[derive(Debug)]
pub struct MinFn;

impl Function for MinFn {
    fn name(&self) -> &'static str {
        "MIN"
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
        let numbers = unwrap_or_return!(numeric_stream(args));
        if numbers.is_empty() {
            return Ok(Value::Number(0.0));
        }
        Ok(Value::Number(
            numbers.iter().copied().fold(f64::INFINITY, f64::min),
        ))
    }
}

#[derive(Debug)]
pub struct MaxFn;

impl Function for MaxFn {
    fn name(&self) -> &'static str {
        "MAX"
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
        let numbers = unwrap_or_return!(numeric_stream(args));
        if numbers.is_empty() {
            return Ok(Value::Number(0.0));
        }
        Ok(Value::Number(
            numbers.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        ))
    }
}

/* ─────────────────────────── ABS ──────────────────────────── */

#[derive(Debug)]
pub struct AbsFn;

impl Function for AbsFn {
    fn name(&self) -> &'static str {
        "ABS"
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
        let n = unwrap_or_return!(number_arg(&args[0]));
        Ok(Value::Number(n.abs()))
    }
}

/* ────────────────────────── ROUND ─────────────────────────── */

#[derive(Debug)]
pub struct RoundFn;

impl Function for RoundFn {
    fn name(&self) -> &'static str {
        "ROUND"
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
        let x = unwrap_or_return!(number_arg(&args[0]));
        let digits = unwrap_or_return!(number_arg(&args[1])).trunc() as i32;
        // Half away from zero at `digits` decimal places.
        let factor = 10f64.powi(digits);
        Ok(Value::Number((x * factor).round() / factor))
    }
}

/* ─────────────────────────── SQRT ─────────────────────────── */

#[derive(Debug)]
pub struct SqrtFn;

impl Function for SqrtFn {
    fn name(&self) -> &'static str {
        "SQRT"
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
        let n = unwrap_or_return!(number_arg(&args[0]));
        if n < 0.0 {
            return Ok(Value::Error(
                CellError::new(ErrorKind::Num).with_message("SQRT of a negative number"),
            ));
        }
        Ok(Value::Number(n.sqrt()))
    }
}

/* ────────────────────────── POWER ─────────────────────────── */

#[derive(Debug)]
pub struct PowerFn;

impl Function for PowerFn {
    fn name(&self) -> &'static str {
        "POWER"
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
        let base = unwrap_or_return!(number_arg(&args[0]));
        let exponent = unwrap_or_return!(number_arg(&args[1]));
        let result = base.powf(exponent);
        if result.is_finite() {
            Ok(Value::Number(result))
        } else {
            Ok(Value::error(ErrorKind::Num))
        }
    }
}

pub fn register() {
    register_function(Arc::new(SumFn));
    register_function(Arc::new(AverageFn));
    register_function(Arc::new(MinFn));
    register_function(Arc::new(MaxFn));
    register_function(Arc::new(AbsFn));
    register_function(Arc::new(RoundFn));
    register_function(Arc::new(SqrtFn));
    register_function(Arc::new(PowerFn));
}
