//! Shared argument helpers for the built-in functions.
//!
//! The `Err` side of these helpers is the *value* to return from the
//! function, which is how error propagation short-circuits through a
//! `?`.

use formulon_common::Value;

use crate::traits::ArgumentHandle;

/// Scalar argument coerced to a number.
pub(crate) fn number_arg(arg: &ArgumentHandle<'_, '_>) -> Result<f64, Value> {
    match arg.value().as_number() {
        Ok(n) => Ok(n),
        Err(e) => Err(Value::Error(e)),
    }
}

/// Scalar argument coerced to a boolean.
pub(crate) fn boolean_arg(arg: &ArgumentHandle<'_, '_>) -> Result<bool, Value> {
    match arg.value().as_boolean() {
        Ok(b) => Ok(b),
        Err(e) => Err(Value::Error(e)),
    }
}

/// Scalar argument coerced to text.
pub(crate) fn text_arg(arg: &ArgumentHandle<'_, '_>) -> Result<String, Value> {
    let v = arg.value();
    match v {
        Value::Error(e) => Err(Value::Error(e)),
        other => Ok(other.to_display_text()),
    }
}

/// Flatten every argument and select the numeric population the
/// aggregate family works on: numbers kept, booleans as 1/0, text and
/// empties skipped, errors short-circuiting.
pub(crate) fn numeric_stream(args: &[ArgumentHandle<'_, '_>]) -> Result<Vec<f64>, Value> {
    let mut out = Vec::new();
    for arg in args {
        for v in arg.flat_values() {
            match v {
                Value::Number(n) => out.push(n),
                Value::Boolean(b) => out.push(if b { 1.0 } else { 0.0 }),
                Value::Error(e) => return Err(Value::Error(e)),
                Value::Empty | Value::Text(_) => {}
            }
        }
    }
    Ok(out)
}

/// Flatten every argument, short-circuiting on error values.
pub(crate) fn flat_stream(args: &[ArgumentHandle<'_, '_>]) -> Result<Vec<Value>, Value> {
    let mut out = Vec::new();
    for arg in args {
        for v in arg.flat_values() {
            if let Value::Error(e) = v {
                return Err(Value::Error(e));
            }
            out.push(v);
        }
    }
    Ok(out)
}
