use std::cmp::Ordering;
use std::fmt::{self, Display};

use crate::{CellError, ErrorKind};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// The result of evaluating a formula, and the content of every cell.
///
/// Coercions return a `Value` (never a raw number) precisely so that
/// error propagation composes: coercing an error yields the error
/// itself, and every operator forwards it.
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Empty,
    Text(String),
    Number(f64),
    Boolean(bool),
    Error(CellError),
}

impl Default for Value {
    fn default() -> Self {
        Value::Empty
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_text())
    }
}

impl Value {
    pub fn error(kind: ErrorKind) -> Self {
        Value::Error(CellError::new(kind))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Value::Empty)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /* ───────────────────── coercions ───────────────────── */

    /// Numeric view of the value.
    ///
    /// Empty counts as 0 and booleans as 1/0, matching Excel's operator
    /// semantics. Errors pass through as `Err` so the caller can
    /// propagate them.
    pub fn as_number(&self) -> Result<f64, CellError> {
        match self {
            Value::Empty => Ok(0.0),
            Value::Number(n) => Ok(*n),
            Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => parse_decimal(s).ok_or_else(|| {
                CellError::new(ErrorKind::Value).with_message("Cannot convert text to number")
            }),
            Value::Error(e) => Err(e.clone()),
        }
    }

    /// Boolean view of the value. Text accepts only TRUE/FALSE
    /// (case-insensitive); anything else is a `#VALUE!`.
    pub fn as_boolean(&self) -> Result<bool, CellError> {
        match self {
            Value::Empty => Ok(false),
            Value::Boolean(b) => Ok(*b),
            Value::Number(n) => Ok(*n != 0.0),
            Value::Text(s) => match s.trim().to_ascii_uppercase().as_str() {
                "TRUE" => Ok(true),
                "FALSE" => Ok(false),
                _ => Err(CellError::new(ErrorKind::Value)
                    .with_message("Cannot convert text to boolean")),
            },
            Value::Error(e) => Err(e.clone()),
        }
    }

    /// Textual view of the value; this is also what a cell displays.
    /// Errors render as their code spelling, so this never fails.
    pub fn to_display_text(&self) -> String {
        match self {
            Value::Empty => String::new(),
            Value::Text(s) => s.clone(),
            Value::Number(n) => format_number(*n),
            Value::Boolean(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            Value::Error(e) => e.kind.as_str().to_string(),
        }
    }

    /// Value-level coercion to a number; errors stay errors.
    pub fn coerce_to_number(&self) -> Value {
        match self.as_number() {
            Ok(n) => Value::Number(n),
            Err(e) => Value::Error(e),
        }
    }

    /// Value-level coercion to a boolean; errors stay errors.
    pub fn coerce_to_boolean(&self) -> Value {
        match self.as_boolean() {
            Ok(b) => Value::Boolean(b),
            Err(e) => Value::Error(e),
        }
    }

    /// Value-level coercion to text; errors stay errors.
    pub fn coerce_to_text(&self) -> Value {
        match self {
            Value::Error(e) => Value::Error(e.clone()),
            other => Value::Text(other.to_display_text()),
        }
    }
}

/* ───────────────────── comparison & equality ───────────────────── */

/// Rank used for cross-type ordering: numbers before booleans before
/// text. Empty and errors are handled before ranking applies.
fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Number(_) => 0,
        Value::Boolean(_) => 1,
        Value::Text(_) => 2,
        Value::Empty | Value::Error(_) => u8::MAX,
    }
}

/// Total comparison law shared by the sort surface and the comparison
/// operators.
///
/// Empty sorts last; errors sort after every non-error and order
/// lexicographically by their code spelling; otherwise the cross-type
/// rank decides, and within a type natural ordering applies. Text
/// comparison is case-insensitive with a case-sensitive tie-break so
/// the ordering stays total.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    use Value::*;
    match (a, b) {
        (Empty, Empty) => Ordering::Equal,
        (Empty, _) => Ordering::Greater,
        (_, Empty) => Ordering::Less,
        (Error(x), Error(y)) => x.kind.as_str().cmp(y.kind.as_str()),
        (Error(_), _) => Ordering::Greater,
        (_, Error(_)) => Ordering::Less,
        (Number(x), Number(y)) => x.partial_cmp(y).unwrap_or(Ordering::Equal),
        (Boolean(x), Boolean(y)) => x.cmp(y),
        (Text(x), Text(y)) => {
            let folded = x.to_lowercase().cmp(&y.to_lowercase());
            if folded == Ordering::Equal {
                x.cmp(y)
            } else {
                folded
            }
        }
        (l, r) => type_rank(l).cmp(&type_rank(r)),
    }
}

/// Strict equality: same variant and same payload. Errors are equal
/// iff their codes match; `-0.0 == +0.0`. Cross-variant is never equal.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    use Value::*;
    match (a, b) {
        (Empty, Empty) => true,
        (Text(x), Text(y)) => x == y,
        (Number(x), Number(y)) => x == y,
        (Boolean(x), Boolean(y)) => x == y,
        (Error(x), Error(y)) => x.kind == y.kind,
        _ => false,
    }
}

/* ───────────────────── parsing & formatting ───────────────────── */

/// Interpret raw user input (a non-formula cell assignment) as a value.
///
/// Trimmed; empty text becomes `Empty`, TRUE/FALSE a boolean, a decimal
/// whose canonical print equals the input a number, `<digits>%` a
/// percentage, and anything else text.
pub fn parse_input(text: &str) -> Value {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Value::Empty;
    }
    match trimmed.to_ascii_uppercase().as_str() {
        "TRUE" => return Value::Boolean(true),
        "FALSE" => return Value::Boolean(false),
        _ => {}
    }
    if let Some(n) = parse_decimal(trimmed) {
        if format_number(n) == trimmed {
            return Value::Number(n);
        }
    }
    if let Some(digits) = trimmed.strip_suffix('%') {
        if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) {
            if let Some(n) = parse_decimal(digits) {
                return Value::Number(n / 100.0);
            }
        }
    }
    Value::Text(text.to_string())
}

/// Parse a plain decimal: optional sign, decimal point, scientific
/// exponent. Rejects the textual specials (`inf`, `NaN`) that Rust's
/// float parser would otherwise accept.
fn parse_decimal(s: &str) -> Option<f64> {
    let s = s.trim();
    if s.is_empty() || !s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'+' | b'-' | b'.' | b'e' | b'E')) {
        return None;
    }
    s.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Canonical number printer: integers without a decimal point,
/// otherwise the shortest decimal that parses back to the same double,
/// capped at 15 significant digits.
pub fn format_number(n: f64) -> String {
    if n == 0.0 {
        return "0".to_string();
    }
    if !n.is_finite() {
        return n.to_string();
    }
    if n.fract() == 0.0 && n.abs() < 1e15 {
        return format!("{}", n as i64);
    }
    let shortest = n.to_string();
    if significant_digits(&shortest) <= 15 {
        shortest
    } else {
        // Round to 15 significant digits, then reprint the rounded double.
        let rounded: f64 = format!("{n:.14e}").parse().unwrap_or(n);
        rounded.to_string()
    }
}

fn significant_digits(s: &str) -> usize {
    let mantissa = match s.find(['e', 'E']) {
        Some(i) => &s[..i],
        None => s,
    };
    mantissa
        .bytes()
        .filter(u8::is_ascii_digit)
        .skip_while(|&b| b == b'0')
        .count()
}
