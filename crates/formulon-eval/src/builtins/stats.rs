//! Counting and conditional aggregation: COUNT, COUNTA, COUNTBLANK,
//! COUNTIF, SUMIF.
//!
//! COUNTIF/SUMIF criteria: an optional comparator prefix (`>=`, `<=`,
//! `<>`, `>`, `<`, `=`) followed by a value, or a `*`/`?` wildcard
//! pattern, or a case-insensitive exact match against the cell's
//! display text.

use std::sync::Arc;

use regex::Regex;

use formulon_common::{
    CellError, ErrorKind, Value, compare_values, parse_input, values_equal,
};

use crate::builtins::math::unwrap_or_return;
use crate::builtins::utils::flat_stream;
use crate::function::Function;
use crate::function_registry::register_function;
use crate::traits::{ArgumentHandle, EvaluationContext};

/* ───────────────────── criteria matching ──────────────────── */

enum Criterion {
    /// Comparator-prefixed criterion; matches only cells of the same
    /// type as the target.
    Compare(CompareOp, Value),
    /// `*`/`?` pattern, anchored, case-insensitive.
    Wildcard(Regex),
    /// Case-insensitive match against the cell's display text.
    EqualsText(String),
    /// Non-text criterion: strict value equality.
    Equals(Value),
}

#[derive(Clone, Copy)]
enum CompareOp {
    Ge,
    Le,
    Ne,
    Gt,
    Lt,
}

fn wildcard_regex(pattern: &str) -> Result<Regex, CellError> {
    let mut re = String::from("(?i)^");
    for ch in pattern.chars() {
        match ch {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            c => re.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }
    re.push('$');
    Regex::new(&re)
        .map_err(|e| CellError::new(ErrorKind::Value).with_message(e.to_string()))
}

fn parse_criterion(criterion: &Value) -> Result<Criterion, CellError> {
    let text = match criterion {
        Value::Text(s) => s.as_str(),
        Value::Error(e) => return Err(e.clone()),
        other => return Ok(Criterion::Equals(other.clone())),
    };

    // Two-character comparators first.
    let (op, rest) = if let Some(rest) = text.strip_prefix(">=") {
        (Some(CompareOp::Ge), rest)
    } else if let Some(rest) = text.strip_prefix("<=") {
        (Some(CompareOp::Le), rest)
    } else if let Some(rest) = text.strip_prefix("<>") {
        (Some(CompareOp::Ne), rest)
    } else if let Some(rest) = text.strip_prefix('>') {
        (Some(CompareOp::Gt), rest)
    } else if let Some(rest) = text.strip_prefix('<') {
        (Some(CompareOp::Lt), rest)
    } else if let Some(rest) = text.strip_prefix('=') {
        (None, rest) // Plain equality falls through to text handling.
    } else {
        (None, text)
    };

    if let Some(op) = op {
        return Ok(Criterion::Compare(op, parse_input(rest)));
    }
    if rest.contains(['*', '?']) {
        return Ok(Criterion::Wildcard(wildcard_regex(rest)?));
    }
    match parse_input(rest) {
        Value::Text(_) | Value::Empty => Ok(Criterion::EqualsText(rest.to_string())),
        other => Ok(Criterion::Equals(other)),
    }
}

fn value_rank(v: &Value) -> u8 {
    match v {
        Value::Number(_) => 0,
        Value::Boolean(_) => 1,
        Value::Text(_) => 2,
        Value::Empty => 3,
        Value::Error(_) => 4,
    }
}

fn matches(cell: &Value, criterion: &Criterion) -> bool {
    match criterion {
        Criterion::Compare(op, target) => {
            // Comparisons only apply within the target's type: ">=25"
            // never counts text cells.
            if value_rank(cell) != value_rank(target) {
                return false;
            }
            let ord = compare_values(cell, target);
            match op {
                CompareOp::Ge => ord.is_ge(),
                CompareOp::Le => ord.is_le(),
                CompareOp::Ne => ord.is_ne(),
                CompareOp::Gt => ord.is_gt(),
                CompareOp::Lt => ord.is_lt(),
            }
        }
        Criterion::Wildcard(re) => {
            !cell.is_empty() && re.is_match(&cell.to_display_text())
        }
        Criterion::EqualsText(s) => {
            cell.to_display_text().to_lowercase() == s.to_lowercase()
        }
        Criterion::Equals(target) => values_equal(cell, target),
    }
}

/* ──────────────── COUNT / COUNTA / COUNTBLANK ─────────────── */

#[derive(Debug)]
pub struct CountFn;

impl Function for CountFn {
    fn name(&self) -> &'static str {
        "COUNT"
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
        let values = unwrap_or_return!(flat_stream(args));
        let count = values
            .iter()
            .filter(|v| matches!(v, Value::Number(_)))
            .count();
        Ok(Value::Number(count as f64))
    }
}

#[derive(Debug)]
pub struct CountaFn;

impl Function for CountaFn {
    fn name(&self) -> &'static str {
        "COUNTA"
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
        let values = unwrap_or_return!(flat_stream(args));
        let count = values.iter().filter(|v| !v.is_empty()).count();
        Ok(Value::Number(count as f64))
    }
}

#[derive(Debug)]
pub struct CountblankFn;

impl Function for CountblankFn {
    fn name(&self) -> &'static str {
        "COUNTBLANK"
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
        let values = unwrap_or_return!(flat_stream(args));
        let count = values.iter().filter(|v| v.is_empty()).count();
        Ok(Value::Number(count as f64))
    }
}

/* ───────────────────── COUNTIF / SUMIF ────────────────────── */

#[derive(Debug)]
pub struct CountifFn;

impl Function for CountifFn {
    fn name(&self) -> &'static str {
        "COUNTIF"
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
        let values = unwrap_or_return!(flat_stream(&args[..1]));
        let crit_value = args[1].value();
        if crit_value.is_error() {
            return Ok(crit_value);
        }
        let criterion = parse_criterion(&crit_value)?;
        let count = values.iter().filter(|v| matches(v, &criterion)).count();
        Ok(Value::Number(count as f64))
    }
}

#[derive(Debug)]
pub struct SumifFn;

impl Function for SumifFn {
    fn name(&self) -> &'static str {
        "SUMIF"
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
        let values = unwrap_or_return!(flat_stream(&args[..1]));
        let crit_value = args[1].value();
        if crit_value.is_error() {
            return Ok(crit_value);
        }
        let criterion = parse_criterion(&crit_value)?;
        let sums = match args.get(2) {
            Some(arg) => unwrap_or_return!(flat_stream(std::slice::from_ref(arg))),
            None => values.clone(),
        };

        // Mismatched lengths truncate to the shorter.
        let mut total = 0.0;
        for (v, s) in values.iter().zip(sums.iter()) {
            if matches(v, &criterion) {
                if let Value::Number(n) = s {
                    total += n;
                }
            }
        }
        Ok(Value::Number(total))
    }
}

pub fn register() {
    register_function(Arc::new(CountFn));
    register_function(Arc::new(CountaFn));
    register_function(Arc::new(CountblankFn));
    register_function(Arc::new(CountifFn));
    register_function(Arc::new(SumifFn));
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestCtx;
    use formulon_common::Value;

    fn fruit_ctx() -> TestCtx {
        let mut ctx = TestCtx::default();
        ctx.set_column(
            0,
            0,
            &[
                Value::Text("apple".into()),
                Value::Text("apricot".into()),
                Value::Text("banana".into()),
                Value::Text("cherry".into()),
            ],
        );
        ctx.set_column(
            0,
            1,
            &[
                Value::Number(10.0),
                Value::Number(20.0),
                Value::Number(30.0),
                Value::Number(40.0),
            ],
        );
        ctx
    }

    #[test]
    fn count_variants() {
        let mut ctx = TestCtx::default();
        ctx.set_column(
            0,
            0,
            &[
                Value::Number(1.0),
                Value::Text("x".into()),
                Value::Empty,
                Value::Boolean(true),
                Value::Number(2.0),
            ],
        );
        assert_eq!(ctx.eval("COUNT(A1:A5)"), Value::Number(2.0));
        assert_eq!(ctx.eval("COUNTA(A1:A5)"), Value::Number(4.0));
        assert_eq!(ctx.eval("COUNTBLANK(A1:A5)"), Value::Number(1.0));
    }

    #[test]
    fn countif_with_wildcards() {
        let ctx = fruit_ctx();
        assert_eq!(ctx.eval("COUNTIF(A1:A4,\"a*\")"), Value::Number(2.0));
        assert_eq!(ctx.eval("COUNTIF(A1:A4,\"?anana\")"), Value::Number(1.0));
        assert_eq!(ctx.eval("COUNTIF(A1:A4,\"A*\")"), Value::Number(2.0));
    }

    #[test]
    fn countif_with_comparators() {
        let ctx = fruit_ctx();
        assert_eq!(ctx.eval("COUNTIF(B1:B4,\">=25\")"), Value::Number(2.0));
        assert_eq!(ctx.eval("COUNTIF(B1:B4,\"<>20\")"), Value::Number(3.0));
        assert_eq!(ctx.eval("COUNTIF(B1:B4,\"<10\")"), Value::Number(0.0));
    }

    #[test]
    fn countif_exact_match_is_case_insensitive() {
        let ctx = fruit_ctx();
        assert_eq!(ctx.eval("COUNTIF(A1:A4,\"APPLE\")"), Value::Number(1.0));
        assert_eq!(ctx.eval("COUNTIF(B1:B4,20)"), Value::Number(1.0));
    }

    #[test]
    fn sumif_with_and_without_sum_range() {
        let ctx = fruit_ctx();
        assert_eq!(
            ctx.eval("SUMIF(A1:A4,\"a*\",B1:B4)"),
            Value::Number(30.0)
        );
        assert_eq!(ctx.eval("SUMIF(B1:B4,\">=25\")"), Value::Number(70.0));
    }

    #[test]
    fn sumif_truncates_to_the_shorter_range() {
        let ctx = fruit_ctx();
        // Sum range covers only two rows; the tail cannot match.
        assert_eq!(
            ctx.eval("SUMIF(A1:A4,\"*\",B1:B2)"),
            Value::Number(30.0)
        );
    }
}
