//! The AST interpreter.
//!
//! Evaluation never panics and never returns `Err` to the embedder:
//! every failure becomes an error `Value` and propagates through
//! operator and function contracts. Cell references read values the
//! host has already computed; the dependency graph is responsible for
//! having ordered that work.

use std::cell::RefCell;

use rustc_hash::FxHashSet;

use formulon_common::{
    CellError, CellRef, ErrorKind, RangeRef, Value, compare_values,
};
use formulon_parse::{BinaryOp, Expr, UnaryOp, parse_formula};

use crate::engine::CellKey;
use crate::traits::{ArgumentHandle, EvaluationContext};

pub struct Interpreter<'a> {
    pub context: &'a dyn EvaluationContext,
    /// Keys currently on the evaluation stack; a reference to any of
    /// them is a `#CIRCULAR!`.
    evaluating: RefCell<FxHashSet<CellKey>>,
    /// Named ranges currently being resolved, to catch name cycles.
    evaluating_names: RefCell<FxHashSet<String>>,
}

impl<'a> Interpreter<'a> {
    pub fn new(context: &'a dyn EvaluationContext) -> Self {
        Self {
            context,
            evaluating: RefCell::new(FxHashSet::default()),
            evaluating_names: RefCell::new(FxHashSet::default()),
        }
    }

    /// Interpreter for a specific cell's formula; the cell's own key
    /// is seeded into the evaluation stack so self-references trip
    /// cycle detection.
    pub fn for_cell(context: &'a dyn EvaluationContext, key: CellKey) -> Self {
        let interp = Self::new(context);
        interp.evaluating.borrow_mut().insert(key);
        interp
    }

    /* ───────────────────── dispatch ───────────────────── */

    pub fn evaluate(&self, expr: &Expr) -> Value {
        match expr {
            Expr::Number(n) => Value::Number(*n),
            Expr::Text(s) => Value::Text(s.clone()),
            Expr::Boolean(b) => Value::Boolean(*b),
            Expr::Error(kind) => Value::error(*kind),
            Expr::Cell(r) => self.eval_cell_ref(r),
            // A range in scalar position collapses to its first cell.
            Expr::Range(r) => self.eval_range_scalar(r),
            Expr::Name(name) => self.eval_name(name),
            Expr::Unary { op, operand } => self.eval_unary(*op, operand),
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
            Expr::Call { name, args } => self.eval_call(name, args),
            // Degenerate reduction: the top-left element stands for the
            // whole literal. Spill semantics live outside this engine.
            Expr::Array(rows) => self.evaluate(&rows[0][0]),
        }
    }

    /* ───────────────────── references ───────────────────── */

    fn eval_cell_ref(&self, r: &CellRef) -> Value {
        self.read_cell(r.sheet.as_deref(), r.coord.row, r.coord.col)
    }

    fn read_cell(&self, sheet: Option<&str>, row: u32, col: u32) -> Value {
        match self.context.cell_key(sheet, row, col) {
            Some(key) if self.evaluating.borrow().contains(&key) => {
                Value::error(ErrorKind::Circular)
            }
            Some(_) => match self.context.cell_value(sheet, row, col) {
                Ok(v) => v,
                Err(e) => Value::Error(e),
            },
            None => Value::Error(CellError::new(ErrorKind::Ref).with_message(match sheet {
                Some(name) => format!("Unknown sheet '{name}'"),
                None => "Invalid cell reference".to_string(),
            })),
        }
    }

    fn eval_range_scalar(&self, r: &RangeRef) -> Value {
        match r.cells().next() {
            Some((row, col)) => self.read_cell(r.sheet.as_deref(), row, col),
            None => Value::Empty,
        }
    }

    /// Row-major values of every cell in the range. Used for ranges in
    /// function-argument position.
    pub(crate) fn range_values(&self, r: &RangeRef) -> Vec<Value> {
        let sheet = r.sheet.as_deref();
        r.cells()
            .map(|(row, col)| self.read_cell(sheet, row, col))
            .collect()
    }

    /* ───────────────────── named ranges ───────────────────── */

    fn eval_name(&self, name: &str) -> Value {
        let folded = name.to_uppercase();
        let Some(definition) = self.context.named_range(name) else {
            return Value::error(ErrorKind::Name);
        };
        if !self.evaluating_names.borrow_mut().insert(folded.clone()) {
            return Value::error(ErrorKind::Circular);
        }
        let result = match parse_formula(&definition) {
            Ok(expr) => self.evaluate(&expr),
            Err(e) => Value::Error(e.into()),
        };
        self.evaluating_names.borrow_mut().remove(&folded);
        result
    }

    /// Parsed definition of a named range, for callers that want to
    /// expand a name standing for a range.
    pub(crate) fn named_definition(&self, name: &str) -> Result<Expr, CellError> {
        let definition = self
            .context
            .named_range(name)
            .ok_or_else(|| CellError::new(ErrorKind::Name))?;
        parse_formula(&definition).map_err(Into::into)
    }

    /* ───────────────────── operators ───────────────────── */

    fn eval_unary(&self, op: UnaryOp, operand: &Expr) -> Value {
        let v = self.evaluate(operand);
        if v.is_error() {
            return v;
        }
        let n = match v.as_number() {
            Ok(n) => n,
            Err(e) => return Value::Error(e),
        };
        match op {
            UnaryOp::Plus => Value::Number(n),
            UnaryOp::Minus => Value::Number(-n),
            UnaryOp::Percent => Value::Number(n / 100.0),
        }
    }

    fn eval_binary(&self, op: BinaryOp, lhs: &Expr, rhs: &Expr) -> Value {
        let l = self.evaluate(lhs);
        if l.is_error() {
            return l;
        }
        let r = self.evaluate(rhs);
        if r.is_error() {
            return r;
        }

        if op.is_comparison() {
            let ord = compare_values(&l, &r);
            let result = match op {
                BinaryOp::Eq => ord.is_eq(),
                BinaryOp::Ne => ord.is_ne(),
                BinaryOp::Lt => ord.is_lt(),
                BinaryOp::Le => ord.is_le(),
                BinaryOp::Gt => ord.is_gt(),
                BinaryOp::Ge => ord.is_ge(),
                _ => unreachable!(),
            };
            return Value::Boolean(result);
        }

        match op {
            BinaryOp::Concat => {
                let mut text = l.to_display_text();
                text.push_str(&r.to_display_text());
                Value::Text(text)
            }
            BinaryOp::Div => {
                // Denominator first: dividing by zero reports #DIV/0!
                // even when the numerator would not coerce.
                let denom = match r.as_number() {
                    Ok(n) => n,
                    Err(e) => return Value::Error(e),
                };
                if denom == 0.0 {
                    return Value::error(ErrorKind::Div);
                }
                match l.as_number() {
                    Ok(num) => Value::Number(num / denom),
                    Err(e) => Value::Error(e),
                }
            }
            BinaryOp::Pow => {
                let (a, b) = match (l.as_number(), r.as_number()) {
                    (Ok(a), Ok(b)) => (a, b),
                    (Err(e), _) | (_, Err(e)) => return Value::Error(e),
                };
                let result = a.powf(b);
                if result.is_finite() {
                    Value::Number(result)
                } else {
                    Value::error(ErrorKind::Num)
                }
            }
            _ => {
                let (a, b) = match (l.as_number(), r.as_number()) {
                    (Ok(a), Ok(b)) => (a, b),
                    (Err(e), _) | (_, Err(e)) => return Value::Error(e),
                };
                match op {
                    BinaryOp::Add => Value::Number(a + b),
                    BinaryOp::Sub => Value::Number(a - b),
                    BinaryOp::Mul => Value::Number(a * b),
                    _ => unreachable!(),
                }
            }
        }
    }

    /* ───────────────────── function calls ───────────────────── */

    fn eval_call(&self, name: &str, args: &[Expr]) -> Value {
        let Some(function) = self.context.function(name) else {
            return Value::error(ErrorKind::Name);
        };

        let count = args.len();
        if count < function.min_args() {
            return Value::Error(CellError::new(ErrorKind::Value).with_message(format!(
                "{name} expects at least {} argument(s), got {count}",
                function.min_args()
            )));
        }
        if let Some(max) = function.max_args() {
            if count > max {
                return Value::Error(CellError::new(ErrorKind::Value).with_message(format!(
                    "{name} expects at most {max} argument(s), got {count}"
                )));
            }
        }

        let handles: Vec<ArgumentHandle<'_, '_>> = args
            .iter()
            .map(|node| ArgumentHandle::new(node, self))
            .collect();
        match function.eval(&handles, self.context) {
            Ok(v) => v,
            // A fault escaping a function body surfaces as #VALUE!
            // carrying the message; the engine itself never throws.
            Err(e) => Value::Error(
                CellError::new(ErrorKind::Value).with_message(e.to_string()),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::TestCtx;

    #[test]
    fn literal_arithmetic() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("1+2*3"), Value::Number(7.0));
        assert_eq!(ctx.eval("(1+2)*3"), Value::Number(9.0));
        assert_eq!(ctx.eval("2^3^2"), Value::Number(512.0));
        assert_eq!(ctx.eval("-2^2"), Value::Number(4.0));
        assert_eq!(ctx.eval("50%"), Value::Number(0.5));
        assert_eq!(ctx.eval("10/4"), Value::Number(2.5));
    }

    #[test]
    fn division_by_zero() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("10/0"), Value::error(ErrorKind::Div));
        // Denominator wins over a bad numerator.
        assert_eq!(ctx.eval("\"x\"/0"), Value::error(ErrorKind::Div));
    }

    #[test]
    fn power_domain() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("2^10"), Value::Number(1024.0));
        assert_eq!(ctx.eval("(0-1)^0.5"), Value::error(ErrorKind::Num));
    }

    #[test]
    fn concatenation_coerces() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("\"a\"&\"b\""), Value::Text("ab".into()));
        assert_eq!(ctx.eval("\"n=\"&42"), Value::Text("n=42".into()));
        assert_eq!(ctx.eval("TRUE&1"), Value::Text("TRUE1".into()));
    }

    #[test]
    fn comparisons_follow_the_law() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("1<2"), Value::Boolean(true));
        assert_eq!(ctx.eval("2<=2"), Value::Boolean(true));
        assert_eq!(ctx.eval("1=1"), Value::Boolean(true));
        assert_eq!(ctx.eval("1<>1"), Value::Boolean(false));
        // Numbers sort before text, so a number never equals a text.
        assert_eq!(ctx.eval("1=\"1\""), Value::Boolean(false));
        assert_eq!(ctx.eval("1<\"1\""), Value::Boolean(true));
        // Case-insensitive text comparison.
        assert_eq!(ctx.eval("\"ABC\"=\"abc\""), Value::Boolean(false));
        assert_eq!(ctx.eval("\"apple\"<\"BANANA\""), Value::Boolean(true));
    }

    #[test]
    fn errors_propagate_through_operators() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("#REF!+1"), Value::error(ErrorKind::Ref));
        assert_eq!(ctx.eval("1+#N/A"), Value::error(ErrorKind::Na));
        assert_eq!(ctx.eval("-#NUM!"), Value::error(ErrorKind::Num));
        assert_eq!(ctx.eval("#NAME?=1"), Value::error(ErrorKind::Name));
        assert_eq!(ctx.eval("\"a\"&#VALUE!"), Value::error(ErrorKind::Value));
    }

    #[test]
    fn cell_references_read_computed_values() {
        let mut ctx = TestCtx::default();
        ctx.set(0, 0, Value::Number(10.0));
        assert_eq!(ctx.eval("A1*2"), Value::Number(20.0));
        // Never-set cells are empty, and empty coerces to zero.
        assert_eq!(ctx.eval("B7+5"), Value::Number(5.0));
    }

    #[test]
    fn unknown_sheet_is_ref() {
        let ctx = TestCtx::default();
        let v = ctx.eval("Nowhere!A1");
        match v {
            Value::Error(e) => assert_eq!(e.kind, ErrorKind::Ref),
            other => panic!("expected #REF!, got {other:?}"),
        }
    }

    #[test]
    fn self_reference_is_circular() {
        let mut ctx = TestCtx::default();
        ctx.set(0, 0, Value::Number(1.0));
        let interp = Interpreter::for_cell(&ctx, CellKey::new(0, 0, 0));
        let v = interp.evaluate(&parse_formula("A1+1").unwrap());
        assert_eq!(v, Value::error(ErrorKind::Circular));
    }

    #[test]
    fn range_in_scalar_position_collapses() {
        let mut ctx = TestCtx::default();
        ctx.set(0, 0, Value::Number(3.0));
        ctx.set(1, 0, Value::Number(4.0));
        assert_eq!(ctx.eval("A1:A2+0"), Value::Number(3.0));
    }

    #[test]
    fn array_literal_reduces_to_first_element() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("{1,2;3,4}"), Value::Number(1.0));
        assert_eq!(ctx.eval("{1+1,5}"), Value::Number(2.0));
    }

    #[test]
    fn named_ranges_resolve_their_definition() {
        let mut ctx = TestCtx::default();
        ctx.set(0, 0, Value::Number(21.0));
        ctx.names.insert("DOUBLE".into(), "A1*2".into());
        assert_eq!(ctx.eval("Double"), Value::Number(42.0));
        assert_eq!(ctx.eval("Missing"), Value::error(ErrorKind::Name));
    }

    #[test]
    fn name_cycles_are_circular() {
        let mut ctx = TestCtx::default();
        ctx.names.insert("LOOP".into(), "Loop+1".into());
        assert_eq!(ctx.eval("LOOP"), Value::error(ErrorKind::Circular));
    }

    #[test]
    fn unknown_function_is_name_error() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("NOSUCHFN(1)"), Value::error(ErrorKind::Name));
    }

    #[test]
    fn arity_violation_is_reported_before_the_body() {
        let ctx = TestCtx::default();
        let v = ctx.eval("ABS(1,2)");
        match v {
            Value::Error(e) => assert_eq!(e.kind, ErrorKind::Value),
            other => panic!("expected #VALUE!, got {other:?}"),
        }
    }
}
