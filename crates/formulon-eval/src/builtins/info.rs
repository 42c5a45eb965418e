//! Type-inspection functions: ISERROR, ISBLANK, ISNUMBER, ISTEXT,
//! ISLOGICAL.
//!
//! This family observes error values instead of propagating them;
//! together with IFERROR it is the only place an error stops.

use std::sync::Arc;

use formulon_common::{CellError, Value};

use crate::function::Function;
use crate::function_registry::register_function;
use crate::traits::{ArgumentHandle, EvaluationContext};

macro_rules! predicate_fn {
    ($struct_name:ident, $fn_name:literal, $pred:expr) => {
        #[derive(Debug)]
        pub struct $struct_name;

        impl Function for $struct_name {
            fn name(&self) -> &'static str {
                $fn_name
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
                let v = args[0].value();
                #[allow(clippy::redundant_closure_call)]
                Ok(Value::Boolean(($pred)(&v)))
            }
        }
    };
}

predicate_fn!(IsErrorFn, "ISERROR", |v: &Value| v.is_error());
predicate_fn!(IsBlankFn, "ISBLANK", |v: &Value| v.is_empty());
predicate_fn!(IsNumberFn, "ISNUMBER", |v: &Value| matches!(
    v,
    Value::Number(_)
));
predicate_fn!(IsTextFn, "ISTEXT", |v: &Value| matches!(v, Value::Text(_)));
predicate_fn!(IsLogicalFn, "ISLOGICAL", |v: &Value| matches!(
    v,
    Value::Boolean(_)
));

pub fn register() {
    register_function(Arc::new(IsErrorFn));
    register_function(Arc::new(IsBlankFn));
    register_function(Arc::new(IsNumberFn));
    register_function(Arc::new(IsTextFn));
    register_function(Arc::new(IsLogicalFn));
}

#[cfg(test)]
mod tests {
    use crate::test_support::TestCtx;
    use formulon_common::Value;

    #[test]
    fn predicates_observe_instead_of_propagating() {
        let ctx = TestCtx::default();
        assert_eq!(ctx.eval("ISERROR(1/0)"), Value::Boolean(true));
        assert_eq!(ctx.eval("ISERROR(1)"), Value::Boolean(false));
        assert_eq!(ctx.eval("ISBLANK(A99)"), Value::Boolean(true));
        assert_eq!(ctx.eval("ISBLANK(#REF!)"), Value::Boolean(false));
        assert_eq!(ctx.eval("ISNUMBER(3.5)"), Value::Boolean(true));
        assert_eq!(ctx.eval("ISNUMBER(\"3.5\")"), Value::Boolean(false));
        assert_eq!(ctx.eval("ISTEXT(\"x\")"), Value::Boolean(true));
        assert_eq!(ctx.eval("ISLOGICAL(TRUE)"), Value::Boolean(true));
    }
}
