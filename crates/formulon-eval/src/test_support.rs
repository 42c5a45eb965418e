//! In-memory evaluation context for unit tests: one implicit sheet
//! named "Sheet1" plus optional named ranges.

use rustc_hash::FxHashMap;

use formulon_common::{CellError, ErrorKind, Value};
use formulon_parse::parse_formula;

use crate::engine::CellKey;
use crate::interpreter::Interpreter;
use crate::traits::EvaluationContext;

#[derive(Default)]
pub(crate) struct TestCtx {
    pub cells: FxHashMap<(u32, u32), Value>,
    pub names: FxHashMap<String, String>,
}

impl TestCtx {
    pub fn set(&mut self, row: u32, col: u32, v: Value) -> &mut Self {
        self.cells.insert((row, col), v);
        self
    }

    /// Fill a column starting at `(row, col)` going down.
    pub fn set_column(&mut self, row: u32, col: u32, values: &[Value]) -> &mut Self {
        for (i, v) in values.iter().enumerate() {
            self.cells.insert((row + i as u32, col), v.clone());
        }
        self
    }

    pub fn eval(&self, src: &str) -> Value {
        let interp = Interpreter::new(self);
        interp.evaluate(&parse_formula(src).unwrap())
    }
}

impl EvaluationContext for TestCtx {
    fn current_sheet(&self) -> &str {
        "Sheet1"
    }

    fn cell_value(&self, sheet: Option<&str>, row: u32, col: u32) -> Result<Value, CellError> {
        match sheet {
            None | Some("Sheet1") => {
                Ok(self.cells.get(&(row, col)).cloned().unwrap_or(Value::Empty))
            }
            Some(other) => Err(CellError::new(ErrorKind::Ref)
                .with_message(format!("Unknown sheet '{other}'"))),
        }
    }

    fn cell_key(&self, sheet: Option<&str>, row: u32, col: u32) -> Option<CellKey> {
        match sheet {
            None | Some("Sheet1") => Some(CellKey::new(0, row, col)),
            Some(_) => None,
        }
    }

    fn named_range(&self, name: &str) -> Option<String> {
        self.names.get(&name.to_uppercase()).cloned()
    }
}
