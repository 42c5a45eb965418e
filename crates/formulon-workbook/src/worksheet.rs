use rustc_hash::FxHashMap;

use formulon_common::Value;
use formulon_parse::Expr;

/// One cell: the raw text the user typed, the parsed formula when
/// there is one, and the computed value.
///
/// Invariants: `is_formula` iff `raw` starts with `=`; `ast` is
/// present iff `is_formula` and the raw text parsed.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub raw: String,
    pub is_formula: bool,
    pub ast: Option<Expr>,
    pub value: Value,
}

/// A sheet: a name and a sparse cell map keyed by `(row, col)`.
#[derive(Debug, Default)]
pub struct Sheet {
    name: String,
    pub(crate) cells: FxHashMap<(u32, u32), Cell>,
}

impl Sheet {
    pub(crate) fn new(name: &str) -> Self {
        Sheet {
            name: name.to_string(),
            cells: FxHashMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cell(&self, row: u32, col: u32) -> Option<&Cell> {
        self.cells.get(&(row, col))
    }

    /// Computed value; `Empty` for never-set addresses.
    pub fn value(&self, row: u32, col: u32) -> Value {
        self.cells
            .get(&(row, col))
            .map(|c| c.value.clone())
            .unwrap_or(Value::Empty)
    }

    /// Number of cells that have ever been set.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&(u32, u32), &Cell)> {
        self.cells.iter()
    }
}
