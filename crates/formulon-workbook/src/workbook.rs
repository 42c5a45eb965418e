//! The workbook façade: the one surface the embedding application
//! sees.
//!
//! `set_cell` parses on write and keeps the dependency graph current;
//! `recalculate` walks the graph's topological order and writes
//! computed values back. The workbook is single-threaded by design:
//! no locks, no interior mutability, caller-thread execution only.

use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::{debug, trace};

use formulon_common::{CellError, ErrorKind, Value, parse_input};
use formulon_eval::engine::{CellKey, DependencyGraph, PackedCoord, SheetId, SheetRegistry};
use formulon_eval::{EvaluationContext, Function, Interpreter, function_registry};
use formulon_parse::{Expr, RefView, parse_formula};

use crate::error::WorkbookError;
use crate::worksheet::{Cell, Sheet};

/// A named range: a case-insensitively addressable formula fragment.
#[derive(Debug, Clone)]
pub struct NamedRange {
    pub name: String,
    pub definition: String,
}

#[derive(Default)]
pub struct Workbook {
    sheets: Vec<Sheet>,
    registry: SheetRegistry,
    graph: DependencyGraph,
    named_ranges: Vec<NamedRange>,
    name_index: FxHashMap<String, usize>,
    /// Per-workbook function overlay, consulted before the global
    /// registry. This is where embedder functions plug in.
    functions: FxHashMap<String, Arc<dyn Function>>,
}

impl Workbook {
    pub fn new() -> Self {
        Workbook::default()
    }

    /* ───────────────────── sheets ───────────────────── */

    pub fn add_sheet(&mut self, name: &str) -> Result<SheetId, WorkbookError> {
        if self.registry.get_id(name).is_some() {
            return Err(WorkbookError::DuplicateSheet(name.to_string()));
        }
        let id = self.registry.id_for(name);
        self.sheets.push(Sheet::new(name));
        debug!(sheet = name, id, "sheet added");
        Ok(id)
    }

    pub fn sheet(&self, name: &str) -> Option<&Sheet> {
        self.registry
            .get_id(name)
            .map(|id| &self.sheets[id as usize])
    }

    /// Sheets in creation order.
    pub fn sheets(&self) -> impl Iterator<Item = &Sheet> {
        self.sheets.iter()
    }

    fn sheet_id(&self, name: &str) -> Result<SheetId, WorkbookError> {
        self.registry
            .get_id(name)
            .ok_or_else(|| WorkbookError::UnknownSheet(name.to_string()))
    }

    fn check_bounds(row: u32, col: u32) -> Result<(), WorkbookError> {
        if PackedCoord::in_bounds(row, col) {
            Ok(())
        } else {
            Err(WorkbookError::OutOfBounds { row, col })
        }
    }

    /// Graph key of an address; usable with the dependency surface.
    pub fn cell_key(&self, sheet: &str, row: u32, col: u32) -> Result<CellKey, WorkbookError> {
        Self::check_bounds(row, col)?;
        Ok(CellKey::new(self.sheet_id(sheet)?, row, col))
    }

    /* ───────────────────── cells ───────────────────── */

    /// Assign raw text to a cell: `=...` is a formula, anything else a
    /// literal input. Returns the changed set to feed `recalculate`.
    pub fn set_cell(
        &mut self,
        sheet: &str,
        row: u32,
        col: u32,
        raw: &str,
    ) -> Result<Vec<CellKey>, WorkbookError> {
        Self::check_bounds(row, col)?;
        let sheet_id = self.sheet_id(sheet)?;
        let key = CellKey::new(sheet_id, row, col);
        let is_formula = raw.starts_with('=');

        let (ast, value) = if is_formula {
            match parse_formula(raw) {
                Ok(expr) => (Some(expr), Value::Empty),
                Err(e) => (None, Value::Error(e.into())),
            }
        } else {
            (None, parse_input(raw))
        };

        let precedents = match &ast {
            Some(expr) => self.collect_precedents(expr, sheet_id),
            None => Vec::new(),
        };
        self.graph.update_dependencies(key, precedents);

        self.sheets[sheet_id as usize].cells.insert(
            (row, col),
            Cell {
                raw: raw.to_string(),
                is_formula,
                ast,
                value,
            },
        );
        trace!(sheet, row, col, is_formula, "cell set");
        Ok(vec![key])
    }

    /// The cell at an address, created empty on first access.
    pub fn get_cell(
        &mut self,
        sheet: &str,
        row: u32,
        col: u32,
    ) -> Result<&Cell, WorkbookError> {
        Self::check_bounds(row, col)?;
        let sheet_id = self.sheet_id(sheet)?;
        Ok(self.sheets[sheet_id as usize]
            .cells
            .entry((row, col))
            .or_default())
    }

    /// Computed value without creating the cell.
    pub fn cell_value(&self, sheet: &str, row: u32, col: u32) -> Result<Value, WorkbookError> {
        let sheet_id = self.sheet_id(sheet)?;
        Ok(self.sheets[sheet_id as usize].value(row, col))
    }

    /// Delete a cell and its graph entry. The returned changed set
    /// includes the former dependents so they can be recalculated.
    pub fn remove_cell(
        &mut self,
        sheet: &str,
        row: u32,
        col: u32,
    ) -> Result<Vec<CellKey>, WorkbookError> {
        Self::check_bounds(row, col)?;
        let sheet_id = self.sheet_id(sheet)?;
        let key = CellKey::new(sheet_id, row, col);
        let dependents = self.graph.dependents(key);
        self.graph.remove_cell(key);
        self.sheets[sheet_id as usize].cells.remove(&(row, col));
        Ok(std::iter::once(key).chain(dependents).collect())
    }

    /* ───────────────────── named ranges ───────────────────── */

    pub fn define_name(&mut self, name: &str, definition: &str) {
        let folded = name.to_uppercase();
        match self.name_index.get(&folded) {
            Some(&idx) => self.named_ranges[idx].definition = definition.to_string(),
            None => {
                self.name_index.insert(folded, self.named_ranges.len());
                self.named_ranges.push(NamedRange {
                    name: name.to_string(),
                    definition: definition.to_string(),
                });
            }
        }
    }

    pub fn named_range(&self, name: &str) -> Option<&NamedRange> {
        self.name_index
            .get(&name.to_uppercase())
            .map(|&idx| &self.named_ranges[idx])
    }

    pub fn named_ranges(&self) -> impl Iterator<Item = &NamedRange> {
        self.named_ranges.iter()
    }

    /* ───────────────────── functions ───────────────────── */

    /// Register an embedder function on this workbook's overlay; it
    /// shadows a global built-in of the same name.
    pub fn register_function(&mut self, f: Arc<dyn Function>) {
        self.functions.insert(f.name().to_uppercase(), f);
    }

    /* ───────────────────── dependency surface ───────────────────── */

    pub fn dependents(&self, key: CellKey) -> Vec<CellKey> {
        self.graph.dependents(key)
    }

    pub fn precedents(&self, key: CellKey) -> Vec<CellKey> {
        self.graph.precedents(key)
    }

    pub fn recalculation_order(&self, changed: &[CellKey]) -> Vec<CellKey> {
        self.graph.recalculation_order(changed)
    }

    pub fn has_circular_reference(&self, key: CellKey) -> bool {
        self.graph.has_circular_reference(key)
    }

    pub fn circular_reference_cells(&self, key: CellKey) -> Vec<CellKey> {
        self.graph.circular_reference_cells(key)
    }

    /* ───────────────────── recalculation ───────────────────── */

    /// Re-evaluate every dependent of the changed set in topological
    /// order, writing computed values back. Returns the keys whose
    /// formulas were evaluated.
    pub fn recalculate(&mut self, changed: &[CellKey]) -> Vec<CellKey> {
        let order = self.graph.recalculation_order(changed);
        debug!(changed = changed.len(), closure = order.len(), "recalculate");

        let mut evaluated = Vec::new();
        for &key in &order {
            let sheet_idx = key.sheet() as usize;
            if sheet_idx >= self.sheets.len() {
                continue;
            }
            let coords = (key.row(), key.col());

            // Cached AST, or the raw text when the cache is cold.
            let cached = match self.sheets[sheet_idx].cells.get(&coords) {
                Some(cell) if cell.is_formula => match &cell.ast {
                    Some(ast) => Ok(ast.clone()),
                    None => Err(cell.raw.clone()),
                },
                _ => continue,
            };
            let ast = match cached {
                Ok(ast) => ast,
                Err(raw) => match parse_formula(&raw) {
                    Ok(ast) => ast,
                    Err(e) => {
                        if let Some(cell) = self.sheets[sheet_idx].cells.get_mut(&coords) {
                            cell.value = Value::Error(e.into());
                        }
                        continue;
                    }
                },
            };

            let value = if self.graph.has_circular_reference(key) {
                Value::error(ErrorKind::Circular)
            } else {
                let ctx = WorkbookCtx {
                    workbook: self,
                    sheet: key.sheet(),
                };
                let interp = Interpreter::for_cell(&ctx, key);
                interp.evaluate(&ast)
            };

            if let Some(cell) = self.sheets[sheet_idx].cells.get_mut(&coords) {
                cell.value = value;
            }
            evaluated.push(key);
        }
        evaluated
    }

    /* ───────────────────── dependency extraction ───────────────────── */

    /// Every cell key the expression reads: single references, every
    /// cell of every range, and (transitively) the references inside
    /// named-range definitions.
    fn collect_precedents(&self, expr: &Expr, sheet_id: SheetId) -> Vec<CellKey> {
        let mut keys = Vec::new();
        let mut seen_names = FxHashSet::default();
        self.collect_into(expr, sheet_id, &mut keys, &mut seen_names);
        keys
    }

    fn collect_into(
        &self,
        expr: &Expr,
        sheet_id: SheetId,
        keys: &mut Vec<CellKey>,
        seen_names: &mut FxHashSet<String>,
    ) {
        let resolve = |sheet: Option<&str>| -> Option<SheetId> {
            match sheet {
                None => Some(sheet_id),
                // References into sheets that do not exist contribute
                // no edges; evaluation reports #REF! for them.
                Some(name) => self.registry.get_id(name),
            }
        };

        // Out-of-bounds references contribute no edges; evaluation
        // reports #REF! for them.
        expr.visit_refs(|rv| match rv {
            RefView::Cell(c) => {
                if let Some(id) = resolve(c.sheet.as_deref()) {
                    if PackedCoord::in_bounds(c.coord.row, c.coord.col) {
                        keys.push(CellKey::new(id, c.coord.row, c.coord.col));
                    }
                }
            }
            RefView::Range(r) => {
                if let Some(id) = resolve(r.sheet.as_deref()) {
                    for (row, col) in r.cells() {
                        if PackedCoord::in_bounds(row, col) {
                            keys.push(CellKey::new(id, row, col));
                        }
                    }
                }
            }
        });

        // Named ranges: pull the references out of their definitions,
        // guarding against name cycles.
        let mut stack = vec![expr];
        while let Some(node) = stack.pop() {
            match node {
                Expr::Name(name) => {
                    let folded = name.to_uppercase();
                    if !seen_names.insert(folded.clone()) {
                        continue;
                    }
                    if let Some(range) = self.named_range(&folded) {
                        if let Ok(def) = parse_formula(&range.definition) {
                            self.collect_into(&def, sheet_id, keys, seen_names);
                        }
                    }
                }
                Expr::Unary { operand, .. } => stack.push(operand),
                Expr::Binary { lhs, rhs, .. } => {
                    stack.push(lhs);
                    stack.push(rhs);
                }
                Expr::Call { args, .. } => stack.extend(args.iter()),
                Expr::Array(rows) => stack.extend(rows.iter().flatten()),
                _ => {}
            }
        }
    }
}

/// The evaluation context the interpreter sees: a borrowed workbook
/// plus the sheet the formula lives on.
struct WorkbookCtx<'a> {
    workbook: &'a Workbook,
    sheet: SheetId,
}

impl WorkbookCtx<'_> {
    fn resolve_sheet(&self, sheet: Option<&str>) -> Option<SheetId> {
        match sheet {
            None => Some(self.sheet),
            Some(name) => self.workbook.registry.get_id(name),
        }
    }
}

impl EvaluationContext for WorkbookCtx<'_> {
    fn current_sheet(&self) -> &str {
        self.workbook.registry.name(self.sheet)
    }

    fn cell_value(&self, sheet: Option<&str>, row: u32, col: u32) -> Result<Value, CellError> {
        let id = self.resolve_sheet(sheet).ok_or_else(|| {
            CellError::new(ErrorKind::Ref)
                .with_message(format!("Unknown sheet '{}'", sheet.unwrap_or("")))
        })?;
        Ok(self.workbook.sheets[id as usize].value(row, col))
    }

    fn cell_key(&self, sheet: Option<&str>, row: u32, col: u32) -> Option<CellKey> {
        if !PackedCoord::in_bounds(row, col) {
            return None;
        }
        self.resolve_sheet(sheet)
            .map(|id| CellKey::new(id, row, col))
    }

    fn named_range(&self, name: &str) -> Option<String> {
        self.workbook
            .named_range(name)
            .map(|nr| nr.definition.clone())
    }

    fn function(&self, name: &str) -> Option<Arc<dyn Function>> {
        self.workbook
            .functions
            .get(&name.to_uppercase())
            .cloned()
            .or_else(|| function_registry::get(name))
    }
}
