//! Process-wide function registry.
//!
//! Built-ins are registered once at startup; per-context overlays
//! (embedder functions) are consulted first by the evaluation context,
//! so nothing here is consulted for an overridden name.

use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::Lazy;

use crate::function::Function;

// Case-insensitive registry keyed by uppercase name.
static REG: Lazy<DashMap<String, Arc<dyn Function>>> = Lazy::new(DashMap::new);

#[inline]
fn norm<S: AsRef<str>>(s: S) -> String {
    s.as_ref().to_uppercase()
}

pub fn register_function(f: Arc<dyn Function>) {
    REG.insert(norm(f.name()), f);
}

pub fn get(name: &str) -> Option<Arc<dyn Function>> {
    crate::builtins::ensure_builtins();
    REG.get(&norm(name)).map(|v| Arc::clone(v.value()))
}

/// Number of registered functions; mainly useful in tests.
pub fn len() -> usize {
    crate::builtins::ensure_builtins();
    REG.len()
}
