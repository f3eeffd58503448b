use std::fmt;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;

use super::value::ScriptValue;

/// A script-visible callable that indirectly references a native binding.
///
/// Holds `(canonical path, symbol)` rather than an entry pointer, so the
/// value a script captured stays identity-stable across reloads and turns
/// into a stale-binding error, never a wild call, after unload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeCallable {
    pub library: PathBuf,
    pub symbol: String,
}

impl fmt::Display for NativeCallable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn {}>", self.symbol)
    }
}

/// One slot in the global table.
#[derive(Debug, Clone)]
pub enum Global {
    /// A value owned by the embedding script environment.
    Value(ScriptValue),
    /// A callable installed and owned by the library registry.
    Native(NativeCallable),
}

/// The global name table the registry publishes into.
///
/// Insertion-ordered so enumeration (help output, tests) is deterministic.
#[derive(Debug, Default)]
pub struct Globals {
    slots: IndexMap<String, Global>,
}

impl Globals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a plain script value, replacing any previous slot.
    pub fn define_value(&mut self, name: impl Into<String>, value: ScriptValue) {
        self.slots.insert(name.into(), Global::Value(value));
    }

    /// Bind a registry-owned callable, replacing any previous slot.
    pub fn define_native(&mut self, name: impl Into<String>, callable: NativeCallable) {
        self.slots.insert(name.into(), Global::Native(callable));
    }

    pub fn get(&self, name: &str) -> Option<&Global> {
        self.slots.get(name)
    }

    /// Look up a native callable by name.
    pub fn native(&self, name: &str) -> Option<&NativeCallable> {
        match self.slots.get(name) {
            Some(Global::Native(callable)) => Some(callable),
            _ => None,
        }
    }

    /// Whether `name` is bound to a native callable owned by `library`.
    pub fn is_owned_by(&self, name: &str, library: &Path) -> bool {
        matches!(self.slots.get(name), Some(Global::Native(c)) if c.library == library)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Global> {
        self.slots.shift_remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.slots.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}
