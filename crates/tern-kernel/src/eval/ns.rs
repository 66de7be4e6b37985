//! Variables, cells and run-time namespaces.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use super::value::Value;
use crate::builtins::Builtin;
use crate::compile::StaticNs;

/// Storage for one variable.
#[derive(Default)]
pub struct Var(RwLock<Value>);

impl Var {
    pub fn new(value: Value) -> Self {
        Self(RwLock::new(value))
    }

    pub fn get(&self) -> Value {
        self.0.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn set(&self, value: Value) {
        *self.0.write().unwrap_or_else(|e| e.into_inner()) = value;
    }
}

impl fmt::Debug for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Var({:?})", self.get())
    }
}

/// A shared variable. Closures hold the same cell as the scope that
/// declared the variable, so later assignments are visible to them.
pub type Cell = Arc<Var>;

pub fn new_cell(value: Value) -> Cell {
    Arc::new(Var::new(value))
}

/// Ordered mapping from names to cells.
#[derive(Clone, Default)]
pub struct Ns {
    name: String,
    names: Vec<String>,
    cells: Vec<Cell>,
    index: HashMap<String, usize>,
}

impl Ns {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Append a cell. A repeated name shadows the earlier slot.
    pub fn push(&mut self, name: impl Into<String>, cell: Cell) -> usize {
        let name = name.into();
        let slot = self.cells.len();
        self.index.insert(name.clone(), slot);
        self.names.push(name);
        self.cells.push(cell);
        slot
    }

    pub fn get(&self, name: &str) -> Option<&Cell> {
        self.index.get(name).map(|i| &self.cells[*i])
    }

    pub fn slot(&self, slot: usize) -> Option<&Cell> {
        self.cells.get(slot)
    }

    /// Visible names, in slot order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .enumerate()
            .filter(|(slot, name)| self.index.get(name.as_str()) == Some(slot))
            .map(|(_, name)| name.as_str())
    }

    /// Resolve a `a:b:c` style path through nested namespaces.
    pub fn lookup(&self, path: &str) -> Option<Cell> {
        if let Some(cell) = self.get(path) {
            return Some(cell.clone());
        }
        let colon = path.find(':')?;
        let (base, rest) = path.split_at(colon + 1);
        match self.get(base)?.get() {
            Value::Ns(inner) => inner.lookup(rest),
            _ => None,
        }
    }

    /// The compile-time view: same names, same slots.
    pub fn static_ns(&self) -> StaticNs {
        StaticNs::from_names(self.names.iter().cloned())
    }
}

impl fmt::Debug for Ns {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ns").field("name", &self.name).field("names", &self.names).finish()
    }
}

/// Builds a namespace for registration with an evaluator.
///
/// ```ignore
/// let ns = NsBuilder::new("str")
///     .add_var("sep", Value::str(","))
///     .add_fn(Join)
///     .build();
/// evaler.add_module(ns);
/// ```
pub struct NsBuilder {
    ns: Ns,
}

impl NsBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self { ns: Ns::new(name) }
    }

    pub fn add_var(mut self, name: impl Into<String>, value: Value) -> Self {
        self.ns.push(name, new_cell(value));
        self
    }

    /// Register a function under `name~`, named after [`Builtin::name`].
    pub fn add_fn(mut self, f: impl Builtin + 'static) -> Self {
        let name = format!("{}~", f.name());
        self.ns.push(name, new_cell(Value::Builtin(Arc::new(f))));
        self
    }

    /// Register a nested namespace under `name:`.
    pub fn add_ns(mut self, ns: Ns) -> Self {
        let name = format!("{}:", ns.name());
        self.ns.push(name, new_cell(Value::Ns(Arc::new(ns))));
        self
    }

    pub fn build(self) -> Ns {
        self.ns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cells_are_shared() {
        let cell = new_cell(Value::from("a"));
        let alias = cell.clone();
        alias.set(Value::from("b"));
        assert_eq!(cell.get(), Value::from("b"));
    }

    #[test]
    fn nested_lookup() {
        let inner = NsBuilder::new("inner").add_var("x", Value::from("1")).build();
        let outer = NsBuilder::new("outer").add_ns(inner).build();
        assert_eq!(outer.lookup("inner:x").map(|c| c.get()), Some(Value::from("1")));
        assert!(outer.lookup("inner:y").is_none());
        assert!(outer.lookup("x").is_none());
    }

    #[test]
    fn static_view_matches_slots() {
        let ns = NsBuilder::new("m").add_var("a", Value::Nil).add_var("b", Value::Nil).build();
        let st = ns.static_ns();
        assert_eq!(st.get("b"), Some(1));
        assert_eq!(ns.names().collect::<Vec<_>>(), vec!["a", "b"]);
    }
}
