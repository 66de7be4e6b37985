//! Compile-time namespaces.

use std::collections::HashMap;

/// Ordered set of names, each with a slot index.
///
/// Redeclaring a name with [`StaticNs::add`] gives it a fresh slot; the old
/// slot stays allocated so closures that captured it keep working.
#[derive(Debug, Clone, Default)]
pub struct StaticNs {
    names: Vec<String>,
    index: HashMap<String, usize>,
}

impl StaticNs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut ns = Self::new();
        for name in names {
            ns.add(name);
        }
        ns
    }

    /// Number of slots, including shadowed ones.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declare `name` in a new slot.
    pub fn add(&mut self, name: impl Into<String>) -> usize {
        let name = name.into();
        let slot = self.names.len();
        self.index.insert(name.clone(), slot);
        self.names.push(name);
        slot
    }

    /// Slot of `name`, declaring it if absent.
    pub fn ensure(&mut self, name: &str) -> usize {
        match self.get(name) {
            Some(slot) => slot,
            None => self.add(name),
        }
    }

    /// Hide `name` from lookups; its slot stays allocated.
    pub fn remove(&mut self, name: &str) -> Option<usize> {
        self.index.remove(name)
    }

    /// Name of each slot, in slot order.
    pub fn slot_names(&self) -> &[String] {
        &self.names
    }

    /// Currently visible names, in slot order.
    pub fn visible(&self) -> impl Iterator<Item = &str> {
        self.names
            .iter()
            .enumerate()
            .filter(|(slot, name)| self.index.get(name.as_str()) == Some(slot))
            .map(|(_, name)| name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redeclaring_gets_new_slot() {
        let mut ns = StaticNs::new();
        assert_eq!(ns.add("x"), 0);
        assert_eq!(ns.add("y"), 1);
        assert_eq!(ns.add("x"), 2);
        assert_eq!(ns.get("x"), Some(2));
        assert_eq!(ns.len(), 3);
        assert_eq!(ns.visible().collect::<Vec<_>>(), vec!["y", "x"]);
    }

    #[test]
    fn ensure_reuses() {
        let mut ns = StaticNs::from_names(["a"]);
        assert_eq!(ns.ensure("a"), 0);
        assert_eq!(ns.ensure("b"), 1);
    }

    #[test]
    fn remove_hides_but_keeps_slot() {
        let mut ns = StaticNs::from_names(["a", "b"]);
        assert_eq!(ns.remove("a"), Some(0));
        assert!(!ns.has("a"));
        assert_eq!(ns.len(), 2);
        assert_eq!(ns.add("c"), 2);
    }
}
