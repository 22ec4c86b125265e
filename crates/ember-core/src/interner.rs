//! Attribute-name interning.
//!
//! Class attribute names are compared by identity constantly during later
//! compiler passes (name resolution, code generation), so the parser's
//! cooperation with the project (§6, `attribute_name_to_id`) is limited to
//! handing back a small `Copy` id instead of a `String` every time an
//! attribute name is seen. Backing storage is a caller-supplied
//! `bumpalo::Bump`: interning only ever grows, so a bump allocator avoids
//! the per-string heap allocation a `HashMap<String, AttributeId>` would
//! otherwise pay for every owned key.

use bumpalo::Bump;
use std::collections::HashMap;

/// Id of an interned attribute name. Stable for the lifetime of the owning
/// [`AttributeInterner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AttributeId(u32);

/// `attribute_name_to_id(name, create)` from the compile-project interface
/// (§6). `create = false` is a query-only lookup used by later passes that
/// must not grow the table.
pub struct AttributeInterner<'bump> {
    bump: &'bump Bump,
    by_name: HashMap<&'bump str, AttributeId>,
    names: Vec<&'bump str>,
}

impl<'bump> AttributeInterner<'bump> {
    pub fn new(bump: &'bump Bump) -> Self {
        AttributeInterner {
            bump,
            by_name: HashMap::new(),
            names: Vec::new(),
        }
    }

    /// Intern `name`, or if `create` is false, only look it up.
    pub fn attribute_name_to_id(&mut self, name: &str, create: bool) -> Option<AttributeId> {
        if let Some(&id) = self.by_name.get(name) {
            return Some(id);
        }
        if !create {
            return None;
        }
        let interned: &'bump str = self.bump.alloc_str(name);
        let id = AttributeId(self.names.len() as u32);
        self.names.push(interned);
        self.by_name.insert(interned, id);
        Some(id)
    }

    pub fn name_of(&self, id: AttributeId) -> &str {
        self.names[id.0 as usize]
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_same_name_twice_returns_same_id() {
        let bump = Bump::new();
        let mut interner = AttributeInterner::new(&bump);
        let a = interner.attribute_name_to_id("x", true).unwrap();
        let b = interner.attribute_name_to_id("x", true).unwrap();
        assert_eq!(a, b);
        assert_eq!(interner.name_of(a), "x");
    }

    #[test]
    fn query_only_lookup_does_not_create() {
        let bump = Bump::new();
        let mut interner = AttributeInterner::new(&bump);
        assert_eq!(interner.attribute_name_to_id("missing", false), None);
        assert_eq!(interner.len(), 0);
    }

    #[test]
    fn distinct_names_get_distinct_ids() {
        let bump = Bump::new();
        let mut interner = AttributeInterner::new(&bump);
        let a = interner.attribute_name_to_id("a", true).unwrap();
        let b = interner.attribute_name_to_id("b", true).unwrap();
        assert_ne!(a, b);
    }
}
