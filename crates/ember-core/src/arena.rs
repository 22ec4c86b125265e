//! AST arena (C3): a pool allocator sized to one node, owned by a single
//! translation unit.
//!
//! Allocation is O(1) and never reshuffles existing indices. Deallocation of
//! an individual node is a tombstone (`mark_destroyed`); real reclamation
//! happens only at unit teardown, when the whole arena (and the `Bump` that
//! backs it) is dropped at once.
//!
//! Parsers create and discard many nodes on error paths. A bump arena keeps
//! per-node cost trivial and sidesteps use-after-free during recovery: a
//! `NodeId` carries no lifetime of its own, so a dangling reference into a
//! torn-down arena simply can't be formed — every lookup goes through the
//! `Arena` that still owns the backing storage, and that `Arena` borrows its
//! `Bump` for exactly as long as the translation unit is alive.

use bumpalo::Bump;
use bumpalo::collections::Vec as BumpVec;
use std::fmt;

/// An index into an [`Arena`]. Parent back-references are plain `NodeId`s
/// rather than pointers, so cyclic back-references never require a weak
/// pointer (§9 design note): a parent index can point anywhere in the same
/// arena without any borrow-checker implication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u32);

impl NodeId {
    pub fn from_raw(index: u32) -> Self {
        NodeId(index)
    }

    pub fn as_raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct Slot<T> {
    value: Option<T>,
}

/// A pool allocator that owns every node of type `T` for one translation
/// unit, backed by a bump allocator supplied by the caller. Bulk-freed when
/// both the arena and its `Bump` go out of scope; individual removal only
/// tombstones the slot.
pub struct Arena<'bump, T> {
    slots: BumpVec<'bump, Slot<T>>,
}

impl<'bump, T> Arena<'bump, T> {
    pub fn new(bump: &'bump Bump) -> Self {
        Arena {
            slots: BumpVec::new_in(bump),
        }
    }

    pub fn with_capacity(bump: &'bump Bump, cap: usize) -> Self {
        Arena {
            slots: BumpVec::with_capacity_in(cap, bump),
        }
    }

    /// Allocate a new node, returning its stable id. O(1) amortized.
    pub fn alloc(&mut self, value: T) -> NodeId {
        let id = NodeId(self.slots.len() as u32);
        self.slots.push(Slot { value: Some(value) });
        id
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.slots.get(id.0 as usize).and_then(|s| s.value.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots
            .get_mut(id.0 as usize)
            .and_then(|s| s.value.as_mut())
    }

    /// `ast_MarkExprDestroyed`: tombstone a node without reclaiming its slot.
    /// Real reclamation happens when the whole arena is dropped.
    pub fn mark_destroyed(&mut self, id: NodeId) {
        if let Some(slot) = self.slots.get_mut(id.0 as usize) {
            slot.value = None;
        }
    }

    pub fn is_destroyed(&self, id: NodeId) -> bool {
        match self.slots.get(id.0 as usize) {
            Some(slot) => slot.value.is_none(),
            None => true,
        }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &T)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.value.as_ref().map(|v| (NodeId(i as u32), v)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alloc_returns_stable_increasing_ids() {
        let bump = Bump::new();
        let mut arena: Arena<i32> = Arena::new(&bump);
        let a = arena.alloc(1);
        let b = arena.alloc(2);
        assert_eq!(a.as_raw(), 0);
        assert_eq!(b.as_raw(), 1);
        assert_eq!(arena.get(a), Some(&1));
        assert_eq!(arena.get(b), Some(&2));
    }

    #[test]
    fn mark_destroyed_tombstones_without_shifting_other_ids() {
        let bump = Bump::new();
        let mut arena: Arena<&'static str> = Arena::new(&bump);
        let a = arena.alloc("a");
        let b = arena.alloc("b");
        arena.mark_destroyed(a);
        assert!(arena.is_destroyed(a));
        assert_eq!(arena.get(a), None);
        assert_eq!(arena.get(b), Some(&"b"));
    }

    #[test]
    fn iter_skips_tombstoned_slots() {
        let bump = Bump::new();
        let mut arena: Arena<i32> = Arena::new(&bump);
        let a = arena.alloc(10);
        let _b = arena.alloc(20);
        arena.mark_destroyed(a);
        let remaining: Vec<_> = arena.iter().map(|(_, v)| *v).collect();
        assert_eq!(remaining, vec![20]);
    }
}
