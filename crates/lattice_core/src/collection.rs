//! # Membership Collections
//!
//! Per-owner collections of entities: the parts of one group, the avatars
//! sitting on one group, or the whole region's avatar set.
//!
//! ## Concurrency
//!
//! ```text
//!   Writers ──> [mutation lock] ──> clone index ──> mutate ──> publish (atomic swap)
//!   Readers ──> load published Arc<IdentityIndex> (no lock)
//! ```
//!
//! The published index is never mutated in place. A reader holding a
//! [`CollectionSnapshot`] keeps a consistent point-in-time view no matter
//! how many writers publish after it.

use std::sync::Arc;

use arc_swap::ArcSwap;
use lattice_shared::{GlobalId, LocalHandle};
use parking_lot::Mutex;

use crate::identity::{Identified, IdentityIndex};

/// Copy-on-write, dual-keyed collection with lock-free reads.
pub struct MembershipCollection<T> {
    /// Currently published index pair.
    published: ArcSwap<IdentityIndex<T>>,
    /// Serializes writers. Readers never take it.
    mutation: Mutex<()>,
}

impl<T: Identified> Default for MembershipCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for MembershipCollection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MembershipCollection")
            .field("published", &**self.published.load())
            .finish()
    }
}

impl<T: Identified> MembershipCollection<T> {
    /// Creates an empty collection.
    #[must_use]
    pub fn new() -> Self {
        Self {
            published: ArcSwap::from_pointee(IdentityIndex::new()),
            mutation: Mutex::new(()),
        }
    }

    /// Applies `edit` to a private copy of the index and publishes it if the
    /// edit reports a change. Holds the mutation lock throughout.
    fn publish_with(&self, edit: impl FnOnce(&mut IdentityIndex<T>) -> bool) -> bool {
        let _guard = self.mutation.lock();
        let current = self.published.load_full();
        let mut next = (*current).clone();
        if !edit(&mut next) {
            return false;
        }
        debug_assert!(next.is_consistent());
        self.published.store(Arc::new(next));
        true
    }

    /// Adds an entity if its identifier is not already present.
    ///
    /// An unassigned handle leaves the handle map untouched; the handle is
    /// indexed later through [`Self::reindex_handle`].
    pub fn add(&self, entity: Arc<T>) -> bool {
        let _guard = self.mutation.lock();
        let current = self.published.load_full();
        if current.contains_id(entity.global_id()) {
            return false;
        }
        let mut next = (*current).clone();
        next.insert(entity);
        debug_assert!(next.is_consistent());
        self.published.store(Arc::new(next));
        true
    }

    /// Adds an entity, silently ignoring duplicates. Used during bulk load.
    pub fn add_if_absent(&self, entity: Arc<T>) {
        let _ = self.add(entity);
    }

    /// Removes an entity from both maps. No-op if absent.
    pub fn remove(&self, entity: &T) -> bool {
        self.remove_by_id(entity.global_id()).is_some()
    }

    /// Removes an entity by identifier, returning it if it was present.
    pub fn remove_by_id(&self, id: GlobalId) -> Option<Arc<T>> {
        let mut removed = None;
        self.publish_with(|index| {
            removed = index.remove(id);
            removed.is_some()
        });
        removed
    }

    /// Moves an entity's handle entry. No-op if `old == new`; the unassigned
    /// handle is never inserted.
    pub fn reindex_handle(&self, entity: &T, old: LocalHandle, new: LocalHandle) {
        if old == new {
            return;
        }
        let id = entity.global_id();
        self.publish_with(|index| index.reindex(id, old, new));
    }

    /// Removes every entity.
    pub fn clear(&self) {
        self.publish_with(|index| {
            let changed = !index.is_empty();
            index.clear();
            changed
        });
    }

    /// Looks up an entity by identifier.
    #[must_use]
    pub fn find_by_id(&self, id: GlobalId) -> Option<Arc<T>> {
        self.published.load().get(id).cloned()
    }

    /// Looks up an entity by handle (handle -> identifier -> entity).
    #[must_use]
    pub fn find_by_handle(&self, handle: LocalHandle) -> Option<Arc<T>> {
        self.published.load().get_by_handle(handle).cloned()
    }

    /// Checks for an identifier.
    #[must_use]
    pub fn contains(&self, id: GlobalId) -> bool {
        self.published.load().contains_id(id)
    }

    /// Returns the number of members.
    #[must_use]
    pub fn count(&self) -> usize {
        self.published.load().len()
    }

    /// Calls `action` on every member of the current snapshot.
    pub fn for_each(&self, mut action: impl FnMut(&Arc<T>)) {
        let snapshot = self.published.load_full();
        for entity in snapshot.iter() {
            action(entity);
        }
    }

    /// Pins the current snapshot for iteration.
    #[must_use]
    pub fn snapshot(&self) -> CollectionSnapshot<T> {
        CollectionSnapshot {
            index: self.published.load_full(),
        }
    }
}

/// Read-only, point-in-time view of a [`MembershipCollection`].
pub struct CollectionSnapshot<T> {
    index: Arc<IdentityIndex<T>>,
}

impl<T> Clone for CollectionSnapshot<T> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
        }
    }
}

impl<T: Identified> CollectionSnapshot<T> {
    /// Number of members in this view.
    #[must_use]
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Returns true if this view is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Iterates the members of this view.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.index.iter()
    }

    /// Looks up a member of this view by identifier.
    #[must_use]
    pub fn get(&self, id: GlobalId) -> Option<&Arc<T>> {
        self.index.get(id)
    }

    /// Looks up a member of this view by handle.
    #[must_use]
    pub fn get_by_handle(&self, handle: LocalHandle) -> Option<&Arc<T>> {
        self.index.get_by_handle(handle)
    }

    /// Handles indexed in this view.
    pub fn handles(&self) -> impl Iterator<Item = LocalHandle> + '_ {
        self.index.handles()
    }

    /// Checks the dual-index invariant on this view.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.index.is_consistent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::tests::Probe;
    use std::collections::HashSet;
    use std::sync::atomic::Ordering;

    #[test]
    fn test_add_reports_insertion() {
        let collection = MembershipCollection::new();
        assert!(collection.add(Probe::new(1, 10)));
        assert!(!collection.add(Probe::new(1, 10)));
        assert_eq!(collection.count(), 1);
    }

    #[test]
    fn test_add_if_absent_keeps_first() {
        let collection = MembershipCollection::new();
        let first = Probe::new(1, 10);
        collection.add_if_absent(Arc::clone(&first));
        collection.add_if_absent(Probe::new(1, 20));

        let found = collection.find_by_id(first.id).unwrap();
        assert!(Arc::ptr_eq(&found, &first));
        assert!(collection.find_by_handle(LocalHandle::new(20)).is_none());
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_writes() {
        let collection = MembershipCollection::new();
        collection.add(Probe::new(1, 1));
        collection.add(Probe::new(2, 2));

        let before = collection.snapshot();
        collection.add(Probe::new(3, 3));
        collection.remove_by_id(GlobalId::from_u128(1));

        assert_eq!(before.len(), 2);
        assert!(before.get(GlobalId::from_u128(1)).is_some());
        assert_eq!(collection.count(), 2);
        assert!(collection.find_by_id(GlobalId::from_u128(1)).is_none());
    }

    #[test]
    fn test_handle_projection_invariant_after_mixed_operations() {
        let collection = MembershipCollection::new();
        let probes: Vec<_> = (1..=6).map(|i| Probe::new(i, 0)).collect();
        for probe in &probes {
            collection.add(Arc::clone(probe));
        }

        for (i, probe) in probes.iter().enumerate().skip(1) {
            let handle = 100 + u32::try_from(i).unwrap();
            probe.handle.store(handle, Ordering::Release);
            collection.reindex_handle(probe, LocalHandle::UNASSIGNED, LocalHandle::new(handle));
        }
        collection.remove(&probes[2]);
        probes[3].handle.store(200, Ordering::Release);
        collection.reindex_handle(&probes[3], LocalHandle::new(103), LocalHandle::new(200));

        let snapshot = collection.snapshot();
        assert!(snapshot.is_consistent());
        let handles: HashSet<_> = snapshot.handles().collect();
        let expected: HashSet<_> = snapshot
            .iter()
            .map(|probe| probe.local_handle())
            .filter(|handle| handle.is_assigned())
            .collect();
        assert_eq!(handles, expected);
    }

    #[test]
    fn test_for_each_visits_every_member() {
        let collection = MembershipCollection::new();
        for i in 1..=4 {
            collection.add(Probe::new(i, u32::try_from(i).unwrap()));
        }
        let mut seen = 0;
        collection.for_each(|_| seen += 1);
        assert_eq!(seen, 4);

        collection.clear();
        assert_eq!(collection.count(), 0);
        assert!(collection.find_by_handle(LocalHandle::new(1)).is_none());
    }
}
