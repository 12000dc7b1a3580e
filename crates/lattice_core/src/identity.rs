//! # Identity Index
//!
//! Bidirectional mapping between an entity's [`GlobalId`] and its
//! [`LocalHandle`]. This is the leaf structure every other index is built on;
//! it has no synchronization of its own.
//!
//! ## Layout
//!
//! ```text
//!   by_id:     GlobalId    -> Slot { entity, handle }
//!   by_handle: LocalHandle -> GlobalId
//! ```
//!
//! The identifier map is the source of truth. A handle lookup always hops
//! through it, so the two maps can never disagree about which entity an
//! identifier resolves to. The handle map holds exactly the non-zero handles
//! recorded in the identifier map's slots.

use std::collections::HashMap;
use std::sync::Arc;

use lattice_shared::{GlobalId, LocalHandle};

/// An entity that lives in both identifier spaces.
pub trait Identified {
    /// Returns the entity's immutable global identifier.
    fn global_id(&self) -> GlobalId;

    /// Returns the entity's current region handle (may be unassigned).
    fn local_handle(&self) -> LocalHandle;
}

/// One identifier-map entry: the entity plus the handle it is indexed under.
struct Slot<T> {
    entity: Arc<T>,
    handle: LocalHandle,
}

impl<T> Clone for Slot<T> {
    fn clone(&self) -> Self {
        Self {
            entity: Arc::clone(&self.entity),
            handle: self.handle,
        }
    }
}

/// Dual-keyed index over shared entities.
pub struct IdentityIndex<T> {
    by_id: HashMap<GlobalId, Slot<T>>,
    by_handle: HashMap<LocalHandle, GlobalId>,
}

impl<T> Clone for IdentityIndex<T> {
    fn clone(&self) -> Self {
        Self {
            by_id: self.by_id.clone(),
            by_handle: self.by_handle.clone(),
        }
    }
}

impl<T> Default for IdentityIndex<T> {
    fn default() -> Self {
        Self {
            by_id: HashMap::new(),
            by_handle: HashMap::new(),
        }
    }
}

impl<T> std::fmt::Debug for IdentityIndex<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IdentityIndex")
            .field("ids", &self.by_id.len())
            .field("handles", &self.by_handle.len())
            .finish()
    }
}

impl<T: Identified> IdentityIndex<T> {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of indexed entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Returns true if no entities are indexed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Inserts an entity under its identifier and, if assigned, its handle.
    ///
    /// Returns `false` without touching the index if the identifier is
    /// already present. If the handle is already claimed by a different
    /// entity, the newcomer takes it and the previous holder is left
    /// without a handle.
    pub fn insert(&mut self, entity: Arc<T>) -> bool {
        let id = entity.global_id();
        if self.by_id.contains_key(&id) {
            return false;
        }

        let handle = entity.local_handle();
        if handle.is_assigned() {
            self.claim_handle(id, handle);
        }
        self.by_id.insert(id, Slot { entity, handle });
        true
    }

    /// Removes an entity by identifier, releasing its handle.
    pub fn remove(&mut self, id: GlobalId) -> Option<Arc<T>> {
        let slot = self.by_id.remove(&id)?;
        if slot.handle.is_assigned() && self.by_handle.get(&slot.handle) == Some(&id) {
            self.by_handle.remove(&slot.handle);
        }
        Some(slot.entity)
    }

    /// Moves an entity's handle entry from `old` to `new`.
    ///
    /// No-op when `old == new`. The unassigned handle is never indexed, so
    /// moving to it simply drops the handle entry. Returns `false` if the
    /// identifier is unknown or nothing changed.
    pub fn reindex(&mut self, id: GlobalId, old: LocalHandle, new: LocalHandle) -> bool {
        if old == new {
            return false;
        }
        let Some(indexed) = self.by_id.get(&id).map(|slot| slot.handle) else {
            tracing::warn!(%id, %old, %new, "reindex for entity not in index");
            return false;
        };
        if indexed != old {
            tracing::debug!(%id, %old, %indexed, "reindex old handle differs from indexed handle");
        }

        for stale in [old, indexed] {
            if stale.is_assigned() && self.by_handle.get(&stale) == Some(&id) {
                self.by_handle.remove(&stale);
            }
        }
        if new.is_assigned() {
            self.claim_handle(id, new);
        }
        if let Some(slot) = self.by_id.get_mut(&id) {
            slot.handle = new;
        }
        true
    }

    /// Points `handle` at `id`, unhooking any other entity that held it.
    fn claim_handle(&mut self, id: GlobalId, handle: LocalHandle) {
        if let Some(previous) = self.by_handle.insert(handle, id) {
            if previous != id {
                tracing::warn!(
                    %handle,
                    %previous,
                    claimant = %id,
                    "handle already indexed, evicting previous holder"
                );
                if let Some(slot) = self.by_id.get_mut(&previous) {
                    slot.handle = LocalHandle::UNASSIGNED;
                }
            }
        }
    }

    /// Removes everything.
    pub fn clear(&mut self) {
        self.by_id.clear();
        self.by_handle.clear();
    }

    /// Looks up an entity by identifier.
    #[inline]
    #[must_use]
    pub fn get(&self, id: GlobalId) -> Option<&Arc<T>> {
        self.by_id.get(&id).map(|slot| &slot.entity)
    }

    /// Looks up an entity by handle, hopping through the identifier map.
    #[inline]
    #[must_use]
    pub fn get_by_handle(&self, handle: LocalHandle) -> Option<&Arc<T>> {
        let id = self.by_handle.get(&handle)?;
        self.get(*id)
    }

    /// Returns the handle an entity is indexed under.
    #[must_use]
    pub fn handle_of(&self, id: GlobalId) -> Option<LocalHandle> {
        self.by_id.get(&id).map(|slot| slot.handle)
    }

    /// Checks for an identifier.
    #[inline]
    #[must_use]
    pub fn contains_id(&self, id: GlobalId) -> bool {
        self.by_id.contains_key(&id)
    }

    /// Checks for a handle.
    #[inline]
    #[must_use]
    pub fn contains_handle(&self, handle: LocalHandle) -> bool {
        self.by_handle.contains_key(&handle)
    }

    /// Iterates over all indexed entities.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.by_id.values().map(|slot| &slot.entity)
    }

    /// Iterates over all indexed handles.
    pub fn handles(&self) -> impl Iterator<Item = LocalHandle> + '_ {
        self.by_handle.keys().copied()
    }

    /// Verifies that the handle map is exactly the projection of the
    /// identifier map onto entries with an assigned handle.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        let projected = self
            .by_id
            .iter()
            .filter(|(_, slot)| slot.handle.is_assigned())
            .count();
        projected == self.by_handle.len()
            && self
                .by_handle
                .iter()
                .all(|(handle, id)| self.by_id.get(id).is_some_and(|slot| slot.handle == *handle))
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Minimal entity for index tests.
    pub(crate) struct Probe {
        pub(crate) id: GlobalId,
        pub(crate) handle: AtomicU32,
    }

    impl Probe {
        pub(crate) fn new(id: u128, handle: u32) -> Arc<Self> {
            Arc::new(Self {
                id: GlobalId::from_u128(id),
                handle: AtomicU32::new(handle),
            })
        }
    }

    impl Identified for Probe {
        fn global_id(&self) -> GlobalId {
            self.id
        }

        fn local_handle(&self) -> LocalHandle {
            LocalHandle::new(self.handle.load(Ordering::Acquire))
        }
    }

    #[test]
    fn test_insert_and_lookup_both_keys() {
        let mut index = IdentityIndex::new();
        let probe = Probe::new(1, 10);
        assert!(index.insert(Arc::clone(&probe)));

        assert!(Arc::ptr_eq(index.get(probe.id).unwrap(), &probe));
        assert!(Arc::ptr_eq(index.get_by_handle(LocalHandle::new(10)).unwrap(), &probe));
        assert!(index.is_consistent());
    }

    #[test]
    fn test_duplicate_identifier_rejected() {
        let mut index = IdentityIndex::new();
        assert!(index.insert(Probe::new(1, 10)));
        assert!(!index.insert(Probe::new(1, 11)));
        assert_eq!(index.len(), 1);
        assert!(!index.contains_handle(LocalHandle::new(11)));
    }

    #[test]
    fn test_unassigned_handle_not_indexed() {
        let mut index = IdentityIndex::new();
        index.insert(Probe::new(1, 0));
        assert_eq!(index.len(), 1);
        assert!(!index.contains_handle(LocalHandle::UNASSIGNED));
        assert!(index.get_by_handle(LocalHandle::UNASSIGNED).is_none());
        assert!(index.is_consistent());
    }

    #[test]
    fn test_reindex_moves_handle() {
        let mut index = IdentityIndex::new();
        let probe = Probe::new(1, 0);
        index.insert(Arc::clone(&probe));

        assert!(index.reindex(probe.id, LocalHandle::UNASSIGNED, LocalHandle::new(5)));
        assert!(index.get_by_handle(LocalHandle::new(5)).is_some());

        assert!(index.reindex(probe.id, LocalHandle::new(5), LocalHandle::new(6)));
        assert!(index.get_by_handle(LocalHandle::new(5)).is_none());
        assert!(index.get_by_handle(LocalHandle::new(6)).is_some());
        assert_eq!(index.handle_of(probe.id), Some(LocalHandle::new(6)));

        assert!(!index.reindex(probe.id, LocalHandle::new(6), LocalHandle::new(6)));
        assert!(index.is_consistent());
    }

    #[test]
    fn test_handle_collision_evicts_previous_holder() {
        let mut index = IdentityIndex::new();
        let first = Probe::new(1, 7);
        let second = Probe::new(2, 7);
        index.insert(Arc::clone(&first));
        index.insert(Arc::clone(&second));

        assert!(Arc::ptr_eq(index.get_by_handle(LocalHandle::new(7)).unwrap(), &second));
        assert_eq!(index.handle_of(first.id), Some(LocalHandle::UNASSIGNED));
        assert!(index.is_consistent());

        // Removing the evicted holder must not drop the newcomer's handle.
        index.remove(first.id);
        assert!(index.contains_handle(LocalHandle::new(7)));
    }

    #[test]
    fn test_remove_releases_both_keys() {
        let mut index = IdentityIndex::new();
        let probe = Probe::new(1, 3);
        index.insert(Arc::clone(&probe));

        assert!(index.remove(probe.id).is_some());
        assert!(index.remove(probe.id).is_none());
        assert!(index.is_empty());
        assert!(!index.contains_handle(LocalHandle::new(3)));
    }
}
