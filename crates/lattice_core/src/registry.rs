//! # Entity Registry
//!
//! Region-wide index of every top-level entity (groups and avatars) by
//! identifier and by handle.
//!
//! Unlike [`crate::collection::MembershipCollection`] the registry sits
//! behind one mutex for reads and writes alike: global consistency matters
//! more here than read latency, and registry traffic is low compared to
//! part lookups.
//!
//! ## Self-healing
//!
//! An insert that collides with an existing entry is never fatal. The stale
//! entry is logged and evicted, then the new entity is inserted, so one bad
//! entity cannot take the region down.

use std::sync::Arc;

use lattice_shared::{GlobalId, LocalHandle};
use parking_lot::Mutex;

use crate::entity::{Avatar, EntityKind, SceneEntity, SceneObjectGroup};
use crate::identity::{Identified, IdentityIndex};

/// What [`EntityRegistry::add`] had to do to insert an entity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RegistryInsert {
    /// Neither key was in use.
    Inserted,
    /// The same entity was already registered; it was re-indexed.
    Redundant,
    /// A different entity held the identifier or handle and was evicted.
    Replaced,
}

/// Dual-keyed registry of top-level entities.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    index: Mutex<IdentityIndex<SceneEntity>>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity, evicting stale entries that collide with it.
    pub fn add(&self, entity: impl Into<SceneEntity>) -> RegistryInsert {
        let entity = entity.into();
        let id = entity.global_id();
        let handle = entity.local_handle();
        let mut index = self.index.lock();
        let mut outcome = RegistryInsert::Inserted;

        if let Some(existing) = index.get(id) {
            let indexed = index.handle_of(id).unwrap_or_default();
            if existing.same_entity(&entity) {
                tracing::warn!(%id, %handle, "redundant add for identifier");
                outcome = RegistryInsert::Redundant;
            } else if index.contains_handle(handle) {
                tracing::error!(%id, %handle, "duplicate add for identifier");
                outcome = RegistryInsert::Replaced;
            } else {
                tracing::error!(
                    %id,
                    %handle,
                    previous = %indexed,
                    "add updated handle for identifier"
                );
                outcome = RegistryInsert::Replaced;
            }
            index.remove(id);
        }

        if handle.is_assigned() {
            let holder = index.get_by_handle(handle).map(|existing| existing.global_id());
            if let Some(holder) = holder {
                tracing::error!(%handle, %holder, claimant = %id, "duplicate add for handle");
                index.remove(holder);
                outcome = RegistryInsert::Replaced;
            }
        }

        index.insert(Arc::new(entity));
        outcome
    }

    /// Removes an entity by identifier.
    pub fn remove(&self, id: GlobalId) -> Option<SceneEntity> {
        self.index.lock().remove(id).map(|entity| SceneEntity::clone(&entity))
    }

    /// Removes an entity by handle.
    pub fn remove_by_handle(&self, handle: LocalHandle) -> Option<SceneEntity> {
        let mut index = self.index.lock();
        let id = index.get_by_handle(handle)?.global_id();
        index.remove(id).map(|entity| SceneEntity::clone(&entity))
    }

    /// Moves an entity's handle entry. No-op if `old == new`.
    pub fn reindex_handle(&self, id: GlobalId, old: LocalHandle, new: LocalHandle) -> bool {
        self.index.lock().reindex(id, old, new)
    }

    /// Re-homes an avatar's handle when it becomes a root agent.
    ///
    /// Logs and does nothing if the avatar is not registered or no longer
    /// holds `old`, since a concurrent removal may have won the race.
    pub fn swap_child_to_root_agent(
        &self,
        id: GlobalId,
        old: LocalHandle,
        new: LocalHandle,
    ) -> bool {
        let mut index = self.index.lock();
        if !index.contains_id(id) {
            tracing::error!(%id, "swap child to root agent: identifier not registered");
            return false;
        }
        if index.handle_of(id) != Some(old) {
            tracing::error!(%id, %old, "swap child to root agent: old handle not held by avatar");
            return false;
        }
        index.reindex(id, old, new)
    }

    /// Looks up an entity by identifier.
    #[must_use]
    pub fn find_by_id(&self, id: GlobalId) -> Option<SceneEntity> {
        self.index.lock().get(id).map(|entity| SceneEntity::clone(entity))
    }

    /// Looks up an entity by handle.
    #[must_use]
    pub fn find_by_handle(&self, handle: LocalHandle) -> Option<SceneEntity> {
        self.index.lock().get_by_handle(handle).map(|entity| SceneEntity::clone(entity))
    }

    /// Looks up a group by identifier.
    #[must_use]
    pub fn find_group(&self, id: GlobalId) -> Option<Arc<SceneObjectGroup>> {
        self.find_by_id(id).and_then(|entity| entity.as_group().cloned())
    }

    /// Looks up an avatar by identifier.
    #[must_use]
    pub fn find_avatar(&self, id: GlobalId) -> Option<Arc<Avatar>> {
        self.find_by_id(id).and_then(|entity| entity.as_avatar().cloned())
    }

    /// Every entity of the given kind.
    #[must_use]
    pub fn get_all_by_kind(&self, kind: EntityKind) -> Vec<SceneEntity> {
        self.index
            .lock()
            .iter()
            .filter(|entity| entity.kind() == kind)
            .map(|entity| SceneEntity::clone(entity))
            .collect()
    }

    /// Every registered group.
    #[must_use]
    pub fn groups(&self) -> Vec<Arc<SceneObjectGroup>> {
        self.index
            .lock()
            .iter()
            .filter_map(|entity| entity.as_group().cloned())
            .collect()
    }

    /// Every registered entity.
    #[must_use]
    pub fn entities(&self) -> Vec<SceneEntity> {
        self.index.lock().iter().map(|entity| SceneEntity::clone(entity)).collect()
    }

    /// Checks for an identifier.
    #[must_use]
    pub fn contains_id(&self, id: GlobalId) -> bool {
        self.index.lock().contains_id(id)
    }

    /// Checks for a handle.
    #[must_use]
    pub fn contains_handle(&self, handle: LocalHandle) -> bool {
        self.index.lock().contains_handle(handle)
    }

    /// Number of registered entities.
    #[must_use]
    pub fn count(&self) -> usize {
        self.index.lock().len()
    }

    /// Removes everything.
    pub fn clear(&self) {
        self.index.lock().clear();
    }

    /// Checks the dual-index invariant.
    #[must_use]
    pub fn is_consistent(&self) -> bool {
        self.index.lock().is_consistent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::AnimationCatalog;
    use crate::entity::Part;
    use lattice_shared::Vec3;

    fn group(id: u128, handle: u32) -> Arc<SceneObjectGroup> {
        let root = Part::new(GlobalId::from_u128(id), LocalHandle::new(handle));
        SceneObjectGroup::new(root, Vec3::ZERO)
    }

    #[test]
    fn test_add_and_find_both_keys() {
        let registry = EntityRegistry::new();
        let g = group(1, 10);
        assert_eq!(registry.add(Arc::clone(&g)), RegistryInsert::Inserted);

        assert!(registry.find_group(g.id()).is_some_and(|found| Arc::ptr_eq(&found, &g)));
        assert!(registry.find_by_handle(LocalHandle::new(10)).is_some());
        assert_eq!(registry.count(), 1);
    }

    #[test]
    fn test_redundant_add_is_healed() {
        let registry = EntityRegistry::new();
        let g = group(1, 10);
        registry.add(Arc::clone(&g));
        assert_eq!(registry.add(Arc::clone(&g)), RegistryInsert::Redundant);
        assert_eq!(registry.count(), 1);
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_handle_collision_evicts_stale_entity() {
        let registry = EntityRegistry::new();
        registry.add(group(1, 10));
        assert_eq!(registry.add(group(2, 10)), RegistryInsert::Replaced);

        assert!(!registry.contains_id(GlobalId::from_u128(1)));
        assert_eq!(
            registry.find_by_handle(LocalHandle::new(10)).map(|e| e.global_id()),
            Some(GlobalId::from_u128(2))
        );
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_identifier_collision_replaces_entity() {
        let registry = EntityRegistry::new();
        registry.add(group(1, 10));
        assert_eq!(registry.add(group(1, 11)), RegistryInsert::Replaced);

        assert_eq!(registry.count(), 1);
        assert!(!registry.contains_handle(LocalHandle::new(10)));
        assert!(registry.contains_handle(LocalHandle::new(11)));
    }

    #[test]
    fn test_get_all_by_kind() {
        let catalog = AnimationCatalog::builtin();
        let registry = EntityRegistry::new();
        registry.add(group(1, 10));
        registry.add(group(2, 11));
        registry.add(Avatar::new(GlobalId::from_u128(3), "Visitor", &catalog));

        assert_eq!(registry.get_all_by_kind(EntityKind::Group).len(), 2);
        assert_eq!(registry.get_all_by_kind(EntityKind::Avatar).len(), 1);
        assert_eq!(registry.groups().len(), 2);
    }

    #[test]
    fn test_swap_child_to_root_agent() {
        let catalog = AnimationCatalog::builtin();
        let registry = EntityRegistry::new();
        let avatar = Avatar::new(GlobalId::from_u128(3), "Visitor", &catalog);
        avatar.set_local_handle(LocalHandle::new(20));
        registry.add(Arc::clone(&avatar));

        let (old, new) = (LocalHandle::new(20), LocalHandle::new(21));
        assert!(!registry.swap_child_to_root_agent(avatar.id(), LocalHandle::new(99), new));
        assert!(registry.swap_child_to_root_agent(avatar.id(), old, new));
        assert!(!registry.contains_handle(old));
        assert!(registry.find_avatar(avatar.id()).is_some());
        assert!(registry.find_by_handle(new).is_some());

        let stranger = GlobalId::from_u128(99);
        assert!(!registry.swap_child_to_root_agent(stranger, new, LocalHandle::new(22)));
    }

    #[test]
    fn test_swap_ignores_handle_of_another_entity() {
        let catalog = AnimationCatalog::builtin();
        let registry = EntityRegistry::new();
        let avatar = Avatar::new(GlobalId::from_u128(3), "Visitor", &catalog);
        avatar.set_local_handle(LocalHandle::new(20));
        registry.add(Arc::clone(&avatar));
        registry.add(group(1, 10));

        let (foreign, new) = (LocalHandle::new(10), LocalHandle::new(21));
        assert!(!registry.swap_child_to_root_agent(avatar.id(), foreign, new));
        assert_eq!(
            registry.find_by_handle(foreign).map(|e| e.global_id()),
            Some(GlobalId::from_u128(1))
        );
        assert!(registry.find_by_handle(LocalHandle::new(20)).is_some());
        assert!(!registry.contains_handle(new));
        assert!(registry.is_consistent());
    }

    #[test]
    fn test_remove_by_handle() {
        let registry = EntityRegistry::new();
        registry.add(group(1, 10));
        assert!(registry.remove_by_handle(LocalHandle::new(10)).is_some());
        assert!(registry.remove_by_handle(LocalHandle::new(10)).is_none());
        assert_eq!(registry.count(), 0);
    }
}
