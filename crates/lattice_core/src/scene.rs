//! # Scene
//!
//! Composition root of a region: registry, region-wide part and avatar
//! indices, transaction manager, replication hook and animation catalog.
//!
//! ## Data flow
//!
//! ```text
//!   caller ──lookup──> Scene (registry / parts / avatars)
//!      │
//!      ├──begin_transaction──> TransactionManager ── flags parts "in transaction"
//!      ├──mutate (store undo state first)
//!      └──drop SceneTransaction ──> release ──> UpdateSink (ForcedFull)
//! ```

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use lattice_shared::{GlobalId, LocalHandle, Quaternion, Vec3};

use crate::animation::{AnimationCatalog, SIT};
use crate::collection::MembershipCollection;
use crate::config::SceneConfig;
use crate::entity::{Avatar, Part, SceneEntity, SceneObjectGroup};
use crate::error::{SceneError, SceneResult};
use crate::identity::Identified;
use crate::registry::{EntityRegistry, RegistryInsert};
use crate::transaction::{TransactionManager, TransactionToken};
use crate::update::{NullUpdateSink, UpdateKind, UpdateQueue, UpdateSink};

/// Fields of a part transform to change. `None` leaves the field alone.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TransformUpdate {
    /// Group position for a root part, offset for a child.
    pub position: Option<Vec3>,
    /// New rotation.
    pub rotation: Option<Quaternion>,
    /// New scale.
    pub scale: Option<Vec3>,
}

/// The live state of one region.
pub struct Scene {
    config: SceneConfig,
    catalog: Arc<AnimationCatalog>,
    updates: Arc<dyn UpdateSink>,
    registry: EntityRegistry,
    parts: MembershipCollection<Part>,
    avatars: MembershipCollection<Avatar>,
    transactions: TransactionManager,
    next_handle: AtomicU32,
}

impl std::fmt::Debug for Scene {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scene")
            .field("config", &self.config)
            .field("entities", &self.registry.count())
            .field("parts", &self.parts.count())
            .field("avatars", &self.avatars.count())
            .finish_non_exhaustive()
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new(
            SceneConfig::default(),
            AnimationCatalog::builtin().shared(),
            Arc::new(NullUpdateSink),
        )
    }
}

impl Scene {
    /// Creates an empty region.
    #[must_use]
    pub fn new(
        config: SceneConfig,
        catalog: Arc<AnimationCatalog>,
        updates: Arc<dyn UpdateSink>,
    ) -> Self {
        let first_handle = config.first_local_handle.max(1);
        tracing::info!(
            max_undo = config.max_undo,
            first_handle,
            animations = catalog.len(),
            "scene created"
        );
        Self {
            config,
            catalog,
            updates,
            registry: EntityRegistry::new(),
            parts: MembershipCollection::new(),
            avatars: MembershipCollection::new(),
            transactions: TransactionManager::new(),
            next_handle: AtomicU32::new(first_handle),
        }
    }

    /// Creates an empty region replicating into a bounded [`UpdateQueue`]
    /// sized by `config.update_queue_capacity`.
    #[must_use]
    pub fn with_update_queue(
        config: SceneConfig,
        catalog: Arc<AnimationCatalog>,
    ) -> (Self, Arc<UpdateQueue>) {
        let queue = Arc::new(UpdateQueue::new(config.update_queue_capacity));
        let sink: Arc<dyn UpdateSink> = Arc::clone(&queue) as Arc<dyn UpdateSink>;
        (Self::new(config, catalog, sink), queue)
    }

    /// Active configuration.
    #[must_use]
    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    /// Shared animation catalog.
    #[must_use]
    pub fn catalog(&self) -> &Arc<AnimationCatalog> {
        &self.catalog
    }

    /// Region-wide entity registry.
    #[must_use]
    pub fn registry(&self) -> &EntityRegistry {
        &self.registry
    }

    /// Region-wide part index.
    #[must_use]
    pub fn parts(&self) -> &MembershipCollection<Part> {
        &self.parts
    }

    /// Region-wide avatar set.
    #[must_use]
    pub fn avatars(&self) -> &MembershipCollection<Avatar> {
        &self.avatars
    }

    /// The transaction manager.
    #[must_use]
    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    /// Hands out a fresh region handle.
    pub fn allocate_handle(&self) -> LocalHandle {
        LocalHandle::new(self.next_handle.fetch_add(1, Ordering::AcqRel))
    }

    // ------------------------------------------------------------------------
    // Groups and parts
    // ------------------------------------------------------------------------

    /// Adds a group and indexes its parts. Parts may still be unassigned.
    pub fn add_group(&self, group: Arc<SceneObjectGroup>) -> RegistryInsert {
        group.parts().for_each(|part| {
            part.set_max_undo(self.config.max_undo);
            self.parts.add_if_absent(Arc::clone(part));
        });
        let outcome = self.registry.add(Arc::clone(&group));
        tracing::debug!(
            group = %group.id(),
            parts = group.parts().count(),
            ?outcome,
            "group added"
        );
        outcome
    }

    /// Links a new child part into a registered group.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownGroup`] if the group is not registered.
    pub fn link_part(&self, group_id: GlobalId, part: Arc<Part>) -> SceneResult<()> {
        let group = self.find_group(group_id).ok_or(SceneError::UnknownGroup(group_id))?;
        part.set_max_undo(self.config.max_undo);
        group.add_part(Arc::clone(&part));
        self.parts.add_if_absent(part);
        Ok(())
    }

    /// Gives every unassigned part of a group a fresh handle and reindexes it.
    /// Returns the number of handles assigned.
    pub fn assign_handles(&self, group: &SceneObjectGroup) -> usize {
        let mut assigned = 0;
        for part in group.parts().snapshot().iter() {
            let old = part.local_handle();
            if old.is_assigned() {
                continue;
            }
            let new = self.allocate_handle();
            part.set_local_handle(new);
            group.parts().reindex_handle(part, old, new);
            self.parts.reindex_handle(part, old, new);
            if group.is_root(part) {
                self.registry.reindex_handle(group.id(), old, new);
            }
            assigned += 1;
        }
        assigned
    }

    /// Moves a part to a new handle in every index that holds it.
    ///
    /// Waits while another thread holds `old` or `new`. A transaction this
    /// thread holds on `old` carries over to `new`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownPart`] if `old` does not name a part.
    pub fn reassign_part_handle(&self, old: LocalHandle, new: LocalHandle) -> SceneResult<()> {
        let part = self.find_part_by_handle(old).ok_or(SceneError::UnknownPart(old))?;
        let moved = self.transactions.rehome(old, new, || {
            if part.local_handle() != old {
                return false;
            }
            part.set_local_handle(new);
            self.parts.reindex_handle(&part, old, new);
            if let Some(group) = self.find_group(part.group_id()) {
                group.parts().reindex_handle(&part, old, new);
                if group.is_root(&part) {
                    self.registry.reindex_handle(group.id(), old, new);
                }
            }
            true
        });
        if moved {
            Ok(())
        } else {
            Err(SceneError::UnknownPart(old))
        }
    }

    /// Removes a group and its parts. Sitting avatars are stood up.
    pub fn remove_group(&self, id: GlobalId) -> Option<Arc<SceneObjectGroup>> {
        let group = self.registry.find_group(id)?;
        self.registry.remove(id);
        group.mark_deleted();
        group.parts().for_each(|part| {
            self.parts.remove(part);
        });
        group.sitting_avatars().for_each(|avatar| {
            avatar.set_sitting_on(None);
            self.play_idle(avatar);
        });
        group.sitting_avatars().clear();
        tracing::debug!(group = %id, "group removed");
        Some(group)
    }

    /// Looks up a group by identifier.
    #[must_use]
    pub fn find_group(&self, id: GlobalId) -> Option<Arc<SceneObjectGroup>> {
        self.registry.find_group(id)
    }

    /// Looks up the group owning the part with `handle`.
    #[must_use]
    pub fn find_group_by_part(&self, handle: LocalHandle) -> Option<Arc<SceneObjectGroup>> {
        let part = self.find_part_by_handle(handle)?;
        self.find_group(part.group_id())
    }

    /// Looks up a part by handle.
    #[must_use]
    pub fn find_part_by_handle(&self, handle: LocalHandle) -> Option<Arc<Part>> {
        self.parts.find_by_handle(handle)
    }

    /// Looks up a part by identifier.
    #[must_use]
    pub fn find_part_by_id(&self, id: GlobalId) -> Option<Arc<Part>> {
        self.parts.find_by_id(id)
    }

    /// Looks up any top-level entity by handle.
    #[must_use]
    pub fn find_entity_by_handle(&self, handle: LocalHandle) -> Option<SceneEntity> {
        self.registry.find_by_handle(handle)
    }

    // ------------------------------------------------------------------------
    // Avatars
    // ------------------------------------------------------------------------

    /// Registers a child agent under a fresh handle.
    pub fn add_avatar(&self, avatar: Arc<Avatar>) -> RegistryInsert {
        if !avatar.local_handle().is_assigned() {
            avatar.set_local_handle(self.allocate_handle());
        }
        self.avatars.add_if_absent(Arc::clone(&avatar));
        let outcome = self.registry.add(Arc::clone(&avatar));
        tracing::debug!(avatar = %avatar.id(), handle = %avatar.local_handle(), "avatar added");
        outcome
    }

    /// Promotes a child agent to a root agent under a fresh handle.
    ///
    /// Waits while another thread holds the avatar's handle. A transaction
    /// this thread holds on it carries over to the new handle.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownAvatar`] if the avatar is not in the
    /// region or was re-homed by another thread first.
    pub fn make_root_agent(&self, id: GlobalId) -> SceneResult<LocalHandle> {
        let avatar = self.find_avatar(id).ok_or(SceneError::UnknownAvatar(id))?;
        let old = avatar.local_handle();
        let new = self.allocate_handle();

        let moved = self.transactions.rehome(old, new, || {
            if !self.registry.swap_child_to_root_agent(id, old, new) {
                return false;
            }
            avatar.set_local_handle(new);
            avatar.set_child_agent(false);
            self.avatars.reindex_handle(&avatar, old, new);
            true
        });
        if !moved {
            return Err(SceneError::UnknownAvatar(id));
        }
        tracing::info!(avatar = %id, %old, %new, "avatar became root agent");
        Ok(new)
    }

    /// Removes an avatar, standing it up first if it is seated.
    pub fn remove_avatar(&self, id: GlobalId) -> Option<Arc<Avatar>> {
        if let Err(err) = self.stand_avatar(id) {
            tracing::debug!(avatar = %id, %err, "remove of avatar not in region");
        }
        let avatar = self.avatars.remove_by_id(id)?;
        self.registry.remove(id);
        Some(avatar)
    }

    /// Looks up an avatar by identifier.
    #[must_use]
    pub fn find_avatar(&self, id: GlobalId) -> Option<Arc<Avatar>> {
        self.avatars.find_by_id(id)
    }

    /// Looks up an avatar by handle.
    #[must_use]
    pub fn find_avatar_by_handle(&self, handle: LocalHandle) -> Option<Arc<Avatar>> {
        self.avatars.find_by_handle(handle)
    }

    // ------------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------------

    /// Opens a transaction over `handles`, blocking while another thread
    /// holds any of them. Closing it schedules full updates per the config.
    pub fn begin_transaction(&self, handles: &[LocalHandle]) -> SceneTransaction<'_> {
        self.begin_transaction_with(handles, self.config.post_updates_on_commit)
    }

    /// Opens a transaction and chooses whether closing it schedules updates.
    pub fn begin_transaction_with(
        &self,
        handles: &[LocalHandle],
        post_updates: bool,
    ) -> SceneTransaction<'_> {
        let token =
            self.transactions.begin(handles, |handle| self.flag_in_transaction(handle, true));
        SceneTransaction::new(self, token, post_updates)
    }

    /// Opens a transaction over `handles` plus one extra handle.
    pub fn begin_transaction_with_extra(
        &self,
        handles: &[LocalHandle],
        extra: LocalHandle,
    ) -> SceneTransaction<'_> {
        let token = self
            .transactions
            .begin_with_extra(handles, extra, |handle| self.flag_in_transaction(handle, true));
        SceneTransaction::new(self, token, self.config.post_updates_on_commit)
    }

    /// Opens a transaction over every part of `group`.
    pub fn begin_group_transaction(&self, group: &SceneObjectGroup) -> SceneTransaction<'_> {
        self.begin_transaction(&group.part_handles())
    }

    /// Blocks until no other thread holds `handle`.
    pub fn wait_on_transaction(&self, handle: LocalHandle) {
        self.transactions.wait_on(handle);
    }

    fn end_transaction(&self, token: TransactionToken, post_updates: bool) {
        self.transactions.end(token, |handle| {
            self.flag_in_transaction(handle, false);
            if post_updates {
                self.post_update(handle, UpdateKind::ForcedFull);
            }
        });
    }

    fn flag_in_transaction(&self, handle: LocalHandle, value: bool) {
        if let Some(part) = self.parts.find_by_handle(handle) {
            part.set_in_transaction(value);
        } else if let Some(avatar) = self.avatars.find_by_handle(handle) {
            avatar.set_in_transaction(value);
        }
    }

    fn post_update(&self, handle: LocalHandle, kind: UpdateKind) {
        let Some(part) = self.parts.find_by_handle(handle) else {
            return;
        };
        match self.find_group(part.group_id()) {
            Some(group) if !group.is_deleted() => {
                self.updates.schedule_full_update(group.id(), handle, kind);
            }
            _ => {}
        }
    }

    // ------------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------------

    /// Applies a transform edit to one part inside a group transaction,
    /// recording undo state first.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownPart`] if no part has `handle`.
    pub fn update_part_transform(
        &self,
        handle: LocalHandle,
        update: TransformUpdate,
    ) -> SceneResult<()> {
        let (part, group) = self.part_and_group(handle)?;
        let _txn = self.begin_group_transaction(&group);

        part.store_undo_state(&group);
        if let Some(position) = update.position {
            if group.is_root(&part) {
                group.set_absolute_position(position);
            } else {
                part.set_offset_position(position);
            }
        }
        if let Some(rotation) = update.rotation {
            part.set_rotation(rotation);
        }
        if let Some(scale) = update.scale {
            part.set_scale(scale);
        }
        Ok(())
    }

    /// Undoes the newest edit of a part. Returns false if there was none.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownPart`] if no part has `handle`.
    pub fn undo(&self, handle: LocalHandle) -> SceneResult<bool> {
        let (part, group) = self.part_and_group(handle)?;
        let replayed = {
            let _txn = self.begin_transaction_with(&group.part_handles(), false);
            part.undo(&group)
        };
        if replayed {
            self.post_update(handle, UpdateKind::FindBest);
        }
        Ok(replayed)
    }

    /// Redoes the newest undone edit of a part. Returns false if there was none.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownPart`] if no part has `handle`.
    pub fn redo(&self, handle: LocalHandle) -> SceneResult<bool> {
        let (part, group) = self.part_and_group(handle)?;
        let replayed = {
            let _txn = self.begin_transaction_with(&group.part_handles(), false);
            part.redo(&group)
        };
        if replayed {
            self.post_update(handle, UpdateKind::FindBest);
        }
        Ok(replayed)
    }

    fn part_and_group(
        &self,
        handle: LocalHandle,
    ) -> SceneResult<(Arc<Part>, Arc<SceneObjectGroup>)> {
        let part = self.find_part_by_handle(handle).ok_or(SceneError::UnknownPart(handle))?;
        let group = self
            .find_group(part.group_id())
            .ok_or(SceneError::UnknownGroup(part.group_id()))?;
        Ok((part, group))
    }

    // ------------------------------------------------------------------------
    // Sitting
    // ------------------------------------------------------------------------

    /// Seats an avatar on a part. The seat holds whoever sat last; a
    /// displaced sitter is stood up.
    ///
    /// # Errors
    ///
    /// Returns an error if the avatar or part is unknown, or the catalog has
    /// no sit animation.
    pub fn sit_avatar(&self, avatar_id: GlobalId, seat: LocalHandle) -> SceneResult<()> {
        let avatar = self.find_avatar(avatar_id).ok_or(SceneError::UnknownAvatar(avatar_id))?;
        let (part, group) = self.part_and_group(seat)?;
        let displaced = part
            .sitter()
            .filter(|previous| *previous != avatar_id)
            .and_then(|previous| self.find_avatar(previous));
        let mut handles = vec![seat, avatar.local_handle()];
        handles.extend(displaced.iter().map(|previous| previous.local_handle()));
        let _txn = self.begin_transaction(&handles);

        part.seat_avatar(avatar_id);
        let displaced = displaced.filter(|previous| previous.sitting_on() == Some(part.id()));
        if let Some(previous) = displaced {
            tracing::debug!(
                %seat,
                previous = %previous.id(),
                avatar = %avatar_id,
                "seat taken over"
            );
            group.sitting_avatars().remove(&previous);
            previous.set_sitting_on(None);
            self.play_idle(&previous);
        }
        group.sitting_avatars().add_if_absent(Arc::clone(&avatar));
        avatar.set_sitting_on(Some(part.id()));
        avatar.animations().try_set_default(
            SIT,
            avatar.next_animation_sequence(),
            GlobalId::ZERO,
            &self.catalog,
        )?;
        Ok(())
    }

    /// Stands an avatar up. No-op if it is not sitting.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::UnknownAvatar`] if the avatar is not in the region.
    pub fn stand_avatar(&self, avatar_id: GlobalId) -> SceneResult<()> {
        let avatar = self.find_avatar(avatar_id).ok_or(SceneError::UnknownAvatar(avatar_id))?;
        let seat = avatar.sitting_on().and_then(|part_id| self.find_part_by_id(part_id));
        let Some(part) = seat else {
            avatar.set_sitting_on(None);
            return Ok(());
        };
        let _txn = self.begin_transaction(&[part.local_handle(), avatar.local_handle()]);

        part.unseat(avatar_id);
        if let Some(group) = self.find_group(part.group_id()) {
            group.sitting_avatars().remove(&avatar);
        }
        avatar.set_sitting_on(None);
        self.play_idle(&avatar);
        Ok(())
    }

    fn play_idle(&self, avatar: &Avatar) {
        avatar
            .animations()
            .set_default(self.catalog.idle(), avatar.next_animation_sequence(), GlobalId::ZERO);
    }
}

/// Scoped transaction on a [`Scene`]. Dropping it closes the transaction,
/// on every exit path.
#[must_use = "dropping the transaction closes it immediately"]
pub struct SceneTransaction<'a> {
    scene: &'a Scene,
    token: Option<TransactionToken>,
    post_updates: bool,
}

impl<'a> SceneTransaction<'a> {
    fn new(scene: &'a Scene, token: TransactionToken, post_updates: bool) -> Self {
        Self {
            scene,
            token: Some(token),
            post_updates,
        }
    }

    /// Handles covered by the transaction.
    #[must_use]
    pub fn handles(&self) -> &[LocalHandle] {
        match &self.token {
            Some(token) => token.handles(),
            None => &[],
        }
    }

    /// Whether closing schedules a full update per released part.
    pub fn set_post_updates(&mut self, post_updates: bool) {
        self.post_updates = post_updates;
    }

    /// Closes the transaction now.
    pub fn commit(mut self) {
        self.close();
    }

    fn close(&mut self) {
        if let Some(token) = self.token.take() {
            self.scene.end_transaction(token, self.post_updates);
        }
    }
}

impl Drop for SceneTransaction<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SceneTransaction<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SceneTransaction")
            .field("handles", &self.handles())
            .field("post_updates", &self.post_updates)
            .finish()
    }
}
