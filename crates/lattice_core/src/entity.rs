//! # Scene Entities
//!
//! The region holds two kinds of top-level entity:
//! - [`SceneObjectGroup`]: a linked set of [`Part`]s moved as a unit
//! - [`Avatar`]: a connected user's presence
//!
//! ## Ownership
//!
//! ```text
//!   Scene ──owns──> SceneObjectGroup ──owns──> Part
//!     │                                   │
//!     └──owns──> Avatar <──GlobalId key───┘ (SitTarget)
//! ```
//!
//! Back-references (part to group, seat to sitter, avatar to seat) are
//! identifiers resolved through the scene, never strong references.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::Arc;

use lattice_shared::{GlobalId, LocalHandle, Quaternion, Transform, Vec3, DEFAULT_MAX_UNDO};
use parking_lot::{Mutex, RwLock};

use crate::animation::{AnimationCatalog, AnimationSet};
use crate::collection::MembershipCollection;
use crate::identity::Identified;
use crate::sit::SitTarget;
use crate::undo::UndoHistory;

// ============================================================================
// PART
// ============================================================================

/// One primitive of a group.
///
/// The transform position is the offset from the root part; the root part's
/// offset is unused and the group carries the absolute position instead.
#[derive(Debug)]
pub struct Part {
    id: GlobalId,
    handle: AtomicU32,
    group_id: RwLock<GlobalId>,
    transform: RwLock<Transform>,
    sit_target: Mutex<SitTarget>,
    in_transaction: AtomicBool,
    undoing: AtomicBool,
    undo_history: Mutex<UndoHistory>,
}

impl Part {
    /// Creates a detached part with an identity transform.
    #[must_use]
    pub fn new(id: GlobalId, handle: LocalHandle) -> Arc<Self> {
        Arc::new(Self {
            id,
            handle: AtomicU32::new(handle.raw()),
            group_id: RwLock::new(GlobalId::ZERO),
            transform: RwLock::new(Transform::IDENTITY),
            sit_target: Mutex::new(SitTarget::default()),
            in_transaction: AtomicBool::new(false),
            undoing: AtomicBool::new(false),
            undo_history: Mutex::new(UndoHistory::new(DEFAULT_MAX_UNDO)),
        })
    }

    /// Global identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> GlobalId {
        self.id
    }

    /// Identifier of the owning group, zero while detached.
    #[must_use]
    pub fn group_id(&self) -> GlobalId {
        *self.group_id.read()
    }

    pub(crate) fn attach_to(&self, group: GlobalId) {
        *self.group_id.write() = group;
    }

    pub(crate) fn set_local_handle(&self, handle: LocalHandle) {
        self.handle.store(handle.raw(), Ordering::Release);
    }

    /// Current local transform.
    #[must_use]
    pub fn transform(&self) -> Transform {
        *self.transform.read()
    }

    /// Sets the offset from the root part.
    pub fn set_offset_position(&self, position: Vec3) {
        self.transform.write().position = position;
    }

    /// Sets the part rotation.
    pub fn set_rotation(&self, rotation: Quaternion) {
        self.transform.write().rotation = rotation;
    }

    /// Sets the part scale.
    pub fn set_scale(&self, scale: Vec3) {
        self.transform.write().scale = scale;
    }

    /// Copy of the seat record.
    #[must_use]
    pub fn sit_target(&self) -> SitTarget {
        *self.sit_target.lock()
    }

    /// Configures the seat position, keeping any current sitter.
    pub fn set_sit_target(&self, offset: Vec3, rotation: Quaternion) {
        let mut seat = self.sit_target.lock();
        seat.offset = offset;
        seat.rotation = rotation;
    }

    /// Records `avatar` on the seat. Last writer wins.
    pub fn seat_avatar(&self, avatar: GlobalId) {
        self.sit_target.lock().seat_avatar(avatar);
    }

    /// Clears the seat if `avatar` is on it.
    pub fn unseat(&self, avatar: GlobalId) -> bool {
        self.sit_target.lock().unseat(avatar)
    }

    /// Avatar currently on the seat.
    #[must_use]
    pub fn sitter(&self) -> Option<GlobalId> {
        self.sit_target.lock().sitter()
    }

    /// True while some thread holds a transaction on this part.
    #[inline]
    #[must_use]
    pub fn is_in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }

    pub(crate) fn set_in_transaction(&self, value: bool) {
        self.in_transaction.store(value, Ordering::Release);
    }

    /// True while an undo or redo is being replayed onto this part.
    #[inline]
    #[must_use]
    pub fn is_undoing(&self) -> bool {
        self.undoing.load(Ordering::Acquire)
    }

    pub(crate) fn set_undoing(&self, value: bool) {
        self.undoing.store(value, Ordering::Release);
    }

    pub(crate) fn undo_history(&self) -> &Mutex<UndoHistory> {
        &self.undo_history
    }

    /// Changes the depth of the undo and redo stacks.
    pub fn set_max_undo(&self, depth: usize) {
        self.undo_history.lock().set_capacity(depth);
    }
}

impl Identified for Part {
    fn global_id(&self) -> GlobalId {
        self.id
    }

    fn local_handle(&self) -> LocalHandle {
        LocalHandle::new(self.handle.load(Ordering::Acquire))
    }
}

// ============================================================================
// GROUP
// ============================================================================

/// A linked set of parts. Its identifier and handle are the root part's.
#[derive(Debug)]
pub struct SceneObjectGroup {
    root: Arc<Part>,
    absolute_position: RwLock<Vec3>,
    parts: MembershipCollection<Part>,
    sitting_avatars: MembershipCollection<Avatar>,
    deleted: AtomicBool,
}

impl SceneObjectGroup {
    /// Creates a group around `root` at `absolute_position`.
    #[must_use]
    pub fn new(root: Arc<Part>, absolute_position: Vec3) -> Arc<Self> {
        root.attach_to(root.id());
        let parts = MembershipCollection::new();
        parts.add(Arc::clone(&root));
        Arc::new(Self {
            root,
            absolute_position: RwLock::new(absolute_position),
            parts,
            sitting_avatars: MembershipCollection::new(),
            deleted: AtomicBool::new(false),
        })
    }

    /// Group identifier (the root part's).
    #[inline]
    #[must_use]
    pub fn id(&self) -> GlobalId {
        self.root.id()
    }

    /// The root part.
    #[must_use]
    pub fn root_part(&self) -> &Arc<Part> {
        &self.root
    }

    /// True if `part` is this group's root.
    #[must_use]
    pub fn is_root(&self, part: &Part) -> bool {
        part.id() == self.root.id()
    }

    /// Links a child part into the group.
    pub fn add_part(&self, part: Arc<Part>) -> bool {
        part.attach_to(self.id());
        self.parts.add(part)
    }

    /// Parts of the group, root included.
    #[must_use]
    pub fn parts(&self) -> &MembershipCollection<Part> {
        &self.parts
    }

    /// Avatars currently sitting on a part of the group.
    #[must_use]
    pub fn sitting_avatars(&self) -> &MembershipCollection<Avatar> {
        &self.sitting_avatars
    }

    /// Region position of the group.
    #[must_use]
    pub fn absolute_position(&self) -> Vec3 {
        *self.absolute_position.read()
    }

    /// Moves the group.
    pub fn set_absolute_position(&self, position: Vec3) {
        *self.absolute_position.write() = position;
    }

    /// Rotation of the root part.
    #[must_use]
    pub fn root_rotation(&self) -> Quaternion {
        self.root.transform().rotation
    }

    /// Handles of every part with an assigned handle.
    #[must_use]
    pub fn part_handles(&self) -> Vec<LocalHandle> {
        self.parts
            .snapshot()
            .iter()
            .map(|part| part.local_handle())
            .filter(|handle| handle.is_assigned())
            .collect()
    }

    /// True once the group has been removed from the scene.
    #[inline]
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.deleted.load(Ordering::Acquire)
    }

    pub(crate) fn mark_deleted(&self) {
        self.deleted.store(true, Ordering::Release);
    }
}

impl Identified for SceneObjectGroup {
    fn global_id(&self) -> GlobalId {
        self.root.id()
    }

    fn local_handle(&self) -> LocalHandle {
        self.root.local_handle()
    }
}

// ============================================================================
// AVATAR
// ============================================================================

/// A user's presence in the region.
///
/// Child agents are presences observed from a neighbouring region; a root
/// agent is the user actually standing here.
#[derive(Debug)]
pub struct Avatar {
    id: GlobalId,
    handle: AtomicU32,
    name: String,
    is_child: AtomicBool,
    position: RwLock<Vec3>,
    rotation: RwLock<Quaternion>,
    animations: AnimationSet,
    animation_sequence: AtomicI32,
    sitting_on: Mutex<Option<GlobalId>>,
    in_transaction: AtomicBool,
}

impl Avatar {
    /// Creates a child agent playing the idle pose.
    #[must_use]
    pub fn new(id: GlobalId, name: impl Into<String>, catalog: &AnimationCatalog) -> Arc<Self> {
        Arc::new(Self {
            id,
            handle: AtomicU32::new(LocalHandle::UNASSIGNED.raw()),
            name: name.into(),
            is_child: AtomicBool::new(true),
            position: RwLock::new(Vec3::ZERO),
            rotation: RwLock::new(Quaternion::IDENTITY),
            animations: AnimationSet::new(catalog),
            animation_sequence: AtomicI32::new(1),
            sitting_on: Mutex::new(None),
            in_transaction: AtomicBool::new(false),
        })
    }

    /// Global identifier.
    #[inline]
    #[must_use]
    pub fn id(&self) -> GlobalId {
        self.id
    }

    /// Display name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_local_handle(&self, handle: LocalHandle) {
        self.handle.store(handle.raw(), Ordering::Release);
    }

    /// True for a presence observed from a neighbouring region.
    #[inline]
    #[must_use]
    pub fn is_child_agent(&self) -> bool {
        self.is_child.load(Ordering::Acquire)
    }

    pub(crate) fn set_child_agent(&self, value: bool) {
        self.is_child.store(value, Ordering::Release);
    }

    /// Region position.
    #[must_use]
    pub fn position(&self) -> Vec3 {
        *self.position.read()
    }

    /// Sets the region position.
    pub fn set_position(&self, position: Vec3) {
        *self.position.write() = position;
    }

    /// Body rotation.
    #[must_use]
    pub fn rotation(&self) -> Quaternion {
        *self.rotation.read()
    }

    /// Sets the body rotation.
    pub fn set_rotation(&self, rotation: Quaternion) {
        *self.rotation.write() = rotation;
    }

    /// Animation state.
    #[must_use]
    pub fn animations(&self) -> &AnimationSet {
        &self.animations
    }

    /// Next client-side animation sequence number.
    pub fn next_animation_sequence(&self) -> i32 {
        self.animation_sequence.fetch_add(1, Ordering::AcqRel)
    }

    /// Part the avatar is sitting on.
    #[must_use]
    pub fn sitting_on(&self) -> Option<GlobalId> {
        *self.sitting_on.lock()
    }

    pub(crate) fn set_sitting_on(&self, part: Option<GlobalId>) {
        *self.sitting_on.lock() = part;
    }

    /// True while some thread holds a transaction on this avatar.
    #[inline]
    #[must_use]
    pub fn is_in_transaction(&self) -> bool {
        self.in_transaction.load(Ordering::Acquire)
    }

    pub(crate) fn set_in_transaction(&self, value: bool) {
        self.in_transaction.store(value, Ordering::Release);
    }
}

impl Identified for Avatar {
    fn global_id(&self) -> GlobalId {
        self.id
    }

    fn local_handle(&self) -> LocalHandle {
        LocalHandle::new(self.handle.load(Ordering::Acquire))
    }
}

// ============================================================================
// SCENE ENTITY
// ============================================================================

/// Variant tag of a [`SceneEntity`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntityKind {
    /// A [`SceneObjectGroup`].
    Group,
    /// An [`Avatar`].
    Avatar,
}

/// A top-level region entity.
#[derive(Clone, Debug)]
pub enum SceneEntity {
    /// Linked object.
    Group(Arc<SceneObjectGroup>),
    /// User presence.
    Avatar(Arc<Avatar>),
}

impl SceneEntity {
    /// Variant tag.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Group(_) => EntityKind::Group,
            Self::Avatar(_) => EntityKind::Avatar,
        }
    }

    /// The group, if this is one.
    #[must_use]
    pub fn as_group(&self) -> Option<&Arc<SceneObjectGroup>> {
        match self {
            Self::Group(group) => Some(group),
            Self::Avatar(_) => None,
        }
    }

    /// The avatar, if this is one.
    #[must_use]
    pub fn as_avatar(&self) -> Option<&Arc<Avatar>> {
        match self {
            Self::Avatar(avatar) => Some(avatar),
            Self::Group(_) => None,
        }
    }

    /// True if both values refer to the same allocation.
    #[must_use]
    pub fn same_entity(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Group(a), Self::Group(b)) => Arc::ptr_eq(a, b),
            (Self::Avatar(a), Self::Avatar(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Identified for SceneEntity {
    fn global_id(&self) -> GlobalId {
        match self {
            Self::Group(group) => group.global_id(),
            Self::Avatar(avatar) => avatar.global_id(),
        }
    }

    fn local_handle(&self) -> LocalHandle {
        match self {
            Self::Group(group) => group.local_handle(),
            Self::Avatar(avatar) => avatar.local_handle(),
        }
    }
}

impl From<Arc<SceneObjectGroup>> for SceneEntity {
    fn from(group: Arc<SceneObjectGroup>) -> Self {
        Self::Group(group)
    }
}

impl From<Arc<Avatar>> for SceneEntity {
    fn from(avatar: Arc<Avatar>) -> Self {
        Self::Avatar(avatar)
    }
}
