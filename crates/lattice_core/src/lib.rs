//! # Lattice Core
//!
//! The concurrent scene substrate of a region server: every object and
//! avatar in a region, indexed two ways, with cross-thread transactions
//! guarding multi-step edits.
//!
//! ## Architecture Rules
//!
//! 1. **Two keyspaces, one truth** - handle lookups always hop through the identifier map
//! 2. **Readers never lock** - membership collections publish immutable snapshots
//! 3. **Scoped transactions** - every begin is paired with an end on all exit paths
//! 4. **Heal, don't crash** - bookkeeping faults are logged and repaired in place
//!
//! ## Example
//!
//! ```rust,ignore
//! use lattice_core::{Scene, SceneObjectGroup, Part, TransformUpdate};
//!
//! let scene = Scene::default();
//! let group = SceneObjectGroup::new(Part::new(id, LocalHandle::UNASSIGNED), position);
//! scene.add_group(Arc::clone(&group));
//! scene.assign_handles(&group);
//!
//! let txn = scene.begin_group_transaction(&group);
//! // mutate parts; other threads wanting these handles block here
//! drop(txn);
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod animation;
pub mod collection;
pub mod config;
pub mod entity;
pub mod error;
pub mod identity;
pub mod registry;
pub mod scene;
pub mod sit;
pub mod transaction;
pub mod undo;
pub mod update;

pub use animation::{Animation, AnimationArrays, AnimationCatalog, AnimationSet};
pub use collection::{CollectionSnapshot, MembershipCollection};
pub use config::SceneConfig;
pub use entity::{Avatar, EntityKind, Part, SceneEntity, SceneObjectGroup};
pub use error::{SceneError, SceneResult};
pub use identity::{Identified, IdentityIndex};
pub use registry::{EntityRegistry, RegistryInsert};
pub use scene::{Scene, SceneTransaction, TransformUpdate};
pub use sit::SitTarget;
pub use transaction::{TransactionManager, TransactionToken};
pub use undo::{UndoHistory, UndoStack, UndoState};
pub use update::{NullUpdateSink, UpdateKind, UpdateQueue, UpdateRequest, UpdateSink};

pub use lattice_shared::{GlobalId, LocalHandle, Quaternion, Transform, Vec3};
