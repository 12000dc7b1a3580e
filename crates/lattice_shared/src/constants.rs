//! # Region Defaults
//!
//! Values used when a region is started without an explicit configuration.

/// Depth of each part's undo and redo stacks.
pub const DEFAULT_MAX_UNDO: usize = 5;

/// First numeric handle handed out by a fresh region.
///
/// Zero is reserved as the "not yet assigned" sentinel.
pub const DEFAULT_FIRST_LOCAL_HANDLE: u32 = 1;

/// Capacity of the replication request queue.
pub const DEFAULT_UPDATE_QUEUE_CAPACITY: usize = 10_000;
