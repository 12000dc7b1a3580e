//! # Lattice Shared
//!
//! Value types used by the scene substrate and by every subsystem that
//! talks to it (scripting, networking, physics callbacks).
//!
//! ## Contents
//!
//! - [`ids`]: the two identifier spaces every entity lives in
//! - [`math`]: vectors, quaternions and transforms
//! - [`constants`]: region-wide defaults

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod ids;
pub mod math;

pub use constants::{DEFAULT_FIRST_LOCAL_HANDLE, DEFAULT_MAX_UNDO, DEFAULT_UPDATE_QUEUE_CAPACITY};
pub use ids::{GlobalId, LocalHandle};
pub use math::{Quaternion, Transform, Vec3};
