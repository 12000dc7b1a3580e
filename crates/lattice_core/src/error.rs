//! # Scene Error Types
//!
//! Errors surfaced by configuration loading and scene-level commands.
//!
//! Index lookups never fail: a miss is `None`. Bookkeeping inconsistencies
//! are logged and healed inside the indices and never reach the caller.

use lattice_shared::{GlobalId, LocalHandle};
use thiserror::Error;

/// Errors that can occur in the scene substrate.
#[derive(Error, Debug)]
pub enum SceneError {
    /// A configuration file could not be read.
    #[error("failed to read configuration: {0}")]
    Io(#[from] std::io::Error),

    /// A configuration document is not valid TOML for its schema.
    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] toml::de::Error),

    /// An animation name is not present in the catalog.
    #[error("unknown animation: {0}")]
    UnknownAnimation(String),

    /// No part is registered under the given handle.
    #[error("unknown part handle: {0}")]
    UnknownPart(LocalHandle),

    /// No group is registered under the given identifier.
    #[error("unknown group: {0}")]
    UnknownGroup(GlobalId),

    /// No avatar is registered under the given identifier.
    #[error("unknown avatar: {0}")]
    UnknownAvatar(GlobalId),
}

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
