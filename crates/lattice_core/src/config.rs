//! # Scene Configuration
//!
//! Loaded once at startup from TOML. Every field has a default so an empty
//! document is a valid configuration.
//!
//! ```toml
//! max_undo = 5
//! first_local_handle = 1
//! update_queue_capacity = 10000
//! post_updates_on_commit = true
//! ```

use std::path::Path;

use lattice_shared::{DEFAULT_FIRST_LOCAL_HANDLE, DEFAULT_MAX_UNDO, DEFAULT_UPDATE_QUEUE_CAPACITY};
use serde::Deserialize;

use crate::error::SceneResult;

/// Region-wide tunables for the scene substrate.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    /// Depth of each part's undo and redo stacks. Zero disables undo capture.
    pub max_undo: usize,
    /// First numeric handle handed out by the region.
    pub first_local_handle: u32,
    /// Capacity of the replication request queue.
    pub update_queue_capacity: usize,
    /// Whether closing a transaction schedules a full update for released parts.
    pub post_updates_on_commit: bool,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            max_undo: DEFAULT_MAX_UNDO,
            first_local_handle: DEFAULT_FIRST_LOCAL_HANDLE,
            update_queue_capacity: DEFAULT_UPDATE_QUEUE_CAPACITY,
            post_updates_on_commit: true,
        }
    }
}

impl SceneConfig {
    /// Parses a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::SceneError::InvalidConfig`] if the text does not match the schema.
    pub fn from_toml_str(text: &str) -> SceneResult<Self> {
        let mut config: Self = toml::from_str(text)?;
        if config.first_local_handle == 0 {
            tracing::warn!("first_local_handle 0 is the unassigned sentinel, starting at 1");
            config.first_local_handle = 1;
        }
        Ok(config)
    }

    /// Reads and parses a configuration file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be read, or a parse error.
    pub fn from_file(path: impl AsRef<Path>) -> SceneResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = SceneConfig::from_toml_str("").unwrap();
        assert_eq!(config, SceneConfig::default());
        assert_eq!(config.max_undo, 5);
    }

    #[test]
    fn test_partial_override() {
        let text = "max_undo = 12\npost_updates_on_commit = false";
        let config = SceneConfig::from_toml_str(text).unwrap();
        assert_eq!(config.max_undo, 12);
        assert!(!config.post_updates_on_commit);
        assert_eq!(config.first_local_handle, 1);
    }

    #[test]
    fn test_zero_first_handle_is_bumped() {
        let config = SceneConfig::from_toml_str("first_local_handle = 0").unwrap();
        assert_eq!(config.first_local_handle, 1);
    }

    #[test]
    fn test_bad_type_is_rejected() {
        assert!(SceneConfig::from_toml_str("max_undo = \"lots\"").is_err());
    }
}
