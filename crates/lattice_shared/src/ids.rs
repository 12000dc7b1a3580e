//! # Entity Identifiers
//!
//! Every entity in a region is reachable through two independent keys:
//! - A [`GlobalId`]: 128-bit, unique across processes, fixed for the entity's lifetime
//! - A [`LocalHandle`]: 32-bit, unique only within the region, reassignable
//!
//! Handle zero is the "not yet assigned" sentinel and is never indexed.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique identifier of an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct GlobalId(Uuid);

impl GlobalId {
    /// The all-zero identifier. Used as "no entity" in records that carry an originator.
    pub const ZERO: Self = Self(Uuid::nil());

    /// Generates a fresh random identifier.
    #[inline]
    #[must_use]
    pub fn random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Wraps an existing UUID.
    #[inline]
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Builds an identifier from its 128-bit value.
    #[inline]
    #[must_use]
    pub const fn from_u128(value: u128) -> Self {
        Self(Uuid::from_u128(value))
    }

    /// Returns the wrapped UUID.
    #[inline]
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Checks if this is the all-zero identifier.
    #[inline]
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_nil()
    }
}

impl From<Uuid> for GlobalId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl fmt::Display for GlobalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Region-local numeric handle of an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct LocalHandle(u32);

impl LocalHandle {
    /// Sentinel meaning "no handle assigned yet".
    pub const UNASSIGNED: Self = Self(0);

    /// Creates a handle from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Checks if a real handle has been assigned.
    #[inline]
    #[must_use]
    pub const fn is_assigned(self) -> bool {
        self.0 != 0
    }
}

impl From<u32> for LocalHandle {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

impl fmt::Display for LocalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unassigned_sentinel() {
        assert!(!LocalHandle::UNASSIGNED.is_assigned());
        assert!(LocalHandle::new(7).is_assigned());
        assert_eq!(LocalHandle::default(), LocalHandle::UNASSIGNED);
    }

    #[test]
    fn test_global_id_zero() {
        assert!(GlobalId::ZERO.is_zero());
        assert!(!GlobalId::random().is_zero());
        assert_eq!(GlobalId::from_u128(0), GlobalId::ZERO);
    }
}
