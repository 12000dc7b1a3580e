//! # Sit Targets
//!
//! A seat-bearing part owns one [`SitTarget`]. The sitter is recorded by
//! identifier only, so the seat never keeps an avatar alive.

use lattice_shared::{GlobalId, Quaternion, Vec3};

/// Seat record of a part: where an avatar sits and who is sitting.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SitTarget {
    /// Seat position relative to the part.
    pub offset: Vec3,
    /// Seat orientation relative to the part.
    pub rotation: Quaternion,
    sitter: Option<GlobalId>,
}

impl SitTarget {
    /// Creates an unoccupied seat.
    #[must_use]
    pub const fn new(offset: Vec3, rotation: Quaternion) -> Self {
        Self {
            offset,
            rotation,
            sitter: None,
        }
    }

    /// True if the seat offset or rotation has been configured.
    #[must_use]
    pub fn is_set(&self) -> bool {
        !self.offset.is_zero() || !self.rotation.is_identity()
    }

    /// Records `avatar` as the sitter. Last writer wins.
    pub fn seat_avatar(&mut self, avatar: GlobalId) {
        self.sitter = Some(avatar);
    }

    /// Clears the sitter if it is `avatar`. Returns whether it was cleared.
    pub fn unseat(&mut self, avatar: GlobalId) -> bool {
        if self.sitter == Some(avatar) {
            self.sitter = None;
            true
        } else {
            false
        }
    }

    /// The avatar currently recorded on the seat.
    #[inline]
    #[must_use]
    pub const fn sitter(&self) -> Option<GlobalId> {
        self.sitter
    }
}
