//! Mathematical types shared between the scene substrate and its clients.
//!
//! These are the canonical representations of entity transforms.

use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};

/// 3D Vector - position, offset, scale
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Vec3 {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
}

impl Vec3 {
    /// Creates a new Vec3
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Zero vector
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0);

    /// Unit scale
    pub const ONE: Self = Self::new(1.0, 1.0, 1.0);

    /// Checks if every component is exactly zero.
    ///
    /// Zero is the "unspecified" sentinel for captured positions and scales.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self == Self::ZERO
    }
}

/// Quaternion for rotations
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Quaternion {
    /// X component
    pub x: f32,
    /// Y component
    pub y: f32,
    /// Z component
    pub z: f32,
    /// W component
    pub w: f32,
}

impl Quaternion {
    /// Creates a new quaternion
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Identity rotation
    pub const IDENTITY: Self = Self::new(0.0, 0.0, 0.0, 1.0);

    /// Checks if this is exactly the identity rotation.
    #[must_use]
    pub fn is_identity(self) -> bool {
        self == Self::IDENTITY
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Transform - position + rotation + per-axis scale
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
pub struct Transform {
    /// Position
    pub position: Vec3,
    /// Rotation
    pub rotation: Quaternion,
    /// Scale
    pub scale: Vec3,
}

impl Transform {
    /// Creates a new transform
    #[must_use]
    pub const fn new(position: Vec3, rotation: Quaternion, scale: Vec3) -> Self {
        Self { position, rotation, scale }
    }

    /// Identity transform
    pub const IDENTITY: Self = Self::new(Vec3::ZERO, Quaternion::IDENTITY, Vec3::ONE);
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sentinels() {
        assert!(Vec3::ZERO.is_zero());
        assert!(!Vec3::new(0.0, 0.0, 0.5).is_zero());
        assert!(Quaternion::default().is_identity());
        assert_eq!(Transform::default().scale, Vec3::ONE);
    }

    #[test]
    fn test_transform_bytemuck() {
        let t = Transform::IDENTITY;
        let bytes: &[u8] = bytemuck::bytes_of(&t);
        assert_eq!(bytes.len(), 40); // 12 + 16 + 12 bytes
    }
}
