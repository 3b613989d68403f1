// src/capture/appearance.rs
//! Appearance descriptors and 2D points

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// 2D point or vector in world units
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };
    pub const ONE: Vec2 = Vec2 { x: 1.0, y: 1.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Neither coordinate is NaN or infinite
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Immutable description of how an actor is drawn.
///
/// Equality and hashing use the exact bit patterns of the float fields, so
/// two descriptors intern to the same id only when they would render
/// identically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appearance {
    /// Texture/resource path
    pub path: String,

    /// Draw scale
    pub scale: Vec2,

    /// Rotation in radians
    pub rotation: f32,

    /// Draw origin
    pub origin: Vec2,

    /// Packed RGBA tint
    pub color: u32,
}

impl Appearance {
    /// Descriptor with unit scale, no rotation, zero origin and opaque white tint
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            scale: Vec2::ONE,
            rotation: 0.0,
            origin: Vec2::ZERO,
            color: 0xFFFF_FFFF,
        }
    }

    pub fn with_scale(mut self, scale: Vec2) -> Self {
        self.scale = scale;
        self
    }

    pub fn with_rotation(mut self, rotation: f32) -> Self {
        self.rotation = rotation;
        self
    }

    pub fn with_origin(mut self, origin: Vec2) -> Self {
        self.origin = origin;
        self
    }

    pub fn with_color(mut self, color: u32) -> Self {
        self.color = color;
        self
    }

    /// Whether every float field has a value the wire format can carry
    pub fn is_finite(&self) -> bool {
        self.scale.is_finite() && self.rotation.is_finite() && self.origin.is_finite()
    }

    fn bits(&self) -> [u32; 5] {
        [
            self.scale.x.to_bits(),
            self.scale.y.to_bits(),
            self.rotation.to_bits(),
            self.origin.x.to_bits(),
            self.origin.y.to_bits(),
        ]
    }
}

impl PartialEq for Appearance {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path && self.color == other.color && self.bits() == other.bits()
    }
}

impl Eq for Appearance {}

impl Hash for Appearance {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
        self.bits().hash(state);
        self.color.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_value_equality() {
        let a = Appearance::new("characters/player/idle00").with_scale(Vec2::new(-1.0, 1.0));
        let b = Appearance::new("characters/player/idle00").with_scale(Vec2::new(-1.0, 1.0));
        assert_eq!(a, b);

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn test_field_difference() {
        let base = Appearance::new("characters/player/idle00");
        assert_ne!(base, base.clone().with_rotation(0.5));
        assert_ne!(base, base.clone().with_color(0xFF00_00FF));
        assert_ne!(base, base.clone().with_origin(Vec2::new(0.5, 1.0)));
        assert_ne!(base, Appearance::new("characters/player/idle01"));
    }

    #[test]
    fn test_finiteness() {
        assert!(Vec2::new(-3.5, f32::MAX).is_finite());
        assert!(!Vec2::new(f32::NAN, 0.0).is_finite());
        assert!(!Vec2::new(0.0, f32::NEG_INFINITY).is_finite());

        let base = Appearance::new("characters/player/idle00");
        assert!(base.is_finite());
        assert!(!base.clone().with_rotation(f32::NAN).is_finite());
        assert!(!base.clone().with_scale(Vec2::new(f32::INFINITY, 1.0)).is_finite());
        assert!(!base.with_origin(Vec2::new(0.0, f32::NAN)).is_finite());
    }

    #[test]
    fn test_signed_zero_is_distinct() {
        let a = Appearance::new("x").with_rotation(0.0);
        let b = Appearance::new("x").with_rotation(-0.0);
        assert_ne!(a, b);
    }
}
