//! Lay things out on a circle.
//!
//! Slot `i` sits at `base_offset` rotated by `i * arc_degrees` around Z.
//! Systems use one ring (slot 0 is the idle sentinel), entities use a
//! smaller one keyed by their creation index so that entities sharing a
//! system don't stack on top of each other.
use bevy::math::{Quat, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CircularLayout {
    /// Position of slot 0.
    pub base_offset: Vec3,
    /// Rotation between two consecutive slots, in degrees.
    pub arc_degrees: f32,
}
impl CircularLayout {
    pub const fn new(base_offset: Vec3, arc_degrees: f32) -> Self {
        Self { base_offset, arc_degrees }
    }
    /// Default ring for system anchors.
    pub const SYSTEMS: Self = Self::new(Vec3::new(0.0, 5.0, 0.0), -15.0);
    /// Default ring for entities around their system's anchor.
    pub const ENTITIES: Self = Self::new(Vec3::new(0.0, 0.6, 0.0), -40.0);

    pub fn position(&self, slot: usize) -> Vec3 {
        let angle = (self.arc_degrees * slot as f32).to_radians();
        Quat::from_rotation_z(angle) * self.base_offset
    }
}
