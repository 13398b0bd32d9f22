//! Temporary box obstacles.

use glam::Vec3;
use nav_common::TileCoord;

/// Minimum extent of an obstacle box on every axis, in world units. Smaller
/// boxes are grown symmetrically around their center so a degenerate box can
/// never slip between voxel floors.
pub const MIN_OBSTACLE_EXTENT: f32 = 2.0;

/// Stable reference to an inserted obstacle. The zero value is the invalid
/// handle, returned when the obstacle set is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct ObstacleHandle(pub(crate) u32);

impl ObstacleHandle {
    /// The invalid handle
    pub const NULL: ObstacleHandle = ObstacleHandle(0);

    /// Whether this is the invalid handle
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn new(salt: u16, index: usize) -> Self {
        ObstacleHandle(((salt as u32) << 16) | (index as u32 + 1))
    }

    pub(crate) fn index(self) -> Option<usize> {
        let i = self.0 & 0xffff;
        if i == 0 {
            None
        } else {
            Some(i as usize - 1)
        }
    }

    pub(crate) fn salt(self) -> u16 {
        (self.0 >> 16) as u16
    }
}

/// An active axis-aligned box obstacle
#[derive(Debug, Clone)]
pub struct Obstacle {
    /// Minimum corner, after extent clamping
    pub bmin: Vec3,
    /// Maximum corner, after extent clamping
    pub bmax: Vec3,
    /// Salt of the slot at insertion time
    pub(crate) salt: u16,
    /// Tiles whose layers this obstacle affected when inserted
    pub(crate) touched: Vec<TileCoord>,
}

/// Grows the box symmetrically wherever an axis is thinner than
/// [`MIN_OBSTACLE_EXTENT`].
pub(crate) fn clamp_min_extent(mut bmin: Vec3, mut bmax: Vec3) -> (Vec3, Vec3) {
    for axis in 0..3 {
        let len = bmax[axis] - bmin[axis];
        if len < MIN_OBSTACLE_EXTENT {
            let delta = (MIN_OBSTACLE_EXTENT - len) * 0.5;
            bmin[axis] -= delta;
            bmax[axis] += delta;
        }
    }
    (bmin, bmax)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_grows_thin_axes() {
        let (bmin, bmax) = clamp_min_extent(Vec3::new(0.0, 0.0, 0.0), Vec3::new(0.5, 3.0, 1.0));
        assert_eq!(bmin, Vec3::new(-0.75, 0.0, -0.5));
        assert_eq!(bmax, Vec3::new(1.25, 3.0, 1.5));
    }

    #[test]
    fn test_clamp_keeps_large_boxes() {
        let (bmin, bmax) = clamp_min_extent(Vec3::ZERO, Vec3::new(4.0, 5.0, 6.0));
        assert_eq!(bmin, Vec3::ZERO);
        assert_eq!(bmax, Vec3::new(4.0, 5.0, 6.0));
    }

    #[test]
    fn test_handle_encoding() {
        let h = ObstacleHandle::new(7, 42);
        assert!(!h.is_null());
        assert_eq!(h.index(), Some(42));
        assert_eq!(h.salt(), 7);
        assert!(ObstacleHandle::NULL.is_null());
        assert_eq!(ObstacleHandle::NULL.index(), None);
    }
}
