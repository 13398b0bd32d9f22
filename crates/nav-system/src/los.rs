//! Line-of-sight collaborator.

use glam::Vec3;

/// Physics-backed visibility test consumed by path post-processing. The
/// implementation is external to this subsystem; it typically sweeps a small
/// sphere through the level's collision world.
pub trait LineOfSight: Send + Sync {
    /// Whether the straight segment from `a` to `b` is unobstructed
    fn has_clear_path(&self, a: Vec3, b: Vec3) -> bool;
}

/// A line-of-sight stub that always reports clear. Useful for tools and
/// headless builds without a physics world.
#[derive(Debug, Default, Clone, Copy)]
pub struct AlwaysClear;

impl LineOfSight for AlwaysClear {
    fn has_clear_path(&self, _a: Vec3, _b: Vec3) -> bool {
        true
    }
}
