//! Common utilities and data structures shared by the navigation pipeline
//! crates: world-space math, triangle mesh input, and the error taxonomy.

mod geometry;
mod math;
mod mesh;

pub use geometry::*;
pub use math::*;
pub use mesh::*;

/// Represents a 3D position
pub type Vec3 = glam::Vec3;

/// Integer coordinate of a fixed-size square tile on the XZ plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileCoord {
    /// Tile index along the x-axis
    pub x: i32,
    /// Tile index along the z-axis
    pub z: i32,
}

impl TileCoord {
    /// Creates a new tile coordinate
    pub fn new(x: i32, z: i32) -> Self {
        Self { x, z }
    }
}

/// Error types for the navigation subsystem
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("invalid input mesh: {0}")]
    InvalidMesh(String),

    #[error("surface generation failed: {0}")]
    Generation(String),

    #[error("tile cache error: {0}")]
    TileCache(String),

    #[error("navigation mesh error: {0}")]
    NavMesh(String),

    #[error("pathfinding failed: {0}")]
    Pathfinding(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for navigation operations
pub type Result<T> = std::result::Result<T, Error>;
