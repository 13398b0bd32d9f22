//! Per-tile walkable surface generation.
//!
//! The pipeline turns a slice of the level's triangle soup into a compact
//! polygon layer for one tile: triangles are voxelized into span columns,
//! non-walkable spans are filtered out, the remaining floor cells are eroded
//! and partitioned into watershed regions, region outlines are traced and
//! simplified into contours, and the contours are triangulated and merged
//! into a convex-polygon mesh with per-edge adjacency.

mod builder;
mod compact;
mod config;
mod contour;
mod detail;
mod filter;
mod layer;
mod polymesh;
mod rasterize;
mod region;
mod voxel;

pub use builder::{ObstacleBox, TileBuilder};
pub use compact::{CompactField, FloorCell, BORDER_REG};
pub use config::NavGenConfig;
pub use contour::{build_contours, Contour, ContourSet};
pub use detail::{build_detail_mesh, DetailMesh};
pub use filter::{
    filter_ledge_spans, filter_low_hanging_walkable_obstacles, filter_walkable_low_height_spans,
};
pub use layer::{LayerHeader, TileLayer, LAYER_MAGIC, LAYER_VERSION};
pub use polymesh::{build_poly_mesh, MeshPoly, PolyMesh, MAX_VERTS_PER_POLY, NO_INDEX};
pub use rasterize::rasterize_mesh;
pub use region::{build_distance_field, build_regions};
pub use voxel::{Span, VoxelField, NULL_AREA, WALKABLE_AREA};

/// Offset in x for the four cardinal grid directions (-x, +z, +x, -z)
pub const DIR_OFFSET_X: [i32; 4] = [-1, 0, 1, 0];
/// Offset in z for the four cardinal grid directions (-x, +z, +x, -z)
pub const DIR_OFFSET_Z: [i32; 4] = [0, 1, 0, -1];
