//! Global navigation mesh.
//!
//! Tile layers produced by the generation pipeline are stitched into one
//! seamless mesh: polygons within a tile link through their shared edges,
//! and border edges weld to matching edges of the four neighboring tiles as
//! portals. Path queries run a best-first search over polygon adjacency
//! followed by funnel string-pulling.

mod mesh;
mod node;
mod query;

pub use mesh::{Link, MeshTile, NavMesh, NavMeshParams, PolyRef, TilePoly, LINK_NULL, PORTAL_EPS};
pub use query::{
    string_pull, NavMeshQuery, DEFAULT_QUERY_EXTENT, MAX_CORRIDOR_POLYS, MAX_SEARCH_NODES,
};
