//! Compressed tile layer cache.
//!
//! Owns the serialized per-tile walkable layers and the temporary obstacle
//! set. Obstacle changes mark intersecting tiles dirty; a bounded amount of
//! dirty-tile rebuild work runs per update tick so path queries issued from
//! another thread are never starved behind a full rebuild.

mod compress;
mod obstacle;
mod tile_cache;

pub use compress::{LayerCompressor, PassthroughCompressor};
#[cfg(feature = "lz4")]
pub use compress::Lz4Compressor;
pub use obstacle::{Obstacle, ObstacleHandle, MIN_OBSTACLE_EXTENT};
pub use tile_cache::{TileCache, TileCacheParams, TileHandle, MAX_TILE_UPDATES_PER_TICK};
