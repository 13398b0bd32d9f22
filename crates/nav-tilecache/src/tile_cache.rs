//! The compressed tile cache and its bounded update loop.

use crate::compress::{LayerCompressor, PassthroughCompressor};
use crate::obstacle::{clamp_min_extent, Obstacle, ObstacleHandle};
use glam::Vec3;
use nav_common::{Error, Result, TileCoord, TriMesh};
use nav_gen::{ObstacleBox, TileBuilder, TileLayer};
use nav_mesh::NavMesh;
use std::collections::{HashMap, HashSet, VecDeque};

/// Dirty tiles rebuilt per `update` call. Bounding the per-tick work keeps
/// the shared lock short so concurrent path queries are not starved.
pub const MAX_TILE_UPDATES_PER_TICK: usize = 4;

/// Stable reference to a cached tile. The zero value is the invalid handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TileHandle(u32);

impl TileHandle {
    /// The invalid handle
    pub const NULL: TileHandle = TileHandle(0);

    /// Whether this is the invalid handle
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    fn new(salt: u16, index: usize) -> Self {
        TileHandle(((salt as u32) << 16) | (index as u32 + 1))
    }

    fn index(self) -> Option<usize> {
        let i = self.0 & 0xffff;
        if i == 0 {
            None
        } else {
            Some(i as usize - 1)
        }
    }

    fn salt(self) -> u16 {
        (self.0 >> 16) as u16
    }
}

/// Construction parameters of the tile cache
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct TileCacheParams {
    /// Minimum corner of the navigable world
    pub world_bmin: Vec3,
    /// Maximum corner of the navigable world
    pub world_bmax: Vec3,
    /// World-space edge length of one tile
    pub tile_width: f32,
    /// Padding added around an obstacle when collecting affected tiles, so
    /// erosion changes near tile seams dirty the neighbor too
    pub border_padding: f32,
    /// Capacity of the tile slab
    pub max_tiles: usize,
    /// Capacity of the obstacle slab
    pub max_obstacles: usize,
    /// Dirty tiles rebuilt per update call
    pub max_updates_per_tick: usize,
}

#[derive(Debug)]
struct CachedTile {
    coord: TileCoord,
    salt: u16,
    data: Vec<u8>,
}

/// Compressed per-tile layer storage, the obstacle set and the dirty queue
pub struct TileCache {
    params: TileCacheParams,
    compressor: Box<dyn LayerCompressor>,
    tiles: Vec<Option<CachedTile>>,
    tile_salts: Vec<u16>,
    free_tiles: Vec<usize>,
    lookup: HashMap<(i32, i32), usize>,
    obstacles: Vec<Option<Obstacle>>,
    obstacle_salts: Vec<u16>,
    free_obstacles: Vec<usize>,
    dirty: VecDeque<TileCoord>,
    dirty_set: HashSet<TileCoord>,
}

impl std::fmt::Debug for TileCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TileCache")
            .field("tiles", &self.lookup.len())
            .field("obstacles", &self.obstacle_count())
            .field("dirty", &self.dirty.len())
            .finish()
    }
}

impl TileCache {
    /// Creates a cache with the default passthrough compressor
    pub fn new(params: TileCacheParams) -> Result<Self> {
        Self::with_compressor(params, Box::new(PassthroughCompressor))
    }

    /// Creates a cache with a custom layer compressor
    pub fn with_compressor(
        params: TileCacheParams,
        compressor: Box<dyn LayerCompressor>,
    ) -> Result<Self> {
        if params.tile_width <= 0.0 {
            return Err(Error::TileCache("tile width must be positive".to_string()));
        }
        if params.max_tiles == 0 || params.max_tiles > u16::MAX as usize {
            return Err(Error::TileCache(format!(
                "max tiles {} outside [1, {}]",
                params.max_tiles,
                u16::MAX
            )));
        }
        if params.max_obstacles == 0 || params.max_obstacles > u16::MAX as usize {
            return Err(Error::TileCache(format!(
                "max obstacles {} outside [1, {}]",
                params.max_obstacles,
                u16::MAX
            )));
        }
        Ok(Self {
            params,
            compressor,
            tiles: Vec::new(),
            tile_salts: Vec::new(),
            free_tiles: Vec::new(),
            lookup: HashMap::new(),
            obstacles: Vec::new(),
            obstacle_salts: Vec::new(),
            free_obstacles: Vec::new(),
            dirty: VecDeque::new(),
            dirty_set: HashSet::new(),
        })
    }

    /// Construction parameters
    pub fn params(&self) -> &TileCacheParams {
        &self.params
    }

    /// Number of cached tiles
    pub fn tile_count(&self) -> usize {
        self.lookup.len()
    }

    /// Number of active obstacles
    pub fn obstacle_count(&self) -> usize {
        self.obstacles.iter().filter(|o| o.is_some()).count()
    }

    /// Whether all obstacle changes have been folded into tile layers
    pub fn is_up_to_date(&self) -> bool {
        self.dirty.is_empty()
    }

    /// Stores a serialized layer for `coord`. Returns the invalid handle when
    /// the coordinate already holds a layer or the slab is full.
    pub fn add_tile(&mut self, coord: TileCoord, layer_bytes: &[u8]) -> TileHandle {
        if self.lookup.contains_key(&(coord.x, coord.z)) {
            log::warn!(
                "tile ({}, {}) already cached; add ignored",
                coord.x,
                coord.z
            );
            return TileHandle::NULL;
        }
        let data = match self.compressor.compress(layer_bytes) {
            Ok(d) => d,
            Err(e) => {
                log::error!("tile ({}, {}) compression failed: {}", coord.x, coord.z, e);
                return TileHandle::NULL;
            }
        };

        let slot = match self.free_tiles.pop() {
            Some(s) => s,
            None => {
                if self.tiles.len() >= self.params.max_tiles {
                    log::warn!(
                        "tile capacity {} exhausted; tile ({}, {}) dropped",
                        self.params.max_tiles,
                        coord.x,
                        coord.z
                    );
                    return TileHandle::NULL;
                }
                self.tiles.push(None);
                self.tile_salts.push(0);
                self.tiles.len() - 1
            }
        };
        self.tile_salts[slot] = self.tile_salts[slot].wrapping_add(1).max(1);
        let salt = self.tile_salts[slot];
        self.tiles[slot] = Some(CachedTile { coord, salt, data });
        self.lookup.insert((coord.x, coord.z), slot);
        TileHandle::new(salt, slot)
    }

    /// Frees a tile slot. Unknown or stale handles are a no-op.
    pub fn remove_tile(&mut self, handle: TileHandle) {
        let Some(slot) = handle.index() else { return };
        let Some(tile) = self.tiles.get(slot).and_then(|t| t.as_ref()) else {
            return;
        };
        if tile.salt != handle.salt() {
            return;
        }
        let coord = tile.coord;
        self.lookup.remove(&(coord.x, coord.z));
        self.tiles[slot] = None;
        self.free_tiles.push(slot);
        self.dirty_set.remove(&coord);
        self.dirty.retain(|c| *c != coord);
    }

    /// Handle of the tile cached at `coord`
    pub fn tile_at(&self, coord: TileCoord) -> Option<TileHandle> {
        let slot = *self.lookup.get(&(coord.x, coord.z))?;
        let tile = self.tiles[slot].as_ref()?;
        Some(TileHandle::new(tile.salt, slot))
    }

    /// Decompressed layer bytes of a cached tile
    pub fn tile_bytes(&self, handle: TileHandle) -> Option<Vec<u8>> {
        let slot = handle.index()?;
        let tile = self.tiles.get(slot)?.as_ref()?;
        if tile.salt != handle.salt() {
            return None;
        }
        self.compressor.decompress(&tile.data).ok()
    }

    /// Inserts a box obstacle, clamped to the minimum extent, and marks every
    /// intersecting tile dirty. Returns the invalid handle when the obstacle
    /// slab is full; the obstacle is then not applied.
    pub fn add_box_obstacle(&mut self, bmin: Vec3, bmax: Vec3) -> ObstacleHandle {
        let (bmin, bmax) = clamp_min_extent(bmin, bmax);

        let slot = match self.free_obstacles.pop() {
            Some(s) => s,
            None => {
                if self.obstacles.len() >= self.params.max_obstacles {
                    log::warn!(
                        "obstacle capacity {} exhausted; obstacle dropped",
                        self.params.max_obstacles
                    );
                    return ObstacleHandle::NULL;
                }
                self.obstacles.push(None);
                self.obstacle_salts.push(0);
                self.obstacles.len() - 1
            }
        };
        self.obstacle_salts[slot] = self.obstacle_salts[slot].wrapping_add(1).max(1);
        let salt = self.obstacle_salts[slot];

        let touched = self.tiles_touching(bmin, bmax);
        for &coord in &touched {
            self.mark_dirty(coord);
        }
        self.obstacles[slot] = Some(Obstacle {
            bmin,
            bmax,
            salt,
            touched,
        });
        ObstacleHandle::new(salt, slot)
    }

    /// Removes an obstacle and marks the tiles it touched dirty again.
    /// Unknown, stale or already-removed handles are a no-op.
    pub fn remove_obstacle(&mut self, handle: ObstacleHandle) {
        let Some(slot) = handle.index() else { return };
        let valid = self
            .obstacles
            .get(slot)
            .and_then(|o| o.as_ref())
            .map_or(false, |o| o.salt == handle.salt());
        if !valid {
            return;
        }
        if let Some(ob) = self.obstacles[slot].take() {
            for coord in ob.touched {
                self.mark_dirty(coord);
            }
        }
        self.free_obstacles.push(slot);
    }

    /// Active obstacle boxes, for rebuilds
    pub fn obstacle_boxes(&self) -> Vec<ObstacleBox> {
        self.obstacles
            .iter()
            .flatten()
            .map(|o| ObstacleBox {
                bmin: o.bmin,
                bmax: o.bmax,
            })
            .collect()
    }

    /// Processes a bounded amount of pending rebuild work: up to
    /// `max_updates_per_tick` dirty tiles are rebuilt from the source mesh
    /// with all active obstacles subtracted, restored into the cache and
    /// re-stitched into the navigation mesh. Returns whether every dirty
    /// tile has now been rebuilt.
    ///
    /// A tile whose rebuild fails keeps its previous layer and stitching and
    /// is retried on a later tick.
    pub fn update(
        &mut self,
        _dt: f32,
        builder: &TileBuilder,
        source: &TriMesh,
        nav: &mut NavMesh,
    ) -> Result<bool> {
        let budget = self.params.max_updates_per_tick.max(1);
        let mut processed = 0;

        while processed < budget {
            let Some(coord) = self.dirty.pop_front() else { break };
            self.dirty_set.remove(&coord);
            processed += 1;

            let Some(&slot) = self.lookup.get(&(coord.x, coord.z)) else {
                // Tile was removed while queued
                continue;
            };

            let obstacles = self.obstacle_boxes();
            match builder.build_tile(
                coord,
                self.params.world_bmin,
                self.params.world_bmax,
                source,
                &obstacles,
            ) {
                Ok(Some(layer)) => {
                    if let Err(e) = self.store_and_stitch(slot, &layer, nav) {
                        log::warn!(
                            "tile ({}, {}) rebuild not applied: {}; retrying later",
                            coord.x,
                            coord.z,
                            e
                        );
                        self.mark_dirty(coord);
                    }
                }
                Ok(None) => {
                    // The source mesh no longer overlaps this tile; the
                    // cached layer stays as built
                    log::debug!(
                        "tile ({}, {}) has no source geometry; rebuild skipped",
                        coord.x,
                        coord.z
                    );
                }
                Err(e) => {
                    log::warn!(
                        "tile ({}, {}) rebuild failed: {}; retrying later",
                        coord.x,
                        coord.z,
                        e
                    );
                    self.mark_dirty(coord);
                }
            }
        }

        Ok(self.dirty.is_empty())
    }

    fn store_and_stitch(
        &mut self,
        slot: usize,
        layer: &TileLayer,
        nav: &mut NavMesh,
    ) -> Result<()> {
        let data = self.compressor.compress(&layer.to_bytes())?;
        // Stitch first: on failure the old layer and polygons stay in place
        nav.stitch_tile(layer)?;
        if let Some(tile) = self.tiles[slot].as_mut() {
            tile.data = data;
        }
        Ok(())
    }

    /// Marks a cached tile as needing a rebuild
    pub fn mark_dirty(&mut self, coord: TileCoord) {
        if !self.lookup.contains_key(&(coord.x, coord.z)) {
            return;
        }
        if self.dirty_set.insert(coord) {
            self.dirty.push_back(coord);
        }
    }

    /// Cached tiles whose bounds intersect the padded box
    fn tiles_touching(&self, bmin: Vec3, bmax: Vec3) -> Vec<TileCoord> {
        let pad = self.params.border_padding;
        let inv = 1.0 / self.params.tile_width;
        let tx0 = ((bmin.x - pad - self.params.world_bmin.x) * inv).floor() as i32;
        let tx1 = ((bmax.x + pad - self.params.world_bmin.x) * inv).floor() as i32;
        let tz0 = ((bmin.z - pad - self.params.world_bmin.z) * inv).floor() as i32;
        let tz1 = ((bmax.z + pad - self.params.world_bmin.z) * inv).floor() as i32;

        let mut touched = Vec::new();
        for tz in tz0..=tz1 {
            for tx in tx0..=tx1 {
                if self.lookup.contains_key(&(tx, tz)) {
                    touched.push(TileCoord::new(tx, tz));
                }
            }
        }
        touched
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> TileCacheParams {
        TileCacheParams {
            world_bmin: Vec3::new(0.0, -1.0, 0.0),
            world_bmax: Vec3::new(32.0, 1.0, 32.0),
            tile_width: 8.0,
            border_padding: 2.0,
            max_tiles: 16,
            max_obstacles: 4,
            max_updates_per_tick: 2,
        }
    }

    fn cache_with_tiles(n: i32) -> TileCache {
        let mut cache = TileCache::new(params()).unwrap();
        for tz in 0..n {
            for tx in 0..n {
                let h = cache.add_tile(TileCoord::new(tx, tz), &[1, 2, 3]);
                assert!(!h.is_null());
            }
        }
        cache
    }

    #[test]
    fn test_add_tile_rejects_duplicates() {
        let mut cache = TileCache::new(params()).unwrap();
        let h = cache.add_tile(TileCoord::new(0, 0), &[1]);
        assert!(!h.is_null());
        assert!(cache.add_tile(TileCoord::new(0, 0), &[2]).is_null());
        assert_eq!(cache.tile_count(), 1);
    }

    #[test]
    fn test_tile_capacity_exhaustion() {
        let mut p = params();
        p.max_tiles = 1;
        let mut cache = TileCache::new(p).unwrap();
        assert!(!cache.add_tile(TileCoord::new(0, 0), &[1]).is_null());
        assert!(cache.add_tile(TileCoord::new(1, 0), &[2]).is_null());
    }

    #[test]
    fn test_remove_tile_is_idempotent() {
        let mut cache = TileCache::new(params()).unwrap();
        let h = cache.add_tile(TileCoord::new(0, 0), &[1]);
        cache.remove_tile(h);
        assert_eq!(cache.tile_count(), 0);
        // Second remove with the same handle is a no-op
        cache.remove_tile(h);
        assert_eq!(cache.tile_count(), 0);
        // Stale handle does not touch a reused slot
        let h2 = cache.add_tile(TileCoord::new(0, 0), &[2]);
        cache.remove_tile(h);
        assert!(cache.tile_at(TileCoord::new(0, 0)).is_some());
        cache.remove_tile(h2);
        assert_eq!(cache.tile_count(), 0);
    }

    #[test]
    fn test_tile_bytes_round_trip() {
        let mut cache = TileCache::new(params()).unwrap();
        let h = cache.add_tile(TileCoord::new(2, 3), &[9, 8, 7]);
        assert_eq!(cache.tile_bytes(h).unwrap(), vec![9, 8, 7]);
    }

    #[test]
    fn test_obstacle_marks_intersecting_tiles_dirty() {
        let mut cache = cache_with_tiles(4);
        assert!(cache.is_up_to_date());
        // A small box near the center of tile (1, 1); padding pulls in the
        // neighbors whose borders overlap it
        let h = cache.add_box_obstacle(Vec3::new(11.0, -0.5, 11.0), Vec3::new(13.0, 0.5, 13.0));
        assert!(!h.is_null());
        assert!(!cache.is_up_to_date());
        assert!(cache.dirty_set.contains(&TileCoord::new(1, 1)));
    }

    #[test]
    fn test_obstacle_capacity_exhaustion() {
        let mut cache = cache_with_tiles(2);
        let mut handles = Vec::new();
        for i in 0..4 {
            let h = cache.add_box_obstacle(
                Vec3::new(i as f32 * 3.0, 0.0, 0.0),
                Vec3::new(i as f32 * 3.0 + 2.0, 2.0, 2.0),
            );
            assert!(!h.is_null());
            handles.push(h);
        }
        let overflow =
            cache.add_box_obstacle(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        assert!(overflow.is_null());
        // Freeing one slot makes room again
        cache.remove_obstacle(handles[0]);
        let h = cache.add_box_obstacle(Vec3::new(0.0, 0.0, 0.0), Vec3::new(2.0, 2.0, 2.0));
        assert!(!h.is_null());
    }

    #[test]
    fn test_remove_obstacle_is_idempotent() {
        let mut cache = cache_with_tiles(2);
        let h = cache.add_box_obstacle(Vec3::new(1.0, -0.5, 1.0), Vec3::new(3.0, 0.5, 3.0));
        cache.remove_obstacle(h);
        assert_eq!(cache.obstacle_count(), 0);
        cache.remove_obstacle(h);
        assert_eq!(cache.obstacle_count(), 0);
        // A stale handle must not remove a newer obstacle in the same slot
        let h2 = cache.add_box_obstacle(Vec3::new(1.0, -0.5, 1.0), Vec3::new(3.0, 0.5, 3.0));
        cache.remove_obstacle(h);
        assert_eq!(cache.obstacle_count(), 1);
        cache.remove_obstacle(h2);
        assert_eq!(cache.obstacle_count(), 0);
    }

    #[test]
    fn test_obstacle_outside_world_marks_nothing() {
        let mut cache = cache_with_tiles(2);
        let h = cache.add_box_obstacle(
            Vec3::new(100.0, 0.0, 100.0),
            Vec3::new(104.0, 2.0, 104.0),
        );
        assert!(!h.is_null());
        assert!(cache.is_up_to_date());
    }
}
