//! The owned navigation system facade.

use crate::config::{NavSystemConfig, WORLD_PADDING};
use crate::los::LineOfSight;
use glam::Vec3;
use nav_common::{Result, TileCoord, TriMesh};
use nav_gen::TileBuilder;
use nav_mesh::{NavMesh, NavMeshParams, NavMeshQuery};
use nav_tilecache::{ObstacleHandle, TileCache, TileCacheParams};
use std::sync::{Mutex, MutexGuard};

/// Mutable navigation state guarded by the system lock
struct NavState {
    nav_mesh: Option<NavMesh>,
    tile_cache: Option<TileCache>,
    builder: Option<TileBuilder>,
    source: Option<TriMesh>,
}

impl NavState {
    fn empty() -> Self {
        Self {
            nav_mesh: None,
            tile_cache: None,
            builder: None,
            source: None,
        }
    }
}

/// The navigation subsystem.
///
/// One instance is owned by the application and shared by reference with the
/// level loader, the simulation loop and the debug renderer. Every public
/// operation acquires the internal lock for its full duration; none blocks
/// on I/O while holding it. Concurrent path queries and obstacle changes
/// interleave at operation granularity, so a query may see the navmesh from
/// just before or just after a concurrent obstacle change.
pub struct NavigationSystem {
    config: NavSystemConfig,
    los: Box<dyn LineOfSight>,
    state: Mutex<NavState>,
}

impl NavigationSystem {
    /// Creates an unbuilt system. `line_of_sight` is used only to prune
    /// redundant waypoints near path endpoints.
    pub fn new(config: NavSystemConfig, line_of_sight: Box<dyn LineOfSight>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            los: line_of_sight,
            state: Mutex::new(NavState::empty()),
        })
    }

    /// The active configuration
    pub fn config(&self) -> &NavSystemConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, NavState> {
        // A panicked holder cannot leave partial mutations that matter here:
        // every mutation path replaces whole tiles or whole state
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Builds the navigation surface for a level from its merged static
    /// collision mesh. Synchronous and blocking: runs the full voxelize ->
    /// partition -> polygonize pipeline for every tile and stitches the
    /// results. Replaces any previously built state, including obstacles.
    ///
    /// An empty mesh is legal and produces an unbuilt surface on which every
    /// query returns an empty path.
    pub fn build_all(&self, vertices: &[Vec3], indices: &[u32]) -> Result<()> {
        let mesh = TriMesh::from_slices(vertices, indices)?;
        let mut state = self.lock();
        *state = NavState::empty();

        let Some((mut bmin, mut bmax)) = mesh.bounds() else {
            log::warn!("level mesh has no vertices; navigation surface left empty");
            state.source = Some(mesh);
            return Ok(());
        };
        bmin -= Vec3::splat(WORLD_PADDING);
        bmax += Vec3::splat(WORLD_PADDING);

        let builder = TileBuilder::new(self.config.to_gen_config())?;
        let tile_width = self.config.tile_world_size();
        let ntx = (((bmax.x - bmin.x) / tile_width).ceil() as i32).max(1);
        let ntz = (((bmax.z - bmin.z) / tile_width).ceil() as i32).max(1);
        let max_tiles = (ntx * ntz) as usize;

        let mut nav = NavMesh::new(NavMeshParams {
            origin: bmin,
            tile_width,
            max_tiles,
            walkable_climb: self.config.agent_max_climb,
        })?;
        let mut cache = TileCache::new(TileCacheParams {
            world_bmin: bmin,
            world_bmax: bmax,
            tile_width,
            border_padding: (builder.config().border_size as f32) * self.config.cell_size,
            max_tiles,
            max_obstacles: self.config.max_obstacles,
            max_updates_per_tick: self.config.max_updates_per_tick,
        })?;

        let mut built = 0usize;
        for tz in 0..ntz {
            for tx in 0..ntx {
                let coord = TileCoord::new(tx, tz);
                let Some(layer) = builder.build_tile(coord, bmin, bmax, &mesh, &[])? else {
                    continue;
                };
                let handle = cache.add_tile(coord, &layer.to_bytes());
                if handle.is_null() {
                    log::warn!("tile ({}, {}) not cached; skipped", tx, tz);
                    continue;
                }
                nav.stitch_tile(&layer)?;
                built += 1;
            }
        }

        log::info!(
            "navigation surface built: {}x{} tile grid, {} tiles, {} polygons",
            ntx,
            ntz,
            built,
            nav.poly_count()
        );

        state.nav_mesh = Some(nav);
        state.tile_cache = Some(cache);
        state.builder = Some(builder);
        state.source = Some(mesh);
        Ok(())
    }

    /// Tears down all navigation state
    pub fn destroy(&self) {
        *self.lock() = NavState::empty();
    }

    /// Whether a navigation surface is currently built
    pub fn is_built(&self) -> bool {
        self.lock().nav_mesh.is_some()
    }

    /// Inserts a temporary box obstacle. The box is clamped to a minimum
    /// per-axis extent; affected tiles rebuild over subsequent [`update`]
    /// calls. Returns the invalid handle when the surface is unbuilt or the
    /// obstacle capacity is exhausted; the obstacle is then not applied.
    ///
    /// [`update`]: NavigationSystem::update
    pub fn add_box_obstacle(&self, bmin: Vec3, bmax: Vec3) -> ObstacleHandle {
        let mut state = self.lock();
        match state.tile_cache.as_mut() {
            Some(cache) => cache.add_box_obstacle(bmin, bmax),
            None => ObstacleHandle::NULL,
        }
    }

    /// Removes a previously inserted obstacle and queues the affected tiles
    /// for rebuild. Unknown or stale handles are a no-op.
    pub fn remove_obstacle(&self, handle: ObstacleHandle) {
        let mut state = self.lock();
        if let Some(cache) = state.tile_cache.as_mut() {
            cache.remove_obstacle(handle);
        }
    }

    /// Advances incremental rebuild work by one bounded step. Call once per
    /// simulation frame. Returns whether the navigation surface is fully up
    /// to date with the obstacle set.
    pub fn update(&self, dt: f32) -> bool {
        let mut state = self.lock();
        let state = &mut *state;
        let (Some(cache), Some(nav), Some(builder), Some(source)) = (
            state.tile_cache.as_mut(),
            state.nav_mesh.as_mut(),
            state.builder.as_ref(),
            state.source.as_ref(),
        ) else {
            return true;
        };
        match cache.update(dt, builder, source, nav) {
            Ok(up_to_date) => up_to_date,
            Err(e) => {
                log::error!("tile cache update failed: {}", e);
                false
            }
        }
    }

    /// Computes a walkable path from `start` to `target`.
    ///
    /// Returns an ordered waypoint list whose last point is exactly
    /// `target`, or an empty list when either endpoint cannot be matched to
    /// the surface or no corridor connects them. After funnel smoothing,
    /// one line-of-sight test per path end drops a redundant waypoint next
    /// to the start or the target; this is deliberately a single cheap test
    /// per end, not an iterated shortcut pass.
    pub fn find_path(&self, start: Vec3, target: Vec3) -> Vec<Vec3> {
        let state = self.lock();
        let Some(nav) = state.nav_mesh.as_ref() else {
            return Vec::new();
        };

        let mut query = NavMeshQuery::new(nav);
        query.set_max_nodes(self.config.max_search_nodes);

        let Some((start_ref, start_pt)) = query.find_nearest_poly(start) else {
            return Vec::new();
        };
        let Some((target_ref, target_pt)) = query.find_nearest_poly(target) else {
            return Vec::new();
        };

        if start.distance_squared(target) < 1e-8 {
            return vec![target];
        }

        let corridor = query.find_poly_path(start_ref, target_ref, start_pt, target_pt);
        if corridor.is_empty() {
            return Vec::new();
        }
        let mut path = query.find_straight_path(start_pt, target_pt, &corridor);
        if path.is_empty() {
            return Vec::new();
        }

        // Drop the first waypoint when its successor already sees the start
        if path.len() >= 2 && self.los.has_clear_path(path[1], start) {
            path.remove(0);
        }
        // Drop the last waypoint when it sees the target; the exact target
        // replaces it below
        if let Some(&last) = path.last() {
            if self.los.has_clear_path(last, target) {
                path.pop();
            }
        }
        path.push(target);
        path
    }

    /// Invokes `f` with both endpoints of every polygon boundary edge of the
    /// current navmesh, for external debug drawing. Holds the system lock
    /// for the duration of the enumeration, so keep the callback cheap.
    pub fn for_each_edge<F: FnMut(Vec3, Vec3)>(&self, f: F) {
        let state = self.lock();
        if let Some(nav) = state.nav_mesh.as_ref() {
            nav.for_each_edge(f);
        }
    }

    /// Number of stitched tiles, for diagnostics
    pub fn tile_count(&self) -> usize {
        self.lock().nav_mesh.as_ref().map_or(0, |n| n.tile_count())
    }

    /// Number of navmesh polygons, for diagnostics
    pub fn poly_count(&self) -> usize {
        self.lock().nav_mesh.as_ref().map_or(0, |n| n.poly_count())
    }

    /// Number of adjacency links, for diagnostics
    pub fn link_count(&self) -> usize {
        self.lock().nav_mesh.as_ref().map_or(0, |n| n.link_count())
    }

    /// Number of active obstacles
    pub fn obstacle_count(&self) -> usize {
        self.lock()
            .tile_cache
            .as_ref()
            .map_or(0, |c| c.obstacle_count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::los::AlwaysClear;

    #[test]
    fn test_unbuilt_system_is_inert() {
        let sys = NavigationSystem::new(NavSystemConfig::default(), Box::new(AlwaysClear))
            .unwrap();
        assert!(!sys.is_built());
        assert!(sys.find_path(Vec3::ZERO, Vec3::new(1.0, 0.0, 1.0)).is_empty());
        assert!(sys.update(0.016));
        assert!(sys
            .add_box_obstacle(Vec3::ZERO, Vec3::new(1.0, 1.0, 1.0))
            .is_null());
        let mut edges = 0;
        sys.for_each_edge(|_, _| edges += 1);
        assert_eq!(edges, 0);
    }

    #[test]
    fn test_empty_mesh_builds_empty_surface() {
        let sys = NavigationSystem::new(NavSystemConfig::default(), Box::new(AlwaysClear))
            .unwrap();
        sys.build_all(&[], &[]).unwrap();
        assert!(!sys.is_built());
        assert!(sys.find_path(Vec3::ZERO, Vec3::ONE).is_empty());
    }

    #[test]
    fn test_system_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<NavigationSystem>();
    }
}
