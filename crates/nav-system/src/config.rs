//! World-unit configuration of the navigation subsystem.

use nav_common::{Error, Result};
use nav_gen::NavGenConfig;

/// Padding added around the level bounds before tiling, in world units, so
/// paths can hug the outermost geometry.
pub const WORLD_PADDING: f32 = 5.0;

/// Agent and grid parameters in world units. Converted to cell units for the
/// generation pipeline via [`NavSystemConfig::to_gen_config`].
#[derive(Debug, Clone)]
pub struct NavSystemConfig {
    /// Horizontal voxel size
    pub cell_size: f32,
    /// Vertical voxel size
    pub cell_height: f32,
    /// Maximum walkable slope, in degrees
    pub max_slope_deg: f32,
    /// Agent height
    pub agent_height: f32,
    /// Maximum ledge height the agent can step over
    pub agent_max_climb: f32,
    /// Agent radius
    pub agent_radius: f32,
    /// Tile edge length, in cells
    pub tile_size: i32,
    /// Maximum contour edge length, in world units
    pub max_edge_len: f32,
    /// Maximum contour simplification error, in cells
    pub max_simplification_error: f32,
    /// Minimum region area, in cells
    pub min_region_area: i32,
    /// Regions below this area merge into neighbors, in cells
    pub merge_region_area: i32,
    /// Maximum vertices per navmesh polygon
    pub max_verts_per_poly: usize,
    /// Detail mesh sample spacing, in world units
    pub detail_sample_dist: f32,
    /// Detail mesh maximum height error, in world units
    pub detail_sample_max_error: f32,
    /// Obstacle slab capacity
    pub max_obstacles: usize,
    /// Node ceiling for path searches
    pub max_search_nodes: usize,
    /// Dirty tiles rebuilt per update tick
    pub max_updates_per_tick: usize,
}

impl Default for NavSystemConfig {
    fn default() -> Self {
        Self {
            cell_size: 0.1,
            cell_height: 0.2,
            max_slope_deg: 45.0,
            agent_height: 2.0,
            agent_max_climb: 0.9,
            agent_radius: 0.5,
            tile_size: 64,
            max_edge_len: 12.0,
            max_simplification_error: 0.5,
            min_region_area: 25,
            merge_region_area: 10_000,
            max_verts_per_poly: 6,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
            max_obstacles: 256,
            max_search_nodes: 2048,
            max_updates_per_tick: 4,
        }
    }
}

impl NavSystemConfig {
    /// Creates the default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the voxel resolution
    pub fn with_cell_size(mut self, cell_size: f32, cell_height: f32) -> Self {
        self.cell_size = cell_size;
        self.cell_height = cell_height;
        self
    }

    /// Overrides the agent dimensions
    pub fn with_agent(mut self, height: f32, radius: f32, max_climb: f32) -> Self {
        self.agent_height = height;
        self.agent_radius = radius;
        self.agent_max_climb = max_climb;
        self
    }

    /// Overrides the tile size in cells
    pub fn with_tile_size(mut self, tile_size: i32) -> Self {
        self.tile_size = tile_size;
        self
    }

    /// Overrides the obstacle capacity
    pub fn with_max_obstacles(mut self, max_obstacles: usize) -> Self {
        self.max_obstacles = max_obstacles;
        self
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.cell_size <= 0.0 || self.cell_height <= 0.0 {
            return Err(Error::Generation(
                "cell size and cell height must be positive".to_string(),
            ));
        }
        if self.agent_height <= 0.0 || self.agent_radius < 0.0 || self.agent_max_climb < 0.0 {
            return Err(Error::Generation(
                "agent dimensions must not be negative".to_string(),
            ));
        }
        self.to_gen_config().validate()
    }

    /// Agent radius in cells, rounded up
    pub fn walkable_radius_cells(&self) -> i32 {
        (self.agent_radius / self.cell_size).ceil() as i32
    }

    /// Converts to the cell-unit pipeline configuration
    pub fn to_gen_config(&self) -> NavGenConfig {
        let radius_cells = self.walkable_radius_cells();
        NavGenConfig {
            cell_size: self.cell_size,
            cell_height: self.cell_height,
            tile_size: self.tile_size,
            border_size: radius_cells + 5,
            max_slope_deg: self.max_slope_deg,
            walkable_height: (self.agent_height / self.cell_height).ceil() as i32,
            walkable_climb: (self.agent_max_climb / self.cell_height).ceil() as i32,
            walkable_radius: radius_cells,
            max_edge_len: (self.max_edge_len / self.cell_size) as i32,
            max_simplification_error: self.max_simplification_error,
            min_region_area: self.min_region_area,
            merge_region_area: self.merge_region_area,
            max_verts_per_poly: self.max_verts_per_poly,
            detail_sample_dist: self.detail_sample_dist,
            detail_sample_max_error: self.detail_sample_max_error,
        }
    }

    /// World-space edge length of one tile
    pub fn tile_world_size(&self) -> f32 {
        self.tile_size as f32 * self.cell_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(NavSystemConfig::default().validate().is_ok());
    }

    #[test]
    fn test_cell_conversion() {
        let cfg = NavSystemConfig::default();
        let gen = cfg.to_gen_config();
        // 2.0m agent at 0.2m cells
        assert_eq!(gen.walkable_height, 10);
        // 0.9m climb at 0.2m cells
        assert_eq!(gen.walkable_climb, 5);
        // 0.5m radius at 0.1m cells
        assert_eq!(gen.walkable_radius, 5);
        assert_eq!(gen.border_size, 10);
        assert_eq!(gen.max_edge_len, 120);
    }

    #[test]
    fn test_builder_style_overrides() {
        let cfg = NavSystemConfig::new()
            .with_cell_size(0.2, 0.3)
            .with_agent(1.8, 0.4, 0.6)
            .with_tile_size(32)
            .with_max_obstacles(16);
        assert_eq!(cfg.cell_size, 0.2);
        assert_eq!(cfg.agent_radius, 0.4);
        assert_eq!(cfg.tile_size, 32);
        assert_eq!(cfg.max_obstacles, 16);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn test_rejects_degenerate_agent() {
        let mut cfg = NavSystemConfig::default();
        cfg.agent_height = 0.0;
        assert!(cfg.validate().is_err());
    }
}
