//! Configuration for per-tile surface generation, in grid units.

use crate::polymesh::MAX_VERTS_PER_POLY;
use nav_common::{Error, Result};

/// Parameters driving the voxelize -> partition -> polygonize pipeline.
///
/// Distances suffixed with `_cells` semantics (walkable height/climb/radius,
/// edge length, region areas) are expressed in voxel cells; the rest are in
/// world units.
#[derive(Debug, Clone)]
pub struct NavGenConfig {
    /// Horizontal voxel resolution (cell size on the XZ plane)
    pub cell_size: f32,
    /// Vertical voxel resolution
    pub cell_height: f32,

    /// Edge length of a tile, in cells (the tile is square)
    pub tile_size: i32,
    /// Extra cells rasterized around the tile so erosion and region growth
    /// behave the same at tile seams as in the interior
    pub border_size: i32,

    /// Maximum surface slope, in degrees, that is still walkable
    pub max_slope_deg: f32,
    /// Minimum clearance above a floor for an agent to stand, in cells
    pub walkable_height: i32,
    /// Maximum ledge height an agent can step up or down, in cells
    pub walkable_climb: i32,
    /// Agent radius used to erode the walkable area, in cells
    pub walkable_radius: i32,

    /// Maximum contour edge length, in cells
    pub max_edge_len: i32,
    /// Maximum distance a simplified contour may deviate from the raw
    /// boundary, in cells
    pub max_simplification_error: f32,
    /// Regions smaller than this many cells are merged away or discarded
    pub min_region_area: i32,
    /// Regions smaller than this many cells are merged into neighbors when
    /// possible
    pub merge_region_area: i32,

    /// Maximum vertices per polygon in the output mesh
    pub max_verts_per_poly: usize,

    /// Sampling distance for detail-mesh height samples, in world units
    pub detail_sample_dist: f32,
    /// Maximum height error of the detail mesh, in world units
    pub detail_sample_max_error: f32,
}

impl Default for NavGenConfig {
    fn default() -> Self {
        Self {
            cell_size: 0.3,
            cell_height: 0.2,
            tile_size: 64,
            border_size: 8,
            max_slope_deg: 45.0,
            walkable_height: 10,
            walkable_climb: 4,
            walkable_radius: 2,
            max_edge_len: 40,
            max_simplification_error: 1.3,
            min_region_area: 8,
            merge_region_area: 400,
            max_verts_per_poly: MAX_VERTS_PER_POLY,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
        }
    }
}

impl NavGenConfig {
    /// Validates the configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.cell_size <= 0.0 || self.cell_height <= 0.0 {
            return Err(Error::Generation(
                "cell size and cell height must be positive".to_string(),
            ));
        }
        if self.tile_size <= 0 {
            return Err(Error::Generation("tile size must be positive".to_string()));
        }
        if self.border_size < 0 {
            return Err(Error::Generation(
                "border size must not be negative".to_string(),
            ));
        }
        if !(0.0..=90.0).contains(&self.max_slope_deg) {
            return Err(Error::Generation(format!(
                "walkable slope {} outside [0, 90] degrees",
                self.max_slope_deg
            )));
        }
        if self.walkable_height < 1 || self.walkable_climb < 0 || self.walkable_radius < 0 {
            return Err(Error::Generation(
                "invalid agent dimensions in cells".to_string(),
            ));
        }
        if self.max_verts_per_poly < 3 || self.max_verts_per_poly > MAX_VERTS_PER_POLY {
            return Err(Error::Generation(format!(
                "max verts per polygon must be in [3, {}]",
                MAX_VERTS_PER_POLY
            )));
        }
        Ok(())
    }

    /// Width of the full rasterized grid for one tile, border included
    pub fn grid_size(&self) -> i32 {
        self.tile_size + self.border_size * 2
    }

    /// World-space edge length of a tile
    pub fn tile_world_size(&self) -> f32 {
        self.tile_size as f32 * self.cell_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(NavGenConfig::default().validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_values() {
        let mut cfg = NavGenConfig::default();
        cfg.cell_size = 0.0;
        assert!(cfg.validate().is_err());

        let mut cfg = NavGenConfig::default();
        cfg.max_slope_deg = 120.0;
        assert!(cfg.validate().is_err());

        let mut cfg = NavGenConfig::default();
        cfg.max_verts_per_poly = 2;
        assert!(cfg.validate().is_err());
    }
}
