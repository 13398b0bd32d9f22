//! Per-tile build orchestration.
//!
//! Runs the full pipeline for one tile: rasterize the triangles overlapping
//! the padded tile bounds, filter walkability, subtract active obstacles,
//! partition into regions, trace contours and assemble the polygon layer.

use crate::compact::CompactField;
use crate::config::NavGenConfig;
use crate::contour::build_contours;
use crate::detail::build_detail_mesh;
use crate::filter::{
    filter_ledge_spans, filter_low_hanging_walkable_obstacles, filter_walkable_low_height_spans,
};
use crate::layer::{LayerHeader, TileLayer};
use crate::polymesh::build_poly_mesh;
use crate::rasterize::rasterize_mesh;
use crate::region::{build_distance_field, build_regions};
use crate::voxel::VoxelField;
use glam::Vec3;
use nav_common::{Result, TileCoord, TriMesh};

/// An axis-aligned box subtracted from the walkable surface during a build
#[derive(Debug, Clone, Copy)]
pub struct ObstacleBox {
    /// Minimum corner of the box
    pub bmin: Vec3,
    /// Maximum corner of the box
    pub bmax: Vec3,
}

/// Builds walkable tile layers from the level's collision mesh
#[derive(Debug)]
pub struct TileBuilder {
    config: NavGenConfig,
}

impl TileBuilder {
    /// Creates a builder after validating the configuration
    pub fn new(config: NavGenConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// The build configuration
    pub fn config(&self) -> &NavGenConfig {
        &self.config
    }

    /// Builds the layer for one tile of the world grid anchored at
    /// `world_bmin`. Returns `None` when no triangle overlaps the tile: the
    /// tile is entirely non-walkable, which is not an error. A layer with
    /// zero polygons is returned when geometry exists but none of it
    /// survives filtering and erosion.
    pub fn build_tile(
        &self,
        coord: TileCoord,
        world_bmin: Vec3,
        world_bmax: Vec3,
        mesh: &TriMesh,
        obstacles: &[ObstacleBox],
    ) -> Result<Option<TileLayer>> {
        let cfg = &self.config;
        let tile_world = cfg.tile_world_size();
        let pad = cfg.border_size as f32 * cfg.cell_size;

        let tbmin = Vec3::new(
            world_bmin.x + coord.x as f32 * tile_world,
            world_bmin.y,
            world_bmin.z + coord.z as f32 * tile_world,
        );
        let tbmax = Vec3::new(tbmin.x + tile_world, world_bmax.y, tbmin.z + tile_world);

        // Rasterize with a border so erosion at tile seams sees the same
        // neighborhood as the tile interior
        let fbmin = Vec3::new(tbmin.x - pad, tbmin.y - 0.1, tbmin.z - pad);
        let fbmax = Vec3::new(tbmax.x + pad, tbmax.y + 0.1, tbmax.z + pad);
        let grid = cfg.grid_size();

        let mut field = VoxelField::new(grid, grid, fbmin, fbmax, cfg.cell_size, cfg.cell_height);
        let touched = rasterize_mesh(&mut field, mesh, cfg.max_slope_deg, cfg.walkable_climb)?;
        if touched == 0 {
            return Ok(None);
        }

        filter_low_hanging_walkable_obstacles(&mut field, cfg.walkable_climb);
        filter_ledge_spans(&mut field, cfg.walkable_height, cfg.walkable_climb);
        filter_walkable_low_height_spans(&mut field, cfg.walkable_height);

        for ob in obstacles {
            field.clear_walkable_in_box(ob.bmin, ob.bmax);
        }

        let mut cf = CompactField::from_voxel_field(
            &field,
            cfg.walkable_height,
            cfg.walkable_climb,
            cfg.border_size,
        );
        cf.erode_walkable_area(cfg.walkable_radius);
        build_distance_field(&mut cf);
        build_regions(&mut cf, cfg.min_region_area, cfg.merge_region_area)?;

        let cset = build_contours(&cf, cfg.max_simplification_error, cfg.max_edge_len)?;
        let pm = build_poly_mesh(&cset, cfg.max_verts_per_poly)?;
        let detail = build_detail_mesh(
            &pm,
            &cf,
            cfg.detail_sample_dist,
            cfg.detail_sample_max_error,
        )?;

        log::debug!(
            "tile ({}, {}): {} spans -> {} cells -> {} polys",
            coord.x,
            coord.z,
            field.span_count(),
            cf.walkable_count(),
            pm.polys.len()
        );

        Ok(Some(TileLayer {
            header: LayerHeader {
                tx: coord.x,
                tz: coord.z,
                width: pm.width,
                height: pm.height,
                bmin: Vec3::new(tbmin.x, fbmin.y, tbmin.z),
                bmax: Vec3::new(tbmax.x, fbmax.y, tbmax.z),
                cs: cfg.cell_size,
                ch: cfg.cell_height,
            },
            verts: pm.verts,
            polys: pm.polys,
            detail,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::polymesh::NO_INDEX;

    fn test_config() -> NavGenConfig {
        NavGenConfig {
            cell_size: 0.5,
            cell_height: 0.25,
            tile_size: 16,
            border_size: 4,
            max_slope_deg: 45.0,
            walkable_height: 8,
            walkable_climb: 3,
            walkable_radius: 1,
            max_edge_len: 24,
            max_simplification_error: 1.3,
            min_region_area: 4,
            merge_region_area: 400,
            max_verts_per_poly: 6,
            detail_sample_dist: 6.0,
            detail_sample_max_error: 1.0,
        }
    }

    fn flat_plate(size: f32) -> TriMesh {
        TriMesh::from_slices(
            &[
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(size, 0.0, 0.0),
                Vec3::new(size, 0.0, size),
                Vec3::new(0.0, 0.0, size),
            ],
            &[0, 1, 2, 0, 2, 3],
        )
        .unwrap()
    }

    #[test]
    fn test_empty_tile_returns_none() {
        let builder = TileBuilder::new(test_config()).unwrap();
        let mesh = flat_plate(4.0);
        // Tile (5, 5) starts at x = z = 40.0, far away from the plate
        let layer = builder
            .build_tile(
                TileCoord::new(5, 5),
                Vec3::new(0.0, -1.0, 0.0),
                Vec3::new(48.0, 1.0, 48.0),
                &mesh,
                &[],
            )
            .unwrap();
        assert!(layer.is_none());
    }

    #[test]
    fn test_flat_plate_builds_polygons() {
        let builder = TileBuilder::new(test_config()).unwrap();
        let mesh = flat_plate(8.0);
        let layer = builder
            .build_tile(
                TileCoord::new(0, 0),
                Vec3::new(0.0, -1.0, 0.0),
                Vec3::new(8.0, 1.0, 8.0),
                &mesh,
                &[],
            )
            .unwrap()
            .unwrap();
        assert!(layer.poly_count() > 0);
        for p in &layer.polys {
            assert!(p.vert_count >= 3);
            for &v in p.vertices() {
                assert!((v as usize) < layer.verts.len());
            }
        }
        assert_eq!(layer.detail.meshes.len(), layer.poly_count());
    }

    #[test]
    fn test_obstacle_carves_walkable_area() {
        let builder = TileBuilder::new(test_config()).unwrap();
        let mesh = flat_plate(8.0);
        let origin = Vec3::new(0.0, -1.0, 0.0);
        let world_max = Vec3::new(8.0, 1.0, 8.0);
        let coord = TileCoord::new(0, 0);

        let open = builder
            .build_tile(coord, origin, world_max, &mesh, &[])
            .unwrap()
            .unwrap();
        let blocked = builder
            .build_tile(
                coord,
                origin,
                world_max,
                &mesh,
                &[ObstacleBox {
                    bmin: Vec3::new(2.0, -1.0, 2.0),
                    bmax: Vec3::new(6.0, 1.0, 6.0),
                }],
            )
            .unwrap()
            .unwrap();

        let cell_area = |l: &TileLayer| -> f32 {
            let mut area = 0.0f32;
            for p in &l.polys {
                let vs = p.vertices();
                for i in 1..vs.len() - 1 {
                    let a = l.verts[vs[0] as usize];
                    let b = l.verts[vs[i] as usize];
                    let c = l.verts[vs[i + 1] as usize];
                    area += ((b[0] as f32 - a[0] as f32) * (c[2] as f32 - a[2] as f32)
                        - (c[0] as f32 - a[0] as f32) * (b[2] as f32 - a[2] as f32))
                        * 0.5;
                }
            }
            area
        };
        assert!(cell_area(&blocked) < cell_area(&open));
    }

    #[test]
    fn test_adjacency_stays_in_range() {
        let builder = TileBuilder::new(test_config()).unwrap();
        let mesh = flat_plate(8.0);
        let layer = builder
            .build_tile(
                TileCoord::new(0, 0),
                Vec3::new(0.0, -1.0, 0.0),
                Vec3::new(8.0, 1.0, 8.0),
                &mesh,
                &[],
            )
            .unwrap()
            .unwrap();
        for p in &layer.polys {
            for e in 0..p.vert_count as usize {
                let n = p.neis[e];
                assert!(n == NO_INDEX || (n as usize) < layer.polys.len());
            }
        }
    }
}
