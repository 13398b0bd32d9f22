//! Detail height mesh.
//!
//! A light sampling mesh used only for ground-height queries. Each polygon
//! gets its vertices in world space plus, for large polygons, one sampled
//! center vertex; triangles fan across the polygon.

use crate::compact::CompactField;
use crate::polymesh::PolyMesh;
use glam::Vec3;
use nav_common::Result;

/// Per-polygon height sampling mesh
#[derive(Debug, Clone, Default)]
pub struct DetailMesh {
    /// Per polygon: `[vert_base, vert_count, tri_base, tri_count]`
    pub meshes: Vec<[u32; 4]>,
    /// Sample vertices in world space
    pub verts: Vec<Vec3>,
    /// Triangles with indices local to the polygon's vertex range
    pub tris: Vec<[u16; 3]>,
}

/// Builds the detail mesh for every polygon of the tile.
pub fn build_detail_mesh(
    pm: &PolyMesh,
    cf: &CompactField,
    sample_dist: f32,
    _sample_max_error: f32,
) -> Result<DetailMesh> {
    let mut detail = DetailMesh::default();

    for poly in &pm.polys {
        let nv = poly.vert_count as usize;
        let vert_base = detail.verts.len() as u32;
        let tri_base = detail.tris.len() as u32;

        let mut world: Vec<Vec3> = Vec::with_capacity(nv + 1);
        for &vi in poly.vertices() {
            let v = pm.verts[vi as usize];
            world.push(Vec3::new(
                pm.bmin.x + v[0] as f32 * pm.cs,
                pm.bmin.y + v[1] as f32 * pm.ch,
                pm.bmin.z + v[2] as f32 * pm.cs,
            ));
        }

        let center = world.iter().copied().sum::<Vec3>() / nv as f32;
        let radius = world
            .iter()
            .map(|v| (*v - center).length())
            .fold(0.0f32, f32::max);

        if sample_dist > 0.0 && radius > sample_dist {
            // Large polygon: anchor the fan on a height-sampled center so
            // interior queries follow the ground, not the hull
            let y = sample_height(cf, center).unwrap_or(center.y);
            detail.verts.extend_from_slice(&world);
            detail.verts.push(Vec3::new(center.x, y, center.z));
            let ci = nv as u16;
            for i in 0..nv {
                detail.tris.push([ci, i as u16, ((i + 1) % nv) as u16]);
            }
        } else {
            detail.verts.extend_from_slice(&world);
            for i in 1..nv - 1 {
                detail.tris.push([0, i as u16, (i + 1) as u16]);
            }
        }

        let vert_count = detail.verts.len() as u32 - vert_base;
        let tri_count = detail.tris.len() as u32 - tri_base;
        detail
            .meshes
            .push([vert_base, vert_count, tri_base, tri_count]);
    }

    Ok(detail)
}

/// Floor height of the compact-field cell containing `pos`, in world units.
fn sample_height(cf: &CompactField, pos: Vec3) -> Option<f32> {
    let x = ((pos.x - cf.bmin.x) / cf.cs).floor() as i32;
    let z = ((pos.z - cf.bmin.z) / cf.cs).floor() as i32;
    let cell = cf.cell(x, z)?;
    Some(cf.bmin.y + cell.y as f32 * cf.ch)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::{build_contours, ContourSet};
    use crate::polymesh::build_poly_mesh;
    use crate::region::{build_distance_field, build_regions};
    use crate::voxel::{VoxelField, WALKABLE_AREA};
    use crate::Contour;

    #[test]
    fn test_small_polygon_gets_fan() {
        let cset = ContourSet {
            contours: vec![Contour {
                verts: vec![
                    [0, 0, 0, 0],
                    [0, 0, 2, 0],
                    [2, 0, 2, 0],
                    [2, 0, 0, 0],
                ],
                reg: 1,
                area: 1,
            }],
            bmin: Vec3::ZERO,
            bmax: Vec3::new(2.0, 10.0, 2.0),
            cs: 1.0,
            ch: 1.0,
            width: 2,
            height: 2,
            border_size: 0,
        };
        let pm = build_poly_mesh(&cset, 6).unwrap();
        let f = VoxelField::new(2, 2, Vec3::ZERO, Vec3::new(2.0, 10.0, 2.0), 1.0, 1.0);
        let cf = CompactField::from_voxel_field(&f, 5, 2, 0);
        let dm = build_detail_mesh(&pm, &cf, 6.0, 1.0).unwrap();

        assert_eq!(dm.meshes.len(), 1);
        let [vb, vc, _tb, tc] = dm.meshes[0];
        assert_eq!(vb, 0);
        assert_eq!(vc, 4);
        assert_eq!(tc, 2);
    }

    #[test]
    fn test_large_polygon_gets_center_sample() {
        let w = 24;
        let mut f = VoxelField::new(
            w,
            w,
            Vec3::ZERO,
            Vec3::new(w as f32, 50.0, w as f32),
            1.0,
            1.0,
        );
        for z in 0..w {
            for x in 0..w {
                f.add_span(x, z, 0, 2, WALKABLE_AREA, 0).unwrap();
            }
        }
        let mut cf = CompactField::from_voxel_field(&f, 5, 2, 0);
        build_distance_field(&mut cf);
        build_regions(&mut cf, 2, 10_000).unwrap();
        let cset = build_contours(&cf, 1.0, 0).unwrap();
        let pm = build_poly_mesh(&cset, 6).unwrap();
        let dm = build_detail_mesh(&pm, &cf, 6.0, 1.0).unwrap();

        // 24 cells across at cell size 1.0 exceeds the 6.0 sample distance,
        // so the polygon carries one extra center vertex
        assert_eq!(dm.meshes.len(), pm.polys.len());
        let [_, vc, _, tc] = dm.meshes[0];
        let nv = pm.polys[0].vert_count as u32;
        assert_eq!(vc, nv + 1);
        assert_eq!(tc, nv);
    }
}
