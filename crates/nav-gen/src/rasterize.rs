//! Triangle rasterization into the voxel field.

use crate::voxel::{VoxelField, MAX_SPAN_HEIGHT, NULL_AREA, WALKABLE_AREA};
use glam::Vec3;
use nav_common::{deg_to_rad, overlap_bounds, Result, TriMesh};

/// Rasterizes every triangle of `mesh` that overlaps the field bounds.
///
/// A triangle whose face normal is within `max_slope_deg` of vertical is
/// walkable; steeper triangles still occupy voxels (they block movement) but
/// are marked non-walkable. Returns the number of triangles that touched the
/// field.
pub fn rasterize_mesh(
    field: &mut VoxelField,
    mesh: &TriMesh,
    max_slope_deg: f32,
    walkable_climb: i32,
) -> Result<usize> {
    let walkable_threshold = deg_to_rad(max_slope_deg).cos();
    let mut touched = 0;

    for t in 0..mesh.tri_count() {
        let (v0, v1, v2) = mesh.triangle(t);

        let cross = (v1 - v0).cross(v2 - v0);
        if cross.length_squared() < f32::EPSILON {
            continue;
        }
        // Absolute value so both winding orders classify the same
        let area = if cross.normalize().y.abs() >= walkable_threshold {
            WALKABLE_AREA
        } else {
            NULL_AREA
        };

        if rasterize_triangle(field, v0, v1, v2, area, walkable_climb)? {
            touched += 1;
        }
    }
    Ok(touched)
}

/// Rasterizes one triangle, returning whether it overlapped the field.
pub fn rasterize_triangle(
    field: &mut VoxelField,
    v0: Vec3,
    v1: Vec3,
    v2: Vec3,
    area: u8,
    walkable_climb: i32,
) -> Result<bool> {
    let tmin = v0.min(v1).min(v2);
    let tmax = v0.max(v1).max(v2);
    if !overlap_bounds(tmin, tmax, field.bmin, field.bmax) {
        return Ok(false);
    }

    let cs = field.cs;
    let ich = 1.0 / field.ch;
    let by = field.bmax.y - field.bmin.y;

    let z0 = (((tmin.z - field.bmin.z) / cs).floor() as i32).clamp(0, field.height - 1);
    let z1 = (((tmax.z - field.bmin.z) / cs).floor() as i32).clamp(0, field.height - 1);

    let tri = [v0, v1, v2];
    for z in z0..=z1 {
        let zlo = field.bmin.z + z as f32 * cs;
        let row = clip_poly_slab(&tri, 2, zlo, zlo + cs);
        if row.len() < 3 {
            continue;
        }

        let mut rminx = row[0].x;
        let mut rmaxx = row[0].x;
        for v in &row[1..] {
            rminx = rminx.min(v.x);
            rmaxx = rmaxx.max(v.x);
        }
        let x0 = (((rminx - field.bmin.x) / cs).floor() as i32).clamp(0, field.width - 1);
        let x1 = (((rmaxx - field.bmin.x) / cs).floor() as i32).clamp(0, field.width - 1);

        for x in x0..=x1 {
            let xlo = field.bmin.x + x as f32 * cs;
            let cell = clip_poly_slab(&row, 0, xlo, xlo + cs);
            if cell.len() < 3 {
                continue;
            }

            let mut ymin = cell[0].y;
            let mut ymax = cell[0].y;
            for v in &cell[1..] {
                ymin = ymin.min(v.y);
                ymax = ymax.max(v.y);
            }
            let ymin = ymin - field.bmin.y;
            let ymax = ymax - field.bmin.y;
            // Skip parts entirely outside the field's vertical range
            if ymax < 0.0 || ymin > by {
                continue;
            }

            let smin = ((ymin * ich).floor() as i32).clamp(0, MAX_SPAN_HEIGHT - 1);
            let smax = ((ymax * ich).ceil() as i32).clamp(smin + 1, MAX_SPAN_HEIGHT);
            field.add_span(x, z, smin, smax, area, walkable_climb)?;
        }
    }
    Ok(true)
}

/// Clips a convex polygon to the slab `lo <= p[axis] <= hi`.
fn clip_poly_slab(poly: &[Vec3], axis: usize, lo: f32, hi: f32) -> Vec<Vec3> {
    let below = clip_poly_plane(poly, axis, lo, false);
    clip_poly_plane(&below, axis, hi, true)
}

/// Clips a convex polygon against an axis-aligned plane, keeping the side
/// selected by `keep_below`.
fn clip_poly_plane(poly: &[Vec3], axis: usize, value: f32, keep_below: bool) -> Vec<Vec3> {
    let mut out = Vec::with_capacity(poly.len() + 1);
    let inside = |v: &Vec3| {
        if keep_below {
            v[axis] <= value
        } else {
            v[axis] >= value
        }
    };
    let n = poly.len();
    for i in 0..n {
        let a = poly[i];
        let b = poly[(i + 1) % n];
        let ain = inside(&a);
        let bin = inside(&b);
        if ain {
            out.push(a);
        }
        if ain != bin {
            let d = b[axis] - a[axis];
            if d.abs() > f32::EPSILON {
                let t = (value - a[axis]) / d;
                out.push(a + (b - a) * t);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> VoxelField {
        VoxelField::new(
            10,
            10,
            Vec3::ZERO,
            Vec3::new(10.0, 5.0, 10.0),
            1.0,
            0.5,
        )
    }

    #[test]
    fn test_flat_triangle_is_walkable() {
        let mut f = field();
        rasterize_triangle(
            &mut f,
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(4.0, 1.0, 1.0),
            Vec3::new(1.0, 1.0, 4.0),
            WALKABLE_AREA,
            1,
        )
        .unwrap();
        assert!(f.span_count() > 0);
        let s = f.column(1, 1)[0];
        assert_eq!(s.area, WALKABLE_AREA);
        // y = 1.0 with ch = 0.5 puts the floor at two cells
        assert_eq!(s.smin, 2);
        assert_eq!(s.smax, 3);
    }

    #[test]
    fn test_steep_wall_is_not_walkable() {
        let mut f = field();
        let mesh = TriMesh::from_slices(
            &[
                Vec3::new(2.0, 0.0, 2.0),
                Vec3::new(2.0, 0.0, 6.0),
                Vec3::new(2.0, 4.0, 2.0),
            ],
            &[0, 1, 2],
        )
        .unwrap();
        let touched = rasterize_mesh(&mut f, &mesh, 45.0, 1).unwrap();
        assert_eq!(touched, 1);
        assert!(f.column(2, 3).iter().all(|s| s.area == NULL_AREA));
    }

    #[test]
    fn test_triangle_outside_bounds_is_skipped() {
        let mut f = field();
        let hit = rasterize_triangle(
            &mut f,
            Vec3::new(50.0, 0.0, 50.0),
            Vec3::new(51.0, 0.0, 50.0),
            Vec3::new(50.0, 0.0, 51.0),
            WALKABLE_AREA,
            1,
        )
        .unwrap();
        assert!(!hit);
        assert_eq!(f.span_count(), 0);
    }

    #[test]
    fn test_mesh_slope_classification() {
        let mut f = field();
        // A 30 degree ramp: rises 2.0 over a run of 3.46
        let mesh = TriMesh::from_slices(
            &[
                Vec3::new(1.0, 0.0, 1.0),
                Vec3::new(4.46, 0.0, 1.0),
                Vec3::new(4.46, 2.0, 4.0),
            ],
            &[0, 1, 2],
        )
        .unwrap();
        rasterize_mesh(&mut f, &mesh, 45.0, 1).unwrap();
        assert!(f.span_count() > 0);
        // Some cell of the ramp must be walkable under a 45 degree limit
        let any_walkable = (0..10).any(|z| {
            (0..10).any(|x| f.column(x, z).iter().any(|s| s.area == WALKABLE_AREA))
        });
        assert!(any_walkable);
    }
}
