//! 2D/3D geometry operations used by surface generation and path queries.
//!
//! Most 2D operations work on the XZ plane of a Y-up coordinate system.
//! The signed-area convention is: `tri_area_2d(a, b, c) > 0.0` when `c` lies
//! to the left of the directed line `a -> b`.

use glam::Vec3;

/// Twice the signed area of the triangle `(a, b, c)` on the XZ plane.
#[inline]
pub fn tri_area_2d(a: Vec3, b: Vec3, c: Vec3) -> f32 {
    let abx = b.x - a.x;
    let abz = b.z - a.z;
    let acx = c.x - a.x;
    let acz = c.z - a.z;
    abx * acz - acx * abz
}

/// Check if two axis-aligned bounding boxes overlap.
#[inline]
pub fn overlap_bounds(amin: Vec3, amax: Vec3, bmin: Vec3, bmax: Vec3) -> bool {
    amin.x <= bmax.x
        && amax.x >= bmin.x
        && amin.y <= bmax.y
        && amax.y >= bmin.y
        && amin.z <= bmax.z
        && amax.z >= bmin.z
}

/// Squared distance between two points on the XZ plane.
#[inline]
pub fn dist_sqr_2d(a: Vec3, b: Vec3) -> f32 {
    let dx = b.x - a.x;
    let dz = b.z - a.z;
    dx * dx + dz * dz
}

/// Check two points for near-equality on the XZ plane.
#[inline]
pub fn vequal_2d(a: Vec3, b: Vec3, eps: f32) -> bool {
    dist_sqr_2d(a, b) < eps * eps
}

/// Closest point to `p` on the segment `a -> b`.
pub fn closest_point_on_segment(p: Vec3, a: Vec3, b: Vec3) -> Vec3 {
    let ab = b - a;
    let len_sqr = ab.length_squared();
    if len_sqr <= f32::EPSILON {
        return a;
    }
    let t = ((p - a).dot(ab) / len_sqr).clamp(0.0, 1.0);
    a + ab * t
}

/// Check whether `p` lies inside the polygon `verts` when projected onto the
/// XZ plane. Uses the even-odd crossing rule, so winding does not matter.
pub fn point_in_poly_2d(p: Vec3, verts: &[Vec3]) -> bool {
    let mut inside = false;
    let n = verts.len();
    let mut j = n - 1;
    for i in 0..n {
        let vi = verts[i];
        let vj = verts[j];
        if ((vi.z > p.z) != (vj.z > p.z))
            && (p.x < (vj.x - vi.x) * (p.z - vi.z) / (vj.z - vi.z) + vi.x)
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

/// Height of the triangle `(a, b, c)` at the XZ position of `p`, or `None`
/// when `p` projects outside the triangle.
pub fn height_on_triangle(p: Vec3, a: Vec3, b: Vec3, c: Vec3) -> Option<f32> {
    const EPS: f32 = 1e-6;
    let v0 = c - a;
    let v1 = b - a;
    let v2 = p - a;

    let dot00 = v0.x * v0.x + v0.z * v0.z;
    let dot01 = v0.x * v1.x + v0.z * v1.z;
    let dot02 = v0.x * v2.x + v0.z * v2.z;
    let dot11 = v1.x * v1.x + v1.z * v1.z;
    let dot12 = v1.x * v2.x + v1.z * v2.z;

    let denom = dot00 * dot11 - dot01 * dot01;
    if denom.abs() < EPS {
        return None;
    }
    let inv = 1.0 / denom;
    let u = (dot11 * dot02 - dot01 * dot12) * inv;
    let v = (dot00 * dot12 - dot01 * dot02) * inv;
    if u >= -EPS && v >= -EPS && (u + v) <= 1.0 + EPS {
        Some(a.y + v0.y * u + v1.y * v)
    } else {
        None
    }
}
