//! Convex polygon mesh built from simplified contours.
//!
//! Contours are triangulated by ear clipping and the triangles greedily
//! merged into convex polygons of bounded vertex count. Shared-edge
//! adjacency is computed over the welded vertex pool.

use crate::contour::ContourSet;
use glam::Vec3;
use nav_common::Result;
use std::collections::HashMap;

/// Hard upper bound on vertices per polygon
pub const MAX_VERTS_PER_POLY: usize = 6;
/// Sentinel for "no vertex / no neighbor"
pub const NO_INDEX: u16 = u16::MAX;

/// One convex polygon of the walkable mesh
#[derive(Debug, Clone, Copy)]
pub struct MeshPoly {
    /// Indices into the mesh vertex pool, `NO_INDEX`-padded
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// Neighbor polygon per edge, `NO_INDEX` where the edge is open
    pub neis: [u16; MAX_VERTS_PER_POLY],
    /// Number of vertices in use
    pub vert_count: u8,
    /// Area id inherited from the source region
    pub area: u8,
    /// Source region id
    pub reg: u16,
}

impl MeshPoly {
    fn new(area: u8, reg: u16) -> Self {
        Self {
            verts: [NO_INDEX; MAX_VERTS_PER_POLY],
            neis: [NO_INDEX; MAX_VERTS_PER_POLY],
            vert_count: 0,
            area,
            reg,
        }
    }

    /// Vertex indices in use
    pub fn vertices(&self) -> &[u16] {
        &self.verts[..self.vert_count as usize]
    }
}

/// The polygon mesh of one tile, in tile-local cell coordinates
#[derive(Debug)]
pub struct PolyMesh {
    /// Welded vertices as `[x, y, z]` cell coordinates
    pub verts: Vec<[u16; 3]>,
    /// Convex polygons with adjacency
    pub polys: Vec<MeshPoly>,
    /// World position of cell `(0, 0)` (tile interior origin)
    pub bmin: Vec3,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
    /// Tile width in cells, border excluded
    pub width: i32,
    /// Tile depth in cells, border excluded
    pub height: i32,
}

/// Builds the convex polygon mesh from a contour set. Border offsets are
/// removed here, so vertex coordinates are tile-local.
pub fn build_poly_mesh(cset: &ContourSet, max_verts_per_poly: usize) -> Result<PolyMesh> {
    let border = cset.border_size;
    let tile_cells_x = cset.width - border * 2;
    let tile_cells_z = cset.height - border * 2;

    let mut verts: Vec<[u16; 3]> = Vec::new();
    let mut vert_map: HashMap<(i32, i32, i32), u16> = HashMap::new();
    let mut polys: Vec<MeshPoly> = Vec::new();

    for contour in &cset.contours {
        if contour.verts.len() < 3 {
            continue;
        }

        // The walker produces clockwise outlines; triangulation runs on
        // counter-clockwise polygons
        let cverts: Vec<[i32; 3]> = contour
            .verts
            .iter()
            .rev()
            .map(|v| [v[0] - border, v[1], v[2] - border])
            .collect();

        let Some(tris) = triangulate(&cverts) else {
            log::warn!(
                "could not triangulate outline of region {} ({} vertices); region skipped",
                contour.reg,
                cverts.len()
            );
            continue;
        };

        let mut region_polys: Vec<Vec<u16>> = Vec::new();
        for (a, b, c) in tris {
            let ia = add_vertex(&mut verts, &mut vert_map, cverts[a]);
            let ib = add_vertex(&mut verts, &mut vert_map, cverts[b]);
            let ic = add_vertex(&mut verts, &mut vert_map, cverts[c]);
            // Welding can collapse slivers
            if ia == ib || ib == ic || ic == ia {
                continue;
            }
            region_polys.push(vec![ia, ib, ic]);
        }

        if max_verts_per_poly > 3 {
            merge_region_polys(&mut region_polys, &verts, max_verts_per_poly);
        }

        for p in region_polys {
            let mut poly = MeshPoly::new(contour.area, contour.reg);
            poly.vert_count = p.len() as u8;
            poly.verts[..p.len()].copy_from_slice(&p);
            polys.push(poly);
        }
    }

    build_adjacency(&mut polys);

    Ok(PolyMesh {
        verts,
        polys,
        bmin: cset.bmin + Vec3::new(border as f32 * cset.cs, 0.0, border as f32 * cset.cs),
        cs: cset.cs,
        ch: cset.ch,
        width: tile_cells_x,
        height: tile_cells_z,
    })
}

fn add_vertex(
    verts: &mut Vec<[u16; 3]>,
    map: &mut HashMap<(i32, i32, i32), u16>,
    v: [i32; 3],
) -> u16 {
    *map.entry((v[0], v[1], v[2])).or_insert_with(|| {
        let idx = verts.len() as u16;
        verts.push([v[0].max(0) as u16, v[1].max(0) as u16, v[2].max(0) as u16]);
        idx
    })
}

/// Greedily merges polygons sharing an edge while the result stays convex
/// and within the vertex budget. The longest shared edge merges first.
fn merge_region_polys(polys: &mut Vec<Vec<u16>>, verts: &[[u16; 3]], max_verts: usize) {
    loop {
        let mut best: Option<(i64, usize, usize, usize, usize)> = None;
        for i in 0..polys.len() {
            for j in i + 1..polys.len() {
                if let Some((value, ea, eb)) = merge_value(&polys[i], &polys[j], verts, max_verts)
                {
                    if best.map_or(true, |(bv, ..)| value > bv) {
                        best = Some((value, i, j, ea, eb));
                    }
                }
            }
        }
        let Some((_, i, j, ea, eb)) = best else { break };
        let merged = merge_polys(&polys[i], &polys[j], ea, eb);
        polys[i] = merged;
        polys.swap_remove(j);
    }
}

fn merge_value(
    pa: &[u16],
    pb: &[u16],
    verts: &[[u16; 3]],
    max_verts: usize,
) -> Option<(i64, usize, usize)> {
    let na = pa.len();
    let nb = pb.len();
    if na + nb - 2 > max_verts {
        return None;
    }

    // Find a shared edge, traversed in opposite directions
    let mut shared = None;
    for i in 0..na {
        let va = pa[i];
        let vb = pa[(i + 1) % na];
        for j in 0..nb {
            if pb[j] == vb && pb[(j + 1) % nb] == va {
                shared = Some((i, j));
            }
        }
    }
    let (ea, eb) = shared?;

    // The merged polygon must stay convex at both junction vertices
    let va = verts[pa[(ea + na - 1) % na] as usize];
    let vb = verts[pa[ea] as usize];
    let vc = verts[pb[(eb + 2) % nb] as usize];
    if area2(va, vb, vc) <= 0 {
        return None;
    }
    let va = verts[pb[(eb + nb - 1) % nb] as usize];
    let vb = verts[pb[eb] as usize];
    let vc = verts[pa[(ea + 2) % na] as usize];
    if area2(va, vb, vc) <= 0 {
        return None;
    }

    let a = verts[pa[ea] as usize];
    let b = verts[pa[(ea + 1) % na] as usize];
    let dx = b[0] as i64 - a[0] as i64;
    let dz = b[2] as i64 - a[2] as i64;
    Some((dx * dx + dz * dz, ea, eb))
}

fn merge_polys(pa: &[u16], pb: &[u16], ea: usize, eb: usize) -> Vec<u16> {
    let na = pa.len();
    let nb = pb.len();
    let mut merged = Vec::with_capacity(na + nb - 2);
    for i in 0..na - 1 {
        merged.push(pa[(ea + 1 + i) % na]);
    }
    for i in 0..nb - 1 {
        merged.push(pb[(eb + 1 + i) % nb]);
    }
    merged
}

/// Fills in per-edge neighbor indices by matching shared edges.
fn build_adjacency(polys: &mut [MeshPoly]) {
    let mut edge_map: HashMap<(u16, u16), (usize, usize)> = HashMap::new();
    let mut pairs: Vec<(usize, usize, usize, usize)> = Vec::new();

    for (pi, p) in polys.iter().enumerate() {
        let nv = p.vert_count as usize;
        for e in 0..nv {
            let a = p.verts[e];
            let b = p.verts[(e + 1) % nv];
            let key = (a.min(b), a.max(b));
            match edge_map.get(&key) {
                Some(&(qi, qe)) => pairs.push((qi, qe, pi, e)),
                None => {
                    edge_map.insert(key, (pi, e));
                }
            }
        }
    }

    for (p0, e0, p1, e1) in pairs {
        polys[p0].neis[e0] = p1 as u16;
        polys[p1].neis[e1] = p0 as u16;
    }
}

// 2D signed-area primitives on cell coordinates (counter-clockwise positive)

fn area2(a: [u16; 3], b: [u16; 3], c: [u16; 3]) -> i64 {
    area2_i(
        [a[0] as i32, a[1] as i32, a[2] as i32],
        [b[0] as i32, b[1] as i32, b[2] as i32],
        [c[0] as i32, c[1] as i32, c[2] as i32],
    )
}

fn area2_i(a: [i32; 3], b: [i32; 3], c: [i32; 3]) -> i64 {
    (b[0] - a[0]) as i64 * (c[2] - a[2]) as i64 - (c[0] - a[0]) as i64 * (b[2] - a[2]) as i64
}

fn left(a: [i32; 3], b: [i32; 3], c: [i32; 3]) -> bool {
    area2_i(a, b, c) > 0
}

fn left_on(a: [i32; 3], b: [i32; 3], c: [i32; 3]) -> bool {
    area2_i(a, b, c) >= 0
}

fn collinear(a: [i32; 3], b: [i32; 3], c: [i32; 3]) -> bool {
    area2_i(a, b, c) == 0
}

/// Proper intersection of segments `ab` and `cd` (no endpoint touching)
fn intersect_prop(a: [i32; 3], b: [i32; 3], c: [i32; 3], d: [i32; 3]) -> bool {
    if collinear(a, b, c) || collinear(a, b, d) || collinear(c, d, a) || collinear(c, d, b) {
        return false;
    }
    (left(a, b, c) ^ left(a, b, d)) && (left(c, d, a) ^ left(c, d, b))
}

/// Whether `c` lies on the closed segment `ab` (requires collinearity)
fn between(a: [i32; 3], b: [i32; 3], c: [i32; 3]) -> bool {
    if !collinear(a, b, c) {
        return false;
    }
    if a[0] != b[0] {
        (a[0] <= c[0] && c[0] <= b[0]) || (b[0] <= c[0] && c[0] <= a[0])
    } else {
        (a[2] <= c[2] && c[2] <= b[2]) || (b[2] <= c[2] && c[2] <= a[2])
    }
}

fn intersect(a: [i32; 3], b: [i32; 3], c: [i32; 3], d: [i32; 3]) -> bool {
    intersect_prop(a, b, c, d)
        || between(a, b, c)
        || between(a, b, d)
        || between(c, d, a)
        || between(c, d, b)
}

/// Ear-clipping triangulation of a counter-clockwise, possibly weakly-simple
/// polygon (hole bridges appear as doubled edges). Returns `None` when no
/// valid ear can be found even with the loose fallback.
fn triangulate(verts: &[[i32; 3]]) -> Option<Vec<(usize, usize, usize)>> {
    let n = verts.len();
    if n < 3 {
        return None;
    }
    let mut idx: Vec<usize> = (0..n).collect();
    let mut tris = Vec::with_capacity(n - 2);

    while idx.len() > 3 {
        let m = idx.len();
        let mut best: Option<(i64, usize)> = None;

        for k in 0..m {
            let k2 = (k + 2) % m;
            if diagonal(k, k2, verts, &idx) {
                let p = verts[idx[k]];
                let q = verts[idx[k2]];
                let dx = (q[0] - p[0]) as i64;
                let dz = (q[2] - p[2]) as i64;
                let len = dx * dx + dz * dz;
                if best.map_or(true, |(bl, _)| len < bl) {
                    best = Some((len, k));
                }
            }
        }

        if best.is_none() {
            // Bridge-doubled outlines occasionally defeat the strict test;
            // retry with loose cone/intersection checks
            for k in 0..m {
                let k2 = (k + 2) % m;
                if diagonal_loose(k, k2, verts, &idx) {
                    let p = verts[idx[k]];
                    let q = verts[idx[k2]];
                    let dx = (q[0] - p[0]) as i64;
                    let dz = (q[2] - p[2]) as i64;
                    let len = dx * dx + dz * dz;
                    if best.map_or(true, |(bl, _)| len < bl) {
                        best = Some((len, k));
                    }
                }
            }
        }

        let (_, k) = best?;
        let k1 = (k + 1) % m;
        let k2 = (k + 2) % m;
        tris.push((idx[k], idx[k1], idx[k2]));
        idx.remove(k1);
    }

    tris.push((idx[0], idx[1], idx[2]));
    Some(tris)
}

fn prev_idx(i: usize, n: usize) -> usize {
    (i + n - 1) % n
}

fn next_idx(i: usize, n: usize) -> usize {
    (i + 1) % n
}

fn in_cone(i: usize, j: usize, verts: &[[i32; 3]], idx: &[usize]) -> bool {
    let n = idx.len();
    let pi = verts[idx[i]];
    let pj = verts[idx[j]];
    let pi1 = verts[idx[next_idx(i, n)]];
    let pin1 = verts[idx[prev_idx(i, n)]];

    if left_on(pin1, pi, pi1) {
        // Convex vertex
        left(pi, pj, pin1) && left(pj, pi, pi1)
    } else {
        // Reflex vertex
        !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
    }
}

fn diagonalie(i: usize, j: usize, verts: &[[i32; 3]], idx: &[usize]) -> bool {
    let n = idx.len();
    let d0 = verts[idx[i]];
    let d1 = verts[idx[j]];

    for k in 0..n {
        let k1 = next_idx(k, n);
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let p0 = verts[idx[k]];
        let p1 = verts[idx[k1]];
        if (p0[0] == d0[0] && p0[2] == d0[2])
            || (p0[0] == d1[0] && p0[2] == d1[2])
            || (p1[0] == d0[0] && p1[2] == d0[2])
            || (p1[0] == d1[0] && p1[2] == d1[2])
        {
            continue;
        }
        if intersect(d0, d1, p0, p1) {
            return false;
        }
    }
    true
}

fn diagonal(i: usize, j: usize, verts: &[[i32; 3]], idx: &[usize]) -> bool {
    in_cone(i, j, verts, idx) && in_cone(j, i, verts, idx) && diagonalie(i, j, verts, idx)
}

fn in_cone_loose(i: usize, j: usize, verts: &[[i32; 3]], idx: &[usize]) -> bool {
    let n = idx.len();
    let pi = verts[idx[i]];
    let pj = verts[idx[j]];
    let pi1 = verts[idx[next_idx(i, n)]];
    let pin1 = verts[idx[prev_idx(i, n)]];

    if left_on(pin1, pi, pi1) {
        left_on(pi, pj, pin1) && left_on(pj, pi, pi1)
    } else {
        !(left_on(pi, pj, pi1) && left_on(pj, pi, pin1))
    }
}

fn diagonalie_loose(i: usize, j: usize, verts: &[[i32; 3]], idx: &[usize]) -> bool {
    let n = idx.len();
    let d0 = verts[idx[i]];
    let d1 = verts[idx[j]];

    for k in 0..n {
        let k1 = next_idx(k, n);
        if k == i || k1 == i || k == j || k1 == j {
            continue;
        }
        let p0 = verts[idx[k]];
        let p1 = verts[idx[k1]];
        if (p0[0] == d0[0] && p0[2] == d0[2])
            || (p0[0] == d1[0] && p0[2] == d1[2])
            || (p1[0] == d0[0] && p1[2] == d0[2])
            || (p1[0] == d1[0] && p1[2] == d1[2])
        {
            continue;
        }
        if intersect_prop(d0, d1, p0, p1) {
            return false;
        }
    }
    true
}

fn diagonal_loose(i: usize, j: usize, verts: &[[i32; 3]], idx: &[usize]) -> bool {
    in_cone_loose(i, j, verts, idx)
        && in_cone_loose(j, i, verts, idx)
        && diagonalie_loose(i, j, verts, idx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contour::Contour;

    fn square_cset(size: i32) -> ContourSet {
        // Clockwise outline, as the contour walker produces
        ContourSet {
            contours: vec![Contour {
                verts: vec![
                    [0, 0, 0, 0],
                    [0, 0, size, 0],
                    [size, 0, size, 0],
                    [size, 0, 0, 0],
                ],
                reg: 1,
                area: 1,
            }],
            bmin: Vec3::ZERO,
            bmax: Vec3::new(size as f32, 10.0, size as f32),
            cs: 1.0,
            ch: 1.0,
            width: size,
            height: size,
            border_size: 0,
        }
    }

    #[test]
    fn test_square_becomes_one_quad() {
        let pm = build_poly_mesh(&square_cset(8), MAX_VERTS_PER_POLY).unwrap();
        assert_eq!(pm.verts.len(), 4);
        assert_eq!(pm.polys.len(), 1);
        assert_eq!(pm.polys[0].vert_count, 4);
        assert!(pm.polys[0].neis.iter().all(|&n| n == NO_INDEX));
    }

    #[test]
    fn test_polygons_wind_counter_clockwise() {
        let pm = build_poly_mesh(&square_cset(8), MAX_VERTS_PER_POLY).unwrap();
        for p in &pm.polys {
            let vs = p.vertices();
            let mut area = 0i64;
            for i in 0..vs.len() {
                let a = pm.verts[vs[i] as usize];
                let b = pm.verts[vs[(i + 1) % vs.len()] as usize];
                area += a[0] as i64 * b[2] as i64 - b[0] as i64 * a[2] as i64;
            }
            assert!(area > 0);
        }
    }

    #[test]
    fn test_l_shape_adjacency_is_symmetric() {
        // Clockwise L-shaped outline
        let cset = ContourSet {
            contours: vec![Contour {
                verts: vec![
                    [0, 0, 0, 0],
                    [0, 0, 8, 0],
                    [4, 0, 8, 0],
                    [4, 0, 4, 0],
                    [8, 0, 4, 0],
                    [8, 0, 0, 0],
                ],
                reg: 1,
                area: 1,
            }],
            bmin: Vec3::ZERO,
            bmax: Vec3::new(8.0, 10.0, 8.0),
            cs: 1.0,
            ch: 1.0,
            width: 8,
            height: 8,
            border_size: 0,
        };
        let pm = build_poly_mesh(&cset, MAX_VERTS_PER_POLY).unwrap();
        assert!(!pm.polys.is_empty());

        let mut linked = 0;
        for (pi, p) in pm.polys.iter().enumerate() {
            let nv = p.vert_count as usize;
            for e in 0..nv {
                let n = p.neis[e];
                if n == NO_INDEX {
                    continue;
                }
                linked += 1;
                let q = &pm.polys[n as usize];
                let back = q
                    .neis
                    .iter()
                    .take(q.vert_count as usize)
                    .any(|&b| b as usize == pi);
                assert!(back, "poly {} edge {} has one-way neighbor {}", pi, e, n);
            }
        }
        // The L-shape cannot be one convex polygon, so at least one shared
        // edge must exist
        assert!(linked >= 2);
    }

    #[test]
    fn test_triangle_only_budget() {
        let pm = build_poly_mesh(&square_cset(4), 3).unwrap();
        assert_eq!(pm.polys.len(), 2);
        assert!(pm.polys.iter().all(|p| p.vert_count == 3));
    }
}
