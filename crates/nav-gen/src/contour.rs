//! Region contour extraction and simplification.
//!
//! Region boundaries are traced cell by cell into raw closed loops, then
//! simplified against a maximum deviation error and a maximum edge length.
//! Interior holes are spliced into their region's outer contour so each
//! region yields a single polygon outline.

use crate::compact::{CompactField, BORDER_REG};
use glam::Vec3;
use nav_common::{dist_pt_seg_2d_sqr, Result};
use std::collections::HashMap;

/// A closed region outline in cell coordinates. The fourth vertex component
/// carries the neighbor region across the edge leaving that vertex.
#[derive(Debug, Clone)]
pub struct Contour {
    /// Vertices as `[x, y, z, neighbor_reg]` in cell units
    pub verts: Vec<[i32; 4]>,
    /// Region id this contour outlines
    pub reg: u16,
    /// Area id of the region
    pub area: u8,
}

/// All contours of one tile
#[derive(Debug)]
pub struct ContourSet {
    /// One contour per region (holes already merged in)
    pub contours: Vec<Contour>,
    /// Minimum bounds of the source field
    pub bmin: Vec3,
    /// Maximum bounds of the source field
    pub bmax: Vec3,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
    /// Field width in cells, border included
    pub width: i32,
    /// Field depth in cells, border included
    pub height: i32,
    /// Border width in cells
    pub border_size: i32,
}

/// Traces and simplifies the outline of every region in the field.
pub fn build_contours(
    cf: &CompactField,
    max_error: f32,
    max_edge_len: i32,
) -> Result<ContourSet> {
    let w = cf.width;
    let h = cf.height;
    let n = (w * h) as usize;

    // Mark boundary edges: bit set where the neighbor belongs to a different
    // region (or is a wall)
    let mut flags = vec![0u8; n];
    for z in 0..h {
        for x in 0..w {
            let i = cf.index(x, z);
            let Some(cell) = cf.cell(x, z) else { continue };
            if cell.reg == 0 || cell.reg & BORDER_REG != 0 {
                continue;
            }
            let mut f = 0u8;
            for dir in 0..4 {
                let nr = match cf.connected(x, z, dir) {
                    Some((nx, nz)) => cf.cell(nx, nz).map_or(0, |c| c.reg),
                    None => 0,
                };
                if nr != cell.reg {
                    f |= 1 << dir;
                }
            }
            flags[i] = f;
        }
    }

    let mut raw_contours: Vec<Contour> = Vec::new();
    for z in 0..h {
        for x in 0..w {
            let i = cf.index(x, z);
            if flags[i] == 0 {
                continue;
            }
            let Some(cell) = cf.cell(x, z) else { continue };
            let (reg, area) = (cell.reg, cell.area);

            let mut points = Vec::new();
            walk_contour(cf, x, z, &mut flags, &mut points);
            if points.len() < 3 {
                continue;
            }
            let verts = simplify_contour(&points, max_error, max_edge_len);
            if verts.len() < 3 {
                continue;
            }
            raw_contours.push(Contour { verts, reg, area });
        }
    }

    // Splice hole outlines into their region's outer contour. Regions are
    // processed in id order so repeated builds of the same tile are
    // byte-identical.
    let mut by_region: HashMap<u16, Vec<Contour>> = HashMap::new();
    for c in raw_contours {
        by_region.entry(c.reg).or_default().push(c);
    }
    let mut groups: Vec<(u16, Vec<Contour>)> = by_region.into_iter().collect();
    groups.sort_by_key(|(reg, _)| *reg);
    let mut contours = Vec::new();
    for (_, group) in groups {
        contours.push(merge_region_contours(group));
    }

    Ok(ContourSet {
        contours,
        bmin: cf.bmin,
        bmax: cf.bmax,
        cs: cf.cs,
        ch: cf.ch,
        width: w,
        height: h,
        border_size: cf.border_size,
    })
}

/// Walks one boundary loop starting at `(x, z)`, clearing visited edge flags
/// and emitting corner vertices.
fn walk_contour(
    cf: &CompactField,
    x: i32,
    z: i32,
    flags: &mut [u8],
    points: &mut Vec<[i32; 4]>,
) {
    let i = cf.index(x, z);
    let mut dir = 0u8;
    while flags[i] & (1 << dir) == 0 {
        dir += 1;
    }
    let start_dir = dir;
    let (start_x, start_z) = (x, z);
    let (mut cx, mut cz) = (x, z);

    let mut iter = 0;
    loop {
        iter += 1;
        if iter > 40_000 {
            break;
        }
        let ci = cf.index(cx, cz);
        if flags[ci] & (1 << dir) != 0 {
            // Boundary edge: emit the corner vertex and rotate clockwise
            let (px, pz) = match dir {
                0 => (cx, cz + 1),
                1 => (cx + 1, cz + 1),
                2 => (cx + 1, cz),
                _ => (cx, cz),
            };
            let py = corner_height(cf, px, pz);
            let r = match cf.connected(cx, cz, dir as usize) {
                Some((nx, nz)) => cf.cell(nx, nz).map_or(0, |c| c.reg) as i32,
                None => 0,
            };
            points.push([px, py, pz, r]);
            flags[ci] &= !(1 << dir);
            dir = (dir + 1) & 3;
        } else {
            // Interior edge: step into the neighbor and rotate back
            match cf.connected(cx, cz, dir as usize) {
                Some((nx, nz)) => {
                    cx = nx;
                    cz = nz;
                }
                None => break,
            }
            dir = (dir + 3) & 3;
        }
        if cx == start_x && cz == start_z && dir == start_dir {
            break;
        }
    }
}

/// Height of the corner at cell-grid position `(px, pz)`: the highest floor
/// among the up-to-four cells sharing the corner. Both regions bordering a
/// corner compute the same value, so shared vertices weld exactly.
fn corner_height(cf: &CompactField, px: i32, pz: i32) -> i32 {
    let mut y = 0;
    for (dx, dz) in [(-1, -1), (0, -1), (-1, 0), (0, 0)] {
        if let Some(cell) = cf.cell(px + dx, pz + dz) {
            y = y.max(cell.y);
        }
    }
    y
}

/// Simplifies a raw boundary loop. Vertices where the neighboring region
/// changes are always kept; wall edges are refined until they deviate less
/// than `max_error` cells from the raw boundary and are shorter than
/// `max_edge_len` cells.
fn simplify_contour(points: &[[i32; 4]], max_error: f32, max_edge_len: i32) -> Vec<[i32; 4]> {
    let pn = points.len();

    // Seed with portal vertices (neighbor region changes)
    let mut simplified: Vec<[i32; 4]> = Vec::new();
    for i in 0..pn {
        let ii = (i + 1) % pn;
        if points[i][3] != points[ii][3] {
            simplified.push([points[i][0], points[i][1], points[i][2], i as i32]);
        }
    }

    if simplified.is_empty() {
        // Closed loop against a single neighbor: keep the lower-left and
        // upper-right extremes as anchors
        let mut lli = 0;
        let mut uri = 0;
        for (i, p) in points.iter().enumerate() {
            let (x, z) = (p[0], p[2]);
            let (lx, lz) = (points[lli][0], points[lli][2]);
            let (ux, uz) = (points[uri][0], points[uri][2]);
            if x < lx || (x == lx && z < lz) {
                lli = i;
            }
            if x > ux || (x == ux && z > uz) {
                uri = i;
            }
        }
        for i in [lli, uri] {
            simplified.push([points[i][0], points[i][1], points[i][2], i as i32]);
        }
    }

    // Refine wall segments until they track the raw boundary closely enough
    let mut i = 0;
    while i < simplified.len() {
        let ii = (i + 1) % simplified.len();
        let ai = simplified[i][3] as usize;
        let bi = simplified[ii][3] as usize;
        let (ax, az) = (simplified[i][0] as f32, simplified[i][2] as f32);
        let (bx, bz) = (simplified[ii][0] as f32, simplified[ii][2] as f32);

        let mut maxd = 0.0f32;
        let mut maxi = None;
        let mut ci = (ai + 1) % pn;
        while ci != bi {
            // Only wall points contribute deviation; portal runs stay as the
            // straight line between their kept endpoints
            if points[ci][3] == 0 {
                let d = dist_pt_seg_2d_sqr(
                    points[ci][0] as f32,
                    points[ci][2] as f32,
                    ax,
                    az,
                    bx,
                    bz,
                );
                if d > maxd {
                    maxd = d;
                    maxi = Some(ci);
                }
            }
            ci = (ci + 1) % pn;
        }

        match maxi {
            Some(mi) if maxd > max_error * max_error => {
                simplified.insert(
                    i + 1,
                    [points[mi][0], points[mi][1], points[mi][2], mi as i32],
                );
            }
            _ => i += 1,
        }
    }

    // Split wall edges longer than the edge-length budget
    if max_edge_len > 0 {
        let max_len_sqr = max_edge_len * max_edge_len;
        let mut i = 0;
        while i < simplified.len() {
            let ii = (i + 1) % simplified.len();
            let ai = simplified[i][3] as usize;
            let bi = simplified[ii][3] as usize;
            let wall = points[(ai + 1) % pn][3] == 0;
            let dx = simplified[ii][0] - simplified[i][0];
            let dz = simplified[ii][2] - simplified[i][2];
            if wall && dx * dx + dz * dz > max_len_sqr {
                let span = if bi < ai { bi + pn - ai } else { bi - ai };
                if span > 1 {
                    let mi = (ai + span / 2) % pn;
                    simplified.insert(
                        i + 1,
                        [points[mi][0], points[mi][1], points[mi][2], mi as i32],
                    );
                    continue;
                }
            }
            i += 1;
        }
    }

    // Replace raw indices with the neighbor region of each leaving edge
    for v in simplified.iter_mut() {
        let next_raw = (v[3] as usize + 1) % pn;
        v[3] = points[next_raw][3];
    }

    // Drop degenerate segments
    let mut cleaned: Vec<[i32; 4]> = Vec::with_capacity(simplified.len());
    for v in simplified {
        if cleaned
            .last()
            .map_or(true, |l| l[0] != v[0] || l[2] != v[2])
        {
            cleaned.push(v);
        }
    }
    while cleaned.len() > 1 {
        let first = cleaned[0];
        let last = cleaned[cleaned.len() - 1];
        if first[0] == last[0] && first[2] == last[2] {
            cleaned.pop();
        } else {
            break;
        }
    }
    cleaned
}

/// Twice the signed area of a contour on the XZ plane. Outer contours come
/// out of the walker clockwise (negative); holes counter-clockwise.
fn signed_area_2d(verts: &[[i32; 4]]) -> i64 {
    let mut area = 0i64;
    let n = verts.len();
    for i in 0..n {
        let j = (i + 1) % n;
        area += verts[i][0] as i64 * verts[j][2] as i64 - verts[j][0] as i64 * verts[i][2] as i64;
    }
    area
}

/// Merges a region's hole outlines into its outer contour by splicing each
/// hole through the closest mutually visible vertex pair.
fn merge_region_contours(mut group: Vec<Contour>) -> Contour {
    if group.len() == 1 {
        return group.pop().unwrap();
    }

    // The outer contour has the most negative signed area
    let outer_idx = group
        .iter()
        .enumerate()
        .min_by_key(|(_, c)| signed_area_2d(&c.verts))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let mut outer = group.swap_remove(outer_idx);

    // Merge holes left to right so bridges do not cross each other
    group.sort_by_key(|c| c.verts.iter().map(|v| v[0]).min().unwrap_or(0));
    for hole in group {
        splice_hole(&mut outer.verts, &hole.verts);
    }
    outer
}

fn splice_hole(outer: &mut Vec<[i32; 4]>, hole: &[[i32; 4]]) {
    // Candidate bridges ordered by length
    let mut candidates: Vec<(i64, usize, usize)> = Vec::new();
    for (i, ov) in outer.iter().enumerate() {
        for (j, hv) in hole.iter().enumerate() {
            let dx = (ov[0] - hv[0]) as i64;
            let dz = (ov[2] - hv[2]) as i64;
            candidates.push((dx * dx + dz * dz, i, j));
        }
    }
    candidates.sort_unstable();

    let chosen = candidates
        .iter()
        .find(|&&(_, i, j)| {
            let a = (outer[i][0], outer[i][2]);
            let b = (hole[j][0], hole[j][2]);
            !segment_crosses_contour(a, b, outer) && !segment_crosses_contour(a, b, hole)
        })
        .or(candidates.first())
        .copied();

    let Some((_, i, j)) = chosen else { return };

    let mut merged = Vec::with_capacity(outer.len() + hole.len() + 2);
    merged.extend_from_slice(&outer[..=i]);
    for k in 0..=hole.len() {
        merged.push(hole[(j + k) % hole.len()]);
    }
    merged.extend_from_slice(&outer[i..]);
    *outer = merged;
}

/// Whether the open segment `a -> b` properly crosses any edge of the
/// contour. Edges touching the segment endpoints are ignored.
fn segment_crosses_contour(a: (i32, i32), b: (i32, i32), verts: &[[i32; 4]]) -> bool {
    let n = verts.len();
    for i in 0..n {
        let j = (i + 1) % n;
        let c = (verts[i][0], verts[i][2]);
        let d = (verts[j][0], verts[j][2]);
        if c == a || c == b || d == a || d == b {
            continue;
        }
        if segments_intersect_2d(a, b, c, d) {
            return true;
        }
    }
    false
}

fn segments_intersect_2d(a: (i32, i32), b: (i32, i32), c: (i32, i32), d: (i32, i32)) -> bool {
    fn orient(p: (i32, i32), q: (i32, i32), r: (i32, i32)) -> i64 {
        (q.0 - p.0) as i64 * (r.1 - p.1) as i64 - (r.0 - p.0) as i64 * (q.1 - p.1) as i64
    }
    let o1 = orient(a, b, c);
    let o2 = orient(a, b, d);
    let o3 = orient(c, d, a);
    let o4 = orient(c, d, b);
    if ((o1 > 0 && o2 < 0) || (o1 < 0 && o2 > 0)) && ((o3 > 0 && o4 < 0) || (o3 < 0 && o4 > 0)) {
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::{build_distance_field, build_regions};
    use crate::voxel::{VoxelField, WALKABLE_AREA};

    fn partitioned_plateau(w: i32, h: i32) -> CompactField {
        let mut f = VoxelField::new(
            w,
            h,
            Vec3::ZERO,
            Vec3::new(w as f32, 50.0, h as f32),
            1.0,
            1.0,
        );
        for z in 0..h {
            for x in 0..w {
                f.add_span(x, z, 0, 2, WALKABLE_AREA, 0).unwrap();
            }
        }
        let mut cf = CompactField::from_voxel_field(&f, 5, 2, 0);
        build_distance_field(&mut cf);
        build_regions(&mut cf, 2, 10_000).unwrap();
        cf
    }

    #[test]
    fn test_plateau_outline_is_square() {
        let cf = partitioned_plateau(8, 8);
        let cset = build_contours(&cf, 1.0, 0).unwrap();
        assert_eq!(cset.contours.len(), 1);
        let c = &cset.contours[0];
        // A flat square simplifies to its four corners
        assert_eq!(c.verts.len(), 4);
        for v in &c.verts {
            assert!(v[0] == 0 || v[0] == 8);
            assert!(v[2] == 0 || v[2] == 8);
        }
        // Outer contours wind clockwise
        assert!(signed_area_2d(&c.verts) < 0);
    }

    #[test]
    fn test_edge_length_splitting() {
        let cf = partitioned_plateau(8, 8);
        let cset = build_contours(&cf, 1.0, 4).unwrap();
        let c = &cset.contours[0];
        // Every wall edge respects the 4-cell budget
        let n = c.verts.len();
        assert!(n >= 8);
        for i in 0..n {
            let j = (i + 1) % n;
            let dx = c.verts[j][0] - c.verts[i][0];
            let dz = c.verts[j][2] - c.verts[i][2];
            assert!(dx * dx + dz * dz <= 16);
        }
    }

    #[test]
    fn test_hole_is_spliced_into_outline() {
        // A plateau with a solid pillar missing from the middle
        let w = 12;
        let h = 12;
        let mut f = VoxelField::new(
            w,
            h,
            Vec3::ZERO,
            Vec3::new(w as f32, 50.0, h as f32),
            1.0,
            1.0,
        );
        for z in 0..h {
            for x in 0..w {
                if (4..8).contains(&x) && (4..8).contains(&z) {
                    continue;
                }
                f.add_span(x, z, 0, 2, WALKABLE_AREA, 0).unwrap();
            }
        }
        let mut cf = CompactField::from_voxel_field(&f, 5, 2, 0);
        build_distance_field(&mut cf);
        build_regions(&mut cf, 2, 10_000).unwrap();
        let cset = build_contours(&cf, 1.0, 0).unwrap();
        // The hole merges into the outer outline: one contour, and the
        // spliced outline visits the hole boundary
        assert_eq!(cset.contours.len(), 1);
        let c = &cset.contours[0];
        assert!(c.verts.len() >= 8);
        let touches_hole = c
            .verts
            .iter()
            .any(|v| (4..=8).contains(&v[0]) && (4..=8).contains(&v[2]));
        assert!(touches_hole);
    }
}
