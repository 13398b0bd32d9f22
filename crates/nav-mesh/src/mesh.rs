//! Tiled navigation mesh storage and stitching.

use glam::Vec3;
use nav_common::{
    closest_point_on_segment, height_on_triangle, point_in_poly_2d, Error, Result, TileCoord,
};
use nav_gen::{DetailMesh, TileLayer, MAX_VERTS_PER_POLY, NO_INDEX};
use std::collections::HashMap;

/// Sentinel for "no link"
pub const LINK_NULL: u32 = u32::MAX;

/// Tolerance for matching border edges to the tile boundary plane
pub const PORTAL_EPS: f32 = 0.01;

/// Salted reference to one polygon of the mesh. Stale references (the tile
/// was replaced or removed) fail validation instead of aliasing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct PolyRef(u64);

impl PolyRef {
    /// The invalid reference
    pub const NULL: PolyRef = PolyRef(0);

    pub(crate) fn new(salt: u32, tile_idx: usize, poly_idx: usize) -> Self {
        PolyRef(
            ((salt as u64 & 0x00ff_ffff) << 40)
                | ((tile_idx as u64 + 1) << 16)
                | (poly_idx as u64 & 0xffff),
        )
    }

    /// Whether this is the invalid reference
    pub fn is_null(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn salt(self) -> u32 {
        ((self.0 >> 40) & 0x00ff_ffff) as u32
    }

    pub(crate) fn tile_index(self) -> Option<usize> {
        let t = (self.0 >> 16) & 0x00ff_ffff;
        if t == 0 {
            None
        } else {
            Some(t as usize - 1)
        }
    }

    pub(crate) fn poly_index(self) -> usize {
        (self.0 & 0xffff) as usize
    }
}

/// A link from one polygon edge to a neighboring polygon, possibly across a
/// tile boundary.
#[derive(Debug, Clone, Copy)]
pub struct Link {
    /// The polygon this link leads to
    pub target: PolyRef,
    /// Source polygon within the owning tile
    pub src_poly: u16,
    /// Source edge index within the source polygon
    pub edge: u8,
    /// Whether this link crosses a tile boundary
    pub boundary: bool,
    /// For boundary links: portal interval minimum along the shared axis
    pub omin: f32,
    /// For boundary links: portal interval maximum along the shared axis
    pub omax: f32,
    /// Next link of the same source polygon, or `LINK_NULL`
    pub next: u32,
}

/// One polygon of a stitched tile
#[derive(Debug, Clone, Copy)]
pub struct TilePoly {
    /// Indices into the tile vertex pool
    pub verts: [u16; MAX_VERTS_PER_POLY],
    /// Same-tile neighbor per edge (`NO_INDEX` = none)
    pub neis: [u16; MAX_VERTS_PER_POLY],
    /// Number of vertices in use
    pub vert_count: u8,
    /// Area id
    pub area: u8,
    /// Head of this polygon's link list, or `LINK_NULL`
    pub first_link: u32,
}

impl TilePoly {
    /// Vertex indices in use
    pub fn vertices(&self) -> &[u16] {
        &self.verts[..self.vert_count as usize]
    }
}

/// A stitched tile of the navigation mesh
#[derive(Debug)]
pub struct MeshTile {
    /// Tile coordinate
    pub coord: TileCoord,
    /// Salt at the time of stitching; bumped on replacement
    pub salt: u32,
    /// World bounds of the tile
    pub bmin: Vec3,
    /// World bounds of the tile
    pub bmax: Vec3,
    /// Polygon vertices in world space
    pub verts: Vec<Vec3>,
    /// Polygons
    pub polys: Vec<TilePoly>,
    /// Adjacency links, chained per polygon
    pub links: Vec<Link>,
    /// Height sampling mesh
    pub detail: DetailMesh,
}

/// Construction parameters of the navigation mesh
#[derive(Debug, Clone)]
pub struct NavMeshParams {
    /// World-space origin (minimum corner) of the tile grid
    pub origin: Vec3,
    /// World-space edge length of one square tile
    pub tile_width: f32,
    /// Capacity of the tile slab
    pub max_tiles: usize,
    /// Height tolerance when welding portal edges across tiles
    pub walkable_climb: f32,
}

/// The global navigation mesh
#[derive(Debug)]
pub struct NavMesh {
    params: NavMeshParams,
    tiles: Vec<Option<MeshTile>>,
    salts: Vec<u32>,
    free: Vec<usize>,
    lookup: HashMap<(i32, i32), usize>,
}

impl NavMesh {
    /// Creates an empty mesh
    pub fn new(params: NavMeshParams) -> Result<Self> {
        if params.tile_width <= 0.0 {
            return Err(Error::NavMesh("tile width must be positive".to_string()));
        }
        if params.max_tiles == 0 {
            return Err(Error::NavMesh("max tiles must be positive".to_string()));
        }
        Ok(Self {
            params,
            tiles: Vec::new(),
            salts: Vec::new(),
            free: Vec::new(),
            lookup: HashMap::new(),
        })
    }

    /// Construction parameters
    pub fn params(&self) -> &NavMeshParams {
        &self.params
    }

    /// Number of stitched tiles
    pub fn tile_count(&self) -> usize {
        self.lookup.len()
    }

    /// Total number of polygons across all tiles
    pub fn poly_count(&self) -> usize {
        self.tiles
            .iter()
            .flatten()
            .map(|t| t.polys.len())
            .sum()
    }

    /// Total number of adjacency links across all tiles
    pub fn link_count(&self) -> usize {
        self.tiles
            .iter()
            .flatten()
            .map(|t| t.links.len())
            .sum()
    }

    /// The tile at `coord`, if stitched
    pub fn tile_at(&self, coord: TileCoord) -> Option<&MeshTile> {
        let idx = *self.lookup.get(&(coord.x, coord.z))?;
        self.tiles[idx].as_ref()
    }

    /// Inserts a tile layer into the mesh, replacing any previous tile at
    /// the same coordinate, and connects portals to the four neighbors.
    /// A zero-polygon layer stitches to an empty tile.
    pub fn stitch_tile(&mut self, layer: &TileLayer) -> Result<()> {
        let coord = layer.header.coord();
        self.unstitch_tile(coord);

        let slot = match self.free.pop() {
            Some(s) => s,
            None => {
                if self.tiles.len() >= self.params.max_tiles {
                    return Err(Error::NavMesh(format!(
                        "tile capacity {} exhausted",
                        self.params.max_tiles
                    )));
                }
                self.tiles.push(None);
                self.salts.push(0);
                self.tiles.len() - 1
            }
        };
        self.salts[slot] = self.salts[slot].wrapping_add(1).max(1);
        let salt = self.salts[slot];

        // Vertices to world space
        let h = &layer.header;
        let verts: Vec<Vec3> = layer
            .verts
            .iter()
            .map(|v| {
                Vec3::new(
                    h.bmin.x + v[0] as f32 * h.cs,
                    h.bmin.y + v[1] as f32 * h.ch,
                    h.bmin.z + v[2] as f32 * h.cs,
                )
            })
            .collect();

        let polys: Vec<TilePoly> = layer
            .polys
            .iter()
            .map(|p| TilePoly {
                verts: p.verts,
                neis: p.neis,
                vert_count: p.vert_count,
                area: p.area,
                first_link: LINK_NULL,
            })
            .collect();

        // Internal links from the layer adjacency
        let mut links: Vec<Link> = Vec::new();
        for (pi, p) in layer.polys.iter().enumerate() {
            for e in 0..p.vert_count as usize {
                let n = p.neis[e];
                if n == NO_INDEX {
                    continue;
                }
                links.push(Link {
                    target: PolyRef::new(salt, slot, n as usize),
                    src_poly: pi as u16,
                    edge: e as u8,
                    boundary: false,
                    omin: 0.0,
                    omax: 0.0,
                    next: LINK_NULL,
                });
            }
        }

        let mut tile = MeshTile {
            coord,
            salt,
            bmin: h.bmin,
            bmax: h.bmax,
            verts,
            polys,
            links,
            detail: layer.detail.clone(),
        };
        rebuild_link_chains(&mut tile);

        self.tiles[slot] = Some(tile);
        self.lookup.insert((coord.x, coord.z), slot);

        // Weld portals with the four neighbors
        for (dx, dz) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
            let ncoord = (coord.x + dx, coord.z + dz);
            if let Some(&nslot) = self.lookup.get(&ncoord) {
                self.connect_tiles(slot, nslot);
            }
        }
        if let Some(tile) = self.tiles[slot].as_ref() {
            log::debug!(
                "stitched tile ({}, {}): {} polys, {} links",
                coord.x,
                coord.z,
                tile.polys.len(),
                tile.links.len()
            );
        }
        Ok(())
    }

    /// Removes the tile at `coord` and every link referencing it from the
    /// neighboring tiles. Returns whether a tile was removed.
    pub fn unstitch_tile(&mut self, coord: TileCoord) -> bool {
        let Some(slot) = self.lookup.remove(&(coord.x, coord.z)) else {
            return false;
        };
        self.tiles[slot] = None;
        self.free.push(slot);

        for (dx, dz) in [(-1, 0), (1, 0), (0, -1), (0, 1)] {
            if let Some(&nslot) = self.lookup.get(&(coord.x + dx, coord.z + dz)) {
                if let Some(ntile) = self.tiles[nslot].as_mut() {
                    let before = ntile.links.len();
                    ntile
                        .links
                        .retain(|l| l.target.tile_index() != Some(slot));
                    if ntile.links.len() != before {
                        rebuild_link_chains(ntile);
                    }
                }
            }
        }
        true
    }

    /// Whether a reference points at a currently-stitched polygon
    pub fn is_valid_ref(&self, r: PolyRef) -> bool {
        self.get_tile_and_poly(r).is_some()
    }

    /// Resolves a reference to its tile and polygon
    pub fn get_tile_and_poly(&self, r: PolyRef) -> Option<(&MeshTile, &TilePoly)> {
        let tile_idx = r.tile_index()?;
        let tile = self.tiles.get(tile_idx)?.as_ref()?;
        if tile.salt != r.salt() {
            return None;
        }
        let poly = tile.polys.get(r.poly_index())?;
        Some((tile, poly))
    }

    /// Reference of polygon `poly_idx` in the tile at `coord`
    pub fn poly_ref_at(&self, coord: TileCoord, poly_idx: usize) -> Option<PolyRef> {
        let slot = *self.lookup.get(&(coord.x, coord.z))?;
        let tile = self.tiles[slot].as_ref()?;
        if poly_idx >= tile.polys.len() {
            return None;
        }
        Some(PolyRef::new(tile.salt, slot, poly_idx))
    }

    /// Iterates every stitched tile with its slab index
    pub(crate) fn tiles_with_index(&self) -> impl Iterator<Item = (usize, &MeshTile)> {
        self.tiles
            .iter()
            .enumerate()
            .filter_map(|(i, t)| t.as_ref().map(|t| (i, t)))
    }

    /// Tile slab index for a coordinate
    pub(crate) fn slot_of(&self, coord: TileCoord) -> Option<usize> {
        self.lookup.get(&(coord.x, coord.z)).copied()
    }

    /// Tile by slab index
    pub(crate) fn tile_by_slot(&self, slot: usize) -> Option<&MeshTile> {
        self.tiles.get(slot)?.as_ref()
    }

    /// Invokes `f` for every polygon boundary edge of the mesh. Degenerate
    /// edges shorter than a millimeter are skipped.
    pub fn for_each_edge<F: FnMut(Vec3, Vec3)>(&self, mut f: F) {
        for tile in self.tiles.iter().flatten() {
            for p in &tile.polys {
                let nv = p.vert_count as usize;
                for e in 0..nv {
                    let a = tile.verts[p.verts[e] as usize];
                    let b = tile.verts[p.verts[(e + 1) % nv] as usize];
                    if a.distance_squared(b) < 0.001 * 0.001 {
                        continue;
                    }
                    f(a, b);
                }
            }
        }
    }

    /// Ground height of a polygon at `pos`, from its detail mesh
    pub fn poly_height(&self, tile: &MeshTile, poly_idx: usize, pos: Vec3) -> Option<f32> {
        let [vb, _vc, tb, tc] = *tile.detail.meshes.get(poly_idx)?;
        for t in &tile.detail.tris[tb as usize..(tb + tc) as usize] {
            let a = tile.detail.verts[vb as usize + t[0] as usize];
            let b = tile.detail.verts[vb as usize + t[1] as usize];
            let c = tile.detail.verts[vb as usize + t[2] as usize];
            if let Some(h) = height_on_triangle(pos, a, b, c) {
                return Some(h);
            }
        }
        None
    }

    /// Closest point on a polygon to `pos`
    pub fn closest_point_on_poly(&self, tile: &MeshTile, poly_idx: usize, pos: Vec3) -> Vec3 {
        let poly = &tile.polys[poly_idx];
        let verts: Vec<Vec3> = poly
            .vertices()
            .iter()
            .map(|&v| tile.verts[v as usize])
            .collect();

        if point_in_poly_2d(pos, &verts) {
            let y = self
                .poly_height(tile, poly_idx, pos)
                .unwrap_or_else(|| verts.iter().map(|v| v.y).sum::<f32>() / verts.len() as f32);
            return Vec3::new(pos.x, y, pos.z);
        }

        let mut best = verts[0];
        let mut best_d = f32::MAX;
        let n = verts.len();
        for i in 0..n {
            let c = closest_point_on_segment(pos, verts[i], verts[(i + 1) % n]);
            let d = pos.distance_squared(c);
            if d < best_d {
                best_d = d;
                best = c;
            }
        }
        best
    }

    /// Left and right endpoints of the portal from `from` into `to`, as seen
    /// when traveling from `from`. Boundary portals are clamped to the
    /// overlap interval recorded at stitch time.
    pub fn portal_points(&self, from: PolyRef, to: PolyRef) -> Option<(Vec3, Vec3)> {
        let (tile, poly) = self.get_tile_and_poly(from)?;
        let mut li = poly.first_link;
        while li != LINK_NULL {
            let link = &tile.links[li as usize];
            if link.target == to {
                let nv = poly.vert_count as usize;
                let e = link.edge as usize;
                // Polygons wind counter-clockwise, so the edge start is the
                // right-hand portal point
                let right = tile.verts[poly.verts[e] as usize];
                let left = tile.verts[poly.verts[(e + 1) % nv] as usize];
                if link.boundary {
                    return Some(clamp_portal(left, right, link.omin, link.omax));
                }
                return Some((left, right));
            }
            li = link.next;
        }
        None
    }

    /// Builds symmetric boundary links between two adjacent stitched tiles.
    fn connect_tiles(&mut self, a_idx: usize, b_idx: usize) {
        let Some(tile_a) = self.tiles[a_idx].as_ref() else {
            return;
        };
        let Some(tile_b) = self.tiles[b_idx].as_ref() else {
            return;
        };

        let dx = tile_b.coord.x - tile_a.coord.x;
        let dz = tile_b.coord.z - tile_a.coord.z;
        if dx.abs() + dz.abs() != 1 {
            return;
        }
        // Axis perpendicular to the shared boundary, and the axis the
        // portal interval runs along
        let (axis, other_axis) = if dx != 0 { (0, 2) } else { (2, 0) };
        let boundary = if axis == 0 {
            self.params.origin.x + tile_a.coord.x.max(tile_b.coord.x) as f32 * self.params.tile_width
        } else {
            self.params.origin.z + tile_a.coord.z.max(tile_b.coord.z) as f32 * self.params.tile_width
        };

        let climb = self.params.walkable_climb + PORTAL_EPS;
        let mut matches: Vec<(usize, u8, usize, u8, f32, f32)> = Vec::new();

        for (pa_idx, pa) in tile_a.polys.iter().enumerate() {
            let na = pa.vert_count as usize;
            for ea in 0..na {
                let a0 = tile_a.verts[pa.verts[ea] as usize];
                let a1 = tile_a.verts[pa.verts[(ea + 1) % na] as usize];
                if (a0[axis] - boundary).abs() > PORTAL_EPS
                    || (a1[axis] - boundary).abs() > PORTAL_EPS
                {
                    continue;
                }
                for (pb_idx, pb) in tile_b.polys.iter().enumerate() {
                    let nb = pb.vert_count as usize;
                    for eb in 0..nb {
                        let b0 = tile_b.verts[pb.verts[eb] as usize];
                        let b1 = tile_b.verts[pb.verts[(eb + 1) % nb] as usize];
                        if (b0[axis] - boundary).abs() > PORTAL_EPS
                            || (b1[axis] - boundary).abs() > PORTAL_EPS
                        {
                            continue;
                        }

                        let amin = a0[other_axis].min(a1[other_axis]);
                        let amax = a0[other_axis].max(a1[other_axis]);
                        let bmin = b0[other_axis].min(b1[other_axis]);
                        let bmax = b0[other_axis].max(b1[other_axis]);
                        let omin = amin.max(bmin);
                        let omax = amax.min(bmax);
                        if omax - omin <= PORTAL_EPS {
                            continue;
                        }

                        // Height agreement at the overlap midpoint
                        let mid = (omin + omax) * 0.5;
                        let ya = lerp_edge_height(a0, a1, other_axis, mid);
                        let yb = lerp_edge_height(b0, b1, other_axis, mid);
                        if (ya - yb).abs() > climb {
                            continue;
                        }

                        matches.push((pa_idx, ea as u8, pb_idx, eb as u8, omin, omax));
                    }
                }
            }
        }

        if matches.is_empty() {
            return;
        }

        let salt_a = tile_a.salt;
        let salt_b = tile_b.salt;
        for &(pa, ea, pb, eb, omin, omax) in &matches {
            let to_b = PolyRef::new(salt_b, b_idx, pb);
            let to_a = PolyRef::new(salt_a, a_idx, pa);
            if let Some(tile) = self.tiles[a_idx].as_mut() {
                push_link(tile, pa, to_b, ea, true, omin, omax);
            }
            if let Some(tile) = self.tiles[b_idx].as_mut() {
                push_link(tile, pb, to_a, eb, true, omin, omax);
            }
        }
    }
}

/// Interpolates the height of edge `a -> b` where its `axis` coordinate
/// equals `at`.
fn lerp_edge_height(a: Vec3, b: Vec3, axis: usize, at: f32) -> f32 {
    let d = b[axis] - a[axis];
    if d.abs() < f32::EPSILON {
        return (a.y + b.y) * 0.5;
    }
    let t = ((at - a[axis]) / d).clamp(0.0, 1.0);
    a.y + (b.y - a.y) * t
}

/// Clamps a portal edge to the `[omin, omax]` interval along its dominant
/// horizontal axis, preserving left/right orientation.
fn clamp_portal(left: Vec3, right: Vec3, omin: f32, omax: f32) -> (Vec3, Vec3) {
    let axis = if (left.x - right.x).abs() > (left.z - right.z).abs() {
        0
    } else {
        2
    };
    let d = left[axis] - right[axis];
    if d.abs() < f32::EPSILON {
        return (left, right);
    }
    // Parameterize from right (t = 0) to left (t = 1)
    let t0 = ((omin - right[axis]) / d).clamp(0.0, 1.0);
    let t1 = ((omax - right[axis]) / d).clamp(0.0, 1.0);
    let lo = t0.min(t1);
    let hi = t0.max(t1);
    (
        right + (left - right) * hi,
        right + (left - right) * lo,
    )
}

fn push_link(
    tile: &mut MeshTile,
    poly_idx: usize,
    target: PolyRef,
    edge: u8,
    boundary: bool,
    omin: f32,
    omax: f32,
) {
    let idx = tile.links.len() as u32;
    let next = tile.polys[poly_idx].first_link;
    tile.links.push(Link {
        target,
        src_poly: poly_idx as u16,
        edge,
        boundary,
        omin,
        omax,
        next,
    });
    tile.polys[poly_idx].first_link = idx;
}

/// Rebuilds every polygon's link chain from the flat link vector.
fn rebuild_link_chains(tile: &mut MeshTile) {
    for p in tile.polys.iter_mut() {
        p.first_link = LINK_NULL;
    }
    for i in 0..tile.links.len() {
        let poly_idx = tile.links[i].src_poly as usize;
        tile.links[i].next = tile.polys[poly_idx].first_link;
        tile.polys[poly_idx].first_link = i as u32;
    }
}
