//! Path queries over the stitched navigation mesh.
//!
//! A query borrows a mesh snapshot: locate the polygons nearest to the start
//! and target, run a best-first search over polygon adjacency, then pull the
//! polygon corridor taut with the funnel algorithm.

use crate::mesh::{NavMesh, PolyRef, LINK_NULL};
use crate::node::{Node, NodeMap, OpenEntry};
use glam::Vec3;
use nav_common::{tri_area_2d, vequal_2d, TileCoord};
use std::collections::BinaryHeap;

/// Default node ceiling for the polygon search
pub const MAX_SEARCH_NODES: usize = 2048;
/// Upper bound on corridor length; longer corridors report "no path"
pub const MAX_CORRIDOR_POLYS: usize = 256;
/// Default half-extents when snapping query points to the mesh
pub const DEFAULT_QUERY_EXTENT: Vec3 = Vec3::new(1.0, 4.0, 1.0);

/// Read-only path query over a navigation mesh snapshot
pub struct NavMeshQuery<'a> {
    mesh: &'a NavMesh,
    extent: Vec3,
    max_nodes: usize,
}

impl<'a> NavMeshQuery<'a> {
    /// Creates a query over the given mesh
    pub fn new(mesh: &'a NavMesh) -> Self {
        Self {
            mesh,
            extent: DEFAULT_QUERY_EXTENT,
            max_nodes: MAX_SEARCH_NODES,
        }
    }

    /// Overrides the snap search extent
    pub fn set_query_extent(&mut self, extent: Vec3) {
        self.extent = extent;
    }

    /// Overrides the search node ceiling
    pub fn set_max_nodes(&mut self, max_nodes: usize) {
        self.max_nodes = max_nodes.max(2);
    }

    /// Finds the polygon nearest to `pos` within the query extent, returning
    /// its reference and the closest point on it.
    pub fn find_nearest_poly(&self, pos: Vec3) -> Option<(PolyRef, Vec3)> {
        let params = self.mesh.params();
        let inv = 1.0 / params.tile_width;
        let tx0 = ((pos.x - self.extent.x - params.origin.x) * inv).floor() as i32;
        let tx1 = ((pos.x + self.extent.x - params.origin.x) * inv).floor() as i32;
        let tz0 = ((pos.z - self.extent.z - params.origin.z) * inv).floor() as i32;
        let tz1 = ((pos.z + self.extent.z - params.origin.z) * inv).floor() as i32;

        let mut best: Option<(PolyRef, Vec3)> = None;
        let mut best_d = f32::MAX;

        for tz in tz0..=tz1 {
            for tx in tx0..=tx1 {
                let Some(slot) = self.mesh.slot_of(TileCoord::new(tx, tz)) else {
                    continue;
                };
                let Some(tile) = self.mesh.tile_by_slot(slot) else {
                    continue;
                };
                for pi in 0..tile.polys.len() {
                    let cp = self.mesh.closest_point_on_poly(tile, pi, pos);
                    let delta = cp - pos;
                    if delta.x.abs() > self.extent.x
                        || delta.y.abs() > self.extent.y
                        || delta.z.abs() > self.extent.z
                    {
                        continue;
                    }
                    let d = delta.length_squared();
                    if d < best_d {
                        best_d = d;
                        best = Some((PolyRef::new(tile.salt, slot, pi), cp));
                    }
                }
            }
        }
        best
    }

    /// Best-first search from `start_ref` to `end_ref`, returning the
    /// polygon corridor. An empty result means no path: the target is
    /// unreachable, the node ceiling was hit, or the corridor exceeded its
    /// bound. No partial corridors are returned.
    pub fn find_poly_path(
        &self,
        start_ref: PolyRef,
        end_ref: PolyRef,
        start_pos: Vec3,
        end_pos: Vec3,
    ) -> Vec<PolyRef> {
        if !self.mesh.is_valid_ref(start_ref) || !self.mesh.is_valid_ref(end_ref) {
            return Vec::new();
        }
        if start_ref == end_ref {
            return vec![start_ref];
        }

        let mut nodes = NodeMap::new(self.max_nodes);
        let mut open = BinaryHeap::new();

        let start_h = start_pos.distance(end_pos);
        nodes.try_insert(
            start_ref,
            Node {
                pos: start_pos,
                g: 0.0,
                f: start_h,
                parent: None,
                closed: false,
            },
        );
        open.push(OpenEntry {
            f: start_h,
            r: start_ref,
        });

        let mut found = false;
        while let Some(entry) = open.pop() {
            let Some(&node) = nodes.get(entry.r) else { continue };
            if node.closed {
                continue;
            }
            if let Some(n) = nodes.get_mut(entry.r) {
                n.closed = true;
            }
            if entry.r == end_ref {
                found = true;
                break;
            }

            let Some((tile, poly)) = self.mesh.get_tile_and_poly(entry.r) else {
                continue;
            };

            let mut li = poly.first_link;
            while li != LINK_NULL {
                let link = tile.links[li as usize];
                li = link.next;

                let neighbor = link.target;
                if !self.mesh.is_valid_ref(neighbor) {
                    continue;
                }
                if node.parent == Some(neighbor) {
                    continue;
                }
                let Some((left, right)) = self.mesh.portal_points(entry.r, neighbor) else {
                    continue;
                };
                let mid = (left + right) * 0.5;
                let g = node.g + node.pos.distance(mid);
                let f = g + mid.distance(end_pos);

                match nodes.get_mut(neighbor) {
                    Some(n) => {
                        if n.closed || g >= n.g {
                            continue;
                        }
                        n.pos = mid;
                        n.g = g;
                        n.f = f;
                        n.parent = Some(entry.r);
                    }
                    None => {
                        let inserted = nodes.try_insert(
                            neighbor,
                            Node {
                                pos: mid,
                                g,
                                f,
                                parent: Some(entry.r),
                                closed: false,
                            },
                        );
                        if !inserted {
                            continue;
                        }
                    }
                }
                open.push(OpenEntry { f, r: neighbor });
            }
        }

        if !found {
            return Vec::new();
        }

        // Walk the parent chain back to the start
        let mut corridor = Vec::new();
        let mut cur = Some(end_ref);
        while let Some(r) = cur {
            corridor.push(r);
            if corridor.len() > MAX_CORRIDOR_POLYS {
                return Vec::new();
            }
            cur = nodes.get(r).and_then(|n| n.parent);
        }
        corridor.reverse();
        corridor
    }

    /// Pulls the corridor taut into a minimal waypoint list from `start_pos`
    /// to `end_pos`. Returns an empty list when the corridor is inconsistent
    /// with the current mesh.
    pub fn find_straight_path(
        &self,
        start_pos: Vec3,
        end_pos: Vec3,
        corridor: &[PolyRef],
    ) -> Vec<Vec3> {
        if corridor.is_empty() {
            return Vec::new();
        }
        let mut portals = Vec::with_capacity(corridor.len());
        for w in corridor.windows(2) {
            let Some(portal) = self.mesh.portal_points(w[0], w[1]) else {
                return Vec::new();
            };
            portals.push(portal);
        }
        portals.push((end_pos, end_pos));
        string_pull(start_pos, end_pos, &portals)
    }

    /// The mesh this query reads
    pub fn mesh(&self) -> &NavMesh {
        self.mesh
    }
}

/// Funnel string-pulling over a list of `(left, right)` portals. The final
/// portal must be the degenerate `(end, end)`.
pub fn string_pull(start: Vec3, end: Vec3, portals: &[(Vec3, Vec3)]) -> Vec<Vec3> {
    const EPS: f32 = 0.001;

    let mut path = vec![start];
    let mut apex = start;
    let mut left = start;
    let mut right = start;
    let mut apex_i = 0usize;
    let mut left_i = 0usize;
    let mut right_i = 0usize;

    let mut i = 0;
    while i < portals.len() {
        let (pl, pr) = portals[i];

        // Tighten the right side
        if tri_area_2d(apex, right, pr) >= 0.0 {
            if vequal_2d(apex, right, EPS) || tri_area_2d(apex, left, pr) < 0.0 {
                right = pr;
                right_i = i;
            } else {
                // Right crossed over left: the left corner is a waypoint
                if !vequal_2d(*path.last().unwrap(), left, EPS) {
                    path.push(left);
                }
                apex = left;
                apex_i = left_i;
                left = apex;
                right = apex;
                right_i = apex_i;
                i = apex_i + 1;
                continue;
            }
        }

        // Tighten the left side
        if tri_area_2d(apex, left, pl) <= 0.0 {
            if vequal_2d(apex, left, EPS) || tri_area_2d(apex, right, pl) > 0.0 {
                left = pl;
                left_i = i;
            } else {
                if !vequal_2d(*path.last().unwrap(), right, EPS) {
                    path.push(right);
                }
                apex = right;
                apex_i = right_i;
                left = apex;
                right = apex;
                left_i = apex_i;
                i = apex_i + 1;
                continue;
            }
        }
        i += 1;
    }

    if !vequal_2d(*path.last().unwrap(), end, EPS) {
        path.push(end);
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::NavMeshParams;
    use nav_common::TriMesh;
    use nav_gen::{NavGenConfig, TileBuilder};

    #[test]
    fn test_string_pull_straight_corridor() {
        let start = Vec3::new(0.0, 0.0, 0.5);
        let end = Vec3::new(4.0, 0.0, 0.5);
        let portals = vec![
            (Vec3::new(1.0, 0.0, 1.0), Vec3::new(1.0, 0.0, 0.0)),
            (Vec3::new(2.0, 0.0, 1.0), Vec3::new(2.0, 0.0, 0.0)),
            (Vec3::new(3.0, 0.0, 1.0), Vec3::new(3.0, 0.0, 0.0)),
            (end, end),
        ];
        let path = string_pull(start, end, &portals);
        assert_eq!(path.len(), 2);
        assert_eq!(path[0], start);
        assert_eq!(path[1], end);
    }

    #[test]
    fn test_string_pull_hugs_corner() {
        // An L-shaped corridor: two portals share the inner corner (2, 1)
        let start = Vec3::new(0.5, 0.0, 0.5);
        let end = Vec3::new(2.5, 0.0, 3.5);
        let portals = vec![
            (Vec3::new(2.0, 0.0, 1.0), Vec3::new(2.0, 0.0, 0.0)),
            (Vec3::new(2.0, 0.0, 1.0), Vec3::new(3.0, 0.0, 1.0)),
            (end, end),
        ];
        let path = string_pull(start, end, &portals);
        assert_eq!(path.len(), 3);
        assert_eq!(path[1], Vec3::new(2.0, 0.0, 1.0));
    }

    fn flat_world() -> (NavMesh, f32) {
        let builder = TileBuilder::new(NavGenConfig {
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
        })
        .unwrap();
        let mesh = TriMesh::from_slices(
            &[
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(16.0, 0.0, 0.0),
                Vec3::new(16.0, 0.0, 16.0),
                Vec3::new(0.0, 0.0, 16.0),
            ],
            &[0, 1, 2, 0, 2, 3],
        )
        .unwrap();
        let origin = Vec3::new(0.0, -1.0, 0.0);
        let world_max = Vec3::new(16.0, 1.0, 16.0);
        let mut nav = NavMesh::new(NavMeshParams {
            origin,
            tile_width: 8.0,
            max_tiles: 8,
            walkable_climb: 0.75,
        })
        .unwrap();
        for tz in 0..2 {
            for tx in 0..2 {
                if let Some(layer) = builder
                    .build_tile(TileCoord::new(tx, tz), origin, world_max, &mesh, &[])
                    .unwrap()
                {
                    nav.stitch_tile(&layer).unwrap();
                }
            }
        }
        (nav, 0.0)
    }

    #[test]
    fn test_find_nearest_poly_snaps_to_surface() {
        let (nav, floor_y) = flat_world();
        let q = NavMeshQuery::new(&nav);
        let (r, p) = q.find_nearest_poly(Vec3::new(8.0, 0.5, 8.0)).unwrap();
        assert!(!r.is_null());
        assert!((p.x - 8.0).abs() < 0.01);
        assert!((p.z - 8.0).abs() < 0.01);
        assert!((p.y - floor_y).abs() < 0.5);
    }

    #[test]
    fn test_find_nearest_poly_fails_far_away() {
        let (nav, _) = flat_world();
        let q = NavMeshQuery::new(&nav);
        assert!(q.find_nearest_poly(Vec3::new(100.0, 0.0, 100.0)).is_none());
    }

    #[test]
    fn test_path_across_tiles() {
        let (nav, _) = flat_world();
        let q = NavMeshQuery::new(&nav);
        let (sref, spt) = q.find_nearest_poly(Vec3::new(2.0, 0.0, 8.0)).unwrap();
        let (tref, tpt) = q.find_nearest_poly(Vec3::new(14.0, 0.0, 8.0)).unwrap();
        let corridor = q.find_poly_path(sref, tref, spt, tpt);
        assert!(!corridor.is_empty());
        assert_eq!(corridor[0], sref);
        assert_eq!(*corridor.last().unwrap(), tref);
        let path = q.find_straight_path(spt, tpt, &corridor);
        assert!(path.len() >= 2);
        assert!(path[0].distance(spt) < 0.01);
        assert!(path.last().unwrap().distance(tpt) < 0.01);
    }

    #[test]
    fn test_same_poly_path() {
        let (nav, _) = flat_world();
        let q = NavMeshQuery::new(&nav);
        let (sref, spt) = q.find_nearest_poly(Vec3::new(4.0, 0.0, 4.0)).unwrap();
        let (tref, tpt) = q.find_nearest_poly(Vec3::new(4.5, 0.0, 4.0)).unwrap();
        if sref == tref {
            let corridor = q.find_poly_path(sref, tref, spt, tpt);
            assert_eq!(corridor, vec![sref]);
            let path = q.find_straight_path(spt, tpt, &corridor);
            assert_eq!(path.len(), 2);
        }
    }

    #[test]
    fn test_node_ceiling_reports_no_path() {
        let (nav, _) = flat_world();
        let mut q = NavMeshQuery::new(&nav);
        q.set_max_nodes(2);
        let (sref, spt) = q.find_nearest_poly(Vec3::new(2.0, 0.0, 2.0)).unwrap();
        let (tref, tpt) = q.find_nearest_poly(Vec3::new(14.0, 0.0, 14.0)).unwrap();
        if sref != tref {
            let corridor = q.find_poly_path(sref, tref, spt, tpt);
            // With a two-node budget a multi-tile path cannot complete
            assert!(corridor.is_empty() || corridor.len() <= 2);
        }
    }
}
