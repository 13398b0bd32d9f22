//! Compact floor-cell field.
//!
//! The voxel field is reduced to at most one walkable floor per column. Each
//! floor cell records its height, the clearance above it and, after
//! partitioning, the region it belongs to.

use crate::voxel::{VoxelField, MAX_SPAN_HEIGHT, NULL_AREA};
use crate::{DIR_OFFSET_X, DIR_OFFSET_Z};
use glam::Vec3;

/// Region id flag marking the tile's rasterization border. Border cells are
/// walkable but never produce polygons; they exist so erosion and region
/// growth see the same neighborhood at tile seams as in the interior.
pub const BORDER_REG: u16 = 0x8000;

/// One walkable floor cell
#[derive(Debug, Clone, Copy)]
pub struct FloorCell {
    /// Floor height, in cells above the field minimum
    pub y: i32,
    /// Free space above the floor, in cells
    pub clearance: i32,
    /// Area id of the floor
    pub area: u8,
    /// Region id assigned by the partitioner (0 = unassigned)
    pub reg: u16,
    /// Distance-field value used during watershed growth
    pub dist: u16,
}

/// A 2D grid of optional floor cells for one tile (border included)
#[derive(Debug)]
pub struct CompactField {
    /// Width of the field along the x-axis, in cells
    pub width: i32,
    /// Depth of the field along the z-axis, in cells
    pub height: i32,
    /// Minimum bounds of the field's AABB
    pub bmin: Vec3,
    /// Maximum bounds of the field's AABB
    pub bmax: Vec3,
    /// Cell size (horizontal resolution)
    pub cs: f32,
    /// Cell height (vertical resolution)
    pub ch: f32,
    /// Minimum clearance for standing, in cells
    pub walkable_height: i32,
    /// Maximum traversable step, in cells
    pub walkable_climb: i32,
    /// Border width, in cells
    pub border_size: i32,
    /// Floor cells, row-major; `None` where the column is not walkable
    pub cells: Vec<Option<FloorCell>>,
    /// Highest distance-field value
    pub max_dist: u16,
    /// One past the highest region id in use
    pub max_region: u16,
}

impl CompactField {
    /// Builds the compact field from a filtered voxel field, keeping the
    /// lowest walkable span of every column as its floor.
    pub fn from_voxel_field(
        field: &VoxelField,
        walkable_height: i32,
        walkable_climb: i32,
        border_size: i32,
    ) -> Self {
        let mut cells = vec![None; (field.width * field.height) as usize];
        for z in 0..field.height {
            for x in 0..field.width {
                let col = field.column(x, z);
                for (i, s) in col.iter().enumerate() {
                    if s.area == NULL_AREA {
                        continue;
                    }
                    let clearance = col
                        .get(i + 1)
                        .map_or(MAX_SPAN_HEIGHT, |n| n.smin - s.smax);
                    if clearance < walkable_height {
                        continue;
                    }
                    cells[(x + z * field.width) as usize] = Some(FloorCell {
                        y: s.smax,
                        clearance,
                        area: s.area,
                        reg: 0,
                        dist: 0,
                    });
                    break;
                }
            }
        }

        Self {
            width: field.width,
            height: field.height,
            bmin: field.bmin,
            bmax: field.bmax,
            cs: field.cs,
            ch: field.ch,
            walkable_height,
            walkable_climb,
            border_size,
            cells,
            max_dist: 0,
            max_region: 0,
        }
    }

    #[inline]
    pub(crate) fn index(&self, x: i32, z: i32) -> usize {
        (x + z * self.width) as usize
    }

    /// Floor cell at `(x, z)`, if the column is walkable
    pub fn cell(&self, x: i32, z: i32) -> Option<&FloorCell> {
        if x < 0 || x >= self.width || z < 0 || z >= self.height {
            return None;
        }
        self.cells[self.index(x, z)].as_ref()
    }

    /// Neighbor coordinates in direction `dir` when the step between the two
    /// floors is traversable.
    pub fn connected(&self, x: i32, z: i32, dir: usize) -> Option<(i32, i32)> {
        let cell = self.cell(x, z)?;
        let nx = x + DIR_OFFSET_X[dir];
        let nz = z + DIR_OFFSET_Z[dir];
        let ncell = self.cell(nx, nz)?;
        if (ncell.y - cell.y).abs() <= self.walkable_climb {
            Some((nx, nz))
        } else {
            None
        }
    }

    /// Number of walkable floor cells
    pub fn walkable_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    /// Erodes the walkable area inward by `radius` cells, so no remaining
    /// floor places an agent's center within collision distance of a wall.
    pub fn erode_walkable_area(&mut self, radius: i32) {
        let w = self.width;
        let h = self.height;
        let n = (w * h) as usize;

        // Distance to the nearest non-walkable cell, in half-cell steps
        let mut dist = vec![255u8; n];
        for z in 0..h {
            for x in 0..w {
                let i = self.index(x, z);
                if self.cells[i].is_none() {
                    dist[i] = 0;
                    continue;
                }
                let mut boundary = false;
                for dir in 0..4 {
                    if self.connected(x, z, dir).is_none() {
                        boundary = true;
                        break;
                    }
                }
                if boundary {
                    dist[i] = 0;
                }
            }
        }

        // Forward pass: (-1, 0), (-1, -1), (0, -1), (1, -1)
        for z in 0..h {
            for x in 0..w {
                let i = self.index(x, z);
                if dist[i] == 0 {
                    continue;
                }
                let mut d = dist[i];
                for &(dx, dz, cost) in
                    &[(-1, 0, 2), (-1, -1, 3), (0, -1, 2), (1, -1, 3)]
                {
                    if let Some(nd) = self.step_dist(&dist, x, z, dx, dz, cost) {
                        d = d.min(nd);
                    }
                }
                dist[i] = d;
            }
        }
        // Backward pass: (1, 0), (1, 1), (0, 1), (-1, 1)
        for z in (0..h).rev() {
            for x in (0..w).rev() {
                let i = self.index(x, z);
                if dist[i] == 0 {
                    continue;
                }
                let mut d = dist[i];
                for &(dx, dz, cost) in &[(1, 0, 2), (1, 1, 3), (0, 1, 2), (-1, 1, 3)] {
                    if let Some(nd) = self.step_dist(&dist, x, z, dx, dz, cost) {
                        d = d.min(nd);
                    }
                }
                dist[i] = d;
            }
        }

        let threshold = (radius * 2).min(254) as u8;
        for i in 0..n {
            if dist[i] < threshold {
                self.cells[i] = None;
            }
        }
    }

    /// Distance propagated from the neighbor at `(x + dx, z + dz)`, when that
    /// neighbor is a traversable floor.
    fn step_dist(
        &self,
        dist: &[u8],
        x: i32,
        z: i32,
        dx: i32,
        dz: i32,
        cost: u8,
    ) -> Option<u8> {
        let nx = x + dx;
        let nz = z + dz;
        let cell = self.cell(x, z)?;
        let ncell = self.cell(nx, nz)?;
        if (ncell.y - cell.y).abs() > self.walkable_climb {
            return None;
        }
        Some(dist[self.index(nx, nz)].saturating_add(cost))
    }

    /// Whether `(x, z)` lies in the rasterization border ring
    pub fn in_border(&self, x: i32, z: i32) -> bool {
        x < self.border_size
            || z < self.border_size
            || x >= self.width - self.border_size
            || z >= self.height - self.border_size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::WALKABLE_AREA;

    fn plateau(w: i32, h: i32) -> CompactField {
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
        CompactField::from_voxel_field(&f, 5, 2, 0)
    }

    #[test]
    fn test_from_voxel_field_keeps_lowest_walkable() {
        let mut f = VoxelField::new(2, 1, Vec3::ZERO, Vec3::new(2.0, 50.0, 1.0), 1.0, 1.0);
        f.add_span(0, 0, 0, 2, WALKABLE_AREA, 0).unwrap();
        f.add_span(0, 0, 20, 22, WALKABLE_AREA, 0).unwrap();
        let cf = CompactField::from_voxel_field(&f, 5, 2, 0);
        assert_eq!(cf.cell(0, 0).unwrap().y, 2);
        assert!(cf.cell(1, 0).is_none());
    }

    #[test]
    fn test_connected_respects_climb() {
        let mut f = VoxelField::new(2, 1, Vec3::ZERO, Vec3::new(2.0, 50.0, 1.0), 1.0, 1.0);
        f.add_span(0, 0, 0, 2, WALKABLE_AREA, 0).unwrap();
        f.add_span(1, 0, 0, 10, WALKABLE_AREA, 0).unwrap();
        let cf = CompactField::from_voxel_field(&f, 5, 2, 0);
        // Step of 8 cells exceeds the climb of 2
        assert!(cf.connected(0, 0, 2).is_none());
    }

    #[test]
    fn test_erosion_removes_rim() {
        let mut cf = plateau(9, 9);
        assert_eq!(cf.walkable_count(), 81);
        cf.erode_walkable_area(2);
        // A two-cell rim is gone, the 5x5 core remains
        assert_eq!(cf.walkable_count(), 25);
        assert!(cf.cell(4, 4).is_some());
        assert!(cf.cell(1, 4).is_none());
    }

    #[test]
    fn test_erosion_can_remove_everything() {
        let mut cf = plateau(4, 4);
        cf.erode_walkable_area(3);
        assert_eq!(cf.walkable_count(), 0);
    }
}
