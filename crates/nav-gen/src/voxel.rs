//! Voxel span field for one tile.
//!
//! Each grid column holds a height-ordered list of solid spans. Spans carry
//! an area id; `NULL_AREA` marks geometry that blocks movement but cannot be
//! walked on.

use glam::Vec3;
use nav_common::{Error, Result};

/// Area id for non-walkable voxels
pub const NULL_AREA: u8 = 0;
/// Area id for walkable voxels
pub const WALKABLE_AREA: u8 = 1;

/// Largest representable span height, in cells
pub const MAX_SPAN_HEIGHT: i32 = 0xffff;

/// A solid vertical segment of one voxel column
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    /// Bottom of the span, in cells above the field minimum
    pub smin: i32,
    /// Top of the span, in cells above the field minimum
    pub smax: i32,
    /// Area id of the surface at the top of the span
    pub area: u8,
}

/// A grid of voxel span columns covering one tile (border included)
#[derive(Debug)]
pub struct VoxelField {
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
    columns: Vec<Vec<Span>>,
}

impl VoxelField {
    /// Creates a new empty field
    pub fn new(width: i32, height: i32, bmin: Vec3, bmax: Vec3, cs: f32, ch: f32) -> Self {
        Self {
            width,
            height,
            bmin,
            bmax,
            cs,
            ch,
            columns: vec![Vec::new(); (width * height) as usize],
        }
    }

    #[inline]
    fn column_index(&self, x: i32, z: i32) -> usize {
        (x + z * self.width) as usize
    }

    /// Spans of the column at `(x, z)`, bottom to top
    pub fn column(&self, x: i32, z: i32) -> &[Span] {
        &self.columns[self.column_index(x, z)]
    }

    /// Mutable spans of the column at `(x, z)`
    pub(crate) fn column_mut(&mut self, x: i32, z: i32) -> &mut Vec<Span> {
        let idx = self.column_index(x, z);
        &mut self.columns[idx]
    }

    /// Total number of spans in the field
    pub fn span_count(&self) -> usize {
        self.columns.iter().map(Vec::len).sum()
    }

    /// Adds a span to the column at `(x, z)`, merging it with any spans it
    /// overlaps. When merged span tops are within `merge_threshold` cells the
    /// more permissive (higher) area id wins, so a thin non-walkable sliver
    /// cannot mask a walkable surface at the same height.
    pub fn add_span(
        &mut self,
        x: i32,
        z: i32,
        smin: i32,
        smax: i32,
        area: u8,
        merge_threshold: i32,
    ) -> Result<()> {
        if x < 0 || x >= self.width || z < 0 || z >= self.height {
            return Err(Error::Generation(format!(
                "span position ({}, {}) out of bounds",
                x, z
            )));
        }
        if smin > smax {
            return Err(Error::Generation(format!(
                "invalid span heights: min {} > max {}",
                smin, smax
            )));
        }

        let idx = self.column_index(x, z);
        let col = &mut self.columns[idx];

        let mut smin = smin;
        let mut smax = smax;
        let mut area = area;

        // Skip spans strictly below the new one
        let mut i = 0;
        while i < col.len() && col[i].smax < smin {
            i += 1;
        }
        // Merge every span that overlaps or touches the new one
        while i < col.len() && col[i].smin <= smax {
            let s = col.remove(i);
            if (s.smax - smax).abs() <= merge_threshold {
                area = area.max(s.area);
            }
            smin = smin.min(s.smin);
            smax = smax.max(s.smax);
        }
        col.insert(i, Span { smin, smax, area });
        Ok(())
    }

    /// Clears the walkable area of every span whose floor lies inside the
    /// given world-space box. Used to subtract temporary obstacles before a
    /// tile is re-partitioned.
    pub fn clear_walkable_in_box(&mut self, obmin: Vec3, obmax: Vec3) {
        if obmax.x < self.bmin.x
            || obmin.x > self.bmax.x
            || obmax.z < self.bmin.z
            || obmin.z > self.bmax.z
        {
            return;
        }
        let x0 = (((obmin.x - self.bmin.x) / self.cs).floor() as i32).clamp(0, self.width - 1);
        let x1 = (((obmax.x - self.bmin.x) / self.cs).floor() as i32).clamp(0, self.width - 1);
        let z0 = (((obmin.z - self.bmin.z) / self.cs).floor() as i32).clamp(0, self.height - 1);
        let z1 = (((obmax.z - self.bmin.z) / self.cs).floor() as i32).clamp(0, self.height - 1);

        for z in z0..=z1 {
            for x in x0..=x1 {
                let base_y = self.bmin.y;
                let ch = self.ch;
                for s in self.column_mut(x, z).iter_mut() {
                    let floor_y = base_y + s.smax as f32 * ch;
                    if s.area != NULL_AREA && floor_y >= obmin.y && floor_y <= obmax.y {
                        s.area = NULL_AREA;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field() -> VoxelField {
        VoxelField::new(
            4,
            4,
            Vec3::ZERO,
            Vec3::new(4.0, 10.0, 4.0),
            1.0,
            1.0,
        )
    }

    #[test]
    fn test_add_span_keeps_order() {
        let mut f = field();
        f.add_span(1, 1, 10, 12, WALKABLE_AREA, 1).unwrap();
        f.add_span(1, 1, 0, 2, WALKABLE_AREA, 1).unwrap();
        f.add_span(1, 1, 5, 6, NULL_AREA, 1).unwrap();
        let col = f.column(1, 1);
        assert_eq!(col.len(), 3);
        assert_eq!(col[0].smin, 0);
        assert_eq!(col[1].smin, 5);
        assert_eq!(col[2].smin, 10);
    }

    #[test]
    fn test_add_span_merges_overlap() {
        let mut f = field();
        f.add_span(0, 0, 0, 4, WALKABLE_AREA, 1).unwrap();
        f.add_span(0, 0, 3, 6, NULL_AREA, 1).unwrap();
        let col = f.column(0, 0);
        assert_eq!(col.len(), 1);
        assert_eq!(col[0].smin, 0);
        assert_eq!(col[0].smax, 6);
        // Tops differ by more than the merge threshold: the new area wins
        assert_eq!(col[0].area, NULL_AREA);
    }

    #[test]
    fn test_add_span_merge_keeps_walkable_within_threshold() {
        let mut f = field();
        f.add_span(0, 0, 0, 4, WALKABLE_AREA, 1).unwrap();
        f.add_span(0, 0, 2, 5, NULL_AREA, 1).unwrap();
        let col = f.column(0, 0);
        assert_eq!(col.len(), 1);
        // Tops within one cell of each other: the walkable area survives
        assert_eq!(col[0].area, WALKABLE_AREA);
    }

    #[test]
    fn test_add_span_rejects_out_of_bounds() {
        let mut f = field();
        assert!(f.add_span(9, 0, 0, 1, WALKABLE_AREA, 1).is_err());
        assert!(f.add_span(0, 0, 3, 1, WALKABLE_AREA, 1).is_err());
    }

    #[test]
    fn test_clear_walkable_in_box() {
        let mut f = field();
        f.add_span(2, 2, 0, 3, WALKABLE_AREA, 1).unwrap();
        // Box covering the span floor (world y = 3.0)
        f.clear_walkable_in_box(Vec3::new(1.5, 2.0, 1.5), Vec3::new(2.5, 4.0, 2.5));
        assert_eq!(f.column(2, 2)[0].area, NULL_AREA);
    }

    #[test]
    fn test_clear_walkable_in_box_misses_above() {
        let mut f = field();
        f.add_span(2, 2, 0, 3, WALKABLE_AREA, 1).unwrap();
        // Box floats above the span floor
        f.clear_walkable_in_box(Vec3::new(1.5, 6.0, 1.5), Vec3::new(2.5, 8.0, 2.5));
        assert_eq!(f.column(2, 2)[0].area, WALKABLE_AREA);
    }
}
