//! Walkability filters applied to the voxel field after rasterization.
//!
//! The filters run in a fixed order: low-hanging obstacles first, then ledge
//! spans, then spans with too little clearance.

use crate::voxel::{VoxelField, MAX_SPAN_HEIGHT, NULL_AREA};
use crate::{DIR_OFFSET_X, DIR_OFFSET_Z};

/// Restores walkability of non-walkable spans that sit within climb distance
/// on top of a walkable span, so curbs and stair noses do not cut the floor.
pub fn filter_low_hanging_walkable_obstacles(field: &mut VoxelField, walkable_climb: i32) {
    for z in 0..field.height {
        for x in 0..field.width {
            let col = field.column_mut(x, z);
            let mut prev_walkable = false;
            let mut prev_area = NULL_AREA;
            let mut prev_max = 0;
            for s in col.iter_mut() {
                let walkable = s.area != NULL_AREA;
                if !walkable && prev_walkable && (s.smax - prev_max).abs() <= walkable_climb {
                    s.area = prev_area;
                }
                // Track the original walkability so the fix does not cascade
                prev_walkable = walkable;
                prev_area = s.area;
                prev_max = s.smax;
            }
        }
    }
}

/// Marks spans near a drop higher than the agent's max climb as non-walkable.
///
/// Also rejects spans whose accessible neighbor floors span more than the
/// climb height, which trims the rims of steep steps.
pub fn filter_ledge_spans(field: &mut VoxelField, walkable_height: i32, walkable_climb: i32) {
    let mut ledges: Vec<(i32, i32, usize)> = Vec::new();

    for z in 0..field.height {
        for x in 0..field.width {
            let col = field.column(x, z);
            for (i, s) in col.iter().enumerate() {
                if s.area == NULL_AREA {
                    continue;
                }
                let bot = s.smax;
                let top = col.get(i + 1).map_or(MAX_SPAN_HEIGHT, |n| n.smin);

                // Lowest reachable neighbor floor, relative to this span
                let mut minh = MAX_SPAN_HEIGHT;
                // Range of neighbor floors reachable within the climb height
                let mut asmin = bot;
                let mut asmax = bot;

                for dir in 0..4 {
                    let nx = x + DIR_OFFSET_X[dir];
                    let nz = z + DIR_OFFSET_Z[dir];
                    if nx < 0 || nx >= field.width || nz < 0 || nz >= field.height {
                        minh = minh.min(-walkable_climb - bot);
                        continue;
                    }

                    let ncol = field.column(nx, nz);
                    // Gap from the void below the first neighbor span
                    let mut nbot = -walkable_climb;
                    let mut ntop = ncol.first().map_or(MAX_SPAN_HEIGHT, |n| n.smin);
                    if top.min(ntop) - bot.max(nbot) > walkable_height {
                        minh = minh.min(nbot - bot);
                    }
                    for (j, ns) in ncol.iter().enumerate() {
                        nbot = ns.smax;
                        ntop = ncol.get(j + 1).map_or(MAX_SPAN_HEIGHT, |n| n.smin);
                        if top.min(ntop) - bot.max(nbot) > walkable_height {
                            minh = minh.min(nbot - bot);
                            if (nbot - bot).abs() <= walkable_climb {
                                asmin = asmin.min(nbot);
                                asmax = asmax.max(nbot);
                            }
                        }
                    }
                }

                if minh < -walkable_climb || (asmax - asmin) > walkable_climb {
                    ledges.push((x, z, i));
                }
            }
        }
    }

    for (x, z, i) in ledges {
        field.column_mut(x, z)[i].area = NULL_AREA;
    }
}

/// Marks spans with less than `walkable_height` clearance above them as
/// non-walkable.
pub fn filter_walkable_low_height_spans(field: &mut VoxelField, walkable_height: i32) {
    for z in 0..field.height {
        for x in 0..field.width {
            let col = field.column_mut(x, z);
            for i in 0..col.len() {
                let top = if i + 1 < col.len() {
                    col[i + 1].smin
                } else {
                    MAX_SPAN_HEIGHT
                };
                if top - col[i].smax < walkable_height {
                    col[i].area = NULL_AREA;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voxel::WALKABLE_AREA;
    use glam::Vec3;

    fn field(w: i32, h: i32) -> VoxelField {
        VoxelField::new(
            w,
            h,
            Vec3::ZERO,
            Vec3::new(w as f32, 100.0, h as f32),
            1.0,
            1.0,
        )
    }

    #[test]
    fn test_low_hanging_obstacle_becomes_walkable() {
        let mut f = field(3, 3);
        f.add_span(1, 1, 0, 10, WALKABLE_AREA, 0).unwrap();
        // A non-walkable lip two cells above the floor
        f.add_span(1, 1, 11, 12, NULL_AREA, 0).unwrap();
        filter_low_hanging_walkable_obstacles(&mut f, 2);
        assert_eq!(f.column(1, 1)[1].area, WALKABLE_AREA);
    }

    #[test]
    fn test_high_obstacle_stays_blocked() {
        let mut f = field(3, 3);
        f.add_span(1, 1, 0, 10, WALKABLE_AREA, 0).unwrap();
        f.add_span(1, 1, 14, 16, NULL_AREA, 0).unwrap();
        filter_low_hanging_walkable_obstacles(&mut f, 2);
        assert_eq!(f.column(1, 1)[1].area, NULL_AREA);
    }

    #[test]
    fn test_ledge_span_is_cleared() {
        // A single tall pillar surrounded by empty space is a ledge
        let mut f = field(5, 5);
        f.add_span(2, 2, 0, 10, WALKABLE_AREA, 0).unwrap();
        filter_ledge_spans(&mut f, 5, 2);
        assert_eq!(f.column(2, 2)[0].area, NULL_AREA);
    }

    #[test]
    fn test_flat_area_keeps_walkable_interior() {
        // A 5x5 plateau: the interior cell is no ledge
        let mut f = field(5, 5);
        for z in 0..5 {
            for x in 0..5 {
                f.add_span(x, z, 0, 2, WALKABLE_AREA, 0).unwrap();
            }
        }
        filter_ledge_spans(&mut f, 5, 2);
        assert_eq!(f.column(2, 2)[0].area, WALKABLE_AREA);
        // Cells on the grid edge drop into the void and are trimmed
        assert_eq!(f.column(0, 0)[0].area, NULL_AREA);
    }

    #[test]
    fn test_low_clearance_is_cleared() {
        let mut f = field(3, 3);
        f.add_span(1, 1, 0, 2, WALKABLE_AREA, 0).unwrap();
        // Ceiling three cells above the floor
        f.add_span(1, 1, 5, 8, NULL_AREA, 0).unwrap();
        filter_walkable_low_height_spans(&mut f, 5);
        assert_eq!(f.column(1, 1)[0].area, NULL_AREA);
        // The ceiling span itself has open sky above and is untouched
        assert_eq!(f.column(1, 1)[1].area, NULL_AREA);
    }
}
