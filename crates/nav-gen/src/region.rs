//! Watershed region partitioning of the compact field.
//!
//! Regions are grown from distance-field maxima outward so each region is a
//! locally-flat, connected patch of floor. Undersized regions are merged into
//! neighbors or discarded.

use crate::compact::{CompactField, BORDER_REG};
use nav_common::Result;
use std::collections::{HashMap, HashSet};

/// Builds the distance-to-boundary field used to seed watershed growth.
pub fn build_distance_field(cf: &mut CompactField) {
    let w = cf.width;
    let h = cf.height;
    let n = (w * h) as usize;
    let mut dist = vec![u16::MAX; n];

    // Boundary cells sit next to a wall or a non-traversable step
    for z in 0..h {
        for x in 0..w {
            let i = cf.index(x, z);
            if cf.cells[i].is_none() {
                dist[i] = 0;
                continue;
            }
            for dir in 0..4 {
                if cf.connected(x, z, dir).is_none() {
                    dist[i] = 0;
                    break;
                }
            }
        }
    }

    let step = |dist: &[u16], x: i32, z: i32, dx: i32, dz: i32, cost: u16| -> Option<u16> {
        let cell = cf.cell(x, z)?;
        let ncell = cf.cell(x + dx, z + dz)?;
        if (ncell.y - cell.y).abs() > cf.walkable_climb {
            return None;
        }
        Some(dist[cf.index(x + dx, z + dz)].saturating_add(cost))
    };

    // Forward pass
    for z in 0..h {
        for x in 0..w {
            let i = cf.index(x, z);
            if dist[i] == 0 {
                continue;
            }
            let mut d = dist[i];
            for &(dx, dz, cost) in &[(-1, 0, 2), (-1, -1, 3), (0, -1, 2), (1, -1, 3)] {
                if let Some(nd) = step(&dist, x, z, dx, dz, cost) {
                    d = d.min(nd);
                }
            }
            dist[i] = d;
        }
    }
    // Backward pass
    for z in (0..h).rev() {
        for x in (0..w).rev() {
            let i = cf.index(x, z);
            if dist[i] == 0 {
                continue;
            }
            let mut d = dist[i];
            for &(dx, dz, cost) in &[(1, 0, 2), (1, 1, 3), (0, 1, 2), (-1, 1, 3)] {
                if let Some(nd) = step(&dist, x, z, dx, dz, cost) {
                    d = d.min(nd);
                }
            }
            dist[i] = d;
        }
    }

    // Light box blur to smooth watershed plateaus
    let mut blurred = dist.clone();
    for z in 0..h {
        for x in 0..w {
            let i = cf.index(x, z);
            let Some(cell) = cf.cells[i] else { continue };
            let d = dist[i];
            if d <= 2 {
                continue;
            }
            let mut sum = d as u32;
            for dz in -1..=1 {
                for dx in -1..=1 {
                    if dx == 0 && dz == 0 {
                        continue;
                    }
                    let contribution = match cf.cell(x + dx, z + dz) {
                        Some(nc) if (nc.y - cell.y).abs() <= cf.walkable_climb => {
                            dist[cf.index(x + dx, z + dz)]
                        }
                        _ => d,
                    };
                    sum += contribution as u32;
                }
            }
            blurred[i] = (sum / 9) as u16;
        }
    }

    let mut max_dist = 0;
    for z in 0..h {
        for x in 0..w {
            let i = cf.index(x, z);
            if let Some(cell) = cf.cells[i].as_mut() {
                cell.dist = blurred[i];
                max_dist = max_dist.max(blurred[i]);
            }
        }
    }
    cf.max_dist = max_dist;
}

/// Partitions the walkable cells into watershed regions and merges or
/// discards regions below the area thresholds. A field with no walkable
/// interior yields zero regions, which is a legal result.
pub fn build_regions(
    cf: &mut CompactField,
    min_region_area: i32,
    merge_region_area: i32,
) -> Result<()> {
    let w = cf.width;
    let h = cf.height;

    // The border ring never produces polygons
    for z in 0..h {
        for x in 0..w {
            if cf.in_border(x, z) {
                let i = cf.index(x, z);
                if let Some(cell) = cf.cells[i].as_mut() {
                    cell.reg = BORDER_REG;
                }
            }
        }
    }

    let mut next_region: u16 = 1;
    let mut level = (((cf.max_dist + 1) & !1) as i32).max(2);
    while level > 0 {
        level -= 2;
        let lvl = level.max(0) as u16;

        expand_regions(cf, lvl);

        // Seed new regions from still-unassigned cells at this water level
        for z in 0..h {
            for x in 0..w {
                let i = cf.index(x, z);
                let Some(cell) = cf.cells[i] else { continue };
                if cell.reg != 0 || cell.dist < lvl {
                    continue;
                }
                if flood_region(cf, x, z, lvl, next_region) > 0 {
                    next_region = next_region.checked_add(1).unwrap_or(next_region);
                }
            }
        }
    }

    merge_and_filter_regions(cf, min_region_area, merge_region_area, &mut next_region);
    cf.max_region = next_region;
    Ok(())
}

/// Grows existing regions into unassigned cells with `dist >= level`.
fn expand_regions(cf: &mut CompactField, level: u16) {
    loop {
        let mut changes: Vec<(usize, u16)> = Vec::new();
        for z in 0..cf.height {
            for x in 0..cf.width {
                let i = cf.index(x, z);
                let Some(cell) = cf.cells[i] else { continue };
                if cell.reg != 0 || cell.dist < level {
                    continue;
                }
                for dir in 0..4 {
                    if let Some((nx, nz)) = cf.connected(x, z, dir) {
                        let nreg = cf.cells[cf.index(nx, nz)].map_or(0, |c| c.reg);
                        if nreg != 0 && nreg & BORDER_REG == 0 {
                            changes.push((i, nreg));
                            break;
                        }
                    }
                }
            }
        }
        if changes.is_empty() {
            break;
        }
        for (i, reg) in changes {
            if let Some(cell) = cf.cells[i].as_mut() {
                cell.reg = reg;
            }
        }
    }
}

/// Flood-fills a new region over connected unassigned cells at or above the
/// given water level. Returns the number of cells claimed.
fn flood_region(cf: &mut CompactField, x: i32, z: i32, level: u16, reg: u16) -> usize {
    let mut stack = vec![(x, z)];
    let mut count = 0;

    let start = cf.index(x, z);
    if let Some(cell) = cf.cells[start].as_mut() {
        cell.reg = reg;
        count += 1;
    }

    while let Some((cx, cz)) = stack.pop() {
        for dir in 0..4 {
            if let Some((nx, nz)) = cf.connected(cx, cz, dir) {
                let ni = cf.index(nx, nz);
                let Some(ncell) = cf.cells[ni] else { continue };
                if ncell.reg == 0 && ncell.dist >= level {
                    if let Some(c) = cf.cells[ni].as_mut() {
                        c.reg = reg;
                    }
                    count += 1;
                    stack.push((nx, nz));
                }
            }
        }
    }
    count
}

/// Merges undersized regions into neighbors and discards isolated specks,
/// then compacts region ids. Regions below `min_region_area` with no
/// neighbor are cleared to non-walkable.
fn merge_and_filter_regions(
    cf: &mut CompactField,
    min_region_area: i32,
    merge_region_area: i32,
    next_region: &mut u16,
) {
    loop {
        let (sizes, neighbors) = region_stats(cf);
        if sizes.is_empty() {
            break;
        }

        // Smallest region below the hard minimum goes first; ties break on
        // the region id so rebuilds are reproducible
        let too_small = sizes
            .iter()
            .filter(|(_, &s)| s < min_region_area)
            .min_by_key(|(&r, &s)| (s, r))
            .map(|(&r, _)| r);
        if let Some(rid) = too_small {
            let target = largest_neighbor(&sizes, &neighbors, rid).unwrap_or(0);
            remap_region(cf, rid, target);
            continue;
        }

        // Then opportunistic merging of small regions into their largest
        // neighbor
        let mergeable = sizes
            .iter()
            .filter(|(&r, &s)| {
                s < merge_region_area && largest_neighbor(&sizes, &neighbors, r).is_some()
            })
            .min_by_key(|(&r, &s)| (s, r))
            .map(|(&r, _)| r);
        if let Some(rid) = mergeable {
            let target = largest_neighbor(&sizes, &neighbors, rid).unwrap_or(0);
            remap_region(cf, rid, target);
            continue;
        }
        break;
    }

    // Compact ids to 1..=n
    let mut remap: HashMap<u16, u16> = HashMap::new();
    let mut counter: u16 = 1;
    for cell in cf.cells.iter_mut().flatten() {
        if cell.reg == 0 || cell.reg & BORDER_REG != 0 {
            continue;
        }
        let new = *remap.entry(cell.reg).or_insert_with(|| {
            let id = counter;
            counter += 1;
            id
        });
        cell.reg = new;
    }
    *next_region = counter;
}

fn region_stats(cf: &CompactField) -> (HashMap<u16, i32>, HashMap<u16, HashSet<u16>>) {
    let mut sizes: HashMap<u16, i32> = HashMap::new();
    let mut neighbors: HashMap<u16, HashSet<u16>> = HashMap::new();
    for z in 0..cf.height {
        for x in 0..cf.width {
            let Some(cell) = cf.cell(x, z) else { continue };
            let r = cell.reg;
            if r == 0 || r & BORDER_REG != 0 {
                continue;
            }
            *sizes.entry(r).or_insert(0) += 1;
            for dir in 0..4 {
                if let Some((nx, nz)) = cf.connected(x, z, dir) {
                    if let Some(ncell) = cf.cell(nx, nz) {
                        let nr = ncell.reg;
                        if nr != 0 && nr != r && nr & BORDER_REG == 0 {
                            neighbors.entry(r).or_default().insert(nr);
                        }
                    }
                }
            }
        }
    }
    (sizes, neighbors)
}

fn largest_neighbor(
    sizes: &HashMap<u16, i32>,
    neighbors: &HashMap<u16, HashSet<u16>>,
    rid: u16,
) -> Option<u16> {
    neighbors
        .get(&rid)?
        .iter()
        .max_by_key(|&&n| (sizes.get(&n).copied().unwrap_or(0), n))
        .copied()
}

/// Reassigns every cell of region `from` to region `to`. Remapping to 0
/// discards the region; its cells produce no polygons.
fn remap_region(cf: &mut CompactField, from: u16, to: u16) {
    for cell in cf.cells.iter_mut().flatten() {
        if cell.reg == from {
            cell.reg = to;
        }
    }
}
