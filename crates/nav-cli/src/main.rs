//! CLI utility for building and querying navigation surfaces.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use glam::Vec3;
use nav_common::TriMesh;
use nav_system::{AlwaysClear, NavSystemConfig, NavigationSystem};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

/// Build and query walkable navigation surfaces from OBJ geometry
#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct BuildParams {
    /// Input mesh file (OBJ format)
    #[clap(long, value_parser)]
    input: PathBuf,

    /// Cell size (horizontal voxel resolution)
    #[clap(long, default_value = "0.1")]
    cell_size: f32,

    /// Cell height (vertical voxel resolution)
    #[clap(long, default_value = "0.2")]
    cell_height: f32,

    /// Maximum walkable slope in degrees
    #[clap(long, default_value = "45.0")]
    max_slope: f32,

    /// Agent height in world units
    #[clap(long, default_value = "2.0")]
    agent_height: f32,

    /// Agent radius in world units
    #[clap(long, default_value = "0.5")]
    agent_radius: f32,

    /// Maximum ledge height the agent can climb, in world units
    #[clap(long, default_value = "0.9")]
    agent_climb: f32,

    /// Tile edge length in cells
    #[clap(long, default_value = "64")]
    tile_size: i32,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Build a navigation surface and report statistics
    Build {
        #[clap(flatten)]
        params: BuildParams,

        /// Write every navmesh edge as "x0 y0 z0 x1 y1 z1" lines
        #[clap(long, value_parser)]
        edges: Option<PathBuf>,
    },
    /// Build a navigation surface and query a path
    Path {
        #[clap(flatten)]
        params: BuildParams,

        /// Path start as "x,y,z"
        #[clap(long)]
        start: String,

        /// Path target as "x,y,z"
        #[clap(long)]
        target: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    match args.command {
        Commands::Build { params, edges } => build_command(params, edges),
        Commands::Path {
            params,
            start,
            target,
        } => path_command(params, &start, &target),
    }
}

fn build_system(params: &BuildParams) -> Result<NavigationSystem> {
    let mesh = TriMesh::from_obj(&params.input)
        .with_context(|| format!("failed to load {}", params.input.display()))?;
    if mesh.tri_count() == 0 {
        bail!("{} contains no triangles", params.input.display());
    }

    let config = NavSystemConfig::new()
        .with_cell_size(params.cell_size, params.cell_height)
        .with_agent(params.agent_height, params.agent_radius, params.agent_climb)
        .with_tile_size(params.tile_size);
    let system = NavigationSystem::new(config, Box::new(AlwaysClear))
        .context("invalid configuration")?;

    let started = Instant::now();
    system
        .build_all(&mesh.vertices, &mesh.indices)
        .context("surface build failed")?;
    println!(
        "built {} tiles / {} polygons from {} triangles in {:.2?}",
        system.tile_count(),
        system.poly_count(),
        mesh.tri_count(),
        started.elapsed()
    );
    Ok(system)
}

fn build_command(params: BuildParams, edges: Option<PathBuf>) -> Result<()> {
    let system = build_system(&params)?;

    if let Some(path) = edges {
        let mut file = File::create(&path)
            .with_context(|| format!("failed to create {}", path.display()))?;
        let mut count = 0usize;
        let mut io_err = None;
        system.for_each_edge(|a, b| {
            if io_err.is_some() {
                return;
            }
            if let Err(e) = writeln!(
                file,
                "{} {} {} {} {} {}",
                a.x, a.y, a.z, b.x, b.y, b.z
            ) {
                io_err = Some(e);
                return;
            }
            count += 1;
        });
        if let Some(e) = io_err {
            return Err(e).with_context(|| format!("failed to write {}", path.display()));
        }
        println!("wrote {} edges to {}", count, path.display());
    }
    Ok(())
}

fn path_command(params: BuildParams, start: &str, target: &str) -> Result<()> {
    let start = parse_vec3(start).context("invalid --start")?;
    let target = parse_vec3(target).context("invalid --target")?;

    let system = build_system(&params)?;
    let started = Instant::now();
    let path = system.find_path(start, target);
    let elapsed = started.elapsed();

    if path.is_empty() {
        println!("no path from {:?} to {:?} ({:.2?})", start, target, elapsed);
        return Ok(());
    }
    println!("{} waypoints ({:.2?}):", path.len(), elapsed);
    for (i, p) in path.iter().enumerate() {
        println!("  {:3}: {:8.3} {:8.3} {:8.3}", i, p.x, p.y, p.z);
    }
    Ok(())
}

fn parse_vec3(s: &str) -> Result<Vec3> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != 3 {
        bail!("expected three comma-separated numbers, got '{}'", s);
    }
    let mut coords = [0.0f32; 3];
    for (c, part) in coords.iter_mut().zip(&parts) {
        *c = part
            .parse::<f32>()
            .with_context(|| format!("'{}' is not a number", part))?;
    }
    Ok(Vec3::from_array(coords))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_vec3() {
        assert_eq!(
            parse_vec3("1.0, 2.5, -3").unwrap(),
            Vec3::new(1.0, 2.5, -3.0)
        );
        assert!(parse_vec3("1,2").is_err());
        assert!(parse_vec3("a,b,c").is_err());
    }
}
