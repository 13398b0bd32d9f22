//! Triangle mesh input container.
//!
//! The level loader hands the subsystem one merged static collision mesh per
//! level; this type also loads OBJ files for the CLI and tests.

use crate::{Error, Result};
use glam::Vec3;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

/// A simple indexed triangle mesh in engine world space.
#[derive(Debug, Clone, Default)]
pub struct TriMesh {
    /// Vertex positions
    pub vertices: Vec<Vec3>,
    /// Vertex indices, 3 per triangle
    pub indices: Vec<u32>,
}

impl TriMesh {
    /// Creates a new empty triangle mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a mesh from vertex and index slices, validating the topology.
    pub fn from_slices(vertices: &[Vec3], indices: &[u32]) -> Result<Self> {
        if indices.len() % 3 != 0 {
            return Err(Error::InvalidMesh(
                "index count must be a multiple of 3".to_string(),
            ));
        }
        for &i in indices {
            if i as usize >= vertices.len() {
                return Err(Error::InvalidMesh(format!(
                    "triangle index {} out of bounds (vertex count {})",
                    i,
                    vertices.len()
                )));
            }
        }
        Ok(Self {
            vertices: vertices.to_vec(),
            indices: indices.to_vec(),
        })
    }

    /// Number of triangles in the mesh
    pub fn tri_count(&self) -> usize {
        self.indices.len() / 3
    }

    /// Vertices of triangle `i`
    pub fn triangle(&self, i: usize) -> (Vec3, Vec3, Vec3) {
        let a = self.vertices[self.indices[i * 3] as usize];
        let b = self.vertices[self.indices[i * 3 + 1] as usize];
        let c = self.vertices[self.indices[i * 3 + 2] as usize];
        (a, b, c)
    }

    /// Axis-aligned bounds of the mesh, or `None` when it has no vertices.
    pub fn bounds(&self) -> Option<(Vec3, Vec3)> {
        let first = *self.vertices.first()?;
        let mut bmin = first;
        let mut bmax = first;
        for &v in &self.vertices {
            bmin = bmin.min(v);
            bmax = bmax.max(v);
        }
        Some((bmin, bmax))
    }

    /// Loads a mesh from an OBJ file
    pub fn from_obj<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);

        let mut mesh = Self::new();
        for line in reader.lines() {
            let line = line?;
            mesh.parse_obj_line(&line)?;
        }
        Ok(mesh)
    }

    /// Parses OBJ content from an in-memory string
    pub fn from_obj_str(content: &str) -> Result<Self> {
        let mut mesh = Self::new();
        for line in content.lines() {
            mesh.parse_obj_line(line)?;
        }
        Ok(mesh)
    }

    fn parse_obj_line(&mut self, line: &str) -> Result<()> {
        let mut tokens = line.split_whitespace();
        match tokens.next() {
            Some("v") => {
                let mut coords = [0.0f32; 3];
                for c in coords.iter_mut() {
                    *c = tokens
                        .next()
                        .ok_or_else(|| {
                            Error::InvalidMesh("vertex with missing coordinate".to_string())
                        })?
                        .parse::<f32>()
                        .map_err(|_| {
                            Error::InvalidMesh("vertex coordinate is not a number".to_string())
                        })?;
                }
                self.vertices.push(Vec3::from_array(coords));
            }
            Some("f") => {
                // Faces may be polygons; triangulate as a fan. Indices are
                // 1-based and may carry /vt/vn suffixes.
                let mut face = Vec::new();
                for tok in tokens {
                    let idx_str = tok.split('/').next().unwrap_or("");
                    let idx = idx_str.parse::<i64>().map_err(|_| {
                        Error::InvalidMesh(format!("invalid face index '{}'", tok))
                    })?;
                    let resolved = if idx < 0 {
                        self.vertices.len() as i64 + idx
                    } else {
                        idx - 1
                    };
                    if resolved < 0 || resolved as usize >= self.vertices.len() {
                        return Err(Error::InvalidMesh(format!(
                            "face index {} out of bounds",
                            idx
                        )));
                    }
                    face.push(resolved as u32);
                }
                if face.len() < 3 {
                    return Err(Error::InvalidMesh(
                        "face with fewer than 3 vertices".to_string(),
                    ));
                }
                for i in 1..face.len() - 1 {
                    self.indices.push(face[0]);
                    self.indices.push(face[i]);
                    self.indices.push(face[i + 1]);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_obj_str() {
        let obj = "\
v 0.0 0.0 0.0
v 1.0 0.0 0.0
v 1.0 0.0 1.0
v 0.0 0.0 1.0
f 1 2 3 4
";
        let mesh = TriMesh::from_obj_str(obj).unwrap();
        assert_eq!(mesh.vertices.len(), 4);
        assert_eq!(mesh.tri_count(), 2);
        let (bmin, bmax) = mesh.bounds().unwrap();
        assert_eq!(bmin, Vec3::ZERO);
        assert_eq!(bmax, Vec3::new(1.0, 0.0, 1.0));
    }

    #[test]
    fn test_from_slices_rejects_bad_indices() {
        let verts = [Vec3::ZERO, Vec3::X, Vec3::Z];
        assert!(TriMesh::from_slices(&verts, &[0, 1, 2]).is_ok());
        assert!(TriMesh::from_slices(&verts, &[0, 1]).is_err());
        assert!(TriMesh::from_slices(&verts, &[0, 1, 3]).is_err());
    }

    #[test]
    fn test_empty_mesh_has_no_bounds() {
        assert!(TriMesh::new().bounds().is_none());
    }
}
