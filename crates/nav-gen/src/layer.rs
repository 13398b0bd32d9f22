//! Serialized per-tile walkable layer.
//!
//! The layer is the unit the tile cache stores and the mesh assembler
//! stitches: the tile's polygon mesh, detail mesh and grid header packed
//! into a versioned little-endian byte blob.

use crate::detail::DetailMesh;
use crate::polymesh::{MeshPoly, MAX_VERTS_PER_POLY, NO_INDEX};
use glam::Vec3;
use nav_common::{Error, Result, TileCoord};

/// Magic tag at the start of every serialized layer ("NAVL")
pub const LAYER_MAGIC: u32 = 0x4e41_564c;
/// Serialized layer format version
pub const LAYER_VERSION: u32 = 1;

/// Grid and placement metadata of one tile layer
#[derive(Debug, Clone, Copy)]
pub struct LayerHeader {
    /// Tile x coordinate
    pub tx: i32,
    /// Tile z coordinate
    pub tz: i32,
    /// Tile width in cells, border excluded
    pub width: i32,
    /// Tile depth in cells, border excluded
    pub height: i32,
    /// World position of tile cell `(0, 0)`; `y` is the field minimum
    pub bmin: Vec3,
    /// World maximum of the tile's AABB
    pub bmax: Vec3,
    /// Cell size
    pub cs: f32,
    /// Cell height
    pub ch: f32,
}

impl LayerHeader {
    /// Tile coordinate of this layer
    pub fn coord(&self) -> TileCoord {
        TileCoord::new(self.tx, self.tz)
    }
}

/// One tile's walkable polygon layer
#[derive(Debug, Clone)]
pub struct TileLayer {
    /// Grid and placement metadata
    pub header: LayerHeader,
    /// Welded vertices in tile-local cell coordinates
    pub verts: Vec<[u16; 3]>,
    /// Convex polygons with internal adjacency
    pub polys: Vec<MeshPoly>,
    /// Height sampling mesh
    pub detail: DetailMesh,
}

impl TileLayer {
    /// Number of polygons in the layer. Zero is legal: the tile is walkable
    /// nowhere but still occupies its slot.
    pub fn poly_count(&self) -> usize {
        self.polys.len()
    }

    /// Serializes the layer into a little-endian byte blob.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            64 + self.verts.len() * 6 + self.polys.len() * 28 + self.detail.verts.len() * 12,
        );
        push_u32(&mut out, LAYER_MAGIC);
        push_u32(&mut out, LAYER_VERSION);
        push_i32(&mut out, self.header.tx);
        push_i32(&mut out, self.header.tz);
        push_i32(&mut out, self.header.width);
        push_i32(&mut out, self.header.height);
        for c in [self.header.bmin, self.header.bmax] {
            push_f32(&mut out, c.x);
            push_f32(&mut out, c.y);
            push_f32(&mut out, c.z);
        }
        push_f32(&mut out, self.header.cs);
        push_f32(&mut out, self.header.ch);

        push_u32(&mut out, self.verts.len() as u32);
        push_u32(&mut out, self.polys.len() as u32);
        push_u32(&mut out, self.detail.meshes.len() as u32);
        push_u32(&mut out, self.detail.verts.len() as u32);
        push_u32(&mut out, self.detail.tris.len() as u32);

        for v in &self.verts {
            for &c in v {
                push_u16(&mut out, c);
            }
        }
        for p in &self.polys {
            for &v in &p.verts {
                push_u16(&mut out, v);
            }
            for &n in &p.neis {
                push_u16(&mut out, n);
            }
            out.push(p.vert_count);
            out.push(p.area);
            push_u16(&mut out, p.reg);
        }
        for m in &self.detail.meshes {
            for &c in m {
                push_u32(&mut out, c);
            }
        }
        for v in &self.detail.verts {
            push_f32(&mut out, v.x);
            push_f32(&mut out, v.y);
            push_f32(&mut out, v.z);
        }
        for t in &self.detail.tris {
            for &c in t {
                push_u16(&mut out, c);
            }
        }
        out
    }

    /// Deserializes a layer, validating magic, version and counts.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);

        let magic = r.u32()?;
        if magic != LAYER_MAGIC {
            return Err(Error::TileCache(format!(
                "bad layer magic 0x{:08x}",
                magic
            )));
        }
        let version = r.u32()?;
        if version != LAYER_VERSION {
            return Err(Error::TileCache(format!(
                "unsupported layer version {}",
                version
            )));
        }

        let tx = r.i32()?;
        let tz = r.i32()?;
        let width = r.i32()?;
        let height = r.i32()?;
        let bmin = Vec3::new(r.f32()?, r.f32()?, r.f32()?);
        let bmax = Vec3::new(r.f32()?, r.f32()?, r.f32()?);
        let cs = r.f32()?;
        let ch = r.f32()?;

        let vert_count = r.u32()? as usize;
        let poly_count = r.u32()? as usize;
        let mesh_count = r.u32()? as usize;
        let dvert_count = r.u32()? as usize;
        let dtri_count = r.u32()? as usize;

        let mut verts = Vec::with_capacity(vert_count);
        for _ in 0..vert_count {
            verts.push([r.u16()?, r.u16()?, r.u16()?]);
        }

        let mut polys = Vec::with_capacity(poly_count);
        for _ in 0..poly_count {
            let mut p = MeshPoly {
                verts: [NO_INDEX; MAX_VERTS_PER_POLY],
                neis: [NO_INDEX; MAX_VERTS_PER_POLY],
                vert_count: 0,
                area: 0,
                reg: 0,
            };
            for v in p.verts.iter_mut() {
                *v = r.u16()?;
            }
            for n in p.neis.iter_mut() {
                *n = r.u16()?;
            }
            p.vert_count = r.u8()?;
            p.area = r.u8()?;
            p.reg = r.u16()?;
            if p.vert_count < 3 || p.vert_count as usize > MAX_VERTS_PER_POLY {
                return Err(Error::TileCache(format!(
                    "polygon with invalid vertex count {}",
                    p.vert_count
                )));
            }
            for &v in &p.verts[..p.vert_count as usize] {
                if v as usize >= vert_count {
                    return Err(Error::TileCache(format!(
                        "polygon vertex {} out of bounds",
                        v
                    )));
                }
            }
            polys.push(p);
        }

        let mut detail = DetailMesh::default();
        for _ in 0..mesh_count {
            detail.meshes.push([r.u32()?, r.u32()?, r.u32()?, r.u32()?]);
        }
        for _ in 0..dvert_count {
            detail.verts.push(Vec3::new(r.f32()?, r.f32()?, r.f32()?));
        }
        for _ in 0..dtri_count {
            detail.tris.push([r.u16()?, r.u16()?, r.u16()?]);
        }

        Ok(Self {
            header: LayerHeader {
                tx,
                tz,
                width,
                height,
                bmin,
                bmax,
                cs,
                ch,
            },
            verts,
            polys,
            detail,
        })
    }
}

fn push_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_u32(out: &mut Vec<u8>, v: u32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_i32(out: &mut Vec<u8>, v: i32) {
    out.extend_from_slice(&v.to_le_bytes());
}

fn push_f32(out: &mut Vec<u8>, v: f32) {
    out.extend_from_slice(&v.to_le_bytes());
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.pos + n > self.data.len() {
            return Err(Error::TileCache("truncated layer data".to_string()));
        }
        let s = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(s)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u16(&mut self) -> Result<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Result<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn f32(&mut self) -> Result<f32> {
        let b = self.take(4)?;
        Ok(f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_layer() -> TileLayer {
        let mut poly = MeshPoly {
            verts: [NO_INDEX; MAX_VERTS_PER_POLY],
            neis: [NO_INDEX; MAX_VERTS_PER_POLY],
            vert_count: 3,
            area: 1,
            reg: 1,
        };
        poly.verts[0] = 0;
        poly.verts[1] = 1;
        poly.verts[2] = 2;
        TileLayer {
            header: LayerHeader {
                tx: 2,
                tz: -1,
                width: 64,
                height: 64,
                bmin: Vec3::new(-5.0, -5.0, -5.0),
                bmax: Vec3::new(1.4, 5.0, 1.4),
                cs: 0.1,
                ch: 0.2,
            },
            verts: vec![[0, 25, 0], [10, 25, 0], [0, 25, 10]],
            polys: vec![poly],
            detail: DetailMesh {
                meshes: vec![[0, 3, 0, 1]],
                verts: vec![
                    Vec3::new(-5.0, 0.0, -5.0),
                    Vec3::new(-4.0, 0.0, -5.0),
                    Vec3::new(-5.0, 0.0, -4.0),
                ],
                tris: vec![[0, 1, 2]],
            },
        }
    }

    #[test]
    fn test_round_trip() {
        let layer = sample_layer();
        let bytes = layer.to_bytes();
        let back = TileLayer::from_bytes(&bytes).unwrap();
        assert_eq!(back.header.tx, 2);
        assert_eq!(back.header.tz, -1);
        assert_eq!(back.verts, layer.verts);
        assert_eq!(back.polys.len(), 1);
        assert_eq!(back.polys[0].vertices(), layer.polys[0].vertices());
        assert_eq!(back.detail.tris, layer.detail.tris);
    }

    #[test]
    fn test_rejects_bad_magic() {
        let mut bytes = sample_layer().to_bytes();
        bytes[0] ^= 0xff;
        assert!(TileLayer::from_bytes(&bytes).is_err());
    }

    #[test]
    fn test_rejects_truncated_data() {
        let bytes = sample_layer().to_bytes();
        assert!(TileLayer::from_bytes(&bytes[..bytes.len() - 3]).is_err());
    }
}
