//! Pluggable compression for stored tile layers.

use nav_common::{Error, Result};

/// Compression strategy applied to serialized tile layers before they enter
/// the cache.
pub trait LayerCompressor: Send + Sync {
    /// Compresses a serialized layer
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decompresses a stored layer
    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// The default strategy: stores layers uncompressed. Always available, so
/// the cache has no mandatory external compression dependency.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassthroughCompressor;

impl LayerCompressor for PassthroughCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// LZ4 compression with a prepended size, for levels with many tiles.
#[cfg(feature = "lz4")]
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Compressor;

#[cfg(feature = "lz4")]
impl LayerCompressor for Lz4Compressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress_prepend_size(data))
    }

    fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        lz4_flex::decompress_size_prepended(data).map_err(|e| {
            log::error!("LZ4 decompression failed: {:?}", e);
            Error::TileCache(format!("layer decompression failed: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passthrough_round_trip() {
        let c = PassthroughCompressor;
        let data = vec![1u8, 2, 3, 4, 5];
        let packed = c.compress(&data).unwrap();
        assert_eq!(packed, data);
        assert_eq!(c.decompress(&packed).unwrap(), data);
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn test_lz4_round_trip() {
        let c = Lz4Compressor;
        let data = vec![7u8; 4096];
        let packed = c.compress(&data).unwrap();
        assert!(packed.len() < data.len());
        assert_eq!(c.decompress(&packed).unwrap(), data);
    }

    #[cfg(feature = "lz4")]
    #[test]
    fn test_lz4_rejects_garbage() {
        let c = Lz4Compressor;
        assert!(c.decompress(&[0xff, 0xfe, 0xfd]).is_err());
    }
}
