/*!
Compression adapters for the compressed binary format.

The format layer hands the fully encoded binary snapshot to a
[`CompressionAdapter`] and gets the stored bytes back. The default adapter is
gzip; [`NoCompression`] passes bytes through untouched.
*/

use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use crate::{Result, SnapshotError};

/// Compression abstraction used by [`SnapshotFormat::CompressedBinary`](crate::SnapshotFormat).
pub trait CompressionAdapter {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>>;

    /// Name of the algorithm, recorded in save reports.
    fn algorithm_name(&self) -> &str;
}

/// Gzip (DEFLATE) compressor.
///
/// The gzip header carries no timestamp, so compressing the same snapshot
/// twice yields identical bytes.
///
/// # Example
/// ```rust
/// use snapgraph_core::{CompressionAdapter, GzipCompressor};
///
/// let compressor = GzipCompressor::with_level(9);
/// let packed = compressor.compress(b"templates components templates components")?;
/// assert_eq!(compressor.decompress(&packed)?, b"templates components templates components");
/// # Ok::<(), snapgraph_core::SnapshotError>(())
/// ```
#[derive(Debug, Clone)]
pub struct GzipCompressor {
    compression_level: Compression,
}

impl GzipCompressor {
    /// Gzip with the default level (6).
    pub fn new() -> Self {
        Self {
            compression_level: Compression::default(),
        }
    }

    /// Gzip with an explicit level, clamped to 0-9.
    pub fn with_level(level: u32) -> Self {
        Self {
            compression_level: Compression::new(level.min(9)),
        }
    }

    pub fn fast() -> Self {
        Self::with_level(1)
    }

    pub fn max() -> Self {
        Self::with_level(9)
    }

    pub fn level(&self) -> u32 {
        self.compression_level.level()
    }
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionAdapter for GzipCompressor {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), self.compression_level);

        encoder.write_all(data).map_err(|e| {
            SnapshotError::compression(format!("Failed to write snapshot for compression: {e}"))
        })?;

        encoder
            .finish()
            .map_err(|e| SnapshotError::compression(format!("Failed to finish compression: {e}")))
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        let mut decoder = GzDecoder::new(compressed_data);
        let mut decompressed = Vec::new();

        decoder.read_to_end(&mut decompressed).map_err(|e| {
            SnapshotError::compression(format!("Failed to decompress snapshot: {e}"))
        })?;

        Ok(decompressed)
    }

    fn algorithm_name(&self) -> &str {
        "gzip"
    }
}

/// Pass-through adapter.
#[derive(Debug, Clone, Default)]
pub struct NoCompression;

impl NoCompression {
    pub fn new() -> Self {
        Self
    }
}

impl CompressionAdapter for NoCompression {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, compressed_data: &[u8]) -> Result<Vec<u8>> {
        Ok(compressed_data.to_vec())
    }

    fn algorithm_name(&self) -> &str {
        "none"
    }
}
