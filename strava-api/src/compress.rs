use flate2::Compression;
use flate2::write::GzEncoder;
use std::io::Write;

/// Compresses upload payloads. `None` means "send the original bytes".
pub trait Compressor: Send + Sync {
    fn compress(&self, bytes: &[u8]) -> Option<Vec<u8>>;
}

/// gzip (RFC 1952) at level 5
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: u32,
}

impl Default for GzipCompressor {
    fn default() -> Self {
        Self { level: 5 }
    }
}

impl GzipCompressor {
    pub fn with_level(level: u32) -> Self {
        Self {
            level: level.min(9),
        }
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, bytes: &[u8]) -> Option<Vec<u8>> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::new(self.level));
        match encoder.write_all(bytes).and_then(|_| encoder.finish()) {
            Ok(compressed) => Some(compressed),
            Err(e) => {
                tracing::warn!("gzip compression failed, sending uncompressed: {}", e);
                None
            }
        }
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoCompression;

impl Compressor for NoCompression {
    fn compress(&self, _bytes: &[u8]) -> Option<Vec<u8>> {
        None
    }
}
