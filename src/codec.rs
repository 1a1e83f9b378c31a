//! Payload compression
//!
//! Part files store compressed payloads; the codec is pluggable so tests
//! and callers can swap it, but the engine defaults to zstd.

use crate::error::{PackError, Result};

/// Compression codec applied to payloads before they hit a part file
pub trait Codec: Send + Sync {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// `uncompressed_len` is the length recorded in the payload header
    fn decompress(&self, data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>>;
}

/// zstd codec
#[derive(Debug, Clone, Copy)]
pub struct ZstdCodec {
    level: i32,
}

impl ZstdCodec {
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for ZstdCodec {
    fn default() -> Self {
        Self::new(zstd::DEFAULT_COMPRESSION_LEVEL)
    }
}

impl Codec for ZstdCodec {
    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(zstd::encode_all(data, self.level)?)
    }

    fn decompress(&self, data: &[u8], uncompressed_len: usize) -> Result<Vec<u8>> {
        let out = zstd::decode_all(data)?;
        if out.len() != uncompressed_len {
            return Err(PackError::Corruption(format!(
                "payload decompressed to {} bytes, header says {}",
                out.len(),
                uncompressed_len
            )));
        }
        Ok(out)
    }
}
