//! LZ4 compression for pooled content and message logs
//!
//! ## Overview
//!
//! Everything the snapshot store persists as bulk bytes (file content blobs
//! and per-checkpoint message logs) passes through this engine. LZ4 keeps
//! compression cheap enough to run inline on the calling thread.
//!
//! ## Format
//!
//! Stored data carries a 4-byte header:
//! - `LZ4R`: LZ4 block data (with prepended size) follows
//! - `\0\0\0\0`: raw data follows
//!
//! Inputs that are tiny or that do not shrink are stored raw, so
//! decompression is always transparent regardless of what the strategy
//! decided at write time.

use crate::error::{Result, RewindError};
use lz4_flex::{compress_prepend_size, decompress_size_prepended};
use tracing::trace;

/// Magic bytes identifying LZ4-compressed payloads
const LZ4_MAGIC: &[u8] = b"LZ4R";

/// Marker for payloads stored without compression
const RAW_MAGIC: &[u8] = &[0, 0, 0, 0];

/// Inputs below this size are always stored raw
const MIN_COMPRESS_SIZE: usize = 64;

/// Compression strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionStrategy {
    /// Never compress; every payload is stored raw
    None,
    /// LZ4 for any payload large enough to plausibly benefit
    #[default]
    Fast,
}

/// Compression engine wrapping LZ4 with header framing
///
/// The engine is stateless and cheap to clone; the snapshot store owns one
/// per session.
#[derive(Debug, Clone, Default)]
pub struct CompressionEngine {
    strategy: CompressionStrategy,
}

impl CompressionEngine {
    /// Create a new compression engine with the specified strategy
    pub fn new(strategy: CompressionStrategy) -> Self {
        Self { strategy }
    }

    /// Compress a payload, returning framed bytes
    ///
    /// Falls back to raw storage when the strategy declines or when LZ4
    /// fails to shrink the input.
    pub fn compress(&self, content: &[u8]) -> Vec<u8> {
        let eligible = match self.strategy {
            CompressionStrategy::None => false,
            CompressionStrategy::Fast => content.len() >= MIN_COMPRESS_SIZE,
        };

        if eligible {
            let compressed = compress_prepend_size(content);
            if compressed.len() < content.len() {
                trace!(
                    "compressed {} -> {} bytes",
                    content.len(),
                    compressed.len()
                );
                let mut framed = Vec::with_capacity(LZ4_MAGIC.len() + compressed.len());
                framed.extend_from_slice(LZ4_MAGIC);
                framed.extend_from_slice(&compressed);
                return framed;
            }
        }

        let mut framed = Vec::with_capacity(RAW_MAGIC.len() + content.len());
        framed.extend_from_slice(RAW_MAGIC);
        framed.extend_from_slice(content);
        framed
    }

    /// Decompress a framed payload back to the original bytes
    ///
    /// Rejects payloads whose header is unrecognized rather than guessing
    /// at the format.
    pub fn decompress(&self, content: &[u8]) -> Result<Vec<u8>> {
        if content.len() < 4 {
            return Err(RewindError::decompression("payload shorter than header"));
        }

        if content.starts_with(LZ4_MAGIC) {
            decompress_size_prepended(&content[LZ4_MAGIC.len()..])
                .map_err(|e| RewindError::decompression(format!("LZ4 decode failed: {e}")))
        } else if content.starts_with(RAW_MAGIC) {
            Ok(content[RAW_MAGIC.len()..].to_vec())
        } else {
            Err(RewindError::decompression("unrecognized payload header"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_compressible() {
        let engine = CompressionEngine::new(CompressionStrategy::Fast);
        let data = b"fn main() { println!(\"hello\"); }\n".repeat(50);

        let framed = engine.compress(&data);
        assert!(framed.starts_with(LZ4_MAGIC));
        assert!(framed.len() < data.len());
        assert_eq!(engine.decompress(&framed).unwrap(), data);
    }

    #[test]
    fn test_small_input_stored_raw() {
        let engine = CompressionEngine::new(CompressionStrategy::Fast);
        let data = b"tiny";

        let framed = engine.compress(data);
        assert!(framed.starts_with(RAW_MAGIC));
        assert_eq!(engine.decompress(&framed).unwrap(), data);
    }

    #[test]
    fn test_strategy_none_stores_raw() {
        let engine = CompressionEngine::new(CompressionStrategy::None);
        let data = vec![b'a'; 4096];

        let framed = engine.compress(&data);
        assert!(framed.starts_with(RAW_MAGIC));
        assert_eq!(framed.len(), data.len() + 4);
    }

    #[test]
    fn test_incompressible_stored_raw() {
        let engine = CompressionEngine::new(CompressionStrategy::Fast);
        // Pseudo-random bytes do not shrink under LZ4
        let data: Vec<u8> = (0..4096u32)
            .map(|i| (i.wrapping_mul(2654435761) >> 13) as u8)
            .collect();

        let framed = engine.compress(&data);
        assert!(framed.starts_with(RAW_MAGIC));
        assert_eq!(engine.decompress(&framed).unwrap(), data);
    }

    #[test]
    fn test_unknown_header_rejected() {
        let engine = CompressionEngine::default();
        assert!(engine.decompress(b"XYZW-payload").is_err());
        assert!(engine.decompress(b"ab").is_err());
    }

    #[test]
    fn test_empty_payload_round_trip() {
        let engine = CompressionEngine::default();
        let framed = engine.compress(b"");
        assert_eq!(engine.decompress(&framed).unwrap(), b"");
    }
}
