//! Block compression codes.
//!
//! The byte in each block trailer selects the codec. Snappy is built in by
//! default; Zstandard needs the `zstd-compression` feature. A code this build
//! cannot decode fails only the block that uses it.

use crate::error::{Error, Result};
use serde::Serialize;

/// Compression algorithm recorded in a block trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum CompressionType {
    /// No compression
    None = 0,
    /// Snappy compression
    Snappy = 1,
    /// Zstandard compression
    Zstd = 2,
}

impl CompressionType {
    /// Convert from u8
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CompressionType::None),
            1 => Some(CompressionType::Snappy),
            2 => Some(CompressionType::Zstd),
            _ => None,
        }
    }
}

/// Returns the decompressed contents of a block.
///
/// `offset` is the block's file offset and is only used for error reporting.
pub fn decompress(code: u8, data: &[u8], offset: u64) -> Result<Vec<u8>> {
    match CompressionType::from_u8(code) {
        Some(CompressionType::None) => Ok(data.to_vec()),
        #[cfg(feature = "snappy")]
        Some(CompressionType::Snappy) => snap::raw::Decoder::new()
            .decompress_vec(data)
            .map_err(|e| Error::Decompression { offset, reason: e.to_string() }),
        #[cfg(feature = "zstd-compression")]
        Some(CompressionType::Zstd) => zstd::stream::decode_all(data)
            .map_err(|e| Error::Decompression { offset, reason: e.to_string() }),
        _ => {
            log::warn!("Block at offset {} uses unsupported compression {}", offset, code);
            Err(Error::UnsupportedCompression { offset, code })
        }
    }
}

/// Compresses block contents, used when building fixture tables.
#[cfg(any(test, feature = "fixtures"))]
pub fn compress(compression: CompressionType, data: &[u8]) -> Result<Vec<u8>> {
    match compression {
        CompressionType::None => Ok(data.to_vec()),
        #[cfg(feature = "snappy")]
        CompressionType::Snappy => snap::raw::Encoder::new()
            .compress_vec(data)
            .map_err(|e| Error::invalid_argument(format!("snappy compression failed: {}", e))),
        #[cfg(feature = "zstd-compression")]
        CompressionType::Zstd => zstd::stream::encode_all(data, 0)
            .map_err(|e| Error::invalid_argument(format!("zstd compression failed: {}", e))),
        #[allow(unreachable_patterns)]
        other => Err(Error::invalid_argument(format!("{:?} compression is not enabled", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compression_codes() {
        assert_eq!(CompressionType::from_u8(0), Some(CompressionType::None));
        assert_eq!(CompressionType::from_u8(1), Some(CompressionType::Snappy));
        assert_eq!(CompressionType::from_u8(2), Some(CompressionType::Zstd));
        assert_eq!(CompressionType::from_u8(3), None);
    }

    #[test]
    fn test_unknown_code() {
        let err = decompress(0x7f, b"data", 4096).unwrap_err();
        assert!(matches!(err, Error::UnsupportedCompression { offset: 4096, code: 0x7f }));
    }

    #[test]
    fn test_uncompressed() {
        assert_eq!(decompress(0, b"plain", 0).unwrap(), b"plain");
    }

    #[cfg(feature = "snappy")]
    #[test]
    fn test_snappy_roundtrip_and_damage() {
        let data = b"abcabcabcabcabcabcabcabc".repeat(10);
        let compressed = compress(CompressionType::Snappy, &data).unwrap();
        assert!(compressed.len() < data.len());
        assert_eq!(decompress(1, &compressed, 0).unwrap(), data);

        let err = decompress(1, &[0xff, 0xff, 0xff, 0xff, 0xff, 0x01], 77).unwrap_err();
        assert!(matches!(err, Error::Decompression { offset: 77, .. }));
    }
}
