//! Object store record values.
//!
//! ```text
//! [version:varint] FF 11 01 [size:varint] [offset:varint]   // moved to an external blob
//! [version:varint] FF 11 02 [snappy(serialized value)]      // compressed in place
//! [version:varint] [serialized value]
//! ```

use crate::blink::{decode_script_value, ScriptValue};
use crate::coding::Decoder;
use crate::config::Options;
use crate::error::Result;
use crate::sstable::compression::{self, CompressionType};
use serde::Serialize;

/// Blink version tag that starts a wrapped value.
const WRAPPER_TAG: u8 = 0xFF;
/// Pseudo version marking a value that needs unwrapping before decoding.
const REQUIRES_PROCESSING_VERSION: u8 = 0x11;
/// Wrapper kind: the value was written to an external blob file.
const REPLACE_WITH_BLOB: u8 = 0x01;
/// Wrapper kind: the value is Snappy compressed.
const COMPRESSED_WITH_SNAPPY: u8 = 0x02;

/// Decoded contents of an object store record value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind")]
pub enum ObjectStoreValue {
    /// Value stored inline.
    Inline {
        /// Record version prefix
        version: u64,
        /// Whether the stored bytes were Snappy compressed
        compressed: bool,
        /// The decoded script value
        value: ScriptValue,
    },
    /// Value moved to an external blob file; only its location is stored.
    BlobWrapped {
        /// Record version prefix
        version: u64,
        /// Size of the external blob
        blob_size: u64,
        /// Offset of the value inside the blob
        blob_offset: u64,
    },
}

impl ObjectStoreValue {
    /// Decodes a stored object store value.
    ///
    /// `base_offset` is the file offset of `data`, used in error reports.
    pub fn decode(data: &[u8], base_offset: u64, options: &Options) -> Result<Self> {
        let mut decoder = Decoder::with_base_offset(data, base_offset);
        let version = decoder.read_varint64()?;

        // Blink version 17 also starts with FF 11, so only the two wrapper
        // kinds are treated as wrappers.
        let wrapper = match decoder.peek_bytes(3) {
            Some(&[WRAPPER_TAG, REQUIRES_PROCESSING_VERSION, kind])
                if kind == REPLACE_WITH_BLOB || kind == COMPRESSED_WITH_SNAPPY =>
            {
                Some(kind)
            }
            _ => None,
        };

        match wrapper {
            Some(REPLACE_WITH_BLOB) => {
                decoder.skip(3)?;
                let blob_size = decoder.read_varint64()?;
                let blob_offset = decoder.read_varint64()?;
                Ok(ObjectStoreValue::BlobWrapped { version, blob_size, blob_offset })
            }
            Some(COMPRESSED_WITH_SNAPPY) => {
                decoder.skip(3)?;
                let offset = decoder.offset();
                let raw = compression::decompress(
                    CompressionType::Snappy as u8,
                    decoder.read_rest(),
                    offset,
                )?;
                let value = decode_script_value(&raw, options)?;
                Ok(ObjectStoreValue::Inline { version, compressed: true, value })
            }
            _ => {
                let value = decode_script_value(decoder.read_rest(), options)?;
                Ok(ObjectStoreValue::Inline { version, compressed: false, value })
            }
        }
    }

    /// The record version prefix.
    pub fn version(&self) -> u64 {
        match self {
            ObjectStoreValue::Inline { version, .. } | ObjectStoreValue::BlobWrapped { version, .. } => {
                *version
            }
        }
    }

    /// The decoded script value, when stored inline.
    pub fn script_value(&self) -> Option<&ScriptValue> {
        match self {
            ObjectStoreValue::Inline { value, .. } => Some(value),
            ObjectStoreValue::BlobWrapped { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blink::StructuredValue;
    use crate::error::Error;

    #[test]
    fn test_inline_value() {
        let data = b"\x03\xff\x14\xff\x0fI\x02";
        let value = ObjectStoreValue::decode(data, 0, &Options::default()).unwrap();
        assert_eq!(value.version(), 3);
        assert_eq!(value.script_value().unwrap().value, StructuredValue::Int32(1));
    }

    #[test]
    fn test_blob_wrapped_value() {
        let data = [0x01, 0xFF, 0x11, 0x01, 0x80, 0x08, 0x00];
        let value = ObjectStoreValue::decode(&data, 0, &Options::default()).unwrap();
        assert_eq!(
            value,
            ObjectStoreValue::BlobWrapped { version: 1, blob_size: 1024, blob_offset: 0 }
        );
        assert!(value.script_value().is_none());
    }

    #[cfg(feature = "snappy")]
    #[test]
    fn test_snappy_wrapped_value() {
        let inner = b"\xff\x14\xff\x0fS\x02hi";
        let mut data = vec![0x05, 0xFF, 0x11, 0x02];
        data.extend(compression::compress(CompressionType::Snappy, inner).unwrap());
        let value = ObjectStoreValue::decode(&data, 0, &Options::default()).unwrap();
        match value {
            ObjectStoreValue::Inline { version, compressed, value } => {
                assert_eq!(version, 5);
                assert!(compressed);
                assert_eq!(value.value, StructuredValue::String("hi".into()));
            }
            other => panic!("unexpected value {:?}", other),
        }
    }

    #[test]
    fn test_blink_17_is_not_a_wrapper() {
        let data = b"\x01\xff\x11\xff\x0f0";
        let value = ObjectStoreValue::decode(data, 0, &Options::default()).unwrap();
        let script = value.script_value().unwrap();
        assert_eq!(script.blink_version, Some(17));
        assert_eq!(script.value, StructuredValue::Null);
    }

    #[test]
    fn test_truncated_version() {
        let err = ObjectStoreValue::decode(&[0x80], 10, &Options::default()).unwrap_err();
        assert!(matches!(err, Error::Corruption(_) | Error::Truncated { .. }));
    }
}
