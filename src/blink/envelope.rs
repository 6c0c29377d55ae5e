//! Blink serialized script values.
//!
//! ```text
//! [0xFF blink_version]                         // version >= 16
//!   [0xFE trailer_offset:u64 BE trailer_size:u32 BE]  // version >= 21
//! [0xFF v8_version] value...
//! [trailer]                                   // when trailer_size > 0
//! ```
//!
//! Blink versions below 16 have no separate envelope; the V8 header comes
//! first, possibly preceded by Blink's own version tag.

use crate::blink::decoder::ValueDecoder;
use crate::blink::tags::{MIN_SEPARATE_ENVELOPE_VERSION, MIN_TRAILER_VERSION, TRAILER_OFFSET_TAG, VERSION_TAG};
use crate::blink::value::StructuredValue;
use crate::coding::Decoder;
use crate::config::Options;
use crate::error::{Error, Result};
use serde::Serialize;

/// Location of the Blink trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Trailer {
    /// Offset of the trailer inside the value
    pub offset: u64,
    /// Trailer size in bytes
    pub size: u32,
}

/// A decoded script value with its envelope fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScriptValue {
    /// Blink envelope version, if present
    pub blink_version: Option<u32>,
    /// V8 wire format version
    pub v8_version: u32,
    /// Trailer location, if the envelope names one
    pub trailer: Option<Trailer>,
    /// The value tree
    pub value: StructuredValue,
    #[serde(skip)]
    object_count: u32,
}

impl ScriptValue {
    /// Returns the object an [`StructuredValue::ObjectReference`] points at.
    ///
    /// Identifiers follow wire order, so the object is found by walking the
    /// tree in that order; nothing is copied.
    pub fn resolve(&self, index: u32) -> Option<&StructuredValue> {
        if index >= self.object_count {
            return None;
        }
        let mut next = 0u32;
        let mut pending = vec![&self.value];
        while let Some(value) = pending.pop() {
            if let StructuredValue::ArrayBufferView(view) = value {
                if view.buffer.has_identity() {
                    if next == index {
                        return Some(view.buffer.as_ref());
                    }
                    next += 1;
                }
            }
            if value.has_identity() {
                if next == index {
                    return Some(value);
                }
                next += 1;
            }
            let start = pending.len();
            value.push_children(&mut pending);
            pending[start..].reverse();
        }
        None
    }

    /// Number of identified objects in the value.
    pub fn object_count(&self) -> u32 {
        self.object_count
    }
}

/// Decodes a value written by Blink's serializer.
///
/// ```rust
/// use leveldb_forensics::blink::{decode_script_value, StructuredValue};
/// use leveldb_forensics::Options;
///
/// let value = decode_script_value(b"\xff\x0f\xff\x0fI\x54", &Options::default()).unwrap();
/// assert_eq!(value.value, StructuredValue::Int32(42));
/// ```
pub fn decode_script_value(data: &[u8], options: &Options) -> Result<ScriptValue> {
    let mut envelope = Decoder::new(data);
    let mut blink_version = None;
    let mut trailer = None;
    let mut body_start = 0;
    let mut body_end = data.len();

    if envelope.peek_u8() == Some(VERSION_TAG) {
        envelope.read_u8()?;
        let version = envelope.read_varint32()?;
        if version >= MIN_SEPARATE_ENVELOPE_VERSION {
            blink_version = Some(version);
            if version >= MIN_TRAILER_VERSION {
                let tag_offset = envelope.offset();
                let tag = envelope.read_u8()?;
                if tag != TRAILER_OFFSET_TAG {
                    return Err(Error::corruption(format!(
                        "expected trailer offset tag at offset {}, found {:#04x}",
                        tag_offset, tag
                    )));
                }
                let offset = envelope.read_u64_be()?;
                let size = envelope.read_u32_be()?;
                if size > 0 {
                    let end = usize::try_from(offset)
                        .ok()
                        .filter(|&end| end >= envelope.position() && end <= data.len())
                        .ok_or_else(|| {
                            Error::corruption(format!(
                                "trailer offset {} outside the {}-byte value",
                                offset,
                                data.len()
                            ))
                        })?;
                    body_end = end;
                    trailer = Some(Trailer { offset, size });
                }
            }
            body_start = envelope.position();
        }
    }

    let body = &data[body_start..body_end];
    let mut decoder = ValueDecoder::new(body, body_start as u64, options.max_value_depth);
    let mut v8_version = decoder.read_header()?;
    if blink_version.is_none() && decoder.at_header() {
        blink_version = Some(v8_version);
        v8_version = decoder.read_header()?;
    }

    decoder.set_blink_version(blink_version);
    let value = decoder.read_value()?;
    let object_count = decoder.object_count();
    Ok(ScriptValue { blink_version, v8_version, trailer, value, object_count })
}
