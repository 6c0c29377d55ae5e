//! V8 value deserializer.
//!
//! Reads one tagged value tree. Objects that can be referenced again
//! (objects, arrays, dates, wrappers, regexps, maps, sets, buffers, views,
//! errors and host objects) receive identifiers in the order their tag is
//! read, so a parent's identifier precedes its children's. The decoder only
//! remembers what each identifier is (enough to bounds-check a view over a
//! referenced buffer); the objects themselves live once, in the value tree.

use crate::blink::tags::{
    CryptoKeySubTag, ErrorTag, HostTag, V8Tag, ViewKind, LATEST_V8_VERSION, VERSION_TAG,
};
use crate::blink::value::{
    ArrayBuffer, ArrayBufferView, BigInt, CryptoKey, CryptoKeyType, FileSnapshot, JsArray,
    JsError, JsFile, KeyAlgorithm, PropertyKey, StructuredValue,
};
use crate::coding::Decoder;
use crate::error::{Error, Result};

/// What the decoder knows about an identified object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Identifier reserved, object still being decoded
    Pending,
    /// ArrayBuffer of this many bytes
    Buffer(usize),
    /// SharedArrayBuffer; its contents are not stored
    SharedBuffer,
    /// Any other object
    Other,
}

impl Slot {
    fn of(value: &StructuredValue) -> Self {
        match value {
            StructuredValue::ArrayBuffer(buffer) => Slot::Buffer(buffer.data.len()),
            StructuredValue::SharedArrayBuffer(_) => Slot::SharedBuffer,
            _ => Slot::Other,
        }
    }
}

/// Decodes V8-serialized values from a byte buffer.
pub struct ValueDecoder<'a> {
    decoder: Decoder<'a>,
    version: u32,
    blink_version: Option<u32>,
    max_depth: usize,
    slots: Vec<Slot>,
}

impl<'a> ValueDecoder<'a> {
    /// Creates a decoder for `data`, reporting offsets from `base_offset`.
    ///
    /// The wire version defaults to the latest until [`read_header`] runs.
    ///
    /// [`read_header`]: ValueDecoder::read_header
    pub fn new(data: &'a [u8], base_offset: u64, max_depth: usize) -> Self {
        Self {
            decoder: Decoder::with_base_offset(data, base_offset),
            version: LATEST_V8_VERSION,
            blink_version: None,
            max_depth,
            slots: Vec::new(),
        }
    }

    /// Sets the Blink envelope version that gates host object formats.
    /// Without one, host objects are read in their latest format.
    pub fn set_blink_version(&mut self, blink_version: Option<u32>) {
        self.blink_version = blink_version;
    }

    /// Wire format version in effect.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Reads a `0xFF <version>` header and returns the version.
    pub fn read_header(&mut self) -> Result<u32> {
        let offset = self.decoder.offset();
        let tag = self.read_tag()?;
        if tag != VERSION_TAG {
            return Err(Error::corruption(format!(
                "expected version tag at offset {}, found {:#04x}",
                offset, tag
            )));
        }
        let version = self.decoder.read_varint32()?;
        if version > LATEST_V8_VERSION {
            return Err(Error::corruption(format!(
                "unsupported serialization version {} at offset {}",
                version, offset
            )));
        }
        self.version = version;
        Ok(version)
    }

    /// Returns true if the next non-padding byte is a version tag.
    pub fn at_header(&mut self) -> bool {
        matches!(self.peek_tag(), Ok(Some(VERSION_TAG)))
    }

    /// Reads one value.
    pub fn read_value(&mut self) -> Result<StructuredValue> {
        self.read_object(0)
    }

    /// Number of identifiers assigned so far.
    pub fn object_count(&self) -> u32 {
        self.slots.len() as u32
    }

    fn read_tag(&mut self) -> Result<u8> {
        loop {
            let tag = self.decoder.read_u8()?;
            if tag != V8Tag::Padding as u8 {
                return Ok(tag);
            }
        }
    }

    fn peek_tag(&mut self) -> Result<Option<u8>> {
        while self.decoder.peek_u8() == Some(V8Tag::Padding as u8) {
            self.decoder.read_u8()?;
        }
        Ok(self.decoder.peek_u8())
    }

    fn consume_if(&mut self, tag: V8Tag) -> Result<bool> {
        if self.peek_tag()? == Some(tag as u8) {
            self.decoder.read_u8()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn reserve_id(&mut self) -> u32 {
        self.slots.push(Slot::Pending);
        (self.slots.len() - 1) as u32
    }

    fn complete(&mut self, id: u32, value: StructuredValue) -> StructuredValue {
        if let Some(slot) = self.slots.get_mut(id as usize) {
            *slot = Slot::of(&value);
        }
        value
    }

    fn read_object(&mut self, depth: usize) -> Result<StructuredValue> {
        if depth > self.max_depth {
            return Err(Error::corruption(format!(
                "value nesting deeper than {} at offset {}",
                self.max_depth,
                self.decoder.offset()
            )));
        }

        let value = self.read_object_internal(depth)?;
        if self.consume_if(V8Tag::ArrayBufferView)? {
            return self.read_view(value);
        }
        Ok(value)
    }

    fn read_object_internal(&mut self, depth: usize) -> Result<StructuredValue> {
        let offset = self.decoder.offset();
        let byte = self.read_tag()?;
        let Some(tag) = V8Tag::from_u8(byte) else {
            if self.version < 13 {
                // Older writers emitted host objects without a marker.
                return self.read_host_object(offset, byte);
            }
            return Err(Error::UnknownTag { offset, tag: byte });
        };

        match tag {
            V8Tag::VerifyObjectCount => {
                self.decoder.read_varint32()?;
                self.read_object(depth)
            }
            V8Tag::Undefined => Ok(StructuredValue::Undefined),
            V8Tag::Null => Ok(StructuredValue::Null),
            V8Tag::True => Ok(StructuredValue::Bool(true)),
            V8Tag::False => Ok(StructuredValue::Bool(false)),
            V8Tag::Int32 => Ok(StructuredValue::Int32(self.decoder.read_zigzag32()?)),
            V8Tag::Uint32 => Ok(StructuredValue::Uint32(self.decoder.read_varint32()?)),
            V8Tag::Double => Ok(StructuredValue::Double(self.decoder.read_f64_le()?)),
            V8Tag::BigInt => Ok(StructuredValue::BigInt(self.read_bigint()?)),
            V8Tag::Utf8String => Ok(StructuredValue::String(self.read_utf8_string()?)),
            V8Tag::OneByteString => Ok(StructuredValue::String(self.read_one_byte_string()?)),
            V8Tag::TwoByteString => Ok(StructuredValue::String(self.read_two_byte_string()?)),
            V8Tag::ObjectReference => {
                let index = self.decoder.read_varint32()?;
                if index as usize >= self.slots.len() {
                    return Err(Error::DanglingReference {
                        offset,
                        index,
                        table_size: self.object_count(),
                    });
                }
                Ok(StructuredValue::ObjectReference(index))
            }
            V8Tag::BeginJsObject => self.read_js_object(depth),
            V8Tag::BeginSparseJsArray => self.read_sparse_array(depth),
            V8Tag::BeginDenseJsArray => self.read_dense_array(depth),
            V8Tag::Date => {
                let id = self.reserve_id();
                let millis = self.decoder.read_f64_le()?;
                Ok(self.complete(id, StructuredValue::Date(millis)))
            }
            V8Tag::TrueObject
            | V8Tag::FalseObject
            | V8Tag::NumberObject
            | V8Tag::BigIntObject
            | V8Tag::StringObject => self.read_primitive_wrapper(tag, depth),
            V8Tag::RegExp => {
                let id = self.reserve_id();
                let pattern = self.read_string(depth)?;
                let flags = self.decoder.read_varint32()?;
                Ok(self.complete(id, StructuredValue::RegExp { pattern, flags }))
            }
            V8Tag::BeginJsMap => self.read_map(depth),
            V8Tag::BeginJsSet => self.read_set(depth),
            V8Tag::ArrayBuffer => self.read_array_buffer(false),
            V8Tag::ResizableArrayBuffer => self.read_array_buffer(true),
            V8Tag::SharedArrayBuffer => {
                let id = self.reserve_id();
                let index = self.decoder.read_varint32()?;
                Ok(self.complete(id, StructuredValue::SharedArrayBuffer(index)))
            }
            V8Tag::Error => self.read_error(depth),
            V8Tag::HostObject => {
                let host_offset = self.decoder.offset();
                let host_tag = self.decoder.read_u8()?;
                self.read_host_object(host_offset, host_tag)
            }
            V8Tag::Version
            | V8Tag::Padding
            | V8Tag::TheHole
            | V8Tag::EndJsObject
            | V8Tag::EndSparseJsArray
            | V8Tag::EndDenseJsArray
            | V8Tag::EndJsMap
            | V8Tag::EndJsSet
            | V8Tag::ArrayBufferView => Err(Error::corruption(format!(
                "unexpected tag {:#04x} at offset {}",
                byte, offset
            ))),
            V8Tag::ArrayBufferTransfer
            | V8Tag::SharedObject
            | V8Tag::WasmModuleTransfer
            | V8Tag::WasmMemoryTransfer => Err(Error::corruption(format!(
                "tag {:#04x} at offset {} refers to transferred state that is not stored",
                byte, offset
            ))),
        }
    }

    fn read_bigint(&mut self) -> Result<BigInt> {
        let bitfield = self.decoder.read_varint32()?;
        let byte_count = (bitfield >> 1) as usize;
        let digits = self.decoder.read_bytes(byte_count)?.to_vec();
        Ok(BigInt { negative: bitfield & 1 == 1, digits })
    }

    fn read_utf8_string(&mut self) -> Result<String> {
        let offset = self.decoder.offset();
        let bytes = self.decoder.read_length_prefixed()?;
        Ok(match std::str::from_utf8(bytes) {
            Ok(s) => s.to_string(),
            Err(_) => {
                log::debug!("Invalid UTF-8 in string at offset {}", offset);
                String::from_utf8_lossy(bytes).into_owned()
            }
        })
    }

    fn read_one_byte_string(&mut self) -> Result<String> {
        let bytes = self.decoder.read_length_prefixed()?;
        Ok(bytes.iter().map(|&b| char::from(b)).collect())
    }

    fn read_two_byte_string(&mut self) -> Result<String> {
        let offset = self.decoder.offset();
        let bytes = self.decoder.read_length_prefixed()?;
        if bytes.len() % 2 != 0 {
            return Err(Error::corruption(format!(
                "two-byte string at offset {} has odd length {}",
                offset,
                bytes.len()
            )));
        }
        let units = bytes.chunks_exact(2).map(|pair| u16::from_le_bytes([pair[0], pair[1]]));
        Ok(char::decode_utf16(units).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER)).collect())
    }

    /// Strings nested in other values carry their own tag from version 12.
    fn read_string(&mut self, depth: usize) -> Result<String> {
        if self.version < 12 {
            return self.read_utf8_string();
        }
        let offset = self.decoder.offset();
        match self.read_object(depth + 1)? {
            StructuredValue::String(s) => Ok(s),
            other => Err(Error::corruption(format!(
                "expected a string at offset {}, found {:?}",
                offset, other
            ))),
        }
    }

    fn property_key(value: StructuredValue, offset: u64) -> Result<PropertyKey> {
        match value {
            StructuredValue::String(s) => Ok(PropertyKey::String(s)),
            StructuredValue::Int32(i) => Ok(PropertyKey::Index(i64::from(i))),
            StructuredValue::Uint32(u) => Ok(PropertyKey::Index(i64::from(u))),
            StructuredValue::Double(d) if d.fract() == 0.0 && d.abs() < 9.0e15 => {
                Ok(PropertyKey::Index(d as i64))
            }
            StructuredValue::Double(d) => Ok(PropertyKey::Number(d)),
            other => Err(Error::corruption(format!(
                "invalid property key at offset {}: {:?}",
                offset, other
            ))),
        }
    }

    /// Reads key/value pairs up to and including `end`.
    fn read_properties(
        &mut self,
        end: V8Tag,
        depth: usize,
    ) -> Result<Vec<(PropertyKey, StructuredValue)>> {
        let mut properties = Vec::new();
        loop {
            if self.consume_if(end)? {
                return Ok(properties);
            }
            let offset = self.decoder.offset();
            let key = Self::property_key(self.read_object(depth + 1)?, offset)?;
            let value = self.read_object(depth + 1)?;
            properties.push((key, value));
        }
    }

    fn check_count(&self, what: &str, expected: u32, actual: usize) -> Result<()> {
        if expected as usize != actual {
            return Err(Error::corruption(format!(
                "{} at offset {} declares {} entries, found {}",
                what,
                self.decoder.offset(),
                expected,
                actual
            )));
        }
        Ok(())
    }

    fn read_js_object(&mut self, depth: usize) -> Result<StructuredValue> {
        let id = self.reserve_id();
        let properties = self.read_properties(V8Tag::EndJsObject, depth)?;
        let count = self.decoder.read_varint32()?;
        self.check_count("object", count, properties.len())?;
        Ok(self.complete(id, StructuredValue::Object(properties)))
    }

    fn read_sparse_array(&mut self, depth: usize) -> Result<StructuredValue> {
        let id = self.reserve_id();
        let length = self.decoder.read_varint32()?;
        let properties = self.read_properties(V8Tag::EndSparseJsArray, depth)?;
        let count = self.decoder.read_varint32()?;
        let expected_length = self.decoder.read_varint32()?;
        self.check_count("sparse array", count, properties.len())?;
        self.check_count("sparse array length", expected_length, length as usize)?;
        let array = JsArray { length, elements: Vec::new(), properties };
        Ok(self.complete(id, StructuredValue::Array(array)))
    }

    fn read_dense_array(&mut self, depth: usize) -> Result<StructuredValue> {
        let id = self.reserve_id();
        let length = self.decoder.read_varint32()?;
        let mut elements = Vec::with_capacity((length as usize).min(self.decoder.remaining()));
        for _ in 0..length {
            if self.consume_if(V8Tag::TheHole)? {
                elements.push(StructuredValue::Hole);
                continue;
            }
            let element = self.read_object(depth + 1)?;
            // Before version 11 holes were written as undefined.
            if self.version < 11 && element == StructuredValue::Undefined {
                elements.push(StructuredValue::Hole);
            } else {
                elements.push(element);
            }
        }
        let properties = self.read_properties(V8Tag::EndDenseJsArray, depth)?;
        let count = self.decoder.read_varint32()?;
        let expected_length = self.decoder.read_varint32()?;
        self.check_count("dense array", count, properties.len())?;
        self.check_count("dense array length", expected_length, length as usize)?;
        let array = JsArray { length, elements, properties };
        Ok(self.complete(id, StructuredValue::Array(array)))
    }

    fn read_primitive_wrapper(&mut self, tag: V8Tag, depth: usize) -> Result<StructuredValue> {
        let id = self.reserve_id();
        let value = match tag {
            V8Tag::TrueObject => StructuredValue::BooleanObject(true),
            V8Tag::FalseObject => StructuredValue::BooleanObject(false),
            V8Tag::NumberObject => StructuredValue::NumberObject(self.decoder.read_f64_le()?),
            V8Tag::BigIntObject => StructuredValue::BigIntObject(self.read_bigint()?),
            _ => StructuredValue::StringObject(self.read_string(depth)?),
        };
        Ok(self.complete(id, value))
    }

    fn read_map(&mut self, depth: usize) -> Result<StructuredValue> {
        let id = self.reserve_id();
        let mut entries = Vec::new();
        while !self.consume_if(V8Tag::EndJsMap)? {
            let key = self.read_object(depth + 1)?;
            let value = self.read_object(depth + 1)?;
            entries.push((key, value));
        }
        let length = self.decoder.read_varint32()?;
        self.check_count("map", length, entries.len() * 2)?;
        Ok(self.complete(id, StructuredValue::Map(entries)))
    }

    fn read_set(&mut self, depth: usize) -> Result<StructuredValue> {
        let id = self.reserve_id();
        let mut elements = Vec::new();
        while !self.consume_if(V8Tag::EndJsSet)? {
            elements.push(self.read_object(depth + 1)?);
        }
        let length = self.decoder.read_varint32()?;
        self.check_count("set", length, elements.len())?;
        Ok(self.complete(id, StructuredValue::Set(elements)))
    }

    fn read_array_buffer(&mut self, resizable: bool) -> Result<StructuredValue> {
        let id = self.reserve_id();
        let offset = self.decoder.offset();
        let byte_length = self.decoder.read_varint32()?;
        let max_length = if resizable {
            let max = self.decoder.read_varint32()?;
            if byte_length > max {
                return Err(Error::corruption(format!(
                    "resizable buffer at offset {} has length {} over its maximum {}",
                    offset, byte_length, max
                )));
            }
            Some(max)
        } else {
            None
        };
        let data = self.decoder.read_bytes(byte_length as usize)?.to_vec();
        Ok(self.complete(id, StructuredValue::ArrayBuffer(ArrayBuffer { data, max_length })))
    }

    /// Length of the buffer a view is read over, if it is known yet.
    fn buffer_length(&self, buffer: &StructuredValue, offset: u64) -> Result<Option<usize>> {
        let slot = match buffer {
            StructuredValue::ObjectReference(index) => {
                self.slots.get(*index as usize).copied().unwrap_or(Slot::Pending)
            }
            StructuredValue::ArrayBuffer(_) | StructuredValue::SharedArrayBuffer(_) => {
                Slot::of(buffer)
            }
            other => {
                return Err(Error::corruption(format!(
                    "view at offset {} follows a non-buffer value {:?}",
                    offset, other
                )))
            }
        };
        match slot {
            Slot::Buffer(len) => Ok(Some(len)),
            Slot::SharedBuffer | Slot::Pending => Ok(None),
            Slot::Other => Err(Error::corruption(format!(
                "view at offset {} refers to a non-buffer object",
                offset
            ))),
        }
    }

    fn read_view(&mut self, buffer: StructuredValue) -> Result<StructuredValue> {
        let offset = self.decoder.offset();
        let kind_byte = self.decoder.read_u8()?;
        let kind =
            ViewKind::from_u8(kind_byte).ok_or(Error::UnknownTag { offset, tag: kind_byte })?;
        let byte_offset = self.decoder.read_varint32()?;
        let byte_length = self.decoder.read_varint32()?;
        let flags = if self.version >= 14 { self.decoder.read_varint32()? } else { 0 };

        if let Some(len) = self.buffer_length(&buffer, offset)? {
            let end = u64::from(byte_offset) + u64::from(byte_length);
            if flags & ArrayBufferView::LENGTH_TRACKING == 0 && end > len as u64 {
                return Err(Error::corruption(format!(
                    "view at offset {} spans {}..{} of a {}-byte buffer",
                    offset, byte_offset, end, len
                )));
            }
        }

        let id = self.reserve_id();
        let view = ArrayBufferView { kind, buffer: Box::new(buffer), byte_offset, byte_length, flags };
        Ok(self.complete(id, StructuredValue::ArrayBufferView(view)))
    }

    fn read_error(&mut self, depth: usize) -> Result<StructuredValue> {
        let id = self.reserve_id();
        let mut error =
            JsError { name: "Error".to_string(), message: None, stack: None, cause: None };
        loop {
            let offset = self.decoder.offset();
            let byte = self.decoder.read_u8()?;
            let tag = ErrorTag::from_u8(byte).ok_or(Error::UnknownTag { offset, tag: byte })?;
            match tag {
                ErrorTag::Message => error.message = Some(self.read_string(depth)?),
                ErrorTag::Stack => error.stack = Some(self.read_string(depth)?),
                ErrorTag::Cause => error.cause = Some(Box::new(self.read_object(depth + 1)?)),
                ErrorTag::End => break,
                prototype => {
                    if let Some(name) = prototype.prototype_name() {
                        error.name = name.to_string();
                    }
                }
            }
        }
        Ok(self.complete(id, StructuredValue::Error(error)))
    }

    fn read_host_object(&mut self, offset: u64, tag: u8) -> Result<StructuredValue> {
        let Some(host_tag) = HostTag::from_u8(tag) else {
            return Err(Error::UnknownTag { offset, tag });
        };
        if let (Some(min), Some(version)) = (host_tag.min_blink_version(), self.blink_version) {
            if version < min {
                return Err(Error::corruption(format!(
                    "{:?} at offset {} needs Blink version {}, value has {}",
                    host_tag, offset, min, version
                )));
            }
        }
        let id = self.reserve_id();
        let value = match host_tag {
            HostTag::Blob => {
                let uuid = self.read_utf8_string()?;
                let mime_type = self.read_utf8_string()?;
                let size = self.decoder.read_varint64()?;
                StructuredValue::Blob { uuid, mime_type, size }
            }
            HostTag::BlobIndex => StructuredValue::BlobIndex(self.decoder.read_varint32()?),
            HostTag::File => StructuredValue::File(self.read_file()?),
            HostTag::FileIndex => StructuredValue::FileIndex(self.decoder.read_varint32()?),
            HostTag::FileList => {
                let length = self.decoder.read_varint32()?;
                let mut files = Vec::with_capacity((length as usize).min(self.decoder.remaining()));
                for _ in 0..length {
                    files.push(self.read_file()?);
                }
                StructuredValue::FileList(files)
            }
            HostTag::FileListIndex => {
                let length = self.decoder.read_varint32()?;
                let mut indexes =
                    Vec::with_capacity((length as usize).min(self.decoder.remaining()));
                for _ in 0..length {
                    indexes.push(self.decoder.read_varint32()?);
                }
                StructuredValue::FileListIndex(indexes)
            }
            HostTag::DomPoint | HostTag::DomPointReadOnly => StructuredValue::DomPoint {
                x: self.decoder.read_f64_le()?,
                y: self.decoder.read_f64_le()?,
                z: self.decoder.read_f64_le()?,
                w: self.decoder.read_f64_le()?,
            },
            HostTag::CryptoKey => StructuredValue::CryptoKey(self.read_crypto_key()?),
            HostTag::DomFileSystem => StructuredValue::DomFileSystem {
                file_system_type: self.decoder.read_varint32()?,
                name: self.read_utf8_string()?,
                root_url: self.read_utf8_string()?,
            },
            HostTag::FileSystemFileHandle => StructuredValue::FileSystemFileHandle {
                name: self.read_utf8_string()?,
                token_index: self.decoder.read_varint32()?,
            },
            HostTag::DomException => StructuredValue::DomException {
                name: self.read_utf8_string()?,
                message: self.read_utf8_string()?,
                stack: self.read_utf8_string()?,
            },
        };
        Ok(self.complete(id, value))
    }

    /// True unless the Blink version is known and older than `version`.
    fn blink_at_least(&self, version: u32) -> bool {
        self.blink_version.map_or(true, |v| v >= version)
    }

    fn read_file(&mut self) -> Result<JsFile> {
        let path = self.read_utf8_string()?;
        let (name, relative_path) = if self.blink_at_least(4) {
            (Some(self.read_utf8_string()?), Some(self.read_utf8_string()?))
        } else {
            (None, None)
        };
        let uuid = self.read_utf8_string()?;
        let mime_type = self.read_utf8_string()?;
        let has_snapshot = self.blink_at_least(4) && self.decoder.read_varint32()? != 0;
        let snapshot = if has_snapshot {
            let size = self.decoder.read_varint64()?;
            let mut last_modified_ms = self.decoder.read_f64_le()?;
            // Stored in seconds before version 8.
            if !self.blink_at_least(8) {
                last_modified_ms *= 1000.0;
            }
            Some(FileSnapshot { size, last_modified_ms })
        } else {
            None
        };
        let user_visible = !self.blink_at_least(7) || self.decoder.read_varint32()? != 0;
        Ok(JsFile { path, name, relative_path, uuid, mime_type, snapshot, user_visible })
    }

    fn read_crypto_key(&mut self) -> Result<CryptoKey> {
        let offset = self.decoder.offset();
        let sub_tag_byte = self.decoder.read_u8()?;
        let sub_tag = CryptoKeySubTag::from_u8(sub_tag_byte)
            .ok_or(Error::UnknownTag { offset, tag: sub_tag_byte })?;

        let (key_type, algorithm) = match sub_tag {
            CryptoKeySubTag::Aes => {
                let id = self.decoder.read_varint32()?;
                let length_bits = self.key_length_bits()?;
                (CryptoKeyType::Secret, KeyAlgorithm::Aes { id, length_bits })
            }
            CryptoKeySubTag::Hmac => {
                let length_bits = self.key_length_bits()?;
                let hash = self.decoder.read_varint32()?;
                (CryptoKeyType::Secret, KeyAlgorithm::Hmac { hash, length_bits })
            }
            CryptoKeySubTag::RsaHashed => {
                let id = self.decoder.read_varint32()?;
                let key_type = self.asymmetric_key_type()?;
                let modulus_length_bits = self.decoder.read_varint32()?;
                let exponent_length = self.decoder.read_varint32()? as usize;
                let public_exponent = self.decoder.read_bytes(exponent_length)?.to_vec();
                let hash = self.decoder.read_varint32()?;
                let algorithm =
                    KeyAlgorithm::RsaHashed { id, modulus_length_bits, public_exponent, hash };
                (key_type, algorithm)
            }
            CryptoKeySubTag::Ec => {
                let id = self.decoder.read_varint32()?;
                let key_type = self.asymmetric_key_type()?;
                let named_curve = self.decoder.read_varint32()?;
                (key_type, KeyAlgorithm::Ec { id, named_curve })
            }
            CryptoKeySubTag::Ed25519 => {
                let id = self.decoder.read_varint32()?;
                (self.asymmetric_key_type()?, KeyAlgorithm::Ed25519 { id })
            }
            CryptoKeySubTag::NoParams => {
                let id = self.decoder.read_varint32()?;
                (CryptoKeyType::Secret, KeyAlgorithm::NoParams { id })
            }
        };

        let usages = self.decoder.read_varint32()?;
        let key_data_length = self.decoder.read_varint32()? as usize;
        let key_data = self.decoder.read_bytes(key_data_length)?.to_vec();
        Ok(CryptoKey {
            algorithm,
            key_type,
            extractable: usages & CryptoKey::EXTRACTABLE != 0,
            usages,
            key_data,
        })
    }

    /// Key lengths are stored in bytes.
    fn key_length_bits(&mut self) -> Result<u32> {
        let offset = self.decoder.offset();
        let bytes = self.decoder.read_varint32()?;
        bytes.checked_mul(8).ok_or_else(|| {
            Error::corruption(format!("key length {} at offset {} overflows", bytes, offset))
        })
    }

    fn asymmetric_key_type(&mut self) -> Result<CryptoKeyType> {
        let offset = self.decoder.offset();
        match self.decoder.read_varint32()? {
            1 => Ok(CryptoKeyType::Public),
            2 => Ok(CryptoKeyType::Private),
            other => Err(Error::corruption(format!(
                "invalid asymmetric key type {} at offset {}",
                other, offset
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(data: &[u8]) -> Result<StructuredValue> {
        ValueDecoder::new(data, 0, 64).read_value()
    }

    fn utf8(s: &str) -> Vec<u8> {
        let mut out = vec![b'S', s.len() as u8];
        out.extend_from_slice(s.as_bytes());
        out
    }

    #[test]
    fn test_object_with_int() {
        let value = decode(b"o\x53\x01aI\x02{\x01").unwrap();
        assert_eq!(
            value,
            StructuredValue::Object(vec![(
                PropertyKey::String("a".into()),
                StructuredValue::Int32(1)
            )])
        );
    }

    #[test]
    fn test_primitives() {
        assert_eq!(decode(b"_").unwrap(), StructuredValue::Undefined);
        assert_eq!(decode(b"\x00\x000").unwrap(), StructuredValue::Null);
        assert_eq!(decode(b"I\x03").unwrap(), StructuredValue::Int32(-2));
        assert_eq!(decode(b"U\xac\x02").unwrap(), StructuredValue::Uint32(300));
        let mut double = vec![b'N'];
        double.extend_from_slice(&1.5f64.to_le_bytes());
        assert_eq!(decode(&double).unwrap(), StructuredValue::Double(1.5));
        assert_eq!(decode(b"\"\x02\xe9t").unwrap(), StructuredValue::String("ét".into()));
        assert_eq!(decode(b"c\x04h\x00i\x00").unwrap(), StructuredValue::String("hi".into()));
        let StructuredValue::BigInt(big) = decode(b"Z\x11\x05\x00\x00\x00\x00\x00\x00\x00").unwrap()
        else {
            panic!("expected BigInt");
        };
        assert_eq!(big.to_i128(), Some(-5));
    }

    #[test]
    fn test_shared_reference() {
        // { a: {}, b: <ref 1> }
        let mut data = vec![b'o'];
        data.extend(utf8("a"));
        data.extend_from_slice(b"o{\x00");
        data.extend(utf8("b"));
        data.extend_from_slice(b"^\x01{\x02");

        let mut decoder = ValueDecoder::new(&data, 0, 64);
        let value = decoder.read_value().unwrap();
        assert_eq!(value.get("b"), Some(&StructuredValue::ObjectReference(1)));
        assert_eq!(value.get("a"), Some(&StructuredValue::Object(vec![])));
        assert_eq!(decoder.object_count(), 2);
        assert_eq!(decoder.slots, vec![Slot::Other, Slot::Other]);
    }

    #[test]
    fn test_dangling_reference() {
        let err = decode(b"A\x01^\x05$\x00\x01").unwrap_err();
        assert!(matches!(err, Error::DanglingReference { index: 5, table_size: 1, offset: 2 }));
    }

    #[test]
    fn test_self_reference_under_construction() {
        // const a = []; a[0] = a;
        let value = decode(b"A\x01^\x00$\x00\x01").unwrap();
        let StructuredValue::Array(array) = value else { panic!("expected array") };
        assert_eq!(array.elements, vec![StructuredValue::ObjectReference(0)]);
    }

    #[test]
    fn test_dense_array_with_hole() {
        let value = decode(b"A\x03I\x02-I\x06$\x00\x03").unwrap();
        let StructuredValue::Array(array) = value else { panic!("expected array") };
        assert_eq!(array.length, 3);
        assert_eq!(
            array.elements,
            vec![StructuredValue::Int32(1), StructuredValue::Hole, StructuredValue::Int32(3)]
        );
    }

    #[test]
    fn test_sparse_array() {
        let value = decode(b"a\x0aI\x08S\x01x@\x01\x0a").unwrap();
        let StructuredValue::Array(array) = value else { panic!("expected array") };
        assert_eq!(array.length, 10);
        assert!(array.elements.is_empty());
        assert_eq!(
            array.properties,
            vec![(PropertyKey::Index(4), StructuredValue::String("x".into()))]
        );
    }

    #[test]
    fn test_map_and_set() {
        let map = decode(b";S\x01kI\x02:\x02").unwrap();
        assert_eq!(
            map,
            StructuredValue::Map(vec![(
                StructuredValue::String("k".into()),
                StructuredValue::Int32(1)
            )])
        );
        let set = decode(b"'I\x02I\x04,\x02").unwrap();
        assert_eq!(
            set,
            StructuredValue::Set(vec![StructuredValue::Int32(1), StructuredValue::Int32(2)])
        );
        assert!(decode(b"'I\x02,\x05").is_err());
    }

    #[test]
    fn test_regexp_and_wrappers() {
        let value = decode(b"RS\x03a+b\x01").unwrap();
        assert_eq!(value, StructuredValue::RegExp { pattern: "a+b".into(), flags: 1 });
        assert_eq!(decode(b"y").unwrap(), StructuredValue::BooleanObject(true));
        assert_eq!(decode(b"sS\x02hi").unwrap(), StructuredValue::StringObject("hi".into()));
    }

    #[test]
    fn test_view_over_buffer() {
        let mut data = vec![b'B', 100];
        data.extend_from_slice(&[7u8; 100]);
        data.extend_from_slice(b"VB\x00\x64\x00");

        let mut decoder = ValueDecoder::new(&data, 0, 64);
        let value = decoder.read_value().unwrap();
        let StructuredValue::ArrayBufferView(view) = value else { panic!("expected view") };
        assert_eq!(view.kind, ViewKind::Uint8Array);
        assert_eq!(view.bytes().map(<[u8]>::len), Some(100));
        assert_eq!(decoder.slots, vec![Slot::Buffer(100), Slot::Other]);
    }

    #[test]
    fn test_view_over_referenced_buffer() {
        // [buffer(4), view over <ref 1> spanning 2..6]
        let data = b"A\x02B\x04abcd^\x01VB\x02\x04\x00$\x00\x02";
        assert!(matches!(decode(data), Err(Error::Corruption(_))));

        let data = b"A\x02B\x04abcd^\x01VB\x01\x02\x00$\x00\x02";
        let StructuredValue::Array(array) = decode(data).unwrap() else { panic!("expected array") };
        let StructuredValue::ArrayBufferView(view) = &array.elements[1] else {
            panic!("expected view")
        };
        assert_eq!(*view.buffer, StructuredValue::ObjectReference(1));

        // A view over a reference to an object is rejected.
        let data = b"A\x02o{\x00^\x01VB\x00\x00\x00$\x00\x02";
        assert!(matches!(decode(data), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_view_out_of_bounds() {
        let data = b"B\x04abcdVB\x02\x04\x00";
        assert!(matches!(decode(data), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_error_object() {
        let value = decode(b"rTmS\x03bad.").unwrap();
        let StructuredValue::Error(error) = value else { panic!("expected error") };
        assert_eq!(error.name, "TypeError");
        assert_eq!(error.message.as_deref(), Some("bad"));
    }

    #[test]
    fn test_host_objects() {
        assert_eq!(decode(b"\\i\x03").unwrap(), StructuredValue::BlobIndex(3));
        assert_eq!(
            decode(b"\\L\x02\x01\x02").unwrap(),
            StructuredValue::FileListIndex(vec![1, 2])
        );
        let blob = decode(b"\\b\x02id\x0atext/plain\x80\x01").unwrap();
        assert_eq!(
            blob,
            StructuredValue::Blob { uuid: "id".into(), mime_type: "text/plain".into(), size: 128 }
        );
        assert!(matches!(decode(b"\\M"), Err(Error::UnknownTag { tag: b'M', offset: 1 })));
    }

    fn decode_with_blink(data: &[u8], blink_version: u32) -> Result<StructuredValue> {
        let mut decoder = ValueDecoder::new(data, 0, 64);
        decoder.set_blink_version(Some(blink_version));
        decoder.read_value()
    }

    fn file_bytes(snapshot_seconds: Option<f64>) -> Vec<u8> {
        let mut data = Vec::new();
        for s in ["/tmp/a.txt", "a.txt", "docs/a.txt", "uuid-1", "text/plain"] {
            data.push(s.len() as u8);
            data.extend_from_slice(s.as_bytes());
        }
        match snapshot_seconds {
            Some(time) => {
                data.extend_from_slice(&[1, 0x20]);
                data.extend_from_slice(&time.to_le_bytes());
            }
            None => data.push(0),
        }
        data.push(1);
        data
    }

    #[test]
    fn test_file() {
        let mut data = b"\\f".to_vec();
        data.extend(file_bytes(Some(1_700_000_000_000.0)));
        let StructuredValue::File(file) = decode_with_blink(&data, 20).unwrap() else {
            panic!("expected file")
        };
        assert_eq!(file.path, "/tmp/a.txt");
        assert_eq!(file.name.as_deref(), Some("a.txt"));
        assert_eq!(file.relative_path.as_deref(), Some("docs/a.txt"));
        assert_eq!(file.uuid, "uuid-1");
        assert_eq!(file.mime_type, "text/plain");
        assert_eq!(
            file.snapshot,
            Some(FileSnapshot { size: 32, last_modified_ms: 1_700_000_000_000.0 })
        );
        assert!(file.user_visible);

        // Version 3: no name, relative path, snapshot flag or visibility.
        let mut old = b"\\f".to_vec();
        for s in ["/tmp/b", "uuid-2", ""] {
            old.push(s.len() as u8);
            old.extend_from_slice(s.as_bytes());
        }
        let StructuredValue::File(file) = decode_with_blink(&old, 3).unwrap() else {
            panic!("expected file")
        };
        assert_eq!(file.name, None);
        assert_eq!(file.snapshot, None);
        assert!(file.user_visible);
    }

    #[test]
    fn test_file_time_in_seconds_before_version_8() {
        let mut data = b"\\f".to_vec();
        data.extend(file_bytes(Some(1_700_000_000.0)));
        let StructuredValue::File(file) = decode_with_blink(&data, 7).unwrap() else {
            panic!("expected file")
        };
        let snapshot = file.snapshot.unwrap();
        assert_eq!(snapshot.last_modified_ms, 1_700_000_000_000.0);
    }

    #[test]
    fn test_file_list() {
        let mut data = b"\\l\x02".to_vec();
        data.extend(file_bytes(None));
        data.extend(file_bytes(None));
        let StructuredValue::FileList(files) = decode_with_blink(&data, 20).unwrap() else {
            panic!("expected file list")
        };
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.snapshot.is_none() && f.uuid == "uuid-1"));

        assert!(decode_with_blink(b"\\l\x00", 2).is_err());
    }

    #[test]
    fn test_crypto_keys() {
        // AES-GCM, 32 bytes, encrypt|decrypt|extractable, 2 bytes of key data
        let aes = decode(b"\\K\x01\x09\x20\x07\x02\xaa\xbb").unwrap();
        let StructuredValue::CryptoKey(key) = aes else { panic!("expected key") };
        assert_eq!(key.algorithm, KeyAlgorithm::Aes { id: 9, length_bits: 256 });
        assert_eq!(key.key_type, CryptoKeyType::Secret);
        assert!(key.extractable);
        assert_eq!(key.usages, 7);
        assert_eq!(key.key_data, vec![0xaa, 0xbb]);

        // HMAC SHA-256, 64 bytes, sign, not extractable, no key data
        let StructuredValue::CryptoKey(key) = decode(b"\\K\x02\x40\x06\x08\x00").unwrap() else {
            panic!("expected key")
        };
        assert_eq!(key.algorithm, KeyAlgorithm::Hmac { hash: 6, length_bits: 512 });
        assert!(!key.extractable);

        // RSA-PSS private key, 2048 bits, exponent 65537, SHA-256
        let rsa = b"\\K\x04\x0d\x02\x80\x10\x03\x01\x00\x01\x06\x08\x01\x09";
        let StructuredValue::CryptoKey(key) = decode(rsa).unwrap() else { panic!("expected key") };
        assert_eq!(key.key_type, CryptoKeyType::Private);
        assert_eq!(
            key.algorithm,
            KeyAlgorithm::RsaHashed {
                id: 13,
                modulus_length_bits: 2048,
                public_exponent: vec![1, 0, 1],
                hash: 6
            }
        );
        assert_eq!(key.key_data, vec![9]);

        // ECDSA public key on P-384
        let StructuredValue::CryptoKey(key) = decode(b"\\K\x05\x0e\x01\x02\x10\x00").unwrap()
        else {
            panic!("expected key")
        };
        assert_eq!(key.algorithm, KeyAlgorithm::Ec { id: 14, named_curve: 2 });
        assert_eq!(key.key_type, CryptoKeyType::Public);

        let ed = decode(b"\\K\x07\x12\x02\x08\x00").unwrap();
        assert!(matches!(
            ed,
            StructuredValue::CryptoKey(CryptoKey { algorithm: KeyAlgorithm::Ed25519 { id: 18 }, .. })
        ));
        let pbkdf2 = decode(b"\\K\x06\x11\x20\x00").unwrap();
        assert!(matches!(
            pbkdf2,
            StructuredValue::CryptoKey(CryptoKey { algorithm: KeyAlgorithm::NoParams { id: 17 }, .. })
        ));

        assert!(matches!(decode(b"\\K\x03"), Err(Error::UnknownTag { tag: 3, offset: 2 })));
        assert!(matches!(decode(b"\\K\x05\x0e\x05\x02\x10\x00"), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_file_system_objects() {
        let fs = decode(b"\\d\x01\x04temp\x0cfilesystem:x").unwrap();
        assert_eq!(
            fs,
            StructuredValue::DomFileSystem {
                file_system_type: 1,
                name: "temp".into(),
                root_url: "filesystem:x".into()
            }
        );
        let handle = decode(b"\\n\x05a.txt\x03").unwrap();
        assert_eq!(
            handle,
            StructuredValue::FileSystemFileHandle { name: "a.txt".into(), token_index: 3 }
        );
    }

    #[test]
    fn test_dom_exception() {
        let value = decode(b"\\x\x0aAbortError\x07stopped\x00").unwrap();
        assert_eq!(
            value,
            StructuredValue::DomException {
                name: "AbortError".into(),
                message: "stopped".into(),
                stack: String::new()
            }
        );
    }

    #[test]
    fn test_blob_version_gates() {
        let blob = b"\\b\x02id\x00\x01";
        assert!(decode_with_blink(blob, 3).is_ok());
        assert!(matches!(decode_with_blink(blob, 2), Err(Error::Corruption(_))));

        assert_eq!(decode_with_blink(b"\\i\x01", 6).unwrap(), StructuredValue::BlobIndex(1));
        assert!(matches!(decode_with_blink(b"\\i\x01", 5), Err(Error::Corruption(_))));
        assert!(matches!(decode_with_blink(b"\\e\x01", 5), Err(Error::Corruption(_))));

        // Without a Blink version the latest layout applies.
        assert_eq!(decode(b"\\i\x01").unwrap(), StructuredValue::BlobIndex(1));
    }

    #[test]
    fn test_unknown_tag_by_version() {
        assert!(matches!(decode(b"!"), Err(Error::UnknownTag { tag: b'!', offset: 0 })));

        let mut legacy = ValueDecoder::new(b"\xff\x0ai\x02", 0, 64);
        assert_eq!(legacy.read_header().unwrap(), 10);
        assert_eq!(legacy.read_value().unwrap(), StructuredValue::BlobIndex(2));
    }

    #[test]
    fn test_depth_limit() {
        let mut data = vec![b'A', 1].repeat(10);
        data.push(b'_');
        let err = ValueDecoder::new(&data, 0, 4).read_value().unwrap_err();
        assert!(matches!(err, Error::Corruption(_)));
    }

    #[test]
    fn test_unsupported_version() {
        assert!(ValueDecoder::new(b"\xff\x10", 0, 64).read_header().is_err());
    }
}
