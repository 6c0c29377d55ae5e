//! IndexedDB key layout.
//!
//! Every key Chromium writes starts with a [`KeyPrefix`]:
//!
//! ```text
//! [lengths:1] [database_id:1-8 LE] [object_store_id:1-8 LE] [index_id:1-4 LE]
//! ```
//!
//! The first byte packs the three id widths (3, 3 and 2 bits, each stored
//! minus one). The ids select what the rest of the key means.

use crate::coding::Decoder;
use crate::error::{Error, Result};
use serde::Serialize;

/// Index id of object store records.
pub const OBJECT_STORE_DATA_INDEX_ID: u32 = 1;
/// Index id of exists entries.
pub const EXISTS_ENTRY_INDEX_ID: u32 = 2;
/// Index id of blob entries.
pub const BLOB_ENTRY_INDEX_ID: u32 = 3;
/// First index id used by user-defined indexes.
pub const MIN_USER_INDEX_ID: u32 = 30;

/// Database metadata type byte for object store metadata.
pub const OBJECT_STORE_META_DATA: u8 = 50;
/// Object store metadata type holding the store name.
pub const OBJECT_STORE_NAME: u8 = 0;

/// Deepest array nesting accepted inside an [`IdbKey`].
const MAX_KEY_DEPTH: usize = 2000;

/// The id triple that starts every IndexedDB key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct KeyPrefix {
    /// Offset of the prefix's length byte.
    pub offset: u64,
    /// Database id, 0 for global metadata
    pub database_id: u64,
    /// Object store id, 0 for database metadata
    pub object_store_id: u64,
    /// Index id
    pub index_id: u32,
}

/// What a key's prefix says the key describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum KeyPrefixType {
    /// Backing-store wide metadata
    GlobalMetadata,
    /// Metadata of one database (including object store names)
    DatabaseMetadata,
    /// An object store record
    ObjectStoreData,
    /// Existence marker for a record
    ExistsEntry,
    /// External blob list of a record
    BlobEntry,
    /// Entry of a user-defined index
    IndexData,
}

impl KeyPrefix {
    /// Reads a prefix from the decoder.
    pub fn read(decoder: &mut Decoder<'_>) -> Result<Self> {
        let offset = decoder.offset();
        let lengths = decoder.read_u8()?;
        let database_id_len = (((lengths & 0xE0) >> 5) + 1) as usize;
        let object_store_id_len = (((lengths & 0x1C) >> 2) + 1) as usize;
        let index_id_len = ((lengths & 0x03) + 1) as usize;

        let database_id = read_le_id(decoder, database_id_len)?;
        let object_store_id = read_le_id(decoder, object_store_id_len)?;
        let index_id = read_le_id(decoder, index_id_len)? as u32;

        Ok(Self { offset, database_id, object_store_id, index_id })
    }

    /// Decodes the prefix at the start of `key`, returning it with the
    /// number of bytes it occupied.
    pub fn decode(key: &[u8], base_offset: u64) -> Result<(Self, usize)> {
        let mut decoder = Decoder::with_base_offset(key, base_offset);
        let prefix = Self::read(&mut decoder)?;
        Ok((prefix, decoder.position()))
    }

    /// Classifies the key.
    pub fn prefix_type(&self) -> Result<KeyPrefixType> {
        if self.database_id == 0 {
            return Ok(KeyPrefixType::GlobalMetadata);
        }
        if self.object_store_id == 0 {
            return Ok(KeyPrefixType::DatabaseMetadata);
        }
        match self.index_id {
            OBJECT_STORE_DATA_INDEX_ID => Ok(KeyPrefixType::ObjectStoreData),
            EXISTS_ENTRY_INDEX_ID => Ok(KeyPrefixType::ExistsEntry),
            BLOB_ENTRY_INDEX_ID => Ok(KeyPrefixType::BlobEntry),
            id if id >= MIN_USER_INDEX_ID => Ok(KeyPrefixType::IndexData),
            id => Err(Error::corruption(format!(
                "key prefix at offset {} has reserved index id {}",
                self.offset, id
            ))),
        }
    }
}

fn read_le_id(decoder: &mut Decoder<'_>, len: usize) -> Result<u64> {
    let bytes = decoder.read_bytes(len)?;
    Ok(bytes.iter().rev().fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

/// An IndexedDB key value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum IdbKey {
    /// Invalid/absent key
    Null,
    /// String key
    String(String),
    /// Date key, milliseconds since the Unix epoch
    Date(f64),
    /// Number key
    Number(f64),
    /// Array of keys
    Array(Vec<IdbKey>),
    /// The smallest possible key
    MinKey,
    /// Binary key
    Binary(Vec<u8>),
}

impl IdbKey {
    /// Reads an encoded key.
    pub fn read(decoder: &mut Decoder<'_>) -> Result<Self> {
        Self::read_nested(decoder, 0)
    }

    fn read_nested(decoder: &mut Decoder<'_>, depth: usize) -> Result<Self> {
        if depth >= MAX_KEY_DEPTH {
            return Err(Error::corruption(format!(
                "key nesting deeper than {} at offset {}",
                MAX_KEY_DEPTH,
                decoder.offset()
            )));
        }
        let offset = decoder.offset();
        let key_type = decoder.read_u8()?;
        let key = match key_type {
            0 => IdbKey::Null,
            1 => IdbKey::String(read_utf16_with_length(decoder)?),
            2 => IdbKey::Date(decoder.read_f64_le()?),
            3 => IdbKey::Number(decoder.read_f64_le()?),
            4 => {
                let count = decoder.read_varint64()?;
                // each element needs at least its type byte
                if count > decoder.remaining() as u64 {
                    return Err(Error::corruption(format!(
                        "key array at offset {} declares {} elements",
                        offset, count
                    )));
                }
                let mut elements = Vec::with_capacity(count as usize);
                for _ in 0..count {
                    elements.push(Self::read_nested(decoder, depth + 1)?);
                }
                IdbKey::Array(elements)
            }
            5 => IdbKey::MinKey,
            6 => {
                let len = decoder.read_varint64()?;
                let len = usize::try_from(len).map_err(|_| {
                    Error::corruption(format!("binary key length {} at offset {}", len, offset))
                })?;
                IdbKey::Binary(decoder.read_bytes(len)?.to_vec())
            }
            other => {
                return Err(Error::UnknownTag { offset, tag: other });
            }
        };
        Ok(key)
    }
}

/// Reads a UTF-16BE string preceded by its length in code units.
fn read_utf16_with_length(decoder: &mut Decoder<'_>) -> Result<String> {
    let offset = decoder.offset();
    let units = decoder.read_varint64()?;
    let len = units
        .checked_mul(2)
        .and_then(|len| usize::try_from(len).ok())
        .ok_or_else(|| Error::corruption(format!("string length {} at offset {}", units, offset)))?;
    decode_utf16_be(decoder.read_bytes(len)?, offset)
}

/// Decodes UTF-16BE bytes, replacing unpaired surrogates.
pub fn decode_utf16_be(bytes: &[u8], offset: u64) -> Result<String> {
    if bytes.len() % 2 != 0 {
        return Err(Error::corruption(format!(
            "UTF-16 string at offset {} has odd length {}",
            offset,
            bytes.len()
        )));
    }
    let units = bytes.chunks_exact(2).map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
    Ok(char::decode_utf16(units).map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER)).collect())
}

/// Appends the key prefix encoding of the given ids.
pub fn encode_key_prefix(dst: &mut Vec<u8>, database_id: u64, object_store_id: u64, index_id: u32) {
    fn width(value: u64) -> usize {
        (8 - value.leading_zeros() as usize / 8).max(1)
    }
    let database_id_len = width(database_id);
    let object_store_id_len = width(object_store_id);
    let index_id_len = width(u64::from(index_id)).min(4);
    dst.push(
        (((database_id_len - 1) << 5) | ((object_store_id_len - 1) << 2) | (index_id_len - 1)) as u8,
    );
    dst.extend_from_slice(&database_id.to_le_bytes()[..database_id_len]);
    dst.extend_from_slice(&object_store_id.to_le_bytes()[..object_store_id_len]);
    dst.extend_from_slice(&index_id.to_le_bytes()[..index_id_len]);
}
