//! # Internal Key Format
//!
//! Keys stored in tables (and referenced from the descriptor) are internal
//! keys: the user key followed by an 8-byte little-endian trailer that packs
//! a 56-bit sequence number with an 8-bit value type.
//!
//! ## Format
//!
//! ```text
//! InternalKey:
//!   [user_key: bytes] [(sequence << 8) | type: u64 LE]
//! ```
//!
//! ## Ordering
//!
//! Sorting matches the bytewise comparator: user key ascending, then the
//! packed trailer descending, so the newest write to a key comes first and a
//! put sorts ahead of a tombstone carrying the same sequence number.

use crate::error::{Error, Result};
use serde::Serialize;
use std::cmp::Ordering;

/// Length of the packed sequence/type trailer.
pub const TRAILER_SIZE: usize = 8;

/// Largest sequence number representable in the trailer.
pub const MAX_SEQUENCE: u64 = (1 << 56) - 1;

/// Kind byte stored in the low eight bits of the trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum ValueType {
    /// Tombstone; the entry carries no value
    Deletion = 0,
    /// Put
    Value = 1,
}

impl ValueType {
    /// Maps a stored kind byte, `None` for anything but 0 and 1.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(ValueType::Deletion),
            1 => Some(ValueType::Value),
            _ => None,
        }
    }

    /// The stored kind byte.
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// A stored key split into its user key, sequence number and value type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InternalKey {
    user_key: Vec<u8>,
    sequence: u64,
    value_type: ValueType,
}

impl InternalKey {
    /// Builds a key from its parts.
    ///
    /// `sequence` must not exceed [`MAX_SEQUENCE`]; higher bits are dropped
    /// when the key is encoded.
    ///
    /// # Example
    ///
    /// ```rust
    /// use leveldb_forensics::internal_key::{InternalKey, ValueType};
    ///
    /// let key = InternalKey::new(b"title".to_vec(), 42, ValueType::Value);
    /// assert_eq!(key.encode().len(), 5 + 8);
    /// ```
    pub fn new(user_key: Vec<u8>, sequence: u64, value_type: ValueType) -> Self {
        Self { user_key, sequence, value_type }
    }

    /// Returns the user key.
    pub fn user_key(&self) -> &[u8] {
        &self.user_key
    }

    /// Sequence number of the write.
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Put or tombstone.
    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    /// Consumes the key and returns the user key.
    pub fn into_user_key(self) -> Vec<u8> {
        self.user_key
    }

    /// Encodes the key as it is stored in a table.
    pub fn encode(&self) -> Vec<u8> {
        let trailer = pack_trailer(self.sequence, self.value_type);
        [self.user_key.as_slice(), &trailer.to_le_bytes()].concat()
    }

    /// Parses a stored key.
    ///
    /// # Errors
    ///
    /// `TruncatedKey` if `data` is shorter than the trailer, `Corruption` if
    /// the type byte is neither Value nor Deletion.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let (user_key, sequence, type_byte) = split_trailer(data)?;
        let value_type = ValueType::from_u8(type_byte).ok_or_else(|| {
            Error::corruption(format!("invalid value type {} in internal key", type_byte))
        })?;

        Ok(Self { user_key: user_key.to_vec(), sequence, value_type })
    }

    /// Length of [`encode`](Self::encode)'s output.
    pub fn encoded_size(&self) -> usize {
        self.user_key.len() + TRAILER_SIZE
    }
}

impl PartialOrd for InternalKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for InternalKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.user_key
            .cmp(&other.user_key)
            .then_with(|| other.sequence.cmp(&self.sequence))
            .then_with(|| other.value_type.cmp(&self.value_type))
    }
}

fn pack_trailer(sequence: u64, value_type: ValueType) -> u64 {
    ((sequence & MAX_SEQUENCE) << 8) | u64::from(value_type.as_u8())
}

/// Splits a stored key into `(user_key, sequence, type_byte)` without
/// validating the type byte.
pub fn split_trailer(data: &[u8]) -> Result<(&[u8], u64, u8)> {
    if data.len() < TRAILER_SIZE {
        return Err(Error::TruncatedKey { len: data.len() });
    }
    let split = data.len() - TRAILER_SIZE;
    let mut trailer = [0u8; TRAILER_SIZE];
    trailer.copy_from_slice(&data[split..]);
    let packed = u64::from_le_bytes(trailer);
    Ok((&data[..split], packed >> 8, (packed & 0xff) as u8))
}

/// Compares two stored internal keys under the bytewise comparator.
///
/// Keys too short to carry a trailer sort by their raw bytes, before any
/// well-formed key sharing the same prefix.
pub fn compare_encoded(a: &[u8], b: &[u8]) -> Ordering {
    match (split_trailer(a), split_trailer(b)) {
        (Ok((ua, sa, ta)), Ok((ub, sb, tb))) => {
            ua.cmp(ub).then_with(|| sb.cmp(&sa)).then_with(|| tb.cmp(&ta))
        }
        _ => a.cmp(b),
    }
}
