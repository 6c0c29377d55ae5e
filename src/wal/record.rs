//! Physical record format.
//!
//! Each record consists of:
//! - Checksum (4 bytes): masked CRC32C of type and data
//! - Length (2 bytes): little-endian length of the data
//! - Type (1 byte): Record type (Full, First, Middle, Last)
//! - Data (variable): one fragment of a logical record

use super::HEADER_SIZE;
#[cfg(any(test, feature = "fixtures"))]
use crate::coding::{mask_crc, typed_crc};
use serde::Serialize;

/// Record types for handling logical records that span multiple blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum RecordType {
    /// Complete record contained in a single block
    Full = 1,
    /// First fragment of a multi-block record
    First = 2,
    /// Middle fragment of a multi-block record
    Middle = 3,
    /// Last fragment of a multi-block record
    Last = 4,
}

impl RecordType {
    /// Convert from u8 to RecordType
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(RecordType::Full),
            2 => Some(RecordType::First),
            3 => Some(RecordType::Middle),
            4 => Some(RecordType::Last),
            _ => None,
        }
    }
}

/// One fragment read from a log block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PhysicalRecord {
    /// File offset of the record header.
    pub offset: u64,
    /// Stored (masked) checksum.
    pub checksum: u32,
    /// Payload length from the header.
    pub length: u16,
    /// Fragment type.
    pub record_type: RecordType,
    /// Payload bytes.
    #[serde(skip)]
    pub contents: Vec<u8>,
    /// Whether the stored checksum matches the payload.
    pub checksum_ok: bool,
}

impl PhysicalRecord {
    /// File offset of the first payload byte.
    pub fn contents_offset(&self) -> u64 {
        self.offset + HEADER_SIZE as u64
    }
}

/// Encodes one fragment with a valid masked checksum.
///
/// Format: [checksum: u32][length: u16][type: u8][data: bytes]
#[cfg(any(test, feature = "fixtures"))]
pub fn encode_fragment(record_type: RecordType, data: &[u8]) -> Vec<u8> {
    debug_assert!(data.len() <= usize::from(u16::MAX));
    let mut buf = Vec::with_capacity(HEADER_SIZE + data.len());
    let checksum = mask_crc(typed_crc(record_type as u8, data));
    buf.extend_from_slice(&checksum.to_le_bytes());
    buf.extend_from_slice(&(data.len() as u16).to_le_bytes());
    buf.push(record_type as u8);
    buf.extend_from_slice(data);
    buf
}
