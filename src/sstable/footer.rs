//! Table footer and block handles.
//!
//! The footer is a fixed-size (48 bytes) structure at the end of a table file
//! that points to the index block and the metaindex block.

#[cfg(any(test, feature = "fixtures"))]
use crate::coding::put_varint64;
use crate::coding::Decoder;
use crate::error::{Error, Result};
use crate::sstable::{FOOTER_SIZE, MAGIC_NUMBER};
use serde::Serialize;

/// Largest encoded size of a BlockHandle (two varint64s).
pub const MAX_HANDLE_LENGTH: usize = 20;

/// BlockHandle represents a pointer to a block in the table file.
///
/// `size` excludes the 5-byte block trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockHandle {
    /// Offset of the block in the file
    pub offset: u64,
    /// Size of the block contents in bytes
    pub size: u64,
}

impl BlockHandle {
    /// Create a new BlockHandle
    pub fn new(offset: u64, size: u64) -> Self {
        Self { offset, size }
    }

    /// Appends the handle as two varints.
    #[cfg(any(test, feature = "fixtures"))]
    pub fn encode_to(&self, dst: &mut Vec<u8>) {
        put_varint64(dst, self.offset);
        put_varint64(dst, self.size);
    }

    /// Encode the BlockHandle to bytes
    #[cfg(any(test, feature = "fixtures"))]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(MAX_HANDLE_LENGTH);
        self.encode_to(&mut buf);
        buf
    }

    /// Reads a handle from a decoder.
    pub fn decode_from(decoder: &mut Decoder<'_>) -> Result<Self> {
        let offset = decoder.read_varint64()?;
        let size = decoder.read_varint64()?;
        Ok(Self { offset, size })
    }

    /// Decode a BlockHandle from bytes
    pub fn decode(data: &[u8]) -> Result<Self> {
        Self::decode_from(&mut Decoder::new(data))
    }

    /// Offset one past the block contents (where the trailer starts).
    pub fn end_offset(&self) -> u64 {
        self.offset.saturating_add(self.size)
    }
}

/// Footer is the last 48 bytes of a table file.
///
/// Format:
/// ```text
/// [metaindex_handle: varint64 x2]
/// [index_handle: varint64 x2]
/// [padding to 40 bytes]
/// [magic: u64 LE]
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Footer {
    /// Handle to the metaindex block
    pub metaindex_handle: BlockHandle,
    /// Handle to the index block
    pub index_handle: BlockHandle,
}

impl Footer {
    /// Create a new Footer
    pub fn new(metaindex_handle: BlockHandle, index_handle: BlockHandle) -> Self {
        Self { metaindex_handle, index_handle }
    }

    /// Encode the footer to bytes (48 bytes)
    #[cfg(any(test, feature = "fixtures"))]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(FOOTER_SIZE);
        self.metaindex_handle.encode_to(&mut buf);
        self.index_handle.encode_to(&mut buf);
        buf.resize(2 * MAX_HANDLE_LENGTH, 0);
        buf.extend_from_slice(&MAGIC_NUMBER.to_le_bytes());
        buf
    }

    /// Decode a footer from the last [`FOOTER_SIZE`] bytes of a file.
    ///
    /// # Errors
    ///
    /// `NotATable` if `data` has the wrong length or the magic number does
    /// not match.
    pub fn decode(data: &[u8], file_offset: u64) -> Result<Self> {
        if data.len() != FOOTER_SIZE {
            return Err(Error::NotATable(format!(
                "footer is {} bytes, expected {}",
                data.len(),
                FOOTER_SIZE
            )));
        }

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&data[FOOTER_SIZE - 8..]);
        let magic = u64::from_le_bytes(magic);
        if magic != MAGIC_NUMBER {
            return Err(Error::NotATable(format!(
                "bad magic number {:#018x} at offset {}",
                magic,
                file_offset + (FOOTER_SIZE - 8) as u64
            )));
        }

        let mut decoder = Decoder::with_base_offset(&data[..FOOTER_SIZE - 8], file_offset);
        let metaindex_handle = BlockHandle::decode_from(&mut decoder)?;
        let index_handle = BlockHandle::decode_from(&mut decoder)?;

        Ok(Self { metaindex_handle, index_handle })
    }
}
