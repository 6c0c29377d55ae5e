//! Error types for the forensic reader.
//!
//! Almost every variant describes damage found in untrusted input. Readers
//! surface these as `Err` items inside their result streams and keep going
//! where the format allows it; see [`Error::is_recoverable`].

use std::io;
use thiserror::Error;

/// The result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for all parsing operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The byte source could not be read.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// A record or block boundary did not line up with the expected framing.
    #[error("Framing error at offset {offset}: {reason}")]
    Framing {
        /// File offset where the framing problem was detected.
        offset: u64,
        /// What was wrong.
        reason: String,
    },

    /// A stored checksum did not match the checksum of the stored bytes.
    #[error("Checksum mismatch at offset {offset}: stored {expected:#010x}, computed {actual:#010x}")]
    ChecksumMismatch {
        /// File offset of the checksummed structure.
        offset: u64,
        /// The (unmasked) checksum read from the file.
        expected: u32,
        /// The checksum computed over the bytes read.
        actual: u32,
    },

    /// A write batch declared a different number of operations than it holds.
    #[error("Malformed write batch at offset {offset}: declared {declared} operations, decoded {decoded}")]
    MalformedBatch {
        /// File offset of the batch payload.
        offset: u64,
        /// Operation count from the batch header.
        declared: u32,
        /// Operations actually decoded before the payload ran out.
        decoded: u32,
    },

    /// A stored key was too short to carry the packed sequence/kind trailer.
    #[error("Truncated internal key: {len} bytes")]
    TruncatedKey {
        /// Length of the stored key.
        len: usize,
    },

    /// The file is not a table file (too short or wrong footer magic).
    #[error("Not a table file: {0}")]
    NotATable(String),

    /// A block used a compression code this build cannot decode.
    #[error("Unsupported compression type {code} for block at offset {offset}")]
    UnsupportedCompression {
        /// File offset of the block.
        offset: u64,
        /// The compression-type byte from the block trailer.
        code: u8,
    },

    /// A compressed block failed to decompress.
    #[error("Decompression failed for block at offset {offset}: {reason}")]
    Decompression {
        /// File offset of the block.
        offset: u64,
        /// Message from the codec.
        reason: String,
    },

    /// A structured value contained a tag outside the known set.
    #[error("Unknown serialization tag {tag:#04x} at offset {offset}")]
    UnknownTag {
        /// Offset inside the value buffer.
        offset: u64,
        /// The offending tag byte.
        tag: u8,
    },

    /// An object reference pointed past the end of the back-reference table.
    #[error("Dangling object reference {index} at offset {offset} (table size {table_size})")]
    DanglingReference {
        /// Offset inside the value buffer.
        offset: u64,
        /// The referenced index.
        index: u32,
        /// Number of identifiers assigned when the reference was read.
        table_size: u32,
    },

    /// Two versions of the same user key share a sequence number.
    #[error("Ambiguous ordering: {count} records share sequence {sequence} for one user key")]
    AmbiguousOrdering {
        /// The user key.
        key: Vec<u8>,
        /// The shared sequence number.
        sequence: u64,
        /// How many records collided.
        count: usize,
    },

    /// A structure ended before all of its fields could be read.
    #[error("Truncated data at offset {offset}: needed {needed} bytes, {available} available")]
    Truncated {
        /// Offset where the read started.
        offset: u64,
        /// Bytes needed.
        needed: usize,
        /// Bytes left.
        available: usize,
    },

    /// Structural damage that fits none of the more specific variants.
    #[error("Data corruption: {0}")]
    Corruption(String),

    /// An invalid argument was provided.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl Error {
    /// Creates a new corruption error.
    pub fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    /// Creates a new framing error.
    pub fn framing(offset: u64, reason: impl Into<String>) -> Self {
        Error::Framing { offset, reason: reason.into() }
    }

    /// Creates a new invalid argument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Returns true if a reader can keep producing results after this error.
    ///
    /// `NotATable` is reported as recoverable: the table's own stream ends,
    /// but a caller scanning many files moves on to the next one.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Io(_) | Error::InvalidArgument(_))
    }

    /// Returns the file or buffer offset the error refers to, if any.
    pub fn offset(&self) -> Option<u64> {
        match self {
            Error::Framing { offset, .. }
            | Error::ChecksumMismatch { offset, .. }
            | Error::MalformedBatch { offset, .. }
            | Error::UnsupportedCompression { offset, .. }
            | Error::Decompression { offset, .. }
            | Error::UnknownTag { offset, .. }
            | Error::DanglingReference { offset, .. }
            | Error::Truncated { offset, .. } => Some(*offset),
            _ => None,
        }
    }

    /// Rewrites the offset carried by the error through `locate`.
    pub(crate) fn relocate(mut self, locate: impl Fn(u64) -> u64) -> Self {
        match &mut self {
            Error::Framing { offset, .. }
            | Error::ChecksumMismatch { offset, .. }
            | Error::MalformedBatch { offset, .. }
            | Error::UnsupportedCompression { offset, .. }
            | Error::Decompression { offset, .. }
            | Error::UnknownTag { offset, .. }
            | Error::DanglingReference { offset, .. }
            | Error::Truncated { offset, .. } => *offset = locate(*offset),
            _ => {}
        }
        self
    }
}
