//! Write batches recovered from log records.
//!
//! Every logical record in a log file is one write batch:
//!
//! ```text
//! [sequence: u64 LE] [count: u32 LE] [operation]*
//!
//! operation:
//!   [tag: u8 = 1] [key: varint32 + bytes] [value: varint32 + bytes]   Put
//!   [tag: u8 = 0] [key: varint32 + bytes]                             Delete
//! ```
//!
//! Operation `i` of a batch carries the sequence number `sequence + i`.
//!
//! # Example
//!
//! ```rust
//! use leveldb_forensics::write_batch::WriteBatch;
//!
//! let mut data = vec![10, 0, 0, 0, 0, 0, 0, 0, 2, 0, 0, 0];
//! data.extend_from_slice(b"\x01\x02id\x011"); // Put("id", "1")
//! data.extend_from_slice(b"\x00\x03old"); // Delete("old")
//!
//! let batch = WriteBatch::decode(&data, 0).unwrap();
//! assert_eq!(batch.entries.len(), 2);
//! assert_eq!(batch.entries[1].sequence, 11);
//! ```

#[cfg(any(test, feature = "fixtures"))]
use crate::coding::put_length_prefixed_slice;
use crate::coding::Decoder;
use crate::error::{Error, Result};
use crate::internal_key::{InternalKey, ValueType, MAX_SEQUENCE};
use serde::Serialize;

/// Size of the sequence/count header that starts every batch.
pub const HEADER_SIZE: usize = 12;

/// One Put or Delete recovered from a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchEntry {
    /// File offset of the operation's tag byte. For a batch split across
    /// log blocks this accounts for the fragment headers and block padding
    /// in between.
    pub offset: u64,
    /// Effective sequence number (batch sequence + position).
    pub sequence: u64,
    /// Put (`Value`) or Delete (`Deletion`).
    pub kind: ValueType,
    /// User key.
    pub key: Vec<u8>,
    /// Stored value; `None` for deletions.
    pub value: Option<Vec<u8>>,
}

impl BatchEntry {
    /// Returns the internal key this operation would have been stored under.
    pub fn internal_key(&self) -> InternalKey {
        InternalKey::new(self.key.clone(), self.sequence, self.kind)
    }
}

/// A decoded write batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WriteBatch {
    /// File offset of the batch payload.
    pub offset: u64,
    /// Sequence number of the first operation.
    pub sequence: u64,
    /// Operation count declared in the header.
    pub count: u32,
    /// Operations in batch order.
    pub entries: Vec<BatchEntry>,
}

impl WriteBatch {
    /// Decodes a batch, failing with `MalformedBatch` unless exactly the
    /// declared number of operations is present.
    pub fn decode(data: &[u8], base_offset: u64) -> Result<Self> {
        match Self::decode_partial(data, base_offset)? {
            (batch, None) => Ok(batch),
            (_, Some(err)) => Err(err),
        }
    }

    /// Decodes as many operations as the payload holds.
    ///
    /// The batch is always returned when its header is readable. The second
    /// element is `Some(MalformedBatch)` when the number of decodable
    /// operations differs from the declared count; `entries` then holds
    /// every operation up to the failure point.
    ///
    /// A header whose sequence range does not fit in the 56 bits of an
    /// internal key is `MalformedBatch` with no operations decoded.
    pub fn decode_partial(data: &[u8], base_offset: u64) -> Result<(Self, Option<Error>)> {
        Self::decode_located(data, |position| base_offset + position)
    }

    /// Like [`decode_partial`](Self::decode_partial), for a payload that is
    /// not contiguous in its file. `locate` maps a position in `data` to the
    /// file offset it was read from.
    pub fn decode_located<F>(data: &[u8], locate: F) -> Result<(Self, Option<Error>)>
    where
        F: Fn(u64) -> u64,
    {
        let base_offset = locate(0);
        let mut decoder = Decoder::new(data);
        let sequence = decoder.read_u64_le().map_err(|e| e.relocate(&locate))?;
        let count = decoder.read_u32_le().map_err(|e| e.relocate(&locate))?;

        let last = sequence.checked_add(u64::from(count.saturating_sub(1)));
        if last.map_or(true, |last| last > MAX_SEQUENCE) {
            log::debug!(
                "Write batch at offset {} starts at sequence {:#x} past the 56-bit range",
                base_offset,
                sequence
            );
            let batch = Self { offset: base_offset, sequence, count, entries: Vec::new() };
            let err = Error::MalformedBatch { offset: base_offset, declared: count, decoded: 0 };
            return Ok((batch, Some(err)));
        }

        let mut entries = Vec::with_capacity(count.min(1024) as usize);
        let mut failure = None;
        while !decoder.is_empty() {
            let position = entries.len() as u64;
            // Operations past the declared count still get a sequence number,
            // as long as it stays representable.
            let Some(entry_sequence) =
                sequence.checked_add(position).filter(|&seq| seq <= MAX_SEQUENCE)
            else {
                failure = Some(Error::corruption("operation sequence past the 56-bit range"));
                break;
            };
            match decode_operation(&mut decoder, entry_sequence, &locate) {
                Ok(entry) => entries.push(entry),
                Err(err) => {
                    log::debug!("Write batch at offset {} stopped decoding: {}", base_offset, err);
                    failure = Some(err);
                    break;
                }
            }
        }

        let decoded = entries.len() as u32;
        let error = if decoded != count || failure.is_some() {
            Some(Error::MalformedBatch { offset: base_offset, declared: count, decoded })
        } else {
            None
        };

        Ok((Self { offset: base_offset, sequence, count, entries }, error))
    }

    /// Returns the sequence number one past the last operation.
    pub fn next_sequence(&self) -> u64 {
        self.sequence.wrapping_add(u64::from(self.count))
    }
}

fn decode_operation<F>(decoder: &mut Decoder<'_>, sequence: u64, locate: &F) -> Result<BatchEntry>
where
    F: Fn(u64) -> u64,
{
    let offset = locate(decoder.offset());
    let tag = decoder.read_u8()?;
    let kind = ValueType::from_u8(tag).ok_or_else(|| {
        Error::corruption(format!("unknown write batch tag {} at offset {}", tag, offset))
    })?;

    let key = decoder.read_length_prefixed().map_err(|e| e.relocate(locate))?.to_vec();
    let value = match kind {
        ValueType::Value => {
            Some(decoder.read_length_prefixed().map_err(|e| e.relocate(locate))?.to_vec())
        }
        ValueType::Deletion => None,
    };

    Ok(BatchEntry { offset, sequence, kind, key, value })
}

/// Type of write operation in a batch.
#[cfg(any(test, feature = "fixtures"))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    /// Put operation with key and value
    Put {
        /// Key to insert
        key: Vec<u8>,
        /// Value to associate with the key
        value: Vec<u8>,
    },
    /// Delete operation with key
    Delete {
        /// Key to delete
        key: Vec<u8>,
    },
}

/// Accumulates operations and encodes them in the on-disk batch layout.
///
/// The reader never writes a store; this exists to build evidence files
/// for tests and benchmarks.
#[cfg(any(test, feature = "fixtures"))]
#[derive(Debug, Default)]
pub struct WriteBatchBuilder {
    operations: Vec<WriteOp>,
}

#[cfg(any(test, feature = "fixtures"))]
impl WriteBatchBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a Put operation.
    pub fn put(&mut self, key: &[u8], value: &[u8]) -> &mut Self {
        self.operations.push(WriteOp::Put { key: key.to_vec(), value: value.to_vec() });
        self
    }

    /// Adds a Delete operation.
    pub fn delete(&mut self, key: &[u8]) -> &mut Self {
        self.operations.push(WriteOp::Delete { key: key.to_vec() });
        self
    }

    /// Returns the number of operations added.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if no operations were added.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Encodes the batch with `sequence` as its first sequence number.
    pub fn encode(&self, sequence: u64) -> Vec<u8> {
        let mut buf = Vec::with_capacity(HEADER_SIZE + self.operations.len() * 16);
        buf.extend_from_slice(&sequence.to_le_bytes());
        buf.extend_from_slice(&(self.operations.len() as u32).to_le_bytes());
        for op in &self.operations {
            match op {
                WriteOp::Put { key, value } => {
                    buf.push(ValueType::Value.as_u8());
                    put_length_prefixed_slice(&mut buf, key);
                    put_length_prefixed_slice(&mut buf, value);
                }
                WriteOp::Delete { key } => {
                    buf.push(ValueType::Deletion.as_u8());
                    put_length_prefixed_slice(&mut buf, key);
                }
            }
        }
        buf
    }
}
