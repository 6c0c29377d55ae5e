//! Index and metaindex blocks.
//!
//! The index block maps a key at or after the last key of each data block to
//! that block's handle. The metaindex block maps names such as
//! `filter.leveldb.BuiltinBloomFilter2` to meta block handles.

use crate::error::{Error, Result};
use crate::sstable::block::Block;
use crate::sstable::footer::BlockHandle;
use serde::Serialize;

/// IndexEntry represents a single entry in the index block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexEntry {
    /// A key >= every key in the data block
    pub key: Vec<u8>,
    /// Handle to the data block
    pub handle: BlockHandle,
}

impl IndexEntry {
    /// Create a new IndexEntry
    pub fn new(key: Vec<u8>, handle: BlockHandle) -> Self {
        Self { key, handle }
    }
}

/// Decodes every readable entry of an index block.
///
/// Entries whose key or handle is damaged are returned as warnings; the
/// remaining entries still locate their data blocks.
pub fn read_index(block: &Block) -> (Vec<IndexEntry>, Vec<Error>) {
    let mut entries = Vec::new();
    let mut warnings = Vec::new();
    for item in block.iter() {
        let decoded = item.and_then(|entry| {
            let handle = BlockHandle::decode(&entry.value)?;
            Ok(IndexEntry::new(entry.key, handle))
        });
        match decoded {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                log::warn!("Skipping index entry in block at offset {}: {}", block.offset(), err);
                warnings.push(err);
            }
        }
    }
    (entries, warnings)
}

/// Decodes the metaindex block into `(name, handle)` pairs.
pub fn read_metaindex(block: &Block) -> Result<Vec<(String, BlockHandle)>> {
    block
        .iter()
        .map(|item| {
            let entry = item?;
            let name = String::from_utf8(entry.key).map_err(|_| {
                Error::corruption(format!(
                    "metaindex key in block at offset {} is not UTF-8",
                    block.offset()
                ))
            })?;
            Ok((name, BlockHandle::decode(&entry.value)?))
        })
        .collect()
}
