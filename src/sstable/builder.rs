//! Table builder.
//!
//! Writes a byte-exact `.ldb` table from a sequence of internal keys so that
//! tests and benchmarks have real tables to read. Keys are written in the
//! order given, which makes it possible to produce out-of-order evidence.

use crate::coding::{mask_crc, typed_crc};
use crate::error::Result;
use crate::internal_key::split_trailer;
use crate::sstable::block::BlockBuilder;
use crate::sstable::compression::{compress, CompressionType};
use crate::sstable::filter::{FilterBlockBuilder, BLOOM_POLICY_NAME, FILTER_KEY_PREFIX};
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::DEFAULT_BLOCK_SIZE;
use std::io::Write;

const RESTART_INTERVAL: usize = 16;

/// TableBuilder writes a table file.
///
/// Usage:
/// ```
/// use leveldb_forensics::internal_key::{InternalKey, ValueType};
/// use leveldb_forensics::sstable::TableBuilder;
///
/// let mut builder = TableBuilder::new(Vec::new());
/// let key = InternalKey::new(b"key1".to_vec(), 1, ValueType::Value);
/// builder.add(&key.encode(), b"value1").unwrap();
/// let table: Vec<u8> = builder.finish().unwrap();
/// assert!(table.len() > 48);
/// ```
pub struct TableBuilder<W> {
    writer: W,
    data_block: BlockBuilder,
    index_block: BlockBuilder,
    filter_block: Option<FilterBlockBuilder>,
    pending_handle: Option<BlockHandle>,
    last_key: Vec<u8>,
    offset: u64,
    num_entries: u64,
    block_size: usize,
    compression: CompressionType,
}

impl<W: Write> TableBuilder<W> {
    /// Create a new TableBuilder writing to `writer`.
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            data_block: BlockBuilder::new(RESTART_INTERVAL),
            index_block: BlockBuilder::new(1),
            filter_block: None,
            pending_handle: None,
            last_key: Vec::new(),
            offset: 0,
            num_entries: 0,
            block_size: DEFAULT_BLOCK_SIZE,
            compression: CompressionType::None,
        }
    }

    /// Set the block size (default: 4KB)
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    /// Set the compression type
    pub fn compression(mut self, compression: CompressionType) -> Self {
        self.compression = compression;
        self
    }

    /// Emit a bloom filter block.
    pub fn with_filter(mut self) -> Self {
        let mut filter = FilterBlockBuilder::new();
        filter.start_block(0);
        self.filter_block = Some(filter);
        self
    }

    /// Add an internal key and its value.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if let Some(handle) = self.pending_handle.take() {
            let last_key = std::mem::take(&mut self.last_key);
            self.index_block.add(&last_key, &handle.encode());
        }

        if let Some(filter) = self.filter_block.as_mut() {
            let user_key = split_trailer(key).map(|(user_key, _, _)| user_key).unwrap_or(key);
            filter.add_key(user_key);
        }

        self.data_block.add(key, value);
        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.num_entries += 1;

        if self.data_block.current_size() >= self.block_size {
            self.flush_data_block()?;
        }
        Ok(())
    }

    fn flush_data_block(&mut self) -> Result<()> {
        if self.data_block.is_empty() {
            return Ok(());
        }
        let block = std::mem::replace(&mut self.data_block, BlockBuilder::new(RESTART_INTERVAL));
        let handle = self.write_block(&block.finish(), self.compression)?;
        self.pending_handle = Some(handle);
        if let Some(filter) = self.filter_block.as_mut() {
            filter.start_block(self.offset);
        }
        Ok(())
    }

    /// Writes block contents plus trailer and returns the block's handle.
    fn write_block(&mut self, contents: &[u8], compression: CompressionType) -> Result<BlockHandle> {
        let (data, compression) = match compression {
            CompressionType::None => (contents.to_vec(), CompressionType::None),
            other => {
                let compressed = compress(other, contents)?;
                // Keep the compressed form only if it saves at least 12.5%.
                if compressed.len() < contents.len() - contents.len() / 8 {
                    (compressed, other)
                } else {
                    (contents.to_vec(), CompressionType::None)
                }
            }
        };

        let handle = BlockHandle::new(self.offset, data.len() as u64);
        let checksum = mask_crc(typed_crc(compression as u8, &data));
        self.writer.write_all(&data)?;
        self.writer.write_all(&[compression as u8])?;
        self.writer.write_all(&checksum.to_le_bytes())?;
        self.offset += data.len() as u64 + 5;
        Ok(handle)
    }

    /// Finish building the table and return the underlying writer.
    ///
    /// This writes the filter block, metaindex block, index block, and footer.
    pub fn finish(mut self) -> Result<W> {
        self.flush_data_block()?;

        let mut metaindex = BlockBuilder::new(RESTART_INTERVAL);
        if let Some(filter) = self.filter_block.take() {
            let handle = self.write_block(&filter.finish(), CompressionType::None)?;
            let name = format!("{}{}", FILTER_KEY_PREFIX, BLOOM_POLICY_NAME);
            metaindex.add(name.as_bytes(), &handle.encode());
        }
        let metaindex_handle = self.write_block(&metaindex.finish(), CompressionType::None)?;

        if let Some(handle) = self.pending_handle.take() {
            let last_key = std::mem::take(&mut self.last_key);
            self.index_block.add(&last_key, &handle.encode());
        }
        let index = std::mem::replace(&mut self.index_block, BlockBuilder::new(1));
        let index_handle = self.write_block(&index.finish(), CompressionType::None)?;

        let footer = Footer::new(metaindex_handle, index_handle);
        self.writer.write_all(&footer.encode())?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    /// Get the number of entries added
    pub fn num_entries(&self) -> u64 {
        self.num_entries
    }
}
