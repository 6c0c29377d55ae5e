//! Table reader.
//!
//! Opening a table reads the footer, the index block and, when present, the
//! filter block named by the metaindex. Data blocks are read lazily while
//! iterating. A damaged data block is reported and skipped; the remaining
//! blocks are still read.

use crate::coding::{typed_crc, unmask_crc};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::internal_key::{compare_encoded, InternalKey, ValueType, MAX_SEQUENCE};
use crate::sstable::block::{Block, BlockEntry};
use crate::sstable::compression::decompress;
use crate::sstable::filter::{FilterBlock, FILTER_KEY_PREFIX};
use crate::sstable::footer::{BlockHandle, Footer};
use crate::sstable::index::{read_index, read_metaindex, IndexEntry};
use crate::sstable::{BLOCK_TRAILER_SIZE, FOOTER_SIZE};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::VecDeque;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

/// One key/value pair recovered from a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TableEntry {
    /// File offset of the data block holding the entry.
    pub block_offset: u64,
    /// Position of the entry inside the (decompressed) block.
    pub offset: u64,
    /// Decoded internal key.
    pub key: InternalKey,
    /// Stored value.
    pub value: Vec<u8>,
    /// Set when this key does not sort after the previous key in the file.
    pub out_of_order: bool,
}

/// TableReader provides read access to a `.ldb` table file.
///
/// Usage:
/// ```no_run
/// use leveldb_forensics::{Options, TableReader};
///
/// let mut table = TableReader::open("000005.ldb", Options::default()).unwrap();
/// for entry in table.iter() {
///     match entry {
///         Ok(entry) => println!("{:?} seq={}", entry.key.user_key(), entry.key.sequence()),
///         Err(warning) => eprintln!("{}", warning),
///     }
/// }
/// ```
#[derive(Debug)]
pub struct TableReader<R> {
    reader: R,
    options: Options,
    file_size: u64,
    footer: Footer,
    index: Vec<IndexEntry>,
    index_warnings: Vec<Error>,
    filter: Option<FilterBlock>,
}

impl TableReader<File> {
    /// Open a table file for reading
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(file, options)
    }
}

impl<R: Read + Seek> TableReader<R> {
    /// Reads the footer, index and filter of a table held by `reader`.
    ///
    /// # Errors
    ///
    /// `NotATable` when the source is shorter than a footer or the magic
    /// number is wrong. Damage to the index block itself is also returned,
    /// since without it no data block can be located.
    pub fn new(mut reader: R, options: Options) -> Result<Self> {
        options.validate()?;

        let file_size = reader.seek(SeekFrom::End(0))?;
        if file_size < FOOTER_SIZE as u64 {
            return Err(Error::NotATable(format!(
                "file is {} bytes, smaller than the {}-byte footer",
                file_size, FOOTER_SIZE
            )));
        }

        let footer_offset = file_size - FOOTER_SIZE as u64;
        reader.seek(SeekFrom::Start(footer_offset))?;
        let mut buf = [0u8; FOOTER_SIZE];
        reader.read_exact(&mut buf)?;
        let footer = Footer::decode(&buf, footer_offset)?;

        let mut table = Self {
            reader,
            options,
            file_size,
            footer,
            index: Vec::new(),
            index_warnings: Vec::new(),
            filter: None,
        };

        let index_handle = table.footer.index_handle;
        let index_block = table.read_block(&index_handle)?;
        let (index, index_warnings) = read_index(&index_block);
        table.index = index;
        table.index_warnings = index_warnings;

        table.filter = match table.read_filter() {
            Ok(filter) => filter,
            Err(err) => {
                log::warn!("Ignoring unreadable filter block: {}", err);
                None
            }
        };

        log::debug!(
            "Opened table: {} bytes, {} data blocks, filter {}",
            file_size,
            table.index.len(),
            table.filter.as_ref().map_or("none", |f| f.policy.as_str())
        );
        Ok(table)
    }

    fn read_filter(&mut self) -> Result<Option<FilterBlock>> {
        let handle = self.footer.metaindex_handle;
        if handle.size == 0 {
            return Ok(None);
        }
        let metaindex = self.read_block(&handle)?;
        for (name, handle) in read_metaindex(&metaindex)? {
            if let Some(policy) = name.strip_prefix(FILTER_KEY_PREFIX) {
                let contents = self.read_block_contents(&handle)?;
                return FilterBlock::new(policy.to_string(), handle, contents).map(Some);
            }
        }
        Ok(None)
    }

    /// Reads, verifies and decompresses the contents of a block.
    fn read_block_contents(&mut self, handle: &BlockHandle) -> Result<Vec<u8>> {
        let size = usize::try_from(handle.size)
            .ok()
            .filter(|&size| size <= self.options.max_block_size)
            .ok_or_else(|| {
                Error::corruption(format!(
                    "block at offset {} has size {} over the {} byte limit",
                    handle.offset, handle.size, self.options.max_block_size
                ))
            })?;
        if handle.end_offset().saturating_add(BLOCK_TRAILER_SIZE as u64) > self.file_size {
            return Err(Error::Truncated {
                offset: handle.offset,
                needed: size + BLOCK_TRAILER_SIZE,
                available: self.file_size.saturating_sub(handle.offset) as usize,
            });
        }

        self.reader.seek(SeekFrom::Start(handle.offset))?;
        let mut buffer = vec![0u8; size + BLOCK_TRAILER_SIZE];
        self.reader.read_exact(&mut buffer)?;

        // Layout: [data...][compression_type: 1 byte][masked crc32c: 4 bytes]
        let compression_type = buffer[size];
        let stored = u32::from_le_bytes([
            buffer[size + 1],
            buffer[size + 2],
            buffer[size + 3],
            buffer[size + 4],
        ]);
        if self.options.verify_checksums {
            let expected = unmask_crc(stored);
            let actual = typed_crc(compression_type, &buffer[..size]);
            if expected != actual {
                return Err(Error::ChecksumMismatch { offset: handle.offset, expected, actual });
            }
        }

        buffer.truncate(size);
        if compression_type == 0 {
            return Ok(buffer);
        }
        decompress(compression_type, &buffer, handle.offset)
    }

    fn read_block(&mut self, handle: &BlockHandle) -> Result<Block> {
        let contents = self.read_block_contents(handle)?;
        Block::new(contents, handle.offset)
    }

    /// Looks up the newest version of `user_key`.
    ///
    /// Deletions are returned as entries whose key has kind `Deletion`.
    pub fn get(&mut self, user_key: &[u8]) -> Result<Option<TableEntry>> {
        let target = InternalKey::new(user_key.to_vec(), MAX_SEQUENCE, ValueType::Value).encode();

        let position = self
            .index
            .partition_point(|entry| compare_encoded(&entry.key, &target) == Ordering::Less);
        let Some(handle) = self.index.get(position).map(|entry| entry.handle) else {
            return Ok(None);
        };

        if let Some(filter) = &self.filter {
            if !filter.key_may_match(handle.offset, user_key) {
                return Ok(None);
            }
        }

        let block = self.read_block(&handle)?;
        let Some(found) = block.seek(&target, compare_encoded)? else {
            return Ok(None);
        };
        let key = InternalKey::decode(&found.key)?;
        if key.user_key() != user_key {
            return Ok(None);
        }

        Ok(Some(TableEntry {
            block_offset: handle.offset,
            offset: found.offset,
            key,
            value: found.value,
            out_of_order: false,
        }))
    }

    /// Iterates over every entry of every data block in file order.
    ///
    /// Iterating twice yields the same sequence.
    pub fn iter(&mut self) -> TableIter<'_, R> {
        let pending = self.index_warnings.iter().map(clone_warning).collect();
        TableIter {
            table: self,
            next_block: 0,
            block_offset: 0,
            entries: VecDeque::new(),
            pending,
            previous_key: None,
            done: false,
        }
    }

    /// Footer of the table.
    pub fn footer(&self) -> &Footer {
        &self.footer
    }

    /// Index entries, one per readable data block.
    pub fn index_entries(&self) -> &[IndexEntry] {
        &self.index
    }

    /// Get the number of data blocks
    pub fn num_blocks(&self) -> usize {
        self.index.len()
    }

    /// The filter block, if the table has a readable one.
    pub fn filter(&self) -> Option<&FilterBlock> {
        self.filter.as_ref()
    }

    /// Get the file size
    pub fn file_size(&self) -> u64 {
        self.file_size
    }
}

// Index warnings are replayed on every iteration. They come from block
// parsing, so only these two variants occur.
fn clone_warning(err: &Error) -> Error {
    match err {
        Error::Truncated { offset, needed, available } => {
            Error::Truncated { offset: *offset, needed: *needed, available: *available }
        }
        Error::Corruption(msg) => Error::Corruption(msg.clone()),
        other => Error::corruption(other.to_string()),
    }
}

/// Iterator over all entries of a table.
pub struct TableIter<'a, R> {
    table: &'a mut TableReader<R>,
    next_block: usize,
    block_offset: u64,
    entries: VecDeque<Result<BlockEntry>>,
    pending: VecDeque<Error>,
    previous_key: Option<Vec<u8>>,
    done: bool,
}

impl<R: Read + Seek> TableIter<'_, R> {
    fn fail(&mut self, err: Error) -> Option<Result<TableEntry>> {
        if self.table.options.halts_on_error() || !err.is_recoverable() {
            self.done = true;
        }
        Some(Err(err))
    }

    /// Decodes the next data block; `None` once every block was visited.
    fn load_next_block(&mut self) -> Option<Result<()>> {
        let handle = self.table.index.get(self.next_block)?.handle;
        self.next_block += 1;
        self.block_offset = handle.offset;
        match self.table.read_block(&handle) {
            Ok(block) => {
                self.entries = block.iter().collect();
                Some(Ok(()))
            }
            Err(err) => {
                log::warn!("Skipping data block at offset {}: {}", handle.offset, err);
                Some(Err(err))
            }
        }
    }
}

impl<R: Read + Seek> Iterator for TableIter<'_, R> {
    type Item = Result<TableEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.pop_front() {
            return self.fail(err);
        }

        loop {
            if self.done {
                return None;
            }

            let entry = match self.entries.pop_front() {
                Some(Ok(entry)) => entry,
                Some(Err(err)) => return self.fail(err),
                None => match self.load_next_block()? {
                    Ok(()) => continue,
                    Err(err) => return self.fail(err),
                },
            };

            let out_of_order = self
                .previous_key
                .as_deref()
                .is_some_and(|prev| compare_encoded(prev, &entry.key) != Ordering::Less);
            if out_of_order {
                log::debug!("Out-of-order key in block at offset {}", self.block_offset);
            }

            let key = match InternalKey::decode(&entry.key) {
                Ok(key) => key,
                Err(err) => return self.fail(err),
            };
            self.previous_key = Some(entry.key);

            return Some(Ok(TableEntry {
                block_offset: self.block_offset,
                offset: entry.offset,
                key,
                value: entry.value,
                out_of_order,
            }));
        }
    }
}
