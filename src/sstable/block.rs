//! Block format for tables.
//!
//! Data, index and metaindex blocks share one layout: prefix-compressed
//! entries followed by an array of restart offsets.

#[cfg(any(test, feature = "fixtures"))]
use crate::coding::put_varint32;
use crate::coding::Decoder;
use crate::error::{Error, Result};
use bytes::Bytes;
use std::cmp::Ordering;

/// A parsed block.
///
/// Layout:
/// ```text
/// entry*
/// restart_offset: u32 LE  (one per restart point)
/// num_restarts:   u32 LE
/// ```
///
/// Entry:
/// ```text
/// shared: varint32   bytes reused from the previous key
/// non_shared: varint32
/// value_len: varint32
/// key_delta: [u8; non_shared]
/// value: [u8; value_len]
/// ```
///
/// The entry at each restart point stores its full key (`shared == 0`).
#[derive(Debug, Clone)]
pub struct Block {
    data: Bytes,
    offset: u64,
    restart_offset: usize,
    num_restarts: u32,
}

impl Block {
    /// Parses the restart array of a block read from file offset `offset`.
    pub fn new(data: impl Into<Bytes>, offset: u64) -> Result<Self> {
        let data = data.into();
        if data.len() < 4 {
            return Err(Error::corruption(format!("block at offset {} is too small", offset)));
        }

        let mut tail = [0u8; 4];
        tail.copy_from_slice(&data[data.len() - 4..]);
        let num_restarts = u32::from_le_bytes(tail);

        let max_restarts = (data.len() - 4) / 4;
        if num_restarts as usize > max_restarts {
            return Err(Error::corruption(format!(
                "block at offset {} claims {} restart points in {} bytes",
                offset,
                num_restarts,
                data.len()
            )));
        }
        let restart_offset = data.len() - 4 - num_restarts as usize * 4;

        Ok(Self { data, offset, restart_offset, num_restarts })
    }

    /// Number of restart points.
    pub fn num_restarts(&self) -> u32 {
        self.num_restarts
    }

    /// File offset the block was read from.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Offset of restart point `index` within the block.
    fn restart_point(&self, index: u32) -> usize {
        let pos = self.restart_offset + index as usize * 4;
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.data[pos..pos + 4]);
        u32::from_le_bytes(raw) as usize
    }

    /// Walks every entry from the start of the block.
    pub fn iter(&self) -> BlockIter<'_> {
        BlockIter { block: self, current: 0, key: Vec::new(), done: false }
    }

    /// Finds the first entry whose key is at or after `target` under `cmp`.
    ///
    /// Binary search over the restart points narrows the scan to one
    /// restart interval.
    pub fn seek<F>(&self, target: &[u8], cmp: F) -> Result<Option<BlockEntry>>
    where
        F: Fn(&[u8], &[u8]) -> Ordering,
    {
        let mut left = 0u32;
        let mut right = self.num_restarts;
        while left < right {
            let mid = left + (right - left) / 2;
            let mut iter = self.iter_from(self.restart_point(mid));
            match iter.next() {
                Some(Ok(entry)) if cmp(&entry.key, target) == Ordering::Less => left = mid + 1,
                Some(Err(err)) => return Err(err),
                _ => right = mid,
            }
        }

        // `left` is the first restart whose key is >= target; the answer may
        // sit anywhere in the interval before it.
        let start = if left == 0 { 0 } else { self.restart_point(left - 1) };
        for item in self.iter_from(start) {
            let entry = item?;
            if cmp(&entry.key, target) != Ordering::Less {
                return Ok(Some(entry));
            }
        }
        Ok(None)
    }

    fn iter_from(&self, current: usize) -> BlockIter<'_> {
        BlockIter { block: self, current, key: Vec::new(), done: false }
    }

    /// Block contents without the trailer.
    pub fn data(&self) -> &[u8] {
        &self.data
    }
}

/// One decoded block entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockEntry {
    /// Position of the entry within the block contents.
    pub offset: u64,
    /// Full key, prefix restored.
    pub key: Vec<u8>,
    /// Value bytes.
    pub value: Vec<u8>,
}

/// Iterator over entries in a block.
///
/// A damaged entry is reported once; iteration then continues at the next
/// restart point, where keys are stored in full again.
pub struct BlockIter<'a> {
    block: &'a Block,
    current: usize,
    key: Vec<u8>,
    done: bool,
}

impl BlockIter<'_> {
    fn parse_entry(&mut self) -> Result<BlockEntry> {
        let start = self.current;
        let base = self.block.offset + start as u64;
        let mut decoder =
            Decoder::with_base_offset(&self.block.data[start..self.block.restart_offset], base);

        let shared = decoder.read_varint32()? as usize;
        let unshared = decoder.read_varint32()? as usize;
        let value_len = decoder.read_varint32()? as usize;
        if shared > self.key.len() {
            return Err(Error::corruption(format!(
                "entry at block offset {} shares {} bytes of a {}-byte key",
                start,
                shared,
                self.key.len()
            )));
        }
        let suffix = decoder.read_bytes(unshared)?;
        let value = decoder.read_bytes(value_len)?;

        self.key.truncate(shared);
        self.key.extend_from_slice(suffix);
        self.current = start + decoder.position();

        Ok(BlockEntry { offset: start as u64, key: self.key.clone(), value: value.to_vec() })
    }

    fn skip_to_next_restart(&mut self) {
        let failed_at = self.current;
        self.key.clear();
        let next = (0..self.block.num_restarts)
            .map(|i| self.block.restart_point(i))
            .find(|&point| point > failed_at && point < self.block.restart_offset);
        match next {
            Some(point) => {
                log::debug!("Resuming block at offset {} from restart point {}", self.block.offset, point);
                self.current = point;
            }
            None => self.done = true,
        }
    }
}

impl Iterator for BlockIter<'_> {
    type Item = Result<BlockEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done || self.current >= self.block.restart_offset {
            return None;
        }
        match self.parse_entry() {
            Ok(entry) => Some(Ok(entry)),
            Err(err) => {
                self.skip_to_next_restart();
                Some(Err(err))
            }
        }
    }
}

/// Encodes a block. Used to build fixtures and by [`TableBuilder`](super::TableBuilder).
#[cfg(any(test, feature = "fixtures"))]
pub struct BlockBuilder {
    buffer: Vec<u8>,
    restarts: Vec<u32>,
    counter: usize,
    last_key: Vec<u8>,
    block_restart_interval: usize,
}

#[cfg(any(test, feature = "fixtures"))]
impl BlockBuilder {
    /// `block_restart_interval` entries share each restart point.
    pub fn new(block_restart_interval: usize) -> Self {
        Self {
            buffer: Vec::new(),
            restarts: vec![0], // First restart point at offset 0
            counter: 0,
            last_key: Vec::new(),
            block_restart_interval: block_restart_interval.max(1),
        }
    }

    /// Add a key-value pair to the block.
    ///
    /// Keys are stored in the order given; nothing checks that they are
    /// sorted.
    pub fn add(&mut self, key: &[u8], value: &[u8]) {
        let mut shared = 0;

        if self.counter >= self.block_restart_interval {
            self.restarts.push(self.buffer.len() as u32);
            self.counter = 0;
        } else {
            shared = shared_prefix_len(&self.last_key, key);
        }

        let unshared = key.len() - shared;
        put_varint32(&mut self.buffer, shared as u32);
        put_varint32(&mut self.buffer, unshared as u32);
        put_varint32(&mut self.buffer, value.len() as u32);
        self.buffer.extend_from_slice(&key[shared..]);
        self.buffer.extend_from_slice(value);

        self.last_key.clear();
        self.last_key.extend_from_slice(key);
        self.counter += 1;
    }

    /// Appends the restart array and returns the block.
    pub fn finish(mut self) -> Vec<u8> {
        for restart in &self.restarts {
            self.buffer.extend_from_slice(&restart.to_le_bytes());
        }
        self.buffer.extend_from_slice(&(self.restarts.len() as u32).to_le_bytes());
        self.buffer
    }

    /// Encoded size if the block were finished now.
    pub fn current_size(&self) -> usize {
        self.buffer.len() + self.restarts.len() * 4 + 4
    }

    /// True until the first `add`.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Last key added.
    pub fn last_key(&self) -> &[u8] {
        &self.last_key
    }
}

fn shared_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}
