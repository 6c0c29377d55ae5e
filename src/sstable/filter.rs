//! Filter block support.
//!
//! The metaindex may name a filter block (`filter.<policy>`). The block holds
//! one filter per 2^base_lg bytes of data-block offsets, followed by the
//! offset array:
//!
//! ```text
//! [filter 0] ... [filter N-1]
//! [filter offset: u32 LE] x N
//! [offset array start: u32 LE]
//! [base_lg: u8]
//! ```
//!
//! Filters are built over user keys. Only the builtin bloom policy can be
//! evaluated; any other policy is reported but never excludes a key.

use crate::error::{Error, Result};
use crate::sstable::footer::BlockHandle;
use serde::Serialize;

/// Metaindex key prefix for filter blocks.
pub const FILTER_KEY_PREFIX: &str = "filter.";

/// Name of the builtin bloom filter policy.
pub const BLOOM_POLICY_NAME: &str = "leveldb.BuiltinBloomFilter2";

/// Filter base used by LevelDB: one filter per 2KB of block offsets.
pub const FILTER_BASE_LG: u8 = 11;

const HASH_SEED: u32 = 0xbc9f_1d34;

/// The hash used by the bloom policy.
pub fn bloom_hash(data: &[u8], seed: u32) -> u32 {
    const M: u32 = 0xc6a4_a793;
    const R: u32 = 24;

    let mut h = seed ^ (data.len() as u32).wrapping_mul(M);
    let mut chunks = data.chunks_exact(4);
    for chunk in &mut chunks {
        let w = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        h = h.wrapping_add(w).wrapping_mul(M);
        h ^= h >> 16;
    }

    let rest = chunks.remainder();
    if !rest.is_empty() {
        if rest.len() == 3 {
            h = h.wrapping_add(u32::from(rest[2]) << 16);
        }
        if rest.len() >= 2 {
            h = h.wrapping_add(u32::from(rest[1]) << 8);
        }
        h = h.wrapping_add(u32::from(rest[0]));
        h = h.wrapping_mul(M);
        h ^= h >> R;
    }
    h
}

/// Appends a bloom filter over `keys` to `dst`.
#[cfg(any(test, feature = "fixtures"))]
pub fn create_bloom_filter(keys: &[Vec<u8>], bits_per_key: usize, dst: &mut Vec<u8>) {
    // 0.69 =~ ln(2)
    let k = ((bits_per_key as f64 * 0.69) as usize).clamp(1, 30);
    let bits = (keys.len() * bits_per_key).max(64);
    let bytes = (bits + 7) / 8;
    let bits = bytes * 8;

    let start = dst.len();
    dst.resize(start + bytes, 0);
    dst.push(k as u8);

    for key in keys {
        let mut h = bloom_hash(key, HASH_SEED);
        let delta = h.rotate_right(17);
        for _ in 0..k {
            let bitpos = h as usize % bits;
            dst[start + bitpos / 8] |= 1 << (bitpos % 8);
            h = h.wrapping_add(delta);
        }
    }
}

/// Returns false only if `key` was definitely not added to `filter`.
pub fn bloom_may_match(key: &[u8], filter: &[u8]) -> bool {
    if filter.len() < 2 {
        return false;
    }
    let k = filter[filter.len() - 1];
    if k > 30 {
        // Reserved for future encodings
        return true;
    }

    let bits = (filter.len() - 1) * 8;
    let mut h = bloom_hash(key, HASH_SEED);
    let delta = h.rotate_right(17);
    for _ in 0..k {
        let bitpos = h as usize % bits;
        if filter[bitpos / 8] & (1 << (bitpos % 8)) == 0 {
            return false;
        }
        h = h.wrapping_add(delta);
    }
    true
}

/// A parsed filter block.
#[derive(Debug, Clone, Serialize)]
pub struct FilterBlock {
    /// Policy name from the metaindex key.
    pub policy: String,
    /// Location of the filter block.
    pub handle: BlockHandle,
    /// Number of filters in the block.
    pub num_filters: usize,
    /// Log2 of the data-block offset range each filter covers.
    pub base_lg: u8,
    #[serde(skip)]
    data: Vec<u8>,
    #[serde(skip)]
    array_offset: usize,
}

impl FilterBlock {
    /// Parses filter block contents.
    pub fn new(policy: String, handle: BlockHandle, data: Vec<u8>) -> Result<Self> {
        if data.len() < 5 {
            return Err(Error::corruption(format!(
                "filter block at offset {} is {} bytes",
                handle.offset,
                data.len()
            )));
        }
        let base_lg = data[data.len() - 1];
        let tail = data.len() - 5;
        let array_offset =
            u32::from_le_bytes([data[tail], data[tail + 1], data[tail + 2], data[tail + 3]])
                as usize;
        if array_offset > tail {
            return Err(Error::corruption(format!(
                "filter block at offset {} has offset array at {} past {}",
                handle.offset, array_offset, tail
            )));
        }
        let num_filters = (tail - array_offset) / 4;

        Ok(Self { policy, handle, num_filters, base_lg, data, array_offset })
    }

    fn filter_offset(&self, index: usize) -> usize {
        let pos = self.array_offset + index * 4;
        u32::from_le_bytes([
            self.data[pos],
            self.data[pos + 1],
            self.data[pos + 2],
            self.data[pos + 3],
        ]) as usize
    }

    /// Returns false only if the data block at `block_offset` cannot hold
    /// `user_key`.
    pub fn key_may_match(&self, block_offset: u64, user_key: &[u8]) -> bool {
        if self.policy != BLOOM_POLICY_NAME || self.base_lg >= 64 {
            return true;
        }
        let index = (block_offset >> self.base_lg) as usize;
        if index >= self.num_filters {
            return true;
        }

        // The entry after the last filter offset is the array start itself.
        let start = self.filter_offset(index);
        let limit = self.filter_offset(index + 1);
        if start < limit && limit <= self.array_offset {
            bloom_may_match(user_key, &self.data[start..limit])
        } else {
            // Empty filters match nothing; damaged offsets match everything.
            start != limit
        }
    }
}

/// Builds a filter block alongside the data blocks of a table.
#[cfg(any(test, feature = "fixtures"))]
#[derive(Debug, Default)]
pub struct FilterBlockBuilder {
    keys: Vec<Vec<u8>>,
    result: Vec<u8>,
    filter_offsets: Vec<u32>,
}

#[cfg(any(test, feature = "fixtures"))]
impl FilterBlockBuilder {
    /// Creates an empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with the file offset of each new data block.
    pub fn start_block(&mut self, block_offset: u64) {
        let filter_index = (block_offset >> FILTER_BASE_LG) as usize;
        while filter_index > self.filter_offsets.len() {
            self.generate_filter();
        }
    }

    /// Adds the user key of an entry in the current data block.
    pub fn add_key(&mut self, user_key: &[u8]) {
        self.keys.push(user_key.to_vec());
    }

    /// Returns the filter block contents.
    pub fn finish(mut self) -> Vec<u8> {
        if !self.keys.is_empty() {
            self.generate_filter();
        }
        let array_offset = self.result.len() as u32;
        for offset in &self.filter_offsets {
            self.result.extend_from_slice(&offset.to_le_bytes());
        }
        self.result.extend_from_slice(&array_offset.to_le_bytes());
        self.result.push(FILTER_BASE_LG);
        self.result
    }

    fn generate_filter(&mut self) {
        self.filter_offsets.push(self.result.len() as u32);
        if self.keys.is_empty() {
            return;
        }
        create_bloom_filter(&self.keys, 10, &mut self.result);
        self.keys.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_known_values() {
        assert_eq!(bloom_hash(&[], 0xbc9f1d34), 0xbc9f1d34);
        assert_eq!(bloom_hash(&[0x62], 0xbc9f1d34), 0xef1345c4);
        assert_eq!(bloom_hash(&[0xc3, 0x97], 0xbc9f1d34), 0x5b663814);
        assert_eq!(bloom_hash(&[0xe2, 0x99, 0xa5], 0xbc9f1d34), 0x323c078f);
        assert_eq!(bloom_hash(&[0xe1, 0x80, 0xb9, 0x32], 0xbc9f1d34), 0xed21633a);
    }

    #[test]
    fn test_bloom_no_false_negatives() {
        let keys: Vec<Vec<u8>> = (0..500u32).map(|i| i.to_le_bytes().to_vec()).collect();
        let mut filter = Vec::new();
        create_bloom_filter(&keys, 10, &mut filter);

        for key in &keys {
            assert!(bloom_may_match(key, &filter));
        }
        let false_positives =
            (10_000u32..20_000).filter(|i| bloom_may_match(&i.to_le_bytes(), &filter)).count();
        assert!(false_positives < 500, "false positive count {}", false_positives);
    }

    #[test]
    fn test_filter_block_lookup() {
        let mut builder = FilterBlockBuilder::new();
        builder.start_block(100);
        builder.add_key(b"foo");
        builder.add_key(b"bar");
        builder.start_block(200);
        builder.add_key(b"box");
        builder.start_block(300);
        builder.add_key(b"hello");
        builder.start_block(9000);
        builder.add_key(b"later");
        let data = builder.finish();

        let filter =
            FilterBlock::new(BLOOM_POLICY_NAME.to_string(), BlockHandle::new(0, 0), data).unwrap();
        assert_eq!(filter.base_lg, FILTER_BASE_LG);
        assert!(filter.key_may_match(100, b"foo"));
        assert!(filter.key_may_match(100, b"box"));
        assert!(filter.key_may_match(100, b"hello"));
        assert!(!filter.key_may_match(100, b"missing"));
        assert!(filter.key_may_match(9000, b"later"));
        assert!(!filter.key_may_match(9000, b"foo"));
        // 4096 falls in an empty filter slot between the two populated ones.
        assert!(!filter.key_may_match(4096, b"foo"));
    }

    #[test]
    fn test_unknown_policy_matches_everything() {
        let data = FilterBlockBuilder::new().finish();
        let filter = FilterBlock::new("custom".into(), BlockHandle::new(0, 0), data).unwrap();
        assert!(filter.key_may_match(0, b"anything"));
        assert_eq!(filter.num_filters, 0);
    }

    #[test]
    fn test_damaged_filter_block() {
        let handle = BlockHandle::new(0, 0);
        assert!(FilterBlock::new(BLOOM_POLICY_NAME.into(), handle, vec![1, 2]).is_err());
        let data = vec![0, 0, 0, 0, 0xff, 0, 0, 0, 11];
        assert!(FilterBlock::new(BLOOM_POLICY_NAME.into(), handle, data).is_err());
    }
}
