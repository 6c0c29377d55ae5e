//! Table (`.ldb`) file format.
//!
//! A table is an immutable, sorted file of internal keys and values.
//!
//! ## File Format
//!
//! ```text
//! [Data Block 1]
//! [Data Block 2]
//! ...
//! [Data Block N]
//! [Filter Block]     // optional, named in the metaindex
//! [Metaindex Block]  // meta block name -> handle
//! [Index Block]      // key -> data block handle
//! [Footer: 48B]      // handles of the two index blocks + magic
//! ```
//!
//! Every block is followed by a 5-byte trailer: a compression type byte and
//! the masked CRC32C of the block contents and that type byte.

pub mod block;
#[cfg(any(test, feature = "fixtures"))]
pub mod builder;
pub mod compression;
pub mod filter;
pub mod footer;
pub mod index;
pub mod reader;

pub use block::{Block, BlockEntry, BlockIter};
#[cfg(any(test, feature = "fixtures"))]
pub use block::BlockBuilder;
#[cfg(any(test, feature = "fixtures"))]
pub use builder::TableBuilder;
pub use compression::CompressionType;
pub use filter::FilterBlock;
pub use footer::{BlockHandle, Footer};
pub use index::IndexEntry;
pub use reader::{TableEntry, TableIter, TableReader};

/// Default block size (4KB)
pub const DEFAULT_BLOCK_SIZE: usize = 4096;

/// Footer size in bytes (fixed)
pub const FOOTER_SIZE: usize = 48;

/// Size of the compression type and checksum after each block.
pub const BLOCK_TRAILER_SIZE: usize = 5;

/// Magic number at the end of every table file
pub const MAGIC_NUMBER: u64 = 0xdb47_7524_8b80_fb57;
