//! Log file format.
//!
//! Log files (`NNNNNN.log`) and descriptor files (`MANIFEST-NNNNNN`) share
//! one physical layout: the file is a sequence of 32 KiB blocks, each block
//! holds one or more checksummed records, and a logical record too large for
//! the space left in a block is split into fragments.
//!
//! ## Architecture
//!
//! - **Blocks**: [`BlockReader`] validates headers and CRC32C checksums and
//!   resynchronises at the next block boundary after damage
//! - **Fragments**: [`RecordAssembler`] joins First/Middle/Last fragments
//! - **Batches**: [`BatchReader`] and [`EntryReader`] decode the payloads of
//!   a log file as write batches
//!
//! ## Usage
//!
//! ```rust,no_run
//! use leveldb_forensics::{LogReader, Options};
//!
//! # fn main() -> Result<(), leveldb_forensics::Error> {
//! let log = LogReader::open("000003.log", Options::default())?;
//! for entry in log.entries() {
//!     match entry {
//!         Ok(entry) => println!("{} {:?}", entry.sequence, entry.key),
//!         Err(warning) => eprintln!("warning: {}", warning),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod reader;
pub mod record;
#[cfg(any(test, feature = "fixtures"))]
pub mod writer;

pub use reader::{
    BatchReader, Batches, BlockReader, Entries, EntryReader, LogReader, LogicalRecord,
    RecordAssembler, Records,
};
pub use record::{PhysicalRecord, RecordType};
#[cfg(any(test, feature = "fixtures"))]
pub use writer::LogWriter;

/// Size of a log block.
pub const BLOCK_SIZE: usize = 32 * 1024; // 32KB

/// Size of the record header (checksum + length + type)
pub const HEADER_SIZE: usize = 7;
