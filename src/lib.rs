//! # leveldb-forensics - A Read-Only Forensic Reader for LevelDB
//!
//! leveldb-forensics recovers every key/value version still present in the
//! files of a LevelDB database, including versions the database itself would
//! no longer return, and decodes the Chromium IndexedDB values stored in them.
//! Nothing is ever written to the files being examined.
//!
//! ## Architecture
//!
//! The reader consists of several layers:
//!
//! - **Log files**: [`wal`] checks block checksums, reassembles fragmented
//!   records and decodes write batches
//! - **Tables**: [`sstable`] reads `.ldb` files through their footer, index
//!   and data blocks, with optional filter and compression support
//! - **Descriptor**: [`manifest`] decodes MANIFEST edits and folds them into
//!   versions naming the live files
//! - **Values**: [`blink`] decodes Blink/V8 serialized script values
//! - **IndexedDB**: [`indexeddb`] classifies keys and names object stores
//! - **Resolution**: [`recovery`] marks each version live or recovered
//!
//! Every reader is a lazy iterator of `Result` items. Damage is reported as
//! an `Err` item and, unless [`RecoveryMode::Halt`] is selected, the reader
//! resynchronises and keeps going.
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use leveldb_forensics::{LogReader, Options, TableReader};
//!
//! # fn main() -> Result<(), leveldb_forensics::Error> {
//! // Every put and delete still present in a log file
//! for entry in LogReader::open("000003.log", Options::default())?.entries() {
//!     match entry {
//!         Ok(entry) => println!("{} {:?} {:?}", entry.sequence, entry.kind, entry.key),
//!         Err(warning) => eprintln!("{}", warning),
//!     }
//! }
//!
//! // Every entry of a table, in file order
//! let mut table = TableReader::open("000005.ldb", Options::default())?;
//! for entry in table.iter().flatten() {
//!     println!("{:?} seq={}", entry.key.user_key(), entry.key.sequence());
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

// Module declarations
pub mod blink;
pub mod coding;
pub mod config;
pub mod error;
pub mod filename;
pub mod indexeddb;
pub mod internal_key;
pub mod manifest;
pub mod recovery;
pub mod sstable;
pub mod wal;
pub mod write_batch;

// Re-exports
pub use blink::{decode_script_value, ScriptValue, StructuredValue};
pub use config::{Options, RecoveryMode};
pub use error::{Error, Result};
pub use indexeddb::{ObjectStoreCatalog, ObjectStoreRecord, ObjectStoreValue};
pub use internal_key::{InternalKey, ValueType};
pub use manifest::{ManifestReader, Version, VersionEdit};
pub use recovery::{resolve, RecordState, RecoveredRecord, ResolvedRecord};
pub use sstable::{TableEntry, TableReader};
pub use wal::LogReader;
pub use write_batch::{BatchEntry, WriteBatch};
