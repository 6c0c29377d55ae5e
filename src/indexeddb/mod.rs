//! Chromium IndexedDB records on top of LevelDB.
//!
//! Database mode reads the same recovered key/value pairs as the raw
//! readers, classifies each key by its [`KeyPrefix`], learns object store
//! names from metadata records and decodes object store values into
//! [`ObjectStoreRecord`]s:
//!
//! ```rust
//! use leveldb_forensics::indexeddb::{ObjectStoreCatalog, ObjectStoreRecord};
//! use leveldb_forensics::recovery::{resolve, RecoveredRecord};
//! use leveldb_forensics::Options;
//!
//! fn named_records(records: Vec<RecoveredRecord>) -> Vec<ObjectStoreRecord> {
//!     let catalog = ObjectStoreCatalog::from_records(&records);
//!     let (resolved, _warnings) = resolve(records);
//!     resolved
//!         .iter()
//!         .filter_map(|r| {
//!             ObjectStoreRecord::decode(&r.record, Some(r.state), &catalog, &Options::default())
//!                 .ok()
//!                 .flatten()
//!         })
//!         .collect()
//! }
//! # assert!(named_records(Vec::new()).is_empty());
//! ```

pub mod catalog;
pub mod key;
pub mod value;

pub use catalog::{object_store_name_key, ObjectStoreCatalog, ObjectStoreRecord};
pub use key::{encode_key_prefix, IdbKey, KeyPrefix, KeyPrefixType};
pub use value::ObjectStoreValue;
