// Shared fixtures for the integration tests.
// Everything is built with the crate's own encoders so the bytes match what
// a live LevelDB would have written.

#![allow(dead_code)]

use leveldb_forensics::internal_key::{InternalKey, ValueType};
use leveldb_forensics::manifest::VersionEdit;
use leveldb_forensics::sstable::{CompressionType, TableBuilder};
use leveldb_forensics::wal::LogWriter;
use leveldb_forensics::write_batch::WriteBatchBuilder;
use std::io::Cursor;

/// Installs a logger once per test binary.
pub fn init_logging() {
    env_logger::builder().is_test(true).try_init().ok();
}

/// Writes each payload as one logical record.
pub fn log_bytes(records: &[Vec<u8>]) -> Vec<u8> {
    let mut writer = LogWriter::new(Vec::new());
    for record in records {
        writer.add_record(record).unwrap();
    }
    writer.into_inner()
}

/// A log holding one batch of puts starting at `sequence`.
pub fn put_log(sequence: u64, pairs: &[(&[u8], &[u8])]) -> Vec<u8> {
    let mut batch = WriteBatchBuilder::new();
    for (key, value) in pairs {
        batch.put(key, value);
    }
    log_bytes(&[batch.encode(sequence)])
}

/// Builds a table from `(user_key, sequence, value)` triples, in the order given.
pub fn table_bytes(entries: &[(&[u8], u64, &[u8])], compression: CompressionType) -> Vec<u8> {
    let mut builder = TableBuilder::new(Vec::new())
        .block_size(256)
        .compression(compression)
        .with_filter();
    for (user_key, sequence, value) in entries {
        let key = InternalKey::new(user_key.to_vec(), *sequence, ValueType::Value);
        builder.add(&key.encode(), value).unwrap();
    }
    builder.finish().unwrap()
}

/// `count` sorted entries named `key00000..`.
pub fn numbered_entries(count: usize) -> Vec<(Vec<u8>, u64, Vec<u8>)> {
    (0..count)
        .map(|i| {
            (
                format!("key{:05}", i).into_bytes(),
                i as u64 + 1,
                format!("value{:05}", i).into_bytes(),
            )
        })
        .collect()
}

/// Borrows owned fixture entries in the shape `table_bytes` takes.
pub fn borrowed(entries: &[(Vec<u8>, u64, Vec<u8>)]) -> Vec<(&[u8], u64, &[u8])> {
    entries.iter().map(|(k, s, v)| (k.as_slice(), *s, v.as_slice())).collect()
}

/// Encodes edits as a MANIFEST.
pub fn manifest_bytes(edits: &[VersionEdit]) -> Vec<u8> {
    log_bytes(&edits.iter().map(VersionEdit::encode).collect::<Vec<_>>())
}

/// Wraps bytes as a seekable source.
pub fn source(bytes: Vec<u8>) -> Cursor<Vec<u8>> {
    Cursor::new(bytes)
}
