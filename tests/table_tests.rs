// Table file tests
// Covers full scans, point lookups, filters, compression and damaged input

mod common;

use common::{borrowed, init_logging, numbered_entries, source, table_bytes};
use leveldb_forensics::sstable::{CompressionType, FOOTER_SIZE};
use leveldb_forensics::{Error, Options, RecoveryMode, TableReader, ValueType};
use std::io::Write;
use tempfile::NamedTempFile;

/// Every entry comes back in file order with its sequence number
#[test]
fn test_full_scan() {
    init_logging();
    let entries = numbered_entries(200);
    let data = table_bytes(&borrowed(&entries), CompressionType::None);

    let mut table = TableReader::new(source(data), Options::default()).unwrap();
    assert!(table.num_blocks() > 1);
    let scanned: Vec<_> = table.iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(scanned.len(), 200);
    for (entry, (key, sequence, value)) in scanned.iter().zip(&entries) {
        assert_eq!(entry.key.user_key(), key.as_slice());
        assert_eq!(entry.key.sequence(), *sequence);
        assert_eq!(entry.key.value_type(), ValueType::Value);
        assert_eq!(&entry.value, value);
        assert!(!entry.out_of_order);
    }
}

/// Parsing the same table twice yields the same sequence
#[test]
fn test_scan_is_idempotent() {
    let entries = numbered_entries(120);
    let data = table_bytes(&borrowed(&entries), CompressionType::None);

    let mut table = TableReader::new(source(data.clone()), Options::default()).unwrap();
    let first: Vec<_> = table.iter().collect::<Result<_, _>>().unwrap();
    let second: Vec<_> = table.iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(first, second);

    let mut reopened = TableReader::new(source(data), Options::default()).unwrap();
    let third: Vec<_> = reopened.iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(first, third);
}

/// Point lookups go through the index, filter and restart points
#[test]
fn test_point_lookup() {
    let entries = numbered_entries(300);
    let data = table_bytes(&borrowed(&entries), CompressionType::None);
    let mut table = TableReader::new(source(data), Options::default()).unwrap();

    let filter = table.filter().unwrap();
    assert_eq!(filter.policy, "leveldb.BuiltinBloomFilter2");
    assert_eq!(filter.base_lg, 11);
    assert!(filter.num_filters > 0);

    for i in [0usize, 1, 57, 150, 299] {
        let key = format!("key{:05}", i);
        let found = table.get(key.as_bytes()).unwrap().unwrap();
        assert_eq!(found.key.user_key(), key.as_bytes());
        assert_eq!(found.value, format!("value{:05}", i).into_bytes());
    }
    assert!(table.get(b"key99999").unwrap().is_none());
    assert!(table.get(b"aaa").unwrap().is_none());
    assert!(table.get(b"zzz").unwrap().is_none());
}

/// Keys that do not sort after their predecessor are flagged
#[test]
fn test_out_of_order_flag() {
    let data = table_bytes(
        &[(b"b", 2, b"x"), (b"a", 1, b"y"), (b"c", 3, b"z")],
        CompressionType::None,
    );
    let mut table = TableReader::new(source(data), Options::default()).unwrap();
    let flags: Vec<_> = table.iter().map(|e| e.unwrap().out_of_order).collect();
    assert_eq!(flags, vec![false, true, false]);
}

/// Snappy-compressed blocks decode to the same entries
#[cfg(feature = "snappy")]
#[test]
fn test_snappy_table() {
    let entries: Vec<_> = numbered_entries(200)
        .into_iter()
        .map(|(key, sequence, _)| (key, sequence, vec![b'v'; 100]))
        .collect();
    let plain = table_bytes(&borrowed(&entries), CompressionType::None);
    let compressed = table_bytes(&borrowed(&entries), CompressionType::Snappy);
    assert!(compressed.len() < plain.len());

    let mut table = TableReader::new(source(compressed), Options::default()).unwrap();
    let scanned: Vec<_> = table.iter().collect::<Result<_, _>>().unwrap();
    assert_eq!(scanned.len(), 200);
    assert_eq!(scanned[199].key.user_key(), b"key00199");
    assert_eq!(scanned[199].value, vec![b'v'; 100]);
    assert!(table.get(b"key00123").unwrap().is_some());
}

/// A damaged data block is reported and the scan continues with the next one
#[test]
fn test_damaged_block_is_skipped() {
    let entries = numbered_entries(200);
    let mut data = table_bytes(&borrowed(&entries), CompressionType::None);
    data[20] ^= 0x40;

    let mut table = TableReader::new(source(data.clone()), Options::default()).unwrap();
    let results: Vec<_> = table.iter().collect();
    assert!(matches!(results[0], Err(Error::ChecksumMismatch { offset: 0, .. })));
    let recovered = results.iter().filter(|r| r.is_ok()).count();
    assert!(recovered > 0 && recovered < 200);
    assert_eq!(results.iter().filter(|r| r.is_err()).count(), 1);

    let options = Options::new().recovery_mode(RecoveryMode::Halt);
    let mut halted = TableReader::new(source(data), options).unwrap();
    assert_eq!(halted.iter().count(), 1);
}

/// Files without a valid footer are not tables
#[test]
fn test_not_a_table() {
    let err = TableReader::new(source(vec![0u8; 10]), Options::default()).unwrap_err();
    assert!(matches!(err, Error::NotATable(_)));
    assert!(err.is_recoverable());

    let mut data = table_bytes(&[(b"k", 1, b"v")], CompressionType::None);
    let len = data.len();
    data[len - 1] ^= 0xFF;
    assert!(matches!(
        TableReader::new(source(data), Options::default()),
        Err(Error::NotATable(_))
    ));
}

/// An unknown compression code fails only that block
#[test]
fn test_unknown_compression_code() {
    let mut data = table_bytes(&[(b"k", 1, b"v")], CompressionType::None);
    let handle = TableReader::new(source(data.clone()), Options::default())
        .unwrap()
        .index_entries()[0]
        .handle;
    assert_eq!(handle.offset, 0);
    data[handle.size as usize] = 9;

    // Checksums off so the rewritten trailer byte is not reported as damage
    let mut table = TableReader::new(source(data), Options::new().verify_checksums(false)).unwrap();
    let results: Vec<_> = table.iter().collect();
    assert_eq!(results.len(), 1);
    assert!(matches!(results[0], Err(Error::UnsupportedCompression { code: 9, .. })));
}

/// Opening by path
#[test]
fn test_open_path() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&table_bytes(&[(b"a", 1, b"1"), (b"b", 2, b"2")], CompressionType::None))
        .unwrap();
    file.flush().unwrap();

    let mut table = TableReader::open(file.path(), Options::default()).unwrap();
    assert!(table.file_size() > FOOTER_SIZE as u64);
    assert_eq!(table.iter().count(), 2);
}
