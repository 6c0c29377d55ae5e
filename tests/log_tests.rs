// Log file tests
// Covers batch decoding, fragment reassembly and resynchronisation after damage

mod common;

use common::{init_logging, log_bytes, put_log, source};
use leveldb_forensics::wal::{RecordType, BLOCK_SIZE, HEADER_SIZE};
use leveldb_forensics::internal_key::MAX_SEQUENCE;
use leveldb_forensics::write_batch::WriteBatchBuilder;
use leveldb_forensics::{Error, LogReader, Options, RecoveryMode, ValueType};
use proptest::prelude::*;
use std::io::Write;
use tempfile::NamedTempFile;

/// A single Full record holding Put("id", "1")
#[test]
fn test_single_put() {
    init_logging();
    let data = put_log(7, &[(b"id", b"1")]);
    assert!(data.len() < BLOCK_SIZE);

    let entries: Vec<_> = LogReader::new(source(data), Options::default())
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].sequence, 7);
    assert_eq!(entries[0].kind, ValueType::Value);
    assert_eq!(entries[0].key, b"id");
    assert_eq!(entries[0].value.as_deref(), Some(&b"1"[..]));
    // tag byte follows the 7-byte header and the 12-byte batch header
    assert_eq!(entries[0].offset, (HEADER_SIZE + 12) as u64);
}

/// Physical records expose header fields and checksum state
#[test]
fn test_physical_record_fields() {
    let data = log_bytes(&[b"hello".to_vec(), Vec::new()]);
    let records: Vec<_> = LogReader::new(source(data), Options::default())
        .physical_records()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0].offset, 0);
    assert_eq!(records[0].length, 5);
    assert_eq!(records[0].record_type, RecordType::Full);
    assert!(records[0].checksum_ok);
    assert_eq!(records[1].offset, (HEADER_SIZE + 5) as u64);
    assert_eq!(records[1].length, 0);
}

/// Offsets of operations in a batch that crosses a block boundary skip the
/// second fragment's header
#[test]
fn test_offsets_across_block_boundary() {
    let mut batch = WriteBatchBuilder::new();
    batch.put(b"a", &vec![b'x'; 32760]).put(b"b", b"2");
    let data = log_bytes(&[batch.encode(1)]);

    let records: Vec<_> = LogReader::new(source(data.clone()), Options::default())
        .records()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records[0].fragments, 2);

    let entries: Vec<_> = LogReader::new(source(data.clone()), Options::default())
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].offset, (HEADER_SIZE + 12) as u64);

    // Payload byte 32778 sits 17 bytes into the second block's payload
    let first_payload = (BLOCK_SIZE - HEADER_SIZE) as u64;
    let expected = (BLOCK_SIZE + HEADER_SIZE) as u64 + (32778 - first_payload);
    assert_eq!(entries[1].offset, expected);
    assert_eq!(data[expected as usize], 1);
    assert_eq!(data[expected as usize + 2], b'b');
}

/// A record larger than a block is reassembled from its fragments
#[test]
fn test_fragmented_record() {
    let big: Vec<u8> = (0..3 * BLOCK_SIZE).map(|i| (i % 251) as u8).collect();
    let data = log_bytes(&[b"small".to_vec(), big.clone(), b"tail".to_vec()]);

    let records: Vec<_> = LogReader::new(source(data), Options::default())
        .records()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(records.len(), 3);
    assert_eq!(records[1].data, big);
    assert_eq!(records[1].fragments, 4);
    assert_eq!(records[2].data, b"tail");
}

/// A flipped payload bit is reported and the next block is still read
#[test]
fn test_bit_flip_resynchronises() {
    init_logging();
    let filler = vec![b'x'; BLOCK_SIZE - HEADER_SIZE];
    let mut data = log_bytes(&[filler, b"second".to_vec()]);
    data[HEADER_SIZE + 10] ^= 0x01;

    let results: Vec<_> = LogReader::new(source(data.clone()), Options::default())
        .physical_records()
        .collect();
    assert_eq!(results.len(), 2);
    assert!(matches!(results[0], Err(Error::ChecksumMismatch { offset: 0, .. })));
    let second = results[1].as_ref().unwrap();
    assert_eq!(second.offset, BLOCK_SIZE as u64);
    assert_eq!(second.contents, b"second");

    // Without verification the damaged record is returned and flagged
    let unchecked: Vec<_> = LogReader::new(source(data), Options::new().verify_checksums(false))
        .physical_records()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(unchecked.len(), 2);
    assert!(!unchecked[0].checksum_ok);
    assert!(unchecked[1].checksum_ok);
}

/// Damage to one batch does not hide batches in later blocks
#[test]
fn test_damaged_batch_is_skipped() {
    let mut first = WriteBatchBuilder::new();
    first.put(b"a", &vec![b'v'; BLOCK_SIZE - HEADER_SIZE - 12 - 1 - 1 - 1 - 3]);
    let first = first.encode(1);
    assert_eq!(first.len(), BLOCK_SIZE - HEADER_SIZE);

    let mut second = WriteBatchBuilder::new();
    second.put(b"b", b"2").delete(b"a");
    let mut data = log_bytes(&[first, second.encode(2)]);
    data[HEADER_SIZE + 40] ^= 0xFF;

    let (entries, warnings) = LogReader::new(source(data), Options::default()).recover_all().unwrap();
    assert_eq!(warnings.len(), 1);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].key, b"b");
    assert_eq!(entries[0].sequence, 2);
    assert_eq!(entries[1].kind, ValueType::Deletion);
    assert_eq!(entries[1].sequence, 3);
}

/// Halt mode ends the stream at the first error
#[test]
fn test_halt_mode() {
    let filler = vec![b'x'; BLOCK_SIZE - HEADER_SIZE];
    let mut data = log_bytes(&[filler, b"second".to_vec()]);
    data[HEADER_SIZE] ^= 0x01;

    let options = Options::new().recovery_mode(RecoveryMode::Halt);
    let results: Vec<_> = LogReader::new(source(data), options).physical_records().collect();
    assert_eq!(results.len(), 1);
    assert!(results[0].is_err());
}

/// A batch that declares more operations than it holds yields what it has
#[test]
fn test_short_batch() {
    let mut batch = WriteBatchBuilder::new().put(b"k1", b"v1").put(b"k2", b"v2").encode(10);
    batch[8] = 5; // declared count
    let (entries, warnings) = LogReader::new(source(log_bytes(&[batch])), Options::default())
        .recover_all()
        .unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(warnings.len(), 1);
    assert!(matches!(
        warnings[0],
        Error::MalformedBatch { declared: 5, decoded: 2, .. }
    ));
}

/// A batch whose sequence range leaves the 56-bit space is malformed, not
/// a source of out-of-range internal keys
#[test]
fn test_sequence_past_56_bits() {
    let data = put_log(0xFF00_0000_0000_0001, &[(b"k", b"v")]);
    let (entries, warnings) = LogReader::new(source(data), Options::default())
        .recover_all()
        .unwrap();
    assert!(entries.is_empty());
    assert_eq!(warnings.len(), 1);
    assert!(matches!(warnings[0], Error::MalformedBatch { declared: 1, decoded: 0, .. }));

    let mut batch = WriteBatchBuilder::new();
    batch.put(b"a", b"1").put(b"b", b"2");
    let data = log_bytes(&[batch.encode(MAX_SEQUENCE)]);
    let (entries, warnings) = LogReader::new(source(data), Options::default())
        .recover_all()
        .unwrap();
    assert!(entries.is_empty());
    assert_eq!(warnings.len(), 1);

    let data = put_log(MAX_SEQUENCE, &[(b"k", b"v")]);
    let entries: Vec<_> = LogReader::new(source(data), Options::default())
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries[0].internal_key().sequence(), MAX_SEQUENCE);
}

/// Opening by path
#[test]
fn test_open_path() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(&put_log(1, &[(b"k", b"v")])).unwrap();
    file.flush().unwrap();

    let entries: Vec<_> = LogReader::open(file.path(), Options::default())
        .unwrap()
        .entries()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(entries.len(), 1);

    assert!(matches!(
        LogReader::open("/nonexistent/000001.log", Options::default()),
        Err(Error::Io(_))
    ));
}

proptest! {
    /// Every operation of a well-formed batch gets batch sequence + position
    #[test]
    fn prop_batch_sequences(
        sequence in 0u64..(1u64 << 48),
        ops in prop::collection::vec(
            (prop::collection::vec(any::<u8>(), 0..16), prop::option::of(prop::collection::vec(any::<u8>(), 0..64))),
            0..40,
        ),
    ) {
        let mut batch = WriteBatchBuilder::new();
        for (key, value) in &ops {
            match value {
                Some(value) => batch.put(key, value),
                None => batch.delete(key),
            };
        }
        let data = log_bytes(&[batch.encode(sequence)]);
        let entries: Vec<_> = LogReader::new(source(data), Options::default())
            .entries()
            .collect::<Result<_, _>>()
            .unwrap();

        prop_assert_eq!(entries.len(), ops.len());
        for (i, (entry, (key, value))) in entries.iter().zip(&ops).enumerate() {
            prop_assert_eq!(entry.sequence, sequence + i as u64);
            prop_assert_eq!(&entry.key, key);
            prop_assert_eq!(&entry.value, value);
        }
    }
}
