//! Live and recovered record resolution.
//!
//! Logs and tables keep superseded versions of a key until compaction
//! removes them. Given every version found, the one with the highest
//! sequence number is what the database would return; everything older is
//! recovered history.

use crate::error::Error;
use crate::internal_key::{InternalKey, ValueType};
use crate::sstable::TableEntry;
use crate::write_batch::BatchEntry;
use serde::Serialize;

/// One key/value version found in a log or table file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecoveredRecord {
    /// File the record was read from
    pub source: String,
    /// Table level from the descriptor, `None` for logs and unlisted tables
    pub level: Option<u32>,
    /// Offset of the record in its file
    pub offset: u64,
    /// User key, sequence and kind
    pub key: InternalKey,
    /// Stored value, `None` for deletions
    pub value: Option<Vec<u8>>,
}

impl RecoveredRecord {
    /// Wraps an operation read from a log.
    pub fn from_batch_entry(source: impl Into<String>, entry: BatchEntry) -> Self {
        Self {
            source: source.into(),
            level: None,
            offset: entry.offset,
            key: InternalKey::new(entry.key, entry.sequence, entry.kind),
            value: entry.value,
        }
    }

    /// Wraps an entry read from a table.
    pub fn from_table_entry(source: impl Into<String>, level: Option<u32>, entry: TableEntry) -> Self {
        let value = match entry.key.value_type() {
            ValueType::Value => Some(entry.value),
            ValueType::Deletion => None,
        };
        Self {
            source: source.into(),
            level,
            offset: entry.block_offset + entry.offset,
            key: entry.key,
            value,
        }
    }

    fn same_write(&self, other: &RecoveredRecord) -> bool {
        self.key == other.key && self.value == other.value
    }
}

/// Resolution outcome for one record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RecordState {
    /// The newest version of its key.
    Live,
    /// Superseded by a newer version, or a second copy of the live write.
    Recovered,
    /// Shares the highest sequence number of its key with a different write.
    Ambiguous,
}

/// A record and its resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRecord {
    /// The record
    #[serde(flatten)]
    pub record: RecoveredRecord,
    /// Live, recovered or ambiguous
    pub state: RecordState,
}

/// Orders records by user key, newest first, and marks each one.
///
/// Per user key the highest sequence number is live. Two records with the
/// same user key and sequence number are one write seen twice (for example
/// in a log and in the table it was flushed to) when kind and value match;
/// the first is live and the copy is recovered. When they differ, every
/// record at that sequence is [`RecordState::Ambiguous`] if it is the
/// newest, and an [`Error::AmbiguousOrdering`] warning is returned for
/// each colliding sequence.
pub fn resolve(mut records: Vec<RecoveredRecord>) -> (Vec<ResolvedRecord>, Vec<Error>) {
    records.sort_by(|a, b| {
        a.key
            .user_key()
            .cmp(b.key.user_key())
            .then_with(|| b.key.sequence().cmp(&a.key.sequence()))
    });

    let mut resolved: Vec<ResolvedRecord> = Vec::with_capacity(records.len());
    let mut warnings = Vec::new();

    let mut start = 0;
    while start < records.len() {
        let user_key = records[start].key.user_key();
        let end = start
            + records[start..]
                .iter()
                .take_while(|r| r.key.user_key() == user_key)
                .count();
        resolve_key(&records[start..end], &mut resolved, &mut warnings);
        start = end;
    }

    (resolved, warnings)
}

fn resolve_key(versions: &[RecoveredRecord], out: &mut Vec<ResolvedRecord>, warnings: &mut Vec<Error>) {
    let mut newest = true;
    for group in versions.chunk_by(|a, b| a.key.sequence() == b.key.sequence()) {
        let conflicting = group.iter().any(|r| !r.same_write(&group[0]));
        if conflicting {
            let sequence = group[0].key.sequence();
            log::warn!(
                "{} different records share sequence {} for key {:?}",
                group.len(),
                sequence,
                String::from_utf8_lossy(group[0].key.user_key())
            );
            warnings.push(Error::AmbiguousOrdering {
                key: group[0].key.user_key().to_vec(),
                sequence,
                count: group.len(),
            });
        }

        for (i, record) in group.iter().enumerate() {
            let state = match (newest, conflicting, i) {
                (true, true, _) => RecordState::Ambiguous,
                (true, false, 0) => RecordState::Live,
                _ => RecordState::Recovered,
            };
            out.push(ResolvedRecord { record: record.clone(), state });
        }
        newest = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(key: &str, sequence: u64, value: &str) -> RecoveredRecord {
        RecoveredRecord {
            source: "000003.log".into(),
            level: None,
            offset: sequence * 10,
            key: InternalKey::new(key.as_bytes().to_vec(), sequence, ValueType::Value),
            value: Some(value.as_bytes().to_vec()),
        }
    }

    fn delete(key: &str, sequence: u64) -> RecoveredRecord {
        RecoveredRecord {
            source: "000005.ldb".into(),
            level: Some(0),
            offset: 0,
            key: InternalKey::new(key.as_bytes().to_vec(), sequence, ValueType::Deletion),
            value: None,
        }
    }

    fn states(resolved: &[ResolvedRecord]) -> Vec<(String, u64, RecordState)> {
        resolved
            .iter()
            .map(|r| {
                (
                    String::from_utf8_lossy(r.record.key.user_key()).into_owned(),
                    r.record.key.sequence(),
                    r.state,
                )
            })
            .collect()
    }

    #[test]
    fn test_newest_version_is_live() {
        let (resolved, warnings) =
            resolve(vec![put("b", 1, "x"), put("a", 2, "old"), put("a", 7, "new"), delete("b", 4)]);
        assert!(warnings.is_empty());
        assert_eq!(
            states(&resolved),
            vec![
                ("a".into(), 7, RecordState::Live),
                ("a".into(), 2, RecordState::Recovered),
                ("b".into(), 4, RecordState::Live),
                ("b".into(), 1, RecordState::Recovered),
            ]
        );
        assert_eq!(resolved[2].record.value, None);
    }

    #[test]
    fn test_equal_sequence_is_ambiguous() {
        let (resolved, warnings) = resolve(vec![put("k", 5, "one"), put("k", 5, "two"), put("k", 3, "x")]);
        assert_eq!(warnings.len(), 1);
        assert!(matches!(
            &warnings[0],
            Error::AmbiguousOrdering { key, sequence: 5, count: 2 } if key == b"k"
        ));
        assert_eq!(
            resolved.iter().map(|r| r.state).collect::<Vec<_>>(),
            vec![RecordState::Ambiguous, RecordState::Ambiguous, RecordState::Recovered]
        );
        assert!(!resolved.iter().any(|r| r.state == RecordState::Live));
    }

    #[test]
    fn test_older_collision_is_reported_but_not_ambiguous() {
        let (resolved, warnings) = resolve(vec![put("k", 9, "new"), put("k", 5, "one"), delete("k", 5)]);
        assert_eq!(warnings.len(), 1);
        assert_eq!(resolved[0].state, RecordState::Live);
        assert_eq!(resolved[1].state, RecordState::Recovered);
        assert_eq!(resolved[2].state, RecordState::Recovered);
    }

    #[test]
    fn test_duplicate_write_is_not_a_collision() {
        let mut flushed = put("k", 5, "v");
        flushed.source = "000007.ldb".into();
        flushed.level = Some(0);
        let (resolved, warnings) = resolve(vec![put("k", 5, "v"), flushed]);
        assert!(warnings.is_empty());
        assert_eq!(resolved[0].state, RecordState::Live);
        assert_eq!(resolved[0].record.source, "000003.log");
        assert_eq!(resolved[1].state, RecordState::Recovered);
    }

    #[test]
    fn test_serialized_shape() {
        let (resolved, _) = resolve(vec![put("a", 1, "v")]);
        let json = serde_json::to_value(&resolved[0]).unwrap();
        assert_eq!(json["state"], "Live");
        assert_eq!(json["source"], "000003.log");
        assert_eq!(json["offset"], 10);
    }
}
