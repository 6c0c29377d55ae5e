//! Object store names and records.

use crate::coding::Decoder;
use crate::config::Options;
use crate::error::{Error, Result};
use crate::indexeddb::key::{
    decode_utf16_be, IdbKey, KeyPrefix, KeyPrefixType, OBJECT_STORE_META_DATA, OBJECT_STORE_NAME,
};
use crate::indexeddb::value::ObjectStoreValue;
use crate::internal_key::ValueType;
use crate::recovery::{RecordState, RecoveredRecord};
use serde::Serialize;
use std::collections::BTreeMap;

/// Object store names learned from database metadata records.
///
/// A store can be renamed, so the name written with the highest sequence
/// number wins.
#[derive(Debug, Clone, Default)]
pub struct ObjectStoreCatalog {
    names: BTreeMap<(u64, u64), (u64, String)>,
}

impl ObjectStoreCatalog {
    /// Creates an empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from every name record among `records`.
    ///
    /// Records that are not object store names are ignored; a name record
    /// that fails to decode is logged and skipped.
    pub fn from_records<'a, I>(records: I) -> Self
    where
        I: IntoIterator<Item = &'a RecoveredRecord>,
    {
        let mut catalog = Self::new();
        for record in records {
            let Some(value) = record.value.as_deref() else {
                continue;
            };
            if let Err(e) = catalog.observe(record.key.user_key(), value, record.key.sequence()) {
                log::debug!("Skipping object store metadata at offset {}: {}", record.offset, e);
            }
        }
        catalog
    }

    /// Learns a name if `key` is an object store name metadata key.
    ///
    /// Returns whether the record was a name record.
    pub fn observe(&mut self, key: &[u8], value: &[u8], sequence: u64) -> Result<bool> {
        let Some((database_id, object_store_id)) = parse_name_key(key)? else {
            return Ok(false);
        };
        let name = decode_utf16_be(value, 0)?;
        let slot = self.names.entry((database_id, object_store_id)).or_insert((sequence, String::new()));
        if sequence >= slot.0 {
            *slot = (sequence, name);
        }
        Ok(true)
    }

    /// Registers a name directly.
    pub fn insert(&mut self, database_id: u64, object_store_id: u64, name: impl Into<String>) {
        self.names.insert((database_id, object_store_id), (u64::MAX, name.into()));
    }

    /// Name of an object store, if known.
    pub fn name(&self, database_id: u64, object_store_id: u64) -> Option<&str> {
        self.names.get(&(database_id, object_store_id)).map(|(_, name)| name.as_str())
    }

    /// Known stores as `((database_id, object_store_id), name)`.
    pub fn iter(&self) -> impl Iterator<Item = ((u64, u64), &str)> + '_ {
        self.names.iter().map(|(ids, (_, name))| (*ids, name.as_str()))
    }

    /// Number of known stores.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Returns true if no names are known.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Returns `(database_id, object_store_id)` for an object store name key.
fn parse_name_key(key: &[u8]) -> Result<Option<(u64, u64)>> {
    let mut decoder = Decoder::new(key);
    let prefix = KeyPrefix::read(&mut decoder)?;
    if prefix.prefix_type()? != KeyPrefixType::DatabaseMetadata
        || decoder.peek_u8() != Some(OBJECT_STORE_META_DATA)
    {
        return Ok(None);
    }
    decoder.read_u8()?;
    let object_store_id = decoder.read_varint64()?;
    if decoder.read_u8()? != OBJECT_STORE_NAME {
        return Ok(None);
    }
    Ok(Some((prefix.database_id, object_store_id)))
}

/// A recovered object store record, decoded and named.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectStoreRecord {
    /// File the record came from
    pub source: String,
    /// Table level, `None` for log records
    pub level: Option<u32>,
    /// Offset of the record in its file
    pub offset: u64,
    /// Sequence number
    pub sequence: u64,
    /// Put or Delete
    pub kind: ValueType,
    /// Live or recovered, when resolution has run
    pub state: Option<RecordState>,
    /// Database id
    pub database_id: u64,
    /// Object store id
    pub object_store_id: u64,
    /// Object store name, when the catalog knows it
    pub object_store_name: Option<String>,
    /// The record's primary key
    pub key: IdbKey,
    /// Decoded value; `None` for deletions or undecodable values
    pub value: Option<ObjectStoreValue>,
    /// Why the value could not be decoded
    pub value_error: Option<String>,
    /// Stored user key
    pub raw_key: Vec<u8>,
    /// Stored value
    pub raw_value: Option<Vec<u8>>,
}

impl ObjectStoreRecord {
    /// Decodes `record` if it belongs to an object store.
    ///
    /// Returns `Ok(None)` for metadata, index and other non-record keys. A
    /// value that fails to decode still yields a record, with the error in
    /// `value_error`.
    pub fn decode(
        record: &RecoveredRecord,
        state: Option<RecordState>,
        catalog: &ObjectStoreCatalog,
        options: &Options,
    ) -> Result<Option<Self>> {
        let user_key = record.key.user_key();
        let mut decoder = Decoder::with_base_offset(user_key, record.offset);
        let prefix = KeyPrefix::read(&mut decoder)?;
        if prefix.prefix_type()? != KeyPrefixType::ObjectStoreData {
            return Ok(None);
        }
        let key = IdbKey::read(&mut decoder)?;
        if !decoder.is_empty() {
            return Err(Error::corruption(format!(
                "{} trailing bytes after the record key at offset {}",
                decoder.remaining(),
                decoder.offset()
            )));
        }

        let (value, value_error) = match record.value.as_deref() {
            Some(raw) if !raw.is_empty() => match ObjectStoreValue::decode(raw, record.offset, options) {
                Ok(value) => (Some(value), None),
                Err(e) => {
                    log::debug!("Undecodable value at offset {}: {}", record.offset, e);
                    (None, Some(e.to_string()))
                }
            },
            _ => (None, None),
        };

        Ok(Some(Self {
            source: record.source.clone(),
            level: record.level,
            offset: record.offset,
            sequence: record.key.sequence(),
            kind: record.key.value_type(),
            state,
            database_id: prefix.database_id,
            object_store_id: prefix.object_store_id,
            object_store_name: catalog
                .name(prefix.database_id, prefix.object_store_id)
                .map(str::to_owned),
            key,
            value,
            value_error,
            raw_key: user_key.to_vec(),
            raw_value: record.value.clone(),
        }))
    }
}

/// Builds a name metadata key, as Chromium writes it.
pub fn object_store_name_key(database_id: u64, object_store_id: u64) -> Vec<u8> {
    let mut key = Vec::new();
    crate::indexeddb::key::encode_key_prefix(&mut key, database_id, 0, 0);
    key.push(OBJECT_STORE_META_DATA);
    crate::coding::put_varint64(&mut key, object_store_id);
    key.push(OBJECT_STORE_NAME);
    key
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blink::StructuredValue;
    use crate::indexeddb::key::encode_key_prefix;
    use crate::internal_key::InternalKey;

    fn utf16_be(s: &str) -> Vec<u8> {
        s.encode_utf16().flat_map(u16::to_be_bytes).collect()
    }

    fn record(key: Vec<u8>, sequence: u64, value: Option<&[u8]>) -> RecoveredRecord {
        let kind = if value.is_some() { ValueType::Value } else { ValueType::Deletion };
        RecoveredRecord {
            source: "000003.log".into(),
            level: None,
            offset: 40,
            key: InternalKey::new(key, sequence, kind),
            value: value.map(<[u8]>::to_vec),
        }
    }

    #[test]
    fn test_catalog_learns_names() {
        let records = vec![
            record(object_store_name_key(1, 1), 5, Some(&utf16_be("notes"))),
            record(object_store_name_key(1, 1), 9, Some(&utf16_be("drafts"))),
            record(object_store_name_key(1, 2), 7, Some(&utf16_be("tags"))),
            record(object_store_name_key(1, 3), 8, None),
        ];
        let catalog = ObjectStoreCatalog::from_records(&records);
        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog.name(1, 1), Some("drafts"));
        assert_eq!(catalog.name(1, 2), Some("tags"));
        assert_eq!(catalog.name(2, 1), None);
    }

    #[test]
    fn test_catalog_ignores_other_keys() {
        let mut catalog = ObjectStoreCatalog::new();
        let mut key = Vec::new();
        encode_key_prefix(&mut key, 1, 0, 0);
        key.push(OBJECT_STORE_META_DATA);
        key.push(4);
        key.push(1); // key path, not the name
        assert!(!catalog.observe(&key, b"\x00\x01", 1).unwrap());
        assert!(catalog.observe(&object_store_name_key(1, 4), b"\x00", 1).is_err());
        assert!(catalog.is_empty());
    }

    #[test]
    fn test_object_store_record() {
        let mut catalog = ObjectStoreCatalog::new();
        catalog.insert(1, 2, "notes");

        let mut key = Vec::new();
        encode_key_prefix(&mut key, 1, 2, 1);
        key.extend_from_slice(&[1, 2, 0x00, b'i', 0x00, b'd']);
        let value = b"\x01\xff\x14\xff\x0fo\"\x01aI\x02{\x01";

        let record = ObjectStoreRecord::decode(
            &record(key.clone(), 12, Some(value)),
            Some(RecordState::Live),
            &catalog,
            &Options::default(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(record.object_store_name.as_deref(), Some("notes"));
        assert_eq!(record.key, IdbKey::String("id".into()));
        assert_eq!(record.sequence, 12);
        assert_eq!(record.state, Some(RecordState::Live));
        let decoded = record.value.unwrap();
        assert_eq!(
            decoded.script_value().unwrap().value.get("a"),
            Some(&StructuredValue::Int32(1))
        );
        assert_eq!(record.raw_key, key);
    }

    #[test]
    fn test_bad_value_keeps_record() {
        let mut key = Vec::new();
        encode_key_prefix(&mut key, 1, 2, 1);
        key.push(0);
        let record = ObjectStoreRecord::decode(
            &record(key, 3, Some(b"\x01\xff\x0f!")),
            None,
            &ObjectStoreCatalog::new(),
            &Options::default(),
        )
        .unwrap()
        .unwrap();
        assert!(record.value.is_none());
        assert!(record.value_error.is_some());
        assert!(record.object_store_name.is_none());
    }

    #[test]
    fn test_metadata_is_not_a_record() {
        let record = ObjectStoreRecord::decode(
            &record(object_store_name_key(1, 1), 1, Some(&utf16_be("x"))),
            None,
            &ObjectStoreCatalog::new(),
            &Options::default(),
        )
        .unwrap();
        assert!(record.is_none());
    }
}
