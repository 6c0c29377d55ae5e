//! VersionEdit records.
//!
//! Each logical record of a MANIFEST is a sequence of `(tag, payload)`
//! fields read until the record is exhausted:
//!
//! | tag | field              | payload                                   |
//! |-----|--------------------|-------------------------------------------|
//! | 1   | comparator         | length-prefixed name                      |
//! | 2   | log number         | varint64                                  |
//! | 3   | next file number   | varint64                                  |
//! | 4   | last sequence      | varint64                                  |
//! | 5   | compact pointer    | varint32 level, length-prefixed key       |
//! | 6   | deleted file       | varint32 level, varint64 number           |
//! | 7   | new file           | level, number, size, smallest, largest    |
//! | 9   | prev log number    | varint64                                  |
//!
//! Tag 8 was used by an early format for large value references and is not
//! supported.

#[cfg(any(test, feature = "fixtures"))]
use crate::coding::{put_length_prefixed_slice, put_varint32, put_varint64};
use crate::coding::Decoder;
use crate::error::{Error, Result};
use crate::internal_key::InternalKey;
use serde::Serialize;

/// Number of levels in a LevelDB version.
pub const NUM_LEVELS: usize = 7;

/// Field tags of a VersionEdit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EditTag {
    /// Comparator name
    Comparator = 1,
    /// Log number
    LogNumber = 2,
    /// Next file number
    NextFileNumber = 3,
    /// Last sequence
    LastSequence = 4,
    /// Compact pointer
    CompactPointer = 5,
    /// Deleted file
    DeletedFile = 6,
    /// New file
    NewFile = 7,
    /// Prev log number
    PrevLogNumber = 9,
}

impl EditTag {
    /// Converts a tag varint into an `EditTag`.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            1 => Some(EditTag::Comparator),
            2 => Some(EditTag::LogNumber),
            3 => Some(EditTag::NextFileNumber),
            4 => Some(EditTag::LastSequence),
            5 => Some(EditTag::CompactPointer),
            6 => Some(EditTag::DeletedFile),
            7 => Some(EditTag::NewFile),
            9 => Some(EditTag::PrevLogNumber),
            _ => None,
        }
    }
}

/// Metadata for a table file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileMetaData {
    /// File number identifier
    pub number: u64,
    /// Size of the file in bytes
    pub file_size: u64,
    /// Smallest internal key in the file
    pub smallest: Vec<u8>,
    /// Largest internal key in the file
    pub largest: Vec<u8>,
}

impl FileMetaData {
    /// Decodes the smallest key, if it is a well-formed internal key.
    pub fn smallest_key(&self) -> Result<InternalKey> {
        InternalKey::decode(&self.smallest)
    }

    /// Decodes the largest key, if it is a well-formed internal key.
    pub fn largest_key(&self) -> Result<InternalKey> {
        InternalKey::decode(&self.largest)
    }
}

/// A table file added at a level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewFile {
    /// Level where the file is added
    pub level: u32,
    /// The file itself
    pub file: FileMetaData,
}

/// A table file removed from a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DeletedFile {
    /// Level where the file is located
    pub level: u32,
    /// File number to delete
    pub number: u64,
}

/// The key where the next compaction of a level starts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompactPointer {
    /// Level
    pub level: u32,
    /// Internal key
    pub key: Vec<u8>,
}

/// A version edit describes changes to the database version
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct VersionEdit {
    /// File offset of the record the edit was decoded from.
    pub offset: u64,
    /// Comparator name, if the edit sets it.
    pub comparator: Option<String>,
    /// Log number, if set.
    pub log_number: Option<u64>,
    /// Previous log number, if set.
    pub prev_log_number: Option<u64>,
    /// Next file number, if set.
    pub next_file_number: Option<u64>,
    /// Last sequence, if set.
    pub last_sequence: Option<u64>,
    /// Compact pointers in record order.
    pub compact_pointers: Vec<CompactPointer>,
    /// Deleted files in record order.
    pub deleted_files: Vec<DeletedFile>,
    /// New files in record order.
    pub new_files: Vec<NewFile>,
}

impl VersionEdit {
    /// Create an empty edit
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes one MANIFEST record whose payload starts at `base_offset`.
    pub fn decode(data: &[u8], base_offset: u64) -> Result<Self> {
        let mut decoder = Decoder::with_base_offset(data, base_offset);
        let mut edit = VersionEdit { offset: base_offset, ..Default::default() };

        while !decoder.is_empty() {
            let tag_offset = decoder.offset();
            let raw_tag = decoder.read_varint32()?;
            let Some(tag) = EditTag::from_u32(raw_tag) else {
                return Err(Error::corruption(format!(
                    "unknown version edit tag {} at offset {}",
                    raw_tag, tag_offset
                )));
            };

            match tag {
                EditTag::Comparator => {
                    let name = decoder.read_length_prefixed()?;
                    let name = String::from_utf8(name.to_vec()).map_err(|_| {
                        Error::corruption(format!(
                            "comparator name at offset {} is not UTF-8",
                            tag_offset
                        ))
                    })?;
                    edit.comparator = Some(name);
                }
                EditTag::LogNumber => edit.log_number = Some(decoder.read_varint64()?),
                EditTag::PrevLogNumber => edit.prev_log_number = Some(decoder.read_varint64()?),
                EditTag::NextFileNumber => edit.next_file_number = Some(decoder.read_varint64()?),
                EditTag::LastSequence => edit.last_sequence = Some(decoder.read_varint64()?),
                EditTag::CompactPointer => {
                    let level = read_level(&mut decoder)?;
                    let key = decoder.read_length_prefixed()?.to_vec();
                    edit.compact_pointers.push(CompactPointer { level, key });
                }
                EditTag::DeletedFile => {
                    let level = read_level(&mut decoder)?;
                    let number = decoder.read_varint64()?;
                    edit.deleted_files.push(DeletedFile { level, number });
                }
                EditTag::NewFile => {
                    let level = read_level(&mut decoder)?;
                    let number = decoder.read_varint64()?;
                    let file_size = decoder.read_varint64()?;
                    let smallest = decoder.read_length_prefixed()?.to_vec();
                    let largest = decoder.read_length_prefixed()?.to_vec();
                    edit.new_files.push(NewFile {
                        level,
                        file: FileMetaData { number, file_size, smallest, largest },
                    });
                }
            }
        }

        Ok(edit)
    }

    /// Encodes the edit in MANIFEST record form.
    #[cfg(any(test, feature = "fixtures"))]
    pub fn encode(&self) -> Vec<u8> {
        let mut dst = Vec::new();
        if let Some(name) = &self.comparator {
            put_varint32(&mut dst, EditTag::Comparator as u32);
            put_length_prefixed_slice(&mut dst, name.as_bytes());
        }
        let counters = [
            (EditTag::LogNumber, self.log_number),
            (EditTag::PrevLogNumber, self.prev_log_number),
            (EditTag::NextFileNumber, self.next_file_number),
            (EditTag::LastSequence, self.last_sequence),
        ];
        for (tag, value) in counters {
            if let Some(value) = value {
                put_varint32(&mut dst, tag as u32);
                put_varint64(&mut dst, value);
            }
        }
        for pointer in &self.compact_pointers {
            put_varint32(&mut dst, EditTag::CompactPointer as u32);
            put_varint32(&mut dst, pointer.level);
            put_length_prefixed_slice(&mut dst, &pointer.key);
        }
        for deleted in &self.deleted_files {
            put_varint32(&mut dst, EditTag::DeletedFile as u32);
            put_varint32(&mut dst, deleted.level);
            put_varint64(&mut dst, deleted.number);
        }
        for new_file in &self.new_files {
            put_varint32(&mut dst, EditTag::NewFile as u32);
            put_varint32(&mut dst, new_file.level);
            put_varint64(&mut dst, new_file.file.number);
            put_varint64(&mut dst, new_file.file.file_size);
            put_length_prefixed_slice(&mut dst, &new_file.file.smallest);
            put_length_prefixed_slice(&mut dst, &new_file.file.largest);
        }
        dst
    }

    /// Set the comparator name
    pub fn set_comparator(&mut self, name: impl Into<String>) -> &mut Self {
        self.comparator = Some(name.into());
        self
    }

    /// Set the log number
    pub fn set_log_number(&mut self, number: u64) -> &mut Self {
        self.log_number = Some(number);
        self
    }

    /// Set the previous log number
    pub fn set_prev_log_number(&mut self, number: u64) -> &mut Self {
        self.prev_log_number = Some(number);
        self
    }

    /// Set the next file number
    pub fn set_next_file_number(&mut self, number: u64) -> &mut Self {
        self.next_file_number = Some(number);
        self
    }

    /// Set the last sequence number
    pub fn set_last_sequence(&mut self, sequence: u64) -> &mut Self {
        self.last_sequence = Some(sequence);
        self
    }

    /// Record a compact pointer
    pub fn set_compact_pointer(&mut self, level: u32, key: &[u8]) -> &mut Self {
        self.compact_pointers.push(CompactPointer { level, key: key.to_vec() });
        self
    }

    /// Add a table file
    pub fn add_file(
        &mut self,
        level: u32,
        number: u64,
        file_size: u64,
        smallest: &[u8],
        largest: &[u8],
    ) -> &mut Self {
        self.new_files.push(NewFile {
            level,
            file: FileMetaData {
                number,
                file_size,
                smallest: smallest.to_vec(),
                largest: largest.to_vec(),
            },
        });
        self
    }

    /// Delete a table file
    pub fn delete_file(&mut self, level: u32, number: u64) -> &mut Self {
        self.deleted_files.push(DeletedFile { level, number });
        self
    }
}

fn read_level(decoder: &mut Decoder<'_>) -> Result<u32> {
    let offset = decoder.offset();
    let level = decoder.read_varint32()?;
    if level as usize >= NUM_LEVELS {
        return Err(Error::corruption(format!("level {} at offset {} out of range", level, offset)));
    }
    Ok(level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_encode_decode() {
        let mut edit = VersionEdit::new();
        edit.set_comparator("leveldb.BytewiseComparator")
            .set_log_number(12)
            .set_prev_log_number(0)
            .set_next_file_number(14)
            .set_last_sequence(900)
            .set_compact_pointer(1, b"m\x01\x00\x00\x00\x00\x00\x00\x00")
            .delete_file(0, 3)
            .add_file(1, 13, 4096, b"a\x01\x01\x00\x00\x00\x00\x00\x00", b"z\x01\x02\x00\x00\x00\x00\x00\x00");

        let decoded = VersionEdit::decode(&edit.encode(), 0).unwrap();
        assert_eq!(decoded, edit);
        assert_eq!(decoded.new_files[0].file.smallest_key().unwrap().user_key(), b"a");
    }

    #[test]
    fn test_decode_real_layout() {
        // comparator, log number 5, next file 7, last sequence 0
        let mut data = vec![1, 26];
        data.extend_from_slice(b"leveldb.BytewiseComparator");
        data.extend_from_slice(&[2, 5, 3, 7, 4, 0]);

        let edit = VersionEdit::decode(&data, 7).unwrap();
        assert_eq!(edit.offset, 7);
        assert_eq!(edit.comparator.as_deref(), Some("leveldb.BytewiseComparator"));
        assert_eq!(edit.log_number, Some(5));
        assert_eq!(edit.next_file_number, Some(7));
        assert_eq!(edit.last_sequence, Some(0));
        assert_eq!(edit.prev_log_number, None);
    }

    #[test]
    fn test_unsupported_tags() {
        assert!(matches!(VersionEdit::decode(&[8, 0], 0), Err(Error::Corruption(_))));
        assert!(matches!(VersionEdit::decode(&[42], 0), Err(Error::Corruption(_))));
    }

    #[test]
    fn test_bad_level_and_truncation() {
        assert!(VersionEdit::decode(&[6, 7, 1], 0).is_err());
        assert!(matches!(VersionEdit::decode(&[7, 0, 3], 0), Err(Error::Truncated { .. })));
    }
}
