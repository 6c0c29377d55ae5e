//! Log writer used to build evidence files.

use super::record::{encode_fragment, RecordType};
use super::{BLOCK_SIZE, HEADER_SIZE};
use crate::error::Result;
use std::io::Write;

/// Appends logical records in the block-aligned log format, fragmenting
/// them across 32 KiB blocks the same way a live store would.
///
/// The reader never writes to a store it examines; this writer exists so
/// that tests and benchmarks can produce byte-exact logs and MANIFESTs.
pub struct LogWriter<W> {
    writer: W,
    block_offset: usize,
    file_size: u64,
}

impl<W: Write> LogWriter<W> {
    /// Creates a writer positioned at the start of a fresh log.
    pub fn new(writer: W) -> Self {
        Self { writer, block_offset: 0, file_size: 0 }
    }

    /// Appends one logical record.
    ///
    /// Records that do not fit in the current block are split into
    /// First/Middle/Last fragments. An empty record is written as an empty
    /// Full fragment.
    pub fn add_record(&mut self, data: &[u8]) -> Result<()> {
        let mut left = data;
        let mut begin = true;

        loop {
            let leftover = BLOCK_SIZE - self.block_offset;
            if leftover < HEADER_SIZE {
                // Pad the block trailer with zeroes
                self.write_raw(&[0u8; HEADER_SIZE][..leftover])?;
                self.block_offset = 0;
            }

            let available = BLOCK_SIZE - self.block_offset - HEADER_SIZE;
            let fragment_len = left.len().min(available);
            let end = fragment_len == left.len();

            let record_type = match (begin, end) {
                (true, true) => RecordType::Full,
                (true, false) => RecordType::First,
                (false, true) => RecordType::Last,
                (false, false) => RecordType::Middle,
            };

            let encoded = encode_fragment(record_type, &left[..fragment_len]);
            self.write_raw(&encoded)?;
            self.block_offset += encoded.len();

            left = &left[fragment_len..];
            begin = false;
            if end {
                return Ok(());
            }
        }
    }

    fn write_raw(&mut self, data: &[u8]) -> Result<()> {
        self.writer.write_all(data)?;
        self.file_size += data.len() as u64;
        Ok(())
    }

    /// Get the current file size
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Flushes the underlying writer.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Returns the underlying writer.
    pub fn into_inner(self) -> W {
        self.writer
    }
}
