//! Log reader: blocks, fragments, logical records and write batches.
//!
//! Each layer is an iterator over `Result`s that wraps the one below it. An
//! `Err` item is a warning about damage at a known offset; the next call to
//! `next()` carries on from the next point the format lets us resynchronise
//! at, unless the options ask to halt.

use super::record::{PhysicalRecord, RecordType};
use super::{BLOCK_SIZE, HEADER_SIZE};
use crate::coding::{typed_crc, unmask_crc};
use crate::config::Options;
use crate::error::{Error, Result};
use crate::write_batch::{BatchEntry, WriteBatch};
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Reads up to one block, returning fewer bytes only at end of input.
fn read_block<R: Read>(reader: &mut R, buf: &mut Vec<u8>) -> io::Result<usize> {
    buf.resize(BLOCK_SIZE, 0);
    let mut filled = 0;
    while filled < BLOCK_SIZE {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    buf.truncate(filled);
    Ok(filled)
}

/// Splits a log byte stream into checksummed physical records, one 32 KiB
/// block at a time.
///
/// A bad header or checksum skips the remainder of its block; reading
/// resumes at the next block boundary.
pub struct BlockReader<R> {
    reader: R,
    block: Vec<u8>,
    block_offset: u64,
    next_block_offset: u64,
    pos: usize,
    verify_checksums: bool,
    halt_on_error: bool,
    done: bool,
}

impl<R: Read> BlockReader<R> {
    /// Creates a reader positioned at the start of `reader`.
    pub fn new(reader: R, options: &Options) -> Self {
        Self {
            reader,
            block: Vec::with_capacity(BLOCK_SIZE),
            block_offset: 0,
            next_block_offset: 0,
            pos: 0,
            verify_checksums: options.verify_checksums,
            halt_on_error: options.halts_on_error(),
            done: false,
        }
    }

    /// File offset of the next unread byte.
    pub fn file_offset(&self) -> u64 {
        self.block_offset + self.pos as u64
    }

    fn load_block(&mut self) -> Result<bool> {
        self.block_offset = self.next_block_offset;
        self.pos = 0;
        let n = read_block(&mut self.reader, &mut self.block)?;
        self.next_block_offset += n as u64;
        Ok(n > 0)
    }

    fn skip_block(&mut self) {
        self.pos = self.block.len();
    }

    fn fail(&mut self, err: Error) -> Option<Result<PhysicalRecord>> {
        log::warn!("Log block at offset {}: {}", self.block_offset, err);
        self.skip_block();
        if self.halt_on_error || !err.is_recoverable() {
            self.done = true;
        }
        Some(Err(err))
    }
}

impl<R: Read> Iterator for BlockReader<R> {
    type Item = Result<PhysicalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            // Fewer than HEADER_SIZE bytes left in a block is trailer padding.
            if self.block.len() - self.pos < HEADER_SIZE {
                match self.load_block() {
                    Ok(true) => continue,
                    Ok(false) => {
                        self.done = true;
                        return None;
                    }
                    Err(e) => return self.fail(e),
                }
            }

            let header = &self.block[self.pos..self.pos + HEADER_SIZE];
            let checksum = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
            let length = u16::from_le_bytes([header[4], header[5]]);
            let type_byte = header[6];
            let offset = self.file_offset();

            if type_byte == 0 {
                log::debug!("Zero record type at offset {}, skipping rest of block", offset);
                self.skip_block();
                continue;
            }

            let start = self.pos + HEADER_SIZE;
            let end = start + usize::from(length);
            if end > self.block.len() {
                let block_end = self.block_offset + self.block.len() as u64;
                return self.fail(Error::framing(
                    offset,
                    format!("record length {} overruns block ending at {}", length, block_end),
                ));
            }

            let Some(record_type) = RecordType::from_u8(type_byte) else {
                return self
                    .fail(Error::framing(offset, format!("unknown record type {}", type_byte)));
            };

            let actual = typed_crc(type_byte, &self.block[start..end]);
            let expected = unmask_crc(checksum);
            let checksum_ok = actual == expected;
            if !checksum_ok && self.verify_checksums {
                return self.fail(Error::ChecksumMismatch { offset, expected, actual });
            }

            let record = PhysicalRecord {
                offset,
                checksum,
                length,
                record_type,
                contents: self.block[start..end].to_vec(),
                checksum_ok,
            };
            self.pos = end;
            return Some(Ok(record));
        }
    }
}

/// The concatenated payload of one FULL fragment or one FIRST..LAST chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogicalRecord {
    /// File offset of the first fragment's header.
    pub offset: u64,
    /// Number of fragments the record was assembled from.
    pub fragments: usize,
    /// Record payload.
    pub data: Vec<u8>,
    /// `(position in data, file offset)` where each fragment's payload starts.
    #[serde(skip)]
    spans: Vec<(usize, u64)>,
}

impl LogicalRecord {
    fn from_fragment(fragment: PhysicalRecord) -> Self {
        let spans = vec![(0, fragment.contents_offset())];
        Self { offset: fragment.offset, fragments: 1, data: fragment.contents, spans }
    }

    fn append(&mut self, fragment: PhysicalRecord) {
        self.spans.push((self.data.len(), fragment.contents_offset()));
        self.data.extend_from_slice(&fragment.contents);
        self.fragments += 1;
    }

    /// File offset of the first payload byte.
    pub fn payload_offset(&self) -> u64 {
        self.offset + HEADER_SIZE as u64
    }

    /// File offset of byte `position` of the payload, skipping the
    /// fragment headers and block padding between fragments.
    pub fn file_offset(&self, position: u64) -> u64 {
        let index = self.spans.partition_point(|&(start, _)| start as u64 <= position);
        match index.checked_sub(1).and_then(|i| self.spans.get(i)) {
            Some(&(start, file_offset)) => file_offset + (position - start as u64),
            None => self.payload_offset() + position,
        }
    }
}

enum State {
    Idle,
    Accumulating(LogicalRecord),
}

/// Groups physical records into logical records.
///
/// ```text
/// Idle --FULL--> Idle
/// Idle --FIRST--> Accumulating --MIDDLE*--> Accumulating --LAST--> Idle
/// ```
///
/// Any other transition is a framing error. The partial record is dropped
/// and a FIRST or FULL that caused the error starts over from Idle.
pub struct RecordAssembler<I> {
    fragments: I,
    state: State,
    pending: Option<Result<LogicalRecord>>,
    halt_on_error: bool,
    done: bool,
}

impl<I> RecordAssembler<I>
where
    I: Iterator<Item = Result<PhysicalRecord>>,
{
    /// Wraps a fragment stream.
    pub fn new(fragments: I, halt_on_error: bool) -> Self {
        Self { fragments, state: State::Idle, pending: None, halt_on_error, done: false }
    }

    fn discard_partial(&mut self, reason: &str) -> Option<Error> {
        match std::mem::replace(&mut self.state, State::Idle) {
            State::Idle => None,
            State::Accumulating(partial) => {
                log::warn!(
                    "Discarding partial record at offset {} after {} fragments: {}",
                    partial.offset,
                    partial.fragments,
                    reason
                );
                Some(Error::framing(partial.offset, format!("incomplete record: {}", reason)))
            }
        }
    }

    fn fail(&mut self, err: Error) -> Option<Result<LogicalRecord>> {
        if self.halt_on_error || !err.is_recoverable() {
            self.done = true;
            self.pending = None;
        }
        Some(Err(err))
    }
}

impl<I> Iterator for RecordAssembler<I>
where
    I: Iterator<Item = Result<PhysicalRecord>>,
{
    type Item = Result<LogicalRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(item) = self.pending.take() {
            return Some(item);
        }

        loop {
            if self.done {
                return None;
            }

            let fragment = match self.fragments.next() {
                None => {
                    self.done = true;
                    return self.discard_partial("end of input").map(Err);
                }
                Some(Err(err)) => {
                    // The block reader skipped ahead; whatever was being
                    // accumulated can no longer be completed.
                    self.discard_partial("damaged fragment");
                    return self.fail(err);
                }
                Some(Ok(fragment)) => fragment,
            };

            match fragment.record_type {
                RecordType::Full => {
                    let record = LogicalRecord::from_fragment(fragment);
                    if let Some(err) = self.discard_partial("full record while accumulating") {
                        self.pending = Some(Ok(record));
                        return self.fail(err);
                    }
                    return Some(Ok(record));
                }
                RecordType::First => {
                    let err = self.discard_partial("first fragment while accumulating");
                    self.state = State::Accumulating(LogicalRecord::from_fragment(fragment));
                    if let Some(err) = err {
                        return self.fail(err);
                    }
                }
                RecordType::Middle | RecordType::Last => {
                    if matches!(self.state, State::Idle) {
                        return self.fail(Error::framing(
                            fragment.offset,
                            format!("{:?} fragment without a first fragment", fragment.record_type),
                        ));
                    }
                    let last = fragment.record_type == RecordType::Last;
                    if let State::Accumulating(partial) = &mut self.state {
                        partial.append(fragment);
                    }
                    if last {
                        if let State::Accumulating(record) =
                            std::mem::replace(&mut self.state, State::Idle)
                        {
                            return Some(Ok(record));
                        }
                    }
                }
            }
        }
    }
}

/// Decodes each logical record as a write batch.
///
/// A batch whose operation count does not match its payload is yielded with
/// the operations that could be decoded, followed by a `MalformedBatch`.
pub struct BatchReader<I> {
    records: I,
    pending: Option<Error>,
    halt_on_error: bool,
    done: bool,
}

impl<I> BatchReader<I>
where
    I: Iterator<Item = Result<LogicalRecord>>,
{
    /// Wraps a logical record stream.
    pub fn new(records: I, halt_on_error: bool) -> Self {
        Self { records, pending: None, halt_on_error, done: false }
    }

    fn fail(&mut self, err: Error) -> Option<Result<WriteBatch>> {
        if self.halt_on_error || !err.is_recoverable() {
            self.done = true;
        }
        Some(Err(err))
    }
}

impl<I> Iterator for BatchReader<I>
where
    I: Iterator<Item = Result<LogicalRecord>>,
{
    type Item = Result<WriteBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(err) = self.pending.take() {
            return self.fail(err);
        }
        if self.done {
            return None;
        }

        match self.records.next()? {
            Err(err) => Some(Err(err)),
            Ok(record) => match WriteBatch::decode_located(&record.data, |pos| record.file_offset(pos)) {
                Ok((batch, None)) => Some(Ok(batch)),
                Ok((batch, Some(err))) => {
                    log::warn!("{}", err);
                    self.pending = Some(err);
                    Some(Ok(batch))
                }
                Err(err) => self.fail(err),
            },
        }
    }
}

/// Flattens write batches into their individual operations.
pub struct EntryReader<I> {
    batches: I,
    current: std::vec::IntoIter<BatchEntry>,
}

impl<I> EntryReader<I>
where
    I: Iterator<Item = Result<WriteBatch>>,
{
    /// Wraps a batch stream.
    pub fn new(batches: I) -> Self {
        Self { batches, current: Vec::new().into_iter() }
    }
}

impl<I> Iterator for EntryReader<I>
where
    I: Iterator<Item = Result<WriteBatch>>,
{
    type Item = Result<BatchEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(entry) = self.current.next() {
                return Some(Ok(entry));
            }
            match self.batches.next()? {
                Ok(batch) => self.current = batch.entries.into_iter(),
                Err(err) => return Some(Err(err)),
            }
        }
    }
}

/// Logical records of a log file.
pub type Records<R> = RecordAssembler<BlockReader<R>>;
/// Write batches of a log file.
pub type Batches<R> = BatchReader<Records<R>>;
/// Batch operations of a log file.
pub type Entries<R> = EntryReader<Batches<R>>;

/// Entry point for reading a log file (or a MANIFEST, which shares the
/// same framing) at whichever layer the caller needs.
///
/// ```rust,no_run
/// use leveldb_forensics::{LogReader, Options};
///
/// # fn main() -> Result<(), leveldb_forensics::Error> {
/// let (entries, warnings) = LogReader::open("000003.log", Options::default())?.recover_all()?;
/// println!("{} operations, {} damaged regions", entries.len(), warnings.len());
/// # Ok(())
/// # }
/// ```
pub struct LogReader<R> {
    reader: R,
    options: Options,
}

impl LogReader<BufReader<File>> {
    /// Opens a log file.
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        options.validate()?;
        let file = File::open(path)?;
        Ok(Self::new(BufReader::new(file), options))
    }
}

impl<R: Read> LogReader<R> {
    /// Reads from any byte source.
    pub fn new(reader: R, options: Options) -> Self {
        Self { reader, options }
    }

    /// Physical records in file order.
    pub fn physical_records(self) -> BlockReader<R> {
        BlockReader::new(self.reader, &self.options)
    }

    /// Reassembled logical records.
    pub fn records(self) -> Records<R> {
        let halt = self.options.halts_on_error();
        RecordAssembler::new(self.physical_records(), halt)
    }

    /// Write batches.
    pub fn batches(self) -> Batches<R> {
        let halt = self.options.halts_on_error();
        BatchReader::new(self.records(), halt)
    }

    /// Individual Put/Delete operations with their sequence numbers.
    pub fn entries(self) -> Entries<R> {
        EntryReader::new(self.batches())
    }

    /// Collects every recoverable entry along with the warnings raised.
    ///
    /// Only an unreadable source is returned as an error.
    pub fn recover_all(self) -> Result<(Vec<BatchEntry>, Vec<Error>)> {
        let mut entries = Vec::new();
        let mut warnings = Vec::new();
        for item in self.entries() {
            match item {
                Ok(entry) => entries.push(entry),
                Err(err) if err.is_recoverable() => warnings.push(err),
                Err(err) => return Err(err),
            }
        }
        if !warnings.is_empty() {
            log::info!(
                "Recovered {} entries with {} warnings",
                entries.len(),
                warnings.len()
            );
        }
        Ok((entries, warnings))
    }
}
