//! MANIFEST reader.
//!
//! A MANIFEST uses the log framing, so records come from the same block
//! reader and assembler as log files. Each logical record is decoded as a
//! [`VersionEdit`] and folded into a running [`Version`].

use crate::config::Options;
use crate::error::{Error, Result};
use crate::manifest::edit::VersionEdit;
use crate::manifest::version::Version;
use crate::wal::{LogReader, LogicalRecord, Records};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Reads the edit history of a MANIFEST.
///
/// ```rust,no_run
/// use leveldb_forensics::manifest::ManifestReader;
/// use leveldb_forensics::Options;
///
/// # fn main() -> Result<(), leveldb_forensics::Error> {
/// let reader = ManifestReader::open("MANIFEST-000002", Options::default())?;
/// let (version, warnings) = reader.latest_version()?;
/// for warning in &warnings {
///     eprintln!("warning: {}", warning);
/// }
/// for name in version.live_table_files() {
///     println!("live table {}", name);
/// }
/// # Ok(())
/// # }
/// ```
pub struct ManifestReader<R> {
    log: LogReader<R>,
    halt_on_error: bool,
}

impl ManifestReader<BufReader<File>> {
    /// Opens a MANIFEST file.
    pub fn open<P: AsRef<Path>>(path: P, options: Options) -> Result<Self> {
        let halt_on_error = options.halts_on_error();
        Ok(Self { log: LogReader::open(path, options)?, halt_on_error })
    }
}

impl<R: Read> ManifestReader<R> {
    /// Reads from any byte source.
    pub fn new(reader: R, options: Options) -> Self {
        let halt_on_error = options.halts_on_error();
        Self { log: LogReader::new(reader, options), halt_on_error }
    }

    /// Decoded edits in file order.
    pub fn edits(self) -> EditReader<Records<R>> {
        EditReader::new(self.log.records(), self.halt_on_error)
    }

    /// One version per successfully decoded edit.
    ///
    /// A damaged edit is reported and skipped; later edits apply on top of
    /// the last good version.
    pub fn versions(self) -> VersionHistory<EditReader<Records<R>>> {
        VersionHistory::new(self.edits())
    }

    /// Folds the whole MANIFEST and returns the final version along with the
    /// warnings raised. Only an unreadable source is returned as an error.
    pub fn latest_version(self) -> Result<(Version, Vec<Error>)> {
        let mut version = Version::new();
        let mut warnings = Vec::new();
        for item in self.versions() {
            match item {
                Ok(next) => version = next,
                Err(err) if err.is_recoverable() => warnings.push(err),
                Err(err) => return Err(err),
            }
        }
        log::debug!(
            "Folded {} edits: {} live files, {} warnings",
            version.edits_applied,
            version.num_files(),
            warnings.len()
        );
        Ok((version, warnings))
    }
}

/// Decodes each logical record as a version edit.
pub struct EditReader<I> {
    records: I,
    halt_on_error: bool,
    done: bool,
}

impl<I> EditReader<I>
where
    I: Iterator<Item = Result<LogicalRecord>>,
{
    /// Wraps a logical record stream.
    pub fn new(records: I, halt_on_error: bool) -> Self {
        Self { records, halt_on_error, done: false }
    }
}

impl<I> Iterator for EditReader<I>
where
    I: Iterator<Item = Result<LogicalRecord>>,
{
    type Item = Result<VersionEdit>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let result = self
            .records
            .next()?
            .and_then(|record| VersionEdit::decode(&record.data, record.payload_offset()));
        if let Err(err) = &result {
            log::warn!("Skipping version edit: {}", err);
            if self.halt_on_error || !err.is_recoverable() {
                self.done = true;
            }
        }
        Some(result)
    }
}

/// Running fold of edits into immutable versions.
pub struct VersionHistory<I> {
    edits: I,
    current: Version,
}

impl<I> VersionHistory<I>
where
    I: Iterator<Item = Result<VersionEdit>>,
{
    /// Starts from an empty version.
    pub fn new(edits: I) -> Self {
        Self { edits, current: Version::new() }
    }

    /// The last version produced.
    pub fn current(&self) -> &Version {
        &self.current
    }
}

impl<I> Iterator for VersionHistory<I>
where
    I: Iterator<Item = Result<VersionEdit>>,
{
    type Item = Result<Version>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.edits.next()? {
            Ok(edit) => {
                self.current = self.current.apply(&edit);
                Some(Ok(self.current.clone()))
            }
            Err(err) => Some(Err(err)),
        }
    }
}
