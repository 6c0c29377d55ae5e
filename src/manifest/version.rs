//! Version snapshots.
//!
//! A Version is the fold of every edit up to a point in the MANIFEST. Each
//! applied edit produces a new immutable snapshot, so the full history of
//! which files were live at each step stays available.

use crate::filename::{log_file_name, table_file_name};
use crate::manifest::edit::{FileMetaData, VersionEdit, NUM_LEVELS};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

/// A version represents the set of table files at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Version {
    /// Number of edits folded into this version.
    pub edits_applied: usize,
    /// Comparator name
    pub comparator: Option<String>,
    /// Log number
    pub log_number: Option<u64>,
    /// Previous log number
    pub prev_log_number: Option<u64>,
    /// Next file number
    pub next_file_number: Option<u64>,
    /// Last sequence number
    pub last_sequence: Option<u64>,
    /// Table files organized by level
    pub levels: Vec<Vec<FileMetaData>>,
    /// Latest compact pointer per level
    pub compact_pointers: BTreeMap<u32, Vec<u8>>,
    /// Every file number removed so far
    pub deleted_files: BTreeSet<u64>,
}

impl Default for Version {
    fn default() -> Self {
        Self::new()
    }
}

impl Version {
    /// Create a new empty version
    pub fn new() -> Self {
        Self {
            edits_applied: 0,
            comparator: None,
            log_number: None,
            prev_log_number: None,
            next_file_number: None,
            last_sequence: None,
            levels: vec![Vec::new(); NUM_LEVELS],
            compact_pointers: BTreeMap::new(),
            deleted_files: BTreeSet::new(),
        }
    }

    /// Apply a version edit to create a new version
    ///
    /// Deletions are applied before additions, so an edit that moves a file
    /// between levels leaves it at the new level.
    pub fn apply(&self, edit: &VersionEdit) -> Self {
        let mut version = self.clone();
        version.edits_applied += 1;

        if let Some(name) = &edit.comparator {
            version.comparator = Some(name.clone());
        }
        version.log_number = edit.log_number.or(version.log_number);
        version.prev_log_number = edit.prev_log_number.or(version.prev_log_number);
        version.next_file_number = edit.next_file_number.or(version.next_file_number);
        version.last_sequence = edit.last_sequence.or(version.last_sequence);

        for pointer in &edit.compact_pointers {
            version.compact_pointers.insert(pointer.level, pointer.key.clone());
        }

        for deleted in &edit.deleted_files {
            let files = &mut version.levels[deleted.level as usize];
            let before = files.len();
            files.retain(|file| file.number != deleted.number);
            if files.len() == before {
                log::debug!(
                    "Edit at offset {} deletes file {} not present at level {}",
                    edit.offset,
                    deleted.number,
                    deleted.level
                );
            }
            version.deleted_files.insert(deleted.number);
        }

        for new_file in &edit.new_files {
            let files = &mut version.levels[new_file.level as usize];
            files.retain(|file| file.number != new_file.file.number);
            files.push(new_file.file.clone());
        }

        version
    }

    /// Folds `edits` in order, returning one version per edit.
    pub fn history<'a, I>(edits: I) -> Vec<Version>
    where
        I: IntoIterator<Item = &'a VersionEdit>,
    {
        edits
            .into_iter()
            .scan(Version::new(), |current, edit| {
                *current = current.apply(edit);
                Some(current.clone())
            })
            .collect()
    }

    /// Files at `level`.
    pub fn files(&self, level: usize) -> &[FileMetaData] {
        self.levels.get(level).map_or(&[][..], Vec::as_slice)
    }

    /// Iterates over `(level, file)` for every live file.
    pub fn live_files(&self) -> impl Iterator<Item = (usize, &FileMetaData)> {
        self.levels
            .iter()
            .enumerate()
            .flat_map(|(level, files)| files.iter().map(move |file| (level, file)))
    }

    /// File names of the live table files, lowest level first.
    pub fn live_table_files(&self) -> Vec<String> {
        self.live_files().map(|(_, file)| table_file_name(file.number)).collect()
    }

    /// Name of the log file holding writes not yet in a table.
    pub fn current_log_file(&self) -> Option<String> {
        self.log_number.map(log_file_name)
    }

    /// Get the total number of files
    pub fn num_files(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    /// Get the total size of all files
    pub fn total_size(&self) -> u64 {
        self.live_files().map(|(_, file)| file.file_size).sum()
    }
}
