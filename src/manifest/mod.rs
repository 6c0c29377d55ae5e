//! Descriptor (MANIFEST) reading.
//!
//! The MANIFEST records, as a sequence of version edits, which table files
//! were live at each level over time. Folding the edits gives the history of
//! versions, which is how tables that were live at an earlier point can be
//! found even when the current version no longer names them.

pub mod edit;
pub mod reader;
pub mod version;

pub use edit::{CompactPointer, DeletedFile, EditTag, FileMetaData, NewFile, VersionEdit, NUM_LEVELS};
pub use reader::{EditReader, ManifestReader, VersionHistory};
pub use version::Version;
