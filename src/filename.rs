//! File names inside a LevelDB directory.
//!
//! The crate never lists a directory itself; these helpers let a caller that
//! does classify what it found and know which files a descriptor refers to.

use crate::error::{Error, Result};

/// Kind of file found in a LevelDB directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Write-ahead log, `NNNNNN.log`.
    Log(u64),
    /// Sorted table, `NNNNNN.ldb` (or the older `NNNNNN.sst`).
    Table(u64),
    /// Descriptor, `MANIFEST-NNNNNN`.
    Manifest(u64),
    /// `CURRENT`, naming the active descriptor.
    Current,
    /// `LOCK`.
    Lock,
    /// Human-readable info log, `LOG` or `LOG.old`.
    InfoLog,
}

/// Generate a log filename for a given file number
pub fn log_file_name(number: u64) -> String {
    format!("{:06}.log", number)
}

/// Generate a table filename for a given file number
pub fn table_file_name(number: u64) -> String {
    format!("{:06}.ldb", number)
}

/// Generate a descriptor filename for a given file number
pub fn manifest_file_name(number: u64) -> String {
    format!("MANIFEST-{:06}", number)
}

fn parse_number(digits: &str) -> Option<u64> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Classifies a file name.
pub fn parse_file_name(name: &str) -> Option<FileKind> {
    match name {
        "CURRENT" => return Some(FileKind::Current),
        "LOCK" => return Some(FileKind::Lock),
        "LOG" | "LOG.old" => return Some(FileKind::InfoLog),
        _ => {}
    }

    if let Some(number) = name.strip_prefix("MANIFEST-") {
        return parse_number(number).map(FileKind::Manifest);
    }
    if let Some(number) = name.strip_suffix(".log") {
        return parse_number(number).map(FileKind::Log);
    }
    if let Some(number) = name.strip_suffix(".ldb").or_else(|| name.strip_suffix(".sst")) {
        return parse_number(number).map(FileKind::Table);
    }
    None
}

/// Parses the contents of a `CURRENT` file and returns the descriptor name.
///
/// # Errors
///
/// `Corruption` unless the contents are a single `MANIFEST-NNNNNN` line.
pub fn parse_current(contents: &[u8]) -> Result<String> {
    let text = std::str::from_utf8(contents)
        .map_err(|_| Error::corruption("CURRENT file is not valid UTF-8"))?;
    let name = text
        .strip_suffix('\n')
        .ok_or_else(|| Error::corruption("CURRENT file does not end with a newline"))?;

    match parse_file_name(name) {
        Some(FileKind::Manifest(_)) => Ok(name.to_string()),
        _ => Err(Error::corruption(format!("CURRENT names {:?}, not a descriptor", name))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_names() {
        assert_eq!(log_file_name(1), "000001.log");
        assert_eq!(table_file_name(123), "000123.ldb");
        assert_eq!(manifest_file_name(999999), "MANIFEST-999999");
        assert_eq!(log_file_name(1234567), "1234567.log");
    }

    #[test]
    fn test_parse_file_name() {
        assert_eq!(parse_file_name("000001.log"), Some(FileKind::Log(1)));
        assert_eq!(parse_file_name("000123.ldb"), Some(FileKind::Table(123)));
        assert_eq!(parse_file_name("000007.sst"), Some(FileKind::Table(7)));
        assert_eq!(parse_file_name("MANIFEST-000002"), Some(FileKind::Manifest(2)));
        assert_eq!(parse_file_name("CURRENT"), Some(FileKind::Current));
        assert_eq!(parse_file_name("LOCK"), Some(FileKind::Lock));
        assert_eq!(parse_file_name("LOG.old"), Some(FileKind::InfoLog));
        assert_eq!(parse_file_name("invalid"), None);
        assert_eq!(parse_file_name("123.txt"), None);
        assert_eq!(parse_file_name(".log"), None);
        assert_eq!(parse_file_name("-1.log"), None);
    }

    #[test]
    fn test_parse_current() {
        assert_eq!(parse_current(b"MANIFEST-000004\n").unwrap(), "MANIFEST-000004");
        assert!(parse_current(b"MANIFEST-000004").is_err());
        assert!(parse_current(b"000004.log\n").is_err());
        assert!(parse_current(&[0xff, b'\n']).is_err());
    }
}
