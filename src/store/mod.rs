//! Snapshot file storage.
//!
//! One file per snapshot:
//! - JSON header: os, limit_to_os
//! - a blank line
//! - the body, exactly as the comparable dumped it
//!
//! Supports:
//! - write-then-rename, so a half written file is never read back
//! - telling "never snapshotted" apart from "exists but unreadable"
//! - listing the snapshots of one directory
//! - mapping snapshot identities to file names and back

pub mod snapshot;

use std::io;
use std::path::{Path, PathBuf};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use thiserror::Error;
use walkdir::WalkDir;

pub use snapshot::{Header, SnapshotFile};

/// Separates the header from the body. Pretty printed JSON never contains a blank line.
pub const SEPARATOR: &[u8] = b"\n\n";

/// Prefix of in-flight temporary files, ignored when listing.
pub(crate) const TEMP_PREFIX: &str = ".expectations-";

// url path segment rules, minus ':' which windows does not allow in file names
const IDENTITY_ESCAPE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'$')
    .remove(b'&')
    .remove(b'+')
    .remove(b'=')
    .remove(b'@');

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not snapshotted: {}", .0.display())]
    NotFound(PathBuf),

    #[error("malformed snapshot {}: cannot find separator", .0.display())]
    Malformed(PathBuf),

    #[error("snapshot header of {}: {source}", path.display())]
    Header {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("{action} {}: {source}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub(crate) fn io(action: &'static str, path: &Path) -> impl FnOnce(io::Error) -> StoreError {
        let path = path.to_path_buf();
        move |source| StoreError::Io { action, path, source }
    }
}

/// Filesystem-safe key for a snapshot identity.
pub fn escape(identity: &str) -> String {
    utf8_percent_encode(identity, IDENTITY_ESCAPE).to_string()
}

/// Inverse of [`escape`]. Names that do not decode are returned as they are.
pub fn unescape(name: &str) -> String {
    match percent_decode_str(name).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => name.to_string(),
    }
}

/// Escaped identity plus the comparator's extension, if it declares one.
pub fn file_name(escaped: &str, extension: &str) -> String {
    if extension.is_empty() {
        escaped.to_string()
    } else {
        format!("{escaped}.{extension}")
    }
}

/// Header bytes and body bytes, or `None` when there is no separator.
pub fn split_at_separator(bytes: &[u8]) -> Option<(&[u8], &[u8])> {
    let at = bytes
        .windows(SEPARATOR.len())
        .position(|window| window == SEPARATOR)?;
    Some((&bytes[..at], &bytes[at + SEPARATOR.len()..]))
}

/// Snapshot files directly inside `dir`, sorted by name. Subdirectories are not descended.
pub fn list(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = entry.map_err(|e| StoreError::Io {
            action: "reading snapshot directory",
            path: dir.to_path_buf(),
            source: e.into(),
        })?;

        if !entry.file_type().is_file() {
            continue;
        }
        if entry.file_name().to_string_lossy().starts_with(TEMP_PREFIX) {
            continue;
        }
        files.push(entry.into_path());
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn split_finds_first_blank_line() {
        let (head, body) = split_at_separator(b"{}\n\nbody\n\nmore").unwrap();
        assert_eq!(head, b"{}");
        assert_eq!(body, b"body\n\nmore");
    }

    #[test]
    fn split_without_separator_is_none() {
        assert!(split_at_separator(b"{}\nbody").is_none());
    }

    #[test]
    fn escape_makes_identities_path_safe() {
        assert_eq!(escape("plain-name_1.v2"), "plain-name_1.v2");
        assert_eq!(escape("a/b c"), "a%2Fb%20c");
        assert_eq!(escape("10:30"), "10%3A30");
        assert_eq!(escape("ñ"), "%C3%B1");
        assert_eq!(escape("a,b;c"), "a%2Cb%3Bc");
        assert_eq!(escape("$&+=@"), "$&+=@");
    }

    #[test]
    fn unescape_reverses_escape() {
        for identity in ["a/b c", "TestHTTP/GET 200", "ñ?#%", ""] {
            assert_eq!(unescape(&escape(identity)), identity);
        }
        assert_eq!(unescape("%FF"), "%FF");
    }

    #[test]
    fn file_name_appends_extension() {
        assert_eq!(file_name("case", "json"), "case.json");
        assert_eq!(file_name("case", ""), "case");
    }

    #[test]
    fn list_skips_directories_and_temp_files() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "").unwrap();
        fs::write(dir.path().join("a"), "").unwrap();
        fs::write(dir.path().join(format!("{TEMP_PREFIX}123")), "").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("c"), "").unwrap();

        let files = list(dir.path()).unwrap();

        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a", "b.txt"]);
    }

    #[test]
    fn list_missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = list(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, StoreError::Io { .. }));
    }
}
