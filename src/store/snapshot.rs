use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::{split_at_separator, StoreError, SEPARATOR, TEMP_PREFIX};
use crate::platform;

/// Permission bits of written snapshot files on Unix.
pub const SNAPSHOT_FILE_MODE: u32 = 0o644;

/// Snapshot metadata, stored as the JSON head of every snapshot file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub os: String,
    pub limit_to_os: bool,
}

impl Header {
    /// Header for a snapshot captured right now, on this OS.
    pub fn current(limit_to_os: bool) -> Self {
        Header {
            os: platform::current_os().to_string(),
            limit_to_os,
        }
    }

    /// False only for snapshots limited to another OS; those are neither compared nor
    /// flagged stale by this run.
    pub fn consider_for_cleanup(&self) -> bool {
        !self.limit_to_os || self.os == platform::current_os()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotFile {
    pub header: Header,
    pub body: Vec<u8>,
}

impl SnapshotFile {
    pub fn new(header: Header, body: Vec<u8>) -> Self {
        SnapshotFile { header, body }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        let mut bytes = serde_json::to_vec_pretty(&self.header)?;
        bytes.extend_from_slice(SEPARATOR);
        bytes.extend_from_slice(&self.body);
        Ok(bytes)
    }

    /// An empty file is a valid, header-less empty snapshot.
    pub fn decode(path: &Path, bytes: &[u8]) -> Result<Self, StoreError> {
        if bytes.is_empty() {
            return Ok(SnapshotFile::new(Header::current(false), Vec::new()));
        }

        let (head, body) =
            split_at_separator(bytes).ok_or_else(|| StoreError::Malformed(path.to_path_buf()))?;
        let header = serde_json::from_slice(head).map_err(|source| StoreError::Header {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(SnapshotFile::new(header, body.to_vec()))
    }

    pub fn load(path: &Path) -> Result<Self, StoreError> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(path.to_path_buf()));
            }
            Err(e) => return Err(StoreError::io("reading snapshot", path)(e)),
        };

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "snapshot loaded");
        Self::decode(path, &bytes)
    }

    /// Writes to a temporary sibling and renames it over `path`, creating parent directories.
    pub fn dump(&self, path: &Path) -> Result<(), StoreError> {
        let bytes = self.encode().map_err(|source| StoreError::Header {
            path: path.to_path_buf(),
            source,
        })?;

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir).map_err(StoreError::io("creating snapshot directory", &dir))?;

        let mut file = tempfile::Builder::new()
            .prefix(TEMP_PREFIX)
            .tempfile_in(&dir)
            .map_err(StoreError::io("creating temporary snapshot in", &dir))?;
        file.write_all(&bytes)
            .map_err(StoreError::io("writing snapshot", path))?;
        file.as_file()
            .sync_all()
            .map_err(StoreError::io("flushing snapshot", path))?;
        set_mode(file.path()).map_err(StoreError::io("setting permissions of", path))?;

        file.persist(path)
            .map_err(|e| StoreError::io("replacing snapshot", path)(e.error))?;

        tracing::debug!(path = %path.display(), bytes = bytes.len(), "snapshot written");
        Ok(())
    }
}

#[cfg(unix)]
fn set_mode(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(SNAPSHOT_FILE_MODE))
}

#[cfg(not(unix))]
fn set_mode(_path: &Path) -> io::Result<()> {
    Ok(())
}
