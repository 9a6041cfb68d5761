pub mod json;
pub mod table;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::store::{self, SnapshotFile, StoreError};

/// One stored snapshot, as shown by the cli.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry {
    pub identity: String,
    pub file_name: String,
    pub extension: String,
    pub os: String,
    pub limit_to_os: bool,
    pub body_bytes: u64,
}

/// A file in the snapshot directory that does not load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Problem {
    pub file_name: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Listing {
    pub dir: PathBuf,
    pub entries: Vec<Entry>,
    pub problems: Vec<Problem>,
}

/// Loads every snapshot of `dir`. Unloadable files end up in `problems`.
pub fn collect(dir: &Path) -> Result<Listing, StoreError> {
    let mut listing = Listing {
        dir: dir.to_path_buf(),
        entries: Vec::new(),
        problems: Vec::new(),
    };

    for path in store::list(dir)? {
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        match SnapshotFile::load(&path) {
            Ok(snapshot) => {
                let (escaped, extension) = split_extension(&file_name);
                listing.entries.push(Entry {
                    identity: store::unescape(escaped),
                    extension: extension.to_string(),
                    file_name,
                    os: snapshot.header.os,
                    limit_to_os: snapshot.header.limit_to_os,
                    body_bytes: snapshot.body.len() as u64,
                });
            }
            Err(e) => listing.problems.push(Problem {
                file_name,
                error: e.to_string(),
            }),
        }
    }

    Ok(listing)
}

/// Path of the snapshot stored for `identity` in `dir`, whatever its extension.
pub fn find(dir: &Path, identity: &str) -> Result<Option<PathBuf>, StoreError> {
    let escaped = store::escape(identity);

    let found = store::list(dir)?.into_iter().find(|path| {
        let name = path.file_name().map(|n| n.to_string_lossy().into_owned());
        name.is_some_and(|name| name == escaped || split_extension(&name).0 == escaped)
    });
    Ok(found)
}

// identities may hold dots too, so only a short run of lowercase letters counts as an
// extension: txt, json, http and the usual custom ones (csv, yaml, html)
fn split_extension(file_name: &str) -> (&str, &str) {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && looks_like_extension(ext) => (stem, ext),
        _ => (file_name, ""),
    }
}

fn looks_like_extension(ext: &str) -> bool {
    (1..=5).contains(&ext.len()) && ext.bytes().all(|b| b.is_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Header;
    use std::fs;
    use tempfile::TempDir;

    fn seed(dir: &Path, name: &str, body: &str) {
        SnapshotFile::new(Header::current(false), body.as_bytes().to_vec())
            .dump(&dir.join(name))
            .unwrap();
    }

    #[test]
    fn collect_reads_headers_and_sizes() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), "a%20b.json", "{}");
        seed(dir.path(), "v1.2", "12345");
        fs::write(dir.path().join("broken.txt"), "garbage").unwrap();

        let listing = collect(dir.path()).unwrap();

        assert_eq!(listing.entries.len(), 2);
        assert_eq!(listing.entries[0].identity, "a b");
        assert_eq!(listing.entries[0].extension, "json");
        assert_eq!(listing.entries[0].body_bytes, 2);
        assert_eq!(listing.entries[1].identity, "v1.2");
        assert_eq!(listing.entries[1].extension, "");
        assert_eq!(listing.problems.len(), 1);
        assert_eq!(listing.problems[0].file_name, "broken.txt");
    }

    #[test]
    fn find_matches_with_or_without_extension() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), "api%2Fusers.http", "");
        seed(dir.path(), "plain", "");

        assert_eq!(
            find(dir.path(), "api/users").unwrap(),
            Some(dir.path().join("api%2Fusers.http"))
        );
        assert_eq!(find(dir.path(), "plain").unwrap(), Some(dir.path().join("plain")));
        assert_eq!(find(dir.path(), "missing").unwrap(), None);
    }

    #[test]
    fn custom_extensions_are_split_off() {
        assert_eq!(split_extension("prices.csv"), ("prices", "csv"));
        assert_eq!(split_extension("deploy%20v1.yaml"), ("deploy%20v1", "yaml"));
        assert_eq!(split_extension("v1.2"), ("v1.2", ""));
        assert_eq!(split_extension("build.Final"), ("build.Final", ""));
        assert_eq!(split_extension(".csv"), (".csv", ""));
    }
}
