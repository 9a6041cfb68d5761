use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::compare::CompareError;
use crate::config::ConfigError;
use crate::registry::RegistryError;
use crate::store::StoreError;

/// Why a snapshot assertion did not pass.
///
/// Three families: setup errors (the test could not be evaluated), comparator errors
/// (the values cannot be compared) and [`Error::Mismatch`], the only one carrying a diff.
#[derive(Debug, Error)]
pub enum Error {
    #[error("setting new expectation: {0}")]
    Repeated(#[from] RegistryError),

    #[error("expected snapshot for {name} to exist: not snapshotted ({})", path.display())]
    NotSnapshotted { name: String, path: PathBuf },

    #[error("loading expectations file: {0}")]
    Store(#[from] StoreError),

    #[error("comparing expectation to result: {0}")]
    Compare(#[from] CompareError),

    #[error("found a difference between expectation and result on test {name:?}, difference follows:\n{diff}")]
    Mismatch { name: String, diff: String },

    #[error("reading expectations config: {0}")]
    Config(#[from] ConfigError),

    #[error("determining crate root: {0}")]
    Root(#[source] io::Error),
}

impl Error {
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Error::Mismatch { .. })
    }

    pub fn is_setup(&self) -> bool {
        !matches!(self, Error::Mismatch { .. } | Error::Compare(_))
    }

    /// The diff of a mismatch.
    pub fn diff(&self) -> Option<&str> {
        match self {
            Error::Mismatch { diff, .. } => Some(diff),
            _ => None,
        }
    }
}
