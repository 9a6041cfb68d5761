//! Project configuration.
//!
//! Read from `expectations.toml` (or `expectations.json`) in the crate root. Every
//! field is optional; a missing file means defaults.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::compare::{Kind, ReplacerTable, Replacements};
use crate::platform;

pub const TOML_FILE_NAME: &str = "expectations.toml";
pub const JSON_FILE_NAME: &str = "expectations.json";

/// Directory name used for per-package grouping.
pub const DEFAULT_SNAPSHOT_DIR: &str = "expectations";

const PER_FILE_SUFFIX: &str = "expectations";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("determining crate root: {0}")]
    Root(#[source] io::Error),

    #[error("reading {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("decoding {}: {source}", path.display())]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("decoding {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grouping {
    /// One directory shared by every test of the crate.
    #[default]
    ByPackage,
    /// One directory per test source file.
    ByTestFile,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub grouping: Grouping,

    /// Overrides grouping. Relative paths hang off the crate root.
    pub snapshot_dir: Option<PathBuf>,

    /// kind -> token or field path -> replacement
    pub replacers: ReplacerTable,

    /// Let the cleanup sweep run even when the test run was filtered.
    pub cleanup_filtered_runs: bool,
}

impl Config {
    /// Config of the crate under test, or defaults when it has none.
    pub fn load() -> Result<Self, ConfigError> {
        let root = platform::crate_root().map_err(ConfigError::Root)?;
        Self::discover(&root)
    }

    /// Looks for a config file in `dir`, toml first.
    pub fn discover(dir: &Path) -> Result<Self, ConfigError> {
        for name in [TOML_FILE_NAME, JSON_FILE_NAME] {
            let path = dir.join(name);
            if path.is_file() {
                return Self::read(&path);
            }
        }

        tracing::debug!(dir = %dir.display(), "no expectations config, using defaults");
        Ok(Config::default())
    }

    /// Decodes a config file, picking the format by extension.
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config = if path.extension().is_some_and(|ext| ext == "json") {
            serde_json::from_str(&contents).map_err(|source| ConfigError::Json {
                path: path.to_path_buf(),
                source,
            })?
        } else {
            toml::from_str(&contents).map_err(|source| ConfigError::Toml {
                path: path.to_path_buf(),
                source,
            })?
        };

        tracing::debug!(path = %path.display(), "expectations config loaded");
        Ok(config)
    }

    pub fn with_grouping(mut self, grouping: Grouping) -> Self {
        self.grouping = grouping;
        self
    }

    pub fn with_snapshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn with_replacements(mut self, kind: Kind, replacements: Replacements) -> Self {
        self.replacers.entry(kind).or_default().extend(replacements);
        self
    }

    /// Directory holding the snapshots of `test_file`.
    ///
    /// `test_file` is a path as reported by `Location::caller`, i.e. relative to the
    /// workspace root, which can be an ancestor of `base` for workspace members.
    pub fn snapshot_dir(&self, base: &Path, test_file: &Path) -> PathBuf {
        if let Some(dir) = &self.snapshot_dir {
            return base.join(dir);
        }

        match self.grouping {
            Grouping::ByPackage => base.join(DEFAULT_SNAPSHOT_DIR),
            Grouping::ByTestFile => {
                let source = locate_source(base, test_file);
                source.with_extension(PER_FILE_SUFFIX)
            }
        }
    }
}

fn locate_source(base: &Path, test_file: &Path) -> PathBuf {
    if test_file.is_absolute() {
        return test_file.to_path_buf();
    }

    base.ancestors()
        .map(|dir| dir.join(test_file))
        .find(|candidate| candidate.is_file())
        .unwrap_or_else(|| base.join(test_file))
}
