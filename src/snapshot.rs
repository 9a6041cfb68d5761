//! Snapshot assertions.
//!
//! Each assertion runs claim -> load -> compare -> resolve:
//! - claim the escaped identity in the registry, duplicates are fatal
//! - load the stored snapshot, a missing one is fatal unless updating
//! - apply replacers to both sides and diff the stored value against the live one
//! - succeed, fail with the diff, or overwrite the snapshot in update mode
//!
//! The `assert_*` functions are the test-facing surface: they use the process-wide
//! registry, the crate config and the run switches, and panic on failure.

use std::panic::Location;
use std::path::{Path, PathBuf};

use crate::cli::RunArgs;
use crate::compare::{apply_replacers, Comparable, ReplacerTable};
use crate::config::Config;
use crate::error::Error;
use crate::platform;
use crate::registry::Registry;
use crate::store::{self, Header, SnapshotFile};

/// How a passing assertion was resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The stored snapshot equals the live value.
    Matched,
    /// No snapshot existed, update mode wrote one.
    Created,
    /// The snapshot differed or could not be compared, update mode overwrote it.
    Updated,
    /// The snapshot is limited to another OS and was not compared.
    ForeignOs,
}

/// Evaluates assertions against one snapshot directory.
pub struct Runner<'r> {
    registry: &'r Registry,
    dir: PathBuf,
    replacers: ReplacerTable,
    update: bool,
}

impl<'r> Runner<'r> {
    pub fn new(registry: &'r Registry, dir: impl Into<PathBuf>) -> Self {
        Runner {
            registry,
            dir: dir.into(),
            replacers: ReplacerTable::new(),
            update: false,
        }
    }

    pub fn with_replacers(mut self, replacers: ReplacerTable) -> Self {
        self.replacers = replacers;
        self
    }

    pub fn with_update(mut self, update: bool) -> Self {
        self.update = update;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the snapshot `name` would be stored at for `value`.
    pub fn snapshot_path(&self, name: &str, value: &dyn Comparable) -> PathBuf {
        self.dir
            .join(store::file_name(&store::escape(name), value.extension()))
    }

    pub fn check<C: Comparable>(&self, name: &str, mut live: C, limit_to_os: bool) -> Result<Outcome, Error> {
        let escaped = store::escape(name);
        self.registry.claim(&escaped)?;
        self.registry.record_dir(&self.dir);

        let path = self
            .dir
            .join(store::file_name(&escaped, live.extension()));
        apply_replacers(&mut live, &self.replacers);

        let stored = match SnapshotFile::load(&path) {
            Ok(stored) => stored,
            Err(e) if e.is_not_found() => {
                if !self.update {
                    return Err(Error::NotSnapshotted {
                        name: name.to_string(),
                        path,
                    });
                }
                self.write(&path, &live, limit_to_os)?;
                tracing::info!(name, path = %path.display(), "snapshot created");
                return Ok(Outcome::Created);
            }
            Err(e) if self.update => {
                tracing::warn!(name, "replacing unreadable snapshot: {e}");
                return self.overwrite(name, &path, &live, limit_to_os);
            }
            Err(e) => return Err(e.into()),
        };

        if !self.update && !stored.header.consider_for_cleanup() {
            tracing::debug!(name, os = %stored.header.os, "snapshot limited to another os, not compared");
            return Ok(Outcome::ForeignOs);
        }

        let compared = live.load(&stored.body).and_then(|mut expected| {
            apply_replacers(expected.as_mut(), &self.replacers);
            expected.compare_to(&live)
        });

        match compared {
            Ok(diff) if diff.is_empty() => Ok(Outcome::Matched),
            Ok(_) | Err(_) if self.update => self.overwrite(name, &path, &live, limit_to_os),
            Ok(diff) => Err(Error::Mismatch {
                name: name.to_string(),
                diff,
            }),
            Err(e) => Err(e.into()),
        }
    }

    fn overwrite(&self, name: &str, path: &Path, live: &dyn Comparable, limit_to_os: bool) -> Result<Outcome, Error> {
        self.write(path, live, limit_to_os)?;
        tracing::info!(name, path = %path.display(), "snapshot updated");
        Ok(Outcome::Updated)
    }

    fn write(&self, path: &Path, live: &dyn Comparable, limit_to_os: bool) -> Result<(), Error> {
        SnapshotFile::new(Header::current(limit_to_os), live.dump()).dump(path)?;
        Ok(())
    }
}

/// Compares `value` with the stored snapshot `name`; panics with the diff when they differ.
#[track_caller]
pub fn assert_snapshot<C: Comparable>(name: &str, value: C) {
    let test_file = Location::caller().file();
    report(check_global(name, value, false, None, test_file));
}

/// Like [`assert_snapshot`], but the snapshot only applies on the OS that wrote it.
#[track_caller]
pub fn assert_os_snapshot<C: Comparable>(name: &str, value: C) {
    let test_file = Location::caller().file();
    report(check_global(name, value, true, None, test_file));
}

/// Like [`assert_snapshot`], with `config` instead of the crate config file.
#[track_caller]
pub fn assert_snapshot_with_config<C: Comparable>(name: &str, value: C, config: &Config) {
    let test_file = Location::caller().file();
    report(check_global(name, value, false, Some(config), test_file));
}

#[track_caller]
pub fn assert_os_snapshot_with_config<C: Comparable>(name: &str, value: C, config: &Config) {
    let test_file = Location::caller().file();
    report(check_global(name, value, true, Some(config), test_file));
}

fn check_global<C: Comparable>(
    name: &str,
    value: C,
    limit_to_os: bool,
    config: Option<&Config>,
    test_file: &str,
) -> Result<Outcome, Error> {
    let loaded;
    let config = match config {
        Some(config) => config,
        None => {
            loaded = Config::load()?;
            &loaded
        }
    };
    let root = platform::crate_root().map_err(Error::Root)?;
    let dir = config.snapshot_dir(&root, Path::new(test_file));

    Runner::new(Registry::global(), dir)
        .with_replacers(config.replacers.clone())
        .with_update(RunArgs::current().update)
        .check(name, value, limit_to_os)
}

#[track_caller]
fn report(result: Result<Outcome, Error>) {
    match result {
        Ok(_) => {}
        Err(e) if e.is_mismatch() => panic!("{e}"),
        Err(e) => panic!("test errored: {e}"),
    }
}
