//! Stale snapshot cleanup.
//!
//! Sweeps snapshot directories after the run and finds files whose identity was not
//! claimed by any assertion:
//! - Advisory mode: reports stale snapshots, deletes them only when asked to
//! - Enforcing mode: fails when stale snapshots exist and deletion was not asked for
//!
//! Never runs before at least one assertion did, and is skipped for filtered runs:
//! a test that was filtered out did not run, it did not disappear.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::cli::RunArgs;
use crate::config::{Config, ConfigError};
use crate::registry::Registry;
use crate::store::{self, SnapshotFile, StoreError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanMode {
    Advisory,
    Enforcing,
}

#[derive(Debug, Error)]
pub enum CleanupError {
    #[error("must run a test before cleaning up")]
    NothingRan,

    #[error("reading snapshot directory contents: {0}")]
    ReadDir(#[source] StoreError),

    #[error("loading file contents: {0}")]
    Load(#[source] StoreError),

    #[error("we found {count} expectation snapshots that need cleanup: {}", names.join(", "))]
    Stale { count: usize, names: Vec<String> },

    #[error("deleting stale snapshot {}, {deleted} were deleted before failure: {source}", path.display())]
    Delete {
        deleted: usize,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("reading expectations config: {0}")]
    Config(#[from] ConfigError),
}

/// What the sweep is allowed to do, from the run switches and the config.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOptions {
    /// Delete stale snapshots.
    pub delete: bool,
    /// The harness ran a subset of the tests.
    pub filtered: bool,
    /// Sweep anyway when filtered.
    pub cleanup_filtered_runs: bool,
}

impl SweepOptions {
    pub fn new(args: &RunArgs, config: &Config) -> Self {
        SweepOptions {
            delete: args.cleanup,
            filtered: args.is_filtered(),
            cleanup_filtered_runs: config.cleanup_filtered_runs,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Snapshots no assertion claimed, in directory order.
    pub stale: Vec<PathBuf>,
    pub deleted: usize,
    /// The sweep did not look at anything because the run was filtered.
    pub skipped: bool,
}

impl SweepReport {
    /// Unescaped identities of the stale snapshots.
    pub fn stale_names(&self) -> Vec<String> {
        self.stale.iter().map(|path| identity_of(path)).collect()
    }
}

pub struct Sweep<'r> {
    registry: &'r Registry,
    mode: CleanMode,
    options: SweepOptions,
}

impl<'r> Sweep<'r> {
    pub fn new(registry: &'r Registry, mode: CleanMode) -> Self {
        Sweep {
            registry,
            mode,
            options: SweepOptions::default(),
        }
    }

    pub fn with_options(mut self, options: SweepOptions) -> Self {
        self.options = options;
        self
    }

    /// Sweeps one snapshot directory.
    pub fn run(&self, dir: &Path) -> Result<SweepReport, CleanupError> {
        self.run_all(&[dir.to_path_buf()])
    }

    /// Sweeps several directories as one: every stale snapshot is found before any is
    /// reported or deleted.
    pub fn run_all(&self, dirs: &[PathBuf]) -> Result<SweepReport, CleanupError> {
        if self.options.filtered && !self.options.cleanup_filtered_runs {
            tracing::warn!("skipping cleanup because the run was filtered");
            return Ok(SweepReport {
                skipped: true,
                ..SweepReport::default()
            });
        }
        if !self.registry.ran() {
            return Err(CleanupError::NothingRan);
        }

        let report = self.find_stale(dirs)?;
        if self.options.delete {
            delete(report)
        } else {
            self.report_only(dirs, report)
        }
    }

    fn find_stale(&self, dirs: &[PathBuf]) -> Result<SweepReport, CleanupError> {
        let mut report = SweepReport::default();

        for dir in dirs {
            for path in store::list(dir).map_err(CleanupError::ReadDir)? {
                let snapshot = SnapshotFile::load(&path).map_err(CleanupError::Load)?;
                if !snapshot.header.consider_for_cleanup() {
                    continue;
                }
                if self.is_registered(&path) {
                    continue;
                }
                report.stale.push(path);
            }
        }

        Ok(report)
    }

    fn report_only(&self, dirs: &[PathBuf], report: SweepReport) -> Result<SweepReport, CleanupError> {
        if report.stale.is_empty() {
            return Ok(report);
        }

        let names = report.stale_names();
        match self.mode {
            CleanMode::Enforcing => {
                for name in &names {
                    tracing::warn!(
                        "CLEANUP: There is a snapshot for expectation {name:?} but the expectation no longer exist"
                    );
                }
                Err(CleanupError::Stale {
                    count: names.len(),
                    names,
                })
            }
            CleanMode::Advisory => {
                tracing::warn!(
                    dirs = dirs.len(),
                    count = names.len(),
                    "stale snapshots found, set EXPECT_CLEANUP=1 to delete them"
                );
                Ok(report)
            }
        }
    }

    // registered under the full file name, or under the name minus its extension
    fn is_registered(&self, path: &Path) -> bool {
        let name = path.file_name().map(|n| n.to_string_lossy());
        let stem = path.file_stem().map(|n| n.to_string_lossy());

        name.is_some_and(|n| self.registry.is_claimed(&n))
            || stem.is_some_and(|s| self.registry.is_claimed(&s))
    }
}

// stops at the first failure, the error carries how many went before it
fn delete(mut report: SweepReport) -> Result<SweepReport, CleanupError> {
    for path in &report.stale {
        fs::remove_file(path).map_err(|source| CleanupError::Delete {
            deleted: report.deleted,
            path: path.clone(),
            source,
        })?;
        report.deleted += 1;
        tracing::info!(path = %path.display(), "stale snapshot deleted");
    }
    Ok(report)
}

fn identity_of(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    store::unescape(&name)
}

/// Advisory sweep of every directory the process-wide registry saw.
pub fn cleanup() -> Result<SweepReport, CleanupError> {
    sweep_global(CleanMode::Advisory)
}

/// Enforcing sweep of every directory the process-wide registry saw.
pub fn must_cleanup() -> Result<SweepReport, CleanupError> {
    sweep_global(CleanMode::Enforcing)
}

fn sweep_global(mode: CleanMode) -> Result<SweepReport, CleanupError> {
    let config = Config::load()?;
    let registry = Registry::global();

    Sweep::new(registry, mode)
        .with_options(SweepOptions::new(RunArgs::current(), &config))
        .run_all(&registry.dirs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform;
    use crate::store::Header;
    use tempfile::TempDir;

    fn seed(dir: &Path, name: &str) {
        seed_with(dir, name, Header::current(false));
    }

    fn seed_with(dir: &Path, name: &str, header: Header) {
        SnapshotFile::new(header, b"body".to_vec())
            .dump(&dir.join(name))
            .unwrap();
    }

    fn registry_with(claimed: &[&str]) -> Registry {
        let registry = Registry::new();
        for name in claimed {
            registry.claim(name).unwrap();
        }
        registry
    }

    #[test]
    fn enforcing_reports_orphans_and_deletes_nothing() {
        let dir = TempDir::new().unwrap();
        for name in ["one", "two", "three"] {
            seed(dir.path(), name);
        }
        let registry = registry_with(&["three"]);

        let err = Sweep::new(&registry, CleanMode::Enforcing)
            .run(dir.path())
            .unwrap_err();

        match err {
            CleanupError::Stale { count, names } => {
                assert_eq!(count, 2);
                assert_eq!(names, ["one", "two"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        for name in ["one", "two", "three"] {
            assert!(dir.path().join(name).exists());
        }
    }

    #[test]
    fn advisory_reports_without_deleting() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), "one");
        seed(dir.path(), "kept.txt");
        let registry = registry_with(&["kept"]);

        let report = Sweep::new(&registry, CleanMode::Advisory)
            .run(dir.path())
            .unwrap();

        assert_eq!(report.stale, [dir.path().join("one")]);
        assert_eq!(report.deleted, 0);
        assert!(dir.path().join("one").exists());
    }

    #[test]
    fn delete_removes_only_stale_snapshots() {
        let dir = TempDir::new().unwrap();
        for name in ["one", "two", "three.json"] {
            seed(dir.path(), name);
        }
        let registry = registry_with(&["three"]);
        let options = SweepOptions {
            delete: true,
            ..SweepOptions::default()
        };

        let report = Sweep::new(&registry, CleanMode::Enforcing)
            .with_options(options)
            .run(dir.path())
            .unwrap();

        assert_eq!(report.deleted, 2);
        assert!(!dir.path().join("one").exists());
        assert!(!dir.path().join("two").exists());
        assert!(dir.path().join("three.json").exists());
    }

    #[test]
    fn foreign_os_snapshots_are_never_stale() {
        let dir = TempDir::new().unwrap();
        let foreign = Header {
            os: platform::foreign_os().to_string(),
            limit_to_os: true,
        };
        seed_with(dir.path(), "elsewhere", foreign);
        seed(dir.path(), "claimed");
        let registry = registry_with(&["claimed"]);
        let options = SweepOptions {
            delete: true,
            ..SweepOptions::default()
        };

        let report = Sweep::new(&registry, CleanMode::Enforcing)
            .with_options(options)
            .run(dir.path())
            .unwrap();

        assert!(report.stale.is_empty());
        assert!(dir.path().join("elsewhere").exists());
    }

    #[test]
    fn stale_names_are_unescaped() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), "api%2FGET%20users.json");
        let registry = registry_with(&["other"]);

        let report = Sweep::new(&registry, CleanMode::Advisory)
            .run(dir.path())
            .unwrap();

        assert_eq!(report.stale_names(), ["api/GET users.json"]);
    }

    #[test]
    fn filtered_run_is_skipped() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), "one");
        let registry = Registry::new();
        let options = SweepOptions {
            delete: true,
            filtered: true,
            cleanup_filtered_runs: false,
        };

        let report = Sweep::new(&registry, CleanMode::Enforcing)
            .with_options(options)
            .run(dir.path())
            .unwrap();

        assert!(report.skipped);
        assert!(dir.path().join("one").exists());
    }

    #[test]
    fn filtered_run_sweeps_when_configured() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), "one");
        let registry = registry_with(&["two"]);
        let options = SweepOptions {
            delete: false,
            filtered: true,
            cleanup_filtered_runs: true,
        };

        let report = Sweep::new(&registry, CleanMode::Advisory)
            .with_options(options)
            .run(dir.path())
            .unwrap();

        assert!(!report.skipped);
        assert_eq!(report.stale.len(), 1);
    }

    #[test]
    fn nothing_ran_is_an_error() {
        let dir = TempDir::new().unwrap();
        seed(dir.path(), "one");

        let err = Sweep::new(&Registry::new(), CleanMode::Advisory)
            .run(dir.path())
            .unwrap_err();

        assert!(matches!(err, CleanupError::NothingRan));
    }

    #[test]
    fn unreadable_snapshot_aborts_sweep() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken"), "no separator").unwrap();
        let registry = registry_with(&["x"]);

        let err = Sweep::new(&registry, CleanMode::Advisory)
            .run(dir.path())
            .unwrap_err();

        assert!(matches!(err, CleanupError::Load(_)));
    }

    #[test]
    fn missing_directory_is_an_error() {
        let dir = TempDir::new().unwrap();
        let registry = registry_with(&["x"]);

        let err = Sweep::new(&registry, CleanMode::Advisory)
            .run(&dir.path().join("missing"))
            .unwrap_err();

        assert!(matches!(err, CleanupError::ReadDir(_)));
    }

    #[test]
    fn run_all_merges_directories() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        seed(first.path(), "a");
        seed(second.path(), "b");
        let registry = registry_with(&["x"]);

        let report = Sweep::new(&registry, CleanMode::Advisory)
            .run_all(&[first.path().to_path_buf(), second.path().to_path_buf()])
            .unwrap();

        assert_eq!(report.stale_names(), ["a", "b"]);
    }

    #[test]
    fn enforcing_lists_orphans_of_every_directory() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        seed(first.path(), "a");
        seed(second.path(), "b");
        let registry = registry_with(&["x"]);

        let err = Sweep::new(&registry, CleanMode::Enforcing)
            .run_all(&[first.path().to_path_buf(), second.path().to_path_buf()])
            .unwrap_err();

        match err {
            CleanupError::Stale { count, names } => {
                assert_eq!(count, 2);
                assert_eq!(names, ["a", "b"]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn delete_counts_across_directories() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            seed(first.path(), name);
        }
        seed(second.path(), "d");
        let registry = registry_with(&["x"]);
        let options = SweepOptions {
            delete: true,
            ..SweepOptions::default()
        };

        let report = Sweep::new(&registry, CleanMode::Advisory)
            .with_options(options)
            .run_all(&[first.path().to_path_buf(), second.path().to_path_buf()])
            .unwrap();

        assert_eq!(report.deleted, 4);
        assert!(!second.path().join("d").exists());
    }

    #[test]
    fn failed_delete_reports_earlier_deletions() {
        let first = TempDir::new().unwrap();
        let second = TempDir::new().unwrap();
        for name in ["a", "b", "c"] {
            seed(first.path(), name);
        }
        seed(second.path(), "d");
        seed(second.path(), "e");
        let registry = registry_with(&["x"]);
        let sweep = Sweep::new(&registry, CleanMode::Advisory);

        let report = sweep
            .find_stale(&[first.path().to_path_buf(), second.path().to_path_buf()])
            .unwrap();
        // gone between listing and deleting
        fs::remove_file(second.path().join("d")).unwrap();
        let err = delete(report).unwrap_err();

        match err {
            CleanupError::Delete { deleted, path, source } => {
                assert_eq!(deleted, 3);
                assert_eq!(path, second.path().join("d"));
                assert_eq!(source.kind(), io::ErrorKind::NotFound);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(!first.path().join("c").exists());
        assert!(second.path().join("e").exists());
    }
}
