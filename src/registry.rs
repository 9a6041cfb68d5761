//! Test-name registry.
//!
//! Tracks which snapshot identities were claimed during this process, whether any
//! assertion ran at all, and which snapshot directories were touched. The cleanup
//! sweep reads it after the run to tell live snapshots from orphans.

use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use thiserror::Error;

static GLOBAL: Lazy<Registry> = Lazy::new(Registry::new);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("expectation {0:?} is already set")]
    Repeated(String),
}

#[derive(Debug, Default)]
struct State {
    claimed: HashSet<String>,
    ran: bool,
    dirs: BTreeSet<PathBuf>,
}

#[derive(Debug, Default)]
pub struct Registry {
    state: Mutex<State>,
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Registry shared by every assertion in this process.
    pub fn global() -> &'static Registry {
        &GLOBAL
    }

    /// Claim an escaped identity. A second claim of the same identity fails.
    ///
    /// Any call, failed or not, marks the run as having executed an assertion.
    pub fn claim(&self, escaped: &str) -> Result<(), RegistryError> {
        let mut state = self.state.lock();
        state.ran = true;
        if !state.claimed.insert(escaped.to_string()) {
            return Err(RegistryError::Repeated(escaped.to_string()));
        }
        Ok(())
    }

    pub fn is_claimed(&self, escaped: &str) -> bool {
        self.state.lock().claimed.contains(escaped)
    }

    pub fn ran(&self) -> bool {
        self.state.lock().ran
    }

    pub fn claimed_count(&self) -> usize {
        self.state.lock().claimed.len()
    }

    pub(crate) fn record_dir(&self, dir: &Path) {
        let mut state = self.state.lock();
        if !state.dirs.contains(dir) {
            state.dirs.insert(dir.to_path_buf());
        }
    }

    /// Snapshot directories resolved by assertions so far, sorted.
    pub fn dirs(&self) -> Vec<PathBuf> {
        self.state.lock().dirs.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn fresh_registry_has_not_run() {
        let registry = Registry::new();
        assert!(!registry.ran());
        assert_eq!(registry.claimed_count(), 0);
    }

    #[test]
    fn second_claim_is_rejected() {
        let registry = Registry::new();
        registry.claim("dup").unwrap();

        let err = registry.claim("dup").unwrap_err();

        assert_eq!(err, RegistryError::Repeated("dup".to_string()));
        assert_eq!(err.to_string(), "expectation \"dup\" is already set");
        assert!(registry.is_claimed("dup"));
        assert_eq!(registry.claimed_count(), 1);
    }

    #[test]
    fn failed_claim_still_counts_as_ran() {
        let registry = Registry::new();
        registry.claim("a").unwrap();
        let _ = registry.claim("a");
        assert!(registry.ran());
    }

    #[test]
    fn dirs_are_deduplicated_and_sorted() {
        let registry = Registry::new();
        registry.record_dir(Path::new("/b"));
        registry.record_dir(Path::new("/a"));
        registry.record_dir(Path::new("/b"));

        assert_eq!(registry.dirs(), [PathBuf::from("/a"), PathBuf::from("/b")]);
    }

    #[test]
    fn concurrent_claims_admit_exactly_one_winner() {
        let registry = Arc::new(Registry::new());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.claim("shared").is_ok())
            })
            .collect();
        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(winners, 1);
    }
}
