//! Snapshot assertions for tests.
//!
//! A test hands a value and a name to [`assert_snapshot`]. The first run stores the
//! value's canonical form on disk (run with `EXPECT_UPDATE=1`); later runs diff the
//! live value against it and panic with the difference.
//!
//! ```no_run
//! use expectations::{assert_snapshot, Json, Text};
//!
//! assert_snapshot("greeting", Text::new("Hello World"));
//! assert_snapshot("user", Json::new(r#"{"id": 1}"#));
//! ```
//!
//! Stale snapshots, those no assertion claimed during the run, are found by
//! [`cleanup`] / [`must_cleanup`], meant to be called once every test has finished
//! (for example from a `harness = false` test binary).

pub mod clean;
pub mod cli;
pub mod compare;
pub mod config;
pub mod error;
pub mod platform;
pub mod registry;
pub mod report;
pub mod snapshot;
pub mod store;
pub mod util;

pub use clean::{cleanup, must_cleanup, CleanMode, CleanupError, Sweep, SweepOptions, SweepReport};
pub use cli::RunArgs;
pub use compare::{Comparable, CompareError, HttpResponse, InvalidPolicy, Json, Kind, Text};
pub use config::{Config, Grouping};
pub use error::Error;
pub use registry::Registry;
pub use snapshot::{
    assert_os_snapshot, assert_os_snapshot_with_config, assert_snapshot, assert_snapshot_with_config,
    Outcome, Runner,
};
