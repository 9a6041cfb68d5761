use clap::builder::FalseyValueParser;
use clap::{Parser, Subcommand};
use once_cell::sync::Lazy;
use std::path::PathBuf;

static CURRENT: Lazy<RunArgs> = Lazy::new(RunArgs::from_env);

#[derive(Parser)]
#[command(name = "expectations")]
#[command(about = "Inspect the snapshots stored by expectation tests")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// List the snapshots of a directory
    List(ListArgs),

    /// Print the header and body of one snapshot
    Show(ShowArgs),

    /// Load every snapshot and report the malformed ones
    Check(CheckArgs),
}

#[derive(Parser)]
pub struct ListArgs {
    /// Snapshot directory (defaults to the one configured for this crate)
    #[arg(long)]
    pub dir: Option<PathBuf>,

    /// Output as JSON instead of table
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

#[derive(Parser)]
pub struct ShowArgs {
    /// Snapshot identity, as passed to the assertion
    pub identity: String,

    /// Snapshot directory (defaults to the one configured for this crate)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[derive(Parser)]
pub struct CheckArgs {
    /// Snapshot directory (defaults to the one configured for this crate)
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

/// Switches of the current test run.
///
/// libtest rejects flags it does not know, so the switches normally arrive through
/// the environment. Custom harnesses can also pass `-u` / `--cleanup` directly.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(no_binary_name = true, disable_help_flag = true, disable_version_flag = true)]
pub struct RunArgs {
    /// Overwrite snapshots that are missing or differ
    #[arg(short = 'u', long, env = "EXPECT_UPDATE", value_parser = FalseyValueParser::new())]
    pub update: bool,

    /// Delete stale snapshots during the cleanup sweep
    #[arg(long, env = "EXPECT_CLEANUP", value_parser = FalseyValueParser::new())]
    pub cleanup: bool,

    /// Test name filters handed to the harness
    pub filters: Vec<String>,

    /// Test names skipped by the harness
    #[arg(long)]
    pub skip: Vec<String>,
}

// libtest options that consume the following argument
const HARNESS_VALUE_OPTIONS: &[&str] = &[
    "--test-threads",
    "--format",
    "--color",
    "--logfile",
    "--shuffle-seed",
    "-Z",
];

impl RunArgs {
    /// Switches of this process, parsed once.
    pub fn current() -> &'static RunArgs {
        &CURRENT
    }

    /// Parses the process arguments and environment, falling back to defaults when
    /// the arguments cannot be understood.
    pub fn from_env() -> Self {
        let args = std::env::args_os()
            .skip(1)
            .map(|arg| arg.to_string_lossy().into_owned());
        match Self::parse_args(args) {
            Ok(args) => args,
            Err(e) => {
                tracing::warn!("ignoring unparseable test arguments: {e}");
                RunArgs::default()
            }
        }
    }

    /// Parses harness arguments (without the binary name), dropping the ones this
    /// crate does not know.
    pub fn parse_args<I, S>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::try_parse_from(retain_known(args.into_iter().map(Into::into)))
    }

    /// True when the harness was asked to run a subset of the tests.
    pub fn is_filtered(&self) -> bool {
        !self.filters.is_empty() || !self.skip.is_empty()
    }
}

fn retain_known(mut args: impl Iterator<Item = String>) -> Vec<String> {
    let mut kept = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-u" | "--update" | "--cleanup" => kept.push(arg),
            "--skip" => {
                kept.push(arg);
                if let Some(value) = args.next() {
                    kept.push(value);
                }
            }
            "--" => {
                // everything after is positional
                kept.push(arg);
                kept.extend(args.by_ref());
            }
            _ if arg.starts_with("--skip=") => kept.push(arg),
            _ if HARNESS_VALUE_OPTIONS.contains(&arg.as_str()) => {
                args.next();
            }
            _ if arg.starts_with('-') => {}
            _ => kept.push(arg),
        }
    }

    kept
}
