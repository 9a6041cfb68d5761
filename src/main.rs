use clap::Parser;
use expectations::cli::{CheckArgs, Cli, Command, ListArgs, ShowArgs};
use expectations::config::{Config, Grouping};
use expectations::platform;
use expectations::report;
use expectations::store::SnapshotFile;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

fn snapshot_dir(dir: Option<PathBuf>) -> PathBuf {
    if let Some(dir) = dir {
        return dir;
    }

    let root = platform::crate_root().unwrap_or_else(|e| {
        eprintln!("Error determining crate root: {e}");
        std::process::exit(1);
    });
    let config = Config::discover(&root).unwrap_or_else(|e| {
        eprintln!("Error reading config: {e}");
        std::process::exit(1);
    });

    if config.snapshot_dir.is_none() && config.grouping == Grouping::ByTestFile {
        eprintln!("Snapshots are grouped by test file, pass --dir to pick one.");
        std::process::exit(1);
    }
    config.snapshot_dir(&root, Path::new(""))
}

fn list(args: ListArgs) {
    let dir = snapshot_dir(args.dir);

    let listing = match report::collect(&dir) {
        Ok(listing) => listing,
        Err(e) => {
            eprintln!("Error listing snapshots: {e}");
            std::process::exit(1);
        }
    };

    if args.json {
        match report::json::render(&listing) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("Error rendering JSON: {e}");
                std::process::exit(1);
            }
        }
    } else {
        print!("{}", report::table::render(&listing));
    }
}

fn show(args: ShowArgs) {
    let dir = snapshot_dir(args.dir);

    let path = match report::find(&dir, &args.identity) {
        Ok(Some(path)) => path,
        Ok(None) => {
            eprintln!("No snapshot for '{}' in {}", args.identity, dir.display());
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("Error listing snapshots: {e}");
            std::process::exit(1);
        }
    };

    match SnapshotFile::load(&path) {
        Ok(snapshot) => {
            println!("file: {}", path.display());
            println!("os: {}", snapshot.header.os);
            println!("limit_to_os: {}", snapshot.header.limit_to_os);
            println!();
            println!("{}", String::from_utf8_lossy(&snapshot.body));
        }
        Err(e) => {
            eprintln!("Error loading snapshot: {e}");
            std::process::exit(1);
        }
    }
}

fn check(args: CheckArgs) {
    let dir = snapshot_dir(args.dir);

    let listing = match report::collect(&dir) {
        Ok(listing) => listing,
        Err(e) => {
            eprintln!("Error listing snapshots: {e}");
            std::process::exit(1);
        }
    };

    if listing.problems.is_empty() {
        println!("{} snapshots ok", listing.entries.len());
        return;
    }

    for problem in &listing.problems {
        eprintln!("{}: {}", problem.file_name, problem.error);
    }
    eprintln!(
        "\n{} of {} snapshots are unreadable",
        listing.problems.len(),
        listing.problems.len() + listing.entries.len()
    );
    std::process::exit(1);
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::List(args) => list(args),
        Command::Show(args) => show(args),
        Command::Check(args) => check(args),
    }
}
