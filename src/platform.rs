use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    MacOS,
    Linux,
    Windows,
    Unknown,
}

pub fn detect() -> Platform {
    match current_os() {
        "macos" => Platform::MacOS,
        "linux" => Platform::Linux,
        "windows" => Platform::Windows,
        _ => Platform::Unknown,
    }
}

/// The OS name written into snapshot headers.
pub fn current_os() -> &'static str {
    std::env::consts::OS
}

/// An OS name guaranteed to differ from the current one, for tests that need a foreign snapshot.
pub fn foreign_os() -> &'static str {
    match detect() {
        Platform::Windows | Platform::MacOS => "linux",
        Platform::Linux | Platform::Unknown => "windows",
    }
}

/// Root the snapshot directories hang off.
///
/// Cargo exports CARGO_MANIFEST_DIR to test binaries, so under `cargo test` this is
/// the crate being tested. Anywhere else the working directory is used.
pub fn crate_root() -> std::io::Result<PathBuf> {
    match std::env::var_os("CARGO_MANIFEST_DIR") {
        Some(dir) => Ok(PathBuf::from(dir)),
        None => std::env::current_dir(),
    }
}
