//! Shared plumbing for the `rlvm` and `rlkp` binaries: game-directory
//! discovery and tracing setup. Neither binary is the core; both are
//! thin hosts that open a game directory and drive [`rlvm`] through its
//! public API.

use std::fs;
use std::path::{Path, PathBuf};

use rlvm::{Archive, Gameexe};
use rlvm_types::{Error, Result};

/// Find a directory entry whose name matches `wanted` case-insensitively,
/// since shipped game directories are inconsistent about casing
/// (`SEEN.TXT` vs `Seen.txt`, `Gameexe.ini` vs `GAMEEXE.INI`).
fn find_case_insensitive(dir: &Path, wanted: &str) -> Option<PathBuf> {
    let entries = fs::read_dir(dir).ok()?;
    for entry in entries.flatten() {
        let name = entry.file_name();
        if name.to_string_lossy().eq_ignore_ascii_case(wanted) {
            return Some(entry.path());
        }
    }
    None
}

/// Open the `SEEN.TXT` archive inside `game_directory`.
pub fn open_archive(game_directory: &Path) -> Result<Archive> {
    let path = find_case_insensitive(game_directory, "SEEN.TXT").ok_or_else(|| {
        Error::NotFound(format!(
            "no SEEN.TXT in {}",
            game_directory.display()
        ))
    })?;
    Archive::new(path)
}

/// Load `Gameexe.ini` from `game_directory`, if present. A missing
/// Gameexe is not fatal — callers fall back to an empty one — since
/// disassembly and basic ticking don't need it.
///
/// Gameexe files ship CP932-encoded; this core's codepage handling lives
/// outside the parser (see `rlvm::gameexe`), so the host reads the file
/// lossily rather than pulling in a full CP932 decoder for a CLI smoke
/// test.
pub fn open_gameexe(game_directory: &Path) -> Gameexe {
    let Some(path) = find_case_insensitive(game_directory, "Gameexe.ini") else {
        tracing::warn!(dir = %game_directory.display(), "no Gameexe.ini found, using an empty one");
        return Gameexe::new();
    };
    match fs::read(&path) {
        Ok(bytes) => Gameexe::parse(&String::from_utf8_lossy(&bytes)),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to read Gameexe.ini, using an empty one");
            Gameexe::new()
        }
    }
}

/// Install a `tracing` subscriber reading `RUST_LOG`, defaulting to
/// `info` or `debug` depending on `verbose`.
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// The process exit code an `Error` maps to at the CLI boundary: every
/// core error is a configuration/path problem from the host's point of
/// view (spec's documented `-1`, which `std::process::exit` renders as
/// `255`).
pub fn exit_code_for_error(_err: &Error) -> i32 {
    255
}
