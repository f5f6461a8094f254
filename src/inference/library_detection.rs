//! Shared-library lookup used when probing for accelerator runtimes.
//!
//! ONNX Runtime registers the CUDA provider even when the CUDA runtime is
//! missing and then silently runs on CPU. Looking for the runtime library
//! up front lets the device selector report the real outcome.
//!
//! Search order:
//! - **Windows**: every entry of `PATH`
//! - **Linux**: `LD_LIBRARY_PATH`, then `/usr/lib`, `/usr/local/lib`,
//!   `/usr/lib/x86_64-linux-gnu`, `/usr/lib/aarch64-linux-gnu`, `/usr/lib64`,
//!   `/usr/local/cuda/lib64`
//! - **macOS**: `DYLD_LIBRARY_PATH`, then `/usr/lib`, `/usr/local/lib`

use std::path::{Path, PathBuf};
use tracing::debug;

/// Split a path-list environment variable into directories.
fn env_paths(var: &str, separator: char) -> Vec<PathBuf> {
    match std::env::var(var) {
        Ok(value) => value
            .split(separator)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(PathBuf::from)
            .collect(),
        Err(std::env::VarError::NotUnicode(_)) => {
            debug!("{var} contains invalid Unicode, ignoring");
            Vec::new()
        }
        Err(std::env::VarError::NotPresent) => {
            debug!("{var} not set");
            Vec::new()
        }
    }
}

/// Directories to search for shared libraries on this platform.
pub fn get_library_search_paths() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    let paths = env_paths("PATH", ';');

    #[cfg(target_os = "linux")]
    let paths = {
        let mut paths = env_paths("LD_LIBRARY_PATH", ':');
        paths.extend(
            [
                "/usr/lib",
                "/usr/local/lib",
                "/usr/lib/x86_64-linux-gnu",
                "/usr/lib/aarch64-linux-gnu", // Jetson / ARM64 distributions
                "/usr/lib64",
                "/usr/local/cuda/lib64",
            ]
            .map(PathBuf::from),
        );
        paths
    };

    #[cfg(target_os = "macos")]
    let paths = {
        let mut paths = env_paths("DYLD_LIBRARY_PATH", ':');
        paths.extend(["/usr/lib", "/usr/local/lib"].map(PathBuf::from));
        paths
    };

    #[cfg(not(any(target_os = "windows", target_os = "linux", target_os = "macos")))]
    let paths = Vec::new();

    paths
}

/// Whether any file in `dir` matches one of `patterns`.
fn dir_has_match(dir: &Path, patterns: &[&str]) -> bool {
    if !dir.is_dir() {
        debug!("Skipping search path that is not a directory: {}", dir.display());
        return false;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read directory {}: {}", dir.display(), e);
            return false;
        }
    };

    entries.filter_map(std::result::Result::ok).any(|entry| {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        let hit = path.is_file() && patterns.iter().any(|p| matches_pattern(name, p));
        if hit {
            debug!("Found library {}", path.display());
        }
        hit
    })
}

/// Check whether a library matching any of `patterns` exists in `paths`.
///
/// Patterns support `*` (any run of characters) and `?` (one character).
pub fn check_library_pattern_exists(paths: &[PathBuf], patterns: &[&str]) -> bool {
    paths.iter().any(|dir| dir_has_match(dir, patterns))
}

/// Glob match over bytes, no allocation.
fn matches_pattern(filename: &str, pattern: &str) -> bool {
    fn inner(name: &[u8], pattern: &[u8]) -> bool {
        match pattern.split_first() {
            None => name.is_empty(),
            Some((b'*', rest)) => (0..=name.len()).any(|i| inner(&name[i..], rest)),
            Some((b'?', rest)) => !name.is_empty() && inner(&name[1..], rest),
            Some((c, rest)) => name.first() == Some(c) && inner(&name[1..], rest),
        }
    }
    inner(filename.as_bytes(), pattern.as_bytes())
}
