//! # tool-locate
//!
//! Resolve external command-line tools (Ghostscript, qpdf, …) to an
//! executable path once per process and remember the answer.
//!
//! ## How it works
//!
//! On the first call to [`locate`] for a given program name:
//!
//! 1. If the name contains a path separator it is checked as-is.
//! 2. Otherwise every directory on `PATH` is searched for an executable file.
//! 3. The resolved absolute path is cached; later calls skip the filesystem.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tool_locate::locate;
//!
//! let gs = locate("gs").expect("ghostscript is required");
//! let qpdf = locate("/usr/local/bin/qpdf").expect("qpdf is required");
//! println!("{} / {}", gs.display(), qpdf.display());
//! ```
//!
//! A missing tool is reported as [`LocateError::NotFound`]. Callers treat it
//! as an environment fault raised at startup, not a per-request retry
//! condition.

use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};

use thiserror::Error;

// ── Error type ───────────────────────────────────────────────────────────────

/// Errors returned by tool-locate operations.
#[derive(Error, Debug)]
pub enum LocateError {
    /// The program is not on `PATH` (or the explicit path is not executable).
    #[error("Tool '{program}' not found: {reason}")]
    NotFound { program: String, reason: String },
}

// ── Thread-safe resolution cache ─────────────────────────────────────────────

static RESOLVED: OnceLock<Mutex<HashMap<OsString, PathBuf>>> = OnceLock::new();

fn cache() -> &'static Mutex<HashMap<OsString, PathBuf>> {
    RESOLVED.get_or_init(|| Mutex::new(HashMap::new()))
}

fn cached(program: &OsStr) -> Option<PathBuf> {
    cache()
        .lock()
        .ok()
        .and_then(|map| map.get(program).cloned())
}

fn remember(program: &OsStr, path: &Path) {
    // A poisoned lock only loses the memo; resolution itself still succeeded.
    if let Ok(mut map) = cache().lock() {
        map.insert(program.to_os_string(), path.to_path_buf());
    }
}

// ── Public API ───────────────────────────────────────────────────────────────

/// Resolve `program` to an executable path, caching the result.
///
/// Safe to call from multiple threads simultaneously; two racing lookups
/// both succeed and store the same answer.
pub fn locate(program: impl AsRef<OsStr>) -> Result<PathBuf, LocateError> {
    let program = program.as_ref();
    if let Some(path) = cached(program) {
        return Ok(path);
    }

    let path = which::which(program).map_err(|e| LocateError::NotFound {
        program: program.to_string_lossy().into_owned(),
        reason: e.to_string(),
    })?;

    remember(program, &path);
    Ok(path)
}

/// Returns `true` when `program` resolves to an executable.
pub fn is_available(program: impl AsRef<OsStr>) -> bool {
    locate(program).is_ok()
}

// ── Tests ─────────────────────────────────────────────────────────────────────
