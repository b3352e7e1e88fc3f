//! Temp-artifact tracking with guaranteed, at-most-once removal.
//!
//! Every intermediate file the pipeline touches is acquired here; no stage
//! builds a temp path by hand. [`TempTracker::acquire`] creates an empty,
//! uniquely named file under the temp root (`O_EXCL` creation via
//! [`tempfile`], so concurrent jobs can never collide) and returns a
//! [`TempArtifact`] guard.
//!
//! The guard is the scoped-acquisition discipline: the artifact is released
//! when the guard is released explicitly *or* dropped, whichever comes first,
//! so early returns and `?` propagation clean up without extra code. Release
//! goes through the tracker's live set, which makes it idempotent: a path
//! that is no longer live is never touched again, so a late second release
//! cannot remove an unrelated file that happened to reuse the name.

use crate::error::DistillError;
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

const PREFIX: &str = "pdfdistill-";

/// Shared registry of live temp artifacts. Cheap to clone.
#[derive(Clone)]
pub struct TempTracker {
    inner: Arc<Inner>,
}

struct Inner {
    root: PathBuf,
    live: Mutex<HashSet<PathBuf>>,
}

impl fmt::Debug for TempTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempTracker")
            .field("root", &self.inner.root)
            .field("live", &self.live_count())
            .finish()
    }
}

impl TempTracker {
    /// Track artifacts created under `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(Inner {
                root: root.into(),
                live: Mutex::new(HashSet::new()),
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Create a fresh empty file named `pdfdistill-<random><suffix>`.
    pub fn acquire(&self, suffix: &str) -> Result<TempArtifact, DistillError> {
        let path = tempfile::Builder::new()
            .prefix(PREFIX)
            .suffix(suffix)
            .rand_bytes(12)
            .tempfile_in(&self.inner.root)
            .map_err(|e| DistillError::io("creating temp artifact", e))?
            .into_temp_path()
            .keep()
            .map_err(|e| DistillError::io("keeping temp artifact", e.error))?;

        self.register(path.clone());
        debug!(path = %path.display(), "Acquired temp artifact");
        Ok(TempArtifact {
            path,
            tracker: self.clone(),
            released: false,
        })
    }

    /// Take ownership of a file created elsewhere (e.g. by the renderer).
    ///
    /// The file will be removed when the returned guard is released.
    pub fn adopt(&self, path: impl Into<PathBuf>) -> TempArtifact {
        let path = path.into();
        self.register(path.clone());
        TempArtifact {
            path,
            tracker: self.clone(),
            released: false,
        }
    }

    /// Remove `path` if it is a live artifact of this tracker.
    ///
    /// Returns `true` if this call released it. Repeated calls, and calls for
    /// paths this tracker never handed out, are no-ops returning `false`.
    pub fn release(&self, path: &Path) -> bool {
        let was_live = match self.inner.live.lock() {
            Ok(mut live) => live.remove(path),
            Err(poisoned) => poisoned.into_inner().remove(path),
        };
        if !was_live {
            return false;
        }
        match std::fs::remove_file(path) {
            Ok(()) => debug!(path = %path.display(), "Released temp artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "Temp artifact already gone")
            }
            Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temp artifact"),
        }
        true
    }

    /// Number of artifacts acquired and not yet released.
    pub fn live_count(&self) -> usize {
        match self.inner.live.lock() {
            Ok(live) => live.len(),
            Err(poisoned) => poisoned.into_inner().len(),
        }
    }

    fn register(&self, path: PathBuf) {
        match self.inner.live.lock() {
            Ok(mut live) => live.insert(path),
            Err(poisoned) => poisoned.into_inner().insert(path),
        };
    }
}

/// Scoped ownership of one temp file. Released exactly once.
pub struct TempArtifact {
    path: PathBuf,
    tracker: TempTracker,
    released: bool,
}

impl fmt::Debug for TempArtifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TempArtifact")
            .field("path", &self.path)
            .field("released", &self.released)
            .finish()
    }
}

impl TempArtifact {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Remove the file now instead of at drop.
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if !self.released {
            self.released = true;
            self.tracker.release(&self.path);
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_creates_unique_files_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempTracker::new(dir.path());
        let a = tracker.acquire(".pdf").unwrap();
        let b = tracker.acquire(".pdf").unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(dir.path()));
        assert!(a.path().exists());
        assert!(a.path().to_string_lossy().ends_with(".pdf"));
        assert_eq!(tracker.live_count(), 2);
    }

    #[test]
    fn drop_releases() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempTracker::new(dir.path());
        let path = {
            let a = tracker.acquire(".ps").unwrap();
            a.path().to_path_buf()
        };
        assert!(!path.exists());
        assert_eq!(tracker.live_count(), 0);
    }

    #[test]
    fn release_is_idempotent_and_spares_unrelated_files() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempTracker::new(dir.path());
        let a = tracker.acquire(".pdf").unwrap();
        let path = a.path().to_path_buf();
        a.release();
        assert!(!path.exists());

        // Something unrelated now lives at the same path.
        std::fs::write(&path, b"not ours").unwrap();
        assert!(!tracker.release(&path));
        assert!(!tracker.release(&path));
        assert_eq!(std::fs::read(&path).unwrap(), b"not ours");
    }

    #[test]
    fn release_of_untracked_path_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempTracker::new(dir.path());
        let other = dir.path().join("keep.pdf");
        std::fs::write(&other, b"x").unwrap();
        assert!(!tracker.release(&other));
        assert!(other.exists());
    }

    #[test]
    fn adopt_takes_ownership_of_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempTracker::new(dir.path());
        let rendered = dir.path().join("rendered.pdf");
        std::fs::write(&rendered, b"%PDF-1.7").unwrap();
        let artifact = tracker.adopt(&rendered);
        assert_eq!(tracker.live_count(), 1);
        drop(artifact);
        assert!(!rendered.exists());
        assert_eq!(tracker.live_count(), 0);
    }

    #[test]
    fn tracker_release_then_guard_drop_is_single_removal() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempTracker::new(dir.path());
        let a = tracker.acquire(".pdf").unwrap();
        let path = a.path().to_path_buf();
        assert!(tracker.release(&path));
        std::fs::write(&path, b"recreated by someone else").unwrap();
        drop(a);
        assert!(path.exists(), "guard must not remove a path already released");
    }

    #[test]
    fn missing_root_is_io_error() {
        let tracker = TempTracker::new("/nonexistent/pdfdistill/root");
        let err = tracker.acquire(".pdf").unwrap_err();
        assert!(matches!(err, DistillError::Io { .. }));
    }
}
