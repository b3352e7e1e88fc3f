//! Error types for the pdf-distill library.
//!
//! Two distinct error types reflect two distinct failure scopes:
//!
//! * [`DistillError`]: **Fatal** for the job. The document cannot be
//!   delivered (unknown preset, forbidden profile path, engine missing or
//!   failing). Returned as `Err(DistillError)` from every pipeline entry point
//!   and mapped to an HTTP-equivalent status via [`DistillError::status_code`].
//!
//! * [`ChunkError`]: one chunk of a parallel distillation failed. Chunk
//!   errors never reach the caller on their own; the first one observed is
//!   wrapped in [`DistillError::PartialDistillFailure`] so a partially
//!   distilled document is never merged or streamed.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pdf-distill library.
#[derive(Debug, Error)]
pub enum DistillError {
    // ── Client input errors ───────────────────────────────────────────────
    /// The preset name is non-empty but not in the registry.
    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    /// An ICC profile reference resolves outside the configured profile root.
    #[error("Forbidden profile path: '{requested}' escapes {root:?}")]
    ForbiddenProfilePath { requested: String, root: PathBuf },

    // ── Upstream errors ───────────────────────────────────────────────────
    /// The rendering collaborator did not report success; nothing was distilled.
    #[error("Upstream not ready (status {status}): {reason}")]
    UpstreamNotReady { status: u16, reason: String },

    // ── Engine errors ─────────────────────────────────────────────────────
    /// The external tool binary could not be spawned.
    #[error("Cannot spawn '{tool}': {reason}")]
    EngineUnavailable { tool: String, reason: String },

    /// A spawned tool exited non-zero or its output stream was unreadable.
    #[error("'{tool}' failed ({detail}){}", diagnostics_suffix(.diagnostics))]
    EngineFailure {
        tool: String,
        detail: String,
        diagnostics: String,
    },

    /// A spawned tool exceeded the configured wall-clock limit and was killed.
    #[error("'{tool}' timed out after {secs}s")]
    EngineTimeout { tool: String, secs: u64 },

    /// The page-count query produced something other than one integer.
    #[error("Could not get page count: unparseable output {output:?}")]
    PageCountUnparseable { output: String },

    /// At least one parallel chunk failed; the merge was abandoned.
    #[error("{failed}/{total} chunks failed during distillation\nFirst error: {first_error}")]
    PartialDistillFailure {
        failed: usize,
        total: usize,
        first_error: ChunkError,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Temp-file or stream I/O failed inside the pipeline.
    #[error("I/O error during {context}: {source}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },
}

fn diagnostics_suffix(diagnostics: &str) -> String {
    let trimmed = diagnostics.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {trimmed}")
    }
}

impl DistillError {
    /// Wrap an I/O error with a short description of what was being done.
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// HTTP-equivalent status code for the host middleware.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnknownPreset(_) => 400,
            Self::ForbiddenProfilePath { .. } => 403,
            Self::UpstreamNotReady { status, .. } => *status,
            Self::EngineTimeout { .. } => 504,
            Self::EngineUnavailable { .. }
            | Self::EngineFailure { .. }
            | Self::PageCountUnparseable { .. }
            | Self::PartialDistillFailure { .. }
            | Self::InvalidConfig(_)
            | Self::Io { .. } => 500,
        }
    }

    /// `true` for errors caused by the caller's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

/// A single failed chunk of a parallel distillation.
#[derive(Debug, Clone, Error)]
pub enum ChunkError {
    /// Extracting the chunk's pages from the input failed.
    #[error("chunk {index} (pages {first}-{last}): split failed: {detail}")]
    SplitFailed {
        index: usize,
        first: u32,
        last: u32,
        detail: String,
    },

    /// The distiller failed on the extracted chunk.
    #[error("chunk {index} (pages {first}-{last}): distill failed: {detail}")]
    DistillFailed {
        index: usize,
        first: u32,
        last: u32,
        detail: String,
    },

    /// The chunk never ran because an earlier chunk already failed.
    #[error("chunk {index} skipped after an earlier failure")]
    Skipped { index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_preset_message_is_stable() {
        let e = DistillError::UnknownPreset("fancy".into());
        assert_eq!(e.to_string(), "Unknown preset: fancy");
        assert_eq!(e.status_code(), 400);
        assert!(e.is_client_error());
    }

    #[test]
    fn forbidden_profile_is_client_error() {
        let e = DistillError::ForbiddenProfilePath {
            requested: "../escape".into(),
            root: PathBuf::from("/usr/share/color/icc"),
        };
        assert_eq!(e.status_code(), 403);
        assert!(e.to_string().contains("../escape"));
    }

    #[test]
    fn upstream_status_is_passed_through() {
        let e = DistillError::UpstreamNotReady {
            status: 404,
            reason: "Not Found".into(),
        };
        assert_eq!(e.status_code(), 404);
    }

    #[test]
    fn engine_failure_includes_diagnostics() {
        let e = DistillError::EngineFailure {
            tool: "gs".into(),
            detail: "exit status 1".into(),
            diagnostics: "  Unrecoverable error\n".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("exit status 1"), "got: {msg}");
        assert!(msg.ends_with("Unrecoverable error"), "got: {msg}");
        assert_eq!(e.status_code(), 500);
        assert!(!e.is_client_error());
    }

    #[test]
    fn engine_failure_without_diagnostics_has_no_trailing_colon() {
        let e = DistillError::EngineFailure {
            tool: "qpdf".into(),
            detail: "exit status 2".into(),
            diagnostics: String::new(),
        };
        assert_eq!(e.to_string(), "'qpdf' failed (exit status 2)");
    }

    #[test]
    fn partial_failure_display() {
        let e = DistillError::PartialDistillFailure {
            failed: 1,
            total: 4,
            first_error: ChunkError::DistillFailed {
                index: 2,
                first: 5,
                last: 6,
                detail: "boom".into(),
            },
        };
        let msg = e.to_string();
        assert!(msg.contains("1/4"), "got: {msg}");
        assert!(msg.contains("pages 5-6"), "got: {msg}");
    }

    #[test]
    fn timeout_maps_to_gateway_timeout() {
        let e = DistillError::EngineTimeout {
            tool: "gs".into(),
            secs: 30,
        };
        assert_eq!(e.status_code(), 504);
        assert!(e.to_string().contains("30s"));
    }
}
