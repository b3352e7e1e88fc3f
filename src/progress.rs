//! Progress-callback trait for chunk-level distillation events.
//!
//! Inject an [`Arc<dyn DistillProgressCallback>`] via
//! [`crate::config::DistillConfigBuilder::progress_callback`] to observe a
//! job as it moves through its stages and, for parallel jobs, as each chunk
//! is split and distilled.
//!
//! # Example
//!
//! ```rust
//! use pdf_distill::{DistillConfig, DistillProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl DistillProgressCallback for CountingCallback {
//!     fn on_chunk_complete(&self, index: usize, total: usize) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("chunk {index} done ({n}/{total})");
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//! let config = DistillConfig::builder()
//!     .progress_callback(cb as Arc<dyn DistillProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::controller::Stage;
use std::sync::Arc;

/// Called by the pipeline as a job progresses.
///
/// Implementations must be `Send + Sync`: chunk events arrive concurrently
/// from parallel distillations. All methods default to no-ops.
pub trait DistillProgressCallback: Send + Sync {
    /// The job entered `stage`.
    fn on_stage(&self, job_id: u64, stage: Stage) {
        let _ = (job_id, stage);
    }

    /// Distillation is about to start over `total_chunks` chunks
    /// (1 for a single-shot run).
    fn on_distill_start(&self, total_chunks: usize, page_count: Option<u32>) {
        let _ = (total_chunks, page_count);
    }

    /// Chunk `index` (0-based) started splitting.
    fn on_chunk_start(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Chunk `index` finished distilling.
    fn on_chunk_complete(&self, index: usize, total: usize) {
        let _ = (index, total);
    }

    /// Chunk `index` failed with `error`.
    fn on_chunk_error(&self, index: usize, total: usize, error: &str) {
        let _ = (index, total, error);
    }

    /// Distillation finished; `success` is false when any chunk failed.
    fn on_distill_complete(&self, total_chunks: usize, success: bool) {
        let _ = (total_chunks, success);
    }
}

/// Shared handle type stored in the config.
pub type ProgressCallback = Arc<dyn DistillProgressCallback>;

/// A no-op callback, useful as a default.
pub struct NoopProgressCallback;

impl DistillProgressCallback for NoopProgressCallback {}
