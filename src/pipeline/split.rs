//! Parallel distillation: split into page-range chunks, distill each chunk
//! concurrently, merge the results back in page order.
//!
//! ## Flow per chunk
//!
//! ```text
//! input ──split──▶ chunk.pdf ──distill──▶ chunk-out.pdf ──┐
//!                  (released)                             ├─merge─▶ output
//! input ──split──▶ chunk.pdf ──distill──▶ chunk-out.pdf ──┘ (chunk outputs
//!                                                            released)
//! ```
//!
//! Each intermediate file is released as soon as the next step has consumed
//! it, so peak disk usage is bounded by the number of chunks in flight plus
//! the finished chunk outputs awaiting merge.
//!
//! ## Failure
//!
//! The first failing chunk raises a shared abort flag. Chunks that have not
//! started yet are skipped; chunks already running are allowed to finish
//! (no process tree is killed mid-write) and their outputs are released
//! unmerged. The job then fails with
//! [`DistillError::PartialDistillFailure`] carrying the first observed error.

use super::args;
use super::distill;
use super::process::{self, Stdout};
use crate::config::DistillConfig;
use crate::error::{ChunkError, DistillError};
use crate::preset::Preset;
use crate::temp::{TempArtifact, TempTracker};
use futures::stream::{self, StreamExt};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;
use tracing::{debug, error, info};

/// qpdf exits with 3 when it succeeded with warnings.
const SPLITTER_WARNINGS_EXIT: i32 = 3;

/// A contiguous, 1-based, inclusive page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunk {
    pub index: usize,
    pub first: u32,
    pub last: u32,
}

impl Chunk {
    pub fn pages(&self) -> u32 {
        self.last - self.first + 1
    }
}

/// How a document will be distilled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    /// One distiller run over the whole input.
    SingleShot,
    /// Two or more chunks, in page order.
    Chunked(Vec<Chunk>),
}

/// Partition `1..=page_count` into chunks of `ceil(page_count / parallelism)`
/// pages. The last chunk may be shorter.
pub fn plan_chunks(page_count: u32, parallelism: usize) -> Vec<Chunk> {
    if page_count == 0 {
        return Vec::new();
    }
    let parallelism = parallelism.clamp(1, page_count as usize) as u32;
    let size = page_count.div_ceil(parallelism);
    let mut chunks = Vec::with_capacity(parallelism as usize);
    let mut first = 1;
    while first <= page_count {
        let last = (first + size - 1).min(page_count);
        chunks.push(Chunk {
            index: chunks.len(),
            first,
            last,
        });
        first = last + 1;
    }
    chunks
}

/// Decide between single-shot and chunked distillation.
pub fn plan(page_count: Option<u32>, parallelism: usize) -> Plan {
    match page_count {
        Some(n) if parallelism > 1 => {
            let chunks = plan_chunks(n, parallelism);
            if chunks.len() > 1 {
                Plan::Chunked(chunks)
            } else {
                Plan::SingleShot
            }
        }
        _ => Plan::SingleShot,
    }
}

/// Distill `input` with `preset`, in parallel when the page count and
/// `parallelism` allow it. Returns the distilled document as a fresh
/// artifact owned by the caller.
#[allow(clippy::too_many_arguments)]
pub async fn process(
    input: &Path,
    preset: &Preset,
    title: &str,
    page_count: Option<u32>,
    parallelism: usize,
    config: &DistillConfig,
    tracker: &TempTracker,
) -> Result<TempArtifact, DistillError> {
    let chunks = match plan(page_count, parallelism) {
        Plan::SingleShot => {
            debug!(?page_count, parallelism, "Single-shot distillation");
            return single_shot(input, preset, title, page_count, config, tracker).await;
        }
        Plan::Chunked(chunks) => chunks,
    };

    let total = chunks.len();
    let start = Instant::now();
    info!(
        pages = ?page_count,
        chunks = total,
        parallelism,
        "Distilling in parallel"
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_distill_start(total, page_count);
    }

    let aborted = AtomicBool::new(false);
    let aborted = &aborted;

    // Completion order, not page order.
    let results: Vec<(usize, Result<TempArtifact, ChunkError>)> =
        stream::iter(chunks.iter().map(|chunk| async move {
            let result = run_chunk(*chunk, total, input, preset, title, config, tracker, aborted).await;
            if let Err(ref e) = result {
                if !matches!(e, ChunkError::Skipped { .. }) {
                    aborted.store(true, Ordering::SeqCst);
                    error!(chunk = chunk.index, error = %e, "Chunk failed");
                    if let Some(ref cb) = config.progress_callback {
                        cb.on_chunk_error(chunk.index, total, &e.to_string());
                    }
                }
            }
            (chunk.index, result)
        }))
        .buffer_unordered(parallelism)
        .collect()
        .await;

    let mut first_error: Option<ChunkError> = None;
    let mut failed = 0;
    let mut outputs: Vec<Option<TempArtifact>> = (0..total).map(|_| None).collect();
    for (index, result) in results {
        match result {
            Ok(artifact) => outputs[index] = Some(artifact),
            Err(ChunkError::Skipped { .. }) => {}
            Err(e) => {
                failed += 1;
                first_error.get_or_insert(e);
            }
        }
    }

    if let Some(first_error) = first_error {
        // Dropping `outputs` releases every completed chunk.
        drop(outputs);
        if let Some(ref cb) = config.progress_callback {
            cb.on_distill_complete(total, false);
        }
        return Err(DistillError::PartialDistillFailure {
            failed,
            total,
            first_error,
        });
    }

    let parts: Vec<TempArtifact> = outputs.into_iter().flatten().collect();
    let merged = tracker.acquire(".pdf")?;
    let paths: Vec<&Path> = parts.iter().map(TempArtifact::path).collect();
    merge(&paths, merged.path(), config).await?;
    for part in parts {
        part.release();
    }

    info!(
        chunks = total,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Merged distilled chunks"
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_distill_complete(total, true);
    }
    Ok(merged)
}

async fn single_shot(
    input: &Path,
    preset: &Preset,
    title: &str,
    page_count: Option<u32>,
    config: &DistillConfig,
    tracker: &TempTracker,
) -> Result<TempArtifact, DistillError> {
    if let Some(ref cb) = config.progress_callback {
        cb.on_distill_start(1, page_count);
    }
    let output = tracker.acquire(".pdf")?;
    let result = distill::run(input, output.path(), preset, title, config, tracker).await;
    if let Some(ref cb) = config.progress_callback {
        cb.on_distill_complete(1, result.is_ok());
    }
    result.map(|()| output)
}

#[allow(clippy::too_many_arguments)]
async fn run_chunk(
    chunk: Chunk,
    total: usize,
    input: &Path,
    preset: &Preset,
    title: &str,
    config: &DistillConfig,
    tracker: &TempTracker,
    aborted: &AtomicBool,
) -> Result<TempArtifact, ChunkError> {
    let Chunk { index, first, last } = chunk;
    if aborted.load(Ordering::SeqCst) {
        return Err(ChunkError::Skipped { index });
    }
    if let Some(ref cb) = config.progress_callback {
        cb.on_chunk_start(index, total);
    }

    let split_failed = |e: DistillError| ChunkError::SplitFailed {
        index,
        first,
        last,
        detail: e.to_string(),
    };
    let pages = tracker.acquire(".pdf").map_err(split_failed)?;
    extract(input, first, last, pages.path(), config)
        .await
        .map_err(split_failed)?;

    if aborted.load(Ordering::SeqCst) {
        return Err(ChunkError::Skipped { index });
    }

    let distill_failed = |e: DistillError| ChunkError::DistillFailed {
        index,
        first,
        last,
        detail: e.to_string(),
    };
    let output = tracker.acquire(".pdf").map_err(distill_failed)?;
    distill::run(pages.path(), output.path(), preset, title, config, tracker)
        .await
        .map_err(distill_failed)?;
    pages.release();

    debug!(chunk = index, first, last, "Chunk distilled");
    if let Some(ref cb) = config.progress_callback {
        cb.on_chunk_complete(index, total);
    }
    Ok(output)
}

/// Extract pages `first..=last` of `input` into `output`.
pub async fn extract(
    input: &Path,
    first: u32,
    last: u32,
    output: &Path,
    config: &DistillConfig,
) -> Result<(), DistillError> {
    let argv = args::split_args(input, first, last, output);
    run_splitter(&argv, config).await
}

/// Concatenate `parts` in order into `output`.
pub async fn merge(parts: &[&Path], output: &Path, config: &DistillConfig) -> Result<(), DistillError> {
    let argv = args::merge_args(parts, output);
    run_splitter(&argv, config).await
}

async fn run_splitter(argv: &[String], config: &DistillConfig) -> Result<(), DistillError> {
    let finished = process::run(&config.splitter, argv, Stdout::Discard, config.timeout_secs).await?;
    if !finished.exited_ok(&[SPLITTER_WARNINGS_EXIT]) {
        return Err(DistillError::EngineFailure {
            tool: config.splitter.display_name(),
            detail: finished.status_detail(),
            diagnostics: finished.stderr,
        });
    }
    if !finished.stderr.trim().is_empty() {
        debug!(diagnostics = %finished.stderr.trim(), "Splitter diagnostics");
    }
    Ok(())
}
