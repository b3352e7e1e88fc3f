//! # pdf-distill
//!
//! Re-encode rendered PDF documents through Ghostscript quality presets,
//! optionally in parallel page chunks, with every intermediate file tracked
//! and removed.
//!
//! ## Why this crate?
//!
//! Browsers print PDFs that are faithful but heavy: full-resolution images,
//! RGB everywhere, no output intent. Running them through Ghostscript's
//! `pdfwrite` device with a named preset shrinks them for the screen or
//! prepares them for print (CMYK, PDF/X output intent). Large documents are
//! split into page ranges with `qpdf`, distilled concurrently and merged
//! back in page order.
//!
//! ## Pipeline Overview
//!
//! ```text
//! rendered PDF
//!  │
//!  ├─ 1. Rendered      upstream status gate, title fallback
//!  ├─ 2. PageCounting  gs page-count query (reported or needed for splitting)
//!  ├─ 3. Distilling    gs pdfwrite, single-shot or qpdf split → N × gs → merge
//!  ├─ 4. Streaming     copy to the sink; consumer disconnects are tolerated
//!  └─ 5. Cleaned       every temp artifact released
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pdf_distill::{
//!     DistillConfig, Pipeline, PipelineJob, PresetRegistry, PresetSpec, RenderedDocument,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let pipeline = Pipeline::new(DistillConfig::default(), PresetRegistry::default());
//!     pipeline.validate().await?;
//!
//!     // Hand the renderer's output over to the pipeline.
//!     let raw = pipeline.tracker().acquire(".pdf")?;
//!     std::fs::copy("page.pdf", raw.path())?;
//!
//!     let preset = pipeline.resolve(Some("ebook"), &PresetSpec::default())?;
//!     let job = PipelineJob::new(RenderedDocument::new(raw, "https://example.com/page"), preset);
//!
//!     let prepared = pipeline.prepare(job).await?;
//!     eprintln!("{} ({:?} pages)", prepared.filename(), prepared.page_count());
//!     let mut out = tokio::fs::File::create("page-ebook.pdf").await?;
//!     prepared.stream_to(&mut out).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pdfdistill` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pdf-distill = { version = "0.1", default-features = false }
//! ```
//!
//! ## Presets
//!
//! | Preset | Quality | Scale | Notes |
//! |--------|---------|-------|-------|
//! | `default`  | none     | 1 | pass-through |
//! | `screen`   | screen   | 1 | 72 dpi images |
//! | `ebook`    | ebook    | 2 | 150 dpi images |
//! | `printer`  | printer  | 4 | CMYK, reports page count |
//! | `prepress` | prepress | 4 | colour preserving |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod controller;
pub mod error;
pub mod job;
pub mod output;
pub mod pipeline;
pub mod preset;
pub mod progress;
pub mod stream;
pub mod temp;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{DistillConfig, DistillConfigBuilder, OutputMode, Tool};
pub use controller::{Environment, Pipeline, Stage};
pub use error::{ChunkError, DistillError};
pub use job::{PipelineJob, RenderedDocument};
pub use output::{Delivery, PipelineOutcome, PreparedDocument, StreamReport};
pub use preset::{
    ColorStrategy, Preset, PresetRegistry, PresetSpec, Quality, QualitySetting, RenderIntent,
};
pub use progress::{DistillProgressCallback, NoopProgressCallback, ProgressCallback};
pub use temp::{TempArtifact, TempTracker};
