//! The pipeline controller: drives one job through its stages.
//!
//! ```text
//! Rendered ──▶ PageCounting? ──▶ Distilling? ──▶ Streaming ──▶ Cleaned
//!     │              │                │                           ▲
//!     └──────────────┴────────────────┴──── any failure ──────────┘
//! ```
//!
//! Work is split across two calls so the host can commit its response
//! headers before the first byte is sent:
//!
//! * [`Pipeline::prepare`] runs everything up to and including
//!   `Distilling`. On failure the job goes straight to `Cleaned` and the
//!   error is returned; no output exists.
//! * [`PreparedDocument::stream_to`] runs `Streaming` and `Cleaned`.
//!
//! [`Pipeline::run`] does both in one call.

use crate::config::{DistillConfig, Tool};
use crate::error::DistillError;
use crate::job::{attachment_filename, PipelineJob};
use crate::output::{Delivery, PipelineOutcome, PreparedDocument};
use crate::pipeline::{pagecount, split};
use crate::preset::{Preset, PresetRegistry, PresetSpec};
use crate::temp::TempTracker;
use std::fmt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::AsyncWrite;
use tracing::{debug, error, info, warn};

static NEXT_JOB_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle stage of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Rendered,
    PageCounting,
    Distilling,
    Streaming,
    Cleaned,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rendered => "rendered",
            Self::PageCounting => "page_counting",
            Self::Distilling => "distilling",
            Self::Streaming => "streaming",
            Self::Cleaned => "cleaned",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolved tool paths reported by [`Pipeline::validate`].
#[derive(Debug, Clone)]
pub struct Environment {
    pub distiller: PathBuf,
    pub splitter: PathBuf,
    pub temp_root: PathBuf,
}

/// Shared entry point for distillation jobs. Cheap to clone.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: Arc<DistillConfig>,
    registry: Arc<PresetRegistry>,
    tracker: TempTracker,
}

impl Pipeline {
    /// ICC references in `registry` are validated against
    /// `config.profile_root`, whatever root the registry was built with.
    pub fn new(config: DistillConfig, registry: PresetRegistry) -> Self {
        let tracker = TempTracker::new(config.temp_root.clone());
        let registry = registry.with_profile_root(config.profile_root.clone());
        Self {
            config: Arc::new(config),
            registry: Arc::new(registry),
            tracker,
        }
    }

    pub fn config(&self) -> &DistillConfig {
        &self.config
    }

    pub fn registry(&self) -> &PresetRegistry {
        &self.registry
    }

    /// The tracker every artifact of this pipeline goes through. Renderers
    /// should acquire (or adopt) their output here.
    pub fn tracker(&self) -> &TempTracker {
        &self.tracker
    }

    /// Resolve a preset by name with request-time values on top.
    pub fn resolve(&self, name: Option<&str>, request: &PresetSpec) -> Result<Preset, DistillError> {
        self.registry.resolve_with(name, request)
    }

    /// Check the environment before serving: both tools must resolve and
    /// the temp root must be creatable.
    pub async fn validate(&self) -> Result<Environment, DistillError> {
        let distiller = locate(&self.config.distiller)?;
        let splitter = locate(&self.config.splitter)?;
        tokio::fs::create_dir_all(&self.config.temp_root)
            .await
            .map_err(|e| DistillError::io("creating temp root", e))?;
        info!(
            distiller = %distiller.display(),
            splitter = %splitter.display(),
            temp_root = %self.config.temp_root.display(),
            "Environment ready"
        );
        Ok(Environment {
            distiller,
            splitter,
            temp_root: self.config.temp_root.clone(),
        })
    }

    /// Run a job up to the point where its output is committed.
    pub async fn prepare(&self, job: PipelineJob) -> Result<PreparedDocument, DistillError> {
        let id = NEXT_JOB_ID.fetch_add(1, Ordering::Relaxed);
        let PipelineJob {
            document,
            preset,
            page_count,
        } = job;
        self.enter(id, Stage::Rendered);

        if !document.is_ready() {
            let err = DistillError::UpstreamNotReady {
                status: document.status,
                reason: document.status_text.clone(),
            };
            warn!(job = id, status = document.status, "Upstream not ready; nothing distilled");
            drop(document);
            self.enter(id, Stage::Cleaned);
            return Err(err);
        }

        let title = document.effective_title();
        let filename = attachment_filename(&title);
        let parallelism = self.config.effective_parallelism(preset.parallelism_hint);
        info!(
            job = id,
            preset = %preset.name,
            title = %title,
            parallelism,
            "Preparing document"
        );

        let needs_count = preset.report_page_count || (preset.distills() && parallelism > 1);
        let page_count = match page_count {
            Some(n) => Some(n),
            None if needs_count => {
                self.enter(id, Stage::PageCounting);
                match pagecount::page_count(document.artifact.path(), &self.config).await {
                    Ok(n) => Some(n),
                    Err(e) => {
                        drop(document);
                        return Err(self.fail(id, e));
                    }
                }
            }
            None => None,
        };

        let Some(quality) = preset.quality else {
            debug!(job = id, "No quality tier; passing through");
            return Ok(PreparedDocument {
                job_id: id,
                page_count: page_count.filter(|_| preset.report_page_count),
                title,
                filename,
                delivery: Delivery::PassThrough,
                body: document.artifact,
                raw: None,
                progress: self.config.progress_callback.clone(),
            });
        };

        self.enter(id, Stage::Distilling);
        let distilled = split::process(
            document.artifact.path(),
            &preset,
            &title,
            page_count,
            parallelism,
            &self.config,
            &self.tracker,
        )
        .await;
        let body = match distilled {
            Ok(body) => body,
            Err(e) => {
                drop(document);
                return Err(self.fail(id, e));
            }
        };

        Ok(PreparedDocument {
            job_id: id,
            page_count: page_count.filter(|_| preset.report_page_count),
            title,
            filename,
            delivery: Delivery::Distilled {
                quality,
                parallelism,
            },
            body,
            raw: Some(document.artifact),
            progress: self.config.progress_callback.clone(),
        })
    }

    /// Prepare `job` and stream the result into `sink`.
    pub async fn run<W>(&self, job: PipelineJob, sink: &mut W) -> Result<PipelineOutcome, DistillError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.prepare(job).await?.stream_to(sink).await
    }

    fn enter(&self, id: u64, stage: Stage) {
        debug!(job = id, stage = %stage, "Stage transition");
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_stage(id, stage);
        }
    }

    fn fail(&self, id: u64, e: DistillError) -> DistillError {
        error!(job = id, status = e.status_code(), error = %e, "Job failed");
        self.enter(id, Stage::Cleaned);
        e
    }
}

fn locate(tool: &Tool) -> Result<PathBuf, DistillError> {
    tool_locate::locate(&tool.program).map_err(|e| DistillError::EngineUnavailable {
        tool: tool.display_name(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::RenderedDocument;
    use std::sync::Mutex;

    struct Stages(Mutex<Vec<Stage>>);

    impl crate::progress::DistillProgressCallback for Stages {
        fn on_stage(&self, _job_id: u64, stage: Stage) {
            self.0.lock().unwrap().push(stage);
        }
    }

    fn pipeline(dir: &std::path::Path, cb: Option<Arc<Stages>>) -> Pipeline {
        let mut builder = DistillConfig::builder()
            .temp_root(dir)
            .distiller(Tool::new("/nonexistent/gs"))
            .splitter(Tool::new("/nonexistent/qpdf"));
        if let Some(cb) = cb {
            builder = builder.progress_callback(cb);
        }
        Pipeline::new(builder.build().unwrap(), PresetRegistry::builtin("/icc"))
    }

    #[tokio::test]
    async fn pass_through_never_spawns_and_delivers_input() {
        let dir = tempfile::tempdir().unwrap();
        let stages = Arc::new(Stages(Mutex::new(Vec::new())));
        let p = pipeline(dir.path(), Some(stages.clone()));
        let raw = p.tracker().acquire(".pdf").unwrap();
        std::fs::write(raw.path(), b"%PDF-1.4 raw bytes").unwrap();
        let job = PipelineJob::new(
            RenderedDocument::new(raw, "https://host/doc.html"),
            p.resolve(None, &PresetSpec::default()).unwrap(),
        );

        let mut sink = Vec::new();
        let outcome = p.run(job, &mut sink).await.unwrap();
        assert_eq!(sink, b"%PDF-1.4 raw bytes");
        assert_eq!(outcome.filename, "doc.pdf");
        assert_eq!(outcome.delivery, Delivery::PassThrough);
        assert_eq!(outcome.content_type, "application/pdf");
        assert_eq!(p.tracker().live_count(), 0);
        assert_eq!(
            *stages.0.lock().unwrap(),
            vec![Stage::Rendered, Stage::Streaming, Stage::Cleaned]
        );
    }

    #[tokio::test]
    async fn upstream_failure_aborts_before_any_work() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), None);
        let raw = p.tracker().acquire(".pdf").unwrap();
        let doc = RenderedDocument::new(raw, "x").with_status(502, "Bad Gateway");
        let job = PipelineJob::new(doc, p.resolve(Some("screen"), &PresetSpec::default()).unwrap());
        let err = p.prepare(job).await.unwrap_err();
        assert_eq!(err.status_code(), 502);
        assert_eq!(p.tracker().live_count(), 0);
    }

    #[tokio::test]
    async fn missing_engine_is_unavailable_and_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), None);
        let raw = p.tracker().acquire(".pdf").unwrap();
        let job = PipelineJob::new(
            RenderedDocument::new(raw, "x"),
            p.resolve(Some("screen"), &PresetSpec::default()).unwrap(),
        );
        let err = p.prepare(job).await.unwrap_err();
        assert!(matches!(err, DistillError::EngineUnavailable { .. }), "{err:?}");
        assert_eq!(p.tracker().live_count(), 0);
    }

    #[tokio::test]
    async fn validate_reports_missing_tool() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), None);
        let err = p.validate().await.unwrap_err();
        assert!(matches!(err, DistillError::EngineUnavailable { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn validate_creates_temp_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("nested/tmp");
        let config = DistillConfig::builder()
            .temp_root(&root)
            .distiller(Tool::new("sh"))
            .splitter(Tool::new("sh"))
            .build()
            .unwrap();
        let p = Pipeline::new(config, PresetRegistry::default());
        let env = p.validate().await.unwrap();
        assert!(root.is_dir());
        assert!(env.distiller.is_absolute());
    }

    #[tokio::test]
    async fn each_prepared_job_gets_a_fresh_id() {
        let dir = tempfile::tempdir().unwrap();
        let p = pipeline(dir.path(), None);
        let mut ids = Vec::new();
        for _ in 0..2 {
            let raw = p.tracker().acquire(".pdf").unwrap();
            let job = PipelineJob::new(
                RenderedDocument::new(raw, "https://host/doc.html"),
                p.resolve(None, &PresetSpec::default()).unwrap(),
            );
            let prepared = p.prepare(job).await.unwrap();
            ids.push(prepared.job_id());
        }
        assert!(ids[1] > ids[0], "{ids:?}");
        assert_eq!(p.tracker().live_count(), 0);
    }

    #[test]
    fn configured_profile_root_governs_icc_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let config = DistillConfig::builder()
            .temp_root(dir.path())
            .profile_root(dir.path().join("icc"))
            .build()
            .unwrap();
        let p = Pipeline::new(config, PresetRegistry::default());
        let request = PresetSpec {
            icc: Some("coated.icc".into()),
            ..Default::default()
        };
        let preset = p.resolve(Some("printer"), &request).unwrap();
        let icc = preset.icc_profile.unwrap();
        assert!(icc.starts_with(dir.path().join("icc")), "{}", icc.display());
        assert_eq!(p.registry().profile_root(), dir.path().join("icc"));

        let escape = PresetSpec {
            icc: Some("/usr/share/color/icc/coated.icc".into()),
            ..Default::default()
        };
        let err = p.resolve(Some("printer"), &escape).unwrap_err();
        assert!(matches!(err, DistillError::ForbiddenProfilePath { .. }));
    }

    #[test]
    fn stage_names() {
        assert_eq!(Stage::PageCounting.to_string(), "page_counting");
        assert_eq!(Stage::Cleaned.as_str(), "cleaned");
    }
}
