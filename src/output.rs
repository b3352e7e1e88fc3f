//! Results of a pipeline run.
//!
//! [`PreparedDocument`] is the committed result of `Pipeline::prepare`: the
//! final bytes exist on disk and every header-worthy fact (status, page
//! count, filename) is known, but nothing has been written to the consumer
//! yet. [`PreparedDocument::stream_to`] performs the `Streaming` and
//! `Cleaned` stages and returns a [`PipelineOutcome`].

use crate::controller::Stage;
use crate::error::DistillError;
use crate::preset::Quality;
use crate::progress::ProgressCallback;
use crate::stream::{copy_to_sink, CopyOutcome};
use crate::temp::TempArtifact;
use serde::Serialize;
use std::path::Path;
use tokio::io::AsyncWrite;
use tracing::{debug, error, info, warn};

/// Content type of every delivered document.
pub const CONTENT_TYPE: &str = "application/pdf";

/// How the delivered bytes were produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Delivery {
    /// The rendered PDF, byte for byte.
    PassThrough,
    /// Re-encoded by the distiller.
    Distilled { quality: Quality, parallelism: usize },
}

/// What happened while streaming.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StreamReport {
    pub bytes_written: u64,
    /// Set when the consumer went away mid-stream.
    pub disconnected: Option<String>,
}

/// The finished job as seen by the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    pub job_id: u64,
    /// HTTP-equivalent status of the response.
    pub status: u16,
    /// Page count to surface to the consumer, when the preset asks for it.
    pub page_count: Option<u32>,
    pub filename: String,
    pub content_type: &'static str,
    pub delivery: Delivery,
    pub stream: StreamReport,
}

/// A document committed for delivery. Dropping it without streaming
/// releases its artifacts.
pub struct PreparedDocument {
    pub(crate) job_id: u64,
    pub(crate) page_count: Option<u32>,
    pub(crate) title: String,
    pub(crate) filename: String,
    pub(crate) delivery: Delivery,
    /// The bytes to deliver.
    pub(crate) body: TempArtifact,
    /// The rendered input, when `body` is a distilled copy of it.
    pub(crate) raw: Option<TempArtifact>,
    pub(crate) progress: Option<ProgressCallback>,
}

impl std::fmt::Debug for PreparedDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedDocument")
            .field("job_id", &self.job_id)
            .field("page_count", &self.page_count)
            .field("filename", &self.filename)
            .field("delivery", &self.delivery)
            .field("body", &self.body)
            .finish()
    }
}

impl PreparedDocument {
    pub fn job_id(&self) -> u64 {
        self.job_id
    }

    /// Always 200: failures never produce a prepared document.
    pub fn status(&self) -> u16 {
        200
    }

    pub fn page_count(&self) -> Option<u32> {
        self.page_count
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    pub fn content_type(&self) -> &'static str {
        CONTENT_TYPE
    }

    pub fn delivery(&self) -> Delivery {
        self.delivery
    }

    /// Path of the bytes that will be streamed. Valid until this value is
    /// consumed or dropped.
    pub fn path(&self) -> &Path {
        self.body.path()
    }

    /// Copy the document into `sink`, then release every artifact.
    ///
    /// A consumer disconnect is not an error: it is logged, recorded in
    /// [`StreamReport::disconnected`] and cleanup still runs. Only a failure
    /// to read our own output is returned as `Err`.
    pub async fn stream_to<W>(self, sink: &mut W) -> Result<PipelineOutcome, DistillError>
    where
        W: AsyncWrite + Unpin + ?Sized,
    {
        self.enter(Stage::Streaming);
        let copied = match tokio::fs::File::open(self.body.path()).await {
            Ok(mut file) => copy_to_sink(&mut file, sink).await,
            Err(e) => Err(DistillError::io("opening distilled output", e)),
        };

        let report = match copied {
            Ok(CopyOutcome::Completed { bytes }) => {
                info!(job = self.job_id, bytes, filename = %self.filename, "Delivered document");
                StreamReport {
                    bytes_written: bytes,
                    disconnected: None,
                }
            }
            Ok(CopyOutcome::Disconnected { bytes, error }) => {
                warn!(
                    job = self.job_id,
                    disconnect = true,
                    bytes,
                    error = %error,
                    "Consumer disconnected mid-stream"
                );
                StreamReport {
                    bytes_written: bytes,
                    disconnected: Some(error.to_string()),
                }
            }
            Err(e) => {
                error!(job = self.job_id, error = %e, "Streaming failed");
                self.clean();
                return Err(e);
            }
        };

        let outcome = PipelineOutcome {
            job_id: self.job_id,
            status: self.status(),
            page_count: self.page_count,
            filename: self.filename.clone(),
            content_type: CONTENT_TYPE,
            delivery: self.delivery,
            stream: report,
        };
        self.clean();
        Ok(outcome)
    }

    fn enter(&self, stage: Stage) {
        debug!(job = self.job_id, stage = %stage, "Stage transition");
        if let Some(ref cb) = self.progress {
            cb.on_stage(self.job_id, stage);
        }
    }

    fn clean(self) {
        let Self {
            job_id,
            body,
            raw,
            progress,
            ..
        } = self;
        body.release();
        if let Some(raw) = raw {
            raw.release();
        }
        debug!(job = job_id, stage = %Stage::Cleaned, "Stage transition");
        if let Some(cb) = progress {
            cb.on_stage(job_id, Stage::Cleaned);
        }
    }
}
