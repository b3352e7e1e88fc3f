//! Inputs handed over by the rendering collaborator.

use crate::preset::Preset;
use crate::temp::TempArtifact;

/// Longest title kept in the attachment filename, in characters.
pub const MAX_FILENAME_TITLE: usize = 123;

/// A raw PDF produced upstream, plus what the renderer knows about it.
///
/// The artifact is owned by the pipeline from here on and is released when
/// the job reaches `Cleaned`.
#[derive(Debug)]
pub struct RenderedDocument {
    pub artifact: TempArtifact,
    /// HTTP-like status reported by the renderer. Anything outside 2xx
    /// aborts the job before any distillation work.
    pub status: u16,
    /// Reason phrase accompanying a non-success status.
    pub status_text: String,
    /// Document title, if the renderer found one.
    pub title: Option<String>,
    /// Location the document was rendered from (URL or path).
    pub location: String,
}

impl RenderedDocument {
    /// A successfully rendered document.
    pub fn new(artifact: TempArtifact, location: impl Into<String>) -> Self {
        Self {
            artifact,
            status: 200,
            status_text: "OK".to_string(),
            title: None,
            location: location.into(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_status(mut self, status: u16, text: impl Into<String>) -> Self {
        self.status = status;
        self.status_text = text.into();
        self
    }

    pub fn is_ready(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// The renderer's title, or the location's file stem when it has none.
    pub fn effective_title(&self) -> String {
        match self.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => title_from_location(&self.location),
        }
    }
}

/// Last path segment of `location` without its extension.
///
/// Query strings, fragments and the `scheme://host` part of a URL are
/// ignored, so `https://host/docs/report.html?v=2` gives `report` and a
/// URL with no path gives an empty title.
pub fn title_from_location(location: &str) -> String {
    let location = location.split(['?', '#']).next().unwrap_or_default();
    let path = match location.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |slash| &rest[slash..]),
        None => location,
    }
    .trim_end_matches('/');
    let base = path.rsplit('/').next().unwrap_or_default();
    match base.rfind('.') {
        Some(dot) if dot > 0 => base[..dot].to_string(),
        _ => base.to_string(),
    }
}

/// Attachment filename: the title cut to [`MAX_FILENAME_TITLE`] characters
/// plus `.pdf`.
pub fn attachment_filename(title: &str) -> String {
    let mut name: String = title.chars().take(MAX_FILENAME_TITLE).collect();
    name.push_str(".pdf");
    name
}

/// One unit of work for the controller.
#[derive(Debug)]
pub struct PipelineJob {
    pub document: RenderedDocument,
    pub preset: Preset,
    /// A page count already known to the caller; skips the query.
    pub page_count: Option<u32>,
}

impl PipelineJob {
    pub fn new(document: RenderedDocument, preset: Preset) -> Self {
        Self {
            document,
            preset,
            page_count: None,
        }
    }

    pub fn with_page_count(mut self, pages: u32) -> Self {
        self.page_count = Some(pages);
        self
    }
}
