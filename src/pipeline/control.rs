//! PDF/X control-file generation.
//!
//! The control file is a PostScript prefix that attaches an ICC output
//! profile to the distilled document. It is produced from a template with
//! four placeholders (`!ICC!`, `!CONDITION!`, `!TITLE!`, `!INTENT!`); every
//! occurrence of each is replaced with an escaped value.
//!
//! Template text is read once per template path and cached for the life of
//! the process. Concurrent first loads may both read the file; the last
//! writer wins and both copies are identical.

use super::args::escape_ps_string;
use crate::error::DistillError;
use crate::preset::Preset;
use crate::temp::{TempArtifact, TempTracker};
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tracing::debug;

/// The PDF/X-3 definition shipped with the crate.
pub const BUILTIN_TEMPLATE: &str = include_str!("../../resources/PDFX_def.ps");

static TEMPLATE_CACHE: Lazy<RwLock<HashMap<PathBuf, Arc<str>>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

static BUILTIN: Lazy<Arc<str>> = Lazy::new(|| Arc::from(BUILTIN_TEMPLATE));

/// Template text for `path`, or the built-in one for `None`.
pub async fn load_template(path: Option<&Path>) -> Result<Arc<str>, DistillError> {
    let Some(path) = path else {
        return Ok(BUILTIN.clone());
    };

    if let Some(hit) = cached(path) {
        return Ok(hit);
    }

    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| DistillError::io(format!("reading control template {}", path.display()), e))?;
    let text: Arc<str> = Arc::from(text);
    debug!(path = %path.display(), "Cached control template");
    match TEMPLATE_CACHE.write() {
        Ok(mut cache) => cache.insert(path.to_path_buf(), text.clone()),
        Err(poisoned) => poisoned.into_inner().insert(path.to_path_buf(), text.clone()),
    };
    Ok(text)
}

fn cached(path: &Path) -> Option<Arc<str>> {
    match TEMPLATE_CACHE.read() {
        Ok(cache) => cache.get(path).cloned(),
        Err(poisoned) => poisoned.into_inner().get(path).cloned(),
    }
}

/// Substitute every placeholder in `template`.
pub fn render(template: &str, icc: &Path, condition: &str, title: &str, intent: &str) -> String {
    template
        .replace("!ICC!", &escape_ps_string(&icc.to_string_lossy()))
        .replace("!CONDITION!", &escape_ps_string(condition))
        .replace("!TITLE!", &escape_ps_string(title))
        .replace("!INTENT!", &escape_ps_string(intent))
}

/// Write a control file for `preset` into a fresh temp artifact.
///
/// Returns `None` when the preset carries no ICC profile. The artifact must
/// be kept alive until the distiller has exited.
pub async fn write_control_file(
    preset: &Preset,
    title: &str,
    template_path: Option<&Path>,
    tracker: &TempTracker,
) -> Result<Option<TempArtifact>, DistillError> {
    let Some(ref icc) = preset.icc_profile else {
        return Ok(None);
    };
    let template = load_template(template_path).await?;
    let body = render(
        &template,
        icc,
        &preset.output_condition(),
        title,
        preset.intent.name(),
    );
    let artifact = tracker.acquire(".ps")?;
    tokio::fs::write(artifact.path(), body)
        .await
        .map_err(|e| DistillError::io("writing control file", e))?;
    Ok(Some(artifact))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::{PresetRegistry, PresetSpec};

    #[test]
    fn builtin_template_has_every_placeholder() {
        for p in ["!ICC!", "!CONDITION!", "!TITLE!", "!INTENT!"] {
            assert!(BUILTIN_TEMPLATE.contains(p), "missing {p}");
        }
    }

    #[test]
    fn render_replaces_all_occurrences_and_escapes() {
        let tpl = "(!CONDITION!) (!CONDITION!) (!TITLE!) (!ICC!) !INTENT!";
        let out = render(
            tpl,
            Path::new("/icc/x.icc"),
            "FOGRA39",
            "a (b)",
            "AbsoluteColorimetric",
        );
        assert_eq!(
            out,
            "(FOGRA39) (FOGRA39) (a \\(b\\)) (\\/icc\\/x.icc) AbsoluteColorimetric"
        );
    }

    #[tokio::test]
    async fn no_profile_means_no_control_file() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempTracker::new(dir.path());
        let preset = PresetRegistry::builtin("/icc").resolve(Some("printer")).unwrap();
        let out = write_control_file(&preset, "t", None, &tracker).await.unwrap();
        assert!(out.is_none());
        assert_eq!(tracker.live_count(), 0);
    }

    #[tokio::test]
    async fn control_file_is_a_tracked_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = TempTracker::new(dir.path());
        let request = PresetSpec {
            icc: Some("coated.icc".into()),
            condition: Some("FOGRA39L".into()),
            ..Default::default()
        };
        let preset = PresetRegistry::builtin("/icc")
            .resolve_with(Some("printer"), &request)
            .unwrap();
        let ctl = write_control_file(&preset, "Report (Q3)", None, &tracker)
            .await
            .unwrap()
            .unwrap();
        let body = std::fs::read_to_string(ctl.path()).unwrap();
        assert!(body.contains("(FOGRA39L)"));
        assert!(body.contains("/Title (Report \\(Q3\\))"));
        assert!(!body.contains("!ICC!"));
        assert_eq!(tracker.live_count(), 1);
        drop(ctl);
        assert_eq!(tracker.live_count(), 0);
    }

    #[tokio::test]
    async fn custom_template_is_loaded_and_cached() {
        let dir = tempfile::tempdir().unwrap();
        let tpl = dir.path().join("custom.ps");
        std::fs::write(&tpl, "%! !TITLE!").unwrap();
        let first = load_template(Some(&tpl)).await.unwrap();
        std::fs::remove_file(&tpl).unwrap();
        let second = load_template(Some(&tpl)).await.unwrap();
        assert_eq!(&*first, "%! !TITLE!");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[tokio::test]
    async fn missing_template_is_io_error() {
        let err = load_template(Some(Path::new("/nonexistent/pdfx.ps")))
            .await
            .unwrap_err();
        assert!(matches!(err, DistillError::Io { .. }));
    }
}
