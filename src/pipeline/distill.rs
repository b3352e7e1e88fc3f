//! Distiller invocation: one external run over one input file.
//!
//! [`run`] writes the optional control file, assembles the argument list,
//! runs the engine under the configured time limit and applies the failure
//! policy:
//!
//! | exit | output stream | result |
//! |------|---------------|--------|
//! | non-zero | any | [`DistillError::EngineFailure`] with stderr attached |
//! | zero | read error | [`DistillError::EngineFailure`] |
//! | zero | fully read | success; stderr is logged as informational noise |
//!
//! The control file is released when the process has exited, whatever the
//! outcome.

use super::args;
use super::control;
use super::process::{self, Stdout};
use crate::config::{DistillConfig, OutputMode};
use crate::error::DistillError;
use crate::preset::Preset;
use crate::temp::TempTracker;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info};

/// Distill `input` into `output` with `preset`, stamping `title`.
///
/// `output` must already exist (it is normally a fresh
/// [`crate::temp::TempArtifact`]); it is overwritten.
pub async fn run(
    input: &Path,
    output: &Path,
    preset: &Preset,
    title: &str,
    config: &DistillConfig,
    tracker: &TempTracker,
) -> Result<(), DistillError> {
    let Some(quality) = preset.quality else {
        return Err(DistillError::InvalidConfig(format!(
            "preset '{}' has no quality tier to distill with",
            preset.name
        )));
    };

    let control_file = control::write_control_file(
        preset,
        title,
        config.control_template.as_deref(),
        tracker,
    )
    .await?;

    let argv = args::distill_args(
        preset,
        quality,
        title,
        input,
        output,
        config.output_mode,
        config.rendering_threads,
        control_file.as_ref().map(|c| c.path()),
    );

    let target = match config.output_mode {
        OutputMode::Stdout => Stdout::File(output),
        OutputMode::File => Stdout::Discard,
    };

    let start = Instant::now();
    let outcome = process::run(&config.distiller, &argv, target, config.timeout_secs).await;
    drop(control_file);
    let finished = outcome?;

    let tool = config.distiller.display_name();
    if !finished.exited_ok(&[]) {
        return Err(DistillError::EngineFailure {
            tool,
            detail: finished.status_detail(),
            diagnostics: finished.stderr,
        });
    }
    if let Some(e) = finished.stdout_error {
        return Err(DistillError::EngineFailure {
            tool,
            detail: format!("output stream unreadable: {e}"),
            diagnostics: finished.stderr,
        });
    }
    if !finished.stderr.trim().is_empty() {
        debug!(tool = %tool, diagnostics = %finished.stderr.trim(), "Distiller diagnostics");
    }

    info!(
        preset = %preset.name,
        quality = %quality,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Distilled {}",
        input.display()
    );
    Ok(())
}
