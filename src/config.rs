//! Configuration types for the distillation pipeline.
//!
//! All pipeline behaviour is controlled through [`DistillConfig`], built via
//! its [`DistillConfigBuilder`]. Preset parameters live separately in the
//! [`crate::preset::PresetRegistry`]; this struct holds the process-level
//! knobs: which tools to run, where temp files go, and how long and how
//! widely to run them.

use crate::error::DistillError;
use crate::preset::DEFAULT_PROFILE_ROOT;
use crate::progress::ProgressCallback;
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;

/// An external command: program plus arguments inserted before the
/// pipeline's own (e.g. `nice -n 10 gs …` or `sh fake-gs.sh …`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tool {
    pub program: PathBuf,
    pub prefix_args: Vec<OsString>,
}

impl Tool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            prefix_args: Vec::new(),
        }
    }

    pub fn with_prefix_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.prefix_args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Short name for logs and error messages.
    pub fn display_name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }
}

/// How the distiller hands back its output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// `-sOutputFile=-`: stdout is the binary channel, copied into the
    /// output artifact while stderr is captured as diagnostics. (default)
    #[default]
    Stdout,
    /// `-sOutputFile=<path>`: the distiller writes the artifact itself.
    File,
}

/// Configuration for a [`crate::controller::Pipeline`].
///
/// # Example
/// ```rust
/// use pdf_distill::DistillConfig;
///
/// let config = DistillConfig::builder()
///     .timeout_secs(60)
///     .max_parallelism(4)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct DistillConfig {
    /// The distiller engine. Default: `gs` on `PATH`.
    pub distiller: Tool,

    /// Page extraction / concatenation utility. Default: `qpdf` on `PATH`.
    pub splitter: Tool,

    /// Directory for every temp artifact. Default: the system temp dir.
    pub temp_root: PathBuf,

    /// ICC profile references must resolve inside this directory.
    pub profile_root: PathBuf,

    /// Control-file template. `None` uses the built-in PDF/X definition.
    pub control_template: Option<PathBuf>,

    /// Wall-clock limit per external invocation, in seconds. Default: 120.
    ///
    /// A process that exceeds it is killed and the job fails with
    /// [`DistillError::EngineTimeout`].
    pub timeout_secs: u64,

    /// Upper bound on concurrent chunk distillations. Default: CPUs − 1.
    ///
    /// The effective parallelism of a job is
    /// `min(preset.parallelism_hint, max_parallelism)`.
    pub max_parallelism: usize,

    /// `-dNumRenderingThreads` passed to the distiller. Default: CPUs − 1.
    pub rendering_threads: usize,

    /// Distiller output channel. Default: [`OutputMode::Stdout`].
    pub output_mode: OutputMode,

    /// Optional observer for chunk-level events.
    pub progress_callback: Option<ProgressCallback>,
}

/// Available processing units minus a reserve of one, never below one.
pub fn default_parallelism() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .saturating_sub(1)
        .max(1)
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self {
            distiller: Tool::new("gs"),
            splitter: Tool::new("qpdf"),
            temp_root: std::env::temp_dir(),
            profile_root: PathBuf::from(DEFAULT_PROFILE_ROOT),
            control_template: None,
            timeout_secs: 120,
            max_parallelism: default_parallelism(),
            rendering_threads: default_parallelism(),
            output_mode: OutputMode::default(),
            progress_callback: None,
        }
    }
}

impl fmt::Debug for DistillConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistillConfig")
            .field("distiller", &self.distiller)
            .field("splitter", &self.splitter)
            .field("temp_root", &self.temp_root)
            .field("profile_root", &self.profile_root)
            .field("control_template", &self.control_template)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_parallelism", &self.max_parallelism)
            .field("rendering_threads", &self.rendering_threads)
            .field("output_mode", &self.output_mode)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn DistillProgressCallback>"),
            )
            .finish()
    }
}

impl DistillConfig {
    /// Create a new builder for `DistillConfig`.
    pub fn builder() -> DistillConfigBuilder {
        DistillConfigBuilder {
            config: Self::default(),
        }
    }

    /// Chunk parallelism for a preset hint, bounded by this config.
    pub fn effective_parallelism(&self, hint: usize) -> usize {
        hint.min(self.max_parallelism).max(1)
    }
}

/// Builder for [`DistillConfig`].
#[derive(Debug)]
pub struct DistillConfigBuilder {
    config: DistillConfig,
}

impl DistillConfigBuilder {
    pub fn distiller(mut self, tool: Tool) -> Self {
        self.config.distiller = tool;
        self
    }

    pub fn splitter(mut self, tool: Tool) -> Self {
        self.config.splitter = tool;
        self
    }

    pub fn temp_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_root = dir.into();
        self
    }

    pub fn profile_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.profile_root = dir.into();
        self
    }

    pub fn control_template(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.control_template = Some(path.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    /// Clamped to `1..=CPUs − 1`.
    pub fn max_parallelism(mut self, n: usize) -> Self {
        self.config.max_parallelism = n.clamp(1, default_parallelism());
        self
    }

    pub fn rendering_threads(mut self, n: usize) -> Self {
        self.config.rendering_threads = n.max(1);
        self
    }

    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.config.output_mode = mode;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<DistillConfig, DistillError> {
        let c = &self.config;
        if c.timeout_secs == 0 {
            return Err(DistillError::InvalidConfig(
                "Timeout must be ≥ 1 second".into(),
            ));
        }
        if c.distiller.program.as_os_str().is_empty() || c.splitter.program.as_os_str().is_empty()
        {
            return Err(DistillError::InvalidConfig(
                "Tool program must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = DistillConfig::default();
        assert_eq!(c.distiller, Tool::new("gs"));
        assert_eq!(c.splitter, Tool::new("qpdf"));
        assert_eq!(c.timeout_secs, 120);
        assert!(c.max_parallelism >= 1);
        assert_eq!(c.output_mode, OutputMode::Stdout);
        assert_eq!(c.profile_root, PathBuf::from("/usr/share/color/icc"));
    }

    #[test]
    fn parallelism_is_clamped_to_cpus_minus_one() {
        let c = DistillConfig::builder().max_parallelism(10_000).build().unwrap();
        assert_eq!(c.max_parallelism, default_parallelism());
        let c = DistillConfig::builder().max_parallelism(0).build().unwrap();
        assert_eq!(c.max_parallelism, 1);
    }

    #[test]
    fn effective_parallelism_takes_the_smaller_bound() {
        let mut c = DistillConfig::default();
        c.max_parallelism = 3;
        assert_eq!(c.effective_parallelism(8), 3);
        assert_eq!(c.effective_parallelism(2), 2);
        assert_eq!(c.effective_parallelism(0), 1);
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = DistillConfig::builder().timeout_secs(0).build().unwrap_err();
        assert!(matches!(err, DistillError::InvalidConfig(_)));
    }

    #[test]
    fn tool_display_name_uses_file_name() {
        assert_eq!(Tool::new("/usr/bin/gs").display_name(), "gs");
        let t = Tool::new("/bin/sh").with_prefix_args(["fake-gs.sh"]);
        assert_eq!(t.prefix_args, vec![OsString::from("fake-gs.sh")]);
    }
}
