//! CLI binary for pdf-distill.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `DistillConfig` / `PresetSpec`, runs one job and writes the result.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use pdf_distill::{
    DistillConfig, DistillProgressCallback, OutputMode, Pipeline, PipelineJob, PresetRegistry,
    PresetSpec, ProgressCallback, QualitySetting, RenderIntent, RenderedDocument, Stage, Tool,
};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

/// Spinner while counting pages, bar over chunks while distilling.
struct CliProgressCallback {
    bar: ProgressBar,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self {
            bar,
            errors: AtomicUsize::new(0),
        })
    }
}

impl DistillProgressCallback for CliProgressCallback {
    fn on_stage(&self, _job_id: u64, stage: Stage) {
        match stage {
            Stage::PageCounting => self.bar.set_message("Counting pages…"),
            Stage::Distilling => self.bar.set_message("Distilling…"),
            Stage::Streaming => self.bar.set_message("Writing…"),
            Stage::Cleaned => self.bar.finish_and_clear(),
            Stage::Rendered => {}
        }
    }

    fn on_distill_start(&self, total_chunks: usize, page_count: Option<u32>) {
        if total_chunks < 2 {
            return;
        }
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} chunks  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);
        self.bar.set_length(total_chunks as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Distilling");
        if let Some(pages) = page_count {
            self.bar
                .println(format!("{} {} pages in {} chunks", dim("◆"), pages, total_chunks));
        }
    }

    fn on_chunk_complete(&self, index: usize, total: usize) {
        self.bar
            .println(format!("  {} chunk {:>2}/{}", green("✓"), index + 1, total));
        self.bar.inc(1);
    }

    fn on_chunk_error(&self, index: usize, total: usize, error: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
        let msg = if error.chars().count() > 80 {
            format!("{}\u{2026}", error.chars().take(79).collect::<String>())
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} chunk {:>2}/{}  {}",
            red("✗"),
            index + 1,
            total,
            red(&msg)
        ));
        self.bar.inc(1);
    }

    fn on_distill_complete(&self, total_chunks: usize, success: bool) {
        let failed = self.errors.load(Ordering::SeqCst);
        if !success && failed > 0 {
            self.bar.println(format!(
                "  {} {failed}/{total_chunks} chunks failed; nothing merged",
                red("✗")
            ));
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Shrink for on-screen reading (stdout)
  pdfdistill --preset screen page.pdf > page-small.pdf

  # Print-ready CMYK with a PDF/X output intent
  pdfdistill --preset printer --icc ISOcoated_v2_300_eci.icc -o print.pdf page.pdf

  # Distill a long document in 4 parallel chunks
  pdfdistill --preset prepress --parallelism 4 -o book-print.pdf book.pdf

  # Custom presets from a JSON file
  pdfdistill --presets presets.json --preset x3 page.pdf -o x3.pdf

  # Show presets / check that gs and qpdf are installed
  pdfdistill --list-presets
  pdfdistill --check

PRESETS JSON:
  { "x3": { "quality": "printer", "icc": "ISOcoated.icc", "condition": "FOGRA39L" },
    "screen": { "parallelism": 4 } }

ENVIRONMENT VARIABLES:
  PDFDISTILL_GS           Distiller program (default: gs)
  PDFDISTILL_QPDF         Split/merge program (default: qpdf)
  PDFDISTILL_ICC_DIR      ICC profile root (default: /usr/share/color/icc)
  PDFDISTILL_TEMP_DIR     Temp artifact root (default: system temp dir)
  RUST_LOG                Log filter, overrides -v / -q
"#;

/// Re-encode PDF documents through Ghostscript presets.
#[derive(Parser, Debug)]
#[command(
    name = "pdfdistill",
    version,
    about = "Re-encode PDF documents through Ghostscript quality presets",
    long_about = "Re-encode a rendered PDF through a named Ghostscript preset (screen, ebook, \
printer, prepress or your own), optionally attaching an ICC output intent and distilling \
page ranges in parallel with qpdf.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF file to distill.
    #[arg(required_unless_present_any = ["list_presets", "check"])]
    input: Option<PathBuf>,

    /// Write the PDF to this file instead of stdout.
    #[arg(short, long, env = "PDFDISTILL_OUTPUT")]
    output: Option<PathBuf>,

    /// Preset name.
    #[arg(short, long, env = "PDFDISTILL_PRESET", default_value = "default")]
    preset: String,

    /// JSON file of preset overrides (name → fields).
    #[arg(long, env = "PDFDISTILL_PRESETS")]
    presets: Option<PathBuf>,

    /// Override the quality tier: screen, ebook, printer, prepress, or none.
    #[arg(long)]
    quality: Option<String>,

    /// ICC profile, relative to the profile root.
    #[arg(long)]
    icc: Option<String>,

    /// Output condition identifier (defaults to the profile name).
    #[arg(long)]
    condition: Option<String>,

    /// Rendering intent used with --icc.
    #[arg(long, value_enum)]
    intent: Option<IntentArg>,

    /// Chunk parallelism for this job.
    #[arg(long)]
    parallelism: Option<usize>,

    /// Document title (defaults to the input file stem).
    #[arg(long)]
    title: Option<String>,

    /// Per-invocation timeout in seconds.
    #[arg(long, env = "PDFDISTILL_TIMEOUT", default_value_t = 120)]
    timeout: u64,

    /// Upper bound on concurrent chunk distillations.
    #[arg(long, env = "PDFDISTILL_MAX_PARALLELISM")]
    max_parallelism: Option<usize>,

    /// Directory for temp artifacts.
    #[arg(long, env = "PDFDISTILL_TEMP_DIR")]
    temp_dir: Option<PathBuf>,

    /// Directory ICC profiles must live in.
    #[arg(long, env = "PDFDISTILL_ICC_DIR")]
    icc_dir: Option<PathBuf>,

    /// PDF/X control-file template (built-in if unset).
    #[arg(long, env = "PDFDISTILL_CONTROL_TEMPLATE")]
    control_template: Option<PathBuf>,

    /// Distiller program.
    #[arg(long, env = "PDFDISTILL_GS", default_value = "gs")]
    gs: PathBuf,

    /// Split/merge program.
    #[arg(long, env = "PDFDISTILL_QPDF", default_value = "qpdf")]
    qpdf: PathBuf,

    /// How the distiller hands back its output.
    #[arg(long, env = "PDFDISTILL_OUTPUT_MODE", value_enum, default_value = "stdout")]
    output_mode: OutputModeArg,

    /// Print a JSON summary of the job to stderr.
    #[arg(long)]
    json: bool,

    /// List presets and exit.
    #[arg(long)]
    list_presets: bool,

    /// Check that the tools are installed and exit.
    #[arg(long)]
    check: bool,

    /// Disable progress bar.
    #[arg(long, env = "PDFDISTILL_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "PDFDISTILL_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "PDFDISTILL_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum IntentArg {
    Perceptual,
    Relative,
    Saturation,
    Absolute,
}

impl From<IntentArg> for RenderIntent {
    fn from(v: IntentArg) -> Self {
        match v {
            IntentArg::Perceptual => RenderIntent::Perceptual,
            IntentArg::Relative => RenderIntent::RelativeColorimetric,
            IntentArg::Saturation => RenderIntent::Saturation,
            IntentArg::Absolute => RenderIntent::AbsoluteColorimetric,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum OutputModeArg {
    Stdout,
    File,
}

impl From<OutputModeArg> for OutputMode {
    fn from(v: OutputModeArg) -> Self {
        match v {
            OutputModeArg::Stdout => OutputMode::Stdout,
            OutputModeArg::File => OutputMode::File,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Library INFO logs are hidden while the progress bar is drawn.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.list_presets && !cli.check;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn DistillProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    let registry = build_registry(&cli, &config).await?;

    // ── List-presets mode ────────────────────────────────────────────────
    if cli.list_presets {
        for name in registry.names() {
            let preset = registry
                .resolve(Some(name))
                .with_context(|| format!("Preset '{name}' does not resolve"))?;
            println!(
                "{:<12} quality={:<9} scale={} page-count={} parallelism={}",
                bold(name),
                preset.quality.map(|q| q.as_str()).unwrap_or("none"),
                preset.resolution_multiplier,
                preset.report_page_count,
                preset.parallelism_hint,
            );
        }
        return Ok(());
    }

    let pipeline = Pipeline::new(config, registry);

    // ── Startup check ────────────────────────────────────────────────────
    let env = pipeline.validate().await.context("Environment check failed")?;
    if cli.check {
        println!("distiller  {}", env.distiller.display());
        println!("splitter   {}", env.splitter.display());
        println!("temp root  {}", env.temp_root.display());
        return Ok(());
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let input = cli
        .input
        .as_ref()
        .context("An input PDF is required")?;
    let request = build_request(&cli);
    let preset = pipeline
        .resolve(Some(&cli.preset), &request)
        .context("Invalid preset")?;

    // The pipeline deletes its input when done, so it works on a copy.
    let raw = pipeline.tracker().acquire(".pdf")?;
    tokio::fs::copy(input, raw.path())
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let mut document = RenderedDocument::new(raw, input.to_string_lossy());
    if let Some(ref title) = cli.title {
        document = document.with_title(title.clone());
    }

    let prepared = pipeline
        .prepare(PipelineJob::new(document, preset))
        .await
        .context("Distillation failed")?;

    if let Some(pages) = prepared.page_count() {
        if !cli.quiet {
            eprintln!("{} {} pages", dim("◆"), pages);
        }
    }

    let outcome = match cli.output {
        Some(ref path) => {
            let mut file = tokio::fs::File::create(path)
                .await
                .with_context(|| format!("Failed to create {}", path.display()))?;
            prepared.stream_to(&mut file).await
        }
        None => {
            let mut stdout = tokio::io::stdout();
            prepared.stream_to(&mut stdout).await
        }
    }
    .context("Failed to write output")?;

    if let Some(ref reason) = outcome.stream.disconnected {
        anyhow::bail!("Output closed early after {} bytes: {reason}", outcome.stream.bytes_written);
    }

    if cli.json {
        eprintln!(
            "{}",
            serde_json::to_string_pretty(&outcome).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {}  {}  →  {}",
            green("✔"),
            bold(&outcome.filename),
            dim(&format!("{} bytes", outcome.stream.bytes_written)),
            cli.output
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "stdout".to_string()),
        );
    }

    Ok(())
}

/// Map CLI args to `DistillConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<DistillConfig> {
    let mut builder = DistillConfig::builder()
        .distiller(Tool::new(&cli.gs))
        .splitter(Tool::new(&cli.qpdf))
        .timeout_secs(cli.timeout)
        .output_mode(cli.output_mode.into());

    if let Some(n) = cli.max_parallelism {
        builder = builder.max_parallelism(n);
    }
    if let Some(ref dir) = cli.temp_dir {
        builder = builder.temp_root(dir);
    }
    if let Some(ref dir) = cli.icc_dir {
        builder = builder.profile_root(dir);
    }
    if let Some(ref path) = cli.control_template {
        builder = builder.control_template(path);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Built-in presets, overlaid with `--presets` when given.
///
/// The profile root comes from the config once the pipeline is built, so
/// `--list-presets` resolves against it too.
async fn build_registry(cli: &Cli, config: &DistillConfig) -> Result<PresetRegistry> {
    let registry = match cli.presets {
        Some(ref path) => {
            let json = tokio::fs::read_to_string(path)
                .await
                .with_context(|| format!("Failed to read presets from {}", path.display()))?;
            PresetRegistry::from_json(&config.profile_root, &json).context("Invalid presets file")?
        }
        None => PresetRegistry::default(),
    };
    Ok(registry.with_profile_root(&config.profile_root))
}

/// Request-time preset values from the command line.
fn build_request(cli: &Cli) -> PresetSpec {
    PresetSpec {
        quality: cli.quality.as_deref().map(|q| match q {
            "none" | "false" | "off" => QualitySetting::off(),
            name => QualitySetting::named(name),
        }),
        icc: cli.icc.clone(),
        condition: cli.condition.clone(),
        intent: cli.intent.map(Into::into),
        parallelism: cli.parallelism,
        ..Default::default()
    }
}
