//! Preset registry: named bundles of distillation parameters.
//!
//! A [`PresetRegistry`] is assembled once at configuration time from the
//! built-in presets overlaid with static caller overrides, then shared
//! read-only (behind an `Arc`) by every job. Request-time values are layered
//! on top during [`PresetRegistry::resolve_with`], producing a fresh immutable
//! [`Preset`]; the registry itself is never mutated by request handling.
//!
//! ## Merge order
//!
//! ```text
//! built-in  <  static override  <  request-time values
//! ```
//!
//! Each layer is a [`PresetSpec`] whose `None` fields mean "not specified";
//! [`PresetSpec::overlay`] lets the higher layer win field by field.

use crate::error::DistillError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, warn};

/// Name of the preset used when the caller does not name one.
pub const DEFAULT_PRESET: &str = "default";

/// Default directory that ICC profile references must resolve into.
pub const DEFAULT_PROFILE_ROOT: &str = "/usr/share/color/icc";

// ── Enums ────────────────────────────────────────────────────────────────

/// Distiller quality tier, mapped to Ghostscript's `-dPDFSETTINGS`.
///
/// | Tier | Image resolution | Use case |
/// |------|------------------|----------|
/// | `screen`   | 72 dpi  | on-screen viewing, smallest output |
/// | `ebook`    | 150 dpi | e-readers |
/// | `printer`  | 300 dpi | desktop printing |
/// | `prepress` | 300 dpi | print shops, colour preserving |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Screen,
    Ebook,
    Printer,
    Prepress,
}

impl Quality {
    /// Parse one of the four known tier names.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "screen" => Some(Self::Screen),
            "ebook" => Some(Self::Ebook),
            "printer" => Some(Self::Printer),
            "prepress" => Some(Self::Prepress),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Screen => "screen",
            Self::Ebook => "ebook",
            Self::Printer => "printer",
            Self::Prepress => "prepress",
        }
    }

    /// Screen-oriented tiers keep annotations and skip colour conversion.
    pub fn is_for_screen(&self) -> bool {
        matches!(self, Self::Screen | Self::Ebook)
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Value of Ghostscript's `-sColorConversionStrategy`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColorStrategy {
    LeaveColorUnchanged,
    Gray,
    #[serde(rename = "RGB", alias = "rgb")]
    Rgb,
    #[serde(rename = "CMYK", alias = "cmyk")]
    Cmyk,
    UseDeviceIndependentColor,
}

impl ColorStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LeaveColorUnchanged => "LeaveColorUnchanged",
            Self::Gray => "Gray",
            Self::Rgb => "RGB",
            Self::Cmyk => "CMYK",
            Self::UseDeviceIndependentColor => "UseDeviceIndependentColor",
        }
    }
}

/// ICC rendering intent used when attaching an output profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RenderIntent {
    Perceptual,
    RelativeColorimetric,
    Saturation,
    #[default]
    AbsoluteColorimetric,
}

impl RenderIntent {
    /// Numeric code for `-dRenderIntent`.
    pub fn code(&self) -> u8 {
        match self {
            Self::Perceptual => 0,
            Self::RelativeColorimetric => 1,
            Self::Saturation => 2,
            Self::AbsoluteColorimetric => 3,
        }
    }

    /// Name written into the generated control file.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Perceptual => "Perceptual",
            Self::RelativeColorimetric => "RelativeColorimetric",
            Self::Saturation => "Saturation",
            Self::AbsoluteColorimetric => "AbsoluteColorimetric",
        }
    }
}

/// Raw quality value as written in configuration.
///
/// `false` disables distillation explicitly (so an override can switch off a
/// built-in tier); a string names a tier and is validated at resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QualitySetting {
    Flag(bool),
    Named(String),
}

impl QualitySetting {
    pub fn off() -> Self {
        Self::Flag(false)
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }
}

// ── Specs and resolved presets ───────────────────────────────────────────

/// One configuration layer for a preset. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PresetSpec {
    pub quality: Option<QualitySetting>,
    pub color_strategy: Option<ColorStrategy>,
    #[serde(alias = "scale")]
    pub resolution_multiplier: Option<u32>,
    #[serde(alias = "pageCount")]
    pub report_page_count: Option<bool>,
    pub parallelism: Option<usize>,
    pub icc: Option<String>,
    pub condition: Option<String>,
    pub intent: Option<RenderIntent>,
    #[serde(alias = "others")]
    pub extra_flags: Option<Vec<String>>,
}

impl PresetSpec {
    /// Return a new spec where every field set in `over` replaces `self`'s.
    pub fn overlay(&self, over: &PresetSpec) -> PresetSpec {
        PresetSpec {
            quality: over.quality.clone().or_else(|| self.quality.clone()),
            color_strategy: over.color_strategy.or(self.color_strategy),
            resolution_multiplier: over.resolution_multiplier.or(self.resolution_multiplier),
            report_page_count: over.report_page_count.or(self.report_page_count),
            parallelism: over.parallelism.or(self.parallelism),
            icc: over.icc.clone().or_else(|| self.icc.clone()),
            condition: over.condition.clone().or_else(|| self.condition.clone()),
            intent: over.intent.or(self.intent),
            extra_flags: over.extra_flags.clone().or_else(|| self.extra_flags.clone()),
        }
    }

    /// `true` when no field is set.
    pub fn is_empty(&self) -> bool {
        *self == PresetSpec::default()
    }
}

/// Fold layers lowest-priority first: `merge_layers(&[builtin, static, request])`.
pub fn merge_layers(layers: &[&PresetSpec]) -> PresetSpec {
    layers
        .iter()
        .fold(PresetSpec::default(), |acc, layer| acc.overlay(layer))
}

/// A fully resolved, validated preset. Immutable for the lifetime of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct Preset {
    pub name: String,
    /// `None` means pass-through: the rendered PDF is delivered untouched.
    pub quality: Option<Quality>,
    pub color_strategy: Option<ColorStrategy>,
    /// Rasterisation density for the upstream renderer (≥ 1).
    pub resolution_multiplier: u32,
    pub report_page_count: bool,
    /// Requested chunk parallelism (≥ 1); capped by the pipeline config.
    pub parallelism_hint: usize,
    /// Absolute path inside the profile root.
    pub icc_profile: Option<PathBuf>,
    pub condition: Option<String>,
    pub intent: RenderIntent,
    pub extra_flags: Vec<String>,
}

impl Preset {
    /// `true` when this preset re-encodes through the distiller.
    pub fn distills(&self) -> bool {
        self.quality.is_some()
    }

    /// Output condition for the control file; falls back to the profile name.
    pub fn output_condition(&self) -> String {
        if let Some(ref c) = self.condition {
            return c.clone();
        }
        self.icc_profile
            .as_deref()
            .and_then(Path::file_stem)
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

// ── Registry ─────────────────────────────────────────────────────────────

/// Name → preset layers. Built once, read-only afterwards.
///
/// The built-in and static layers are kept apart and only folded together,
/// with the request layer, by [`merge_layers`] at resolution time.
#[derive(Debug, Clone)]
pub struct PresetRegistry {
    builtin: BTreeMap<String, PresetSpec>,
    overrides: BTreeMap<String, PresetSpec>,
    profile_root: PathBuf,
}

impl Default for PresetRegistry {
    fn default() -> Self {
        Self::builtin(DEFAULT_PROFILE_ROOT)
    }
}

impl PresetRegistry {
    /// The built-in presets: `default`, `screen`, `ebook`, `printer`, `prepress`.
    pub fn builtin(profile_root: impl Into<PathBuf>) -> Self {
        let mut specs = BTreeMap::new();
        specs.insert(
            DEFAULT_PRESET.to_string(),
            PresetSpec {
                quality: Some(QualitySetting::off()),
                ..Default::default()
            },
        );
        specs.insert(
            "screen".to_string(),
            PresetSpec {
                quality: Some(QualitySetting::named("screen")),
                resolution_multiplier: Some(1),
                ..Default::default()
            },
        );
        specs.insert(
            "ebook".to_string(),
            PresetSpec {
                quality: Some(QualitySetting::named("ebook")),
                resolution_multiplier: Some(2),
                ..Default::default()
            },
        );
        specs.insert(
            "printer".to_string(),
            PresetSpec {
                quality: Some(QualitySetting::named("printer")),
                resolution_multiplier: Some(4),
                report_page_count: Some(true),
                color_strategy: Some(ColorStrategy::Cmyk),
                ..Default::default()
            },
        );
        specs.insert(
            "prepress".to_string(),
            PresetSpec {
                quality: Some(QualitySetting::named("prepress")),
                resolution_multiplier: Some(4),
                ..Default::default()
            },
        );
        Self {
            builtin: specs,
            overrides: BTreeMap::new(),
            profile_root: profile_root.into(),
        }
    }

    /// Add static overrides; new names become presets of their own.
    /// Repeated overrides for one name accumulate field by field.
    pub fn with_overrides(mut self, overrides: impl IntoIterator<Item = (String, PresetSpec)>) -> Self {
        for (name, spec) in overrides {
            let merged = match self.overrides.get(&name) {
                Some(earlier) => earlier.overlay(&spec),
                None => spec,
            };
            self.overrides.insert(name, merged);
        }
        self
    }

    /// The same presets, with ICC references validated against `root`.
    pub fn with_profile_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.profile_root = root.into();
        self
    }

    /// Built-ins overlaid with a JSON object of `name → PresetSpec`.
    pub fn from_json(profile_root: impl Into<PathBuf>, json: &str) -> Result<Self, DistillError> {
        let overrides: BTreeMap<String, PresetSpec> = serde_json::from_str(json)
            .map_err(|e| DistillError::InvalidConfig(format!("preset overrides: {e}")))?;
        Ok(Self::builtin(profile_root).with_overrides(overrides))
    }

    pub fn profile_root(&self) -> &Path {
        &self.profile_root
    }

    /// Registered preset names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.builtin
            .keys()
            .chain(self.overrides.keys())
            .map(String::as_str)
            .collect::<BTreeSet<_>>()
            .into_iter()
    }

    /// Resolve `name` with no request-time values.
    pub fn resolve(&self, name: Option<&str>) -> Result<Preset, DistillError> {
        self.resolve_with(name, &PresetSpec::default())
    }

    /// Resolve `name` and layer request-time values on top.
    ///
    /// Empty or missing names select [`DEFAULT_PRESET`]; any other name that
    /// is not registered is [`DistillError::UnknownPreset`]. ICC profile
    /// references are validated here, before any process is spawned.
    pub fn resolve_with(
        &self,
        name: Option<&str>,
        request: &PresetSpec,
    ) -> Result<Preset, DistillError> {
        let name = match name.map(str::trim) {
            None | Some("") => DEFAULT_PRESET,
            Some(n) => n,
        };
        let empty = PresetSpec::default();
        let spec = match (self.builtin.get(name), self.overrides.get(name)) {
            (None, None) => return Err(DistillError::UnknownPreset(name.to_string())),
            (builtin, overrides) => merge_layers(&[
                builtin.unwrap_or(&empty),
                overrides.unwrap_or(&empty),
                request,
            ]),
        };

        let quality = match spec.quality {
            None | Some(QualitySetting::Flag(false)) => None,
            Some(QualitySetting::Flag(true)) => {
                warn!(preset = name, "Unknown pdf preset quality: true; distillation disabled");
                None
            }
            Some(QualitySetting::Named(ref q)) => match Quality::parse(q) {
                Some(q) => Some(q),
                None => {
                    warn!(preset = name, quality = %q, "Unknown pdf preset quality; distillation disabled");
                    None
                }
            },
        };

        let icc_profile = match spec.icc.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(icc) => Some(validate_profile_path(&self.profile_root, icc)?),
        };

        let preset = Preset {
            name: name.to_string(),
            quality,
            color_strategy: spec.color_strategy,
            resolution_multiplier: spec.resolution_multiplier.unwrap_or(1).max(1),
            report_page_count: spec.report_page_count.unwrap_or(false),
            parallelism_hint: spec.parallelism.unwrap_or(1).max(1),
            icc_profile,
            condition: spec.condition,
            intent: spec.intent.unwrap_or_default(),
            extra_flags: spec
                .extra_flags
                .unwrap_or_default()
                .into_iter()
                .filter(|f| !f.is_empty())
                .collect(),
        };
        debug!(preset = %preset.name, quality = ?preset.quality, "Resolved preset");
        Ok(preset)
    }
}

// ── Profile-root guard ───────────────────────────────────────────────────

/// Resolve `requested` against `root` and reject anything outside it.
///
/// The check is lexical first (so `..` can never climb out, even for files
/// that do not exist yet) and repeated on canonical paths when both exist
/// (so a symlink inside the root cannot point outside it).
pub fn validate_profile_path(root: &Path, requested: &str) -> Result<PathBuf, DistillError> {
    let forbidden = || DistillError::ForbiddenProfilePath {
        requested: requested.to_string(),
        root: root.to_path_buf(),
    };

    let root_abs = std::path::absolute(root).map_err(|_| forbidden())?;
    let root_norm = normalize(&root_abs).ok_or_else(forbidden)?;
    let candidate = normalize(&root_norm.join(requested)).ok_or_else(forbidden)?;

    if candidate == root_norm || !candidate.starts_with(&root_norm) {
        return Err(forbidden());
    }

    if let (Ok(real_root), Ok(real_candidate)) =
        (root_norm.canonicalize(), candidate.canonicalize())
    {
        if !real_candidate.starts_with(&real_root) {
            return Err(forbidden());
        }
        return Ok(real_candidate);
    }

    Ok(candidate)
}

/// Lexically resolve `.` and `..`; `None` if `..` climbs past the root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() || out.as_os_str().is_empty() {
                    return None;
                }
            }
            Component::Normal(part) => out.push(part),
        }
    }
    Some(out)
}
