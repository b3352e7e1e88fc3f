//! Distiller argument construction, one function per concern.
//!
//! The full argument list is assembled in a fixed order by
//! [`distill_args`]; each concern (quality, colour, profile, metadata) has
//! its own constructor so it can be tested alone. Every string that lands
//! inside PostScript source, whether on the command line (`-c …`) or in the
//! generated control file, passes through [`escape_ps_string`].

use crate::config::OutputMode;
use crate::preset::{Preset, Quality};
use std::path::Path;

/// Escape `s` for use inside a PostScript `( … )` string literal.
///
/// Backslash is escaped first so later escapes are not doubled; parentheses
/// cannot terminate the literal; `/` is escaped so the text can never be
/// read as a name token; line breaks become their escape sequences.
pub fn escape_ps_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 8);
    for ch in s.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '(' => out.push_str("\\("),
            ')' => out.push_str("\\)"),
            '/' => out.push_str("\\/"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Fixed flags: quiet, batch, unsafe file access, thread hint.
pub fn base_args(rendering_threads: usize) -> Vec<String> {
    vec![
        "-q".to_string(),
        // PostScript errors go to stderr so stdout stays a clean PDF stream.
        "-sstdout=%stderr".to_string(),
        "-dBATCH".to_string(),
        "-dNOPAUSE".to_string(),
        "-dNOSAFER".to_string(),
        format!("-dNumRenderingThreads={}", rendering_threads.max(1)),
        "-dDetectDuplicateImages=false".to_string(),
    ]
}

/// Quality tier and annotation handling.
pub fn quality_args(quality: Quality) -> Vec<String> {
    vec![
        format!("-dPreserveAnnots={}", quality.is_for_screen()),
        format!("-dPDFSETTINGS=/{}", quality.as_str()),
        "-sDEVICE=pdfwrite".to_string(),
    ]
}

/// `-sOutputFile` for the chosen output channel.
pub fn output_args(mode: OutputMode, output: &Path) -> Vec<String> {
    match mode {
        OutputMode::Stdout => vec!["-sOutputFile=-".to_string()],
        OutputMode::File => vec![format!("-sOutputFile={}", output.display())],
    }
}

/// Colour conversion for print-oriented tiers.
///
/// Omitted for screen tiers and when a profile is attached (the profile
/// block forces CMYK itself).
pub fn color_args(preset: &Preset) -> Vec<String> {
    match (preset.quality, preset.color_strategy) {
        (Some(q), Some(strategy)) if !q.is_for_screen() && preset.icc_profile.is_none() => {
            vec![format!("-sColorConversionStrategy={}", strategy.as_str())]
        }
        _ => Vec::new(),
    }
}

/// Caller-supplied passthrough flags, in order, empties dropped.
pub fn extra_args(preset: &Preset) -> Vec<String> {
    preset
        .extra_flags
        .iter()
        .filter(|f| !f.is_empty())
        .cloned()
        .collect()
}

/// PDF/X output-intent block referencing the generated control file.
pub fn profile_args(preset: &Preset, control_file: &Path) -> Vec<String> {
    vec![
        "-dPDFX=true".to_string(),
        format!("-dRenderIntent={}", preset.intent.code()),
        "-sColorConversionStrategy=CMYK".to_string(),
        control_file.display().to_string(),
    ]
}

/// Stamp the document title into the output's info dictionary.
pub fn metadata_args(title: &str) -> Vec<String> {
    vec![
        "-c".to_string(),
        format!("[ /Title ({}) /DOCINFO pdfmark", escape_ps_string(title)),
        "-f".to_string(),
    ]
}

/// The complete distiller argument list, deterministic for its inputs.
///
/// Callers must only pass presets with a quality tier set.
pub fn distill_args(
    preset: &Preset,
    quality: Quality,
    title: &str,
    input: &Path,
    output: &Path,
    mode: OutputMode,
    rendering_threads: usize,
    control_file: Option<&Path>,
) -> Vec<String> {
    let mut args = base_args(rendering_threads);
    args.extend(quality_args(quality));
    args.extend(output_args(mode, output));
    args.extend(color_args(preset));
    args.extend(extra_args(preset));
    if let Some(control) = control_file {
        args.extend(profile_args(preset, control));
    }
    args.extend(metadata_args(title));
    args.push(input.display().to_string());
    args
}

/// Arguments for the page-count query.
pub fn page_count_args(input: &Path) -> Vec<String> {
    vec![
        "-dQUIET".to_string(),
        "-dNODISPLAY".to_string(),
        "-dNOSAFER".to_string(),
        "-dBATCH".to_string(),
        format!("-sFileName={}", input.display()),
        "-c".to_string(),
        "FileName (r) file runpdfbegin 1 1 pdfpagecount = quit".to_string(),
    ]
}

/// Splitter arguments extracting pages `first..=last` of `input` into `output`.
pub fn split_args(input: &Path, first: u32, last: u32, output: &Path) -> Vec<String> {
    vec![
        "--empty".to_string(),
        "--pages".to_string(),
        input.display().to_string(),
        format!("{first}-{last}"),
        "--".to_string(),
        output.display().to_string(),
    ]
}

/// Splitter arguments concatenating `parts` in order into `output`.
///
/// The first part is also the primary input so its document-level metadata
/// (title, output intents) carries over into the merged file.
pub fn merge_args(parts: &[&Path], output: &Path) -> Vec<String> {
    let mut args = Vec::with_capacity(parts.len() * 2 + 4);
    if let Some(first) = parts.first() {
        args.push(first.display().to_string());
    }
    args.push("--pages".to_string());
    for part in parts {
        args.push(part.display().to_string());
        args.push("1-z".to_string());
    }
    args.push("--".to_string());
    args.push(output.display().to_string());
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::preset::{ColorStrategy, PresetRegistry, PresetSpec};
    use std::path::PathBuf;

    fn preset(name: &str) -> Preset {
        PresetRegistry::builtin("/icc").resolve(Some(name)).unwrap()
    }

    #[test]
    fn escape_parens_slash_and_backslash() {
        assert_eq!(escape_ps_string("a(b)c/d"), "a\\(b\\)c\\/d");
        assert_eq!(escape_ps_string("x\\"), "x\\\\");
        // A trailing backslash must not be able to swallow the closing paren.
        assert_eq!(escape_ps_string("\\)"), "\\\\\\)");
        assert_eq!(escape_ps_string("l1\nl2"), "l1\\nl2");
        assert_eq!(escape_ps_string("plain"), "plain");
    }

    #[test]
    fn injection_attempt_stays_inside_literal() {
        let title = ") /DOCINFO pdfmark (evil";
        let args = metadata_args(title);
        assert_eq!(
            args[1],
            "[ /Title (\\) \\/DOCINFO pdfmark \\(evil) /DOCINFO pdfmark"
        );
    }

    #[test]
    fn screen_tier_preserves_annots_and_skips_color() {
        let p = preset("screen");
        assert_eq!(
            quality_args(Quality::Screen),
            vec!["-dPreserveAnnots=true", "-dPDFSETTINGS=/screen", "-sDEVICE=pdfwrite"]
        );
        let mut with_color = p.clone();
        with_color.color_strategy = Some(ColorStrategy::Cmyk);
        assert!(color_args(&with_color).is_empty());
    }

    #[test]
    fn print_tier_emits_color_strategy() {
        let p = preset("printer");
        assert_eq!(color_args(&p), vec!["-sColorConversionStrategy=CMYK"]);
        assert_eq!(quality_args(Quality::Printer)[0], "-dPreserveAnnots=false");
    }

    #[test]
    fn full_argument_order_without_profile() {
        let p = preset("prepress");
        let args = distill_args(
            &p,
            Quality::Prepress,
            "My (Doc)",
            Path::new("/tmp/in.pdf"),
            Path::new("/tmp/out.pdf"),
            OutputMode::Stdout,
            3,
            None,
        );
        assert_eq!(
            args,
            vec![
                "-q",
                "-sstdout=%stderr",
                "-dBATCH",
                "-dNOPAUSE",
                "-dNOSAFER",
                "-dNumRenderingThreads=3",
                "-dDetectDuplicateImages=false",
                "-dPreserveAnnots=false",
                "-dPDFSETTINGS=/prepress",
                "-sDEVICE=pdfwrite",
                "-sOutputFile=-",
                "-c",
                "[ /Title (My \\(Doc\\)) /DOCINFO pdfmark",
                "-f",
                "/tmp/in.pdf",
            ]
        );
    }

    #[test]
    fn profile_block_precedes_title_and_replaces_color_flag() {
        let reg = PresetRegistry::builtin("/icc");
        let request = PresetSpec {
            icc: Some("coated.icc".into()),
            extra_flags: Some(vec!["-dFoo".into(), String::new()]),
            ..Default::default()
        };
        let p = reg.resolve_with(Some("printer"), &request).unwrap();
        let control = PathBuf::from("/tmp/pdfx.ps");
        let args = distill_args(
            &p,
            Quality::Printer,
            "t",
            Path::new("/in.pdf"),
            Path::new("/out.pdf"),
            OutputMode::File,
            1,
            Some(&control),
        );
        let strategy_count = args
            .iter()
            .filter(|a| a.starts_with("-sColorConversionStrategy"))
            .count();
        assert_eq!(strategy_count, 1);
        assert!(args.contains(&"-sOutputFile=/out.pdf".to_string()));
        let foo = args.iter().position(|a| a == "-dFoo").unwrap();
        let pdfx = args.iter().position(|a| a == "-dPDFX=true").unwrap();
        let ctl = args.iter().position(|a| a == "/tmp/pdfx.ps").unwrap();
        let c = args.iter().position(|a| a == "-c").unwrap();
        assert!(foo < pdfx && pdfx < ctl && ctl < c);
        assert!(args.contains(&"-dRenderIntent=3".to_string()));
        assert!(!args.iter().any(String::is_empty));
        assert_eq!(args.last().unwrap(), "/in.pdf");
    }

    #[test]
    fn split_and_merge_args() {
        assert_eq!(
            split_args(Path::new("/in.pdf"), 3, 4, Path::new("/c1.pdf")),
            vec!["--empty", "--pages", "/in.pdf", "3-4", "--", "/c1.pdf"]
        );
        let a = Path::new("/a.pdf");
        let b = Path::new("/b.pdf");
        assert_eq!(
            merge_args(&[a, b], Path::new("/out.pdf")),
            vec!["/a.pdf", "--pages", "/a.pdf", "1-z", "/b.pdf", "1-z", "--", "/out.pdf"]
        );
    }

    #[test]
    fn page_count_args_name_the_file() {
        let args = page_count_args(Path::new("/x.pdf"));
        assert!(args.contains(&"-dNODISPLAY".to_string()));
        assert!(args.contains(&"-sFileName=/x.pdf".to_string()));
    }
}
