//! Page-count query through the distiller.

use super::args;
use super::process::{self, Stdout};
use crate::config::DistillConfig;
use crate::error::DistillError;
use std::path::Path;
use tracing::debug;

/// Number of pages in the PDF at `input`.
///
/// Stdout must be exactly one integer once trimmed; anything else is
/// [`DistillError::PageCountUnparseable`].
pub async fn page_count(input: &Path, config: &DistillConfig) -> Result<u32, DistillError> {
    let argv = args::page_count_args(input);
    let finished =
        process::run(&config.distiller, &argv, Stdout::Capture, config.timeout_secs).await?;

    if !finished.exited_ok(&[]) {
        return Err(DistillError::EngineFailure {
            tool: config.distiller.display_name(),
            detail: finished.status_detail(),
            diagnostics: finished.stderr,
        });
    }

    let stdout = String::from_utf8_lossy(&finished.stdout);
    let count = parse_page_count(&stdout)?;
    debug!(pages = count, "Counted pages in {}", input.display());
    Ok(count)
}

/// Parse the query's stdout.
pub fn parse_page_count(stdout: &str) -> Result<u32, DistillError> {
    stdout
        .trim()
        .parse::<u32>()
        .map_err(|_| DistillError::PageCountUnparseable {
            output: stdout.trim().chars().take(200).collect(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_trimmed_integer() {
        assert_eq!(parse_page_count("12\n").unwrap(), 12);
        assert_eq!(parse_page_count("  0 ").unwrap(), 0);
    }

    #[test]
    fn rejects_noise() {
        for bad in ["", "twelve", "12 pages", "-1", "Error: /undefined in runpdfbegin"] {
            let err = parse_page_count(bad).unwrap_err();
            assert!(
                matches!(err, DistillError::PageCountUnparseable { .. }),
                "{bad:?}"
            );
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn queries_the_distiller() {
        use crate::config::Tool;
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("gs.sh");
        std::fs::write(
            &script,
            "for a in \"$@\"; do case \"$a\" in -sFileName=*) f=\"${a#-sFileName=}\";; esac; done\nwc -l < \"$f\" | tr -d ' '\n",
        )
        .unwrap();
        let input = dir.path().join("doc.pdf");
        std::fs::write(&input, "page 1\npage 2\npage 3\n").unwrap();

        let config = DistillConfig::builder()
            .distiller(Tool::new("/bin/sh").with_prefix_args([script]))
            .build()
            .unwrap();
        assert_eq!(page_count(&input, &config).await.unwrap(), 3);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failing_query_is_engine_failure() {
        use crate::config::Tool;
        let config = DistillConfig::builder()
            .distiller(Tool::new("/bin/sh").with_prefix_args(["-c", "echo broken >&2; exit 1", "gs"]))
            .build()
            .unwrap();
        let err = page_count(Path::new("/x.pdf"), &config).await.unwrap_err();
        assert!(matches!(err, DistillError::EngineFailure { .. }), "{err:?}");
    }
}
