//! One bounded external invocation.
//!
//! Spawns a [`Tool`] with `kill_on_drop`, drains stderr into a diagnostics
//! buffer while stdout is routed to the requested [`Stdout`] target, and
//! enforces the wall-clock limit: on expiry the child is killed and reaped
//! before [`DistillError::EngineTimeout`] is returned.
//!
//! This module reports what happened and nothing more. Whether an exit
//! status counts as success is decided by the caller.

use crate::config::Tool;
use crate::error::DistillError;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::time::{timeout, Duration};
use tracing::{debug, warn};

/// Where the child's stdout goes.
#[derive(Debug, Clone, Copy)]
pub enum Stdout<'a> {
    /// Not connected.
    Discard,
    /// Collected into [`Finished::stdout`].
    Capture,
    /// Copied into this file, which is truncated first.
    File(&'a Path),
}

/// A process that ran to completion within the time limit.
#[derive(Debug)]
pub struct Finished {
    pub status: ExitStatus,
    /// Captured stdout, empty unless [`Stdout::Capture`] was requested.
    pub stdout: Vec<u8>,
    /// Everything written to stderr, lossily decoded.
    pub stderr: String,
    /// Set when copying stdout to its target failed part-way.
    pub stdout_error: Option<std::io::Error>,
}

impl Finished {
    /// `true` for exit status 0 or any of `also_ok`.
    pub fn exited_ok(&self, also_ok: &[i32]) -> bool {
        self.status.success()
            || self
                .status
                .code()
                .map(|c| also_ok.contains(&c))
                .unwrap_or(false)
    }

    /// Short human description of the exit status.
    pub fn status_detail(&self) -> String {
        match self.status.code() {
            Some(code) => format!("exit status {code}"),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Run `tool args…` to completion or until `timeout_secs` elapse.
pub async fn run(
    tool: &Tool,
    args: &[String],
    stdout: Stdout<'_>,
    timeout_secs: u64,
) -> Result<Finished, DistillError> {
    let name = tool.display_name();
    debug!(tool = %name, args = %args.join(" "), "Spawning");

    let mut command = Command::new(&tool.program);
    command
        .args(&tool.prefix_args)
        .args(args)
        .stdin(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    match stdout {
        Stdout::Discard => command.stdout(Stdio::null()),
        Stdout::Capture | Stdout::File(_) => command.stdout(Stdio::piped()),
    };

    let mut child = command.spawn().map_err(|e| DistillError::EngineUnavailable {
        tool: name.clone(),
        reason: e.to_string(),
    })?;

    let stderr_pipe = child.stderr.take();
    let stdout_pipe = child.stdout.take();

    let result = timeout(Duration::from_secs(timeout_secs), async {
        let (stderr, (captured, stdout_error)) = tokio::join!(
            read_all(stderr_pipe),
            route_stdout(stdout_pipe, stdout)
        );
        let status = child.wait().await?;
        Ok::<_, std::io::Error>(Finished {
            status,
            stdout: captured,
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            stdout_error,
        })
    })
    .await;

    match result {
        Ok(Ok(finished)) => {
            debug!(tool = %name, status = %finished.status, "Process exited");
            Ok(finished)
        }
        Ok(Err(e)) => Err(DistillError::io(format!("waiting for {name}"), e)),
        Err(_) => {
            warn!(tool = %name, secs = timeout_secs, "Process timed out; killing");
            let _ = child.kill().await;
            Err(DistillError::EngineTimeout {
                tool: name,
                secs: timeout_secs,
            })
        }
    }
}

async fn read_all<R: AsyncRead + Unpin>(pipe: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut pipe) = pipe {
        if let Err(e) = pipe.read_to_end(&mut buf).await {
            debug!(error = %e, "stderr read ended early");
        }
    }
    buf
}

/// Copy stdout to its target. After a failed copy the pipe is still drained
/// so the child never blocks on a full pipe.
async fn route_stdout<R: AsyncRead + Unpin>(
    pipe: Option<R>,
    target: Stdout<'_>,
) -> (Vec<u8>, Option<std::io::Error>) {
    let Some(mut pipe) = pipe else {
        return (Vec::new(), None);
    };
    match target {
        Stdout::Discard => (Vec::new(), None),
        Stdout::Capture => {
            let mut buf = Vec::new();
            let err = pipe.read_to_end(&mut buf).await.err();
            (buf, err)
        }
        Stdout::File(path) => {
            let copied = async {
                let mut file = tokio::fs::File::create(path).await?;
                tokio::io::copy(&mut pipe, &mut file).await?;
                tokio::io::AsyncWriteExt::flush(&mut file).await
            }
            .await;
            match copied {
                Ok(()) => (Vec::new(), None),
                Err(e) => {
                    let _ = tokio::io::copy(&mut pipe, &mut tokio::io::sink()).await;
                    (Vec::new(), Some(e))
                }
            }
        }
    }
}
