//! Subprocess lifecycle: spawn, stream, timeout, abort, reap.
//!
//! The environment passed in is the complete subprocess environment; nothing
//! from the engine's own environment leaks through. Both output streams are
//! piped through the run's redactor before touching disk. On timeout or
//! cancellation the whole process tree is killed; cancellation wins when both
//! fire together.

use crate::errors::{EngineError, ErrorKind};
use crate::events::{EventKind, EventWriter};
use crate::redact::Redactor;
use crate::status::RunStatus;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ProcessSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: BTreeMap<String, String>,
    pub working_dir: PathBuf,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessOutcome {
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    pub aborted: bool,
}

impl ProcessOutcome {
    /// Exit-code convention: 0 passed, 1 failed, anything else is a script
    /// error. Timeout and abort take precedence over the exit code.
    pub fn status(&self) -> RunStatus {
        if self.aborted {
            RunStatus::Aborted
        } else if self.timed_out {
            RunStatus::Timeout
        } else {
            match self.exit_code {
                Some(0) => RunStatus::Passed,
                Some(1) => RunStatus::Failed,
                _ => RunStatus::Error,
            }
        }
    }
}

enum WaitOutcome {
    Exited(Option<i32>),
    TimedOut,
    Cancelled,
}

/// Run the subprocess to completion, streaming redacted output to
/// `stdout_path` / `stderr_path`. A spawn failure is returned as an error;
/// everything after a successful spawn is reported through the outcome.
pub async fn run(
    spec: &ProcessSpec,
    stdout_path: &Path,
    stderr_path: &Path,
    redactor: &Redactor,
    cancel: &CancellationToken,
    events: &mut EventWriter,
) -> Result<ProcessOutcome, EngineError> {
    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .env_clear()
        .envs(&spec.env)
        .current_dir(&spec.working_dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| {
        EngineError::new(
            ErrorKind::Io,
            format!("failed to launch '{}': {e}", spec.program.display()),
        )
    })?;
    let pid = child.id();
    debug!(program = %spec.program.display(), ?pid, "process spawned");
    events.emit(EventKind::ProcessSpawned { pid })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();
    let out_task = tokio::spawn(copy_redacted(
        stdout,
        stdout_path.to_path_buf(),
        redactor.clone(),
    ));
    let err_task = tokio::spawn(copy_redacted(
        stderr,
        stderr_path.to_path_buf(),
        redactor.clone(),
    ));

    let wait = {
        let timeout = async {
            match spec.timeout {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending().await,
            }
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => WaitOutcome::Cancelled,
            _ = timeout => {
                // Cancellation takes precedence if both fired together.
                if cancel.is_cancelled() {
                    WaitOutcome::Cancelled
                } else {
                    WaitOutcome::TimedOut
                }
            }
            status = child.wait() => {
                WaitOutcome::Exited(status.ok().and_then(|s| s.code()))
            }
        }
    };

    let mut outcome = ProcessOutcome::default();
    match wait {
        WaitOutcome::Exited(code) => {
            outcome.exit_code = code;
            if let Some(code) = code {
                events.emit(EventKind::ProcessExited { exit_code: code })?;
            }
        }
        WaitOutcome::TimedOut => {
            kill_tree(&mut child, pid).await;
            outcome.timed_out = true;
            events.emit(EventKind::ProcessTimeout {
                timeout_sec: spec.timeout.map(|d| d.as_secs()).unwrap_or(0),
            })?;
        }
        WaitOutcome::Cancelled => {
            kill_tree(&mut child, pid).await;
            outcome.aborted = true;
            events.emit(EventKind::ProcessAborted)?;
        }
    }

    // Drain the stream tasks; they finish once the pipes close.
    for task in [out_task, err_task] {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "output stream closed with error"),
            Err(e) => warn!(error = %e, "output stream task panicked"),
        }
    }

    Ok(outcome)
}

/// Kill the whole process tree. On unix the child is its own process group
/// leader, so a signal to the group takes descendants with it.
async fn kill_tree(child: &mut Child, pid: Option<u32>) {
    #[cfg(unix)]
    if let Some(pid) = pid {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            warn!(pid, error = %e, "killpg failed, falling back to direct kill");
        }
    }
    #[cfg(not(unix))]
    let _ = pid;
    if let Err(e) = child.kill().await {
        warn!(error = %e, "kill failed (process may already be gone)");
    }
    let _ = child.wait().await;
}

async fn copy_redacted(
    stream: Option<impl tokio::io::AsyncRead + Unpin>,
    path: PathBuf,
    redactor: Redactor,
) -> std::io::Result<()> {
    // Append so a resumed phase continues the same log.
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .await?;
    let Some(stream) = stream else {
        return Ok(());
    };
    let mut reader = BufReader::new(stream);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        let n = reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        file.write_all(redactor.redact_text(&line).as_bytes())
            .await?;
    }
    file.flush().await?;
    Ok(())
}
