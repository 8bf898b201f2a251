//! Subprocess session with fds2ascii.
//!
//! The tool resolves its output file name against its current directory, so
//! every session is started with the results folder as working directory.

use crate::error::SessionError;
use crate::model::{BatchConfig, PromptScript};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// Lines of stdout kept in failure diagnostics.
const STDOUT_TAIL_LINES: usize = 80;

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    Success,
    /// Non-zero exit; `None` when the process was terminated by a signal.
    Failed(Option<i32>),
    TimedOut(Duration),
}

#[derive(Debug, Clone)]
pub struct SessionOutput {
    pub exit: SessionExit,
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

impl SessionOutput {
    /// Tail of stdout plus all of stderr, for operator inspection.
    pub fn diagnostics(&self) -> String {
        let lines: Vec<&str> = self.stdout.lines().collect();
        let tail = &lines[lines.len().saturating_sub(STDOUT_TAIL_LINES)..];
        format!(
            "=== fds2ascii stdout (tail) ===\n{}\n=== fds2ascii stderr ===\n{}",
            tail.join("\n"),
            self.stderr.trim_end()
        )
    }
}

/// Runs one prompt script against the export tool and waits for it to exit.
#[allow(async_fn_in_trait)]
pub trait SessionRunner {
    async fn run(&self, script: &PromptScript) -> Result<SessionOutput, SessionError>;
}

/// Real fds2ascii child process.
#[derive(Debug, Clone)]
pub struct ProcessSession {
    executable: PathBuf,
    working_dir: PathBuf,
    timeout: Option<Duration>,
}

impl ProcessSession {
    pub fn new(cfg: &BatchConfig) -> Self {
        Self {
            executable: cfg.executable.clone(),
            working_dir: cfg.results_dir.clone(),
            timeout: cfg.timeout,
        }
    }
}

impl SessionRunner for ProcessSession {
    async fn run(&self, script: &PromptScript) -> Result<SessionOutput, SessionError> {
        if !is_runnable(&self.executable) {
            return Err(SessionError::ExecutableNotFound(self.executable.clone()));
        }

        let started = Instant::now();
        let mut cmd = Command::new(&self.executable);
        cmd.current_dir(&self.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // Dropping the wait future on timeout must not leave the tool running.
            .kill_on_drop(true);
        // Own process group: a terminal Ctrl-C reaches only the driver, which
        // lets the export in flight finish before stopping.
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd.spawn().map_err(|source| SessionError::LaunchFailure {
            path: self.executable.clone(),
            source,
        })?;

        // Feed stdin from its own task so a chatty tool can't stall on a full stdout pipe.
        let writer = child.stdin.take().map(|mut stdin| {
            let bytes = script.to_stdin_bytes();
            tokio::spawn(async move {
                stdin.write_all(&bytes).await?;
                stdin.shutdown().await
            })
        });

        let waited = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .ok(),
            None => Some(child.wait_with_output().await),
        };

        if let Some(handle) = writer {
            match handle.await {
                Ok(Ok(())) => {}
                // The tool may stop reading early, e.g. when the CHID is wrong.
                Ok(Err(e)) => debug!(error = %e, "stdin closed before the full script was written"),
                Err(e) => warn!(error = %e, "stdin writer task failed"),
            }
        }

        let elapsed = started.elapsed();
        let output = match waited {
            Some(res) => res.map_err(SessionError::Wait)?,
            None => {
                let limit = self.timeout.unwrap_or_default();
                warn!(timeout = ?limit, "fds2ascii timed out, killed");
                return Ok(SessionOutput {
                    exit: SessionExit::TimedOut(limit),
                    stdout: String::new(),
                    stderr: format!("killed after {}", humantime::format_duration(limit)),
                    elapsed,
                });
            }
        };

        let exit = if output.status.success() {
            SessionExit::Success
        } else {
            SessionExit::Failed(output.status.code())
        };
        debug!(?exit, elapsed_ms = elapsed.as_millis() as u64, "fds2ascii exited");

        Ok(SessionOutput {
            exit,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            elapsed,
        })
    }
}

/// True when `path` names a file we can execute (not a directory).
pub fn is_runnable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}
