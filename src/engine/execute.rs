//! Out-of-process execution of validated snippets.
//!
//! The snippet is written to a uniquely named transient file, run with the
//! configured interpreter, and the file is removed when the run ends,
//! whatever the outcome. Every failure comes back as an `ExecutionResult`;
//! nothing here returns an error to the caller.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;

use crate::engine::{ExecutionOutcome, ExecutionResult};
use crate::metrics::MemoryTracker;

/// Error text reported when a run exceeds its timeout.
pub const TIMEOUT_MESSAGE: &str = "timed out";

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    /// Interpreter binary, e.g. `python3`
    pub interpreter: String,

    /// Default time allowed per run
    pub timeout: Duration,

    /// Where transient scripts are created. `None` means the system temp dir.
    pub scratch_dir: Option<PathBuf>,

    /// Polling interval for peak RSS sampling
    pub memory_sample: Duration,
}

impl Default for ExecutorSettings {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            timeout: Duration::from_secs(5),
            scratch_dir: None,
            memory_sample: Duration::from_millis(20),
        }
    }
}

/// A script file that exists exactly as long as this value does.
pub struct TransientScript {
    file: NamedTempFile,
}

impl TransientScript {
    pub fn create(dir: Option<&Path>, code: &str) -> Result<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("devagent-").suffix(".py");

        let mut file = match dir {
            Some(d) => builder.tempfile_in(d),
            None => builder.tempfile(),
        }
        .context("Failed to create transient script")?;

        file.write_all(code.as_bytes())
            .context("Failed to write transient script")?;
        file.flush().context("Failed to flush transient script")?;

        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

#[derive(Debug, Clone)]
pub struct Executor {
    settings: ExecutorSettings,
}

impl Executor {
    pub fn new(settings: ExecutorSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &ExecutorSettings {
        &self.settings
    }

    pub async fn execute(&self, code: &str) -> ExecutionResult {
        self.execute_with_timeout(code, self.settings.timeout).await
    }

    pub async fn execute_with_timeout(&self, code: &str, timeout: Duration) -> ExecutionResult {
        let script = match TransientScript::create(self.settings.scratch_dir.as_deref(), code) {
            Ok(s) => s,
            Err(e) => {
                let message = format!("{:#}", e);
                tracing::warn!(error = %message, "could not prepare transient script");
                return ExecutionResult::launch_failed(message);
            }
        };

        tracing::debug!(script = %script.path().display(), ?timeout, "running snippet");
        let result = self.run_script(script.path(), timeout).await;

        // removes the file
        drop(script);

        result
    }

    async fn run_script(&self, path: &Path, timeout: Duration) -> ExecutionResult {
        let mut cmd = Command::new(&self.settings.interpreter);
        cmd.arg(path)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        // own group, so processes the snippet starts can be killed with it
        #[cfg(unix)]
        cmd.process_group(0);

        let start = Instant::now();
        let mut child = match cmd.spawn() {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(interpreter = %self.settings.interpreter, error = %e, "spawn failed");
                return ExecutionResult::launch_failed(format!(
                    "Failed to spawn {}: {}",
                    self.settings.interpreter, e
                ));
            }
        };

        let pid = child.id();
        let mem = pid.map(|pid| MemoryTracker::start(pid, self.settings.memory_sample));
        let mut stdout = child.stdout.take().map(|s| tokio::spawn(read_pipe(s)));
        let mut stderr = child.stderr.take().map(|s| tokio::spawn(read_pipe(s)));

        // One deadline covers the exit and both pipes. A descendant that
        // inherits the pipes cannot hold the run open past it.
        let waited = tokio::time::timeout(timeout, async {
            let status = child.wait().await?;
            let output = collect(&mut stdout).await;
            let error = collect(&mut stderr).await;
            Ok::<_, std::io::Error>((status, output, error))
        })
        .await;

        match waited {
            Ok(Ok((status, output, error))) => {
                kill_group(pid);
                let duration_ms = start.elapsed().as_millis();
                let max_rss_kb = mem.and_then(MemoryTracker::stop_and_take);
                let succeeded = status.success();

                tracing::info!(
                    exit_code = ?status.code(),
                    duration_ms,
                    "snippet finished"
                );

                ExecutionResult {
                    succeeded,
                    output,
                    error,
                    outcome: if succeeded {
                        ExecutionOutcome::Completed
                    } else {
                        ExecutionOutcome::Crashed
                    },
                    exit_code: status.code(),
                    duration_ms,
                    max_rss_kb,
                }
            }

            Ok(Err(e)) => {
                kill_group(pid);
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill snippet after wait error");
                }
                abort(stdout);
                abort(stderr);
                let _ = mem.and_then(MemoryTracker::stop_and_take);

                ExecutionResult::launch_failed(format!("Failed while waiting for snippet: {}", e))
            }

            Err(_) => {
                kill_group(pid);
                if let Err(e) = child.kill().await {
                    tracing::warn!(error = %e, "failed to kill timed out snippet");
                }
                abort(stdout);
                abort(stderr);
                let max_rss_kb = mem.and_then(MemoryTracker::stop_and_take);
                let duration_ms = start.elapsed().as_millis();

                tracing::warn!(?timeout, "snippet timed out");

                ExecutionResult {
                    succeeded: false,
                    output: String::new(),
                    error: TIMEOUT_MESSAGE.to_string(),
                    outcome: ExecutionOutcome::TimedOut,
                    exit_code: None,
                    duration_ms,
                    max_rss_kb,
                }
            }
        }
    }
}

/// SIGKILL every process left in the snippet's group.
///
/// The group id equals the interpreter's pid. ESRCH (group already empty)
/// is the normal case after a clean exit.
#[cfg(unix)]
fn kill_group(pid: Option<u32>) {
    let Some(pid) = pid else { return };
    let Ok(pgid) = libc::pid_t::try_from(pid) else {
        return;
    };

    // SAFETY: killpg takes plain integers and touches no memory.
    let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if rc != 0 {
        let err = std::io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            tracing::warn!(pgid, error = %err, "failed to kill snippet process group");
        }
    } else {
        tracing::debug!(pgid, "killed snippet process group");
    }
}

#[cfg(not(unix))]
fn kill_group(_pid: Option<u32>) {}

async fn read_pipe<R: AsyncRead + Unpin>(mut pipe: R) -> Vec<u8> {
    let mut buf = Vec::new();
    let _ = pipe.read_to_end(&mut buf).await;
    buf
}

async fn collect(handle: &mut Option<JoinHandle<Vec<u8>>>) -> String {
    match handle.as_mut() {
        Some(h) => h
            .await
            .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
            .unwrap_or_default(),
        None => String::new(),
    }
}

fn abort(handle: Option<JoinHandle<Vec<u8>>>) {
    if let Some(h) = handle {
        h.abort();
    }
}
