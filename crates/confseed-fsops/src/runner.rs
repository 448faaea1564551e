//! Supervised execution of external commands.
//!
//! # Design
//! - stdout and stderr are drained concurrently, line by line, until both close; lines are logged
//!   at debug (stdout) or error (stderr) with the child pid attached.
//! - Draining finishes before the exit status is reported, so no buffered output is lost.
//! - A positive timeout kills the child and surfaces [`RunFailure::Timeout`], distinct from
//!   [`RunFailure::Exit`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader, Lines};
use tokio::process::{ChildStderr, ChildStdout, Command};
use tracing::{debug, error, warn};

use crate::context::EnvMap;
use crate::error::{FsOpsError, FsOpsResult, RunFailure};

/// Default command timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Command description before templating.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommandSpec {
    /// Argument words; joined with spaces and rendered as one template.
    pub args: Vec<String>,
    /// Timeout in seconds; `0` disables the deadline.
    pub timeout_secs: u64,
    /// Working directory override.
    pub dir: Option<PathBuf>,
    /// Environment overlay for this command.
    pub env: EnvMap,
}

impl Default for CommandSpec {
    fn default() -> Self {
        Self {
            args: Vec::new(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            dir: None,
            env: EnvMap::new(),
        }
    }
}

impl CommandSpec {
    /// The argument template: every word joined with a single space.
    #[must_use]
    pub fn line(&self) -> String {
        self.args.join(" ")
    }
}

/// Outcome of a successful run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunStatus {
    /// Child process id, when the OS reported one.
    pub pid: Option<u32>,
    /// Lines read from stdout.
    pub stdout_lines: usize,
    /// Lines read from stderr.
    pub stderr_lines: usize,
}

/// A ready-to-run process: argv, deadline, working directory and full environment.
#[derive(Clone, Debug)]
pub struct CommandRunner {
    argv: Vec<String>,
    timeout: Option<Duration>,
    dir: Option<PathBuf>,
    env: EnvMap,
}

impl CommandRunner {
    /// Split an already-rendered command line on whitespace.
    ///
    /// Argument values containing spaces cannot be expressed this way.
    ///
    /// # Errors
    ///
    /// Returns [`RunFailure::EmptyCommand`] when the line has no words.
    pub fn from_line(line: &str, timeout_secs: u64, dir: Option<&Path>, env: EnvMap) -> FsOpsResult<Self> {
        let argv: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        if argv.is_empty() {
            return Err(FsOpsError::run(line, RunFailure::EmptyCommand));
        }
        Ok(Self {
            argv,
            timeout: (timeout_secs > 0).then(|| Duration::from_secs(timeout_secs)),
            dir: dir.map(Path::to_path_buf),
            env,
        })
    }

    /// Command line as executed.
    #[must_use]
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }

    /// Run to completion on a private current-thread runtime.
    ///
    /// Must not be called from within an async runtime; use [`CommandRunner::run_async`] there.
    ///
    /// # Errors
    ///
    /// See [`CommandRunner::run_async`]; additionally [`RunFailure::Runtime`] if no runtime can be built.
    pub fn run(&self) -> FsOpsResult<RunStatus> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_io()
            .enable_time()
            .build()
            .map_err(|source| FsOpsError::run(self.command_line(), RunFailure::Runtime { source }))?;
        runtime.block_on(self.run_async())
    }

    /// Spawn the process, stream its output and wait for it.
    ///
    /// # Errors
    ///
    /// Returns [`FsOpsError::Run`] with [`RunFailure::Spawn`], [`RunFailure::Wait`],
    /// [`RunFailure::Timeout`] or [`RunFailure::Exit`].
    pub async fn run_async(&self) -> FsOpsResult<RunStatus> {
        let command_line = self.command_line();
        let mut command = Command::new(&self.argv[0]);
        command
            .args(&self.argv[1..])
            .env_clear()
            .envs(&self.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.dir {
            command.current_dir(dir);
        }

        let mut child = command
            .spawn()
            .map_err(|source| FsOpsError::run(&command_line, RunFailure::Spawn { source }))?;
        let pid = child.id();
        debug!(pid, command = %command_line, "running command");

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let supervised = async {
            let (stdout_lines, stderr_lines) = drain_output(pid, stdout, stderr).await;
            child
                .wait()
                .await
                .map(|status| (status, stdout_lines, stderr_lines))
        };
        let finished = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, supervised).await.ok(),
            None => Some(supervised.await),
        };

        let Some(finished) = finished else {
            let seconds = self.timeout.map_or(0, |limit| limit.as_secs());
            error!(pid, timeout_secs = seconds, command = %command_line, "timeout, killing process");
            if let Err(err) = child.kill().await {
                warn!(pid, error = %err, "failed to kill timed out process");
            }
            return Err(FsOpsError::run(command_line, RunFailure::Timeout { seconds }));
        };

        let (status, stdout_lines, stderr_lines) =
            finished.map_err(|source| FsOpsError::run(&command_line, RunFailure::Wait { source }))?;
        if status.success() {
            debug!(pid, command = %command_line, "command finished");
            Ok(RunStatus {
                pid,
                stdout_lines,
                stderr_lines,
            })
        } else {
            error!(pid, code = ?status.code(), command = %command_line, "command failed");
            Err(FsOpsError::run(
                command_line,
                RunFailure::Exit {
                    code: status.code(),
                },
            ))
        }
    }
}

async fn next_line<R>(lines: &mut Option<Lines<BufReader<R>>>) -> Option<std::io::Result<Option<String>>>
where
    R: AsyncRead + Unpin,
{
    match lines {
        Some(lines) => Some(lines.next_line().await),
        None => None,
    }
}

async fn drain_output(
    pid: Option<u32>,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
) -> (usize, usize) {
    let mut out = stdout.map(|stream| BufReader::new(stream).lines());
    let mut err = stderr.map(|stream| BufReader::new(stream).lines());
    let (mut out_count, mut err_count) = (0usize, 0usize);

    loop {
        tokio::select! {
            Some(line) = next_line(&mut out) => match line {
                Ok(Some(line)) => {
                    out_count += 1;
                    debug!(pid, "{line}");
                }
                Ok(None) => out = None,
                Err(read_err) => {
                    warn!(pid, error = %read_err, "stopped reading stdout");
                    out = None;
                }
            },
            Some(line) = next_line(&mut err) => match line {
                Ok(Some(line)) => {
                    err_count += 1;
                    error!(pid, "{line}");
                }
                Ok(None) => err = None,
                Err(read_err) => {
                    warn!(pid, error = %read_err, "stopped reading stderr");
                    err = None;
                }
            },
            else => break,
        }
    }
    debug!(pid, stdout_lines = out_count, stderr_lines = err_count, "command output closed");
    (out_count, err_count)
}
