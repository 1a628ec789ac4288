//! External command invocation.
//!
//! The analysis and viewer tools are opaque executables invoked as
//! `<program> [args...] <target path>`. Only their exit status (or liveness,
//! for the viewer) is observed.

use std::fmt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

/// Maximum stderr captured from an analysis run (64 KiB).
///
/// Only used for diagnostics in logs; the rest of the stream is drained
/// and discarded so the child never blocks on a full pipe.
const MAX_STDERR_BYTES: usize = 64 * 1024;

/// How long stderr may stay open after the child exits.
///
/// A background process started by the tool can inherit the pipe and keep it
/// open indefinitely; its output is abandoned after this.
const STDERR_GRACE: Duration = Duration::from_millis(250);

/// A program plus leading arguments; the target path is appended per call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ExternalCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Parse a shell-style command line such as `"/opt/my tools/cravat" --quiet`.
    ///
    /// Quoting follows POSIX shell word rules; nothing is expanded.
    pub fn parse(line: &str) -> Result<Self, CommandLineError> {
        let mut words = shell_words::split(line)?.into_iter();
        let program = words.next().ok_or(CommandLineError::Blank)?;
        Ok(Self::new(program).with_args(words))
    }

    /// Build the [`Command`] that runs this program against `target`.
    pub fn command_for(&self, target: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args).arg(target);
        cmd
    }
}

impl fmt::Display for ExternalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let words = std::iter::once(&self.program).chain(&self.args);
        f.write_str(&shell_words::join(words))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandLineError {
    #[error("command line is blank")]
    Blank,

    #[error("malformed command line: {0}")]
    Syntax(#[from] shell_words::ParseError),
}

/// How a completed run ended.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub status: ExitStatus,
    pub duration_ms: u64,
    /// Leading part of the child's stderr, lossily decoded.
    pub stderr: String,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        self.status.success()
    }

    /// Exit code, or `-1` when the child was killed by a signal.
    pub fn exit_code(&self) -> i32 {
        self.status.code().unwrap_or(-1)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error("failed to spawn: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("failed waiting for exit: {0}")]
    Wait(#[source] std::io::Error),

    #[error("timed out after {elapsed_ms}ms")]
    Timeout { elapsed_ms: u64 },
}

/// Run `command` against `target` and wait for it to exit.
///
/// When `timeout` elapses the child is killed (`kill_on_drop`) and
/// [`RunError::Timeout`] is returned.
pub async fn run_to_exit(
    command: &ExternalCommand,
    target: &Path,
    timeout: Option<Duration>,
) -> Result<RunOutcome, RunError> {
    let mut cmd = command.command_for(target);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let start = Instant::now();
    let mut child = cmd.spawn().map_err(RunError::Spawn)?;

    let stderr_handle = child.stderr.take();
    let mut stderr_task = tokio::spawn(async move { read_capped(stderr_handle).await });

    let status = match timeout {
        Some(limit) => match tokio::time::timeout(limit, child.wait()).await {
            Ok(result) => result.map_err(RunError::Wait)?,
            Err(_elapsed) => {
                // Dropping `child` kills it.
                drop(child);
                stderr_task.abort();
                return Err(RunError::Timeout {
                    elapsed_ms: start.elapsed().as_millis() as u64,
                });
            }
        },
        None => child.wait().await.map_err(RunError::Wait)?,
    };

    let duration_ms = start.elapsed().as_millis() as u64;

    let stderr_bytes = match tokio::time::timeout(STDERR_GRACE, &mut stderr_task).await {
        Ok(joined) => joined.unwrap_or_default(),
        Err(_elapsed) => {
            stderr_task.abort();
            tracing::debug!(%command, "stderr still open after exit, abandoning it");
            Vec::new()
        }
    };

    Ok(RunOutcome {
        status,
        duration_ms,
        stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
    })
}

/// Read up to [`MAX_STDERR_BYTES`] from `handle`, then drain the remainder.
async fn read_capped<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut h) = handle {
        let _ = (&mut h)
            .take(MAX_STDERR_BYTES as u64)
            .read_to_end(&mut buf)
            .await;
        let _ = tokio::io::copy(&mut h, &mut tokio::io::sink()).await;
    }
    buf
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod test_helpers {
    use std::io::Write;

    use super::ExternalCommand;

    /// Write a temporary bash script and return it with a command that runs it.
    ///
    /// The script receives the target path as `$1`.
    pub fn bash_script(body: &str) -> (tempfile::NamedTempFile, ExternalCommand) {
        let mut f = tempfile::Builder::new()
            .suffix(".sh")
            .tempfile()
            .expect("create temp file");
        writeln!(f, "#!/bin/bash").expect("write shebang");
        write!(f, "{body}").expect("write body");
        f.flush().expect("flush script");
        let cmd = ExternalCommand::new("bash").with_args([f.path().to_string_lossy()]);
        (f, cmd)
    }
}
