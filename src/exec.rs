//! Subprocess execution with an optional wall-clock timeout.
use std::io::Read as _;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context as _, Result};

/// How often a running child is polled for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long a child gets to exit after a graceful terminate request.
const GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Result of a command execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecResult {
    pub stdout: String,
    pub stderr: String,
    pub success: bool,
    pub code: Option<i32>,
    /// The child was terminated because it exceeded its timeout.
    pub timed_out: bool,
}

impl ExecResult {
    /// Exit code, with signals and timeouts reported as `-1`.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        self.code.unwrap_or(-1)
    }
}

/// Abstraction over process execution, injectable for tests.
pub trait Executor: Send + Sync + std::fmt::Debug {
    /// Run `program` and return its output without failing on non-zero exit.
    ///
    /// # Errors
    ///
    /// Returns an error if the process cannot be spawned or waited on.
    fn run_unchecked(
        &self,
        program: &Path,
        args: &[String],
        cwd: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<ExecResult>;

    /// Locate `program` on `PATH`.
    fn which(&self, program: &str) -> Option<PathBuf>;
}

/// Production [`Executor`] backed by [`std::process::Command`].
#[derive(Debug, Default)]
pub struct SystemExecutor;

impl Executor for SystemExecutor {
    fn run_unchecked(
        &self,
        program: &Path,
        args: &[String],
        cwd: Option<&Path>,
        timeout: Option<Duration>,
    ) -> Result<ExecResult> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        let label = program.display().to_string();
        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to execute: {label}"))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());

        let (status, timed_out) = match timeout {
            Some(limit) => wait_with_timeout(&mut child, limit)
                .with_context(|| format!("waiting for {label}"))?,
            None => (
                Some(child.wait().with_context(|| format!("waiting for {label}"))?),
                false,
            ),
        };

        Ok(ExecResult {
            stdout: join_drain(stdout),
            stderr: join_drain(stderr),
            success: !timed_out && status.is_some_and(|s| s.success()),
            code: status.and_then(|s| s.code()),
            timed_out,
        })
    }

    fn which(&self, program: &str) -> Option<PathBuf> {
        which::which(program).ok()
    }
}

/// Read a child pipe to completion on a helper thread so a chatty child can
/// never block on a full pipe while we poll it.
fn drain<R: std::io::Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut p| {
        std::thread::spawn(move || {
            let mut buf = Vec::new();
            p.read_to_end(&mut buf).ok();
            String::from_utf8_lossy(&buf).to_string()
        })
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

/// Poll `child` until it exits or `limit` elapses.
///
/// On expiry a graceful terminate is requested first; the child is
/// force-killed if it is still alive after [`GRACE_PERIOD`].
fn wait_with_timeout(
    child: &mut Child,
    limit: Duration,
) -> std::io::Result<(Option<std::process::ExitStatus>, bool)> {
    let deadline = Instant::now() + limit;
    while Instant::now() < deadline {
        if let Some(status) = child.try_wait()? {
            return Ok((Some(status), false));
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    tracing::warn!("process {} exceeded {limit:?}, requesting exit", child.id());
    request_graceful_exit(child.id());
    let grace_deadline = Instant::now() + GRACE_PERIOD;
    while Instant::now() < grace_deadline {
        if let Some(status) = child.try_wait()? {
            return Ok((Some(status), true));
        }
        std::thread::sleep(POLL_INTERVAL);
    }

    tracing::warn!("process {} ignored exit request, killing", child.id());
    child.kill()?;
    let status = child.wait()?;
    Ok((Some(status), true))
}

/// Ask a process to close its windows / terminate without forcing it.
fn request_graceful_exit(pid: u32) {
    #[cfg(windows)]
    let result = Command::new("taskkill")
        .args(["/PID", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    #[cfg(not(windows))]
    let result = Command::new("kill")
        .args(["-TERM", &pid.to_string()])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    if let Err(e) = result {
        tracing::debug!("graceful exit request for {pid} failed: {e}");
    }
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use super::*;

    #[cfg(not(windows))]
    #[test]
    fn run_echo_captures_stdout() {
        let result = SystemExecutor
            .run_unchecked(Path::new("echo"), &["hello".to_string()], None, None)
            .unwrap();
        assert!(result.success, "echo command should succeed");
        assert_eq!(result.stdout.trim(), "hello");
        assert_eq!(result.exit_code(), 0);
    }

    #[cfg(not(windows))]
    #[test]
    fn run_failure_is_not_an_error() {
        let result = SystemExecutor
            .run_unchecked(Path::new("false"), &[], None, None)
            .unwrap();
        assert!(!result.success, "non-zero exit should set success=false");
        assert_ne!(result.exit_code(), 0);
    }

    #[cfg(not(windows))]
    #[test]
    fn timeout_terminates_long_running_child() {
        let result = SystemExecutor
            .run_unchecked(
                Path::new("sleep"),
                &["30".to_string()],
                None,
                Some(Duration::from_millis(200)),
            )
            .unwrap();
        assert!(result.timed_out);
        assert!(!result.success);
    }

    #[test]
    fn missing_program_is_an_error() {
        let result = SystemExecutor.run_unchecked(
            Path::new("this-program-does-not-exist-12345"),
            &[],
            None,
            None,
        );
        assert!(result.is_err());
    }

    #[test]
    fn which_missing_program() {
        assert!(
            SystemExecutor
                .which("this-program-does-not-exist-12345")
                .is_none()
        );
    }
}
