//! Subprocess execution behind a trait, with a hard wall-clock bound that
//! covers the tool and everything it spawns.

#[cfg(unix)]
use std::cell::Cell;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
#[cfg(unix)]
use nix::errno::Errno;
#[cfg(unix)]
use nix::sys::signal::{Signal, killpg};
#[cfg(unix)]
use nix::unistd::Pid;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::errors::FetchError;

/// One command invocation.
#[derive(Clone, Debug)]
pub struct ProcessSpec {
    /// Executable name or path.
    pub program: String,
    /// Arguments, passed verbatim (no shell).
    pub args: Vec<String>,
    /// Working directory, inherited when `None`.
    pub working_dir: Option<PathBuf>,
    /// Kill the process after this long.
    pub timeout: Duration,
}

/// What a finished (or killed) process left behind.
#[derive(Clone, Debug, Default)]
pub struct ProcessOutput {
    /// Captured stdout (lossy UTF-8).
    pub stdout: String,
    /// Captured stderr (lossy UTF-8).
    pub stderr: String,
    /// Exit code, `-1` when killed or terminated by a signal.
    pub exit_code: i32,
    /// Wall-clock time spent.
    pub duration_ms: u64,
    /// The timeout fired and the process was killed.
    pub timed_out: bool,
}

impl ProcessOutput {
    /// Exited normally with code 0.
    pub fn success(&self) -> bool {
        !self.timed_out && self.exit_code == 0
    }
}

/// Runs external commands.
///
/// Timeouts are reported through [`ProcessOutput::timed_out`], not as an
/// error, so callers decide how to classify them. Errors are reserved for
/// failing to start or wait on the process.
#[async_trait]
pub trait ProcessRunner: Send + Sync {
    /// Run `spec` to completion or until its timeout.
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, FetchError>;
}

/// Real subprocess execution backed by `tokio::process::Command`.
///
/// On unix the tool runs as the leader of its own process group, and the
/// whole group is killed once the tool exits, times out, or the call is
/// dropped. The timeout bounds draining stdout/stderr as well as the wait.
pub struct TokioProcessRunner;

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(&self, spec: &ProcessSpec) -> Result<ProcessOutput, FetchError> {
        let start = Instant::now();
        let deadline = tokio::time::Instant::now() + spec.timeout;

        let mut cmd = tokio::process::Command::new(&spec.program);
        let _ = cmd
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // a dropped request future must not leave the tool running
            .kill_on_drop(true);
        #[cfg(unix)]
        let _ = cmd.process_group(0);
        if let Some(dir) = &spec.working_dir {
            let _ = cmd.current_dir(dir);
        }

        debug!(program = %spec.program, args = ?spec.args, "spawning process");

        let mut child = cmd.spawn().map_err(|source| FetchError::Spawn {
            program: spec.program.clone(),
            source,
        })?;
        let group = ProcessGroup::of(&child);

        let mut stdout_handle = drain(child.stdout.take());
        let mut stderr_handle = drain(child.stderr.take());

        let status = tokio::select! {
            status = child.wait() => Some(status?),
            () = tokio::time::sleep_until(deadline) => None,
        };

        let Some(status) = status else {
            group.kill();
            // kill() sends SIGKILL and reaps the child
            if let Err(e) = child.kill().await {
                warn!(program = %spec.program, error = %e, "failed to kill timed-out process");
            }
            stdout_handle.abort();
            stderr_handle.abort();
            return Ok(timed_out(spec, start));
        };

        // anything still running in the group is a stray holding our pipes
        group.kill();

        let drained = tokio::time::timeout_at(deadline, async {
            let stdout = (&mut stdout_handle).await.unwrap_or_default();
            let stderr = (&mut stderr_handle).await.unwrap_or_default();
            (stdout, stderr)
        })
        .await;
        let Ok((stdout_bytes, stderr_bytes)) = drained else {
            stdout_handle.abort();
            stderr_handle.abort();
            return Ok(timed_out(spec, start));
        };

        let duration_ms = elapsed_ms(start);
        let exit_code = status.code().unwrap_or(-1);

        debug!(program = %spec.program, exit_code, duration_ms, "process completed");

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&stdout_bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr_bytes).into_owned(),
            exit_code,
            duration_ms,
            timed_out: false,
        })
    }
}

fn drain<R>(pipe: Option<R>) -> JoinHandle<Vec<u8>>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            let _ = pipe.read_to_end(&mut buf).await;
        }
        buf
    })
}

fn timed_out(spec: &ProcessSpec, start: Instant) -> ProcessOutput {
    let timeout_ms = u64::try_from(spec.timeout.as_millis()).unwrap_or(u64::MAX);
    warn!(program = %spec.program, timeout_ms, "process timed out");
    ProcessOutput {
        stdout: String::new(),
        stderr: "Process timed out".into(),
        exit_code: -1,
        duration_ms: elapsed_ms(start),
        timed_out: true,
    }
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// The spawned tool's process group. Killed with SIGKILL at most once, at
/// the latest on drop; the id is forgotten afterwards so a recycled pid is
/// never signalled.
#[cfg(unix)]
struct ProcessGroup(Cell<Option<Pid>>);

#[cfg(unix)]
impl ProcessGroup {
    fn of(child: &tokio::process::Child) -> Self {
        let pgid = child.id().and_then(|id| i32::try_from(id).ok()).map(Pid::from_raw);
        Self(Cell::new(pgid))
    }

    fn kill(&self) {
        let Some(pgid) = self.0.take() else { return };
        match killpg(pgid, Signal::SIGKILL) {
            // ESRCH: the group is already empty
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => debug!(pgid = pgid.as_raw(), error = %e, "failed to kill process group"),
        }
    }
}

#[cfg(unix)]
impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

#[cfg(not(unix))]
struct ProcessGroup;

#[cfg(not(unix))]
impl ProcessGroup {
    fn of(_child: &tokio::process::Child) -> Self {
        Self
    }

    fn kill(&self) {}
}
