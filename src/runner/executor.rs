//! Command executors
//!
//! The runner hands each rendered command to a [`CommandExecutor`]. The
//! production [`ShellExecutor`] runs it through a shell in a fresh process
//! group, streams merged stdout/stderr line by line to an [`OutputSink`], and
//! terminates the whole group when the run is cancelled. Tests swap in their
//! own executor that never spawns a process.

use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{ExitStatus, Stdio};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use nix::errno::Errno;
use nix::sys::signal::{Signal, killpg};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::unix::pipe::Receiver;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// How an executed command ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecOutcome {
    /// The command exited. Death by signal N is reported as `-N`.
    Exited(i32),
    /// Cancellation arrived first; the process group has been terminated
    Cancelled,
}

/// Receives command output as it is produced.
pub trait OutputSink: Send + Sync {
    /// One line of output from the command running for `item`.
    fn line(&self, item: &str, line: &str);
}

/// Prints `<item>: <line>` to standard output.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdoutSink;

impl OutputSink for StdoutSink {
    fn line(&self, item: &str, line: &str) {
        println!("{}: {}", item, line);
    }
}

/// Collects `<item>: <line>` strings, mostly for tests.
impl OutputSink for Mutex<Vec<String>> {
    fn line(&self, item: &str, line: &str) {
        self.lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(format!("{}: {}", item, line));
    }
}

/// Runs one rendered command for one item.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Run `command` on behalf of `item` until it exits or `cancel` fires.
    async fn execute(
        &self,
        item: &str,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecOutcome>;
}

/// Default interpreter used as `<shell> -c <command>`
pub const DEFAULT_SHELL: &str = "sh";

/// Default time between SIGTERM and SIGKILL on cancellation
pub const DEFAULT_KILL_GRACE: Duration = Duration::from_secs(5);

/// Executor that runs commands through a shell.
pub struct ShellExecutor {
    shell: String,
    kill_grace: Duration,
    sink: Arc<dyn OutputSink>,
}

impl std::fmt::Debug for ShellExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellExecutor")
            .field("shell", &self.shell)
            .field("kill_grace", &self.kill_grace)
            .finish_non_exhaustive()
    }
}

impl Default for ShellExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_SHELL, DEFAULT_KILL_GRACE)
    }
}

impl ShellExecutor {
    /// Create an executor printing output to stdout.
    pub fn new(shell: impl Into<String>, kill_grace: Duration) -> Self {
        Self {
            shell: shell.into(),
            kill_grace,
            sink: Arc::new(StdoutSink),
        }
    }

    /// Send output to `sink` instead of stdout.
    pub fn with_sink(mut self, sink: Arc<dyn OutputSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Spawn `command` with stdout and stderr sharing one pipe, so lines keep
    /// the order the command wrote them in.
    fn spawn(&self, command: &str) -> Result<(Child, Receiver)> {
        let (reader, writer) = io::pipe()?;

        let mut cmd = std::process::Command::new(&self.shell);
        cmd.arg("-c")
            .arg(command)
            .stdout(Stdio::from(writer.try_clone()?))
            .stderr(Stdio::from(writer))
            // Own process group, so signals reach pipelines and grandchildren.
            .process_group(0);

        // The parent's write ends go away with `cmd`, so EOF follows the child.
        let child = Command::from(cmd).spawn()?;
        let output = Receiver::from_owned_fd(OwnedFd::from(reader))?;
        Ok((child, output))
    }

    fn emit(&self, item: &str, segment: &[u8]) {
        let text = String::from_utf8_lossy(segment);
        let text = text.strip_suffix('\r').unwrap_or(&text);
        self.sink.line(item, text);
    }

    /// SIGTERM the group, give it `kill_grace` to exit, then SIGKILL and reap.
    async fn terminate(&self, child: &mut Child, pgid: Option<Pid>) -> Result<()> {
        if let Some(pgid) = pgid {
            signal_group(pgid, Signal::SIGTERM);
        }

        if let Ok(status) = tokio::time::timeout(self.kill_grace, child.wait()).await {
            status?;
            return Ok(());
        }

        warn!(
            "Process group {:?} ignored SIGTERM for {:?}, sending SIGKILL",
            pgid, self.kill_grace
        );
        match pgid {
            Some(pgid) => signal_group(pgid, Signal::SIGKILL),
            None => child.start_kill()?,
        }
        child.wait().await?;
        Ok(())
    }
}

#[async_trait]
impl CommandExecutor for ShellExecutor {
    async fn execute(
        &self,
        item: &str,
        command: &str,
        cancel: &CancellationToken,
    ) -> Result<ExecOutcome> {
        debug!("Spawning `{} -c {}`", self.shell, command);
        let (mut child, output) = self.spawn(command)?;
        let pgid = child.id().map(|id| Pid::from_raw(id as i32));

        let mut output = BufReader::new(output).split(b'\n');
        let mut cancelled = false;

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    cancelled = true;
                    break;
                }
                segment = output.next_segment() => match segment? {
                    Some(bytes) => self.emit(item, &bytes),
                    None => break,
                },
            }
        }

        let status = if cancelled {
            None
        } else {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                status = child.wait() => Some(status?),
            }
        };

        match status {
            Some(status) => Ok(ExecOutcome::Exited(exit_code(status))),
            None => {
                debug!("Cancelling `{}`", command);
                self.terminate(&mut child, pgid).await?;
                Ok(ExecOutcome::Cancelled)
            }
        }
    }
}

fn signal_group(pgid: Pid, signal: Signal) {
    match killpg(pgid, signal) {
        Ok(()) | Err(Errno::ESRCH) => {}
        Err(e) => warn!("Failed to send {} to process group {}: {}", signal, pgid, e),
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| -signal))
        .unwrap_or(-1)
}
