//! Worker process supervision.
//!
//! A [`WorkerLauncher`] turns a [`LaunchSpec`] into a running worker's stdio
//! handles plus a [`WorkerProcess`] used to wait on or kill it. The exit watcher
//! owns that process for its whole life and reports its exit as a
//! [`WorkerEvent`] on the same channel the stdout reader feeds.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::error::{GatewayError, GatewayResult};
use super::protocol::Envelope;

/// Log target for forwarded worker stderr.
pub const STDERR_TARGET: &str = "inference_gateway::worker::stderr";

/// How long to keep reading stdout after the worker exits on its own.
///
/// Responses written just before exit are still delivered within this window.
const EXIT_DRAIN: Duration = Duration::from_millis(500);

/// Events produced by a running worker, consumed by the gateway dispatcher.
#[derive(Debug)]
pub enum WorkerEvent {
    /// A decoded line from stdout.
    Envelope(Envelope),
    /// The process exited.
    Exited { code: Option<i32> },
}

/// What to launch: the worker command, its extra arguments and the model.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub command: PathBuf,
    pub args: Vec<String>,
    pub model: PathBuf,
}

impl LaunchSpec {
    /// Check everything that can be checked without spawning.
    pub fn validate(&self) -> GatewayResult<()> {
        if !self.model.exists() {
            return Err(GatewayError::ModelNotFound(self.model.clone()));
        }

        // Bare names are resolved through PATH at spawn time.
        if is_explicit_path(&self.command) && !self.command.exists() {
            return Err(GatewayError::WorkerNotFound(self.command.clone()));
        }

        Ok(())
    }

    /// Full argument vector: configured args followed by `--model <path>`.
    pub fn argv(&self) -> Vec<OsString> {
        let mut argv: Vec<OsString> = self.args.iter().map(OsString::from).collect();
        argv.push("--model".into());
        argv.push(self.model.clone().into_os_string());
        argv
    }
}

fn is_explicit_path(command: &Path) -> bool {
    command.is_absolute() || command.components().count() > 1
}

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// A running worker's stdio and process handle.
pub struct WorkerIo {
    pub stdin: BoxedWriter,
    pub stdout: BoxedReader,
    pub stderr: Option<BoxedReader>,
    pub process: Box<dyn WorkerProcess>,
}

impl std::fmt::Debug for WorkerIo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerIo")
            .field("pid", &self.process.id())
            .field("stderr", &self.stderr.is_some())
            .finish_non_exhaustive()
    }
}

/// Control over a spawned worker process.
#[async_trait]
pub trait WorkerProcess: Send {
    /// OS process id, if there is one.
    fn id(&self) -> Option<u32>;

    /// Wait for the process to exit, returning its exit code.
    async fn wait(&mut self) -> io::Result<Option<i32>>;

    /// Forcefully terminate the process.
    async fn kill(&mut self) -> io::Result<()>;
}

#[async_trait]
impl WorkerProcess for Child {
    fn id(&self) -> Option<u32> {
        Child::id(self)
    }

    async fn wait(&mut self) -> io::Result<Option<i32>> {
        Child::wait(self).await.map(|status| status.code())
    }

    async fn kill(&mut self) -> io::Result<()> {
        Child::kill(self).await
    }
}

/// Starts worker processes.
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, spec: &LaunchSpec) -> GatewayResult<WorkerIo>;
}

/// Launches the worker as an OS child process with piped stdio.
#[derive(Debug, Clone, Default)]
pub struct ProcessLauncher;

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, spec: &LaunchSpec) -> GatewayResult<WorkerIo> {
        let mut child = Command::new(&spec.command)
            .args(spec.argv())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                io::ErrorKind::NotFound => GatewayError::WorkerNotFound(spec.command.clone()),
                _ => GatewayError::SpawnFailed(e),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| missing_pipe("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing_pipe("stdout"))?;
        let stderr = child.stderr.take();

        info!(
            command = %spec.command.display(),
            model = %spec.model.display(),
            pid = ?child.id(),
            "spawned worker"
        );

        Ok(WorkerIo {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: stderr.map(|s| Box::new(s) as BoxedReader),
            process: Box::new(child),
        })
    }
}

fn missing_pipe(name: &str) -> GatewayError {
    GatewayError::SpawnFailed(io::Error::other(format!("worker {} was not captured", name)))
}

/// Forward worker stderr, line by line, to the log.
///
/// Bytes that are not UTF-8 are replaced rather than ending the forwarder, so
/// the pipe keeps draining until the worker closes it.
pub fn spawn_stderr_forwarder(stderr: BoxedReader, pid: Option<u32>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut reader = BufReader::new(stderr);
        let mut buf = Vec::new();
        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => break,
                Ok(_) => {
                    let text = String::from_utf8_lossy(&buf);
                    info!(target: STDERR_TARGET, pid = ?pid, "{}", text.trim_end());
                }
                Err(e) => {
                    debug!(pid = ?pid, error = %e, "worker stderr read error");
                    break;
                }
            }
        }
        debug!(pid = ?pid, "stderr reader task exiting");
    })
}

/// Spawn the task that owns the worker process until it exits.
///
/// Sending a grace period on `stop` asks for termination: the task waits up to
/// that long for a voluntary exit, then kills. Dropping `stop` without sending
/// kills immediately. When the worker exits on its own the stdout `reader` is
/// given a short window to drain before [`WorkerEvent::Exited`] is emitted.
pub fn spawn_exit_watcher(
    mut process: Box<dyn WorkerProcess>,
    mut stop: oneshot::Receiver<Duration>,
    mut reader: JoinHandle<()>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) -> JoinHandle<Option<i32>> {
    tokio::spawn(async move {
        let pid = process.id();

        let (code, requested) = tokio::select! {
            status = process.wait() => (exit_code(status, pid), false),
            grace = &mut stop => {
                let grace = grace.unwrap_or(Duration::ZERO);
                (terminate(process.as_mut(), grace, pid).await, true)
            }
        };

        if requested {
            reader.abort();
        } else if timeout(EXIT_DRAIN, &mut reader).await.is_err() {
            debug!(pid = ?pid, "stdout still open after worker exit, abandoning reader");
            reader.abort();
        }

        let _ = events.send(WorkerEvent::Exited { code });
        code
    })
}

async fn terminate(process: &mut dyn WorkerProcess, grace: Duration, pid: Option<u32>) -> Option<i32> {
    if let Ok(status) = timeout(grace, process.wait()).await {
        return exit_code(status, pid);
    }

    debug!(pid = ?pid, ?grace, "worker did not exit in time, killing");
    if let Err(e) = process.kill().await {
        warn!(pid = ?pid, error = %e, "failed to kill worker");
    }
    exit_code(process.wait().await, pid)
}

fn exit_code(status: io::Result<Option<i32>>, pid: Option<u32>) -> Option<i32> {
    match status {
        Ok(code) => code,
        Err(e) => {
            warn!(pid = ?pid, error = %e, "failed to wait for worker");
            None
        }
    }
}
