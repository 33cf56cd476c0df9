//! Line-framed transport over the worker's stdio.
//!
//! Writes go through a single writer task so concurrent calls never interleave
//! bytes on the wire. Reads happen on a single reader task that decodes each
//! line and forwards typed envelopes to the gateway's dispatcher.

use std::io;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, BufWriter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::error::{GatewayError, GatewayResult};
use super::protocol::Envelope;
use super::registry::CorrelationRegistry;
use super::supervisor::WorkerEvent;

/// A serialized call waiting to be written.
#[derive(Debug)]
struct OutboundLine {
    call_id: String,
    line: String,
}

/// Handle for queueing lines onto the writer task.
///
/// Cloning is cheap; all clones feed the same writer.
#[derive(Debug, Clone)]
pub struct LineSender {
    tx: mpsc::UnboundedSender<OutboundLine>,
}

impl LineSender {
    /// Queue a serialized call for writing.
    ///
    /// Write failures are reported to the call's pending record, not here;
    /// this only fails when the writer task has already stopped.
    pub fn send(&self, call_id: impl Into<String>, line: String) -> GatewayResult<()> {
        self.tx
            .send(OutboundLine {
                call_id: call_id.into(),
                line,
            })
            .map_err(|_| {
                GatewayError::WriteFailed(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "worker stdin is closed",
                ))
            })
    }
}

/// Spawn the task that owns the worker's stdin.
///
/// When every [`LineSender`] is dropped the task flushes and closes stdin,
/// which is the worker's cue to exit.
pub fn spawn_writer<W>(stdin: W, registry: Arc<CorrelationRegistry>) -> (LineSender, JoinHandle<()>)
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (tx, mut rx) = mpsc::unbounded_channel::<OutboundLine>();

    let task = tokio::spawn(async move {
        let mut writer = BufWriter::new(stdin);
        let mut broken = false;

        while let Some(outbound) = rx.recv().await {
            if broken {
                registry.reject(
                    &outbound.call_id,
                    GatewayError::WriteFailed(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "worker stdin is closed",
                    )),
                );
                continue;
            }

            let result = async {
                writer.write_all(outbound.line.as_bytes()).await?;
                writer.flush().await
            }
            .await;

            match result {
                Ok(()) => debug!(call_id = %outbound.call_id, bytes = outbound.line.len(), "wrote call"),
                Err(e) => {
                    warn!(call_id = %outbound.call_id, error = %e, "failed to write to worker");
                    registry.reject(&outbound.call_id, GatewayError::WriteFailed(e));
                    broken = true;
                }
            }
        }

        if let Err(e) = writer.shutdown().await {
            debug!(error = %e, "closing worker stdin failed");
        }
        debug!("writer task exiting");
    });

    (LineSender { tx }, task)
}

/// Spawn the task that reads and decodes worker stdout.
///
/// Malformed lines (including ones that are not UTF-8) and unknown envelope
/// types are logged and dropped. The task ends at EOF, on a read error, or when
/// the event receiver goes away.
pub fn spawn_reader<R>(stdout: R, events: mpsc::UnboundedSender<WorkerEvent>) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut reader = BufReader::new(stdout);
        let mut buf = Vec::new();

        loop {
            buf.clear();
            match reader.read_until(b'\n', &mut buf).await {
                Ok(0) => {
                    debug!("worker stdout closed");
                    break;
                }
                Ok(_) => {
                    let line = match std::str::from_utf8(&buf) {
                        Ok(line) => line,
                        Err(e) => {
                            warn!(error = %e, bytes = buf.len(), "dropping non-UTF-8 worker output line");
                            continue;
                        }
                    };
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    match Envelope::decode(trimmed) {
                        Ok(envelope) => {
                            if events.send(WorkerEvent::Envelope(envelope)).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, line = %truncate(trimmed, 200), "dropping worker output line");
                        }
                    }
                }
                Err(e) => {
                    warn!(error = %e, "worker read error");
                    break;
                }
            }
        }
    })
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
