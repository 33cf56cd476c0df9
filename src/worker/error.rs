//! Gateway error types.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::gateway::ProcessState;

/// Result type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

/// Errors surfaced to gateway callers.
#[derive(Error, Debug)]
pub enum GatewayError {
    /// The configured model file does not exist. No process was spawned.
    #[error("model not found: {}", .0.display())]
    ModelNotFound(PathBuf),

    /// The configured worker executable does not exist.
    #[error("worker executable not found: {}", .0.display())]
    WorkerNotFound(PathBuf),

    /// Failed to spawn the worker process.
    #[error("failed to spawn worker process: {0}")]
    SpawnFailed(#[source] io::Error),

    /// The worker did not send its readiness handshake in time.
    #[error("worker did not become ready within {0:?}")]
    StartupTimeout(Duration),

    /// The worker exited before sending its readiness handshake.
    #[error("worker exited during startup (exit code: {code:?})")]
    StartupFailed { code: Option<i32> },

    /// `initialize()` was called while a worker is still starting.
    #[error("gateway is already starting")]
    AlreadyStarted,

    /// A call was attempted while no worker is ready.
    #[error("gateway is not ready (state: {0})")]
    NotReady(ProcessState),

    /// Too many calls are already in flight.
    #[error("too many pending calls (limit {limit})")]
    Backpressure { limit: usize },

    /// A call was registered under an id that is already pending.
    #[error("call id already pending: {0}")]
    DuplicateCallId(String),

    /// The worker answered this call with an error envelope.
    #[error("worker error for call {call_id}: {message}")]
    CallFailed { call_id: String, message: String },

    /// The worker process exited while the call was pending.
    #[error("worker process disconnected (exit code: {code:?})")]
    Disconnected { code: Option<i32> },

    /// The gateway was shut down while the call was pending.
    #[error("gateway shut down")]
    ShutDown,

    /// The call's deadline passed before the worker answered.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// The call was cancelled by its caller.
    #[error("call cancelled")]
    Cancelled,

    /// Failed to write to worker stdin.
    #[error("failed to write to worker: {0}")]
    WriteFailed(#[source] io::Error),

    /// Failed to serialize a call to JSON.
    #[error("failed to serialize call: {0}")]
    SerializeFailed(#[source] serde_json::Error),

    /// The worker's payload did not fit the expected result type.
    #[error("unexpected payload shape: {0}")]
    InvalidPayload(#[source] serde_json::Error),
}

impl GatewayError {
    /// Create a call failure from an error envelope.
    pub fn call_failed(call_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::CallFailed {
            call_id: call_id.into(),
            message: message.into(),
        }
    }

    /// Check if this error indicates the worker is gone.
    pub fn is_disconnected(&self) -> bool {
        matches!(
            self,
            Self::Disconnected { .. } | Self::ShutDown | Self::StartupFailed { .. }
        )
    }

    /// Check if retrying the same call later could succeed.
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Backpressure { .. } | Self::NotReady(_) | Self::Disconnected { .. }
        )
    }
}

/// A line from the worker that could not be decoded.
///
/// Logged and dropped by the reader; never returned to a caller.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("malformed envelope: {0}")]
    Malformed(#[source] serde_json::Error),

    #[error("envelope has no \"type\" tag")]
    MissingType,

    #[error("unknown envelope type: {0}")]
    UnknownType(String),
}
