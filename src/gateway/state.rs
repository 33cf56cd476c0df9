//! Worker lifecycle state.

use std::fmt;

/// Lifecycle state of a gateway's worker process.
///
/// ```text
/// Stopped ──initialize──▶ Starting ──ready──▶ Ready
///    ▲                        │                 │
///    │                      exit              exit
///    │                        ▼                 ▼
///    └──────shutdown────── Disconnected ◀───────┘
/// ```
///
/// `Disconnected` stays put until the next `initialize()`. `shutdown()` returns
/// any state to `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProcessState {
    #[default]
    Stopped,
    Starting,
    Ready,
    Disconnected,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Ready => "ready",
            ProcessState::Disconnected => "disconnected",
        }
    }

    /// Whether a worker process may be running in this state.
    pub fn is_live(&self) -> bool {
        matches!(self, ProcessState::Starting | ProcessState::Ready)
    }

    /// Whether `initialize()` may spawn a new worker from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, ProcessState::Stopped | ProcessState::Disconnected)
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
