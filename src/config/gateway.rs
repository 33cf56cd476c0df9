//! Runtime configuration for a single gateway.

use std::path::PathBuf;
use std::time::Duration;

use crate::worker::{CallOptions, LaunchSpec};

/// Default time allowed for the worker's readiness handshake.
pub const DEFAULT_STARTUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time a worker gets to exit after stdin closes before it is killed.
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Default bound on concurrently pending calls.
pub const DEFAULT_MAX_PENDING: usize = 256;

/// Everything a [`Gateway`](crate::gateway::Gateway) needs to run a worker.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayConfig {
    /// Worker executable (a bare name is looked up on PATH).
    pub command: PathBuf,
    /// Extra arguments placed before `--model <path>`.
    pub args: Vec<String>,
    /// Model file passed to the worker; must exist.
    pub model_path: PathBuf,
    pub startup_timeout: Duration,
    pub shutdown_grace: Duration,
    /// Calls beyond this many in flight fail with a backpressure error.
    pub max_pending: usize,
    /// Deadline applied to calls that do not set their own.
    pub call_timeout: Option<Duration>,
    /// Options sent with every call unless overridden.
    pub defaults: CallOptions,
}

impl GatewayConfig {
    pub fn new(command: impl Into<PathBuf>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
            model_path: model_path.into(),
            startup_timeout: DEFAULT_STARTUP_TIMEOUT,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            max_pending: DEFAULT_MAX_PENDING,
            call_timeout: None,
            defaults: CallOptions::default(),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_startup_timeout(mut self, timeout: Duration) -> Self {
        self.startup_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_max_pending(mut self, max_pending: usize) -> Self {
        self.max_pending = max_pending;
        self
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = Some(timeout);
        self
    }

    pub fn with_defaults(mut self, defaults: CallOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// The process invocation for this configuration.
    pub fn launch_spec(&self) -> LaunchSpec {
        LaunchSpec {
            command: self.command.clone(),
            args: self.args.clone(),
            model: self.model_path.clone(),
        }
    }
}
