//! Per-call settings and the handle for an in-flight call.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

use crate::worker::{CallKind, CallOutcome, CorrelationRegistry, GatewayError, OptionOverrides};

/// Settings that apply to a single call.
#[derive(Debug, Clone, Default)]
pub struct CallSettings {
    /// Overrides merged over the gateway's default options.
    pub options: OptionOverrides,
    /// Give up (locally) if the worker has not answered within this long.
    pub deadline: Option<Duration>,
    /// Give up (locally) when this token is cancelled.
    pub cancellation: Option<CancellationToken>,
}

impl CallSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(mut self, options: OptionOverrides) -> Self {
        self.options = options;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }
}

/// A call that has been written to the worker and is awaiting its outcome.
///
/// Dropping a `PendingCall` without waiting on it removes its pending record,
/// so abandoned calls never hold a registry slot.
#[derive(Debug)]
pub struct PendingCall {
    id: String,
    kind: CallKind,
    rx: oneshot::Receiver<CallOutcome>,
    registry: Arc<CorrelationRegistry>,
    deadline: Option<(Instant, Duration)>,
    cancellation: Option<CancellationToken>,
}

impl PendingCall {
    pub(crate) fn new(
        id: String,
        kind: CallKind,
        rx: oneshot::Receiver<CallOutcome>,
        registry: Arc<CorrelationRegistry>,
        deadline: Option<Duration>,
        cancellation: Option<CancellationToken>,
    ) -> Self {
        Self {
            id,
            kind,
            rx,
            registry,
            deadline: deadline.map(|limit| (Instant::now() + limit, limit)),
            cancellation,
        }
    }

    /// Correlation id of this call.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    /// Wait for the call's single terminal event.
    ///
    /// The deadline is measured from submission. On expiry or cancellation the
    /// pending record is rejected locally; if the worker's answer wins that
    /// race, the answer is returned instead.
    pub async fn wait(mut self) -> CallOutcome {
        let deadline = self.deadline;
        let cancellation = self.cancellation.clone();

        let expired = async move {
            match deadline {
                Some((at, _)) => sleep_until(at).await,
                None => std::future::pending().await,
            }
        };
        let cancelled = async move {
            match cancellation {
                Some(token) => token.cancelled_owned().await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            biased;
            outcome = &mut self.rx => return outcome.unwrap_or(Err(GatewayError::ShutDown)),
            _ = expired => {
                let limit = deadline.map(|(_, limit)| limit).unwrap_or_default();
                self.registry.reject(&self.id, GatewayError::Timeout(limit));
            }
            _ = cancelled => {
                self.registry.reject(&self.id, GatewayError::Cancelled);
            }
        }

        (&mut self.rx).await.unwrap_or(Err(GatewayError::ShutDown))
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        // Only an unanswered call still owns its record.
        if matches!(self.rx.try_recv(), Err(TryRecvError::Empty)) {
            self.registry.discard(&self.id);
        }
    }
}
