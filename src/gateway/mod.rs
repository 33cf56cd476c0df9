//! Lifecycle-managed client for a single inference worker.
//!
//! A [`Gateway`] owns at most one worker process at a time. It drives the
//! worker through the [`ProcessState`] machine, writes calls over stdin and
//! routes every stdout envelope to the caller waiting on it.
//!
//! # Example
//!
//! ```ignore
//! use inference_gateway::config::GatewayConfig;
//! use inference_gateway::gateway::{CallSettings, Gateway};
//! use inference_gateway::worker::CallKind;
//!
//! let gateway = Gateway::new(GatewayConfig::new("python3", "./models/tiny.gguf").with_args(["worker.py"]));
//! gateway.initialize().await?;
//!
//! let payload = gateway
//!     .call(CallKind::Summarize, "Summarize this", None, &CallSettings::new())
//!     .await?;
//!
//! let summary = gateway.capabilities().summarize_text("...", 50).await?;
//! gateway.shutdown().await;
//! ```

mod call;
mod capabilities;
mod state;
mod types;

pub use call::{CallSettings, PendingCall};
pub use capabilities::{Capabilities, CapabilityError, CapabilityResult};
pub use state::ProcessState;
pub use types::{Anomaly, Classification, Recommendation, SearchHit, Sentiment, SentimentLabel};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::worker::supervisor::{spawn_exit_watcher, spawn_stderr_forwarder};
use crate::worker::transport::{spawn_reader, spawn_writer};
use crate::worker::{
    Call, CallKind, CallOutcome, CorrelationRegistry, Envelope, GatewayError, GatewayResult,
    LineSender, ProcessLauncher, WorkerEvent, WorkerIo, WorkerLauncher, WorkerProcess,
};

/// State shared between the gateway and its background tasks.
struct Shared {
    registry: Arc<CorrelationRegistry>,
    state: watch::Sender<ProcessState>,
    /// Incremented on every launch; events from older sessions are ignored.
    epoch: AtomicU64,
    last_exit: Mutex<Option<i32>>,
}

impl Shared {
    fn current(&self) -> ProcessState {
        *self.state.borrow()
    }

    fn last_exit(&self) -> Option<i32> {
        *lock(&self.last_exit)
    }

    fn is_current(&self, epoch: u64) -> bool {
        self.epoch.load(Ordering::Acquire) == epoch
    }

    fn on_ready(&self, epoch: u64) {
        if !self.is_current(epoch) {
            return;
        }

        let became_ready = self.state.send_if_modified(|state| {
            if *state == ProcessState::Starting {
                *state = ProcessState::Ready;
                true
            } else {
                false
            }
        });

        if became_ready {
            info!("worker ready");
        } else {
            debug!(state = %self.current(), "ignoring ready signal");
        }
    }

    fn on_exit(&self, epoch: u64, code: Option<i32>) {
        if !self.is_current(epoch) {
            debug!(?code, "stale worker exited");
            return;
        }

        // Record the code before publishing the state change so a waiting
        // initialize() can report it.
        *lock(&self.last_exit) = code;

        let disconnected = self.state.send_if_modified(|state| {
            if state.is_live() {
                *state = ProcessState::Disconnected;
                true
            } else {
                false
            }
        });
        let rejected = self
            .registry
            .reject_all(|| GatewayError::Disconnected { code });

        if disconnected {
            warn!(?code, rejected, "worker exited unexpectedly");
        } else {
            debug!(?code, "worker exited");
        }
    }
}

/// The tasks and handles belonging to one running worker.
struct Session {
    sender: LineSender,
    stop: oneshot::Sender<Duration>,
    exit_watcher: JoinHandle<Option<i32>>,
    writer: JoinHandle<()>,
    dispatcher: JoinHandle<()>,
    stderr: Option<JoinHandle<()>>,
    pid: Option<u32>,
}

impl Session {
    fn start(io: WorkerIo, shared: &Arc<Shared>, epoch: u64) -> Self {
        let WorkerIo {
            stdin,
            stdout,
            stderr,
            process,
        } = io;
        let pid = process.id();

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (sender, writer) = spawn_writer(stdin, shared.registry.clone());
        let reader = spawn_reader(stdout, events_tx.clone());
        let stderr = stderr.map(|stderr| spawn_stderr_forwarder(stderr, pid));

        let (stop, stop_rx) = oneshot::channel();
        let exit_watcher = spawn_exit_watcher(process, stop_rx, reader, events_tx);
        let dispatcher = tokio::spawn(run_dispatcher(shared.clone(), epoch, events_rx));

        Self {
            sender,
            stop,
            exit_watcher,
            writer,
            dispatcher,
            stderr,
            pid,
        }
    }

    /// Close stdin, give the worker `grace` to exit, then kill it.
    async fn stop(self, grace: Duration) -> Option<i32> {
        let Session {
            sender,
            stop,
            exit_watcher,
            writer,
            dispatcher,
            stderr,
            pid,
        } = self;

        drop(sender);
        let _ = stop.send(grace);

        let code = match exit_watcher.await {
            Ok(code) => code,
            Err(e) => {
                warn!(pid = ?pid, error = %e, "exit watcher failed");
                None
            }
        };

        writer.abort();
        dispatcher.abort();
        if let Some(stderr) = stderr {
            stderr.abort();
        }
        code
    }
}

async fn run_dispatcher(
    shared: Arc<Shared>,
    epoch: u64,
    mut events: mpsc::UnboundedReceiver<WorkerEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            WorkerEvent::Envelope(Envelope::Ready) => shared.on_ready(epoch),
            WorkerEvent::Envelope(envelope) => {
                shared.registry.dispatch(envelope);
            }
            WorkerEvent::Exited { code } => {
                shared.on_exit(epoch, code);
                break;
            }
        }
    }
    debug!("dispatcher task exiting");
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Client for one out-of-process inference worker.
///
/// All methods take `&self`; share a gateway across tasks with an `Arc`.
/// Dropping a gateway kills its worker.
pub struct Gateway {
    config: GatewayConfig,
    launcher: Arc<dyn WorkerLauncher>,
    shared: Arc<Shared>,
    session: Mutex<Option<Session>>,
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .field("pid", &self.worker_pid())
            .finish_non_exhaustive()
    }
}

impl Gateway {
    /// Create a gateway that launches its worker as a child process.
    pub fn new(config: GatewayConfig) -> Self {
        Self::with_launcher(config, Arc::new(ProcessLauncher))
    }

    /// Create a gateway with a custom way of starting workers.
    pub fn with_launcher(config: GatewayConfig, launcher: Arc<dyn WorkerLauncher>) -> Self {
        let (state, _) = watch::channel(ProcessState::Stopped);
        let shared = Arc::new(Shared {
            registry: Arc::new(CorrelationRegistry::new(config.max_pending)),
            state,
            epoch: AtomicU64::new(0),
            last_exit: Mutex::new(None),
        });

        Self {
            config,
            launcher,
            shared,
            session: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn state(&self) -> ProcessState {
        self.shared.current()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ProcessState::Ready
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ProcessState> {
        self.shared.state.subscribe()
    }

    /// Number of calls awaiting a terminal event.
    pub fn pending_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// OS process id of the current worker, if one is running.
    pub fn worker_pid(&self) -> Option<u32> {
        self.lock_session().as_ref().and_then(|session| session.pid)
    }

    /// Exit code of the most recent worker exit, if it reported one.
    pub fn last_exit_code(&self) -> Option<i32> {
        self.shared.last_exit()
    }

    /// Typed operations layered over [`Gateway::call`].
    pub fn capabilities(&self) -> Capabilities<'_> {
        Capabilities::new(self)
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        lock(&self.session)
    }

    /// Start the worker and wait for its readiness signal.
    ///
    /// A no-op when already ready. Fails with [`GatewayError::AlreadyStarted`]
    /// while another start is in progress. Missing model or worker files are
    /// reported before anything is spawned. If the worker does not signal
    /// readiness within the startup timeout it is killed and the gateway
    /// returns to [`ProcessState::Stopped`].
    pub async fn initialize(&self) -> GatewayResult<()> {
        match self.state() {
            ProcessState::Ready => return Ok(()),
            ProcessState::Starting => return Err(GatewayError::AlreadyStarted),
            ProcessState::Stopped | ProcessState::Disconnected => {}
        }

        let spec = self.config.launch_spec();
        spec.validate()?;

        let mut state_rx = self.shared.state.subscribe();
        {
            let mut slot = self.lock_session();

            let claimed = self.shared.state.send_if_modified(|state| {
                if state.can_start() {
                    *state = ProcessState::Starting;
                    true
                } else {
                    false
                }
            });
            if !claimed {
                return match self.state() {
                    ProcessState::Ready => Ok(()),
                    _ => Err(GatewayError::AlreadyStarted),
                };
            }

            // A disconnected worker's tasks have already finished.
            drop(slot.take());

            let epoch = self.shared.epoch.fetch_add(1, Ordering::AcqRel) + 1;
            *lock(&self.shared.last_exit) = None;

            let io = match self.launcher.launch(&spec) {
                Ok(io) => io,
                Err(e) => {
                    warn!(error = %e, "failed to launch worker");
                    self.shared.state.send_replace(ProcessState::Stopped);
                    return Err(e);
                }
            };
            *slot = Some(Session::start(io, &self.shared, epoch));
        }

        let startup = self.config.startup_timeout;
        let outcome = timeout(
            startup,
            state_rx.wait_for(|state| *state != ProcessState::Starting),
        )
        .await
        .map(|changed| changed.map(|state| *state));

        match outcome {
            Ok(Ok(ProcessState::Ready)) => Ok(()),
            Ok(Ok(ProcessState::Disconnected)) => Err(GatewayError::StartupFailed {
                code: self.shared.last_exit(),
            }),
            Ok(Ok(_)) | Ok(Err(_)) => Err(GatewayError::ShutDown),
            Err(_) => {
                warn!(?startup, "worker did not become ready in time");
                self.stop_worker(Duration::ZERO).await;
                Err(GatewayError::StartupTimeout(startup))
            }
        }
    }

    /// Stop the worker and fail every pending call with [`GatewayError::ShutDown`].
    ///
    /// Stdin is closed first; the worker then has the configured grace period
    /// to exit before it is killed. Safe to call in any state.
    pub async fn shutdown(&self) {
        self.stop_worker(self.config.shutdown_grace).await;
    }

    async fn stop_worker(&self, grace: Duration) {
        let session = {
            let mut slot = self.lock_session();
            self.shared.state.send_replace(ProcessState::Stopped);
            slot.take()
        };

        let rejected = self.shared.registry.reject_all(|| GatewayError::ShutDown);
        if rejected > 0 {
            debug!(rejected, "rejected pending calls on shutdown");
        }

        if let Some(session) = session {
            let pid = session.pid;
            let code = session.stop(grace).await;
            info!(pid = ?pid, ?code, "worker stopped");
        }
    }

    /// Submit a call with a fresh id and the gateway's default options.
    ///
    /// Admission is synchronous: a gateway that is not ready, or a full
    /// registry, fails here without writing anything.
    pub fn submit(
        &self,
        kind: CallKind,
        prompt: impl Into<String>,
        context: Option<Value>,
        settings: &CallSettings,
    ) -> GatewayResult<PendingCall> {
        let state = self.state();
        if state != ProcessState::Ready {
            return Err(GatewayError::NotReady(state));
        }

        let call = Call {
            id: self.shared.registry.next_id(),
            kind,
            prompt: prompt.into(),
            context,
            options: Some(settings.options.merge_onto(&self.config.defaults)),
        };
        self.submit_call(call, settings)
    }

    /// Submit a fully formed call.
    ///
    /// A call without options is sent with the defaults merged with the
    /// settings' overrides. The caller chooses the id; an id that is already
    /// pending fails with [`GatewayError::DuplicateCallId`].
    pub fn submit_call(&self, mut call: Call, settings: &CallSettings) -> GatewayResult<PendingCall> {
        let state = self.state();
        if state != ProcessState::Ready {
            return Err(GatewayError::NotReady(state));
        }

        if call.options.is_none() {
            call.options = Some(settings.options.merge_onto(&self.config.defaults));
        }
        let line = call.to_line().map_err(GatewayError::SerializeFailed)?;
        let (id, kind) = (call.id.clone(), call.kind);

        let rx = {
            let slot = self.lock_session();
            let Some(session) = slot.as_ref() else {
                return Err(GatewayError::NotReady(self.state()));
            };

            let rx = self.shared.registry.register(call)?;
            if let Err(e) = session.sender.send(id.clone(), line) {
                self.shared.registry.discard(&id);
                return Err(e);
            }
            rx
        };

        // The worker may have exited between the state check and registration,
        // after the disconnect already swept the registry.
        if self.state() == ProcessState::Disconnected {
            self.shared.registry.reject(
                &id,
                GatewayError::Disconnected {
                    code: self.shared.last_exit(),
                },
            );
        }

        debug!(call_id = %id, %kind, "submitted call");
        Ok(PendingCall::new(
            id,
            kind,
            rx,
            self.shared.registry.clone(),
            settings.deadline.or(self.config.call_timeout),
            settings.cancellation.clone(),
        ))
    }

    /// Submit a call and wait for its payload.
    ///
    /// Resolves with the worker's payload (`None` when it sent none) or the
    /// first failure among worker error, deadline, cancellation, disconnect
    /// and shutdown.
    pub async fn call(
        &self,
        kind: CallKind,
        prompt: impl Into<String>,
        context: Option<Value>,
        settings: &CallSettings,
    ) -> CallOutcome {
        self.submit(kind, prompt, context, settings)?.wait().await
    }
}
