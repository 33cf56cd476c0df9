//! Correlation registry pairing worker responses with waiting callers.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Instant;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::oneshot;
use tracing::debug;

use super::error::{GatewayError, GatewayResult};
use super::protocol::{Call, Envelope};

/// The terminal outcome delivered to a pending caller.
pub type CallOutcome = GatewayResult<Option<Value>>;

/// A dispatched call waiting for its terminal event.
#[derive(Debug)]
struct PendingRecord {
    call: Call,
    registered_at: Instant,
    responder: oneshot::Sender<CallOutcome>,
}

/// Maps correlation ids to pending calls.
///
/// Every removal is a lookup-and-remove, so each call sees exactly one
/// terminal event no matter how many sources (response, error, deadline,
/// disconnect) race to complete it. Completing an id that is not pending is a
/// silent no-op.
#[derive(Debug)]
pub struct CorrelationRegistry {
    pending: DashMap<String, PendingRecord>,
    /// Reserved slots; kept separately so admission is a single atomic step.
    in_flight: AtomicUsize,
    max_pending: usize,
    salt: u32,
    sequence: AtomicU64,
}

impl CorrelationRegistry {
    /// Create a registry that admits at most `max_pending` concurrent calls.
    pub fn new(max_pending: usize) -> Self {
        Self {
            pending: DashMap::new(),
            in_flight: AtomicUsize::new(0),
            max_pending,
            salt: rand::random(),
            sequence: AtomicU64::new(0),
        }
    }

    /// Issue a fresh correlation id.
    ///
    /// Ids combine a per-registry random salt with a monotonic counter, so they
    /// never repeat for the lifetime of the registry and are unlikely to
    /// collide with a previous gateway's late responses.
    pub fn next_id(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("{:08x}-{}", self.salt, seq)
    }

    /// Store a pending record for `call` and return the receiver its outcome
    /// will be delivered on.
    pub fn register(&self, call: Call) -> GatewayResult<oneshot::Receiver<CallOutcome>> {
        let reserved = self.in_flight.fetch_add(1, Ordering::AcqRel);
        if reserved >= self.max_pending {
            self.in_flight.fetch_sub(1, Ordering::AcqRel);
            return Err(GatewayError::Backpressure {
                limit: self.max_pending,
            });
        }

        match self.pending.entry(call.id.clone()) {
            Entry::Occupied(_) => {
                self.in_flight.fetch_sub(1, Ordering::AcqRel);
                Err(GatewayError::DuplicateCallId(call.id))
            }
            Entry::Vacant(slot) => {
                let (tx, rx) = oneshot::channel();
                debug!(call_id = %call.id, kind = %call.kind, "registered call");
                slot.insert(PendingRecord {
                    call,
                    registered_at: Instant::now(),
                    responder: tx,
                });
                Ok(rx)
            }
        }
    }

    /// Deliver a successful payload to the call registered under `id`.
    ///
    /// Returns `false` when no such call is pending.
    pub fn resolve(&self, id: &str, payload: Option<Value>) -> bool {
        self.complete(id, Ok(payload))
    }

    /// Deliver an error to the call registered under `id`.
    ///
    /// Returns `false` when no such call is pending.
    pub fn reject(&self, id: &str, error: GatewayError) -> bool {
        self.complete(id, Err(error))
    }

    /// Reject every pending call, building one error per call.
    ///
    /// Returns the number of calls rejected.
    pub fn reject_all(&self, make_error: impl Fn() -> GatewayError) -> usize {
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();

        ids.into_iter()
            .filter(|id| self.complete(id, Err(make_error())))
            .count()
    }

    /// Route a response or error envelope to its caller.
    ///
    /// Returns `false` for readiness envelopes and for unknown ids.
    pub fn dispatch(&self, envelope: Envelope) -> bool {
        match envelope {
            Envelope::Ready => false,
            Envelope::Response { call_id, payload } => self.resolve(&call_id, payload),
            Envelope::Error { call_id, message } => {
                let error = GatewayError::call_failed(call_id.clone(), message);
                self.reject(&call_id, error)
            }
        }
    }

    /// Drop a pending call without notifying anyone.
    ///
    /// Used when the caller has gone away and nobody is listening.
    pub fn discard(&self, id: &str) -> bool {
        self.take(id).is_some()
    }

    /// Whether a call with this id is pending.
    pub fn contains(&self, id: &str) -> bool {
        self.pending.contains_key(id)
    }

    /// Number of pending calls.
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Admission limit.
    pub fn max_pending(&self) -> usize {
        self.max_pending
    }

    fn complete(&self, id: &str, outcome: CallOutcome) -> bool {
        let Some(record) = self.take(id) else {
            debug!(call_id = %id, "no pending call for id, ignoring");
            return false;
        };

        debug!(
            call_id = %id,
            kind = %record.call.kind,
            ok = outcome.is_ok(),
            elapsed_ms = record.registered_at.elapsed().as_millis() as u64,
            "completed call"
        );

        // The caller may have stopped waiting; that is not an error.
        let _ = record.responder.send(outcome);
        true
    }

    fn take(&self, id: &str) -> Option<PendingRecord> {
        let (_, record) = self.pending.remove(id)?;
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
        Some(record)
    }
}
