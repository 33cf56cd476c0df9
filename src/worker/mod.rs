//! Worker communication module.
//!
//! This module owns everything that touches the inference worker process: the
//! NDJSON wire format, the stdio transport, the table of pending calls and the
//! process supervisor. The [`gateway`](crate::gateway) layer composes these
//! into a lifecycle-managed client.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                   Inference Gateway (Rust + Tokio)              │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │                 CorrelationRegistry                       │  │
//! │  │  - One pending record per in-flight call id               │  │
//! │  │  - Bounded: excess calls fail with backpressure           │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! │        writer task │                      ▲ reader task         │
//! │                    │                      │                     │
//! │       stdin (NDJSON)                      stdout (NDJSON)       │
//! └────────────────────┼──────────────────────┼─────────────────────┘
//!                      ▼                      │
//! ┌─────────────────────────────────────────────────────────────────┐
//! │           Inference Worker (Long-Running Child Process)         │
//! │           stderr is forwarded to the log, line by line          │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```ignore
//! use inference_gateway::worker::{Call, CallKind, Envelope};
//!
//! let call = Call {
//!     id: "a1".to_string(),
//!     kind: CallKind::Summarize,
//!     prompt: "Summarize this".to_string(),
//!     context: None,
//!     options: None,
//! };
//! let line = call.to_line()?;
//!
//! match Envelope::decode(r#"{"type":"response","callId":"a1","payload":"short"}"#)? {
//!     Envelope::Response { call_id, payload } => { /* ... */ }
//!     _ => {}
//! }
//! ```

mod error;
pub mod protocol;
mod registry;
pub mod supervisor;
pub mod transport;

pub use error::{GatewayError, GatewayResult, ProtocolError};
pub use protocol::{Call, CallKind, CallOptions, Envelope, OptionOverrides};
pub use registry::{CallOutcome, CorrelationRegistry};
pub use supervisor::{
    BoxedReader, BoxedWriter, LaunchSpec, ProcessLauncher, WorkerEvent, WorkerIo, WorkerLauncher,
    WorkerProcess, STDERR_TARGET,
};
pub use transport::LineSender;
