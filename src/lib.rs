//! # Inference Gateway
//!
//! A client for a local inference worker that runs as a separate process.
//!
//! ## Architecture
//!
//! The worker speaks newline-delimited JSON over its stdio. The gateway owns
//! its lifecycle and multiplexes concurrent calls over that single pipe:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │            Capabilities (typed operations)               │
//! │  (search, summarize, translate, classify, ...)           │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [Gateway::call]
//! ┌─────────────────────────────────────────────────────────┐
//! │          Gateway (lifecycle + generic call)              │
//! │          Stopped → Starting → Ready → Disconnected       │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [registry + transport]
//! ┌─────────────────────────────────────────────────────────┐
//! │     CorrelationRegistry  ◀──▶  writer / reader tasks     │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [supervisor]
//! ┌─────────────────────────────────────────────────────────┐
//! │                 Worker child process                     │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod gateway;
pub mod worker;

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::{GatewayConfig, Settings};
    pub use crate::gateway::{
        CallSettings, Capabilities, CapabilityError, Gateway, PendingCall, ProcessState,
    };
    pub use crate::worker::{CallKind, CallOptions, GatewayError, GatewayResult, OptionOverrides};
}
