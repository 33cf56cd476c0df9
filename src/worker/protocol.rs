//! Wire types for the gateway ↔ worker protocol.
//!
//! Every message is a single JSON object terminated by `\n`. Calls flow from
//! the gateway to the worker's stdin; envelopes flow back on its stdout.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::ProtocolError;

// ============================================================================
// Outbound: Call
// ============================================================================

/// The coarse-grained kind of work a call asks the worker to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallKind {
    Search,
    Recommend,
    Generate,
    Analyze,
    Translate,
    Summarize,
}

impl CallKind {
    /// All call kinds, in wire order.
    pub const ALL: [CallKind; 6] = [
        CallKind::Search,
        CallKind::Recommend,
        CallKind::Generate,
        CallKind::Analyze,
        CallKind::Translate,
        CallKind::Summarize,
    ];

    /// The name used on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            CallKind::Search => "search",
            CallKind::Recommend => "recommend",
            CallKind::Generate => "generate",
            CallKind::Analyze => "analyze",
            CallKind::Translate => "translate",
            CallKind::Summarize => "summarize",
        }
    }

    /// Parse a wire name.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

impl std::fmt::Display for CallKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Generation options sent with every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallOptions {
    /// Upper bound on generated tokens.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f64,
    /// Nucleus sampling threshold.
    pub top_p: f64,
    /// Model name understood by the worker.
    pub model: String,
}

impl Default for CallOptions {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            temperature: 0.7,
            top_p: 0.9,
            model: "default".to_string(),
        }
    }
}

/// Per-call overrides merged over a gateway's default [`CallOptions`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OptionOverrides {
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub model: Option<String>,
}

impl OptionOverrides {
    /// Apply these overrides on top of `defaults`.
    pub fn merge_onto(&self, defaults: &CallOptions) -> CallOptions {
        CallOptions {
            max_tokens: self.max_tokens.unwrap_or(defaults.max_tokens),
            temperature: self.temperature.unwrap_or(defaults.temperature),
            top_p: self.top_p.unwrap_or(defaults.top_p),
            model: self
                .model
                .clone()
                .unwrap_or_else(|| defaults.model.clone()),
        }
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn top_p(mut self, top_p: f64) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// A single unit of work sent to the worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Call {
    /// Correlation id echoed back in the worker's response.
    pub id: String,
    pub kind: CallKind,
    pub prompt: String,
    /// Structured, operation-specific arguments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<CallOptions>,
}

impl Call {
    /// Serialize to a single newline-terminated line.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

// ============================================================================
// Inbound: Envelope
// ============================================================================

/// A message decoded from one line of worker stdout.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// One-time readiness signal.
    Ready,
    /// Successful completion of a call.
    Response {
        #[serde(rename = "callId")]
        call_id: String,
        /// Missing and `null` payloads both decode as `None`.
        #[serde(default)]
        payload: Option<Value>,
    },
    /// Failed completion of a call.
    Error {
        #[serde(rename = "callId")]
        call_id: String,
        message: String,
    },
}

impl Envelope {
    const TAGS: [&'static str; 3] = ["ready", "response", "error"];

    /// Decode one line of worker output.
    ///
    /// Unknown `type` tags are reported separately from malformed JSON so the
    /// reader can log them distinctly; neither ever reaches a caller.
    pub fn decode(line: &str) -> Result<Self, ProtocolError> {
        let value: Value = serde_json::from_str(line).map_err(ProtocolError::Malformed)?;

        let tag = match value.get("type") {
            Some(Value::String(tag)) => tag.clone(),
            _ => return Err(ProtocolError::MissingType),
        };

        if !Self::TAGS.contains(&tag.as_str()) {
            return Err(ProtocolError::UnknownType(tag));
        }

        serde_json::from_value(value).map_err(ProtocolError::Malformed)
    }

    /// The correlation id this envelope completes, if any.
    pub fn call_id(&self) -> Option<&str> {
        match self {
            Envelope::Ready => None,
            Envelope::Response { call_id, .. } | Envelope::Error { call_id, .. } => {
                Some(call_id.as_str())
            }
        }
    }
}
