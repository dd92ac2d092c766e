//! Wire envelope types.
//!
//! Every frame on the transport is one JSON object. Outbound frames are
//! calls; inbound frames are either responses (carry `id`) or events
//! (carry `method`, no `id`). Either may be scoped to a session.

// ============================================================================
// Imports
// ============================================================================

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::identifiers::{CallId, SessionId};

// ============================================================================
// Constants
// ============================================================================

/// Broadcast announcing a new session.
pub const ATTACHED_TO_TARGET: &str = "Target.attachedToTarget";

/// Broadcast announcing a session went away.
pub const DETACHED_FROM_TARGET: &str = "Target.detachedFromTarget";

// ============================================================================
// OutboundCall
// ============================================================================

/// A call from local end to remote end.
///
/// # Format
///
/// ```json
/// {
///   "id": 7,
///   "method": "Page.navigate",
///   "params": { "url": "https://example.com" },
///   "sessionId": "A1B2"
/// }
/// ```
#[derive(Debug, Clone, Serialize)]
pub struct OutboundCall<'a> {
    /// Correlation ID, unique per connection.
    pub id: CallId,

    /// Method in `Domain.method` format.
    pub method: &'a str,

    /// Method parameters.
    pub params: &'a Value,

    /// Session the call is scoped to.
    #[serde(rename = "sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<&'a SessionId>,
}

impl<'a> OutboundCall<'a> {
    /// Serializes the call to its text frame.
    pub fn to_text(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

// ============================================================================
// Envelope
// ============================================================================

/// An inbound frame before routing.
///
/// # Format
///
/// Response:
/// ```json
/// { "id": 7, "result": { ... }, "sessionId": "A1B2" }
/// ```
///
/// Error response:
/// ```json
/// { "id": 7, "error": { "code": -32000, "message": "..." } }
/// ```
///
/// Event:
/// ```json
/// { "method": "Page.lifecycleEvent", "params": { ... }, "sessionId": "A1B2" }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Envelope {
    /// Present on responses.
    #[serde(default)]
    pub id: Option<CallId>,

    /// Present on events.
    #[serde(default)]
    pub method: Option<String>,

    /// Event parameters.
    #[serde(default)]
    pub params: Option<Value>,

    /// Response result.
    #[serde(default)]
    pub result: Option<Value>,

    /// Response error.
    #[serde(default)]
    pub error: Option<RemoteError>,

    /// Session the frame belongs to.
    #[serde(rename = "sessionId", default)]
    pub session_id: Option<SessionId>,
}

impl Envelope {
    /// Parses an inbound text frame.
    pub fn parse(text: &str) -> serde_json::Result<Self> {
        serde_json::from_str(text)
    }

    /// Returns the response outcome: the remote error if present, else the result.
    ///
    /// A response without `result` resolves to an empty object.
    pub fn into_outcome(self) -> Result<Value, RemoteError> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.result.unwrap_or_else(|| Value::Object(Default::default()))),
        }
    }

    /// Returns the event params, or `null` if absent.
    #[inline]
    pub fn take_params(&mut self) -> Value {
        self.params.take().unwrap_or(Value::Null)
    }
}

// ============================================================================
// RemoteError
// ============================================================================

/// The `error` object of a failed response.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RemoteError {
    /// Protocol error code.
    #[serde(default)]
    pub code: Option<i64>,

    /// Human readable message.
    #[serde(default)]
    pub message: String,

    /// Additional detail.
    #[serde(default)]
    pub data: Option<Value>,
}

impl RemoteError {
    /// Renders `message` followed by `data` when present.
    #[must_use]
    pub fn describe(&self) -> String {
        match &self.data {
            Some(Value::String(data)) => format!("{} {}", self.message, data),
            Some(Value::Null) | None => self.message.clone(),
            Some(other) => format!("{} {}", self.message, other),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
