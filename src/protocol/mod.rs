//! DevTools protocol message types.
//!
//! This module defines the JSON frames exchanged over the transport.
//!
//! # Protocol Overview
//!
//! | Message Type | Direction | Purpose |
//! |--------------|-----------|---------|
//! | Call | Local → Remote | `{id, method, params, sessionId?}` |
//! | Response | Remote → Local | `{id, result \| error, sessionId?}` |
//! | Event | Remote → Local | `{method, params, sessionId?}` |
//!
//! # Method Naming
//!
//! Methods follow `Domain.methodName` format:
//!
//! - `Page.navigate`
//! - `Target.attachToTarget`
//! - `Network.requestWillBeSent`
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `command` | Typed commands by domain |
//! | `envelope` | Outbound call and inbound envelope |
//! | `event` | Decoded events and their payloads |

// ============================================================================
// Submodules
// ============================================================================

/// Command definitions organized by domain.
pub mod command;

/// Outbound and inbound envelopes.
pub mod envelope;

/// Event message types.
pub mod event;

// ============================================================================
// Re-exports
// ============================================================================

pub use command::{
    AuthChallengeResponse, AuthResponse, Command, ErrorReason, FetchCommand, HeaderEntry,
    NetworkCommand, PageCommand, RequestPattern, RuntimeCommand, TargetCommand,
};
pub use envelope::{ATTACHED_TO_TARGET, DETACHED_FROM_TARGET, Envelope, OutboundCall, RemoteError};
pub use event::{
    AttachedToTarget, AuthChallenge, AuthRequired, DetachedFromTarget, ExecutionContextAuxData, ExecutionContextDescription,
    FrameAttached, FramePayload, FrameTreePayload, LifecycleEvent, LoadingFailed,
    NavigatedWithinDocument, ProtocolEvent, RequestPaused, RequestPayload, RequestWillBeSent,
    ResponsePayload,
    ResponseReceived, TargetInfo,
};
