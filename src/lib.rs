//! CDP Session - Multiplexed DevTools protocol client.
//!
//! This library speaks the Chrome DevTools protocol over one WebSocket and
//! multiplexes many target sessions across it, with frame-tree tracking and
//! navigation waiting on top.
//!
//! # Architecture
//!
//! Inbound frames flow through one delivery task, in arrival order:
//!
//! ```text
//! Transport ─► Connection ─► CdpSession ─► FrameManager ─► LifecycleWatcher
//! ```
//!
//! Key design principles:
//!
//! - One [`Connection`] per transport, one shared call ID space across all sessions
//! - Every call is correlated by ID and bounded by a timeout; timed-out calls are purged
//! - Events are decoded once into [`ProtocolEvent`] and routed by method name
//! - Frames live in an arena; watchers track stable [`FrameKey`]s
//!
//! # Quick Start
//!
//! ```no_run
//! use cdp_session::{Connection, ConnectionOptions, FrameManager, NavigateOptions, Result, TargetId};
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let connection =
//!         Connection::connect("ws://127.0.0.1:9222/devtools/browser/id", ConnectionOptions::new()).await?;
//!
//!     let session = connection.create_session(&TargetId::new("page-target-id")).await?;
//!     let frames = FrameManager::new(session);
//!     frames.initialize().await?;
//!
//!     let response = frames.navigate("https://example.com", NavigateOptions::new()).await?;
//!     println!("Status: {:?}", response.map(|r| r.status));
//!
//!     connection.dispose();
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`connection`] | [`Connection`], [`CdpSession`], call correlation |
//! | [`page`] | [`FrameManager`], [`LifecycleWatcher`], network tracking and interception |
//! | [`error`] | Error types and [`Result`] alias |
//! | [`identifiers`] | Type-safe ID wrappers |
//! | [`protocol`] | Wire envelopes, typed commands and events |
//! | [`transport`] | WebSocket transport |

// ============================================================================
// Modules
// ============================================================================

/// Connection and session layer.
///
/// - [`Connection`] - Owns the transport, routes inbound frames
/// - [`CdpSession`] - Per-target channel
pub mod connection;

/// Error types and result aliases.
///
/// All fallible operations return [`Result<T>`] which uses [`Error`].
pub mod error;

/// Type-safe identifiers for protocol entities.
///
/// Newtype wrappers prevent mixing incompatible IDs at compile time.
pub mod identifiers;

/// Frame tree and navigation tracking.
pub mod page;

/// DevTools protocol message types.
pub mod protocol;

/// WebSocket transport layer.
pub mod transport;

#[cfg(test)]
mod testing;

// ============================================================================
// Re-exports
// ============================================================================

// Connection types
pub use connection::{CdpSession, Connection, ConnectionOptions, Gate};

// Page types
pub use page::{
    ContinueOverrides, Credentials, ExecutionContext, Frame, FrameEvent, FrameKey, FrameManager,
    FulfillResponse, LifecycleWatcher, NavigateOptions, NetworkManager, NetworkRequest,
    NetworkResponse, RequestAction, TimeoutSettings, WaitUntil, WatcherState,
};

// Protocol types
pub use protocol::{Command, ErrorReason, ProtocolEvent};

// Transport types
pub use transport::{Transport, WebSocketTransport};

// Error types
pub use error::{Error, Result};

// Identifier types
pub use identifiers::{
    CallId, ExecutionContextId, FrameId, InterceptionId, LoaderId, RequestId, SessionId,
    SubscriptionId, TargetId,
};
