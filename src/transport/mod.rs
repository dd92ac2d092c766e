//! Text frame transport.
//!
//! The transport moves raw text frames in both directions and owns no
//! protocol semantics. Outbound frames go through [`Transport::send`];
//! inbound frames arrive on an unbounded channel drained by the
//! connection's delivery task.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   send(text)   ┌─────────────┐     WebSocket     ┌─────────┐
//! │  Connection  │───────────────►│  Transport  │◄─────────────────►│ Browser │
//! │              │◄───────────────│  I/O task   │                   │         │
//! └──────────────┘  mpsc<String>  └─────────────┘                   └─────────┘
//! ```
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `websocket` | `tokio-tungstenite` client transport |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;

use crate::error::Result;

// ============================================================================
// Submodules
// ============================================================================

/// WebSocket client transport.
pub mod websocket;

// ============================================================================
// Re-exports
// ============================================================================

pub use websocket::WebSocketTransport;

// ============================================================================
// Transport
// ============================================================================

/// Outbound half of a duplex text transport.
///
/// Implementations must not block: `send` queues the frame and returns.
pub trait Transport: Send + Sync + fmt::Debug + 'static {
    /// Queues one text frame for sending.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConnectionClosed`](crate::Error::ConnectionClosed)
    /// if the transport has shut down.
    fn send(&self, text: String) -> Result<()>;

    /// Closes the transport. Safe to call more than once.
    fn close(&self);
}
