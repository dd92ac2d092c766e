//! Error types for the DevTools session client.
//!
//! This module defines all error types used throughout the crate.
//!
//! # Usage
//!
//! All fallible operations return [`Result<T>`] which uses [`Error`]:
//!
//! ```ignore
//! use cdp_session::{NavigateOptions, Result};
//!
//! async fn example(frames: &FrameManager, frame_id: &FrameId) -> Result<()> {
//!     frames
//!         .navigate_frame(frame_id, "https://example.com", NavigateOptions::new())
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! # Error Categories
//!
//! | Category | Variants |
//! |----------|----------|
//! | Configuration | [`Error::Config`], [`Error::InvalidArgument`] |
//! | Connection | [`Error::Connection`], [`Error::ConnectionClosed`], [`Error::SessionClosed`], [`Error::TargetClosed`] |
//! | Protocol | [`Error::Protocol`], [`Error::SessionNotFound`] |
//! | Navigation | [`Error::Navigation`], [`Error::Terminated`], [`Error::FrameNotFound`] |
//! | Network | [`Error::Interception`] |
//! | Timing | [`Error::Timeout`], [`Error::RequestTimeout`] |
//! | External | [`Error::Io`], [`Error::Json`], [`Error::WebSocket`] |

// ============================================================================
// Imports
// ============================================================================

use std::io::Error as IoError;
use std::result::Result as StdResult;

use thiserror::Error;
use tokio_tungstenite::tungstenite::Error as WsError;

use crate::identifiers::{CallId, FrameId, SessionId};

// ============================================================================
// Result Alias
// ============================================================================

/// Result type alias using crate [`enum@Error`].
///
/// All fallible operations in this crate return this type.
pub type Result<T> = StdResult<T, Error>;

// ============================================================================
// Error Enum
// ============================================================================

/// Main error type for the crate.
///
/// Each variant includes relevant context for debugging.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration Errors
    // ========================================================================
    /// Configuration error.
    ///
    /// Returned when connection configuration is invalid.
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },

    /// Invalid argument supplied by the caller.
    ///
    /// Returned for illegal wait conditions and similar misuse.
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument.
        message: String,
    },

    // ========================================================================
    // Connection Errors
    // ========================================================================
    /// Transport could not be established or failed while sending.
    #[error("Connection failed: {message}")]
    Connection {
        /// Description of the connection error.
        message: String,
    },

    /// Send attempted after the connection was disposed.
    #[error("Connection closed")]
    ConnectionClosed,

    /// Send attempted after the session was torn down.
    #[error("Protocol error ({method}): Session closed. Most likely the {target_type} has been closed.")]
    SessionClosed {
        /// Method that could not be sent.
        method: String,
        /// Target type of the closed session.
        target_type: String,
    },

    /// A pending call was failed because its connection or session closed.
    #[error("Protocol error ({method}): Target closed.")]
    TargetClosed {
        /// Method of the call that was pending.
        method: String,
    },

    // ========================================================================
    // Protocol Errors
    // ========================================================================
    /// The remote end answered a call with an `error` field.
    #[error("Protocol error ({method}): {message}")]
    Protocol {
        /// Method of the failed call.
        method: String,
        /// Message reported by the remote end.
        message: String,
    },

    /// Session not registered on the connection.
    #[error("Session not found: {session_id}")]
    SessionNotFound {
        /// The missing session ID.
        session_id: SessionId,
    },

    // ========================================================================
    // Navigation Errors
    // ========================================================================
    /// The navigate command reported an error text.
    #[error("Navigation failed: {message}")]
    Navigation {
        /// Error text and url.
        message: String,
    },

    /// Navigation ended because the frame detached or the session disconnected.
    #[error("Navigation terminated: {reason}")]
    Terminated {
        /// Why the navigation was terminated.
        reason: String,
    },

    /// Frame not found.
    #[error("Frame not found: {frame_id}")]
    FrameNotFound {
        /// The missing frame ID.
        frame_id: FrameId,
    },

    // ========================================================================
    // Network Errors
    // ========================================================================
    /// A paused request cannot be resolved.
    #[error("Request interception error: {message}")]
    Interception {
        /// What went wrong.
        message: String,
    },

    // ========================================================================
    // Timing Errors
    // ========================================================================
    /// Operation timeout.
    #[error("Timeout after {timeout_ms}ms: {operation}")]
    Timeout {
        /// Description of the operation that timed out.
        operation: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    /// Protocol call timeout.
    #[error("Request {call_id} ({method}) timed out after {timeout_ms}ms")]
    RequestTimeout {
        /// The call ID that timed out.
        call_id: CallId,
        /// Method of the call.
        method: String,
        /// Milliseconds waited before timeout.
        timeout_ms: u64,
    },

    // ========================================================================
    // External Errors
    // ========================================================================
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] IoError),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// WebSocket error.
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] WsError),
}

// ============================================================================
// Error Constructors
// ============================================================================

impl Error {
    /// Creates a configuration error.
    #[inline]
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    #[inline]
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Creates a connection error.
    #[inline]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// Creates a session closed error.
    #[inline]
    pub fn session_closed(method: impl Into<String>, target_type: impl Into<String>) -> Self {
        Self::SessionClosed {
            method: method.into(),
            target_type: target_type.into(),
        }
    }

    /// Creates a target closed error.
    #[inline]
    pub fn target_closed(method: impl Into<String>) -> Self {
        Self::TargetClosed {
            method: method.into(),
        }
    }

    /// Creates a protocol error.
    #[inline]
    pub fn protocol(method: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            method: method.into(),
            message: message.into(),
        }
    }

    /// Creates a session not found error.
    #[inline]
    pub fn session_not_found(session_id: SessionId) -> Self {
        Self::SessionNotFound { session_id }
    }

    /// Creates a navigation error.
    #[inline]
    pub fn navigation(message: impl Into<String>) -> Self {
        Self::Navigation {
            message: message.into(),
        }
    }

    /// Creates a termination error.
    #[inline]
    pub fn terminated(reason: impl Into<String>) -> Self {
        Self::Terminated {
            reason: reason.into(),
        }
    }

    /// Creates a frame not found error.
    #[inline]
    pub fn frame_not_found(frame_id: FrameId) -> Self {
        Self::FrameNotFound { frame_id }
    }

    /// Creates an interception error.
    #[inline]
    pub fn interception(message: impl Into<String>) -> Self {
        Self::Interception {
            message: message.into(),
        }
    }

    /// Creates a timeout error.
    #[inline]
    pub fn timeout(operation: impl Into<String>, timeout_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms,
        }
    }

    /// Creates a navigation timeout error.
    #[inline]
    pub fn navigation_timeout(url: &str, timeout_ms: u64) -> Self {
        Self::timeout(format!("Navigation timeout of {timeout_ms} ms exceeded at {url}"), timeout_ms)
    }

    /// Creates a request timeout error.
    #[inline]
    pub fn request_timeout(call_id: CallId, method: impl Into<String>, timeout_ms: u64) -> Self {
        Self::RequestTimeout {
            call_id,
            method: method.into(),
            timeout_ms,
        }
    }
}

// ============================================================================
// Error Predicates
// ============================================================================

impl Error {
    /// Returns `true` if this is a timeout error.
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::RequestTimeout { .. })
    }

    /// Returns `true` if this error comes from a closed or failed channel.
    #[inline]
    #[must_use]
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            Self::Connection { .. }
                | Self::ConnectionClosed
                | Self::SessionClosed { .. }
                | Self::TargetClosed { .. }
                | Self::WebSocket(_)
        )
    }

    /// Returns `true` if a navigation was terminated.
    #[inline]
    #[must_use]
    pub fn is_termination(&self) -> bool {
        matches!(self, Self::Terminated { .. })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::ErrorKind;

    #[test]
    fn test_error_display() {
        let err = Error::connection("failed to connect");
        assert_eq!(err.to_string(), "Connection failed: failed to connect");
    }

    #[test]
    fn test_protocol_error_display() {
        let err = Error::protocol("Page.navigate", "Cannot navigate to invalid URL");
        assert_eq!(
            err.to_string(),
            "Protocol error (Page.navigate): Cannot navigate to invalid URL"
        );
    }

    #[test]
    fn test_target_closed_display() {
        let err = Error::target_closed("Runtime.enable");
        assert_eq!(err.to_string(), "Protocol error (Runtime.enable): Target closed.");
    }

    #[test]
    fn test_is_timeout() {
        let call_timeout = Error::request_timeout(CallId::new(4), "Page.navigate", 100);
        let nav_timeout = Error::navigation_timeout("https://example.com", 500);
        let other_err = Error::connection("test");

        assert!(call_timeout.is_timeout());
        assert!(nav_timeout.is_timeout());
        assert!(!other_err.is_timeout());
        assert!(nav_timeout.to_string().contains("https://example.com"));
    }

    #[test]
    fn test_is_connection_error() {
        assert!(Error::connection("test").is_connection_error());
        assert!(Error::ConnectionClosed.is_connection_error());
        assert!(Error::session_closed("Page.enable", "page").is_connection_error());
        assert!(Error::target_closed("Page.enable").is_connection_error());
        assert!(!Error::config("test").is_connection_error());
    }

    #[test]
    fn test_is_termination() {
        let err = Error::terminated("Navigating frame was detached");
        assert!(err.is_termination());
        assert!(!err.is_timeout());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_from_json_error() {
        let json_err = serde_json::from_str::<String>("invalid").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Json(_)));
    }
}
