//! Protocol session layer.
//!
//! A [`Connection`] owns one transport and multiplexes many
//! [`CdpSession`]s over it, correlating every call with its response and
//! routing events to the right listeners.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | `core` | Connection, routing, delivery task |
//! | `session` | Per-target session |
//! | `registry` | Call ID sequence and pending-call table |
//! | `gate` | One-shot wait gate |
//! | `emitter` | Listener registry keyed by event name |
//! | `options` | Connection-wide configuration |

// ============================================================================
// Submodules
// ============================================================================

/// Connection and inbound routing.
pub mod core;

/// Listener registry.
pub mod emitter;

/// One-shot wait gate.
pub mod gate;

/// Connection-wide configuration.
pub mod options;

/// Call correlation.
pub mod registry;

/// Per-target session.
pub mod session;

// ============================================================================
// Re-exports
// ============================================================================

pub use core::Connection;
pub use emitter::{EventEmitter, Listener, NamedEvent};
pub use gate::Gate;
pub use options::{ConnectionOptions, DEFAULT_COMMAND_TIMEOUT, DEFAULT_NAVIGATION_TIMEOUT};
pub use registry::{CallRegistry, GatedCall, IdSequence, OutcomeSlot};
pub use session::CdpSession;
