//! Frame tree and navigation tracking for a page session.
//!
//! # Components
//!
//! | Module | Description |
//! |--------|-------------|
//! | `frame_manager` | Live frame tree, execution contexts, navigation entry points |
//! | `frame` | Frame nodes in a key-indexed arena |
//! | `lifecycle` | Per-navigation watcher state machine |
//! | `network` | In-flight request tracking, interception, network overrides |
//! | `interception` | Paused-request decisions and credentials |
//! | `options` | Wait conditions and timeout defaults |
//!
//! # Example
//!
//! ```ignore
//! use cdp_session::{FrameManager, NavigateOptions, WaitUntil};
//!
//! let frames = FrameManager::new(session);
//! frames.initialize().await?;
//!
//! let response = frames
//!     .navigate("https://example.com", NavigateOptions::new().with_wait_until(WaitUntil::Load))
//!     .await?;
//! ```

// ============================================================================
// Submodules
// ============================================================================

/// Frame nodes.
pub mod frame;

/// Frame tree manager.
pub mod frame_manager;

/// Request interception types.
pub mod interception;

/// Lifecycle watcher.
pub mod lifecycle;

/// Network request tracking.
pub mod network;

/// Navigation options.
pub mod options;

// ============================================================================
// Re-exports
// ============================================================================

pub use frame::{Frame, FrameKey};
pub use frame_manager::{
    EVALUATION_SCRIPT_URL, ExecutionContext, FrameEvent, FrameManager, UTILITY_WORLD_NAME, World,
};
pub use interception::{ContinueOverrides, Credentials, FulfillResponse, RequestAction};
pub use lifecycle::{LifecycleWatcher, WatcherState};
pub use network::{NetworkEvent, NetworkManager, NetworkRequest, NetworkResponse};
pub use options::{NavigateOptions, TimeoutSettings, WaitUntil};
