//! Type-safe identifiers for protocol entities.
//!
//! Newtype wrappers prevent mixing incompatible IDs at compile time.
//!
//! | Type | Origin | Wire form |
//! |------|--------|-----------|
//! | [`CallId`] | Local, shared counter per connection | number |
//! | [`SessionId`] | Remote, assigned on attach | string |
//! | [`TargetId`] | Remote | string |
//! | [`FrameId`] | Remote | string |
//! | [`LoaderId`] | Remote, changes per document | string |
//! | [`RequestId`] | Remote, network request | string |
//! | [`InterceptionId`] | Remote, paused request | string |
//! | [`ExecutionContextId`] | Remote | number |
//! | [`SubscriptionId`] | Local, process-wide | - |

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ============================================================================
// Macros
// ============================================================================

/// Declares a string-backed identifier assigned by the remote end.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates an identifier from its wire value.
            #[inline]
            #[must_use]
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            /// Returns the wire value.
            #[inline]
            #[must_use]
            pub fn as_str(&self) -> &str {
                &self.0
            }

            /// Returns `true` if the wire value is empty.
            #[inline]
            #[must_use]
            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            #[inline]
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            #[inline]
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

string_id!(
    /// Session identifier assigned by the remote end when a target is attached.
    SessionId
);

string_id!(
    /// Remote target identifier (page, worker, browser).
    TargetId
);

string_id!(
    /// Frame identifier.
    FrameId
);

string_id!(
    /// Loader identifier. Changes each time a frame starts a new document.
    LoaderId
);

string_id!(
    /// Network request identifier.
    RequestId
);

string_id!(
    /// Identifier of a request paused by `Fetch` interception.
    ///
    /// Distinct from the [`RequestId`] the `Network` domain reports.
    InterceptionId
);

// ============================================================================
// CallId
// ============================================================================

/// Identifier of one outbound protocol call.
///
/// Allocated from the connection's [`IdSequence`](crate::connection::IdSequence),
/// unique for the connection's lifetime across all of its sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallId(u64);

impl CallId {
    /// Creates a call ID from its wire value.
    #[inline]
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the wire value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for CallId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// ExecutionContextId
// ============================================================================

/// JavaScript execution context identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContextId(i64);

impl ExecutionContextId {
    /// Creates a context ID from its wire value.
    #[inline]
    #[must_use]
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Returns the wire value.
    #[inline]
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ExecutionContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// SubscriptionId
// ============================================================================

/// Global counter for subscription IDs.
static NEXT_SUBSCRIPTION_ID: AtomicU64 = AtomicU64::new(1);

/// Handle returned when registering an event listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Allocates the next process-wide subscription ID.
    #[inline]
    #[must_use]
    pub fn next() -> Self {
        Self(NEXT_SUBSCRIPTION_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the raw value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_id_roundtrip() {
        let id = FrameId::new("F1");
        assert_eq!(id.as_str(), "F1");
        assert_eq!(id.to_string(), "F1");

        let json = serde_json::to_string(&id).expect("serialize");
        assert_eq!(json, "\"F1\"");

        let back: FrameId = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back, id);
    }

    #[test]
    fn test_loader_id_empty_default() {
        assert!(LoaderId::default().is_empty());
        assert!(!LoaderId::from("L1").is_empty());
    }

    #[test]
    fn test_call_id_serializes_as_number() {
        let json = serde_json::to_string(&CallId::new(7)).expect("serialize");
        assert_eq!(json, "7");
    }

    #[test]
    fn test_subscription_ids_unique() {
        let a = SubscriptionId::next();
        let b = SubscriptionId::next();
        assert_ne!(a, b);
        assert!(b.as_u64() > a.as_u64());
    }
}
