//! Connection-wide configuration.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use cdp_session::ConnectionOptions;
//!
//! let options = ConnectionOptions::new()
//!     .with_command_timeout(Duration::from_secs(10))
//!     .with_navigation_timeout(Duration::from_secs(60))
//!     .with_slow_mo(Duration::from_millis(50));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::time::Duration;

// ============================================================================
// Constants
// ============================================================================

/// Default bound for blocking protocol calls.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Default bound for navigations.
pub const DEFAULT_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// ConnectionOptions
// ============================================================================

/// Configuration shared by a connection and every session spawned from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionOptions {
    /// Bound for blocking calls made without an explicit timeout.
    pub command_timeout: Duration,

    /// Default bound for navigations.
    pub navigation_timeout: Duration,

    /// Delay applied before each inbound frame is processed.
    pub slow_mo: Duration,
}

impl Default for ConnectionOptions {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl ConnectionOptions {
    /// Creates options with default settings.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            navigation_timeout: DEFAULT_NAVIGATION_TIMEOUT,
            slow_mo: Duration::ZERO,
        }
    }
}

// ============================================================================
// Builder Methods
// ============================================================================

impl ConnectionOptions {
    /// Sets the default call timeout. Zero keeps the current value.
    #[inline]
    #[must_use]
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.command_timeout = timeout;
        }
        self
    }

    /// Sets the default navigation timeout. Zero keeps the current value.
    #[inline]
    #[must_use]
    pub fn with_navigation_timeout(mut self, timeout: Duration) -> Self {
        if !timeout.is_zero() {
            self.navigation_timeout = timeout;
        }
        self
    }

    /// Sets the inbound processing delay.
    #[inline]
    #[must_use]
    pub fn with_slow_mo(mut self, delay: Duration) -> Self {
        self.slow_mo = delay;
        self
    }

    /// Resolves a per-call timeout, falling back to the default when zero.
    #[inline]
    #[must_use]
    pub fn resolve_command_timeout(&self, timeout: Duration) -> Duration {
        if timeout.is_zero() {
            self.command_timeout
        } else {
            timeout
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ConnectionOptions::default();
        assert_eq!(options.command_timeout, Duration::from_secs(30));
        assert_eq!(options.navigation_timeout, Duration::from_secs(30));
        assert!(options.slow_mo.is_zero());
    }

    #[test]
    fn test_zero_timeout_keeps_default() {
        let options = ConnectionOptions::new()
            .with_command_timeout(Duration::ZERO)
            .with_navigation_timeout(Duration::from_secs(5));

        assert_eq!(options.command_timeout, DEFAULT_COMMAND_TIMEOUT);
        assert_eq!(options.navigation_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_resolve_command_timeout() {
        let options = ConnectionOptions::new().with_command_timeout(Duration::from_secs(3));

        assert_eq!(
            options.resolve_command_timeout(Duration::ZERO),
            Duration::from_secs(3)
        );
        assert_eq!(
            options.resolve_command_timeout(Duration::from_millis(100)),
            Duration::from_millis(100)
        );
    }
}
