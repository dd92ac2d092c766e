//! Navigation options and timeout defaults.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use cdp_session::{NavigateOptions, WaitUntil};
//!
//! let options = NavigateOptions::new()
//!     .with_wait_until(WaitUntil::Load)
//!     .with_wait_until(WaitUntil::NetworkIdle2)
//!     .with_timeout(Duration::from_secs(10));
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::connection::ConnectionOptions;
use crate::error::{Error, Result};

// ============================================================================
// WaitUntil
// ============================================================================

/// Condition a navigation waits for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WaitUntil {
    /// The `load` event fired.
    Load,
    /// The `DOMContentLoaded` event fired.
    DomContentLoaded,
    /// No network connections for 500 ms.
    NetworkIdle0,
    /// At most two network connections for 500 ms.
    NetworkIdle2,
}

impl WaitUntil {
    /// Returns the lifecycle milestone name reported by the browser.
    #[inline]
    #[must_use]
    pub const fn milestone(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "DOMContentLoaded",
            Self::NetworkIdle0 => "networkIdle",
            Self::NetworkIdle2 => "networkAlmostIdle",
        }
    }

    /// Returns the option spelling.
    #[inline]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Load => "load",
            Self::DomContentLoaded => "domcontentloaded",
            Self::NetworkIdle0 => "networkidle0",
            Self::NetworkIdle2 => "networkidle2",
        }
    }
}

impl fmt::Display for WaitUntil {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WaitUntil {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self> {
        match value {
            "load" => Ok(Self::Load),
            "domcontentloaded" => Ok(Self::DomContentLoaded),
            "networkidle0" => Ok(Self::NetworkIdle0),
            "networkidle2" => Ok(Self::NetworkIdle2),
            "networkidle" => Err(Error::invalid_argument(
                "ERROR: \"networkidle\" option is no longer supported. Use \"networkidle2\" instead",
            )),
            other => Err(Error::invalid_argument(format!(
                "Unknown value for options.waitUntil: {other}"
            ))),
        }
    }
}

// ============================================================================
// NavigateOptions
// ============================================================================

/// Options for one navigation. Unset fields fall back to defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NavigateOptions {
    /// Referrer sent with the navigation.
    pub referrer: Option<String>,

    /// Conditions that must all hold for the navigation to complete.
    pub wait_until: Vec<WaitUntil>,

    /// Navigation bound. Zero or absent uses the default.
    pub timeout: Option<Duration>,
}

impl NavigateOptions {
    /// Creates options with every field unset.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            referrer: None,
            wait_until: Vec::new(),
            timeout: None,
        }
    }

    /// Sets the referrer.
    #[inline]
    #[must_use]
    pub fn with_referrer(mut self, referrer: impl Into<String>) -> Self {
        self.referrer = Some(referrer.into());
        self
    }

    /// Adds a wait condition.
    #[inline]
    #[must_use]
    pub fn with_wait_until(mut self, condition: WaitUntil) -> Self {
        if !self.wait_until.contains(&condition) {
            self.wait_until.push(condition);
        }
        self
    }

    /// Adds wait conditions from their option spellings.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] for unknown or legacy values.
    pub fn with_wait_until_str<'a>(
        mut self,
        conditions: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self> {
        for condition in conditions {
            self = self.with_wait_until(condition.parse()?);
        }
        Ok(self)
    }

    /// Sets the navigation timeout.
    #[inline]
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Returns the milestone names to wait for, `load` when none are set.
    #[must_use]
    pub fn milestones(&self) -> Vec<&'static str> {
        if self.wait_until.is_empty() {
            return vec![WaitUntil::Load.milestone()];
        }
        self.wait_until.iter().map(|w| w.milestone()).collect()
    }
}

// ============================================================================
// TimeoutSettings
// ============================================================================

/// Overridable timeout defaults shared by the frames of one page.
///
/// Cloning shares the same settings.
#[derive(Debug, Clone)]
pub struct TimeoutSettings {
    inner: Arc<RwLock<TimeoutOverrides>>,
    command_timeout: Duration,
    navigation_timeout: Duration,
}

#[derive(Debug, Default)]
struct TimeoutOverrides {
    timeout: Option<Duration>,
    navigation_timeout: Option<Duration>,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self::new(&ConnectionOptions::default())
    }
}

impl TimeoutSettings {
    /// Creates settings falling back to the connection-wide defaults.
    #[must_use]
    pub fn new(options: &ConnectionOptions) -> Self {
        Self {
            inner: Arc::new(RwLock::new(TimeoutOverrides::default())),
            command_timeout: options.command_timeout,
            navigation_timeout: options.navigation_timeout,
        }
    }

    /// Overrides the default for every wait.
    pub fn set_default_timeout(&self, timeout: Duration) {
        self.inner.write().timeout = Some(timeout);
    }

    /// Overrides the default for navigations.
    pub fn set_default_navigation_timeout(&self, timeout: Duration) {
        self.inner.write().navigation_timeout = Some(timeout);
    }

    /// Resolves the navigation timeout.
    ///
    /// The navigation override wins, then the general override, then the
    /// connection-wide navigation timeout.
    #[must_use]
    pub fn navigation_timeout(&self) -> Duration {
        let overrides = self.inner.read();
        overrides
            .navigation_timeout
            .or(overrides.timeout)
            .unwrap_or(self.navigation_timeout)
    }

    /// Resolves the timeout for other waits.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        self.inner.read().timeout.unwrap_or(self.command_timeout)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_milestone_mapping() {
        assert_eq!(WaitUntil::DomContentLoaded.milestone(), "DOMContentLoaded");
        assert_eq!(WaitUntil::Load.milestone(), "load");
        assert_eq!(WaitUntil::NetworkIdle0.milestone(), "networkIdle");
        assert_eq!(WaitUntil::NetworkIdle2.milestone(), "networkAlmostIdle");
    }

    #[test]
    fn test_parse_wait_until() {
        assert_eq!("networkidle2".parse::<WaitUntil>().expect("valid"), WaitUntil::NetworkIdle2);

        let legacy = "networkidle".parse::<WaitUntil>().unwrap_err();
        assert!(legacy.to_string().contains("networkidle2"));

        let unknown = "interactive".parse::<WaitUntil>().unwrap_err();
        assert!(matches!(unknown, Error::InvalidArgument { .. }));
    }

    #[test]
    fn test_default_milestones() {
        assert_eq!(NavigateOptions::new().milestones(), vec!["load"]);

        let options = NavigateOptions::new()
            .with_wait_until_str(["load", "networkidle2", "load"])
            .expect("valid");
        assert_eq!(options.milestones(), vec!["load", "networkAlmostIdle"]);
    }

    #[test]
    fn test_navigation_timeout_precedence() {
        let options = ConnectionOptions::new().with_navigation_timeout(Duration::from_secs(9));
        let settings = TimeoutSettings::new(&options);
        assert_eq!(settings.navigation_timeout(), Duration::from_secs(9));

        settings.set_default_timeout(Duration::from_secs(4));
        assert_eq!(settings.navigation_timeout(), Duration::from_secs(4));
        assert_eq!(settings.timeout(), Duration::from_secs(4));

        settings.set_default_navigation_timeout(Duration::from_secs(2));
        assert_eq!(settings.navigation_timeout(), Duration::from_secs(2));
    }
}
