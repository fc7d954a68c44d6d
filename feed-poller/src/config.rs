//! Configuration types for the feed-poller crate
//!
//! [`RegistryConfig`] holds the defaults a [`PollRegistry`](crate::PollRegistry)
//! applies to every feed whose [`PollOptions`](crate::PollOptions) leave a
//! setting unspecified.

use std::time::Duration;

use crate::error::{PollError, Result};

/// Watchdog ceiling applied when neither the options nor the registry set one.
pub const DEFAULT_WATCHDOG_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the PollRegistry
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    /// Watchdog timeout for feeds that do not set their own
    /// Default: 30 seconds
    pub default_watchdog_timeout: Duration,

    /// Maximum number of feeds registered at once
    /// Default: 1000
    pub max_registrations: usize,

    /// Delay step applied before re-polling after a failed response the
    /// handler chose to continue on. `None` re-polls immediately.
    /// Default: None
    pub error_backoff: Option<Duration>,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            default_watchdog_timeout: DEFAULT_WATCHDOG_TIMEOUT,
            max_registrations: 1000,
            error_backoff: None,
        }
    }
}

impl RegistryConfig {
    /// Create a new RegistryConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a RegistryConfig that throttles re-polls against a failing server
    pub fn with_throttled_errors() -> Self {
        Self {
            error_backoff: Some(Duration::from_secs(1)),
            ..Default::default()
        }
    }

    /// Create a RegistryConfig for a small number of feeds
    pub fn resource_efficient() -> Self {
        Self {
            max_registrations: 16,
            ..Default::default()
        }
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.default_watchdog_timeout == Duration::ZERO {
            return Err(PollError::Configuration(
                "Default watchdog timeout must be greater than 0".to_string(),
            ));
        }

        if self.max_registrations == 0 {
            return Err(PollError::Configuration(
                "Max registrations must be greater than 0".to_string(),
            ));
        }

        if self.error_backoff == Some(Duration::ZERO) {
            return Err(PollError::Configuration(
                "Error backoff must be greater than 0 when set".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.default_watchdog_timeout = timeout;
        self
    }

    pub fn with_max_registrations(mut self, max: usize) -> Self {
        self.max_registrations = max;
        self
    }

    pub fn with_error_backoff(mut self, step: Duration) -> Self {
        self.error_backoff = Some(step);
        self
    }
}
