//! Core types for the feed-poller crate.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::cursor::Since;

/// Canonical URL of a change feed. Identifies one subscription.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeedKey(String);

impl FeedKey {
    /// Create a new feed key from a URL or path.
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Get the feed key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl From<String> for FeedKey {
    fn from(url: String) -> Self {
        Self(url)
    }
}

impl From<&str> for FeedKey {
    fn from(url: &str) -> Self {
        Self(url.to_string())
    }
}

impl std::borrow::Borrow<str> for FeedKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for FeedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-subscription configuration, fixed once a feed is registered.
///
/// `params` are forwarded verbatim on every poll, apart from `feed` and
/// `since` which the poller manages itself. A `since` given as a parameter is
/// taken as the initial cursor when [`since`](Self::since) is unset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PollOptions {
    /// Initial resumption cursor
    pub since: Option<Since>,
    /// Query parameters forwarded to the server, in order
    pub params: Vec<(String, String)>,
    /// Ceiling on a single outstanding poll; falls back to the registry default
    pub watchdog_timeout: Option<Duration>,
    /// Delay step before re-polling after a failed response; falls back to the
    /// registry default
    pub error_backoff: Option<Duration>,
    /// Opaque value handed back unchanged with every notification
    pub context: Option<Value>,
}

impl PollOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_since(mut self, since: impl Into<Since>) -> Self {
        self.since = Some(since.into());
        self
    }

    /// Set a pass-through query parameter, replacing an earlier value for the
    /// same name.
    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        let value = value.to_string();
        match self.params.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    pub fn with_watchdog_timeout(mut self, timeout: Duration) -> Self {
        self.watchdog_timeout = Some(timeout);
        self
    }

    pub fn with_error_backoff(mut self, step: Duration) -> Self {
        self.error_backoff = Some(step);
        self
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Look up a pass-through parameter by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(existing, _)| existing == name)
            .map(|(_, value)| value.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_feed_key() {
        let key = FeedKey::new("/db/_changes");
        assert_eq!(key.as_str(), "/db/_changes");
        assert_eq!(key.to_string(), "/db/_changes");
        assert!(!key.is_empty());
        assert!(FeedKey::from("  ").is_empty());
        assert_eq!(FeedKey::from("/a".to_string()), FeedKey::from("/a"));
    }

    #[test]
    fn test_with_param_replaces_existing_value() {
        let options = PollOptions::new()
            .with_param("include_docs", true)
            .with_param("filter", "app/by_type")
            .with_param("include_docs", false);

        assert_eq!(
            options.params,
            vec![
                ("include_docs".to_string(), "false".to_string()),
                ("filter".to_string(), "app/by_type".to_string()),
            ]
        );
        assert_eq!(options.param("filter"), Some("app/by_type"));
        assert_eq!(options.param("missing"), None);
    }

    #[test]
    fn test_options_builder() {
        let options = PollOptions::new()
            .with_since(7u64)
            .with_watchdog_timeout(Duration::from_millis(50))
            .with_context(serde_json::json!({"db": "albums"}));

        assert_eq!(options.since, Some(Since::from(7u64)));
        assert_eq!(options.watchdog_timeout, Some(Duration::from_millis(50)));
        assert_eq!(options.context, Some(serde_json::json!({"db": "albums"})));
        assert!(options.error_backoff.is_none());
    }
}
