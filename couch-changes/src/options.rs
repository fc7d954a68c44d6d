//! Options for `_changes` requests.

use std::time::Duration;

use feed_poller::{PollOptions, Since};
use serde_json::Value;

/// How a `_changes` request is made.
///
/// By default a single request is issued and its result delivered once. With
/// [`long_poll`](Self::long_poll) the feed is kept open through the shared
/// poll registry until `stop_changes` is called.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangesOptions {
    /// Keep the feed open with a long poll
    pub long_poll: bool,
    /// Watchdog timeout for each long poll; registry default when unset
    pub poll_interval: Option<Duration>,
    /// Feed parameters such as `include_docs` or `filter`
    pub params: Vec<(String, String)>,
    /// Opaque value handed back with every notification
    pub context: Option<Value>,
}

impl ChangesOptions {
    /// Options for a single request.
    pub fn once() -> Self {
        Self::default()
    }

    /// Options for a long-polled feed.
    pub fn long_poll() -> Self {
        Self {
            long_poll: true,
            ..Self::default()
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set a feed parameter, replacing an earlier value for the same name.
    pub fn with_param(mut self, name: impl Into<String>, value: impl ToString) -> Self {
        let name = name.into();
        let value = value.to_string();
        match self.params.iter_mut().find(|(existing, _)| *existing == name) {
            Some(slot) => slot.1 = value,
            None => self.params.push((name, value)),
        }
        self
    }

    /// Start the feed after the given sequence.
    pub fn with_since(self, since: impl Into<Since>) -> Self {
        self.with_param("since", since.into())
    }

    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Poll options for registering this feed as a long poll.
    pub fn poll_options(&self) -> PollOptions {
        let mut options = self
            .params
            .iter()
            .fold(PollOptions::new(), |options, (name, value)| {
                options.with_param(name.as_str(), value)
            });
        options.watchdog_timeout = self.poll_interval;
        options.context = self.context.clone();
        options
    }

    /// Query string for a single request; empty when there are no parameters.
    pub fn query(&self) -> String {
        url::form_urlencoded::Serializer::new(String::new())
            .extend_pairs(self.params.iter())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_to_single_request() {
        let options = ChangesOptions::default();
        assert!(!options.long_poll);
        assert_eq!(options, ChangesOptions::once());
        assert_eq!(options.query(), "");
    }

    #[test]
    fn test_query_keeps_parameter_order() {
        let options = ChangesOptions::once()
            .with_param("include_docs", true)
            .with_since(42u64)
            .with_param("filter", "app/by type");

        assert_eq!(options.query(), "include_docs=true&since=42&filter=app%2Fby+type");
    }

    #[test]
    fn test_poll_options() {
        let options = ChangesOptions::long_poll()
            .with_poll_interval(Duration::from_secs(10))
            .with_param("include_docs", true)
            .with_since("12-abc")
            .with_context(json!("albums"));

        let poll = options.poll_options();
        assert_eq!(poll.watchdog_timeout, Some(Duration::from_secs(10)));
        assert_eq!(poll.param("include_docs"), Some("true"));
        assert_eq!(poll.param("since"), Some("12-abc"));
        assert_eq!(poll.context, Some(json!("albums")));
        assert!(poll.since.is_none(), "cursor lifts `since` from params");
    }
}
