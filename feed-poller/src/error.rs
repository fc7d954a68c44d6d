//! Error types for the feed-poller crate.

/// Errors raised synchronously by the polling engine.
///
/// These are configuration-time failures. Nothing that happens while a feed is
/// being polled surfaces as a `PollError`; asynchronous outcomes travel through
/// the [`Notifier`](crate::Notifier) instead.
#[derive(Debug, thiserror::Error)]
pub enum PollError {
    /// Invalid configuration or options provided
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A named notifier target does not respond to the requested action
    #[error("Notifier target does not respond to action '{action}'")]
    UnresolvedAction {
        /// The action name that failed to resolve
        action: String,
    },

    /// A named notifier was built without an action name
    #[error("Notifier target given without an action")]
    MissingAction,

    /// The registry has reached its configured capacity
    #[error("Registry is full (max {max_registrations} feeds)")]
    RegistryFull {
        /// Configured capacity
        max_registrations: usize,
    },

    /// The registry was shut down and no longer accepts registrations
    #[error("Registry has been shut down")]
    ShutDown,
}

/// Errors produced by a [`HttpTransport`](crate::HttpTransport).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The request could not be completed
    #[error("HTTP request failed: {0}")]
    Http(String),

    /// The response body could not be decoded as JSON
    #[error("Failed to decode response body: {0}")]
    Decode(String),

    /// The request URL could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

/// Error values handed to notifiers by response handlers.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeedError {
    /// The server rejected the session
    #[error("unauthorized (status {status})")]
    Unauthorized {
        /// HTTP status returned by the server
        status: u16,
    },

    /// The server answered with a non-success status
    #[error("feed request failed with status {status}")]
    RequestFailed {
        /// HTTP status returned by the server
        status: u16,
    },

    /// The request never produced a response
    #[error("transport failure: {0}")]
    Transport(#[from] TransportError),
}

/// Convenience type alias for Results using PollError.
pub type Result<T> = std::result::Result<T, PollError>;
