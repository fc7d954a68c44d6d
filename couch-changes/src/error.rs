use feed_poller::{PollError, TransportError};

/// Errors raised by the `Database` and `Connection` API.
///
/// Only synchronous failures surface here. Outcomes of a `_changes` request
/// reach the caller through its notifier as a [`feed_poller::FeedError`].
#[derive(Debug, thiserror::Error)]
pub enum ChangesError {
    #[error("Polling error: {0}")]
    Poll(#[from] PollError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Invalid database name: {0}")]
    InvalidDatabase(String),
}

/// Result type for changes operations
pub type Result<T> = std::result::Result<T, ChangesError>;
