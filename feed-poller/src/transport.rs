//! HTTP transport abstraction.
//!
//! The poller only needs to issue a request and await its JSON response, so
//! the HTTP client is hidden behind [`HttpTransport`]. Cancellation is
//! expressed by dropping the returned future: an implementation must abort
//! the underlying request when that happens and must tolerate being dropped
//! after it has already completed.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::TransportError;

/// HTTP verbs used against the document store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed HTTP exchange with its body parsed as JSON.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    /// HTTP status code
    pub status: u16,
    /// Parsed body; `Value::Null` when the body was empty
    pub body: Value,
}

impl HttpResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    /// Whether the status is in the 2xx range.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Result of one poll as seen by a response handler.
pub type PollOutcome = std::result::Result<HttpResponse, TransportError>;

/// Sends requests to the document store.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Send a request and wait for its response.
    ///
    /// Dropping the returned future cancels the request.
    async fn send(&self, method: Method, url: &str, body: Option<Value>) -> PollOutcome;
}
