//! `reqwest` implementation of [`HttpTransport`].

use async_trait::async_trait;
use feed_poller::{HttpResponse, HttpTransport, Method, PollOutcome, TransportError};
use reqwest::header::{HeaderValue, ACCEPT};
use serde_json::Value;
use tracing::trace;
use url::Url;

/// Sends feed requests with a shared `reqwest::Client`.
///
/// Relative URLs such as `/albums/_changes?feed=longpoll` are appended to the
/// base URL, keeping any path prefix it carries. Absolute URLs are sent as
/// they are. Dropping a request future aborts the connection.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: Option<Url>,
}

impl ReqwestTransport {
    /// Create a transport that resolves relative URLs against `base_url`.
    ///
    /// No request timeout is set: a long poll is expected to block, and the
    /// poller's watchdog bounds it.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| TransportError::InvalidUrl(format!("{base_url}: {e}")))?;
        Ok(Self::with_client(reqwest::Client::new(), Some(base_url)))
    }

    /// Create a transport from an existing client. Without a base URL only
    /// absolute URLs can be sent.
    pub fn with_client(client: reqwest::Client, base_url: Option<Url>) -> Self {
        Self { client, base_url }
    }

    pub fn base_url(&self) -> Option<&Url> {
        self.base_url.as_ref()
    }

    /// Resolve a feed URL to the absolute URL that will be requested.
    pub fn resolve(&self, url: &str) -> Result<Url, TransportError> {
        match Url::parse(url) {
            Ok(absolute) => Ok(absolute),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                let base = self.base_url.as_ref().ok_or_else(|| {
                    TransportError::InvalidUrl(format!("{url}: relative URL without a base"))
                })?;
                let joined = format!(
                    "{}/{}",
                    base.as_str().trim_end_matches('/'),
                    url.trim_start_matches('/')
                );
                Url::parse(&joined).map_err(|e| TransportError::InvalidUrl(format!("{joined}: {e}")))
            }
            Err(e) => Err(TransportError::InvalidUrl(format!("{url}: {e}"))),
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, method: Method, url: &str, body: Option<Value>) -> PollOutcome {
        let target = self.resolve(url)?;
        trace!(%method, url = %target, "sending request");

        let mut request = self
            .client
            .request(to_reqwest_method(method), target)
            .header(ACCEPT, HeaderValue::from_static("application/json"));
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;
        let status = response.status().as_u16();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| TransportError::Http(e.to_string()))?;

        let body = decode_body(status, &bytes)?;
        trace!(status, "response received");
        Ok(HttpResponse::new(status, body))
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}

/// Parse a response body as JSON.
///
/// An empty body decodes to `Value::Null`. A body that is not JSON is an error
/// on success statuses and is kept as a string otherwise, so an error page
/// still reaches the handler with its status.
fn decode_body(status: u16, bytes: &[u8]) -> Result<Value, TransportError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }

    match serde_json::from_slice(bytes) {
        Ok(value) => Ok(value),
        Err(e) if (200..300).contains(&status) => Err(TransportError::Decode(e.to_string())),
        Err(_) => Ok(Value::String(String::from_utf8_lossy(bytes).into_owned())),
    }
}
