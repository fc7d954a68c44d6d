//! Resumption cursor and request URL construction.
//!
//! A [`PollCursor`] is owned by exactly one poller. It carries the last `since`
//! token the feed handed back together with the caller's pass-through
//! parameters, and renders the URL of the next poll from them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::form_urlencoded;

use crate::types::{FeedKey, PollOptions};

/// Query parameter selecting the feed mode.
pub const FEED_PARAM: &str = "feed";
/// Feed mode the poller always requests.
pub const LONG_POLL: &str = "longpoll";
/// Query parameter carrying the resumption cursor.
pub const SINCE_PARAM: &str = "since";
/// Response body field holding the next cursor.
pub const LAST_SEQ_FIELD: &str = "last_seq";

/// Opaque resumption token of a change feed.
///
/// Stores render sequence values either as integers or as strings, so the
/// token keeps the textual form it is sent back in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Since(String);

impl Since {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Read a token from a `last_seq` value. Absent, null, zero and empty
    /// values carry no position and yield `None`.
    pub fn from_last_seq(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => {
                let text = number.to_string();
                (text != "0").then_some(Self(text))
            }
            Value::String(text) if !text.is_empty() => Some(Self(text.clone())),
            _ => None,
        }
    }
}

impl From<u64> for Since {
    fn from(seq: u64) -> Self {
        Self(seq.to_string())
    }
}

impl From<&str> for Since {
    fn from(token: &str) -> Self {
        Self(token.to_string())
    }
}

impl From<String> for Since {
    fn from(token: String) -> Self {
        Self(token)
    }
}

impl std::fmt::Display for Since {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Last seen position of a feed plus the parameters forwarded with each poll.
#[derive(Debug, Clone, PartialEq)]
pub struct PollCursor {
    since: Option<Since>,
    params: Vec<(String, String)>,
}

impl PollCursor {
    /// Build the initial cursor from a feed's options.
    ///
    /// Caller-supplied `feed` parameters are dropped; a `since` parameter seeds
    /// the cursor unless the options carry an explicit one.
    pub fn new(options: &PollOptions) -> Self {
        let mut since = options.since.clone();
        let mut params = Vec::with_capacity(options.params.len());

        for (name, value) in &options.params {
            match name.as_str() {
                FEED_PARAM => {}
                SINCE_PARAM => {
                    if since.is_none() && !value.is_empty() {
                        since = Some(Since::new(value.clone()));
                    }
                }
                _ => params.push((name.clone(), value.clone())),
            }
        }

        Self { since, params }
    }

    pub fn since(&self) -> Option<&Since> {
        self.since.as_ref()
    }

    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }

    /// Move the cursor to the `last_seq` carried by a response body.
    ///
    /// Returns `true` if the position changed.
    pub fn advance(&mut self, body: &Value) -> bool {
        let Some(next) = body.get(LAST_SEQ_FIELD).and_then(Since::from_last_seq) else {
            return false;
        };

        if self.since.as_ref() == Some(&next) {
            return false;
        }

        self.since = Some(next);
        true
    }

    /// Encode the query string of the next poll.
    pub fn query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        self.append_to(&mut query);
        query.finish()
    }

    /// Full URL of the next poll for `key`.
    ///
    /// A query already present on the key is kept, except for its `feed`
    /// flag, and its `since` when the cursor has a position of its own.
    pub fn request_url(&self, key: &FeedKey) -> String {
        let (path, existing) = match key.as_str().split_once('?') {
            Some((path, existing)) => (path, existing),
            None => (key.as_str(), ""),
        };

        let mut query = form_urlencoded::Serializer::new(String::new());
        for (name, value) in form_urlencoded::parse(existing.as_bytes()) {
            let managed = name == FEED_PARAM || (name == SINCE_PARAM && self.since.is_some());
            if !managed {
                query.append_pair(&name, &value);
            }
        }
        self.append_to(&mut query);

        format!("{}?{}", path, query.finish())
    }

    fn append_to(&self, query: &mut form_urlencoded::Serializer<'_, String>) {
        for (name, value) in &self.params {
            query.append_pair(name, value);
        }
        query.append_pair(FEED_PARAM, LONG_POLL);
        if let Some(since) = &self.since {
            query.append_pair(SINCE_PARAM, since.as_str());
        }
    }
}
