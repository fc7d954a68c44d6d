//! Interpretation of `_changes` responses.

use feed_poller::{FeedError, Notifier, PollOutcome, ResponseHandler};
use serde_json::Value;
use tracing::warn;

/// Statuses after which a changes feed is not polled again.
///
/// Only 401 is an authentication failure and reported as `Unauthorized`.
/// 402, 403 and 404 stop the feed as well, reported as `RequestFailed`.
pub const TERMINAL_STATUSES: [u16; 4] = [401, 402, 403, 404];

/// Response handler for CouchDB `_changes` feeds.
///
/// | Outcome                     | Notification                       | Keep polling |
/// |-----------------------------|------------------------------------|--------------|
/// | 2xx                         | `(None, body)`                     | yes          |
/// | 401                         | `(Unauthorized, body)`             | no           |
/// | 402, 403, 404               | `(RequestFailed, body)`            | no           |
/// | any other status            | `(RequestFailed, body)`            | yes          |
/// | transport failure           | `(Transport, null)`                | yes          |
#[derive(Debug, Clone, Copy, Default)]
pub struct ChangesHandler;

impl ChangesHandler {
    pub fn new() -> Self {
        Self
    }
}

impl ResponseHandler for ChangesHandler {
    fn handle(&self, outcome: &PollOutcome, notifier: &Notifier) -> bool {
        let response = match outcome {
            Ok(response) => response,
            Err(e) => {
                notifier.dispatch(Some(&FeedError::Transport(e.clone())), &Value::Null);
                return true;
            }
        };

        if response.is_success() {
            notifier.dispatch(None, &response.body);
            return true;
        }

        let error = if response.status == 401 {
            FeedError::Unauthorized {
                status: response.status,
            }
        } else {
            FeedError::RequestFailed {
                status: response.status,
            }
        };
        notifier.dispatch(Some(&error), &response.body);

        let terminal = TERMINAL_STATUSES.contains(&response.status);
        if terminal {
            warn!(status = response.status, "changes feed will not be retried");
        }
        !terminal
    }
}
