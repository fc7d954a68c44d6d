//! Response interpretation.
//!
//! Whether a feed keeps polling after a response is not the poller's call.
//! A [`ResponseHandler`] classifies each outcome (authentication failure,
//! success, retryable or fatal failure), performs its own notification and
//! answers whether to continue.

use crate::notifier::Notifier;
use crate::transport::PollOutcome;

/// Classifies poll outcomes for one kind of feed.
pub trait ResponseHandler: Send + Sync {
    /// Interpret `outcome`, notify through `notifier` as appropriate, and
    /// return `true` to keep polling or `false` to stop.
    fn handle(&self, outcome: &PollOutcome, notifier: &Notifier) -> bool;
}

impl<F> ResponseHandler for F
where
    F: Fn(&PollOutcome, &Notifier) -> bool + Send + Sync,
{
    fn handle(&self, outcome: &PollOutcome, notifier: &Notifier) -> bool {
        self(outcome, notifier)
    }
}
