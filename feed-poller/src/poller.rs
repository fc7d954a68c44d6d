//! Long-poll state machine for a single feed.
//!
//! A [`Poller`] keeps one subscription to one feed alive. Each cycle it issues
//! a single request and arms a watchdog; whichever completes first drives the
//! next transition and the other is dropped, which cancels it. A response is
//! handed to the feed's [`ResponseHandler`], which decides whether polling
//! continues. On continue the cursor is advanced from the response body and
//! the next request goes out immediately.
//!
//! Every `start` opens a new epoch. A background task only touches poller
//! state while its epoch is current, so completions racing with `stop` are
//! discarded. The epoch check and the handler call happen under a reentrant
//! gate that `stop` also takes: once `stop` returns, no handler is running
//! for the old epoch and none will start.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, ReentrantMutex};
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, trace, warn};

use crate::config::RegistryConfig;
use crate::cursor::{PollCursor, Since};
use crate::error::{PollError, Result};
use crate::handler::ResponseHandler;
use crate::notifier::Notifier;
use crate::transport::{HttpTransport, Method, PollOutcome};
use crate::types::{FeedKey, PollOptions};

/// Lifecycle state of a poller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollerState {
    /// Constructed, never started
    Idle,
    /// One request in flight with its watchdog armed
    AwaitingResponse,
    /// No request, no timer
    Stopped,
}

impl std::fmt::Display for PollerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollerState::Idle => write!(f, "idle"),
            PollerState::AwaitingResponse => write!(f, "awaiting-response"),
            PollerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Mutable state guarded by the poller's lock.
struct Run {
    state: PollerState,
    running: bool,
    epoch: u64,
    cursor: PollCursor,
    task: Option<JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    started_at: Option<DateTime<Utc>>,
}

/// State shared between a poller and its background task.
struct Shared {
    key: FeedKey,
    transport: Arc<dyn HttpTransport>,
    handler: Arc<dyn ResponseHandler>,
    notifier: Notifier,
    watchdog_timeout: Duration,
    error_backoff: Option<Duration>,
    run: Mutex<Run>,
    /// Held while a response is checked and handled, and by `stop`.
    /// Reentrant so a handler may stop its own feed.
    gate: ReentrantMutex<()>,
    requests_issued: AtomicU64,
    responses_handled: AtomicU64,
    watchdog_expirations: AtomicU64,
}

impl Shared {
    fn is_current(&self, epoch: u64) -> bool {
        let run = self.run.lock();
        run.running && run.epoch == epoch
    }

    /// Enter a new cycle and return the URL to request, or `None` if this
    /// epoch has been superseded.
    fn begin_cycle(&self, epoch: u64) -> Option<String> {
        let mut run = self.run.lock();
        if !run.running || run.epoch != epoch {
            return None;
        }
        run.state = PollerState::AwaitingResponse;
        self.requests_issued.fetch_add(1, Ordering::Relaxed);
        Some(run.cursor.request_url(&self.key))
    }

    /// Apply the handler's decision. Returns whether the loop goes on.
    fn finish_cycle(&self, epoch: u64, keep_polling: bool, outcome: &PollOutcome) -> bool {
        let mut run = self.run.lock();
        if !run.running || run.epoch != epoch {
            trace!(feed = %self.key, "poller stopped while handling response");
            return false;
        }

        if !keep_polling {
            run.running = false;
            run.state = PollerState::Stopped;
            run.shutdown_tx = None;
            info!(feed = %self.key, "response handler stopped polling");
            return false;
        }

        if let Ok(response) = outcome {
            if response.is_success() && run.cursor.advance(&response.body) {
                debug!(feed = %self.key, since = ?run.cursor.since(), "cursor advanced");
            }
        }

        true
    }

    /// Delay before the next poll, growing with consecutive failures and
    /// capped at the watchdog timeout.
    fn backoff_after(&self, outcome: &PollOutcome, consecutive_failures: &mut u32) -> Option<Duration> {
        let failed = !matches!(outcome, Ok(response) if response.is_success());
        if !failed {
            *consecutive_failures = 0;
            return None;
        }

        *consecutive_failures = consecutive_failures.saturating_add(1);
        let step = self.error_backoff?;
        Some(step.saturating_mul(*consecutive_failures).min(self.watchdog_timeout))
    }
}

/// Owns exactly one long-poll subscription to one feed.
pub struct Poller {
    shared: Arc<Shared>,
    runtime: Handle,
}

impl Poller {
    /// Create an idle poller.
    ///
    /// # Errors
    ///
    /// Returns `PollError::Configuration` for an empty feed key or a zero
    /// watchdog timeout.
    pub fn new(
        key: FeedKey,
        handler: Arc<dyn ResponseHandler>,
        notifier: Notifier,
        options: PollOptions,
        transport: Arc<dyn HttpTransport>,
        defaults: &RegistryConfig,
        runtime: Handle,
    ) -> Result<Self> {
        if key.is_empty() {
            return Err(PollError::Configuration(
                "Feed key must not be empty".to_string(),
            ));
        }

        let watchdog_timeout = options
            .watchdog_timeout
            .unwrap_or(defaults.default_watchdog_timeout);
        if watchdog_timeout == Duration::ZERO {
            return Err(PollError::Configuration(format!(
                "Watchdog timeout for {key} must be greater than 0"
            )));
        }

        let error_backoff = options
            .error_backoff
            .or(defaults.error_backoff)
            .filter(|step| !step.is_zero());

        let notifier = match options.context.clone() {
            Some(context) => notifier.with_context(context),
            None => notifier,
        };

        let run = Run {
            state: PollerState::Idle,
            running: false,
            epoch: 0,
            cursor: PollCursor::new(&options),
            task: None,
            shutdown_tx: None,
            started_at: None,
        };

        Ok(Self {
            shared: Arc::new(Shared {
                key,
                transport,
                handler,
                notifier,
                watchdog_timeout,
                error_backoff,
                run: Mutex::new(run),
                gate: ReentrantMutex::new(()),
                requests_issued: AtomicU64::new(0),
                responses_handled: AtomicU64::new(0),
                watchdog_expirations: AtomicU64::new(0),
            }),
            runtime,
        })
    }

    /// Begin polling. Returns `false` if the poller was already running.
    pub fn start(&self) -> bool {
        let mut run = self.shared.run.lock();
        if run.running {
            return false;
        }

        if let Some(previous) = run.task.take() {
            previous.abort();
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        run.running = true;
        run.epoch += 1;
        run.state = PollerState::AwaitingResponse;
        run.shutdown_tx = Some(shutdown_tx);
        run.started_at = Some(Utc::now());

        let epoch = run.epoch;
        let shared = Arc::clone(&self.shared);
        run.task = Some(self.runtime.spawn(poll_loop(shared, epoch, shutdown_rx)));

        info!(
            feed = %self.shared.key,
            since = ?run.cursor.since(),
            watchdog = ?self.shared.watchdog_timeout,
            "started polling"
        );
        true
    }

    /// Stop polling, cancelling any outstanding request and watchdog.
    ///
    /// Safe to call in any state. Returns `true` if the poller was running.
    ///
    /// Blocks while a response for this poller is being handled on another
    /// thread, so no notification from the stopped epoch follows the return.
    pub fn stop(&self) -> bool {
        let _gate = self.shared.gate.lock();
        let mut run = self.shared.run.lock();
        let was_running = run.running;

        run.running = false;
        run.epoch += 1;
        run.state = PollerState::Stopped;

        if let Some(shutdown_tx) = run.shutdown_tx.take() {
            let _ = shutdown_tx.send(());
        }
        if let Some(task) = run.task.take() {
            task.abort();
        }

        if was_running {
            info!(feed = %self.shared.key, "stopped polling");
        }
        was_running
    }

    pub fn key(&self) -> &FeedKey {
        &self.shared.key
    }

    pub fn state(&self) -> PollerState {
        self.shared.run.lock().state
    }

    pub fn is_running(&self) -> bool {
        self.shared.run.lock().running
    }

    /// Current resumption cursor.
    pub fn since(&self) -> Option<Since> {
        self.shared.run.lock().cursor.since().cloned()
    }

    pub fn watchdog_timeout(&self) -> Duration {
        self.shared.watchdog_timeout
    }

    pub fn stats(&self) -> PollerStats {
        let run = self.shared.run.lock();
        PollerStats {
            key: self.shared.key.clone(),
            state: run.state,
            since: run.cursor.since().cloned(),
            requests_issued: self.shared.requests_issued.load(Ordering::Relaxed),
            responses_handled: self.shared.responses_handled.load(Ordering::Relaxed),
            watchdog_expirations: self.shared.watchdog_expirations.load(Ordering::Relaxed),
            started_at: run.started_at,
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        let mut run = self.shared.run.lock();
        run.running = false;
        run.epoch += 1;
        if let Some(task) = run.task.take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("key", &self.shared.key)
            .field("state", &self.state())
            .field("watchdog_timeout", &self.shared.watchdog_timeout)
            .finish()
    }
}

/// Background task driving one epoch of a poller.
async fn poll_loop(shared: Arc<Shared>, epoch: u64, mut shutdown_rx: oneshot::Receiver<()>) {
    let mut consecutive_failures = 0u32;

    loop {
        let Some(url) = shared.begin_cycle(epoch) else {
            return;
        };
        debug!(feed = %shared.key, %url, "issuing poll");

        let request = shared.transport.send(Method::Get, &url, None);
        let watchdog = tokio::time::sleep(shared.watchdog_timeout);

        let outcome = tokio::select! {
            biased;
            _ = &mut shutdown_rx => {
                trace!(feed = %shared.key, "poll cancelled by stop");
                return;
            }
            outcome = request => outcome,
            _ = watchdog => {
                shared.watchdog_expirations.fetch_add(1, Ordering::Relaxed);
                debug!(
                    feed = %shared.key,
                    timeout = ?shared.watchdog_timeout,
                    "watchdog expired, reissuing poll"
                );
                continue;
            }
        };

        if !handle_response(&shared, epoch, &outcome) {
            return;
        }

        if let Some(delay) = shared.backoff_after(&outcome, &mut consecutive_failures) {
            debug!(feed = %shared.key, ?delay, consecutive_failures, "backing off before next poll");
            tokio::select! {
                biased;
                _ = &mut shutdown_rx => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

/// Check the epoch, run the handler and apply its decision as one step with
/// respect to `stop`. Returns whether the loop goes on.
fn handle_response(shared: &Shared, epoch: u64, outcome: &PollOutcome) -> bool {
    let _gate = shared.gate.lock();
    if !shared.is_current(epoch) {
        trace!(feed = %shared.key, "discarding late response");
        return false;
    }

    match outcome {
        Ok(response) if !response.is_success() => {
            warn!(feed = %shared.key, status = response.status, "poll returned error status");
        }
        Err(e) => warn!(feed = %shared.key, error = %e, "poll request failed"),
        Ok(_) => {}
    }

    let keep_polling = shared.handler.handle(outcome, &shared.notifier);
    shared.responses_handled.fetch_add(1, Ordering::Relaxed);

    shared.finish_cycle(epoch, keep_polling, outcome)
}

/// Statistics for a single poller
#[derive(Debug, Clone, Serialize)]
pub struct PollerStats {
    pub key: FeedKey,
    pub state: PollerState,
    pub since: Option<Since>,
    pub requests_issued: u64,
    pub responses_handled: u64,
    pub watchdog_expirations: u64,
    pub started_at: Option<DateTime<Utc>>,
}

impl std::fmt::Display for PollerStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} [{}] since={} (requests: {}, responses: {}, watchdog: {})",
            self.key,
            self.state,
            self.since.as_ref().map(Since::as_str).unwrap_or("-"),
            self.requests_issued,
            self.responses_handled,
            self.watchdog_expirations
        )
    }
}
