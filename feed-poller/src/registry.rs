//! Feed registration with duplicate protection
//!
//! [`PollRegistry`] maps feed keys to their single live [`Poller`]. Lookups,
//! registration and removal are serialized by one lock, so two callers racing
//! to register the same feed end up with exactly one poller between them.
//! Pollers are stopped after that lock is released: `Poller::stop` waits for a
//! running response handler, and handlers may call back into the registry.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::config::RegistryConfig;
use crate::error::{PollError, Result};
use crate::handler::ResponseHandler;
use crate::notifier::Notifier;
use crate::poller::{Poller, PollerState, PollerStats};
use crate::transport::HttpTransport;
use crate::types::{FeedKey, PollOptions};

/// Table of live feed subscriptions.
///
/// A registry is created once per process (or per connection to a store) and
/// shared by reference; it owns every poller registered through it. Pollers
/// run on the tokio runtime the registry was created on.
///
/// # Example
///
/// ```rust,ignore
/// let registry = PollRegistry::new(transport, RegistryConfig::default())?;
///
/// let handler: Arc<dyn ResponseHandler> = Arc::new(|outcome: &PollOutcome, notifier: &Notifier| {
///     if let Ok(response) = outcome {
///         notifier.dispatch(None, &response.body);
///     }
///     true
/// });
///
/// registry.register_poll("/albums/_changes", handler, notifier, PollOptions::new())?;
/// // ...
/// registry.remove_poll("/albums/_changes");
/// ```
pub struct PollRegistry {
    pollers: RwLock<HashMap<FeedKey, Arc<Poller>>>,
    transport: Arc<dyn HttpTransport>,
    config: RegistryConfig,
    runtime: Handle,
    shut_down: AtomicBool,
}

impl PollRegistry {
    /// Create a registry bound to the current tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `PollError::Configuration` if the configuration is invalid or
    /// no tokio runtime is active.
    pub fn new(transport: Arc<dyn HttpTransport>, config: RegistryConfig) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| {
            PollError::Configuration(format!("PollRegistry requires a tokio runtime: {e}"))
        })?;
        Self::with_runtime(transport, config, runtime)
    }

    /// Create a registry whose pollers run on `runtime`.
    pub fn with_runtime(
        transport: Arc<dyn HttpTransport>,
        config: RegistryConfig,
        runtime: Handle,
    ) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            pollers: RwLock::new(HashMap::new()),
            transport,
            config,
            runtime,
            shut_down: AtomicBool::new(false),
        })
    }

    /// Register and start a poller for `key`.
    ///
    /// Returns `Ok(false)` without effect if the feed already has a poller,
    /// so callers may register on every subscribe attempt.
    ///
    /// # Errors
    ///
    /// Configuration errors from the options, `PollError::RegistryFull` at
    /// capacity and `PollError::ShutDown` after [`shutdown`](Self::shutdown).
    pub fn register_poll(
        &self,
        key: impl Into<FeedKey>,
        handler: Arc<dyn ResponseHandler>,
        notifier: Notifier,
        options: PollOptions,
    ) -> Result<bool> {
        let key = key.into();
        let mut pollers = self.pollers.write();

        if self.shut_down.load(Ordering::SeqCst) {
            return Err(PollError::ShutDown);
        }

        if pollers.contains_key(&key) {
            debug!(feed = %key, "feed already registered");
            return Ok(false);
        }

        if pollers.len() >= self.config.max_registrations {
            return Err(PollError::RegistryFull {
                max_registrations: self.config.max_registrations,
            });
        }

        let poller = Arc::new(Poller::new(
            key.clone(),
            handler,
            notifier,
            options,
            Arc::clone(&self.transport),
            &self.config,
            self.runtime.clone(),
        )?);

        poller.start();
        pollers.insert(key.clone(), poller);

        info!(feed = %key, total = pollers.len(), "registered feed");
        Ok(true)
    }

    /// Stop and discard the poller for `key`. Returns whether one existed.
    pub fn remove_poll(&self, key: &str) -> bool {
        let (removed, total) = {
            let mut pollers = self.pollers.write();
            (pollers.remove(key), pollers.len())
        };

        match removed {
            Some(poller) => {
                poller.stop();
                info!(feed = %key, total, "removed feed");
                true
            }
            None => false,
        }
    }

    /// Pause the poller for `key`, keeping it and its cursor registered.
    pub fn stop_poller(&self, key: &str) -> bool {
        self.poller(key).map(|poller| poller.stop()).unwrap_or(false)
    }

    /// Resume a paused poller from its retained cursor.
    pub fn start_poller(&self, key: &str) -> bool {
        self.poller(key).map(|poller| poller.start()).unwrap_or(false)
    }

    /// Stop and discard every poller. Returns how many were removed.
    pub fn remove_all(&self) -> usize {
        let removed: Vec<_> = self.pollers.write().drain().collect();
        let count = removed.len();
        for (_, poller) in removed {
            poller.stop();
        }

        if count > 0 {
            info!(count, "removed all feeds");
        }
        count
    }

    /// Remove every feed and refuse further registrations.
    pub fn shutdown(&self) -> usize {
        self.shut_down.store(true, Ordering::SeqCst);
        self.remove_all()
    }

    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::SeqCst)
    }

    /// Look up the poller registered for `key`.
    pub fn poller(&self, key: &str) -> Option<Arc<Poller>> {
        self.pollers.read().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pollers.read().contains_key(key)
    }

    /// Keys of all registered feeds, sorted.
    pub fn keys(&self) -> Vec<FeedKey> {
        let mut keys: Vec<_> = self.pollers.read().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.pollers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pollers.read().is_empty()
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Get statistics about the registry
    pub fn stats(&self) -> RegistryStats {
        let pollers = self.pollers.read();
        let mut feeds: Vec<_> = pollers.values().map(|poller| poller.stats()).collect();
        feeds.sort_by(|a, b| a.key.cmp(&b.key));

        RegistryStats {
            total_registrations: pollers.len(),
            running: feeds.iter().filter(|s| s.state != PollerState::Stopped).count(),
            max_registrations: self.config.max_registrations,
            feeds,
        }
    }
}

impl Drop for PollRegistry {
    fn drop(&mut self) {
        for (_, poller) in self.pollers.get_mut().drain() {
            poller.stop();
        }
    }
}

/// Statistics about the registry state
#[derive(Debug, Clone)]
pub struct RegistryStats {
    pub total_registrations: usize,
    pub running: usize,
    pub max_registrations: usize,
    pub feeds: Vec<PollerStats>,
}

impl std::fmt::Display for RegistryStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Registry Stats:")?;
        writeln!(
            f,
            "  Feeds: {}/{} ({} running)",
            self.total_registrations, self.max_registrations, self.running
        )?;
        for feed in &self.feeds {
            writeln!(f, "    {}", feed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Method, PollOutcome};
    use async_trait::async_trait;
    use serde_json::Value;

    struct SilentTransport;

    #[async_trait]
    impl HttpTransport for SilentTransport {
        async fn send(&self, _method: Method, _url: &str, _body: Option<Value>) -> PollOutcome {
            std::future::pending().await
        }
    }

    fn registry(config: RegistryConfig) -> PollRegistry {
        PollRegistry::new(Arc::new(SilentTransport), config).unwrap()
    }

    fn handler() -> Arc<dyn ResponseHandler> {
        Arc::new(|_: &PollOutcome, _: &Notifier| true)
    }

    fn notifier() -> Notifier {
        Notifier::callback(|_| {})
    }

    #[tokio::test]
    async fn test_registration_basic() {
        let registry = registry(RegistryConfig::default());

        assert!(registry
            .register_poll("/db/_changes", handler(), notifier(), PollOptions::new())
            .unwrap());
        assert!(registry.contains("/db/_changes"));
        assert_eq!(registry.len(), 1);

        // Same key is a no-op
        assert!(!registry
            .register_poll("/db/_changes", handler(), notifier(), PollOptions::new())
            .unwrap());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_and_reregister() {
        let registry = registry(RegistryConfig::default());
        registry
            .register_poll("/db/_changes", handler(), notifier(), PollOptions::new())
            .unwrap();

        let poller = registry.poller("/db/_changes").unwrap();
        assert!(registry.remove_poll("/db/_changes"));
        assert!(!poller.is_running());
        assert!(!registry.contains("/db/_changes"));
        assert!(!registry.remove_poll("/db/_changes"));

        assert!(registry
            .register_poll("/db/_changes", handler(), notifier(), PollOptions::new())
            .unwrap());
    }

    #[tokio::test]
    async fn test_pause_and_resume_keep_entry() {
        let registry = registry(RegistryConfig::default());
        registry
            .register_poll(
                "/db/_changes",
                handler(),
                notifier(),
                PollOptions::new().with_since(12u64),
            )
            .unwrap();

        assert!(registry.stop_poller("/db/_changes"));
        assert!(registry.contains("/db/_changes"));
        let poller = registry.poller("/db/_changes").unwrap();
        assert!(!poller.is_running());

        assert!(registry.start_poller("/db/_changes"));
        assert!(poller.is_running());
        assert_eq!(poller.since().map(|s| s.to_string()), Some("12".to_string()));

        // Unknown keys are no-ops
        assert!(!registry.stop_poller("/other/_changes"));
        assert!(!registry.start_poller("/other/_changes"));
    }

    #[tokio::test]
    async fn test_registration_limit() {
        let registry = registry(RegistryConfig::new().with_max_registrations(2));

        for db in ["a", "b"] {
            registry
                .register_poll(format!("/{db}/_changes"), handler(), notifier(), PollOptions::new())
                .unwrap();
        }

        let result = registry.register_poll("/c/_changes", handler(), notifier(), PollOptions::new());
        assert!(matches!(result, Err(PollError::RegistryFull { max_registrations: 2 })));
    }

    #[tokio::test]
    async fn test_invalid_options_are_not_registered() {
        let registry = registry(RegistryConfig::default());
        let result = registry.register_poll("", handler(), notifier(), PollOptions::new());
        assert!(matches!(result, Err(PollError::Configuration(_))));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_remove_all_and_shutdown() {
        let registry = registry(RegistryConfig::default());
        for db in ["a", "b", "c"] {
            registry
                .register_poll(format!("/{db}/_changes"), handler(), notifier(), PollOptions::new())
                .unwrap();
        }
        assert_eq!(
            registry.keys(),
            vec![
                FeedKey::new("/a/_changes"),
                FeedKey::new("/b/_changes"),
                FeedKey::new("/c/_changes"),
            ]
        );

        assert_eq!(registry.remove_all(), 3);
        assert!(registry.is_empty());

        registry
            .register_poll("/a/_changes", handler(), notifier(), PollOptions::new())
            .unwrap();
        assert_eq!(registry.shutdown(), 1);
        assert!(registry.is_shut_down());

        let result = registry.register_poll("/a/_changes", handler(), notifier(), PollOptions::new());
        assert!(matches!(result, Err(PollError::ShutDown)));
    }

    #[tokio::test]
    async fn test_stats() {
        let registry = registry(RegistryConfig::new().with_max_registrations(10));
        registry
            .register_poll("/a/_changes", handler(), notifier(), PollOptions::new())
            .unwrap();
        registry
            .register_poll("/b/_changes", handler(), notifier(), PollOptions::new())
            .unwrap();
        registry.stop_poller("/b/_changes");

        let stats = registry.stats();
        assert_eq!(stats.total_registrations, 2);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.max_registrations, 10);
        assert_eq!(stats.feeds[0].key, FeedKey::new("/a/_changes"));

        let rendered = stats.to_string();
        assert!(rendered.contains("Feeds: 2/10 (1 running)"));
        assert!(rendered.contains("/b/_changes [stopped]"));
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = PollRegistry::new(Arc::new(SilentTransport), RegistryConfig::default());
        assert!(matches!(result, Err(PollError::Configuration(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registration() {
        let registry = Arc::new(registry(RegistryConfig::default()));

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let registry = Arc::clone(&registry);
                tokio::spawn(async move {
                    registry.register_poll("/db/_changes", handler(), notifier(), PollOptions::new())
                })
            })
            .collect();

        let results: Vec<bool> = futures::future::join_all(handles)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(results.iter().filter(|created| **created).count(), 1);
        assert_eq!(registry.len(), 1);
    }
}
