//! Connections and databases.
//!
//! A [`Connection`] holds the transport and the poll registry shared by every
//! [`Database`] opened through it. URLs are built by joining the connection
//! prefix, the database name and the resource with `/`, so with the default
//! empty prefix the changes feed of `albums` is `/albums/_changes`, resolved
//! against the transport's base URL.

use std::sync::Arc;

use feed_poller::{
    HttpTransport, Method, Notifier, PollRegistry, Poller, RegistryConfig, ResponseHandler,
};
use tracing::{debug, info};

use crate::error::{ChangesError, Result};
use crate::handler::ChangesHandler;
use crate::options::ChangesOptions;
use crate::transport::ReqwestTransport;

/// Entry point for talking to one document store.
#[derive(Clone)]
pub struct Connection {
    prefix: String,
    transport: Arc<dyn HttpTransport>,
    registry: Arc<PollRegistry>,
}

impl Connection {
    /// Connect to the store at `base_url` with the default registry settings.
    ///
    /// Must be called within a tokio runtime.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, RegistryConfig::default())
    }

    pub fn with_config(base_url: &str, config: RegistryConfig) -> Result<Self> {
        let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(base_url)?);
        let registry = Arc::new(PollRegistry::new(Arc::clone(&transport), config)?);
        info!(base_url, "connection created");
        Ok(Self::from_parts("", transport, registry))
    }

    /// Assemble a connection from an existing transport and registry.
    pub fn from_parts(
        prefix: impl Into<String>,
        transport: Arc<dyn HttpTransport>,
        registry: Arc<PollRegistry>,
    ) -> Self {
        Self {
            prefix: prefix.into(),
            transport,
            registry,
        }
    }

    /// Set the path prefix placed in front of database names.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn registry(&self) -> &Arc<PollRegistry> {
        &self.registry
    }

    /// Join `parts` onto the connection prefix.
    pub fn url_for(&self, parts: &[&str]) -> String {
        join_url(&self.prefix, parts)
    }

    /// Open a handle to the database `name`.
    pub fn database(&self, name: &str) -> Result<Database> {
        if name.trim().is_empty() || name.contains('/') {
            return Err(ChangesError::InvalidDatabase(name.to_string()));
        }

        Ok(Database {
            prefix: self.prefix.clone(),
            name: name.to_string(),
            transport: Arc::clone(&self.transport),
            registry: Arc::clone(&self.registry),
        })
    }

    /// Stop every changes feed opened through this connection.
    pub fn stop_all(&self) -> usize {
        self.registry.remove_all()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("prefix", &self.prefix)
            .field("feeds", &self.registry.len())
            .finish()
    }
}

/// Handle to a single database.
#[derive(Clone)]
pub struct Database {
    prefix: String,
    name: String,
    transport: Arc<dyn HttpTransport>,
    registry: Arc<PollRegistry>,
}

impl Database {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// URL of the database itself.
    pub fn base_url(&self) -> String {
        join_url(&self.prefix, &[&self.name])
    }

    /// Join `parts` onto the database URL.
    pub fn url_for(&self, parts: &[&str]) -> String {
        join_url(&self.base_url(), parts)
    }

    /// URL of the changes feed. Also the key of its long poll.
    pub fn changes_url(&self) -> String {
        self.url_for(&["_changes"])
    }

    /// Read the changes feed.
    ///
    /// Without `long_poll` a single request is made and its outcome delivered
    /// to `notifier` before this returns. With `long_poll` the feed is
    /// registered on the connection's registry and results are delivered as
    /// they arrive; registering a feed that is already open has no effect.
    pub async fn changes(&self, options: ChangesOptions, notifier: Notifier) -> Result<()> {
        if options.long_poll {
            self.watch_changes(options, notifier)?;
            return Ok(());
        }

        let query = options.query();
        let url = if query.is_empty() {
            self.changes_url()
        } else {
            format!("{}?{}", self.changes_url(), query)
        };
        let notifier = match options.context {
            Some(context) => notifier.with_context(context),
            None => notifier,
        };

        debug!(db = %self.name, %url, "requesting changes");
        let outcome = self.transport.send(Method::Get, &url, None).await;
        ChangesHandler.handle(&outcome, &notifier);
        Ok(())
    }

    /// Open a long-polled changes feed. Returns `false` if it was already open.
    pub fn watch_changes(&self, options: ChangesOptions, notifier: Notifier) -> Result<bool> {
        let registered = self.registry.register_poll(
            self.changes_url(),
            Arc::new(ChangesHandler),
            notifier,
            options.poll_options(),
        )?;
        if registered {
            info!(db = %self.name, "watching changes");
        }
        Ok(registered)
    }

    /// Close the long-polled changes feed. Returns whether one was open.
    pub fn stop_changes(&self) -> bool {
        self.registry.remove_poll(&self.changes_url())
    }

    /// The poller behind the long-polled changes feed, if open.
    pub fn changes_poller(&self) -> Option<Arc<Poller>> {
        self.registry.poller(&self.changes_url())
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("prefix", &self.prefix)
            .field("name", &self.name)
            .finish()
    }
}

fn join_url(base: &str, parts: &[&str]) -> String {
    std::iter::once(base)
        .chain(parts.iter().copied())
        .collect::<Vec<_>>()
        .join("/")
}
