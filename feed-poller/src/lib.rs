//! # feed-poller
//!
//! Long-poll synchronization engine for document-store change feeds.
//!
//! A [`PollRegistry`] keeps at most one [`Poller`] per feed URL. Each poller
//! issues one blocking request at a time, guards it with a watchdog timer
//! that reissues the poll if the connection stalls silently, and resumes from
//! the last `since` cursor the feed returned. Interpreting responses is left to
//! a per-feed [`ResponseHandler`], which reports results through a
//! [`Notifier`] and decides whether polling continues.
//!
//! The HTTP client is abstracted by [`HttpTransport`]; see the
//! `couchfeed-changes` crate for a `reqwest` implementation and a `_changes`
//! handler.
//!
//! ```rust,ignore
//! use feed_poller::{Notifier, PollOptions, PollRegistry, RegistryConfig};
//!
//! let registry = PollRegistry::new(transport, RegistryConfig::default())?;
//! let notifier = Notifier::callback(|n| println!("{:?} {}", n.error, n.result));
//!
//! registry.register_poll("/albums/_changes", handler, notifier, PollOptions::new())?;
//! ```

mod config;
mod cursor;
mod error;
mod handler;
mod notifier;
mod poller;
mod registry;
mod transport;
mod types;

pub use config::*;
pub use cursor::*;
pub use error::*;
pub use handler::*;
pub use notifier::*;
pub use poller::*;
pub use registry::*;
pub use transport::*;
pub use types::*;
