//! # couch-changes
//!
//! CouchDB `_changes` feeds on top of the `feed-poller` engine.
//!
//! A [`Connection`] owns an HTTP transport and the poll registry shared by
//! every [`Database`] opened through it. `Database::changes` reads the feed
//! once, or keeps it open with a long poll that resumes from the last
//! sequence seen, and `Database::stop_changes` closes it.
//!
//! ```rust,ignore
//! use couch_changes::{ChangesOptions, Connection, Notifier};
//!
//! let connection = Connection::new("http://localhost:5984")?;
//! let albums = connection.database("albums")?;
//!
//! let notifier = Notifier::callback(|n| match n.error {
//!     Some(e) => eprintln!("changes failed: {e}"),
//!     None => println!("changes: {}", n.result),
//! });
//! albums
//!     .changes(ChangesOptions::long_poll().with_param("include_docs", true), notifier)
//!     .await?;
//! // ...
//! albums.stop_changes();
//! ```

mod database;
mod error;
mod handler;
mod options;
mod transport;

pub mod logging;

pub use database::{Connection, Database};
pub use error::{ChangesError, Result};
pub use handler::{ChangesHandler, TERMINAL_STATUSES};
pub use options::ChangesOptions;
pub use transport::ReqwestTransport;

pub use feed_poller::{
    FeedError, Notification, Notifier, NotifyTarget, PollRegistry, Poller, PollerState,
    RegistryConfig, Since,
};
