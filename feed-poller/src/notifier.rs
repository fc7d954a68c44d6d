//! Notifier dispatch.
//!
//! A [`Notifier`] is where the outcome of an asynchronous feed operation is
//! delivered: either a plain callback, or a named action on a shared target
//! object that many subscriptions route through. The destination is resolved
//! once, when the notifier is built, so a target that cannot handle its action
//! is reported to the caller before any request is made.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::{FeedError, PollError, Result};

/// One delivery to a notifier: the `(error, result)` pair plus the opaque
/// context attached at registration.
#[derive(Debug, Clone, Copy)]
pub struct Notification<'a> {
    pub error: Option<&'a FeedError>,
    pub result: &'a Value,
    pub context: Option<&'a Value>,
}

impl Notification<'_> {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// An object that handles named notification actions.
///
/// # Example
///
/// ```rust
/// use feed_poller::{Notification, NotifyTarget};
///
/// struct Library;
///
/// impl NotifyTarget for Library {
///     fn responds_to(&self, action: &str) -> bool {
///         action == "albums_changed"
///     }
///
///     fn perform(&self, action: &str, notification: &Notification<'_>) {
///         println!("{action}: {}", notification.result);
///     }
/// }
/// ```
pub trait NotifyTarget: Send + Sync {
    /// Whether `action` names something this target can perform.
    fn responds_to(&self, action: &str) -> bool;

    /// Perform `action`. Only called with actions `responds_to` accepted.
    fn perform(&self, action: &str, notification: &Notification<'_>);
}

type Callback = Arc<dyn Fn(&Notification<'_>) + Send + Sync>;

/// Resolved destination of a notifier.
#[derive(Clone)]
pub enum Destination {
    /// Invoke a function directly
    DirectCallback(Callback),
    /// Invoke a named action on a target
    NamedTarget {
        target: Arc<dyn NotifyTarget>,
        action: String,
    },
}

impl fmt::Debug for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::DirectCallback(_) => f.write_str("DirectCallback"),
            Destination::NamedTarget { action, .. } => {
                f.debug_struct("NamedTarget").field("action", action).finish()
            }
        }
    }
}

/// Caller-supplied destination for feed results.
#[derive(Debug, Clone)]
pub struct Notifier {
    destination: Destination,
    context: Option<Value>,
}

impl Notifier {
    /// Deliver to a plain callback.
    pub fn callback<F>(callback: F) -> Self
    where
        F: Fn(&Notification<'_>) + Send + Sync + 'static,
    {
        Self {
            destination: Destination::DirectCallback(Arc::new(callback)),
            context: None,
        }
    }

    /// Deliver to a named action on `target`.
    ///
    /// # Errors
    ///
    /// Returns `PollError::MissingAction` for an empty action name and
    /// `PollError::UnresolvedAction` if the target does not respond to it.
    pub fn named(target: Arc<dyn NotifyTarget>, action: impl Into<String>) -> Result<Self> {
        let action = action.into();
        if action.trim().is_empty() {
            return Err(PollError::MissingAction);
        }
        if !target.responds_to(&action) {
            return Err(PollError::UnresolvedAction { action });
        }

        Ok(Self {
            destination: Destination::NamedTarget { target, action },
            context: None,
        })
    }

    /// Deliver to a method of `target`, called with the target as receiver.
    pub fn bound<T>(target: Arc<T>, method: fn(&T, &Notification<'_>)) -> Self
    where
        T: Send + Sync + 'static,
    {
        Self::callback(move |notification| method(&target, notification))
    }

    /// Attach an opaque value handed back with every notification.
    pub fn with_context(mut self, context: Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn context(&self) -> Option<&Value> {
        self.context.as_ref()
    }

    pub fn destination(&self) -> &Destination {
        &self.destination
    }

    /// Deliver an `(error, result)` pair.
    pub fn dispatch(&self, error: Option<&FeedError>, result: &Value) {
        let notification = Notification {
            error,
            result,
            context: self.context.as_ref(),
        };

        match &self.destination {
            Destination::DirectCallback(callback) => callback(&notification),
            Destination::NamedTarget { target, action } => {
                target.perform(action, &notification)
            }
        }
    }
}

/// Deliver an `(error, result)` pair to `notifier`.
pub fn dispatch(notifier: &Notifier, error: Option<&FeedError>, result: &Value) {
    notifier.dispatch(error, result);
}
