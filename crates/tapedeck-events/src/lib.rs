#![forbid(unsafe_code)]

//! Session notifications for tapedeck.
//!
//! Events are a tagged enum ([`SessionEvent`]). Callers either subscribe to
//! the broadcast [`EventBus`] or register weakly held listeners for the
//! [`EventKind`]s they care about. A [`Dispatcher`] delivers both from one
//! task, in order, and stops for good once its [`Notifier`] is closed.

mod bus;
mod dispatch;
mod event;
mod listener;

pub use bus::EventBus;
pub use dispatch::{Dispatcher, NotificationQueue, Notifier};
pub use event::{EventKind, Notification, SessionEvent, SessionId};
pub use listener::{Listener, ListenerId, ListenerRegistry};
