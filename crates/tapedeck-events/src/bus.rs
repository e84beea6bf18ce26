#![forbid(unsafe_code)]

use tokio::sync::broadcast;

use crate::Notification;

/// Broadcast channel of session notifications.
///
/// `publish()` is sync and works from blocking threads. With no subscribers
/// notifications are dropped. Slow subscribers get `RecvError::Lagged(n)`
/// instead of blocking the publisher.
#[derive(Clone, Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Notification>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publish(&self, notification: Notification) {
        let _ = self.tx.send(notification);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }
}
