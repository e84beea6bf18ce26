#![forbid(unsafe_code)]

//! Single delivery context for session notifications.
//!
//! State transitions enqueue through a [`Notifier`] from any thread. One
//! [`Dispatcher`] task drains the queue in order and hands each notification
//! to the listener registry and then the broadcast bus. After
//! [`Notifier::close`] returns nothing further is delivered, including
//! anything still queued. A listener already running when `close` is called
//! finishes first; the rest of that notification is dropped.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use parking_lot::ReentrantMutex;
use tokio::{sync::mpsc, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::{EventBus, ListenerRegistry, Notification, SessionEvent, SessionId};

/// Producer side. Cheap to clone.
#[derive(Clone, Debug)]
pub struct Notifier {
    session: SessionId,
    tx: mpsc::UnboundedSender<Notification>,
    closed: Arc<AtomicBool>,
    delivering: Arc<ReentrantMutex<()>>,
}

/// Consumer side, handed to [`Dispatcher::spawn`] or drained directly in tests.
#[derive(Debug)]
pub struct NotificationQueue {
    rx: mpsc::UnboundedReceiver<Notification>,
    closed: Arc<AtomicBool>,
    delivering: Arc<ReentrantMutex<()>>,
}

impl Notifier {
    pub fn channel(session: SessionId) -> (Self, NotificationQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        let delivering = Arc::new(ReentrantMutex::new(()));
        (
            Self {
                session,
                tx,
                closed: Arc::clone(&closed),
                delivering: Arc::clone(&delivering),
            },
            NotificationQueue {
                rx,
                closed,
                delivering,
            },
        )
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Enqueues `event`. Ignored once closed.
    pub fn notify(&self, event: SessionEvent) {
        if self.is_closed() {
            trace!(session = %self.session, ?event, "notifier closed, dropping");
            return;
        }
        let _ = self.tx.send(Notification {
            session: self.session,
            event,
        });
    }

    /// Permanently stops delivery. Idempotent.
    ///
    /// Waits for a delivery in progress on another thread. Calling it from a
    /// listener does not block.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        drop(self.delivering.lock());
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl NotificationQueue {
    /// Next queued notification, unless the notifier was closed.
    pub fn try_next(&mut self) -> Option<Notification> {
        if self.closed.load(Ordering::Acquire) {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Everything currently queued.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        std::iter::from_fn(|| self.try_next())
            .map(|n| n.event)
            .collect()
    }

    fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    /// Hands one notification to listeners and then the bus. Returns false
    /// once closed.
    fn deliver(
        &self,
        notification: Notification,
        registry: &ListenerRegistry,
        bus: &EventBus,
    ) -> bool {
        let _delivering = self.delivering.lock();
        if !self.is_open() {
            return false;
        }
        trace!(session = %notification.session, event = ?notification.event, "dispatch");
        registry.deliver_while(&notification, &|| self.is_open());
        if !self.is_open() {
            return false;
        }
        bus.publish(notification);
        true
    }
}

pub struct Dispatcher;

impl Dispatcher {
    /// Spawns the delivery task on the current tokio runtime.
    pub fn spawn(
        mut queue: NotificationQueue,
        registry: ListenerRegistry,
        bus: EventBus,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let notification = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    next = queue.rx.recv() => match next {
                        Some(n) => n,
                        None => break,
                    },
                };
                if !queue.deliver(notification, &registry, &bus) {
                    break;
                }
            }
            debug!("notification dispatcher stopped");
        })
    }
}
