#![forbid(unsafe_code)]

//! Weakly held, kind-filtered listeners.
//!
//! The registry never keeps a listener alive. Once the caller drops its
//! `Arc`, deliveries to it are skipped and the entry is pruned.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::trace;

use crate::{EventKind, Notification};

pub type Listener = dyn Fn(&Notification) + Send + Sync;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    mask: u16,
    target: Weak<Listener>,
}

#[derive(Default)]
struct Entries {
    next_id: u64,
    list: Vec<Entry>,
}

#[derive(Clone, Default)]
pub struct ListenerRegistry {
    entries: Arc<Mutex<Entries>>,
}

impl ListenerRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` for `kinds` without taking ownership of it.
    pub fn register<F>(&self, kinds: &[EventKind], listener: &Arc<F>) -> ListenerId
    where
        F: Fn(&Notification) + Send + Sync + 'static,
    {
        let weak = Arc::downgrade(listener);
        let target: Weak<Listener> = weak;
        let mut entries = self.entries.lock();
        entries.next_id += 1;
        let id = ListenerId(entries.next_id);
        entries.list.push(Entry {
            id,
            mask: EventKind::mask(kinds),
            target,
        });
        id
    }

    /// Returns whether a registration was removed.
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.list.len();
        entries.list.retain(|e| e.id != id);
        entries.list.len() != before
    }

    /// Number of registrations whose target is still alive.
    pub fn live_count(&self) -> usize {
        self.entries
            .lock()
            .list
            .iter()
            .filter(|e| e.target.strong_count() > 0)
            .count()
    }

    /// Calls every live listener interested in this notification.
    ///
    /// Listeners run outside the registry lock, so they may register or
    /// unregister from inside the callback.
    pub fn deliver(&self, notification: &Notification) {
        self.deliver_while(notification, &|| true);
    }

    /// Like [`deliver`](Self::deliver), but stops before the next listener
    /// once `open` returns false.
    pub fn deliver_while(&self, notification: &Notification, open: &dyn Fn() -> bool) {
        let kind = notification.event.kind();
        let targets: Vec<Arc<Listener>> = {
            let mut entries = self.entries.lock();
            entries.list.retain(|e| {
                let alive = e.target.strong_count() > 0;
                if !alive {
                    trace!(id = ?e.id, "pruning dropped listener");
                }
                alive
            });
            entries
                .list
                .iter()
                .filter(|e| kind.in_mask(e.mask))
                .filter_map(|e| e.target.upgrade())
                .collect()
        };
        for target in targets {
            if !open() {
                trace!("delivery closed mid-notification");
                return;
            }
            target(notification);
        }
    }
}
