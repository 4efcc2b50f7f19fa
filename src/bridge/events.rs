//! In-process session events.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogoutReason {
    Explicit,
    Expired,
    RenewalFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    LoggedIn { subject: Option<String> },
    Refreshed { expires_at: i64 },
    LoggedOut { reason: LogoutReason },
}

type Handler = Arc<dyn Fn(&SessionEvent) + Send + Sync>;

#[derive(Default)]
struct Handlers {
    next_id: u64,
    entries: Vec<(u64, Handler)>,
}

/// Synchronous fan-out of [`SessionEvent`]s to subscribed handlers.
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Arc<Mutex<Handlers>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&SessionEvent) + Send + Sync + 'static,
    {
        let mut handlers = self.handlers.lock();
        handlers.next_id += 1;
        let id = handlers.next_id;
        handlers.entries.push((id, Arc::new(handler)));
        Subscription {
            id,
            handlers: Arc::downgrade(&self.handlers),
        }
    }

    /// Deliver `event` to every handler, in subscription order.
    pub fn emit(&self, event: &SessionEvent) {
        // Snapshot so handlers may subscribe or unsubscribe while running.
        let snapshot: Vec<Handler> = self
            .handlers
            .lock()
            .entries
            .iter()
            .map(|(_, h)| h.clone())
            .collect();
        for handler in snapshot {
            handler(event);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.handlers.lock().entries.len()
    }
}

/// Handle to a registered handler. Dropping it unsubscribes.
#[must_use = "dropping a Subscription unsubscribes its handler"]
pub struct Subscription {
    id: u64,
    handlers: Weak<Mutex<Handlers>>,
}

impl Subscription {
    pub fn unsubscribe(self) {}

    /// Keep the handler registered for the lifetime of the bus.
    pub fn detach(self) {
        std::mem::forget(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(handlers) = self.handlers.upgrade() {
            handlers.lock().entries.retain(|(id, _)| *id != self.id);
        }
    }
}
