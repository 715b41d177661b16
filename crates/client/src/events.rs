//! Subscription registry: ordered fan-out of server-pushed events.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;

/// Callback invoked with each matching event frame's payload.
pub type EventCallback = Box<dyn Fn(&Value) + Send + Sync>;

struct Entry {
    token: u64,
    callback: Arc<EventCallback>,
}

#[derive(Default)]
struct RegistryInner {
    /// Per event name, callbacks in registration order.
    by_event: Mutex<HashMap<String, Vec<Entry>>>,
    next_token: AtomicU64,
}

impl RegistryInner {
    fn remove(&self, event: &str, token: u64) -> bool {
        let mut map = self.by_event.lock();
        let Some(entries) = map.get_mut(event) else {
            return false;
        };
        let before = entries.len();
        entries.retain(|e| e.token != token);
        let removed = entries.len() != before;
        if entries.is_empty() {
            map.remove(event);
        }
        removed
    }
}

/// Event-name-keyed registry of subscriber callbacks.
///
/// There is no buffering: a callback registered after a frame was
/// dispatched never sees that frame.
#[derive(Default)]
pub(crate) struct EventRegistry {
    inner: Arc<RegistryInner>,
}

impl EventRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `callback` to the list for `event`. The returned handle is
    /// the only way to remove exactly this registration — the same
    /// callback subscribed twice yields two independent handles.
    pub fn subscribe(&self, event: &str, callback: EventCallback) -> Subscription {
        let token = self.inner.next_token.fetch_add(1, Ordering::Relaxed);
        self.inner
            .by_event
            .lock()
            .entry(event.to_string())
            .or_default()
            .push(Entry {
                token,
                callback: Arc::new(callback),
            });
        Subscription {
            event: event.to_string(),
            token,
            registry: Arc::clone(&self.inner),
        }
    }

    /// Invoke every callback currently registered for `event`, in
    /// registration order. A panicking callback is caught and logged so
    /// it cannot block later subscribers or the connection.
    pub fn dispatch(&self, event: &str, payload: &Value) {
        // Snapshot outside the lock so a callback may (un)subscribe.
        let callbacks: Vec<Arc<EventCallback>> = {
            let map = self.inner.by_event.lock();
            match map.get(event) {
                Some(entries) => entries.iter().map(|e| Arc::clone(&e.callback)).collect(),
                None => return,
            }
        };
        for cb in callbacks {
            if std::panic::catch_unwind(AssertUnwindSafe(|| cb(payload))).is_err() {
                tracing::warn!(event, "event subscriber panicked");
            }
        }
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.inner
            .by_event
            .lock()
            .get(event)
            .map_or(0, |entries| entries.len())
    }
}

/// Stable handle for one registration, returned by
/// [`GatewayClient::on`](crate::GatewayClient::on).
///
/// Subscriptions outlive connections: they stay registered across
/// reconnects until explicitly removed.
#[must_use = "dropping a Subscription without calling unsubscribe leaves it registered"]
pub struct Subscription {
    event: String,
    token: u64,
    registry: Arc<RegistryInner>,
}

impl Subscription {
    /// The event name this handle is registered for.
    pub fn event(&self) -> &str {
        &self.event
    }

    /// Remove exactly this registration.
    pub fn unsubscribe(self) {
        if !self.registry.remove(&self.event, self.token) {
            tracing::debug!(event = %self.event, "subscription was already removed");
        }
    }
}
