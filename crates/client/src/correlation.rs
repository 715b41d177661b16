//! Correlation table: outstanding rpc calls awaiting a response.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::GatewayError;

/// One in-flight rpc, owned exclusively by the table until it settles.
struct Pending {
    method: String,
    sent_at: Instant,
    tx: oneshot::Sender<Result<Value, GatewayError>>,
}

/// Maps request ids to pending calls.
///
/// Each id settles at most once: completion, timeout, and teardown all
/// remove the entry before touching the waiter. Ids are monotonic for
/// the client's lifetime, so they can never collide across reconnects.
pub(crate) struct CorrelationTable {
    pending: Mutex<HashMap<u64, Pending>>,
    next_id: AtomicU64,
}

impl CorrelationTable {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Allocate a fresh id and register a pending slot for it.
    pub fn register(
        &self,
        method: &str,
    ) -> (u64, oneshot::Receiver<Result<Value, GatewayError>>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let prev = self.pending.lock().insert(
            id,
            Pending {
                method: method.to_string(),
                sent_at: Instant::now(),
                tx,
            },
        );
        debug_assert!(prev.is_none(), "request id collision: {id}");
        (id, rx)
    }

    /// Settle the pending call for `id`. A response with no matching
    /// entry (already settled, timed out, or never ours) is dropped with
    /// a diagnostic.
    pub fn complete(&self, id: u64, outcome: Result<Value, GatewayError>) {
        match self.pending.lock().remove(&id) {
            Some(p) => {
                tracing::debug!(
                    id,
                    method = %p.method,
                    elapsed_ms = p.sent_at.elapsed().as_millis() as u64,
                    ok = outcome.is_ok(),
                    "rpc settled"
                );
                let _ = p.tx.send(outcome);
            }
            None => {
                tracing::warn!(id, "dropping response for unknown rpc id");
            }
        }
    }

    /// Drop the entry for `id` without settling it (the caller stopped
    /// waiting). Returns whether an entry existed.
    pub fn forget(&self, id: u64) -> bool {
        self.pending.lock().remove(&id).is_some()
    }

    /// Reject every pending call and empty the table. Returns the number
    /// rejected.
    pub fn fail_all(&self, mk_err: impl Fn() -> GatewayError) -> usize {
        let drained: Vec<(u64, Pending)> = {
            let mut pending = self.pending.lock();
            pending.drain().collect()
        };
        let count = drained.len();
        for (id, p) in drained {
            tracing::debug!(id, method = %p.method, "rejecting pending rpc");
            let _ = p.tx.send(Err(mk_err()));
        }
        if count > 0 {
            tracing::warn!(count, "rejected in-flight rpc calls");
        }
        count
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn complete_wakes_waiter_once() {
        let table = CorrelationTable::new();
        let (id, rx) = table.register("models.list");
        assert_eq!(table.len(), 1);

        table.complete(id, Ok(serde_json::json!({"models": []})));
        assert_eq!(table.len(), 0);

        let outcome = rx.await.unwrap();
        assert_eq!(outcome.unwrap(), serde_json::json!({"models": []}));

        // A second response for the same id finds no entry and is dropped.
        table.complete(id, Ok(serde_json::json!("late")));
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn ids_are_unique_and_independent() {
        let table = CorrelationTable::new();
        let (id_a, rx_a) = table.register("health");
        let (id_b, rx_b) = table.register("health");
        assert_ne!(id_a, id_b);

        // Settle in reverse registration order.
        table.complete(id_b, Ok(serde_json::json!("b")));
        table.complete(id_a, Ok(serde_json::json!("a")));

        assert_eq!(rx_a.await.unwrap().unwrap(), serde_json::json!("a"));
        assert_eq!(rx_b.await.unwrap().unwrap(), serde_json::json!("b"));
    }

    #[test]
    fn unknown_id_is_dropped() {
        let table = CorrelationTable::new();
        table.complete(9999, Ok(serde_json::Value::Null));
    }

    #[tokio::test]
    async fn forget_makes_later_response_unknown() {
        let table = CorrelationTable::new();
        let (id, rx) = table.register("logs.tail");

        assert!(table.forget(id));
        assert!(!table.forget(id));
        assert_eq!(table.len(), 0);

        // The waiter sees a closed channel, not a value.
        assert!(rx.await.is_err());

        table.complete(id, Ok(serde_json::Value::Null));
    }

    #[tokio::test]
    async fn fail_all_rejects_everything() {
        let table = CorrelationTable::new();
        let (_, rx_a) = table.register("agents.list");
        let (_, rx_b) = table.register("sessions.list");

        assert_eq!(table.fail_all(|| GatewayError::Disconnected), 2);
        assert_eq!(table.len(), 0);

        for rx in [rx_a, rx_b] {
            match rx.await.unwrap() {
                Err(GatewayError::Disconnected) => {}
                other => panic!("expected Disconnected, got {other:?}"),
            }
        }
    }
}
