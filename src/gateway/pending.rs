//! Pending Call Correlation Table
//!
//! Tracks in-flight requests by correlation id so one socket can multiplex
//! arbitrary concurrent calls. Every registered id is completed exactly
//! once: by a matching response, an explicit rejection, its own timeout or
//! the connection closing. Completion always goes through an atomic
//! take-if-present on the shared map, so late and duplicate frames are
//! no-ops.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::error::GatewayError;

/// Result delivered to a waiting caller.
pub type CallResult = Result<Value, GatewayError>;

struct PendingEntry {
    method: String,
    tx: oneshot::Sender<CallResult>,
    timer: JoinHandle<()>,
}

/// Shared table of in-flight calls, keyed by correlation id.
#[derive(Clone)]
pub struct PendingCalls {
    inner: Arc<Mutex<HashMap<String, PendingEntry>>>,
}

impl PendingCalls {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Insert a pending entry and arm its expiry timer.
    ///
    /// The returned receiver completes exactly once. A duplicate id cannot
    /// happen with fresh UUIDs; if one does, only the new caller fails and
    /// the existing entry is untouched.
    pub async fn register(
        &self,
        id: &str,
        method: &str,
        timeout: Duration,
    ) -> oneshot::Receiver<CallResult> {
        let (tx, rx) = oneshot::channel();

        let mut entries = self.inner.lock().await;
        if entries.contains_key(id) {
            error!(id = %id, method = %method, "Duplicate correlation id");
            let _ = tx.send(Err(GatewayError::Internal(format!(
                "duplicate correlation id {}",
                id
            ))));
            return rx;
        }

        let timer = {
            let table = self.clone();
            let id = id.to_string();
            let method = method.to_string();
            tokio::spawn(async move {
                tokio::time::sleep(timeout).await;
                table.expire(&id, &method, timeout).await;
            })
        };

        entries.insert(
            id.to_string(),
            PendingEntry {
                method: method.to_string(),
                tx,
                timer,
            },
        );
        rx
    }

    /// Complete a call with its response payload. Unknown ids are logged
    /// and dropped, covering late or duplicate frames.
    pub async fn resolve(&self, id: &str, payload: Value) {
        match self.take(id).await {
            Some(entry) => {
                entry.timer.abort();
                let _ = entry.tx.send(Ok(payload));
            }
            None => debug!(id = %id, "Response for unknown call id, dropping"),
        }
    }

    /// Complete a call with an error. Unknown ids are logged and dropped.
    pub async fn reject(&self, id: &str, error: GatewayError) {
        match self.take(id).await {
            Some(entry) => {
                entry.timer.abort();
                let _ = entry.tx.send(Err(error));
            }
            None => debug!(id = %id, "Rejection for unknown call id, dropping"),
        }
    }

    /// Reject every pending call with a connection-closed error and clear
    /// the table. Safe to call with no pending entries.
    pub async fn expire_all(&self) {
        let drained: Vec<(String, PendingEntry)> = {
            let mut entries = self.inner.lock().await;
            entries.drain().collect()
        };
        for (id, entry) in drained {
            debug!(id = %id, method = %entry.method, "Rejecting pending call, connection closed");
            entry.timer.abort();
            let _ = entry.tx.send(Err(GatewayError::ConnectionClosed));
        }
    }

    /// Number of in-flight calls.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    async fn take(&self, id: &str) -> Option<PendingEntry> {
        self.inner.lock().await.remove(id)
    }

    /// Timer body: remove only this entry and reject it with a timeout
    /// error naming the method. Siblings are unaffected.
    async fn expire(&self, id: &str, method: &str, timeout: Duration) {
        if let Some(entry) = self.take(id).await {
            debug!(id = %id, method = %method, "Call timed out");
            let _ = entry.tx.send(Err(GatewayError::CallTimeout {
                method: method.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }));
        }
    }
}

impl Default for PendingCalls {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const LONG: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn resolve_completes_exactly_once() {
        let table = PendingCalls::new();
        let rx = table.register("a", "status.get", LONG).await;

        table.resolve("a", json!({"ok": true})).await;
        // a duplicate frame for the same id is a no-op
        table.resolve("a", json!({"ok": false})).await;

        let result = rx.await.unwrap().unwrap();
        assert_eq!(result["ok"], true);
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn reject_carries_the_error_through() {
        let table = PendingCalls::new();
        let rx = table.register("a", "sessions.list", LONG).await;

        table
            .reject(
                "a",
                GatewayError::Remote {
                    message: "denied".to_string(),
                    code: Some("forbidden".to_string()),
                    details: None,
                },
            )
            .await;

        match rx.await.unwrap().unwrap_err() {
            GatewayError::Remote { message, code, .. } => {
                assert_eq!(message, "denied");
                assert_eq!(code.as_deref(), Some("forbidden"));
            }
            other => panic!("expected remote error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn timeout_rejects_and_removes_entry() {
        let table = PendingCalls::new();
        let rx = table
            .register("a", "sessions.list", Duration::from_millis(20))
            .await;

        match rx.await.unwrap().unwrap_err() {
            GatewayError::CallTimeout { method, timeout_ms } => {
                assert_eq!(method, "sessions.list");
                assert_eq!(timeout_ms, 20);
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(table.len().await, 0);
    }

    #[tokio::test]
    async fn timeout_leaves_sibling_entries_alone() {
        let table = PendingCalls::new();
        let short = table.register("a", "m1", Duration::from_millis(20)).await;
        let long = table.register("b", "m2", LONG).await;

        assert!(matches!(
            short.await.unwrap().unwrap_err(),
            GatewayError::CallTimeout { .. }
        ));
        assert_eq!(table.len().await, 1);

        table.resolve("b", Value::Null).await;
        assert!(long.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn expire_all_rejects_everything() {
        let table = PendingCalls::new();
        let rx1 = table.register("a", "m1", LONG).await;
        let rx2 = table.register("b", "m2", LONG).await;

        table.expire_all().await;

        assert!(matches!(
            rx1.await.unwrap().unwrap_err(),
            GatewayError::ConnectionClosed
        ));
        assert!(matches!(
            rx2.await.unwrap().unwrap_err(),
            GatewayError::ConnectionClosed
        ));
        assert!(table.is_empty().await);

        // idempotent on an empty table
        table.expire_all().await;
    }

    #[tokio::test]
    async fn unknown_ids_are_ignored() {
        let table = PendingCalls::new();
        table.resolve("missing", Value::Null).await;
        table.reject("missing", GatewayError::ConnectionClosed).await;
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn duplicate_id_fails_only_the_new_caller() {
        let table = PendingCalls::new();
        let first = table.register("a", "m", LONG).await;
        let second = table.register("a", "m", LONG).await;

        assert!(matches!(
            second.await.unwrap().unwrap_err(),
            GatewayError::Internal(_)
        ));

        table.resolve("a", Value::Null).await;
        assert!(first.await.unwrap().is_ok());
    }
}
