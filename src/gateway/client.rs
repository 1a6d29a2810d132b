//! Public Gateway Client Facade
//!
//! The only surface other components use: issue calls, read status,
//! subscribe to events, connect and disconnect. The facade never touches
//! the socket itself; it shares state with the connection supervisor and
//! hands outbound frames to it.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::Config;
use crate::error::GatewayError;
use crate::gateway::connection::{self, Shared, SocketState};
use crate::gateway::protocol::Frame;

/// Capacity of the subscriber broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Notifications delivered to subscribers.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// Handshake completed; the connection is ready for calls.
    Connected { protocol: u32, server: Value },
    /// A previously ready connection was lost.
    Disconnected,
    /// Opaque server push, forwarded without interpretation.
    Push { event: String, payload: Value },
}

/// Point-in-time connection snapshot for the API layer.
#[derive(Debug, Clone, Serialize)]
pub struct GatewayStatus {
    pub connected: bool,
    pub connected_at: Option<DateTime<Utc>>,
    pub uptime_secs: Option<i64>,
    pub server: Option<Value>,
    pub pending_calls: usize,
}

struct Supervisor {
    task: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

/// Persistent RPC client for the remote gateway.
///
/// One instance per process, shared via `Arc`; collaborators interact only
/// through this facade and its event stream.
pub struct GatewayClient {
    config: Arc<Config>,
    shared: Arc<Shared>,
    supervisor: Mutex<Option<Supervisor>>,
}

impl GatewayClient {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            shared: Arc::new(Shared::new(EVENT_CHANNEL_CAPACITY)),
            supervisor: Mutex::new(None),
        }
    }

    /// Start the connection lifecycle. Idempotent: a no-op while a
    /// supervisor is already running.
    pub async fn connect(&self) {
        let mut supervisor = self.supervisor.lock().await;
        if let Some(existing) = supervisor.as_ref() {
            if !existing.task.is_finished() {
                debug!("Gateway client already connecting");
                return;
            }
        }

        info!(url = %self.config.gateway_url(), "Starting gateway client");
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(connection::run(
            Arc::clone(&self.shared),
            Arc::clone(&self.config),
            shutdown_rx,
        ));
        *supervisor = Some(Supervisor { task, shutdown_tx });
    }

    /// Issue a correlated RPC call.
    ///
    /// Fails immediately with a not-ready error unless the connection is
    /// Ready; there is no implicit queueing, callers retry at a higher
    /// layer. Otherwise the result arrives when the gateway responds, the
    /// call times out or the connection is lost - exactly one of the three.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value, GatewayError> {
        let outbound = {
            let state = self.shared.state.read().await;
            if state.socket != SocketState::Ready {
                return Err(GatewayError::NotReady);
            }
            state.outbound.clone().ok_or(GatewayError::NotReady)?
        };

        let id = Uuid::new_v4().to_string();
        let frame = Frame::Req {
            id: id.clone(),
            method: method.to_string(),
            params,
        };
        let text = frame.to_text()?;

        let timeout = Duration::from_millis(self.config.call_timeout_ms);
        let rx = self.shared.pending.register(&id, method, timeout).await;

        debug!(id = %id, method = %method, "Sending gateway call");
        if outbound.send(Message::Text(text)).is_err() {
            // The connection died between the readiness check and the send.
            self.shared
                .pending
                .reject(&id, GatewayError::ConnectionClosed)
                .await;
        }

        match rx.await {
            Ok(result) => result,
            Err(_) => Err(GatewayError::ConnectionClosed),
        }
    }

    /// Point-in-time snapshot; never blocks on the connection task.
    pub async fn status(&self) -> GatewayStatus {
        let (connected, connected_at, server) = {
            let state = self.shared.state.read().await;
            (
                state.socket == SocketState::Ready,
                state.connected_at,
                state.server_info.clone(),
            )
        };
        GatewayStatus {
            connected,
            connected_at,
            uptime_secs: connected_at.map(|at| (Utc::now() - at).num_seconds()),
            server,
            pending_calls: self.shared.pending.len().await,
        }
    }

    /// Current state machine state.
    pub async fn socket_state(&self) -> SocketState {
        self.shared.state.read().await.socket
    }

    /// Stop the client: cancel any scheduled reconnect, close the socket
    /// and stay Closed until `connect()` is called again.
    pub async fn disconnect(&self) {
        let supervisor = self.supervisor.lock().await.take();
        if let Some(supervisor) = supervisor {
            info!("Stopping gateway client");
            let _ = supervisor.shutdown_tx.send(true);
            let _ = supervisor.task.await;
        }
    }

    /// Subscribe to connection lifecycle events and server pushes.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.shared.events_tx.subscribe()
    }
}
