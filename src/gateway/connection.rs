//! Gateway Connection Lifecycle
//!
//! Owns the socket and drives the connection state machine:
//!
//! ```text
//! Closed ──connect()──► Connecting ──socket open──► Open
//!    ▲                                               │ challenge
//!    │                                          Handshaking
//!    │  error / close / handshake timeout            │ hello-ok
//!    └───────── backoff, reconnect ◄──────────────  Ready
//! ```
//!
//! A single supervisor task per client runs connection attempts in a loop.
//! Teardown of every attempt rejects all pending calls, clears the server
//! metadata and, if the attempt had reached Ready, emits a Disconnected
//! event. The supervisor then sleeps the backoff delay and retries, so at
//! most one reconnect wait exists at any time. The backoff resets to its
//! base the moment an attempt reaches Ready.
//!
//! The handshake request id is tracked explicitly for the lifetime of the
//! attempt; the first response carrying that id is the handshake outcome
//! and never reaches the correlation table.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch, RwLock};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Config;
use crate::error::GatewayError;
use crate::gateway::auth;
use crate::gateway::client::GatewayEvent;
use crate::gateway::pending::PendingCalls;
use crate::gateway::protocol::{ErrorBody, Frame, Hello, CHALLENGE_EVENT, HELLO_OK};
use crate::gateway::transport;

/// Connection state machine states. [`SocketState::Ready`] is the only
/// state in which calls may succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Closed,
    Connecting,
    Open,
    Handshaking,
    Ready,
}

/// Exponential reconnect backoff: doubles per failed attempt, saturates at
/// the cap, resets to base when a connection reaches Ready.
#[derive(Debug)]
pub struct Backoff {
    base: Duration,
    cap: Duration,
    next: Duration,
}

impl Backoff {
    pub fn new(base: Duration, cap: Duration) -> Self {
        Self {
            base,
            cap,
            next: base,
        }
    }

    /// Delay to wait before the next attempt; advances the schedule.
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.next;
        self.next = std::cmp::min(delay * 2, self.cap);
        delay
    }

    pub fn reset(&mut self) {
        self.next = self.base;
    }
}

/// Connection state shared between the supervisor task and the facade.
/// The supervisor is the sole writer.
pub(crate) struct Shared {
    pub(crate) state: RwLock<ConnState>,
    pub(crate) pending: PendingCalls,
    pub(crate) events_tx: broadcast::Sender<GatewayEvent>,
}

pub(crate) struct ConnState {
    pub(crate) socket: SocketState,
    pub(crate) connected_at: Option<DateTime<Utc>>,
    pub(crate) server_info: Option<Value>,
    pub(crate) outbound: Option<mpsc::UnboundedSender<Message>>,
}

impl Shared {
    pub(crate) fn new(event_capacity: usize) -> Self {
        let (events_tx, _) = broadcast::channel(event_capacity);
        Self {
            state: RwLock::new(ConnState {
                socket: SocketState::Closed,
                connected_at: None,
                server_info: None,
                outbound: None,
            }),
            pending: PendingCalls::new(),
            events_tx,
        }
    }

    async fn set_socket(&self, socket: SocketState) {
        self.state.write().await.socket = socket;
    }
}

/// Supervisor body: run connection attempts until shutdown is requested.
pub(crate) async fn run(
    shared: Arc<Shared>,
    config: Arc<Config>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = Backoff::new(
        Duration::from_millis(config.reconnect_base_ms),
        Duration::from_millis(config.reconnect_cap_ms),
    );

    loop {
        run_attempt(&shared, &config, &mut backoff, &mut shutdown).await;
        teardown(&shared).await;

        if *shutdown.borrow() {
            break;
        }

        let delay = backoff.next_delay();
        info!(delay_ms = delay.as_millis() as u64, "Scheduling gateway reconnect");
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => break,
        }
    }

    debug!("Gateway supervisor stopped");
}

/// One connection attempt: open the socket, handshake, then pump frames
/// until the connection dies or shutdown is requested.
async fn run_attempt(
    shared: &Arc<Shared>,
    config: &Config,
    backoff: &mut Backoff,
    shutdown: &mut watch::Receiver<bool>,
) {
    shared.set_socket(SocketState::Connecting).await;
    info!(url = %config.gateway_url(), "Connecting to gateway");

    // Bound the socket open itself as well, and keep it interruptible so
    // disconnect() never waits on a stalled upgrade.
    let gateway_url = config.gateway_url();
    let connecting = tokio::time::timeout(
        Duration::from_millis(config.handshake_timeout_ms),
        transport::connect(&gateway_url),
    );
    let (mut sink, mut stream) = tokio::select! {
        connected = connecting => match connected {
            Ok(Ok(halves)) => halves,
            Ok(Err(e)) => {
                warn!(error = %e, "Gateway connect failed");
                return;
            }
            Err(_) => {
                warn!(
                    timeout_ms = config.handshake_timeout_ms,
                    "Gateway connect timed out"
                );
                return;
            }
        },
        _ = shutdown.changed() => return,
    };

    // Socket is open: arm the handshake deadline and publish the outbound
    // channel so the facade can send once we reach Ready.
    let handshake_deadline = Instant::now() + Duration::from_millis(config.handshake_timeout_ms);
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Message>();
    {
        let mut state = shared.state.write().await;
        state.socket = SocketState::Open;
        state.outbound = Some(out_tx.clone());
    }

    let mut attempt = Attempt {
        shared,
        config,
        out_tx: &out_tx,
        backoff,
        handshake_id: None,
        ready: false,
    };

    loop {
        let ready = attempt.ready;
        tokio::select! {
            // Outbound frames from the facade and the handshake.
            Some(message) = out_rx.recv() => {
                if let Err(e) = sink.send(message).await {
                    warn!(error = %e, "Gateway send failed");
                    break;
                }
            }

            // Inbound frames.
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => match Frame::parse(&text) {
                    Ok(frame) => {
                        if !attempt.handle_frame(frame).await {
                            break;
                        }
                    }
                    Err(e) => warn!(error = %e, "Dropping malformed gateway frame"),
                },
                Some(Ok(Message::Close(frame))) => {
                    info!(frame = ?frame, "Gateway closed the connection");
                    break;
                }
                // Pong is handled by tungstenite; other frames carry nothing for us.
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(error = %e, "Gateway socket error");
                    break;
                }
                None => {
                    info!("Gateway stream ended");
                    break;
                }
            },

            // The handshake must finish before the deadline.
            _ = tokio::time::sleep_until(handshake_deadline), if !ready => {
                warn!(
                    timeout_ms = config.handshake_timeout_ms,
                    "Gateway handshake timed out, closing"
                );
                break;
            }

            _ = shutdown.changed() => {
                debug!("Shutdown requested, closing gateway socket");
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

/// Entry into Closed: reject all pending calls, clear the Ready-only
/// metadata atomically and notify subscribers if the connection had been
/// up.
async fn teardown(shared: &Shared) {
    let was_ready = {
        let mut state = shared.state.write().await;
        let was_ready = state.socket == SocketState::Ready;
        state.socket = SocketState::Closed;
        state.connected_at = None;
        state.server_info = None;
        state.outbound = None;
        was_ready
    };

    shared.pending.expire_all().await;

    if was_ready {
        let _ = shared.events_tx.send(GatewayEvent::Disconnected);
    }
}

/// Per-attempt frame handling state. `handle_frame` returns false when the
/// attempt must be aborted (handshake failure or unusable socket).
struct Attempt<'a> {
    shared: &'a Arc<Shared>,
    config: &'a Config,
    out_tx: &'a mpsc::UnboundedSender<Message>,
    backoff: &'a mut Backoff,
    handshake_id: Option<String>,
    ready: bool,
}

impl Attempt<'_> {
    async fn handle_frame(&mut self, frame: Frame) -> bool {
        match frame {
            Frame::Event { event, payload } if event == CHALLENGE_EVENT => {
                self.handle_challenge(&payload).await
            }
            Frame::Event { event, payload } => {
                // Server push, forwarded verbatim.
                let _ = self.shared.events_tx.send(GatewayEvent::Push { event, payload });
                true
            }
            Frame::Res {
                id,
                ok,
                payload,
                error,
            } => {
                if !self.ready && self.handshake_id.as_deref() == Some(id.as_str()) {
                    self.handle_handshake_response(ok, payload, error).await
                } else {
                    self.route_response(&id, ok, payload, error).await;
                    true
                }
            }
            Frame::Req { method, .. } => {
                warn!(method = %method, "Gateway sent a request frame, dropping");
                true
            }
        }
    }

    async fn handle_challenge(&mut self, payload: &Value) -> bool {
        if self.ready || self.handshake_id.is_some() {
            warn!("Unexpected connect.challenge, ignoring");
            return true;
        }

        let nonce = auth::challenge_nonce(payload);
        let params = match auth::build_connect_params(self.config, nonce.as_deref()) {
            Ok(params) => params,
            Err(e) => {
                warn!(error = %e, "Cannot build connect request, closing");
                return false;
            }
        };
        let params = match serde_json::to_value(&params) {
            Ok(value) => value,
            Err(e) => {
                warn!(error = %e, "Cannot encode connect request, closing");
                return false;
            }
        };

        let id = Uuid::new_v4().to_string();
        let frame = Frame::Req {
            id: id.clone(),
            method: "connect".to_string(),
            params,
        };
        let text = match frame.to_text() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Cannot encode connect request, closing");
                return false;
            }
        };

        self.shared.set_socket(SocketState::Handshaking).await;
        self.handshake_id = Some(id);

        debug!(has_nonce = nonce.is_some(), "Sending connect request");
        self.out_tx.send(Message::Text(text)).is_ok()
    }

    async fn handle_handshake_response(
        &mut self,
        ok: bool,
        payload: Option<Value>,
        error: Option<ErrorBody>,
    ) -> bool {
        if !ok {
            let message = error
                .map(|e| e.message)
                .unwrap_or_else(|| "unspecified".to_string());
            warn!(error = %message, "Gateway rejected handshake, closing");
            return false;
        }

        let hello: Hello = match payload.and_then(|p| serde_json::from_value(p).ok()) {
            Some(hello) => hello,
            None => {
                warn!("Handshake response payload is not hello-ok, closing");
                return false;
            }
        };
        if hello.kind != HELLO_OK {
            warn!(kind = %hello.kind, "Unexpected handshake payload type, closing");
            return false;
        }

        {
            let mut state = self.shared.state.write().await;
            state.socket = SocketState::Ready;
            state.connected_at = Some(Utc::now());
            state.server_info = Some(hello.server.clone());
        }
        self.ready = true;
        self.handshake_id = None;
        self.backoff.reset();

        info!(protocol = hello.protocol, "Gateway connection ready");
        let _ = self.shared.events_tx.send(GatewayEvent::Connected {
            protocol: hello.protocol,
            server: hello.server,
        });
        true
    }

    async fn route_response(
        &self,
        id: &str,
        ok: bool,
        payload: Option<Value>,
        error: Option<ErrorBody>,
    ) {
        if ok {
            self.shared
                .pending
                .resolve(id, payload.unwrap_or(Value::Null))
                .await;
        } else {
            let error = match error {
                Some(body) => GatewayError::Remote {
                    message: body.message,
                    code: body.code,
                    details: body.details,
                },
                None => GatewayError::Remote {
                    message: "unspecified gateway error".to_string(),
                    code: None,
                    details: None,
                },
            };
            self.shared.pending.reject(id, error).await;
        }
    }
}
