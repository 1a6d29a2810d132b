//! Gatewatch - monitoring backend for a remote gateway service
//!
//! The heart of the crate is a persistent RPC client that keeps a single
//! authenticated WebSocket connection to the gateway alive, multiplexes
//! concurrent request/response pairs over it and recovers from
//! disconnection on its own.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────┐
//! │                    GatewayClient                        │
//! │  - connect() / call() / status() / disconnect()         │
//! │  - event subscription (lifecycle + server pushes)       │
//! └────────────────────────────────────────────────────────┘
//!                            │
//!                            ▼
//! ┌────────────────────────────────────────────────────────┐
//! │               Connection supervisor task                │
//! │  - state machine, handshake, reconnect backoff          │
//! │  - routes inbound frames by correlation id              │
//! └────────────────────────────────────────────────────────┘
//!                            │
//!               ┌────────────┼────────────┐
//!               ▼            ▼            ▼
//!          Transport      Protocol    Auth + Signing
//! ```
//!
//! The HTTP dashboard, probes and the alert notifier of the full deployment
//! all talk to the gateway through the [`GatewayClient`] facade; nothing
//! else touches the socket or the pending-call table.

pub mod config;
pub mod error;
pub mod gateway;

pub use config::Config;
pub use error::GatewayError;
pub use gateway::{GatewayClient, GatewayEvent, GatewayStatus, SocketState};
