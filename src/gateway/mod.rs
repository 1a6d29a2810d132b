//! Persistent RPC client for the remote gateway
//!
//! Layered the same way top to bottom as the connection is used:
//! [`client`] is the public facade, [`connection`] owns the socket and the
//! state machine, [`pending`] correlates responses to callers, [`auth`] and
//! [`signing`] build the authenticated handshake, [`protocol`] is the wire
//! contract and [`transport`] moves frames.

pub mod auth;
pub mod client;
pub mod connection;
pub mod pending;
pub mod protocol;
pub mod signing;
pub mod transport;

pub use client::{GatewayClient, GatewayEvent, GatewayStatus};
pub use connection::SocketState;
