//! Gateway Wire Protocol
//!
//! JSON text frames over the WebSocket, discriminated by a `type` tag:
//!
//! ```text
//! {"type": "event", "event": "connect.challenge", "payload": {"nonce"?}}
//! {"type": "event", "event": <name>, "payload": <any>}       // server push
//! {"type": "req",   "id", "method", "params"}                // outbound only
//! {"type": "res",   "id", "ok", "payload"?, "error"?}
//! ```
//!
//! Handshake completion is signalled by `payload.type == "hello-ok"` inside
//! the response to the initial `connect` request. Unrecognized tags are
//! protocol errors, not silently ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::GatewayError;

/// Protocol version spoken by this client, pinned on both bounds of the
/// connect request.
pub const PROTOCOL_VERSION: u32 = 3;

/// Server event that opens the handshake.
pub const CHALLENGE_EVENT: &str = "connect.challenge";

/// `payload.type` marker of a successful handshake response.
pub const HELLO_OK: &str = "hello-ok";

/// A single frame on the gateway socket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Frame {
    /// Server push, including the connect challenge.
    Event {
        event: String,
        #[serde(default)]
        payload: Value,
    },
    /// Correlated request.
    Req {
        id: String,
        method: String,
        params: Value,
    },
    /// Correlated response to an earlier `Req`.
    Res {
        id: String,
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<ErrorBody>,
    },
}

/// Error body of a failed response, forwarded verbatim to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// Decoded `hello-ok` payload of a successful connect response.
#[derive(Debug, Clone, Deserialize)]
pub struct Hello {
    #[serde(rename = "type")]
    pub kind: String,
    pub protocol: u32,
    #[serde(default)]
    pub server: Value,
}

impl Frame {
    /// Parse an inbound text frame.
    pub fn parse(text: &str) -> Result<Self, GatewayError> {
        serde_json::from_str(text)
            .map_err(|e| GatewayError::Protocol(format!("malformed frame: {}", e)))
    }

    /// Serialize for the wire.
    pub fn to_text(&self) -> Result<String, GatewayError> {
        serde_json::to_string(self)
            .map_err(|e| GatewayError::Internal(format!("frame encode failed: {}", e)))
    }
}
