//! Error types for gatewatch

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("gateway connection is not ready")]
    NotReady,

    #[error("call to {method} timed out after {timeout_ms}ms")]
    CallTimeout { method: String, timeout_ms: u64 },

    #[error("gateway rejected call: {message}")]
    Remote {
        message: String,
        code: Option<String>,
        details: Option<serde_json::Value>,
    },

    #[error("connection closed")]
    ConnectionClosed,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Stable machine-readable code for API consumers.
    ///
    /// Remote errors additionally carry the gateway's own code in the
    /// `Remote::code` field, forwarded verbatim.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::NotReady => "not_ready",
            GatewayError::CallTimeout { .. } => "timeout",
            GatewayError::Remote { .. } => "remote_error",
            GatewayError::ConnectionClosed => "connection_closed",
            GatewayError::Transport(_) => "transport_error",
            GatewayError::Protocol(_) => "protocol_error",
            GatewayError::Auth(_) => "auth_error",
            GatewayError::Config(_) => "config_error",
            GatewayError::Internal(_) => "internal_error",
        }
    }
}
