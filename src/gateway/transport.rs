//! WebSocket transport for the gateway connection
//!
//! Single responsibility: open the socket and hand back its two halves.
//! No knowledge of the RPC protocol, authentication or lifecycle.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::StreamExt;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::GatewayError;

/// Send half of the gateway WebSocket
pub type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>, Message>;

/// Receive half of the gateway WebSocket
pub type WsStream = SplitStream<WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>>;

/// Open a WebSocket to the gateway and split it for concurrent send/receive.
pub async fn connect(url: &str) -> Result<(WsSink, WsStream), GatewayError> {
    debug!(url = %url, "Opening gateway socket");

    let (ws, _) = connect_async(url)
        .await
        .map_err(|e| GatewayError::Transport(format!("WebSocket connect failed: {}", e)))?;

    debug!(url = %url, "Gateway socket open");
    Ok(ws.split())
}
