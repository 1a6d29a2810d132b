//! Gatewatch Daemon
//!
//! Keeps the persistent RPC connection to the remote gateway alive and logs
//! lifecycle transitions and pushed events. In the full deployment the HTTP
//! dashboard, the health probes and the alert notifier all consume the same
//! `GatewayClient` this binary drives.
//!
//! ## Usage
//!
//! ```bash
//! # Plain token auth
//! gatewatch --gateway-host gw.example.net --auth-token tok
//!
//! # Signed device auth (elevated operator scopes)
//! GATEWAY_DEVICE_ID=d1 \
//! GATEWAY_DEVICE_TOKEN=dev-tok \
//! GATEWAY_DEVICE_PRIVATE_KEY=<url-safe base64 seed> \
//! gatewatch --gateway-host gw.example.net
//!
//! # With a config file, overridden per flag
//! gatewatch --config /etc/gatewatch.toml --gateway-port 7071
//! ```

use clap::Parser;
use gatewatch::{Config, GatewayClient, GatewayEvent};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gatewatch")]
#[command(about = "Monitoring backend for a remote gateway service")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Gateway host
    #[arg(long, env = "GATEWAY_HOST")]
    gateway_host: Option<String>,

    /// Gateway port
    #[arg(long, env = "GATEWAY_PORT")]
    gateway_port: Option<u16>,

    /// Bearer token for plain token auth
    #[arg(long, env = "GATEWAY_AUTH_TOKEN")]
    auth_token: Option<String>,

    /// Device id for signed device auth
    #[arg(long, env = "GATEWAY_DEVICE_ID")]
    device_id: Option<String>,

    /// Device token for signed device auth
    #[arg(long, env = "GATEWAY_DEVICE_TOKEN")]
    device_token: Option<String>,

    /// Device public key (URL-safe base64; derived from the private key
    /// when omitted)
    #[arg(long, env = "GATEWAY_DEVICE_PUBLIC_KEY")]
    device_public_key: Option<String>,

    /// Device private key (URL-safe base64 of a 32-byte Ed25519 seed)
    #[arg(long, env = "GATEWAY_DEVICE_PRIVATE_KEY")]
    device_private_key: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("gatewatch=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let mut config = if let Some(config_path) = &args.config {
        Config::load(config_path)?
    } else {
        Config::default()
    };

    // Apply CLI/env overrides
    if let Some(host) = args.gateway_host {
        config.gateway_host = host;
    }
    if let Some(port) = args.gateway_port {
        config.gateway_port = port;
    }
    if let Some(token) = args.auth_token {
        config.auth_token = token;
    }
    if args.device_id.is_some() {
        config.device_id = args.device_id;
    }
    if args.device_token.is_some() {
        config.device_token = args.device_token;
    }
    if args.device_public_key.is_some() {
        config.device_public_key = args.device_public_key;
    }
    if args.device_private_key.is_some() {
        config.device_private_key = args.device_private_key;
    }

    config.validate()?;
    info!(
        url = %config.gateway_url(),
        mode = ?config.auth_mode(),
        "Starting gatewatch"
    );

    let client = Arc::new(GatewayClient::new(config));
    let mut events = client.subscribe();
    client.connect().await;

    let event_logger = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(GatewayEvent::Connected { protocol, server }) => {
                    info!(protocol, server = %server, "Gateway connected");
                }
                Ok(GatewayEvent::Disconnected) => {
                    warn!("Gateway disconnected");
                }
                Ok(GatewayEvent::Push { event, payload }) => {
                    info!(event = %event, payload = %payload, "Gateway event");
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event subscriber lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");
    client.disconnect().await;
    event_logger.abort();

    Ok(())
}
