//! Configuration for gatewatch

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::GatewayError;
use crate::gateway::auth::AuthMode;
use crate::gateway::signing;

/// Configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Gateway host
    #[serde(default = "default_host")]
    pub gateway_host: String,

    /// Gateway port
    #[serde(default = "default_port")]
    pub gateway_port: u16,

    /// Bearer token for plain token auth
    #[serde(default)]
    pub auth_token: String,

    /// Device id for signed device auth
    #[serde(default)]
    pub device_id: Option<String>,

    /// Device token for signed device auth
    #[serde(default)]
    pub device_token: Option<String>,

    /// Device public key, URL-safe base64. Derived from the private key
    /// when omitted.
    #[serde(default)]
    pub device_public_key: Option<String>,

    /// Device private key, URL-safe base64 of a raw 32-byte Ed25519 seed
    #[serde(default)]
    pub device_private_key: Option<String>,

    /// Client id presented during the handshake
    #[serde(default = "default_client_id")]
    pub client_id: String,

    /// Human-readable client name presented during the handshake
    #[serde(default = "default_display_name")]
    pub display_name: String,

    /// Per-call timeout in milliseconds
    #[serde(default = "default_call_timeout")]
    pub call_timeout_ms: u64,

    /// Handshake deadline in milliseconds, armed when the socket opens
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_ms: u64,

    /// Reconnect backoff base delay in milliseconds
    #[serde(default = "default_reconnect_base")]
    pub reconnect_base_ms: u64,

    /// Reconnect backoff delay cap in milliseconds
    #[serde(default = "default_reconnect_cap")]
    pub reconnect_cap_ms: u64,
}

fn default_host() -> String {
    "localhost".to_string()
}

fn default_port() -> u16 {
    7070
}

fn default_client_id() -> String {
    "gateway-client".to_string()
}

fn default_display_name() -> String {
    "Gatewatch".to_string()
}

fn default_call_timeout() -> u64 {
    15_000
}

fn default_handshake_timeout() -> u64 {
    10_000
}

fn default_reconnect_base() -> u64 {
    1_000
}

fn default_reconnect_cap() -> u64 {
    30_000
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gateway_host: default_host(),
            gateway_port: default_port(),
            auth_token: String::new(),
            device_id: None,
            device_token: None,
            device_public_key: None,
            device_private_key: None,
            client_id: default_client_id(),
            display_name: default_display_name(),
            call_timeout_ms: default_call_timeout(),
            handshake_timeout_ms: default_handshake_timeout(),
            reconnect_base_ms: default_reconnect_base(),
            reconnect_cap_ms: default_reconnect_cap(),
        }
    }
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Save config to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), std::io::Error> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, content)
    }

    /// WebSocket URL of the gateway endpoint
    pub fn gateway_url(&self) -> String {
        format!("ws://{}:{}", self.gateway_host, self.gateway_port)
    }

    /// Auth scheme selected by credential presence, fixed for the process
    /// lifetime: full device credentials mean signed device auth, anything
    /// else means plain token auth.
    pub fn auth_mode(&self) -> AuthMode {
        let signed = self.device_id.is_some()
            && self.device_token.is_some()
            && self.device_private_key.is_some();
        if signed {
            AuthMode::SignedDevice
        } else {
            AuthMode::Token
        }
    }

    /// Reject unusable credential combinations at startup instead of
    /// mid-handshake.
    pub fn validate(&self) -> Result<(), GatewayError> {
        let configured = [
            self.device_id.is_some(),
            self.device_token.is_some(),
            self.device_private_key.is_some(),
        ]
        .iter()
        .filter(|present| **present)
        .count();
        if configured > 0 && configured < 3 {
            return Err(GatewayError::Config(
                "device auth requires device_id, device_token and device_private_key".to_string(),
            ));
        }

        match self.auth_mode() {
            AuthMode::SignedDevice => {
                if let Some(seed) = self.device_private_key.as_deref() {
                    signing::decode_seed(seed)?;
                }
            }
            AuthMode::Token => {
                if self.auth_token.is_empty() {
                    return Err(GatewayError::Config(
                        "auth_token is required without device credentials".to_string(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_config() -> Config {
        use base64::engine::general_purpose::URL_SAFE_NO_PAD;
        use base64::Engine;

        Config {
            device_id: Some("d1".to_string()),
            device_token: Some("dev-tok".to_string()),
            device_private_key: Some(URL_SAFE_NO_PAD.encode([7u8; 32])),
            ..Config::default()
        }
    }

    #[test]
    fn default_config_uses_token_auth() {
        let config = Config {
            auth_token: "tok".to_string(),
            ..Config::default()
        };
        assert_eq!(config.auth_mode(), AuthMode::Token);
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway_url(), "ws://localhost:7070");
        assert_eq!(config.call_timeout_ms, 15_000);
    }

    #[test]
    fn full_device_credentials_select_signed_auth() {
        let config = device_config();
        assert_eq!(config.auth_mode(), AuthMode::SignedDevice);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_device_credentials_are_rejected() {
        let config = Config {
            device_id: Some("d1".to_string()),
            ..Config::default()
        };
        assert_eq!(config.auth_mode(), AuthMode::Token);
        assert!(matches!(
            config.validate(),
            Err(GatewayError::Config(_))
        ));
    }

    #[test]
    fn missing_token_without_device_credentials_is_rejected() {
        let config = Config::default();
        assert!(matches!(config.validate(), Err(GatewayError::Config(_))));
    }

    #[test]
    fn malformed_device_key_is_rejected() {
        let config = Config {
            device_private_key: Some("not-a-key".to_string()),
            ..device_config()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_roundtrips_through_toml() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gatewatch.toml");

        let config = device_config();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.device_id.as_deref(), Some("d1"));
        assert_eq!(loaded.auth_mode(), AuthMode::SignedDevice);
        assert_eq!(loaded.gateway_port, config.gateway_port);
    }

    #[test]
    fn sparse_toml_falls_back_to_defaults() {
        let config: Config = toml::from_str(
            r#"
gateway_host = "gw.example.net"
auth_token = "tok"
"#,
        )
        .unwrap();
        assert_eq!(config.gateway_host, "gw.example.net");
        assert_eq!(config.gateway_port, 7070);
        assert_eq!(config.reconnect_cap_ms, 30_000);
    }
}
