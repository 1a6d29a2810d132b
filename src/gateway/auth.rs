//! Gateway Handshake Negotiation
//!
//! Builds the parameter object for the initial `connect` request, sent in
//! answer to the server's `connect.challenge` event.
//!
//! Two auth schemes, fixed at startup from configuration:
//!
//! - **Token**: plain bearer token. The gateway grants a reduced scope set;
//!   no device, role or scopes fields are sent.
//! - **SignedDevice**: device token plus an Ed25519 signature over the
//!   canonical auth payload (see [`crate::gateway::signing`]), requesting
//!   the operator role and its scopes.

use chrono::Utc;
use serde::Serialize;
use serde_json::Value;

use crate::config::Config;
use crate::error::GatewayError;
use crate::gateway::protocol::PROTOCOL_VERSION;
use crate::gateway::signing;

/// Client mode reported to the gateway.
pub const CLIENT_MODE: &str = "backend";

/// Role requested in signed device mode.
pub const OPERATOR_ROLE: &str = "operator";

/// Scopes requested in signed device mode, covering the RPC areas the
/// monitoring backend uses.
pub const OPERATOR_SCOPES: [&str; 3] = ["sessions.read", "files.read", "config.read"];

/// Authentication scheme, selected once at startup by credential presence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Token,
    SignedDevice,
}

/// Parameters of the initial `connect` request.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectParams {
    pub min_protocol: u32,
    pub max_protocol: u32,
    pub client: ClientInfo,
    pub auth: AuthBlock,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device: Option<DeviceBlock>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scopes: Option<Vec<String>>,
}

/// Client identity and display metadata.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub id: String,
    pub display_name: String,
    pub version: String,
    pub platform: String,
    pub mode: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthBlock {
    pub token: String,
}

/// Signed device identity attached in [`AuthMode::SignedDevice`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceBlock {
    pub id: String,
    pub public_key: String,
    pub signature: String,
    pub signed_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Build connect parameters for one handshake attempt.
///
/// `nonce` is the challenge nonce issued by the server, present only for
/// the v2 signed variant.
pub fn build_connect_params(
    config: &Config,
    nonce: Option<&str>,
) -> Result<ConnectParams, GatewayError> {
    let client = ClientInfo {
        id: config.client_id.clone(),
        display_name: config.display_name.clone(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        platform: std::env::consts::OS.to_string(),
        mode: CLIENT_MODE.to_string(),
    };

    match config.auth_mode() {
        AuthMode::Token => Ok(ConnectParams {
            min_protocol: PROTOCOL_VERSION,
            max_protocol: PROTOCOL_VERSION,
            client,
            auth: AuthBlock {
                token: config.auth_token.clone(),
            },
            device: None,
            role: None,
            scopes: None,
        }),
        AuthMode::SignedDevice => {
            let device_id = config
                .device_id
                .clone()
                .ok_or_else(|| GatewayError::Auth("device_id missing".to_string()))?;
            let device_token = config
                .device_token
                .clone()
                .ok_or_else(|| GatewayError::Auth("device_token missing".to_string()))?;
            let seed = config
                .device_private_key
                .as_deref()
                .ok_or_else(|| GatewayError::Auth("device_private_key missing".to_string()))
                .and_then(signing::decode_seed)?;

            let public_key = match &config.device_public_key {
                Some(key) => key.clone(),
                None => signing::derive_public_key(&seed),
            };

            let signed_at = Utc::now().timestamp_millis();
            let payload = signing::build_auth_payload(
                &device_id,
                &config.client_id,
                CLIENT_MODE,
                OPERATOR_ROLE,
                &OPERATOR_SCOPES,
                signed_at,
                &device_token,
                nonce,
            );
            let signature = signing::sign(&seed, payload.as_bytes());

            Ok(ConnectParams {
                min_protocol: PROTOCOL_VERSION,
                max_protocol: PROTOCOL_VERSION,
                client,
                auth: AuthBlock {
                    token: device_token,
                },
                device: Some(DeviceBlock {
                    id: device_id,
                    public_key,
                    signature: signing::encode_signature(&signature),
                    signed_at,
                    nonce: nonce.map(str::to_string),
                }),
                role: Some(OPERATOR_ROLE.to_string()),
                scopes: Some(OPERATOR_SCOPES.iter().map(|s| s.to_string()).collect()),
            })
        }
    }
}

/// Extract the optional challenge nonce from a `connect.challenge` payload.
pub fn challenge_nonce(payload: &Value) -> Option<String> {
    payload
        .get("nonce")
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE_NO_PAD;
    use base64::Engine;
    use ed25519_dalek::{Signature, Verifier, VerifyingKey};
    use serde_json::json;

    const SEED: [u8; 32] = [42u8; 32];

    fn token_config() -> Config {
        Config {
            auth_token: "bearer-tok".to_string(),
            ..Config::default()
        }
    }

    fn device_config() -> Config {
        Config {
            device_id: Some("d1".to_string()),
            device_token: Some("dev-tok".to_string()),
            device_private_key: Some(URL_SAFE_NO_PAD.encode(SEED)),
            ..Config::default()
        }
    }

    #[test]
    fn token_mode_sends_bearer_token_only() {
        let params = build_connect_params(&token_config(), None).unwrap();
        assert_eq!(params.min_protocol, PROTOCOL_VERSION);
        assert_eq!(params.max_protocol, PROTOCOL_VERSION);
        assert_eq!(params.auth.token, "bearer-tok");
        assert!(params.device.is_none());
        assert!(params.role.is_none());
        assert!(params.scopes.is_none());
    }

    #[test]
    fn token_mode_json_has_no_device_fields() {
        let params = build_connect_params(&token_config(), None).unwrap();
        let value = serde_json::to_value(&params).unwrap();
        assert_eq!(value["minProtocol"], 3);
        assert_eq!(value["maxProtocol"], 3);
        assert_eq!(value["client"]["id"], "gateway-client");
        assert_eq!(value["client"]["mode"], "backend");
        assert!(value["client"]["displayName"].is_string());
        assert!(value.get("device").is_none());
        assert!(value.get("role").is_none());
        assert!(value.get("scopes").is_none());
    }

    #[test]
    fn signed_mode_attaches_device_block_and_operator_scopes() {
        let params = build_connect_params(&device_config(), Some("n1")).unwrap();
        assert_eq!(params.auth.token, "dev-tok");
        assert_eq!(params.role.as_deref(), Some(OPERATOR_ROLE));
        assert_eq!(
            params.scopes.clone().unwrap(),
            ["sessions.read", "files.read", "config.read"]
        );

        let device = params.device.unwrap();
        assert_eq!(device.id, "d1");
        assert_eq!(device.nonce.as_deref(), Some("n1"));
        assert_eq!(
            device.public_key,
            signing::derive_public_key(&SEED)
        );
    }

    #[test]
    fn signed_mode_signature_verifies_against_rebuilt_payload() {
        let params = build_connect_params(&device_config(), Some("n1")).unwrap();
        let device = params.device.unwrap();

        let payload = signing::build_auth_payload(
            &device.id,
            "gateway-client",
            CLIENT_MODE,
            OPERATOR_ROLE,
            &OPERATOR_SCOPES,
            device.signed_at,
            &params.auth.token,
            device.nonce.as_deref(),
        );

        let key_bytes: [u8; 32] = URL_SAFE_NO_PAD
            .decode(&device.public_key)
            .unwrap()
            .try_into()
            .unwrap();
        let verifying_key = VerifyingKey::from_bytes(&key_bytes).unwrap();
        let sig_bytes: [u8; 64] = URL_SAFE_NO_PAD
            .decode(&device.signature)
            .unwrap()
            .try_into()
            .unwrap();
        let signature = Signature::from_bytes(&sig_bytes);

        assert!(verifying_key.verify(payload.as_bytes(), &signature).is_ok());
    }

    #[test]
    fn signed_mode_without_nonce_omits_nonce_field() {
        let params = build_connect_params(&device_config(), None).unwrap();
        let device = params.device.as_ref().unwrap();
        assert!(device.nonce.is_none());

        let value = serde_json::to_value(&params).unwrap();
        assert!(value["device"].get("nonce").is_none());
        assert!(value["device"]["publicKey"].is_string());
        assert!(value["device"]["signedAt"].is_i64());
    }

    #[test]
    fn configured_public_key_wins_over_derived() {
        let config = Config {
            device_public_key: Some("pinned-key".to_string()),
            ..device_config()
        };
        let params = build_connect_params(&config, None).unwrap();
        assert_eq!(params.device.unwrap().public_key, "pinned-key");
    }

    #[test]
    fn challenge_nonce_reads_optional_field() {
        assert_eq!(
            challenge_nonce(&json!({"nonce": "n1"})).as_deref(),
            Some("n1")
        );
        assert_eq!(challenge_nonce(&json!({})), None);
        assert_eq!(challenge_nonce(&json!(null)), None);
        assert_eq!(challenge_nonce(&json!({"nonce": 7})), None);
    }
}
