//! Device Auth Signature Engine
//!
//! Deterministic Ed25519 signing over a canonical, pipe-delimited payload
//! string. The payload layout is a wire contract with the gateway's
//! verifier; field order and delimiters must not change.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use ed25519_dalek::{Signature, Signer, SigningKey};

use crate::error::GatewayError;

/// Length of the raw Ed25519 seed accepted as a device private key.
pub const SEED_LEN: usize = 32;

/// Decode a device private key given as URL-safe base64 of a raw 32-byte
/// seed. Padding is accepted and ignored.
pub fn decode_seed(encoded: &str) -> Result<[u8; SEED_LEN], GatewayError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(encoded.trim_end_matches('='))
        .map_err(|e| {
            GatewayError::Auth(format!("device private key is not valid base64: {}", e))
        })?;
    <[u8; SEED_LEN]>::try_from(bytes.as_slice()).map_err(|_| {
        GatewayError::Auth(format!(
            "device private key must be a {}-byte seed, got {} bytes",
            SEED_LEN,
            bytes.len()
        ))
    })
}

/// Wrap a raw seed into a signing key and sign `payload`.
pub fn sign(seed: &[u8; SEED_LEN], payload: &[u8]) -> Signature {
    SigningKey::from_bytes(seed).sign(payload)
}

/// URL-safe base64 of the raw signature bytes.
pub fn encode_signature(signature: &Signature) -> String {
    URL_SAFE_NO_PAD.encode(signature.to_bytes())
}

/// Public key for a seed, URL-safe base64 encoded.
pub fn derive_public_key(seed: &[u8; SEED_LEN]) -> String {
    URL_SAFE_NO_PAD.encode(SigningKey::from_bytes(seed).verifying_key().to_bytes())
}

/// Build the canonical auth payload string:
///
/// ```text
/// v1|<deviceId>|<clientId>|<clientMode>|<role>|<scope1,scope2>|<signedAtMs>|<token>
/// ```
///
/// with a `v2` tag and a trailing `|<nonce>` field when the server issued a
/// nonce. Scopes keep their given order.
#[allow(clippy::too_many_arguments)]
pub fn build_auth_payload(
    device_id: &str,
    client_id: &str,
    client_mode: &str,
    role: &str,
    scopes: &[&str],
    signed_at_ms: i64,
    token: &str,
    nonce: Option<&str>,
) -> String {
    let scopes = scopes.join(",");
    match nonce {
        Some(nonce) => format!(
            "v2|{}|{}|{}|{}|{}|{}|{}|{}",
            device_id, client_id, client_mode, role, scopes, signed_at_ms, token, nonce
        ),
        None => format!(
            "v1|{}|{}|{}|{}|{}|{}|{}",
            device_id, client_id, client_mode, role, scopes, signed_at_ms, token
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::URL_SAFE;
    use ed25519_dalek::Verifier;

    #[test]
    fn auth_payload_without_nonce_is_v1() {
        let payload = build_auth_payload(
            "d1",
            "gateway-client",
            "backend",
            "operator",
            &["a", "b"],
            1000,
            "tok",
            None,
        );
        assert_eq!(payload, "v1|d1|gateway-client|backend|operator|a,b|1000|tok");
    }

    #[test]
    fn auth_payload_with_nonce_is_v2() {
        let payload = build_auth_payload(
            "d1",
            "gateway-client",
            "backend",
            "operator",
            &["a", "b"],
            1000,
            "tok",
            Some("n1"),
        );
        assert_eq!(
            payload,
            "v2|d1|gateway-client|backend|operator|a,b|1000|tok|n1"
        );
    }

    #[test]
    fn scopes_preserve_order() {
        let payload =
            build_auth_payload("d", "c", "backend", "operator", &["z", "a"], 1, "t", None);
        assert!(payload.contains("|z,a|"));
    }

    #[test]
    fn seed_decodes_with_and_without_padding() {
        let seed = [9u8; SEED_LEN];

        let unpadded = URL_SAFE_NO_PAD.encode(seed);
        assert_eq!(decode_seed(&unpadded).unwrap(), seed);

        let padded = URL_SAFE.encode(seed);
        assert!(padded.ends_with('='));
        assert_eq!(decode_seed(&padded).unwrap(), seed);
    }

    #[test]
    fn seed_with_wrong_length_is_rejected() {
        let short = URL_SAFE_NO_PAD.encode([7u8; 16]);
        assert!(matches!(decode_seed(&short), Err(GatewayError::Auth(_))));
    }

    #[test]
    fn seed_with_invalid_base64_is_rejected() {
        assert!(matches!(
            decode_seed("!!not base64!!"),
            Err(GatewayError::Auth(_))
        ));
    }

    #[test]
    fn signature_is_deterministic_and_verifies() {
        let seed = [42u8; SEED_LEN];
        let payload = build_auth_payload(
            "d1",
            "gateway-client",
            "backend",
            "operator",
            &["a", "b"],
            1000,
            "tok",
            Some("n1"),
        );

        let first = sign(&seed, payload.as_bytes());
        let second = sign(&seed, payload.as_bytes());
        assert_eq!(first.to_bytes(), second.to_bytes());

        let verifying_key = SigningKey::from_bytes(&seed).verifying_key();
        assert!(verifying_key.verify(payload.as_bytes(), &first).is_ok());
    }

    #[test]
    fn derived_public_key_matches_signing_key() {
        let seed = [3u8; SEED_LEN];
        let encoded = derive_public_key(&seed);
        let decoded = URL_SAFE_NO_PAD.decode(&encoded).unwrap();
        assert_eq!(
            decoded.as_slice(),
            SigningKey::from_bytes(&seed).verifying_key().as_bytes()
        );
    }
}
