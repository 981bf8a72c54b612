//! Session-token crypto.
//!
//! The server issues a single signed session cookie instead of the classic
//! pair of an opaque bearer token plus a plaintext login cookie: the token is
//! self-contained (login + expiry, HMAC-SHA256 signed), so authorization has
//! exactly one credential to verify.
//!
//! Pure Rust crates only (hmac/sha2/getrandom), no TLS-stack dependency.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::ServiceError;

/// Session header (always HS256).
const SESSION_HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;

/// Session lifetime: 24 hours in seconds.
pub const SESSION_TTL_SECS: u64 = 24 * 3600;

/// OAuth state cookie lifetime: 5 minutes in seconds.
pub const STATE_TTL_SECS: u64 = 300;

/// Sign a session token for the given login. Returns the encoded token.
pub fn sign_session(login: &str, secret: &str, now_unix: u64) -> String {
    let header_b64 = URL_SAFE_NO_PAD.encode(SESSION_HEADER.as_bytes());

    let payload = serde_json::json!({
        "sub": login,
        "iat": now_unix,
        "exp": now_unix + SESSION_TTL_SECS,
    });
    let payload_b64 = URL_SAFE_NO_PAD.encode(payload.to_string().as_bytes());

    let signing_input = format!("{header_b64}.{payload_b64}");
    let signature = hmac_sha256(secret.as_bytes(), signing_input.as_bytes());
    let sig_b64 = URL_SAFE_NO_PAD.encode(signature);

    format!("{signing_input}.{sig_b64}")
}

/// Verify a session token and return the `sub` (login) if valid.
pub fn verify_session(token: &str, secret: &str, now_unix: u64) -> Result<String, ServiceError> {
    let parts: Vec<&str> = token.split('.').collect();
    if parts.len() != 3 {
        return Err(ServiceError::Unauthorized(
            "invalid session token format".into(),
        ));
    }

    let signing_input = format!("{}.{}", parts[0], parts[1]);
    let expected_sig = hmac_sha256(secret.as_bytes(), signing_input.as_bytes());
    let actual_sig = URL_SAFE_NO_PAD
        .decode(parts[2])
        .map_err(|_| ServiceError::Unauthorized("invalid session signature encoding".into()))?;

    // Constant-time comparison
    if expected_sig.len() != actual_sig.len()
        || !expected_sig
            .iter()
            .zip(actual_sig.iter())
            .all(|(a, b)| a == b)
    {
        return Err(ServiceError::Unauthorized(
            "invalid session signature".into(),
        ));
    }

    let payload_bytes = URL_SAFE_NO_PAD
        .decode(parts[1])
        .map_err(|_| ServiceError::Unauthorized("invalid session payload encoding".into()))?;
    let payload: serde_json::Value = serde_json::from_slice(&payload_bytes)
        .map_err(|_| ServiceError::Unauthorized("invalid session payload".into()))?;

    let exp = payload["exp"]
        .as_u64()
        .ok_or_else(|| ServiceError::Unauthorized("missing exp claim".into()))?;
    if now_unix > exp {
        return Err(ServiceError::Unauthorized("session expired".into()));
    }

    let sub = payload["sub"]
        .as_str()
        .ok_or_else(|| ServiceError::Unauthorized("missing sub claim".into()))?
        .to_string();

    Ok(sub)
}

/// Generate a random anti-forgery state value. Hex-encoded.
pub fn generate_state() -> Result<String, ServiceError> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| ServiceError::Internal(format!("RNG failure: {e}")))?;
    Ok(hex::encode(bytes))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_round_trip() {
        let token = sign_session("jdoe", "secret", 1_000);
        let login = verify_session(&token, "secret", 1_001).expect("fresh token verifies");
        assert_eq!(login, "jdoe");
    }

    #[test]
    fn session_expires() {
        let token = sign_session("jdoe", "secret", 1_000);
        let err = verify_session(&token, "secret", 1_000 + SESSION_TTL_SECS + 1)
            .expect_err("expired token must fail");
        assert_eq!(err.status_code(), 401);
    }

    #[test]
    fn session_rejects_wrong_secret() {
        let token = sign_session("jdoe", "secret", 1_000);
        assert!(verify_session(&token, "other", 1_001).is_err());
    }

    #[test]
    fn session_rejects_tampered_payload() {
        let token = sign_session("jdoe", "secret", 1_000);
        let parts: Vec<&str> = token.split('.').collect();
        let forged_payload =
            URL_SAFE_NO_PAD.encode(format!(r#"{{"sub":"staff","iat":1000,"exp":{}}}"#, u64::MAX));
        let forged = format!("{}.{}.{}", parts[0], forged_payload, parts[2]);
        assert!(verify_session(&forged, "secret", 1_001).is_err());
    }

    #[test]
    fn session_rejects_garbage() {
        assert!(verify_session("not-a-token", "secret", 0).is_err());
    }

    #[test]
    fn state_values_are_unique() {
        let a = generate_state().expect("rng");
        let b = generate_state().expect("rng");
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }
}
