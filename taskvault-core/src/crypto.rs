//! Crypto primitives: CSPRNG identifiers, PKCE material, hashed IPs, and
//! the Apple client-secret signer.
//!
//! Everything here is pure once the random bytes are drawn; key material is
//! supplied by configuration, never read from the environment directly.

use crate::error::{Result, SyncError};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rand::{RngCore, rng};
use serde::Serialize;
use sha2::{Digest, Sha256};

/// Generates an opaque 16-byte identifier, base64url without padding.
pub fn generate_id() -> String {
    let mut bytes = [0u8; 16];
    rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Generates an OAuth state token: 32 hex characters.
pub fn generate_state() -> String {
    let mut bytes = [0u8; 16];
    rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

/// Generates a PKCE code verifier: 64 hex characters.
pub fn generate_pkce_verifier() -> String {
    let mut bytes = [0u8; 32];
    rng().fill_bytes(&mut bytes);
    hex_encode(&bytes)
}

/// PKCE S256 challenge: `base64url(sha256(verifier))`, unpadded.
pub fn pkce_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

/// Hashes an IP address for log output: first 8 hex characters of SHA-256.
///
/// Raw client IPs never reach the logs; the truncated hash is enough to
/// correlate abuse across log lines without storing PII.
pub fn hash_ip(ip: &str) -> String {
    let digest = Sha256::digest(ip.as_bytes());
    hex_encode(&digest)[..8].to_string()
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(
        String::with_capacity(bytes.len() * 2),
        |mut out, b| {
            use std::fmt::Write;
            let _ = write!(out, "{b:02x}");
            out
        },
    )
}

/// Claims of the Apple client-secret JWT.
#[derive(Debug, Serialize)]
struct AppleSecretClaims<'a> {
    iss: &'a str,
    iat: i64,
    exp: i64,
    aud: &'a str,
    sub: &'a str,
}

/// Lifetime of a freshly signed Apple client secret.
const APPLE_SECRET_TTL_SECS: i64 = 3600;

/// Signs an ES256 client secret for Sign in with Apple.
///
/// Apple has no static client secret; each token-endpoint call presents a
/// short-lived JWT signed with the team's EC P-256 key (`kid` in the
/// header, team id as issuer, client id as subject).
pub fn apple_client_secret(
    team_id: &str,
    client_id: &str,
    key_id: &str,
    private_key_pem: &str,
) -> Result<String> {
    let now = Utc::now().timestamp();
    let claims = AppleSecretClaims {
        iss: team_id,
        iat: now,
        exp: now + APPLE_SECRET_TTL_SECS,
        aud: "https://appleid.apple.com",
        sub: client_id,
    };

    let mut header = Header::new(Algorithm::ES256);
    header.kid = Some(key_id.to_string());

    let key = EncodingKey::from_ec_pem(private_key_pem.as_bytes())
        .map_err(|e| SyncError::Internal(format!("invalid Apple private key: {e}")))?;

    encode(&header, &claims, &key)
        .map_err(|e| SyncError::Internal(format!("failed to sign Apple client secret: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_unpadded_base64url() {
        let id = generate_id();
        // 16 bytes -> 22 base64url characters, no padding.
        assert_eq!(id.len(), 22);
        assert!(!id.contains('='));
        assert!(URL_SAFE_NO_PAD.decode(&id).is_ok());
    }

    #[test]
    fn state_and_verifier_are_hex() {
        let state = generate_state();
        let verifier = generate_pkce_verifier();
        assert_eq!(state.len(), 32);
        assert_eq!(verifier.len(), 64);
        assert!(state.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(verifier.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn pkce_challenge_matches_rfc7636_vector() {
        // Verifier/challenge pair from RFC 7636 appendix B.
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            pkce_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn hashed_ips_are_short_and_stable() {
        let a = hash_ip("203.0.113.9");
        let b = hash_ip("203.0.113.9");
        assert_eq!(a, b);
        assert_eq!(a.len(), 8);
        assert_ne!(a, hash_ip("203.0.113.10"));
    }

    #[test]
    fn generated_tokens_are_unique() {
        assert_ne!(generate_state(), generate_state());
        assert_ne!(generate_id(), generate_id());
    }
}
