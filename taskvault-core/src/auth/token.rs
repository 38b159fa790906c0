//! HS256 session tokens.
//!
//! A session token is minted once per login (or refresh) and carries the
//! user, device and a `jti` that keys the KV session record. Revocation is
//! a KV lookup done by the auth middleware, not here; this module only
//! signs and verifies.

use crate::error::{Result, SyncError};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
};
use serde::{Deserialize, Serialize};
use taskvault_model::{DeviceId, UserId};

/// Default session lifetime: 7 days.
pub const SESSION_LIFETIME_SECS: i64 = 7 * 24 * 3600;

/// Signing configuration for session tokens.
#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub secret: String,
    pub lifetime_secs: i64,
}

impl TokenConfig {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            lifetime_secs: SESSION_LIFETIME_SECS,
        }
    }
}

/// Claims carried by a session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: UserId,
    pub email: String,
    #[serde(rename = "deviceId")]
    pub device_id: DeviceId,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

impl SessionClaims {
    /// Token expiry as epoch milliseconds, the unit clients speak.
    pub fn expires_at_millis(&self) -> i64 {
        self.exp * 1000
    }
}

/// Mints a session token for a freshly authenticated device.
pub fn mint_session_token(
    config: &TokenConfig,
    user_id: UserId,
    email: &str,
    device_id: DeviceId,
) -> Result<(String, SessionClaims)> {
    let now = Utc::now();
    let exp = now + Duration::seconds(config.lifetime_secs);

    let claims = SessionClaims {
        sub: user_id,
        email: email.to_string(),
        device_id,
        jti: crate::crypto::generate_id(),
        iat: now.timestamp(),
        exp: exp.timestamp(),
    };

    let token = encode(
        &Header::new(Algorithm::HS256),
        &claims,
        &EncodingKey::from_secret(config.secret.as_ref()),
    )
    .map_err(|e| SyncError::Internal(format!("failed to sign session token: {e}")))?;

    Ok((token, claims))
}

/// Verifies signature and standard claims; revocation is checked separately.
pub fn verify_session_token(config: &TokenConfig, token: &str) -> Result<SessionClaims> {
    let validation = Validation::new(Algorithm::HS256);
    decode::<SessionClaims>(
        token,
        &DecodingKey::from_secret(config.secret.as_ref()),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|e| SyncError::Unauthorized(format!("invalid session token: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> TokenConfig {
        TokenConfig::new("test-secret-please-rotate")
    }

    #[test]
    fn mint_and_verify_round_trip() {
        let config = test_config();
        let user = UserId::new();
        let device = DeviceId::new();

        let (token, minted) =
            mint_session_token(&config, user, "a@example.com", device).unwrap();
        let claims = verify_session_token(&config, &token).unwrap();

        assert_eq!(claims.sub, user);
        assert_eq!(claims.device_id, device);
        assert_eq!(claims.email, "a@example.com");
        assert_eq!(claims.jti, minted.jti);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let (token, _) = mint_session_token(
            &test_config(),
            UserId::new(),
            "a@example.com",
            DeviceId::new(),
        )
        .unwrap();

        let other = TokenConfig::new("a-different-secret");
        assert!(verify_session_token(&other, &token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = TokenConfig {
            secret: "test-secret".into(),
            // jsonwebtoken applies 60s leeway by default; go well past it.
            lifetime_secs: -120,
        };
        let (token, _) = mint_session_token(
            &config,
            UserId::new(),
            "a@example.com",
            DeviceId::new(),
        )
        .unwrap();
        assert!(verify_session_token(&config, &token).is_err());
    }

    #[test]
    fn each_token_gets_a_fresh_jti() {
        let config = test_config();
        let user = UserId::new();
        let device = DeviceId::new();
        let (_, a) = mint_session_token(&config, user, "a@example.com", device).unwrap();
        let (_, b) = mint_session_token(&config, user, "a@example.com", device).unwrap();
        assert_ne!(a.jti, b.jti);
    }
}
