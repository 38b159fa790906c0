//! Wire contracts for the authentication surface.
//!
//! All timestamps on the wire are Unix epoch milliseconds to match the
//! JavaScript clients.

use crate::error::ModelError;
use crate::ids::{DeviceId, UserId};
use serde::{Deserialize, Serialize};

/// External identity providers supported by the OIDC flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider {
    Google,
    Apple,
}

impl AuthProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthProvider::Google => "google",
            AuthProvider::Apple => "apple",
        }
    }

    /// Human-facing name, used in account-collision error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            AuthProvider::Google => "Google",
            AuthProvider::Apple => "Apple",
        }
    }
}

impl std::fmt::Display for AuthProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for AuthProvider {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(AuthProvider::Google),
            "apple" => Ok(AuthProvider::Apple),
            other => Err(ModelError::InvalidProvider(other.to_string())),
        }
    }
}

/// Response of `GET /api/auth/oauth/{provider}/start`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthStartResponse {
    /// Provider authorization URL the client should navigate to.
    pub auth_url: String,
    /// Opaque state token linking the initiation to its callback.
    pub state: String,
}

/// Sensitive authentication payload delivered exactly once through the
/// OAuth result mailbox.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthData {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub email: String,
    /// Signed session token (HS256 JWT).
    pub token: String,
    /// Token expiry, epoch milliseconds.
    pub expires_at: i64,
    /// True until the user uploads an encryption salt; tells the client to
    /// run passphrase setup before its first sync.
    pub requires_encryption_setup: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encryption_salt: Option<String>,
    pub provider: AuthProvider,
}

/// Body of `GET /api/auth/oauth/result`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthResultResponse {
    pub status: OAuthResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_data: Option<AuthData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Terminal states of an OAuth exchange as seen by the result endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OAuthResultStatus {
    Success,
    Error,
    Expired,
}

/// Response of `POST /api/auth/refresh`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefreshResponse {
    pub token: String,
    /// New expiry, epoch milliseconds.
    pub expires_at: i64,
}

/// Body of `POST /api/auth/encryption-salt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetEncryptionSaltRequest {
    pub encryption_salt: String,
}

/// Response of `GET /api/auth/encryption-salt`; `null` until the client has
/// uploaded a salt.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionSaltResponse {
    pub encryption_salt: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_round_trips() {
        for p in [AuthProvider::Google, AuthProvider::Apple] {
            let parsed: AuthProvider = p.as_str().parse().unwrap();
            assert_eq!(p, parsed);
        }
        assert!("github".parse::<AuthProvider>().is_err());
    }

    #[test]
    fn auth_data_uses_camel_case() {
        let data = AuthData {
            user_id: UserId::new(),
            device_id: DeviceId::new(),
            email: "a@example.com".into(),
            token: "t".into(),
            expires_at: 1_700_000_000_000,
            requires_encryption_setup: true,
            encryption_salt: None,
            provider: AuthProvider::Google,
        };
        let json = serde_json::to_value(&data).unwrap();
        assert!(json.get("userId").is_some());
        assert!(json.get("requiresEncryptionSetup").is_some());
        // Absent salt is omitted, not null.
        assert!(json.get("encryptionSalt").is_none());
    }
}
