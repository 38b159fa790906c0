//! OIDC subsystem: provider endpoints, the polymorphic callback parser,
//! code exchange and id_token verification, identity reconciliation, and
//! the HTTP handlers.

pub mod callback;
pub mod exchange;
pub mod handlers;
pub mod identity;

use crate::infra::config::Config;
use taskvault_core::crypto;
use taskvault_core::error::{Result, SyncError};
use taskvault_model::AuthProvider;

/// Static endpoints for one provider.
#[derive(Debug, Clone, Copy)]
pub struct ProviderEndpoints {
    pub auth_url: &'static str,
    pub token_url: &'static str,
    pub jwks_url: &'static str,
    /// Acceptable `iss` values for id_tokens.
    pub issuers: &'static [&'static str],
    pub scope: &'static str,
}

const GOOGLE: ProviderEndpoints = ProviderEndpoints {
    auth_url: "https://accounts.google.com/o/oauth2/v2/auth",
    token_url: "https://oauth2.googleapis.com/token",
    jwks_url: "https://www.googleapis.com/oauth2/v3/certs",
    issuers: &["https://accounts.google.com", "accounts.google.com"],
    scope: "openid email profile",
};

const APPLE: ProviderEndpoints = ProviderEndpoints {
    auth_url: "https://appleid.apple.com/auth/authorize",
    token_url: "https://appleid.apple.com/auth/token",
    jwks_url: "https://appleid.apple.com/auth/keys",
    issuers: &["https://appleid.apple.com"],
    scope: "openid email name",
};

pub fn endpoints(provider: AuthProvider) -> &'static ProviderEndpoints {
    match provider {
        AuthProvider::Google => &GOOGLE,
        AuthProvider::Apple => &APPLE,
    }
}

/// Client id plus a ready-to-send client secret. For Apple the secret is a
/// freshly signed ES256 JWT; for Google it is the configured static secret.
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub client_id: String,
    pub client_secret: String,
}

pub fn credentials(config: &Config, provider: AuthProvider) -> Result<ProviderCredentials> {
    match provider {
        AuthProvider::Google => {
            let google = config.google.as_ref().ok_or_else(|| {
                SyncError::Internal("Google OAuth is not configured".into())
            })?;
            Ok(ProviderCredentials {
                client_id: google.client_id.clone(),
                client_secret: google.client_secret.clone(),
            })
        }
        AuthProvider::Apple => {
            let apple = config.apple.as_ref().ok_or_else(|| {
                SyncError::Internal("Apple OAuth is not configured".into())
            })?;
            let client_secret = crypto::apple_client_secret(
                &apple.team_id,
                &apple.client_id,
                &apple.key_id,
                &apple.private_key_pem,
            )?;
            Ok(ProviderCredentials {
                client_id: apple.client_id.clone(),
                client_secret,
            })
        }
    }
}
