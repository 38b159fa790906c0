//! Authorization-code exchange and id_token verification.

use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, decode_header};
use serde::Deserialize;

use super::{ProviderCredentials, ProviderEndpoints};
use taskvault_core::error::{Result, SyncError};

/// Subset of the provider token-endpoint response we care about.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

/// JWKS document shape shared by Google and Apple.
#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    n: String,
    e: String,
}

/// Claims extracted from a verified id_token.
#[derive(Debug, Deserialize)]
struct IdTokenClaims {
    sub: String,
    email: Option<String>,
    /// Google sends a bool; Apple has been observed sending "true".
    email_verified: Option<serde_json::Value>,
}

/// Verified external identity.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub provider_user_id: String,
    pub email: String,
}

/// Exchanges the authorization code for an id_token.
///
/// The shared client carries the 10 s timeout; a slow provider fails the
/// flow instead of wedging the callback.
pub async fn exchange_code(
    http: &reqwest::Client,
    endpoints: &ProviderEndpoints,
    credentials: &ProviderCredentials,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> Result<String> {
    let params = [
        ("grant_type", "authorization_code"),
        ("code", code),
        ("code_verifier", code_verifier),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
        ("redirect_uri", redirect_uri),
    ];

    let response = http
        .post(endpoints.token_url)
        .form(&params)
        .send()
        .await
        .map_err(|e| SyncError::Upstream(format!("token exchange request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(SyncError::Upstream(format!(
            "token endpoint returned {status}: {body}"
        )));
    }

    let token: TokenResponse = response
        .json()
        .await
        .map_err(|e| SyncError::Upstream(format!("malformed token response: {e}")))?;

    token
        .id_token
        .ok_or_else(|| SyncError::Upstream("token response carried no id_token".into()))
}

/// Verifies an id_token against the provider JWKS and asserts issuer,
/// audience, expiry and a verified email.
pub async fn verify_id_token(
    http: &reqwest::Client,
    endpoints: &ProviderEndpoints,
    client_id: &str,
    id_token: &str,
) -> Result<VerifiedIdentity> {
    let header = decode_header(id_token)
        .map_err(|e| SyncError::Unauthorized(format!("malformed id_token: {e}")))?;
    let kid = header
        .kid
        .ok_or_else(|| SyncError::Unauthorized("id_token has no key id".into()))?;

    let jwks: JwksDocument = http
        .get(endpoints.jwks_url)
        .send()
        .await
        .map_err(|e| SyncError::Upstream(format!("JWKS fetch failed: {e}")))?
        .json()
        .await
        .map_err(|e| SyncError::Upstream(format!("malformed JWKS document: {e}")))?;

    let jwk = jwks
        .keys
        .iter()
        .find(|key| key.kid.as_deref() == Some(kid.as_str()))
        .ok_or_else(|| {
            SyncError::Unauthorized(format!("no JWKS key matches kid {kid:?}"))
        })?;

    let decoding_key = DecodingKey::from_rsa_components(&jwk.n, &jwk.e)
        .map_err(|e| SyncError::Upstream(format!("unusable JWKS key: {e}")))?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_audience(&[client_id]);
    validation.set_issuer(endpoints.issuers);

    let claims = decode::<IdTokenClaims>(id_token, &decoding_key, &validation)
        .map_err(|e| SyncError::Unauthorized(format!("id_token verification failed: {e}")))?
        .claims;

    let email = claims
        .email
        .filter(|e| !e.is_empty())
        .ok_or_else(|| SyncError::Unauthorized("id_token carried no email".into()))?;

    if !email_is_verified(claims.email_verified.as_ref()) {
        return Err(SyncError::Unauthorized(
            "Email address is not verified with the provider".into(),
        ));
    }

    Ok(VerifiedIdentity {
        provider_user_id: claims.sub,
        email: email.to_lowercase(),
    })
}

fn email_is_verified(value: Option<&serde_json::Value>) -> bool {
    match value {
        Some(serde_json::Value::Bool(b)) => *b,
        Some(serde_json::Value::String(s)) => s == "true",
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn email_verified_accepts_bool_and_string_forms() {
        assert!(email_is_verified(Some(&json!(true))));
        assert!(email_is_verified(Some(&json!("true"))));
        assert!(!email_is_verified(Some(&json!(false))));
        assert!(!email_is_verified(Some(&json!("false"))));
        assert!(!email_is_verified(Some(&json!(1))));
        assert!(!email_is_verified(None));
    }

    #[test]
    fn jwks_document_parses_provider_shape() {
        let doc: JwksDocument = serde_json::from_value(json!({
            "keys": [
                {"kty": "RSA", "kid": "abc", "use": "sig", "alg": "RS256",
                 "n": "0vx7agoebGcQSuuPiLJXZpt", "e": "AQAB"},
                {"kty": "RSA", "n": "xyz", "e": "AQAB"}
            ]
        }))
        .unwrap();
        assert_eq!(doc.keys.len(), 2);
        assert_eq!(doc.keys[0].kid.as_deref(), Some("abc"));
        assert!(doc.keys[1].kid.is_none());
    }
}
