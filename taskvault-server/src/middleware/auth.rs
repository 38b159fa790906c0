//! Session authentication middleware.
//!
//! Bearer token -> HS256 verification -> revocation check -> request
//! context. The session-record activity touch is best-effort and spawned so
//! it can never block or fail the request.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::infra::{app_state::AppState, errors::AppError};
use taskvault_core::auth::token::verify_session_token;
use taskvault_core::database::ports::DevicesRepository;
use taskvault_model::{DeviceId, UserId};

/// Authenticated request context populated for downstream handlers.
#[derive(Clone, Debug)]
pub struct AuthContext {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub email: String,
    pub jti: String,
    /// Token expiry, epoch seconds; bounds revocation-marker TTLs.
    pub exp: i64,
}

pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&request)?;

    let claims = verify_session_token(&state.token, &token)
        .map_err(|_| AppError::unauthorized("Invalid or expired session token"))?;

    let revoked = state
        .kv
        .is_revoked(claims.sub, &claims.jti)
        .await
        .map_err(AppError::from)?;
    if revoked {
        return Err(AppError::unauthorized("Session has been revoked"));
    }

    // Best-effort activity refresh; failures are logged and swallowed.
    {
        let kv = state.kv.clone();
        let db = state.db.clone();
        let user_id = claims.sub;
        let device_id = claims.device_id;
        let jti = claims.jti.clone();
        tokio::spawn(async move {
            if let Err(e) = kv.touch_session(user_id, &jti).await {
                warn!(user_id = %user_id, error = %e, "session activity touch failed");
            }
            if let Err(e) = db.devices().touch_last_seen(device_id).await {
                warn!(device_id = %device_id, error = %e, "device last_seen touch failed");
            }
        });
    }

    request.extensions_mut().insert(AuthContext {
        user_id: claims.sub,
        device_id: claims.device_id,
        email: claims.email,
        jti: claims.jti,
        exp: claims.exp,
    });

    Ok(next.run(request).await)
}

fn extract_bearer_token(request: &Request) -> Result<String, AppError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?;

    auth_header
        .strip_prefix("Bearer ")
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .ok_or_else(|| AppError::unauthorized("Authorization header must be a Bearer token"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;

    fn request_with_auth(value: Option<&str>) -> Request {
        let mut builder = axum::http::Request::builder().uri("/api/sync/status");
        if let Some(value) = value {
            builder = builder.header(header::AUTHORIZATION, value);
        }
        builder.body(Body::empty()).unwrap()
    }

    #[test]
    fn missing_header_is_unauthorized() {
        let err = extract_bearer_token(&request_with_auth(None)).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn non_bearer_scheme_is_rejected() {
        let err =
            extract_bearer_token(&request_with_auth(Some("Basic dXNlcjpwdw=="))).unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn bearer_token_is_extracted() {
        let token = extract_bearer_token(&request_with_auth(Some("Bearer abc.def.ghi")))
            .unwrap();
        assert_eq!(token, "abc.def.ghi");
    }
}
