//! Session lifecycle and encryption-salt handlers.

use axum::{Extension, Json, extract::State};
use chrono::Utc;
use tracing::info;

use crate::infra::{app_state::AppState, errors::{AppError, AppResult}};
use crate::middleware::auth::AuthContext;
use taskvault_core::database::ports::UsersRepository;
use taskvault_core::auth::token::mint_session_token;
use taskvault_core::kv::SessionRecord;
use taskvault_model::{
    Ack, EncryptionSaltResponse, RefreshResponse, SetEncryptionSaltRequest,
};

/// Upper bound on uploaded salts (base64 text).
const MAX_SALT_LEN: usize = 256;

/// `POST /api/auth/logout`
///
/// Revokes the presented token's `jti` and drops its session record. The
/// token itself stays cryptographically valid until `exp`; the revocation
/// marker is what locks it out.
pub async fn logout(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<Ack>> {
    let remaining = (ctx.exp - Utc::now().timestamp()).max(1);
    state
        .kv
        .revoke_session(ctx.user_id, &ctx.jti, remaining)
        .await?;
    state.kv.delete_session(ctx.user_id, &ctx.jti).await?;

    info!(user_id = %ctx.user_id, "logout");
    Ok(Json(Ack::ok()))
}

/// `POST /api/auth/refresh`
///
/// Rotates the session: new token and `jti`, old `jti` revoked. Reusing the
/// old token after a refresh fails with 401.
pub async fn refresh(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<RefreshResponse>> {
    let (token, claims) =
        mint_session_token(&state.token, ctx.user_id, &ctx.email, ctx.device_id)?;

    let session = SessionRecord {
        device_id: ctx.device_id,
        issued_at: claims.iat,
        expires_at: claims.exp,
        last_activity: claims.iat,
    };
    state
        .kv
        .create_session(ctx.user_id, &claims.jti, &session)
        .await?;

    let remaining = (ctx.exp - Utc::now().timestamp()).max(1);
    state
        .kv
        .revoke_session(ctx.user_id, &ctx.jti, remaining)
        .await?;
    state.kv.delete_session(ctx.user_id, &ctx.jti).await?;

    info!(user_id = %ctx.user_id, device_id = %ctx.device_id, "session refreshed");
    Ok(Json(RefreshResponse {
        token,
        expires_at: claims.expires_at_millis(),
    }))
}

/// `GET /api/auth/encryption-salt`
pub async fn get_encryption_salt(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<EncryptionSaltResponse>> {
    let user = state
        .db
        .users()
        .get_by_id(ctx.user_id)
        .await?
        .ok_or_else(|| AppError::unauthorized("Account no longer exists"))?;

    Ok(Json(EncryptionSaltResponse {
        encryption_salt: user.encryption_salt,
    }))
}

/// `POST /api/auth/encryption-salt`
pub async fn set_encryption_salt(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(request): Json<SetEncryptionSaltRequest>,
) -> AppResult<Json<Ack>> {
    let salt = request.encryption_salt.trim();
    if salt.is_empty() {
        return Err(AppError::bad_request("encryptionSalt must not be empty"));
    }
    if salt.len() > MAX_SALT_LEN {
        return Err(AppError::bad_request(format!(
            "encryptionSalt exceeds {MAX_SALT_LEN} bytes"
        )));
    }

    state.db.users().set_encryption_salt(ctx.user_id, salt).await?;

    info!(user_id = %ctx.user_id, "encryption salt stored");
    Ok(Json(Ack::ok()))
}
