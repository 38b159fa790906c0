use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use taskvault_core::SyncError;

pub type AppResult<T> = Result<T, AppError>;

/// Error carried to the HTTP boundary: a status and a single human-readable
/// message. Internal detail is logged where the error originates and only
/// serialized into responses in debug builds.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Internal detail; never emitted in release builds.
    pub detail: Option<String>,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn gone(message: impl Into<String>) -> Self {
        Self::new(StatusCode::GONE, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = match self.detail.filter(|_| cfg!(debug_assertions)) {
            Some(detail) => Json(json!({ "error": self.message, "detail": detail })),
            None => Json(json!({ "error": self.message })),
        };
        (self.status, body).into_response()
    }
}

impl From<SyncError> for AppError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Validation(msg) => Self::bad_request(msg),
            SyncError::Unauthorized(msg) => Self::unauthorized(msg),
            SyncError::Forbidden(msg) => Self::forbidden(msg),
            SyncError::NotFound(msg) => Self::not_found(msg),
            SyncError::Conflict(msg) => Self::conflict(msg),
            SyncError::Gone(msg) => Self::gone(msg),
            SyncError::Upstream(msg) => {
                tracing::error!(error = %msg, "upstream provider failure");
                Self::internal("Authentication provider unavailable").with_detail(msg)
            }
            SyncError::Serialization(e) => {
                tracing::error!(error = %e, "serialization failure");
                Self::internal("Internal error").with_detail(e.to_string())
            }
            SyncError::Internal(msg) => {
                tracing::error!(error = %msg, "internal error");
                Self::internal("Internal error").with_detail(msg)
            }
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = ?err, "unhandled error");
        Self::internal("Internal error").with_detail(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_errors_map_to_expected_statuses() {
        let cases = [
            (SyncError::Validation("v".into()), StatusCode::BAD_REQUEST),
            (SyncError::Unauthorized("u".into()), StatusCode::UNAUTHORIZED),
            (SyncError::Forbidden("f".into()), StatusCode::FORBIDDEN),
            (SyncError::NotFound("n".into()), StatusCode::NOT_FOUND),
            (SyncError::Conflict("c".into()), StatusCode::CONFLICT),
            (SyncError::Gone("g".into()), StatusCode::GONE),
            (
                SyncError::Internal("i".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err).status, status);
        }
    }

    #[test]
    fn internal_detail_stays_out_of_the_message() {
        let err = AppError::from(SyncError::Internal("pool exhausted at 10.0.0.2".into()));
        assert_eq!(err.message, "Internal error");
        // The raw detail is preserved separately and only surfaces in debug
        // builds.
        assert_eq!(err.detail.as_deref(), Some("pool exhausted at 10.0.0.2"));
    }
}
