use thiserror::Error;

/// Validation errors for model-level value types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    #[error("Invalid identifier: {0}")]
    InvalidId(String),

    #[error("Invalid provider: {0}")]
    InvalidProvider(String),
}
