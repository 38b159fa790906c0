//! Environment-variable configuration loading.

use super::{AppleConfig, Config, Environment, GoogleConfig};
use taskvault_core::cleanup::RetentionPolicy;
use taskvault_core::ratelimit::EndpointLimits;
use thiserror::Error;

/// Errors surfaced during configuration load or validation.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Missing required environment variable {0}")]
    MissingVar(&'static str),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn required(key: &'static str) -> Result<String, ConfigLoadError> {
    std::env::var(key)
        .ok()
        .filter(|v| !v.is_empty())
        .ok_or(ConfigLoadError::MissingVar(key))
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn optional_or(key: &str, default: &str) -> String {
    optional(key).unwrap_or_else(|| default.to_string())
}

/// Loads every provider credential set only when all of its variables are
/// present; a half-configured provider is a startup error, not a silent
/// skip.
fn load_google() -> Result<Option<GoogleConfig>, ConfigLoadError> {
    match (optional("GOOGLE_CLIENT_ID"), optional("GOOGLE_CLIENT_SECRET")) {
        (Some(client_id), Some(client_secret)) => Ok(Some(GoogleConfig {
            client_id,
            client_secret,
        })),
        (None, None) => Ok(None),
        _ => Err(ConfigLoadError::Invalid(
            "GOOGLE_CLIENT_ID and GOOGLE_CLIENT_SECRET must be set together".into(),
        )),
    }
}

fn load_apple() -> Result<Option<AppleConfig>, ConfigLoadError> {
    let vars = (
        optional("APPLE_CLIENT_ID"),
        optional("APPLE_TEAM_ID"),
        optional("APPLE_KEY_ID"),
        optional("APPLE_PRIVATE_KEY"),
    );
    match vars {
        (Some(client_id), Some(team_id), Some(key_id), Some(private_key_pem)) => {
            Ok(Some(AppleConfig {
                client_id,
                team_id,
                key_id,
                // Env vars flatten newlines; PEM needs them back.
                private_key_pem: private_key_pem.replace("\\n", "\n"),
            }))
        }
        (None, None, None, None) => Ok(None),
        _ => Err(ConfigLoadError::Invalid(
            "APPLE_CLIENT_ID, APPLE_TEAM_ID, APPLE_KEY_ID and APPLE_PRIVATE_KEY must be set together"
                .into(),
        )),
    }
}

pub(super) fn load_from_env() -> Result<Config, ConfigLoadError> {
    let environment =
        Environment::parse(&optional_or("ENVIRONMENT", "development"));

    let allowed_origins: Vec<String> =
        optional_or("ALLOWED_ORIGINS", "https://taskvault.app")
            .split(',')
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .filter(|s| !s.is_empty())
            .collect();

    let oauth_redirect_uri = optional("OAUTH_REDIRECT_URI")
        .unwrap_or_else(|| {
            allowed_origins
                .first()
                .cloned()
                .unwrap_or_else(|| "https://taskvault.app".to_string())
        });

    let server_port = optional_or("SERVER_PORT", "8787")
        .parse::<u16>()
        .map_err(|_| ConfigLoadError::Invalid("SERVER_PORT must be a port number".into()))?;

    let quota_bytes = optional_or("STORAGE_QUOTA_BYTES", "10485760")
        .parse::<i64>()
        .map_err(|_| {
            ConfigLoadError::Invalid("STORAGE_QUOTA_BYTES must be an integer".into())
        })?;

    let config = Config {
        environment,
        server_host: optional_or("SERVER_HOST", "0.0.0.0"),
        server_port,
        database_url: required("DATABASE_URL")?,
        redis_url: required("REDIS_URL")?,
        jwt_secret: required("JWT_SECRET")?,
        encryption_salt: optional("ENCRYPTION_SALT"),
        google: load_google()?,
        apple: load_apple()?,
        oauth_redirect_uri,
        oauth_callback_base: optional("OAUTH_CALLBACK_BASE"),
        allowed_origins,
        limits: EndpointLimits::default(),
        retention: RetentionPolicy::default(),
        quota_bytes,
        task_size_estimate: 4096,
    };

    config.validate()?;
    Ok(config)
}
