//! Server configuration.
//!
//! One `Config` value is loaded at startup and shared through `AppState`.
//! Every tunable the handlers consult (origin allow-list, rate-limit policy
//! table, retention windows, storage quota) lives here so tests can inject
//! alternatives.

mod loader;

pub use loader::ConfigLoadError;

use taskvault_core::auth::token::TokenConfig;
use taskvault_core::cleanup::RetentionPolicy;
use taskvault_core::ratelimit::EndpointLimits;

/// Deployment environment; gates error detail and localhost origins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

impl Environment {
    pub fn parse(s: &str) -> Self {
        match s {
            "production" | "prod" => Environment::Production,
            _ => Environment::Development,
        }
    }
}

/// Google OAuth client credentials.
#[derive(Debug, Clone)]
pub struct GoogleConfig {
    pub client_id: String,
    pub client_secret: String,
}

/// Sign in with Apple credentials; the client secret is signed on demand
/// from the EC private key.
#[derive(Debug, Clone)]
pub struct AppleConfig {
    pub client_id: String,
    pub team_id: String,
    pub key_id: String,
    pub private_key_pem: String,
}

/// Localhost ports accepted as origins in development.
pub const DEV_ORIGIN_PORTS: &[u16] = &[3000, 4173, 5173, 8080, 8787];

/// Fully loaded server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub environment: Environment,
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub redis_url: String,
    pub jwt_secret: String,
    /// Reserved for future server-side use; not consulted by any handler.
    pub encryption_salt: Option<String>,
    pub google: Option<GoogleConfig>,
    pub apple: Option<AppleConfig>,
    /// Default app origin for OAuth redirects when the initiating origin is
    /// unknown or not allowed.
    pub oauth_redirect_uri: String,
    /// Public base URL of this service, used to build the provider
    /// redirect_uri. Defaults to the bind address in development.
    pub oauth_callback_base: Option<String>,
    pub allowed_origins: Vec<String>,
    pub limits: EndpointLimits,
    pub retention: RetentionPolicy,
    /// Per-user storage quota in bytes.
    pub quota_bytes: i64,
    /// Rough per-task size used to convert the byte quota into a live-task
    /// cap.
    pub task_size_estimate: i64,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigLoadError> {
        loader::load_from_env()
    }

    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    /// Canonical production origin: the first allow-list entry.
    pub fn canonical_origin(&self) -> &str {
        self.allowed_origins
            .first()
            .map(String::as_str)
            .unwrap_or(self.oauth_redirect_uri.as_str())
    }

    /// The redirect_uri registered with providers.
    pub fn callback_uri(&self) -> String {
        let base = self
            .oauth_callback_base
            .clone()
            .unwrap_or_else(|| format!("http://{}:{}", self.server_host, self.server_port));
        format!("{}/api/auth/oauth/callback", base.trim_end_matches('/'))
    }

    pub fn token_config(&self) -> TokenConfig {
        TokenConfig::new(self.jwt_secret.clone())
    }

    /// Live-task cap derived from the byte quota.
    pub fn task_quota(&self) -> i64 {
        (self.quota_bytes / self.task_size_estimate).max(1)
    }

    /// Startup validation with actionable messages; run before binding.
    pub fn validate(&self) -> Result<(), ConfigLoadError> {
        if self.jwt_secret.len() < 32 {
            return Err(ConfigLoadError::Invalid(
                "JWT_SECRET must be at least 32 characters".into(),
            ));
        }
        if self.allowed_origins.is_empty() {
            return Err(ConfigLoadError::Invalid(
                "ALLOWED_ORIGINS must name at least one origin".into(),
            ));
        }
        for origin in &self.allowed_origins {
            if !origin.starts_with("http://") && !origin.starts_with("https://") {
                return Err(ConfigLoadError::Invalid(format!(
                    "allowed origin {origin:?} must include a scheme"
                )));
            }
        }
        if let Some(apple) = &self.apple
            && !apple.private_key_pem.contains("PRIVATE KEY")
        {
            return Err(ConfigLoadError::Invalid(
                "APPLE_PRIVATE_KEY does not look like a PEM key".into(),
            ));
        }
        if self.environment == Environment::Production
            && self.google.is_none()
            && self.apple.is_none()
        {
            return Err(ConfigLoadError::Invalid(
                "production requires at least one configured OAuth provider".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub(crate) fn test_config() -> Config {
        Config {
            environment: Environment::Development,
            server_host: "127.0.0.1".into(),
            server_port: 8787,
            database_url: "postgres://localhost/taskvault".into(),
            redis_url: "redis://127.0.0.1:6379".into(),
            jwt_secret: "0123456789abcdef0123456789abcdef".into(),
            encryption_salt: None,
            google: Some(GoogleConfig {
                client_id: "client".into(),
                client_secret: "secret".into(),
            }),
            apple: None,
            oauth_redirect_uri: "https://taskvault.app".into(),
            oauth_callback_base: Some("https://sync.taskvault.app".into()),
            allowed_origins: vec!["https://taskvault.app".into()],
            limits: EndpointLimits::default(),
            retention: RetentionPolicy::default(),
            quota_bytes: 10 * 1024 * 1024,
            task_size_estimate: 4096,
        }
    }

    #[test]
    fn callback_uri_is_built_from_the_base() {
        let config = test_config();
        assert_eq!(
            config.callback_uri(),
            "https://sync.taskvault.app/api/auth/oauth/callback"
        );
    }

    #[test]
    fn callback_uri_falls_back_to_bind_address() {
        let mut config = test_config();
        config.oauth_callback_base = None;
        assert_eq!(
            config.callback_uri(),
            "http://127.0.0.1:8787/api/auth/oauth/callback"
        );
    }

    #[test]
    fn short_jwt_secret_fails_validation() {
        let mut config = test_config();
        config.jwt_secret = "short".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn production_without_providers_fails_validation() {
        let mut config = test_config();
        config.environment = Environment::Production;
        config.google = None;
        config.apple = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn task_quota_divides_bytes_by_estimate() {
        let config = test_config();
        assert_eq!(config.task_quota(), 2560);
    }
}
