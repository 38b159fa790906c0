use std::sync::Arc;
use std::time::Duration;

use taskvault_core::auth::token::TokenConfig;
use taskvault_core::{Database, KvStore};

use super::config::Config;
use crate::middleware::cors::CorsPolicy;

/// Timeout for outbound HTTPS (provider token exchange, JWKS fetch).
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

/// Shared application state. Cloned per request; everything inside is
/// reference-counted or already cheap to clone.
#[derive(Clone, Debug)]
pub struct AppState {
    pub db: Arc<Database>,
    pub kv: KvStore,
    pub config: Arc<Config>,
    pub token: Arc<TokenConfig>,
    pub cors: Arc<CorsPolicy>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(db: Database, kv: KvStore, config: Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(OUTBOUND_TIMEOUT)
            .build()?;
        let token = Arc::new(config.token_config());
        let cors = Arc::new(CorsPolicy::from_config(&config));
        Ok(Self {
            db: Arc::new(db),
            kv,
            config: Arc::new(config),
            token,
            cors,
            http,
        })
    }
}
