//! Ephemeral state in Redis: OAuth transients, sessions, revocation
//! markers, and rate-limit counters.
//!
//! Every key is TTL-bounded and scoped by user, state token, or identity;
//! nothing here survives an eviction that cannot be reconstructed by the
//! client re-authenticating or re-syncing.

pub mod oauth;
pub mod ratelimit;
pub mod session;

use crate::error::{Result, SyncError};
use redis::aio::ConnectionManager;
use redis::Client;

pub use oauth::{OAuthResultRecord, OAuthStateRecord};
pub use session::SessionRecord;

/// Handle to the KV store. Cheap to clone; the underlying connection
/// manager multiplexes and reconnects on its own.
#[derive(Clone)]
pub struct KvStore {
    conn: ConnectionManager,
}

impl std::fmt::Debug for KvStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KvStore").finish()
    }
}

impl KvStore {
    pub async fn new(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)
            .map_err(|e| SyncError::Internal(format!("Failed to create Redis client: {e}")))?;
        let conn = ConnectionManager::new(client).await.map_err(|e| {
            SyncError::Internal(format!("Failed to connect to Redis: {e}"))
        })?;
        Ok(Self { conn })
    }

    pub(crate) fn conn(&self) -> ConnectionManager {
        self.conn.clone()
    }
}
