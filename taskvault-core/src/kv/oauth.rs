//! OAuth transient records and the single-use result mailbox.
//!
//! The state record links an initiation to its callback; the result record
//! is the store-and-forward mailbox that carries auth data back to the app
//! without ever putting tokens in a redirect URL. Both are read with an
//! atomic GETDEL so a second consumer always sees nothing.

use super::KvStore;
use crate::error::{Result, SyncError};
use serde::{Deserialize, Serialize};
use taskvault_model::{AuthData, AuthProvider, OAuthResultStatus};

/// TTL for OAuth state and result records: 10 minutes.
pub const OAUTH_TTL_SECS: i64 = 600;

/// Transient record written at flow initiation, consumed at the callback.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthStateRecord {
    pub code_verifier: String,
    pub provider: AuthProvider,
    /// Redirect URI registered with the provider (this service's callback).
    pub callback_uri: String,
    /// Origin of the app window that started the flow; the callback
    /// redirects back here.
    pub app_origin: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

/// Result envelope written by the callback, consumed once by the result
/// endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthResultRecord {
    pub status: OAuthResultStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auth_data: Option<AuthData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub app_origin: String,
    /// Epoch milliseconds.
    pub created_at: i64,
}

fn state_key(state: &str) -> String {
    format!("oauth_state:{state}")
}

fn result_key(state: &str) -> String {
    format!("oauth_result:{state}")
}

impl KvStore {
    pub async fn put_oauth_state(
        &self,
        state: &str,
        record: &OAuthStateRecord,
    ) -> Result<()> {
        let mut conn = self.conn();
        let payload = serde_json::to_string(record)?;
        let _: () = redis::cmd("SET")
            .arg(state_key(state))
            .arg(payload)
            .arg("EX")
            .arg(OAUTH_TTL_SECS)
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Internal(format!("Failed to store OAuth state: {e}")))?;
        Ok(())
    }

    /// Consumes the state record; `None` when expired or already used.
    pub async fn take_oauth_state(&self, state: &str) -> Result<Option<OAuthStateRecord>> {
        let mut conn = self.conn();
        let payload: Option<String> = redis::cmd("GETDEL")
            .arg(state_key(state))
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Internal(format!("Failed to take OAuth state: {e}")))?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(SyncError::from))
            .transpose()
    }

    pub async fn put_oauth_result(
        &self,
        state: &str,
        record: &OAuthResultRecord,
    ) -> Result<()> {
        let mut conn = self.conn();
        let payload = serde_json::to_string(record)?;
        let _: () = redis::cmd("SET")
            .arg(result_key(state))
            .arg(payload)
            .arg("EX")
            .arg(OAUTH_TTL_SECS)
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Internal(format!("Failed to store OAuth result: {e}")))?;
        Ok(())
    }

    /// Consumes the result envelope. At-most-once by construction: the
    /// GETDEL means a concurrent second reader observes an empty mailbox.
    pub async fn take_oauth_result(&self, state: &str) -> Result<Option<OAuthResultRecord>> {
        let mut conn = self.conn();
        let payload: Option<String> = redis::cmd("GETDEL")
            .arg(result_key(state))
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Internal(format!("Failed to take OAuth result: {e}")))?;
        payload
            .map(|p| serde_json::from_str(&p).map_err(SyncError::from))
            .transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::generate_state;

    // These require a running Redis instance:
    // docker run -d -p 6379:6379 redis:7-alpine

    async fn store() -> KvStore {
        KvStore::new("redis://127.0.0.1:6379").await.unwrap()
    }

    fn state_record() -> OAuthStateRecord {
        OAuthStateRecord {
            code_verifier: "v".repeat(64),
            provider: AuthProvider::Google,
            callback_uri: "https://sync.taskvault.app/api/auth/oauth/callback".into(),
            app_origin: "https://taskvault.app".into(),
            created_at: 0,
        }
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn oauth_state_is_single_use() {
        let kv = store().await;
        let state = generate_state();

        kv.put_oauth_state(&state, &state_record()).await.unwrap();

        let first = kv.take_oauth_state(&state).await.unwrap();
        assert!(first.is_some());
        assert_eq!(first.unwrap().app_origin, "https://taskvault.app");

        let second = kv.take_oauth_state(&state).await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn result_mailbox_delivers_at_most_once() {
        let kv = store().await;
        let state = generate_state();

        let record = OAuthResultRecord {
            status: OAuthResultStatus::Error,
            auth_data: None,
            error: Some("test".into()),
            app_origin: "https://taskvault.app".into(),
            created_at: 0,
        };
        kv.put_oauth_result(&state, &record).await.unwrap();

        let first = kv.take_oauth_result(&state).await.unwrap();
        assert!(matches!(
            first,
            Some(OAuthResultRecord {
                status: OAuthResultStatus::Error,
                ..
            })
        ));
        assert!(kv.take_oauth_result(&state).await.unwrap().is_none());
    }

    #[tokio::test]
    #[ignore] // Requires Redis running
    async fn unknown_state_reads_as_empty() {
        let kv = store().await;
        assert!(kv.take_oauth_state("does-not-exist").await.unwrap().is_none());
        assert!(kv.take_oauth_result("does-not-exist").await.unwrap().is_none());
    }
}
