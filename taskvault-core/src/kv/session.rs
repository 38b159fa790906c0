//! Session records and revocation markers.
//!
//! A session is keyed by `(user_id, jti)`; revocation is a separate marker
//! so a revoked token stays rejected even after its session record expires
//! from activity tracking.

use super::KvStore;
use crate::error::{Result, SyncError};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use taskvault_model::{DeviceId, UserId};

/// Activity record for one minted token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub device_id: DeviceId,
    /// Epoch seconds, mirrors the token's `iat`.
    pub issued_at: i64,
    /// Epoch seconds, mirrors the token's `exp`.
    pub expires_at: i64,
    /// Epoch seconds of the last authenticated request.
    pub last_activity: i64,
}

fn session_key(user_id: UserId, jti: &str) -> String {
    format!("session:{user_id}:{jti}")
}

fn revoked_key(user_id: UserId, jti: &str) -> String {
    format!("revoked:{user_id}:{jti}")
}

impl KvStore {
    /// Stores a session record with a TTL matching the token lifetime.
    pub async fn create_session(
        &self,
        user_id: UserId,
        jti: &str,
        record: &SessionRecord,
    ) -> Result<()> {
        let mut conn = self.conn();
        let ttl = (record.expires_at - Utc::now().timestamp()).max(1);
        let payload = serde_json::to_string(record)?;
        let _: () = redis::cmd("SET")
            .arg(session_key(user_id, jti))
            .arg(payload)
            .arg("EX")
            .arg(ttl)
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Internal(format!("Failed to create session: {e}")))?;
        Ok(())
    }

    /// Refreshes `last_activity` without disturbing the TTL. Best-effort:
    /// callers spawn this and only log failures.
    pub async fn touch_session(&self, user_id: UserId, jti: &str) -> Result<()> {
        let mut conn = self.conn();
        let key = session_key(user_id, jti);
        let payload: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Internal(format!("Failed to read session: {e}")))?;

        let Some(payload) = payload else {
            // Session already expired; nothing to touch.
            return Ok(());
        };

        let mut record: SessionRecord = serde_json::from_str(&payload)?;
        record.last_activity = Utc::now().timestamp();
        let updated = serde_json::to_string(&record)?;

        let _: () = redis::cmd("SET")
            .arg(&key)
            .arg(updated)
            .arg("KEEPTTL")
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Internal(format!("Failed to touch session: {e}")))?;
        Ok(())
    }

    pub async fn delete_session(&self, user_id: UserId, jti: &str) -> Result<()> {
        let mut conn = self.conn();
        let _: () = redis::cmd("DEL")
            .arg(session_key(user_id, jti))
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Internal(format!("Failed to delete session: {e}")))?;
        Ok(())
    }

    /// All live `(jti, record)` pairs for a user. SCAN-based so it never
    /// blocks Redis on large keyspaces.
    pub async fn sessions_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<(String, SessionRecord)>> {
        let mut conn = self.conn();
        let pattern = format!("session:{user_id}:*");
        let prefix_len = format!("session:{user_id}:").len();

        let mut sessions = Vec::new();
        let mut cursor: u64 = 0;
        loop {
            let (next, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(&pattern)
                .arg("COUNT")
                .arg(100)
                .query_async(&mut conn)
                .await
                .map_err(|e| {
                    SyncError::Internal(format!("Failed to scan sessions: {e}"))
                })?;

            for key in keys {
                let payload: Option<String> = redis::cmd("GET")
                    .arg(&key)
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| {
                        SyncError::Internal(format!("Failed to read session: {e}"))
                    })?;
                if let Some(payload) = payload {
                    let record: SessionRecord = serde_json::from_str(&payload)?;
                    sessions.push((key[prefix_len..].to_string(), record));
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }
        Ok(sessions)
    }

    /// Writes a revocation marker that outlives the longest session.
    pub async fn revoke_session(
        &self,
        user_id: UserId,
        jti: &str,
        ttl_secs: i64,
    ) -> Result<()> {
        let mut conn = self.conn();
        let _: () = redis::cmd("SET")
            .arg(revoked_key(user_id, jti))
            .arg(1)
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Internal(format!("Failed to revoke session: {e}")))?;
        Ok(())
    }

    pub async fn is_revoked(&self, user_id: UserId, jti: &str) -> Result<bool> {
        let mut conn = self.conn();
        let exists: bool = redis::cmd("EXISTS")
            .arg(revoked_key(user_id, jti))
            .query_async(&mut conn)
            .await
            .map_err(|e| SyncError::Internal(format!("Failed to check revocation: {e}")))?;
        Ok(exists)
    }
}
