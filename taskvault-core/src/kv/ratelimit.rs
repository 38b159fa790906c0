//! Rate-limit counters.
//!
//! Fixed-window counters keyed by identity, path and window index. The
//! atomic INCR+EXPIRE pipeline closes the race where two concurrent
//! requests both pass a read-then-write check.

use super::KvStore;
use crate::error::{Result, SyncError};

impl KvStore {
    /// Increments a window counter and returns the post-increment count.
    /// The TTL rides along in the same atomic pipeline.
    pub async fn incr_rate_counter(&self, key: &str, ttl_secs: i64) -> Result<u64> {
        let mut conn = self.conn();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                SyncError::Internal(format!("Failed to bump rate counter: {e}"))
            })?;
        Ok(count)
    }

    /// Increments the consecutive-exceeded-windows counter and returns the
    /// new value. Called once per window, on the first rejection.
    pub async fn incr_blocked_counter(&self, key: &str, ttl_secs: i64) -> Result<u64> {
        let mut conn = self.conn();
        let (count,): (u64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, ttl_secs)
            .ignore()
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                SyncError::Internal(format!("Failed to bump blocked counter: {e}"))
            })?;
        Ok(count)
    }
}
