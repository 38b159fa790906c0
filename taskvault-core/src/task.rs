//! Encrypted task rows and sync bookkeeping types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskvault_model::{
    ConflictReason, DeviceId, TaskId, TaskEnvelope, UserId, VectorClock,
};

/// An encrypted task row, including tombstones.
///
/// The blob, nonce and checksum are opaque client-side ciphertext material.
/// `version` increments by exactly one on every accepted write and
/// `vector_clock` is non-decreasing per device over the row's lifetime.
#[derive(Debug, Clone)]
pub struct EncryptedTask {
    pub task_id: TaskId,
    pub user_id: UserId,
    pub encrypted_blob: String,
    pub nonce: String,
    pub checksum: String,
    pub version: i64,
    pub vector_clock: VectorClock,
    pub last_modified_device: DeviceId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl EncryptedTask {
    /// A row is live while it has no tombstone.
    pub fn is_live(&self) -> bool {
        self.deleted_at.is_none()
    }

    /// Wire representation with epoch-millisecond timestamps.
    pub fn to_envelope(&self) -> TaskEnvelope {
        TaskEnvelope {
            task_id: self.task_id.clone(),
            encrypted_blob: self.encrypted_blob.clone(),
            nonce: self.nonce.clone(),
            checksum: self.checksum.clone(),
            version: self.version,
            vector_clock: self.vector_clock.clone(),
            last_modified_device: self.last_modified_device,
            created_at: self.created_at.timestamp_millis(),
            updated_at: self.updated_at.timestamp_millis(),
            deleted_at: self.deleted_at.map(|t| t.timestamp_millis()),
        }
    }
}

/// Observational sync state per `(user, device)`. Authoritative data lives
/// on the task rows; this exists for the status endpoint and debugging.
#[derive(Debug, Clone)]
pub struct SyncMetadata {
    pub user_id: UserId,
    pub device_id: DeviceId,
    pub last_sync_at: DateTime<Utc>,
    pub last_push_vector: VectorClock,
    pub last_pull_vector: VectorClock,
    pub sync_status: SyncStatus,
}

/// Outcome of the most recent sync for a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncStatus {
    Success,
    Conflict,
    Error,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Success => "success",
            SyncStatus::Conflict => "conflict",
            SyncStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(SyncStatus::Success),
            "conflict" => Some(SyncStatus::Conflict),
            "error" => Some(SyncStatus::Error),
            _ => None,
        }
    }
}

/// Kind of entry in the append-only sync operation audit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperationKind {
    Push,
    Pull,
}

impl SyncOperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncOperationKind::Push => "push",
            SyncOperationKind::Pull => "pull",
        }
    }
}

/// A server-side conflict observation awaiting (or carrying) resolution.
#[derive(Debug, Clone)]
pub struct ConflictLogEntry {
    pub user_id: UserId,
    pub task_id: TaskId,
    pub existing_clock: VectorClock,
    pub incoming_clock: VectorClock,
    pub reason: ConflictReason,
    /// `auto_merge`, `last_write_wins` or `manual`; `None` while the client
    /// has not resolved the conflict yet.
    pub resolution: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
}
