//! Wire contracts for the sync surface: push, pull, resolve, status, stats
//! and device management.
//!
//! The server never interprets `encrypted_blob`, `nonce` or `checksum`; they
//! are opaque base64/hex strings whose semantics belong to the client's
//! crypto layer. Timestamps on the wire are Unix epoch milliseconds.

use crate::clock::VectorClock;
use crate::ids::{DeviceId, TaskId};
use serde::{Deserialize, Serialize};

/// Hard cap on operations per push request; larger batches are rejected
/// wholesale with HTTP 400.
pub const MAX_OPERATIONS_PER_PUSH: usize = 100;

/// Size limit for a single encrypted blob (base64 text).
pub const MAX_BLOB_LEN: usize = 256 * 1024;

/// Size limit for nonce and checksum fields.
pub const MAX_ENVELOPE_FIELD_LEN: usize = 128;

/// Default page size for pull.
pub const DEFAULT_PULL_LIMIT: u32 = 50;

/// Maximum page size for pull.
pub const MAX_PULL_LIMIT: u32 = 100;

/// Kind of mutation a client ships in a push batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

/// One client-side mutation of an encrypted task.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    #[serde(rename = "type")]
    pub op_type: OperationType,
    pub task_id: TaskId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub encrypted_blob: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
    pub vector_clock: VectorClock,
}

/// Body of `POST /api/sync/push`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub device_id: DeviceId,
    pub operations: Vec<SyncOperation>,
    pub client_vector_clock: VectorClock,
}

/// Per-operation rejection reasons. Reported inline; a rejected operation
/// never fails the batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    ValidationError,
    QuotaExceeded,
    InternalError,
}

/// Why a push operation was parked for client-side resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictReason {
    ConcurrentEdit,
    DeleteEdit,
}

impl ConflictReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConflictReason::ConcurrentEdit => "concurrent_edit",
            ConflictReason::DeleteEdit => "delete_edit",
        }
    }
}

/// Successful application of one push operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedOperation {
    pub task_id: TaskId,
    /// Row version after the write; absent for delete no-ops.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

/// Inline rejection of one push operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedOperation {
    pub task_id: TaskId,
    pub reason: RejectReason,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Conflict surfaced to the client for manual or LWW resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictInfo {
    pub task_id: TaskId,
    pub reason: ConflictReason,
    pub existing_clock: VectorClock,
    pub incoming_clock: VectorClock,
}

/// Response of `POST /api/sync/push`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushResponse {
    pub accepted: Vec<AcceptedOperation>,
    pub rejected: Vec<RejectedOperation>,
    pub conflicts: Vec<ConflictInfo>,
    /// Pointwise merge of the clocks of every live row for the user.
    pub server_vector_clock: VectorClock,
}

/// Body of `POST /api/sync/pull`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub device_id: DeviceId,
    pub last_vector_clock: VectorClock,
    /// Closed lower bound on `updated_at`/`deleted_at`, epoch milliseconds.
    /// Defaults to zero (full resync).
    #[serde(default)]
    pub since_timestamp: Option<i64>,
    #[serde(default)]
    pub limit: Option<u32>,
    /// Continuation cursor from a previous page's `next_cursor`.
    #[serde(default)]
    pub cursor: Option<i64>,
}

/// Encrypted task envelope as shipped to clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskEnvelope {
    pub task_id: TaskId,
    pub encrypted_blob: String,
    pub nonce: String,
    pub checksum: String,
    pub version: i64,
    pub vector_clock: VectorClock,
    pub last_modified_device: DeviceId,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<i64>,
}

/// Response of `POST /api/sync/pull`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub tasks: Vec<TaskEnvelope>,
    /// Tombstones in the requested window, so lagging devices observe
    /// deletions.
    pub deleted_task_ids: Vec<TaskId>,
    pub has_more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<i64>,
    pub server_vector_clock: VectorClock,
}

/// Client's verdict on a previously reported conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    KeepLocal,
    KeepRemote,
    Merge,
}

/// Replacement envelope carried by a merge resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergedTask {
    pub encrypted_blob: String,
    pub nonce: String,
    pub checksum: String,
    pub vector_clock: VectorClock,
}

/// Body of `POST /api/sync/resolve`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub task_id: TaskId,
    pub resolution: Resolution,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub merged_task: Option<MergedTask>,
}

/// Response of `GET /api/sync/status`.
///
/// Pending counts are a client-side concept (the outbound queue lives on the
/// device); the server reports them as zero for shape stability.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatusResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync_at: Option<i64>,
    pub pending_push_count: u32,
    pub pending_pull_count: u32,
    pub conflict_count: i64,
    pub device_count: i64,
    pub storage_used: i64,
    pub storage_quota: i64,
}

/// Response of `GET /api/stats`: every envelope (live and deleted) plus
/// aggregates over envelope fields only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsResponse {
    pub tasks: Vec<TaskEnvelope>,
    pub total_count: i64,
    pub live_count: i64,
    pub deleted_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_created_at: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_updated_at: Option<i64>,
    pub approx_storage_bytes: i64,
}

/// One row of `GET /api/devices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: DeviceId,
    pub device_name: String,
    pub last_seen_at: i64,
    pub is_active: bool,
    /// True for the device the request was authenticated as.
    pub current: bool,
}

/// Response of `GET /api/devices`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicesResponse {
    pub devices: Vec<DeviceInfo>,
}

/// Minimal `{"success": true}` acknowledgement.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

impl Ack {
    pub fn ok() -> Self {
        Ack { success: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_type_tag_is_lowercase() {
        let op: SyncOperation = serde_json::from_value(serde_json::json!({
            "type": "create",
            "taskId": "t-1",
            "encryptedBlob": "AAA",
            "nonce": "BBB",
            "checksum": "CCC",
            "vectorClock": {"d1": 1}
        }))
        .unwrap();
        assert_eq!(op.op_type, OperationType::Create);
        assert_eq!(op.vector_clock.get("d1"), 1);
    }

    #[test]
    fn reject_reason_uses_snake_case() {
        assert_eq!(
            serde_json::to_string(&RejectReason::QuotaExceeded).unwrap(),
            r#""quota_exceeded""#
        );
        assert_eq!(
            serde_json::to_string(&ConflictReason::DeleteEdit).unwrap(),
            r#""delete_edit""#
        );
    }

    #[test]
    fn pull_request_defaults_are_absent() {
        let req: PullRequest = serde_json::from_value(serde_json::json!({
            "deviceId": uuid::Uuid::now_v7(),
            "lastVectorClock": {}
        }))
        .unwrap();
        assert!(req.since_timestamp.is_none());
        assert!(req.limit.is_none());
        assert!(req.cursor.is_none());
    }

    #[test]
    fn live_envelope_omits_deleted_at() {
        let envelope = TaskEnvelope {
            task_id: TaskId::new("t-1").unwrap(),
            encrypted_blob: "blob".into(),
            nonce: "n".into(),
            checksum: "c".into(),
            version: 1,
            vector_clock: VectorClock::single("d1", 1),
            last_modified_device: DeviceId::new(),
            created_at: 0,
            updated_at: 0,
            deleted_at: None,
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert!(json.get("deletedAt").is_none());
    }
}
