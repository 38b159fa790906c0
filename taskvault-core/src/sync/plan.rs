//! Pure decision table for push operations.
//!
//! Each push operation is planned against the existing row (tombstones
//! included) before any write happens. Keeping the table pure means the
//! conflict semantics are testable without a database and every handler
//! write path goes through the same rules.
//!
//! The orientation of the delete rules: a delete is only accepted when the
//! deleting device has seen the current server state (its clock dominates or
//! equals the row's). A stale delete, or an edit arriving against a newer or
//! concurrent tombstone, is a `delete_edit` conflict; divergent live edits
//! are `concurrent_edit`.

use crate::task::EncryptedTask;
use taskvault_model::{
    ClockOrdering, ConflictReason, OperationType, RejectReason, SyncOperation,
    sync::{MAX_BLOB_LEN, MAX_ENVELOPE_FIELD_LEN},
};

/// Planned outcome for a single push operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushAction {
    /// No existing row: insert with version 1.
    Insert,
    /// Existing row (live or tombstone) is causally superseded: overwrite
    /// blob/nonce/checksum, bump version, store the incoming clock. A
    /// tombstoned row is resurrected by this path.
    Overwrite,
    /// Accepted delete: set `deleted_at`, store the incoming clock.
    SoftDelete,
    /// Delete of a row that never existed; accepted without a write.
    DeleteNoop,
    /// Park for client resolution; the existing row is left untouched.
    Conflict(ConflictReason),
    /// Malformed operation; reported inline, never fails the batch.
    Reject {
        reason: RejectReason,
        detail: String,
    },
}

/// Shape and size validation for one operation.
///
/// Returns the human-readable reason when the operation cannot be applied
/// regardless of server state.
pub fn validate_operation(op: &SyncOperation) -> Option<String> {
    if let Some(blob) = &op.encrypted_blob
        && blob.len() > MAX_BLOB_LEN
    {
        return Some(format!("encryptedBlob exceeds {MAX_BLOB_LEN} bytes"));
    }
    if let Some(nonce) = &op.nonce
        && nonce.len() > MAX_ENVELOPE_FIELD_LEN
    {
        return Some(format!("nonce exceeds {MAX_ENVELOPE_FIELD_LEN} bytes"));
    }
    if let Some(checksum) = &op.checksum
        && checksum.len() > MAX_ENVELOPE_FIELD_LEN
    {
        return Some(format!("checksum exceeds {MAX_ENVELOPE_FIELD_LEN} bytes"));
    }
    if matches!(op.op_type, OperationType::Create | OperationType::Update) {
        let has_payload = op
            .encrypted_blob
            .as_ref()
            .is_some_and(|b| !b.is_empty())
            && op.nonce.as_ref().is_some_and(|n| !n.is_empty())
            && op.checksum.as_ref().is_some_and(|c| !c.is_empty());
        if !has_payload {
            return Some(
                "create/update requires encryptedBlob, nonce and checksum".into(),
            );
        }
    }
    None
}

/// Plans one operation against the existing row for the same task id.
pub fn plan_operation(
    op: &SyncOperation,
    existing: Option<&EncryptedTask>,
) -> PushAction {
    if let Some(detail) = validate_operation(op) {
        return PushAction::Reject {
            reason: RejectReason::ValidationError,
            detail,
        };
    }

    match op.op_type {
        OperationType::Create | OperationType::Update => match existing {
            None => PushAction::Insert,
            Some(row) => {
                let ordering = row.vector_clock.compare(&op.vector_clock);
                if row.is_live() {
                    match ordering {
                        ClockOrdering::Concurrent => {
                            PushAction::Conflict(ConflictReason::ConcurrentEdit)
                        }
                        _ => PushAction::Overwrite,
                    }
                } else {
                    // Editing a tombstone: only an edit that has seen the
                    // deletion may resurrect the row.
                    match ordering {
                        ClockOrdering::ABeforeB | ClockOrdering::Identical => {
                            PushAction::Overwrite
                        }
                        ClockOrdering::BBeforeA | ClockOrdering::Concurrent => {
                            PushAction::Conflict(ConflictReason::DeleteEdit)
                        }
                    }
                }
            }
        },
        OperationType::Delete => match existing {
            None => PushAction::DeleteNoop,
            Some(row) => match row.vector_clock.compare(&op.vector_clock) {
                ClockOrdering::ABeforeB | ClockOrdering::Identical => {
                    PushAction::SoftDelete
                }
                ClockOrdering::Concurrent => {
                    PushAction::Conflict(ConflictReason::ConcurrentEdit)
                }
                ClockOrdering::BBeforeA => {
                    PushAction::Conflict(ConflictReason::DeleteEdit)
                }
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use taskvault_model::{DeviceId, TaskId, UserId, VectorClock};

    fn clock(entries: &[(&str, u64)]) -> VectorClock {
        entries
            .iter()
            .map(|(d, c)| (d.to_string(), *c))
            .collect()
    }

    fn row(vc: VectorClock, deleted: bool) -> EncryptedTask {
        let now = Utc::now();
        EncryptedTask {
            task_id: TaskId::new("t-1").unwrap(),
            user_id: UserId::new(),
            encrypted_blob: "blob".into(),
            nonce: "nonce".into(),
            checksum: "sum".into(),
            version: 3,
            vector_clock: vc,
            last_modified_device: DeviceId::new(),
            created_at: now,
            updated_at: now,
            deleted_at: deleted.then_some(now),
        }
    }

    fn update_op(vc: VectorClock) -> SyncOperation {
        SyncOperation {
            op_type: OperationType::Update,
            task_id: TaskId::new("t-1").unwrap(),
            encrypted_blob: Some("blob2".into()),
            nonce: Some("nonce2".into()),
            checksum: Some("sum2".into()),
            vector_clock: vc,
        }
    }

    fn delete_op(vc: VectorClock) -> SyncOperation {
        SyncOperation {
            op_type: OperationType::Delete,
            task_id: TaskId::new("t-1").unwrap(),
            encrypted_blob: None,
            nonce: None,
            checksum: None,
            vector_clock: vc,
        }
    }

    #[test]
    fn fresh_create_inserts() {
        let op = update_op(clock(&[("d1", 1)]));
        assert_eq!(plan_operation(&op, None), PushAction::Insert);
    }

    #[test]
    fn create_without_payload_is_rejected() {
        let mut op = update_op(clock(&[("d1", 1)]));
        op.encrypted_blob = None;
        assert!(matches!(
            plan_operation(&op, None),
            PushAction::Reject {
                reason: RejectReason::ValidationError,
                ..
            }
        ));
    }

    #[test]
    fn oversized_blob_is_rejected() {
        let mut op = update_op(clock(&[("d1", 1)]));
        op.encrypted_blob = Some("x".repeat(MAX_BLOB_LEN + 1));
        assert!(matches!(
            plan_operation(&op, None),
            PushAction::Reject {
                reason: RejectReason::ValidationError,
                ..
            }
        ));
    }

    #[test]
    fn causally_ordered_update_overwrites() {
        let existing = row(clock(&[("d1", 1)]), false);
        // Incoming dominates.
        let newer = update_op(clock(&[("d1", 2)]));
        assert_eq!(plan_operation(&newer, Some(&existing)), PushAction::Overwrite);
        // Incoming is older: still an overwrite (client-side LWW decides).
        let older = update_op(VectorClock::new());
        assert_eq!(plan_operation(&older, Some(&existing)), PushAction::Overwrite);
    }

    // Scenario: D1 created with {D1:1}, D2 updated to {D1:1,D2:1}; a D1 push
    // at {D1:2} that never saw D2's edit must conflict without a write.
    #[test]
    fn two_device_race_is_concurrent_edit() {
        let existing = row(clock(&[("d1", 1), ("d2", 1)]), false);
        let stale = update_op(clock(&[("d1", 2)]));
        assert_eq!(
            plan_operation(&stale, Some(&existing)),
            PushAction::Conflict(ConflictReason::ConcurrentEdit)
        );
    }

    // Scenario: row at {D1:5,D2:3}; a D2 delete at {D1:5,D2:4} has seen the
    // current state and lands; D1's later edit at {D1:6,D2:3} collides with
    // the tombstone.
    #[test]
    fn delete_then_stale_edit() {
        let live = row(clock(&[("d1", 5), ("d2", 3)]), false);
        let delete = delete_op(clock(&[("d1", 5), ("d2", 4)]));
        assert_eq!(plan_operation(&delete, Some(&live)), PushAction::SoftDelete);

        let tombstone = row(clock(&[("d1", 5), ("d2", 4)]), true);
        let stale_edit = update_op(clock(&[("d1", 6), ("d2", 3)]));
        assert_eq!(
            plan_operation(&stale_edit, Some(&tombstone)),
            PushAction::Conflict(ConflictReason::DeleteEdit)
        );
    }

    #[test]
    fn stale_delete_is_delete_edit_conflict() {
        let existing = row(clock(&[("d1", 5), ("d2", 4)]), false);
        let stale_delete = delete_op(clock(&[("d1", 5), ("d2", 3)]));
        assert_eq!(
            plan_operation(&stale_delete, Some(&existing)),
            PushAction::Conflict(ConflictReason::DeleteEdit)
        );
    }

    #[test]
    fn concurrent_delete_is_concurrent_edit() {
        let existing = row(clock(&[("d1", 2), ("d2", 1)]), false);
        let delete = delete_op(clock(&[("d1", 1), ("d2", 2)]));
        assert_eq!(
            plan_operation(&delete, Some(&existing)),
            PushAction::Conflict(ConflictReason::ConcurrentEdit)
        );
    }

    #[test]
    fn delete_of_unknown_task_is_noop() {
        let delete = delete_op(clock(&[("d1", 1)]));
        assert_eq!(plan_operation(&delete, None), PushAction::DeleteNoop);
    }

    #[test]
    fn edit_that_saw_the_delete_resurrects() {
        let tombstone = row(clock(&[("d1", 5), ("d2", 4)]), true);
        let aware_edit = update_op(clock(&[("d1", 6), ("d2", 4)]));
        assert_eq!(
            plan_operation(&aware_edit, Some(&tombstone)),
            PushAction::Overwrite
        );
    }
}
