//! Sync handlers: push, pull, resolve, status, stats.
//!
//! Push applies the pure decision table from `taskvault_core::sync::plan`
//! operation by operation, each inside its own error boundary: one failing
//! operation lands in `rejected[]` and never aborts its siblings or the
//! audit write. The authoritative device id always comes from the verified
//! session; a disagreeing body is a 403.

use axum::{Extension, Json, extract::State};
use chrono::{DateTime, Utc};
use tracing::{error, warn};

use crate::infra::{app_state::AppState, errors::{AppError, AppResult}};
use crate::middleware::auth::AuthContext;
use taskvault_core::database::ports::tasks::TaskWrite;
use taskvault_core::database::ports::{ConflictsRepository, DevicesRepository, SyncStateRepository, TasksRepository};
use taskvault_core::error::SyncError;
use taskvault_core::sync::plan::{PushAction, plan_operation};
use taskvault_core::task::{
    ConflictLogEntry, EncryptedTask, SyncMetadata, SyncOperationKind, SyncStatus,
};
use taskvault_model::{
    AcceptedOperation, Ack, ConflictInfo, ConflictReason, PullRequest,
    PullResponse, PushRequest, PushResponse, RejectReason, RejectedOperation,
    Resolution, ResolveRequest, StatsResponse, SyncOperation,
    SyncStatusResponse, VectorClock,
    sync::{DEFAULT_PULL_LIMIT, MAX_OPERATIONS_PER_PUSH, MAX_PULL_LIMIT},
};

/// Per-operation outcome inside a push batch.
enum OpOutcome {
    Accepted(AcceptedOperation),
    Rejected(RejectedOperation),
    Conflicted(ConflictInfo),
}

/// `POST /api/sync/push`
pub async fn push(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(request): Json<PushRequest>,
) -> AppResult<Json<PushResponse>> {
    if request.device_id != ctx.device_id {
        return Err(AppError::forbidden(
            "Request device does not match the authenticated device",
        ));
    }
    if request.operations.len() > MAX_OPERATIONS_PER_PUSH {
        return Err(AppError::bad_request(format!(
            "Push exceeds {MAX_OPERATIONS_PER_PUSH} operations per request"
        )));
    }

    let task_quota = state.config.task_quota();
    let mut live_count = state.db.tasks().live_count(ctx.user_id).await?;

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    let mut conflicts = Vec::new();

    for op in &request.operations {
        match apply_operation(&state, &ctx, op, task_quota, &mut live_count).await {
            Ok(OpOutcome::Accepted(a)) => accepted.push(a),
            Ok(OpOutcome::Rejected(r)) => rejected.push(r),
            Ok(OpOutcome::Conflicted(c)) => conflicts.push(c),
            Err(e) => {
                // Isolation boundary: this operation failed, the batch goes on.
                error!(task_id = %op.task_id, error = %e, "push operation failed");
                rejected.push(RejectedOperation {
                    task_id: op.task_id.clone(),
                    reason: RejectReason::InternalError,
                    detail: None,
                });
            }
        }
    }

    let sync_status = if conflicts.is_empty() {
        SyncStatus::Success
    } else {
        SyncStatus::Conflict
    };
    finish_sync(
        &state,
        &ctx,
        SyncOperationKind::Push,
        &request.client_vector_clock,
        sync_status,
    )
    .await;

    let server_vector_clock = state.db.tasks().server_clock(ctx.user_id).await?;

    Ok(Json(PushResponse {
        accepted,
        rejected,
        conflicts,
        server_vector_clock,
    }))
}

async fn apply_operation(
    state: &AppState,
    ctx: &AuthContext,
    op: &SyncOperation,
    task_quota: i64,
    live_count: &mut i64,
) -> Result<OpOutcome, SyncError> {
    let existing = state.db.tasks().get(ctx.user_id, &op.task_id).await?;

    match plan_operation(op, existing.as_ref()) {
        PushAction::Insert => {
            // Quota gates new rows only; updates and deletes always land.
            if *live_count >= task_quota {
                return Ok(OpOutcome::Rejected(RejectedOperation {
                    task_id: op.task_id.clone(),
                    reason: RejectReason::QuotaExceeded,
                    detail: Some(format!("storage quota of {task_quota} tasks reached")),
                }));
            }
            let now = Utc::now();
            let task = EncryptedTask {
                task_id: op.task_id.clone(),
                user_id: ctx.user_id,
                // Payload presence is guaranteed by the planner.
                encrypted_blob: op.encrypted_blob.clone().unwrap_or_default(),
                nonce: op.nonce.clone().unwrap_or_default(),
                checksum: op.checksum.clone().unwrap_or_default(),
                version: 1,
                vector_clock: op.vector_clock.clone(),
                last_modified_device: ctx.device_id,
                created_at: now,
                updated_at: now,
                deleted_at: None,
            };
            state.db.tasks().insert(&task).await?;
            *live_count += 1;
            Ok(OpOutcome::Accepted(AcceptedOperation {
                task_id: op.task_id.clone(),
                version: Some(1),
            }))
        }

        PushAction::Overwrite => {
            let resurrects = existing.as_ref().is_some_and(|row| !row.is_live());
            let write = TaskWrite {
                encrypted_blob: op.encrypted_blob.clone().unwrap_or_default(),
                nonce: op.nonce.clone().unwrap_or_default(),
                checksum: op.checksum.clone().unwrap_or_default(),
                vector_clock: op.vector_clock.clone(),
                device_id: ctx.device_id,
            };
            let version = state
                .db
                .tasks()
                .overwrite(ctx.user_id, &op.task_id, &write)
                .await?;
            if resurrects {
                *live_count += 1;
            }
            Ok(OpOutcome::Accepted(AcceptedOperation {
                task_id: op.task_id.clone(),
                version: Some(version),
            }))
        }

        PushAction::SoftDelete => {
            let was_live = existing.as_ref().is_some_and(EncryptedTask::is_live);
            let version = state
                .db
                .tasks()
                .soft_delete(ctx.user_id, &op.task_id, &op.vector_clock, ctx.device_id)
                .await?;
            if was_live {
                *live_count -= 1;
            }
            Ok(OpOutcome::Accepted(AcceptedOperation {
                task_id: op.task_id.clone(),
                version: Some(version),
            }))
        }

        PushAction::DeleteNoop => Ok(OpOutcome::Accepted(AcceptedOperation {
            task_id: op.task_id.clone(),
            version: None,
        })),

        PushAction::Conflict(reason) => {
            let existing_clock = existing
                .as_ref()
                .map(|row| row.vector_clock.clone())
                .unwrap_or_default();
            let entry = ConflictLogEntry {
                user_id: ctx.user_id,
                task_id: op.task_id.clone(),
                existing_clock: existing_clock.clone(),
                incoming_clock: op.vector_clock.clone(),
                reason,
                resolution: None,
                resolved_at: None,
            };
            if let Err(e) = state.db.conflicts().record(&entry).await {
                warn!(task_id = %op.task_id, error = %e, "conflict log write failed");
            }
            Ok(OpOutcome::Conflicted(ConflictInfo {
                task_id: op.task_id.clone(),
                reason,
                existing_clock,
                incoming_clock: op.vector_clock.clone(),
            }))
        }

        PushAction::Reject { reason, detail } => {
            Ok(OpOutcome::Rejected(RejectedOperation {
                task_id: op.task_id.clone(),
                reason,
                detail: Some(detail),
            }))
        }
    }
}

/// `POST /api/sync/pull`
pub async fn pull(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(request): Json<PullRequest>,
) -> AppResult<Json<PullResponse>> {
    if request.device_id != ctx.device_id {
        return Err(AppError::forbidden(
            "Request device does not match the authenticated device",
        ));
    }

    let limit = request
        .limit
        .unwrap_or(DEFAULT_PULL_LIMIT)
        .clamp(1, MAX_PULL_LIMIT) as usize;

    // A continuation cursor supersedes the client's own watermark.
    let since_ms = request
        .cursor
        .or(request.since_timestamp)
        .unwrap_or(0)
        .max(0);
    let since = DateTime::from_timestamp_millis(since_ms)
        .ok_or_else(|| AppError::bad_request("sinceTimestamp is out of range"))?;

    // Fetch one extra row to detect another page.
    let mut rows = state
        .db
        .tasks()
        .pull_window(ctx.user_id, since, (limit + 1) as i64)
        .await?;
    let has_more = rows.len() > limit;
    rows.truncate(limit);

    let next_cursor = if has_more {
        rows.last().map(|row| {
            row.deleted_at
                .unwrap_or(row.updated_at)
                .timestamp_millis()
        })
    } else {
        None
    };

    let mut tasks = Vec::new();
    let mut deleted_task_ids = Vec::new();
    for row in &rows {
        if row.is_live() {
            tasks.push(row.to_envelope());
        } else {
            deleted_task_ids.push(row.task_id.clone());
        }
    }

    finish_sync(
        &state,
        &ctx,
        SyncOperationKind::Pull,
        &request.last_vector_clock,
        SyncStatus::Success,
    )
    .await;

    let server_vector_clock = state.db.tasks().server_clock(ctx.user_id).await?;

    Ok(Json(PullResponse {
        tasks,
        deleted_task_ids,
        has_more,
        next_cursor,
        server_vector_clock,
    }))
}

/// Observational bookkeeping shared by push and pull: the metadata upsert
/// and the audit append. The data writes have already happened, so failures
/// here are logged, never surfaced.
async fn finish_sync(
    state: &AppState,
    ctx: &AuthContext,
    kind: SyncOperationKind,
    client_clock: &VectorClock,
    sync_status: SyncStatus,
) {
    let prior = match state
        .db
        .sync_state()
        .get_metadata(ctx.user_id, ctx.device_id)
        .await
    {
        Ok(prior) => prior,
        Err(e) => {
            warn!(user_id = %ctx.user_id, error = %e, "sync metadata read failed");
            None
        }
    };

    let (mut last_push_vector, mut last_pull_vector) = prior
        .map(|m| (m.last_push_vector, m.last_pull_vector))
        .unwrap_or_default();
    match kind {
        SyncOperationKind::Push => last_push_vector = client_clock.clone(),
        SyncOperationKind::Pull => last_pull_vector = client_clock.clone(),
    }

    let meta = SyncMetadata {
        user_id: ctx.user_id,
        device_id: ctx.device_id,
        last_sync_at: Utc::now(),
        last_push_vector,
        last_pull_vector,
        sync_status,
    };
    if let Err(e) = state.db.sync_state().upsert_metadata(&meta).await {
        warn!(user_id = %ctx.user_id, error = %e, "sync metadata upsert failed");
    }
    if let Err(e) = state
        .db
        .sync_state()
        .record_operation(ctx.user_id, ctx.device_id, kind, client_clock)
        .await
    {
        warn!(user_id = %ctx.user_id, error = %e, "sync audit append failed");
    }
}

/// `POST /api/sync/resolve`
///
/// With `resolution=merge` and a merged envelope the row is overwritten and
/// its version bumped; for keep_local/keep_remote the client effects the
/// outcome through its next push. Either way the resolution is logged as
/// `manual`.
pub async fn resolve(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(request): Json<ResolveRequest>,
) -> AppResult<Json<Ack>> {
    let existing = state.db.tasks().get(ctx.user_id, &request.task_id).await?;
    let existing_clock = existing
        .as_ref()
        .map(|row| row.vector_clock.clone())
        .unwrap_or_default();

    let mut incoming_clock = existing_clock.clone();

    if request.resolution == Resolution::Merge {
        if let Some(merged) = &request.merged_task {
            if existing.is_none() {
                return Err(AppError::not_found("Task not found"));
            }
            if merged.encrypted_blob.is_empty()
                || merged.nonce.is_empty()
                || merged.checksum.is_empty()
            {
                return Err(AppError::bad_request(
                    "mergedTask requires encryptedBlob, nonce and checksum",
                ));
            }
            let write = TaskWrite {
                encrypted_blob: merged.encrypted_blob.clone(),
                nonce: merged.nonce.clone(),
                checksum: merged.checksum.clone(),
                vector_clock: merged.vector_clock.clone(),
                device_id: ctx.device_id,
            };
            state
                .db
                .tasks()
                .overwrite(ctx.user_id, &request.task_id, &write)
                .await?;
            incoming_clock = merged.vector_clock.clone();
        }
    }

    let entry = ConflictLogEntry {
        user_id: ctx.user_id,
        task_id: request.task_id.clone(),
        existing_clock,
        incoming_clock,
        reason: ConflictReason::ConcurrentEdit,
        resolution: Some("manual".to_string()),
        resolved_at: Some(Utc::now()),
    };
    state.db.conflicts().record(&entry).await?;

    Ok(Json(Ack::ok()))
}

/// `GET /api/sync/status`
pub async fn status(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<SyncStatusResponse>> {
    let last_sync_at = state.db.sync_state().last_sync_at(ctx.user_id).await?;
    let conflict_count = state.db.conflicts().unresolved_count(ctx.user_id).await?;
    let device_count = state.db.devices().count_active(ctx.user_id).await?;
    let storage_used = state.db.tasks().storage_used(ctx.user_id).await?;

    Ok(Json(SyncStatusResponse {
        last_sync_at: last_sync_at.map(|t| t.timestamp_millis()),
        // Pending queues live on the devices, not here.
        pending_push_count: 0,
        pending_pull_count: 0,
        conflict_count,
        device_count,
        storage_used,
        storage_quota: state.config.quota_bytes,
    }))
}

/// `GET /api/stats`
///
/// Every envelope, live and deleted, plus aggregates computed over envelope
/// fields only. Ciphertext in, ciphertext out.
pub async fn stats(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
) -> AppResult<Json<StatsResponse>> {
    let rows = state.db.tasks().all_for_user(ctx.user_id).await?;

    let total_count = rows.len() as i64;
    let live_count = rows.iter().filter(|r| r.is_live()).count() as i64;
    let oldest_created_at = rows
        .iter()
        .map(|r| r.created_at.timestamp_millis())
        .min();
    let newest_updated_at = rows
        .iter()
        .map(|r| r.updated_at.timestamp_millis())
        .max();
    let approx_storage_bytes = rows
        .iter()
        .map(|r| (r.encrypted_blob.len() + r.nonce.len() + r.checksum.len()) as i64)
        .sum();

    Ok(Json(StatsResponse {
        tasks: rows.iter().map(EncryptedTask::to_envelope).collect(),
        total_count,
        live_count,
        deleted_count: total_count - live_count,
        oldest_created_at,
        newest_updated_at,
        approx_storage_bytes,
    }))
}
