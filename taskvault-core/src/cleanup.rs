//! Scheduled retention cleanup.
//!
//! Three passes over the relational store: expired tombstones, resolved
//! conflict-log rows, and long-inactive devices. Each pass is isolated so
//! one failure never halts the others; the caller gets a report with
//! per-pass counts and errors.

use crate::database::ports::maintenance::MaintenanceRepository;
use chrono::{Duration, Utc};
use tracing::{error, info};

/// Retention windows, one source of truth for the scheduler.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Tombstones older than this are hard-deleted.
    pub tombstone_days: i64,
    /// Resolved conflict-log rows older than this are dropped.
    pub conflict_days: i64,
    /// Inactive devices unseen for this long are dropped.
    pub inactive_device_days: i64,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            tombstone_days: 30,
            conflict_days: 90,
            inactive_device_days: 180,
        }
    }
}

/// Outcome of one cleanup run. A `None` count means that pass failed.
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub tombstones_deleted: Option<u64>,
    pub conflicts_deleted: Option<u64>,
    pub devices_deleted: Option<u64>,
}

impl CleanupReport {
    pub fn fully_succeeded(&self) -> bool {
        self.tombstones_deleted.is_some()
            && self.conflicts_deleted.is_some()
            && self.devices_deleted.is_some()
    }
}

/// Runs all three retention passes.
pub async fn run_retention(
    store: &dyn MaintenanceRepository,
    policy: &RetentionPolicy,
) -> CleanupReport {
    let now = Utc::now();
    let mut report = CleanupReport::default();

    match store
        .purge_tombstones(now - Duration::days(policy.tombstone_days))
        .await
    {
        Ok(count) => {
            info!(count, "cleanup: purged expired tombstones");
            report.tombstones_deleted = Some(count);
        }
        Err(e) => error!(error = %e, "cleanup: tombstone pass failed"),
    }

    match store
        .purge_resolved_conflicts(now - Duration::days(policy.conflict_days))
        .await
    {
        Ok(count) => {
            info!(count, "cleanup: purged resolved conflicts");
            report.conflicts_deleted = Some(count);
        }
        Err(e) => error!(error = %e, "cleanup: conflict-log pass failed"),
    }

    match store
        .purge_inactive_devices(now - Duration::days(policy.inactive_device_days))
        .await
    {
        Ok(count) => {
            info!(count, "cleanup: purged inactive devices");
            report.devices_deleted = Some(count);
        }
        Err(e) => error!(error = %e, "cleanup: device pass failed"),
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::ports::maintenance::MockMaintenanceRepository;
    use crate::error::SyncError;

    #[tokio::test]
    async fn all_passes_run_and_report_counts() {
        let mut store = MockMaintenanceRepository::new();
        store
            .expect_purge_tombstones()
            .times(1)
            .returning(|_| Ok(7));
        store
            .expect_purge_resolved_conflicts()
            .times(1)
            .returning(|_| Ok(2));
        store
            .expect_purge_inactive_devices()
            .times(1)
            .returning(|_| Ok(1));

        let report = run_retention(&store, &RetentionPolicy::default()).await;
        assert_eq!(report.tombstones_deleted, Some(7));
        assert_eq!(report.conflicts_deleted, Some(2));
        assert_eq!(report.devices_deleted, Some(1));
        assert!(report.fully_succeeded());
    }

    #[tokio::test]
    async fn a_failed_pass_does_not_halt_the_others() {
        let mut store = MockMaintenanceRepository::new();
        store
            .expect_purge_tombstones()
            .times(1)
            .returning(|_| Err(SyncError::Internal("pool exhausted".into())));
        store
            .expect_purge_resolved_conflicts()
            .times(1)
            .returning(|_| Ok(0));
        store
            .expect_purge_inactive_devices()
            .times(1)
            .returning(|_| Ok(3));

        let report = run_retention(&store, &RetentionPolicy::default()).await;
        assert_eq!(report.tombstones_deleted, None);
        assert_eq!(report.conflicts_deleted, Some(0));
        assert_eq!(report.devices_deleted, Some(3));
        assert!(!report.fully_succeeded());
    }

    #[tokio::test]
    async fn cutoffs_respect_the_policy_windows() {
        let mut store = MockMaintenanceRepository::new();
        let now = Utc::now();

        store.expect_purge_tombstones().times(1).returning(move |cutoff| {
            let days = (now - cutoff).num_days();
            assert!((29..=30).contains(&days), "tombstone cutoff was {days} days");
            Ok(0)
        });
        store
            .expect_purge_resolved_conflicts()
            .times(1)
            .returning(move |cutoff| {
                let days = (now - cutoff).num_days();
                assert!((89..=90).contains(&days));
                Ok(0)
            });
        store
            .expect_purge_inactive_devices()
            .times(1)
            .returning(move |cutoff| {
                let days = (now - cutoff).num_days();
                assert!((179..=180).contains(&days));
                Ok(0)
            });

        run_retention(&store, &RetentionPolicy::default()).await;
    }
}
