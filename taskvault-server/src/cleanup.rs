//! Retention cleanup driver.
//!
//! The same core routine serves two triggers: a `--cleanup` oneshot for
//! external schedulers (cron, systemd timers) and a daily in-process loop
//! for deployments without one.

use std::time::Duration;

use tracing::{info, warn};

use crate::infra::app_state::AppState;
use taskvault_core::cleanup::{CleanupReport, RetentionPolicy, run_retention};
use taskvault_core::database::Database;

/// Interval of the in-process retention loop.
const CLEANUP_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Runs one full retention pass.
pub async fn run_once(db: &Database, policy: &RetentionPolicy) -> CleanupReport {
    info!("retention cleanup starting");
    let report = run_retention(db.maintenance(), policy).await;
    if report.fully_succeeded() {
        info!(?report, "retention cleanup finished");
    } else {
        warn!(?report, "retention cleanup finished with failed passes");
    }
    report
}

/// Spawns the daily retention loop. The first run happens one interval
/// after startup so boot storms never coincide with bulk deletes.
pub fn spawn_retention_loop(state: AppState) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(CLEANUP_INTERVAL);
        interval.tick().await; // immediate first tick
        loop {
            interval.tick().await;
            run_once(&state.db, &state.config.retention).await;
        }
    });
}
