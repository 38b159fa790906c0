//! Relational storage: pool management and the repository aggregate.

pub mod ports;
pub mod repositories;

use crate::error::{Result, SyncError};
use sqlx::{
    PgPool,
    postgres::PgPoolOptions,
};
use std::fmt;
use tracing::info;

use repositories::{
    PgConflictsRepository, PgDevicesRepository, PgMaintenanceRepository,
    PgSyncStateRepository, PgTasksRepository, PgUsersRepository,
};

/// Statistics about the connection pool.
#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: u32,
    pub idle: usize,
    pub max_size: u32,
}

/// Aggregate over the Postgres repositories. Cheap to clone; every
/// repository shares the same pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    max_connections: u32,
    users: PgUsersRepository,
    devices: PgDevicesRepository,
    tasks: PgTasksRepository,
    sync_state: PgSyncStateRepository,
    conflicts: PgConflictsRepository,
    maintenance: PgMaintenanceRepository,
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

impl Database {
    pub async fn new(connection_string: &str) -> Result<Self> {
        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(10);

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(1)
            .acquire_timeout(std::time::Duration::from_secs(10))
            .max_lifetime(std::time::Duration::from_secs(1800))
            .idle_timeout(std::time::Duration::from_secs(600))
            .test_before_acquire(true)
            .connect(connection_string)
            .await
            .map_err(|e| {
                SyncError::Internal(format!("Database connection failed: {e}"))
            })?;

        info!(max_connections, "database pool initialized");

        Ok(Database {
            users: PgUsersRepository::new(pool.clone()),
            devices: PgDevicesRepository::new(pool.clone()),
            tasks: PgTasksRepository::new(pool.clone()),
            sync_state: PgSyncStateRepository::new(pool.clone()),
            conflicts: PgConflictsRepository::new(pool.clone()),
            maintenance: PgMaintenanceRepository::new(pool.clone()),
            pool,
            max_connections,
        })
    }

    /// Applies the embedded migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| SyncError::Internal(format!("migration failed: {e}")))?;
        info!("database migrations applied");
        Ok(())
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle(),
            max_size: self.max_connections,
        }
    }

    pub fn users(&self) -> &PgUsersRepository {
        &self.users
    }

    pub fn devices(&self) -> &PgDevicesRepository {
        &self.devices
    }

    pub fn tasks(&self) -> &PgTasksRepository {
        &self.tasks
    }

    pub fn sync_state(&self) -> &PgSyncStateRepository {
        &self.sync_state
    }

    pub fn conflicts(&self) -> &PgConflictsRepository {
        &self.conflicts
    }

    pub fn maintenance(&self) -> &PgMaintenanceRepository {
        &self.maintenance
    }
}
