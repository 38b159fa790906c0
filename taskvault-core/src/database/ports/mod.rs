//! Repository ports: the storage traits the service depends on.
//!
//! Handlers use the concrete Postgres repositories through [`crate::database::Database`];
//! the traits exist so cross-cutting logic (retention, tests) can run against
//! mocks.

pub mod conflicts;
pub mod devices;
pub mod maintenance;
pub mod sync_state;
pub mod tasks;
pub mod users;

pub use conflicts::ConflictsRepository;
pub use devices::DevicesRepository;
pub use maintenance::MaintenanceRepository;
pub use sync_state::SyncStateRepository;
pub use tasks::TasksRepository;
pub use users::UsersRepository;
