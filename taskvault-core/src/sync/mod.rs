//! Sync engine core: the pure push decision table.

pub mod plan;

pub use plan::{PushAction, plan_operation, validate_operation};
