//! Shared data models for the Taskvault sync platform.
//!
//! This crate is the leaf of the workspace: strongly typed identifiers, the
//! vector clock value type used for causal ordering, and the wire contracts
//! exchanged with sync clients. It carries no I/O and no storage concerns.

pub mod auth;
pub mod clock;
pub mod error;
pub mod ids;
pub mod sync;

pub use auth::{
    AuthData, AuthProvider, EncryptionSaltResponse, OAuthResultResponse,
    OAuthResultStatus, OAuthStartResponse, RefreshResponse,
    SetEncryptionSaltRequest,
};
pub use clock::{ClockOrdering, VectorClock};
pub use error::ModelError;
pub use ids::{DeviceId, TaskId, UserId};
pub use sync::{
    AcceptedOperation, Ack, ConflictInfo, ConflictReason, DeviceInfo,
    DevicesResponse, MergedTask, OperationType, PullRequest, PullResponse,
    PushRequest, PushResponse, RejectReason, RejectedOperation, Resolution,
    ResolveRequest, StatsResponse, SyncOperation, SyncStatusResponse,
    TaskEnvelope,
};
