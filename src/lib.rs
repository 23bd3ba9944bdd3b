// Request lifecycle subsystem for the school-operations platform.
//
// Two request kinds with fixed transition graphs: role elevation requests
// and cross-school student data transfers. The workflow engine owns the
// transition discipline; storage, audit, and notifications are injected
// collaborators.

pub mod actor;
pub mod audit;
pub mod config;
pub mod consent;
pub mod engine;
pub mod notify;
pub mod requests;
pub mod store;
pub mod telemetry;

// Re-export key types for easy access
pub use actor::{Actor, ActorId, Role, SchoolId};
pub use audit::{replay_status, AuditEntry};
pub use config::RequestFlowConfig;
pub use consent::{ConsentEvidence, ConsentGate};
pub use engine::{TransitionOutcome, WorkflowEngine, WorkflowError};
pub use notify::{Notification, NotificationDispatcher, Severity};
pub use requests::{
    DataTransferRequest, DataType, NotificationId, RequestId, RequestKind, RequestedRole, RoleRequest,
    RoleRequestStatus, RoleRequestSubmission, StudentId, TransferStatus, TransferSubmission,
    WorkflowAction,
};
pub use store::{
    AuditLog, MemoryStore, NotificationStore, RequestStore, SchoolDirectory, StoreError,
};
pub use telemetry::{generate_correlation_id, init_telemetry};

#[cfg(feature = "database")]
pub use store::SqliteStore;
