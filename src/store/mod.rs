// Persistence contracts for the request lifecycle.
//
// The engine receives these as injected `Arc<dyn …>` collaborators; there is
// no module-level storage client. The compare-and-swap methods are the sole
// serialization point for concurrent transitions: each one is a single
// conditional write keyed on (id, expected status) and reports a status
// mismatch as `Ok(None)` rather than an error, leaving the interpretation to
// the engine.

pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::actor::{ActorId, SchoolId};
use crate::audit::AuditEntry;
use crate::notify::Notification;
use crate::requests::types::{
    DataTransferRequest, NotificationId, RequestId, RoleRequest, RoleRequestStatus, TransferStatus,
};

pub use memory::MemoryStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteStore;

/// Transport/backend failures surfaced by a storage adapter. The record is
/// left in its prior state; the engine performs no automatic retry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("corrupted record {id}: {reason}")]
    Corrupted { id: String, reason: String },
}

/// Fields written alongside a role request status change.
#[derive(Debug, Clone)]
pub struct RoleDecision {
    pub status: RoleRequestStatus,
    pub decided_at: DateTime<Utc>,
    pub decided_by: ActorId,
    pub note: Option<String>,
}

/// Fields written alongside a transfer status change. `parent_consent_at`
/// and `completed_at` are written only when `Some`; existing values are
/// never cleared. `note` lands in the record's `decision_note`, leaving the
/// submitter's `notes` untouched.
#[derive(Debug, Clone)]
pub struct TransferUpdate {
    pub status: TransferStatus,
    pub parent_consent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub note: Option<String>,
}

impl TransferUpdate {
    pub fn status_only(status: TransferStatus) -> Self {
        Self {
            status,
            parent_consent_at: None,
            completed_at: None,
            note: None,
        }
    }
}

/// Persistence contract for both request kinds.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait RequestStore: Send + Sync {
    async fn insert_role_request(&self, request: &RoleRequest) -> Result<(), StoreError>;

    async fn role_request(&self, id: RequestId) -> Result<Option<RoleRequest>, StoreError>;

    async fn pending_role_requests(&self) -> Result<Vec<RoleRequest>, StoreError>;

    /// Atomic conditional update: applies `decision` only if the stored
    /// status still equals `expected`. Returns the updated record, or
    /// `Ok(None)` when the status no longer matches (concurrent decision).
    async fn swap_role_status(
        &self,
        id: RequestId,
        expected: RoleRequestStatus,
        decision: RoleDecision,
    ) -> Result<Option<RoleRequest>, StoreError>;

    async fn insert_transfer_request(
        &self,
        request: &DataTransferRequest,
    ) -> Result<(), StoreError>;

    async fn transfer_request(
        &self,
        id: RequestId,
    ) -> Result<Option<DataTransferRequest>, StoreError>;

    /// Transfers touching a school, either as origin or destination.
    async fn transfers_for_school(
        &self,
        school_id: SchoolId,
    ) -> Result<Vec<DataTransferRequest>, StoreError>;

    /// Same compare-and-swap discipline as [`Self::swap_role_status`].
    async fn swap_transfer_status(
        &self,
        id: RequestId,
        expected: TransferStatus,
        update: TransferUpdate,
    ) -> Result<Option<DataTransferRequest>, StoreError>;
}

/// Persistence contract for notifications. Mutations are recipient-scoped:
/// a non-owner call affects zero rows and is not an error.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn insert(&self, notification: &Notification) -> Result<(), StoreError>;

    async fn notifications_for(&self, recipient: ActorId) -> Result<Vec<Notification>, StoreError>;

    /// Returns the number of rows affected.
    async fn mark_read(&self, id: NotificationId, recipient: ActorId) -> Result<u64, StoreError>;

    async fn mark_all_read(&self, recipient: ActorId) -> Result<u64, StoreError>;

    async fn delete(&self, id: NotificationId, recipient: ActorId) -> Result<u64, StoreError>;
}

/// Append-only transition history. No update or delete exists in the public
/// contract.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait AuditLog: Send + Sync {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError>;

    /// Entries for one request, ordered by recording time.
    async fn entries_for(&self, request_id: RequestId) -> Result<Vec<AuditEntry>, StoreError>;
}

/// School reference lookups, used to validate submissions against existing
/// schools.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait SchoolDirectory: Send + Sync {
    async fn school_exists(&self, id: SchoolId) -> Result<bool, StoreError>;
}
