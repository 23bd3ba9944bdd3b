// In-memory storage adapter. The reference implementation of the storage
// contracts: every table lives behind one mutex, so each compare-and-swap is
// a single critical section and the status check and write cannot interleave
// with another writer.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::actor::{ActorId, SchoolId};
use crate::audit::AuditEntry;
use crate::notify::Notification;
use crate::requests::types::{
    DataTransferRequest, NotificationId, RequestId, RoleRequest, RoleRequestStatus, TransferStatus,
};
use crate::store::{
    AuditLog, NotificationStore, RequestStore, RoleDecision, SchoolDirectory, StoreError,
    TransferUpdate,
};

#[derive(Default)]
struct Tables {
    role_requests: HashMap<RequestId, RoleRequest>,
    transfer_requests: HashMap<RequestId, DataTransferRequest>,
    notifications: Vec<Notification>,
    audit_entries: Vec<AuditEntry>,
    schools: HashSet<SchoolId>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a school so submissions referencing it validate.
    pub fn add_school(&self, id: SchoolId) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.schools.insert(id);
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Tables>, StoreError> {
        self.tables
            .lock()
            .map_err(|_| StoreError::Unavailable("poisoned store lock".to_string()))
    }
}

#[async_trait]
impl RequestStore for MemoryStore {
    async fn insert_role_request(&self, request: &RoleRequest) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.role_requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn role_request(&self, id: RequestId) -> Result<Option<RoleRequest>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.role_requests.get(&id).cloned())
    }

    async fn pending_role_requests(&self) -> Result<Vec<RoleRequest>, StoreError> {
        let tables = self.lock()?;
        let mut pending: Vec<RoleRequest> = tables
            .role_requests
            .values()
            .filter(|r| r.status == RoleRequestStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|r| r.created_at);
        Ok(pending)
    }

    async fn swap_role_status(
        &self,
        id: RequestId,
        expected: RoleRequestStatus,
        decision: RoleDecision,
    ) -> Result<Option<RoleRequest>, StoreError> {
        let mut tables = self.lock()?;
        let Some(request) = tables.role_requests.get_mut(&id) else {
            return Ok(None);
        };
        if request.status != expected {
            return Ok(None);
        }
        request.status = decision.status;
        request.decided_at = Some(decision.decided_at);
        request.decided_by = Some(decision.decided_by);
        if decision.note.is_some() {
            request.decision_note = decision.note;
        }
        Ok(Some(request.clone()))
    }

    async fn insert_transfer_request(
        &self,
        request: &DataTransferRequest,
    ) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.transfer_requests.insert(request.id, request.clone());
        Ok(())
    }

    async fn transfer_request(
        &self,
        id: RequestId,
    ) -> Result<Option<DataTransferRequest>, StoreError> {
        let tables = self.lock()?;
        Ok(tables.transfer_requests.get(&id).cloned())
    }

    async fn transfers_for_school(
        &self,
        school_id: SchoolId,
    ) -> Result<Vec<DataTransferRequest>, StoreError> {
        let tables = self.lock()?;
        let mut transfers: Vec<DataTransferRequest> = tables
            .transfer_requests
            .values()
            .filter(|t| t.from_school_id == school_id || t.to_school_id == school_id)
            .cloned()
            .collect();
        transfers.sort_by_key(|t| t.requested_at);
        Ok(transfers)
    }

    async fn swap_transfer_status(
        &self,
        id: RequestId,
        expected: TransferStatus,
        update: TransferUpdate,
    ) -> Result<Option<DataTransferRequest>, StoreError> {
        let mut tables = self.lock()?;
        let Some(request) = tables.transfer_requests.get_mut(&id) else {
            return Ok(None);
        };
        if request.status != expected {
            return Ok(None);
        }
        request.status = update.status;
        if update.parent_consent_at.is_some() {
            request.parent_consent_at = update.parent_consent_at;
        }
        if update.completed_at.is_some() {
            request.completed_at = update.completed_at;
        }
        if update.note.is_some() {
            request.decision_note = update.note;
        }
        Ok(Some(request.clone()))
    }
}

#[async_trait]
impl NotificationStore for MemoryStore {
    async fn insert(&self, notification: &Notification) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.notifications.push(notification.clone());
        Ok(())
    }

    async fn notifications_for(&self, recipient: ActorId) -> Result<Vec<Notification>, StoreError> {
        let tables = self.lock()?;
        Ok(tables
            .notifications
            .iter()
            .filter(|n| n.recipient == recipient)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, id: NotificationId, recipient: ActorId) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        let mut affected = 0;
        for notification in tables
            .notifications
            .iter_mut()
            .filter(|n| n.id == id && n.recipient == recipient)
        {
            notification.is_read = true;
            notification.updated_at = chrono::Utc::now();
            affected += 1;
        }
        Ok(affected)
    }

    async fn mark_all_read(&self, recipient: ActorId) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        let mut affected = 0;
        for notification in tables
            .notifications
            .iter_mut()
            .filter(|n| n.recipient == recipient && !n.is_read)
        {
            notification.is_read = true;
            notification.updated_at = chrono::Utc::now();
            affected += 1;
        }
        Ok(affected)
    }

    async fn delete(&self, id: NotificationId, recipient: ActorId) -> Result<u64, StoreError> {
        let mut tables = self.lock()?;
        let before = tables.notifications.len();
        tables
            .notifications
            .retain(|n| !(n.id == id && n.recipient == recipient));
        Ok((before - tables.notifications.len()) as u64)
    }
}

#[async_trait]
impl AuditLog for MemoryStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let mut tables = self.lock()?;
        tables.audit_entries.push(entry.clone());
        Ok(())
    }

    async fn entries_for(&self, request_id: RequestId) -> Result<Vec<AuditEntry>, StoreError> {
        let tables = self.lock()?;
        let mut entries: Vec<AuditEntry> = tables
            .audit_entries
            .iter()
            .filter(|e| e.request_id == request_id)
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.recorded_at);
        Ok(entries)
    }
}

#[async_trait]
impl SchoolDirectory for MemoryStore {
    async fn school_exists(&self, id: SchoolId) -> Result<bool, StoreError> {
        let tables = self.lock()?;
        Ok(tables.schools.contains(&id))
    }
}
