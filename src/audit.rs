// Append-only transition history. The current status of any record is always
// reconstructible as the to-state of its last entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::actor::ActorId;
use crate::requests::types::{RequestId, RequestKind, StatusChange};

/// Immutable record of one transition: who moved what, from where to where,
/// and when. State labels are stored as their wire strings so a single log
/// covers both request kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub request_id: RequestId,
    pub kind: RequestKind,
    pub from_state: String,
    pub to_state: String,
    pub actor_id: ActorId,
    pub recorded_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl AuditEntry {
    pub fn record(
        change: &StatusChange,
        request_id: RequestId,
        actor_id: ActorId,
        note: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            request_id,
            kind: change.kind(),
            from_state: change.from_str_label().to_string(),
            to_state: change.to_str_label().to_string(),
            actor_id,
            recorded_at: Utc::now(),
            note,
        }
    }
}

/// Reconstructs the current status label from a request's ordered history.
/// `None` for an empty history (a record still in its initial state has no
/// transitions yet).
pub fn replay_status(entries: &[AuditEntry]) -> Option<&str> {
    entries.last().map(|entry| entry.to_state.as_str())
}
