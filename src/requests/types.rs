// Core record types for the request lifecycle: role elevation requests and
// cross-school student data transfer requests.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actor::{ActorId, Role, SchoolId};
use crate::consent::ConsentEvidence;

// Paths are fully qualified so the macro expands in modules that do not
// import uuid or fmt themselves.
macro_rules! id_newtype {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug,
            Clone,
            Copy,
            PartialEq,
            Eq,
            Hash,
            PartialOrd,
            Ord,
            ::serde::Serialize,
            ::serde::Deserialize,
        )]
        pub struct $name(pub ::uuid::Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(::uuid::Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_newtype!(
    /// Identifier shared by both request kinds; unique across the subsystem.
    RequestId
);
id_newtype!(StudentId);
id_newtype!(NotificationId);

pub(crate) use id_newtype;

/// The two request kinds this subsystem supports. Fixed; not extensible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestKind {
    Role,
    Transfer,
}

impl RequestKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestKind::Role => "role",
            RequestKind::Transfer => "transfer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "role" => Some(RequestKind::Role),
            "transfer" => Some(RequestKind::Transfer),
            _ => None,
        }
    }
}

/// Roles an actor may request elevation to. A strict subset of [`Role`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestedRole {
    SchoolAdmin,
    DistrictAdmin,
}

impl RequestedRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestedRole::SchoolAdmin => "school_admin",
            RequestedRole::DistrictAdmin => "district_admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "school_admin" => Some(RequestedRole::SchoolAdmin),
            "district_admin" => Some(RequestedRole::DistrictAdmin),
            _ => None,
        }
    }
}

/// Status of a role elevation request. Serialized values are the wire strings
/// the storage collaborator sees in the `role_requests.status` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoleRequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RoleRequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleRequestStatus::Pending => "pending",
            RoleRequestStatus::Approved => "approved",
            RoleRequestStatus::Rejected => "rejected",
        }
    }

    /// Parse a persisted status column. Unknown values are a decode error for
    /// the caller, never silently mapped to a default.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(RoleRequestStatus::Pending),
            "approved" => Some(RoleRequestStatus::Approved),
            "rejected" => Some(RoleRequestStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RoleRequestStatus::Approved | RoleRequestStatus::Rejected
        )
    }
}

/// Status of a data transfer request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferStatus {
    Pending,
    ParentConsentRequired,
    Approved,
    InProgress,
    Completed,
    Rejected,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "pending",
            TransferStatus::ParentConsentRequired => "parent_consent_required",
            TransferStatus::Approved => "approved",
            TransferStatus::InProgress => "in_progress",
            TransferStatus::Completed => "completed",
            TransferStatus::Rejected => "rejected",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TransferStatus::Pending),
            "parent_consent_required" => Some(TransferStatus::ParentConsentRequired),
            "approved" => Some(TransferStatus::Approved),
            "in_progress" => Some(TransferStatus::InProgress),
            "completed" => Some(TransferStatus::Completed),
            "rejected" => Some(TransferStatus::Rejected),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferStatus::Completed | TransferStatus::Rejected)
    }
}

/// Fixed vocabulary of student data categories a transfer may cover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    AcademicRecords,
    BehavioralRecords,
    FriendshipData,
    TeacherMemos,
    InterventionLogs,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::AcademicRecords => "academic_records",
            DataType::BehavioralRecords => "behavioral_records",
            DataType::FriendshipData => "friendship_data",
            DataType::TeacherMemos => "teacher_memos",
            DataType::InterventionLogs => "intervention_logs",
        }
    }

    pub const ALL: [DataType; 5] = [
        DataType::AcademicRecords,
        DataType::BehavioralRecords,
        DataType::FriendshipData,
        DataType::TeacherMemos,
        DataType::InterventionLogs,
    ];
}

/// Named actions that move a request along its transition graph. The legal
/// edges per kind and state live in [`crate::requests::graph`].
#[derive(Debug, Clone)]
pub enum WorkflowAction {
    Approve,
    Reject,
    RequireConsent,
    /// Carries the captured consent evidence; validated by the consent gate
    /// before the transition is committed.
    ConsentReceived(ConsentEvidence),
    Start,
    Finish,
}

impl WorkflowAction {
    pub fn name(&self) -> &'static str {
        match self {
            WorkflowAction::Approve => "approve",
            WorkflowAction::Reject => "reject",
            WorkflowAction::RequireConsent => "require_consent",
            WorkflowAction::ConsentReceived(_) => "consent_received",
            WorkflowAction::Start => "start",
            WorkflowAction::Finish => "finish",
        }
    }
}

/// A user asking to be elevated to school or district administrator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRequest {
    pub id: RequestId,
    pub actor_id: ActorId,
    /// Role snapshot taken at submission time; later role changes to the
    /// submitting actor do not rewrite history.
    pub current_role: Role,
    pub requested_role: RequestedRole,
    pub school_id: Option<SchoolId>,
    pub reason: String,
    pub status: RoleRequestStatus,
    pub created_at: DateTime<Utc>,
    pub decided_at: Option<DateTime<Utc>>,
    pub decided_by: Option<ActorId>,
    pub decision_note: Option<String>,
}

/// A request to move a student's records from one school to another.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTransferRequest {
    pub id: RequestId,
    pub student_id: StudentId,
    pub from_school_id: SchoolId,
    pub to_school_id: SchoolId,
    pub data_types: BTreeSet<DataType>,
    pub status: TransferStatus,
    pub requested_by: ActorId,
    pub requested_at: DateTime<Utc>,
    pub parent_consent_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Submitter's justification, captured at submission and never rewritten.
    pub notes: Option<String>,
    /// Reviewer's note from the most recent decision.
    pub decision_note: Option<String>,
}

impl DataTransferRequest {
    pub fn has_consent(&self) -> bool {
        self.parent_consent_at.is_some()
    }
}

/// Payload for submitting a role elevation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleRequestSubmission {
    pub requested_role: RequestedRole,
    pub school_id: Option<SchoolId>,
    pub reason: String,
}

/// Payload for submitting a data transfer request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferSubmission {
    pub student_id: StudentId,
    pub from_school_id: SchoolId,
    pub to_school_id: SchoolId,
    pub data_types: BTreeSet<DataType>,
    pub notes: Option<String>,
}

/// A committed status change, as handed to the audit log and the notification
/// dispatcher. Keeps the per-kind status types rather than collapsing to
/// strings so template lookup stays a closed match.
#[derive(Debug, Clone, Copy)]
pub enum StatusChange {
    Role {
        from: RoleRequestStatus,
        to: RoleRequestStatus,
    },
    Transfer {
        from: TransferStatus,
        to: TransferStatus,
    },
}

impl StatusChange {
    pub fn kind(&self) -> RequestKind {
        match self {
            StatusChange::Role { .. } => RequestKind::Role,
            StatusChange::Transfer { .. } => RequestKind::Transfer,
        }
    }

    pub fn from_str_label(&self) -> &'static str {
        match self {
            StatusChange::Role { from, .. } => from.as_str(),
            StatusChange::Transfer { from, .. } => from.as_str(),
        }
    }

    pub fn to_str_label(&self) -> &'static str {
        match self {
            StatusChange::Role { to, .. } => to.as_str(),
            StatusChange::Transfer { to, .. } => to.as_str(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_wire_strings_round_trip() {
        for status in [
            RoleRequestStatus::Pending,
            RoleRequestStatus::Approved,
            RoleRequestStatus::Rejected,
        ] {
            assert_eq!(RoleRequestStatus::parse(status.as_str()), Some(status));
        }
        for status in [
            TransferStatus::Pending,
            TransferStatus::ParentConsentRequired,
            TransferStatus::Approved,
            TransferStatus::InProgress,
            TransferStatus::Completed,
            TransferStatus::Rejected,
        ] {
            assert_eq!(TransferStatus::parse(status.as_str()), Some(status));
        }
    }

    #[test]
    fn unknown_status_is_not_a_default() {
        assert_eq!(RoleRequestStatus::parse("shipped"), None);
        assert_eq!(TransferStatus::parse(""), None);
    }

    #[test]
    fn serde_uses_snake_case_wire_values() {
        let json = serde_json::to_string(&TransferStatus::ParentConsentRequired).unwrap();
        assert_eq!(json, "\"parent_consent_required\"");
        let json = serde_json::to_string(&DataType::FriendshipData).unwrap();
        assert_eq!(json, "\"friendship_data\"");
    }

    #[test]
    fn terminal_states() {
        assert!(!RoleRequestStatus::Pending.is_terminal());
        assert!(RoleRequestStatus::Approved.is_terminal());
        assert!(RoleRequestStatus::Rejected.is_terminal());
        assert!(TransferStatus::Completed.is_terminal());
        assert!(TransferStatus::Rejected.is_terminal());
        assert!(!TransferStatus::Approved.is_terminal());
    }
}
