// The legal-transition tables for both request kinds.
//
// These two functions are the single source of truth for which action moves
// which state where; the engine never re-derives legality anywhere else.
// Returning `None` means the edge does not exist and the caller reports an
// illegal transition.

use crate::requests::types::{RoleRequestStatus, TransferStatus, WorkflowAction};

/// Role requests: `pending` is decided once, then the record is final.
///
/// ```text
/// pending --approve--> approved
/// pending --reject---> rejected
/// ```
pub fn role_next(current: RoleRequestStatus, action: &WorkflowAction) -> Option<RoleRequestStatus> {
    match (current, action) {
        (RoleRequestStatus::Pending, WorkflowAction::Approve) => Some(RoleRequestStatus::Approved),
        (RoleRequestStatus::Pending, WorkflowAction::Reject) => Some(RoleRequestStatus::Rejected),
        _ => None,
    }
}

/// Transfer requests: consent may be demanded before approval, and an
/// approved transfer is executed in two steps. Rejection is possible from
/// every non-terminal state.
///
/// ```text
/// pending                 --approve-->          approved
/// pending                 --require_consent-->  parent_consent_required
/// parent_consent_required --consent_received--> approved
/// approved                --start-->            in_progress
/// in_progress             --finish-->           completed
/// {pending, parent_consent_required, approved, in_progress} --reject--> rejected
/// ```
pub fn transfer_next(current: TransferStatus, action: &WorkflowAction) -> Option<TransferStatus> {
    match (current, action) {
        (TransferStatus::Pending, WorkflowAction::Approve) => Some(TransferStatus::Approved),
        (TransferStatus::Pending, WorkflowAction::RequireConsent) => {
            Some(TransferStatus::ParentConsentRequired)
        }
        (TransferStatus::ParentConsentRequired, WorkflowAction::ConsentReceived(_)) => {
            Some(TransferStatus::Approved)
        }
        (TransferStatus::Approved, WorkflowAction::Start) => Some(TransferStatus::InProgress),
        (TransferStatus::InProgress, WorkflowAction::Finish) => Some(TransferStatus::Completed),
        (
            TransferStatus::Pending
            | TransferStatus::ParentConsentRequired
            | TransferStatus::Approved
            | TransferStatus::InProgress,
            WorkflowAction::Reject,
        ) => Some(TransferStatus::Rejected),
        _ => None,
    }
}
