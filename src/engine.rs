// Workflow engine: validates submissions, checks reviewer authority and
// graph legality, commits transitions through the store's compare-and-swap,
// then fans out to the audit log and the notification dispatcher.
//
// Audit and notification writes sit outside the atomic section. Once the
// conditional write commits, the transition stands; side-channel failures
// are logged and swallowed.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::Instrument;

use crate::actor::{Actor, ActorId, SchoolId};
use crate::audit::AuditEntry;
use crate::consent::ConsentGate;
use crate::notify::NotificationDispatcher;
use crate::requests::graph;
use crate::telemetry;
use crate::requests::types::{
    DataTransferRequest, RequestId, RequestKind, RequestedRole, RoleRequest, RoleRequestStatus,
    RoleRequestSubmission, StatusChange, TransferStatus, TransferSubmission, WorkflowAction,
};
use crate::store::{
    AuditLog, RequestStore, RoleDecision, SchoolDirectory, StoreError, TransferUpdate,
};

#[derive(Debug, Error)]
pub enum WorkflowError {
    /// Malformed submission; field-level, never persisted.
    #[error("validation failed on {field}: {reason}")]
    Validation {
        field: &'static str,
        reason: String,
    },
    #[error("request not found")]
    NotFound,
    /// The actor lacks authority for the action; no mutation occurred.
    #[error("forbidden: {reason}")]
    Forbidden { reason: String },
    /// The action is not a legal edge from the record's current state, or a
    /// concurrent decision won the compare-and-swap. Re-fetch before
    /// retrying.
    #[error("illegal transition: {action} from {from}")]
    IllegalTransition {
        from: &'static str,
        action: &'static str,
    },
    /// Approval attempted on a transfer whose consent gate is unmet.
    #[error("parent consent required before approval")]
    ConsentRequired,
    #[error("storage failure")]
    Storage(#[from] StoreError),
}

/// Result of a committed transition.
#[derive(Debug, Clone, Copy)]
pub struct TransitionOutcome {
    pub request_id: RequestId,
    pub kind: RequestKind,
    pub from: &'static str,
    pub to: &'static str,
}

pub struct WorkflowEngine {
    store: Arc<dyn RequestStore>,
    audit: Arc<dyn AuditLog>,
    dispatcher: NotificationDispatcher,
    schools: Arc<dyn SchoolDirectory>,
    gate: ConsentGate,
}

impl WorkflowEngine {
    pub fn new(
        store: Arc<dyn RequestStore>,
        audit: Arc<dyn AuditLog>,
        dispatcher: NotificationDispatcher,
        schools: Arc<dyn SchoolDirectory>,
        gate: ConsentGate,
    ) -> Self {
        Self {
            store,
            audit,
            dispatcher,
            schools,
            gate,
        }
    }

    /// Creates a role elevation request in `pending`. Validation failures
    /// touch neither the audit log nor the dispatcher.
    pub async fn submit_role_request(
        &self,
        submission: RoleRequestSubmission,
        actor: &Actor,
    ) -> Result<RequestId, WorkflowError> {
        let span = telemetry::create_workflow_span(
            "submit_role_request",
            None,
            Some(&telemetry::generate_correlation_id()),
        );
        self.create_role_request(submission, actor)
            .instrument(span)
            .await
    }

    async fn create_role_request(
        &self,
        submission: RoleRequestSubmission,
        actor: &Actor,
    ) -> Result<RequestId, WorkflowError> {
        let reason = submission.reason.trim();
        if reason.is_empty() {
            return Err(WorkflowError::Validation {
                field: "reason",
                reason: "reason must not be empty".to_string(),
            });
        }

        match submission.requested_role {
            RequestedRole::SchoolAdmin => {
                let Some(school_id) = submission.school_id else {
                    return Err(WorkflowError::Validation {
                        field: "school_id",
                        reason: "school_admin requests must name a school".to_string(),
                    });
                };
                if !self.schools.school_exists(school_id).await? {
                    return Err(WorkflowError::Validation {
                        field: "school_id",
                        reason: format!("unknown school {school_id}"),
                    });
                }
            }
            RequestedRole::DistrictAdmin => {
                if submission.school_id.is_some() {
                    return Err(WorkflowError::Validation {
                        field: "school_id",
                        reason: "district_admin requests are not school-scoped".to_string(),
                    });
                }
            }
        }

        let request = RoleRequest {
            id: RequestId::new(),
            actor_id: actor.id,
            current_role: actor.role,
            requested_role: submission.requested_role,
            school_id: submission.school_id,
            reason: reason.to_string(),
            status: RoleRequestStatus::Pending,
            created_at: Utc::now(),
            decided_at: None,
            decided_by: None,
            decision_note: None,
        };
        self.store.insert_role_request(&request).await?;

        tracing::info!(
            request_id = %request.id,
            actor_id = %actor.id,
            requested_role = submission.requested_role.as_str(),
            "role request submitted"
        );
        Ok(request.id)
    }

    /// Creates a data transfer request in `pending`.
    pub async fn submit_transfer_request(
        &self,
        submission: TransferSubmission,
        actor: &Actor,
    ) -> Result<RequestId, WorkflowError> {
        let span = telemetry::create_workflow_span(
            "submit_transfer_request",
            None,
            Some(&telemetry::generate_correlation_id()),
        );
        self.create_transfer_request(submission, actor)
            .instrument(span)
            .await
    }

    async fn create_transfer_request(
        &self,
        submission: TransferSubmission,
        actor: &Actor,
    ) -> Result<RequestId, WorkflowError> {
        if submission.from_school_id == submission.to_school_id {
            return Err(WorkflowError::Validation {
                field: "to_school_id",
                reason: "destination school must differ from origin".to_string(),
            });
        }
        if submission.data_types.is_empty() {
            return Err(WorkflowError::Validation {
                field: "data_types",
                reason: "at least one data category is required".to_string(),
            });
        }
        for (field, school_id) in [
            ("from_school_id", submission.from_school_id),
            ("to_school_id", submission.to_school_id),
        ] {
            if !self.schools.school_exists(school_id).await? {
                return Err(WorkflowError::Validation {
                    field,
                    reason: format!("unknown school {school_id}"),
                });
            }
        }

        let notes = submission
            .notes
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        let request = DataTransferRequest {
            id: RequestId::new(),
            student_id: submission.student_id,
            from_school_id: submission.from_school_id,
            to_school_id: submission.to_school_id,
            data_types: submission.data_types,
            status: TransferStatus::Pending,
            requested_by: actor.id,
            requested_at: Utc::now(),
            parent_consent_at: None,
            completed_at: None,
            notes,
            decision_note: None,
        };
        self.store.insert_transfer_request(&request).await?;

        tracing::info!(
            request_id = %request.id,
            student_id = %request.student_id,
            from_school = %request.from_school_id,
            to_school = %request.to_school_id,
            consent_gated = self.gate.requires_consent(&request),
            "transfer request submitted"
        );
        Ok(request.id)
    }

    /// Applies a named action to a request. The store's conditional write is
    /// the only serialization point: when two reviewers race, exactly one
    /// commits and the other sees `IllegalTransition`.
    pub async fn transition(
        &self,
        request_id: RequestId,
        action: WorkflowAction,
        actor: &Actor,
        note: Option<&str>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        let span = telemetry::create_workflow_span(
            "transition",
            Some(&request_id.to_string()),
            Some(&telemetry::generate_correlation_id()),
        );
        async {
            if let Some(request) = self.store.role_request(request_id).await? {
                return self.transition_role(request, action, actor, note).await;
            }
            if let Some(request) = self.store.transfer_request(request_id).await? {
                return self.transition_transfer(request, action, actor, note).await;
            }
            Err(WorkflowError::NotFound)
        }
        .instrument(span)
        .await
    }

    async fn transition_role(
        &self,
        request: RoleRequest,
        action: WorkflowAction,
        actor: &Actor,
        note: Option<&str>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        if !actor.may_decide_role_request(&request) {
            return Err(WorkflowError::Forbidden {
                reason: format!("{} may not decide this role request", actor.role.as_str()),
            });
        }

        let from = request.status;
        let to = graph::role_next(from, &action).ok_or(WorkflowError::IllegalTransition {
            from: from.as_str(),
            action: action.name(),
        })?;

        let decision = RoleDecision {
            status: to,
            decided_at: Utc::now(),
            decided_by: actor.id,
            note: note.map(str::to_string),
        };
        let updated = self
            .store
            .swap_role_status(request.id, from, decision)
            .await?
            .ok_or(WorkflowError::IllegalTransition {
                from: from.as_str(),
                action: action.name(),
            })?;

        let change = StatusChange::Role { from, to };
        self.finish_transition(&change, request.id, actor.id, updated.actor_id, note)
            .await;

        Ok(TransitionOutcome {
            request_id: request.id,
            kind: RequestKind::Role,
            from: from.as_str(),
            to: to.as_str(),
        })
    }

    async fn transition_transfer(
        &self,
        request: DataTransferRequest,
        action: WorkflowAction,
        actor: &Actor,
        note: Option<&str>,
    ) -> Result<TransitionOutcome, WorkflowError> {
        if !actor.may_decide_transfer() {
            return Err(WorkflowError::Forbidden {
                reason: format!("{} may not decide transfer requests", actor.role.as_str()),
            });
        }

        let from = request.status;
        let to = graph::transfer_next(from, &action).ok_or(WorkflowError::IllegalTransition {
            from: from.as_str(),
            action: action.name(),
        })?;

        // The consent gate sits between graph legality and the commit:
        // approval may not bypass an unmet gate, and consent evidence must
        // verify before it is recorded.
        let mut consent_at = None;
        match &action {
            WorkflowAction::Approve => {
                if self.gate.requires_consent(&request) && !request.has_consent() {
                    return Err(WorkflowError::ConsentRequired);
                }
            }
            WorkflowAction::ConsentReceived(evidence) => {
                if !self.gate.verify(&request, evidence) {
                    return Err(WorkflowError::ConsentRequired);
                }
                consent_at = Some(Utc::now());
            }
            _ => {}
        }

        let update = TransferUpdate {
            status: to,
            parent_consent_at: consent_at,
            completed_at: (to == TransferStatus::Completed).then(Utc::now),
            note: note.map(str::to_string),
        };
        let updated = self
            .store
            .swap_transfer_status(request.id, from, update)
            .await?
            .ok_or(WorkflowError::IllegalTransition {
                from: from.as_str(),
                action: action.name(),
            })?;

        let change = StatusChange::Transfer { from, to };
        self.finish_transition(&change, request.id, actor.id, updated.requested_by, note)
            .await;

        Ok(TransitionOutcome {
            request_id: request.id,
            kind: RequestKind::Transfer,
            from: from.as_str(),
            to: to.as_str(),
        })
    }

    /// Post-commit side channels. Best effort by contract: the transition
    /// has already committed, so failures here are logged, never surfaced.
    async fn finish_transition(
        &self,
        change: &StatusChange,
        request_id: RequestId,
        reviewer: ActorId,
        submitter: ActorId,
        note: Option<&str>,
    ) {
        tracing::info!(
            request_id = %request_id,
            kind = change.kind().as_str(),
            from = change.from_str_label(),
            to = change.to_str_label(),
            reviewer = %reviewer,
            "transition committed"
        );

        let entry = AuditEntry::record(change, request_id, reviewer, note.map(str::to_string));
        if let Err(error) = self.audit.append(&entry).await {
            tracing::error!(
                request_id = %request_id,
                %error,
                "audit append failed for committed transition"
            );
        }

        self.dispatcher
            .on_transition(change, request_id, submitter)
            .await;
    }

    pub async fn role_request(&self, id: RequestId) -> Result<Option<RoleRequest>, WorkflowError> {
        Ok(self.store.role_request(id).await?)
    }

    pub async fn transfer_request(
        &self,
        id: RequestId,
    ) -> Result<Option<DataTransferRequest>, WorkflowError> {
        Ok(self.store.transfer_request(id).await?)
    }

    pub async fn pending_role_requests(&self) -> Result<Vec<RoleRequest>, WorkflowError> {
        Ok(self.store.pending_role_requests().await?)
    }

    pub async fn transfers_for_school(
        &self,
        school_id: SchoolId,
    ) -> Result<Vec<DataTransferRequest>, WorkflowError> {
        Ok(self.store.transfers_for_school(school_id).await?)
    }

    /// Full transition history of a request, oldest first.
    pub async fn history(&self, id: RequestId) -> Result<Vec<AuditEntry>, WorkflowError> {
        Ok(self.audit.entries_for(id).await?)
    }

    pub fn dispatcher(&self) -> &NotificationDispatcher {
        &self.dispatcher
    }

    pub fn consent_gate(&self) -> &ConsentGate {
        &self.gate
    }
}
