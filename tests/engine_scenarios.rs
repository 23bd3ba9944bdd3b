// End-to-end lifecycle tests over the in-memory store: submissions,
// reviewer decisions, the consent detour, and the post-commit side channels.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use schoolops_requests::{
    replay_status, Actor, ActorId, ConsentEvidence, ConsentGate, DataType, MemoryStore,
    Notification, NotificationDispatcher, NotificationId, NotificationStore, RequestedRole, Role,
    RoleRequestStatus, RoleRequestSubmission, SchoolId, StoreError, TransferStatus,
    TransferSubmission, WorkflowAction, WorkflowEngine, WorkflowError,
};

struct Fixture {
    engine: WorkflowEngine,
    store: Arc<MemoryStore>,
    school_a: SchoolId,
    school_b: SchoolId,
}

fn fixture() -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let school_a = SchoolId::new();
    let school_b = SchoolId::new();
    store.add_school(school_a).unwrap();
    store.add_school(school_b).unwrap();
    let engine = WorkflowEngine::new(
        store.clone(),
        store.clone(),
        NotificationDispatcher::new(store.clone()),
        store.clone(),
        ConsentGate::baseline(),
    );
    Fixture {
        engine,
        store,
        school_a,
        school_b,
    }
}

fn district_admin() -> Actor {
    Actor::new(ActorId::new(), Role::DistrictAdmin, None)
}

fn grade_teacher(school: SchoolId) -> Actor {
    Actor::new(ActorId::new(), Role::GradeTeacher, Some(school))
}

async fn submit_role_request(fx: &Fixture, actor: &Actor) -> schoolops_requests::RequestId {
    fx.engine
        .submit_role_request(
            RoleRequestSubmission {
                requested_role: RequestedRole::SchoolAdmin,
                school_id: Some(fx.school_a),
                reason: "학년 관리 업무 인수".to_string(),
            },
            actor,
        )
        .await
        .unwrap()
}

async fn submit_transfer(
    fx: &Fixture,
    actor: &Actor,
    data_types: BTreeSet<DataType>,
) -> schoolops_requests::RequestId {
    fx.engine
        .submit_transfer_request(
            TransferSubmission {
                student_id: schoolops_requests::StudentId::new(),
                from_school_id: fx.school_a,
                to_school_id: fx.school_b,
                data_types,
                notes: Some("전학 예정".to_string()),
            },
            actor,
        )
        .await
        .unwrap()
}

#[tokio::test]
async fn approved_role_request_records_decision_and_notifies_submitter() {
    let fx = fixture();
    let submitter = grade_teacher(fx.school_a);
    let reviewer = district_admin();
    let id = submit_role_request(&fx, &submitter).await;

    let outcome = fx
        .engine
        .transition(id, WorkflowAction::Approve, &reviewer, Some("승인합니다"))
        .await
        .unwrap();
    assert_eq!(outcome.from, "pending");
    assert_eq!(outcome.to, "approved");

    let stored = fx.engine.role_request(id).await.unwrap().unwrap();
    assert_eq!(stored.status, RoleRequestStatus::Approved);
    assert_eq!(stored.decided_by, Some(reviewer.id));
    assert!(stored.decided_at.is_some());
    assert_eq!(stored.decision_note.as_deref(), Some("승인합니다"));

    let inbox = fx
        .engine
        .dispatcher()
        .notifications_for(submitter.id)
        .await
        .unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].category, "계정");

    let history = fx.engine.history(id).await.unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].actor_id, reviewer.id);
    assert_eq!(replay_status(&history), Some("approved"));
}

#[tokio::test]
async fn decided_request_leaves_pending_listing() {
    let fx = fixture();
    let submitter = grade_teacher(fx.school_a);
    let reviewer = district_admin();
    let decided = submit_role_request(&fx, &submitter).await;
    let open = submit_role_request(&fx, &submitter).await;

    fx.engine
        .transition(decided, WorkflowAction::Reject, &reviewer, Some("사유 불충분"))
        .await
        .unwrap();

    let pending = fx.engine.pending_role_requests().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, open);
}

#[tokio::test]
async fn sensitive_transfer_walks_the_consent_detour() {
    let fx = fixture();
    let submitter = grade_teacher(fx.school_a);
    let reviewer = district_admin();
    let id = submit_transfer(
        &fx,
        &submitter,
        BTreeSet::from([DataType::AcademicRecords, DataType::FriendshipData]),
    )
    .await;

    // Approval may not bypass the unmet gate.
    let blocked = fx
        .engine
        .transition(id, WorkflowAction::Approve, &reviewer, None)
        .await;
    assert!(matches!(blocked, Err(WorkflowError::ConsentRequired)));
    let stored = fx.engine.transfer_request(id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransferStatus::Pending);

    fx.engine
        .transition(id, WorkflowAction::RequireConsent, &reviewer, None)
        .await
        .unwrap();

    let stored = fx.engine.transfer_request(id).await.unwrap().unwrap();
    let evidence = ConsentEvidence::granted(stored.student_id, "김보호");
    let outcome = fx
        .engine
        .transition(id, WorkflowAction::ConsentReceived(evidence), &reviewer, None)
        .await
        .unwrap();
    assert_eq!(outcome.to, "approved");

    let stored = fx.engine.transfer_request(id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransferStatus::Approved);
    assert!(stored.parent_consent_at.is_some());
    assert!(stored.completed_at.is_none());

    fx.engine
        .transition(id, WorkflowAction::Start, &reviewer, None)
        .await
        .unwrap();
    fx.engine
        .transition(id, WorkflowAction::Finish, &reviewer, None)
        .await
        .unwrap();

    let stored = fx.engine.transfer_request(id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransferStatus::Completed);
    assert!(stored.completed_at.is_some());

    let history = fx.engine.history(id).await.unwrap();
    assert_eq!(history.len(), 4);
    assert_eq!(replay_status(&history), Some(stored.status.as_str()));
}

#[tokio::test]
async fn non_sensitive_transfer_approves_without_consent() {
    let fx = fixture();
    let submitter = grade_teacher(fx.school_a);
    let reviewer = district_admin();
    let id = submit_transfer(&fx, &submitter, BTreeSet::from([DataType::AcademicRecords])).await;

    let outcome = fx
        .engine
        .transition(id, WorkflowAction::Approve, &reviewer, None)
        .await
        .unwrap();
    assert_eq!(outcome.to, "approved");

    let stored = fx.engine.transfer_request(id).await.unwrap().unwrap();
    assert!(stored.parent_consent_at.is_none());
}

#[tokio::test]
async fn reviewer_note_does_not_overwrite_submitter_notes() {
    let fx = fixture();
    let submitter = grade_teacher(fx.school_a);
    let reviewer = district_admin();
    let id = submit_transfer(&fx, &submitter, BTreeSet::from([DataType::AcademicRecords])).await;

    fx.engine
        .transition(id, WorkflowAction::Approve, &reviewer, Some("승인 근거 확인"))
        .await
        .unwrap();

    let stored = fx.engine.transfer_request(id).await.unwrap().unwrap();
    assert_eq!(stored.notes.as_deref(), Some("전학 예정"));
    assert_eq!(stored.decision_note.as_deref(), Some("승인 근거 확인"));
}

#[tokio::test]
async fn invalid_consent_evidence_is_rejected_and_state_holds() {
    let fx = fixture();
    let submitter = grade_teacher(fx.school_a);
    let reviewer = district_admin();
    let id = submit_transfer(&fx, &submitter, BTreeSet::from([DataType::BehavioralRecords])).await;

    fx.engine
        .transition(id, WorkflowAction::RequireConsent, &reviewer, None)
        .await
        .unwrap();

    // Evidence for a different student fails closed.
    let wrong_student = ConsentEvidence::granted(schoolops_requests::StudentId::new(), "김보호");
    let result = fx
        .engine
        .transition(
            id,
            WorkflowAction::ConsentReceived(wrong_student),
            &reviewer,
            None,
        )
        .await;
    assert!(matches!(result, Err(WorkflowError::ConsentRequired)));

    let stored = fx.engine.transfer_request(id).await.unwrap().unwrap();
    assert_eq!(stored.status, TransferStatus::ParentConsentRequired);
    assert!(stored.parent_consent_at.is_none());
}

#[tokio::test]
async fn reviewer_authority_is_enforced_before_any_mutation() {
    let fx = fixture();
    let submitter = grade_teacher(fx.school_a);
    let id = submit_role_request(&fx, &submitter).await;
    let transfer_id =
        submit_transfer(&fx, &submitter, BTreeSet::from([DataType::AcademicRecords])).await;

    let other_school_admin = Actor::new(ActorId::new(), Role::SchoolAdmin, Some(fx.school_b));
    let result = fx
        .engine
        .transition(id, WorkflowAction::Approve, &other_school_admin, None)
        .await;
    assert!(matches!(result, Err(WorkflowError::Forbidden { .. })));

    let home_school_admin = Actor::new(ActorId::new(), Role::SchoolAdmin, Some(fx.school_a));
    let result = fx
        .engine
        .transition(transfer_id, WorkflowAction::Approve, &home_school_admin, None)
        .await;
    assert!(matches!(result, Err(WorkflowError::Forbidden { .. })));

    let teacher = grade_teacher(fx.school_a);
    let result = fx
        .engine
        .transition(id, WorkflowAction::Approve, &teacher, None)
        .await;
    assert!(matches!(result, Err(WorkflowError::Forbidden { .. })));

    // No mutation happened anywhere.
    let stored = fx.engine.role_request(id).await.unwrap().unwrap();
    assert_eq!(stored.status, RoleRequestStatus::Pending);
    assert!(fx.engine.history(id).await.unwrap().is_empty());
    assert!(fx.engine.history(transfer_id).await.unwrap().is_empty());
}

#[tokio::test]
async fn own_school_admin_decides_scoped_role_request() {
    let fx = fixture();
    let submitter = grade_teacher(fx.school_a);
    let id = submit_role_request(&fx, &submitter).await;

    let reviewer = Actor::new(ActorId::new(), Role::SchoolAdmin, Some(fx.school_a));
    let outcome = fx
        .engine
        .transition(id, WorkflowAction::Approve, &reviewer, None)
        .await
        .unwrap();
    assert_eq!(outcome.to, "approved");
}

#[tokio::test]
async fn terminal_states_admit_no_further_actions() {
    let fx = fixture();
    let submitter = grade_teacher(fx.school_a);
    let reviewer = district_admin();
    let id = submit_role_request(&fx, &submitter).await;

    fx.engine
        .transition(id, WorkflowAction::Reject, &reviewer, None)
        .await
        .unwrap();

    for action in [WorkflowAction::Approve, WorkflowAction::Reject] {
        let result = fx.engine.transition(id, action, &reviewer, None).await;
        assert!(matches!(
            result,
            Err(WorkflowError::IllegalTransition { from: "rejected", .. })
        ));
    }
    assert_eq!(fx.engine.history(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn transfers_for_school_sees_both_sides() {
    let fx = fixture();
    let submitter = grade_teacher(fx.school_a);
    let id = submit_transfer(&fx, &submitter, BTreeSet::from([DataType::TeacherMemos])).await;

    for school in [fx.school_a, fx.school_b] {
        let listed = fx.engine.transfers_for_school(school).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, id);
    }
    assert!(fx
        .engine
        .transfers_for_school(SchoolId::new())
        .await
        .unwrap()
        .is_empty());
}

/// Notification store that always fails, for exercising the best-effort
/// contract of the dispatch side channel.
struct FailingNotificationStore {
    attempts: AtomicU64,
}

#[async_trait]
impl NotificationStore for FailingNotificationStore {
    async fn insert(&self, _notification: &Notification) -> Result<(), StoreError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(StoreError::Unavailable("notifications offline".to_string()))
    }

    async fn notifications_for(&self, _recipient: ActorId) -> Result<Vec<Notification>, StoreError> {
        Ok(Vec::new())
    }

    async fn mark_read(&self, _id: NotificationId, _recipient: ActorId) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn mark_all_read(&self, _recipient: ActorId) -> Result<u64, StoreError> {
        Ok(0)
    }

    async fn delete(&self, _id: NotificationId, _recipient: ActorId) -> Result<u64, StoreError> {
        Ok(0)
    }
}

#[tokio::test]
async fn notification_failure_does_not_unwind_the_transition() {
    let store = Arc::new(MemoryStore::new());
    let school = SchoolId::new();
    store.add_school(school).unwrap();
    let failing = Arc::new(FailingNotificationStore {
        attempts: AtomicU64::new(0),
    });
    let engine = WorkflowEngine::new(
        store.clone(),
        store.clone(),
        NotificationDispatcher::new(failing.clone()),
        store.clone(),
        ConsentGate::baseline(),
    );

    let submitter = grade_teacher(school);
    let reviewer = district_admin();
    let id = engine
        .submit_role_request(
            RoleRequestSubmission {
                requested_role: RequestedRole::SchoolAdmin,
                school_id: Some(school),
                reason: "업무 인수".to_string(),
            },
            &submitter,
        )
        .await
        .unwrap();

    let outcome = engine
        .transition(id, WorkflowAction::Approve, &reviewer, None)
        .await
        .unwrap();
    assert_eq!(outcome.to, "approved");

    // The commit and its audit entry stand despite the failed dispatch.
    let stored = engine.role_request(id).await.unwrap().unwrap();
    assert_eq!(stored.status, RoleRequestStatus::Approved);
    assert_eq!(engine.history(id).await.unwrap().len(), 1);
    assert_eq!(failing.attempts.load(Ordering::SeqCst), 1);
}
