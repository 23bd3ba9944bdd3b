// Consent gate: decides when a transfer needs parental consent and validates
// captured consent evidence. Pure policy, no I/O; the engine commits the
// consent timestamp in the same conditional write as the transition.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::requests::types::{DataTransferRequest, DataType, StudentId};

/// A captured parental consent event, as recorded by the consent-capture
/// surface of the surrounding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentEvidence {
    pub consent_id: Uuid,
    pub student_id: StudentId,
    pub parent_name: String,
    pub granted: bool,
    pub granted_at: DateTime<Utc>,
    pub digital_signature: Option<String>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub valid_until: Option<DateTime<Utc>>,
}

impl ConsentEvidence {
    /// A granted, unrevoked, non-expiring consent for the given student.
    pub fn granted(student_id: StudentId, parent_name: &str) -> Self {
        Self {
            consent_id: Uuid::new_v4(),
            student_id,
            parent_name: parent_name.to_string(),
            granted: true,
            granted_at: Utc::now(),
            digital_signature: None,
            revoked_at: None,
            valid_until: None,
        }
    }
}

/// Policy object deciding whether a transfer must pass the consent gate
/// before approval. The sensitive set is configurable; the baseline covers
/// friendship data and behavioral records.
#[derive(Debug, Clone)]
pub struct ConsentGate {
    sensitive_types: BTreeSet<DataType>,
}

impl Default for ConsentGate {
    fn default() -> Self {
        Self::baseline()
    }
}

impl ConsentGate {
    pub fn baseline() -> Self {
        Self {
            sensitive_types: BTreeSet::from([
                DataType::FriendshipData,
                DataType::BehavioralRecords,
            ]),
        }
    }

    pub fn new(sensitive_types: BTreeSet<DataType>) -> Self {
        Self { sensitive_types }
    }

    pub fn sensitive_types(&self) -> &BTreeSet<DataType> {
        &self.sensitive_types
    }

    /// Deterministic over the request payload: true iff the transfer touches
    /// any sensitive data category.
    pub fn requires_consent(&self, request: &DataTransferRequest) -> bool {
        !request.data_types.is_disjoint(&self.sensitive_types)
    }

    /// Validates evidence for a `consent_received` transition. Fails closed:
    /// absent grant, wrong student, revocation, expiry, or evidence already
    /// consumed by this request all return false.
    pub fn verify(&self, request: &DataTransferRequest, evidence: &ConsentEvidence) -> bool {
        if request.parent_consent_at.is_some() {
            return false;
        }
        if !evidence.granted || evidence.revoked_at.is_some() {
            return false;
        }
        if evidence.student_id != request.student_id {
            return false;
        }
        if let Some(valid_until) = evidence.valid_until {
            if valid_until < Utc::now() {
                return false;
            }
        }
        true
    }
}
