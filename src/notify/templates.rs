// Pure mapping from a committed transition to notification content.
// Categories follow the platform's existing Korean labels: 계정 for account
// and role matters, 이관 for data transfers.

use crate::notify::Severity;
use crate::requests::types::{RequestId, RoleRequestStatus, StatusChange, TransferStatus};

pub const CATEGORY_ACCOUNT: &str = "계정";
pub const CATEGORY_TRANSFER: &str = "이관";

#[derive(Debug, Clone, Copy)]
pub struct NotificationTemplate {
    pub title: &'static str,
    pub message: &'static str,
    pub severity: Severity,
    pub category: &'static str,
}

impl NotificationTemplate {
    pub fn render_message(&self, request_id: RequestId) -> String {
        format!("{} (요청 번호: {})", self.message, request_id)
    }
}

/// Template per (kind, to-state). Entering `pending` is the submission itself
/// and produces no notification.
pub fn for_transition(change: &StatusChange) -> Option<NotificationTemplate> {
    match change {
        StatusChange::Role { to, .. } => role_template(*to),
        StatusChange::Transfer { to, .. } => transfer_template(*to),
    }
}

fn role_template(to: RoleRequestStatus) -> Option<NotificationTemplate> {
    match to {
        RoleRequestStatus::Pending => None,
        RoleRequestStatus::Approved => Some(NotificationTemplate {
            title: "권한 요청 승인",
            message: "관리자 권한 요청이 승인되었습니다. 다시 로그인하면 새 권한이 적용됩니다.",
            severity: Severity::Success,
            category: CATEGORY_ACCOUNT,
        }),
        RoleRequestStatus::Rejected => Some(NotificationTemplate {
            title: "권한 요청 거부",
            message: "관리자 권한 요청이 거부되었습니다. 자세한 내용은 관리자에게 문의하세요.",
            severity: Severity::Warning,
            category: CATEGORY_ACCOUNT,
        }),
    }
}

fn transfer_template(to: TransferStatus) -> Option<NotificationTemplate> {
    match to {
        TransferStatus::Pending => None,
        TransferStatus::ParentConsentRequired => Some(NotificationTemplate {
            title: "학부모 동의 필요",
            message: "데이터 이관을 진행하려면 학부모 동의가 필요합니다.",
            severity: Severity::Warning,
            category: CATEGORY_TRANSFER,
        }),
        TransferStatus::Approved => Some(NotificationTemplate {
            title: "이관 요청 승인",
            message: "데이터 이관 요청이 승인되었습니다.",
            severity: Severity::Success,
            category: CATEGORY_TRANSFER,
        }),
        TransferStatus::InProgress => Some(NotificationTemplate {
            title: "데이터 이관 시작",
            message: "학생 데이터 이관이 진행 중입니다.",
            severity: Severity::Info,
            category: CATEGORY_TRANSFER,
        }),
        TransferStatus::Completed => Some(NotificationTemplate {
            title: "데이터 이관 완료",
            message: "학생 데이터 이관이 완료되었습니다.",
            severity: Severity::Success,
            category: CATEGORY_TRANSFER,
        }),
        TransferStatus::Rejected => Some(NotificationTemplate {
            title: "이관 요청 거부",
            message: "데이터 이관 요청이 거부되었습니다.",
            severity: Severity::Error,
            category: CATEGORY_TRANSFER,
        }),
    }
}
