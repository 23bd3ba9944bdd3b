// Notification side channel.
//
// The dispatcher converts committed transitions into notifications for the
// submitting actor. It sits outside the atomic section: its failures are
// logged and swallowed so a transition that committed never appears to fail.

pub mod templates;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::actor::ActorId;
use crate::requests::types::{NotificationId, RequestId, StatusChange};
use crate::store::{NotificationStore, StoreError};

/// Display severity, persisted as the `notifications.type` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Success => "success",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "info" => Some(Severity::Info),
            "success" => Some(Severity::Success),
            "warning" => Some(Severity::Warning),
            "error" => Some(Severity::Error),
            _ => None,
        }
    }
}

/// A recipient-scoped message. Created by the dispatcher as a transition side
/// effect; afterwards mutated only by its recipient (read flags, deletion).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: NotificationId,
    pub recipient: ActorId,
    pub title: String,
    pub message: String,
    pub severity: Severity,
    pub category: String,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    store: Arc<dyn NotificationStore>,
}

impl NotificationDispatcher {
    pub fn new(store: Arc<dyn NotificationStore>) -> Self {
        Self { store }
    }

    /// Notifies the submitter about a committed transition. Never raises:
    /// template misses produce nothing, store failures are logged at warn.
    pub async fn on_transition(
        &self,
        change: &StatusChange,
        request_id: RequestId,
        recipient: ActorId,
    ) {
        let Some(template) = templates::for_transition(change) else {
            return;
        };

        let now = Utc::now();
        let notification = Notification {
            id: NotificationId::new(),
            recipient,
            title: template.title.to_string(),
            message: template.render_message(request_id),
            severity: template.severity,
            category: template.category.to_string(),
            is_read: false,
            created_at: now,
            updated_at: now,
        };

        if let Err(error) = self.store.insert(&notification).await {
            tracing::warn!(
                request_id = %request_id,
                recipient = %recipient,
                to_state = change.to_str_label(),
                %error,
                "notification dispatch failed; transition stands"
            );
        }
    }

    pub async fn notifications_for(
        &self,
        recipient: ActorId,
    ) -> Result<Vec<Notification>, StoreError> {
        self.store.notifications_for(recipient).await
    }

    pub async fn unread_count(&self, recipient: ActorId) -> Result<u64, StoreError> {
        let notifications = self.store.notifications_for(recipient).await?;
        Ok(notifications.iter().filter(|n| !n.is_read).count() as u64)
    }

    /// Recipient-scoped: marking someone else's notification affects zero
    /// rows and is not an error.
    pub async fn mark_read(
        &self,
        id: NotificationId,
        recipient: ActorId,
    ) -> Result<u64, StoreError> {
        self.store.mark_read(id, recipient).await
    }

    pub async fn mark_all_read(&self, recipient: ActorId) -> Result<u64, StoreError> {
        self.store.mark_all_read(recipient).await
    }

    pub async fn delete(&self, id: NotificationId, recipient: ActorId) -> Result<u64, StoreError> {
        self.store.delete(id, recipient).await
    }
}
