// SQLite storage adapter (feature `database`).
//
// Column layout mirrors the platform's hosted schema: ids and timestamps as
// TEXT (UUID / RFC 3339), data_types as a JSON array, statuses as their wire
// strings. The compare-and-swap lives in the `WHERE id = ? AND status = ?`
// clause of a single UPDATE, so concurrency control sits in the storage
// layer, not in application code.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{migrate::MigrateDatabase, Row, SqlitePool};
use tracing::info;
use uuid::Uuid;

use crate::actor::{ActorId, Role, SchoolId};
use crate::audit::AuditEntry;
use crate::notify::{Notification, Severity};
use crate::requests::types::{
    DataTransferRequest, DataType, NotificationId, RequestId, RequestKind, RequestedRole,
    RoleRequest, RoleRequestStatus, StudentId, TransferStatus,
};
use crate::store::{
    AuditLog, NotificationStore, RequestStore, RoleDecision, SchoolDirectory, StoreError,
    TransferUpdate,
};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connects and creates the schema when missing.
    pub async fn new(database_url: &str) -> Result<Self, StoreError> {
        if !sqlx::Sqlite::database_exists(database_url)
            .await
            .map_err(unavailable)?
        {
            info!("creating request database at {}", database_url);
            sqlx::Sqlite::create_database(database_url)
                .await
                .map_err(unavailable)?;
        }

        let pool = SqlitePool::connect(database_url)
            .await
            .map_err(unavailable)?;
        let store = Self { pool };
        store.create_schema().await?;
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_schema(&self) -> Result<(), StoreError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS role_requests (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                current_role TEXT NOT NULL,
                requested_role TEXT NOT NULL,
                school_id TEXT,
                reason TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL,
                decided_at TEXT,
                decided_by TEXT,
                decision_note TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS data_transfer_requests (
                id TEXT PRIMARY KEY,
                student_id TEXT NOT NULL,
                from_school_id TEXT NOT NULL,
                to_school_id TEXT NOT NULL,
                data_types TEXT NOT NULL,
                status TEXT NOT NULL,
                requested_by TEXT NOT NULL,
                requested_at TEXT NOT NULL,
                parent_consent_at TEXT,
                completed_at TEXT,
                notes TEXT,
                decision_note TEXT
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS notifications (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                message TEXT NOT NULL,
                type TEXT NOT NULL,
                category TEXT NOT NULL,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS audit_entries (
                id TEXT PRIMARY KEY,
                request_id TEXT NOT NULL,
                kind TEXT NOT NULL,
                from_state TEXT NOT NULL,
                to_state TEXT NOT NULL,
                actor_id TEXT NOT NULL,
                recorded_at TEXT NOT NULL,
                note TEXT
            )
            "#,
            "CREATE TABLE IF NOT EXISTS schools (id TEXT PRIMARY KEY)",
        ];
        for statement in statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(unavailable)?;
        }
        Ok(())
    }

    /// Registers a school so submissions referencing it validate.
    pub async fn add_school(&self, id: SchoolId) -> Result<(), StoreError> {
        sqlx::query("INSERT OR IGNORE INTO schools (id) VALUES (?1)")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.pool.close().await;
    }

    async fn fetch_role_request(
        &self,
        id: RequestId,
    ) -> Result<Option<RoleRequest>, StoreError> {
        let row = sqlx::query("SELECT * FROM role_requests WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        row.map(|row| decode_role_request(&row)).transpose()
    }

    async fn fetch_transfer_request(
        &self,
        id: RequestId,
    ) -> Result<Option<DataTransferRequest>, StoreError> {
        let row = sqlx::query("SELECT * FROM data_transfer_requests WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        row.map(|row| decode_transfer_request(&row)).transpose()
    }
}

#[async_trait]
impl RequestStore for SqliteStore {
    async fn insert_role_request(&self, request: &RoleRequest) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO role_requests
                (id, user_id, current_role, requested_role, school_id, reason,
                 status, created_at, decided_at, decided_by, decision_note)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(request.id.to_string())
        .bind(request.actor_id.to_string())
        .bind(request.current_role.as_str())
        .bind(request.requested_role.as_str())
        .bind(request.school_id.map(|s| s.to_string()))
        .bind(&request.reason)
        .bind(request.status.as_str())
        .bind(request.created_at.to_rfc3339())
        .bind(request.decided_at.map(|t| t.to_rfc3339()))
        .bind(request.decided_by.map(|a| a.to_string()))
        .bind(request.decision_note.as_deref())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn role_request(&self, id: RequestId) -> Result<Option<RoleRequest>, StoreError> {
        self.fetch_role_request(id).await
    }

    async fn pending_role_requests(&self) -> Result<Vec<RoleRequest>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM role_requests WHERE status = 'pending' ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        rows.iter().map(decode_role_request).collect()
    }

    async fn swap_role_status(
        &self,
        id: RequestId,
        expected: RoleRequestStatus,
        decision: RoleDecision,
    ) -> Result<Option<RoleRequest>, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE role_requests
            SET status = ?1,
                decided_at = ?2,
                decided_by = ?3,
                decision_note = COALESCE(?4, decision_note)
            WHERE id = ?5 AND status = ?6
            "#,
        )
        .bind(decision.status.as_str())
        .bind(decision.decided_at.to_rfc3339())
        .bind(decision.decided_by.to_string())
        .bind(decision.note.as_deref())
        .bind(id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch_role_request(id).await
    }

    async fn insert_transfer_request(
        &self,
        request: &DataTransferRequest,
    ) -> Result<(), StoreError> {
        let data_types = serde_json::to_string(&request.data_types)
            .map_err(|e| StoreError::Corrupted {
                id: request.id.to_string(),
                reason: e.to_string(),
            })?;
        sqlx::query(
            r#"
            INSERT INTO data_transfer_requests
                (id, student_id, from_school_id, to_school_id, data_types,
                 status, requested_by, requested_at, parent_consent_at,
                 completed_at, notes, decision_note)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
        )
        .bind(request.id.to_string())
        .bind(request.student_id.to_string())
        .bind(request.from_school_id.to_string())
        .bind(request.to_school_id.to_string())
        .bind(data_types)
        .bind(request.status.as_str())
        .bind(request.requested_by.to_string())
        .bind(request.requested_at.to_rfc3339())
        .bind(request.parent_consent_at.map(|t| t.to_rfc3339()))
        .bind(request.completed_at.map(|t| t.to_rfc3339()))
        .bind(request.notes.as_deref())
        .bind(request.decision_note.as_deref())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn transfer_request(
        &self,
        id: RequestId,
    ) -> Result<Option<DataTransferRequest>, StoreError> {
        self.fetch_transfer_request(id).await
    }

    async fn transfers_for_school(
        &self,
        school_id: SchoolId,
    ) -> Result<Vec<DataTransferRequest>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM data_transfer_requests
            WHERE from_school_id = ?1 OR to_school_id = ?1
            ORDER BY requested_at ASC
            "#,
        )
        .bind(school_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        rows.iter().map(decode_transfer_request).collect()
    }

    async fn swap_transfer_status(
        &self,
        id: RequestId,
        expected: TransferStatus,
        update: TransferUpdate,
    ) -> Result<Option<DataTransferRequest>, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE data_transfer_requests
            SET status = ?1,
                parent_consent_at = COALESCE(?2, parent_consent_at),
                completed_at = COALESCE(?3, completed_at),
                decision_note = COALESCE(?4, decision_note)
            WHERE id = ?5 AND status = ?6
            "#,
        )
        .bind(update.status.as_str())
        .bind(update.parent_consent_at.map(|t| t.to_rfc3339()))
        .bind(update.completed_at.map(|t| t.to_rfc3339()))
        .bind(update.note.as_deref())
        .bind(id.to_string())
        .bind(expected.as_str())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Ok(None);
        }
        self.fetch_transfer_request(id).await
    }
}

#[async_trait]
impl NotificationStore for SqliteStore {
    async fn insert(&self, notification: &Notification) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, user_id, title, message, type, category, is_read,
                 created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(notification.id.to_string())
        .bind(notification.recipient.to_string())
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.severity.as_str())
        .bind(&notification.category)
        .bind(notification.is_read)
        .bind(notification.created_at.to_rfc3339())
        .bind(notification.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn notifications_for(&self, recipient: ActorId) -> Result<Vec<Notification>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM notifications WHERE user_id = ?1 ORDER BY created_at DESC",
        )
        .bind(recipient.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        rows.iter().map(decode_notification).collect()
    }

    async fn mark_read(&self, id: NotificationId, recipient: ActorId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, updated_at = ?1 WHERE id = ?2 AND user_id = ?3",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(id.to_string())
        .bind(recipient.to_string())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(result.rows_affected())
    }

    async fn mark_all_read(&self, recipient: ActorId) -> Result<u64, StoreError> {
        let result = sqlx::query(
            "UPDATE notifications SET is_read = 1, updated_at = ?1 WHERE user_id = ?2 AND is_read = 0",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(recipient.to_string())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(result.rows_affected())
    }

    async fn delete(&self, id: NotificationId, recipient: ActorId) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM notifications WHERE id = ?1 AND user_id = ?2")
            .bind(id.to_string())
            .bind(recipient.to_string())
            .execute(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(result.rows_affected())
    }
}

#[async_trait]
impl AuditLog for SqliteStore {
    async fn append(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO audit_entries
                (id, request_id, kind, from_state, to_state, actor_id,
                 recorded_at, note)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(entry.id.to_string())
        .bind(entry.request_id.to_string())
        .bind(entry.kind.as_str())
        .bind(&entry.from_state)
        .bind(&entry.to_state)
        .bind(entry.actor_id.to_string())
        .bind(entry.recorded_at.to_rfc3339())
        .bind(entry.note.as_deref())
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;
        Ok(())
    }

    async fn entries_for(&self, request_id: RequestId) -> Result<Vec<AuditEntry>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM audit_entries WHERE request_id = ?1 ORDER BY recorded_at ASC",
        )
        .bind(request_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;
        rows.iter().map(decode_audit_entry).collect()
    }
}

#[async_trait]
impl SchoolDirectory for SqliteStore {
    async fn school_exists(&self, id: SchoolId) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT id FROM schools WHERE id = ?1")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?;
        Ok(row.is_some())
    }
}

fn unavailable(error: sqlx::Error) -> StoreError {
    StoreError::Unavailable(error.to_string())
}

fn corrupted(id: &str, reason: impl Into<String>) -> StoreError {
    StoreError::Corrupted {
        id: id.to_string(),
        reason: reason.into(),
    }
}

fn parse_uuid(id: &str, value: &str) -> Result<Uuid, StoreError> {
    Uuid::parse_str(value).map_err(|e| corrupted(id, format!("bad uuid: {e}")))
}

fn parse_timestamp(id: &str, value: &str) -> Result<DateTime<Utc>, StoreError> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| corrupted(id, format!("bad timestamp: {e}")))
}

fn parse_optional_timestamp(
    id: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, StoreError> {
    value.map(|v| parse_timestamp(id, &v)).transpose()
}

fn decode_role_request(row: &sqlx::sqlite::SqliteRow) -> Result<RoleRequest, StoreError> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let current_role: String = row.get("current_role");
    let requested_role: String = row.get("requested_role");
    let decided_by: Option<String> = row.get("decided_by");
    let school_id: Option<String> = row.get("school_id");

    Ok(RoleRequest {
        id: RequestId(parse_uuid(&id, &id)?),
        actor_id: ActorId(parse_uuid(&id, &row.get::<String, _>("user_id"))?),
        current_role: Role::parse(&current_role)
            .ok_or_else(|| corrupted(&id, format!("unknown role {current_role}")))?,
        requested_role: RequestedRole::parse(&requested_role)
            .ok_or_else(|| corrupted(&id, format!("unknown requested role {requested_role}")))?,
        school_id: school_id
            .map(|s| parse_uuid(&id, &s).map(SchoolId))
            .transpose()?,
        reason: row.get("reason"),
        status: RoleRequestStatus::parse(&status)
            .ok_or_else(|| corrupted(&id, format!("unknown status {status}")))?,
        created_at: parse_timestamp(&id, &row.get::<String, _>("created_at"))?,
        decided_at: parse_optional_timestamp(&id, row.get("decided_at"))?,
        decided_by: decided_by
            .map(|a| parse_uuid(&id, &a).map(ActorId))
            .transpose()?,
        decision_note: row.get("decision_note"),
    })
}

fn decode_transfer_request(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<DataTransferRequest, StoreError> {
    let id: String = row.get("id");
    let status: String = row.get("status");
    let data_types: String = row.get("data_types");
    let data_types: std::collections::BTreeSet<DataType> = serde_json::from_str(&data_types)
        .map_err(|e| corrupted(&id, format!("bad data_types: {e}")))?;

    Ok(DataTransferRequest {
        id: RequestId(parse_uuid(&id, &id)?),
        student_id: StudentId(parse_uuid(&id, &row.get::<String, _>("student_id"))?),
        from_school_id: SchoolId(parse_uuid(&id, &row.get::<String, _>("from_school_id"))?),
        to_school_id: SchoolId(parse_uuid(&id, &row.get::<String, _>("to_school_id"))?),
        data_types,
        status: TransferStatus::parse(&status)
            .ok_or_else(|| corrupted(&id, format!("unknown status {status}")))?,
        requested_by: ActorId(parse_uuid(&id, &row.get::<String, _>("requested_by"))?),
        requested_at: parse_timestamp(&id, &row.get::<String, _>("requested_at"))?,
        parent_consent_at: parse_optional_timestamp(&id, row.get("parent_consent_at"))?,
        completed_at: parse_optional_timestamp(&id, row.get("completed_at"))?,
        notes: row.get("notes"),
        decision_note: row.get("decision_note"),
    })
}

fn decode_notification(row: &sqlx::sqlite::SqliteRow) -> Result<Notification, StoreError> {
    let id: String = row.get("id");
    let severity: String = row.get("type");

    Ok(Notification {
        id: NotificationId(parse_uuid(&id, &id)?),
        recipient: ActorId(parse_uuid(&id, &row.get::<String, _>("user_id"))?),
        title: row.get("title"),
        message: row.get("message"),
        severity: Severity::parse(&severity)
            .ok_or_else(|| corrupted(&id, format!("unknown severity {severity}")))?,
        category: row.get("category"),
        is_read: row.get("is_read"),
        created_at: parse_timestamp(&id, &row.get::<String, _>("created_at"))?,
        updated_at: parse_timestamp(&id, &row.get::<String, _>("updated_at"))?,
    })
}

fn decode_audit_entry(row: &sqlx::sqlite::SqliteRow) -> Result<AuditEntry, StoreError> {
    let id: String = row.get("id");
    let kind: String = row.get("kind");

    Ok(AuditEntry {
        id: parse_uuid(&id, &id)?,
        request_id: RequestId(parse_uuid(&id, &row.get::<String, _>("request_id"))?),
        kind: RequestKind::parse(&kind)
            .ok_or_else(|| corrupted(&id, format!("unknown kind {kind}")))?,
        from_state: row.get("from_state"),
        to_state: row.get("to_state"),
        actor_id: ActorId(parse_uuid(&id, &row.get::<String, _>("actor_id"))?),
        recorded_at: parse_timestamp(&id, &row.get::<String, _>("recorded_at"))?,
        note: row.get("note"),
    })
}
