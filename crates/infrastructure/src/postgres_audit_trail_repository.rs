use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use caura_application::{AuditTrailQuery, AuditTrailReader, MAX_AUDIT_PAGE_SIZE};
use caura_core::{AppError, AppResult, AuditEntryId, PermissionId, RoleId, UserId};
use caura_domain::{AuditAction, AuditTrailEntry};

/// Appends one audit entry inside an open transaction.
///
/// Shared by the mutating repositories so every guarded mutation
/// commits together with its audit record.
pub(crate) async fn append_entry(
    transaction: &mut Transaction<'_, Postgres>,
    entry: &AuditTrailEntry,
) -> AppResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_trail_entries (
            id,
            action,
            entity_type,
            entity_id,
            actor_id,
            target_user_id,
            target_role_id,
            permission_id,
            details,
            reason,
            ip_address,
            recorded_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(entry.id.as_uuid())
    .bind(entry.action.as_str())
    .bind(entry.entity_type.as_str())
    .bind(entry.entity_id.as_str())
    .bind(entry.actor_id.as_uuid())
    .bind(entry.target_user_id.map(|id| id.as_uuid()))
    .bind(entry.target_role_id.map(|id| id.as_uuid()))
    .bind(entry.permission_id.map(|id| id.as_uuid()))
    .bind(&entry.details)
    .bind(entry.reason.as_deref())
    .bind(entry.ip_address.as_deref())
    .bind(entry.recorded_at)
    .execute(&mut **transaction)
    .await
    .map_err(|error| AppError::Storage(format!("failed to append audit entry: {error}")))?;

    Ok(())
}

/// PostgreSQL-backed reader over the append-only audit trail.
#[derive(Clone)]
pub struct PostgresAuditTrailRepository {
    pool: PgPool,
}

impl PostgresAuditTrailRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditRow {
    id: uuid::Uuid,
    action: String,
    entity_type: String,
    entity_id: String,
    actor_id: uuid::Uuid,
    target_user_id: Option<uuid::Uuid>,
    target_role_id: Option<uuid::Uuid>,
    permission_id: Option<uuid::Uuid>,
    details: serde_json::Value,
    reason: Option<String>,
    ip_address: Option<String>,
    recorded_at: DateTime<Utc>,
}

impl AuditRow {
    fn into_entry(self) -> AppResult<AuditTrailEntry> {
        Ok(AuditTrailEntry {
            id: AuditEntryId::from_uuid(self.id),
            action: AuditAction::from_str(self.action.as_str()).map_err(|_| {
                AppError::Internal(format!(
                    "audit entry '{}' has unknown action '{}'",
                    self.id, self.action
                ))
            })?,
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            actor_id: UserId::from_uuid(self.actor_id),
            target_user_id: self.target_user_id.map(UserId::from_uuid),
            target_role_id: self.target_role_id.map(RoleId::from_uuid),
            permission_id: self.permission_id.map(PermissionId::from_uuid),
            details: self.details,
            reason: self.reason,
            ip_address: self.ip_address,
            recorded_at: self.recorded_at,
        })
    }
}

#[async_trait]
impl AuditTrailReader for PostgresAuditTrailRepository {
    async fn query_entries(&self, query: AuditTrailQuery) -> AppResult<Vec<AuditTrailEntry>> {
        let limit = query.limit.clamp(1, MAX_AUDIT_PAGE_SIZE) as i64;
        let offset = query.offset.min(100_000) as i64;
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT
                id,
                action,
                entity_type,
                entity_id,
                actor_id,
                target_user_id,
                target_role_id,
                permission_id,
                details,
                reason,
                ip_address,
                recorded_at
            FROM audit_trail_entries
            WHERE ($1::TEXT IS NULL OR action = $1)
                AND ($2::TEXT IS NULL OR entity_type = $2)
                AND ($3::TEXT IS NULL OR entity_id = $3)
                AND ($4::UUID IS NULL OR actor_id = $4)
                AND ($5::TIMESTAMPTZ IS NULL OR recorded_at >= $5)
                AND ($6::TIMESTAMPTZ IS NULL OR recorded_at < $6)
            ORDER BY recorded_at DESC, id
            LIMIT $7
            OFFSET $8
            "#,
        )
        .bind(query.action.map(|action| action.as_str()))
        .bind(query.entity_type)
        .bind(query.entity_id)
        .bind(query.actor_id.map(|actor_id| actor_id.as_uuid()))
        .bind(query.recorded_after)
        .bind(query.recorded_before)
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Storage(format!("failed to list audit entries: {error}")))?;

        rows.into_iter().map(AuditRow::into_entry).collect()
    }
}
