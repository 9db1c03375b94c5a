use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};

use caura_application::ApplicationRepository;
use caura_core::{AppError, AppResult, ApplicationId, UserId};
use caura_domain::{
    AuditTrailEntry, LoanApplicationSnapshot, PriorityLevel, StageSignoff, WorkflowStatus,
};

use crate::postgres_audit_trail_repository::append_entry;

/// PostgreSQL-backed repository for loan application workflow state.
#[derive(Clone)]
pub struct PostgresApplicationRepository {
    pool: PgPool,
}

impl PostgresApplicationRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct ApplicationRow {
    id: uuid::Uuid,
    owner_id: uuid::Uuid,
    workflow_status: String,
    priority: String,
    assigned_reviewer: Option<uuid::Uuid>,
    created_by: uuid::Uuid,
    created_at: DateTime<Utc>,
    user_completed_by: Option<uuid::Uuid>,
    user_completed_at: Option<DateTime<Utc>>,
    teller_processed_by: Option<uuid::Uuid>,
    teller_processed_at: Option<DateTime<Utc>>,
    manager_reviewed_by: Option<uuid::Uuid>,
    manager_reviewed_at: Option<DateTime<Utc>>,
    account_id: Option<String>,
    approved_amount_minor: Option<i64>,
    approved_term_months: Option<i32>,
    interest_rate_bps: Option<i32>,
    rejection_reason: Option<String>,
}

fn signoff(by: Option<uuid::Uuid>, at: Option<DateTime<Utc>>) -> Option<StageSignoff> {
    match (by, at) {
        (Some(by), Some(at)) => Some(StageSignoff {
            by: UserId::from_uuid(by),
            at,
        }),
        _ => None,
    }
}

impl ApplicationRow {
    fn into_snapshot(self) -> AppResult<LoanApplicationSnapshot> {
        let status = WorkflowStatus::from_str(self.workflow_status.as_str())?;
        Ok(LoanApplicationSnapshot {
            id: ApplicationId::from_uuid(self.id),
            owner_id: UserId::from_uuid(self.owner_id),
            status,
            stage: status.stage(),
            priority: PriorityLevel::from_str(self.priority.as_str())?,
            assigned_reviewer: self.assigned_reviewer.map(UserId::from_uuid),
            created_by: UserId::from_uuid(self.created_by),
            created_at: self.created_at,
            user_completed: signoff(self.user_completed_by, self.user_completed_at),
            teller_processed: signoff(self.teller_processed_by, self.teller_processed_at),
            manager_reviewed: signoff(self.manager_reviewed_by, self.manager_reviewed_at),
            account_id: self.account_id,
            approved_amount_minor: self.approved_amount_minor,
            approved_term_months: self.approved_term_months,
            interest_rate_bps: self.interest_rate_bps,
            rejection_reason: self.rejection_reason,
        })
    }
}

const SELECT_COLUMNS: &str = r#"
    id,
    owner_id,
    workflow_status,
    priority,
    assigned_reviewer,
    created_by,
    created_at,
    user_completed_by,
    user_completed_at,
    teller_processed_by,
    teller_processed_at,
    manager_reviewed_by,
    manager_reviewed_at,
    account_id,
    approved_amount_minor,
    approved_term_months,
    interest_rate_bps,
    rejection_reason
"#;

#[async_trait]
impl ApplicationRepository for PostgresApplicationRepository {
    async fn insert_application(
        &self,
        snapshot: LoanApplicationSnapshot,
        entry: AuditTrailEntry,
    ) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Storage(format!("failed to begin transaction: {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO loan_applications (
                id,
                owner_id,
                workflow_status,
                priority,
                created_by,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(snapshot.id.as_uuid())
        .bind(snapshot.owner_id.as_uuid())
        .bind(snapshot.status.as_str())
        .bind(snapshot.priority.as_str())
        .bind(snapshot.created_by.as_uuid())
        .bind(snapshot.created_at)
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Storage(format!("failed to persist application: {error}")))?;

        append_entry(&mut transaction, &entry).await?;
        transaction
            .commit()
            .await
            .map_err(|error| AppError::Storage(format!("failed to commit transaction: {error}")))
    }

    async fn find_application(
        &self,
        application_id: ApplicationId,
    ) -> AppResult<Option<LoanApplicationSnapshot>> {
        let row = sqlx::query_as::<_, ApplicationRow>(&format!(
            "SELECT {SELECT_COLUMNS} FROM loan_applications WHERE id = $1"
        ))
        .bind(application_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Storage(format!("failed to load application: {error}")))?;

        row.map(ApplicationRow::into_snapshot).transpose()
    }

    async fn update_workflow(
        &self,
        expected_status: WorkflowStatus,
        snapshot: LoanApplicationSnapshot,
        entry: AuditTrailEntry,
    ) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Storage(format!("failed to begin transaction: {error}"))
        })?;

        // The status predicate makes the write a compare-and-swap: a
        // concurrent transition that already moved the row leaves zero
        // rows affected.
        let updated = sqlx::query(
            r#"
            UPDATE loan_applications
            SET workflow_status = $2,
                assigned_reviewer = $3,
                user_completed_by = $4,
                user_completed_at = $5,
                teller_processed_by = $6,
                teller_processed_at = $7,
                manager_reviewed_by = $8,
                manager_reviewed_at = $9,
                account_id = $10,
                approved_amount_minor = $11,
                approved_term_months = $12,
                interest_rate_bps = $13,
                rejection_reason = $14
            WHERE id = $1
                AND workflow_status = $15
            "#,
        )
        .bind(snapshot.id.as_uuid())
        .bind(snapshot.status.as_str())
        .bind(snapshot.assigned_reviewer.map(|id| id.as_uuid()))
        .bind(snapshot.user_completed.map(|signoff| signoff.by.as_uuid()))
        .bind(snapshot.user_completed.map(|signoff| signoff.at))
        .bind(snapshot.teller_processed.map(|signoff| signoff.by.as_uuid()))
        .bind(snapshot.teller_processed.map(|signoff| signoff.at))
        .bind(snapshot.manager_reviewed.map(|signoff| signoff.by.as_uuid()))
        .bind(snapshot.manager_reviewed.map(|signoff| signoff.at))
        .bind(snapshot.account_id.as_deref())
        .bind(snapshot.approved_amount_minor)
        .bind(snapshot.approved_term_months)
        .bind(snapshot.interest_rate_bps)
        .bind(snapshot.rejection_reason.as_deref())
        .bind(expected_status.as_str())
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Storage(format!("failed to update application: {error}")))?;

        if updated.rows_affected() == 0 {
            let actual = sqlx::query_scalar::<_, String>(
                "SELECT workflow_status FROM loan_applications WHERE id = $1",
            )
            .bind(snapshot.id.as_uuid())
            .fetch_optional(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Storage(format!("failed to reload application status: {error}"))
            })?;

            return Err(match actual {
                Some(actual) => AppError::StaleStatus {
                    application_id: snapshot.id,
                    expected: expected_status.as_str().to_owned(),
                    actual,
                },
                None => AppError::NotFound(format!(
                    "application '{}' not found",
                    snapshot.id
                )),
            });
        }

        append_entry(&mut transaction, &entry).await?;
        transaction
            .commit()
            .await
            .map_err(|error| AppError::Storage(format!("failed to commit transaction: {error}")))
    }
}
