use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use caura_application::{AuthorizationRepository, TemplateTarget};
use caura_core::{AppError, AppResult, PermissionId, RoleId, TemplateId, UserId};
use caura_domain::{
    AuditTrailEntry, GrantState, Permission, PermissionInput, PermissionScope,
    PermissionTemplate, Role, UserPermission, UserPermissionInput, UserRole,
};

use crate::postgres_audit_trail_repository::append_entry;

/// PostgreSQL-backed repository for the permission model.
#[derive(Clone)]
pub struct PostgresAuthorizationRepository {
    pool: PgPool,
}

impl PostgresAuthorizationRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|error| AppError::Storage(format!("failed to begin transaction: {error}")))
    }
}

#[derive(Debug, FromRow)]
struct PermissionRow {
    id: uuid::Uuid,
    resource_type: String,
    action: String,
    scope: String,
    name: String,
    condition: Option<serde_json::Value>,
}

impl PermissionRow {
    fn into_permission(self) -> AppResult<Permission> {
        Permission::new(PermissionInput {
            id: PermissionId::from_uuid(self.id),
            resource_type: self.resource_type,
            action: self.action,
            scope: PermissionScope::from_str(self.scope.as_str())?,
            name: self.name,
            condition: self.condition,
        })
    }
}

#[derive(Debug, FromRow)]
struct OverrideRow {
    user_id: uuid::Uuid,
    state: String,
    expires_at: Option<DateTime<Utc>>,
    permission_id: uuid::Uuid,
    resource_type: String,
    action: String,
    scope: String,
    permission_name: String,
    condition: Option<serde_json::Value>,
}

impl OverrideRow {
    fn into_pair(self) -> AppResult<(UserPermission, Permission)> {
        let permission = Permission::new(PermissionInput {
            id: PermissionId::from_uuid(self.permission_id),
            resource_type: self.resource_type,
            action: self.action,
            scope: PermissionScope::from_str(self.scope.as_str())?,
            name: self.permission_name,
            condition: self.condition,
        })?;
        let grant = UserPermission::new(UserPermissionInput {
            user_id: UserId::from_uuid(self.user_id),
            permission_id: permission.id(),
            state: GrantState::from_str(self.state.as_str())?,
            expires_at: self.expires_at,
        });
        Ok((grant, permission))
    }
}

#[async_trait]
impl AuthorizationRepository for PostgresAuthorizationRepository {
    async fn user_exists(&self, user_id: UserId) -> AppResult<bool> {
        sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM users WHERE id = $1)")
            .bind(user_id.as_uuid())
            .fetch_one(&self.pool)
            .await
            .map_err(|error| AppError::Storage(format!("failed to look up user: {error}")))
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        let row = sqlx::query_as::<_, (uuid::Uuid, String, String, bool)>(
            r#"
            SELECT id, name, display_name, is_system
            FROM roles
            WHERE id = $1
            "#,
        )
        .bind(role_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Storage(format!("failed to look up role: {error}")))?;

        row.map(|(id, name, display_name, is_system)| {
            Role::new(RoleId::from_uuid(id), name, display_name, is_system)
        })
        .transpose()
    }

    async fn find_permission(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Option<Permission>> {
        let row = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT id, resource_type, action, scope, name, condition
            FROM permissions
            WHERE id = $1
            "#,
        )
        .bind(permission_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Storage(format!("failed to look up permission: {error}")))?;

        row.map(PermissionRow::into_permission).transpose()
    }

    async fn find_template(
        &self,
        template_id: TemplateId,
    ) -> AppResult<Option<PermissionTemplate>> {
        let name = sqlx::query_scalar::<_, String>(
            "SELECT name FROM permission_templates WHERE id = $1",
        )
        .bind(template_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Storage(format!("failed to look up template: {error}")))?;

        let Some(name) = name else {
            return Ok(None);
        };

        let permission_ids = sqlx::query_scalar::<_, uuid::Uuid>(
            r#"
            SELECT permission_id
            FROM permission_template_items
            WHERE template_id = $1
            ORDER BY permission_id
            "#,
        )
        .bind(template_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Storage(format!("failed to list template items: {error}")))?;

        PermissionTemplate::new(
            template_id,
            name,
            permission_ids
                .into_iter()
                .map(PermissionId::from_uuid)
                .collect(),
        )
        .map(Some)
    }

    async fn list_role_permissions_for_user(
        &self,
        user_id: UserId,
    ) -> AppResult<Vec<Permission>> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT
                permissions.id,
                permissions.resource_type,
                permissions.action,
                permissions.scope,
                permissions.name,
                permissions.condition
            FROM user_roles
            JOIN role_permissions
                ON role_permissions.role_id = user_roles.role_id
            JOIN permissions
                ON permissions.id = role_permissions.permission_id
            WHERE user_roles.user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Storage(format!("failed to list role permissions: {error}"))
        })?;

        rows.into_iter().map(PermissionRow::into_permission).collect()
    }

    async fn list_direct_overrides(
        &self,
        user_id: UserId,
    ) -> AppResult<Vec<(UserPermission, Permission)>> {
        let rows = sqlx::query_as::<_, OverrideRow>(
            r#"
            SELECT
                user_permissions.user_id,
                user_permissions.state,
                user_permissions.expires_at,
                permissions.id AS permission_id,
                permissions.resource_type,
                permissions.action,
                permissions.scope,
                permissions.name AS permission_name,
                permissions.condition
            FROM user_permissions
            JOIN permissions
                ON permissions.id = user_permissions.permission_id
            WHERE user_permissions.user_id = $1
                AND user_permissions.is_active
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_all(&self.pool)
        .await
        .map_err(|error| {
            AppError::Storage(format!("failed to list direct overrides: {error}"))
        })?;

        rows.into_iter().map(OverrideRow::into_pair).collect()
    }

    async fn list_granted_permission_ids(
        &self,
        target: TemplateTarget,
    ) -> AppResult<Vec<PermissionId>> {
        let ids = match target {
            TemplateTarget::User(user_id) => sqlx::query_scalar::<_, uuid::Uuid>(
                r#"
                SELECT permission_id
                FROM user_permissions
                WHERE user_id = $1
                    AND is_active
                    AND state = 'granted'
                "#,
            )
            .bind(user_id.as_uuid())
            .fetch_all(&self.pool)
            .await,
            TemplateTarget::Role(role_id) => sqlx::query_scalar::<_, uuid::Uuid>(
                "SELECT permission_id FROM role_permissions WHERE role_id = $1",
            )
            .bind(role_id.as_uuid())
            .fetch_all(&self.pool)
            .await,
        }
        .map_err(|error| {
            AppError::Storage(format!("failed to list granted permissions: {error}"))
        })?;

        Ok(ids.into_iter().map(PermissionId::from_uuid).collect())
    }

    async fn assign_role(&self, assignment: UserRole, entry: AuditTrailEntry) -> AppResult<()> {
        let mut transaction = self.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO user_roles (user_id, role_id, assigned_at, assigned_by)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(assignment.user_id.as_uuid())
        .bind(assignment.role_id.as_uuid())
        .bind(assignment.assigned_at)
        .bind(assignment.assigned_by.as_uuid())
        .execute(&mut *transaction)
        .await
        .map_err(|error| map_assignment_conflict(error, &assignment))?;

        append_entry(&mut transaction, &entry).await?;
        transaction
            .commit()
            .await
            .map_err(|error| AppError::Storage(format!("failed to commit transaction: {error}")))
    }

    async fn upsert_override(
        &self,
        grant: UserPermission,
        entry: AuditTrailEntry,
    ) -> AppResult<()> {
        let mut transaction = self.begin().await?;

        sqlx::query(
            r#"
            UPDATE user_permissions
            SET is_active = false
            WHERE user_id = $1
                AND permission_id = $2
                AND is_active
            "#,
        )
        .bind(grant.user_id().as_uuid())
        .bind(grant.permission_id().as_uuid())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            AppError::Storage(format!("failed to deactivate prior override: {error}"))
        })?;

        sqlx::query(
            r#"
            INSERT INTO user_permissions (user_id, permission_id, state, is_active, expires_at)
            VALUES ($1, $2, $3, true, $4)
            "#,
        )
        .bind(grant.user_id().as_uuid())
        .bind(grant.permission_id().as_uuid())
        .bind(grant.state().as_str())
        .bind(grant.expires_at())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            map_override_conflict(error, grant.user_id(), grant.permission_id())
        })?;

        append_entry(&mut transaction, &entry).await?;
        transaction
            .commit()
            .await
            .map_err(|error| AppError::Storage(format!("failed to commit transaction: {error}")))
    }

    async fn apply_template_grants(
        &self,
        target: TemplateTarget,
        granted_by: UserId,
        permission_ids: Vec<PermissionId>,
        entry: AuditTrailEntry,
    ) -> AppResult<()> {
        let mut transaction = self.begin().await?;

        for permission_id in permission_ids {
            match target {
                TemplateTarget::User(user_id) => {
                    sqlx::query(
                        r#"
                        INSERT INTO user_permissions (user_id, permission_id, state, is_active)
                        VALUES ($1, $2, 'granted', true)
                        "#,
                    )
                    .bind(user_id.as_uuid())
                    .bind(permission_id.as_uuid())
                    .execute(&mut *transaction)
                    .await
                    .map_err(|error| map_override_conflict(error, user_id, permission_id))?;
                }
                TemplateTarget::Role(role_id) => {
                    sqlx::query(
                        r#"
                        INSERT INTO role_permissions (role_id, permission_id, granted_by)
                        VALUES ($1, $2, $3)
                        ON CONFLICT (role_id, permission_id) DO NOTHING
                        "#,
                    )
                    .bind(role_id.as_uuid())
                    .bind(permission_id.as_uuid())
                    .bind(granted_by.as_uuid())
                    .execute(&mut *transaction)
                    .await
                    .map_err(|error| {
                        AppError::Storage(format!("failed to persist template grant: {error}"))
                    })?;
                }
            }
        }

        append_entry(&mut transaction, &entry).await?;
        transaction
            .commit()
            .await
            .map_err(|error| AppError::Storage(format!("failed to commit transaction: {error}")))
    }
}

fn map_override_conflict(
    error: sqlx::Error,
    user_id: UserId,
    permission_id: PermissionId,
) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!(
            "user '{user_id}' already has an active override for permission '{permission_id}'"
        ));
    }

    AppError::Storage(format!("failed to persist override: {error}"))
}

fn map_assignment_conflict(error: sqlx::Error, assignment: &UserRole) -> AppError {
    if let sqlx::Error::Database(database_error) = &error
        && database_error.code().as_deref() == Some("23505")
    {
        return AppError::Conflict(format!(
            "user '{}' already holds role '{}'",
            assignment.user_id, assignment.role_id
        ));
    }

    AppError::Storage(format!("failed to persist role assignment: {error}"))
}
