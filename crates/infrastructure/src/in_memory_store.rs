use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use tokio::sync::RwLock;

use caura_application::{
    ApplicationRepository, AuditTrailQuery, AuditTrailReader, AuthorizationRepository,
    TemplateTarget,
};
use caura_core::{AppError, AppResult, ApplicationId, PermissionId, RoleId, TemplateId, UserId};
use caura_domain::{
    AuditTrailEntry, GrantState, LoanApplicationSnapshot, Permission, PermissionTemplate, Role,
    UserPermission, UserPermissionInput, UserRole, WorkflowStatus,
};

#[derive(Default)]
struct StoreState {
    users: HashSet<UserId>,
    roles: HashMap<RoleId, Role>,
    permissions: HashMap<PermissionId, Permission>,
    templates: HashMap<TemplateId, PermissionTemplate>,
    role_permissions: Vec<(RoleId, PermissionId)>,
    user_roles: Vec<UserRole>,
    user_permissions: Vec<UserPermission>,
    applications: HashMap<ApplicationId, LoanApplicationSnapshot>,
    audit_trail: Vec<AuditTrailEntry>,
}

/// In-memory adapter backing every repository port.
///
/// A single lock guards the whole state so each mutation lands together
/// with its audit entry, matching the transactional contract of the
/// Postgres adapters. Intended for tests and local development.
#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a user.
    pub async fn seed_user(&self, user_id: UserId) {
        self.state.write().await.users.insert(user_id);
    }

    /// Seeds a role.
    pub async fn seed_role(&self, role: Role) {
        self.state.write().await.roles.insert(role.id(), role);
    }

    /// Seeds a permission.
    pub async fn seed_permission(&self, permission: Permission) {
        self.state
            .write()
            .await
            .permissions
            .insert(permission.id(), permission);
    }

    /// Seeds a template.
    pub async fn seed_template(&self, template: PermissionTemplate) {
        self.state
            .write()
            .await
            .templates
            .insert(template.id(), template);
    }

    /// Attaches a permission to a role.
    pub async fn seed_role_permission(&self, role_id: RoleId, permission_id: PermissionId) {
        let mut state = self.state.write().await;
        if !state
            .role_permissions
            .contains(&(role_id, permission_id))
        {
            state.role_permissions.push((role_id, permission_id));
        }
    }

    /// Assigns a role to a user without an audit entry, for seeding.
    pub async fn seed_user_role(&self, assignment: UserRole) {
        self.state.write().await.user_roles.push(assignment);
    }

    /// Returns a copy of the full audit trail, oldest first.
    pub async fn audit_trail(&self) -> Vec<AuditTrailEntry> {
        self.state.read().await.audit_trail.clone()
    }
}

#[async_trait]
impl AuthorizationRepository for InMemoryStore {
    async fn user_exists(&self, user_id: UserId) -> AppResult<bool> {
        Ok(self.state.read().await.users.contains(&user_id))
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        Ok(self.state.read().await.roles.get(&role_id).cloned())
    }

    async fn find_permission(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Option<Permission>> {
        Ok(self
            .state
            .read()
            .await
            .permissions
            .get(&permission_id)
            .cloned())
    }

    async fn find_template(
        &self,
        template_id: TemplateId,
    ) -> AppResult<Option<PermissionTemplate>> {
        Ok(self
            .state
            .read()
            .await
            .templates
            .get(&template_id)
            .cloned())
    }

    async fn list_role_permissions_for_user(
        &self,
        user_id: UserId,
    ) -> AppResult<Vec<Permission>> {
        let state = self.state.read().await;
        let mut granted = Vec::new();
        for assignment in state
            .user_roles
            .iter()
            .filter(|assignment| assignment.user_id == user_id)
        {
            for (role_id, permission_id) in &state.role_permissions {
                if *role_id == assignment.role_id
                    && let Some(permission) = state.permissions.get(permission_id)
                {
                    granted.push(permission.clone());
                }
            }
        }
        Ok(granted)
    }

    async fn list_direct_overrides(
        &self,
        user_id: UserId,
    ) -> AppResult<Vec<(UserPermission, Permission)>> {
        let state = self.state.read().await;
        let mut joined = Vec::new();
        for grant in state
            .user_permissions
            .iter()
            .filter(|grant| grant.user_id() == user_id && grant.is_active())
        {
            if let Some(permission) = state.permissions.get(&grant.permission_id()) {
                joined.push((grant.clone(), permission.clone()));
            }
        }
        Ok(joined)
    }

    async fn list_granted_permission_ids(
        &self,
        target: TemplateTarget,
    ) -> AppResult<Vec<PermissionId>> {
        let state = self.state.read().await;
        Ok(match target {
            TemplateTarget::User(user_id) => state
                .user_permissions
                .iter()
                .filter(|grant| {
                    grant.user_id() == user_id
                        && grant.is_active()
                        && grant.state() == GrantState::Granted
                })
                .map(UserPermission::permission_id)
                .collect(),
            TemplateTarget::Role(role_id) => state
                .role_permissions
                .iter()
                .filter(|(linked, _)| *linked == role_id)
                .map(|(_, permission_id)| *permission_id)
                .collect(),
        })
    }

    async fn assign_role(&self, assignment: UserRole, entry: AuditTrailEntry) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.user_roles.iter().any(|existing| {
            existing.user_id == assignment.user_id && existing.role_id == assignment.role_id
        }) {
            return Err(AppError::Conflict(format!(
                "user '{}' already holds role '{}'",
                assignment.user_id, assignment.role_id
            )));
        }
        state.user_roles.push(assignment);
        state.audit_trail.push(entry);
        Ok(())
    }

    async fn upsert_override(
        &self,
        grant: UserPermission,
        entry: AuditTrailEntry,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        for existing in &mut state.user_permissions {
            if existing.user_id() == grant.user_id()
                && existing.permission_id() == grant.permission_id()
            {
                existing.deactivate();
            }
        }
        state.user_permissions.push(grant);
        state.audit_trail.push(entry);
        Ok(())
    }

    async fn apply_template_grants(
        &self,
        target: TemplateTarget,
        _granted_by: UserId,
        permission_ids: Vec<PermissionId>,
        entry: AuditTrailEntry,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        match target {
            TemplateTarget::User(user_id) => {
                for permission_id in permission_ids {
                    // At most one active granted override per pair,
                    // matching the partial unique index in Postgres.
                    let already_granted = state.user_permissions.iter().any(|existing| {
                        existing.user_id() == user_id
                            && existing.permission_id() == permission_id
                            && existing.is_active()
                            && existing.state() == GrantState::Granted
                    });
                    if already_granted {
                        continue;
                    }
                    state.user_permissions.push(UserPermission::new(
                        UserPermissionInput {
                            user_id,
                            permission_id,
                            state: GrantState::Granted,
                            expires_at: None,
                        },
                    ));
                }
            }
            TemplateTarget::Role(role_id) => {
                for permission_id in permission_ids {
                    if !state.role_permissions.contains(&(role_id, permission_id)) {
                        state.role_permissions.push((role_id, permission_id));
                    }
                }
            }
        }
        state.audit_trail.push(entry);
        Ok(())
    }
}

#[async_trait]
impl ApplicationRepository for InMemoryStore {
    async fn insert_application(
        &self,
        snapshot: LoanApplicationSnapshot,
        entry: AuditTrailEntry,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.applications.contains_key(&snapshot.id) {
            return Err(AppError::Conflict(format!(
                "application '{}' already exists",
                snapshot.id
            )));
        }
        state.applications.insert(snapshot.id, snapshot);
        state.audit_trail.push(entry);
        Ok(())
    }

    async fn find_application(
        &self,
        application_id: ApplicationId,
    ) -> AppResult<Option<LoanApplicationSnapshot>> {
        Ok(self
            .state
            .read()
            .await
            .applications
            .get(&application_id)
            .cloned())
    }

    async fn update_workflow(
        &self,
        expected_status: WorkflowStatus,
        snapshot: LoanApplicationSnapshot,
        entry: AuditTrailEntry,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        let Some(stored) = state.applications.get(&snapshot.id) else {
            return Err(AppError::NotFound(format!(
                "application '{}' not found",
                snapshot.id
            )));
        };
        if stored.status != expected_status {
            return Err(AppError::StaleStatus {
                application_id: snapshot.id,
                expected: expected_status.as_str().to_owned(),
                actual: stored.status.as_str().to_owned(),
            });
        }
        state.applications.insert(snapshot.id, snapshot);
        state.audit_trail.push(entry);
        Ok(())
    }
}

#[async_trait]
impl AuditTrailReader for InMemoryStore {
    async fn query_entries(&self, query: AuditTrailQuery) -> AppResult<Vec<AuditTrailEntry>> {
        let state = self.state.read().await;
        let mut matching: Vec<AuditTrailEntry> = state
            .audit_trail
            .iter()
            .filter(|entry| {
                query.action.is_none_or(|action| entry.action == action)
                    && query
                        .entity_type
                        .as_deref()
                        .is_none_or(|entity_type| entry.entity_type == entity_type)
                    && query
                        .entity_id
                        .as_deref()
                        .is_none_or(|entity_id| entry.entity_id == entity_id)
                    && query.actor_id.is_none_or(|actor_id| entry.actor_id == actor_id)
                    && query
                        .recorded_after
                        .is_none_or(|after| entry.recorded_at >= after)
                    && query
                        .recorded_before
                        .is_none_or(|before| entry.recorded_at < before)
            })
            .cloned()
            .collect();
        // Stable sort over the reversed append order keeps entries with
        // identical timestamps newest first.
        matching.reverse();
        matching.sort_by(|left, right| right.recorded_at.cmp(&left.recorded_at));
        Ok(matching
            .into_iter()
            .skip(query.offset)
            .take(query.limit)
            .collect())
    }
}

#[cfg(test)]
mod tests;
