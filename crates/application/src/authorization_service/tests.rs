use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use caura_core::{
    ActorContext, AppError, AppResult, PermissionId, RoleId, TemplateId, UserId,
};
use caura_domain::{
    AuditAction, AuditTrailEntry, GrantState, Permission, PermissionDescriptor, PermissionInput,
    PermissionScope, PermissionTemplate, Role, UserPermission, UserPermissionInput, UserRole,
};
use tokio::sync::Mutex;

use super::{AuthorizationService, USER_RESOURCE, admin_actions};
use crate::{AuthorizationRepository, PermissionSetCache, TemplateTarget};

#[derive(Default)]
struct FakeState {
    users: Vec<UserId>,
    roles: Vec<Role>,
    permissions: Vec<Permission>,
    templates: Vec<PermissionTemplate>,
    assignments: Vec<UserRole>,
    role_links: Vec<(RoleId, PermissionId)>,
    overrides: Vec<UserPermission>,
    audit: Vec<AuditTrailEntry>,
    fail_reads: bool,
    write_delay_ms: u64,
}

#[derive(Default)]
struct FakeRepository {
    state: Mutex<FakeState>,
}

impl FakeRepository {
    async fn audit_actions(&self) -> Vec<AuditAction> {
        self.state
            .lock()
            .await
            .audit
            .iter()
            .map(|entry| entry.action)
            .collect()
    }
}

#[async_trait]
impl AuthorizationRepository for FakeRepository {
    async fn user_exists(&self, user_id: UserId) -> AppResult<bool> {
        let state = self.state.lock().await;
        if state.fail_reads {
            return Err(AppError::Storage("fake outage".to_owned()));
        }
        Ok(state.users.contains(&user_id))
    }

    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>> {
        let state = self.state.lock().await;
        Ok(state.roles.iter().find(|role| role.id() == role_id).cloned())
    }

    async fn find_permission(
        &self,
        permission_id: PermissionId,
    ) -> AppResult<Option<Permission>> {
        let state = self.state.lock().await;
        Ok(state
            .permissions
            .iter()
            .find(|permission| permission.id() == permission_id)
            .cloned())
    }

    async fn find_template(
        &self,
        template_id: TemplateId,
    ) -> AppResult<Option<PermissionTemplate>> {
        let state = self.state.lock().await;
        Ok(state
            .templates
            .iter()
            .find(|template| template.id() == template_id)
            .cloned())
    }

    async fn list_role_permissions_for_user(
        &self,
        user_id: UserId,
    ) -> AppResult<Vec<Permission>> {
        let state = self.state.lock().await;
        if state.fail_reads {
            return Err(AppError::Storage("fake outage".to_owned()));
        }
        let mut granted = Vec::new();
        for assignment in state
            .assignments
            .iter()
            .filter(|assignment| assignment.user_id == user_id)
        {
            for (role_id, permission_id) in &state.role_links {
                if *role_id != assignment.role_id {
                    continue;
                }
                if let Some(permission) = state
                    .permissions
                    .iter()
                    .find(|permission| permission.id() == *permission_id)
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
        let state = self.state.lock().await;
        if state.fail_reads {
            return Err(AppError::Storage("fake outage".to_owned()));
        }
        let mut joined = Vec::new();
        for grant in state
            .overrides
            .iter()
            .filter(|grant| grant.user_id() == user_id && grant.is_active())
        {
            if let Some(permission) = state
                .permissions
                .iter()
                .find(|permission| permission.id() == grant.permission_id())
            {
                joined.push((grant.clone(), permission.clone()));
            }
        }
        Ok(joined)
    }

    async fn list_granted_permission_ids(
        &self,
        target: TemplateTarget,
    ) -> AppResult<Vec<PermissionId>> {
        let state = self.state.lock().await;
        Ok(match target {
            TemplateTarget::User(user_id) => state
                .overrides
                .iter()
                .filter(|grant| {
                    grant.user_id() == user_id
                        && grant.is_active()
                        && grant.state() == GrantState::Granted
                })
                .map(UserPermission::permission_id)
                .collect(),
            TemplateTarget::Role(role_id) => state
                .role_links
                .iter()
                .filter(|(linked, _)| *linked == role_id)
                .map(|(_, permission_id)| *permission_id)
                .collect(),
        })
    }

    async fn assign_role(&self, assignment: UserRole, entry: AuditTrailEntry) -> AppResult<()> {
        let mut state = self.state.lock().await;
        if state.assignments.iter().any(|existing| {
            existing.user_id == assignment.user_id && existing.role_id == assignment.role_id
        }) {
            return Err(AppError::Conflict("role already assigned".to_owned()));
        }
        state.assignments.push(assignment);
        state.audit.push(entry);
        Ok(())
    }

    async fn upsert_override(
        &self,
        grant: UserPermission,
        entry: AuditTrailEntry,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        for existing in &mut state.overrides {
            if existing.user_id() == grant.user_id()
                && existing.permission_id() == grant.permission_id()
            {
                existing.deactivate();
            }
        }
        state.overrides.push(grant);
        state.audit.push(entry);
        Ok(())
    }

    async fn apply_template_grants(
        &self,
        target: TemplateTarget,
        _granted_by: UserId,
        permission_ids: Vec<PermissionId>,
        entry: AuditTrailEntry,
    ) -> AppResult<()> {
        // Widens the window between the held-set read and this write so
        // an unserialized caller would interleave.
        let delay = self.state.lock().await.write_delay_ms;
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
        }
        let mut state = self.state.lock().await;
        match target {
            TemplateTarget::User(user_id) => {
                for permission_id in permission_ids {
                    state.overrides.push(UserPermission::new(UserPermissionInput {
                        user_id,
                        permission_id,
                        state: GrantState::Granted,
                        expires_at: None,
                    }));
                }
            }
            TemplateTarget::Role(role_id) => {
                for permission_id in permission_ids {
                    state.role_links.push((role_id, permission_id));
                }
            }
        }
        state.audit.push(entry);
        Ok(())
    }
}

#[derive(Default)]
struct FakeCache {
    entries: Mutex<HashMap<UserId, Vec<PermissionDescriptor>>>,
}

#[async_trait]
impl PermissionSetCache for FakeCache {
    async fn get(&self, user_id: UserId) -> AppResult<Option<Vec<PermissionDescriptor>>> {
        Ok(self.entries.lock().await.get(&user_id).cloned())
    }

    async fn set(
        &self,
        user_id: UserId,
        descriptors: &[PermissionDescriptor],
        _ttl_seconds: u32,
    ) -> AppResult<()> {
        self.entries
            .lock()
            .await
            .insert(user_id, descriptors.to_vec());
        Ok(())
    }

    async fn invalidate(&self, user_id: UserId) -> AppResult<()> {
        self.entries.lock().await.remove(&user_id);
        Ok(())
    }
}

fn permission(resource_type: &str, action: &str, scope: PermissionScope) -> Permission {
    let result = Permission::new(PermissionInput {
        id: PermissionId::new(),
        resource_type: resource_type.to_owned(),
        action: action.to_owned(),
        scope,
        name: format!("{resource_type}.{action}"),
        condition: None,
    });
    match result {
        Ok(permission) => permission,
        Err(error) => panic!("permission fixture failed: {error}"),
    }
}

fn role(name: &str) -> Role {
    match Role::new(RoleId::new(), name, name, false) {
        Ok(role) => role,
        Err(error) => panic!("role fixture failed: {error}"),
    }
}

fn actor(user_id: UserId) -> ActorContext {
    ActorContext::new(user_id, Some("10.0.0.7".to_owned()))
}

struct Harness {
    repository: Arc<FakeRepository>,
    service: AuthorizationService,
    admin: UserId,
}

/// Seeds an admin who holds every administrative capability through a
/// role, mirroring a bootstrapped administrator account.
async fn harness() -> Harness {
    let repository = Arc::new(FakeRepository::default());
    let admin = UserId::new();
    let admin_role = role("administrator");
    {
        let mut state = repository.state.lock().await;
        state.users.push(admin);
        for action in [
            admin_actions::ASSIGN_ROLE,
            admin_actions::GRANT_PERMISSION,
            admin_actions::REVOKE_PERMISSION,
            admin_actions::APPLY_TEMPLATE,
        ] {
            let capability = permission(USER_RESOURCE, action, PermissionScope::Global);
            state.role_links.push((admin_role.id(), capability.id()));
            state.permissions.push(capability);
        }
        state.assignments.push(UserRole {
            user_id: admin,
            role_id: admin_role.id(),
            assigned_at: Utc::now(),
            assigned_by: admin,
        });
        state.roles.push(admin_role);
    }
    let service = AuthorizationService::new(repository.clone());
    Harness {
        repository,
        service,
        admin,
    }
}

#[tokio::test]
async fn unknown_actor_has_no_capabilities() {
    let harness = harness().await;
    let stranger = UserId::new();

    assert!(
        !harness
            .service
            .can(stranger, "application", "process", PermissionScope::Own)
            .await
    );
    assert_eq!(
        harness
            .service
            .effective_permissions(stranger)
            .await
            .map(|descriptors| descriptors.len())
            .ok(),
        Some(0)
    );
}

#[tokio::test]
async fn wider_scope_authorizes_narrower_request() {
    let harness = harness().await;

    assert!(
        harness
            .service
            .can(
                harness.admin,
                USER_RESOURCE,
                admin_actions::ASSIGN_ROLE,
                PermissionScope::Branch,
            )
            .await
    );
    assert!(
        !harness
            .service
            .can(
                harness.admin,
                USER_RESOURCE,
                "delete",
                PermissionScope::Own,
            )
            .await
    );
}

#[tokio::test]
async fn resolution_failure_denies_instead_of_erroring() {
    let harness = harness().await;
    harness.repository.state.lock().await.fail_reads = true;

    assert!(
        !harness
            .service
            .can(
                harness.admin,
                USER_RESOURCE,
                admin_actions::ASSIGN_ROLE,
                PermissionScope::Own,
            )
            .await
    );
    assert!(
        harness
            .service
            .effective_permissions(harness.admin)
            .await
            .is_err()
    );
}

#[tokio::test]
async fn assign_role_requires_capability_and_records_audit() {
    let harness = harness().await;
    let teller = UserId::new();
    let teller_role = role("teller");
    let teller_role_id = teller_role.id();
    {
        let mut state = harness.repository.state.lock().await;
        state.users.push(teller);
        state.roles.push(teller_role);
    }

    let denied = harness
        .service
        .assign_role(&actor(teller), teller, teller_role_id, None)
        .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));

    let granted = harness
        .service
        .assign_role(
            &actor(harness.admin),
            teller,
            teller_role_id,
            Some("onboarding".to_owned()),
        )
        .await;
    assert_eq!(granted.ok(), Some(()));
    assert_eq!(
        harness.repository.audit_actions().await.last(),
        Some(&AuditAction::RoleAssigned)
    );

    let duplicate = harness
        .service
        .assign_role(&actor(harness.admin), teller, teller_role_id, None)
        .await;
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn assign_role_rejects_unknown_user_and_role() {
    let harness = harness().await;
    let admin = actor(harness.admin);

    let unknown_user = harness
        .service
        .assign_role(&admin, UserId::new(), RoleId::new(), None)
        .await;
    assert!(matches!(unknown_user, Err(AppError::NotFound(_))));

    let teller = UserId::new();
    harness.repository.state.lock().await.users.push(teller);
    let unknown_role = harness
        .service
        .assign_role(&admin, teller, RoleId::new(), None)
        .await;
    assert!(matches!(unknown_role, Err(AppError::NotFound(_))));
}

#[tokio::test]
async fn revoke_suppresses_role_granted_permission() {
    let harness = harness().await;
    let teller = UserId::new();
    let teller_role = role("teller");
    let process = permission("application", "process", PermissionScope::Branch);
    let process_id = process.id();
    {
        let mut state = harness.repository.state.lock().await;
        state.users.push(teller);
        state.role_links.push((teller_role.id(), process_id));
        state.assignments.push(UserRole {
            user_id: teller,
            role_id: teller_role.id(),
            assigned_at: Utc::now(),
            assigned_by: harness.admin,
        });
        state.roles.push(teller_role);
        state.permissions.push(process);
    }

    assert!(
        harness
            .service
            .can(teller, "application", "process", PermissionScope::Branch)
            .await
    );

    let revoked = harness
        .service
        .revoke_permission(
            &actor(harness.admin),
            teller,
            process_id,
            Some("leave of absence".to_owned()),
        )
        .await;
    assert_eq!(revoked.ok(), Some(()));
    assert!(
        !harness
            .service
            .can(teller, "application", "process", PermissionScope::Own)
            .await
    );
    assert_eq!(
        harness.repository.audit_actions().await.last(),
        Some(&AuditAction::PermissionRevoked)
    );
}

#[tokio::test]
async fn later_grant_replaces_standing_revoke() {
    let harness = harness().await;
    let teller = UserId::new();
    let approve = permission("application", "approve", PermissionScope::Branch);
    let approve_id = approve.id();
    {
        let mut state = harness.repository.state.lock().await;
        state.users.push(teller);
        state.permissions.push(approve);
    }
    let admin = actor(harness.admin);

    let revoked = harness
        .service
        .revoke_permission(&admin, teller, approve_id, None)
        .await;
    assert_eq!(revoked.ok(), Some(()));
    let granted = harness
        .service
        .grant_permission(&admin, teller, approve_id, None, None)
        .await;
    assert_eq!(granted.ok(), Some(()));

    assert!(
        harness
            .service
            .can(teller, "application", "approve", PermissionScope::Branch)
            .await
    );
}

#[tokio::test]
async fn expired_direct_grant_stops_applying() {
    let harness = harness().await;
    let teller = UserId::new();
    let approve = permission("application", "approve", PermissionScope::Branch);
    let approve_id = approve.id();
    {
        let mut state = harness.repository.state.lock().await;
        state.users.push(teller);
        state.permissions.push(approve);
        state.overrides.push(UserPermission::new(UserPermissionInput {
            user_id: teller,
            permission_id: approve_id,
            state: GrantState::Granted,
            expires_at: Some(Utc::now() - Duration::minutes(5)),
        }));
    }

    assert!(
        !harness
            .service
            .can(teller, "application", "approve", PermissionScope::Own)
            .await
    );
}

#[tokio::test]
async fn grant_rejects_past_expiry() {
    let harness = harness().await;
    let teller = UserId::new();
    let approve = permission("application", "approve", PermissionScope::Branch);
    let approve_id = approve.id();
    {
        let mut state = harness.repository.state.lock().await;
        state.users.push(teller);
        state.permissions.push(approve);
    }

    let result = harness
        .service
        .grant_permission(
            &actor(harness.admin),
            teller,
            approve_id,
            Some(Utc::now() - Duration::seconds(1)),
            None,
        )
        .await;
    assert!(matches!(result, Err(AppError::Validation(_))));
}

#[tokio::test]
async fn template_application_is_idempotent() {
    let harness = harness().await;
    let teller = UserId::new();
    let process = permission("application", "process", PermissionScope::Branch);
    let read = permission("application", "read", PermissionScope::Branch);
    let template = match PermissionTemplate::new(
        TemplateId::new(),
        "teller-onboarding",
        vec![process.id(), read.id()],
    ) {
        Ok(template) => template,
        Err(error) => panic!("template fixture failed: {error}"),
    };
    let template_id = template.id();
    {
        let mut state = harness.repository.state.lock().await;
        state.users.push(teller);
        state.permissions.push(process);
        state.permissions.push(read);
        state.templates.push(template);
    }
    let admin = actor(harness.admin);

    let first = harness
        .service
        .apply_template(&admin, template_id, TemplateTarget::User(teller), None)
        .await;
    assert_eq!(first.ok(), Some(()));
    assert!(
        harness
            .service
            .can(teller, "application", "process", PermissionScope::Branch)
            .await
    );
    let audited = harness.repository.audit_actions().await.len();

    let second = harness
        .service
        .apply_template(&admin, template_id, TemplateTarget::User(teller), None)
        .await;
    assert_eq!(second.ok(), Some(()));
    assert_eq!(harness.repository.audit_actions().await.len(), audited);
}

#[tokio::test]
async fn racing_template_applications_grant_once() {
    let harness = harness().await;
    let teller = UserId::new();
    let process = permission("application", "process", PermissionScope::Branch);
    let template = match PermissionTemplate::new(
        TemplateId::new(),
        "teller-onboarding",
        vec![process.id()],
    ) {
        Ok(template) => template,
        Err(error) => panic!("template fixture failed: {error}"),
    };
    let template_id = template.id();
    {
        let mut state = harness.repository.state.lock().await;
        state.users.push(teller);
        state.permissions.push(process);
        state.templates.push(template);
        state.write_delay_ms = 5;
    }
    let admin = actor(harness.admin);

    let first = tokio::spawn({
        let service = harness.service.clone();
        let admin = admin.clone();
        async move {
            service
                .apply_template(&admin, template_id, TemplateTarget::User(teller), None)
                .await
        }
    });
    let second = tokio::spawn({
        let service = harness.service.clone();
        let admin = admin.clone();
        async move {
            service
                .apply_template(&admin, template_id, TemplateTarget::User(teller), None)
                .await
        }
    });
    match (first.await, second.await) {
        (Ok(first), Ok(second)) => {
            assert_eq!(first.ok(), Some(()));
            assert_eq!(second.ok(), Some(()));
        }
        _ => panic!("template task panicked"),
    }

    let state = harness.repository.state.lock().await;
    let active_grants = state
        .overrides
        .iter()
        .filter(|grant| grant.user_id() == teller && grant.is_active())
        .count();
    assert_eq!(active_grants, 1);
    let applied = state
        .audit
        .iter()
        .filter(|entry| entry.action == AuditAction::TemplateApplied)
        .count();
    assert_eq!(applied, 1);
}

#[tokio::test]
async fn write_invalidates_cached_permission_set() {
    let harness = harness().await;
    let cache = Arc::new(FakeCache::default());
    let service = harness
        .service
        .clone()
        .with_permission_cache(cache.clone(), 30);
    let teller = UserId::new();
    let process = permission("application", "process", PermissionScope::Branch);
    let process_id = process.id();
    {
        let mut state = harness.repository.state.lock().await;
        state.users.push(teller);
        state.permissions.push(process);
    }

    // First resolution caches the empty set.
    assert!(
        !service
            .can(teller, "application", "process", PermissionScope::Own)
            .await
    );
    assert!(cache.entries.lock().await.contains_key(&teller));

    let granted = service
        .grant_permission(&actor(harness.admin), teller, process_id, None, None)
        .await;
    assert_eq!(granted.ok(), Some(()));
    assert!(!cache.entries.lock().await.contains_key(&teller));
    assert!(
        service
            .can(teller, "application", "process", PermissionScope::Own)
            .await
    );
}
