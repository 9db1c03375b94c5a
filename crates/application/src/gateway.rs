use chrono::{DateTime, Utc};
use caura_core::{
    ActorContext, AppResult, ApplicationId, PermissionId, RoleId, TemplateId, UserId,
};
use caura_domain::{
    AuditTrailEntry, LoanApplicationSnapshot, PermissionDescriptor, PermissionScope,
    PriorityLevel, TransitionPayload, WorkflowStatus,
};

use crate::{
    AuditTrailQuery, AuditTrailService, AuthorizationService, TemplateTarget, WorkflowService,
};

/// Single entry point bundling the permission engine, the workflow
/// state machine, and the audit trail reader.
///
/// Embedding services construct one gateway per process and route all
/// guarded operations through it; nothing here adds behavior beyond
/// the underlying services.
#[derive(Clone)]
pub struct AuthorizationGateway {
    authorization: AuthorizationService,
    workflow: WorkflowService,
    audit: AuditTrailService,
}

impl AuthorizationGateway {
    /// Bundles the three services into one gateway.
    #[must_use]
    pub fn new(
        authorization: AuthorizationService,
        workflow: WorkflowService,
        audit: AuditTrailService,
    ) -> Self {
        Self {
            authorization,
            workflow,
            audit,
        }
    }

    /// Returns whether the actor holds a capability.
    ///
    /// When `scope` is omitted the narrowest scope is requested, so
    /// holding the capability at any scope qualifies.
    pub async fn can(
        &self,
        actor: &ActorContext,
        resource_type: &str,
        action: &str,
        scope: Option<PermissionScope>,
    ) -> bool {
        self.authorization
            .can(
                actor.user_id(),
                resource_type,
                action,
                scope.unwrap_or(PermissionScope::Own),
            )
            .await
    }

    /// Returns a user's effective permissions.
    pub async fn effective_permissions(
        &self,
        user_id: UserId,
    ) -> AppResult<Vec<PermissionDescriptor>> {
        self.authorization.effective_permissions(user_id).await
    }

    /// Assigns a role to a user.
    pub async fn assign_role(
        &self,
        actor: &ActorContext,
        user_id: UserId,
        role_id: RoleId,
        reason: Option<String>,
    ) -> AppResult<()> {
        self.authorization
            .assign_role(actor, user_id, role_id, reason)
            .await
    }

    /// Grants a permission directly to a user.
    pub async fn grant_permission(
        &self,
        actor: &ActorContext,
        user_id: UserId,
        permission_id: PermissionId,
        expires_at: Option<DateTime<Utc>>,
        reason: Option<String>,
    ) -> AppResult<()> {
        self.authorization
            .grant_permission(actor, user_id, permission_id, expires_at, reason)
            .await
    }

    /// Revokes a permission from a user.
    pub async fn revoke_permission(
        &self,
        actor: &ActorContext,
        user_id: UserId,
        permission_id: PermissionId,
        reason: Option<String>,
    ) -> AppResult<()> {
        self.authorization
            .revoke_permission(actor, user_id, permission_id, reason)
            .await
    }

    /// Applies a permission template to a user or role.
    pub async fn apply_template(
        &self,
        actor: &ActorContext,
        template_id: TemplateId,
        target: TemplateTarget,
        reason: Option<String>,
    ) -> AppResult<()> {
        self.authorization
            .apply_template(actor, template_id, target, reason)
            .await
    }

    /// Submits a new loan application owned by the actor.
    pub async fn create_application(
        &self,
        actor: &ActorContext,
        priority: PriorityLevel,
    ) -> AppResult<LoanApplicationSnapshot> {
        self.workflow.create_application(actor, priority).await
    }

    /// Returns one application's workflow state.
    pub async fn application_state(
        &self,
        actor: &ActorContext,
        application_id: ApplicationId,
    ) -> AppResult<LoanApplicationSnapshot> {
        self.workflow.application_state(actor, application_id).await
    }

    /// Drives one workflow transition.
    ///
    /// `expected_from` is the status the caller last observed; a
    /// mismatch returns a stale-status conflict without evaluating the
    /// transition.
    pub async fn transition(
        &self,
        actor: &ActorContext,
        application_id: ApplicationId,
        to: WorkflowStatus,
        expected_from: WorkflowStatus,
        payload: TransitionPayload,
    ) -> AppResult<LoanApplicationSnapshot> {
        self.workflow
            .transition(actor, application_id, to, expected_from, payload)
            .await
    }

    /// Lists audit entries matching the query.
    pub async fn audit_trail(
        &self,
        actor: &ActorContext,
        query: AuditTrailQuery,
    ) -> AppResult<Vec<AuditTrailEntry>> {
        self.audit.query(actor, query).await
    }
}
