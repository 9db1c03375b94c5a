use chrono::{DateTime, Utc};
use caura_core::{
    ActorContext, AppError, AppResult, AuditEntryId, PermissionId, RoleId, UserId,
};
use caura_domain::{
    AuditAction, AuditTrailEntry, GrantState, Permission, PermissionScope, UserPermission,
    UserPermissionInput, UserRole,
};
use serde_json::json;

use super::{AuthorizationService, USER_RESOURCE, admin_actions};

impl AuthorizationService {
    /// Assigns a role to a user.
    ///
    /// Requires the `assign_role` capability on the `user` resource.
    /// Assigning a role the user already holds is a conflict.
    pub async fn assign_role(
        &self,
        actor: &ActorContext,
        user_id: UserId,
        role_id: RoleId,
        reason: Option<String>,
    ) -> AppResult<()> {
        self.require(
            actor.user_id(),
            USER_RESOURCE,
            admin_actions::ASSIGN_ROLE,
            PermissionScope::Own,
        )
        .await?;
        let _write_guard = self.lock_target_writes(format!("user:{user_id}")).await;

        if !self.repository.user_exists(user_id).await? {
            return Err(AppError::NotFound(format!("user '{user_id}' not found")));
        }
        let Some(role) = self.repository.find_role(role_id).await? else {
            return Err(AppError::NotFound(format!("role '{role_id}' not found")));
        };

        let now = Utc::now();
        let assignment = UserRole {
            user_id,
            role_id,
            assigned_at: now,
            assigned_by: actor.user_id(),
        };
        let entry = AuditTrailEntry {
            id: AuditEntryId::new(),
            action: AuditAction::RoleAssigned,
            entity_type: "user_role".to_owned(),
            entity_id: user_id.to_string(),
            actor_id: actor.user_id(),
            target_user_id: Some(user_id),
            target_role_id: Some(role_id),
            permission_id: None,
            details: json!({ "role": role.name() }),
            reason,
            ip_address: actor.ip_address().map(str::to_owned),
            recorded_at: now,
        };

        self.repository.assign_role(assignment, entry).await?;
        self.invalidate_cache(user_id).await;
        Ok(())
    }

    /// Grants a permission directly to a user, optionally until an
    /// expiry.
    ///
    /// Requires the `grant_permission` capability on the `user`
    /// resource. The grant replaces any active override for the same
    /// permission, including a standing revoke.
    pub async fn grant_permission(
        &self,
        actor: &ActorContext,
        user_id: UserId,
        permission_id: PermissionId,
        expires_at: Option<DateTime<Utc>>,
        reason: Option<String>,
    ) -> AppResult<()> {
        self.require(
            actor.user_id(),
            USER_RESOURCE,
            admin_actions::GRANT_PERMISSION,
            PermissionScope::Own,
        )
        .await?;
        let _write_guard = self.lock_target_writes(format!("user:{user_id}")).await;

        let now = Utc::now();
        if let Some(expiry) = expires_at
            && expiry <= now
        {
            return Err(AppError::Validation(
                "grant expiry must lie in the future".to_owned(),
            ));
        }

        let permission = self.lookup_override_target(user_id, permission_id).await?;
        let grant = UserPermission::new(UserPermissionInput {
            user_id,
            permission_id,
            state: GrantState::Granted,
            expires_at,
        });
        let entry = self.override_entry(
            actor,
            AuditAction::PermissionGranted,
            &grant,
            &permission,
            reason,
            now,
        );

        self.repository.upsert_override(grant, entry).await?;
        self.invalidate_cache(user_id).await;
        Ok(())
    }

    /// Revokes a permission from a user.
    ///
    /// Requires the `revoke_permission` capability on the `user`
    /// resource. The revoke suppresses the permission even when a role
    /// still grants it, and replaces any active direct grant.
    pub async fn revoke_permission(
        &self,
        actor: &ActorContext,
        user_id: UserId,
        permission_id: PermissionId,
        reason: Option<String>,
    ) -> AppResult<()> {
        self.require(
            actor.user_id(),
            USER_RESOURCE,
            admin_actions::REVOKE_PERMISSION,
            PermissionScope::Own,
        )
        .await?;
        let _write_guard = self.lock_target_writes(format!("user:{user_id}")).await;

        let permission = self.lookup_override_target(user_id, permission_id).await?;
        let revoke = UserPermission::new(UserPermissionInput {
            user_id,
            permission_id,
            state: GrantState::Revoked,
            expires_at: None,
        });
        let entry = self.override_entry(
            actor,
            AuditAction::PermissionRevoked,
            &revoke,
            &permission,
            reason,
            Utc::now(),
        );

        self.repository.upsert_override(revoke, entry).await?;
        self.invalidate_cache(user_id).await;
        Ok(())
    }

    async fn lookup_override_target(
        &self,
        user_id: UserId,
        permission_id: PermissionId,
    ) -> AppResult<Permission> {
        if !self.repository.user_exists(user_id).await? {
            return Err(AppError::NotFound(format!("user '{user_id}' not found")));
        }
        match self.repository.find_permission(permission_id).await? {
            Some(permission) => Ok(permission),
            None => Err(AppError::NotFound(format!(
                "permission '{permission_id}' not found"
            ))),
        }
    }

    fn override_entry(
        &self,
        actor: &ActorContext,
        action: AuditAction,
        grant: &UserPermission,
        permission: &Permission,
        reason: Option<String>,
        now: DateTime<Utc>,
    ) -> AuditTrailEntry {
        AuditTrailEntry {
            id: AuditEntryId::new(),
            action,
            entity_type: "user_permission".to_owned(),
            entity_id: grant.user_id().to_string(),
            actor_id: actor.user_id(),
            target_user_id: Some(grant.user_id()),
            target_role_id: None,
            permission_id: Some(grant.permission_id()),
            details: json!({
                "permission": permission.name(),
                "state": grant.state().as_str(),
                "expires_at": grant.expires_at(),
            }),
            reason,
            ip_address: actor.ip_address().map(str::to_owned),
            recorded_at: now,
        }
    }
}
