use async_trait::async_trait;
use caura_core::{AppResult, PermissionId, RoleId, TemplateId, UserId};
use caura_domain::{
    AuditTrailEntry, Permission, PermissionDescriptor, PermissionTemplate, Role, UserPermission,
    UserRole,
};

/// Target a permission template is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplateTarget {
    /// Apply the template's permissions as direct user grants.
    User(UserId),
    /// Attach the template's permissions to a role.
    Role(RoleId),
}

impl TemplateTarget {
    /// Returns a stable label for audit details.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::User(_) => "user",
            Self::Role(_) => "role",
        }
    }

    /// Returns the target identifier rendered for audit details.
    #[must_use]
    pub fn id_string(&self) -> String {
        match self {
            Self::User(user_id) => user_id.to_string(),
            Self::Role(role_id) => role_id.to_string(),
        }
    }
}

/// Repository port for the permission model.
///
/// Every mutating method persists its mutation together with the given
/// audit entry in one transaction; a failure rolls back both. The
/// calling service holds a per-target write lock across each
/// read-then-write sequence; adapters additionally keep at most one
/// active override per `(user, permission)` pair, so a racing writer
/// from another process surfaces as a conflict rather than a duplicate
/// grant.
#[async_trait]
pub trait AuthorizationRepository: Send + Sync {
    /// Returns whether a user exists.
    async fn user_exists(&self, user_id: UserId) -> AppResult<bool>;

    /// Returns one role by id.
    async fn find_role(&self, role_id: RoleId) -> AppResult<Option<Role>>;

    /// Returns one permission by id.
    async fn find_permission(&self, permission_id: PermissionId)
    -> AppResult<Option<Permission>>;

    /// Returns one template by id.
    async fn find_template(&self, template_id: TemplateId)
    -> AppResult<Option<PermissionTemplate>>;

    /// Lists the permissions granted through the user's roles.
    async fn list_role_permissions_for_user(&self, user_id: UserId)
    -> AppResult<Vec<Permission>>;

    /// Lists the user's active direct overrides, each joined to its
    /// permission row. Deactivated overrides are not returned.
    async fn list_direct_overrides(
        &self,
        user_id: UserId,
    ) -> AppResult<Vec<(UserPermission, Permission)>>;

    /// Lists the permission ids currently granted to a target
    /// (role grants for a role, active direct grants for a user).
    async fn list_granted_permission_ids(
        &self,
        target: TemplateTarget,
    ) -> AppResult<Vec<PermissionId>>;

    /// Persists a role assignment and its audit entry atomically.
    ///
    /// Re-assigning a role the user already holds is a conflict.
    async fn assign_role(&self, assignment: UserRole, entry: AuditTrailEntry) -> AppResult<()>;

    /// Persists a direct override and its audit entry atomically.
    ///
    /// Any previously active override for the same `(user, permission)`
    /// pair is deactivated in the same transaction, never deleted.
    async fn upsert_override(
        &self,
        grant: UserPermission,
        entry: AuditTrailEntry,
    ) -> AppResult<()>;

    /// Grants a set of permissions to a target and persists the audit
    /// entry atomically. Called only with permissions the target does
    /// not already hold.
    async fn apply_template_grants(
        &self,
        target: TemplateTarget,
        granted_by: UserId,
        permission_ids: Vec<PermissionId>,
        entry: AuditTrailEntry,
    ) -> AppResult<()>;
}

/// Short-TTL cache port for resolved permission sets.
///
/// The cache bounds the staleness window for reads; writers invalidate
/// the target user's entry so same-node revocations apply immediately.
#[async_trait]
pub trait PermissionSetCache: Send + Sync {
    /// Returns the cached descriptor set for one user.
    async fn get(&self, user_id: UserId) -> AppResult<Option<Vec<PermissionDescriptor>>>;

    /// Stores the descriptor set for one user with a ttl.
    async fn set(
        &self,
        user_id: UserId,
        descriptors: &[PermissionDescriptor],
        ttl_seconds: u32,
    ) -> AppResult<()>;

    /// Drops the cached entry for one user.
    async fn invalidate(&self, user_id: UserId) -> AppResult<()>;
}
