use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use caura_core::{AppResult, UserId};
use caura_domain::{EffectivePermissionSet, PermissionDescriptor, PermissionScope};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{AuthorizationRepository, PermissionSetCache};

mod grants;
mod templates;

/// Resource type gating administrative permission mutations.
pub const USER_RESOURCE: &str = "user";

/// Capability actions required by the administrative write operations.
pub mod admin_actions {
    /// Required to assign roles.
    pub const ASSIGN_ROLE: &str = "assign_role";
    /// Required to grant direct permissions.
    pub const GRANT_PERMISSION: &str = "grant_permission";
    /// Required to revoke direct permissions.
    pub const REVOKE_PERMISSION: &str = "revoke_permission";
    /// Required to apply permission templates.
    pub const APPLY_TEMPLATE: &str = "apply_template";
}

/// One async mutex per target user or role, created on first use.
///
/// A write operation reads the target's current grants before deciding
/// what to persist, so the read-then-write sequence must not interleave
/// with another writer for the same target.
#[derive(Default)]
struct TargetWriteLocks {
    entries: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TargetWriteLocks {
    async fn acquire(&self, key: String) -> OwnedMutexGuard<()> {
        let lock = {
            let mut entries = self.entries.lock().await;
            Arc::clone(entries.entry(key).or_default())
        };
        lock.lock_owned().await
    }
}

/// Permission evaluation engine.
///
/// Reads resolve an actor's effective capabilities (role grants union
/// direct grants, minus direct revokes) and may be served from a
/// short-TTL cache; writes go through the repository port, which
/// persists each mutation with its audit entry in one transaction.
/// Writes to the same target user or role are serialized, so a
/// concurrent grant and revoke cannot lose either write and a template
/// cannot apply twice.
#[derive(Clone)]
pub struct AuthorizationService {
    repository: Arc<dyn AuthorizationRepository>,
    cache: Option<Arc<dyn PermissionSetCache>>,
    cache_ttl_seconds: u32,
    write_locks: Arc<TargetWriteLocks>,
}

impl AuthorizationService {
    /// Creates an evaluation engine over a repository implementation.
    #[must_use]
    pub fn new(repository: Arc<dyn AuthorizationRepository>) -> Self {
        Self {
            repository,
            cache: None,
            cache_ttl_seconds: 0,
            write_locks: Arc::new(TargetWriteLocks::default()),
        }
    }

    /// Adds short-TTL caching of resolved permission sets.
    ///
    /// The ttl bounds the cross-node staleness window; same-node writes
    /// invalidate the target user's entry immediately.
    #[must_use]
    pub fn with_permission_cache(
        mut self,
        cache: Arc<dyn PermissionSetCache>,
        ttl_seconds: u32,
    ) -> Self {
        self.cache = Some(cache);
        self.cache_ttl_seconds = ttl_seconds;
        self
    }

    /// Returns whether the actor holds a capability at the requested
    /// scope.
    ///
    /// Fail-closed: an unknown actor has no capabilities, and a lookup
    /// failure denies rather than degrading to a coarser check.
    pub async fn can(
        &self,
        actor_id: UserId,
        resource_type: &str,
        action: &str,
        scope: PermissionScope,
    ) -> bool {
        match self.resolve(actor_id).await {
            Ok(set) => set.allows(resource_type, action, scope),
            Err(error) => {
                tracing::warn!(
                    actor_id = %actor_id,
                    resource_type,
                    action,
                    error = %error,
                    "permission resolution failed; denying"
                );
                false
            }
        }
    }

    /// Returns the actor's effective permissions as an enumerable view.
    ///
    /// An unknown actor yields an empty set; storage failures propagate
    /// so introspection surfaces do not render a misleading blank.
    pub async fn effective_permissions(
        &self,
        actor_id: UserId,
    ) -> AppResult<Vec<PermissionDescriptor>> {
        Ok(self.resolve(actor_id).await?.into_descriptors())
    }

    async fn resolve(&self, actor_id: UserId) -> AppResult<EffectivePermissionSet> {
        if let Some(cache) = &self.cache {
            match cache.get(actor_id).await {
                Ok(Some(descriptors)) => {
                    return Ok(EffectivePermissionSet::from_descriptors(descriptors));
                }
                Ok(None) => {}
                Err(error) => {
                    tracing::debug!(actor_id = %actor_id, error = %error, "permission cache read failed");
                }
            }
        }

        let role_granted = self
            .repository
            .list_role_permissions_for_user(actor_id)
            .await?;
        let overrides = self.repository.list_direct_overrides(actor_id).await?;
        let set = EffectivePermissionSet::resolve(&role_granted, &overrides, Utc::now());

        if let Some(cache) = &self.cache
            && let Err(error) = cache
                .set(actor_id, set.descriptors(), self.cache_ttl_seconds)
                .await
        {
            tracing::debug!(actor_id = %actor_id, error = %error, "permission cache write failed");
        }

        Ok(set)
    }

    pub(crate) async fn require(
        &self,
        actor_id: UserId,
        resource_type: &str,
        action: &str,
        scope: PermissionScope,
    ) -> AppResult<()> {
        if self.can(actor_id, resource_type, action, scope).await {
            Ok(())
        } else {
            Err(caura_core::AppError::Forbidden(format!(
                "actor '{actor_id}' is missing capability '{action}' on '{resource_type}'"
            )))
        }
    }

    pub(crate) async fn lock_target_writes(&self, key: String) -> OwnedMutexGuard<()> {
        self.write_locks.acquire(key).await
    }

    async fn invalidate_cache(&self, user_id: UserId) {
        if let Some(cache) = &self.cache
            && let Err(error) = cache.invalidate(user_id).await
        {
            tracing::debug!(user_id = %user_id, error = %error, "permission cache invalidation failed");
        }
    }
}

#[cfg(test)]
mod tests;
