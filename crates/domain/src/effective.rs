use chrono::{DateTime, Utc};
use caura_core::PermissionId;
use serde::{Deserialize, Serialize};

use crate::{GrantState, Permission, PermissionScope, UserPermission};

/// Enumerable view of one effective permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionDescriptor {
    /// Referenced permission row.
    pub permission_id: PermissionId,
    /// Resource type the permission applies to.
    pub resource_type: String,
    /// Action the permission allows.
    pub action: String,
    /// Widest scope the permission grants.
    pub scope: PermissionScope,
    /// Human-readable permission name.
    pub name: String,
}

impl PermissionDescriptor {
    fn from_permission(permission: &Permission) -> Self {
        Self {
            permission_id: permission.id(),
            resource_type: permission.resource_type().to_owned(),
            action: permission.action().to_owned(),
            scope: permission.scope(),
            name: permission.name().to_owned(),
        }
    }

    /// Returns whether the descriptor covers one capability request.
    #[must_use]
    pub fn covers(&self, resource_type: &str, action: &str, requested: PermissionScope) -> bool {
        self.resource_type == resource_type
            && self.action == action
            && self.scope.authorizes(requested)
    }
}

/// An actor's resolved capabilities at one point in time.
///
/// Resolution is a pure set computation: role grants union direct
/// grants, minus direct revokes. A revoke dominates regardless of the
/// order grants and revokes were issued.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectivePermissionSet {
    descriptors: Vec<PermissionDescriptor>,
}

impl EffectivePermissionSet {
    /// Resolves the effective set from role grants and direct overrides.
    ///
    /// `overrides` pairs each override row with its permission row.
    /// Inactive and expired overrides are ignored entirely.
    #[must_use]
    pub fn resolve(
        role_granted: &[Permission],
        overrides: &[(UserPermission, Permission)],
        now: DateTime<Utc>,
    ) -> Self {
        let mut revoked: Vec<PermissionId> = Vec::new();
        for (user_permission, _) in overrides {
            if user_permission.state() == GrantState::Revoked && user_permission.is_effective(now)
            {
                revoked.push(user_permission.permission_id());
            }
        }

        let mut descriptors: Vec<PermissionDescriptor> = Vec::new();
        let mut push_unique = |permission: &Permission| {
            if revoked.contains(&permission.id()) {
                return;
            }
            if descriptors
                .iter()
                .any(|descriptor| descriptor.permission_id == permission.id())
            {
                return;
            }
            descriptors.push(PermissionDescriptor::from_permission(permission));
        };

        for permission in role_granted {
            push_unique(permission);
        }

        for (user_permission, permission) in overrides {
            if user_permission.state() == GrantState::Granted && user_permission.is_effective(now)
            {
                push_unique(permission);
            }
        }

        descriptors.sort_by(|left, right| {
            (&left.resource_type, &left.action, left.scope.as_str()).cmp(&(
                &right.resource_type,
                &right.action,
                right.scope.as_str(),
            ))
        });

        Self { descriptors }
    }

    /// Rebuilds a set from previously resolved descriptors.
    #[must_use]
    pub fn from_descriptors(descriptors: Vec<PermissionDescriptor>) -> Self {
        Self { descriptors }
    }

    /// Returns whether the set covers one capability request.
    #[must_use]
    pub fn allows(&self, resource_type: &str, action: &str, requested: PermissionScope) -> bool {
        self.descriptors
            .iter()
            .any(|descriptor| descriptor.covers(resource_type, action, requested))
    }

    /// Returns the resolved descriptors.
    #[must_use]
    pub fn descriptors(&self) -> &[PermissionDescriptor] {
        &self.descriptors
    }

    /// Consumes the set and returns its descriptors.
    #[must_use]
    pub fn into_descriptors(self) -> Vec<PermissionDescriptor> {
        self.descriptors
    }

    /// Returns whether no permission is effective.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }
}
