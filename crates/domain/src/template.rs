use caura_core::{AppResult, NonEmptyString, PermissionId, TemplateId};
use serde::{Deserialize, Serialize};

/// A named bundle of permission references applied atomically to a
/// user or role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PermissionTemplate {
    id: TemplateId,
    name: NonEmptyString,
    permission_ids: Vec<PermissionId>,
}

impl PermissionTemplate {
    /// Creates a validated template; duplicate references collapse.
    pub fn new(
        id: TemplateId,
        name: impl Into<String>,
        permission_ids: Vec<PermissionId>,
    ) -> AppResult<Self> {
        let mut deduplicated: Vec<PermissionId> = Vec::with_capacity(permission_ids.len());
        for permission_id in permission_ids {
            if !deduplicated.contains(&permission_id) {
                deduplicated.push(permission_id);
            }
        }

        Ok(Self {
            id,
            name: NonEmptyString::new(name)?,
            permission_ids: deduplicated,
        })
    }

    /// Returns the template identifier.
    #[must_use]
    pub fn id(&self) -> TemplateId {
        self.id
    }

    /// Returns the template name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the referenced permissions.
    #[must_use]
    pub fn permission_ids(&self) -> &[PermissionId] {
        &self.permission_ids
    }
}
