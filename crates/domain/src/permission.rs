use std::str::FromStr;

use caura_core::{AppError, AppResult, NonEmptyString, PermissionId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Resource type carried by every workflow capability check.
pub const APPLICATION_RESOURCE: &str = "application";

/// Breadth of a permission's applicability.
///
/// Scopes form a containment chain: a permission held at a wide scope
/// authorizes any narrower requested scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionScope {
    /// Resources owned by the actor.
    Own,
    /// Resources within the actor's department.
    Department,
    /// Resources within the actor's branch.
    Branch,
    /// All resources.
    Global,
}

impl PermissionScope {
    /// Returns a stable storage value for this scope.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Own => "own",
            Self::Department => "department",
            Self::Branch => "branch",
            Self::Global => "global",
        }
    }

    /// Returns all scopes from narrowest to widest.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[PermissionScope] = &[
            PermissionScope::Own,
            PermissionScope::Department,
            PermissionScope::Branch,
            PermissionScope::Global,
        ];

        ALL
    }

    fn rank(self) -> u8 {
        match self {
            Self::Own => 0,
            Self::Department => 1,
            Self::Branch => 2,
            Self::Global => 3,
        }
    }

    /// Returns whether a permission held at this scope authorizes a
    /// request at `requested` scope.
    #[must_use]
    pub fn authorizes(self, requested: Self) -> bool {
        self.rank() >= requested.rank()
    }
}

impl FromStr for PermissionScope {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "own" => Ok(Self::Own),
            "department" => Ok(Self::Department),
            "branch" => Ok(Self::Branch),
            "global" => Ok(Self::Global),
            _ => Err(AppError::Validation(format!(
                "unknown permission scope '{value}'"
            ))),
        }
    }
}

/// A scoped permission row administered at runtime.
///
/// Once referenced by an audit entry a permission is immutable; semantic
/// changes are modeled as new rows rather than in-place edits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    id: PermissionId,
    resource_type: NonEmptyString,
    action: NonEmptyString,
    scope: PermissionScope,
    name: NonEmptyString,
    condition: Option<Value>,
}

/// Input payload used to construct a validated permission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionInput {
    /// Stable permission identifier.
    pub id: PermissionId,
    /// Resource type the permission applies to.
    pub resource_type: String,
    /// Action the permission allows.
    pub action: String,
    /// Widest scope the permission grants.
    pub scope: PermissionScope,
    /// Human-readable permission name.
    pub name: String,
    /// Optional structured condition evaluated by the caller.
    pub condition: Option<Value>,
}

impl Permission {
    /// Creates a validated permission.
    pub fn new(input: PermissionInput) -> AppResult<Self> {
        let PermissionInput {
            id,
            resource_type,
            action,
            scope,
            name,
            condition,
        } = input;

        if let Some(condition) = &condition
            && !condition.is_object()
        {
            return Err(AppError::Validation(
                "permission condition must be a JSON object".to_owned(),
            ));
        }

        Ok(Self {
            id,
            resource_type: NonEmptyString::new(resource_type)?,
            action: NonEmptyString::new(action)?,
            scope,
            name: NonEmptyString::new(name)?,
            condition,
        })
    }

    /// Returns the permission identifier.
    #[must_use]
    pub fn id(&self) -> PermissionId {
        self.id
    }

    /// Returns the resource type the permission applies to.
    #[must_use]
    pub fn resource_type(&self) -> &str {
        self.resource_type.as_str()
    }

    /// Returns the action the permission allows.
    #[must_use]
    pub fn action(&self) -> &str {
        self.action.as_str()
    }

    /// Returns the widest scope the permission grants.
    #[must_use]
    pub fn scope(&self) -> PermissionScope {
        self.scope
    }

    /// Returns the human-readable permission name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the optional structured condition.
    #[must_use]
    pub fn condition(&self) -> Option<&Value> {
        self.condition.as_ref()
    }

    /// Returns whether the permission covers one capability request.
    #[must_use]
    pub fn covers(&self, resource_type: &str, action: &str, requested: PermissionScope) -> bool {
        self.resource_type.as_str() == resource_type
            && self.action.as_str() == action
            && self.scope.authorizes(requested)
    }
}
