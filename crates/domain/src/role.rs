use chrono::{DateTime, Utc};
use caura_core::{AppError, AppResult, NonEmptyString, PermissionId, RoleId, UserId};
use serde::{Deserialize, Serialize};

/// A named bundle of permissions assignable to users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    id: RoleId,
    name: NonEmptyString,
    display_name: NonEmptyString,
    is_system: bool,
}

impl Role {
    /// Creates a validated role.
    pub fn new(
        id: RoleId,
        name: impl Into<String>,
        display_name: impl Into<String>,
        is_system: bool,
    ) -> AppResult<Self> {
        Ok(Self {
            id,
            name: NonEmptyString::new(name)?,
            display_name: NonEmptyString::new(display_name)?,
            is_system,
        })
    }

    /// Returns the role identifier.
    #[must_use]
    pub fn id(&self) -> RoleId {
        self.id
    }

    /// Returns the unique role name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    /// Returns the user-facing role name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns whether the role is system-managed and undeletable.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.is_system
    }
}

/// A role assignment event linking a user to a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRole {
    /// User receiving the role.
    pub user_id: UserId,
    /// Assigned role.
    pub role_id: RoleId,
    /// Assignment timestamp.
    pub assigned_at: DateTime<Utc>,
    /// Actor that performed the assignment.
    pub assigned_by: UserId,
}

/// Direction of a direct permission override.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantState {
    /// Grants the permission independent of roles.
    Granted,
    /// Suppresses the permission regardless of role grants.
    Revoked,
}

impl GrantState {
    /// Returns a stable storage value for this state.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Granted => "granted",
            Self::Revoked => "revoked",
        }
    }
}

impl std::str::FromStr for GrantState {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "granted" => Ok(Self::Granted),
            "revoked" => Ok(Self::Revoked),
            _ => Err(AppError::Validation(format!(
                "unknown grant state '{value}'"
            ))),
        }
    }
}

/// A direct per-user permission override, independent of roles.
///
/// Overrides are deactivated rather than deleted so the grant history
/// stays reconstructible from storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserPermission {
    user_id: UserId,
    permission_id: PermissionId,
    state: GrantState,
    is_active: bool,
    expires_at: Option<DateTime<Utc>>,
}

/// Input payload used to construct a direct permission override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserPermissionInput {
    /// Target user.
    pub user_id: UserId,
    /// Permission being granted or revoked.
    pub permission_id: PermissionId,
    /// Override direction.
    pub state: GrantState,
    /// Optional expiry after which the override stops applying.
    pub expires_at: Option<DateTime<Utc>>,
}

impl UserPermission {
    /// Creates an active override.
    #[must_use]
    pub fn new(input: UserPermissionInput) -> Self {
        Self {
            user_id: input.user_id,
            permission_id: input.permission_id,
            state: input.state,
            is_active: true,
            expires_at: input.expires_at,
        }
    }

    /// Returns the target user.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the referenced permission.
    #[must_use]
    pub fn permission_id(&self) -> PermissionId {
        self.permission_id
    }

    /// Returns the override direction.
    #[must_use]
    pub fn state(&self) -> GrantState {
        self.state
    }

    /// Returns whether the override has been deactivated.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.is_active
    }

    /// Returns the optional expiry timestamp.
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Returns whether the override applies at `now`.
    #[must_use]
    pub fn is_effective(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.expires_at.is_none_or(|expiry| expiry > now)
    }

    /// Deactivates the override, preserving the row for history.
    pub fn deactivate(&mut self) {
        self.is_active = false;
    }
}
