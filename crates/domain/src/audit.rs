use std::str::FromStr;

use chrono::{DateTime, Utc};
use caura_core::{AppError, AuditEntryId, PermissionId, RoleId, UserId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Stable audit actions emitted by the core's guarded mutations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Emitted when a role is assigned to a user.
    RoleAssigned,
    /// Emitted when a permission is granted directly to a user.
    PermissionGranted,
    /// Emitted when a permission is revoked from a user.
    PermissionRevoked,
    /// Emitted when a template's permissions are applied.
    TemplateApplied,
    /// Emitted when a loan application is submitted.
    ApplicationCreated,
    /// Emitted when a workflow status transition commits.
    ApplicationTransitioned,
    /// Emitted when a teller self-save persists without a status change.
    ApplicationSaved,
}

impl AuditAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoleAssigned => "security.role.assigned",
            Self::PermissionGranted => "security.permission.granted",
            Self::PermissionRevoked => "security.permission.revoked",
            Self::TemplateApplied => "security.template.applied",
            Self::ApplicationCreated => "workflow.application.created",
            Self::ApplicationTransitioned => "workflow.application.transitioned",
            Self::ApplicationSaved => "workflow.application.saved",
        }
    }
}

impl FromStr for AuditAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "security.role.assigned" => Ok(Self::RoleAssigned),
            "security.permission.granted" => Ok(Self::PermissionGranted),
            "security.permission.revoked" => Ok(Self::PermissionRevoked),
            "security.template.applied" => Ok(Self::TemplateApplied),
            "workflow.application.created" => Ok(Self::ApplicationCreated),
            "workflow.application.transitioned" => Ok(Self::ApplicationTransitioned),
            "workflow.application.saved" => Ok(Self::ApplicationSaved),
            _ => Err(AppError::Validation(format!(
                "unknown audit action '{value}'"
            ))),
        }
    }
}

/// Immutable record of one permission or workflow mutation.
///
/// Entries are appended in the same transaction as the mutation they
/// document and are never updated or deleted by this core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditTrailEntry {
    /// Stable entry identifier.
    pub id: AuditEntryId,
    /// Action the entry documents.
    pub action: AuditAction,
    /// Mutated entity type label.
    pub entity_type: String,
    /// Mutated entity identifier.
    pub entity_id: String,
    /// Actor that performed the mutation.
    pub actor_id: UserId,
    /// Affected user, when the mutation targets a user.
    pub target_user_id: Option<UserId>,
    /// Affected role, when the mutation targets a role.
    pub target_role_id: Option<RoleId>,
    /// Referenced permission, when one is involved.
    pub permission_id: Option<PermissionId>,
    /// Structured before/after detail.
    pub details: Value,
    /// Reason supplied by the actor.
    pub reason: Option<String>,
    /// Source address from the actor's session, if known.
    pub ip_address: Option<String>,
    /// Record timestamp.
    pub recorded_at: DateTime<Utc>,
}
