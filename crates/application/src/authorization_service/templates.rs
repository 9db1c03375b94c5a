use chrono::Utc;
use caura_core::{ActorContext, AppError, AppResult, AuditEntryId, TemplateId};
use caura_domain::{AuditAction, AuditTrailEntry, PermissionScope};
use serde_json::json;

use super::{AuthorizationService, USER_RESOURCE, admin_actions};
use crate::TemplateTarget;

impl AuthorizationService {
    /// Applies a permission template to a user or role.
    ///
    /// Requires the `apply_template` capability on the `user` resource.
    /// Only the permissions the target does not already hold are
    /// granted; when the target already holds every referenced
    /// permission the call succeeds without writing anything, so
    /// re-applying a template is safe.
    pub async fn apply_template(
        &self,
        actor: &ActorContext,
        template_id: TemplateId,
        target: TemplateTarget,
        reason: Option<String>,
    ) -> AppResult<()> {
        self.require(
            actor.user_id(),
            USER_RESOURCE,
            admin_actions::APPLY_TEMPLATE,
            PermissionScope::Own,
        )
        .await?;
        // Held across the held-set read and the grant write.
        let _write_guard = self
            .lock_target_writes(format!("{}:{}", target.kind(), target.id_string()))
            .await;

        let Some(template) = self.repository.find_template(template_id).await? else {
            return Err(AppError::NotFound(format!(
                "template '{template_id}' not found"
            )));
        };
        match target {
            TemplateTarget::User(user_id) => {
                if !self.repository.user_exists(user_id).await? {
                    return Err(AppError::NotFound(format!("user '{user_id}' not found")));
                }
            }
            TemplateTarget::Role(role_id) => {
                if self.repository.find_role(role_id).await?.is_none() {
                    return Err(AppError::NotFound(format!("role '{role_id}' not found")));
                }
            }
        }

        let held = self.repository.list_granted_permission_ids(target).await?;
        let missing: Vec<_> = template
            .permission_ids()
            .iter()
            .copied()
            .filter(|permission_id| !held.contains(permission_id))
            .collect();
        if missing.is_empty() {
            return Ok(());
        }

        let now = Utc::now();
        let entry = AuditTrailEntry {
            id: AuditEntryId::new(),
            action: AuditAction::TemplateApplied,
            entity_type: target.kind().to_owned(),
            entity_id: target.id_string(),
            actor_id: actor.user_id(),
            target_user_id: match target {
                TemplateTarget::User(user_id) => Some(user_id),
                TemplateTarget::Role(_) => None,
            },
            target_role_id: match target {
                TemplateTarget::Role(role_id) => Some(role_id),
                TemplateTarget::User(_) => None,
            },
            permission_id: None,
            details: json!({
                "template": template.name(),
                "granted": missing
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
            }),
            reason,
            ip_address: actor.ip_address().map(str::to_owned),
            recorded_at: now,
        };

        self.repository
            .apply_template_grants(target, actor.user_id(), missing, entry)
            .await?;
        if let TemplateTarget::User(user_id) = target {
            self.invalidate_cache(user_id).await;
        }
        Ok(())
    }
}
