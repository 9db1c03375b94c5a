use std::sync::Arc;

use chrono::Utc;
use caura_core::{
    ActorContext, AppError, AppResult, ApplicationId, AuditEntryId,
};
use caura_domain::{
    APPLICATION_RESOURCE, AuditAction, AuditTrailEntry, LoanApplication, LoanApplicationSnapshot,
    NewLoanApplication, PermissionScope, PriorityLevel, TransitionGate, TransitionPayload,
    WorkflowStatus, transition_rule, valid_next_statuses,
};
use serde_json::json;

use crate::{ApplicationRepository, AuthorizationService};

/// Workflow state machine service for loan applications.
///
/// All status changes go through [`WorkflowService::transition`], which
/// checks the edge, the gate, and the payload before handing the new
/// snapshot to the repository under a compare-and-swap on the observed
/// status.
#[derive(Clone)]
pub struct WorkflowService {
    repository: Arc<dyn ApplicationRepository>,
    authorization: AuthorizationService,
}

impl WorkflowService {
    /// Creates a workflow service over a repository and the permission
    /// evaluation engine.
    #[must_use]
    pub fn new(
        repository: Arc<dyn ApplicationRepository>,
        authorization: AuthorizationService,
    ) -> Self {
        Self {
            repository,
            authorization,
        }
    }

    /// Submits a new application owned by the actor, starting in
    /// `Draft`.
    pub async fn create_application(
        &self,
        actor: &ActorContext,
        priority: PriorityLevel,
    ) -> AppResult<LoanApplicationSnapshot> {
        let now = Utc::now();
        let application = LoanApplication::submit(NewLoanApplication {
            id: ApplicationId::new(),
            owner_id: actor.user_id(),
            priority,
            created_at: now,
        });
        let snapshot = application.into_snapshot();

        let entry = AuditTrailEntry {
            id: AuditEntryId::new(),
            action: AuditAction::ApplicationCreated,
            entity_type: "loan_application".to_owned(),
            entity_id: snapshot.id.to_string(),
            actor_id: actor.user_id(),
            target_user_id: Some(snapshot.owner_id),
            target_role_id: None,
            permission_id: None,
            details: json!({ "priority": snapshot.priority.as_str() }),
            reason: None,
            ip_address: actor.ip_address().map(str::to_owned),
            recorded_at: now,
        };

        self.repository
            .insert_application(snapshot.clone(), entry)
            .await?;
        tracing::info!(application_id = %snapshot.id, owner_id = %snapshot.owner_id, "application submitted");
        Ok(snapshot)
    }

    /// Returns one application's workflow state.
    ///
    /// Visible to the owner and to actors holding the `process`,
    /// `approve` or `reject` capability on applications.
    pub async fn application_state(
        &self,
        actor: &ActorContext,
        application_id: ApplicationId,
    ) -> AppResult<LoanApplicationSnapshot> {
        let Some(snapshot) = self.repository.find_application(application_id).await? else {
            return Err(AppError::NotFound(format!(
                "application '{application_id}' not found"
            )));
        };

        if snapshot.owner_id == actor.user_id() {
            return Ok(snapshot);
        }
        for action in ["process", "approve", "reject"] {
            if self
                .authorization
                .can(
                    actor.user_id(),
                    APPLICATION_RESOURCE,
                    action,
                    PermissionScope::Branch,
                )
                .await
            {
                return Ok(snapshot);
            }
        }
        Err(AppError::Forbidden(format!(
            "actor '{}' may not view application '{application_id}'",
            actor.user_id()
        )))
    }

    /// Drives one workflow transition, including the teller self-save
    /// edge where `to` equals the current status.
    ///
    /// `expected_from` is the status the caller last observed and acts
    /// as an optimistic lock: when it no longer matches, nothing is
    /// evaluated and a stale-status conflict is returned so the caller
    /// can reload. Checks run in a fixed order: existence, staleness,
    /// edge, gate, payload. The repository re-checks the status on
    /// write, so of two racing transitions exactly one commits.
    pub async fn transition(
        &self,
        actor: &ActorContext,
        application_id: ApplicationId,
        to: WorkflowStatus,
        expected_from: WorkflowStatus,
        payload: TransitionPayload,
    ) -> AppResult<LoanApplicationSnapshot> {
        let Some(stored) = self.repository.find_application(application_id).await? else {
            return Err(AppError::NotFound(format!(
                "application '{application_id}' not found"
            )));
        };
        let mut application = LoanApplication::from_snapshot(stored)?;
        let from = application.status();

        if expected_from != from {
            return Err(AppError::StaleStatus {
                application_id,
                expected: expected_from.as_str().to_owned(),
                actual: from.as_str().to_owned(),
            });
        }

        let Some(rule) = transition_rule(from, to) else {
            return Err(AppError::InvalidTransition {
                from: from.as_str().to_owned(),
                to: to.as_str().to_owned(),
                valid_next: valid_next_statuses(from)
                    .into_iter()
                    .map(|status| status.as_str().to_owned())
                    .collect(),
            });
        };

        match rule.gate {
            TransitionGate::Owner => {
                if application.owner_id() != actor.user_id() {
                    return Err(AppError::Forbidden(format!(
                        "only the owner may move application '{application_id}' out of '{}'",
                        from.as_str()
                    )));
                }
            }
            TransitionGate::Capability { action, scope } => {
                if !self
                    .authorization
                    .can(actor.user_id(), APPLICATION_RESOURCE, action, scope)
                    .await
                {
                    return Err(AppError::Forbidden(format!(
                        "actor '{}' is missing capability '{action}' on '{APPLICATION_RESOURCE}'",
                        actor.user_id()
                    )));
                }
            }
        }

        let violations = rule.validate_payload(&payload);
        if !violations.is_empty() {
            return Err(AppError::InvalidPayload(violations));
        }

        let now = Utc::now();
        application.apply_transition(rule, actor.user_id(), now, &payload);
        let snapshot = application.into_snapshot();

        let action = if from == to {
            AuditAction::ApplicationSaved
        } else {
            AuditAction::ApplicationTransitioned
        };
        let entry = AuditTrailEntry {
            id: AuditEntryId::new(),
            action,
            entity_type: "loan_application".to_owned(),
            entity_id: application_id.to_string(),
            actor_id: actor.user_id(),
            target_user_id: Some(snapshot.owner_id),
            target_role_id: None,
            permission_id: None,
            details: json!({
                "from": from.as_str(),
                "to": to.as_str(),
                "account_id": snapshot.account_id,
                "approved_amount_minor": snapshot.approved_amount_minor,
                "approved_term_months": snapshot.approved_term_months,
                "interest_rate_bps": snapshot.interest_rate_bps,
            }),
            reason: payload.rejection_reason.clone(),
            ip_address: actor.ip_address().map(str::to_owned),
            recorded_at: now,
        };

        self.repository
            .update_workflow(from, snapshot.clone(), entry)
            .await?;
        tracing::info!(
            application_id = %application_id,
            from = from.as_str(),
            to = to.as_str(),
            actor_id = %actor.user_id(),
            "workflow transition committed"
        );
        Ok(snapshot)
    }
}
