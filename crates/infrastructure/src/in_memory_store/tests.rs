use std::sync::Arc;

use chrono::Utc;
use caura_application::{
    AuditTrailQuery, AuditTrailService, AuthorizationRepository, AuthorizationService,
    TemplateTarget, WorkflowService, admin_actions, USER_RESOURCE,
};
use caura_core::{
    ActorContext, AppError, AuditEntryId, PermissionId, RoleId, TemplateId, UserId,
};
use caura_domain::{
    AuditAction, AuditTrailEntry, Permission, PermissionInput, PermissionScope,
    PermissionTemplate, PriorityLevel, Role, TransitionPayload, UserRole, WorkflowStatus,
};

use super::InMemoryStore;

struct Stack {
    store: Arc<InMemoryStore>,
    authorization: AuthorizationService,
    workflow: WorkflowService,
    audit: AuditTrailService,
    admin: ActorContext,
}

fn permission(resource_type: &str, action: &str, scope: PermissionScope) -> Permission {
    let result = Permission::new(PermissionInput {
        id: PermissionId::new(),
        resource_type: resource_type.to_owned(),
        action: action.to_owned(),
        scope,
        name: format!("{resource_type}.{action}"),
        condition: None,
    });
    match result {
        Ok(permission) => permission,
        Err(error) => panic!("permission fixture failed: {error}"),
    }
}

fn role(name: &str) -> Role {
    match Role::new(RoleId::new(), name, name, false) {
        Ok(role) => role,
        Err(error) => panic!("role fixture failed: {error}"),
    }
}

/// Wires the full service stack over one in-memory store, with an
/// admin seeded through a role holding every administrative and audit
/// capability.
async fn stack() -> Stack {
    let store = Arc::new(InMemoryStore::new());
    let admin = UserId::new();
    let admin_role = role("administrator");
    store.seed_user(admin).await;
    for (resource, action) in [
        (USER_RESOURCE, admin_actions::ASSIGN_ROLE),
        (USER_RESOURCE, admin_actions::GRANT_PERMISSION),
        (USER_RESOURCE, admin_actions::REVOKE_PERMISSION),
        (USER_RESOURCE, admin_actions::APPLY_TEMPLATE),
        ("audit", "read"),
    ] {
        let capability = permission(resource, action, PermissionScope::Global);
        store
            .seed_role_permission(admin_role.id(), capability.id())
            .await;
        store.seed_permission(capability).await;
    }
    store
        .seed_user_role(UserRole {
            user_id: admin,
            role_id: admin_role.id(),
            assigned_at: Utc::now(),
            assigned_by: admin,
        })
        .await;
    store.seed_role(admin_role).await;

    let authorization = AuthorizationService::new(store.clone());
    let workflow = WorkflowService::new(store.clone(), authorization.clone());
    let audit = AuditTrailService::new(store.clone(), authorization.clone());
    Stack {
        store,
        authorization,
        workflow,
        audit,
        admin: ActorContext::new(admin, Some("127.0.0.1".to_owned())),
    }
}

fn template_entry(target: UserId) -> AuditTrailEntry {
    AuditTrailEntry {
        id: AuditEntryId::new(),
        action: AuditAction::TemplateApplied,
        entity_type: "user".to_owned(),
        entity_id: target.to_string(),
        actor_id: UserId::new(),
        target_user_id: Some(target),
        target_role_id: None,
        permission_id: None,
        details: serde_json::json!({}),
        reason: None,
        ip_address: None,
        recorded_at: Utc::now(),
    }
}

#[tokio::test]
async fn repeated_template_grant_rows_keep_one_active_override() {
    let store = InMemoryStore::new();
    let teller = UserId::new();
    let permission_id = PermissionId::new();

    for _ in 0..2 {
        let applied = store
            .apply_template_grants(
                TemplateTarget::User(teller),
                teller,
                vec![permission_id],
                template_entry(teller),
            )
            .await;
        assert_eq!(applied.ok(), Some(()));
    }

    let granted = store
        .list_granted_permission_ids(TemplateTarget::User(teller))
        .await;
    assert_eq!(granted.ok(), Some(vec![permission_id]));
}

#[tokio::test]
async fn assigned_role_takes_effect_through_the_store() {
    let stack = stack().await;
    let teller = UserId::new();
    stack.store.seed_user(teller).await;
    let teller_role = role("teller");
    let process = permission("application", "process", PermissionScope::Branch);
    stack
        .store
        .seed_role_permission(teller_role.id(), process.id())
        .await;
    stack.store.seed_permission(process).await;
    let teller_role_id = teller_role.id();
    stack.store.seed_role(teller_role).await;

    assert!(
        !stack
            .authorization
            .can(teller, "application", "process", PermissionScope::Own)
            .await
    );

    let assigned = stack
        .authorization
        .assign_role(&stack.admin, teller, teller_role_id, None)
        .await;
    assert_eq!(assigned.ok(), Some(()));
    assert!(
        stack
            .authorization
            .can(teller, "application", "process", PermissionScope::Branch)
            .await
    );
}

#[tokio::test]
async fn template_grants_survive_revoke_of_unrelated_permission() {
    let stack = stack().await;
    let teller = UserId::new();
    stack.store.seed_user(teller).await;
    let process = permission("application", "process", PermissionScope::Branch);
    let approve = permission("application", "approve", PermissionScope::Branch);
    let process_id = process.id();
    let approve_id = approve.id();
    let template = match PermissionTemplate::new(
        TemplateId::new(),
        "teller-onboarding",
        vec![process_id, approve_id],
    ) {
        Ok(template) => template,
        Err(error) => panic!("template fixture failed: {error}"),
    };
    let template_id = template.id();
    stack.store.seed_permission(process).await;
    stack.store.seed_permission(approve).await;
    stack.store.seed_template(template).await;

    let applied = stack
        .authorization
        .apply_template(&stack.admin, template_id, TemplateTarget::User(teller), None)
        .await;
    assert_eq!(applied.ok(), Some(()));

    let revoked = stack
        .authorization
        .revoke_permission(&stack.admin, teller, approve_id, None)
        .await;
    assert_eq!(revoked.ok(), Some(()));

    assert!(
        stack
            .authorization
            .can(teller, "application", "process", PermissionScope::Branch)
            .await
    );
    assert!(
        !stack
            .authorization
            .can(teller, "application", "approve", PermissionScope::Own)
            .await
    );
}

#[tokio::test]
async fn racing_decisions_commit_exactly_once() {
    let stack = stack().await;
    let owner = ActorContext::new(UserId::new(), None);
    let staff = UserId::new();
    stack.store.seed_user(staff).await;
    let staff_role = role("branch-staff");
    for action in ["process", "approve", "reject"] {
        let capability = permission("application", action, PermissionScope::Branch);
        stack
            .store
            .seed_role_permission(staff_role.id(), capability.id())
            .await;
        stack.store.seed_permission(capability).await;
    }
    stack
        .store
        .seed_user_role(UserRole {
            user_id: staff,
            role_id: staff_role.id(),
            assigned_at: Utc::now(),
            assigned_by: staff,
        })
        .await;
    stack.store.seed_role(staff_role).await;
    let staff = ActorContext::new(staff, None);

    let created = match stack
        .workflow
        .create_application(&owner, PriorityLevel::Urgent)
        .await
    {
        Ok(snapshot) => snapshot,
        Err(error) => panic!("create failed: {error}"),
    };
    let application_id = created.id;
    let steps = [
        (&owner, WorkflowStatus::UserCompleted, TransitionPayload::default()),
        (&staff, WorkflowStatus::TellerProcessing, TransitionPayload::default()),
        (
            &staff,
            WorkflowStatus::ManagerReview,
            TransitionPayload {
                account_id: Some("ACC-42".to_owned()),
                ..TransitionPayload::default()
            },
        ),
    ];
    let mut observed = created.status;
    for (actor, to, payload) in steps {
        let result = stack
            .workflow
            .transition(actor, application_id, to, observed, payload)
            .await;
        if let Err(error) = result {
            panic!("pipeline step failed: {error}");
        }
        observed = to;
    }

    let approve = tokio::spawn({
        let workflow = stack.workflow.clone();
        let staff = staff.clone();
        async move {
            workflow
                .transition(
                    &staff,
                    application_id,
                    WorkflowStatus::Approved,
                    WorkflowStatus::ManagerReview,
                    TransitionPayload {
                        approved_amount_minor: Some(1_000_000),
                        approved_term_months: Some(24),
                        interest_rate_bps: Some(650),
                        ..TransitionPayload::default()
                    },
                )
                .await
        }
    });
    let reject = tokio::spawn({
        let workflow = stack.workflow.clone();
        let staff = staff.clone();
        async move {
            workflow
                .transition(
                    &staff,
                    application_id,
                    WorkflowStatus::Rejected,
                    WorkflowStatus::ManagerReview,
                    TransitionPayload {
                        rejection_reason: Some("Duplicate submission".to_owned()),
                        ..TransitionPayload::default()
                    },
                )
                .await
        }
    });

    let outcomes = match (approve.await, reject.await) {
        (Ok(approve), Ok(reject)) => [approve, reject],
        _ => panic!("transition task panicked"),
    };
    let committed = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
    let stale = outcomes
        .iter()
        .filter(|outcome| matches!(outcome, Err(AppError::StaleStatus { .. })))
        .count();
    assert_eq!(committed, 1);
    assert_eq!(stale, 1);

    let snapshot = stack
        .workflow
        .application_state(&staff, application_id)
        .await;
    match snapshot {
        Ok(snapshot) => assert!(snapshot.status.is_terminal()),
        Err(error) => panic!("state read failed: {error}"),
    }
}

#[tokio::test]
async fn audit_queries_filter_and_paginate() {
    let stack = stack().await;
    let teller = UserId::new();
    stack.store.seed_user(teller).await;
    let process = permission("application", "process", PermissionScope::Branch);
    let process_id = process.id();
    stack.store.seed_permission(process).await;

    let granted = stack
        .authorization
        .grant_permission(&stack.admin, teller, process_id, None, None)
        .await;
    assert_eq!(granted.ok(), Some(()));
    let revoked = stack
        .authorization
        .revoke_permission(&stack.admin, teller, process_id, None)
        .await;
    assert_eq!(revoked.ok(), Some(()));

    let all = stack
        .audit
        .query(&stack.admin, AuditTrailQuery::default())
        .await;
    match all {
        Ok(entries) => {
            assert_eq!(entries.len(), 2);
            // Newest first.
            assert_eq!(entries[0].action, AuditAction::PermissionRevoked);
        }
        Err(error) => panic!("audit query failed: {error}"),
    }

    let grants_only = stack
        .audit
        .query(
            &stack.admin,
            AuditTrailQuery {
                action: Some(AuditAction::PermissionGranted),
                ..AuditTrailQuery::default()
            },
        )
        .await;
    assert_eq!(
        grants_only.map(|entries| entries.len()).ok(),
        Some(1)
    );

    let outsider = ActorContext::new(teller, None);
    let denied = stack
        .audit
        .query(&outsider, AuditTrailQuery::default())
        .await;
    assert!(matches!(denied, Err(AppError::Forbidden(_))));
}
