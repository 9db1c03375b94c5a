use chrono::{DateTime, Utc};
use caura_core::{AppError, AppResult, ApplicationId, UserId};
use serde::{Deserialize, Serialize};

use crate::{TransitionPayload, TransitionRule, WorkflowStage, WorkflowStatus};

/// Urgency attached to an application at intake.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriorityLevel {
    /// Can wait behind normal work.
    Low,
    /// Default intake priority.
    #[default]
    Normal,
    /// Should be picked up ahead of normal work.
    High,
    /// Needs immediate attention.
    Urgent,
}

impl PriorityLevel {
    /// Returns a stable storage value for this priority.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Urgent => "urgent",
        }
    }
}

impl std::str::FromStr for PriorityLevel {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "low" => Ok(Self::Low),
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            "urgent" => Ok(Self::Urgent),
            _ => Err(AppError::Validation(format!(
                "unknown priority level '{value}'"
            ))),
        }
    }
}

/// Actor and timestamp recorded when a stage completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageSignoff {
    /// Actor that completed the stage.
    pub by: UserId,
    /// Completion timestamp.
    pub at: DateTime<Utc>,
}

/// Input payload for submitting a new application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLoanApplication {
    /// Stable application identifier.
    pub id: ApplicationId,
    /// Owning customer; only the owner can complete the draft.
    pub owner_id: UserId,
    /// Intake priority.
    pub priority: PriorityLevel,
    /// Submission timestamp.
    pub created_at: DateTime<Utc>,
}

/// Persistable snapshot of an application's workflow fields.
///
/// Infrastructure adapters read and write this shape; the aggregate
/// itself keeps its fields private so transitions stay the only
/// mutation path inside the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoanApplicationSnapshot {
    /// Stable application identifier.
    pub id: ApplicationId,
    /// Owning customer.
    pub owner_id: UserId,
    /// Current lifecycle status.
    pub status: WorkflowStatus,
    /// Coarse stage derived from the status.
    pub stage: WorkflowStage,
    /// Intake priority.
    pub priority: PriorityLevel,
    /// Reviewer pinned once a manager decides.
    pub assigned_reviewer: Option<UserId>,
    /// Actor that created the application.
    pub created_by: UserId,
    /// Submission timestamp.
    pub created_at: DateTime<Utc>,
    /// Customer completion signoff.
    pub user_completed: Option<StageSignoff>,
    /// Teller processing signoff.
    pub teller_processed: Option<StageSignoff>,
    /// Manager review signoff.
    pub manager_reviewed: Option<StageSignoff>,
    /// Disbursement account captured during processing.
    pub account_id: Option<String>,
    /// Approved amount in minor units.
    pub approved_amount_minor: Option<i64>,
    /// Approved term in months.
    pub approved_term_months: Option<i32>,
    /// Approved interest rate in basis points.
    pub interest_rate_bps: Option<i32>,
    /// Reason recorded on rejection.
    pub rejection_reason: Option<String>,
}

/// Aggregate root: a loan application's workflow-relevant state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoanApplication {
    snapshot: LoanApplicationSnapshot,
}

impl LoanApplication {
    /// Creates a freshly submitted application in `Draft`.
    #[must_use]
    pub fn submit(input: NewLoanApplication) -> Self {
        Self {
            snapshot: LoanApplicationSnapshot {
                id: input.id,
                owner_id: input.owner_id,
                status: WorkflowStatus::Draft,
                stage: WorkflowStatus::Draft.stage(),
                priority: input.priority,
                assigned_reviewer: None,
                created_by: input.owner_id,
                created_at: input.created_at,
                user_completed: None,
                teller_processed: None,
                manager_reviewed: None,
                account_id: None,
                approved_amount_minor: None,
                approved_term_months: None,
                interest_rate_bps: None,
                rejection_reason: None,
            },
        }
    }

    /// Rehydrates an aggregate from a persisted snapshot.
    ///
    /// Fails when the stored stage does not match the stored status, a
    /// sign of row corruption outside the core.
    pub fn from_snapshot(snapshot: LoanApplicationSnapshot) -> AppResult<Self> {
        if snapshot.stage != snapshot.status.stage() {
            return Err(AppError::Internal(format!(
                "application '{}' stage '{}' does not match status '{}'",
                snapshot.id,
                snapshot.stage.as_str(),
                snapshot.status.as_str()
            )));
        }

        Ok(Self { snapshot })
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn snapshot(&self) -> &LoanApplicationSnapshot {
        &self.snapshot
    }

    /// Consumes the aggregate and returns its snapshot.
    #[must_use]
    pub fn into_snapshot(self) -> LoanApplicationSnapshot {
        self.snapshot
    }

    /// Returns the application identifier.
    #[must_use]
    pub fn id(&self) -> ApplicationId {
        self.snapshot.id
    }

    /// Returns the owning customer.
    #[must_use]
    pub fn owner_id(&self) -> UserId {
        self.snapshot.owner_id
    }

    /// Returns the current lifecycle status.
    #[must_use]
    pub fn status(&self) -> WorkflowStatus {
        self.snapshot.status
    }

    /// Applies one validated transition edge.
    ///
    /// Callers must have checked the gate and validated the payload
    /// against `rule` first; this method only records the outcome.
    pub fn apply_transition(
        &mut self,
        rule: &TransitionRule,
        actor: UserId,
        at: DateTime<Utc>,
        payload: &TransitionPayload,
    ) {
        let signoff = StageSignoff { by: actor, at };

        match rule.to {
            WorkflowStatus::Draft => {}
            WorkflowStatus::UserCompleted => {
                self.snapshot.user_completed = Some(signoff);
            }
            WorkflowStatus::TellerProcessing => {
                self.snapshot.teller_processed = Some(signoff);
                if let Some(account_id) = payload.account_id.as_deref()
                    && !account_id.trim().is_empty()
                {
                    self.snapshot.account_id = Some(account_id.to_owned());
                }
            }
            WorkflowStatus::ManagerReview => {
                self.snapshot.teller_processed = Some(signoff);
                self.snapshot.account_id = payload.account_id.clone();
            }
            WorkflowStatus::Approved => {
                self.snapshot.manager_reviewed = Some(signoff);
                self.snapshot.assigned_reviewer.get_or_insert(actor);
                self.snapshot.approved_amount_minor = payload.approved_amount_minor;
                self.snapshot.approved_term_months = payload.approved_term_months;
                self.snapshot.interest_rate_bps = payload.interest_rate_bps;
            }
            WorkflowStatus::Rejected => {
                self.snapshot.manager_reviewed = Some(signoff);
                self.snapshot.assigned_reviewer.get_or_insert(actor);
                self.snapshot.rejection_reason = payload.rejection_reason.clone();
            }
        }

        self.snapshot.status = rule.to;
        self.snapshot.stage = rule.to.stage();
    }
}
