use std::str::FromStr;

use caura_core::{AppError, FieldViolation};
use serde::{Deserialize, Serialize};

use crate::PermissionScope;

/// Loan application lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Customer is still filling in the application.
    Draft,
    /// Customer finished the application and handed it off.
    UserCompleted,
    /// Teller is processing the application.
    TellerProcessing,
    /// Manager is reviewing the processed application.
    ManagerReview,
    /// Terminal: the application was approved.
    Approved,
    /// Terminal: the application was rejected.
    Rejected,
}

impl WorkflowStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::UserCompleted => "user_completed",
            Self::TellerProcessing => "teller_processing",
            Self::ManagerReview => "manager_review",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Returns whether no further transition leaves this status.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }

    /// Returns the coarse stage the status belongs to.
    #[must_use]
    pub fn stage(&self) -> WorkflowStage {
        match self {
            Self::Draft => WorkflowStage::Customer,
            Self::UserCompleted | Self::TellerProcessing => WorkflowStage::Teller,
            Self::ManagerReview => WorkflowStage::Manager,
            Self::Approved | Self::Rejected => WorkflowStage::Closed,
        }
    }
}

impl FromStr for WorkflowStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "draft" => Ok(Self::Draft),
            "user_completed" => Ok(Self::UserCompleted),
            "teller_processing" => Ok(Self::TellerProcessing),
            "manager_review" => Ok(Self::ManagerReview),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(AppError::Validation(format!(
                "unknown workflow status '{value}'"
            ))),
        }
    }
}

/// Coarse processing stage derived from the status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStage {
    /// Application is with the customer.
    Customer,
    /// Application is with a teller.
    Teller,
    /// Application is with a manager.
    Manager,
    /// Application reached a terminal decision.
    Closed,
}

impl WorkflowStage {
    /// Returns a stable storage value for this stage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Customer => "customer",
            Self::Teller => "teller",
            Self::Manager => "manager",
            Self::Closed => "closed",
        }
    }
}

/// Who may drive a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionGate {
    /// Only the application owner.
    Owner,
    /// Any actor holding the capability on the `application` resource
    /// at the given requested scope or wider.
    Capability {
        /// Required capability action.
        action: &'static str,
        /// Scope the capability is requested at.
        scope: PermissionScope,
    },
}

/// One directed edge in the workflow transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionRule {
    /// Status the edge leaves.
    pub from: WorkflowStatus,
    /// Status the edge enters.
    pub to: WorkflowStatus,
    /// Gate controlling who may drive the edge.
    pub gate: TransitionGate,
}

/// Stage payload carried by a transition request.
///
/// Monetary amounts are in minor currency units; interest rates are in
/// signed basis points.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionPayload {
    /// Disbursement account, required before manager review.
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

const TRANSITIONS: &[TransitionRule] = &[
    TransitionRule {
        from: WorkflowStatus::Draft,
        to: WorkflowStatus::UserCompleted,
        gate: TransitionGate::Owner,
    },
    TransitionRule {
        from: WorkflowStatus::UserCompleted,
        to: WorkflowStatus::TellerProcessing,
        gate: TransitionGate::Capability {
            action: "process",
            scope: PermissionScope::Branch,
        },
    },
    // Idempotent teller self-save: the edge re-enters the same status.
    TransitionRule {
        from: WorkflowStatus::TellerProcessing,
        to: WorkflowStatus::TellerProcessing,
        gate: TransitionGate::Capability {
            action: "process",
            scope: PermissionScope::Branch,
        },
    },
    TransitionRule {
        from: WorkflowStatus::TellerProcessing,
        to: WorkflowStatus::ManagerReview,
        gate: TransitionGate::Capability {
            action: "process",
            scope: PermissionScope::Branch,
        },
    },
    TransitionRule {
        from: WorkflowStatus::ManagerReview,
        to: WorkflowStatus::Approved,
        gate: TransitionGate::Capability {
            action: "approve",
            scope: PermissionScope::Branch,
        },
    },
    TransitionRule {
        from: WorkflowStatus::ManagerReview,
        to: WorkflowStatus::Rejected,
        gate: TransitionGate::Capability {
            action: "reject",
            scope: PermissionScope::Branch,
        },
    },
];

/// Returns the rule for one `(from, to)` edge, if the edge exists.
#[must_use]
pub fn transition_rule(from: WorkflowStatus, to: WorkflowStatus) -> Option<&'static TransitionRule> {
    TRANSITIONS
        .iter()
        .find(|rule| rule.from == from && rule.to == to)
}

/// Returns the statuses reachable from `from`, excluding the self-save
/// edge, in table order.
#[must_use]
pub fn valid_next_statuses(from: WorkflowStatus) -> Vec<WorkflowStatus> {
    TRANSITIONS
        .iter()
        .filter(|rule| rule.from == from && rule.to != rule.from)
        .map(|rule| rule.to)
        .collect()
}

impl TransitionRule {
    /// Validates the payload against this edge's rules.
    ///
    /// All violations are collected before returning so callers can
    /// report every offending field at once.
    #[must_use]
    pub fn validate_payload(&self, payload: &TransitionPayload) -> Vec<FieldViolation> {
        let mut violations = Vec::new();

        match (self.from, self.to) {
            (WorkflowStatus::TellerProcessing, WorkflowStatus::ManagerReview) => {
                if payload
                    .account_id
                    .as_deref()
                    .is_none_or(|value| value.trim().is_empty())
                {
                    violations.push(FieldViolation::new(
                        "account_id",
                        "a non-empty disbursement account is required before manager review",
                    ));
                }
            }
            (WorkflowStatus::ManagerReview, WorkflowStatus::Approved) => {
                match payload.approved_amount_minor {
                    Some(amount) if amount > 0 => {}
                    Some(_) => violations.push(FieldViolation::new(
                        "approved_amount",
                        "approved amount must be positive",
                    )),
                    None => violations.push(FieldViolation::new(
                        "approved_amount",
                        "approved amount is required",
                    )),
                }

                match payload.approved_term_months {
                    Some(term) if term > 0 => {}
                    Some(_) => violations.push(FieldViolation::new(
                        "approved_term",
                        "approved term must be positive",
                    )),
                    None => violations.push(FieldViolation::new(
                        "approved_term",
                        "approved term is required",
                    )),
                }

                match payload.interest_rate_bps {
                    Some(rate) if rate >= 0 => {}
                    Some(_) => violations.push(FieldViolation::new(
                        "interest_rate",
                        "interest rate must not be negative",
                    )),
                    None => violations.push(FieldViolation::new(
                        "interest_rate",
                        "interest rate is required",
                    )),
                }
            }
            (WorkflowStatus::ManagerReview, WorkflowStatus::Rejected) => {
                if payload
                    .rejection_reason
                    .as_deref()
                    .is_none_or(|value| value.trim().is_empty())
                {
                    violations.push(FieldViolation::new(
                        "reason",
                        "a non-empty rejection reason is required",
                    ));
                }
            }
            // Remaining edges carry no required payload fields;
            // account_id stays optional while the teller processes.
            _ => {}
        }

        violations
    }
}
