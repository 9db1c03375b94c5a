//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod audit;
mod effective;
mod loan;
mod permission;
mod role;
mod template;
mod workflow;

pub use audit::{AuditAction, AuditTrailEntry};
pub use effective::{EffectivePermissionSet, PermissionDescriptor};
pub use loan::{
    LoanApplication, LoanApplicationSnapshot, NewLoanApplication, PriorityLevel, StageSignoff,
};
pub use permission::{APPLICATION_RESOURCE, Permission, PermissionInput, PermissionScope};
pub use role::{GrantState, Role, UserPermission, UserPermissionInput, UserRole};
pub use template::PermissionTemplate;
pub use workflow::{
    TransitionGate, TransitionPayload, TransitionRule, WorkflowStage, WorkflowStatus,
    transition_rule, valid_next_statuses,
};
