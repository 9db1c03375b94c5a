//! Shared primitives for all Rust crates in Caura.

#![forbid(unsafe_code)]

/// Actor identity primitives supplied by the session layer.
pub mod actor;
/// Typed identifiers for persisted entities.
pub mod id;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use actor::ActorContext;
pub use id::{ApplicationId, AuditEntryId, PermissionId, RoleId, TemplateId, UserId};

/// Result type used across Caura crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

impl Display for NonEmptyString {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// One rejected field in a transition payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldViolation {
    /// Payload field name.
    pub field: String,
    /// Human-readable rejection message.
    pub message: String,
}

impl FieldViolation {
    /// Creates a violation for one payload field.
    #[must_use]
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl Display for FieldViolation {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}: {}", self.field, self.message)
    }
}

fn join_violations(violations: &[FieldViolation]) -> String {
    violations
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Transition payload rejected with per-field violations.
    #[error("invalid payload: {}", join_violations(.0))]
    InvalidPayload(Vec<FieldViolation>),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Optimistic workflow status check failed against a concurrent
    /// mutation; the caller must refetch before retrying.
    #[error(
        "stale workflow status on application '{application_id}': expected '{expected}', found '{actual}'"
    )]
    StaleStatus {
        /// Application the caller attempted to transition.
        application_id: ApplicationId,
        /// Status the caller expected.
        expected: String,
        /// Status currently persisted.
        actual: String,
    },

    /// Actor lacks the required capability or scope.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Requested edge is absent from the workflow transition table.
    #[error(
        "invalid transition from '{from}' to '{to}'; valid next statuses: [{}]",
        valid_next.join(", ")
    )]
    InvalidTransition {
        /// Current persisted status.
        from: String,
        /// Requested target status.
        to: String,
        /// Statuses reachable from the current one.
        valid_next: Vec<String>,
    },

    /// Underlying store failed; the enclosing transaction rolled back.
    #[error("storage error: {0}")]
    Storage(String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns a stable kind label for presentation layers.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidPayload(_) => "invalid_payload",
            Self::NotFound(_) => "not_found",
            Self::Conflict(_) => "conflict",
            Self::StaleStatus { .. } => "stale_status",
            Self::Forbidden(_) => "forbidden",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::Storage(_) => "storage",
            Self::Internal(_) => "internal",
        }
    }
}
