use async_trait::async_trait;
use chrono::{DateTime, Utc};
use caura_core::{AppResult, UserId};
use caura_domain::{AuditAction, AuditTrailEntry};

/// Upper bound on one audit page, enforced by the service.
pub const MAX_AUDIT_PAGE_SIZE: usize = 200;

/// Filterable, offset-paginated audit trail query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditTrailQuery {
    /// Optional action filter.
    pub action: Option<AuditAction>,
    /// Optional entity type filter.
    pub entity_type: Option<String>,
    /// Optional entity id filter.
    pub entity_id: Option<String>,
    /// Optional actor filter.
    pub actor_id: Option<UserId>,
    /// Lower bound on the record timestamp, inclusive.
    pub recorded_after: Option<DateTime<Utc>>,
    /// Upper bound on the record timestamp, exclusive.
    pub recorded_before: Option<DateTime<Utc>>,
    /// Maximum rows returned.
    pub limit: usize,
    /// Rows skipped for offset pagination.
    pub offset: usize,
}

impl Default for AuditTrailQuery {
    fn default() -> Self {
        Self {
            action: None,
            entity_type: None,
            entity_id: None,
            actor_id: None,
            recorded_after: None,
            recorded_before: None,
            limit: 50,
            offset: 0,
        }
    }
}

/// Read-only port over the append-only audit trail.
#[async_trait]
pub trait AuditTrailReader: Send + Sync {
    /// Lists matching entries ordered by record timestamp descending.
    async fn query_entries(&self, query: AuditTrailQuery) -> AppResult<Vec<AuditTrailEntry>>;
}
