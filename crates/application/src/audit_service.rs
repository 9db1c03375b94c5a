use std::sync::Arc;

use caura_core::{ActorContext, AppResult};
use caura_domain::{AuditTrailEntry, PermissionScope};

use crate::{AuditTrailQuery, AuditTrailReader, AuthorizationService, MAX_AUDIT_PAGE_SIZE};

/// Resource type gating audit trail reads.
pub const AUDIT_RESOURCE: &str = "audit";

/// Capability action required to read the audit trail.
pub const AUDIT_READ_ACTION: &str = "read";

/// Read service over the append-only audit trail.
///
/// The trail itself is written by the repositories inside mutation
/// transactions; this service only exposes filtered, paginated reads
/// to actors holding the `read` capability on the `audit` resource.
#[derive(Clone)]
pub struct AuditTrailService {
    reader: Arc<dyn AuditTrailReader>,
    authorization: AuthorizationService,
}

impl AuditTrailService {
    /// Creates an audit read service over a reader port and the
    /// permission evaluation engine.
    #[must_use]
    pub fn new(reader: Arc<dyn AuditTrailReader>, authorization: AuthorizationService) -> Self {
        Self {
            reader,
            authorization,
        }
    }

    /// Lists audit entries matching the query, newest first.
    ///
    /// The page size is clamped to [`MAX_AUDIT_PAGE_SIZE`]; a zero
    /// limit falls back to the default page size.
    pub async fn query(
        &self,
        actor: &ActorContext,
        mut query: AuditTrailQuery,
    ) -> AppResult<Vec<AuditTrailEntry>> {
        self.authorization
            .require(
                actor.user_id(),
                AUDIT_RESOURCE,
                AUDIT_READ_ACTION,
                PermissionScope::Own,
            )
            .await?;

        if query.limit == 0 {
            query.limit = AuditTrailQuery::default().limit;
        }
        query.limit = query.limit.min(MAX_AUDIT_PAGE_SIZE);

        self.reader.query_entries(query).await
    }
}
