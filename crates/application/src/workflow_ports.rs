use async_trait::async_trait;
use caura_core::{AppResult, ApplicationId};
use caura_domain::{AuditTrailEntry, LoanApplicationSnapshot, WorkflowStatus};

/// Repository port for loan application workflow state.
///
/// Mutations persist the snapshot together with the given audit entry
/// in one transaction. Transitions are serialized per application by
/// the compare-and-swap on the expected status.
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    /// Persists a freshly submitted application and its audit entry.
    async fn insert_application(
        &self,
        snapshot: LoanApplicationSnapshot,
        entry: AuditTrailEntry,
    ) -> AppResult<()>;

    /// Returns one application's workflow snapshot.
    async fn find_application(
        &self,
        application_id: ApplicationId,
    ) -> AppResult<Option<LoanApplicationSnapshot>>;

    /// Persists a transitioned snapshot, guarded by the status the
    /// caller observed.
    ///
    /// When the persisted status no longer equals `expected_status`
    /// the write must not happen and `AppError::StaleStatus` is
    /// returned; of two racing transitions exactly one commits.
    async fn update_workflow(
        &self,
        expected_status: WorkflowStatus,
        snapshot: LoanApplicationSnapshot,
        entry: AuditTrailEntry,
    ) -> AppResult<()>;
}
