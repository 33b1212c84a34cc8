//! SQL export collaborator.

use crate::error::ArchiveError;
use crate::models::{ExportProgress, ExportRequest, OperationHandle};
use crate::services::identity::Session;

/// Submits database exports and queries their status.
#[async_trait::async_trait]
pub trait SqlExportService: Send + Sync {
    /// Submits an export. Returns `ExportSubmission` if the server rejects it.
    async fn submit_export(
        &self,
        session: &Session,
        request: &ExportRequest,
    ) -> Result<OperationHandle, ArchiveError>;

    /// Queries the current status of a submitted export once.
    async fn export_status(
        &self,
        session: &Session,
        operation: &OperationHandle,
    ) -> Result<ExportProgress, ArchiveError>;
}
