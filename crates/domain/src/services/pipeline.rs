//! The archive run: identity → destination → exports → retention.

use std::sync::Arc;

use tracing::info;
use validator::Validate;

use crate::error::ArchiveError;
use crate::models::{RunParameters, RunSummary};
use crate::services::clock::Clock;
use crate::services::export_driver::{ExportDriver, ExportOptions};
use crate::services::identity::{resolve_session, IdentityProvider};
use crate::services::provisioner::ensure_container;
use crate::services::retention::enforce_retention;
use crate::services::sql_export::SqlExportService;
use crate::services::storage::BlobStore;

/// Run policy knobs that are not part of the invocation parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub export: ExportOptions,
    /// Report expired blobs without deleting them.
    pub dry_run: bool,
}

/// Sequences one archive run over injected collaborators.
pub struct ArchivePipeline {
    identity: Arc<dyn IdentityProvider>,
    sql: Arc<dyn SqlExportService>,
    clock: Arc<dyn Clock>,
    options: RunOptions,
}

impl ArchivePipeline {
    pub fn new(
        identity: Arc<dyn IdentityProvider>,
        sql: Arc<dyn SqlExportService>,
        clock: Arc<dyn Clock>,
        options: RunOptions,
    ) -> Self {
        Self {
            identity,
            sql,
            clock,
            options,
        }
    }

    /// Runs every step once.
    ///
    /// Parameter, identity and provisioning errors abort the run. Export and
    /// deletion failures are collected in the returned summary.
    pub async fn run(
        &self,
        params: &RunParameters,
        store: &dyn BlobStore,
    ) -> Result<RunSummary, ArchiveError> {
        params.validate()?;

        let started_at = self.clock.now();
        let container = params.blob_container_name.as_str();

        info!(
            resource_group = %params.resource_group_name,
            identity_mode = %params.identity_mode,
            server = %params.sql_server_name,
            databases = params.database_names.len(),
            container = %container,
            retention_days = params.retention_days,
            "Archive run started"
        );

        let session = resolve_session(self.identity.as_ref(), params).await?;

        ensure_container(store, container).await?;

        let driver = ExportDriver::new(self.sql.as_ref(), self.clock.as_ref(), self.options.export);
        let exports = driver.export_all(&session, params, store, container).await;

        let retention = enforce_retention(
            store,
            container,
            params.retention_days,
            self.clock.now(),
            self.options.dry_run,
        )
        .await?;

        let summary = RunSummary {
            started_at,
            finished_at: self.clock.now(),
            container: container.to_string(),
            exports,
            retention,
        };

        info!(
            exports = summary.exports.len(),
            exports_failed = summary.exports_failed(),
            exports_in_progress = summary.exports_in_progress(),
            blobs_deleted = summary.retention.deleted.len(),
            deletions_failed = summary.retention.failed.len(),
            "Archive run completed"
        );

        Ok(summary)
    }
}
