//! Wires the REST clients into an archive run.

use std::sync::Arc;

use domain::models::{RunParameters, RunSummary};
use domain::services::{ArchivePipeline, SystemClock};
use tracing::{debug, error, info_span, Instrument};
use uuid::Uuid;

use crate::azure::{BlobServiceClient, ManagedIdentityClient, SqlExportClient};
use crate::config::Config;
use crate::error::ArchiverError;

/// One configured archive target. Every call to [`Archiver::run_once`]
/// resolves a fresh session; nothing carries over between runs.
pub struct Archiver {
    pipeline: ArchivePipeline,
    params: RunParameters,
    store: BlobServiceClient,
    strict: bool,
}

impl Archiver {
    pub fn from_config(config: &Config) -> Result<Self, ArchiverError> {
        let params = config.archive.run_parameters()?;

        let pipeline = ArchivePipeline::new(
            Arc::new(ManagedIdentityClient::new(&config.azure)?),
            Arc::new(SqlExportClient::new(&config.azure)?),
            Arc::new(SystemClock),
            config.archive.run_options(),
        );
        let store = BlobServiceClient::new(
            &params.storage_account_name,
            params.storage_account_key.clone(),
            &config.azure,
        )?;

        Ok(Self {
            pipeline,
            params,
            store,
            strict: config.archive.strict,
        })
    }

    pub fn parameters(&self) -> &RunParameters {
        &self.params
    }

    /// Runs identity resolution, provisioning, exports and retention once.
    ///
    /// In strict mode a run with failed exports or deletions returns
    /// [`ArchiverError::Strict`] after completing every step.
    pub async fn run_once(&self) -> Result<RunSummary, ArchiverError> {
        let span = info_span!("archive_run", run_id = %Uuid::new_v4());

        let summary = match self
            .pipeline
            .run(&self.params, &self.store)
            .instrument(span)
            .await
        {
            Ok(summary) => summary,
            Err(e) => {
                error!(error = %e, fatal = e.is_fatal(), "Archive run aborted");
                return Err(e.into());
            }
        };

        if let Ok(json) = serde_json::to_string(&summary) {
            debug!(summary = %json, "Run summary");
        }

        if self.strict && summary.has_failures() {
            return Err(ArchiverError::Strict {
                failures: summary.failure_count(),
            });
        }
        Ok(summary)
    }
}
