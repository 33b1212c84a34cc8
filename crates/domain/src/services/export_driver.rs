//! Export driver.
//!
//! Submits one export per database, sequentially, and reports the status the
//! SQL service gives back. Per-database failures are logged and recorded in
//! the outcome list; they never stop the remaining databases.

use std::time::Duration;

use shared::naming::export_blob_name;
use tracing::{error, info, warn};

use crate::error::ArchiveError;
use crate::models::{
    ExportJob, ExportOutcome, ExportProgress, ExportRequest, ExportStatus, OperationHandle,
    RunParameters,
};
use crate::services::clock::Clock;
use crate::services::identity::Session;
use crate::services::sql_export::SqlExportService;
use crate::services::storage::BlobStore;

/// How long the driver looks at each export after submitting it.
#[derive(Debug, Clone, Copy)]
pub struct ExportOptions {
    /// Re-query until the export reaches a terminal status. When false the
    /// status is queried exactly once.
    pub wait_for_completion: bool,
    pub poll_interval: Duration,
    pub completion_timeout: Duration,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            wait_for_completion: false,
            poll_interval: Duration::from_secs(30),
            completion_timeout: Duration::from_secs(3600),
        }
    }
}

pub struct ExportDriver<'a> {
    service: &'a dyn SqlExportService,
    clock: &'a dyn Clock,
    options: ExportOptions,
}

impl<'a> ExportDriver<'a> {
    pub fn new(
        service: &'a dyn SqlExportService,
        clock: &'a dyn Clock,
        options: ExportOptions,
    ) -> Self {
        Self {
            service,
            clock,
            options,
        }
    }

    /// Exports every database of `params` into `container` of `store`, in order.
    pub async fn export_all(
        &self,
        session: &Session,
        params: &RunParameters,
        store: &dyn BlobStore,
        container: &str,
    ) -> Vec<ExportOutcome> {
        let mut outcomes = Vec::with_capacity(params.database_names.len());

        for database in &params.database_names {
            outcomes.push(
                self.export_one(session, params, database, store, container)
                    .await,
            );
        }

        outcomes
    }

    async fn export_one(
        &self,
        session: &Session,
        params: &RunParameters,
        database: &str,
        store: &dyn BlobStore,
        container: &str,
    ) -> ExportOutcome {
        let submitted_at = self.clock.now();
        let blob_name = export_blob_name(database, submitted_at);

        let request = ExportRequest {
            resource_group_name: params.resource_group_name.clone(),
            sql_server_name: params.sql_server_name.clone(),
            database_name: database.to_string(),
            administrator_login: params.sql_server_admin.clone(),
            administrator_password: params.sql_server_admin_password.clone(),
            storage_uri: store.blob_url(container, &blob_name),
            storage_key: params.storage_account_key.clone(),
        };

        info!(
            database = %database,
            blob = %blob_name,
            server = %params.sql_server_name,
            "Submitting database export"
        );

        let operation = match self.service.submit_export(session, &request).await {
            Ok(operation) => operation,
            Err(e) => {
                error!(
                    database = %database,
                    blob = %blob_name,
                    error = %e,
                    "Export submission rejected"
                );
                return ExportOutcome::Rejected {
                    database_name: database.to_string(),
                    blob_name,
                    reason: e.to_string(),
                };
            }
        };

        let progress = self.observe(session, database, &operation).await;

        match progress.status {
            ExportStatus::Failed => {
                let err = ArchiveError::ExportFailed {
                    database: database.to_string(),
                    message: progress
                        .error_message
                        .clone()
                        .unwrap_or_else(|| "no error message reported".to_string()),
                };
                error!(database = %database, blob = %blob_name, error = %err, "Export failed");
            }
            ExportStatus::Succeeded => {
                info!(database = %database, blob = %blob_name, "Export succeeded");
            }
            ExportStatus::InProgress => {
                info!(database = %database, blob = %blob_name, "Export in progress");
            }
            ExportStatus::Unknown => {
                warn!(
                    database = %database,
                    blob = %blob_name,
                    "Export submitted but its status is unknown"
                );
            }
        }

        ExportOutcome::Accepted(ExportJob {
            database_name: database.to_string(),
            blob_name,
            submitted_at,
            operation,
            status: progress.status,
            error_message: progress.error_message,
        })
    }

    /// Queries the status once, or until terminal when waiting is enabled.
    async fn observe(
        &self,
        session: &Session,
        database: &str,
        operation: &OperationHandle,
    ) -> ExportProgress {
        let deadline = tokio::time::Instant::now() + self.options.completion_timeout;

        loop {
            let progress = match self.service.export_status(session, operation).await {
                Ok(progress) => progress,
                Err(e) => {
                    warn!(database = %database, error = %e, "Export status query failed");
                    return ExportProgress::new(ExportStatus::Unknown);
                }
            };

            if !self.options.wait_for_completion || progress.status.is_terminal() {
                return progress;
            }

            if tokio::time::Instant::now() + self.options.poll_interval > deadline {
                warn!(
                    database = %database,
                    timeout_secs = self.options.completion_timeout.as_secs(),
                    "Timed out waiting for export to finish"
                );
                return progress;
            }

            tokio::time::sleep(self.options.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::run_parameters::sample_parameters;
    use crate::services::mock::{test_session, FixedClock, InMemoryBlobStore, MockSqlExportService};
    use chrono::{TimeZone, Utc};

    const CONTAINER: &str = "sql-backups";
    const CONTAINER_URL: &str = "https://mockaccount.blob.core.windows.net/sql-backups";

    fn clock() -> FixedClock {
        FixedClock::new(Utc.with_ymd_and_hms(2024, 1, 19, 10, 30, 0).unwrap())
    }

    #[tokio::test]
    async fn test_exports_each_database_in_order() {
        let service = MockSqlExportService::new();
        let clock = clock();
        let driver = ExportDriver::new(&service, &clock, ExportOptions::default());
        let params = RunParameters {
            database_names: RunParameters::parse_database_names(" A , B,C "),
            ..sample_parameters()
        };

        let outcomes = driver
            .export_all(&test_session(), &params, &InMemoryBlobStore::new(), CONTAINER)
            .await;

        let names: Vec<&str> = outcomes.iter().map(|o| o.database_name()).collect();
        assert_eq!(names, vec!["A", "B", "C"]);
        assert_eq!(
            service.submitted_uris(),
            vec![
                format!("{}/A202401191030.bacpac", CONTAINER_URL),
                format!("{}/B202401191030.bacpac", CONTAINER_URL),
                format!("{}/C202401191030.bacpac", CONTAINER_URL),
            ]
        );
    }

    #[tokio::test]
    async fn test_request_carries_credentials() {
        let service = MockSqlExportService::new();
        let clock = clock();
        let driver = ExportDriver::new(&service, &clock, ExportOptions::default());

        driver
            .export_all(&test_session(), &sample_parameters(), &InMemoryBlobStore::new(), CONTAINER)
            .await;

        let request = &service.requests()[0];
        assert_eq!(request.resource_group_name, "rg-data");
        assert_eq!(request.sql_server_name, "sql-prod");
        assert_eq!(request.administrator_login, "sqladmin");
        assert_eq!(request.administrator_password.expose(), "P@ssw0rd!");
        assert_eq!(request.storage_key.expose(), "c2VjcmV0LWtleQ==");
    }

    #[tokio::test]
    async fn test_rejection_does_not_stop_later_databases() {
        let service = MockSqlExportService::new().rejecting("Sales");
        let clock = clock();
        let driver = ExportDriver::new(&service, &clock, ExportOptions::default());

        let outcomes = driver
            .export_all(&test_session(), &sample_parameters(), &InMemoryBlobStore::new(), CONTAINER)
            .await;

        assert_eq!(outcomes.len(), 2);
        assert!(matches!(outcomes[0], ExportOutcome::Rejected { .. }));
        assert!(matches!(outcomes[1], ExportOutcome::Accepted(_)));
        assert_eq!(outcomes[1].database_name(), "Inventory");
    }

    #[tokio::test]
    async fn test_single_status_query_by_default() {
        let service = MockSqlExportService::new();
        let clock = clock();
        let driver = ExportDriver::new(&service, &clock, ExportOptions::default());

        let outcomes = driver
            .export_all(&test_session(), &sample_parameters(), &InMemoryBlobStore::new(), CONTAINER)
            .await;

        assert_eq!(service.status_queries(), 2);
        for outcome in outcomes {
            match outcome {
                ExportOutcome::Accepted(job) => assert_eq!(job.status, ExportStatus::InProgress),
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_failed_status_is_reported_not_fatal() {
        let service = MockSqlExportService::new().failing_status("Sales", "login failed");
        let clock = clock();
        let driver = ExportDriver::new(&service, &clock, ExportOptions::default());

        let outcomes = driver
            .export_all(&test_session(), &sample_parameters(), &InMemoryBlobStore::new(), CONTAINER)
            .await;

        assert!(outcomes[0].is_failure());
        assert!(!outcomes[1].is_failure());
        match &outcomes[0] {
            ExportOutcome::Accepted(job) => {
                assert_eq!(job.status, ExportStatus::Failed);
                assert_eq!(job.error_message.as_deref(), Some("login failed"));
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_status_query_error_is_unknown() {
        let service = MockSqlExportService::new().status_unavailable();
        let clock = clock();
        let driver = ExportDriver::new(&service, &clock, ExportOptions::default());

        let outcomes = driver
            .export_all(&test_session(), &sample_parameters(), &InMemoryBlobStore::new(), CONTAINER)
            .await;

        match &outcomes[0] {
            ExportOutcome::Accepted(job) => assert_eq!(job.status, ExportStatus::Unknown),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_completion_polls_until_terminal() {
        let service = MockSqlExportService::new().completing_after(3);
        let clock = clock();
        let options = ExportOptions {
            wait_for_completion: true,
            poll_interval: Duration::from_secs(10),
            completion_timeout: Duration::from_secs(600),
        };
        let driver = ExportDriver::new(&service, &clock, options);
        let params = RunParameters {
            database_names: vec!["Sales".to_string()],
            ..sample_parameters()
        };

        let outcomes = driver
            .export_all(&test_session(), &params, &InMemoryBlobStore::new(), CONTAINER)
            .await;

        assert_eq!(service.status_queries(), 3);
        match &outcomes[0] {
            ExportOutcome::Accepted(job) => assert_eq!(job.status, ExportStatus::Succeeded),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_completion_times_out() {
        let service = MockSqlExportService::new();
        let clock = clock();
        let options = ExportOptions {
            wait_for_completion: true,
            poll_interval: Duration::from_secs(10),
            completion_timeout: Duration::from_secs(25),
        };
        let driver = ExportDriver::new(&service, &clock, options);
        let params = RunParameters {
            database_names: vec!["Sales".to_string()],
            ..sample_parameters()
        };

        let outcomes = driver
            .export_all(&test_session(), &params, &InMemoryBlobStore::new(), CONTAINER)
            .await;

        assert_eq!(service.status_queries(), 3);
        match &outcomes[0] {
            ExportOutcome::Accepted(job) => assert_eq!(job.status, ExportStatus::InProgress),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }
}
