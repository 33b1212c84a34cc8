//! SQL database export submission and status queries.

use async_trait::async_trait;
use domain::models::{ExportProgress, ExportRequest, ExportStatus, OperationHandle};
use domain::services::{Session, SqlExportService};
use domain::ArchiveError;
use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AzureError, ManagementClient};
use crate::config::AzureConfig;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ExportDefinition<'a> {
    storage_key_type: &'static str,
    storage_key: &'a str,
    storage_uri: &'a str,
    administrator_login: &'a str,
    administrator_login_password: &'a str,
    authentication_type: &'static str,
}

/// Body of an async-operation or operation-result document. The status sits
/// at the top level for `Azure-AsyncOperation` handles and under
/// `properties` for `Location` handles.
#[derive(Debug, Default, Deserialize)]
struct OperationDocument {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error: Option<OperationError>,
    #[serde(default)]
    properties: Option<OperationProperties>,
}

#[derive(Debug, Deserialize)]
struct OperationError {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OperationProperties {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    error_message: Option<String>,
}

impl OperationDocument {
    fn progress(self) -> Result<ExportProgress, String> {
        let status = self
            .status
            .or_else(|| self.properties.as_ref().and_then(|p| p.status.clone()))
            .ok_or_else(|| "operation document carries no status".to_string())?;
        let status: ExportStatus = status.parse()?;

        let error_message = self
            .error
            .and_then(|e| match (e.code, e.message) {
                (Some(code), Some(message)) => Some(format!("{}: {}", code, message)),
                (code, message) => message.or(code),
            })
            .or_else(|| self.properties.and_then(|p| p.error_message))
            .filter(|m| !m.trim().is_empty());

        Ok(ExportProgress {
            status,
            error_message,
        })
    }
}

/// Export client for logical SQL servers.
pub struct SqlExportClient {
    management: ManagementClient,
    api_version: String,
}

impl SqlExportClient {
    pub fn new(config: &AzureConfig) -> Result<Self, AzureError> {
        Ok(Self {
            management: ManagementClient::new(config)?,
            api_version: config.sql_api_version.clone(),
        })
    }

    fn export_url(&self, session: &Session, request: &ExportRequest) -> Result<Url, AzureError> {
        self.management.resource_url(
            &[
                "subscriptions",
                session.subscription_id(),
                "resourceGroups",
                &request.resource_group_name,
                "providers",
                "Microsoft.Sql",
                "servers",
                &request.sql_server_name,
                "databases",
                &request.database_name,
                "export",
            ],
            &self.api_version,
        )
    }

    async fn submit(&self, session: &Session, request: &ExportRequest) -> Result<OperationHandle, AzureError> {
        let url = self.export_url(session, request)?;
        let definition = ExportDefinition {
            storage_key_type: "StorageAccessKey",
            storage_key: request.storage_key.expose(),
            storage_uri: &request.storage_uri,
            administrator_login: &request.administrator_login,
            administrator_login_password: request.administrator_password.expose(),
            authentication_type: "Sql",
        };

        let response = self.management.post_json(&session.token, &url, &definition).await?;

        let handle = ["Azure-AsyncOperation", "Location"]
            .iter()
            .find_map(|name| response.headers().get(*name))
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| {
                AzureError::Decode(format!(
                    "export accepted with {} but no operation handle",
                    response.status()
                ))
            })?;

        Ok(OperationHandle(handle))
    }

    async fn status(&self, session: &Session, operation: &OperationHandle) -> Result<ExportProgress, AzureError> {
        let url = Url::parse(&operation.0)
            .map_err(|e| AzureError::Url(format!("{}: {}", operation, e)))?;

        let response = self.management.get(&session.token, &url).await?;
        let http_status = response.status();
        let body = response.text().await?;

        // A Location handle answers 202 with an empty body while running.
        if body.trim().is_empty() {
            return Ok(ExportProgress::new(if http_status == StatusCode::ACCEPTED {
                ExportStatus::InProgress
            } else {
                ExportStatus::Succeeded
            }));
        }

        let document: OperationDocument =
            serde_json::from_str(&body).map_err(|e| AzureError::Decode(e.to_string()))?;
        document.progress().map_err(AzureError::Decode)
    }
}

#[async_trait]
impl SqlExportService for SqlExportClient {
    async fn submit_export(
        &self,
        session: &Session,
        request: &ExportRequest,
    ) -> Result<OperationHandle, ArchiveError> {
        let handle = self
            .submit(session, request)
            .await
            .map_err(|e| ArchiveError::ExportSubmission {
                database: request.database_name.clone(),
                message: e.to_string(),
            })?;

        debug!(database = %request.database_name, operation = %handle, "Export accepted");
        Ok(handle)
    }

    async fn export_status(
        &self,
        session: &Session,
        operation: &OperationHandle,
    ) -> Result<ExportProgress, ArchiveError> {
        self.status(session, operation)
            .await
            .map_err(|e| ArchiveError::ExportStatusQuery {
                operation: operation.to_string(),
                message: e.to_string(),
            })
    }
}
