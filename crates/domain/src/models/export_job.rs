//! Database export jobs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared::secret::Secret;
use std::str::FromStr;

/// Status reported by the SQL service for an export operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExportStatus {
    InProgress,
    Succeeded,
    Failed,
    /// The status could not be queried.
    Unknown,
}

impl ExportStatus {
    /// Whether the provider will not change this status any more.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ExportStatus::Succeeded | ExportStatus::Failed)
    }
}

impl FromStr for ExportStatus {
    type Err = String;

    /// Maps provider status strings. Cancellation counts as failure; queued
    /// and running states count as in progress.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "succeeded" | "completed" => Ok(ExportStatus::Succeeded),
            "failed" | "canceled" | "cancelled" => Ok(ExportStatus::Failed),
            "inprogress" | "in_progress" | "pending" | "running" | "accepted" | "queued" => {
                Ok(ExportStatus::InProgress)
            }
            _ => Err(format!("Unknown export status: {}", s)),
        }
    }
}

impl std::fmt::Display for ExportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportStatus::InProgress => write!(f, "InProgress"),
            ExportStatus::Succeeded => write!(f, "Succeeded"),
            ExportStatus::Failed => write!(f, "Failed"),
            ExportStatus::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Opaque handle of a submitted export, used to query its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle(pub String);

impl std::fmt::Display for OperationHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the SQL service needs to export one database into a blob.
#[derive(Debug, Clone)]
pub struct ExportRequest {
    pub resource_group_name: String,
    pub sql_server_name: String,
    pub database_name: String,
    pub administrator_login: String,
    pub administrator_password: Secret,
    /// Full URI of the target blob.
    pub storage_uri: String,
    /// Storage account access key.
    pub storage_key: Secret,
}

/// A submitted export and the last status observed for it.
#[derive(Debug, Clone, Serialize)]
pub struct ExportJob {
    pub database_name: String,
    pub blob_name: String,
    pub submitted_at: DateTime<Utc>,
    pub operation: OperationHandle,
    pub status: ExportStatus,
    /// Provider error message when the status is `Failed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Status of an export as returned by a status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportProgress {
    pub status: ExportStatus,
    pub error_message: Option<String>,
}

impl ExportProgress {
    pub fn new(status: ExportStatus) -> Self {
        Self {
            status,
            error_message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            status: ExportStatus::Failed,
            error_message: Some(message.into()),
        }
    }
}
