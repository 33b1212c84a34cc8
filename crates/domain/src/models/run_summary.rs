//! Per-item outcomes of an archive run.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::export_job::{ExportJob, ExportStatus};

/// Outcome of exporting one database.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExportOutcome {
    /// The server accepted the export; `job.status` is the last observed status.
    Accepted(ExportJob),
    /// The server rejected the export request.
    Rejected {
        database_name: String,
        blob_name: String,
        reason: String,
    },
}

impl ExportOutcome {
    pub fn database_name(&self) -> &str {
        match self {
            ExportOutcome::Accepted(job) => &job.database_name,
            ExportOutcome::Rejected { database_name, .. } => database_name,
        }
    }

    pub fn blob_name(&self) -> &str {
        match self {
            ExportOutcome::Accepted(job) => &job.blob_name,
            ExportOutcome::Rejected { blob_name, .. } => blob_name,
        }
    }

    /// Rejected submissions and exports reported as `Failed`.
    pub fn is_failure(&self) -> bool {
        match self {
            ExportOutcome::Accepted(job) => job.status == ExportStatus::Failed,
            ExportOutcome::Rejected { .. } => true,
        }
    }
}

/// A blob the retention pass could not delete.
#[derive(Debug, Clone, Serialize)]
pub struct FailedDeletion {
    pub blob_name: String,
    pub reason: String,
}

/// Outcome of one retention pass over the container.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RetentionReport {
    /// Number of blobs listed.
    pub examined: usize,
    /// Blobs deleted, or that would have been deleted on a dry run.
    pub deleted: Vec<String>,
    pub failed: Vec<FailedDeletion>,
    pub dry_run: bool,
}

/// Summary of a whole run, logged at the completion banner.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub container: String,
    pub exports: Vec<ExportOutcome>,
    pub retention: RetentionReport,
}

impl RunSummary {
    pub fn exports_failed(&self) -> usize {
        self.exports.iter().filter(|e| e.is_failure()).count()
    }

    pub fn exports_in_progress(&self) -> usize {
        self.exports
            .iter()
            .filter(|e| matches!(e, ExportOutcome::Accepted(job) if job.status == ExportStatus::InProgress))
            .count()
    }

    /// Total per-item failures (exports and deletions).
    pub fn failure_count(&self) -> usize {
        self.exports_failed() + self.retention.failed.len()
    }

    pub fn has_failures(&self) -> bool {
        self.failure_count() > 0
    }
}
