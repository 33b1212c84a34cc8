use domain::ArchiveError;
use thiserror::Error;

use crate::azure::AzureError;

/// Errors surfaced by the binary.
#[derive(Debug, Error)]
pub enum ArchiverError {
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error("Failed to set up cloud client: {0}")]
    Client(#[from] AzureError),

    /// Strict mode and the run had per-item failures.
    #[error("Archive run finished with {failures} failed item(s)")]
    Strict { failures: usize },
}

impl ArchiverError {
    /// Whether the run stopped before completing all steps.
    pub fn is_fatal(&self) -> bool {
        match self {
            ArchiverError::Archive(e) => e.is_fatal(),
            ArchiverError::Client(_) => true,
            ArchiverError::Strict { .. } => false,
        }
    }
}
