//! Error taxonomy for an archive run.

use thiserror::Error;

/// Errors raised by the archive components.
///
/// Identity, parameter and storage errors abort a run. Export and deletion
/// errors are per item: the component logs them and moves on.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Managed identity not found: {0}")]
    IdentityNotFound(String),

    #[error("Storage access failed: {0}")]
    StorageAccess(String),

    #[error("Export submission for database '{database}' failed: {message}")]
    ExportSubmission { database: String, message: String },

    #[error("Export status query for operation {operation} failed: {message}")]
    ExportStatusQuery { operation: String, message: String },

    #[error("Export of database '{database}' failed: {message}")]
    ExportFailed { database: String, message: String },

    #[error("Failed to delete blob '{blob}': {message}")]
    BlobDeletion { blob: String, message: String },
}

impl ArchiveError {
    /// Whether the error aborts the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ArchiveError::InvalidParameters(_)
                | ArchiveError::Authentication(_)
                | ArchiveError::IdentityNotFound(_)
                | ArchiveError::StorageAccess(_)
        )
    }
}

impl From<validator::ValidationErrors> for ArchiveError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<String> = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |e| {
                    let message = e
                        .message
                        .clone()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string());
                    if *field == "__all__" {
                        message
                    } else {
                        format!("{}: {}", field, message)
                    }
                })
            })
            .collect();
        details.sort();

        ArchiveError::InvalidParameters(details.join("; "))
    }
}
