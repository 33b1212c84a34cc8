//! Object storage collaborator.

use crate::error::ArchiveError;
use crate::models::BlobRecord;

/// Result of a container creation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerCreation {
    Created,
    /// Someone else created it between our check and our request.
    AlreadyExists,
}

/// Blob storage operations used by provisioning and retention.
///
/// Implementations authenticate with the storage account key; they do not
/// need the management-plane session.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Whether a container with exactly this name exists.
    async fn container_exists(&self, container: &str) -> Result<bool, ArchiveError>;

    async fn create_container(&self, container: &str) -> Result<ContainerCreation, ArchiveError>;

    /// Lists the blobs of a container in a single enumeration.
    async fn list_blobs(&self, container: &str) -> Result<Vec<BlobRecord>, ArchiveError>;

    async fn delete_blob(&self, container: &str, blob: &str) -> Result<(), ArchiveError>;

    /// Base URI of a container, without a trailing slash.
    fn container_url(&self, container: &str) -> String;

    /// URI of a blob inside a container.
    fn blob_url(&self, container: &str, blob: &str) -> String {
        format!("{}/{}", self.container_url(container), blob)
    }
}
