//! Destination container provisioning.

use tracing::info;

use crate::error::ArchiveError;
use crate::services::storage::{BlobStore, ContainerCreation};

/// What provisioning did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionOutcome {
    AlreadyPresent,
    Created,
}

/// Ensures `container` exists, creating it only if it is absent.
///
/// Calling this twice for the same name creates at most once and never fails
/// on the second call.
pub async fn ensure_container(
    store: &dyn BlobStore,
    container: &str,
) -> Result<ProvisionOutcome, ArchiveError> {
    if store.container_exists(container).await? {
        info!(container = %container, "Blob container already exists");
        return Ok(ProvisionOutcome::AlreadyPresent);
    }

    match store.create_container(container).await? {
        ContainerCreation::Created => {
            info!(container = %container, "Created blob container");
            Ok(ProvisionOutcome::Created)
        }
        ContainerCreation::AlreadyExists => {
            info!(
                container = %container,
                "Blob container was created concurrently"
            );
            Ok(ProvisionOutcome::AlreadyPresent)
        }
    }
}
