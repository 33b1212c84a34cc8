//! Retention enforcement over the destination container.

use chrono::{DateTime, Utc};
use tracing::{error, info};

use crate::error::ArchiveError;
use crate::models::{FailedDeletion, RetentionReport};
use crate::services::storage::BlobStore;

/// Deletes every blob in `container` strictly older than `retention_days`.
///
/// Listing failures abort the pass. Deletion is best-effort per blob: a
/// failure is logged, recorded, and the pass continues. With `dry_run` the
/// expired blobs are reported but left in place.
pub async fn enforce_retention(
    store: &dyn BlobStore,
    container: &str,
    retention_days: u32,
    now: DateTime<Utc>,
    dry_run: bool,
) -> Result<RetentionReport, ArchiveError> {
    let blobs = store.list_blobs(container).await?;

    let mut report = RetentionReport {
        examined: blobs.len(),
        dry_run,
        ..Default::default()
    };

    for blob in blobs.iter().filter(|b| b.is_expired(now, retention_days)) {
        let age_days = blob.age(now).num_days();

        if dry_run {
            info!(
                container = %container,
                blob = %blob.name,
                age_days = age_days,
                "Dry run: would delete expired blob"
            );
            report.deleted.push(blob.name.clone());
            continue;
        }

        match store.delete_blob(container, &blob.name).await {
            Ok(()) => {
                info!(
                    container = %container,
                    blob = %blob.name,
                    age_days = age_days,
                    "Deleted expired blob"
                );
                report.deleted.push(blob.name.clone());
            }
            Err(e) => {
                error!(
                    container = %container,
                    blob = %blob.name,
                    error = %e,
                    "Failed to delete expired blob"
                );
                report.failed.push(FailedDeletion {
                    blob_name: blob.name.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }

    info!(
        container = %container,
        examined = report.examined,
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        retention_days = retention_days,
        "Retention pass finished"
    );

    Ok(report)
}
