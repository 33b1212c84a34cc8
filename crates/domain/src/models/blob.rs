//! Read-only view of objects in the destination container.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// A blob and its last modification time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobRecord {
    pub name: String,
    pub last_modified: DateTime<Utc>,
}

impl BlobRecord {
    pub fn new(name: impl Into<String>, last_modified: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            last_modified,
        }
    }

    /// Age of the blob at `now`.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_modified
    }

    /// Whether the blob is strictly older than the retention window.
    ///
    /// A blob exactly `retention_days` old is kept.
    pub fn is_expired(&self, now: DateTime<Utc>, retention_days: u32) -> bool {
        self.age(now) > Duration::days(i64::from(retention_days))
    }
}
