//! Archive file naming conventions.

use chrono::{DateTime, Utc};

/// File extension of database export archives.
pub const BACPAC_EXTENSION: &str = ".bacpac";

/// Timestamp format appended to the database name (minute precision, UTC).
pub const EXPORT_TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M";

/// Builds the blob name for an export of `database_name` taken at `at`.
///
/// The timestamp follows the database name directly, without a separator:
/// `Foo` at 2024-01-19 10:30 UTC becomes `Foo202401191030.bacpac`.
pub fn export_blob_name(database_name: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}{}{}",
        database_name,
        at.format(EXPORT_TIMESTAMP_FORMAT),
        BACPAC_EXTENSION
    )
}
