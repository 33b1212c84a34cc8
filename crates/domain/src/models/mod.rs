//! Domain models for the bacpac archiver.

pub mod blob;
pub mod export_job;
pub mod run_parameters;
pub mod run_summary;

pub use blob::BlobRecord;
pub use export_job::{ExportJob, ExportProgress, ExportRequest, ExportStatus, OperationHandle};
pub use run_parameters::{IdentityMode, RunParameters};
pub use run_summary::{ExportOutcome, FailedDeletion, RetentionReport, RunSummary};
