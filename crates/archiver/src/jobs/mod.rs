//! Recurring execution of archive runs.

mod archive;
mod scheduler;

pub use archive::ArchiveJob;
pub use scheduler::{Job, JobFrequency, JobScheduler};
