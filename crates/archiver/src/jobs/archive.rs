//! Scheduled archive runs.

use std::sync::Arc;

use tracing::info;

use super::scheduler::{Job, JobFrequency};
use crate::config::ScheduleConfig;
use crate::runner::Archiver;

/// Runs one archive pass per tick.
pub struct ArchiveJob {
    archiver: Arc<Archiver>,
    interval_minutes: u64,
    run_on_start: bool,
}

impl ArchiveJob {
    pub fn new(archiver: Arc<Archiver>, schedule: &ScheduleConfig) -> Self {
        Self {
            archiver,
            interval_minutes: schedule.interval_minutes,
            run_on_start: schedule.run_on_start,
        }
    }
}

#[async_trait::async_trait]
impl Job for ArchiveJob {
    fn name(&self) -> &'static str {
        "archive"
    }

    fn frequency(&self) -> JobFrequency {
        JobFrequency::Minutes(self.interval_minutes)
    }

    fn run_on_start(&self) -> bool {
        self.run_on_start
    }

    async fn execute(&self) -> Result<(), String> {
        let summary = self.archiver.run_once().await.map_err(|e| e.to_string())?;

        info!(
            exports = summary.exports.len(),
            failures = summary.failure_count(),
            blobs_deleted = summary.retention.deleted.len(),
            "Scheduled archive pass finished"
        );
        Ok(())
    }
}
