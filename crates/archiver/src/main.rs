use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use bacpac_archiver::cli::Cli;
use bacpac_archiver::config::Config;
use bacpac_archiver::jobs::{ArchiveJob, JobScheduler};
use bacpac_archiver::logging::init_logging;
use bacpac_archiver::runner::Archiver;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config = Config::load_from(&cli.config_dir, &cli.ambient_defaults(), &cli.overrides())?;

    init_logging(&config.logging, cli.log_level.as_deref());

    info!("Starting bacpac archiver v{}", env!("CARGO_PKG_VERSION"));

    let archiver = Arc::new(Archiver::from_config(&config)?);

    if config.schedule.enabled && !cli.once {
        let mut scheduler = JobScheduler::new();
        scheduler.register(ArchiveJob::new(Arc::clone(&archiver), &config.schedule));
        scheduler.start();

        tokio::signal::ctrl_c().await?;
        info!("Shutdown signal received");

        scheduler.shutdown();
        scheduler.wait_for_shutdown(Duration::from_secs(30)).await;
        return Ok(());
    }

    match archiver.run_once().await {
        Ok(summary) => {
            info!(
                exports = summary.exports.len(),
                failures = summary.failure_count(),
                "Bacpac archiver finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Bacpac archiver failed");
            Err(e.into())
        }
    }
}
