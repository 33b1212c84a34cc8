//! Logging initialization.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::LoggingConfig;

/// Installs the global subscriber.
///
/// Filter precedence: `level_flag` (the `--log-level` flag), then `RUST_LOG`,
/// then the configured level.
pub fn init_logging(config: &LoggingConfig, level_flag: Option<&str>) {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let env_filter = EnvFilter::new(filter_directive(
        &config.level,
        level_flag,
        rust_log.as_deref(),
    ));

    let subscriber = tracing_subscriber::registry().with(env_filter);

    if config.format == "pretty" {
        let pretty_layer = fmt::layer()
            .pretty()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(false);
        subscriber.with(pretty_layer).init();
    } else {
        // Run spans carry the run id; closing them logs the run duration.
        let json_layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_span_list(false)
            .with_target(true);
        subscriber.with(json_layer).init();
    }
}

fn filter_directive(configured: &str, level_flag: Option<&str>, rust_log: Option<&str>) -> String {
    level_flag
        .or(rust_log)
        .filter(|d| !d.trim().is_empty())
        .unwrap_or(configured)
        .to_string()
}
