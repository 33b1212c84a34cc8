use std::time::Duration;

use domain::models::{IdentityMode, RunParameters};
use domain::services::{ExportOptions, RunOptions};
use domain::ArchiveError;
use serde::Deserialize;
use shared::secret::Secret;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub azure: AzureConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    /// json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Endpoints and API versions of the cloud services.
#[derive(Debug, Clone, Deserialize)]
pub struct AzureConfig {
    /// Managed identity token endpoint (IMDS by default)
    #[serde(default = "default_identity_endpoint")]
    pub identity_endpoint: String,

    /// Secret header for identity-endpoint style hosts (Automation, App Service).
    /// When absent the IMDS protocol is used.
    #[serde(default)]
    pub identity_header: Option<Secret>,

    #[serde(default = "default_management_endpoint")]
    pub management_endpoint: String,

    /// Token audience for the management plane
    #[serde(default = "default_management_resource")]
    pub management_resource: String,

    /// Use this subscription instead of the first enabled one
    #[serde(default)]
    pub subscription_id: Option<String>,

    #[serde(default = "default_storage_endpoint_suffix")]
    pub storage_endpoint_suffix: String,

    /// Full blob endpoint, replacing `https://{account}.blob.{suffix}`
    #[serde(default)]
    pub storage_endpoint: Option<String>,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_subscription_api_version")]
    pub subscription_api_version: String,

    #[serde(default = "default_identity_api_version")]
    pub identity_api_version: String,

    #[serde(default = "default_sql_api_version")]
    pub sql_api_version: String,

    #[serde(default = "default_storage_api_version")]
    pub storage_api_version: String,
}

/// Invocation parameters plus run policy.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub resource_group_name: String,

    /// System or User
    #[serde(default)]
    pub managed_identity_type: String,

    #[serde(default)]
    pub user_identity_name: Option<String>,

    #[serde(default)]
    pub sql_server_name: String,

    #[serde(default)]
    pub sql_server_admin: String,

    #[serde(default)]
    pub sql_server_admin_pw: Secret,

    /// Comma-separated list
    #[serde(default)]
    pub database_names: String,

    #[serde(default)]
    pub storage_account_name: String,

    #[serde(default)]
    pub storage_account_key: Secret,

    #[serde(default)]
    pub blob_container_name: String,

    #[serde(default = "default_retention_days")]
    pub retention_days: u32,

    /// Keep polling each export until it finishes
    #[serde(default)]
    pub wait_for_completion: bool,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    #[serde(default = "default_completion_timeout")]
    pub completion_timeout_secs: u64,

    /// Exit non-zero when any export or deletion failed
    #[serde(default)]
    pub strict: bool,

    /// Report expired blobs without deleting them
    #[serde(default)]
    pub dry_run: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleConfig {
    #[serde(default)]
    pub enabled: bool,

    #[serde(default = "default_interval_minutes")]
    pub interval_minutes: u64,

    /// Run a pass as soon as the scheduler starts
    #[serde(default = "default_run_on_start")]
    pub run_on_start: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for AzureConfig {
    fn default() -> Self {
        Self {
            identity_endpoint: default_identity_endpoint(),
            identity_header: None,
            management_endpoint: default_management_endpoint(),
            management_resource: default_management_resource(),
            subscription_id: None,
            storage_endpoint_suffix: default_storage_endpoint_suffix(),
            storage_endpoint: None,
            request_timeout_secs: default_request_timeout(),
            subscription_api_version: default_subscription_api_version(),
            identity_api_version: default_identity_api_version(),
            sql_api_version: default_sql_api_version(),
            storage_api_version: default_storage_api_version(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            resource_group_name: String::new(),
            managed_identity_type: String::new(),
            user_identity_name: None,
            sql_server_name: String::new(),
            sql_server_admin: String::new(),
            sql_server_admin_pw: Secret::default(),
            database_names: String::new(),
            storage_account_name: String::new(),
            storage_account_key: Secret::default(),
            blob_container_name: String::new(),
            retention_days: default_retention_days(),
            wait_for_completion: false,
            poll_interval_secs: default_poll_interval(),
            completion_timeout_secs: default_completion_timeout(),
            strict: false,
            dry_run: false,
        }
    }
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_minutes: default_interval_minutes(),
            run_on_start: default_run_on_start(),
        }
    }
}

// Default value functions
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "json".to_string()
}
fn default_identity_endpoint() -> String {
    "http://169.254.169.254/metadata/identity/oauth2/token".to_string()
}
fn default_management_endpoint() -> String {
    "https://management.azure.com".to_string()
}
fn default_management_resource() -> String {
    "https://management.azure.com/".to_string()
}
fn default_storage_endpoint_suffix() -> String {
    "core.windows.net".to_string()
}
fn default_request_timeout() -> u64 {
    60
}
fn default_subscription_api_version() -> String {
    "2022-12-01".to_string()
}
fn default_identity_api_version() -> String {
    "2023-01-31".to_string()
}
fn default_sql_api_version() -> String {
    "2021-11-01".to_string()
}
fn default_storage_api_version() -> String {
    "2021-08-06".to_string()
}
fn default_retention_days() -> u32 {
    30
}
fn default_poll_interval() -> u64 {
    30
}
fn default_completion_timeout() -> u64 {
    3600
}
fn default_interval_minutes() -> u64 {
    1440 // daily
}
fn default_run_on_start() -> bool {
    true
}

impl ArchiveConfig {
    /// Builds the run parameters, rejecting anything the run could not use.
    pub fn run_parameters(&self) -> Result<RunParameters, ArchiveError> {
        let mode = self.managed_identity_type.trim();
        if mode.is_empty() {
            return Err(ArchiveError::InvalidParameters(
                "managed_identity_type is required (System or User)".to_string(),
            ));
        }
        let identity_mode: IdentityMode = mode.parse().map_err(ArchiveError::InvalidParameters)?;

        RunParameters {
            resource_group_name: self.resource_group_name.trim().to_string(),
            identity_mode,
            user_identity_name: self.user_identity_name.clone(),
            sql_server_name: self.sql_server_name.trim().to_string(),
            sql_server_admin: self.sql_server_admin.trim().to_string(),
            sql_server_admin_password: self.sql_server_admin_pw.clone(),
            database_names: RunParameters::parse_database_names(&self.database_names),
            storage_account_name: self.storage_account_name.trim().to_string(),
            storage_account_key: self.storage_account_key.clone(),
            blob_container_name: self.blob_container_name.trim().to_string(),
            retention_days: self.retention_days,
        }
        .validated()
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            export: ExportOptions {
                wait_for_completion: self.wait_for_completion,
                poll_interval: Duration::from_secs(self.poll_interval_secs),
                completion_timeout: Duration::from_secs(self.completion_timeout_secs),
            },
            dry_run: self.dry_run,
        }
    }
}

/// Configuration validation error
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),
}

impl Config {
    /// Load configuration from files and environment variables.
    ///
    /// Loading order (later sources override earlier):
    /// 1. `defaults` - values discovered from the host (identity endpoint)
    /// 2. {config_dir}/default.toml
    /// 3. {config_dir}/local.toml - local overrides (optional, not in git)
    /// 4. Environment variables with BACPAC__ prefix
    /// 5. `overrides` - command line flags
    pub fn load_from(
        config_dir: &str,
        defaults: &[(String, String)],
        overrides: &[(String, String)],
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        for (key, value) in defaults {
            builder = builder.set_default(key.as_str(), value.as_str())?;
        }

        builder = builder
            .add_source(config::File::with_name(&format!("{}/default", config_dir)).required(false))
            .add_source(config::File::with_name(&format!("{}/local", config_dir)).required(false))
            .add_source(config::Environment::with_prefix("BACPAC").separator("__"));

        for (key, value) in overrides {
            builder = builder.set_override(key.as_str(), value.as_str())?;
        }

        let cfg: Self = builder.build()?.try_deserialize()?;
        cfg.validate()
            .map_err(|e| config::ConfigError::Message(e.to_string()))?;
        Ok(cfg)
    }

    /// Build a config from TOML text and overrides, without files or the
    /// environment. Not validated.
    pub fn from_toml(toml: &str, overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(config::File::from_str(toml, config::FileFormat::Toml));

        for (key, value) in overrides {
            builder = builder.set_override(*key, *value)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Load configuration for testing with custom overrides.
    #[cfg(test)]
    pub fn load_for_test(overrides: &[(&str, &str)]) -> Result<Self, config::ConfigError> {
        let defaults = r#"
            [logging]
            level = "info"
            format = "json"

            [azure]
            management_endpoint = "https://management.azure.com"
            request_timeout_secs = 60

            [archive]
            resource_group_name = "rg-data"
            managed_identity_type = "System"
            sql_server_name = "sql-prod"
            sql_server_admin = "sqladmin"
            sql_server_admin_pw = "P@ssw0rd!"
            database_names = "Sales, Inventory"
            storage_account_name = "stbackups"
            storage_account_key = "c2VjcmV0LWtleQ=="
            blob_container_name = "sql-backups"
            retention_days = 30

            [schedule]
            enabled = false
            interval_minutes = 1440
        "#;

        Self::from_toml(defaults, overrides)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if !matches!(self.logging.format.as_str(), "json" | "pretty") {
            return Err(ConfigValidationError::InvalidValue(format!(
                "logging.format must be json or pretty, got '{}'",
                self.logging.format
            )));
        }

        if self.azure.identity_endpoint.trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "azure.identity_endpoint".to_string(),
            ));
        }

        if self.azure.request_timeout_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "azure.request_timeout_secs cannot be 0".to_string(),
            ));
        }

        if self.archive.wait_for_completion && self.archive.poll_interval_secs == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "archive.poll_interval_secs cannot be 0 when waiting for completion".to_string(),
            ));
        }

        if self.schedule.enabled && self.schedule.interval_minutes == 0 {
            return Err(ConfigValidationError::InvalidValue(
                "schedule.interval_minutes cannot be 0".to_string(),
            ));
        }

        if self.archive.managed_identity_type.trim().is_empty() {
            return Err(ConfigValidationError::MissingRequired(
                "archive.managed_identity_type (System or User)".to_string(),
            ));
        }

        self.archive
            .run_parameters()
            .map_err(|e| ConfigValidationError::InvalidValue(e.to_string()))?;

        Ok(())
    }
}
