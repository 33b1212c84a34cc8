//! Command line interface.
//!
//! Every flag maps onto a configuration key and is applied as an override on
//! top of the config files and `BACPAC__*` environment variables.

use clap::Parser;
use domain::models::IdentityMode;

/// Export SQL databases to bacpac blobs and prune exports past retention
#[derive(Parser, Debug, Default)]
#[command(name = "bacpac-archiver")]
#[command(version)]
#[command(about = "Export SQL databases to bacpac blobs and prune exports past retention")]
#[command(long_about = None)]
pub struct Cli {
    /// Directory holding default.toml and an optional local.toml
    #[arg(long, default_value = "config")]
    pub config_dir: String,

    /// Run a single pass even when a schedule is enabled
    #[arg(long)]
    pub once: bool,

    /// Log level or filter directive (e.g. debug, bacpac_archiver=trace).
    /// Takes precedence over RUST_LOG.
    #[arg(long)]
    pub log_level: Option<String>,

    #[arg(long)]
    pub resource_group_name: Option<String>,

    /// System or User
    #[arg(long)]
    pub managed_identity_type: Option<IdentityMode>,

    /// Name of the user-assigned identity (User mode only)
    #[arg(long)]
    pub user_identity_name: Option<String>,

    #[arg(long)]
    pub sql_server_name: Option<String>,

    #[arg(long)]
    pub sql_server_admin: Option<String>,

    /// Visible in the process list; prefer BACPAC__ARCHIVE__SQL_SERVER_ADMIN_PW
    #[arg(long)]
    pub sql_server_admin_pw: Option<String>,

    /// Comma-separated database names, exported in order
    #[arg(long)]
    pub database_names: Option<String>,

    #[arg(long)]
    pub storage_account_name: Option<String>,

    /// Visible in the process list; prefer BACPAC__ARCHIVE__STORAGE_ACCOUNT_KEY
    #[arg(long)]
    pub storage_account_key: Option<String>,

    #[arg(long)]
    pub blob_container_name: Option<String>,

    /// Blobs older than this many days are deleted
    #[arg(long)]
    pub retention_days: Option<u32>,

    /// Poll each export until it reaches a terminal status
    #[arg(long)]
    pub wait_for_completion: bool,

    /// List expired blobs without deleting them
    #[arg(long)]
    pub dry_run: bool,

    /// Exit non-zero if any export or deletion failed
    #[arg(long)]
    pub strict: bool,

    /// Token endpoint advertised by the host. Configured values take precedence.
    #[arg(long, env = "IDENTITY_ENDPOINT", hide_env_values = true)]
    pub identity_endpoint: Option<String>,

    /// Secret header value advertised by the host. Configured values take precedence.
    #[arg(long, env = "IDENTITY_HEADER", hide_env_values = true)]
    pub identity_header: Option<String>,
}

impl Cli {
    /// Host-provided identity settings, applied below every config source.
    pub fn ambient_defaults(&self) -> Vec<(String, String)> {
        let mut defaults = Vec::new();
        if let Some(endpoint) = self.identity_endpoint.as_deref().filter(|v| !v.is_empty()) {
            defaults.push(("azure.identity_endpoint".to_string(), endpoint.to_string()));
        }
        if let Some(header) = self.identity_header.as_deref().filter(|v| !v.is_empty()) {
            defaults.push(("azure.identity_header".to_string(), header.to_string()));
        }
        defaults
    }

    /// Flags given on the command line, as config keys.
    pub fn overrides(&self) -> Vec<(String, String)> {
        let mut overrides = Vec::new();
        let mut set = |key: &str, value: Option<String>| {
            if let Some(value) = value {
                overrides.push((key.to_string(), value));
            }
        };

        set("logging.level", self.log_level.clone());
        set("archive.resource_group_name", self.resource_group_name.clone());
        set(
            "archive.managed_identity_type",
            self.managed_identity_type.map(|m| m.to_string()),
        );
        set("archive.user_identity_name", self.user_identity_name.clone());
        set("archive.sql_server_name", self.sql_server_name.clone());
        set("archive.sql_server_admin", self.sql_server_admin.clone());
        set("archive.sql_server_admin_pw", self.sql_server_admin_pw.clone());
        set("archive.database_names", self.database_names.clone());
        set("archive.storage_account_name", self.storage_account_name.clone());
        set("archive.storage_account_key", self.storage_account_key.clone());
        set("archive.blob_container_name", self.blob_container_name.clone());
        set("archive.retention_days", self.retention_days.map(|d| d.to_string()));

        // Switches only ever turn a setting on.
        for (key, on) in [
            ("archive.wait_for_completion", self.wait_for_completion),
            ("archive.dry_run", self.dry_run),
            ("archive.strict", self.strict),
        ] {
            set(key, on.then(|| "true".to_string()));
        }

        overrides
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("bacpac-archiver").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_flags_no_overrides() {
        let cli = parse(&[]);
        assert_eq!(cli.config_dir, "config");
        assert!(!cli.once);
        assert!(cli.overrides().is_empty());
    }

    #[test]
    fn test_flags_become_overrides() {
        let cli = parse(&[
            "--resource-group-name",
            "rg-data",
            "--managed-identity-type",
            "user",
            "--user-identity-name",
            "id-backup",
            "--database-names",
            "Sales, Inventory",
            "--retention-days",
            "14",
            "--dry-run",
        ]);

        let overrides = cli.overrides();
        let get = |key: &str| {
            overrides
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
        };

        assert_eq!(get("archive.resource_group_name"), Some("rg-data"));
        assert_eq!(get("archive.managed_identity_type"), Some("User"));
        assert_eq!(get("archive.database_names"), Some("Sales, Inventory"));
        assert_eq!(get("archive.retention_days"), Some("14"));
        assert_eq!(get("archive.dry_run"), Some("true"));
        assert_eq!(get("archive.strict"), None);
    }

    #[test]
    fn test_unknown_identity_type_rejected() {
        let result = Cli::try_parse_from(["bacpac-archiver", "--managed-identity-type", "Service"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_negative_retention_rejected() {
        let result = Cli::try_parse_from(["bacpac-archiver", "--retention-days", "-1"]);
        assert!(result.is_err());
    }

    #[test]
    fn test_ambient_defaults() {
        let cli = Cli {
            identity_endpoint: Some("http://localhost:42356/msi/token".to_string()),
            identity_header: Some(String::new()),
            ..Default::default()
        };

        assert_eq!(
            cli.ambient_defaults(),
            vec![(
                "azure.identity_endpoint".to_string(),
                "http://localhost:42356/msi/token".to_string()
            )]
        );
    }
}
