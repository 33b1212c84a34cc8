//! Invocation parameters of an archive run.

use serde::{Deserialize, Serialize};
use shared::secret::Secret;
use shared::validation::split_database_names;
use std::str::FromStr;
use validator::{Validate, ValidationError};

use crate::error::ArchiveError;

/// Which managed identity the run authenticates with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdentityMode {
    /// Identity assigned to the hosting resource.
    #[serde(alias = "system")]
    System,
    /// Standalone identity resource looked up by name in the resource group.
    #[serde(alias = "user")]
    User,
}

impl FromStr for IdentityMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "system" => Ok(IdentityMode::System),
            "user" => Ok(IdentityMode::User),
            _ => Err(format!("Unknown managed identity type: {}", s)),
        }
    }
}

impl std::fmt::Display for IdentityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdentityMode::System => write!(f, "System"),
            IdentityMode::User => write!(f, "User"),
        }
    }
}

/// Everything a single archive run needs.
#[derive(Debug, Clone, Validate)]
#[validate(schema(function = "validate_identity_name"))]
pub struct RunParameters {
    #[validate(custom(function = "shared::validation::validate_not_blank"))]
    pub resource_group_name: String,

    pub identity_mode: IdentityMode,

    /// Required iff `identity_mode` is `User`.
    pub user_identity_name: Option<String>,

    #[validate(custom(function = "shared::validation::validate_not_blank"))]
    pub sql_server_name: String,

    #[validate(custom(function = "shared::validation::validate_not_blank"))]
    pub sql_server_admin: String,

    #[validate(custom(function = "shared::validation::validate_secret"))]
    pub sql_server_admin_password: Secret,

    /// Exported in this order; duplicates are exported twice.
    #[validate(custom(function = "shared::validation::validate_database_names"))]
    pub database_names: Vec<String>,

    #[validate(custom(function = "shared::validation::validate_not_blank"))]
    pub storage_account_name: String,

    #[validate(custom(function = "shared::validation::validate_secret"))]
    pub storage_account_key: Secret,

    #[validate(custom(function = "shared::validation::validate_container_name"))]
    pub blob_container_name: String,

    pub retention_days: u32,
}

fn validate_identity_name(params: &RunParameters) -> Result<(), ValidationError> {
    let has_name = params
        .user_identity_name
        .as_deref()
        .map(|n| !n.trim().is_empty())
        .unwrap_or(false);

    match (params.identity_mode, has_name) {
        (IdentityMode::User, false) => {
            let mut err = ValidationError::new("user_identity_name_missing");
            err.message = Some("UserIdentityName is required when ManagedIdentityType is User".into());
            Err(err)
        }
        (IdentityMode::System, true) => {
            let mut err = ValidationError::new("user_identity_name_unexpected");
            err.message =
                Some("UserIdentityName must not be set when ManagedIdentityType is System".into());
            Err(err)
        }
        _ => Ok(()),
    }
}

impl RunParameters {
    /// Parses the comma-separated database list the way it is passed on the
    /// command line.
    pub fn parse_database_names(input: &str) -> Vec<String> {
        split_database_names(input)
    }

    /// Validates the parameters, returning them unchanged on success.
    ///
    /// Runs before any network call.
    pub fn validated(self) -> Result<Self, ArchiveError> {
        self.validate()?;
        Ok(self)
    }

    /// The user identity name, trimmed. Only meaningful in `User` mode.
    pub fn user_identity(&self) -> Option<&str> {
        self.user_identity_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
    }
}

#[cfg(test)]
pub(crate) fn sample_parameters() -> RunParameters {
    RunParameters {
        resource_group_name: "rg-data".to_string(),
        identity_mode: IdentityMode::System,
        user_identity_name: None,
        sql_server_name: "sql-prod".to_string(),
        sql_server_admin: "sqladmin".to_string(),
        sql_server_admin_password: Secret::new("P@ssw0rd!"),
        database_names: vec!["Sales".to_string(), "Inventory".to_string()],
        storage_account_name: "stbackups".to_string(),
        storage_account_key: Secret::new("c2VjcmV0LWtleQ=="),
        blob_container_name: "sql-backups".to_string(),
        retention_days: 30,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_mode_from_str() {
        assert_eq!("System".parse::<IdentityMode>().unwrap(), IdentityMode::System);
        assert_eq!("user".parse::<IdentityMode>().unwrap(), IdentityMode::User);
        assert_eq!(" USER ".parse::<IdentityMode>().unwrap(), IdentityMode::User);
        assert!("service".parse::<IdentityMode>().is_err());
    }

    #[test]
    fn test_identity_mode_display() {
        assert_eq!(IdentityMode::System.to_string(), "System");
        assert_eq!(IdentityMode::User.to_string(), "User");
    }

    #[test]
    fn test_identity_mode_deserialize_aliases() {
        let a: IdentityMode = serde_json::from_str("\"User\"").unwrap();
        let b: IdentityMode = serde_json::from_str("\"user\"").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_valid_parameters() {
        assert!(sample_parameters().validated().is_ok());
    }

    #[test]
    fn test_user_mode_requires_identity_name() {
        let params = RunParameters {
            identity_mode: IdentityMode::User,
            user_identity_name: Some("   ".to_string()),
            ..sample_parameters()
        };
        let err = params.validated().unwrap_err();
        assert!(matches!(err, ArchiveError::InvalidParameters(_)));
        assert!(err.to_string().contains("UserIdentityName is required"));
    }

    #[test]
    fn test_system_mode_rejects_identity_name() {
        let params = RunParameters {
            user_identity_name: Some("id-backup".to_string()),
            ..sample_parameters()
        };
        let err = params.validated().unwrap_err();
        assert!(err.to_string().contains("must not be set"));
    }

    #[test]
    fn test_user_mode_with_identity_name() {
        let params = RunParameters {
            identity_mode: IdentityMode::User,
            user_identity_name: Some(" id-backup ".to_string()),
            ..sample_parameters()
        };
        let params = params.validated().unwrap();
        assert_eq!(params.user_identity(), Some("id-backup"));
    }

    #[test]
    fn test_blank_fields_rejected() {
        let params = RunParameters {
            resource_group_name: " ".to_string(),
            sql_server_admin_password: Secret::new(""),
            ..sample_parameters()
        };
        let err = params.validated().unwrap_err().to_string();
        assert!(err.contains("resource_group_name"));
        assert!(err.contains("sql_server_admin_password"));
    }

    #[test]
    fn test_empty_database_list_rejected() {
        let params = RunParameters {
            database_names: RunParameters::parse_database_names(" , "),
            ..sample_parameters()
        };
        let err = params.validated().unwrap_err().to_string();
        assert!(err.contains("database_names"));
    }

    #[test]
    fn test_invalid_container_rejected() {
        let params = RunParameters {
            blob_container_name: "Backups".to_string(),
            ..sample_parameters()
        };
        assert!(params.validated().is_err());
    }

    #[test]
    fn test_zero_retention_allowed() {
        let params = RunParameters {
            retention_days: 0,
            ..sample_parameters()
        };
        assert!(params.validated().is_ok());
    }

    #[test]
    fn test_parse_database_names() {
        assert_eq!(
            RunParameters::parse_database_names(" A , B,C "),
            vec!["A", "B", "C"]
        );
    }

    #[test]
    fn test_debug_does_not_leak_secrets() {
        let rendered = format!("{:?}", sample_parameters());
        assert!(!rendered.contains("P@ssw0rd!"));
        assert!(!rendered.contains("c2VjcmV0LWtleQ=="));
    }
}
