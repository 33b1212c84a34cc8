//! Common validation utilities.

use validator::ValidationError;

use crate::secret::Secret;

/// Minimum length of a blob container name.
const MIN_CONTAINER_NAME_LENGTH: usize = 3;

/// Maximum length of a blob container name.
const MAX_CONTAINER_NAME_LENGTH: usize = 63;

/// Maximum length of a database name on the SQL service.
const MAX_DATABASE_NAME_LENGTH: usize = 128;

fn error(code: &'static str, message: &'static str) -> ValidationError {
    let mut err = ValidationError::new(code);
    err.message = Some(message.into());
    err
}

/// Splits a comma-separated database list.
///
/// Entries are trimmed and kept in input order. Duplicates are kept. Entries
/// that are empty after trimming (`"a,,b"`, trailing commas) are dropped.
pub fn split_database_names(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect()
}

/// Validates that a string has at least one non-whitespace character.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(error("blank", "Value must not be empty"))
    } else {
        Ok(())
    }
}

/// Validates that a secret value is present.
pub fn validate_secret(value: &Secret) -> Result<(), ValidationError> {
    if value.is_empty() {
        Err(error("secret_missing", "Secret value must not be empty"))
    } else {
        Ok(())
    }
}

/// Validates a list of database names.
pub fn validate_database_names(names: &[String]) -> Result<(), ValidationError> {
    if names.is_empty() {
        return Err(error(
            "database_names_empty",
            "At least one database name is required",
        ));
    }

    for name in names {
        if name.trim().is_empty() {
            return Err(error(
                "database_name_blank",
                "Database names must not be empty",
            ));
        }
        if name.len() > MAX_DATABASE_NAME_LENGTH {
            return Err(error(
                "database_name_length",
                "Database names must be at most 128 characters",
            ));
        }
    }

    Ok(())
}

/// Validates a blob container name against the storage naming rules.
///
/// 3 to 63 characters, lowercase letters, digits and hyphens, starting and
/// ending with a letter or digit, no consecutive hyphens.
pub fn validate_container_name(name: &str) -> Result<(), ValidationError> {
    if name.len() < MIN_CONTAINER_NAME_LENGTH || name.len() > MAX_CONTAINER_NAME_LENGTH {
        return Err(error(
            "container_name_length",
            "Container name must be between 3 and 63 characters",
        ));
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
    {
        return Err(error(
            "container_name_charset",
            "Container name may only contain lowercase letters, digits and hyphens",
        ));
    }

    if name.starts_with('-') || name.ends_with('-') || name.contains("--") {
        return Err(error(
            "container_name_hyphens",
            "Container name must start and end with a letter or digit and not contain consecutive hyphens",
        ));
    }

    Ok(())
}
