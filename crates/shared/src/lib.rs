//! Shared utilities and common types for the bacpac archiver.
//!
//! This crate provides common functionality used across all other crates:
//! - Shared Key signing for the blob service (HMAC-SHA256)
//! - Archive file naming conventions
//! - Redacting wrapper for secret values
//! - Common validation logic

pub mod crypto;
pub mod naming;
pub mod secret;
pub mod validation;
