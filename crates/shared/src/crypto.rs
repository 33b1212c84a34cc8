//! Cryptographic utilities for storage request signing.

use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Error type for signing operations.
#[derive(Debug, Error)]
pub enum SigningError {
    #[error("Account key is not valid base64")]
    InvalidKeyEncoding,

    #[error("Failed to initialize HMAC: {0}")]
    Hmac(String),
}

/// Signs `message` with a base64-encoded key and returns the base64 signature.
///
/// This is the signature scheme used by storage Shared Key authorization:
/// `Base64(HMAC-SHA256(Base64Decode(key), UTF8(message)))`.
pub fn hmac_sha256_base64(key_base64: &str, message: &str) -> Result<String, SigningError> {
    let key = STANDARD
        .decode(key_base64.trim())
        .map_err(|_| SigningError::InvalidKeyEncoding)?;

    let mut mac = HmacSha256::new_from_slice(&key).map_err(|e| SigningError::Hmac(e.to_string()))?;
    mac.update(message.as_bytes());

    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}
