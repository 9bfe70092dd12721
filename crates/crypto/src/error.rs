//! Error types for session cryptography.

/// Errors produced while agreeing on or using session keys.
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("key agreement failed: {0}")]
    KeyAgreement(String),

    #[error("malformed public key encoding: {0}")]
    KeyEncoding(String),

    #[error("cipher error: {0}")]
    Cipher(String),
}
