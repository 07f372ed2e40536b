//! Error types for push-ece.

use thiserror::Error;

/// Errors that can occur during key agreement or content decryption.
#[derive(Error, Debug)]
pub enum EceError {
    /// A private or public key is malformed or not on P-256.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// HKDF expansion failed.
    #[error("key derivation failed")]
    KeyDerivation,

    /// A transport header is missing or unparseable.
    #[error("malformed {header} header: {reason}")]
    MalformedHeader {
        /// Header name.
        header: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// Record framing or padding is invalid.
    #[error("invalid record: {0}")]
    InvalidRecord(String),

    /// Decryption failed (authentication error).
    /// No details provided to prevent oracle attacks.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Encryption operation failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
}

impl EceError {
    pub(crate) fn header(header: &'static str, reason: impl Into<String>) -> Self {
        Self::MalformedHeader {
            header,
            reason: reason.into(),
        }
    }
}
