//! Error types for fedipush types.

use thiserror::Error;

/// Errors raised while constructing or decoding bridge types.
#[derive(Debug, Error)]
pub enum TypesError {
    /// A required field was empty.
    #[error("{0} must not be empty")]
    EmptyField(&'static str),

    /// The instance URL could not be normalized to an origin.
    #[error("invalid instance origin {input:?}: {reason}")]
    InvalidOrigin {
        /// The raw input.
        input: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The subscription id is not a UUID.
    #[error("invalid subscription id: {0}")]
    InvalidId(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = TypesError::EmptyField("deviceToken");
        assert_eq!(err.to_string(), "deviceToken must not be empty");
    }

    #[test]
    fn error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<TypesError>();
    }
}
