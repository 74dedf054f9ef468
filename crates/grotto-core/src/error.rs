//! Error types for Grotto
//!
//! TigerStyle: Explicit error types with context, using thiserror.

use thiserror::Error;

/// Result type alias for Grotto core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Grotto core error types
#[derive(Error, Debug)]
pub enum Error {
    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Invalid actor identity: {identity}, reason: {reason}")]
    InvalidIdentity { identity: String, reason: String },

    #[error("Actor {field} too long: {length} bytes exceeds limit of {limit} bytes")]
    IdentityTooLong {
        field: &'static str,
        length: usize,
        limit: usize,
    },

    #[error("Invalid address: {address}, reason: {reason}")]
    InvalidAddress { address: String, reason: String },

    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid configuration: {field}, reason: {reason}")]
    InvalidConfiguration { field: String, reason: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    #[error("Internal error: {reason}")]
    Internal { reason: String },

    #[error("Serialization failed: {reason}")]
    SerializationFailed { reason: String },

    #[error("Deserialization failed: {reason}")]
    DeserializationFailed { reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Create an invalid identity error
    pub fn invalid_identity(identity: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidIdentity {
            identity: identity.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_configuration(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfiguration {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Check if this error is a caller contract violation rather than a runtime fault
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentity { .. }
                | Self::IdentityTooLong { .. }
                | Self::InvalidAddress { .. }
                | Self::InvalidConfiguration { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::invalid_identity("Greeter/", "name must not be empty");
        assert!(err.to_string().contains("Greeter/"));
        assert!(err.to_string().contains("must not be empty"));
    }

    #[test]
    fn test_error_contract_violation() {
        assert!(Error::invalid_configuration("cluster_name", "empty").is_contract_violation());
        assert!(!Error::internal("boom").is_contract_violation());
    }

    #[test]
    fn test_error_from_anyhow() {
        let err: Error = anyhow::anyhow!("provider backend down").into();
        assert!(matches!(err, Error::Other(_)));
        assert_eq!(err.to_string(), "provider backend down");
    }
}
