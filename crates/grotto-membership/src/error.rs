//! Membership error types
//!
//! TigerStyle: Explicit error variants with context.

use thiserror::Error;

/// Membership-specific errors
#[derive(Error, Debug)]
pub enum MembershipError {
    /// Member not present in the current view
    #[error("member not found: {address}")]
    MemberNotFound { address: String },

    /// Member payload failed validation
    #[error("invalid member {address}: {reason}")]
    InvalidMember { address: String, reason: String },

    /// View would exceed the configured member limit
    #[error("cluster member limit exceeded: {count} members, limit {limit}")]
    TooManyMembers { count: usize, limit: usize },

    /// View operation attempted while the list is stopped
    #[error("member list is not running")]
    NotRunning,

    /// Internal membership error
    #[error("internal error: {reason}")]
    Internal { reason: String },

    #[error(transparent)]
    Core(#[from] grotto_core::Error),
}

impl MembershipError {
    /// Create a member not found error
    pub fn member_not_found(address: impl Into<String>) -> Self {
        Self::MemberNotFound {
            address: address.into(),
        }
    }

    /// Create an invalid member error
    pub fn invalid_member(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidMember {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Check if this error indicates a retriable condition
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::NotRunning)
    }
}

/// Result type for membership operations
pub type MembershipResult<T> = std::result::Result<T, MembershipError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MembershipError::member_not_found("10.0.0.1:4020");
        assert!(err.to_string().contains("10.0.0.1:4020"));
    }

    #[test]
    fn test_error_retriable() {
        assert!(MembershipError::NotRunning.is_retriable());
        assert!(!MembershipError::invalid_member("x:1", "bad").is_retriable());
    }
}
