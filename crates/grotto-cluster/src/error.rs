//! Cluster error types
//!
//! TigerStyle: Explicit error variants with context.
//!
//! Resolution outcomes travel as [`grotto_core::ResponseStatusCode`]; these
//! errors cover lifecycle contract violations and collaborator faults. The
//! transport variants never escape `Cluster::get`, which maps them to codes.

use grotto_core::Pid;
use grotto_membership::MembershipError;
use thiserror::Error;

/// Cluster-specific errors
#[derive(Error, Debug)]
pub enum ClusterError {
    /// Cluster not started
    #[error("cluster not started")]
    NotStarted,

    /// Cluster already started
    #[error("cluster already started")]
    AlreadyStarted,

    /// Configuration rejected at start
    #[error("invalid cluster config: {field}: {reason}")]
    InvalidConfig { field: String, reason: String },

    /// Request got no response in time
    #[error("RPC to {target} timed out after {timeout_ms}ms")]
    RpcTimeout { target: String, timeout_ms: u64 },

    /// Caller cancelled the request
    #[error("RPC to {target} cancelled")]
    Cancelled { target: String },

    /// Request could not be completed
    #[error("RPC to {target} failed: {reason}")]
    RpcFailed { target: String, reason: String },

    /// No route to the member
    #[error("member {address} unreachable: {reason}")]
    MemberUnreachable { address: String, reason: String },

    /// Message could not be encoded or decoded
    #[error("serialization error: {reason}")]
    Serialization { reason: String },

    /// Membership provider failed
    #[error("membership provider error: {reason}")]
    Provider { reason: String },

    /// Membership view error
    #[error("membership error: {0}")]
    Membership(#[from] MembershipError),

    /// Core error
    #[error("core error: {0}")]
    Core(#[from] grotto_core::Error),

    /// Internal error
    #[error("internal error: {reason}")]
    Internal { reason: String },
}

impl ClusterError {
    /// Create an invalid config error
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create an RPC timeout error
    pub fn rpc_timeout(target: &Pid, timeout_ms: u64) -> Self {
        Self::RpcTimeout {
            target: target.to_string(),
            timeout_ms,
        }
    }

    /// Create an RPC failed error
    pub fn rpc_failed(target: &Pid, reason: impl Into<String>) -> Self {
        Self::RpcFailed {
            target: target.to_string(),
            reason: reason.into(),
        }
    }

    /// Create a member unreachable error
    pub fn member_unreachable(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MemberUnreachable {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(reason: impl Into<String>) -> Self {
        Self::Serialization {
            reason: reason.into(),
        }
    }

    /// Create a provider error
    pub fn provider(reason: impl Into<String>) -> Self {
        Self::Provider {
            reason: reason.into(),
        }
    }

    /// Create an internal error
    pub fn internal(reason: impl Into<String>) -> Self {
        Self::Internal {
            reason: reason.into(),
        }
    }

    /// Check if this error is a client-side timeout or cancellation
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::RpcTimeout { .. } | Self::Cancelled { .. })
    }

    /// Check if this error is retriable
    pub fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::RpcTimeout { .. }
                | Self::RpcFailed { .. }
                | Self::MemberUnreachable { .. }
                | Self::Provider { .. }
                | Self::Membership(MembershipError::NotRunning)
        )
    }
}

/// Result type for cluster operations
pub type ClusterResult<T> = std::result::Result<T, ClusterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClusterError::rpc_timeout(&Pid::new("node-a:4020", "partition-Greeter"), 5000);
        let msg = err.to_string();
        assert!(msg.contains("node-a:4020/partition-Greeter"));
        assert!(msg.contains("5000ms"));
    }

    #[test]
    fn test_error_is_timeout() {
        let pid = Pid::new("node-a:4020", "partition-Greeter");
        assert!(ClusterError::rpc_timeout(&pid, 10).is_timeout());
        assert!(ClusterError::Cancelled {
            target: pid.to_string()
        }
        .is_timeout());
        assert!(!ClusterError::rpc_failed(&pid, "closed").is_timeout());
    }

    #[test]
    fn test_error_retriable() {
        let pid = Pid::new("node-a:4020", "partition-Greeter");
        assert!(ClusterError::rpc_timeout(&pid, 10).is_retriable());
        assert!(ClusterError::member_unreachable("node-a:4020", "gone").is_retriable());
        assert!(!ClusterError::NotStarted.is_retriable());
        assert!(!ClusterError::invalid_config("host", "empty").is_retriable());
    }
}
