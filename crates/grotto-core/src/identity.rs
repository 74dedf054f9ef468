//! Actor identities and resolved process ids
//!
//! TigerStyle: Explicit types, validation on construction, immutable values.

use crate::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

// =============================================================================
// ActorIdentity
// =============================================================================

/// Logical identity of a (possibly not yet activated) actor
///
/// An identity is a `(name, kind)` pair. The kind selects which members can
/// host the actor, the name selects the instance. Identities carry no
/// location; resolving one yields a [`Pid`].
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct ActorIdentity {
    name: String,
    kind: String,
}

impl ActorIdentity {
    /// Create a new identity with validation
    ///
    /// # Errors
    /// Returns error if either part is empty, exceeds its length limit, or
    /// contains control characters.
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let kind = kind.into();

        if name.is_empty() {
            return Err(Error::invalid_identity(
                format!("{}/{}", kind, name),
                "name must not be empty",
            ));
        }
        if kind.is_empty() {
            return Err(Error::invalid_identity(
                format!("{}/{}", kind, name),
                "kind must not be empty",
            ));
        }

        if name.len() > ACTOR_NAME_LENGTH_BYTES_MAX {
            return Err(Error::IdentityTooLong {
                field: "name",
                length: name.len(),
                limit: ACTOR_NAME_LENGTH_BYTES_MAX,
            });
        }
        if kind.len() > ACTOR_KIND_LENGTH_BYTES_MAX {
            return Err(Error::IdentityTooLong {
                field: "kind",
                length: kind.len(),
                limit: ACTOR_KIND_LENGTH_BYTES_MAX,
            });
        }

        if name.chars().any(char::is_control) || kind.chars().any(char::is_control) {
            return Err(Error::invalid_identity(
                format!("{}/{}", kind, name),
                "identity contains control characters",
            ));
        }

        Ok(Self { name, kind })
    }

    /// Create an identity without validation (for internal use only)
    #[doc(hidden)]
    pub fn new_unchecked(name: String, kind: String) -> Self {
        debug_assert!(!name.is_empty());
        debug_assert!(!kind.is_empty());
        Self { name, kind }
    }

    /// Get the actor name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the actor kind
    pub fn kind(&self) -> &str {
        &self.kind
    }
}

impl fmt::Display for ActorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.name)
    }
}

// =============================================================================
// Pid
// =============================================================================

/// Physical address of an activated actor
///
/// `address` is the hosting member (`host:port`), `id` is the mailbox
/// identifier local to that member.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Pid {
    /// Address of the member hosting the actor
    pub address: String,
    /// Member-local process identifier
    pub id: String,
}

impl Pid {
    /// Create a new pid
    pub fn new(address: impl Into<String>, id: impl Into<String>) -> Self {
        let pid = Self {
            address: address.into(),
            id: id.into(),
        };
        debug_assert!(!pid.address.is_empty(), "pid address must not be empty");
        debug_assert!(!pid.id.is_empty(), "pid id must not be empty");
        pid
    }

    /// Check whether this pid lives on the given member
    pub fn is_hosted_by(&self, address: &str) -> bool {
        self.address == address
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.id)
    }
}

// =============================================================================
// Addresses
// =============================================================================

/// Split a `host:port` member address into its parts
///
/// The port is taken after the last colon so bracketed IPv6 hosts survive.
pub fn split_address(address: &str) -> Result<(String, u16)> {
    if address.len() > MEMBER_ADDRESS_LENGTH_BYTES_MAX {
        return Err(Error::InvalidAddress {
            address: address.to_string(),
            reason: format!("length exceeds limit {}", MEMBER_ADDRESS_LENGTH_BYTES_MAX),
        });
    }

    let (host, port) = address.rsplit_once(':').ok_or_else(|| Error::InvalidAddress {
        address: address.to_string(),
        reason: "must be in host:port format".into(),
    })?;

    if host.is_empty() {
        return Err(Error::InvalidAddress {
            address: address.to_string(),
            reason: "host must not be empty".into(),
        });
    }

    let port = port.parse::<u16>().map_err(|e| Error::InvalidAddress {
        address: address.to_string(),
        reason: format!("invalid port: {}", e),
    })?;

    Ok((host.to_string(), port))
}

/// Join a host and port into a member address
pub fn join_address(host: &str, port: u16) -> String {
    debug_assert!(!host.is_empty());
    format!("{}:{}", host, port)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_valid() {
        let identity = ActorIdentity::new("alice", "Greeter").unwrap();
        assert_eq!(identity.name(), "alice");
        assert_eq!(identity.kind(), "Greeter");
        assert_eq!(identity.to_string(), "Greeter/alice");
    }

    #[test]
    fn test_identity_rejects_empty_parts() {
        assert!(ActorIdentity::new("", "Greeter").is_err());
        assert!(ActorIdentity::new("alice", "").is_err());
    }

    #[test]
    fn test_identity_too_long() {
        let long_name = "a".repeat(ACTOR_NAME_LENGTH_BYTES_MAX + 1);
        let result = ActorIdentity::new(long_name, "Greeter");
        assert!(matches!(
            result,
            Err(Error::IdentityTooLong { field: "name", .. })
        ));

        let long_kind = "k".repeat(ACTOR_KIND_LENGTH_BYTES_MAX + 1);
        let result = ActorIdentity::new("alice", long_kind);
        assert!(matches!(
            result,
            Err(Error::IdentityTooLong { field: "kind", .. })
        ));
    }

    #[test]
    fn test_identity_rejects_control_chars() {
        assert!(ActorIdentity::new("ali\nce", "Greeter").is_err());
    }

    #[test]
    fn test_identity_allows_path_like_names() {
        // Names are opaque to the cluster; slashes and colons are fine
        let identity = ActorIdentity::new("tenant-1/user:42", "Session").unwrap();
        assert_eq!(identity.name(), "tenant-1/user:42");
    }

    #[test]
    fn test_pid_display_and_host() {
        let pid = Pid::new("10.0.0.1:4020", "g-1");
        assert_eq!(pid.to_string(), "10.0.0.1:4020/g-1");
        assert!(pid.is_hosted_by("10.0.0.1:4020"));
        assert!(!pid.is_hosted_by("10.0.0.2:4020"));
    }

    #[test]
    fn test_pid_serde() {
        let pid = Pid::new("node-a:4020", "g-1");
        let json = serde_json::to_string(&pid).unwrap();
        assert_eq!(json, r#"{"address":"node-a:4020","id":"g-1"}"#);
    }

    #[test]
    fn test_split_address() {
        assert_eq!(
            split_address("127.0.0.1:4020").unwrap(),
            ("127.0.0.1".to_string(), 4020)
        );
        assert_eq!(
            split_address("[::1]:4020").unwrap(),
            ("[::1]".to_string(), 4020)
        );
        assert!(split_address("no-port").is_err());
        assert!(split_address(":4020").is_err());
        assert!(split_address("host:notaport").is_err());
    }

    #[test]
    fn test_join_address() {
        assert_eq!(join_address("node-a", 4020), "node-a:4020");
    }
}
