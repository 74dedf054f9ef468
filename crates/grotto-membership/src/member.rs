//! Cluster member types
//!
//! TigerStyle: Explicit member lifecycle with validated addresses.

use crate::error::{MembershipError, MembershipResult};
use grotto_core::constants::{ACTOR_KIND_LENGTH_BYTES_MAX, MEMBER_KINDS_COUNT_MAX};
use grotto_core::{join_address, split_address};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Liveness status of a cluster member
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberStatus {
    /// Member is reachable and may own identities
    Alive,
    /// Member stopped answering; treated as gone for placement
    Unreachable,
    /// Member left the cluster
    Left,
}

impl MemberStatus {
    /// Check if the member takes part in placement
    pub fn is_alive(&self) -> bool {
        matches!(self, Self::Alive)
    }
}

impl fmt::Display for MemberStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Alive => write!(f, "alive"),
            Self::Unreachable => write!(f, "unreachable"),
            Self::Left => write!(f, "left"),
        }
    }
}

/// A cluster member as seen by the membership view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    /// `host:port`, unique within the cluster
    pub address: String,
    pub host: String,
    pub port: u16,
    pub status: MemberStatus,
    /// Actor kinds this member can host
    pub kinds: BTreeSet<String>,
    /// Opaque status metadata registered with the provider
    #[serde(default)]
    pub status_value: serde_json::Value,
}

impl Member {
    /// Create an alive member from host, port and kinds
    pub fn new<I, S>(host: impl Into<String>, port: u16, kinds: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let host = host.into();
        Self {
            address: join_address(&host, port),
            host,
            port,
            status: MemberStatus::Alive,
            kinds: kinds.into_iter().map(Into::into).collect(),
            status_value: serde_json::Value::Null,
        }
    }

    /// Create an alive member from a `host:port` address
    pub fn from_address<I, S>(address: &str, kinds: I) -> MembershipResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let (host, port) = split_address(address)?;
        Ok(Self::new(host, port, kinds))
    }

    /// Attach status metadata
    pub fn with_status_value(mut self, value: serde_json::Value) -> Self {
        self.status_value = value;
        self
    }

    /// Set the liveness status
    pub fn with_status(mut self, status: MemberStatus) -> Self {
        self.status = status;
        self
    }

    /// Check if the member advertises the given kind
    pub fn hosts_kind(&self, kind: &str) -> bool {
        self.kinds.contains(kind)
    }

    /// Check if the member takes part in placement
    pub fn is_alive(&self) -> bool {
        self.status.is_alive()
    }

    /// Validate the member payload
    pub fn validate(&self) -> MembershipResult<()> {
        let (host, port) = split_address(&self.address)?;
        if host != self.host || port != self.port {
            return Err(MembershipError::invalid_member(
                &self.address,
                format!("address does not match host {} and port {}", self.host, self.port),
            ));
        }

        if self.kinds.len() > MEMBER_KINDS_COUNT_MAX {
            return Err(MembershipError::invalid_member(
                &self.address,
                format!(
                    "advertises {} kinds, limit {}",
                    self.kinds.len(),
                    MEMBER_KINDS_COUNT_MAX
                ),
            ));
        }

        if let Some(kind) = self
            .kinds
            .iter()
            .find(|k| k.is_empty() || k.len() > ACTOR_KIND_LENGTH_BYTES_MAX)
        {
            return Err(MembershipError::invalid_member(
                &self.address,
                format!("invalid kind '{}'", kind),
            ));
        }

        Ok(())
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.address, self.status)
    }
}
