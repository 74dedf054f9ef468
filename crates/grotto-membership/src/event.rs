//! Membership events and view deltas

use crate::member::{Member, MemberStatus};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonic version of a membership view
///
/// Bumped once per applied event that changes the view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MembershipVersion(pub u64);

impl MembershipVersion {
    /// The next version
    pub fn next(self) -> Self {
        debug_assert!(self.0 < u64::MAX);
        Self(self.0 + 1)
    }
}

impl fmt::Display for MembershipVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A change reported by a membership provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MembershipEvent {
    /// Full snapshot of the cluster; members missing from it have left
    Topology { members: Vec<Member> },
    /// A member joined or re-announced itself
    Joined { member: Member },
    /// A known member changed liveness status
    StatusChanged {
        address: String,
        status: MemberStatus,
    },
    /// A member left the cluster
    Left { address: String },
}

impl MembershipEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Self::Topology { .. } => "topology",
            Self::Joined { .. } => "joined",
            Self::StatusChanged { .. } => "status_changed",
            Self::Left { .. } => "left",
        }
    }
}

/// Difference between two membership views
///
/// `left` holds members that stopped taking part in placement: removed,
/// unreachable, or explicitly left. `joined` holds members that started.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipDelta {
    pub joined: Vec<Member>,
    pub left: Vec<Member>,
}

impl MembershipDelta {
    /// Check if the view changed in a way that affects placement
    pub fn is_empty(&self) -> bool {
        self.joined.is_empty() && self.left.is_empty()
    }

    /// Addresses of members that left
    pub fn left_addresses(&self) -> impl Iterator<Item = &str> {
        self.left.iter().map(|m| m.address.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_next() {
        let v = MembershipVersion::default();
        assert_eq!(v.next(), MembershipVersion(1));
        assert_eq!(v.next().to_string(), "v1");
    }

    #[test]
    fn test_event_serde_tag() {
        let event = MembershipEvent::Left {
            address: "node-a:4020".into(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"left\""));
        assert_eq!(event.name(), "left");
    }

    #[test]
    fn test_delta_empty() {
        let mut delta = MembershipDelta::default();
        assert!(delta.is_empty());
        delta.left.push(Member::new("node-a", 4020, ["Greeter"]));
        assert!(!delta.is_empty());
        assert_eq!(delta.left_addresses().collect::<Vec<_>>(), vec!["node-a:4020"]);
    }
}
