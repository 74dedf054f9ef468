//! Membership provider
//!
//! TigerStyle: Narrow collaborator contract, in-memory reference backend.
//!
//! A provider announces this member to the cluster and streams membership
//! changes back. [`InMemoryMembership`] is a shared membership table for
//! members living in one process; each member talks to it through its own
//! [`InMemoryProvider`]. Subscribers receive a full `Topology` snapshot on
//! subscribe and after every change.

use crate::error::{ClusterError, ClusterResult};
use async_trait::async_trait;
use grotto_core::join_address;
use grotto_membership::{Member, MemberStatus, MembershipEvent};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info};

/// Depth of each subscriber's event queue
pub const MEMBERSHIP_EVENT_QUEUE_DEPTH: usize = 256;

/// What a member announces when it registers
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRegistration {
    pub cluster_name: String,
    pub host: String,
    pub port: u16,
    pub kinds: Vec<String>,
    pub status_value: serde_json::Value,
}

impl MemberRegistration {
    /// `host:port` of the registering member
    pub fn address(&self) -> String {
        join_address(&self.host, self.port)
    }

    /// The member as it appears in the view
    pub fn to_member(&self) -> Member {
        Member::new(self.host.clone(), self.port, self.kinds.iter().cloned())
            .with_status_value(self.status_value.clone())
    }
}

/// Membership provider collaborator
#[async_trait]
pub trait MembershipProvider: Send + Sync {
    /// Announce this member; it becomes visible to peers afterwards
    async fn register_member(&self, registration: MemberRegistration) -> ClusterResult<()>;

    /// Stream of membership changes, starting with the current topology
    async fn monitor_member_status_changes(&self) -> ClusterResult<mpsc::Receiver<MembershipEvent>>;

    /// Withdraw this member
    async fn deregister_member(&self) -> ClusterResult<()>;
}

// =============================================================================
// InMemoryMembership
// =============================================================================

#[derive(Default)]
struct HubState {
    members: BTreeMap<String, Member>,
    subscribers: Vec<mpsc::Sender<MembershipEvent>>,
}

impl HubState {
    fn topology(&self) -> MembershipEvent {
        MembershipEvent::Topology {
            members: self.members.values().cloned().collect(),
        }
    }

    async fn publish(&mut self) {
        let event = self.topology();
        let mut live = Vec::with_capacity(self.subscribers.len());
        for subscriber in self.subscribers.drain(..) {
            if subscriber.send(event.clone()).await.is_ok() {
                live.push(subscriber);
            }
        }
        self.subscribers = live;
    }
}

/// Shared membership table for one cluster
pub struct InMemoryMembership {
    cluster_name: String,
    state: Mutex<HubState>,
}

impl InMemoryMembership {
    pub fn new(cluster_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            cluster_name: cluster_name.into(),
            state: Mutex::new(HubState::default()),
        })
    }

    pub fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    /// Add or replace a member and publish
    pub async fn join(&self, member: Member) {
        let mut state = self.state.lock().await;
        info!(cluster = %self.cluster_name, member = %member.address, "Member registered");
        state.members.insert(member.address.clone(), member);
        state.publish().await;
    }

    /// Remove a member and publish; returns false if it was unknown
    pub async fn leave(&self, address: &str) -> bool {
        let mut state = self.state.lock().await;
        if state.members.remove(address).is_none() {
            return false;
        }
        info!(cluster = %self.cluster_name, member = %address, "Member deregistered");
        state.publish().await;
        true
    }

    /// Set a member's status and publish; returns false if it was unknown
    pub async fn set_status(&self, address: &str, status: MemberStatus) -> bool {
        let mut state = self.state.lock().await;
        let Some(member) = state.members.get_mut(address) else {
            return false;
        };
        member.status = status;
        debug!(cluster = %self.cluster_name, member = %address, %status, "Member status changed");
        state.publish().await;
        true
    }

    /// Mark a member unreachable, as a failure detector would
    pub async fn mark_unreachable(&self, address: &str) -> bool {
        self.set_status(address, MemberStatus::Unreachable).await
    }

    /// Snapshot of every registered member
    pub async fn members(&self) -> Vec<Member> {
        self.state.lock().await.members.values().cloned().collect()
    }

    async fn subscribe(&self) -> mpsc::Receiver<MembershipEvent> {
        let (tx, rx) = mpsc::channel(MEMBERSHIP_EVENT_QUEUE_DEPTH);
        let mut state = self.state.lock().await;
        // The queue is empty, so the initial snapshot always fits
        let _ = tx.try_send(state.topology());
        state.subscribers.push(tx);
        rx
    }
}

/// Per-member handle onto an [`InMemoryMembership`]
pub struct InMemoryProvider {
    hub: Arc<InMemoryMembership>,
    registered: Mutex<Option<String>>,
}

impl InMemoryProvider {
    pub fn new(hub: Arc<InMemoryMembership>) -> Self {
        Self {
            hub,
            registered: Mutex::new(None),
        }
    }

    /// Address registered through this provider, if any
    pub async fn registered_address(&self) -> Option<String> {
        self.registered.lock().await.clone()
    }
}

#[async_trait]
impl MembershipProvider for InMemoryProvider {
    async fn register_member(&self, registration: MemberRegistration) -> ClusterResult<()> {
        if registration.cluster_name != self.hub.cluster_name {
            return Err(ClusterError::provider(format!(
                "cluster name mismatch: registering into '{}', provider serves '{}'",
                registration.cluster_name, self.hub.cluster_name
            )));
        }

        let member = registration.to_member();
        member.validate()?;

        let mut registered = self.registered.lock().await;
        if let Some(existing) = registered.as_ref() {
            return Err(ClusterError::provider(format!(
                "provider already registered {}",
                existing
            )));
        }

        let address = member.address.clone();
        self.hub.join(member).await;
        *registered = Some(address);
        Ok(())
    }

    async fn monitor_member_status_changes(&self) -> ClusterResult<mpsc::Receiver<MembershipEvent>> {
        Ok(self.hub.subscribe().await)
    }

    async fn deregister_member(&self) -> ClusterResult<()> {
        let address = self.registered.lock().await.take();
        match address {
            Some(address) => {
                self.hub.leave(&address).await;
                Ok(())
            }
            None => Err(ClusterError::provider("no member registered")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registration(port: u16) -> MemberRegistration {
        MemberRegistration {
            cluster_name: "test".into(),
            host: "127.0.0.1".into(),
            port,
            kinds: vec!["Greeter".into()],
            status_value: serde_json::json!({"ready": true}),
        }
    }

    async fn next_topology(rx: &mut mpsc::Receiver<MembershipEvent>) -> Vec<Member> {
        match rx.recv().await {
            Some(MembershipEvent::Topology { members }) => members,
            other => panic!("expected topology, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_subscribe_receives_snapshot_and_changes() {
        let hub = InMemoryMembership::new("test");
        let provider = InMemoryProvider::new(hub.clone());

        let mut rx = provider.monitor_member_status_changes().await.unwrap();
        assert!(next_topology(&mut rx).await.is_empty());

        provider.register_member(registration(4020)).await.unwrap();
        let members = next_topology(&mut rx).await;
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].address, "127.0.0.1:4020");
        assert_eq!(members[0].status_value["ready"], true);

        assert!(hub.mark_unreachable("127.0.0.1:4020").await);
        let members = next_topology(&mut rx).await;
        assert_eq!(members[0].status, MemberStatus::Unreachable);

        provider.deregister_member().await.unwrap();
        assert!(next_topology(&mut rx).await.is_empty());
    }

    #[tokio::test]
    async fn test_cluster_name_mismatch() {
        let hub = InMemoryMembership::new("other");
        let provider = InMemoryProvider::new(hub);
        let err = provider.register_member(registration(4020)).await.unwrap_err();
        assert!(matches!(err, ClusterError::Provider { .. }));
    }

    #[tokio::test]
    async fn test_double_registration_rejected() {
        let hub = InMemoryMembership::new("test");
        let provider = InMemoryProvider::new(hub.clone());
        provider.register_member(registration(4020)).await.unwrap();
        assert!(provider.register_member(registration(4021)).await.is_err());
        assert_eq!(hub.members().await.len(), 1);
        assert_eq!(
            provider.registered_address().await.as_deref(),
            Some("127.0.0.1:4020")
        );
    }

    #[tokio::test]
    async fn test_deregister_without_register() {
        let provider = InMemoryProvider::new(InMemoryMembership::new("test"));
        assert!(provider.deregister_member().await.is_err());
    }

    #[tokio::test]
    async fn test_dropped_subscriber_is_pruned() {
        let hub = InMemoryMembership::new("test");
        let provider = InMemoryProvider::new(hub.clone());
        let rx = provider.monitor_member_status_changes().await.unwrap();
        drop(rx);

        // Publishing to a closed subscriber must not fail or block
        provider.register_member(registration(4020)).await.unwrap();
        assert!(hub.leave("127.0.0.1:4020").await);
        assert!(!hub.leave("127.0.0.1:4020").await);
    }
}
