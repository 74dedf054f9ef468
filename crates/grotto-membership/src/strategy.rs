//! Per-kind member strategies
//!
//! TigerStyle: One strategy per actor kind, owned by the member list.
//!
//! A strategy tracks the alive members that advertise one kind and answers
//! two questions about them: who owns a given identity (`partition`), and
//! who should take the next stateless activation (`activator`).
//!
//! Strategies belong to exactly one membership view. The member list fills a
//! fresh set for every view it publishes and never touches them afterwards.

use crate::member::Member;
use crate::placement::select_owner;
use crate::round_robin::{MemberSource, RoundRobin};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

/// Strategy for choosing members of one kind
pub trait MemberStrategy: MemberSource + fmt::Debug {
    /// The kind this strategy serves
    fn kind(&self) -> &str;

    /// Add a member, replacing any entry with the same address
    fn add_member(&self, member: Member);

    /// Address of the member owning identity `name`, if any
    fn partition(&self, name: &str) -> Option<String>;

    /// Address of a member to activate a stateless actor on, if any
    fn activator(&self) -> Option<String>;
}

/// Factory creating the strategy for a newly seen kind
pub type StrategyFactory = Arc<dyn Fn(&str) -> Arc<dyn MemberStrategy> + Send + Sync>;

/// The factory used unless the member list is given another
pub fn default_strategy_factory() -> StrategyFactory {
    Arc::new(|kind: &str| Arc::new(DefaultMemberStrategy::new(kind)) as Arc<dyn MemberStrategy>)
}

// =============================================================================
// MemberSet
// =============================================================================

/// Address-ordered set of members behind a read-mostly lock
#[derive(Debug, Default)]
pub struct MemberSet {
    members: RwLock<Vec<Member>>,
}

impl MemberSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace by address
    pub fn upsert(&self, member: Member) {
        let mut members = self.members.write().unwrap_or_else(PoisonError::into_inner);
        match members.binary_search_by(|m| m.address.as_str().cmp(&member.address)) {
            Ok(idx) => members[idx] = member,
            Err(idx) => members.insert(idx, member),
        }
    }

    pub fn len(&self) -> usize {
        self.members.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn owner_of(&self, name: &str, kind: &str) -> Option<String> {
        let members = self.members.read().unwrap_or_else(PoisonError::into_inner);
        select_owner(
            members.iter().filter(|m| m.is_alive()).map(|m| m.address.as_str()),
            name,
            kind,
        )
        .map(str::to_string)
    }
}

impl MemberSource for MemberSet {
    fn all_members(&self) -> Vec<Member> {
        self.members
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| m.is_alive())
            .cloned()
            .collect()
    }
}

// =============================================================================
// DefaultMemberStrategy
// =============================================================================

/// Rendezvous placement for `partition`, round robin for `activator`
pub struct DefaultMemberStrategy {
    kind: String,
    members: Arc<MemberSet>,
    round_robin: RoundRobin,
}

impl DefaultMemberStrategy {
    pub fn new(kind: impl Into<String>) -> Self {
        let kind = kind.into();
        debug_assert!(!kind.is_empty());

        let members = Arc::new(MemberSet::new());
        let round_robin = RoundRobin::new(members.clone());
        Self {
            kind,
            members,
            round_robin,
        }
    }
}

impl fmt::Debug for DefaultMemberStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultMemberStrategy")
            .field("kind", &self.kind)
            .field("members", &self.members.len())
            .finish()
    }
}

impl MemberSource for DefaultMemberStrategy {
    fn all_members(&self) -> Vec<Member> {
        self.members.all_members()
    }
}

impl MemberStrategy for DefaultMemberStrategy {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn add_member(&self, member: Member) {
        debug_assert!(member.hosts_kind(&self.kind));
        self.members.upsert(member);
    }

    fn partition(&self, name: &str) -> Option<String> {
        self.members.owner_of(name, &self.kind)
    }

    fn activator(&self) -> Option<String> {
        let address = self.round_robin.get_node();
        if address.is_empty() {
            None
        } else {
            Some(address)
        }
    }
}
