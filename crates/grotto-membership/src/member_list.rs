//! Cluster membership view
//!
//! TigerStyle: Immutable snapshots, single writer path, explicit deltas.
//!
//! The member list owns the current set of known members. Lookups clone an
//! `Arc` of the current [`MembershipView`] and never wait behind each other;
//! provider events are applied through [`MemberList::apply`], which builds
//! the next view, swaps it in, and reports who joined and who left.

use crate::error::{MembershipError, MembershipResult};
use crate::event::{MembershipDelta, MembershipEvent, MembershipVersion};
use crate::member::{Member, MemberStatus};
use crate::round_robin::MemberSource;
use crate::strategy::{default_strategy_factory, MemberStrategy, StrategyFactory};
use grotto_core::constants::CLUSTER_MEMBERS_COUNT_MAX;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Immutable snapshot of the membership view
#[derive(Debug, Default, Clone)]
pub struct MembershipView {
    version: MembershipVersion,
    /// Every known member keyed by address, including non-alive ones
    members: BTreeMap<String, Member>,
    strategies: HashMap<String, Arc<dyn MemberStrategy>>,
}

impl MembershipView {
    pub fn version(&self) -> MembershipVersion {
        self.version
    }

    /// Alive members ordered by address
    pub fn alive_members(&self) -> impl Iterator<Item = &Member> {
        self.members.values().filter(|m| m.is_alive())
    }

    pub fn member(&self, address: &str) -> Option<&Member> {
        self.members.get(address)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The member list
pub struct MemberList {
    view: RwLock<Arc<MembershipView>>,
    running: AtomicBool,
    strategy_factory: StrategyFactory,
}

impl MemberList {
    /// Create a stopped member list using the default strategy per kind
    pub fn new() -> Self {
        Self::with_strategy_factory(default_strategy_factory())
    }

    /// Create a stopped member list with a custom per-kind strategy
    pub fn with_strategy_factory(strategy_factory: StrategyFactory) -> Self {
        Self {
            view: RwLock::new(Arc::new(MembershipView::default())),
            running: AtomicBool::new(false),
            strategy_factory,
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start accepting membership events
    pub fn setup(&self) {
        self.running.store(true, Ordering::SeqCst);
        debug!("Member list started");
    }

    /// Stop and clear the view
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        let mut guard = self.view.write().unwrap_or_else(PoisonError::into_inner);
        let next = MembershipView {
            version: guard.version.next(),
            ..MembershipView::default()
        };
        *guard = Arc::new(next);
        debug!("Member list stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // =========================================================================
    // Lookups
    // =========================================================================

    /// Current snapshot
    pub fn snapshot(&self) -> Arc<MembershipView> {
        self.view.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn version(&self) -> MembershipVersion {
        self.snapshot().version
    }

    /// Address of the member owning `(name, kind)`, or `None` if no alive
    /// member advertises `kind`
    pub fn get_partition(&self, name: &str, kind: &str) -> Option<String> {
        let view = self.snapshot();
        view.strategies.get(kind)?.partition(name)
    }

    /// Address of a member to activate a stateless actor of `kind` on
    pub fn get_activator(&self, kind: &str) -> Option<String> {
        let view = self.snapshot();
        view.strategies.get(kind)?.activator()
    }

    /// Alive members ordered by address
    pub fn get_all_members(&self) -> Vec<Member> {
        self.snapshot().alive_members().cloned().collect()
    }

    /// Alive members advertising `kind`, ordered by address
    pub fn members_for_kind(&self, kind: &str) -> Vec<Member> {
        self.snapshot()
            .alive_members()
            .filter(|m| m.hosts_kind(kind))
            .cloned()
            .collect()
    }

    /// Any known member by address, whatever its status
    pub fn member(&self, address: &str) -> Option<Member> {
        self.snapshot().member(address).cloned()
    }

    pub fn strategy_for_kind(&self, kind: &str) -> Option<Arc<dyn MemberStrategy>> {
        self.snapshot().strategies.get(kind).cloned()
    }

    // =========================================================================
    // Updates
    // =========================================================================

    /// Apply a provider event and report the placement-relevant changes
    ///
    /// A member counts as left once it is removed or stops being alive, and
    /// as joined once it becomes alive or re-announces different kinds.
    pub fn apply(&self, event: MembershipEvent) -> MembershipResult<MembershipDelta> {
        if !self.is_running() {
            return Err(MembershipError::NotRunning);
        }

        let mut guard = self.view.write().unwrap_or_else(PoisonError::into_inner);
        let current = guard.clone();

        let next_members = Self::next_members(&current.members, &event)?;
        if next_members == current.members {
            return Ok(MembershipDelta::default());
        }

        let delta = Self::diff(&current.members, &next_members);
        let strategies = self.build_strategies(&next_members);

        let version = current.version.next();
        *guard = Arc::new(MembershipView {
            version,
            members: next_members,
            strategies,
        });
        drop(guard);

        for member in &delta.joined {
            info!(member = %member.address, kinds = ?member.kinds, %version, "Member joined");
        }
        for member in &delta.left {
            info!(member = %member.address, status = %member.status, %version, "Member left");
        }

        Ok(delta)
    }

    fn next_members(
        current: &BTreeMap<String, Member>,
        event: &MembershipEvent,
    ) -> MembershipResult<BTreeMap<String, Member>> {
        let next = match event {
            MembershipEvent::Topology { members } => {
                let mut next = BTreeMap::new();
                for member in members {
                    if let Err(e) = member.validate() {
                        warn!(member = %member.address, error = %e, "Ignoring invalid member in topology");
                        continue;
                    }
                    next.insert(member.address.clone(), member.clone());
                }
                next
            }
            MembershipEvent::Joined { member } => {
                member.validate()?;
                let mut next = current.clone();
                next.insert(member.address.clone(), member.clone());
                next
            }
            MembershipEvent::StatusChanged { address, status } => {
                let mut next = current.clone();
                if *status == MemberStatus::Left {
                    next.remove(address);
                } else if let Some(member) = next.get_mut(address) {
                    member.status = *status;
                } else {
                    debug!(member = %address, %status, "Status change for unknown member");
                }
                next
            }
            MembershipEvent::Left { address } => {
                let mut next = current.clone();
                next.remove(address);
                next
            }
        };

        if next.len() > CLUSTER_MEMBERS_COUNT_MAX {
            return Err(MembershipError::TooManyMembers {
                count: next.len(),
                limit: CLUSTER_MEMBERS_COUNT_MAX,
            });
        }

        Ok(next)
    }

    fn diff(before: &BTreeMap<String, Member>, after: &BTreeMap<String, Member>) -> MembershipDelta {
        let mut delta = MembershipDelta::default();

        for (address, old) in before.iter().filter(|(_, m)| m.is_alive()) {
            match after.get(address) {
                Some(new) if new.is_alive() => {
                    if new.kinds != old.kinds {
                        delta.joined.push(new.clone());
                    }
                }
                Some(new) => delta.left.push(new.clone()),
                None => delta.left.push(old.clone().with_status(MemberStatus::Left)),
            }
        }

        for (address, new) in after.iter().filter(|(_, m)| m.is_alive()) {
            let was_alive = before.get(address).is_some_and(|m| m.is_alive());
            if !was_alive {
                delta.joined.push(new.clone());
            }
        }

        delta
    }

    /// Fresh per-kind strategies over the alive members of `members`
    fn build_strategies(
        &self,
        members: &BTreeMap<String, Member>,
    ) -> HashMap<String, Arc<dyn MemberStrategy>> {
        let mut strategies: HashMap<String, Arc<dyn MemberStrategy>> = HashMap::new();
        for member in members.values().filter(|m| m.is_alive()) {
            for kind in &member.kinds {
                strategies
                    .entry(kind.clone())
                    .or_insert_with(|| (self.strategy_factory)(kind))
                    .add_member(member.clone());
            }
        }
        strategies
    }
}

impl Default for MemberList {
    fn default() -> Self {
        Self::new()
    }
}

impl MemberSource for MemberList {
    fn all_members(&self) -> Vec<Member> {
        self.get_all_members()
    }
}

impl std::fmt::Debug for MemberList {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let view = self.snapshot();
        f.debug_struct("MemberList")
            .field("version", &view.version)
            .field("members", &view.members.len())
            .field("running", &self.is_running())
            .finish()
    }
}
