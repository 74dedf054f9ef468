//! Identity partitions
//!
//! TigerStyle: One arbiter per hosted kind, at most one activation per name.
//!
//! Every member runs one kind-partition per kind it hosts. The partition for
//! kind `K` on member `M` is addressed as `Pid { M, "partition-K" }` and is
//! where remote members send `ActorPidRequest`s for identities `M` owns.
//!
//! ```text
//! ActorPidRequest(kind, name)
//!        │
//!        ▼
//!   KindPartition ── activations: name → Pid
//!        │ miss
//!        ▼
//!   per-name lock ── double check ── ActorSpawner::spawn
//! ```
//!
//! When the membership view changes, records for identities that now belong
//! to another member are handed over with `TakeOwnership`.

use crate::rpc::{ActorPidResponse, RpcHandler, RpcMessage, RpcTransport};
use async_trait::async_trait;
use dashmap::DashMap;
use grotto_core::{ActorIdentity, Pid, ResponseStatusCode};
use grotto_membership::MemberList;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Id prefix of partition actors
pub const PARTITION_ACTOR_ID_PREFIX: &str = "partition-";

/// Address of the partition actor for `kind` on `address`
pub fn partition_pid(address: &str, kind: &str) -> Pid {
    Pid::new(address, format!("{}{}", PARTITION_ACTOR_ID_PREFIX, kind))
}

// =============================================================================
// Activation contract
// =============================================================================

/// Why the local runtime could not activate an identity
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ActivationError {
    #[error("process name already exists: {name} at {existing}")]
    AlreadyExists { name: String, existing: Pid },

    #[error("activation rejected: {reason}")]
    Rejected { reason: String },

    #[error("activation failed: {reason}")]
    Failed { reason: String },
}

impl ActivationError {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected {
            reason: reason.into(),
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }

    pub fn already_exists(name: impl Into<String>, existing: Pid) -> Self {
        Self::AlreadyExists {
            name: name.into(),
            existing,
        }
    }

    /// Pid of the activation that already holds the name
    pub fn existing_pid(&self) -> Option<&Pid> {
        match self {
            Self::AlreadyExists { existing, .. } => Some(existing),
            _ => None,
        }
    }

    /// Status code reported to the requesting member
    pub fn status_code(&self) -> ResponseStatusCode {
        match self {
            Self::AlreadyExists { .. } => ResponseStatusCode::ProcessNameAlreadyExists,
            Self::Rejected { .. } => ResponseStatusCode::Unavailable,
            Self::Failed { .. } => ResponseStatusCode::Error,
        }
    }
}

/// Local actor runtime collaborator
#[async_trait]
pub trait ActorSpawner: Send + Sync {
    /// Activate `identity` on this member and return its pid
    async fn spawn(&self, identity: &ActorIdentity, local_address: &str)
        -> Result<Pid, ActivationError>;
}

// =============================================================================
// KindPartition
// =============================================================================

struct KindPartition {
    kind: String,
    spawner: Arc<dyn ActorSpawner>,
    activations: DashMap<String, Pid>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl KindPartition {
    fn new(kind: String, spawner: Arc<dyn ActorSpawner>) -> Self {
        Self {
            kind,
            spawner,
            activations: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    fn recorded(&self, name: &str) -> Option<Pid> {
        self.activations.get(name).map(|entry| entry.value().clone())
    }

    async fn activate(
        &self,
        identity: &ActorIdentity,
        local_address: &str,
    ) -> Result<Pid, ActivationError> {
        let name = identity.name();
        if let Some(pid) = self.recorded(name) {
            return Ok(pid);
        }

        let lock = Arc::clone(self.locks.entry(name.to_string()).or_default().value());
        let result = {
            let _guard = lock.lock().await;
            match self.recorded(name) {
                Some(pid) => Ok(pid),
                None => match self.spawner.spawn(identity, local_address).await {
                    Ok(pid) => {
                        info!(kind = %self.kind, name = %name, pid = %pid, "Activated actor");
                        self.activations.insert(name.to_string(), pid.clone());
                        Ok(pid)
                    }
                    Err(e) => {
                        warn!(kind = %self.kind, name = %name, error = %e, "Activation failed");
                        Err(e)
                    }
                },
            }
        };

        // Only the table's own reference left means nobody else is waiting
        drop(lock);
        self.locks.remove_if(name, |_, lock| Arc::strong_count(lock) == 1);

        result
    }

    fn remove_pid(&self, pid: &Pid) -> usize {
        let mut removed = 0;
        self.activations.retain(|_, recorded| {
            let keep = *recorded != *pid;
            removed += usize::from(!keep);
            keep
        });
        removed
    }
}

// =============================================================================
// Partition
// =============================================================================

/// Per-member routing table and request handler for owned identities
pub struct Partition {
    member_list: Arc<MemberList>,
    transport: Arc<dyn RpcTransport>,
    kinds: RwLock<HashMap<String, Arc<KindPartition>>>,
    local_address: RwLock<Option<String>>,
    active: AtomicBool,
}

impl Partition {
    pub fn new(member_list: Arc<MemberList>, transport: Arc<dyn RpcTransport>) -> Self {
        Self {
            member_list,
            transport,
            kinds: RwLock::new(HashMap::new()),
            local_address: RwLock::new(None),
            active: AtomicBool::new(false),
        }
    }

    /// Create one kind-partition per hosted kind and start answering requests
    pub fn setup(&self, local_address: &str, kinds: HashMap<String, Arc<dyn ActorSpawner>>) {
        let partitions: HashMap<_, _> = kinds
            .into_iter()
            .map(|(kind, spawner)| {
                let partition = Arc::new(KindPartition::new(kind.clone(), spawner));
                (kind, partition)
            })
            .collect();

        let mut hosted: Vec<_> = partitions.keys().cloned().collect();
        hosted.sort();

        *self.kinds.write().unwrap_or_else(PoisonError::into_inner) = partitions;
        *self
            .local_address
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(local_address.to_string());
        self.active.store(true, Ordering::SeqCst);

        info!(member = %local_address, kinds = ?hosted, "Partition started");
    }

    /// Deactivate every kind-partition
    ///
    /// Requests arriving afterwards are answered `Unavailable`. Activations
    /// already under way still complete.
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        self.kinds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        debug!("Partition stopped");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub fn local_address(&self) -> Option<String> {
        self.local_address
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Kinds with a local kind-partition, sorted
    pub fn hosted_kinds(&self) -> Vec<String> {
        let mut kinds: Vec<_> = self
            .kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        kinds.sort();
        kinds
    }

    /// Partition actor for `kind` on `member_address`
    ///
    /// `None` unless the member is known, alive, and advertises `kind`.
    pub fn partition_for_kind(&self, member_address: &str, kind: &str) -> Option<Pid> {
        let member = self.member_list.member(member_address)?;
        if !member.is_alive() || !member.hosts_kind(kind) {
            return None;
        }
        Some(partition_pid(&member.address, kind))
    }

    /// Pid recorded for `(name, kind)` on this member, if any
    pub fn activation(&self, name: &str, kind: &str) -> Option<Pid> {
        self.kind_partition(kind)?.recorded(name)
    }

    /// Number of identities recorded across all local kind-partitions
    pub fn activation_count(&self) -> usize {
        self.kind_partitions()
            .iter()
            .map(|partition| partition.activations.len())
            .sum()
    }

    fn kind_partition(&self, kind: &str) -> Option<Arc<KindPartition>> {
        self.kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(kind)
            .cloned()
    }

    fn kind_partitions(&self) -> Vec<Arc<KindPartition>> {
        self.kinds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Locate or activate `(name, kind)` on this member
    pub async fn activate(&self, name: &str, kind: &str) -> ActorPidResponse {
        if !self.is_active() {
            return ActorPidResponse::status(ResponseStatusCode::Unavailable);
        }
        let (Some(partition), Some(local)) = (self.kind_partition(kind), self.local_address())
        else {
            debug!(kind = %kind, name = %name, "Kind not hosted here");
            return ActorPidResponse::status(ResponseStatusCode::Unavailable);
        };

        let identity = match ActorIdentity::new(name, kind) {
            Ok(identity) => identity,
            Err(e) => {
                warn!(kind = %kind, name = %name, error = %e, "Rejected invalid identity");
                return ActorPidResponse::status(ResponseStatusCode::Error);
            }
        };

        match partition.activate(&identity, &local).await {
            Ok(pid) => ActorPidResponse::ok(pid),
            Err(e) => ActorPidResponse::rejected(e.existing_pid().cloned(), e.status_code()),
        }
    }

    /// Record an identity handed over by its previous owner
    pub fn take_ownership(&self, kind: &str, name: &str, pid: Pid) -> bool {
        let Some(partition) = self.kind_partition(kind) else {
            warn!(kind = %kind, name = %name, "Ownership offered for unhosted kind");
            return false;
        };
        partition
            .activations
            .entry(name.to_string())
            .or_insert_with(|| pid.clone());
        debug!(kind = %kind, name = %name, pid = %pid, "Took ownership");
        true
    }

    /// Forget activation records pointing at a terminated pid
    pub fn on_terminated(&self, pid: &Pid) -> usize {
        self.kind_partitions()
            .iter()
            .map(|partition| partition.remove_pid(pid))
            .sum()
    }

    /// Hand records this member no longer owns to their new owners
    ///
    /// Returns the number of records transferred. Records whose transfer
    /// fails stay here and are retried on the next membership change.
    pub async fn transfer_ownership(&self) -> usize {
        let Some(local) = self.local_address() else {
            return 0;
        };
        if !self.is_active() {
            return 0;
        }

        let mut transferred = 0;
        for partition in self.kind_partitions() {
            let records: Vec<(String, Pid)> = partition
                .activations
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect();

            for (name, pid) in records {
                let Some(owner) = self.member_list.get_partition(&name, &partition.kind) else {
                    continue;
                };
                if owner == local {
                    continue;
                }

                let target = partition_pid(&owner, &partition.kind);
                let message = RpcMessage::TakeOwnership {
                    kind: partition.kind.clone(),
                    name: name.clone(),
                    pid: pid.clone(),
                };
                match self.transport.send(&target, message).await {
                    Ok(()) => {
                        partition
                            .activations
                            .remove_if(&name, |_, recorded| *recorded == pid);
                        transferred += 1;
                    }
                    Err(e) => {
                        warn!(
                            kind = %partition.kind,
                            name = %name,
                            owner = %owner,
                            error = %e,
                            "Ownership transfer failed"
                        );
                    }
                }
            }
        }

        if transferred > 0 {
            info!(member = %local, transferred, "Transferred ownership after membership change");
        }
        transferred
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("local_address", &self.local_address())
            .field("kinds", &self.hosted_kinds())
            .field("active", &self.is_active())
            .finish()
    }
}

#[async_trait]
impl RpcHandler for Partition {
    async fn handle(&self, from: &str, message: RpcMessage) -> Option<RpcMessage> {
        match message {
            RpcMessage::ActorPidRequest {
                request_id,
                kind,
                name,
            } => {
                let response = self.activate(&name, &kind).await;
                debug!(
                    from = %from,
                    kind = %kind,
                    name = %name,
                    status = %response.status_code,
                    "Answered pid request"
                );
                Some(RpcMessage::ActorPidResponse {
                    request_id,
                    pid: response.pid,
                    status_code: response.status_code,
                })
            }
            RpcMessage::TakeOwnership { kind, name, pid } => {
                self.take_ownership(&kind, &name, pid);
                None
            }
            other => {
                warn!(from = %from, message_type = other.type_name(), "Unexpected message for partition");
                None
            }
        }
    }
}
