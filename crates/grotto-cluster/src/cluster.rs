//! Main cluster coordinator
//!
//! TigerStyle: Single entry point for cluster operations.
//!
//! A [`Cluster`] wires the member list, pid cache and partition to the
//! injected collaborators (membership provider, transport, serialization,
//! runtime), owns the member lifecycle, and runs the identity-resolution
//! protocol:
//!
//! ```text
//! get(name, kind)
//!   ├─ PidCache hit ──────────────────────────────────► (pid, Ok)
//!   ├─ MemberList::get_partition ── no owner ─────────► (None, Unavailable)
//!   ├─ Partition::partition_for_kind
//!   └─ transport.request(partition pid) ── Ok ── cache ► (pid, Ok)
//!                                        ├─ status ────► (remote pid, status), evict
//!                                        ├─ timeout ───► (None, Timeout)
//!                                        └─ fault ─────► (None, Error)
//! ```

use crate::config::ClusterConfig;
use crate::error::{ClusterError, ClusterResult};
use crate::partition::{ActorSpawner, Partition};
use crate::pid_cache::PidCache;
use crate::provider::{MemberRegistration, MembershipProvider};
use crate::rpc::{ActorPidResponse, RequestDeadline, RpcHandler, RpcMessage, RpcTransport};
use crate::serialization::{MessageDescriptor, Serialization};
use async_trait::async_trait;
use grotto_core::constants::ACTOR_KIND_LENGTH_BYTES_MAX;
use grotto_core::{split_address, ActorIdentity, JoinHandle, Pid, ResponseStatusCode, Runtime};
use grotto_membership::{MemberList, MembershipEvent, RoundRobin};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, Weak};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, trace, warn};

/// Cluster state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    /// Cluster not started
    Stopped,
    /// Cluster is initializing
    Initializing,
    /// Cluster is running
    Running,
    /// Cluster is shutting down
    ShuttingDown,
}

/// The main cluster coordinator
pub struct Cluster<RT: Runtime> {
    /// Configuration captured at construction
    config: ClusterConfig,
    /// Membership provider
    provider: Arc<dyn MembershipProvider>,
    /// RPC transport
    transport: Arc<dyn RpcTransport>,
    /// Message serialization
    serialization: Arc<dyn Serialization>,
    /// Runtime for task spawning and time
    runtime: RT,
    member_list: Arc<MemberList>,
    pid_cache: Arc<PidCache>,
    partition: Arc<Partition>,
    round_robin: Arc<RoundRobin>,
    /// Kinds this member hosts, fixed once started
    spawners: RwLock<HashMap<String, Arc<dyn ActorSpawner>>>,
    /// Current cluster state
    state: RwLock<ClusterState>,
    /// Bound address while started
    local_address: std::sync::RwLock<Option<String>>,
    /// Whether the provider currently lists this member
    registered: AtomicBool,
    /// Stops the membership watcher
    watcher_shutdown: std::sync::Mutex<CancellationToken>,
    /// Membership watcher task handle
    watcher_task: Mutex<Option<JoinHandle<()>>>,
}

impl<RT: Runtime> Cluster<RT> {
    /// Create a new cluster member
    pub fn new(
        config: ClusterConfig,
        provider: Arc<dyn MembershipProvider>,
        transport: Arc<dyn RpcTransport>,
        serialization: Arc<dyn Serialization>,
        runtime: RT,
    ) -> Self {
        let member_list = Arc::new(MemberList::new());
        let pid_cache = Arc::new(PidCache::new());
        let partition = Arc::new(Partition::new(member_list.clone(), transport.clone()));
        let round_robin = Arc::new(RoundRobin::new(member_list.clone()));

        Self {
            config,
            provider,
            transport,
            serialization,
            runtime,
            member_list,
            pid_cache,
            partition,
            round_robin,
            spawners: RwLock::new(HashMap::new()),
            state: RwLock::new(ClusterState::Stopped),
            local_address: std::sync::RwLock::new(None),
            registered: AtomicBool::new(false),
            watcher_shutdown: std::sync::Mutex::new(CancellationToken::new()),
            watcher_task: Mutex::new(None),
        }
    }

    /// Get the cluster configuration
    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    /// Get the current cluster state
    pub async fn state(&self) -> ClusterState {
        *self.state.read().await
    }

    /// Check if cluster is running
    pub async fn is_running(&self) -> bool {
        *self.state.read().await == ClusterState::Running
    }

    pub fn member_list(&self) -> &Arc<MemberList> {
        &self.member_list
    }

    pub fn pid_cache(&self) -> &Arc<PidCache> {
        &self.pid_cache
    }

    pub fn partition(&self) -> &Arc<Partition> {
        &self.partition
    }

    pub fn round_robin(&self) -> &Arc<RoundRobin> {
        &self.round_robin
    }

    /// Address this member is reachable at, once started
    pub fn local_address(&self) -> Option<String> {
        self.local_address
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Declare a kind this member hosts
    ///
    /// Only allowed while stopped; the set of kinds is announced at start.
    pub async fn register_kind(
        &self,
        kind: impl Into<String>,
        spawner: Arc<dyn ActorSpawner>,
    ) -> ClusterResult<()> {
        let kind = kind.into();
        if kind.is_empty() || kind.len() > ACTOR_KIND_LENGTH_BYTES_MAX {
            return Err(ClusterError::invalid_config(
                "kind",
                format!(
                    "'{}' must be 1..={} bytes",
                    kind, ACTOR_KIND_LENGTH_BYTES_MAX
                ),
            ));
        }

        let state = self.state.read().await;
        if *state != ClusterState::Stopped {
            return Err(ClusterError::AlreadyStarted);
        }
        self.spawners.write().await.insert(kind, spawner);
        Ok(())
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Start the member and join the cluster
    pub async fn start(&self) -> ClusterResult<()> {
        self.config.validate()?;

        {
            let mut state = self.state.write().await;
            if *state != ClusterState::Stopped {
                return Err(ClusterError::AlreadyStarted);
            }
            *state = ClusterState::Initializing;
        }

        info!(
            cluster = %self.config.cluster_name,
            host = %self.config.host,
            port = self.config.port,
            "Starting cluster member"
        );

        if let Err(e) = self.start_components().await {
            error!(cluster = %self.config.cluster_name, error = %e, "Cluster start failed");
            self.deregister().await;
            self.stop_components().await;
            *self.state.write().await = ClusterState::Stopped;
            return Err(e);
        }

        *self.state.write().await = ClusterState::Running;
        info!(
            cluster = %self.config.cluster_name,
            member = ?self.local_address(),
            "Cluster member started"
        );
        Ok(())
    }

    async fn start_components(&self) -> ClusterResult<()> {
        let handler = PartitionHandler(Arc::downgrade(&self.partition));
        self.transport.set_handler(Arc::new(handler)).await?;
        let address = self
            .transport
            .start(&self.config.host, self.config.port)
            .await?;
        *self
            .local_address
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(address.clone());

        for descriptor in MessageDescriptor::cluster_messages() {
            self.serialization.register(descriptor)?;
        }

        let spawners = self.spawners.read().await.clone();
        let mut kinds: Vec<String> = spawners.keys().cloned().collect();
        kinds.sort();
        self.partition.setup(&address, spawners);
        self.pid_cache.setup();
        self.member_list.setup();

        let (host, port) = split_address(&address)?;
        self.provider
            .register_member(MemberRegistration {
                cluster_name: self.config.cluster_name.clone(),
                host,
                port,
                kinds,
                status_value: self.config.initial_member_status.clone(),
            })
            .await?;
        self.registered.store(true, Ordering::SeqCst);

        let events = self.provider.monitor_member_status_changes().await?;
        self.start_membership_watcher(events).await;
        Ok(())
    }

    async fn start_membership_watcher(&self, events: mpsc::Receiver<MembershipEvent>) {
        let shutdown = CancellationToken::new();
        *self
            .watcher_shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = shutdown.clone();

        let handle = self.runtime.spawn(watch_membership(
            events,
            shutdown,
            self.member_list.clone(),
            self.pid_cache.clone(),
            self.partition.clone(),
        ));
        *self.watcher_task.lock().await = Some(handle);
    }

    /// Leave the cluster and release every component
    ///
    /// Graceful shutdown deregisters first and waits the drain duration so
    /// peers and the ownership transfer can settle; otherwise teardown is
    /// immediate. Resolution fails fast with `Unavailable` from here on.
    pub async fn shutdown(&self, graceful: bool) -> ClusterResult<()> {
        {
            let mut state = self.state.write().await;
            match *state {
                ClusterState::Stopped | ClusterState::ShuttingDown => return Ok(()),
                ClusterState::Initializing => return Err(ClusterError::NotStarted),
                ClusterState::Running => *state = ClusterState::ShuttingDown,
            }
        }

        info!(
            cluster = %self.config.cluster_name,
            member = ?self.local_address(),
            graceful,
            "Shutting down cluster member"
        );

        if graceful {
            self.deregister().await;
            let drain = self.config.shutdown_drain();
            if !drain.is_zero() {
                debug!(drain_ms = self.config.shutdown_drain_ms, "Draining before teardown");
                self.runtime.sleep(drain).await;
            }
        }

        self.stop_components().await;
        *self.state.write().await = ClusterState::Stopped;

        info!(cluster = %self.config.cluster_name, "Cluster member stopped");
        Ok(())
    }

    async fn deregister(&self) {
        if !self.registered.swap(false, Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.provider.deregister_member().await {
            warn!(error = %e, "Failed to deregister from membership provider");
        }
    }

    /// Tear down in dependency order
    async fn stop_components(&self) {
        self.watcher_shutdown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
        if let Some(task) = self.watcher_task.lock().await.take() {
            let _ = task.await;
        }

        self.member_list.stop();
        self.pid_cache.stop();
        self.partition.stop();

        if let Err(e) = self.transport.stop().await {
            warn!(error = %e, "Failed to stop transport");
        }

        *self
            .local_address
            .write()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    // =========================================================================
    // Resolution
    // =========================================================================

    /// Resolve `(name, kind)` to a pid under the configured request timeout
    ///
    /// `Err` only for contract violations: the cluster is not started or the
    /// identity is invalid. Every resolution outcome is an `Ok` carrying a
    /// status code.
    #[instrument(skip(self), level = "debug")]
    pub async fn get(&self, name: &str, kind: &str) -> ClusterResult<ActorPidResponse> {
        let deadline = RequestDeadline::Timeout(self.config.request_timeout());
        self.resolve(name, kind, deadline).await
    }

    /// Resolve `(name, kind)` until `token` is cancelled
    ///
    /// No request timeout applies; cancellation reports `Timeout`.
    #[instrument(skip(self, token), level = "debug")]
    pub async fn get_with_cancellation(
        &self,
        name: &str,
        kind: &str,
        token: CancellationToken,
    ) -> ClusterResult<ActorPidResponse> {
        self.resolve(name, kind, RequestDeadline::Cancellation(token))
            .await
    }

    async fn resolve(
        &self,
        name: &str,
        kind: &str,
        deadline: RequestDeadline,
    ) -> ClusterResult<ActorPidResponse> {
        match self.state().await {
            ClusterState::Running => {}
            ClusterState::ShuttingDown => {
                return Ok(ActorPidResponse::status(ResponseStatusCode::Unavailable))
            }
            ClusterState::Stopped | ClusterState::Initializing => {
                return Err(ClusterError::NotStarted)
            }
        }
        ActorIdentity::new(name, kind)?;

        if let Some(pid) = self.pid_cache.try_get(name) {
            trace!(pid = %pid, "Resolved from cache");
            return Ok(ActorPidResponse::ok(pid));
        }

        let Some(owner) = self.member_list.get_partition(name, kind) else {
            debug!("No member hosts kind");
            return Ok(ActorPidResponse::status(ResponseStatusCode::Unavailable));
        };
        let Some(target) = self.partition.partition_for_kind(&owner, kind) else {
            debug!(owner = %owner, "Owner has no partition for kind");
            return Ok(ActorPidResponse::status(ResponseStatusCode::Unavailable));
        };

        let request = RpcMessage::actor_pid_request(kind, name);
        let reply = self.transport.request(&target, request, deadline).await;
        Ok(self.complete(name, kind, &target, reply))
    }

    /// Translate the single network call's outcome into a status
    fn complete(
        &self,
        name: &str,
        kind: &str,
        target: &Pid,
        reply: ClusterResult<RpcMessage>,
    ) -> ActorPidResponse {
        match reply {
            Ok(RpcMessage::ActorPidResponse {
                pid: Some(pid),
                status_code: ResponseStatusCode::Ok,
                ..
            }) => {
                self.pid_cache.try_add(name, pid.clone());
                debug!(pid = %pid, "Resolved from partition");
                ActorPidResponse::ok(pid)
            }
            Ok(RpcMessage::ActorPidResponse {
                pid: None,
                status_code: ResponseStatusCode::Ok,
                ..
            }) => {
                error!(target = %target, kind = %kind, name = %name, "Partition answered Ok without a pid");
                ActorPidResponse::status(ResponseStatusCode::Error)
            }
            Ok(RpcMessage::ActorPidResponse {
                pid, status_code, ..
            }) => {
                self.pid_cache.remove(name);
                debug!(target = %target, status = %status_code, pid = ?pid, "Partition could not resolve");
                ActorPidResponse::rejected(pid, status_code)
            }
            Ok(other) => {
                error!(
                    target = %target,
                    kind = %kind,
                    name = %name,
                    message_type = other.type_name(),
                    "Unexpected reply to pid request"
                );
                ActorPidResponse::status(ResponseStatusCode::Error)
            }
            Err(e) if e.is_timeout() => {
                warn!(target = %target, kind = %kind, name = %name, error = %e, "Pid request timed out");
                ActorPidResponse::status(ResponseStatusCode::Timeout)
            }
            Err(e) => {
                error!(target = %target, kind = %kind, name = %name, error = %e, "Pid request failed");
                ActorPidResponse::status(ResponseStatusCode::Error)
            }
        }
    }

    /// Termination hook for the local actor runtime
    ///
    /// Forgets the pid everywhere it is recorded so the next `get` for its
    /// identity resolves afresh.
    pub fn notify_terminated(&self, pid: &Pid) {
        let cached = self.pid_cache.on_terminated(pid);
        let recorded = self.partition.on_terminated(pid);
        debug!(pid = %pid, cached, recorded, "Actor terminated");
    }
}

impl<RT: Runtime> std::fmt::Debug for Cluster<RT> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cluster")
            .field("cluster_name", &self.config.cluster_name)
            .field("local_address", &self.local_address())
            .field("partition", &self.partition)
            .finish_non_exhaustive()
    }
}

impl<RT: Runtime> Drop for Cluster<RT> {
    fn drop(&mut self) {
        // Stops the watcher even when `shutdown` was never called
        self.watcher_shutdown
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();
    }
}

/// Transport-facing handler; the transport must not keep the partition alive
struct PartitionHandler(Weak<Partition>);

#[async_trait]
impl RpcHandler for PartitionHandler {
    async fn handle(&self, from: &str, message: RpcMessage) -> Option<RpcMessage> {
        let partition = self.0.upgrade()?;
        partition.handle(from, message).await
    }
}

/// Apply membership events until cancelled or the stream ends
async fn watch_membership(
    mut events: mpsc::Receiver<MembershipEvent>,
    shutdown: CancellationToken,
    member_list: Arc<MemberList>,
    pid_cache: Arc<PidCache>,
    partition: Arc<Partition>,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            event = events.recv() => match event {
                Some(event) => event,
                None => {
                    debug!("Membership stream closed");
                    break;
                }
            },
        };

        let event_name = event.name();
        let delta = match member_list.apply(event) {
            Ok(delta) => delta,
            Err(e) => {
                warn!(event = event_name, error = %e, "Failed to apply membership event");
                continue;
            }
        };
        if delta.is_empty() {
            continue;
        }

        for address in delta.left_addresses() {
            let evicted = pid_cache.remove_by_member(address);
            debug!(member = %address, evicted, "Evicted cached pids of departed member");
        }
        partition.transfer_ownership().await;
    }
}
