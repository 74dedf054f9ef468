//! Shared harness for cluster integration tests
//!
//! Members live in one process: they share an `InMemoryMembership` hub and a
//! `MemoryNetwork`. Transports and providers are wrapped so tests can count
//! network calls and observe lifecycle ordering.

#![allow(dead_code)]

use async_trait::async_trait;
use grotto_cluster::{
    ActivationError, ActorSpawner, Cluster, ClusterConfig, ClusterResult, InMemoryMembership,
    InMemoryProvider, JsonSerialization, MemberRegistration, MembershipProvider, MemoryNetwork,
    MemoryTransport, RequestDeadline, RpcHandler, RpcMessage, RpcTransport,
};
use grotto_core::{ActorIdentity, Pid, TokioRuntime};
use grotto_membership::MembershipEvent;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub const GREETER: &str = "Greeter";

// =============================================================================
// Spawner
// =============================================================================

/// Activates actors as `g-<n>` on the local member
pub struct GreeterSpawner {
    spawned: AtomicUsize,
    delay: Duration,
}

impl GreeterSpawner {
    pub fn new() -> Arc<Self> {
        Self::with_delay(Duration::ZERO)
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            spawned: AtomicUsize::new(0),
            delay,
        })
    }

    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActorSpawner for GreeterSpawner {
    async fn spawn(
        &self,
        _identity: &ActorIdentity,
        local_address: &str,
    ) -> Result<Pid, ActivationError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let n = self.spawned.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Pid::new(local_address, format!("g-{}", n)))
    }
}

/// Refuses every activation
pub struct RejectingSpawner;

#[async_trait]
impl ActorSpawner for RejectingSpawner {
    async fn spawn(&self, _: &ActorIdentity, _: &str) -> Result<Pid, ActivationError> {
        Err(ActivationError::rejected("not accepting activations"))
    }
}

/// Reports every name as already held by `existing` on the local member
pub struct DuplicateSpawner;

#[async_trait]
impl ActorSpawner for DuplicateSpawner {
    async fn spawn(
        &self,
        identity: &ActorIdentity,
        local_address: &str,
    ) -> Result<Pid, ActivationError> {
        Err(ActivationError::already_exists(
            identity.name(),
            Pid::new(local_address, "existing"),
        ))
    }
}

// =============================================================================
// Recording collaborators
// =============================================================================

/// Ordered log of collaborator calls
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<&'static str>>>);

impl CallLog {
    pub fn record(&self, call: &'static str) {
        self.0.lock().unwrap().push(call);
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.0.lock().unwrap().clone()
    }
}

/// Transport wrapper counting outbound requests
pub struct CountingTransport {
    inner: Arc<dyn RpcTransport>,
    requests: AtomicUsize,
    log: CallLog,
}

impl CountingTransport {
    pub fn new(inner: Arc<dyn RpcTransport>, log: CallLog) -> Self {
        Self {
            inner,
            requests: AtomicUsize::new(0),
            log,
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcTransport for CountingTransport {
    async fn set_handler(&self, handler: Arc<dyn RpcHandler>) -> ClusterResult<()> {
        self.inner.set_handler(handler).await
    }

    async fn start(&self, host: &str, port: u16) -> ClusterResult<String> {
        self.log.record("transport.start");
        self.inner.start(host, port).await
    }

    async fn request(
        &self,
        target: &Pid,
        message: RpcMessage,
        deadline: RequestDeadline,
    ) -> ClusterResult<RpcMessage> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.inner.request(target, message, deadline).await
    }

    async fn send(&self, target: &Pid, message: RpcMessage) -> ClusterResult<()> {
        self.inner.send(target, message).await
    }

    async fn stop(&self) -> ClusterResult<()> {
        self.log.record("transport.stop");
        self.inner.stop().await
    }

    fn local_address(&self) -> Option<String> {
        self.inner.local_address()
    }
}

/// Provider wrapper logging lifecycle calls
pub struct RecordingProvider {
    inner: InMemoryProvider,
    log: CallLog,
}

impl RecordingProvider {
    pub fn new(hub: Arc<InMemoryMembership>, log: CallLog) -> Self {
        Self {
            inner: InMemoryProvider::new(hub),
            log,
        }
    }
}

#[async_trait]
impl MembershipProvider for RecordingProvider {
    async fn register_member(&self, registration: MemberRegistration) -> ClusterResult<()> {
        self.log.record("provider.register");
        self.inner.register_member(registration).await
    }

    async fn monitor_member_status_changes(&self) -> ClusterResult<mpsc::Receiver<MembershipEvent>> {
        self.inner.monitor_member_status_changes().await
    }

    async fn deregister_member(&self) -> ClusterResult<()> {
        self.log.record("provider.deregister");
        self.inner.deregister_member().await
    }
}

// =============================================================================
// Test members
// =============================================================================

/// Shared fabric for one test cluster
pub struct Fabric {
    pub hub: Arc<InMemoryMembership>,
    pub network: Arc<MemoryNetwork>,
}

impl Fabric {
    pub fn new() -> Self {
        init_tracing();
        Self {
            hub: InMemoryMembership::new(ClusterConfig::for_testing().cluster_name),
            network: MemoryNetwork::new(),
        }
    }
}

pub struct TestMember {
    pub cluster: Arc<Cluster<TokioRuntime>>,
    pub transport: Arc<CountingTransport>,
    pub spawner: Arc<GreeterSpawner>,
    pub log: CallLog,
}

impl TestMember {
    /// Build a member on `host`; it hosts `Greeter` when `spawner` is given
    pub async fn build(
        fabric: &Fabric,
        host: &str,
        config: ClusterConfig,
        spawner: Option<Arc<dyn ActorSpawner>>,
    ) -> Self {
        let log = CallLog::default();
        let transport = Arc::new(CountingTransport::new(
            Arc::new(MemoryTransport::new(fabric.network.clone())),
            log.clone(),
        ));
        let provider = Arc::new(RecordingProvider::new(fabric.hub.clone(), log.clone()));
        let cluster = Arc::new(Cluster::new(
            config.with_address(host, 0),
            provider,
            transport.clone(),
            Arc::new(JsonSerialization::new()),
            TokioRuntime,
        ));

        if let Some(spawner) = spawner {
            cluster.register_kind(GREETER, spawner).await.unwrap();
        }

        Self {
            cluster,
            transport,
            spawner: GreeterSpawner::new(),
            log,
        }
    }

    /// Start a member hosting `Greeter` with a fresh counting spawner
    pub async fn greeter(fabric: &Fabric, host: &str, config: ClusterConfig) -> Self {
        let spawner = GreeterSpawner::new();
        let hosted: Arc<dyn ActorSpawner> = spawner.clone();
        let mut member = Self::build(fabric, host, config, Some(hosted)).await;
        member.spawner = spawner;
        member.cluster.start().await.unwrap();
        member
    }

    /// Start a member hosting no kinds
    pub async fn client(fabric: &Fabric, host: &str, config: ClusterConfig) -> Self {
        let member = Self::build(fabric, host, config, None).await;
        member.cluster.start().await.unwrap();
        member
    }

    pub fn address(&self) -> String {
        self.cluster.local_address().unwrap()
    }
}

/// Route logs to the test harness; `RUST_LOG` selects the level
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Poll until `check` holds, failing after two seconds
pub async fn eventually<F: Fn() -> bool>(what: &str, check: F) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {}", what);
}

/// Wait until `member` sees exactly `count` alive members
pub async fn wait_for_members(member: &TestMember, count: usize) {
    let cluster = member.cluster.clone();
    eventually("membership view", || {
        cluster.member_list().get_all_members().len() == count
    })
    .await;
}
