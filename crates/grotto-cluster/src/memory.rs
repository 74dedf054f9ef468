//! In-memory RPC transport
//!
//! TigerStyle: Deterministic message delivery through channels, explicit
//! fault injection.
//!
//! A [`MemoryNetwork`] connects any number of [`MemoryTransport`]s living in
//! one process. Requests and responses travel as envelopes between member
//! inboxes and are correlated by request id, the same way the TCP transport
//! correlates frames. Black-holing an address silently drops every envelope
//! to or from it, so requests against it only ever time out.

use crate::error::{ClusterError, ClusterResult};
use crate::rpc::{
    PendingRequest, PendingRequests, RequestDeadline, RequestId, RpcHandler, RpcMessage,
    RpcTransport,
};
use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use grotto_core::constants::RPC_INBOX_DEPTH_MAX;
use grotto_core::{join_address, Pid};
use std::sync::atomic::{AtomicBool, AtomicU16, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// First port handed out when a transport starts on port 0
const MEMORY_PORT_DYNAMIC_FIRST: u16 = 20_000;

/// A message in flight between two members
#[derive(Debug)]
struct Envelope {
    from: String,
    message: RpcMessage,
}

/// Shared in-process network
#[derive(Debug)]
pub struct MemoryNetwork {
    inboxes: DashMap<String, mpsc::Sender<Envelope>>,
    blackholed: DashSet<String>,
    next_port: AtomicU16,
}

impl Default for MemoryNetwork {
    fn default() -> Self {
        Self {
            inboxes: DashMap::new(),
            blackholed: DashSet::new(),
            next_port: AtomicU16::new(MEMORY_PORT_DYNAMIC_FIRST),
        }
    }
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Drop all traffic to and from `address`
    pub fn blackhole(&self, address: &str) {
        info!(member = %address, "Black-holing member");
        self.blackholed.insert(address.to_string());
    }

    /// Restore traffic to and from `address`
    pub fn restore(&self, address: &str) {
        self.blackholed.remove(address);
    }

    pub fn is_blackholed(&self, address: &str) -> bool {
        self.blackholed.contains(address)
    }

    /// Addresses with a live inbox
    pub fn addresses(&self) -> Vec<String> {
        let mut addresses: Vec<String> = self.inboxes.iter().map(|e| e.key().clone()).collect();
        addresses.sort();
        addresses
    }

    fn bind(&self, host: &str, port: u16) -> ClusterResult<(String, mpsc::Receiver<Envelope>)> {
        let port = if port == 0 {
            self.next_port.fetch_add(1, Ordering::SeqCst)
        } else {
            port
        };
        let address = join_address(host, port);

        let (tx, rx) = mpsc::channel(RPC_INBOX_DEPTH_MAX);
        match self.inboxes.entry(address.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(ClusterError::internal(format!(
                "address {} already bound",
                address
            ))),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(tx);
                Ok((address, rx))
            }
        }
    }

    fn unbind(&self, address: &str) {
        self.inboxes.remove(address);
    }

    async fn deliver(&self, to: &str, envelope: Envelope) -> ClusterResult<()> {
        if self.is_blackholed(to) || self.is_blackholed(&envelope.from) {
            trace!(from = %envelope.from, to = %to, "Dropping envelope on black-holed link");
            return Ok(());
        }

        let inbox = self
            .inboxes
            .get(to)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ClusterError::member_unreachable(to, "no such member"))?;

        inbox
            .send(envelope)
            .await
            .map_err(|_| ClusterError::member_unreachable(to, "inbox closed"))
    }
}

type HandlerSlot = tokio::sync::RwLock<Option<Arc<dyn RpcHandler>>>;

/// In-memory RPC transport for tests and single-process clusters
pub struct MemoryTransport {
    network: Arc<MemoryNetwork>,
    address: RwLock<Option<String>>,
    handler: Arc<HandlerSlot>,
    pending: Arc<PendingRequests>,
    next_request_id: AtomicU64,
    running: AtomicBool,
    shutdown: RwLock<CancellationToken>,
}

impl MemoryTransport {
    /// Create a transport attached to the network
    pub fn new(network: Arc<MemoryNetwork>) -> Self {
        Self {
            network,
            address: RwLock::new(None),
            handler: Arc::new(tokio::sync::RwLock::new(None)),
            pending: Arc::new(DashMap::new()),
            next_request_id: AtomicU64::new(1),
            running: AtomicBool::new(false),
            shutdown: RwLock::new(CancellationToken::new()),
        }
    }

    /// Get next request ID
    pub fn next_request_id(&self) -> RequestId {
        self.next_request_id.fetch_add(1, Ordering::SeqCst)
    }

    /// Number of requests waiting for a response
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    fn require_address(&self) -> ClusterResult<String> {
        self.local_address().ok_or(ClusterError::NotStarted)
    }

    /// Drain the inbox until shutdown
    async fn process_messages(
        network: Arc<MemoryNetwork>,
        local: String,
        mut inbox: mpsc::Receiver<Envelope>,
        handler: Arc<HandlerSlot>,
        pending: Arc<PendingRequests>,
        shutdown: CancellationToken,
    ) {
        loop {
            let envelope = tokio::select! {
                _ = shutdown.cancelled() => break,
                envelope = inbox.recv() => match envelope {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            if envelope.message.is_response() {
                if let Some(request_id) = envelope.message.request_id() {
                    match pending.remove(&request_id) {
                        Some((_, sender)) => {
                            let _ = sender.send(envelope.message);
                        }
                        None => {
                            debug!(request_id, from = %envelope.from, "Late response dropped");
                        }
                    }
                }
                continue;
            }

            let handler = handler.read().await.clone();
            let Some(handler) = handler else {
                warn!(from = %envelope.from, "No handler registered, dropping message");
                continue;
            };

            // Handlers may suspend on activation; keep the inbox moving
            let network = network.clone();
            let local = local.clone();
            tokio::spawn(async move {
                let from = envelope.from;
                if let Some(response) = handler.handle(&from, envelope.message).await {
                    let reply = Envelope {
                        from: local,
                        message: response,
                    };
                    if let Err(e) = network.deliver(&from, reply).await {
                        debug!(to = %from, error = %e, "Failed to deliver response");
                    }
                }
            });
        }

        debug!(member = %local, "Memory transport inbox closed");
    }
}

#[async_trait]
impl RpcTransport for MemoryTransport {
    async fn set_handler(&self, handler: Arc<dyn RpcHandler>) -> ClusterResult<()> {
        *self.handler.write().await = Some(handler);
        Ok(())
    }

    async fn start(&self, host: &str, port: u16) -> ClusterResult<String> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(ClusterError::AlreadyStarted);
        }

        let (address, inbox) = match self.network.bind(host, port) {
            Ok(bound) => bound,
            Err(e) => {
                self.running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        };

        let shutdown = CancellationToken::new();
        *self.shutdown.write().unwrap_or_else(PoisonError::into_inner) = shutdown.clone();
        *self.address.write().unwrap_or_else(PoisonError::into_inner) = Some(address.clone());

        tokio::spawn(Self::process_messages(
            self.network.clone(),
            address.clone(),
            inbox,
            self.handler.clone(),
            self.pending.clone(),
            shutdown,
        ));

        info!(member = %address, "Memory transport started");
        Ok(address)
    }

    async fn request(
        &self,
        target: &Pid,
        mut message: RpcMessage,
        deadline: RequestDeadline,
    ) -> ClusterResult<RpcMessage> {
        let local = self.require_address()?;

        let request_id = self.next_request_id();
        message.set_request_id(request_id);
        if message.request_id() != Some(request_id) {
            return Err(ClusterError::internal(format!(
                "{} is not a request",
                message.type_name()
            )));
        }

        let (_slot, rx) = PendingRequest::register(&self.pending, request_id);

        let envelope = Envelope {
            from: local,
            message,
        };
        self.network.deliver(&target.address, envelope).await?;
        deadline.wait(target, rx).await
    }

    async fn send(&self, target: &Pid, message: RpcMessage) -> ClusterResult<()> {
        let local = self.require_address()?;
        self.network
            .deliver(
                &target.address,
                Envelope {
                    from: local,
                    message,
                },
            )
            .await
    }

    async fn stop(&self) -> ClusterResult<()> {
        if !self.running.swap(false, Ordering::SeqCst) {
            return Ok(());
        }

        self.shutdown
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cancel();

        let address = self
            .address
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(address) = &address {
            self.network.unbind(address);
        }

        // Waiting requests observe a closed channel
        self.pending.clear();
        *self.handler.write().await = None;

        info!(member = ?address, "Memory transport stopped");
        Ok(())
    }

    fn local_address(&self) -> Option<String> {
        self.address
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
