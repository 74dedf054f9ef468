//! Inter-member RPC
//!
//! TigerStyle: Explicit message types, one delivery attempt per request.

use crate::error::{ClusterError, ClusterResult};
use async_trait::async_trait;
use dashmap::DashMap;
use grotto_core::{Pid, ResponseStatusCode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

/// RPC request ID
pub type RequestId = u64;

/// Placeholder id carried by requests until the transport stamps one
pub const REQUEST_ID_UNASSIGNED: RequestId = 0;

/// RPC message types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RpcMessage {
    /// Ask the owning member's partition to locate or activate an identity
    ActorPidRequest {
        request_id: RequestId,
        kind: String,
        name: String,
    },

    /// Outcome of an `ActorPidRequest`
    ActorPidResponse {
        request_id: RequestId,
        pid: Option<Pid>,
        status_code: ResponseStatusCode,
    },

    /// Hand an activation record to the identity's new owner
    TakeOwnership {
        kind: String,
        name: String,
        pid: Pid,
    },
}

impl RpcMessage {
    /// Wire name of the `ActorPidRequest` variant
    pub const ACTOR_PID_REQUEST: &'static str = "actor_pid_request";
    /// Wire name of the `ActorPidResponse` variant
    pub const ACTOR_PID_RESPONSE: &'static str = "actor_pid_response";
    /// Wire name of the `TakeOwnership` variant
    pub const TAKE_OWNERSHIP: &'static str = "take_ownership";

    /// Build an identity-resolution request
    pub fn actor_pid_request(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::ActorPidRequest {
            request_id: REQUEST_ID_UNASSIGNED,
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Wire name of this message's type
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::ActorPidRequest { .. } => Self::ACTOR_PID_REQUEST,
            Self::ActorPidResponse { .. } => Self::ACTOR_PID_RESPONSE,
            Self::TakeOwnership { .. } => Self::TAKE_OWNERSHIP,
        }
    }

    /// Get the request ID if this message has one
    pub fn request_id(&self) -> Option<RequestId> {
        match self {
            Self::ActorPidRequest { request_id, .. } => Some(*request_id),
            Self::ActorPidResponse { request_id, .. } => Some(*request_id),
            Self::TakeOwnership { .. } => None,
        }
    }

    /// Stamp the request ID; no-op for one-way messages
    pub fn set_request_id(&mut self, id: RequestId) {
        match self {
            Self::ActorPidRequest { request_id, .. }
            | Self::ActorPidResponse { request_id, .. } => *request_id = id,
            Self::TakeOwnership { .. } => {}
        }
    }

    /// Check if this is a response message
    pub fn is_response(&self) -> bool {
        matches!(self, Self::ActorPidResponse { .. })
    }
}

/// Public result of resolving an identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorPidResponse {
    /// Always present on `Ok`; other statuses carry whatever the owner sent
    pub pid: Option<Pid>,
    pub status_code: ResponseStatusCode,
}

impl ActorPidResponse {
    /// A successful resolution
    pub fn ok(pid: Pid) -> Self {
        Self {
            pid: Some(pid),
            status_code: ResponseStatusCode::Ok,
        }
    }

    /// A failed resolution with no pid
    pub fn status(status_code: ResponseStatusCode) -> Self {
        debug_assert!(!status_code.is_ok(), "ok responses carry a pid");
        Self {
            pid: None,
            status_code,
        }
    }

    /// A failed resolution, keeping any pid the owner reported
    pub fn rejected(pid: Option<Pid>, status_code: ResponseStatusCode) -> Self {
        debug_assert!(!status_code.is_ok(), "ok responses go through `ok`");
        Self { pid, status_code }
    }

    pub fn is_ok(&self) -> bool {
        self.status_code.is_ok()
    }
}

/// Requests awaiting a response, keyed by request id
pub(crate) type PendingRequests = DashMap<RequestId, oneshot::Sender<RpcMessage>>;

/// A request's slot in [`PendingRequests`]
///
/// Removed when the guard drops: on response, error, timeout, or when the
/// caller abandons the request future.
pub(crate) struct PendingRequest<'a> {
    pending: &'a PendingRequests,
    request_id: RequestId,
}

impl<'a> PendingRequest<'a> {
    /// Register `request_id` and return the receiving half of its slot
    pub(crate) fn register(
        pending: &'a PendingRequests,
        request_id: RequestId,
    ) -> (Self, oneshot::Receiver<RpcMessage>) {
        let (tx, rx) = oneshot::channel();
        pending.insert(request_id, tx);
        (
            Self {
                pending,
                request_id,
            },
            rx,
        )
    }
}

impl Drop for PendingRequest<'_> {
    fn drop(&mut self) {
        self.pending.remove(&self.request_id);
    }
}

/// How long a request may wait for its response
#[derive(Debug, Clone)]
pub enum RequestDeadline {
    /// Give up after a fixed duration
    Timeout(Duration),
    /// Give up when the caller cancels; no timeout applies
    Cancellation(CancellationToken),
}

impl RequestDeadline {
    /// Wait for a response under this deadline
    pub(crate) async fn wait(
        &self,
        target: &Pid,
        response: oneshot::Receiver<RpcMessage>,
    ) -> ClusterResult<RpcMessage> {
        match self {
            Self::Timeout(timeout) => match tokio::time::timeout(*timeout, response).await {
                Ok(Ok(message)) => Ok(message),
                Ok(Err(_)) => Err(ClusterError::rpc_failed(target, "response channel closed")),
                Err(_) => Err(ClusterError::rpc_timeout(
                    target,
                    timeout.as_millis() as u64,
                )),
            },
            Self::Cancellation(token) => {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => Err(ClusterError::Cancelled {
                        target: target.to_string(),
                    }),
                    result = response => result
                        .map_err(|_| ClusterError::rpc_failed(target, "response channel closed")),
                }
            }
        }
    }
}

/// RPC transport trait
///
/// Abstracts the underlying transport mechanism (TCP, in-memory, etc.)
#[async_trait]
pub trait RpcTransport: Send + Sync {
    /// Register the handler for incoming requests; call before `start`
    async fn set_handler(&self, handler: Arc<dyn RpcHandler>) -> ClusterResult<()>;

    /// Start listening; returns the bound `host:port` address
    async fn start(&self, host: &str, port: u16) -> ClusterResult<String>;

    /// Send a request and wait for its response
    ///
    /// At most one delivery attempt. Timeouts and cancellation surface as
    /// `RpcTimeout` and `Cancelled`; everything else as `RpcFailed` or
    /// `MemberUnreachable`. The pending entry is dropped on every exit.
    async fn request(
        &self,
        target: &Pid,
        message: RpcMessage,
        deadline: RequestDeadline,
    ) -> ClusterResult<RpcMessage>;

    /// Send a one-way message
    async fn send(&self, target: &Pid, message: RpcMessage) -> ClusterResult<()>;

    /// Stop the transport; outstanding requests fail
    async fn stop(&self) -> ClusterResult<()>;

    /// The bound address, once started
    fn local_address(&self) -> Option<String>;
}

/// Handler for incoming RPC messages
#[async_trait]
pub trait RpcHandler: Send + Sync {
    /// Handle an incoming message
    ///
    /// Returns an optional response message.
    async fn handle(&self, from: &str, message: RpcMessage) -> Option<RpcMessage>;
}
