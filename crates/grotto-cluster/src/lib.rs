//! Grotto Cluster
//!
//! Cluster coordination and identity resolution for Grotto.
//!
//! # Overview
//!
//! The cluster module provides:
//! - Member lifecycle: start, graceful and immediate shutdown
//! - Identity resolution: `(name, kind)` to the pid of its activation
//! - Per-kind partitions arbitrating activations and ownership transfer
//! - Collaborator contracts with in-memory and TCP reference backends
//!
//! # Example
//!
//! ```rust,no_run
//! use grotto_cluster::{
//!     Cluster, ClusterConfig, InMemoryMembership, InMemoryProvider, JsonSerialization,
//!     MemoryNetwork, MemoryTransport,
//! };
//! use grotto_core::TokioRuntime;
//! use std::sync::Arc;
//!
//! # async fn run() -> grotto_cluster::ClusterResult<()> {
//! let config = ClusterConfig::new("demo");
//! let hub = InMemoryMembership::new("demo");
//! let cluster = Cluster::new(
//!     config,
//!     Arc::new(InMemoryProvider::new(hub)),
//!     Arc::new(MemoryTransport::new(MemoryNetwork::new())),
//!     Arc::new(JsonSerialization::new()),
//!     TokioRuntime,
//! );
//! cluster.start().await?;
//! let response = cluster.get("alice", "Greeter").await?;
//! println!("{:?}", response.status_code);
//! cluster.shutdown(true).await?;
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod config;
pub mod error;
pub mod memory;
pub mod partition;
pub mod pid_cache;
pub mod provider;
pub mod rpc;
pub mod serialization;
pub mod tcp;

pub use cluster::{Cluster, ClusterState};
pub use config::{ClusterConfig, TransportConfig};
pub use error::{ClusterError, ClusterResult};
pub use memory::{MemoryNetwork, MemoryTransport};
pub use partition::{partition_pid, ActivationError, ActorSpawner, Partition};
pub use pid_cache::PidCache;
pub use provider::{InMemoryMembership, InMemoryProvider, MemberRegistration, MembershipProvider};
pub use rpc::{
    ActorPidResponse, RequestDeadline, RequestId, RpcHandler, RpcMessage, RpcTransport,
};
pub use serialization::{JsonSerialization, MessageDescriptor, Serialization};
pub use tcp::TcpTransport;
