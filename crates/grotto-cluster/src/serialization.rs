//! Message serialization
//!
//! The serialization collaborator turns [`RpcMessage`]s into frame payloads.
//! Message types must be registered before they can be encoded or decoded.

use crate::error::{ClusterError, ClusterResult};
use crate::rpc::RpcMessage;
use bytes::Bytes;
use dashmap::DashSet;

/// Describes one message type known to the serializer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MessageDescriptor {
    /// Wire name, matching the serde tag of the message
    pub name: &'static str,
}

impl MessageDescriptor {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }

    /// Descriptors for every message the cluster exchanges
    pub fn cluster_messages() -> [MessageDescriptor; 3] {
        [
            Self::new(RpcMessage::ACTOR_PID_REQUEST),
            Self::new(RpcMessage::ACTOR_PID_RESPONSE),
            Self::new(RpcMessage::TAKE_OWNERSHIP),
        ]
    }
}

/// Serialization collaborator
pub trait Serialization: Send + Sync {
    /// Register a message type
    fn register(&self, descriptor: MessageDescriptor) -> ClusterResult<()>;

    /// Check whether a message type was registered
    fn is_registered(&self, name: &str) -> bool;

    /// Encode a registered message
    fn encode(&self, message: &RpcMessage) -> ClusterResult<Bytes>;

    /// Decode a payload into a registered message
    fn decode(&self, bytes: &[u8]) -> ClusterResult<RpcMessage>;
}

/// JSON serialization with a registration table
#[derive(Debug, Default)]
pub struct JsonSerialization {
    registered: DashSet<&'static str>,
}

impl JsonSerialization {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Serialization for JsonSerialization {
    fn register(&self, descriptor: MessageDescriptor) -> ClusterResult<()> {
        if descriptor.name.is_empty() {
            return Err(ClusterError::serialization(
                "message descriptor name must not be empty",
            ));
        }
        self.registered.insert(descriptor.name);
        Ok(())
    }

    fn is_registered(&self, name: &str) -> bool {
        self.registered.contains(name)
    }

    fn encode(&self, message: &RpcMessage) -> ClusterResult<Bytes> {
        let name = message.type_name();
        if !self.is_registered(name) {
            return Err(ClusterError::serialization(format!(
                "message type '{}' is not registered",
                name
            )));
        }

        serde_json::to_vec(message)
            .map(Bytes::from)
            .map_err(|e| ClusterError::serialization(format!("encode {}: {}", name, e)))
    }

    fn decode(&self, bytes: &[u8]) -> ClusterResult<RpcMessage> {
        let message: RpcMessage = serde_json::from_slice(bytes)
            .map_err(|e| ClusterError::serialization(format!("decode: {}", e)))?;

        let name = message.type_name();
        if !self.is_registered(name) {
            return Err(ClusterError::serialization(format!(
                "message type '{}' is not registered",
                name
            )));
        }
        Ok(message)
    }
}
