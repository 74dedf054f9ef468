//! TigerStyle constants for Grotto
//!
//! All limits are explicit, use big-endian naming (most significant first),
//! and include units in the name.

// =============================================================================
// Identity Limits
// =============================================================================

/// Maximum length of an actor name in bytes
pub const ACTOR_NAME_LENGTH_BYTES_MAX: usize = 256;

/// Maximum length of an actor kind in bytes
pub const ACTOR_KIND_LENGTH_BYTES_MAX: usize = 128;

/// Maximum length of a member address (`host:port`) in bytes
pub const MEMBER_ADDRESS_LENGTH_BYTES_MAX: usize = 256;

/// Maximum length of a cluster name in bytes
pub const CLUSTER_NAME_LENGTH_BYTES_MAX: usize = 128;

// =============================================================================
// Cluster Limits
// =============================================================================

/// Maximum number of members in a cluster view
pub const CLUSTER_MEMBERS_COUNT_MAX: usize = 1000;

/// Maximum number of kinds a single member may advertise
pub const MEMBER_KINDS_COUNT_MAX: usize = 1024;

// =============================================================================
// Request Limits
// =============================================================================

/// Default identity-resolution request timeout in milliseconds (5 sec)
pub const REQUEST_TIMEOUT_MS_DEFAULT: u64 = 5 * 1000;

/// Maximum identity-resolution request timeout in milliseconds (2 min)
pub const REQUEST_TIMEOUT_MS_MAX: u64 = 120 * 1000;

/// Default wait after deregistration so ownership transfers can settle (2 sec)
pub const SHUTDOWN_DRAIN_MS_DEFAULT: u64 = 2 * 1000;

/// Maximum shutdown drain in milliseconds (1 min)
pub const SHUTDOWN_DRAIN_MS_MAX: u64 = 60 * 1000;

// =============================================================================
// Transport Limits
// =============================================================================

/// Maximum size of a single RPC frame payload in bytes (10 MB)
pub const RPC_MESSAGE_SIZE_BYTES_MAX: usize = 10 * 1024 * 1024;

/// Default outbound connection timeout in milliseconds (3 sec)
pub const RPC_CONNECT_TIMEOUT_MS_DEFAULT: u64 = 3 * 1000;

/// Depth of the per-member inbound message queue for in-memory transports
pub const RPC_INBOX_DEPTH_MAX: usize = 1024;
