//! Grotto Core
//!
//! Core types shared by the Grotto cluster-coordination crates.
//!
//! # Overview
//!
//! Grotto locates, or triggers creation of, the single live process that
//! owns a logical actor identity across a dynamic set of cluster members.
//! This crate holds the vocabulary every other crate speaks:
//!
//! - [`ActorIdentity`]: the `(name, kind)` pair callers resolve
//! - [`Pid`]: the resolved `{ address, id }` of an activated actor
//! - [`ResponseStatusCode`]: the outcome of a resolution attempt
//! - [`Runtime`]: the time and spawn seam used by lifecycle code
//!
//! TigerStyle: explicit limits in [`constants`], validation on construction,
//! thiserror-based errors.

pub mod constants;
pub mod error;
pub mod identity;
pub mod runtime;
pub mod status;
pub mod telemetry;

pub use constants::*;
pub use error::{Error, Result};
pub use identity::{join_address, split_address, ActorIdentity, Pid};
pub use runtime::{JoinError, JoinHandle, Runtime, TokioRuntime};
pub use status::ResponseStatusCode;
pub use telemetry::{init_telemetry, TelemetryConfig};
