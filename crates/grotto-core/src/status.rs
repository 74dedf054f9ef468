//! Resolution outcome codes

use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of an identity-resolution attempt
///
/// This is the single channel through which resolution failure is reported.
/// Numeric codes match the on-the-wire values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatusCode {
    /// Resolved; the pid is valid
    Ok,
    /// No owning member could be determined, or the owner refused
    Unavailable,
    /// The owner did not respond in time, or the caller cancelled
    Timeout,
    /// The owner's runtime already has a process registered under this name
    ProcessNameAlreadyExists,
    /// The owner reported a failure, or the request could not be delivered
    Error,
}

impl ResponseStatusCode {
    /// Numeric wire code
    pub fn code(&self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::Unavailable => 1,
            Self::Timeout => 2,
            Self::ProcessNameAlreadyExists => 3,
            Self::Error => 4,
        }
    }

    /// Decode a numeric wire code
    pub fn from_code(code: u32) -> Option<Self> {
        match code {
            0 => Some(Self::Ok),
            1 => Some(Self::Unavailable),
            2 => Some(Self::Timeout),
            3 => Some(Self::ProcessNameAlreadyExists),
            4 => Some(Self::Error),
            _ => None,
        }
    }

    /// Check if this is a successful resolution
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }

    /// Check if the caller may reasonably retry
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::Unavailable | Self::Timeout)
    }
}

impl fmt::Display for ResponseStatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Unavailable => write!(f, "unavailable"),
            Self::Timeout => write!(f, "timeout"),
            Self::ProcessNameAlreadyExists => write!(f, "process_name_already_exists"),
            Self::Error => write!(f, "error"),
        }
    }
}
