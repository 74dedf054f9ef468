//! Round-robin member selection
//!
//! Picks a member address by rotating through the current member list, for
//! work that does not need identity-sharded placement.

use crate::member::Member;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Anything that can list the members to choose from
pub trait MemberSource: Send + Sync {
    /// Alive members, in a stable order
    fn all_members(&self) -> Vec<Member>;
}

/// Round-robin selector over a member source
///
/// The rotation counter lives in the selector; it is monotonic for the
/// lifetime of the selector only.
pub struct RoundRobin {
    source: Arc<dyn MemberSource>,
    counter: AtomicUsize,
}

impl RoundRobin {
    /// Create a selector over the given source
    pub fn new(source: Arc<dyn MemberSource>) -> Self {
        Self {
            source,
            counter: AtomicUsize::new(0),
        }
    }

    /// Next member address
    ///
    /// Empty string with no members, the sole address with one member,
    /// otherwise `members[counter mod count]` after an atomic increment.
    pub fn get_node(&self) -> String {
        let members = self.source.all_members();
        match members.len() {
            0 => String::new(),
            1 => members[0].address.clone(),
            count => {
                let next = self.counter.fetch_add(1, Ordering::Relaxed).wrapping_add(1);
                members[next % count].address.clone()
            }
        }
    }
}

impl std::fmt::Debug for RoundRobin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundRobin")
            .field("counter", &self.counter.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
