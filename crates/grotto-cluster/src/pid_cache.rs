//! Resolved pid cache
//!
//! TigerStyle: Explicit invalidation, no time-based expiry.
//!
//! Maps an actor name to the pid it last resolved to. Entries live until
//! something proves them stale: the actor terminated, its host left the
//! cluster, or a later resolution for the name came back non-OK.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use grotto_core::Pid;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Concurrent name → pid cache
#[derive(Debug, Default)]
pub struct PidCache {
    entries: DashMap<String, Pid>,
    active: AtomicBool,
}

impl PidCache {
    /// Create an inactive cache; call [`setup`](Self::setup) before use
    pub fn new() -> Self {
        Self::default()
    }

    /// Start accepting entries
    pub fn setup(&self) {
        self.active.store(true, Ordering::SeqCst);
    }

    /// Stop and release every entry
    pub fn stop(&self) {
        self.active.store(false, Ordering::SeqCst);
        let released = self.entries.len();
        self.entries.clear();
        debug!(released, "Pid cache stopped");
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Insert if absent; the first writer for a name wins
    pub fn try_add(&self, name: &str, pid: Pid) -> bool {
        if !self.is_active() {
            return false;
        }
        match self.entries.entry(name.to_string()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(pid);
                true
            }
        }
    }

    pub fn try_get(&self, name: &str) -> Option<Pid> {
        if !self.is_active() {
            return None;
        }
        self.entries.get(name).map(|entry| entry.value().clone())
    }

    /// Drop the entry for a name; returns whether one existed
    pub fn remove(&self, name: &str) -> bool {
        self.entries.remove(name).is_some()
    }

    /// Drop every entry hosted by a member; returns the number dropped
    pub fn remove_by_member(&self, address: &str) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, pid| {
            let keep = !pid.is_hosted_by(address);
            removed += usize::from(!keep);
            keep
        });
        if removed > 0 {
            debug!(member = %address, removed, "Invalidated cached pids of departed member");
        }
        removed
    }

    /// Drop every entry pointing at a terminated pid; returns the number dropped
    pub fn on_terminated(&self, pid: &Pid) -> usize {
        let mut removed = 0;
        self.entries.retain(|_, cached| {
            let keep = *cached != *pid;
            removed += usize::from(!keep);
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn active_cache() -> PidCache {
        let cache = PidCache::new();
        cache.setup();
        cache
    }

    #[test]
    fn test_first_writer_wins() {
        let cache = active_cache();
        assert!(cache.try_add("alice", Pid::new("a:1", "g-1")));
        assert!(!cache.try_add("alice", Pid::new("b:1", "g-2")));
        assert_eq!(cache.try_get("alice"), Some(Pid::new("a:1", "g-1")));
    }

    #[test]
    fn test_remove() {
        let cache = active_cache();
        cache.try_add("alice", Pid::new("a:1", "g-1"));
        assert!(cache.remove("alice"));
        assert!(!cache.remove("alice"));
        assert_eq!(cache.try_get("alice"), None);
    }

    #[test]
    fn test_remove_by_member() {
        let cache = active_cache();
        cache.try_add("alice", Pid::new("a:1", "g-1"));
        cache.try_add("bob", Pid::new("a:1", "g-2"));
        cache.try_add("carol", Pid::new("b:1", "g-3"));

        assert_eq!(cache.remove_by_member("a:1"), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.try_get("carol").is_some());
    }

    #[test]
    fn test_on_terminated() {
        let cache = active_cache();
        let pid = Pid::new("a:1", "g-1");
        cache.try_add("alice", pid.clone());
        cache.try_add("bob", Pid::new("a:1", "g-2"));

        assert_eq!(cache.on_terminated(&pid), 1);
        assert_eq!(cache.try_get("alice"), None);
        assert!(cache.try_get("bob").is_some());
    }

    #[test]
    fn test_stop_releases_and_refuses() {
        let cache = active_cache();
        cache.try_add("alice", Pid::new("a:1", "g-1"));
        cache.stop();

        assert!(cache.is_empty());
        assert!(!cache.try_add("bob", Pid::new("a:1", "g-2")));
        assert_eq!(cache.try_get("bob"), None);

        cache.setup();
        assert!(cache.try_add("bob", Pid::new("a:1", "g-2")));
    }

    #[test]
    fn test_inactive_until_setup() {
        let cache = PidCache::new();
        assert!(!cache.try_add("alice", Pid::new("a:1", "g-1")));
    }

    #[test]
    fn test_concurrent_adds_single_winner() {
        let cache = Arc::new(active_cache());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = cache.clone();
                std::thread::spawn(move || cache.try_add("alice", Pid::new(format!("n{}:1", i), "g")))
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();
        assert_eq!(winners, 1);
    }
}
