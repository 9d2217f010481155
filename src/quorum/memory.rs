//! In-memory lock server
//!
//! Leases expire lazily: an expired lease is overwritten by the next
//! `set_if_absent` and ignored by `compare_and_delete`.

use crate::quorum::server::{LockServer, ServerError};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug)]
struct Lease {
    token: String,
    expires_at: Instant,
}

impl Lease {
    fn new(token: &str, ttl: Duration) -> Self {
        Self {
            token: token.to_string(),
            expires_at: Instant::now() + ttl,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// A lock server living in this process.
///
/// Useful on its own for locking between threads, and as a stand-in for
/// real servers in tests.
#[derive(Debug, Default)]
pub struct MemoryLockServer {
    leases: DashMap<String, Lease>,
}

impl MemoryLockServer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Token of the unexpired lease stored under `key`, if any
    pub fn holder(&self, key: &str) -> Option<String> {
        let now = Instant::now();
        self.leases
            .get(key)
            .filter(|lease| !lease.is_expired(now))
            .map(|lease| lease.token.clone())
    }

    /// Drop expired leases, returning how many were removed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.leases.len();
        self.leases.retain(|_, lease| !lease.is_expired(now));
        let purged = before.saturating_sub(self.leases.len());

        if purged > 0 {
            debug!(count = purged, "Purged expired leases");
        }
        purged
    }
}

impl LockServer for MemoryLockServer {
    fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, ServerError> {
        let now = Instant::now();

        match self.leases.entry(key.to_string()) {
            Entry::Occupied(mut entry) => {
                if !entry.get().is_expired(now) {
                    return Ok(false);
                }
                entry.insert(Lease::new(value, ttl));
            }
            Entry::Vacant(entry) => {
                entry.insert(Lease::new(value, ttl));
            }
        }

        debug!(key = %key, "Lease stored");
        Ok(true)
    }

    fn compare_and_delete(&self, key: &str, expected: &str) -> Result<bool, ServerError> {
        let now = Instant::now();
        let removed = self
            .leases
            .remove_if(key, |_, lease| {
                lease.token == expected && !lease.is_expired(now)
            })
            .is_some();

        if removed {
            debug!(key = %key, "Lease deleted");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_set_if_absent_conflict() {
        let server = MemoryLockServer::new();

        assert!(server.set_if_absent("key1", "owner1", Duration::from_secs(60)).unwrap());
        assert!(!server.set_if_absent("key1", "owner2", Duration::from_secs(60)).unwrap());
        assert_eq!(server.holder("key1").as_deref(), Some("owner1"));
    }

    #[test]
    fn test_compare_and_delete_requires_matching_token() {
        let server = MemoryLockServer::new();
        server.set_if_absent("key1", "owner1", Duration::from_secs(60)).unwrap();

        assert!(!server.compare_and_delete("key1", "owner2").unwrap());
        assert_eq!(server.holder("key1").as_deref(), Some("owner1"));

        assert!(server.compare_and_delete("key1", "owner1").unwrap());
        assert_eq!(server.holder("key1"), None);
        assert!(!server.compare_and_delete("key1", "owner1").unwrap());
    }

    #[test]
    fn test_expired_lease_can_be_taken_over() {
        let server = MemoryLockServer::new();
        server.set_if_absent("key1", "owner1", Duration::from_millis(20)).unwrap();

        thread::sleep(Duration::from_millis(40));

        assert_eq!(server.holder("key1"), None);
        assert!(!server.compare_and_delete("key1", "owner1").unwrap());
        assert!(server.set_if_absent("key1", "owner2", Duration::from_secs(60)).unwrap());
        assert_eq!(server.holder("key1").as_deref(), Some("owner2"));
    }

    #[test]
    fn test_purge_expired() {
        let server = MemoryLockServer::new();
        server.set_if_absent("short", "owner1", Duration::from_millis(10)).unwrap();
        server.set_if_absent("long", "owner2", Duration::from_secs(60)).unwrap();

        thread::sleep(Duration::from_millis(30));

        assert_eq!(server.purge_expired(), 1);
        assert_eq!(server.holder("long").as_deref(), Some("owner2"));
    }
}
