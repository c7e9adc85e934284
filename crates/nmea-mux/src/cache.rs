//! Vessel identity cache
//!
//! Vessel length arrives in static reports while speed arrives in position
//! reports, so the filter remembers lengths per MMSI. Entries not refreshed
//! within the TTL are purged.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::debug;

/// What the cache knows about one vessel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheEntry {
    /// Overall length in metres, once a non-zero value has been seen
    pub length_m: Option<u32>,
    pub last_seen: Instant,
}

/// Per-MMSI identity cache
#[derive(Debug, Default)]
pub struct IdentityCache {
    entries: HashMap<u32, CacheEntry>,
}

impl IdentityCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message from `mmsi`
    ///
    /// Always refreshes the last-seen time. A known length is only replaced
    /// by a non-zero one, so position reports never erase it.
    pub fn observe(&mut self, mmsi: u32, length_m: Option<u32>, now: Instant) {
        let length_m = length_m.filter(|&len| len > 0);
        self.entries
            .entry(mmsi)
            .and_modify(|entry| {
                entry.last_seen = now;
                if length_m.is_some() {
                    entry.length_m = length_m;
                }
            })
            .or_insert(CacheEntry {
                length_m,
                last_seen: now,
            });
    }

    /// Known length of `mmsi`, if any
    pub fn lookup(&self, mmsi: u32) -> Option<u32> {
        self.entries.get(&mmsi).and_then(|entry| entry.length_m)
    }

    pub fn entry(&self, mmsi: u32) -> Option<&CacheEntry> {
        self.entries.get(&mmsi)
    }

    /// Remove entries idle for longer than `ttl`; returns how many went
    pub fn purge(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.last_seen) <= ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("Purged {} stale vessels, {} remain", removed, self.entries.len());
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
