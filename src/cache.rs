//! The short-lived in-memory peer cache (spec.md §3 `CachedLookup`, §4.1.7).
//!
//! Kept as its own module — split out of `controller.rs` — because the
//! contract is small, self-contained, and independently testable: a time-
//! bounded, insertion-ordered list of `(timestamp, info_hash, peers)`
//! entries, where the most recent entry for a given info-hash is extended in
//! place rather than duplicated.

use crate::identifier::InfoHash;
use crate::node::Peer;
use std::time::{Duration, Instant};

struct CachedLookup {
    inserted_at: Instant,
    info_hash: InfoHash,
    peers: Vec<Peer>,
}

/// Time-bounded memoization of recent `get_peers` results.
pub struct PeerCache {
    window: Duration,
    entries: Vec<CachedLookup>,
}

impl PeerCache {
    pub fn new(window: Duration) -> Self {
        PeerCache {
            window,
            entries: Vec::new(),
        }
    }

    /// Drop any prefix of entries older than `now - window`, then either
    /// extend the most recent entry in place (same info-hash, timestamp
    /// preserved) or append a new entry (spec.md §4.1.7).
    pub fn insert(&mut self, now: Instant, info_hash: InfoHash, peers: Vec<Peer>) {
        self.expire(now);
        if let Some(last) = self.entries.last_mut() {
            if last.info_hash == info_hash {
                last.peers.extend(peers);
                return;
            }
        }
        self.entries.push(CachedLookup {
            inserted_at: now,
            info_hash,
            peers,
        });
    }

    /// Linear scan for the first non-expired entry matching `info_hash`.
    pub fn lookup(&mut self, now: Instant, info_hash: InfoHash) -> Option<Vec<Peer>> {
        self.expire(now);
        self.entries
            .iter()
            .find(|e| e.info_hash == info_hash)
            .map(|e| e.peers.clone())
    }

    fn expire(&mut self, now: Instant) {
        let window = self.window;
        while let Some(front) = self.entries.first() {
            if now.saturating_duration_since(front.inserted_at) > window {
                self.entries.remove(0);
            } else {
                break;
            }
        }
    }
}
