// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Peer Table (C2): thread-safe (ip, port) -> last-seen mapping.
//!
//! A single mutex guards the map, held only for the duration of each
//! individual operation — no operation ever awaits while holding it,
//! so a plain `Mutex` suffices over an async-aware lock.

use crate::error::LookupError;
use crate::identity::PeerIdentity;
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::Instant;

type Endpoint = (Ipv4Addr, u16);

/// A Peer Identity plus the monotonic instant it was last heard from.
#[derive(Debug, Clone)]
pub struct PeerRecord {
    pub identity: PeerIdentity,
    pub last_seen: Instant,
}

/// Thread-safe table of currently-live peers, keyed by (ip, port).
#[derive(Debug, Default)]
pub struct PeerTable {
    inner: Mutex<HashMap<Endpoint, PeerRecord>>,
}

impl PeerTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
        }
    }

    /// Insert a fresh record or bump `last_seen` for an existing one.
    pub fn upsert(&self, identity: PeerIdentity, now: Instant) {
        let key = identity.endpoint();
        let mut guard = self.inner.lock().expect("peer table mutex poisoned");
        match guard.get_mut(&key) {
            Some(record) => {
                record.identity = identity;
                record.last_seen = now;
            }
            None => {
                guard.insert(key, PeerRecord { identity, last_seen: now });
            }
        }
    }

    /// A consistent point-in-time copy; order is unspecified.
    pub fn snapshot(&self) -> Vec<PeerRecord> {
        let guard = self.inner.lock().expect("peer table mutex poisoned");
        guard.values().cloned().collect()
    }

    /// Case-sensitive exact-match lookup by name.
    pub fn lookup_by_name(&self, name: &str) -> Result<PeerIdentity, LookupError> {
        let guard = self.inner.lock().expect("peer table mutex poisoned");
        let mut matches = guard.values().filter(|r| r.identity.name == name);
        let first = matches.next().ok_or(LookupError::NotFound)?;
        if matches.next().is_some() {
            return Err(LookupError::Ambiguous);
        }
        Ok(first.identity.clone())
    }

    /// Lookup by the (ip, port) key directly.
    pub fn lookup_by_endpoint(&self, ip: Ipv4Addr, port: u16) -> Result<PeerIdentity, LookupError> {
        let guard = self.inner.lock().expect("peer table mutex poisoned");
        guard
            .get(&(ip, port))
            .map(|r| r.identity.clone())
            .ok_or(LookupError::NotFound)
    }

    /// Remove entries whose `last_seen` is older than `ttl` relative to `now`.
    /// Safe to call concurrently with `upsert`.
    pub fn sweep(&self, now: Instant, ttl: std::time::Duration) {
        let mut guard = self.inner.lock().expect("peer table mutex poisoned");
        guard.retain(|_, record| now.saturating_duration_since(record.last_seen) <= ttl);
    }

    pub fn len(&self) -> usize {
        self.inner.lock().expect("peer table mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn peer(name: &str, ip: [u8; 4], port: u16) -> PeerIdentity {
        PeerIdentity {
            name: name.into(),
            ip: Ipv4Addr::from(ip),
            port,
            os: "linux".into(),
        }
    }

    #[test]
    fn upsert_then_snapshot_round_trips() {
        let table = PeerTable::new();
        let now = Instant::now();
        table.upsert(peer("a", [10, 0, 0, 1], 12000), now);

        let snap = table.snapshot();
        assert_eq!(snap.len(), 1);
        assert_eq!(snap[0].identity.name, "a");
    }

    #[test]
    fn upsert_bumps_last_seen_for_same_endpoint() {
        let table = PeerTable::new();
        let t0 = Instant::now();
        table.upsert(peer("a", [10, 0, 0, 1], 12000), t0);

        let t1 = t0 + Duration::from_secs(5);
        table.upsert(peer("a", [10, 0, 0, 1], 12000), t1);

        assert_eq!(table.len(), 1);
        let snap = table.snapshot();
        assert_eq!(snap[0].last_seen, t1);
    }

    #[test]
    fn name_collision_across_endpoints_is_not_a_key() {
        let table = PeerTable::new();
        let now = Instant::now();
        table.upsert(peer("dup", [10, 0, 0, 1], 12000), now);
        table.upsert(peer("dup", [10, 0, 0, 2], 12001), now);

        assert_eq!(table.len(), 2);
        assert!(matches!(
            table.lookup_by_name("dup"),
            Err(LookupError::Ambiguous)
        ));
    }

    #[test]
    fn lookup_by_name_not_found() {
        let table = PeerTable::new();
        assert!(matches!(
            table.lookup_by_name("ghost"),
            Err(LookupError::NotFound)
        ));
    }

    #[test]
    fn lookup_by_endpoint_finds_exact_match() {
        let table = PeerTable::new();
        let now = Instant::now();
        table.upsert(peer("a", [10, 0, 0, 1], 12000), now);

        let found = table
            .lookup_by_endpoint(Ipv4Addr::new(10, 0, 0, 1), 12000)
            .unwrap();
        assert_eq!(found.name, "a");
    }

    #[test]
    fn sweep_removes_only_stale_entries() {
        let table = PeerTable::new();
        let t0 = Instant::now();
        table.upsert(peer("stale", [10, 0, 0, 1], 12000), t0);

        let t1 = t0 + Duration::from_secs(100);
        table.upsert(peer("fresh", [10, 0, 0, 2], 12001), t1);

        table.sweep(t1, Duration::from_secs(60));

        assert_eq!(table.len(), 1);
        assert!(table.lookup_by_name("fresh").is_ok());
        assert!(matches!(
            table.lookup_by_name("stale"),
            Err(LookupError::NotFound)
        ));
    }
}
