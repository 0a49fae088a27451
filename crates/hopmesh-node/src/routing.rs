//! Router's table of learned routes
//!
//! Each entry says "to reach `destination`, transmit to `next_hop`; it is
//! `hops` hops away". Entries are learned passively from traffic and expire
//! unless refreshed within the routing TTL.
//!
//! The table keeps at most one entry per destination. A matching entry is
//! replaced when the new route is strictly shorter, and refreshed when the
//! new observation comes over the same link. Adding a destination to a full
//! table evicts the entry closest to expiry.

use std::time::Duration;
use tracing::{debug, trace};

use hopmesh_core::MacAddress;

/// A learned route
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoutingEntry {
    /// Final destination
    pub destination: MacAddress,
    /// Neighbour to transmit to
    pub next_hop: MacAddress,
    /// Distance in hops
    pub hops: u8,
    /// Time left before the route is dropped
    pub remaining_ms: u64,
}

/// What `add_or_update` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteUpdate {
    /// A new destination was added
    Added,
    /// An existing entry was replaced or refreshed
    Updated,
    /// An existing, better route was kept
    Kept,
}

/// Bounded, TTL-aged routing table
#[derive(Debug)]
pub struct RoutingTable {
    entries: Vec<RoutingEntry>,
    capacity: usize,
    ttl_ms: u64,
    sweep_interval_ms: u64,
    last_update_ms: Option<u64>,
}

impl RoutingTable {
    /// Create an empty table
    pub fn new(capacity: usize, ttl: Duration, sweep_interval: Duration) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity: capacity.max(1),
            ttl_ms: ttl.as_millis() as u64,
            sweep_interval_ms: sweep_interval.as_millis() as u64,
            last_update_ms: None,
        }
    }

    /// Record that `destination` is reachable through `next_hop` in `hops`
    pub fn add_or_update(
        &mut self,
        destination: MacAddress,
        next_hop: MacAddress,
        hops: u8,
    ) -> RouteUpdate {
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.destination == destination)
        {
            if hops < entry.hops || next_hop == entry.next_hop {
                entry.hops = hops;
                entry.next_hop = next_hop;
                entry.remaining_ms = self.ttl_ms;
                return RouteUpdate::Updated;
            }
            return RouteUpdate::Kept;
        }

        if self.entries.len() >= self.capacity {
            if let Some(index) = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, entry)| entry.remaining_ms)
                .map(|(index, _)| index)
            {
                let evicted = self.entries.remove(index);
                trace!(
                    destination = %evicted.destination,
                    "Routing table full, evicted stalest route"
                );
            }
        }

        debug!(destination = %destination, next_hop = %next_hop, hops, "Learned route");
        self.entries.push(RoutingEntry {
            destination,
            next_hop,
            hops,
            remaining_ms: self.ttl_ms,
        });
        RouteUpdate::Added
    }

    /// Age every route and drop the expired ones
    ///
    /// Runs at most once per sweep interval; the first call only records the
    /// time base. Returns the number of routes removed.
    pub fn update(&mut self, now_ms: u64) -> usize {
        let Some(last) = self.last_update_ms else {
            self.last_update_ms = Some(now_ms);
            return 0;
        };
        let elapsed = now_ms.saturating_sub(last);
        if elapsed < self.sweep_interval_ms {
            return 0;
        }
        self.last_update_ms = Some(now_ms);

        let before = self.entries.len();
        self.entries.retain_mut(|entry| {
            entry.remaining_ms = entry.remaining_ms.saturating_sub(elapsed);
            entry.remaining_ms > 0
        });
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!(removed, remaining = self.entries.len(), "Routes expired");
        }
        removed
    }

    /// Link-layer address to transmit to for `destination`
    ///
    /// Falls back to broadcast when no live route is known.
    pub fn resolve_next_hop(&self, destination: MacAddress) -> MacAddress {
        self.route(destination)
            .map(|entry| entry.next_hop)
            .unwrap_or(MacAddress::BROADCAST)
    }

    /// Live route to `destination`, if any
    pub fn route(&self, destination: MacAddress) -> Option<&RoutingEntry> {
        self.entries
            .iter()
            .find(|entry| entry.destination == destination && entry.remaining_ms > 0)
    }

    /// Forget the time base
    pub fn reset_clock(&mut self) {
        self.last_update_ms = None;
    }

    /// All routes
    pub fn iter(&self) -> impl Iterator<Item = &RoutingEntry> {
        self.entries.iter()
    }

    /// Number of routes
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no route is known
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
