//! Seen-frame table for duplicate suppression
//!
//! Under flooding the same frame reaches a node over several paths. Every
//! frame a node accepts for processing (addressed to it, or relayed by it)
//! is remembered here under the key `(id, src, dest, role)`; a second copy
//! of the same key is dropped until the entry expires.
//!
//! The table has a fixed capacity. Inserting into a full table evicts the
//! entry inserted earliest. Lookups never change the eviction order, so a
//! frequently repeated frame does not keep its entry alive past its TTL.
//!
//! Expiry is swept periodically: every `sweep_interval` the elapsed time
//! since the previous sweep is subtracted from each entry's remaining TTL.

use lru::LruCache;
use std::fmt;
use std::num::NonZeroUsize;
use std::time::Duration;
use tracing::trace;

use hopmesh_core::{DeliveryRole, Frame, MacAddress};

/// Dedup key of a frame
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct SeenKey {
    /// Sequence id
    pub id: u8,
    /// Originating node
    pub src: MacAddress,
    /// Final destination
    pub dest: MacAddress,
    /// Bucket derived from the frame type
    pub role: DeliveryRole,
}

impl SeenKey {
    /// Key under which a frame is remembered
    pub fn of(frame: &Frame) -> Self {
        Self {
            id: frame.id,
            src: frame.src,
            dest: frame.dest,
            role: frame.role(),
        }
    }
}

impl fmt::Display for SeenKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}->{}:{}", self.role, self.src, self.dest, self.id)
    }
}

/// Fixed-capacity table of recently handled frames
#[derive(Debug)]
pub struct SeenTable {
    entries: LruCache<SeenKey, u64>,
    ttl_ms: u64,
    sweep_interval_ms: u64,
    last_sweep_ms: Option<u64>,
}

impl SeenTable {
    /// Create a table holding at most `capacity` entries
    pub fn new(capacity: usize, ttl: Duration, sweep_interval: Duration) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(cap),
            ttl_ms: ttl.as_millis() as u64,
            sweep_interval_ms: sweep_interval.as_millis() as u64,
            last_sweep_ms: None,
        }
    }

    /// Whether a live entry exists for this frame
    pub fn contains(&self, frame: &Frame) -> bool {
        self.contains_key(&SeenKey::of(frame))
    }

    /// Whether a live entry exists for this key
    pub fn contains_key(&self, key: &SeenKey) -> bool {
        self.entries
            .peek(key)
            .is_some_and(|remaining| *remaining > 0)
    }

    /// Remember a frame; no-op if it is already present
    ///
    /// Returns the key that was evicted to make room, if any.
    pub fn remember(&mut self, frame: &Frame) -> Option<SeenKey> {
        let key = SeenKey::of(frame);
        if self.contains_key(&key) {
            return None;
        }

        let evicted = self
            .entries
            .push(key, self.ttl_ms)
            .map(|(old, _)| old)
            .filter(|old| *old != key);
        if let Some(old) = &evicted {
            trace!(evicted = %old, "Seen table full, evicted oldest entry");
        }
        evicted
    }

    /// Age every entry and drop the expired ones
    ///
    /// Runs at most once per sweep interval; the first call only records
    /// the time base. Returns the number of entries removed.
    pub fn sweep(&mut self, now_ms: u64) -> usize {
        let Some(last) = self.last_sweep_ms else {
            self.last_sweep_ms = Some(now_ms);
            return 0;
        };
        let elapsed = now_ms.saturating_sub(last);
        if elapsed < self.sweep_interval_ms {
            return 0;
        }
        self.last_sweep_ms = Some(now_ms);

        let mut expired = Vec::new();
        for (key, remaining) in self.entries.iter_mut() {
            *remaining = remaining.saturating_sub(elapsed);
            if *remaining == 0 {
                expired.push(*key);
            }
        }
        for key in &expired {
            self.entries.pop(key);
        }

        if !expired.is_empty() {
            trace!(expired = expired.len(), remaining = self.entries.len(), "Seen table swept");
        }
        expired.len()
    }

    /// Forget the sweep time base
    pub fn reset_clock(&mut self) {
        self.last_sweep_ms = None;
    }

    /// Number of entries held
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the table is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.entries.cap().get()
    }

    /// Remove every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hopmesh_core::{FrameKind, Payload};

    fn frame(id: u8, kind: FrameKind) -> Frame {
        Frame {
            network_id: [0, 0],
            kind,
            id,
            hop_count: 3,
            src: MacAddress::repeat(0xAA),
            dest: MacAddress::repeat(0xBB),
            payload: Payload::empty(),
        }
    }

    fn table(capacity: usize) -> SeenTable {
        SeenTable::new(
            capacity,
            Duration::from_millis(2000),
            Duration::from_millis(1000),
        )
    }

    #[test]
    fn test_remember_and_contains() {
        let mut seen = table(10);
        let f = frame(1, FrameKind::Data);
        assert!(!seen.contains(&f));

        seen.remember(&f);
        assert!(seen.contains(&f));
        assert_eq!(seen.len(), 1);

        // Remembering again does not add a second entry
        seen.remember(&f);
        assert_eq!(seen.len(), 1);
    }

    #[test]
    fn test_role_is_part_of_key() {
        let mut seen = table(10);
        seen.remember(&frame(1, FrameKind::Data));

        assert!(!seen.contains(&frame(1, FrameKind::Confirmable)));
        assert!(!seen.contains(&frame(1, FrameKind::Ack)));
        assert!(!seen.contains(&frame(2, FrameKind::Data)));
    }

    #[test]
    fn test_unknown_types_share_bucket() {
        let mut seen = table(10);
        seen.remember(&frame(4, FrameKind::Other(7)));
        assert!(seen.contains(&frame(4, FrameKind::Other(9))));
    }

    #[test]
    fn test_capacity_evicts_earliest_insertion() {
        let mut seen = table(3);
        for id in 0..3 {
            seen.remember(&frame(id, FrameKind::Data));
        }

        // Lookups must not refresh the eviction order
        assert!(seen.contains(&frame(0, FrameKind::Data)));

        let evicted = seen.remember(&frame(3, FrameKind::Data));
        assert_eq!(evicted.map(|k| k.id), Some(0));
        assert_eq!(seen.len(), 3);
        assert!(!seen.contains(&frame(0, FrameKind::Data)));
        assert!(seen.contains(&frame(1, FrameKind::Data)));
        assert!(seen.contains(&frame(3, FrameKind::Data)));
    }

    #[test]
    fn test_sweep_is_interval_gated() {
        let mut seen = table(10);
        assert_eq!(seen.sweep(0), 0);
        seen.remember(&frame(1, FrameKind::Data));

        assert_eq!(seen.sweep(999), 0);
        assert_eq!(seen.sweep(1000), 0);
        assert!(seen.contains(&frame(1, FrameKind::Data)));

        assert_eq!(seen.sweep(1500), 0);
        assert_eq!(seen.sweep(2000), 1);
        assert!(seen.is_empty());
    }

    #[test]
    fn test_expired_entry_accepted_again() {
        let mut seen = table(10);
        seen.sweep(0);
        let f = frame(9, FrameKind::Confirmable);
        seen.remember(&f);

        seen.sweep(2500);
        assert!(!seen.contains(&f));

        assert!(seen.remember(&f).is_none());
        assert!(seen.contains(&f));
    }

    #[test]
    fn test_zero_capacity_holds_one() {
        let mut seen = table(0);
        assert_eq!(seen.capacity(), 1);
        seen.remember(&frame(1, FrameKind::Data));
        seen.remember(&frame(2, FrameKind::Data));
        assert_eq!(seen.len(), 1);
    }
}
