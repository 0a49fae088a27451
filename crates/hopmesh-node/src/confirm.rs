//! Pending end-to-end confirmations
//!
//! A confirmed message gets one entry here when the link accepts it. The
//! entry is resolved exactly once, either by the acknowledgement from its
//! destination or by a failure (link-layer or timeout).

use std::time::Duration;
use tracing::trace;

use hopmesh_core::MacAddress;

/// A confirmed message waiting for its acknowledgement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingConfirmation {
    /// Sequence id of the confirmed frame
    pub id: u8,
    /// Node expected to acknowledge it
    pub dest: MacAddress,
    /// Time left before the confirmation fails
    pub remaining_ms: u64,
}

/// Confirmations awaiting an acknowledgement
#[derive(Debug, Default)]
pub struct PendingConfirmations {
    entries: Vec<PendingConfirmation>,
    last_check_ms: Option<u64>,
}

impl PendingConfirmations {
    /// Create an empty set
    pub fn new() -> Self {
        Self::default()
    }

    /// Start waiting for an acknowledgement of `id` from `dest`
    ///
    /// At most one entry exists per `(id, dest)`: inserting an entry that is
    /// already pending restarts its timeout and returns `false`.
    pub fn insert(&mut self, id: u8, dest: MacAddress, timeout: Duration) -> bool {
        let remaining_ms = timeout.as_millis() as u64;
        if let Some(entry) = self
            .entries
            .iter_mut()
            .find(|entry| entry.id == id && entry.dest == dest)
        {
            trace!(id, dest = %dest, "Confirmation already pending, restarting timeout");
            entry.remaining_ms = remaining_ms;
            return false;
        }
        trace!(id, dest = %dest, "Awaiting confirmation");
        self.entries.push(PendingConfirmation {
            id,
            dest,
            remaining_ms,
        });
        true
    }

    /// Resolve the confirmation matching `(id, dest)`
    ///
    /// Returns `false` if no such confirmation is pending, so a late or
    /// repeated resolution is never reported twice.
    pub fn remove(&mut self, id: u8, dest: MacAddress) -> bool {
        match self
            .entries
            .iter()
            .position(|entry| entry.id == id && entry.dest == dest)
        {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    /// Age every confirmation by the time since the last check
    ///
    /// Returns the confirmations that ran out, in insertion order. The first
    /// call only records the time base.
    pub fn expire(&mut self, now_ms: u64) -> Vec<PendingConfirmation> {
        let elapsed = match self.last_check_ms.replace(now_ms) {
            Some(last) => now_ms.saturating_sub(last),
            None => return Vec::new(),
        };

        let mut expired = Vec::new();
        self.entries.retain_mut(|entry| {
            entry.remaining_ms = entry.remaining_ms.saturating_sub(elapsed);
            if entry.remaining_ms == 0 {
                expired.push(*entry);
                false
            } else {
                true
            }
        });
        expired
    }

    /// Forget the time base
    pub fn reset_clock(&mut self) {
        self.last_check_ms = None;
    }

    /// Pending entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &PendingConfirmation> {
        self.entries.iter()
    }

    /// Number of pending confirmations
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is pending
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
