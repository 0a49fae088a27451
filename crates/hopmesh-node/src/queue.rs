//! Outgoing FIFO queue
//!
//! Frames leave strictly in enqueue order. The head stays in the queue
//! while the link works on it and is popped only once the link reports a
//! terminal status for it.

use std::collections::VecDeque;

use hopmesh_core::{DeliveryRole, Frame, MeshError, Result};

/// A frame waiting for transmission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEntry {
    /// Frame to send
    pub frame: Frame,
    /// Why the frame is being sent
    pub role: DeliveryRole,
    /// Radio channel to send on
    pub channel: u8,
}

/// Bounded FIFO of outgoing frames
#[derive(Debug)]
pub struct OutgoingQueue {
    entries: VecDeque<OutgoingEntry>,
    capacity: usize,
}

impl OutgoingQueue {
    /// Create an empty queue
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append an entry at the tail
    pub fn push(&mut self, entry: OutgoingEntry) -> Result<()> {
        if self.entries.len() >= self.capacity {
            return Err(MeshError::QueueFull {
                capacity: self.capacity,
            });
        }
        self.entries.push_back(entry);
        Ok(())
    }

    /// Entry at the head
    pub fn front(&self) -> Option<&OutgoingEntry> {
        self.entries.front()
    }

    /// Remove the head
    pub fn pop(&mut self) -> Option<OutgoingEntry> {
        self.entries.pop_front()
    }

    /// Entries in transmission order
    pub fn iter(&self) -> impl Iterator<Item = &OutgoingEntry> {
        self.entries.iter()
    }

    /// Number of queued entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
