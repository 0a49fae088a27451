//! Node counters

/// Counters kept by a node or router
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NodeStats {
    /// Messages queued by the application
    pub messages_queued: u64,
    /// Frames accepted by the link for transmission
    pub frames_sent: u64,
    /// Valid frames received
    pub frames_received: u64,
    /// Payloads delivered to the application
    pub messages_delivered: u64,
    /// Received buffers that did not decode
    pub malformed_dropped: u64,
    /// Frames dropped as already seen
    pub duplicates_dropped: u64,
    /// Frames for other nodes discarded by a plain node
    pub foreign_discarded: u64,
    /// Frames relayed by a router
    pub forwarded: u64,
    /// Frames not relayed because their hop budget ran out
    pub hop_exhausted: u64,
    /// Acknowledgements queued
    pub acks_sent: u64,
    /// Acknowledgements that matched no pending confirmation
    pub acks_unmatched: u64,
    /// Confirmed messages acknowledged
    pub confirmations_succeeded: u64,
    /// Confirmed messages the radio could not deliver
    pub delivery_failures: u64,
    /// Confirmed messages never acknowledged
    pub confirmation_timeouts: u64,
    /// Protocol frames dropped because the outgoing queue was full
    pub queue_overflows: u64,
}

impl NodeStats {
    /// Share of received frames that were duplicates (0.0 to 1.0)
    pub fn duplicate_rate(&self) -> f64 {
        let seen = self.frames_received;
        if seen == 0 {
            0.0
        } else {
            self.duplicates_dropped as f64 / seen as f64
        }
    }
}
