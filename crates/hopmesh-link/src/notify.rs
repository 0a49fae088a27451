//! Lock-free handoff between the radio's notification path and the poll loop
//!
//! Radio callbacks can preempt the control loop at any point, so nothing in
//! this module blocks. Send completions go through a single atomic slot: a
//! completion that finds the slot occupied, or that arrives when no send is
//! in flight, is dropped. Received frames go through a bounded channel with
//! `try_send`; a full queue drops the frame. Each frame moves through the
//! channel as one owned buffer, so the poll side never sees half of it.

use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::trace;

use hopmesh_core::{MacAddress, FRAME_HEADER_LEN, MAX_FRAME_LEN};

const SLOT_EMPTY: u8 = 0;
const SLOT_DELIVERED: u8 = 1;
const SLOT_FAILED: u8 = 2;

/// A raw buffer received from the radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Link-layer sender (the last hop, not necessarily the originator)
    pub src: MacAddress,
    /// Raw frame bytes
    pub data: Bytes,
}

#[derive(Debug)]
struct Shared {
    awaiting_completion: AtomicBool,
    completion: AtomicU8,
    dropped_completions: AtomicU64,
    dropped_frames: AtomicU64,
    short_frames: AtomicU64,
}

/// Counters kept by the notification path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotifierStats {
    /// Completions dropped because nothing was in flight or the slot was busy
    pub dropped_completions: u64,
    /// Frames dropped because the receive queue was full
    pub dropped_frames: u64,
    /// Buffers dropped for being shorter than a frame header
    pub short_frames: u64,
}

/// Notification sink handed to a [`RadioDriver`](crate::RadioDriver)
///
/// Cheap to clone; every method returns immediately.
#[derive(Debug, Clone)]
pub struct LinkNotifier {
    shared: Arc<Shared>,
    frames: mpsc::Sender<ReceivedFrame>,
}

impl LinkNotifier {
    /// Report the link-layer outcome of the current transmission
    pub fn on_send_complete(&self, delivered: bool) {
        if !self.shared.awaiting_completion.load(Ordering::Acquire) {
            trace!(delivered, "Send completion with nothing in flight, dropping");
            self.shared
                .dropped_completions
                .fetch_add(1, Ordering::Relaxed);
            return;
        }

        let value = if delivered { SLOT_DELIVERED } else { SLOT_FAILED };
        if self
            .shared
            .completion
            .compare_exchange(SLOT_EMPTY, value, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.shared
                .dropped_completions
                .fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Hand a received buffer to the poll loop
    pub fn on_frame_received(&self, src: MacAddress, data: &[u8]) {
        if data.len() < FRAME_HEADER_LEN || data.len() > MAX_FRAME_LEN {
            self.shared.short_frames.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let frame = ReceivedFrame {
            src,
            data: Bytes::copy_from_slice(data),
        };
        if self.frames.try_send(frame).is_err() {
            self.shared.dropped_frames.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Snapshot of the drop counters
    pub fn stats(&self) -> NotifierStats {
        NotifierStats {
            dropped_completions: self.shared.dropped_completions.load(Ordering::Relaxed),
            dropped_frames: self.shared.dropped_frames.load(Ordering::Relaxed),
            short_frames: self.shared.short_frames.load(Ordering::Relaxed),
        }
    }
}

/// Poll-side half of the handoff, owned by the adapter
#[derive(Debug)]
pub(crate) struct LinkEndpoint {
    shared: Arc<Shared>,
    frames: mpsc::Receiver<ReceivedFrame>,
}

impl LinkEndpoint {
    /// Expect exactly one completion for a transmission about to start
    pub(crate) fn arm(&self) {
        self.shared.completion.store(SLOT_EMPTY, Ordering::Release);
        self.shared.awaiting_completion.store(true, Ordering::Release);
    }

    /// Stop accepting completions
    pub(crate) fn disarm(&self) {
        self.shared
            .awaiting_completion
            .store(false, Ordering::Release);
        self.shared.completion.store(SLOT_EMPTY, Ordering::Release);
    }

    /// Take the pending completion, if one arrived; `Some(true)` = delivered
    pub(crate) fn take_completion(&self) -> Option<bool> {
        match self.shared.completion.swap(SLOT_EMPTY, Ordering::AcqRel) {
            SLOT_DELIVERED => Some(true),
            SLOT_FAILED => Some(false),
            _ => None,
        }
    }

    /// Next queued frame, if any
    pub(crate) fn next_frame(&mut self) -> Option<ReceivedFrame> {
        self.frames.try_recv().ok()
    }

    /// Discard every queued frame
    pub(crate) fn drain(&mut self) -> usize {
        let mut drained = 0;
        while self.frames.try_recv().is_ok() {
            drained += 1;
        }
        drained
    }
}

/// Create a connected notifier/endpoint pair
pub(crate) fn channel(receive_capacity: usize) -> (LinkNotifier, LinkEndpoint) {
    let shared = Arc::new(Shared {
        awaiting_completion: AtomicBool::new(false),
        completion: AtomicU8::new(SLOT_EMPTY),
        dropped_completions: AtomicU64::new(0),
        dropped_frames: AtomicU64::new(0),
        short_frames: AtomicU64::new(0),
    });
    let (tx, rx) = mpsc::channel(receive_capacity.max(1));

    (
        LinkNotifier {
            shared: Arc::clone(&shared),
            frames: tx,
        },
        LinkEndpoint { shared, frames: rx },
    )
}
