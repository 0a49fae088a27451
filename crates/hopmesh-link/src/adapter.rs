//! Single-outstanding-send transport adapter
//!
//! The adapter sits between a mesh node and a [`RadioDriver`]. It accepts
//! at most one buffer at a time, transmits it with a bounded number of
//! link-layer tries, spaces physical sends by a minimum interval, and turns
//! radio notifications into [`LinkEvent`]s on the next [`LinkAdapter::tick`].
//!
//! ```text
//!            try_send            tick: transmit
//!   Idle ─────────────► Pending ────────────────► Sending
//!    ▲                    ▲                          │
//!    │                    └──── PartialFail ◄────────┤ failed, tries left
//!    └──── Success | Broadcast | Fail ◄──────────────┘
//! ```

use bytes::Bytes;
use std::fmt;
use tracing::{debug, info, trace, warn};

use hopmesh_core::{LinkConfig, MacAddress, MeshError, Result, MAX_FRAME_LEN};

use crate::driver::RadioDriver;
use crate::notify::{self, LinkEndpoint, LinkNotifier, ReceivedFrame};

/// Link-layer status of the current or last send
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendStatus {
    /// Nothing has been sent yet
    Undetermined,
    /// The destination radio acknowledged the frame
    Success,
    /// Broadcast attempt finished; radios never acknowledge broadcasts
    Broadcast,
    /// The attempt failed but tries remain; a resend is scheduled
    PartialFail,
    /// Every try failed, or the radio rejected the buffer
    Fail,
}

impl SendStatus {
    /// Whether the send is finished
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SendStatus::Success | SendStatus::Broadcast | SendStatus::Fail
        )
    }
}

impl fmt::Display for SendStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendStatus::Undetermined => write!(f, "undetermined"),
            SendStatus::Success => write!(f, "success"),
            SendStatus::Broadcast => write!(f, "broadcast"),
            SendStatus::PartialFail => write!(f, "partial-fail"),
            SendStatus::Fail => write!(f, "fail"),
        }
    }
}

/// Result of offering a buffer to the adapter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TryTransmit {
    /// The adapter took the buffer; a terminal `SendComplete` will follow
    Accepted,
    /// A send is already in progress; offer again on a later tick
    Busy,
}

impl TryTransmit {
    /// Treat `Busy` as an error, for callers without a queue to retry from
    pub fn into_result(self) -> Result<()> {
        match self {
            TryTransmit::Accepted => Ok(()),
            TryTransmit::Busy => Err(MeshError::TransportBusy),
        }
    }
}

/// Adapter state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// No send in progress
    Idle,
    /// A buffer waits for its (next) physical transmission
    Pending,
    /// A transmission is on the air, awaiting its completion
    Sending,
}

/// Event produced by a tick
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// Progress of the current send
    SendComplete(SendStatus),
    /// A frame arrived from the radio
    FrameReceived(ReceivedFrame),
}

/// Adapter counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LinkStats {
    /// Buffers accepted through `try_send`
    pub accepted: u64,
    /// `try_send` calls refused because a send was in progress
    pub busy_rejections: u64,
    /// Physical transmissions, retries included
    pub transmissions: u64,
    /// Transmissions that were retries
    pub retries: u64,
    /// Sends acknowledged by the destination radio
    pub delivered: u64,
    /// Broadcast sends finished
    pub broadcasts: u64,
    /// Sends that failed terminally
    pub failed: u64,
    /// Frames handed up to the node
    pub frames_received: u64,
    /// Notifications dropped on the interrupt path
    pub dropped_completions: u64,
    /// Frames dropped because the receive queue was full
    pub dropped_frames: u64,
    /// Buffers dropped for being shorter than a frame header
    pub short_frames: u64,
}

#[derive(Debug)]
struct OutgoingSend {
    dest: MacAddress,
    data: Bytes,
    channel: u8,
    tries_left: u8,
    attempts: u8,
    in_flight: bool,
}

/// Transport adapter over a radio driver
pub struct LinkAdapter<D: RadioDriver> {
    /// Physical radio
    driver: D,
    /// Pacing and queue settings
    config: LinkConfig,
    /// Interrupt-side handle, given to the driver on `begin`
    notifier: LinkNotifier,
    /// Poll-side handle
    endpoint: LinkEndpoint,
    /// The single outstanding send
    current: Option<OutgoingSend>,
    /// When the last physical transmission started
    last_transmit_ms: Option<u64>,
    /// Status of the current or last send
    last_status: SendStatus,
    /// Own address, known once started
    own_address: Option<MacAddress>,
    /// Counters
    stats: LinkStats,
}

impl<D: RadioDriver> LinkAdapter<D> {
    /// Create an adapter; the radio is not touched until [`begin`](Self::begin)
    pub fn new(driver: D, config: LinkConfig) -> Self {
        let (notifier, endpoint) = notify::channel(config.receive_queue_capacity);
        Self {
            driver,
            config,
            notifier,
            endpoint,
            current: None,
            last_transmit_ms: None,
            last_status: SendStatus::Undetermined,
            own_address: None,
            stats: LinkStats::default(),
        }
    }

    /// Bring the radio up and learn the own address
    pub fn begin(&mut self) -> Result<MacAddress> {
        if self.own_address.is_some() {
            return Err(MeshError::AlreadyStarted);
        }
        let address = self.driver.begin(self.notifier.clone())?;
        info!(driver = self.driver.name(), address = %address, "Radio link started");
        self.own_address = Some(address);
        Ok(address)
    }

    /// Shut the radio down, abandoning any send in progress
    pub fn stop(&mut self) {
        if self.own_address.take().is_none() {
            return;
        }
        self.driver.stop();
        self.endpoint.disarm();
        if self.current.take().is_some() {
            debug!("Abandoned in-progress send on stop");
        }
        let drained = self.endpoint.drain();
        info!(driver = self.driver.name(), drained, "Radio link stopped");
    }

    /// Whether `begin` succeeded and `stop` was not called since
    pub fn is_started(&self) -> bool {
        self.own_address.is_some()
    }

    /// Own link-layer address, once started
    pub fn own_address(&self) -> Option<MacAddress> {
        self.own_address
    }

    /// Offer one buffer for transmission
    ///
    /// Broadcasts get a single best-effort attempt regardless of `max_tries`,
    /// since the radio never acknowledges them.
    pub fn try_send(
        &mut self,
        dest: MacAddress,
        data: Bytes,
        max_tries: u8,
        channel: u8,
    ) -> Result<TryTransmit> {
        if self.own_address.is_none() {
            return Err(MeshError::NotStarted);
        }
        if data.len() > MAX_FRAME_LEN {
            return Err(MeshError::PayloadTooLarge {
                size: data.len(),
                max: MAX_FRAME_LEN,
            });
        }
        if self.current.is_some() {
            self.stats.busy_rejections += 1;
            return Ok(TryTransmit::Busy);
        }

        let tries = if dest.is_broadcast() {
            1
        } else {
            max_tries.max(1)
        };
        trace!(dest = %dest, len = data.len(), tries, channel, "Send accepted");
        self.current = Some(OutgoingSend {
            dest,
            data,
            channel,
            tries_left: tries,
            attempts: 0,
            in_flight: false,
        });
        self.stats.accepted += 1;
        Ok(TryTransmit::Accepted)
    }

    /// Whether a new buffer would be accepted
    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }

    /// Current state of the send state machine
    pub fn state(&self) -> LinkState {
        match &self.current {
            None => LinkState::Idle,
            Some(send) if send.in_flight => LinkState::Sending,
            Some(_) => LinkState::Pending,
        }
    }

    /// Status of the current or last send
    pub fn last_status(&self) -> SendStatus {
        self.last_status
    }

    /// Advance the adapter
    ///
    /// Collects a pending completion, starts the next physical transmission
    /// if pacing allows, and dequeues at most one received frame.
    pub fn tick(&mut self, now_ms: u64) -> Vec<LinkEvent> {
        let mut events = Vec::new();
        if self.own_address.is_none() {
            return events;
        }

        if let Some(status) = self.collect_completion() {
            events.push(LinkEvent::SendComplete(status));
        }

        if let Some(status) = self.transmit_pending(now_ms) {
            events.push(LinkEvent::SendComplete(status));
        }

        if let Some(frame) = self.endpoint.next_frame() {
            trace!(src = %frame.src, len = frame.data.len(), "Frame dequeued");
            self.stats.frames_received += 1;
            events.push(LinkEvent::FrameReceived(frame));
        }

        events
    }

    fn collect_completion(&mut self) -> Option<SendStatus> {
        let delivered = self.endpoint.take_completion()?;

        let Some(send) = self.current.as_mut().filter(|send| send.in_flight) else {
            trace!(delivered, "Completion without a transmission, ignoring");
            return None;
        };
        send.in_flight = false;
        self.endpoint.disarm();

        let status = if send.dest.is_broadcast() {
            SendStatus::Broadcast
        } else if delivered {
            SendStatus::Success
        } else if send.tries_left > 0 {
            SendStatus::PartialFail
        } else {
            SendStatus::Fail
        };

        match status {
            SendStatus::Success => self.stats.delivered += 1,
            SendStatus::Broadcast => self.stats.broadcasts += 1,
            SendStatus::Fail => self.stats.failed += 1,
            _ => {}
        }
        debug!(
            dest = %send.dest,
            attempts = send.attempts,
            tries_left = send.tries_left,
            status = %status,
            "Send completion"
        );

        if status.is_terminal() {
            self.current = None;
        }
        self.last_status = status;
        Some(status)
    }

    fn transmit_pending(&mut self, now_ms: u64) -> Option<SendStatus> {
        let send = self.current.as_mut()?;
        if send.in_flight {
            return None;
        }

        let interval_ms = self.config.send_interval.as_millis() as u64;
        if let Some(last) = self.last_transmit_ms {
            if now_ms.saturating_sub(last) < interval_ms {
                return None;
            }
        }
        self.last_transmit_ms = Some(now_ms);

        if send.attempts > 0 {
            self.stats.retries += 1;
        }
        send.attempts += 1;
        send.tries_left = send.tries_left.saturating_sub(1);
        send.in_flight = true;

        self.endpoint.arm();
        match self.driver.transmit(send.dest, send.channel, &send.data) {
            Ok(()) => {
                trace!(dest = %send.dest, attempt = send.attempts, "Transmission started");
                self.stats.transmissions += 1;
                None
            }
            Err(e) => {
                warn!(driver = self.driver.name(), error = %e, "Radio rejected transmission");
                self.endpoint.disarm();
                self.current = None;
                self.stats.failed += 1;
                self.last_status = SendStatus::Fail;
                Some(SendStatus::Fail)
            }
        }
    }

    /// Adapter counters merged with the notification path's drop counters
    pub fn stats(&self) -> LinkStats {
        let dropped = self.notifier.stats();
        LinkStats {
            dropped_completions: dropped.dropped_completions,
            dropped_frames: dropped.dropped_frames,
            short_frames: dropped.short_frames,
            ..self.stats
        }
    }

    /// Pacing and queue settings
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Borrow the driver
    pub fn driver(&self) -> &D {
        &self.driver
    }

    /// Mutably borrow the driver
    pub fn driver_mut(&mut self) -> &mut D {
        &mut self.driver
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockRadio;
    use std::time::Duration;

    const OWN: MacAddress = MacAddress::repeat(0xAA);
    const PEER: MacAddress = MacAddress::repeat(0xBB);

    fn started(radio: &MockRadio) -> LinkAdapter<MockRadio> {
        let mut link = LinkAdapter::new(radio.clone(), LinkConfig::default());
        link.begin().unwrap();
        link
    }

    fn payload() -> Bytes {
        Bytes::from_static(&[0u8; 20])
    }

    fn completions(events: &[LinkEvent]) -> Vec<SendStatus> {
        events
            .iter()
            .filter_map(|e| match e {
                LinkEvent::SendComplete(status) => Some(*status),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_not_started() {
        let mut link = LinkAdapter::new(MockRadio::new(OWN), LinkConfig::default());
        assert!(matches!(
            link.try_send(PEER, payload(), 2, 0),
            Err(MeshError::NotStarted)
        ));
        assert!(link.tick(0).is_empty());
    }

    #[test]
    fn test_begin_twice() {
        let radio = MockRadio::new(OWN);
        let mut link = started(&radio);
        assert_eq!(link.own_address(), Some(OWN));
        assert!(matches!(link.begin(), Err(MeshError::AlreadyStarted)));
    }

    #[test]
    fn test_busy_while_sending() {
        let radio = MockRadio::new(OWN);
        let mut link = started(&radio);

        assert_eq!(link.try_send(PEER, payload(), 2, 0).unwrap(), TryTransmit::Accepted);
        assert_eq!(link.try_send(PEER, payload(), 2, 0).unwrap(), TryTransmit::Busy);
        assert_eq!(link.state(), LinkState::Pending);

        link.tick(0);
        assert_eq!(link.state(), LinkState::Sending);
        assert_eq!(link.try_send(PEER, payload(), 2, 0).unwrap(), TryTransmit::Busy);
        assert_eq!(link.stats().busy_rejections, 2);

        let err = link.try_send(PEER, payload(), 2, 0).unwrap().into_result().unwrap_err();
        assert!(matches!(err, MeshError::TransportBusy));
        assert!(err.is_retriable());
    }

    #[test]
    fn test_success() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let radio = MockRadio::new(OWN);
        let mut link = started(&radio);

        link.try_send(PEER, payload(), 2, 4).unwrap();
        assert!(completions(&link.tick(0)).is_empty());

        let sent = radio.transmissions();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dest, PEER);
        assert_eq!(sent[0].channel, 4);

        radio.complete(true);
        assert_eq!(completions(&link.tick(10)), vec![SendStatus::Success]);
        assert!(link.is_idle());
        assert_eq!(link.last_status(), SendStatus::Success);
    }

    #[test]
    fn test_retry_then_fail_with_pacing() {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();

        let radio = MockRadio::new(OWN);
        let mut link = started(&radio);

        link.try_send(PEER, payload(), 2, 0).unwrap();
        link.tick(0);
        radio.complete(false);

        // First failure leaves one try; the resend waits for the interval
        assert_eq!(completions(&link.tick(10)), vec![SendStatus::PartialFail]);
        assert_eq!(radio.transmissions().len(), 1);
        assert_eq!(link.state(), LinkState::Pending);

        link.tick(99);
        assert_eq!(radio.transmissions().len(), 1);
        link.tick(100);
        assert_eq!(radio.transmissions().len(), 2);

        radio.complete(false);
        assert_eq!(completions(&link.tick(150)), vec![SendStatus::Fail]);
        assert!(link.is_idle());
        assert_eq!(link.stats().retries, 1);
        assert_eq!(link.stats().failed, 1);
    }

    #[test]
    fn test_broadcast_reports_broadcast_once() {
        let radio = MockRadio::new(OWN);
        let mut link = started(&radio);

        link.try_send(MacAddress::BROADCAST, payload(), 5, 0).unwrap();
        link.tick(0);
        radio.complete(false);

        assert_eq!(completions(&link.tick(5)), vec![SendStatus::Broadcast]);
        assert!(link.is_idle());
        assert!(completions(&link.tick(500)).is_empty());
        assert_eq!(radio.transmissions().len(), 1);
    }

    #[test]
    fn test_driver_rejection_is_terminal_fail() {
        let radio = MockRadio::new(OWN);
        radio.set_reject_transmit(true);
        let mut link = started(&radio);

        link.try_send(PEER, payload(), 3, 0).unwrap();
        assert_eq!(completions(&link.tick(0)), vec![SendStatus::Fail]);
        assert!(link.is_idle());
    }

    #[test]
    fn test_pacing_between_sends() {
        let radio = MockRadio::new(OWN).with_auto_complete(true);
        let mut link = LinkAdapter::new(
            radio.clone(),
            LinkConfig {
                send_interval: Duration::from_millis(50),
                ..LinkConfig::default()
            },
        );
        link.begin().unwrap();

        link.try_send(PEER, payload(), 1, 0).unwrap();
        link.tick(0);
        assert_eq!(completions(&link.tick(1)), vec![SendStatus::Success]);

        link.try_send(PEER, payload(), 1, 0).unwrap();
        link.tick(20);
        assert_eq!(radio.transmissions().len(), 1);
        link.tick(50);
        assert_eq!(radio.transmissions().len(), 2);
    }

    #[test]
    fn test_one_received_frame_per_tick() {
        let radio = MockRadio::new(OWN);
        let mut link = started(&radio);

        radio.deliver(PEER, &[1u8; 18]);
        radio.deliver(PEER, &[2u8; 18]);
        radio.deliver(PEER, &[3u8; 5]);

        let first = link.tick(0);
        assert_eq!(first.len(), 1);
        assert!(matches!(&first[0], LinkEvent::FrameReceived(f) if f.data[0] == 1));

        let second = link.tick(1);
        assert!(matches!(&second[0], LinkEvent::FrameReceived(f) if f.data[0] == 2));

        assert!(link.tick(2).is_empty());
        assert_eq!(link.stats().short_frames, 1);
        assert_eq!(link.stats().frames_received, 2);
    }

    #[test]
    fn test_stop_abandons_send() {
        let radio = MockRadio::new(OWN);
        let mut link = started(&radio);

        link.try_send(PEER, payload(), 2, 0).unwrap();
        link.tick(0);
        link.stop();

        assert!(!radio.is_started());
        assert!(link.is_idle());
        assert!(!link.is_started());

        radio.complete(true);
        assert!(link.tick(10).is_empty());
    }
}
