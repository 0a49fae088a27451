//! Mesh node: message lifecycle over a transport adapter
//!
//! A [`MeshNode`] owns its [`LinkAdapter`] and is driven entirely by
//! [`MeshNode::poll`]. Each poll:
//!
//! 1. ticks the link and handles its events (send completions, at most one
//!    received frame),
//! 2. sweeps expired seen entries,
//! 3. times out pending confirmations, reporting each once,
//! 4. lets the foreign-frame policy do its own maintenance,
//! 5. offers the head of the outgoing queue to the link if nothing is in
//!    flight.
//!
//! Nothing here blocks. A busy link leaves the head in the queue for the
//! next poll.

use bytes::Bytes;
use tracing::{debug, info, trace, warn};

use hopmesh_core::{
    DeliveryRole, Frame, FrameKind, MacAddress, MeshConfig, MeshError, NodeConfig, Payload,
    Result,
};
use hopmesh_link::{LinkAdapter, LinkEvent, RadioDriver, ReceivedFrame, SendStatus, TryTransmit};

use crate::confirm::PendingConfirmations;
use crate::event::{
    FailureReason, MessageCallback, MessageStatus, ReceivedMessage, StatusCallback, StatusEvent,
};
use crate::policy::{Discard, ForeignFramePolicy, Forwarding, PolicyContext};
use crate::queue::{OutgoingEntry, OutgoingQueue};
use crate::routing::RoutingTable;
use crate::seen::SeenTable;
use crate::stats::NodeStats;

/// A plain mesh device: foreign frames are discarded
pub type Device<D> = MeshNode<D, Discard>;

/// A router: foreign frames are relayed along learned routes
pub type Router<D> = MeshNode<D, Forwarding>;

/// Mesh participant parameterised by its foreign-frame policy
pub struct MeshNode<D: RadioDriver, P: ForeignFramePolicy> {
    link: LinkAdapter<D>,
    policy: P,
    config: NodeConfig,
    max_send_tries: u8,
    own: Option<MacAddress>,
    next_id: u8,
    seen: SeenTable,
    queue: OutgoingQueue,
    pending: PendingConfirmations,
    sending: bool,
    stats: NodeStats,
    on_status: Option<StatusCallback>,
    on_message: Option<MessageCallback>,
}

impl<D: RadioDriver> MeshNode<D, Discard> {
    /// Create a plain device
    pub fn device(driver: D, config: &MeshConfig) -> Self {
        Self::with_policy(driver, config, Discard)
    }
}

impl<D: RadioDriver> MeshNode<D, Forwarding> {
    /// Create a router
    pub fn router(driver: D, config: &MeshConfig) -> Self {
        let policy = Forwarding::new(&config.router);
        Self::with_policy(driver, config, policy)
    }

    /// Learned routes
    pub fn routing_table(&self) -> &RoutingTable {
        self.policy.routes()
    }

    /// Record a route by hand
    pub fn add_or_update_route(
        &mut self,
        destination: MacAddress,
        next_hop: MacAddress,
        hops: u8,
    ) {
        self.policy
            .routes_mut()
            .add_or_update(destination, next_hop, hops);
    }

    /// Link-layer address frames for `destination` are sent to
    pub fn resolve_next_hop(&self, destination: MacAddress) -> MacAddress {
        self.policy.next_hop(destination)
    }
}

impl<D: RadioDriver, P: ForeignFramePolicy> MeshNode<D, P> {
    /// Create a node with an explicit policy
    pub fn with_policy(driver: D, config: &MeshConfig, policy: P) -> Self {
        let node = &config.node;
        let next_id = node.initial_sequence_id.unwrap_or_else(rand::random);
        Self {
            link: LinkAdapter::new(driver, config.link.clone()),
            policy,
            config: node.clone(),
            max_send_tries: config.link.max_send_tries,
            own: None,
            next_id,
            seen: SeenTable::new(node.seen_capacity, node.seen_ttl, node.seen_sweep_interval),
            queue: OutgoingQueue::new(node.outgoing_queue_capacity),
            pending: PendingConfirmations::new(),
            sending: false,
            stats: NodeStats::default(),
            on_status: None,
            on_message: None,
        }
    }

    /// Bring the radio up
    pub fn begin(&mut self) -> Result<MacAddress> {
        let own = self.link.begin()?;
        self.own = Some(own);
        info!(address = %own, policy = self.policy.name(), "Mesh node started");
        Ok(own)
    }

    /// Shut the radio down
    ///
    /// Queued messages stay queued; the message that was in flight is sent
    /// again after the next `begin` and keeps its pending confirmation.
    pub fn stop(&mut self) {
        if self.own.take().is_none() {
            return;
        }
        self.link.stop();
        self.sending = false;
        self.seen.reset_clock();
        self.pending.reset_clock();
        self.policy.reset_clock();
        info!(queued = self.queue.len(), "Mesh node stopped");
    }

    /// Own address, once started
    pub fn own_address(&self) -> Option<MacAddress> {
        self.own
    }

    /// Queue an unconfirmed message; returns its sequence id
    pub fn send(&mut self, payload: impl Into<Bytes>, destination: MacAddress) -> Result<u8> {
        self.enqueue(payload.into(), destination, false)
    }

    /// Queue a message that `destination` must acknowledge
    ///
    /// The outcome is reported once through the status callback.
    pub fn send_confirmed(
        &mut self,
        payload: impl Into<Bytes>,
        destination: MacAddress,
    ) -> Result<u8> {
        if destination.is_broadcast() {
            return Err(MeshError::InvalidDestination(
                "confirmed messages need a single destination".to_string(),
            ));
        }
        self.enqueue(payload.into(), destination, true)
    }

    /// Set the callback for confirmed-message outcomes
    pub fn set_on_status(&mut self, callback: impl FnMut(StatusEvent) + Send + 'static) {
        self.on_status = Some(Box::new(callback));
    }

    /// Set the callback for delivered payloads
    pub fn set_on_message(&mut self, callback: impl FnMut(&ReceivedMessage) + Send + 'static) {
        self.on_message = Some(Box::new(callback));
    }

    /// Drive the node; call frequently with a monotonic millisecond clock
    pub fn poll(&mut self, now_ms: u64) {
        let Some(own) = self.own else {
            return;
        };

        for event in self.link.tick(now_ms) {
            match event {
                LinkEvent::SendComplete(status) => self.on_send_complete(status),
                LinkEvent::FrameReceived(received) => self.on_frame_received(own, received),
            }
        }

        self.seen.sweep(now_ms);
        for expired in self.pending.expire(now_ms) {
            debug!(id = expired.id, dest = %expired.dest, "Confirmation timed out");
            self.stats.confirmation_timeouts += 1;
            self.emit_status(
                expired.id,
                expired.dest,
                MessageStatus::Failed(FailureReason::ConfirmationTimeout),
            );
        }
        self.policy.tick(now_ms);

        self.process_next();
    }

    fn enqueue(&mut self, payload: Bytes, destination: MacAddress, confirmed: bool) -> Result<u8> {
        let own = self.own.ok_or(MeshError::NotStarted)?;
        let payload = Payload::new(payload)?;

        let id = self.next_id;
        let (kind, role) = if confirmed {
            (FrameKind::Confirmable, DeliveryRole::Confirmed)
        } else {
            (FrameKind::Data, DeliveryRole::Unconfirmed)
        };
        let frame = Frame {
            network_id: self.config.network_id,
            kind,
            id,
            hop_count: self.config.initial_hop_budget,
            src: own,
            dest: destination,
            payload,
        };

        self.queue.push(OutgoingEntry {
            frame,
            role,
            channel: self.config.channel,
        })?;
        self.next_id = self.next_id.wrapping_add(1);
        self.stats.messages_queued += 1;
        trace!(id, dest = %destination, confirmed, queued = self.queue.len(), "Message queued");
        Ok(id)
    }

    fn process_next(&mut self) {
        if self.sending || !self.link.is_idle() {
            return;
        }
        let Some(entry) = self.queue.front() else {
            return;
        };

        let link_dest = self.policy.next_hop(entry.frame.dest);
        let id = entry.frame.id;
        let dest = entry.frame.dest;
        let role = entry.role;
        let result = self.link.try_send(
            link_dest,
            entry.frame.encode(),
            self.max_send_tries,
            entry.channel,
        );

        match result {
            Ok(TryTransmit::Accepted) => {
                trace!(
                    id,
                    dest = %dest,
                    link_dest = %link_dest,
                    role = %role,
                    "Frame handed to link"
                );
                self.sending = true;
                self.stats.frames_sent += 1;
                if role == DeliveryRole::Confirmed {
                    self.pending.insert(id, dest, self.config.confirmation_timeout);
                }
            }
            Ok(TryTransmit::Busy) => {}
            Err(e) => {
                warn!(id, error = %e, code = e.error_code(), "Link refused frame, dropping it");
                self.queue.pop();
                if role == DeliveryRole::Confirmed {
                    self.fail_delivery(id, dest);
                }
            }
        }
    }

    fn on_send_complete(&mut self, status: SendStatus) {
        if !status.is_terminal() {
            trace!(status = %status, "Link retrying");
            return;
        }
        if !self.sending {
            trace!(status = %status, "Completion with nothing in flight");
            return;
        }
        self.sending = false;

        let Some(entry) = self.queue.pop() else {
            return;
        };
        debug!(
            id = entry.frame.id,
            dest = %entry.frame.dest,
            role = %entry.role,
            status = %status,
            "Send finished"
        );

        if entry.role == DeliveryRole::Confirmed && status == SendStatus::Fail {
            self.fail_delivery(entry.frame.id, entry.frame.dest);
        }
    }

    fn fail_delivery(&mut self, id: u8, dest: MacAddress) {
        if self.pending.remove(id, dest) {
            self.stats.delivery_failures += 1;
            self.emit_status(id, dest, MessageStatus::Failed(FailureReason::DeliveryFailure));
        }
    }

    fn on_frame_received(&mut self, own: MacAddress, received: ReceivedFrame) {
        let frame = match Frame::decode(&received.data) {
            Ok(frame) => frame,
            Err(e) => {
                debug!(from = %received.src, error = %e, "Dropping undecodable frame");
                self.stats.malformed_dropped += 1;
                return;
            }
        };
        self.stats.frames_received += 1;

        let mut ctx = PolicyContext {
            own,
            initial_hop_budget: self.config.initial_hop_budget,
            channel: self.config.channel,
            seen: &mut self.seen,
            queue: &mut self.queue,
            stats: &mut self.stats,
        };
        self.policy.observe(&frame, received.src, &ctx);

        if frame.dest == own {
            self.handle_own(own, frame);
        } else {
            self.policy.handle_foreign(frame, &mut ctx);
        }
    }

    fn handle_own(&mut self, own: MacAddress, frame: Frame) {
        if self.seen.contains(&frame) {
            trace!(id = frame.id, src = %frame.src, "Duplicate frame, dropping");
            self.stats.duplicates_dropped += 1;
            return;
        }
        self.seen.remember(&frame);

        match frame.kind {
            FrameKind::Ack => {
                if self.pending.remove(frame.id, frame.src) {
                    debug!(id = frame.id, from = %frame.src, "Message confirmed");
                    self.stats.confirmations_succeeded += 1;
                    self.emit_status(frame.id, frame.src, MessageStatus::Success);
                } else {
                    trace!(
                        id = frame.id,
                        from = %frame.src,
                        "Acknowledgement matches nothing pending"
                    );
                    self.stats.acks_unmatched += 1;
                }
            }
            FrameKind::Confirmable => {
                self.send_acknowledgement(own, &frame);
                self.deliver(frame);
            }
            FrameKind::Data | FrameKind::Other(_) => self.deliver(frame),
        }
    }

    fn send_acknowledgement(&mut self, own: MacAddress, frame: &Frame) {
        let ack = OutgoingEntry {
            frame: frame.acknowledgement(own, self.config.initial_hop_budget),
            role: DeliveryRole::Acknowledgement,
            channel: self.config.channel,
        };
        match self.queue.push(ack) {
            Ok(()) => {
                trace!(id = frame.id, to = %frame.src, "Acknowledgement queued");
                self.stats.acks_sent += 1;
            }
            Err(e) => {
                warn!(id = frame.id, error = %e, "Cannot queue acknowledgement");
                self.stats.queue_overflows += 1;
            }
        }
    }

    fn deliver(&mut self, frame: Frame) {
        self.stats.messages_delivered += 1;
        let message = ReceivedMessage {
            kind: frame.kind,
            source: frame.src,
            id: frame.id,
            payload: frame.payload,
        };
        if let Some(callback) = self.on_message.as_mut() {
            callback(&message);
        }
    }

    fn emit_status(&mut self, id: u8, destination: MacAddress, status: MessageStatus) {
        if let Some(callback) = self.on_status.as_mut() {
            callback(StatusEvent {
                id,
                destination,
                status,
            });
        }
    }

    /// Counters
    pub fn stats(&self) -> NodeStats {
        self.stats
    }

    /// Confirmations still awaiting an acknowledgement
    pub fn pending_confirmations(&self) -> &PendingConfirmations {
        &self.pending
    }

    /// Outgoing queue
    pub fn outgoing(&self) -> &OutgoingQueue {
        &self.queue
    }

    /// Dedup table
    pub fn seen(&self) -> &SeenTable {
        &self.seen
    }

    /// Whether a frame is with the link awaiting completion
    pub fn is_sending(&self) -> bool {
        self.sending
    }

    /// Sequence id the next message will get
    pub fn next_sequence_id(&self) -> u8 {
        self.next_id
    }

    /// Node settings
    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Foreign-frame policy
    pub fn policy(&self) -> &P {
        &self.policy
    }

    /// Underlying transport adapter
    pub fn link(&self) -> &LinkAdapter<D> {
        &self.link
    }

    /// Underlying transport adapter, mutably
    pub fn link_mut(&mut self) -> &mut LinkAdapter<D> {
        &mut self.link
    }
}
