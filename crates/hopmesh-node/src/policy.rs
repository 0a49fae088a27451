//! Foreign-frame policies
//!
//! A node hands every frame that is not addressed to it to its
//! [`ForeignFramePolicy`]. The policy also picks the link-layer address each
//! outgoing frame is transmitted to, and may learn from inbound traffic.
//!
//! - [`Discard`] drops foreign frames and always transmits to broadcast;
//!   this is a plain mesh device.
//! - [`Forwarding`] relays foreign frames with a decremented hop budget,
//!   learns routes from inbound traffic and transmits to the learned next
//!   hop when one is known; this is a router.

use tracing::{debug, trace};

use hopmesh_core::{DeliveryRole, Frame, MacAddress, RouterConfig};

use crate::queue::{OutgoingEntry, OutgoingQueue};
use crate::routing::RoutingTable;
use crate::seen::SeenTable;
use crate::stats::NodeStats;

/// Node state a policy may read and update
#[derive(Debug)]
pub struct PolicyContext<'a> {
    /// This node's own address
    pub own: MacAddress,
    /// Hop budget given to frames this node originates
    pub initial_hop_budget: u8,
    /// Channel for frames this node queues
    pub channel: u8,
    /// Dedup table
    pub seen: &'a mut SeenTable,
    /// Outgoing queue
    pub queue: &'a mut OutgoingQueue,
    /// Counters
    pub stats: &'a mut NodeStats,
}

/// Strategy for frames not addressed to this node
pub trait ForeignFramePolicy: Send {
    /// Inspect a valid inbound frame before it is classified
    ///
    /// `link_src` is the neighbour the frame was heard from.
    fn observe(&mut self, _frame: &Frame, _link_src: MacAddress, _ctx: &PolicyContext<'_>) {}

    /// Handle a frame addressed to some other node
    fn handle_foreign(&mut self, frame: Frame, ctx: &mut PolicyContext<'_>);

    /// Link-layer address to transmit a frame for `dest` to
    fn next_hop(&self, _dest: MacAddress) -> MacAddress {
        MacAddress::BROADCAST
    }

    /// Periodic maintenance, called once per poll
    fn tick(&mut self, _now_ms: u64) {}

    /// Forget any time base, called when the node stops
    fn reset_clock(&mut self) {}

    /// Get the policy name (for logging)
    fn name(&self) -> &'static str;
}

/// Drop every foreign frame
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl ForeignFramePolicy for Discard {
    fn handle_foreign(&mut self, frame: Frame, ctx: &mut PolicyContext<'_>) {
        trace!(id = frame.id, dest = %frame.dest, "Frame not for us, discarding");
        ctx.stats.foreign_discarded += 1;
    }

    fn name(&self) -> &'static str {
        "discard"
    }
}

/// Relay foreign frames and learn routes
#[derive(Debug)]
pub struct Forwarding {
    routes: RoutingTable,
}

impl Forwarding {
    /// Create a forwarding policy with an empty routing table
    pub fn new(config: &RouterConfig) -> Self {
        Self {
            routes: RoutingTable::new(
                config.routing_capacity,
                config.routing_ttl,
                config.routing_sweep_interval,
            ),
        }
    }

    /// Learned routes
    pub fn routes(&self) -> &RoutingTable {
        &self.routes
    }

    /// Learned routes, mutably
    pub fn routes_mut(&mut self) -> &mut RoutingTable {
        &mut self.routes
    }
}

impl Default for Forwarding {
    fn default() -> Self {
        Self::new(&RouterConfig::default())
    }
}

impl ForeignFramePolicy for Forwarding {
    fn observe(&mut self, frame: &Frame, link_src: MacAddress, ctx: &PolicyContext<'_>) {
        if frame.src == ctx.own || link_src == ctx.own {
            return;
        }
        let hops = ctx
            .initial_hop_budget
            .saturating_sub(frame.hop_count)
            .saturating_add(1)
            .max(1);
        self.routes.add_or_update(frame.src, link_src, hops);
    }

    fn handle_foreign(&mut self, frame: Frame, ctx: &mut PolicyContext<'_>) {
        if frame.src == ctx.own {
            trace!(id = frame.id, "Own frame echoed back, not relaying");
            ctx.stats.duplicates_dropped += 1;
            return;
        }

        let Some(relayed) = frame.forwarded() else {
            debug!(
                id = frame.id,
                src = %frame.src,
                hop_count = frame.hop_count,
                "Hop budget exhausted"
            );
            ctx.stats.hop_exhausted += 1;
            return;
        };

        if ctx.seen.contains(&frame) {
            trace!(id = frame.id, src = %frame.src, "Already relayed, dropping");
            ctx.stats.duplicates_dropped += 1;
            return;
        }
        let entry = OutgoingEntry {
            frame: relayed,
            role: DeliveryRole::Forwarded,
            channel: ctx.channel,
        };
        // Only a queued relay counts as handled; a later copy may still go out
        match ctx.queue.push(entry) {
            Ok(()) => {
                ctx.seen.remember(&frame);
                debug!(
                    id = frame.id,
                    src = %frame.src,
                    dest = %frame.dest,
                    hop_count = frame.hop_count - 1,
                    "Relaying frame"
                );
                ctx.stats.forwarded += 1;
            }
            Err(e) => {
                debug!(id = frame.id, error = %e, "Cannot relay frame");
                ctx.stats.queue_overflows += 1;
            }
        }
    }

    fn next_hop(&self, dest: MacAddress) -> MacAddress {
        self.routes.resolve_next_hop(dest)
    }

    fn tick(&mut self, now_ms: u64) {
        self.routes.update(now_ms);
    }

    fn reset_clock(&mut self) {
        self.routes.reset_clock();
    }

    fn name(&self) -> &'static str {
        "forwarding"
    }
}
