//! Line-topology simulation
//!
//! Two devices at the ends of a chain of routers, all sharing one
//! [`SimulatedAir`]. The first device sends confirmed messages to the last
//! one on a fixed schedule while every station is polled from a tokio
//! interval.

use anyhow::{ensure, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use hopmesh_core::{MacAddress, MeshConfig};
use hopmesh_link::test_utils::{AirStats, SimRadio, SimulatedAir};
use hopmesh_link::LinkStats;
use hopmesh_node::{Device, MeshNode, MessageStatus, NodeStats, Router, StatusEvent};

/// Simulation parameters
#[derive(Debug, Clone)]
pub struct SimParams {
    /// Routers between the two devices
    pub routers: u8,
    /// Confirmed messages to send
    pub messages: u32,
    /// Spacing between application messages
    pub message_interval: Duration,
    /// Per-link frame loss probability
    pub loss: f64,
    /// Poll period
    pub tick: Duration,
    /// Simulated run time
    pub duration: Duration,
}

impl Default for SimParams {
    fn default() -> Self {
        Self {
            routers: 2,
            messages: 5,
            message_interval: Duration::from_millis(250),
            loss: 0.0,
            tick: Duration::from_millis(1),
            duration: Duration::from_secs(3),
        }
    }
}

enum Station {
    Device(Device<SimRadio>),
    Router(Router<SimRadio>),
}

impl Station {
    fn begin(&mut self) -> hopmesh_core::Result<MacAddress> {
        match self {
            Station::Device(node) => node.begin(),
            Station::Router(node) => node.begin(),
        }
    }

    fn poll(&mut self, now_ms: u64) {
        match self {
            Station::Device(node) => node.poll(now_ms),
            Station::Router(node) => node.poll(now_ms),
        }
    }

    fn stop(&mut self) {
        match self {
            Station::Device(node) => node.stop(),
            Station::Router(node) => node.stop(),
        }
    }

    fn summary(&self, address: MacAddress) -> StationSummary {
        let (role, stats, link, routes) = match self {
            Station::Device(node) => ("device", node.stats(), node.link().stats(), 0),
            Station::Router(node) => (
                "router",
                node.stats(),
                node.link().stats(),
                node.routing_table().len(),
            ),
        };
        StationSummary::new(address, role, stats, link, routes)
    }
}

/// Per-station counters
#[derive(Debug, Clone, Serialize)]
pub struct StationSummary {
    /// Station address
    pub address: String,
    /// "device" or "router"
    pub role: &'static str,
    /// Frames accepted by the link
    pub frames_sent: u64,
    /// Link-layer retries
    pub retries: u64,
    /// Valid frames received
    pub frames_received: u64,
    /// Payloads delivered to the application
    pub delivered: u64,
    /// Duplicates dropped
    pub duplicates: u64,
    /// Frames relayed
    pub forwarded: u64,
    /// Frames whose hop budget ran out here
    pub hop_exhausted: u64,
    /// Routes known at the end of the run
    pub routes: usize,
}

impl StationSummary {
    fn new(
        address: MacAddress,
        role: &'static str,
        stats: NodeStats,
        link: LinkStats,
        routes: usize,
    ) -> Self {
        Self {
            address: address.to_string(),
            role,
            frames_sent: stats.frames_sent,
            retries: link.retries,
            frames_received: stats.frames_received,
            delivered: stats.messages_delivered,
            duplicates: stats.duplicates_dropped,
            forwarded: stats.forwarded,
            hop_exhausted: stats.hop_exhausted,
            routes,
        }
    }
}

/// Outcome of a run
#[derive(Debug, Clone, Serialize)]
pub struct SimSummary {
    /// Confirmed messages queued by the source
    pub sent: u32,
    /// Messages the source saw confirmed
    pub confirmed: u32,
    /// Messages reported failed
    pub failed: u32,
    /// Payloads the destination received
    pub received: u32,
    /// Transmissions put on the air
    pub air_transmissions: u64,
    /// Frames lost to link loss
    pub air_lost: u64,
    /// Per-station counters, source first
    pub stations: Vec<StationSummary>,
}

fn device_address(index: u8) -> MacAddress {
    MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x00, index])
}

fn router_address(index: u8) -> MacAddress {
    MacAddress::new([0x02, 0x00, 0x00, 0x00, 0x01, index])
}

/// Chain of stations over one simulated medium
pub struct Simulation {
    air: SimulatedAir,
    stations: Vec<(MacAddress, Station)>,
    params: SimParams,
    statuses: Arc<Mutex<Vec<StatusEvent>>>,
    received: Arc<Mutex<u32>>,
}

impl Simulation {
    /// Build the topology: source, routers, destination, linked in a line
    pub fn new(config: &MeshConfig, params: SimParams) -> Result<Self> {
        config.validate()?;
        ensure!(
            (0.0..=1.0).contains(&params.loss),
            "loss must be between 0 and 1, got {}",
            params.loss
        );
        ensure!(!params.tick.is_zero(), "tick must be positive");

        let air = SimulatedAir::new();
        let source = device_address(0x0A);
        let destination = device_address(0x0B);

        let mut chain = vec![source];
        chain.extend((1..=params.routers).map(router_address));
        chain.push(destination);
        for pair in chain.windows(2) {
            air.link_with_loss(pair[0], pair[1], params.loss);
        }

        let statuses = Arc::new(Mutex::new(Vec::new()));
        let received = Arc::new(Mutex::new(0u32));

        let mut source_node = MeshNode::device(air.radio(source), config);
        let sink = Arc::clone(&statuses);
        source_node.set_on_status(move |event| {
            debug!(id = event.id, status = %event.status, "Message status");
            sink.lock().push(event);
        });

        let mut destination_node = MeshNode::device(air.radio(destination), config);
        let counter = Arc::clone(&received);
        destination_node.set_on_message(move |message| {
            debug!(
                id = message.id,
                from = %message.source,
                len = message.payload.len(),
                "Message received"
            );
            *counter.lock() += 1;
        });

        let mut stations = vec![(source, Station::Device(source_node))];
        for &address in &chain[1..chain.len() - 1] {
            stations.push((
                address,
                Station::Router(MeshNode::router(air.radio(address), config)),
            ));
        }
        stations.push((destination, Station::Device(destination_node)));

        Ok(Self {
            air,
            stations,
            params,
            statuses,
            received,
        })
    }

    /// Run until the configured duration elapses or the future is cancelled
    pub async fn run(&mut self) -> Result<SimSummary> {
        for (address, station) in &mut self.stations {
            let own = station.begin()?;
            debug_assert_eq!(own, *address);
        }
        info!(
            stations = self.stations.len(),
            messages = self.params.messages,
            loss = self.params.loss,
            "Simulation started"
        );

        let destination = self.stations[self.stations.len() - 1].0;
        let duration_ms = self.params.duration.as_millis() as u64;
        let message_interval_ms = self.params.message_interval.as_millis() as u64;

        let mut ticker = time::interval(self.params.tick);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let start = Instant::now();
        let mut sent = 0u32;

        loop {
            ticker.tick().await;
            let now_ms = start.elapsed().as_millis() as u64;
            if now_ms > duration_ms {
                break;
            }

            if sent < self.params.messages && now_ms >= u64::from(sent) * message_interval_ms {
                if let (_, Station::Device(source)) = &mut self.stations[0] {
                    let payload = format!("ping {}", sent).into_bytes();
                    match source.send_confirmed(payload, destination) {
                        Ok(id) => debug!(id, "Queued message {}", sent),
                        Err(e) => warn!(error = %e, "Failed to queue message {}", sent),
                    }
                }
                sent += 1;
            }

            for (_, station) in &mut self.stations {
                station.poll(now_ms);
            }
        }

        for (_, station) in &mut self.stations {
            station.stop();
        }

        let summary = self.summary(sent);
        info!(
            sent = summary.sent,
            confirmed = summary.confirmed,
            failed = summary.failed,
            received = summary.received,
            "Simulation finished"
        );
        Ok(summary)
    }

    fn summary(&self, sent: u32) -> SimSummary {
        let statuses = self.statuses.lock();
        let confirmed = statuses
            .iter()
            .filter(|event| event.status == MessageStatus::Success)
            .count() as u32;
        let failed = statuses.len() as u32 - confirmed;
        let AirStats {
            transmissions,
            lost,
            ..
        } = self.air.stats();

        SimSummary {
            sent,
            confirmed,
            failed,
            received: *self.received.lock(),
            air_transmissions: transmissions,
            air_lost: lost,
            stations: self
                .stations
                .iter()
                .map(|(address, station)| station.summary(*address))
                .collect(),
        }
    }
}
