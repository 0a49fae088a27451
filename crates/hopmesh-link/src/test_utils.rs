//! In-memory radios for tests and simulation
//!
//! [`MockRadio`] records every transmission and lets a test decide when and
//! how each send completes. [`SimulatedAir`] connects many [`SimRadio`]s
//! through an explicit neighbour topology with optional per-link loss, and
//! delivers frames synchronously into the receivers' queues.
//!
//! # Example
//!
//! ```rust
//! use hopmesh_core::{LinkConfig, MacAddress};
//! use hopmesh_link::test_utils::SimulatedAir;
//! use hopmesh_link::LinkAdapter;
//!
//! let air = SimulatedAir::new();
//! let a = MacAddress::repeat(0xA1);
//! let b = MacAddress::repeat(0xB2);
//! air.link(a, b);
//!
//! let mut link = LinkAdapter::new(air.radio(a), LinkConfig::default());
//! assert_eq!(link.begin().unwrap(), a);
//! ```

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;

use hopmesh_core::{MacAddress, MeshError, Result};

use crate::driver::RadioDriver;
use crate::notify::LinkNotifier;

/// One buffer handed to a mock radio
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transmission {
    /// Destination address
    pub dest: MacAddress,
    /// Radio channel
    pub channel: u8,
    /// Raw frame bytes
    pub data: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockState {
    started: bool,
    notifier: Option<LinkNotifier>,
    transmissions: Vec<Transmission>,
    auto_complete: bool,
    reject_transmit: bool,
}

/// Scriptable radio driver
///
/// Clones share state, so a test can keep one handle while the adapter owns
/// another.
#[derive(Debug, Clone)]
pub struct MockRadio {
    address: MacAddress,
    state: Arc<Mutex<MockState>>,
}

impl MockRadio {
    /// Create a mock radio with the given own address
    pub fn new(address: MacAddress) -> Self {
        Self {
            address,
            state: Arc::new(Mutex::new(MockState::default())),
        }
    }

    /// Report every transmission as delivered as soon as it starts
    pub fn with_auto_complete(self, enabled: bool) -> Self {
        self.state.lock().auto_complete = enabled;
        self
    }

    /// Make `transmit` reject buffers outright
    pub fn set_reject_transmit(&self, reject: bool) {
        self.state.lock().reject_transmit = reject;
    }

    /// Simulate the completion interrupt for the last transmission
    pub fn complete(&self, delivered: bool) {
        let notifier = self.state.lock().notifier.clone();
        if let Some(notifier) = notifier {
            notifier.on_send_complete(delivered);
        }
    }

    /// Simulate a frame arriving from `src`
    pub fn deliver(&self, src: MacAddress, data: &[u8]) {
        let notifier = self.state.lock().notifier.clone();
        if let Some(notifier) = notifier {
            notifier.on_frame_received(src, data);
        }
    }

    /// Every transmission so far
    pub fn transmissions(&self) -> Vec<Transmission> {
        self.state.lock().transmissions.clone()
    }

    /// Every transmission so far, clearing the record
    pub fn take_transmissions(&self) -> Vec<Transmission> {
        std::mem::take(&mut self.state.lock().transmissions)
    }

    /// Whether `begin` was called without a later `stop`
    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }
}

impl RadioDriver for MockRadio {
    fn begin(&mut self, notifier: LinkNotifier) -> Result<MacAddress> {
        let mut state = self.state.lock();
        state.started = true;
        state.notifier = Some(notifier);
        Ok(self.address)
    }

    fn stop(&mut self) {
        let mut state = self.state.lock();
        state.started = false;
        state.notifier = None;
    }

    fn transmit(&mut self, dest: MacAddress, channel: u8, data: &[u8]) -> Result<()> {
        let notifier = {
            let mut state = self.state.lock();
            if state.reject_transmit {
                return Err(MeshError::Driver("Simulated rejection".to_string()));
            }
            state.transmissions.push(Transmission {
                dest,
                channel,
                data: data.to_vec(),
            });
            if state.auto_complete {
                state.notifier.clone()
            } else {
                None
            }
        };
        if let Some(notifier) = notifier {
            notifier.on_send_complete(true);
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "MockRadio"
    }
}

/// Counters kept by the simulated air
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AirStats {
    /// Transmissions put on the air
    pub transmissions: u64,
    /// Frames that reached a receiver
    pub deliveries: u64,
    /// Frames lost to link loss
    pub lost: u64,
}

#[derive(Debug, Default)]
struct AirState {
    radios: HashMap<MacAddress, Option<LinkNotifier>>,
    links: HashMap<(MacAddress, MacAddress), f64>,
    stats: AirStats,
}

fn link_key(a: MacAddress, b: MacAddress) -> (MacAddress, MacAddress) {
    if a <= b {
        (a, b)
    } else {
        (b, a)
    }
}

/// Shared medium connecting simulated radios
///
/// Links are bidirectional. A transmission reaches every started radio
/// linked to the sender whose address matches the destination, or all of
/// them for broadcast. Unicast is reported delivered only if the
/// destination actually received the frame.
#[derive(Debug, Clone, Default)]
pub struct SimulatedAir {
    state: Arc<Mutex<AirState>>,
}

impl SimulatedAir {
    /// Create an empty medium
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a radio attached to this medium
    pub fn radio(&self, address: MacAddress) -> SimRadio {
        self.state.lock().radios.entry(address).or_insert(None);
        SimRadio {
            address,
            state: Arc::clone(&self.state),
        }
    }

    /// Connect two radios with a lossless link
    pub fn link(&self, a: MacAddress, b: MacAddress) {
        self.link_with_loss(a, b, 0.0);
    }

    /// Connect two radios; each frame is lost with probability `loss_rate`
    pub fn link_with_loss(&self, a: MacAddress, b: MacAddress, loss_rate: f64) {
        self.state
            .lock()
            .links
            .insert(link_key(a, b), loss_rate.clamp(0.0, 1.0));
    }

    /// Disconnect two radios
    pub fn unlink(&self, a: MacAddress, b: MacAddress) {
        self.state.lock().links.remove(&link_key(a, b));
    }

    /// Whether two radios can hear each other
    pub fn are_linked(&self, a: MacAddress, b: MacAddress) -> bool {
        self.state.lock().links.contains_key(&link_key(a, b))
    }

    /// Counter snapshot
    pub fn stats(&self) -> AirStats {
        self.state.lock().stats
    }
}

/// Radio driver attached to a [`SimulatedAir`]
#[derive(Debug, Clone)]
pub struct SimRadio {
    address: MacAddress,
    state: Arc<Mutex<AirState>>,
}

impl RadioDriver for SimRadio {
    fn begin(&mut self, notifier: LinkNotifier) -> Result<MacAddress> {
        self.state.lock().radios.insert(self.address, Some(notifier));
        Ok(self.address)
    }

    fn stop(&mut self) {
        self.state.lock().radios.insert(self.address, None);
    }

    fn transmit(&mut self, dest: MacAddress, _channel: u8, data: &[u8]) -> Result<()> {
        let mut receivers = Vec::new();
        let sender = {
            let mut state = self.state.lock();
            let sender = state
                .radios
                .get(&self.address)
                .cloned()
                .flatten()
                .ok_or_else(|| MeshError::Driver(format!("{} is not started", self.address)))?;

            let mut rng = rand::thread_rng();
            let mut lost = 0;
            for (&(a, b), &loss_rate) in &state.links {
                let neighbour = match (a == self.address, b == self.address) {
                    (true, false) => b,
                    (false, true) => a,
                    _ => continue,
                };
                if !dest.is_broadcast() && dest != neighbour {
                    continue;
                }
                let Some(Some(notifier)) = state.radios.get(&neighbour) else {
                    continue;
                };
                if loss_rate > 0.0 && rng.gen_bool(loss_rate) {
                    lost += 1;
                    continue;
                }
                receivers.push((neighbour, notifier.clone()));
            }

            state.stats.transmissions += 1;
            state.stats.deliveries += receivers.len() as u64;
            state.stats.lost += lost;
            sender
        };

        for (neighbour, notifier) in &receivers {
            trace!(from = %self.address, to = %neighbour, len = data.len(), "Air delivery");
            notifier.on_frame_received(self.address, data);
        }

        let delivered = dest.is_broadcast() || !receivers.is_empty();
        sender.on_send_complete(delivered);
        Ok(())
    }

    fn name(&self) -> &str {
        "SimRadio"
    }
}
