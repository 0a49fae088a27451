//! Configuration types for hopmesh nodes
//!
//! All tunables are numeric and passed at construction. Durations are
//! serialized as human-readable strings ("100ms", "2s").

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{MeshError, Result};

/// Default forwarding budget stamped on new frames
pub const DEFAULT_HOP_BUDGET: u8 = 3;

/// Largest forwarding budget a node will stamp
pub const MAX_HOP_BUDGET: u8 = 7;

/// Default minimum spacing between physical sends
pub const DEFAULT_SEND_INTERVAL_MS: u64 = 100;

/// Default link-layer tries per frame
pub const DEFAULT_MAX_SEND_TRIES: u8 = 2;

/// Default end-to-end confirmation window
pub const DEFAULT_CONFIRMATION_TIMEOUT_MS: u64 = 1000;

/// Main configuration for a mesh node or router
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MeshConfig {
    /// Transport adapter settings
    #[serde(default)]
    pub link: LinkConfig,

    /// Message lifecycle settings
    #[serde(default)]
    pub node: NodeConfig,

    /// Routing settings (ignored by plain nodes)
    #[serde(default)]
    pub router: RouterConfig,
}

impl MeshConfig {
    /// Parse a configuration from JSON
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: MeshConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Reject settings the protocol cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.link.max_send_tries == 0 {
            return Err(MeshError::InvalidConfig(
                "link.max_send_tries must be at least 1".to_string(),
            ));
        }
        if self.link.receive_queue_capacity == 0 {
            return Err(MeshError::InvalidConfig(
                "link.receive_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.node.seen_capacity == 0 {
            return Err(MeshError::InvalidConfig(
                "node.seen_capacity must be at least 1".to_string(),
            ));
        }
        if self.node.outgoing_queue_capacity == 0 {
            return Err(MeshError::InvalidConfig(
                "node.outgoing_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.node.initial_hop_budget == 0 || self.node.initial_hop_budget > MAX_HOP_BUDGET {
            return Err(MeshError::InvalidConfig(format!(
                "node.initial_hop_budget must be in 1..={}",
                MAX_HOP_BUDGET
            )));
        }
        if self.router.routing_capacity == 0 {
            return Err(MeshError::InvalidConfig(
                "router.routing_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Transport adapter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkConfig {
    /// Minimum interval between consecutive physical sends, retries included
    #[serde(with = "humantime_serde", default = "default_send_interval")]
    pub send_interval: Duration,

    /// Frames buffered between the receive notification and the poll loop
    #[serde(default = "default_receive_queue_capacity")]
    pub receive_queue_capacity: usize,

    /// Link-layer tries per frame (first attempt included)
    #[serde(default = "default_max_send_tries")]
    pub max_send_tries: u8,
}

fn default_send_interval() -> Duration {
    Duration::from_millis(DEFAULT_SEND_INTERVAL_MS)
}

fn default_receive_queue_capacity() -> usize {
    16
}

fn default_max_send_tries() -> u8 {
    DEFAULT_MAX_SEND_TRIES
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            send_interval: default_send_interval(),
            receive_queue_capacity: default_receive_queue_capacity(),
            max_send_tries: DEFAULT_MAX_SEND_TRIES,
        }
    }
}

/// Node message-lifecycle configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Network identifier stamped on outgoing frames
    #[serde(default)]
    pub network_id: [u8; 2],

    /// Radio channel used for transmissions
    #[serde(default)]
    pub channel: u8,

    /// Forwarding budget of frames originated here
    #[serde(default = "default_hop_budget")]
    pub initial_hop_budget: u8,

    /// Number of seen-message records kept for deduplication
    #[serde(default = "default_seen_capacity")]
    pub seen_capacity: usize,

    /// Lifetime of a seen-message record
    #[serde(with = "humantime_serde", default = "default_seen_ttl")]
    pub seen_ttl: Duration,

    /// How often seen-message records are aged
    #[serde(with = "humantime_serde", default = "default_seen_sweep_interval")]
    pub seen_sweep_interval: Duration,

    /// How long a confirmed message waits for its acknowledgement
    #[serde(with = "humantime_serde", default = "default_confirmation_timeout")]
    pub confirmation_timeout: Duration,

    /// Bound on the outgoing message queue
    #[serde(default = "default_outgoing_queue_capacity")]
    pub outgoing_queue_capacity: usize,

    /// First sequence id; random when unset
    #[serde(default)]
    pub initial_sequence_id: Option<u8>,
}

fn default_hop_budget() -> u8 {
    DEFAULT_HOP_BUDGET
}

fn default_seen_capacity() -> usize {
    10
}

fn default_seen_ttl() -> Duration {
    Duration::from_millis(2000)
}

fn default_seen_sweep_interval() -> Duration {
    Duration::from_millis(1000)
}

fn default_confirmation_timeout() -> Duration {
    Duration::from_millis(DEFAULT_CONFIRMATION_TIMEOUT_MS)
}

fn default_outgoing_queue_capacity() -> usize {
    32
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            network_id: [0, 0],
            channel: 0,
            initial_hop_budget: DEFAULT_HOP_BUDGET,
            seen_capacity: default_seen_capacity(),
            seen_ttl: default_seen_ttl(),
            seen_sweep_interval: default_seen_sweep_interval(),
            confirmation_timeout: default_confirmation_timeout(),
            outgoing_queue_capacity: default_outgoing_queue_capacity(),
            initial_sequence_id: None,
        }
    }
}

/// Router configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouterConfig {
    /// Lifetime of a learned route unless refreshed
    #[serde(with = "humantime_serde", default = "default_routing_ttl")]
    pub routing_ttl: Duration,

    /// How often routes are aged
    #[serde(with = "humantime_serde", default = "default_routing_sweep_interval")]
    pub routing_sweep_interval: Duration,

    /// Maximum number of routes kept
    #[serde(default = "default_routing_capacity")]
    pub routing_capacity: usize,
}

fn default_routing_ttl() -> Duration {
    Duration::from_millis(10_000)
}

fn default_routing_sweep_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_routing_capacity() -> usize {
    10
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            routing_ttl: default_routing_ttl(),
            routing_sweep_interval: default_routing_sweep_interval(),
            routing_capacity: default_routing_capacity(),
        }
    }
}

/// Builder for MeshConfig
#[derive(Debug, Default)]
pub struct MeshConfigBuilder {
    config: MeshConfig,
}

impl MeshConfigBuilder {
    /// Create a new builder with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pacing interval between physical sends
    pub fn send_interval(mut self, interval: Duration) -> Self {
        self.config.link.send_interval = interval;
        self
    }

    /// Set the link-layer tries per frame
    pub fn max_send_tries(mut self, tries: u8) -> Self {
        self.config.link.max_send_tries = tries.max(1);
        self
    }

    /// Set the receive queue depth
    pub fn receive_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.link.receive_queue_capacity = capacity;
        self
    }

    /// Set the forwarding budget of originated frames
    pub fn hop_budget(mut self, hops: u8) -> Self {
        self.config.node.initial_hop_budget = hops.clamp(1, MAX_HOP_BUDGET);
        self
    }

    /// Set seen-message capacity and lifetime
    pub fn seen(mut self, capacity: usize, ttl: Duration) -> Self {
        self.config.node.seen_capacity = capacity;
        self.config.node.seen_ttl = ttl;
        self
    }

    /// Set the seen-message sweep interval
    pub fn seen_sweep_interval(mut self, interval: Duration) -> Self {
        self.config.node.seen_sweep_interval = interval;
        self
    }

    /// Set the confirmation window
    pub fn confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.config.node.confirmation_timeout = timeout;
        self
    }

    /// Set the outgoing queue bound
    pub fn outgoing_queue_capacity(mut self, capacity: usize) -> Self {
        self.config.node.outgoing_queue_capacity = capacity;
        self
    }

    /// Pin the first sequence id
    pub fn initial_sequence_id(mut self, id: u8) -> Self {
        self.config.node.initial_sequence_id = Some(id);
        self
    }

    /// Set the radio channel
    pub fn channel(mut self, channel: u8) -> Self {
        self.config.node.channel = channel;
        self
    }

    /// Set route lifetime and capacity
    pub fn routing(mut self, ttl: Duration, capacity: usize) -> Self {
        self.config.router.routing_ttl = ttl;
        self.config.router.routing_capacity = capacity;
        self
    }

    /// Build the configuration
    pub fn build(self) -> MeshConfig {
        self.config
    }
}

// Custom serde module for Duration with humantime
mod humantime_serde {
    use serde::{self, Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let s = humantime::format_duration(*duration).to_string();
        serializer.serialize_str(&s)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        humantime::parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
