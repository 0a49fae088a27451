//! Hopmesh node and router
//!
//! A [`MeshNode`] exchanges small messages with other nodes over a
//! [`LinkAdapter`](hopmesh_link::LinkAdapter), with optional end-to-end
//! confirmation. Every node suppresses duplicates through a seen-frame
//! table. What happens to frames addressed to other nodes is decided by
//! its [`ForeignFramePolicy`]:
//!
//! - [`Device`] discards them,
//! - [`Router`] relays them with a decremented hop budget and learns routes
//!   from the traffic it hears.
//!
//! # Example
//!
//! ```rust
//! use hopmesh_core::{MacAddress, MeshConfig};
//! use hopmesh_link::test_utils::SimulatedAir;
//! use hopmesh_node::MeshNode;
//!
//! let air = SimulatedAir::new();
//! let (a, b) = (MacAddress::repeat(0xAA), MacAddress::repeat(0xBB));
//! air.link(a, b);
//!
//! let config = MeshConfig::default();
//! let mut node_a = MeshNode::device(air.radio(a), &config);
//! let mut node_b = MeshNode::device(air.radio(b), &config);
//! node_a.begin().unwrap();
//! node_b.begin().unwrap();
//!
//! node_b.set_on_message(|message| println!("{} says {:?}", message.source, &message.payload[..]));
//! node_a.send(&b"hello"[..], b).unwrap();
//!
//! for now in 0..10 {
//!     node_a.poll(now);
//!     node_b.poll(now);
//! }
//! assert_eq!(node_b.stats().messages_delivered, 1);
//! ```

#![warn(missing_docs)]

pub mod confirm;
pub mod event;
pub mod node;
pub mod policy;
pub mod queue;
pub mod routing;
pub mod seen;
pub mod stats;

pub use confirm::{PendingConfirmation, PendingConfirmations};
pub use event::{
    FailureReason, MessageCallback, MessageStatus, ReceivedMessage, StatusCallback, StatusEvent,
};
pub use node::{Device, MeshNode, Router};
pub use policy::{Discard, ForeignFramePolicy, Forwarding, PolicyContext};
pub use queue::{OutgoingEntry, OutgoingQueue};
pub use routing::{RouteUpdate, RoutingEntry, RoutingTable};
pub use seen::{SeenKey, SeenTable};
pub use stats::NodeStats;
