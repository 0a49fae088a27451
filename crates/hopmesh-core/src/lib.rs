//! Hopmesh core types
//!
//! Shared vocabulary of the hopmesh radio mesh: link-layer addresses, the
//! packed wire frame, configuration and the error taxonomy.
//!
//! Hopmesh runs over a connectionless, small-payload radio (250-byte
//! frames, MAC addressing, no delivery guarantee). Nodes exchange small
//! messages with optional end-to-end confirmation; routers relay frames
//! that are not addressed to them until their hop budget runs out.
//!
//! # Modules
//!
//! - [`address`] - 6-byte link-layer addresses and the broadcast address
//! - [`frame`] - Frame layout, payload bound and codec
//! - [`config`] - Node, link and router tunables
//! - [`error`] - Error types
//!
//! # Example
//!
//! ```rust
//! use hopmesh_core::{Frame, FrameKind, MacAddress, Payload};
//!
//! let frame = Frame {
//!     network_id: [0, 0],
//!     kind: FrameKind::Data,
//!     id: 1,
//!     hop_count: 3,
//!     src: MacAddress::repeat(0xAA),
//!     dest: MacAddress::repeat(0xBB),
//!     payload: Payload::copy_from_slice(b"hi").unwrap(),
//! };
//!
//! let bytes = frame.encode();
//! assert_eq!(bytes.len(), 20);
//! assert_eq!(Frame::decode(&bytes).unwrap(), frame);
//! ```

#![warn(missing_docs)]

pub mod address;
pub mod config;
pub mod error;
pub mod frame;

pub use address::{MacAddress, ADDRESS_LEN};
pub use config::{
    LinkConfig, MeshConfig, MeshConfigBuilder, NodeConfig, RouterConfig, DEFAULT_HOP_BUDGET,
    DEFAULT_MAX_SEND_TRIES, MAX_HOP_BUDGET,
};
pub use error::{MeshError, Result};
pub use frame::{
    DeliveryRole, Frame, FrameKind, Payload, FRAME_HEADER_LEN, MAX_FRAME_LEN, MAX_PAYLOAD_LEN,
};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
