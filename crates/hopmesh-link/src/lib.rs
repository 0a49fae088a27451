//! Hopmesh transport adapter
//!
//! Wraps a connectionless radio behind a single-outstanding-send state
//! machine. The node offers one buffer at a time with
//! [`LinkAdapter::try_send`] and drives everything else from its poll loop
//! through [`LinkAdapter::tick`], which reports send progress and hands up
//! received frames one per tick.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  try_send / tick   ┌──────────────┐  transmit   ┌─────────────┐
//! │  Mesh node   │ ─────────────────► │ LinkAdapter  │ ──────────► │ RadioDriver │
//! │              │ ◄───────────────── │              │             │             │
//! └──────────────┘     LinkEvent      └──────▲───────┘             └──────┬──────┘
//!                                            │  atomic slot + queue       │
//!                                            └──────── LinkNotifier ◄─────┘
//! ```
//!
//! Radio notifications may arrive at any time from an interrupt or another
//! thread; [`LinkNotifier`] never blocks and drops what it cannot hold.
//!
//! # Example
//!
//! ```rust
//! use bytes::Bytes;
//! use hopmesh_core::{LinkConfig, MacAddress};
//! use hopmesh_link::test_utils::MockRadio;
//! use hopmesh_link::{LinkAdapter, LinkEvent, SendStatus, TryTransmit};
//!
//! let radio = MockRadio::new(MacAddress::repeat(0xAA)).with_auto_complete(true);
//! let mut link = LinkAdapter::new(radio, LinkConfig::default());
//! link.begin().unwrap();
//!
//! let peer = MacAddress::repeat(0xBB);
//! let accepted = link.try_send(peer, Bytes::from_static(&[0u8; 18]), 2, 0).unwrap();
//! assert_eq!(accepted, TryTransmit::Accepted);
//!
//! link.tick(0);
//! let events = link.tick(1);
//! assert_eq!(events, vec![LinkEvent::SendComplete(SendStatus::Success)]);
//! ```

#![warn(missing_docs)]

pub mod adapter;
pub mod driver;
pub mod notify;
pub mod test_utils;

pub use adapter::{LinkAdapter, LinkEvent, LinkState, LinkStats, SendStatus, TryTransmit};
pub use driver::RadioDriver;
pub use notify::{LinkNotifier, NotifierStats, ReceivedFrame};
pub use test_utils::{MockRadio, SimRadio, SimulatedAir};
