//! Radio driver boundary
//!
//! The physical radio (peer registration, channel selection, the actual
//! transmission, interrupt delivery) lives behind [`RadioDriver`]. A driver
//! reports asynchronous events through the [`LinkNotifier`] it is handed in
//! [`RadioDriver::begin`]; those calls may come from an interrupt or another
//! thread at any time.

use hopmesh_core::{MacAddress, Result};

use crate::notify::LinkNotifier;

/// Trait for physical radio drivers
///
/// Implementations must return from every method without waiting on the
/// air: completion of a transmission is reported later through
/// [`LinkNotifier::on_send_complete`].
pub trait RadioDriver: Send {
    /// Bring the radio up and register the notification sink
    ///
    /// Returns the radio's own link-layer address.
    fn begin(&mut self, notifier: LinkNotifier) -> Result<MacAddress>;

    /// Unregister notifications and shut the radio down
    fn stop(&mut self);

    /// Hand one buffer to the physical layer
    ///
    /// `Ok` means the radio accepted the buffer and will report completion
    /// exactly once; `Err` means it was rejected outright.
    fn transmit(&mut self, dest: MacAddress, channel: u8, data: &[u8]) -> Result<()>;

    /// Get the driver name (for logging)
    fn name(&self) -> &str;
}

impl<D: RadioDriver + ?Sized> RadioDriver for Box<D> {
    fn begin(&mut self, notifier: LinkNotifier) -> Result<MacAddress> {
        (**self).begin(notifier)
    }

    fn stop(&mut self) {
        (**self).stop()
    }

    fn transmit(&mut self, dest: MacAddress, channel: u8, data: &[u8]) -> Result<()> {
        (**self).transmit(dest, channel, data)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
