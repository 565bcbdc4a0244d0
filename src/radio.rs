//! Transport adapter: the only piece that touches the physical radio.
//!
//! Implement [`Radio`] over the platform's raw send/receive primitives (an
//! ESP-NOW style connectionless transport, a simulator, a loopback...). The
//! implementation must also forward the radio's two upcalls to the shared
//! [`Link`](crate::link::Link):
//!
//! - every received frame to [`Link::on_frame_received`](crate::link::Link::on_frame_received)
//! - every send completion to [`Link::on_send_complete`](crate::link::Link::on_send_complete)
//!
//! Both upcalls are safe to invoke from an interrupt or radio-driver callback:
//! they never block and never allocate.
//!
//! Methods take `&self` because the adapter is shared between the worker (sends)
//! and the application thread (peer registration); implementations use interior
//! mutability where the underlying driver needs it.

use crate::address::MacAddress;

/// Raw primitives of a connectionless, broadcast-capable radio.
pub trait Radio {
    /// Driver-specific error. Only its presence is reported upward.
    type Error;

    /// Brings the radio up on `channel`.
    fn start(&self, channel: u8) -> Result<(), Self::Error>;

    /// Shuts the radio down. Called once by `Controller::end`.
    fn stop(&self);

    /// Queues `bytes` for `destination`. Completion is reported through the
    /// send-complete upcall.
    fn send_raw(&self, destination: &MacAddress, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Queues `bytes` for every node on the channel.
    fn broadcast_raw(&self, bytes: &[u8]) -> Result<(), Self::Error>;

    /// Makes `address` addressable. Transports without explicit peer setup
    /// return `Ok(())`.
    fn register_peer(&self, address: &MacAddress, encrypt: bool) -> Result<(), Self::Error>;

    /// Forgets `address`.
    fn deregister_peer(&self, address: &MacAddress) -> Result<(), Self::Error>;

    /// This node's own hardware address.
    fn own_address(&self) -> MacAddress;
}
