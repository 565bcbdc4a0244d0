//! Event kinds, payloads and the callback table.
//!
//! Producers in the worker and the transport upcalls never invoke callbacks;
//! they only queue records on the link. [`Controller::tick`](crate::controller::Controller::tick)
//! drains those queues on the application thread and calls
//! [`EventDispatcher::trigger`] there, so callbacks may freely touch UI or
//! application state.
//!
//! There is one optional callback slot per [`EventKind`]. With the `std`
//! feature a callback is any `FnMut(&Event) + Send` closure; without it, a plain
//! `fn(&Event)`.

#[cfg(any(test, feature = "std"))]
use std::boxed::Box;

use crate::address::MacAddress;
use crate::frame::Frame;

/// Everything the link layer reports to the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum EventKind {
    /// A data frame arrived from a registered peer.
    ReceivedData,
    /// A frame left the radio, successfully or not.
    Sent,
    /// A peer went from disconnected to connected.
    PeerConnected,
    /// A connected peer timed out.
    PeerDisconnected,
    /// A peer was registered.
    PeerAdded,
    /// A peer was removed.
    PeerRemoved,
    /// The radio confirmed delivery.
    SendSuccess,
    /// The radio reported a failed delivery.
    SendFailed,
    /// A liveness reply (ack) arrived.
    HeartbeatReceived,
    /// A peer missed its heartbeat window.
    HeartbeatTimeout,
}

impl EventKind {
    /// Number of event kinds.
    pub const COUNT: usize = 10;

    /// Every kind, in slot order.
    pub const ALL: [EventKind; Self::COUNT] = [
        EventKind::ReceivedData,
        EventKind::Sent,
        EventKind::PeerConnected,
        EventKind::PeerDisconnected,
        EventKind::PeerAdded,
        EventKind::PeerRemoved,
        EventKind::SendSuccess,
        EventKind::SendFailed,
        EventKind::HeartbeatReceived,
        EventKind::HeartbeatTimeout,
    ];

    const fn slot(self) -> usize {
        self as usize
    }
}

/// One event as seen by a callback.
#[derive(Debug, Clone, Copy)]
pub struct Event<'a> {
    /// What happened.
    pub kind: EventKind,
    /// The peer concerned; [`MacAddress::BROADCAST`] for broadcast sends.
    pub address: MacAddress,
    /// The decoded frame, for [`EventKind::ReceivedData`] only.
    pub frame: Option<&'a Frame>,
    /// Delivery result, meaningful for send events only.
    pub success: bool,
}

impl<'a> Event<'a> {
    /// An event with no frame and `success == false`.
    pub fn new(kind: EventKind, address: MacAddress) -> Self {
        Self {
            kind,
            address,
            frame: None,
            success: false,
        }
    }

    /// A [`EventKind::ReceivedData`] event carrying `frame`.
    pub fn received(address: MacAddress, frame: &'a Frame) -> Self {
        Self {
            kind: EventKind::ReceivedData,
            address,
            frame: Some(frame),
            success: false,
        }
    }

    /// A send event (`Sent`, `SendSuccess` or `SendFailed`).
    pub fn send_outcome(kind: EventKind, address: MacAddress, success: bool) -> Self {
        Self {
            kind,
            address,
            frame: None,
            success,
        }
    }
}

/// Callback invoked for one event kind.
#[cfg(any(test, feature = "std"))]
pub type EventCallback = Box<dyn FnMut(&Event<'_>) + Send>;

/// Callback invoked for one event kind.
#[cfg(not(any(test, feature = "std")))]
pub type EventCallback = fn(&Event<'_>);

/// Fixed table holding at most one callback per [`EventKind`].
pub struct EventDispatcher {
    slots: [Option<EventCallback>; EventKind::COUNT],
}

impl core::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut list = f.debug_list();
        for kind in EventKind::ALL {
            if self.is_registered(kind) {
                let _ = list.entry(&kind);
            }
        }
        list.finish()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl EventDispatcher {
    /// Creates a table with every slot empty.
    pub const fn new() -> Self {
        Self {
            slots: [const { None }; EventKind::COUNT],
        }
    }

    /// Installs `callback` for `kind`, replacing any previous one.
    pub fn on(&mut self, kind: EventKind, callback: EventCallback) {
        self.slots[kind.slot()] = Some(callback);
    }

    /// Clears the slot for `kind`.
    pub fn off(&mut self, kind: EventKind) {
        self.slots[kind.slot()] = None;
    }

    /// Whether a callback is installed for `kind`.
    pub fn is_registered(&self, kind: EventKind) -> bool {
        self.slots[kind.slot()].is_some()
    }

    /// Invokes the callback for `event.kind` on the calling thread, if any.
    pub fn trigger(&mut self, event: &Event<'_>) {
        if let Some(callback) = self.slots[event.kind.slot()].as_mut() {
            callback(event);
        }
    }
}
