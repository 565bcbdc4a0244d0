//! State shared by the capture context, the worker and the application thread.
//!
//! A [`Link`] owns the transport adapter, the peer registry and the four
//! bounded queues of the pipeline:
//!
//! ```text
//!  radio upcall ──► inbound ──► Worker ──► results ──► Controller::tick ──► callbacks
//!  Controller   ──► outbound ─► Worker ──► Radio::send_raw / broadcast_raw
//!  radio upcall ──────────────────────────► outcomes ─► Controller::tick ──► callbacks
//! ```
//!
//! Every method takes `&self`; a `Link` is meant to live in a `static` (or be
//! borrowed by a scoped thread) so the radio driver, the [`Worker`](crate::worker::Worker)
//! and the [`Controller`](crate::controller::Controller) can all reach it.
//!
//! The registry sits in a `critical_section::Mutex<RefCell<_>>`. Each access is
//! one short critical section; if the cell is already borrowed (re-entry from an
//! interrupt that fired inside another access) the call fails fast with
//! [`LinkError::Contended`] instead of waiting.

use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use critical_section::Mutex;
use heapless::Vec;

use crate::address::MacAddress;
use crate::consts::{
    INBOUND_QUEUE_DEPTH, MAX_FRAME_LEN, MAX_PEERS, OUTBOUND_QUEUE_DEPTH, OUTCOME_QUEUE_DEPTH,
    RESULT_QUEUE_DEPTH,
};
use crate::error::LinkError;
use crate::frame::Frame;
use crate::queue::BoundedQueue;
use crate::radio::Radio;
use crate::registry::{Peer, PeerRegistry};

/// Bytes copied out of the radio's receive upcall.
#[derive(Debug, Clone)]
pub(crate) struct RawFrame {
    pub(crate) address: MacAddress,
    pub(crate) bytes: Vec<u8, MAX_FRAME_LEN>,
    pub(crate) timestamp: u64,
}

/// An encoded frame waiting for the worker to hand it to the radio.
#[derive(Debug, Clone)]
pub(crate) struct Outgoing {
    /// `None` broadcasts.
    pub(crate) destination: Option<MacAddress>,
    pub(crate) bytes: Vec<u8, MAX_FRAME_LEN>,
}

/// What the worker hands to the application thread.
#[derive(Debug, Clone)]
pub(crate) enum Inbound {
    /// The peer just became connected.
    Connected(MacAddress),
    /// A liveness reply arrived from the peer.
    Ack(MacAddress),
    /// A decoded application or pairing frame.
    Data { address: MacAddress, frame: Frame },
}

/// A send completion, reported by the radio or by a synchronous send error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SendOutcome {
    pub(crate) address: MacAddress,
    pub(crate) success: bool,
}

/// Point-in-time counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct LinkStats {
    /// Whether the link is started.
    pub running: bool,
    /// Registered peers.
    pub peers: usize,
    /// Registered peers currently connected.
    pub connected: usize,
    /// Frames captured but not yet decoded.
    pub inbound_depth: usize,
    /// Frames waiting for the radio.
    pub outbound_depth: usize,
    /// Decoded results waiting for `tick`.
    pub result_depth: usize,
    /// Send completions waiting for `tick`.
    pub outcome_depth: usize,
    /// Captured frames dropped because the inbound queue was full.
    pub inbound_dropped: u32,
    /// Sends rejected because the outbound queue was full.
    pub outbound_dropped: u32,
    /// Results dropped because the application was not draining.
    pub result_dropped: u32,
    /// Send completions dropped because the outcome queue was full.
    pub outcome_dropped: u32,
    /// Well-formed frames ignored because the sender is not registered.
    pub unknown_senders: u32,
    /// Frames that failed to decode.
    pub malformed: u32,
    /// Sum of per-peer `packets_sent`.
    pub packets_sent: u32,
    /// Sum of per-peer `packets_received`.
    pub packets_received: u32,
    /// Sum of per-peer `packets_lost`.
    pub packets_lost: u32,
}

/// Shared core of the link layer.
pub struct Link<R> {
    radio: R,
    registry: Mutex<RefCell<PeerRegistry>>,
    pub(crate) inbound: BoundedQueue<RawFrame, INBOUND_QUEUE_DEPTH>,
    pub(crate) outbound: BoundedQueue<Outgoing, OUTBOUND_QUEUE_DEPTH>,
    pub(crate) results: BoundedQueue<Inbound, RESULT_QUEUE_DEPTH>,
    pub(crate) outcomes: BoundedQueue<SendOutcome, OUTCOME_QUEUE_DEPTH>,
    running: AtomicBool,
    ack_heartbeats: AtomicBool,
    unknown_senders: AtomicU32,
    malformed: AtomicU32,
}

impl<R> core::fmt::Debug for Link<R> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Link")
            .field("running", &self.running.load(Ordering::Relaxed))
            .field("inbound", &self.inbound)
            .field("outbound", &self.outbound)
            .field("results", &self.results)
            .field("outcomes", &self.outcomes)
            .finish_non_exhaustive()
    }
}

impl<R> Link<R> {
    /// Wraps `radio`. The link starts stopped with an empty registry.
    pub const fn new(radio: R) -> Self {
        Self {
            radio,
            registry: Mutex::new(RefCell::new(PeerRegistry::new())),
            inbound: BoundedQueue::new(),
            outbound: BoundedQueue::new(),
            results: BoundedQueue::new(),
            outcomes: BoundedQueue::new(),
            running: AtomicBool::new(false),
            ack_heartbeats: AtomicBool::new(true),
            unknown_senders: AtomicU32::new(0),
            malformed: AtomicU32::new(0),
        }
    }

    /// The transport adapter.
    pub fn radio(&self) -> &R {
        &self.radio
    }

    /// Whether the link has been started and not yet ended.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub(crate) fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }

    pub(crate) fn acks_heartbeats(&self) -> bool {
        self.ack_heartbeats.load(Ordering::Relaxed)
    }

    pub(crate) fn set_ack_heartbeats(&self, enabled: bool) {
        self.ack_heartbeats.store(enabled, Ordering::Relaxed);
    }

    pub(crate) fn note_unknown_sender(&self) {
        let _ = self.unknown_senders.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn note_malformed(&self) {
        let _ = self.malformed.fetch_add(1, Ordering::Relaxed);
    }

    /// Empties every queue. Returns the number of discarded items.
    pub(crate) fn discard_queues(&self) -> usize {
        self.inbound.clear() + self.outbound.clear() + self.results.clear() + self.outcomes.clear()
    }

    /// Runs `f` on the registry inside a critical section.
    ///
    /// Fails with [`LinkError::Contended`] if the registry is already borrowed.
    pub(crate) fn with_registry<T>(
        &self,
        f: impl FnOnce(&mut PeerRegistry) -> T,
    ) -> Result<T, LinkError> {
        critical_section::with(|cs| {
            let cell = self.registry.borrow(cs);
            match cell.try_borrow_mut() {
                Ok(mut registry) => Ok(f(&mut registry)),
                Err(_) => Err(LinkError::Contended),
            }
        })
    }

    /// Receive upcall. Safe to call from an interrupt.
    ///
    /// Copies `bytes` into the inbound queue and returns whether it was
    /// accepted. Frames longer than a frame can be, frames arriving while the
    /// link is stopped and frames arriving while the queue is full are dropped.
    pub fn on_frame_received(&self, address: MacAddress, bytes: &[u8], timestamp: u64) -> bool {
        if !self.is_running() {
            return false;
        }
        let Ok(bytes) = Vec::from_slice(bytes) else {
            self.note_malformed();
            return false;
        };
        self.inbound
            .try_push(RawFrame {
                address,
                bytes,
                timestamp,
            })
            .is_ok()
    }

    /// Send-complete upcall. Safe to call from an interrupt.
    ///
    /// A failure counts against the peer's `packets_lost`. The outcome is
    /// queued for [`Controller::tick`](crate::controller::Controller::tick).
    pub fn on_send_complete(&self, address: MacAddress, success: bool) {
        if !self.is_running() {
            return;
        }
        if !success {
            let _ = self.with_registry(|r| r.record_lost(&address));
        }
        let _ = self.outcomes.try_push(SendOutcome { address, success });
    }

    /// Whether `address` is registered. `false` while the registry is busy.
    pub fn has_peer(&self, address: &MacAddress) -> bool {
        self.with_registry(|r| r.contains(address)).unwrap_or(false)
    }

    /// Snapshot of one peer.
    pub fn peer(&self, address: &MacAddress) -> Option<Peer> {
        self.with_registry(|r| r.get(address)).ok().flatten()
    }

    /// Whether `address` is registered and connected.
    pub fn is_connected(&self, address: &MacAddress) -> bool {
        self.peer(address).is_some_and(|p| p.connected)
    }

    /// Whether any registered peer is connected.
    pub fn is_any_connected(&self) -> bool {
        self.with_registry(|r| r.any_connected()).unwrap_or(false)
    }

    /// Snapshots of every registered peer. Empty while the registry is busy.
    pub fn peers(&self) -> Vec<Peer, MAX_PEERS> {
        self.with_registry(|r| r.snapshot()).unwrap_or_default()
    }

    /// Number of registered peers. `0` while the registry is busy.
    pub fn peer_count(&self) -> usize {
        self.with_registry(|r| r.len()).unwrap_or(0)
    }

    /// Queues `frame` for `destination`; `None` or the broadcast address
    /// broadcasts.
    ///
    /// Never blocks. The frame is copied, so the caller may reuse it at once.
    pub fn send(&self, destination: Option<&MacAddress>, frame: &Frame) -> Result<(), LinkError> {
        if !self.is_running() {
            return Err(LinkError::NotRunning);
        }
        let bytes = frame.as_bytes().ok_or(LinkError::InvalidFrame)?;
        let outgoing = Outgoing {
            destination: destination.copied().filter(|a| !a.is_broadcast()),
            bytes: Vec::from_slice(bytes).map_err(|_| LinkError::InvalidFrame)?,
        };
        self.outbound.try_push(outgoing).map_err(|_| {
            warn!("outbound queue full, frame dropped");
            LinkError::QueueFull
        })
    }

    /// Queues `frame` for every node on the channel.
    pub fn broadcast(&self, frame: &Frame) -> Result<(), LinkError> {
        self.send(None, frame)
    }

    /// Current counters.
    pub fn stats(&self) -> LinkStats {
        let (peers, connected, (packets_sent, packets_received, packets_lost)) = self
            .with_registry(|r| {
                (
                    r.len(),
                    r.iter().filter(|p| p.connected).count(),
                    r.totals(),
                )
            })
            .unwrap_or_default();
        LinkStats {
            running: self.is_running(),
            peers,
            connected,
            inbound_depth: self.inbound.len(),
            outbound_depth: self.outbound.len(),
            result_depth: self.results.len(),
            outcome_depth: self.outcomes.len(),
            inbound_dropped: self.inbound.dropped(),
            outbound_dropped: self.outbound.dropped(),
            result_dropped: self.results.dropped(),
            outcome_dropped: self.outcomes.dropped(),
            unknown_senders: self.unknown_senders.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            packets_sent,
            packets_received,
            packets_lost,
        }
    }
}

impl<R: Radio> Link<R> {
    /// This node's hardware address.
    pub fn own_address(&self) -> MacAddress {
        self.radio.own_address()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::MainCommand;
    use crate::radio::mock::MockRadio;

    fn addr(n: u8) -> MacAddress {
        MacAddress::new([0x24, 0x6f, 0x28, 0x00, 0x00, n])
    }

    fn started() -> Link<MockRadio> {
        let link = Link::new(MockRadio::new(addr(0)));
        link.set_running(true);
        link
    }

    #[test]
    fn test_send_requires_running() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut frame = Frame::new();
        let _ = frame.begin(MainCommand::DataRequest);
        assert_eq!(link.send(Some(&addr(1)), &frame), Err(LinkError::NotRunning));
    }

    #[test]
    fn test_send_rejects_unstarted_frame() {
        let link = started();
        assert_eq!(link.broadcast(&Frame::new()), Err(LinkError::InvalidFrame));
        assert!(link.outbound.is_empty());
    }

    #[test]
    fn test_send_backpressure() {
        let link = started();
        let mut frame = Frame::new();
        let _ = frame.begin(MainCommand::DataRequest).add_u8(1, 7);
        for _ in 0..OUTBOUND_QUEUE_DEPTH {
            link.send(Some(&addr(1)), &frame).unwrap();
        }
        assert_eq!(link.send(Some(&addr(1)), &frame), Err(LinkError::QueueFull));
        let stats = link.stats();
        assert_eq!(stats.outbound_depth, OUTBOUND_QUEUE_DEPTH);
        assert_eq!(stats.outbound_dropped, 1);
    }

    #[test]
    fn test_broadcast_address_means_broadcast() {
        let link = started();
        let mut frame = Frame::new();
        let _ = frame.begin(MainCommand::Heartbeat);
        link.send(Some(&MacAddress::BROADCAST), &frame).unwrap();
        assert_eq!(link.outbound.try_pop().unwrap().destination, None);
    }

    #[test]
    fn test_capture_drops_when_stopped_or_oversized() {
        let link = Link::new(MockRadio::new(addr(0)));
        assert!(!link.on_frame_received(addr(1), &[0x03, 2], 1));
        link.set_running(true);
        assert!(!link.on_frame_received(addr(1), &[0u8; MAX_FRAME_LEN + 1], 1));
        assert!(link.on_frame_received(addr(1), &[0x03, 2], 1));
        assert_eq!(link.inbound.len(), 1);
        assert_eq!(link.stats().malformed, 1);
    }

    #[test]
    fn test_capture_full_queue() {
        let link = started();
        for i in 0..INBOUND_QUEUE_DEPTH {
            assert!(link.on_frame_received(addr(1), &[0x03, 2], i as u64));
        }
        assert!(!link.on_frame_received(addr(1), &[0x03, 2], 99));
        assert_eq!(link.stats().inbound_dropped, 1);
        // The oldest frame is still first.
        assert_eq!(link.inbound.try_pop().unwrap().timestamp, 0);
    }

    #[test]
    fn test_send_complete_failure_counts_lost() {
        let link = started();
        let _ = link.with_registry(|r| r.insert(addr(1), false)).unwrap().unwrap();
        link.on_send_complete(addr(1), false);
        link.on_send_complete(addr(1), true);
        assert_eq!(link.peer(&addr(1)).unwrap().packets_lost, 1);
        assert_eq!(
            link.outcomes.try_pop(),
            Some(SendOutcome {
                address: addr(1),
                success: false
            })
        );
        assert_eq!(link.outcomes.len(), 1);
    }

    #[test]
    fn test_registry_contention_fails_fast() {
        let link = started();
        let nested = link.with_registry(|_| link.with_registry(|r| r.len()));
        assert_eq!(nested, Ok(Err(LinkError::Contended)));
        let inner = link.with_registry(|_| (link.peer_count(), link.has_peer(&addr(1))));
        assert_eq!(inner, Ok((0, false)));
    }
}
