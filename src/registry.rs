//! Peer bookkeeping.
//!
//! [`PeerRegistry`] maps a [`MacAddress`] to its connection state and packet
//! counters. It holds at most `min(max_peers, MAX_PEERS)` entries and never
//! creates one implicitly: frames from unregistered senders are ignored.
//!
//! The registry itself does no locking. [`Link`](crate::link::Link) keeps it
//! behind a `critical_section::Mutex` and every read or write goes through a
//! short critical section; callers receive owned [`Peer`] snapshots, never
//! references into the table.

use heapless::Vec;

use crate::address::MacAddress;
use crate::consts::MAX_PEERS;
use crate::error::LinkError;

/// Snapshot of one remote endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Peer {
    /// Hardware address; unique within the registry.
    pub address: MacAddress,
    /// Whether frames to this peer are flagged for link-layer encryption.
    pub encrypt: bool,
    /// Set once any frame has arrived from the peer since it was added.
    pub connected: bool,
    /// Timestamp (ms) of the most recent frame from the peer; `None` if never.
    pub last_seen: Option<u64>,
    /// Frames handed to the radio for this peer.
    pub packets_sent: u32,
    /// Frames received from this peer.
    pub packets_received: u32,
    /// Frames to this peer the radio reported as failed.
    pub packets_lost: u32,
}

impl Peer {
    fn new(address: MacAddress, encrypt: bool) -> Self {
        Self {
            address,
            encrypt,
            connected: false,
            last_seen: None,
            packets_sent: 0,
            packets_received: 0,
            packets_lost: 0,
        }
    }

    /// Whether the peer has been silent for at least `timeout_ms` at `now`.
    ///
    /// Peers never heard from are not considered timed out.
    pub fn is_stale(&self, now: u64, timeout_ms: u32) -> bool {
        match self.last_seen {
            Some(seen) => now.saturating_sub(seen) >= timeout_ms as u64,
            None => false,
        }
    }
}

/// What an inbound frame changed for its sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Arrival {
    /// The sender is not registered.
    Unknown,
    /// The sender was already connected, or the frame does not connect.
    Refreshed,
    /// The sender just went from disconnected to connected.
    Connected,
}

/// Fixed-capacity table of peers.
#[derive(Debug)]
pub struct PeerRegistry {
    peers: Vec<Peer, MAX_PEERS>,
    max_peers: usize,
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerRegistry {
    /// Creates an empty registry limited only by [`MAX_PEERS`].
    pub const fn new() -> Self {
        Self {
            peers: Vec::new(),
            max_peers: MAX_PEERS,
        }
    }

    /// The effective limit: the user limit clamped to [`MAX_PEERS`].
    pub fn limit(&self) -> usize {
        self.max_peers
    }

    /// Sets the user limit. Existing peers are kept even if above it.
    pub fn set_limit(&mut self, max_peers: usize) {
        self.max_peers = max_peers.min(MAX_PEERS);
    }

    /// Number of registered peers.
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Whether no peer is registered.
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Whether another peer can be added.
    pub fn has_room(&self) -> bool {
        self.peers.len() < self.max_peers
    }

    /// Whether `address` is registered.
    pub fn contains(&self, address: &MacAddress) -> bool {
        self.find(address).is_some()
    }

    /// Snapshot of the peer at `address`.
    pub fn get(&self, address: &MacAddress) -> Option<Peer> {
        self.find(address).copied()
    }

    /// Snapshots of every peer in registration order.
    pub fn snapshot(&self) -> Vec<Peer, MAX_PEERS> {
        self.peers.clone()
    }

    /// Iterates over the registered peers.
    pub fn iter(&self) -> impl Iterator<Item = &Peer> {
        self.peers.iter()
    }

    /// Whether at least one peer is connected.
    pub fn any_connected(&self) -> bool {
        self.peers.iter().any(|p| p.connected)
    }

    /// Inserts a new, disconnected peer.
    ///
    /// Returns `Ok(false)` if the address was already present.
    pub fn insert(&mut self, address: MacAddress, encrypt: bool) -> Result<bool, LinkError> {
        if self.contains(&address) {
            return Ok(false);
        }
        if !self.has_room() {
            return Err(LinkError::RegistryFull);
        }
        self.peers
            .push(Peer::new(address, encrypt))
            .map_err(|_| LinkError::RegistryFull)?;
        Ok(true)
    }

    /// Removes the peer at `address`, returning its last snapshot.
    pub fn remove(&mut self, address: &MacAddress) -> Option<Peer> {
        let idx = self.peers.iter().position(|p| p.address == *address)?;
        Some(self.peers.remove(idx))
    }

    /// Removes every peer, returning their snapshots.
    pub fn drain(&mut self) -> Vec<Peer, MAX_PEERS> {
        let out = self.peers.clone();
        self.peers.clear();
        out
    }

    /// Records a frame from `address` received at `now`.
    ///
    /// `connects` is false for frames that only refresh liveness (acks).
    pub(crate) fn record_arrival(
        &mut self,
        address: &MacAddress,
        now: u64,
        connects: bool,
    ) -> Arrival {
        let Some(peer) = self.find_mut(address) else {
            return Arrival::Unknown;
        };
        peer.last_seen = Some(now);
        peer.packets_received = peer.packets_received.saturating_add(1);
        if connects && !peer.connected {
            peer.connected = true;
            Arrival::Connected
        } else {
            Arrival::Refreshed
        }
    }

    /// Counts a frame handed to the radio for `address`.
    pub(crate) fn record_sent(&mut self, address: &MacAddress) {
        if let Some(peer) = self.find_mut(address) {
            peer.packets_sent = peer.packets_sent.saturating_add(1);
        }
    }

    /// Counts a frame to `address` that the radio failed to deliver.
    pub(crate) fn record_lost(&mut self, address: &MacAddress) {
        if let Some(peer) = self.find_mut(address) {
            peer.packets_lost = peer.packets_lost.saturating_add(1);
        }
    }

    /// Disconnects every connected peer silent for at least `timeout_ms`.
    ///
    /// Returns the addresses that changed state.
    pub(crate) fn expire(&mut self, now: u64, timeout_ms: u32) -> Vec<MacAddress, MAX_PEERS> {
        let mut lost = Vec::new();
        for peer in self.peers.iter_mut() {
            if peer.connected && peer.is_stale(now, timeout_ms) {
                peer.connected = false;
                let _ = lost.push(peer.address);
            }
        }
        lost
    }

    /// Sum of the per-peer counters: `(sent, received, lost)`.
    pub fn totals(&self) -> (u32, u32, u32) {
        self.peers.iter().fold((0u32, 0u32, 0u32), |(s, r, l), p| {
            (
                s.saturating_add(p.packets_sent),
                r.saturating_add(p.packets_received),
                l.saturating_add(p.packets_lost),
            )
        })
    }

    fn find(&self, address: &MacAddress) -> Option<&Peer> {
        self.peers.iter().find(|p| p.address == *address)
    }

    fn find_mut(&mut self, address: &MacAddress) -> Option<&mut Peer> {
        self.peers.iter_mut().find(|p| p.address == *address)
    }
}
