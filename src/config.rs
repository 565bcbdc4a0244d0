//! Runtime settings for a [`Controller`](crate::controller::Controller).

use crate::consts::{
    DEFAULT_HEARTBEAT_INTERVAL_MS, DEFAULT_PAIRING_TIMEOUT_MS, DEFAULT_PEER_TIMEOUT_MS, MAX_PEERS,
};

/// Link-layer settings. All durations are in milliseconds.
///
/// Every field can also be changed at runtime through the matching
/// `Controller::set_*` method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct LinkConfig {
    /// Broadcast a heartbeat every `heartbeat_interval_ms` while peers exist.
    pub heartbeat_enabled: bool,
    /// Minimum spacing between two heartbeats.
    pub heartbeat_interval_ms: u32,
    /// Silence after which a connected peer is declared disconnected.
    pub peer_timeout_ms: u32,
    /// User peer limit, clamped to [`MAX_PEERS`].
    pub max_peers: usize,
    /// Time a pairing handshake may take before the peer is dropped.
    pub pairing_timeout_ms: u32,
    /// Answer heartbeats from registered peers with an ack.
    pub ack_heartbeats: bool,
    /// Answer pair requests from registered peers with a pair response.
    pub accept_pairing: bool,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            heartbeat_enabled: true,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            peer_timeout_ms: DEFAULT_PEER_TIMEOUT_MS,
            max_peers: MAX_PEERS,
            pairing_timeout_ms: DEFAULT_PAIRING_TIMEOUT_MS,
            ack_heartbeats: true,
            accept_pairing: true,
        }
    }
}

impl LinkConfig {
    /// The peer limit actually enforced.
    pub fn effective_max_peers(&self) -> usize {
        self.max_peers.min(MAX_PEERS)
    }
}
