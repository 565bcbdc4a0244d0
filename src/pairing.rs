//! Connection and pairing state per peer.
//!
//! ```text
//! Unknown ──add_peer──► Added ──start_pairing──► Pairing ──response / any frame──► Connected
//!    ▲                    ▲                         │                                  │
//!    └── remove / pairing timeout ◄─────────────────┘          heartbeat timeout ──────┘ (back to Added)
//! ```
//!
//! The table only tracks states; it sends nothing and emits nothing. The
//! [`Controller`](crate::controller::Controller) drives it from `add_peer`,
//! `start_pairing`, `tick` and the removal paths.

use heapless::Vec;

use crate::address::MacAddress;
use crate::consts::MAX_PEERS;

/// Where a peer stands in the handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum PairingState {
    /// Not registered.
    #[default]
    Unknown,
    /// Registered, no frame seen yet (or timed out since).
    Added,
    /// Pair request sent at `since` (ms), waiting for the response.
    Pairing {
        /// When the request was queued.
        since: u64,
    },
    /// Confirmed by a pair response or any inbound frame.
    Connected,
}

#[derive(Debug, Clone, Copy)]
struct Entry {
    address: MacAddress,
    state: PairingState,
}

/// Pairing state of every registered peer.
#[derive(Debug, Default)]
pub struct PairingTable {
    entries: Vec<Entry, MAX_PEERS>,
}

impl PairingTable {
    /// Creates an empty table.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// State of `address`; [`PairingState::Unknown`] if untracked.
    pub fn state(&self, address: &MacAddress) -> PairingState {
        self.find(address)
            .map(|e| e.state)
            .unwrap_or(PairingState::Unknown)
    }

    /// Starts tracking a freshly registered peer.
    pub fn note_added(&mut self, address: MacAddress) {
        if self.find(&address).is_none() {
            let _ = self.entries.push(Entry {
                address,
                state: PairingState::Added,
            });
        }
    }

    /// Marks a pair request to `address` as sent at `now`.
    pub fn begin(&mut self, address: MacAddress, now: u64) {
        let state = PairingState::Pairing { since: now };
        match self.find_mut(&address) {
            Some(entry) => entry.state = state,
            None => {
                let _ = self.entries.push(Entry { address, state });
            }
        }
    }

    /// The link reported `address` as connected.
    pub fn note_connected(&mut self, address: &MacAddress) {
        if let Some(entry) = self.find_mut(address) {
            entry.state = PairingState::Connected;
        }
    }

    /// A pair response arrived from `address`.
    ///
    /// Returns `true` if this completed a pending handshake.
    pub fn complete(&mut self, address: &MacAddress) -> bool {
        match self.find_mut(address) {
            Some(entry) if matches!(entry.state, PairingState::Pairing { .. }) => {
                entry.state = PairingState::Connected;
                true
            }
            _ => false,
        }
    }

    /// A frame or ack arrived from `address`.
    ///
    /// A pending handshake counts as done once the peer is heard from, so
    /// the pairing timer cannot remove a live peer. Returns `true` if this
    /// ended a pending handshake.
    pub fn note_activity(&mut self, address: &MacAddress) -> bool {
        self.complete(address)
    }

    /// `address` timed out; it stays registered.
    pub fn note_disconnected(&mut self, address: &MacAddress) {
        if let Some(entry) = self.find_mut(address) {
            if entry.state == PairingState::Connected {
                entry.state = PairingState::Added;
            }
        }
    }

    /// Stops tracking `address`.
    pub fn forget(&mut self, address: &MacAddress) {
        self.entries.retain(|e| e.address != *address);
    }

    /// Stops tracking everything.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Peers whose handshake has been pending for at least `timeout_ms`.
    pub fn expired(&self, now: u64, timeout_ms: u32) -> Vec<MacAddress, MAX_PEERS> {
        self.entries
            .iter()
            .filter(|e| match e.state {
                PairingState::Pairing { since } => now.saturating_sub(since) >= timeout_ms as u64,
                _ => false,
            })
            .map(|e| e.address)
            .collect()
    }

    fn find(&self, address: &MacAddress) -> Option<&Entry> {
        self.entries.iter().find(|e| e.address == *address)
    }

    fn find_mut(&mut self, address: &MacAddress) -> Option<&mut Entry> {
        self.entries.iter_mut().find(|e| e.address == *address)
    }
}
