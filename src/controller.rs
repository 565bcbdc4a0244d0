//! Application-thread facade over a [`Link`].
//!
//! The [`Controller`] owns everything that must only run on the application
//! thread: lifecycle, peer registration, configuration, the callback table, the
//! pairing table and the periodic [`tick`](Controller::tick).
//!
//! `tick(now)` must be called regularly by the host loop. Each call, in order:
//!
//! 1. broadcasts a heartbeat if one is due and any peer is registered,
//! 2. drains decoded results and dispatches `PeerConnected`,
//!    `HeartbeatReceived` and `ReceivedData`,
//! 3. drains send completions and dispatches `SendSuccess`/`SendFailed` plus `Sent`,
//! 4. disconnects silent peers (`PeerDisconnected` + `HeartbeatTimeout`),
//! 5. drops peers whose pairing handshake expired (`PeerRemoved`).
//!
//! Callbacks therefore always run on the thread calling `tick` (or the peer
//! management methods), never in the radio upcall or in the worker.

use crate::address::MacAddress;
use crate::config::LinkConfig;
use crate::consts::{MAX_PEERS, RESULT_DRAIN_LIMIT};
use crate::error::LinkError;
use crate::event::{Event, EventCallback, EventDispatcher, EventKind};
use crate::frame::{Frame, MainCommand};
use crate::link::{Inbound, Link, LinkStats};
use crate::pairing::{PairingState, PairingTable};
use crate::radio::Radio;
use crate::registry::Peer;

/// Lifecycle, peer management and event dispatch for one [`Link`].
#[derive(Debug)]
pub struct Controller<'a, R> {
    link: &'a Link<R>,
    config: LinkConfig,
    dispatcher: EventDispatcher,
    pairing: PairingTable,
    last_heartbeat: Option<u64>,
}

impl<'a, R: Radio> Controller<'a, R> {
    /// Creates a stopped controller for `link`.
    pub fn new(link: &'a Link<R>, config: LinkConfig) -> Self {
        Self {
            link,
            config,
            dispatcher: EventDispatcher::new(),
            pairing: PairingTable::new(),
            last_heartbeat: None,
        }
    }

    /// The shared link, for handing to the worker and the radio driver.
    pub fn link(&self) -> &'a Link<R> {
        self.link
    }

    /// Current settings.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Starts the radio on `channel` and opens the pipeline.
    ///
    /// On failure nothing is left running.
    pub fn begin(&mut self, channel: u8) -> Result<(), LinkError> {
        if self.link.is_running() {
            return Err(LinkError::AlreadyRunning);
        }
        let _ = self.link.discard_queues();
        self.pairing.clear();
        self.last_heartbeat = None;

        if self.link.radio().start(channel).is_err() {
            error!("radio failed to start on channel {}", channel);
            return Err(LinkError::Transport);
        }
        let limit = self.config.effective_max_peers();
        if let Err(e) = self.link.with_registry(|r| r.set_limit(limit)) {
            error!("cannot configure registry: {}", e);
            self.link.radio().stop();
            return Err(e);
        }
        self.link.set_ack_heartbeats(self.config.ack_heartbeats);
        self.link.set_running(true);
        info!("link up on channel {}", channel);
        Ok(())
    }

    /// Stops the worker, removes every peer and discards all queued items.
    ///
    /// Does nothing if the link is not running.
    pub fn end(&mut self) {
        if !self.link.is_running() {
            return;
        }
        self.link.set_running(false);
        let removed = self.remove_all();
        let discarded = self.link.discard_queues();
        self.pairing.clear();
        self.last_heartbeat = None;
        self.link.radio().stop();
        info!("link down, {} peers removed, {} queued items discarded", removed, discarded);
    }

    /// Whether [`begin`](Self::begin) succeeded and [`end`](Self::end) has not
    /// been called since.
    pub fn is_running(&self) -> bool {
        self.link.is_running()
    }

    /// Registers `address` with the radio and the registry.
    ///
    /// Adding a peer that is already registered succeeds without changes.
    pub fn add_peer(&mut self, address: MacAddress, encrypt: bool) -> Result<(), LinkError> {
        if !self.link.is_running() {
            return Err(LinkError::NotRunning);
        }
        let present = self.link.with_registry(|r| {
            if r.contains(&address) {
                Ok(true)
            } else if r.has_room() {
                Ok(false)
            } else {
                Err(LinkError::RegistryFull)
            }
        });
        match present {
            Ok(Ok(true)) => return Ok(()),
            Ok(Ok(false)) => {}
            Ok(Err(e)) | Err(e) => {
                warn!("cannot add {}: {}", address, e);
                return Err(e);
            }
        }

        if self.link.radio().register_peer(&address, encrypt).is_err() {
            warn!("radio refused peer {}", address);
            return Err(LinkError::Transport);
        }
        match self.link.with_registry(|r| r.insert(address, encrypt)) {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => return Ok(()),
            Ok(Err(e)) | Err(e) => {
                warn!("cannot add {}: {}", address, e);
                let _ = self.link.radio().deregister_peer(&address);
                return Err(e);
            }
        }

        self.pairing.note_added(address);
        info!("peer {} added", address);
        self.dispatcher
            .trigger(&Event::new(EventKind::PeerAdded, address));
        Ok(())
    }

    /// Removes `address` from the registry and the radio.
    pub fn remove_peer(&mut self, address: &MacAddress) -> Result<(), LinkError> {
        let removed = self.link.with_registry(|r| r.remove(address))?;
        let Some(peer) = removed else {
            return Err(LinkError::UnknownPeer);
        };
        self.forget(peer);
        Ok(())
    }

    /// Removes every peer. Returns how many there were.
    pub fn remove_all(&mut self) -> usize {
        let drained = match self.link.with_registry(|r| r.drain()) {
            Ok(drained) => drained,
            Err(e) => {
                warn!("cannot clear registry: {}", e);
                return 0;
            }
        };
        let count = drained.len();
        for peer in drained {
            self.forget(peer);
        }
        count
    }

    fn forget(&mut self, peer: Peer) {
        if self.link.radio().deregister_peer(&peer.address).is_err() {
            debug!("radio did not deregister {}", peer.address);
        }
        self.pairing.forget(&peer.address);
        info!("peer {} removed", peer.address);
        self.dispatcher
            .trigger(&Event::new(EventKind::PeerRemoved, peer.address));
    }

    /// Whether `address` is registered.
    pub fn has_peer(&self, address: &MacAddress) -> bool {
        self.link.has_peer(address)
    }

    /// Snapshot of one peer.
    pub fn peer(&self, address: &MacAddress) -> Option<Peer> {
        self.link.peer(address)
    }

    /// Whether `address` is registered and connected.
    pub fn is_connected(&self, address: &MacAddress) -> bool {
        self.link.is_connected(address)
    }

    /// Whether any peer is connected.
    pub fn is_any_connected(&self) -> bool {
        self.link.is_any_connected()
    }

    /// Snapshots of every peer.
    pub fn peers(&self) -> heapless::Vec<Peer, MAX_PEERS> {
        self.link.peers()
    }

    /// Number of registered peers.
    pub fn peer_count(&self) -> usize {
        self.link.peer_count()
    }

    /// Queues `frame` for `address`. See [`Link::send`].
    pub fn send(&self, address: &MacAddress, frame: &Frame) -> Result<(), LinkError> {
        self.link.send(Some(address), frame)
    }

    /// Queues `frame` for every node on the channel.
    pub fn broadcast(&self, frame: &Frame) -> Result<(), LinkError> {
        self.link.broadcast(frame)
    }

    /// Broadcasts one heartbeat frame now.
    pub fn send_heartbeat(&self) -> Result<(), LinkError> {
        let mut frame = Frame::new();
        let _ = frame.begin(MainCommand::Heartbeat);
        self.link.broadcast(&frame)
    }

    /// Enables or disables periodic heartbeats and sets their spacing.
    pub fn set_heartbeat(&mut self, enabled: bool, interval_ms: u32) {
        self.config.heartbeat_enabled = enabled;
        self.config.heartbeat_interval_ms = interval_ms;
    }

    /// Sets the silence after which a connected peer is disconnected.
    pub fn set_timeout(&mut self, timeout_ms: u32) {
        self.config.peer_timeout_ms = timeout_ms;
    }

    /// Sets the peer limit, clamped to [`MAX_PEERS`]. Existing peers are kept.
    pub fn set_max_peers(&mut self, max_peers: usize) {
        self.config.max_peers = max_peers.min(MAX_PEERS);
        let limit = self.config.max_peers;
        if let Err(e) = self.link.with_registry(|r| r.set_limit(limit)) {
            warn!("peer limit not applied: {}", e);
        }
    }

    /// Sets how long a pairing handshake may take.
    pub fn set_pairing_timeout(&mut self, timeout_ms: u32) {
        self.config.pairing_timeout_ms = timeout_ms;
    }

    /// Whether pair requests from registered peers are answered.
    pub fn set_accept_pairing(&mut self, accept: bool) {
        self.config.accept_pairing = accept;
    }

    /// Whether heartbeats from registered peers are acked.
    pub fn set_ack_heartbeats(&mut self, enabled: bool) {
        self.config.ack_heartbeats = enabled;
        self.link.set_ack_heartbeats(enabled);
    }

    /// Installs `callback` for `kind`, replacing any previous one.
    pub fn on(&mut self, kind: EventKind, callback: EventCallback) {
        self.dispatcher.on(kind, callback);
    }

    /// Clears the callback for `kind`.
    pub fn off(&mut self, kind: EventKind) {
        self.dispatcher.off(kind);
    }

    /// Registers `address` if needed, sends it a pair request and starts the
    /// pairing timer at `now`.
    ///
    /// If the request cannot be queued, a peer registered by this call is
    /// removed again.
    pub fn start_pairing(&mut self, address: MacAddress, now: u64) -> Result<(), LinkError> {
        let known = self.link.has_peer(&address);
        self.add_peer(address, false)?;
        let mut request = Frame::new();
        let _ = request.begin(MainCommand::PairRequest);
        if let Err(e) = self.link.send(Some(&address), &request) {
            warn!("pair request to {} not sent: {}", address, e);
            if !known {
                let _ = self.remove_peer(&address);
            }
            return Err(e);
        }
        self.pairing.begin(address, now);
        info!("pairing with {}", address);
        Ok(())
    }

    /// Pairing state of `address`.
    pub fn pairing_state(&self, address: &MacAddress) -> PairingState {
        self.pairing.state(address)
    }

    /// Current counters.
    pub fn stats(&self) -> LinkStats {
        self.link.stats()
    }

    /// Runs one supervision round at `now` (ms). See the module docs.
    pub fn tick(&mut self, now: u64) {
        if !self.link.is_running() {
            return;
        }
        self.supervise_heartbeat(now);
        self.dispatch_results();
        self.dispatch_outcomes();
        self.expire_peers(now);
        self.expire_pairings(now);
    }

    fn supervise_heartbeat(&mut self, now: u64) {
        if !self.config.heartbeat_enabled || self.link.peer_count() == 0 {
            return;
        }
        let interval = u64::from(self.config.heartbeat_interval_ms);
        let due = self
            .last_heartbeat
            .is_none_or(|last| now.saturating_sub(last) >= interval);
        if !due {
            return;
        }
        if let Err(e) = self.send_heartbeat() {
            warn!("heartbeat not sent: {}", e);
        }
        self.last_heartbeat = Some(now);
    }

    fn dispatch_results(&mut self) {
        for _ in 0..RESULT_DRAIN_LIMIT {
            let Some(item) = self.link.results.try_pop() else {
                break;
            };
            match item {
                Inbound::Connected(address) => {
                    self.pairing.note_connected(&address);
                    self.dispatcher
                        .trigger(&Event::new(EventKind::PeerConnected, address));
                }
                Inbound::Ack(address) => {
                    self.note_activity(&address);
                    self.dispatcher
                        .trigger(&Event::new(EventKind::HeartbeatReceived, address));
                }
                Inbound::Data { address, frame } => {
                    self.handle_pairing(address, &frame);
                    self.note_activity(&address);
                    self.dispatcher.trigger(&Event::received(address, &frame));
                }
            }
        }
    }

    fn note_activity(&mut self, address: &MacAddress) {
        if self.pairing.note_activity(address) {
            debug!("pairing with {} settled by traffic", address);
        }
    }

    fn handle_pairing(&mut self, address: MacAddress, frame: &Frame) {
        match frame.main_command() {
            Some(MainCommand::PairRequest) if self.config.accept_pairing => {
                let mut response = Frame::new();
                let _ = response.begin(MainCommand::PairResponse);
                if let Err(e) = self.link.send(Some(&address), &response) {
                    warn!("pair response to {} not sent: {}", address, e);
                }
            }
            Some(MainCommand::PairResponse) => {
                // The worker already reported a fresh connection; only a peer
                // that was connected before the handshake lands here.
                if self.pairing.complete(&address) {
                    info!("paired with {}", address);
                    self.dispatcher
                        .trigger(&Event::new(EventKind::PeerConnected, address));
                }
            }
            _ => {}
        }
    }

    fn dispatch_outcomes(&mut self) {
        for _ in 0..RESULT_DRAIN_LIMIT {
            let Some(outcome) = self.link.outcomes.try_pop() else {
                break;
            };
            let kind = if outcome.success {
                EventKind::SendSuccess
            } else {
                EventKind::SendFailed
            };
            self.dispatcher
                .trigger(&Event::send_outcome(kind, outcome.address, outcome.success));
            self.dispatcher.trigger(&Event::send_outcome(
                EventKind::Sent,
                outcome.address,
                outcome.success,
            ));
        }
    }

    fn expire_peers(&mut self, now: u64) {
        let timeout = self.config.peer_timeout_ms;
        let lost = match self.link.with_registry(|r| r.expire(now, timeout)) {
            Ok(lost) => lost,
            Err(_) => return,
        };
        for address in lost {
            warn!("peer {} timed out", address);
            self.pairing.note_disconnected(&address);
            self.dispatcher
                .trigger(&Event::new(EventKind::PeerDisconnected, address));
            self.dispatcher
                .trigger(&Event::new(EventKind::HeartbeatTimeout, address));
        }
    }

    fn expire_pairings(&mut self, now: u64) {
        for address in self.pairing.expired(now, self.config.pairing_timeout_ms) {
            warn!("pairing with {} timed out", address);
            match self.remove_peer(&address) {
                Ok(()) => {}
                // Registered elsewhere or already gone: just stop tracking it.
                Err(_) => self.pairing.forget(&address),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::OUTBOUND_QUEUE_DEPTH;
    use crate::radio::mock::MockRadio;
    use crate::worker::Worker;
    use embedded_hal_mock::eh1::delay::NoopDelay;
    use std::boxed::Box;
    use std::sync::{Arc, Mutex};
    use std::vec::Vec;

    type Log = Arc<Mutex<Vec<(EventKind, MacAddress)>>>;

    fn addr(n: u8) -> MacAddress {
        MacAddress::new([0x24, 0x6f, 0x28, 0x00, 0x00, n])
    }

    fn quiet() -> LinkConfig {
        LinkConfig {
            heartbeat_enabled: false,
            ..LinkConfig::default()
        }
    }

    fn record(ctrl: &mut Controller<'_, MockRadio>, kinds: &[EventKind]) -> Log {
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        for &kind in kinds {
            let sink = log.clone();
            ctrl.on(
                kind,
                Box::new(move |e: &Event<'_>| sink.lock().unwrap().push((e.kind, e.address))),
            );
        }
        log
    }

    fn count(log: &Log, kind: EventKind) -> usize {
        log.lock().unwrap().iter().filter(|(k, _)| *k == kind).count()
    }

    fn pump(worker: &mut Worker<'_, MockRadio>) {
        let mut delay = NoopDelay::new();
        while worker.poll(&mut delay).is_ok() {}
    }

    /// Delivers what `from` put on the air to `to`, as its radio driver would.
    fn shuttle(from: &Link<MockRadio>, to: &Link<MockRadio>, now: u64) {
        let source = from.own_address();
        for sent in from.radio().take_sent() {
            if sent.destination.is_none_or(|d| d == to.own_address()) {
                let _ = to.on_frame_received(source, &sent.bytes, now);
            }
        }
    }

    fn data_frame() -> Vec<u8> {
        let mut frame = Frame::new();
        let _ = frame.begin(MainCommand::DataResponse).add_u8(1, 1);
        frame.as_bytes().unwrap().to_vec()
    }

    #[test]
    fn test_begin_failure_leaves_link_stopped() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, quiet());
        link.radio().fail_start(true);
        assert_eq!(ctrl.begin(1), Err(LinkError::Transport));
        assert!(!ctrl.is_running());
        assert_eq!(ctrl.add_peer(addr(1), false), Err(LinkError::NotRunning));
        assert_eq!(ctrl.send_heartbeat(), Err(LinkError::NotRunning));

        link.radio().fail_start(false);
        ctrl.begin(6).unwrap();
        assert_eq!(link.radio().channel(), Some(6));
        assert_eq!(ctrl.begin(6), Err(LinkError::AlreadyRunning));
    }

    #[test]
    fn test_add_and_remove_emit_events() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, quiet());
        let log = record(&mut ctrl, &[EventKind::PeerAdded, EventKind::PeerRemoved]);
        ctrl.begin(1).unwrap();

        ctrl.add_peer(addr(1), true).unwrap();
        ctrl.add_peer(addr(1), true).unwrap();
        assert_eq!(count(&log, EventKind::PeerAdded), 1);
        assert_eq!(link.radio().registered(), [addr(1)]);
        assert_eq!(ctrl.pairing_state(&addr(1)), PairingState::Added);
        assert!(ctrl.peer(&addr(1)).unwrap().encrypt);

        assert_eq!(ctrl.remove_peer(&addr(2)), Err(LinkError::UnknownPeer));
        ctrl.remove_peer(&addr(1)).unwrap();
        assert_eq!(
            log.lock().unwrap().as_slice(),
            &[
                (EventKind::PeerAdded, addr(1)),
                (EventKind::PeerRemoved, addr(1))
            ]
        );
        assert!(link.radio().registered().is_empty());
        assert_eq!(ctrl.pairing_state(&addr(1)), PairingState::Unknown);
    }

    #[test]
    fn test_peer_limit() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, quiet());
        ctrl.begin(1).unwrap();
        ctrl.set_max_peers(2);
        ctrl.add_peer(addr(1), false).unwrap();
        ctrl.add_peer(addr(2), false).unwrap();
        assert_eq!(ctrl.add_peer(addr(3), false), Err(LinkError::RegistryFull));
        assert_eq!(ctrl.peer_count(), 2);
        assert_eq!(link.radio().registered().len(), 2);

        // Lowering the limit evicts nobody.
        ctrl.set_max_peers(1);
        assert_eq!(ctrl.peer_count(), 2);
        ctrl.set_max_peers(1000);
        assert_eq!(ctrl.config().max_peers, MAX_PEERS);
    }

    #[test]
    fn test_radio_refusal_adds_nothing() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, quiet());
        let log = record(&mut ctrl, &[EventKind::PeerAdded]);
        ctrl.begin(1).unwrap();
        link.radio().fail_register(true);
        assert_eq!(ctrl.add_peer(addr(1), false), Err(LinkError::Transport));
        assert!(!ctrl.has_peer(&addr(1)));
        assert_eq!(count(&log, EventKind::PeerAdded), 0);
    }

    #[test]
    fn test_end_tears_everything_down() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, quiet());
        let log = record(&mut ctrl, &[EventKind::PeerRemoved]);
        ctrl.begin(1).unwrap();
        ctrl.add_peer(addr(1), false).unwrap();
        ctrl.add_peer(addr(2), false).unwrap();
        ctrl.send_heartbeat().unwrap();
        assert!(link.on_frame_received(addr(1), &data_frame(), 1));

        ctrl.end();
        assert!(!ctrl.is_running());
        assert!(link.radio().is_stopped());
        assert!(link.radio().registered().is_empty());
        assert_eq!(count(&log, EventKind::PeerRemoved), 2);
        let stats = ctrl.stats();
        assert_eq!(stats.peers, 0);
        assert_eq!(stats.inbound_depth, 0);
        assert_eq!(stats.outbound_depth, 0);

        // A second end is a no-op.
        ctrl.end();
        assert_eq!(count(&log, EventKind::PeerRemoved), 2);
    }

    #[test]
    fn test_send_backpressure() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, quiet());
        ctrl.begin(1).unwrap();
        let mut frame = Frame::new();
        let _ = frame.begin(MainCommand::DataRequest).add_u8(1, 9);
        for _ in 0..OUTBOUND_QUEUE_DEPTH {
            ctrl.send(&addr(1), &frame).unwrap();
        }
        assert_eq!(ctrl.send(&addr(1), &frame), Err(LinkError::QueueFull));
        assert_eq!(ctrl.broadcast(&frame), Err(LinkError::QueueFull));
        assert_eq!(ctrl.stats().outbound_depth, OUTBOUND_QUEUE_DEPTH);
    }

    #[test]
    fn test_timeout_transition() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, quiet());
        let log = record(
            &mut ctrl,
            &[
                EventKind::PeerConnected,
                EventKind::PeerDisconnected,
                EventKind::HeartbeatTimeout,
            ],
        );
        let mut worker = Worker::new(&link);
        ctrl.begin(1).unwrap();
        ctrl.add_peer(addr(1), false).unwrap();
        ctrl.add_peer(addr(2), false).unwrap();

        let timeout = u64::from(ctrl.config().peer_timeout_ms);
        let now = 10_000;
        assert!(link.on_frame_received(addr(1), &data_frame(), now - timeout - 1));
        assert!(link.on_frame_received(addr(2), &data_frame(), now - timeout + 1));
        pump(&mut worker);
        ctrl.tick(now - timeout + 1);
        assert_eq!(count(&log, EventKind::PeerConnected), 2);

        ctrl.tick(now);
        assert!(!ctrl.is_connected(&addr(1)));
        assert!(ctrl.is_connected(&addr(2)));
        assert_eq!(count(&log, EventKind::PeerDisconnected), 1);
        assert_eq!(count(&log, EventKind::HeartbeatTimeout), 1);
        assert_eq!(ctrl.pairing_state(&addr(1)), PairingState::Added);

        // Still registered, and not reported twice.
        ctrl.tick(now);
        assert!(ctrl.has_peer(&addr(1)));
        assert_eq!(count(&log, EventKind::PeerDisconnected), 1);
    }

    #[test]
    fn test_periodic_heartbeat() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, LinkConfig::default());
        let mut worker = Worker::new(&link);
        ctrl.begin(1).unwrap();

        // Nobody to talk to yet.
        ctrl.tick(0);
        assert_eq!(ctrl.stats().outbound_depth, 0);

        ctrl.add_peer(addr(1), false).unwrap();
        ctrl.tick(0);
        ctrl.tick(999);
        ctrl.tick(1_000);
        pump(&mut worker);
        let sent = link.radio().take_sent();
        assert_eq!(sent.len(), 2);
        assert!(
            sent.iter()
                .all(|s| s.destination.is_none() && s.bytes == [MainCommand::Heartbeat.code(), 0])
        );

        ctrl.set_heartbeat(false, 1_000);
        ctrl.tick(5_000);
        assert_eq!(ctrl.stats().outbound_depth, 0);
    }

    #[test]
    fn test_send_outcomes_dispatch_on_tick() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, quiet());
        let seen = Arc::new(Mutex::new(Vec::new()));
        for kind in [EventKind::Sent, EventKind::SendSuccess, EventKind::SendFailed] {
            let sink = seen.clone();
            ctrl.on(
                kind,
                Box::new(move |e: &Event<'_>| sink.lock().unwrap().push((e.kind, e.success))),
            );
        }
        ctrl.begin(1).unwrap();
        ctrl.add_peer(addr(1), false).unwrap();

        link.on_send_complete(addr(1), true);
        link.on_send_complete(addr(1), false);
        // Nothing runs until the application ticks.
        assert!(seen.lock().unwrap().is_empty());
        ctrl.tick(0);
        assert_eq!(
            seen.lock().unwrap().as_slice(),
            &[
                (EventKind::SendSuccess, true),
                (EventKind::Sent, true),
                (EventKind::SendFailed, false),
                (EventKind::Sent, false),
            ]
        );
        assert_eq!(ctrl.peer(&addr(1)).unwrap().packets_lost, 1);
    }

    #[test]
    fn test_pairing_timeout_removes_peer() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, quiet());
        let log = record(&mut ctrl, &[EventKind::PeerRemoved]);
        ctrl.begin(1).unwrap();
        ctrl.set_pairing_timeout(5_000);

        ctrl.start_pairing(addr(1), 100).unwrap();
        assert_eq!(
            ctrl.pairing_state(&addr(1)),
            PairingState::Pairing { since: 100 }
        );
        ctrl.tick(5_099);
        assert!(ctrl.has_peer(&addr(1)));
        ctrl.tick(5_100);
        assert!(!ctrl.has_peer(&addr(1)));
        assert_eq!(ctrl.pairing_state(&addr(1)), PairingState::Unknown);
        assert_eq!(count(&log, EventKind::PeerRemoved), 1);
        assert!(link.radio().registered().is_empty());
    }

    #[test]
    fn test_traffic_during_pairing_keeps_peer() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, quiet());
        let log = record(&mut ctrl, &[EventKind::PeerRemoved, EventKind::PeerConnected]);
        let mut worker = Worker::new(&link);
        ctrl.begin(1).unwrap();
        ctrl.set_pairing_timeout(5_000);
        ctrl.add_peer(addr(1), false).unwrap();
        assert!(link.on_frame_received(addr(1), &data_frame(), 0));
        pump(&mut worker);
        ctrl.tick(0);
        assert!(ctrl.is_connected(&addr(1)));

        ctrl.start_pairing(addr(1), 100).unwrap();
        for now in (500..=6_000).step_by(500) {
            assert!(link.on_frame_received(addr(1), &data_frame(), now));
            pump(&mut worker);
            ctrl.tick(now);
            assert!(ctrl.has_peer(&addr(1)), "peer removed at {now}");
        }
        assert_eq!(ctrl.pairing_state(&addr(1)), PairingState::Connected);
        assert_eq!(count(&log, EventKind::PeerRemoved), 0);
        assert_eq!(count(&log, EventKind::PeerConnected), 1);
    }

    #[test]
    fn test_ack_during_pairing_settles_handshake() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, quiet());
        let mut worker = Worker::new(&link);
        ctrl.begin(1).unwrap();
        ctrl.set_pairing_timeout(5_000);
        ctrl.start_pairing(addr(1), 0).unwrap();
        assert!(link.on_frame_received(addr(1), &[MainCommand::Ack.code(), 0], 1_000));
        pump(&mut worker);
        ctrl.tick(1_000);
        assert_eq!(ctrl.pairing_state(&addr(1)), PairingState::Connected);
        ctrl.tick(6_000);
        assert!(ctrl.has_peer(&addr(1)));
    }

    #[test]
    fn test_pairing_send_failure_rolls_back() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, quiet());
        let log = record(&mut ctrl, &[EventKind::PeerAdded, EventKind::PeerRemoved]);
        ctrl.begin(1).unwrap();
        ctrl.add_peer(addr(2), false).unwrap();
        let mut frame = Frame::new();
        let _ = frame.begin(MainCommand::DataRequest);
        for _ in 0..OUTBOUND_QUEUE_DEPTH {
            ctrl.broadcast(&frame).unwrap();
        }

        assert_eq!(ctrl.start_pairing(addr(1), 0), Err(LinkError::QueueFull));
        assert!(!ctrl.has_peer(&addr(1)));
        assert_eq!(ctrl.pairing_state(&addr(1)), PairingState::Unknown);
        assert_eq!(link.radio().registered().as_slice(), &[addr(2)]);
        assert_eq!(count(&log, EventKind::PeerRemoved), 1);

        // A peer that was already registered stays as it was.
        assert_eq!(ctrl.start_pairing(addr(2), 0), Err(LinkError::QueueFull));
        assert!(ctrl.has_peer(&addr(2)));
        assert_eq!(ctrl.pairing_state(&addr(2)), PairingState::Added);
        assert_eq!(count(&log, EventKind::PeerRemoved), 1);
    }

    #[test]
    fn test_two_node_pairing_and_heartbeat_round_trip() {
        let link_a = Link::new(MockRadio::new(addr(0xA)));
        let link_b = Link::new(MockRadio::new(addr(0xB)));
        let (a, b) = (link_a.own_address(), link_b.own_address());
        let mut ctrl_a = Controller::new(&link_a, quiet());
        let mut ctrl_b = Controller::new(&link_b, quiet());
        let mut worker_a = Worker::new(&link_a);
        let mut worker_b = Worker::new(&link_b);
        let log = record(
            &mut ctrl_a,
            &[EventKind::PeerConnected, EventKind::HeartbeatReceived],
        );
        ctrl_a.begin(1).unwrap();
        ctrl_b.begin(1).unwrap();
        ctrl_b.add_peer(a, false).unwrap();

        // A asks B to pair.
        ctrl_a.start_pairing(b, 0).unwrap();
        pump(&mut worker_a);
        let sent = link_a.radio().take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].destination, Some(b));
        assert_eq!(sent[0].bytes, [MainCommand::PairRequest.code(), 0]);
        assert!(link_b.on_frame_received(a, &sent[0].bytes, 10));

        // B answers.
        pump(&mut worker_b);
        ctrl_b.tick(10);
        assert_eq!(ctrl_b.pairing_state(&a), PairingState::Connected);
        pump(&mut worker_b);
        shuttle(&link_b, &link_a, 20);

        // A sees B exactly once.
        pump(&mut worker_a);
        ctrl_a.tick(20);
        assert_eq!(log.lock().unwrap().as_slice(), &[(EventKind::PeerConnected, b)]);
        assert!(ctrl_a.is_connected(&b));
        assert_eq!(ctrl_a.pairing_state(&b), PairingState::Connected);
        assert_eq!(ctrl_a.peer(&b).unwrap().last_seen, Some(20));

        // Heartbeat round trip refreshes B without reconnecting it.
        ctrl_a.send_heartbeat().unwrap();
        pump(&mut worker_a);
        shuttle(&link_a, &link_b, 30);
        pump(&mut worker_b);
        shuttle(&link_b, &link_a, 40);
        pump(&mut worker_a);
        ctrl_a.tick(40);

        assert_eq!(count(&log, EventKind::PeerConnected), 1);
        assert_eq!(count(&log, EventKind::HeartbeatReceived), 1);
        let peer = ctrl_a.peer(&b).unwrap();
        assert!(peer.connected);
        assert_eq!(peer.last_seen, Some(40));
        assert_eq!(peer.packets_received, 2);
    }

    #[test]
    fn test_pair_requests_can_be_refused() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, quiet());
        let mut worker = Worker::new(&link);
        ctrl.begin(1).unwrap();
        ctrl.set_accept_pairing(false);
        ctrl.add_peer(addr(1), false).unwrap();
        assert!(link.on_frame_received(addr(1), &[MainCommand::PairRequest.code(), 0], 1));
        pump(&mut worker);
        ctrl.tick(1);
        assert_eq!(ctrl.stats().outbound_depth, 0);
    }

    #[test]
    fn test_worker_on_its_own_thread() {
        let link = Link::new(MockRadio::new(addr(0)));
        let mut ctrl = Controller::new(&link, quiet());
        let log = record(&mut ctrl, &[EventKind::PeerConnected, EventKind::ReceivedData]);
        ctrl.begin(1).unwrap();
        ctrl.add_peer(addr(1), false).unwrap();

        std::thread::scope(|s| {
            let shared = &link;
            let _ = s.spawn(move || {
                let mut worker = Worker::new(shared);
                worker.run(&mut NoopDelay::new(), 50);
            });

            assert!(link.on_frame_received(addr(1), &data_frame(), 5));
            for _ in 0..2_000 {
                ctrl.tick(5);
                if count(&log, EventKind::ReceivedData) == 1 {
                    break;
                }
                std::thread::sleep(std::time::Duration::from_millis(1));
            }
            ctrl.end();
        });

        assert_eq!(count(&log, EventKind::PeerConnected), 1);
        assert_eq!(count(&log, EventKind::ReceivedData), 1);
    }
}
