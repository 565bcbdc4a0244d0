//! The worker stage of the pipeline.
//!
//! A [`Worker`] is the single consumer of the inbound and outbound raw queues.
//! On the ingress side it decodes each captured frame, updates the sender's
//! registry entry and forwards what the application needs to see; on the
//! egress side it hands encoded frames to the [`Radio`].
//!
//! It is the only writer of `connected`, `last_seen` and `packets_received`, so
//! per-peer receive updates are totally ordered.
//!
//! Drive it either from a dedicated thread/task with [`Worker::run`], or call
//! [`Worker::poll`] from an existing loop:
//!
//! ```rust,ignore
//! static LINK: Link<MyRadio> = Link::new(MyRadio::new());
//!
//! let mut worker = Worker::new(&LINK);
//! loop {
//!     match worker.poll(&mut delay) {
//!         Ok(()) => {}
//!         Err(nb::Error::WouldBlock) => delay.delay_us(WORKER_IDLE_US),
//!     }
//! }
//! ```

use core::convert::Infallible;

use embedded_hal::delay::DelayNs;

use crate::address::MacAddress;
use crate::consts::{RESULT_PUSH_ATTEMPTS, RETRY_STEP_US, WORKER_BATCH};
use crate::frame::{Frame, MainCommand};
use crate::link::{Inbound, Link, Outgoing, RawFrame, SendOutcome};
use crate::radio::Radio;
use crate::registry::Arrival;

/// Consumer of the raw queues of one [`Link`].
#[derive(Debug)]
pub struct Worker<'a, R> {
    link: &'a Link<R>,
}

impl<'a, R: Radio> Worker<'a, R> {
    /// Creates the worker for `link`. Use exactly one per link.
    pub fn new(link: &'a Link<R>) -> Self {
        Self { link }
    }

    /// Drains up to one batch from each raw queue.
    ///
    /// Returns `WouldBlock` when the link is stopped or both queues were empty,
    /// so the caller knows to idle.
    pub fn poll<D: DelayNs>(&mut self, delay: &mut D) -> nb::Result<(), Infallible> {
        if !self.link.is_running() {
            return Err(nb::Error::WouldBlock);
        }

        let mut handled = 0usize;
        for _ in 0..WORKER_BATCH {
            let Some(raw) = self.link.inbound.try_pop() else {
                break;
            };
            self.ingest(raw, delay);
            handled += 1;
        }
        for _ in 0..WORKER_BATCH {
            let Some(outgoing) = self.link.outbound.try_pop() else {
                break;
            };
            self.transmit(outgoing);
            handled += 1;
        }

        if handled == 0 {
            Err(nb::Error::WouldBlock)
        } else {
            Ok(())
        }
    }

    /// Polls until the link is stopped, sleeping `idle_us` whenever there is
    /// nothing to do.
    ///
    /// Start the link with `Controller::begin` before calling this; on a
    /// stopped link it returns immediately.
    pub fn run<D: DelayNs>(&mut self, delay: &mut D, idle_us: u32) {
        debug!("worker started");
        while self.link.is_running() {
            if let Err(nb::Error::WouldBlock) = self.poll(delay) {
                delay.delay_us(idle_us);
            }
        }
        debug!("worker stopped");
    }

    fn ingest<D: DelayNs>(&mut self, raw: RawFrame, delay: &mut D) {
        let mut frame = Frame::new();
        if let Err(e) = frame.parse(&raw.bytes) {
            self.link.note_malformed();
            debug!("dropping frame from {}: {}", raw.address, e);
            return;
        }
        let command = frame.main_command();

        // Acks refresh liveness but never connect a peer.
        let connects = command != Some(MainCommand::Ack);
        let arrival = match self
            .link
            .with_registry(|r| r.record_arrival(&raw.address, raw.timestamp, connects))
        {
            Ok(arrival) => arrival,
            Err(e) => {
                warn!("frame from {} dropped: {}", raw.address, e);
                return;
            }
        };

        match arrival {
            Arrival::Unknown => {
                self.link.note_unknown_sender();
                trace!("ignoring frame from unregistered {}", raw.address);
                return;
            }
            Arrival::Connected => {
                info!("peer {} connected", raw.address);
                self.deliver(Inbound::Connected(raw.address), delay);
            }
            Arrival::Refreshed => {}
        }

        match command {
            Some(MainCommand::Heartbeat) => self.answer_heartbeat(raw.address),
            Some(MainCommand::Ack) => self.deliver(Inbound::Ack(raw.address), delay),
            _ => self.deliver(
                Inbound::Data {
                    address: raw.address,
                    frame,
                },
                delay,
            ),
        }
    }

    fn answer_heartbeat(&mut self, address: MacAddress) {
        if !self.link.acks_heartbeats() {
            return;
        }
        let mut ack = Frame::new();
        let _ = ack.begin(MainCommand::Ack);
        if let Err(e) = self.link.send(Some(&address), &ack) {
            debug!("no ack for {}: {}", address, e);
        }
    }

    fn deliver<D: DelayNs>(&mut self, item: Inbound, delay: &mut D) {
        if self
            .link
            .results
            .push_within(item, delay, RESULT_PUSH_ATTEMPTS, RETRY_STEP_US)
            .is_err()
        {
            warn!("result queue full, application is not draining");
        }
    }

    fn transmit(&mut self, outgoing: Outgoing) {
        let radio = self.link.radio();
        let result = match &outgoing.destination {
            Some(destination) => radio.send_raw(destination, &outgoing.bytes),
            None => radio.broadcast_raw(&outgoing.bytes),
        };

        match (result, outgoing.destination) {
            (Ok(()), Some(destination)) => {
                let _ = self.link.with_registry(|r| r.record_sent(&destination));
            }
            (Ok(()), None) => {}
            (Err(_), destination) => {
                let address = destination.unwrap_or(MacAddress::BROADCAST);
                warn!("radio rejected frame for {}", address);
                if let Some(destination) = destination {
                    let _ = self.link.with_registry(|r| r.record_lost(&destination));
                }
                let _ = self.link.outcomes.try_push(SendOutcome {
                    address,
                    success: false,
                });
            }
        }
    }
}
