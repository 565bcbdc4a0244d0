//! # rclink
//!
//! A portable, `no_std` link layer for handheld radio controllers talking to
//! their receivers over a connectionless, broadcast-capable radio (ESP-NOW and
//! similar).
//!
//! The crate provides:
//! - a compact TLV [`frame`] codec with hard size and entry limits,
//! - a fixed-capacity peer [`registry`] with connection state and counters,
//! - a three-stage pipeline (capture upcall → [`worker`] → application tick)
//!   built on lock-free bounded [`queue`]s,
//! - heartbeat supervision, timeouts and a typed [`event`] dispatcher,
//! - a request/response [`pairing`] handshake.
//!
//! No heap allocation is performed; every buffer is a `heapless` collection
//! with a size fixed in [`consts`].
//!
//! ## Crate features
//! | Feature     | Description |
//! |-------------|-------------|
//! | `std`       | Links `std`; event callbacks become boxed `FnMut` closures |
//! | `log`       | Uses `log` logging |
//! | `defmt-0-3` | Uses `defmt` logging and derives `defmt::Format` |
//!
//! ## Execution contexts
//!
//! - **Capture**: the radio driver calls [`Link::on_frame_received`] and
//!   [`Link::on_send_complete`]. Both only copy and enqueue; they are safe
//!   inside an interrupt.
//! - **Worker**: one [`Worker`] drains the raw queues, decodes frames, updates
//!   the registry and talks to the [`Radio`].
//! - **Application**: the [`Controller`] manages peers, sends frames and calls
//!   [`Controller::tick`], which is the only place callbacks run.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use rclink::{Controller, EventKind, Link, LinkConfig, Worker};
//!
//! static LINK: Link<EspNow> = Link::new(EspNow::new());
//!
//! let mut ctrl = Controller::new(&LINK, LinkConfig::default());
//! ctrl.on(EventKind::ReceivedData, on_data);
//! ctrl.begin(1)?;
//! ctrl.add_peer(receiver, false)?;
//!
//! // On the worker thread or task:
//! Worker::new(&LINK).run(&mut delay, rclink::consts::WORKER_IDLE_US);
//!
//! // In the main loop:
//! loop {
//!     ctrl.tick(now_ms());
//! }
//! ```
//!
//! ## Integration Notes
//!
//! - The queues use `heapless::mpmc`, which needs compare-and-swap atomics.
//! - A `critical-section` implementation must be linked in (the HAL usually
//!   provides one; tests use the `std` one).

#![deny(
    bad_style,
    dead_code,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    unused,
    while_true,
    missing_debug_implementations,
    missing_docs,
    trivial_casts,
    trivial_numeric_casts,
    unused_extern_crates,
    unused_import_braces,
    unused_qualifications,
    unused_results
)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod macros;

pub use critical_section;
pub use heapless;

pub mod address;
pub mod config;
pub mod consts;
pub mod controller;
pub mod error;
pub mod event;
pub mod frame;
pub mod link;
pub mod pairing;
pub mod queue;
pub mod radio;
pub mod registry;
pub mod worker;

pub use address::{MacAddress, address_to_string, string_to_address};
pub use config::LinkConfig;
pub use controller::Controller;
pub use error::{CursorError, FrameError, LinkError};
pub use event::{Event, EventCallback, EventDispatcher, EventKind};
pub use frame::{Frame, MainCommand};
pub use link::{Link, LinkStats};
pub use pairing::PairingState;
pub use radio::Radio;
pub use registry::Peer;
pub use worker::Worker;
