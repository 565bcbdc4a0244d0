//! Constants used across the link layer.
//!
//! This module defines the protocol-wide limits used for frame sizing,
//! peer bookkeeping, queue depths and the default supervision timings.
//!
//! ## Key Concepts
//!
//! - **Frame limits**: Derived from the radio's maximum frame size (250 bytes)
//!   minus the fixed 2-byte `[main_command, total_length]` header.
//! - **Peer limits**: The radio can address at most [`MAX_PEERS`] peers at once;
//!   the user-configured limit is clamped to this value.
//! - **Queue depths**: The lock-free queues require power-of-two capacities.
//! - **Bounded waits**: Expressed as a number of attempts separated by a short delay,
//!   so no context ever waits indefinitely.
//!
//! Timings are expressed in milliseconds of the host's monotonic clock.

/// Maximum size (in bytes) of one frame on the air, header included.
pub const MAX_FRAME_LEN: usize = 250;

/// Length (in bytes) of the fixed frame header: `main_command` then `total_length`.
pub const FRAME_HEADER_LEN: usize = 2;

/// Maximum number of payload bytes following the header.
pub const MAX_PAYLOAD_LEN: usize = MAX_FRAME_LEN - FRAME_HEADER_LEN;

/// Length (in bytes) of an entry header: `sub_command` then `length`.
pub const ENTRY_HEADER_LEN: usize = 2;

/// Largest value a single entry can carry.
pub const MAX_VALUE_LEN: usize = MAX_PAYLOAD_LEN - ENTRY_HEADER_LEN;

/// Maximum number of entries in one frame, independent of the byte budget.
pub const MAX_ENTRIES: usize = 20;

/// Hardware limit on simultaneously registered peers.
pub const MAX_PEERS: usize = 20;

/// Width of a hardware address in bytes.
pub const ADDRESS_LEN: usize = 6;

/// Length of a formatted address (`AA:BB:CC:DD:EE:FF`).
pub const ADDRESS_STR_LEN: usize = ADDRESS_LEN * 3 - 1;

/// Capacity of the inbound-raw queue (capture context -> worker).
pub const INBOUND_QUEUE_DEPTH: usize = 16;

/// Capacity of the outbound-raw queue (application -> worker -> radio).
pub const OUTBOUND_QUEUE_DEPTH: usize = 16;

/// Capacity of the decoded-results queue (worker -> application).
pub const RESULT_QUEUE_DEPTH: usize = 16;

/// Capacity of the send-outcome queue (transport completion -> application).
pub const OUTCOME_QUEUE_DEPTH: usize = 16;

/// Attempts made by the worker to place a decoded result before dropping it.
pub const RESULT_PUSH_ATTEMPTS: u32 = 10;

/// Delay between two bounded-wait attempts, in microseconds.
pub const RETRY_STEP_US: u32 = 100;

/// Maximum number of items the worker takes from one raw queue per pass.
pub const WORKER_BATCH: usize = 8;

/// Maximum number of decoded results one application tick dispatches.
pub const RESULT_DRAIN_LIMIT: usize = RESULT_QUEUE_DEPTH;

/// Idle delay of the worker loop when both raw queues are empty, in microseconds.
pub const WORKER_IDLE_US: u32 = 1_000;

/// Default heartbeat period.
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u32 = 1_000;

/// Default silence after which a connected peer is declared lost.
pub const DEFAULT_PEER_TIMEOUT_MS: u32 = 3_000;

/// Default window for a pairing handshake to complete.
pub const DEFAULT_PAIRING_TIMEOUT_MS: u32 = 5_000;
