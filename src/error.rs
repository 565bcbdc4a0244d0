//! Error types for the frame codec and the link layer.
//!
//! Nothing in this crate is fatal: every error describes an operation that did
//! not happen. The caller decides whether to retry.

/// Failure of a bounds-checked cursor read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum CursorError {
    /// A read needed more bytes than remain in the value.
    #[error("unexpected end of value")]
    UnexpectedEnd,
    /// A write needed more room than remains in the buffer.
    #[error("buffer full")]
    BufferFull,
}

/// Reasons a frame could not be built, parsed or read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FrameError {
    /// `add` was called before `begin`.
    #[error("frame was never begun")]
    NotStarted,
    /// The frame is neither built nor parsed.
    #[error("frame is not valid")]
    Invalid,
    /// Fewer bytes than the 2-byte header were supplied.
    #[error("frame shorter than its header")]
    TooShort,
    /// The declared payload length exceeds the bytes supplied.
    #[error("declared length exceeds available bytes")]
    LengthMismatch,
    /// The entry would push the frame past the radio's frame size.
    #[error("frame size limit exceeded")]
    Overflow,
    /// The frame already holds the maximum number of entries.
    #[error("entry count limit reached")]
    TooManyEntries,
    /// The value is longer than one entry can describe.
    #[error("value too long for one entry")]
    ValueTooLong,
    /// No entry carries the requested sub-command, or its value is too short.
    #[error("no matching entry")]
    MissingEntry,
    /// A typed value could not be encoded or decoded.
    #[error("cursor error: {0}")]
    Cursor(#[from] CursorError),
}

/// Failures of link-layer operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum LinkError {
    /// The link has not been started or was already shut down.
    #[error("link is not running")]
    NotRunning,
    /// `begin` was called twice.
    #[error("link is already running")]
    AlreadyRunning,
    /// The radio refused the request.
    #[error("transport failure")]
    Transport,
    /// The registry is at its configured or hardware limit.
    #[error("peer registry full")]
    RegistryFull,
    /// The address is not registered.
    #[error("unknown peer")]
    UnknownPeer,
    /// The registry lock could not be taken.
    #[error("registry busy")]
    Contended,
    /// The frame to send is not valid.
    #[error("invalid frame")]
    InvalidFrame,
    /// The queue is full; the item was dropped.
    #[error("queue full")]
    QueueFull,
}
