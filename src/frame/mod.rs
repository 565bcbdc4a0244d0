//! Type-Length-Value frame builder and parser.
//!
//! A [`Frame`] is the unit exchanged over the radio. Its wire layout is:
//!
//! ```text
//! byte 0:   main_command   (see MainCommand)
//! byte 1:   total_length   (payload bytes after the header, 0..=248)
//! byte 2..: entries, each  [sub_command, length, value[length]]
//! ```
//!
//! The whole frame never exceeds [`MAX_FRAME_LEN`] bytes and never holds more
//! than [`MAX_ENTRIES`] entries. Typed values are little-endian (see
//! [`Reader`]).
//!
//! ## Lifecycle
//!
//! A frame is *inert* until [`Frame::begin`] or a successful [`Frame::parse`];
//! every accessor of an inert frame returns `None` (or nothing). [`Frame::clear`]
//! returns it to the inert state.
//!
//! ## Building
//!
//! ```rust
//! use rclink::frame::{Frame, MainCommand};
//!
//! let mut frame = Frame::new();
//! frame
//!     .begin(MainCommand::DataResponse)
//!     .add_u8(0x01, 87)
//!     .add_i16(0x02, -300)
//!     .add_f32(0x03, 11.1);
//! assert_eq!(frame.entry_count(), 3);
//! assert_eq!(frame.total_length(), Some(3 + 4 + 6));
//! ```
//!
//! A rejected `add` (frame not begun, size limit, entry limit) is a logged no-op:
//! the frame stays valid and keeps what was already added. Use
//! [`Frame::try_add`] to observe the reason.
//!
//! ## Parsing
//!
//! [`Frame::parse`] rejects input shorter than the header or whose declared
//! length exceeds the bytes supplied. An entry whose declared length runs past
//! the payload ends parsing early: the frame stays valid with the entries read
//! so far, and its length byte is rewritten to cover only those entries.
//!
//! ## Lookup
//!
//! Getters return the **first** entry carrying a sub-command; later duplicates
//! are kept on the wire but cannot be retrieved by command. Typed getters need
//! the stored value to be at least as long as the type and ignore extra bytes.

mod command;
mod cursor;

pub use command::MainCommand;
pub use cursor::{Reader, Record, Writer};

use heapless::Vec;

use crate::consts::{
    ENTRY_HEADER_LEN, FRAME_HEADER_LEN, MAX_ENTRIES, MAX_FRAME_LEN, MAX_PAYLOAD_LEN,
    MAX_VALUE_LEN,
};
use crate::error::FrameError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Slot {
    command: u8,
    offset: u8,
    len: u8,
}

/// One TLV frame, either being built or parsed from received bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Frame {
    buf: Vec<u8, MAX_FRAME_LEN>,
    slots: Vec<Slot, MAX_ENTRIES>,
    valid: bool,
}

impl Frame {
    /// Creates an inert frame.
    pub const fn new() -> Self {
        Self {
            buf: Vec::new(),
            slots: Vec::new(),
            valid: false,
        }
    }

    /// Returns the frame to the inert state.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.slots.clear();
        self.valid = false;
    }

    /// Whether the frame has been begun or successfully parsed.
    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// Starts a new frame with `command` and no entries.
    ///
    /// Any previous content is discarded.
    pub fn begin(&mut self, command: MainCommand) -> &mut Self {
        self.clear();
        self.write_header(command.code());
        self.valid = true;
        self
    }

    /// Appends one entry, reporting why it was rejected.
    ///
    /// The header's length byte is updated immediately so the frame is ready to
    /// send after every successful call.
    pub fn try_add(&mut self, sub_command: u8, value: &[u8]) -> Result<&mut Self, FrameError> {
        if !self.valid {
            return Err(FrameError::NotStarted);
        }
        if value.len() > MAX_VALUE_LEN {
            return Err(FrameError::ValueTooLong);
        }
        if self.slots.is_full() {
            return Err(FrameError::TooManyEntries);
        }
        if self.buf.len() + ENTRY_HEADER_LEN + value.len() > MAX_FRAME_LEN {
            return Err(FrameError::Overflow);
        }
        self.append(sub_command, value);
        Ok(self)
    }

    /// Appends one entry; a rejected entry is logged and otherwise ignored.
    pub fn add(&mut self, sub_command: u8, value: &[u8]) -> &mut Self {
        if let Err(e) = self.try_add(sub_command, value) {
            warn!("entry {} rejected: {}", sub_command, e);
        }
        self
    }

    /// Appends a fixed-size [`Record`].
    pub fn add_record<T: Record>(&mut self, sub_command: u8, value: &T) -> &mut Self {
        let mut scratch = [0u8; MAX_VALUE_LEN];
        let mut w = Writer::new(&mut scratch);
        match value.encode(&mut w) {
            Ok(()) => {
                let n = w.position();
                self.add(sub_command, &scratch[..n])
            }
            Err(e) => {
                warn!("entry {} rejected: {}", sub_command, e);
                self
            }
        }
    }

    /// Appends a `u8` entry.
    pub fn add_u8(&mut self, sub_command: u8, v: u8) -> &mut Self {
        self.add_record(sub_command, &v)
    }

    /// Appends an `i8` entry.
    pub fn add_i8(&mut self, sub_command: u8, v: i8) -> &mut Self {
        self.add_record(sub_command, &v)
    }

    /// Appends a little-endian `u16` entry.
    pub fn add_u16(&mut self, sub_command: u8, v: u16) -> &mut Self {
        self.add_record(sub_command, &v)
    }

    /// Appends a little-endian `i16` entry.
    pub fn add_i16(&mut self, sub_command: u8, v: i16) -> &mut Self {
        self.add_record(sub_command, &v)
    }

    /// Appends a little-endian `u32` entry.
    pub fn add_u32(&mut self, sub_command: u8, v: u32) -> &mut Self {
        self.add_record(sub_command, &v)
    }

    /// Appends a little-endian `i32` entry.
    pub fn add_i32(&mut self, sub_command: u8, v: i32) -> &mut Self {
        self.add_record(sub_command, &v)
    }

    /// Appends a little-endian `f32` entry.
    pub fn add_f32(&mut self, sub_command: u8, v: f32) -> &mut Self {
        self.add_record(sub_command, &v)
    }

    /// Appends a one-byte boolean entry.
    pub fn add_bool(&mut self, sub_command: u8, v: bool) -> &mut Self {
        self.add_record(sub_command, &v)
    }

    /// Appends the UTF-8 bytes of `s`.
    pub fn add_str(&mut self, sub_command: u8, s: &str) -> &mut Self {
        self.add(sub_command, s.as_bytes())
    }

    /// Replaces the content of this frame with the frame encoded in `bytes`.
    ///
    /// Bytes after the declared payload are ignored. On error the frame is left
    /// inert.
    pub fn parse(&mut self, bytes: &[u8]) -> Result<(), FrameError> {
        self.clear();
        if bytes.len() < FRAME_HEADER_LEN {
            return Err(FrameError::TooShort);
        }
        let total = bytes[1] as usize;
        if total > bytes.len() - FRAME_HEADER_LEN {
            return Err(FrameError::LengthMismatch);
        }
        if total > MAX_PAYLOAD_LEN {
            return Err(FrameError::Overflow);
        }

        self.write_header(bytes[0]);
        self.valid = true;

        let payload = &bytes[FRAME_HEADER_LEN..FRAME_HEADER_LEN + total];
        let mut pos = 0;
        while pos < total {
            if self.slots.is_full() {
                debug!("entry limit reached at offset {}, rest dropped", pos);
                break;
            }
            if total - pos < ENTRY_HEADER_LEN {
                debug!("dangling entry header at offset {}", pos);
                break;
            }
            let sub_command = payload[pos];
            let len = payload[pos + 1] as usize;
            let start = pos + ENTRY_HEADER_LEN;
            if start + len > total {
                debug!("entry {} overruns payload, frame truncated", sub_command);
                break;
            }
            self.append(sub_command, &payload[start..start + len]);
            pos = start + len;
        }
        Ok(())
    }

    /// The main command, if the frame is valid.
    pub fn main_command(&self) -> Option<MainCommand> {
        self.raw_command().map(MainCommand::from)
    }

    /// The raw main command byte, if the frame is valid.
    pub fn raw_command(&self) -> Option<u8> {
        if !self.valid {
            return None;
        }
        self.buf.first().copied()
    }

    /// Payload length from the header, if the frame is valid.
    pub fn total_length(&self) -> Option<u8> {
        if !self.valid {
            return None;
        }
        self.buf.get(1).copied()
    }

    /// Number of entries; zero for an inert frame.
    pub fn entry_count(&self) -> usize {
        if self.valid { self.slots.len() } else { 0 }
    }

    /// The encoded frame, ready for the radio.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        if self.valid { Some(&self.buf) } else { None }
    }

    /// The value of the first entry carrying `sub_command`.
    pub fn get(&self, sub_command: u8) -> Option<&[u8]> {
        if !self.valid {
            return None;
        }
        self.slots
            .iter()
            .find(|s| s.command == sub_command)
            .map(|s| self.value(s))
    }

    /// Whether an entry carries `sub_command`.
    pub fn has(&self, sub_command: u8) -> bool {
        self.get(sub_command).is_some()
    }

    /// All entries in arrival order, duplicates included.
    pub fn entries(&self) -> impl Iterator<Item = (u8, &[u8])> + '_ {
        let slots: &[Slot] = if self.valid { &self.slots } else { &[] };
        slots.iter().map(move |s| (s.command, self.value(s)))
    }

    /// Decodes the first entry carrying `sub_command` as a [`Record`].
    ///
    /// Returns `None` if there is no such entry or its value is shorter than
    /// [`Record::SIZE`].
    pub fn get_record<T: Record>(&self, sub_command: u8) -> Option<T> {
        let value = self.get(sub_command)?;
        if value.len() < T::SIZE {
            return None;
        }
        T::decode(&mut Reader::new(value)).ok()
    }

    /// Like [`Frame::get_record`], reporting why the lookup failed.
    pub fn try_get_record<T: Record>(&self, sub_command: u8) -> Result<T, FrameError> {
        if !self.valid {
            return Err(FrameError::Invalid);
        }
        self.get_record(sub_command).ok_or(FrameError::MissingEntry)
    }

    /// Reads a `u8` entry.
    pub fn get_u8(&self, sub_command: u8) -> Option<u8> {
        self.get_record(sub_command)
    }

    /// Reads an `i8` entry.
    pub fn get_i8(&self, sub_command: u8) -> Option<i8> {
        self.get_record(sub_command)
    }

    /// Reads a little-endian `u16` entry.
    pub fn get_u16(&self, sub_command: u8) -> Option<u16> {
        self.get_record(sub_command)
    }

    /// Reads a little-endian `i16` entry.
    pub fn get_i16(&self, sub_command: u8) -> Option<i16> {
        self.get_record(sub_command)
    }

    /// Reads a little-endian `u32` entry.
    pub fn get_u32(&self, sub_command: u8) -> Option<u32> {
        self.get_record(sub_command)
    }

    /// Reads a little-endian `i32` entry.
    pub fn get_i32(&self, sub_command: u8) -> Option<i32> {
        self.get_record(sub_command)
    }

    /// Reads a little-endian `f32` entry.
    pub fn get_f32(&self, sub_command: u8) -> Option<f32> {
        self.get_record(sub_command)
    }

    /// Reads a one-byte boolean entry.
    pub fn get_bool(&self, sub_command: u8) -> Option<bool> {
        self.get_record(sub_command)
    }

    /// Reads an entry as UTF-8 text.
    pub fn get_str(&self, sub_command: u8) -> Option<&str> {
        core::str::from_utf8(self.get(sub_command)?).ok()
    }

    fn write_header(&mut self, command: u8) {
        // The buffer is empty here; two bytes always fit.
        let _ = self.buf.extend_from_slice(&[command, 0]);
    }

    // Callers have checked the byte and entry budgets.
    fn append(&mut self, sub_command: u8, value: &[u8]) {
        let offset = self.buf.len() + ENTRY_HEADER_LEN;
        let _ = self.buf.extend_from_slice(&[sub_command, value.len() as u8]);
        let _ = self.buf.extend_from_slice(value);
        let _ = self.slots.push(Slot {
            command: sub_command,
            offset: offset as u8,
            len: value.len() as u8,
        });
        self.buf[1] = (self.buf.len() - FRAME_HEADER_LEN) as u8;
    }

    fn value(&self, slot: &Slot) -> &[u8] {
        let start = slot.offset as usize;
        &self.buf[start..start + slot.len as usize]
    }
}
