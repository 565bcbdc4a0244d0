//! Bounds-checked cursors for typed entry values.
//!
//! All multi-byte values are stored **little-endian**, whatever the host's
//! native order. Every read and write checks the remaining room first, so a
//! short or truncated value yields a [`CursorError`] instead of a panic.
//!
//! The [`Record`] trait describes fixed-size values that can be packed into one
//! entry. It is implemented for the primitive types used by the typed frame
//! builders and getters, and applications implement it for their own records:
//!
//! ```rust
//! use rclink::frame::{Reader, Record, Writer};
//! use rclink::error::CursorError;
//!
//! struct Stick {
//!     x: i16,
//!     y: i16,
//! }
//!
//! impl Record for Stick {
//!     const SIZE: usize = 4;
//!
//!     fn encode(&self, w: &mut Writer<'_>) -> Result<(), CursorError> {
//!         w.put_i16(self.x)?;
//!         w.put_i16(self.y)
//!     }
//!
//!     fn decode(r: &mut Reader<'_>) -> Result<Self, CursorError> {
//!         Ok(Stick { x: r.i16()?, y: r.i16()? })
//!     }
//! }
//! ```

use crate::error::CursorError;

/// Sequential writer over a caller-provided byte buffer.
#[derive(Debug)]
pub struct Writer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> Writer<'a> {
    /// Creates a writer starting at the beginning of `buf`.
    pub fn new(buf: &'a mut [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of bytes written so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Room left in the buffer.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// The bytes written so far.
    pub fn written(&self) -> &[u8] {
        &self.buf[..self.pos]
    }

    /// Appends raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), CursorError> {
        if bytes.len() > self.remaining() {
            return Err(CursorError::BufferFull);
        }
        self.buf[self.pos..self.pos + bytes.len()].copy_from_slice(bytes);
        self.pos += bytes.len();
        Ok(())
    }

    /// Appends a `u8`.
    pub fn put_u8(&mut self, v: u8) -> Result<(), CursorError> {
        self.put_bytes(&[v])
    }

    /// Appends an `i8`.
    pub fn put_i8(&mut self, v: i8) -> Result<(), CursorError> {
        self.put_bytes(&v.to_le_bytes())
    }

    /// Appends a `u16`, little-endian.
    pub fn put_u16(&mut self, v: u16) -> Result<(), CursorError> {
        self.put_bytes(&v.to_le_bytes())
    }

    /// Appends an `i16`, little-endian.
    pub fn put_i16(&mut self, v: i16) -> Result<(), CursorError> {
        self.put_bytes(&v.to_le_bytes())
    }

    /// Appends a `u32`, little-endian.
    pub fn put_u32(&mut self, v: u32) -> Result<(), CursorError> {
        self.put_bytes(&v.to_le_bytes())
    }

    /// Appends an `i32`, little-endian.
    pub fn put_i32(&mut self, v: i32) -> Result<(), CursorError> {
        self.put_bytes(&v.to_le_bytes())
    }

    /// Appends an IEEE-754 `f32`, little-endian.
    pub fn put_f32(&mut self, v: f32) -> Result<(), CursorError> {
        self.put_bytes(&v.to_le_bytes())
    }

    /// Appends a `bool` as one byte (`0` or `1`).
    pub fn put_bool(&mut self, v: bool) -> Result<(), CursorError> {
        self.put_u8(v as u8)
    }
}

/// Sequential reader over an entry value.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Creates a reader starting at the beginning of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Bytes not read yet.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Takes the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], CursorError> {
        if n > self.remaining() {
            return Err(CursorError::UnexpectedEnd);
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N], CursorError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    /// Reads a `u8`.
    pub fn u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.array::<1>()?[0])
    }

    /// Reads an `i8`.
    pub fn i8(&mut self) -> Result<i8, CursorError> {
        Ok(i8::from_le_bytes(self.array()?))
    }

    /// Reads a little-endian `u16`.
    pub fn u16(&mut self) -> Result<u16, CursorError> {
        Ok(u16::from_le_bytes(self.array()?))
    }

    /// Reads a little-endian `i16`.
    pub fn i16(&mut self) -> Result<i16, CursorError> {
        Ok(i16::from_le_bytes(self.array()?))
    }

    /// Reads a little-endian `u32`.
    pub fn u32(&mut self) -> Result<u32, CursorError> {
        Ok(u32::from_le_bytes(self.array()?))
    }

    /// Reads a little-endian `i32`.
    pub fn i32(&mut self) -> Result<i32, CursorError> {
        Ok(i32::from_le_bytes(self.array()?))
    }

    /// Reads a little-endian IEEE-754 `f32`.
    pub fn f32(&mut self) -> Result<f32, CursorError> {
        Ok(f32::from_le_bytes(self.array()?))
    }

    /// Reads a `bool`; any non-zero byte is `true`.
    pub fn bool(&mut self) -> Result<bool, CursorError> {
        Ok(self.u8()? != 0)
    }
}

/// A fixed-size value that fits in one frame entry.
pub trait Record: Sized {
    /// Encoded size in bytes. Getters reject values shorter than this.
    const SIZE: usize;

    /// Writes the value.
    fn encode(&self, w: &mut Writer<'_>) -> Result<(), CursorError>;

    /// Reads the value. Bytes past [`Record::SIZE`] are ignored by the caller.
    fn decode(r: &mut Reader<'_>) -> Result<Self, CursorError>;
}

macro_rules! primitive_record {
    ($ty:ty, $size:expr, $put:ident, $get:ident) => {
        impl Record for $ty {
            const SIZE: usize = $size;

            fn encode(&self, w: &mut Writer<'_>) -> Result<(), CursorError> {
                w.$put(*self)
            }

            fn decode(r: &mut Reader<'_>) -> Result<Self, CursorError> {
                r.$get()
            }
        }
    };
}

primitive_record!(u8, 1, put_u8, u8);
primitive_record!(i8, 1, put_i8, i8);
primitive_record!(u16, 2, put_u16, u16);
primitive_record!(i16, 2, put_i16, i16);
primitive_record!(u32, 4, put_u32, u32);
primitive_record!(i32, 4, put_i32, i32);
primitive_record!(f32, 4, put_f32, f32);
primitive_record!(bool, 1, put_bool, bool);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_are_little_endian() {
        let mut buf = [0u8; 8];
        let mut w = Writer::new(&mut buf);
        w.put_u16(0x1234).unwrap();
        w.put_i32(-2).unwrap();
        assert_eq!(w.position(), 6);
        assert_eq!(w.written(), &[0x34, 0x12, 0xfe, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn test_writer_rejects_overflow() {
        let mut buf = [0u8; 3];
        let mut w = Writer::new(&mut buf);
        w.put_u16(1).unwrap();
        assert_eq!(w.put_u16(2), Err(CursorError::BufferFull));
        assert_eq!(w.position(), 2);
    }

    #[test]
    fn test_reader_rejects_short_values() {
        let mut r = Reader::new(&[0x01, 0x02, 0x03]);
        assert_eq!(r.u16(), Ok(0x0201));
        assert_eq!(r.u16(), Err(CursorError::UnexpectedEnd));
        // The failed read consumed nothing.
        assert_eq!(r.u8(), Ok(0x03));
    }

    #[test]
    fn test_float_bits_survive() {
        let mut buf = [0u8; 4];
        let mut w = Writer::new(&mut buf);
        w.put_f32(-12.625).unwrap();
        let mut r = Reader::new(&buf);
        assert_eq!(r.f32(), Ok(-12.625));
    }
}
