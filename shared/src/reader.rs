//! Sequential decoding of the bancho wire format
//!
//! A [`PacketReader`] is a cursor over a byte slice. Every read consumes
//! exactly the bytes of one primitive and fails with [`DecodeError`] instead
//! of returning partial data when the buffer runs short. Packet payloads
//! carry no schema, so callers must read fields in the order the sender
//! wrote them.
//!
//! [`PacketStream`] splits a request body into `(opcode, payload)` frames.

use thiserror::Error;

/// Size of the fixed packet header: u16 opcode, one pad byte, u32 length
pub const HEADER_LEN: usize = 7;

/// Marker byte preceding a non-empty string
pub const STRING_MARKER: u8 = 0x0B;

/// Errors raised while decoding packet data
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of buffer at offset {offset}: needed {needed} bytes, {remaining} left")]
    UnexpectedEof {
        offset: usize,
        needed: usize,
        remaining: usize,
    },
    #[error("string length prefix does not fit in 32 bits")]
    LengthOverflow,
    #[error("invalid value {value} for {field}")]
    InvalidValue { field: &'static str, value: i64 },
}

/// Cursor over an inbound byte buffer
#[derive(Debug, Clone)]
pub struct PacketReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

macro_rules! read_le {
    ($name:ident, $ty:ty) => {
        pub fn $name(&mut self) -> Result<$ty, DecodeError> {
            let bytes = self.take(std::mem::size_of::<$ty>())?;
            let mut raw = [0u8; std::mem::size_of::<$ty>()];
            raw.copy_from_slice(bytes);
            Ok(<$ty>::from_le_bytes(raw))
        }
    };
}

impl<'a> PacketReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current cursor offset from the start of the buffer
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Number of unread bytes
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed: n,
                remaining: self.remaining(),
            });
        }

        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    read_le!(read_u8, u8);
    read_le!(read_i8, i8);
    read_le!(read_u16, u16);
    read_le!(read_i16, i16);
    read_le!(read_u32, u32);
    read_le!(read_i32, i32);
    read_le!(read_u64, u64);
    read_le!(read_i64, i64);
    read_le!(read_f32, f32);
    read_le!(read_f64, f64);

    pub fn read_bool(&mut self) -> Result<bool, DecodeError> {
        Ok(self.read_u8()? != 0)
    }

    /// Reads exactly `n` raw bytes
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        self.take(n)
    }

    /// Consumes and returns everything left in the buffer
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = &self.buf[self.pos..];
        self.pos = self.buf.len();
        rest
    }

    /// Reads an unsigned LEB128 value, capped at 32 bits
    pub fn read_uleb128(&mut self) -> Result<u32, DecodeError> {
        let mut value: u32 = 0;
        let mut shift = 0;

        loop {
            let byte = self.read_u8()?;
            let chunk = u32::from(byte & 0x7F);

            if shift >= 32 || (shift == 28 && chunk > 0x0F) {
                return Err(DecodeError::LengthOverflow);
            }

            value |= chunk << shift;

            if byte & 0x80 == 0 {
                return Ok(value);
            }

            shift += 7;
        }
    }

    /// Reads a bancho string
    ///
    /// `0x0B` is followed by a ULEB128 byte length and UTF-8 data. Any other
    /// marker byte stands for the empty string. Invalid UTF-8 is replaced.
    pub fn read_string(&mut self) -> Result<String, DecodeError> {
        if self.read_u8()? != STRING_MARKER {
            return Ok(String::new());
        }

        let len = self.read_uleb128()? as usize;
        let bytes = self.take(len)?;
        Ok(String::from_utf8_lossy(bytes).into_owned())
    }

    /// Reads an int32 list with a u16 count prefix
    pub fn read_i32_list(&mut self) -> Result<Vec<i32>, DecodeError> {
        let count = self.read_u16()? as usize;

        // Reject oversized counts before allocating
        if self.remaining() < count * 4 {
            return Err(DecodeError::UnexpectedEof {
                offset: self.pos,
                needed: count * 4,
                remaining: self.remaining(),
            });
        }

        (0..count).map(|_| self.read_i32()).collect()
    }
}

/// One framed packet borrowed from a request body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawPacket<'a> {
    pub id: u16,
    pub payload: &'a [u8],
}

impl<'a> RawPacket<'a> {
    pub fn reader(&self) -> PacketReader<'a> {
        PacketReader::new(self.payload)
    }
}

/// Iterator splitting a request body into packets
///
/// Yields `Err` once when a header declares more payload than the body
/// holds, then stops. A trailing fragment shorter than a header ends the
/// stream quietly.
#[derive(Debug)]
pub struct PacketStream<'a> {
    reader: PacketReader<'a>,
    failed: bool,
}

impl<'a> PacketStream<'a> {
    pub fn new(body: &'a [u8]) -> Self {
        Self {
            reader: PacketReader::new(body),
            failed: false,
        }
    }

    fn frame(&mut self) -> Result<RawPacket<'a>, DecodeError> {
        let id = self.reader.read_u16()?;
        self.reader.read_u8()?;
        let len = self.reader.read_u32()? as usize;
        let payload = self.reader.read_bytes(len)?;
        Ok(RawPacket { id, payload })
    }
}

impl<'a> Iterator for PacketStream<'a> {
    type Item = Result<RawPacket<'a>, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.reader.remaining() < HEADER_LEN {
            return None;
        }

        let frame = self.frame();
        if frame.is_err() {
            self.failed = true;
        }

        Some(frame)
    }
}
