//! Bounds-checked payload encoding and decoding
//!
//! BGAPI payloads are packed little-endian fields with no padding.
//! A corrupted length byte can pass the frame-level `<= 64` check and
//! still truncate the payload relative to its schema, so every field
//! read here fails typed instead of reading out of bounds.

use crate::frame::Payload;
use crate::types::BdAddr;

/// Payload did not match the schema being decoded.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("payload truncated: needed {needed} more byte(s) at offset {offset}")]
    Truncated { offset: usize, needed: usize },
    #[error("uuid field of {len} bytes is neither 2-byte nor 16-byte form")]
    BadUuidLength { len: usize },
}

// ----------------------------------------------------------------------------
// Reader
// ----------------------------------------------------------------------------

/// Sequential little-endian reader over a payload slice.
#[derive(Debug)]
pub struct PayloadReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> PayloadReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < n {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: n - self.remaining(),
            });
        }
        let slice = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    pub fn i8(&mut self) -> Result<i8, DecodeError> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn u16_le(&mut self) -> Result<u16, DecodeError> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn bd_addr(&mut self) -> Result<BdAddr, DecodeError> {
        let b = self.take(6)?;
        let mut raw = [0u8; 6];
        raw.copy_from_slice(b);
        Ok(BdAddr::from_wire(raw))
    }

    /// A `uint8array` field: one length byte followed by that many bytes.
    pub fn u8_array(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.u8()? as usize;
        self.take(len)
    }

    /// Everything left in the payload.
    pub fn rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        slice
    }
}

// ----------------------------------------------------------------------------
// Writer
// ----------------------------------------------------------------------------

/// Sequential little-endian writer building a command payload.
#[derive(Debug, Default)]
pub struct PayloadWriter {
    buf: Payload,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(mut self, v: u8) -> Self {
        self.buf.push(v);
        self
    }

    pub fn u16_le(mut self, v: u16) -> Self {
        self.buf.extend_from_slice(&v.to_le_bytes());
        self
    }

    pub fn bd_addr(mut self, addr: BdAddr) -> Self {
        self.buf.extend_from_slice(&addr.to_wire());
        self
    }

    /// A `uint8array` field: length byte then contents.
    pub fn u8_array(mut self, bytes: &[u8]) -> Self {
        self.buf.push(bytes.len() as u8);
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn finish(self) -> Payload {
        self.buf
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
