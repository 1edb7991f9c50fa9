//! Little-endian payload readers and writers.
//!
//! Both are bounded by [`MAX_PAYLOAD`]: the writer refuses to grow past it
//! and the reader reports truncation instead of panicking.

use crate::{MAX_PAYLOAD, ProtocolError};

pub struct PayloadReader<'a> {
    buffer: &'a [u8],
    position: usize,
    op: &'static str,
}

impl<'a> PayloadReader<'a> {
    /// `op` names the message being decoded in truncation errors.
    pub fn new(buffer: &'a [u8], op: &'static str) -> Self {
        Self {
            buffer,
            position: 0,
            op,
        }
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    fn take(&mut self, count: usize) -> Result<&'a [u8], ProtocolError> {
        let end = self.position.saturating_add(count);
        let slice = self
            .buffer
            .get(self.position..end)
            .ok_or(ProtocolError::Truncated {
                op: self.op,
                needed: end,
                available: self.buffer.len(),
            })?;
        self.position = end;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, ProtocolError> {
        let bytes = self.take(1)?;
        Ok(bytes.first().copied().unwrap_or_default())
    }

    pub fn read_u16_le(&mut self) -> Result<u16, ProtocolError> {
        let mut raw = [0u8; 2];
        raw.copy_from_slice(self.take(2)?);
        Ok(u16::from_le_bytes(raw))
    }

    pub fn read_i16_le(&mut self) -> Result<i16, ProtocolError> {
        let mut raw = [0u8; 2];
        raw.copy_from_slice(self.take(2)?);
        Ok(i16::from_le_bytes(raw))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, ProtocolError> {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(raw))
    }

    pub fn read_u64_le(&mut self) -> Result<u64, ProtocolError> {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8)?);
        Ok(u64::from_le_bytes(raw))
    }

    /// Everything not consumed yet.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let rest = self.buffer.get(self.position..).unwrap_or_default();
        self.position = self.buffer.len();
        rest
    }

    pub fn skip(&mut self, count: usize) {
        self.position = self.position.saturating_add(count).min(self.buffer.len());
    }
}

#[derive(Debug, Default, Clone)]
pub struct PayloadWriter {
    buffer: Vec<u8>,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_PAYLOAD),
        }
    }

    fn push(&mut self, bytes: &[u8]) -> Result<&mut Self, ProtocolError> {
        let len = self.buffer.len().saturating_add(bytes.len());
        if len > MAX_PAYLOAD {
            return Err(ProtocolError::PayloadTooLarge {
                len,
                max: MAX_PAYLOAD,
            });
        }
        self.buffer.extend_from_slice(bytes);
        Ok(self)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<&mut Self, ProtocolError> {
        self.push(&[value])
    }

    pub fn write_u16_le(&mut self, value: u16) -> Result<&mut Self, ProtocolError> {
        self.push(&value.to_le_bytes())
    }

    pub fn write_i16_le(&mut self, value: i16) -> Result<&mut Self, ProtocolError> {
        self.push(&value.to_le_bytes())
    }

    pub fn write_u32_le(&mut self, value: u32) -> Result<&mut Self, ProtocolError> {
        self.push(&value.to_le_bytes())
    }

    pub fn write_u64_le(&mut self, value: u64) -> Result<&mut Self, ProtocolError> {
        self.push(&value.to_le_bytes())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> Result<&mut Self, ProtocolError> {
        self.push(data)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
