//! Outbound staging buffer. A whole control packet is either appended or
//! refused up front; partially written packets never reach the buffer.
//! QoS>0 publishes snapshot their staged byte range for byte-exact
//! retransmission.

use crate::error::{MqttError, Result};
use crate::packet::Packet;
use bytes::{BufMut, Bytes, BytesMut};
use std::ops::Range;

#[derive(Debug)]
pub struct OutputBuffer {
    buf: BytesMut,
    capacity: usize,
}

impl OutputBuffer {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(capacity),
            capacity,
        }
    }

    /// Whether `n` more bytes fit. Callers reserve space for a complete
    /// packet before encoding any byte of it.
    #[must_use]
    pub fn check_space(&self, n: usize) -> bool {
        self.buf.len() + n <= self.capacity
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Current write position; the start marker for a snapshot range.
    #[must_use]
    pub fn mark(&self) -> usize {
        self.buf.len()
    }

    pub fn append_u8(&mut self, value: u8) -> Result<()> {
        self.ensure_space(1)?;
        self.buf.put_u8(value);
        Ok(())
    }

    pub fn append_u16(&mut self, value: u16) -> Result<()> {
        self.ensure_space(2)?;
        self.buf.put_u16(value);
        Ok(())
    }

    pub fn append_u32(&mut self, value: u32) -> Result<()> {
        self.ensure_space(4)?;
        self.buf.put_u32(value);
        Ok(())
    }

    pub fn append_slice(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_space(data.len())?;
        self.buf.put_slice(data);
        Ok(())
    }

    /// Length-prefixed UTF-8 string, as used throughout the wire format.
    pub fn append_string(&mut self, s: &str) -> Result<()> {
        if s.len() > usize::from(u16::MAX) {
            return Err(MqttError::StringTooLong(s.len()));
        }
        self.ensure_space(2 + s.len())?;
        self.buf.put_u16(s.len() as u16);
        self.buf.put_slice(s.as_bytes());
        Ok(())
    }

    /// Encodes a whole packet, refusing atomically when it does not fit.
    /// Returns the staged byte range for retransmission snapshots.
    pub fn append_packet(&mut self, packet: &Packet) -> Result<Range<usize>> {
        let mut staged = BytesMut::new();
        packet.encode(&mut staged)?;

        if !self.check_space(staged.len()) {
            return Err(MqttError::BufferFull {
                needed: staged.len(),
                available: self.capacity - self.buf.len(),
            });
        }

        let start = self.buf.len();
        self.buf.put_slice(&staged);
        Ok(start..self.buf.len())
    }

    /// Copies a staged byte range out, for a pending request's
    /// retransmission info. Valid until the next `take`/`clear`.
    #[must_use]
    pub fn snapshot(&self, range: Range<usize>) -> Bytes {
        Bytes::copy_from_slice(&self.buf[range])
    }

    /// Hands all staged bytes to the transport and resets the buffer.
    pub fn take(&mut self) -> Bytes {
        self.buf.split().freeze()
    }

    /// Discards all staged-but-unsent bytes (downgrade and teardown).
    pub fn clear(&mut self) {
        self.buf.clear();
    }

    fn ensure_space(&self, n: usize) -> Result<()> {
        if self.check_space(n) {
            Ok(())
        } else {
            Err(MqttError::BufferFull {
                needed: n,
                available: self.capacity - self.buf.len(),
            })
        }
    }
}
