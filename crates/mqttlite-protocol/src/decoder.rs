//! Incremental control-packet decoder. Transport reads of any size are fed
//! in; complete packets come out one at a time. Decoding state survives
//! across feeds, so a fixed header split over three TCP segments parses the
//! same as a single contiguous read.

use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, Packet, PacketType};
use crate::types::ProtocolVersion;
use bytes::{Buf, BytesMut};

/// Default ceiling on a single packet's remaining length. Anything larger
/// is treated as malformed rather than buffered without bound.
pub const DEFAULT_MAX_PACKET_SIZE: u32 = 1024 * 1024;

#[derive(Debug)]
pub struct PacketDecoder {
    buf: BytesMut,
    /// Fixed header of the packet currently being assembled, once complete.
    pending_header: Option<FixedHeader>,
    protocol_version: ProtocolVersion,
    max_packet_size: u32,
}

impl PacketDecoder {
    #[must_use]
    pub fn new(protocol_version: ProtocolVersion) -> Self {
        Self {
            buf: BytesMut::new(),
            pending_header: None,
            protocol_version,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    #[must_use]
    pub fn with_max_packet_size(mut self, max: u32) -> Self {
        self.max_packet_size = max;
        self
    }

    /// The version downgrade switches framing mid-session; the decoder
    /// must only be switched between packets.
    pub fn set_protocol_version(&mut self, version: ProtocolVersion) {
        self.protocol_version = version;
    }

    #[must_use]
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    /// Appends one transport read.
    pub fn feed(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Bytes buffered but not yet consumed as a packet.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Drops all assembly state. Used when a connection is torn down.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.pending_header = None;
    }

    /// Returns the next complete packet, `Ok(None)` when more bytes are
    /// needed. Any error is fatal for the connection: the caller must
    /// close rather than attempt to resynchronize.
    pub fn next_packet(&mut self) -> Result<Option<Packet>> {
        let header = match self.pending_header {
            Some(header) => header,
            None => match self.try_parse_fixed_header()? {
                Some(header) => {
                    self.pending_header = Some(header);
                    header
                }
                None => return Ok(None),
            },
        };

        let body_len = header.remaining_length as usize;
        if self.buf.len() < body_len {
            return Ok(None);
        }

        let mut body = self.buf.split_to(body_len).freeze();
        self.pending_header = None;

        let packet = Packet::decode_body(&header, &mut body, self.protocol_version)?;
        if body.has_remaining() {
            return Err(MqttError::MalformedPacket(format!(
                "{:?} body has {} trailing bytes",
                header.packet_type,
                body.remaining()
            )));
        }
        Ok(Some(packet))
    }

    /// Parses byte 0 plus up to four remaining-length bytes without
    /// consuming anything until the whole header is present.
    fn try_parse_fixed_header(&mut self) -> Result<Option<FixedHeader>> {
        if self.buf.len() < 2 {
            return Ok(None);
        }

        let type_byte = self.buf[0];
        let packet_type = PacketType::from_u8(type_byte >> 4)?;
        let flags = type_byte & 0x0F;

        let mut remaining_length = 0u32;
        let mut header_len = 1;
        loop {
            if header_len >= self.buf.len() {
                // continuation bit set on the last buffered byte
                if header_len > 4 {
                    return Err(MqttError::MalformedPacket(
                        "Remaining length exceeds 4 bytes".to_string(),
                    ));
                }
                return Ok(None);
            }
            let byte = self.buf[header_len];
            remaining_length |= u32::from(byte & 0x7F) << (7 * (header_len - 1));
            header_len += 1;
            if byte & 0x80 == 0 {
                break;
            }
            if header_len > 4 {
                return Err(MqttError::MalformedPacket(
                    "Remaining length exceeds 4 bytes".to_string(),
                ));
            }
        }

        if remaining_length > self.max_packet_size {
            return Err(MqttError::PacketTooLarge {
                size: remaining_length as usize,
                max: self.max_packet_size as usize,
            });
        }

        self.buf.advance(header_len);
        Ok(Some(FixedHeader::new(packet_type, flags, remaining_length)))
    }
}
