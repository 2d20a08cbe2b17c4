//! Control packet layer: fixed header, the `MqttPacket` encode/decode
//! trait, and the `Packet` sum type the rest of the engine passes around.

pub mod ack_common;
pub mod connack;
pub mod connect;
pub mod disconnect;
pub mod puback;
pub mod pubcomp;
pub mod publish;
pub mod pubrec;
pub mod pubrel;
pub mod suback;
pub mod subscribe;
pub mod subscribe_options;
pub mod unsuback;
pub mod unsubscribe;

use crate::encoding::{encode_variable_int, VARIABLE_INT_MAX};
use crate::error::{MqttError, Result};
use crate::types::ProtocolVersion;
use bytes::{Buf, BufMut, BytesMut};

pub use connack::ConnAckPacket;
pub use connect::ConnectPacket;
pub use disconnect::DisconnectPacket;
pub use puback::PubAckPacket;
pub use pubcomp::PubCompPacket;
pub use publish::PublishPacket;
pub use pubrec::PubRecPacket;
pub use pubrel::PubRelPacket;
pub use suback::{SubAckPacket, SubAckReasonCode};
pub use subscribe::{SubscribePacket, TopicFilter};
pub use subscribe_options::{RetainHandling, SubscriptionOptions};
pub use unsuback::{UnsubAckPacket, UnsubAckReasonCode};
pub use unsubscribe::UnsubscribePacket;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketType {
    Connect = 1,
    ConnAck = 2,
    Publish = 3,
    PubAck = 4,
    PubRec = 5,
    PubRel = 6,
    PubComp = 7,
    Subscribe = 8,
    SubAck = 9,
    Unsubscribe = 10,
    UnsubAck = 11,
    PingReq = 12,
    PingResp = 13,
    Disconnect = 14,
}

impl PacketType {
    pub fn from_u8(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Connect),
            2 => Ok(Self::ConnAck),
            3 => Ok(Self::Publish),
            4 => Ok(Self::PubAck),
            5 => Ok(Self::PubRec),
            6 => Ok(Self::PubRel),
            7 => Ok(Self::PubComp),
            8 => Ok(Self::Subscribe),
            9 => Ok(Self::SubAck),
            10 => Ok(Self::Unsubscribe),
            11 => Ok(Self::UnsubAck),
            12 => Ok(Self::PingReq),
            13 => Ok(Self::PingResp),
            14 => Ok(Self::Disconnect),
            other => Err(MqttError::InvalidPacketType(other)),
        }
    }

    /// Reserved flag bits the protocol fixes for this packet type.
    /// PUBLISH carries dup/qos/retain in its flags and is not checked here.
    #[must_use]
    pub fn expected_flags(self) -> Option<u8> {
        match self {
            Self::Publish => None,
            Self::PubRel | Self::Subscribe | Self::Unsubscribe => Some(0x02),
            _ => Some(0x00),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedHeader {
    pub packet_type: PacketType,
    pub flags: u8,
    pub remaining_length: u32,
}

impl FixedHeader {
    #[must_use]
    pub fn new(packet_type: PacketType, flags: u8, remaining_length: u32) -> Self {
        Self {
            packet_type,
            flags,
            remaining_length,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(((self.packet_type as u8) << 4) | (self.flags & 0x0F));
        encode_variable_int(buf, self.remaining_length)
    }

    /// Decodes a complete fixed header. Callers that may see partial input
    /// use the incremental decoder instead.
    pub fn decode<B: Buf>(buf: &mut B) -> Result<Self> {
        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "Missing fixed header byte".to_string(),
            ));
        }
        let byte = buf.get_u8();
        let packet_type = PacketType::from_u8(byte >> 4)?;
        let flags = byte & 0x0F;
        let remaining_length = crate::encoding::decode_variable_int(buf)?;
        Ok(Self {
            packet_type,
            flags,
            remaining_length,
        })
    }
}

pub trait MqttPacket: Sized {
    fn packet_type(&self) -> PacketType;

    fn flags(&self) -> u8 {
        0
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()>;

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self>;

    /// Encodes fixed header plus body. The body is staged first so the
    /// remaining-length field is exact.
    fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        let mut body = BytesMut::new();
        self.encode_body(&mut body)?;

        if body.len() > VARIABLE_INT_MAX as usize {
            return Err(MqttError::PacketTooLarge {
                size: body.len(),
                max: VARIABLE_INT_MAX as usize,
            });
        }

        let header = FixedHeader::new(self.packet_type(), self.flags(), body.len() as u32);
        header.encode(buf)?;
        buf.put_slice(&body);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum Packet {
    Connect(Box<ConnectPacket>),
    ConnAck(ConnAckPacket),
    Publish(PublishPacket),
    PubAck(PubAckPacket),
    PubRec(PubRecPacket),
    PubRel(PubRelPacket),
    PubComp(PubCompPacket),
    Subscribe(SubscribePacket),
    SubAck(SubAckPacket),
    Unsubscribe(UnsubscribePacket),
    UnsubAck(UnsubAckPacket),
    PingReq,
    PingResp,
    Disconnect(DisconnectPacket),
}

impl Packet {
    #[must_use]
    pub fn packet_type(&self) -> PacketType {
        match self {
            Packet::Connect(_) => PacketType::Connect,
            Packet::ConnAck(_) => PacketType::ConnAck,
            Packet::Publish(_) => PacketType::Publish,
            Packet::PubAck(_) => PacketType::PubAck,
            Packet::PubRec(_) => PacketType::PubRec,
            Packet::PubRel(_) => PacketType::PubRel,
            Packet::PubComp(_) => PacketType::PubComp,
            Packet::Subscribe(_) => PacketType::Subscribe,
            Packet::SubAck(_) => PacketType::SubAck,
            Packet::Unsubscribe(_) => PacketType::Unsubscribe,
            Packet::UnsubAck(_) => PacketType::UnsubAck,
            Packet::PingReq => PacketType::PingReq,
            Packet::PingResp => PacketType::PingResp,
            Packet::Disconnect(_) => PacketType::Disconnect,
        }
    }

    pub fn encode<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        match self {
            Packet::Connect(p) => p.encode(buf),
            Packet::ConnAck(p) => p.encode(buf),
            Packet::Publish(p) => p.encode(buf),
            Packet::PubAck(p) => p.encode(buf),
            Packet::PubRec(p) => p.encode(buf),
            Packet::PubRel(p) => p.encode(buf),
            Packet::PubComp(p) => p.encode(buf),
            Packet::Subscribe(p) => p.encode(buf),
            Packet::SubAck(p) => p.encode(buf),
            Packet::Unsubscribe(p) => p.encode(buf),
            Packet::UnsubAck(p) => p.encode(buf),
            Packet::PingReq => FixedHeader::new(PacketType::PingReq, 0, 0).encode(buf),
            Packet::PingResp => FixedHeader::new(PacketType::PingResp, 0, 0).encode(buf),
            Packet::Disconnect(p) => p.encode(buf),
        }
    }

    /// Decodes a packet body whose complete bytes are in `buf`. Reserved
    /// flag bits are validated here for every type that fixes them.
    pub fn decode_body<B: Buf>(
        fixed_header: &FixedHeader,
        buf: &mut B,
        version: ProtocolVersion,
    ) -> Result<Self> {
        if let Some(expected) = fixed_header.packet_type.expected_flags() {
            if fixed_header.flags != expected {
                return Err(MqttError::MalformedPacket(format!(
                    "Invalid flags 0x{:02X} for {:?}: expected 0x{expected:02X}",
                    fixed_header.flags, fixed_header.packet_type
                )));
            }
        }

        match fixed_header.packet_type {
            PacketType::Connect => Ok(Packet::Connect(Box::new(ConnectPacket::decode_body(
                buf,
                fixed_header,
            )?))),
            PacketType::ConnAck => Ok(Packet::ConnAck(ConnAckPacket::decode_body_with_version(
                buf,
                fixed_header,
                version,
            )?)),
            PacketType::Publish => Ok(Packet::Publish(PublishPacket::decode_body_with_version(
                buf,
                fixed_header,
                version,
            )?)),
            PacketType::PubAck => Ok(Packet::PubAck(PubAckPacket::decode_body(buf, fixed_header)?)),
            PacketType::PubRec => Ok(Packet::PubRec(PubRecPacket::decode_body(buf, fixed_header)?)),
            PacketType::PubRel => Ok(Packet::PubRel(PubRelPacket::decode_body(buf, fixed_header)?)),
            PacketType::PubComp => Ok(Packet::PubComp(PubCompPacket::decode_body(
                buf,
                fixed_header,
            )?)),
            PacketType::Subscribe => Ok(Packet::Subscribe(
                SubscribePacket::decode_body_with_version(buf, fixed_header, version)?,
            )),
            PacketType::SubAck => Ok(Packet::SubAck(SubAckPacket::decode_body_with_version(
                buf,
                fixed_header,
                version,
            )?)),
            PacketType::Unsubscribe => Ok(Packet::Unsubscribe(
                UnsubscribePacket::decode_body_with_version(buf, fixed_header, version)?,
            )),
            PacketType::UnsubAck => Ok(Packet::UnsubAck(UnsubAckPacket::decode_body_with_version(
                buf,
                fixed_header,
                version,
            )?)),
            PacketType::PingReq => Ok(Packet::PingReq),
            PacketType::PingResp => Ok(Packet::PingResp),
            PacketType::Disconnect => Ok(Packet::Disconnect(
                DisconnectPacket::decode_body_with_version(buf, fixed_header, version)?,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_type_round_trip() {
        for value in 1u8..=14 {
            let packet_type = PacketType::from_u8(value).unwrap();
            assert_eq!(packet_type as u8, value);
        }
        assert!(PacketType::from_u8(0).is_err());
        assert!(PacketType::from_u8(15).is_err());
    }

    #[test]
    fn test_fixed_header_round_trip() {
        let header = FixedHeader::new(PacketType::Publish, 0x0B, 321);
        let mut buf = BytesMut::new();
        header.encode(&mut buf).unwrap();

        let decoded = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(decoded, header);
    }

    #[test]
    fn test_pingreq_encodes_to_two_bytes() {
        let mut buf = BytesMut::new();
        Packet::PingReq.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0xC0, 0x00]);

        let mut buf = BytesMut::new();
        Packet::PingResp.encode(&mut buf).unwrap();
        assert_eq!(&buf[..], &[0xD0, 0x00]);
    }

    #[test]
    fn test_decode_rejects_bad_reserved_flags() {
        let header = FixedHeader::new(PacketType::Subscribe, 0x00, 2);
        let mut buf = BytesMut::new();
        buf.put_u16(1);
        let result = Packet::decode_body(&header, &mut buf, ProtocolVersion::V5);
        assert!(result.is_err());
    }
}
