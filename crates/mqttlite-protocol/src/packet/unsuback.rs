use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::ProtocolVersion;
use crate::v5::properties::Properties;
use bytes::{Buf, BufMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnsubAckReasonCode {
    Success = 0x00,
    NoSubscriptionExisted = 0x11,
    UnspecifiedError = 0x80,
    ImplementationSpecificError = 0x83,
    NotAuthorized = 0x87,
    TopicFilterInvalid = 0x8F,
    PacketIdentifierInUse = 0x91,
}

impl UnsubAckReasonCode {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::Success),
            0x11 => Some(Self::NoSubscriptionExisted),
            0x80 => Some(Self::UnspecifiedError),
            0x83 => Some(Self::ImplementationSpecificError),
            0x87 => Some(Self::NotAuthorized),
            0x8F => Some(Self::TopicFilterInvalid),
            0x91 => Some(Self::PacketIdentifierInUse),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (*self as u8) < 0x80
    }
}

/// UNSUBACK. The 3.1.1 variant has no payload at all; an empty
/// `reason_codes` list therefore means blanket success.
#[derive(Debug, Clone)]
pub struct UnsubAckPacket {
    pub packet_id: u16,
    pub reason_codes: Vec<UnsubAckReasonCode>,
    pub properties: Properties,
    pub protocol_version: ProtocolVersion,
}

impl UnsubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16, reason_codes: Vec<UnsubAckReasonCode>) -> Self {
        Self {
            packet_id,
            reason_codes,
            properties: Properties::default(),
            protocol_version: ProtocolVersion::V5,
        }
    }

    #[must_use]
    pub fn new_v311(packet_id: u16) -> Self {
        Self {
            packet_id,
            reason_codes: Vec::new(),
            properties: Properties::default(),
            protocol_version: ProtocolVersion::V311,
        }
    }

    pub fn decode_body_with_version<B: Buf>(
        buf: &mut B,
        _fixed_header: &FixedHeader,
        version: ProtocolVersion,
    ) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "UNSUBACK missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        if packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "UNSUBACK with zero packet identifier".to_string(),
            ));
        }

        let (properties, mut reason_codes) = if version.is_v5() {
            (Properties::decode(buf)?, Vec::with_capacity(buf.remaining()))
        } else {
            (Properties::default(), Vec::new())
        };

        if version.is_v5() {
            while buf.has_remaining() {
                let byte = buf.get_u8();
                let code =
                    UnsubAckReasonCode::from_u8(byte).ok_or(MqttError::InvalidReasonCode(byte))?;
                reason_codes.push(code);
            }
        }

        Ok(Self {
            packet_id,
            reason_codes,
            properties,
            protocol_version: version,
        })
    }
}

impl MqttPacket for UnsubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::UnsubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16(self.packet_id);
        if self.protocol_version.is_v5() {
            self.properties.encode(buf)?;
            for code in &self.reason_codes {
                buf.put_u8(*code as u8);
            }
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        Self::decode_body_with_version(buf, fixed_header, ProtocolVersion::V5)
    }
}
