use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::{ProtocolVersion, QoS};
use crate::v5::properties::Properties;
use bytes::{Buf, BufMut};

/// Per-filter SUBACK result. The 3.1.1 failure byte 0x80 maps onto
/// `UnspecifiedError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAckReasonCode {
    GrantedQoS0 = 0x00,
    GrantedQoS1 = 0x01,
    GrantedQoS2 = 0x02,
    UnspecifiedError = 0x80,
    ImplementationSpecificError = 0x83,
    NotAuthorized = 0x87,
    TopicFilterInvalid = 0x8F,
    PacketIdentifierInUse = 0x91,
    QuotaExceeded = 0x97,
    SharedSubscriptionsNotSupported = 0x9E,
    SubscriptionIdentifiersNotSupported = 0xA1,
    WildcardSubscriptionsNotSupported = 0xA2,
}

impl SubAckReasonCode {
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x00 => Some(Self::GrantedQoS0),
            0x01 => Some(Self::GrantedQoS1),
            0x02 => Some(Self::GrantedQoS2),
            0x80 => Some(Self::UnspecifiedError),
            0x83 => Some(Self::ImplementationSpecificError),
            0x87 => Some(Self::NotAuthorized),
            0x8F => Some(Self::TopicFilterInvalid),
            0x91 => Some(Self::PacketIdentifierInUse),
            0x97 => Some(Self::QuotaExceeded),
            0x9E => Some(Self::SharedSubscriptionsNotSupported),
            0xA1 => Some(Self::SubscriptionIdentifiersNotSupported),
            0xA2 => Some(Self::WildcardSubscriptionsNotSupported),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (*self as u8) < 0x80
    }

    #[must_use]
    pub fn granted_qos(&self) -> Option<QoS> {
        match self {
            Self::GrantedQoS0 => Some(QoS::AtMostOnce),
            Self::GrantedQoS1 => Some(QoS::AtLeastOnce),
            Self::GrantedQoS2 => Some(QoS::ExactlyOnce),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubAckPacket {
    pub packet_id: u16,
    pub reason_codes: Vec<SubAckReasonCode>,
    pub properties: Properties,
    pub protocol_version: ProtocolVersion,
}

impl SubAckPacket {
    #[must_use]
    pub fn new(packet_id: u16, reason_codes: Vec<SubAckReasonCode>) -> Self {
        Self {
            packet_id,
            reason_codes,
            properties: Properties::default(),
            protocol_version: ProtocolVersion::V5,
        }
    }

    pub fn decode_body_with_version<B: Buf>(
        buf: &mut B,
        _fixed_header: &FixedHeader,
        version: ProtocolVersion,
    ) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "SUBACK missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        if packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "SUBACK with zero packet identifier".to_string(),
            ));
        }

        let properties = if version.is_v5() {
            Properties::decode(buf)?
        } else {
            Properties::default()
        };

        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "SUBACK without reason codes".to_string(),
            ));
        }

        let mut reason_codes = Vec::with_capacity(buf.remaining());
        while buf.has_remaining() {
            let byte = buf.get_u8();
            let code =
                SubAckReasonCode::from_u8(byte).ok_or(MqttError::InvalidReasonCode(byte))?;
            reason_codes.push(code);
        }

        Ok(Self {
            packet_id,
            reason_codes,
            properties,
            protocol_version: version,
        })
    }
}

impl MqttPacket for SubAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::SubAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u16(self.packet_id);
        if self.protocol_version.is_v5() {
            self.properties.encode(buf)?;
        }
        for code in &self.reason_codes {
            buf.put_u8(*code as u8);
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        Self::decode_body_with_version(buf, fixed_header, ProtocolVersion::V5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_suback_round_trip() {
        let packet = SubAckPacket::new(
            12,
            vec![
                SubAckReasonCode::GrantedQoS1,
                SubAckReasonCode::NotAuthorized,
            ],
        );

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let header = FixedHeader::decode(&mut buf).unwrap();
        let decoded =
            SubAckPacket::decode_body_with_version(&mut buf, &header, ProtocolVersion::V5).unwrap();
        assert_eq!(decoded.packet_id, 12);
        assert_eq!(decoded.reason_codes.len(), 2);
        assert!(decoded.reason_codes[0].is_success());
        assert_eq!(decoded.reason_codes[0].granted_qos(), Some(QoS::AtLeastOnce));
        assert!(!decoded.reason_codes[1].is_success());
    }

    #[test]
    fn test_suback_v311_body() {
        // packet id + one granted-qos byte, no property block
        let mut buf = BytesMut::new();
        buf.put_u16(4);
        buf.put_u8(0x02);

        let header = FixedHeader::new(PacketType::SubAck, 0, 3);
        let decoded =
            SubAckPacket::decode_body_with_version(&mut buf, &header, ProtocolVersion::V311)
                .unwrap();
        assert_eq!(decoded.packet_id, 4);
        assert_eq!(decoded.reason_codes, vec![SubAckReasonCode::GrantedQoS2]);
    }

    #[test]
    fn test_suback_zero_packet_id_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(0);
        buf.put_u8(0x00);

        let header = FixedHeader::new(PacketType::SubAck, 0, 3);
        assert!(
            SubAckPacket::decode_body_with_version(&mut buf, &header, ProtocolVersion::V311)
                .is_err()
        );
    }

    #[test]
    fn test_suback_empty_reason_codes_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(5);

        let header = FixedHeader::new(PacketType::SubAck, 0, 2);
        assert!(
            SubAckPacket::decode_body_with_version(&mut buf, &header, ProtocolVersion::V311)
                .is_err()
        );
    }
}
