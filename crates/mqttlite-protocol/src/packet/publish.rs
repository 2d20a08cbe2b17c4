use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::{ProtocolVersion, QoS};
use crate::v5::properties::Properties;
use bytes::{Buf, BufMut, Bytes};

/// PUBLISH in either direction. `packet_id` is present exactly when
/// `qos > 0`; a topic may be empty on the wire only when a v5 topic alias
/// is carried in the properties.
#[derive(Debug, Clone)]
pub struct PublishPacket {
    pub topic_name: String,
    pub packet_id: Option<u16>,
    pub payload: Bytes,
    pub qos: QoS,
    pub retain: bool,
    pub dup: bool,
    pub properties: Properties,
    pub protocol_version: ProtocolVersion,
}

impl PublishPacket {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>, qos: QoS) -> Self {
        Self {
            topic_name: topic.into(),
            packet_id: None,
            payload: payload.into(),
            qos,
            retain: false,
            dup: false,
            properties: Properties::default(),
            protocol_version: ProtocolVersion::V5,
        }
    }

    #[must_use]
    pub fn with_packet_id(mut self, packet_id: u16) -> Self {
        self.packet_id = Some(packet_id);
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }

    #[must_use]
    pub fn with_dup(mut self, dup: bool) -> Self {
        self.dup = dup;
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    #[must_use]
    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn decode_body_with_version<B: Buf>(
        buf: &mut B,
        fixed_header: &FixedHeader,
        version: ProtocolVersion,
    ) -> Result<Self> {
        let flags = fixed_header.flags;
        let dup = flags & 0x08 != 0;
        let qos = QoS::try_from_u8((flags >> 1) & 0x03)
            .map_err(|_| MqttError::MalformedPacket("PUBLISH with QoS 3".to_string()))?;
        let retain = flags & 0x01 != 0;

        let topic_name = decode_string(buf)?;

        let packet_id = if qos == QoS::AtMostOnce {
            None
        } else {
            if buf.remaining() < 2 {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH missing packet identifier".to_string(),
                ));
            }
            let id = buf.get_u16();
            if id == 0 {
                return Err(MqttError::MalformedPacket(
                    "PUBLISH with zero packet identifier".to_string(),
                ));
            }
            Some(id)
        };

        let properties = if version.is_v5() {
            Properties::decode(buf)?
        } else {
            Properties::default()
        };

        if topic_name.is_empty() && properties.topic_alias().is_none() {
            return Err(MqttError::MalformedPacket(
                "PUBLISH with empty topic and no topic alias".to_string(),
            ));
        }

        let payload = buf.copy_to_bytes(buf.remaining());

        Ok(Self {
            topic_name,
            packet_id,
            payload,
            qos,
            retain,
            dup,
            properties,
            protocol_version: version,
        })
    }
}

impl MqttPacket for PublishPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Publish
    }

    fn flags(&self) -> u8 {
        let mut flags = (self.qos as u8) << 1;
        if self.dup {
            flags |= 0x08;
        }
        if self.retain {
            flags |= 0x01;
        }
        flags
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, &self.topic_name)?;

        if self.qos != QoS::AtMostOnce {
            let id = self.packet_id.ok_or_else(|| {
                MqttError::ProtocolError("QoS>0 PUBLISH without packet identifier".to_string())
            })?;
            buf.put_u16(id);
        }

        if self.protocol_version.is_v5() {
            self.properties.encode(buf)?;
        }

        buf.put_slice(&self.payload);
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
    fn test_publish_qos0_round_trip() {
        let packet = PublishPacket::new("sensors/temp", &b"21.5"[..], QoS::AtMostOnce);

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let header = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(header.packet_type, PacketType::Publish);
        assert_eq!(header.flags, 0x00);

        let decoded =
            PublishPacket::decode_body_with_version(&mut buf, &header, ProtocolVersion::V5)
                .unwrap();
        assert_eq!(decoded.topic_name, "sensors/temp");
        assert_eq!(decoded.payload.as_ref(), b"21.5");
        assert_eq!(decoded.qos, QoS::AtMostOnce);
        assert!(decoded.packet_id.is_none());
    }

    #[test]
    fn test_publish_qos1_retain_flags() {
        let packet = PublishPacket::new("t", &b"hi"[..], QoS::AtLeastOnce)
            .with_packet_id(7)
            .with_retain(true);

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let header = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(header.flags, 0x03);

        let decoded =
            PublishPacket::decode_body_with_version(&mut buf, &header, ProtocolVersion::V5)
                .unwrap();
        assert_eq!(decoded.packet_id, Some(7));
        assert!(decoded.retain);
        assert!(!decoded.dup);
    }

    #[test]
    fn test_publish_v311_skips_properties() {
        let packet = PublishPacket::new("t", &b"x"[..], QoS::AtMostOnce)
            .with_protocol_version(ProtocolVersion::V311);

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let header = FixedHeader::decode(&mut buf).unwrap();
        let decoded =
            PublishPacket::decode_body_with_version(&mut buf, &header, ProtocolVersion::V311)
                .unwrap();
        assert_eq!(decoded.payload.as_ref(), b"x");
        assert!(decoded.properties.is_empty());
    }

    #[test]
    fn test_publish_qos_without_packet_id_fails_encode() {
        let packet = PublishPacket::new("t", &b"x"[..], QoS::AtLeastOnce);
        let mut buf = BytesMut::new();
        assert!(packet.encode(&mut buf).is_err());
    }

    #[test]
    fn test_publish_zero_packet_id_rejected() {
        let mut body = BytesMut::new();
        encode_string(&mut body, "t").unwrap();
        body.put_u16(0);
        body.put_u8(0); // empty property block

        let header = FixedHeader::new(PacketType::Publish, 0x02, body.len() as u32);
        let result =
            PublishPacket::decode_body_with_version(&mut body, &header, ProtocolVersion::V5);
        assert!(result.is_err());
    }

    #[test]
    fn test_publish_topic_longer_than_body_rejected() {
        let mut body = BytesMut::new();
        body.put_u16(50);
        body.put_slice(b"short");

        let header = FixedHeader::new(PacketType::Publish, 0x00, body.len() as u32);
        let result =
            PublishPacket::decode_body_with_version(&mut body, &header, ProtocolVersion::V5);
        assert!(result.is_err());
    }

    #[test]
    fn test_publish_qos3_rejected() {
        let mut body = BytesMut::new();
        encode_string(&mut body, "t").unwrap();

        let header = FixedHeader::new(PacketType::Publish, 0x06, body.len() as u32);
        let result =
            PublishPacket::decode_body_with_version(&mut body, &header, ProtocolVersion::V5);
        assert!(result.is_err());
    }

    #[test]
    fn test_publish_alias_only_topic() {
        let mut props = Properties::default();
        props.set_topic_alias(3);
        let packet = PublishPacket::new("", &b"data"[..], QoS::AtMostOnce).with_properties(props);

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let header = FixedHeader::decode(&mut buf).unwrap();
        let decoded =
            PublishPacket::decode_body_with_version(&mut buf, &header, ProtocolVersion::V5)
                .unwrap();
        assert_eq!(decoded.topic_name, "");
        assert_eq!(decoded.properties.topic_alias(), Some(3));
    }
}
