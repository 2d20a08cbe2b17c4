use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::{ProtocolVersion, QoS};
use crate::v5::properties::Properties;
use bytes::{Buf, BufMut};

pub use super::subscribe_options::{RetainHandling, SubscriptionOptions};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicFilter {
    pub filter: String,
    pub options: SubscriptionOptions,
}

impl TopicFilter {
    #[must_use]
    pub fn new(filter: impl Into<String>, qos: QoS) -> Self {
        Self {
            filter: filter.into(),
            options: SubscriptionOptions::new(qos),
        }
    }

    #[must_use]
    pub fn with_options(filter: impl Into<String>, options: SubscriptionOptions) -> Self {
        Self {
            filter: filter.into(),
            options,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<TopicFilter>,
    pub properties: Properties,
    pub protocol_version: ProtocolVersion,
}

impl SubscribePacket {
    #[must_use]
    pub fn new(packet_id: u16, protocol_version: ProtocolVersion) -> Self {
        Self {
            packet_id,
            filters: Vec::new(),
            properties: Properties::default(),
            protocol_version,
        }
    }

    #[must_use]
    pub fn add_filter(mut self, filter: impl Into<String>, qos: QoS) -> Self {
        self.filters.push(TopicFilter::new(filter, qos));
        self
    }

    #[must_use]
    pub fn add_filter_with_options(mut self, filter: TopicFilter) -> Self {
        self.filters.push(filter);
        self
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn decode_body_with_version<B: Buf>(
        buf: &mut B,
        fixed_header: &FixedHeader,
        version: ProtocolVersion,
    ) -> Result<Self> {
        if fixed_header.flags != 0x02 {
            return Err(MqttError::MalformedPacket(format!(
                "Invalid SUBSCRIBE flags: expected 0x02, got 0x{:02X}",
                fixed_header.flags
            )));
        }

        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        if packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE with zero packet identifier".to_string(),
            ));
        }

        let properties = if version.is_v5() {
            Properties::decode(buf)?
        } else {
            Properties::default()
        };

        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "SUBSCRIBE without topic filters".to_string(),
            ));
        }

        let mut filters = Vec::new();
        while buf.has_remaining() {
            let filter = decode_string(buf)?;
            if !buf.has_remaining() {
                return Err(MqttError::MalformedPacket(
                    "Missing subscription options for topic filter".to_string(),
                ));
            }
            let options_byte = buf.get_u8();
            let options = if version.is_v5() {
                SubscriptionOptions::decode(options_byte)?
            } else {
                SubscriptionOptions::new(QoS::try_from_u8(options_byte & 0x03)?)
            };
            filters.push(TopicFilter { filter, options });
        }

        Ok(Self {
            packet_id,
            filters,
            properties,
            protocol_version: version,
        })
    }
}

impl MqttPacket for SubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Subscribe
    }

    fn flags(&self) -> u8 {
        0x02
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.filters.is_empty() {
            return Err(MqttError::ProtocolError(
                "SUBSCRIBE requires at least one topic filter".to_string(),
            ));
        }

        buf.put_u16(self.packet_id);

        if self.protocol_version.is_v5() {
            self.properties.encode(buf)?;
        }

        for filter in &self.filters {
            encode_string(buf, &filter.filter)?;
            if self.protocol_version.is_v5() {
                buf.put_u8(filter.options.encode());
            } else {
                buf.put_u8(filter.options.qos as u8);
            }
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
    use crate::v5::properties::PropertyId;
    use bytes::BytesMut;

    #[test]
    fn test_subscribe_round_trip() {
        let mut props = Properties::default();
        props.set_subscription_identifier(42);

        let packet = SubscribePacket::new(789, ProtocolVersion::V5)
            .add_filter("sensor/temp", QoS::AtMostOnce)
            .add_filter("sensor/humidity", QoS::AtLeastOnce)
            .with_properties(props);

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let header = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(header.packet_type, PacketType::Subscribe);
        assert_eq!(header.flags, 0x02);

        let decoded =
            SubscribePacket::decode_body_with_version(&mut buf, &header, ProtocolVersion::V5)
                .unwrap();
        assert_eq!(decoded.packet_id, 789);
        assert_eq!(decoded.filters.len(), 2);
        assert_eq!(decoded.filters[0].filter, "sensor/temp");
        assert_eq!(decoded.filters[1].options.qos, QoS::AtLeastOnce);
        assert_eq!(
            decoded.properties.get(PropertyId::SubscriptionIdentifier),
            packet.properties.get(PropertyId::SubscriptionIdentifier)
        );
    }

    #[test]
    fn test_subscribe_v311_plain_qos_byte() {
        let packet = SubscribePacket::new(3, ProtocolVersion::V311)
            .add_filter_with_options(TopicFilter::with_options(
                "t",
                SubscriptionOptions::new(QoS::ExactlyOnce).with_no_local(true),
            ));

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let header = FixedHeader::decode(&mut buf).unwrap();
        let decoded =
            SubscribePacket::decode_body_with_version(&mut buf, &header, ProtocolVersion::V311)
                .unwrap();
        // no_local is a v5 concept and is not carried on the 3.1.1 wire
        assert!(!decoded.filters[0].options.no_local);
        assert_eq!(decoded.filters[0].options.qos, QoS::ExactlyOnce);
    }

    #[test]
    fn test_subscribe_empty_filters_fails_encode() {
        let packet = SubscribePacket::new(123, ProtocolVersion::V5);
        let mut buf = BytesMut::new();
        assert!(packet.encode(&mut buf).is_err());
    }

    #[test]
    fn test_subscribe_invalid_flags() {
        let mut buf = BytesMut::new();
        buf.put_u16(123);

        let header = FixedHeader::new(PacketType::Subscribe, 0x00, 2);
        assert!(
            SubscribePacket::decode_body_with_version(&mut buf, &header, ProtocolVersion::V5)
                .is_err()
        );
    }
}
