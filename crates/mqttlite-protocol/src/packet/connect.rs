use crate::encoding::{decode_binary, decode_string, encode_binary, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::{ConnectOptions, ConnectProperties, ProtocolVersion, QoS, WillMessage};
use crate::v5::properties::Properties;
use bytes::{Buf, BufMut};
use std::time::Duration;

const PROTOCOL_NAME: &str = "MQTT";

const FLAG_CLEAN_START: u8 = 0x02;
const FLAG_WILL: u8 = 0x04;
const FLAG_WILL_RETAIN: u8 = 0x20;
const FLAG_PASSWORD: u8 = 0x40;
const FLAG_USERNAME: u8 = 0x80;

/// CONNECT, framed at protocol level 4 or 5 depending on
/// `protocol_version`. The downgrade path re-encodes the same options at
/// level 4.
#[derive(Debug, Clone)]
pub struct ConnectPacket {
    pub options: ConnectOptions,
    pub protocol_version: ProtocolVersion,
}

impl ConnectPacket {
    #[must_use]
    pub fn new(options: ConnectOptions, protocol_version: ProtocolVersion) -> Self {
        Self {
            options,
            protocol_version,
        }
    }

    fn connect_flags(&self) -> u8 {
        let mut flags = 0;
        if self.options.clean_start {
            flags |= FLAG_CLEAN_START;
        }
        if let Some(ref will) = self.options.will {
            flags |= FLAG_WILL;
            flags |= (will.qos as u8) << 3;
            if will.retain {
                flags |= FLAG_WILL_RETAIN;
            }
        }
        if self.options.username.is_some() {
            flags |= FLAG_USERNAME;
        }
        if self.options.password.is_some() {
            flags |= FLAG_PASSWORD;
        }
        flags
    }
}

impl MqttPacket for ConnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Connect
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        encode_string(buf, PROTOCOL_NAME)?;
        buf.put_u8(self.protocol_version.as_u8());
        buf.put_u8(self.connect_flags());
        buf.put_u16(self.options.keep_alive_secs());

        if self.protocol_version.is_v5() {
            self.options.properties.to_properties().encode(buf)?;
        }

        encode_string(buf, &self.options.client_id)?;

        if let Some(ref will) = self.options.will {
            if self.protocol_version.is_v5() {
                will.properties.to_properties().encode(buf)?;
            }
            encode_string(buf, &will.topic)?;
            encode_binary(buf, &will.payload)?;
        }

        if let Some(ref username) = self.options.username {
            encode_string(buf, username)?;
        }
        if let Some(ref password) = self.options.password {
            encode_binary(buf, password)?;
        }

        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, _fixed_header: &FixedHeader) -> Result<Self> {
        let protocol_name = decode_string(buf)?;
        if protocol_name != PROTOCOL_NAME {
            return Err(MqttError::MalformedPacket(format!(
                "Unexpected protocol name: {protocol_name}"
            )));
        }

        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "CONNECT missing protocol level".to_string(),
            ));
        }
        let protocol_version = ProtocolVersion::try_from(buf.get_u8())
            .map_err(|()| MqttError::UnsupportedProtocolVersion)?;

        if buf.remaining() < 3 {
            return Err(MqttError::MalformedPacket(
                "CONNECT missing flags and keep-alive".to_string(),
            ));
        }
        let flags = buf.get_u8();
        let keep_alive = buf.get_u16();

        let properties = if protocol_version.is_v5() {
            ConnectProperties::from_properties(&Properties::decode(buf)?)
        } else {
            ConnectProperties::default()
        };

        let client_id = decode_string(buf)?;

        let will = if flags & FLAG_WILL != 0 {
            let will_properties = if protocol_version.is_v5() {
                Properties::decode(buf)?
            } else {
                Properties::default()
            };
            let topic = decode_string(buf)?;
            let payload = decode_binary(buf)?;
            let mut will = WillMessage::new(topic, payload.to_vec())
                .with_qos(QoS::try_from_u8((flags >> 3) & 0x03)?)
                .with_retain(flags & FLAG_WILL_RETAIN != 0);
            will.properties.user_properties = will_properties.user_properties();
            Some(will)
        } else {
            None
        };

        let username = if flags & FLAG_USERNAME != 0 {
            Some(decode_string(buf)?)
        } else {
            None
        };
        let password = if flags & FLAG_PASSWORD != 0 {
            Some(decode_binary(buf)?.to_vec())
        } else {
            None
        };

        let options = ConnectOptions {
            client_id,
            keep_alive: Duration::from_secs(u64::from(keep_alive)),
            clean_start: flags & FLAG_CLEAN_START != 0,
            username,
            password,
            will,
            properties,
        };

        Ok(Self {
            options,
            protocol_version,
        })
    }
}

impl ConnectProperties {
    #[must_use]
    pub fn from_properties(props: &Properties) -> Self {
        Self {
            session_expiry_interval: props.session_expiry_interval(),
            receive_maximum: props.receive_maximum(),
            maximum_packet_size: props.maximum_packet_size(),
            topic_alias_maximum: props.topic_alias_maximum(),
            request_response_information: None,
            request_problem_information: None,
            user_properties: props.user_properties(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BytesMut;

    #[test]
    fn test_connect_v5_round_trip() {
        let options = ConnectOptions::new("dev1")
            .with_keep_alive(Duration::from_secs(120))
            .with_credentials("user", "secret")
            .with_session_expiry_interval(600)
            .with_topic_alias_maximum(4);
        let packet = ConnectPacket::new(options, ProtocolVersion::V5);

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let header = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(header.packet_type, PacketType::Connect);

        let decoded = ConnectPacket::decode_body(&mut buf, &header).unwrap();
        assert_eq!(decoded.protocol_version, ProtocolVersion::V5);
        assert_eq!(decoded.options.client_id, "dev1");
        assert_eq!(decoded.options.keep_alive_secs(), 120);
        assert_eq!(decoded.options.username.as_deref(), Some("user"));
        assert_eq!(decoded.options.password.as_deref(), Some(b"secret".as_ref()));
        assert_eq!(decoded.options.properties.session_expiry_interval, Some(600));
        assert_eq!(decoded.options.properties.topic_alias_maximum, Some(4));
    }

    #[test]
    fn test_connect_v311_has_no_property_block() {
        let options = ConnectOptions::new("dev1").with_keep_alive(Duration::from_secs(60));
        let v5_len = {
            let mut buf = BytesMut::new();
            ConnectPacket::new(options.clone(), ProtocolVersion::V5)
                .encode(&mut buf)
                .unwrap();
            buf.len()
        };
        let v311_len = {
            let mut buf = BytesMut::new();
            ConnectPacket::new(options.clone(), ProtocolVersion::V311)
                .encode(&mut buf)
                .unwrap();
            buf.len()
        };
        // v5 carries at least the zero-length property count byte
        assert!(v311_len < v5_len);

        let mut buf = BytesMut::new();
        ConnectPacket::new(options, ProtocolVersion::V311)
            .encode(&mut buf)
            .unwrap();
        let header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = ConnectPacket::decode_body(&mut buf, &header).unwrap();
        assert_eq!(decoded.protocol_version, ProtocolVersion::V311);
        assert_eq!(decoded.options.client_id, "dev1");
    }

    #[test]
    fn test_connect_with_will_round_trip() {
        let will = WillMessage::new("status/gone", b"offline".to_vec())
            .with_qos(QoS::AtLeastOnce)
            .with_retain(true);
        let options = ConnectOptions::new("dev1").with_will(will);
        let packet = ConnectPacket::new(options, ProtocolVersion::V5);

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();

        let header = FixedHeader::decode(&mut buf).unwrap();
        let decoded = ConnectPacket::decode_body(&mut buf, &header).unwrap();

        let will = decoded.options.will.unwrap();
        assert_eq!(will.topic, "status/gone");
        assert_eq!(will.payload, b"offline");
        assert_eq!(will.qos, QoS::AtLeastOnce);
        assert!(will.retain);
    }

    #[test]
    fn test_connect_rejects_wrong_protocol_name() {
        let mut buf = BytesMut::new();
        encode_string(&mut buf, "MQIsdp").unwrap();
        buf.put_u8(3);

        let header = FixedHeader::new(PacketType::Connect, 0, buf.len() as u32);
        assert!(ConnectPacket::decode_body(&mut buf, &header).is_err());
    }
}
