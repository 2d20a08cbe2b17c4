//! Shared body layout for the four publish-acknowledgement packets
//! (PUBACK/PUBREC/PUBREL/PUBCOMP): packet identifier, optional reason
//! code, optional property block. A two-byte body is the 3.1.1 form and
//! implies `Success`.

use crate::error::{MqttError, Result};
use crate::packet::FixedHeader;
use crate::v5::properties::Properties;
use crate::v5::reason_codes::ReasonCode;
use bytes::{Buf, BufMut};

pub fn is_valid_publish_ack_reason_code(code: ReasonCode) -> bool {
    matches!(
        code,
        ReasonCode::Success
            | ReasonCode::NoMatchingSubscribers
            | ReasonCode::UnspecifiedError
            | ReasonCode::ImplementationSpecificError
            | ReasonCode::NotAuthorized
            | ReasonCode::TopicNameInvalid
            | ReasonCode::PacketIdentifierInUse
            | ReasonCode::QuotaExceeded
            | ReasonCode::PayloadFormatInvalid
    )
}

pub fn is_valid_pubrel_reason_code(code: ReasonCode) -> bool {
    matches!(
        code,
        ReasonCode::Success | ReasonCode::PacketIdentifierNotFound
    )
}

pub fn encode_ack_body<B: BufMut>(
    buf: &mut B,
    packet_id: u16,
    reason_code: ReasonCode,
    properties: &Properties,
) -> Result<()> {
    buf.put_u16(packet_id);

    // The short two-byte form is valid for success with no properties and
    // keeps QoS traffic compact on both protocol versions.
    if reason_code == ReasonCode::Success && properties.is_empty() {
        return Ok(());
    }

    buf.put_u8(u8::from(reason_code));
    if !properties.is_empty() {
        properties.encode(buf)?;
    }
    Ok(())
}

pub fn decode_ack_body<B: Buf>(
    buf: &mut B,
    fixed_header: &FixedHeader,
    validator: fn(ReasonCode) -> bool,
    error_prefix: &str,
) -> Result<(u16, ReasonCode, Properties)> {
    if buf.remaining() < 2 {
        return Err(MqttError::MalformedPacket(format!(
            "{error_prefix} missing packet identifier"
        )));
    }
    let packet_id = buf.get_u16();
    if packet_id == 0 {
        return Err(MqttError::MalformedPacket(format!(
            "{error_prefix} with zero packet identifier"
        )));
    }

    if fixed_header.remaining_length <= 2 || !buf.has_remaining() {
        return Ok((packet_id, ReasonCode::Success, Properties::default()));
    }

    let code_byte = buf.get_u8();
    let reason_code =
        ReasonCode::from_u8(code_byte).ok_or(MqttError::InvalidReasonCode(code_byte))?;
    if !validator(reason_code) {
        return Err(MqttError::MalformedPacket(format!(
            "Invalid {error_prefix} reason code: {reason_code:?}"
        )));
    }

    let properties = if buf.has_remaining() {
        Properties::decode(buf)?
    } else {
        Properties::default()
    };

    Ok((packet_id, reason_code, properties))
}

macro_rules! define_ack_packet {
    (
        $(#[$meta:meta])*
        pub struct $name:ident;
        packet_type = $ptype:expr;
        flags = $flags:expr;
        validator = $validator:path;
        error_prefix = $prefix:literal;
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq)]
        pub struct $name {
            pub packet_id: u16,
            pub reason_code: $crate::v5::reason_codes::ReasonCode,
            pub properties: $crate::v5::properties::Properties,
        }

        impl $name {
            #[must_use]
            pub fn new(packet_id: u16) -> Self {
                Self {
                    packet_id,
                    reason_code: $crate::v5::reason_codes::ReasonCode::Success,
                    properties: $crate::v5::properties::Properties::default(),
                }
            }

            #[must_use]
            pub fn new_with_reason(
                packet_id: u16,
                reason_code: $crate::v5::reason_codes::ReasonCode,
            ) -> Self {
                Self {
                    packet_id,
                    reason_code,
                    properties: $crate::v5::properties::Properties::default(),
                }
            }

            #[must_use]
            pub fn with_reason_string(mut self, reason: String) -> Self {
                self.properties.set_reason_string(reason);
                self
            }

            #[must_use]
            pub fn with_user_property(mut self, key: String, value: String) -> Self {
                self.properties.add_user_property(key, value);
                self
            }
        }

        impl $crate::packet::MqttPacket for $name {
            fn packet_type(&self) -> $crate::packet::PacketType {
                $ptype
            }

            fn flags(&self) -> u8 {
                $flags
            }

            fn encode_body<B: bytes::BufMut>(&self, buf: &mut B) -> $crate::error::Result<()> {
                $crate::packet::ack_common::encode_ack_body(
                    buf,
                    self.packet_id,
                    self.reason_code,
                    &self.properties,
                )
            }

            fn decode_body<B: bytes::Buf>(
                buf: &mut B,
                fixed_header: &$crate::packet::FixedHeader,
            ) -> $crate::error::Result<Self> {
                let (packet_id, reason_code, properties) =
                    $crate::packet::ack_common::decode_ack_body(
                        buf,
                        fixed_header,
                        $validator,
                        $prefix,
                    )?;
                Ok(Self {
                    packet_id,
                    reason_code,
                    properties,
                })
            }
        }
    };
}

pub(crate) use define_ack_packet;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::PacketType;
    use bytes::BytesMut;

    #[test]
    fn test_short_form_for_success() {
        let mut buf = BytesMut::new();
        encode_ack_body(&mut buf, 42, ReasonCode::Success, &Properties::default()).unwrap();
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn test_reason_code_form() {
        let mut buf = BytesMut::new();
        encode_ack_body(
            &mut buf,
            42,
            ReasonCode::QuotaExceeded,
            &Properties::default(),
        )
        .unwrap();
        assert_eq!(buf.len(), 3);
        assert_eq!(buf[2], 0x97);
    }

    #[test]
    fn test_decode_zero_packet_id_rejected() {
        let mut buf = BytesMut::new();
        buf.put_u16(0);

        let header = FixedHeader::new(PacketType::PubAck, 0, 2);
        let result = decode_ack_body(&mut buf, &header, is_valid_publish_ack_reason_code, "PUBACK");
        assert!(result.is_err());
    }

    #[test]
    fn test_decode_short_body_is_success() {
        let mut buf = BytesMut::new();
        buf.put_u16(9);

        let header = FixedHeader::new(PacketType::PubAck, 0, 2);
        let (id, reason, props) =
            decode_ack_body(&mut buf, &header, is_valid_publish_ack_reason_code, "PUBACK").unwrap();
        assert_eq!(id, 9);
        assert_eq!(reason, ReasonCode::Success);
        assert!(props.is_empty());
    }

    #[test]
    fn test_decode_rejects_invalid_reason_for_kind() {
        let mut buf = BytesMut::new();
        buf.put_u16(9);
        buf.put_u8(u8::from(ReasonCode::QuotaExceeded));

        let header = FixedHeader::new(PacketType::PubRel, 0x02, 3);
        let result = decode_ack_body(&mut buf, &header, is_valid_pubrel_reason_code, "PUBREL");
        assert!(result.is_err());
    }

    #[test]
    fn test_pubrel_reason_codes() {
        assert!(is_valid_pubrel_reason_code(ReasonCode::Success));
        assert!(is_valid_pubrel_reason_code(
            ReasonCode::PacketIdentifierNotFound
        ));
        assert!(!is_valid_pubrel_reason_code(ReasonCode::QuotaExceeded));
    }
}
