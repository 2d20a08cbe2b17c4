use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::ProtocolVersion;
use crate::v5::properties::Properties;
use crate::v5::reason_codes::ReasonCode;
use bytes::{Buf, BufMut};

/// CONNACK. For a 3.1.1 broker the single return-code byte is mapped into
/// the v5 reason-code space (1 → `UnsupportedProtocolVersion`, ...), so the
/// downgrade check upstream sees one vocabulary.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnAckPacket {
    pub session_present: bool,
    pub reason_code: ReasonCode,
    pub properties: Properties,
    pub protocol_version: ProtocolVersion,
}

impl ConnAckPacket {
    #[must_use]
    pub fn new(session_present: bool, reason_code: ReasonCode) -> Self {
        Self {
            session_present,
            reason_code,
            properties: Properties::default(),
            protocol_version: ProtocolVersion::V5,
        }
    }

    #[must_use]
    pub fn new_v311(session_present: bool, reason_code: ReasonCode) -> Self {
        Self {
            session_present,
            reason_code,
            properties: Properties::default(),
            protocol_version: ProtocolVersion::V311,
        }
    }

    #[must_use]
    pub fn with_receive_maximum(mut self, max: u16) -> Self {
        self.properties.set_receive_maximum(max);
        self
    }

    #[must_use]
    pub fn with_topic_alias_maximum(mut self, max: u16) -> Self {
        self.properties.set_topic_alias_maximum(max);
        self
    }

    #[must_use]
    pub fn with_server_keep_alive(mut self, secs: u16) -> Self {
        self.properties.set_server_keep_alive(secs);
        self
    }

    /// The v3.1.1 return code this packet would carry, for encode tests and
    /// the scripted-broker side of integration tests.
    fn v311_return_code(&self) -> u8 {
        match self.reason_code {
            ReasonCode::Success => 0,
            ReasonCode::UnsupportedProtocolVersion => 1,
            ReasonCode::ClientIdentifierNotValid => 2,
            ReasonCode::ServerUnavailable => 3,
            ReasonCode::BadUsernameOrPassword => 4,
            _ => 5,
        }
    }

    pub fn decode_body_with_version<B: Buf>(
        buf: &mut B,
        _fixed_header: &FixedHeader,
        version: ProtocolVersion,
    ) -> Result<Self> {
        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "CONNACK shorter than two bytes".to_string(),
            ));
        }

        let ack_flags = buf.get_u8();
        if ack_flags & 0xFE != 0 {
            return Err(MqttError::MalformedPacket(format!(
                "Invalid CONNACK acknowledge flags: 0x{ack_flags:02X}"
            )));
        }
        let session_present = ack_flags & 0x01 != 0;

        let code_byte = buf.get_u8();
        let (reason_code, properties) = match version {
            ProtocolVersion::V5 => {
                if !buf.has_remaining() {
                    // A two-byte CONNACK while we spoke v5: the broker
                    // answered in 3.1.1 framing. Map its return code so the
                    // version-mismatch refusal still surfaces as
                    // UnsupportedProtocolVersion.
                    let reason = ReasonCode::from_v311_connect_return(code_byte)
                        .ok_or(MqttError::InvalidReasonCode(code_byte))?;
                    (reason, Properties::default())
                } else {
                    let reason = ReasonCode::from_u8(code_byte)
                        .ok_or(MqttError::InvalidReasonCode(code_byte))?;
                    if reason != ReasonCode::Success && !reason.is_error() {
                        return Err(MqttError::InvalidReasonCode(code_byte));
                    }
                    (reason, Properties::decode(buf)?)
                }
            }
            ProtocolVersion::V311 => {
                let reason = ReasonCode::from_v311_connect_return(code_byte)
                    .ok_or(MqttError::InvalidReasonCode(code_byte))?;
                (reason, Properties::default())
            }
        };

        Ok(Self {
            session_present,
            reason_code,
            properties,
            protocol_version: version,
        })
    }
}

impl MqttPacket for ConnAckPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::ConnAck
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        buf.put_u8(u8::from(self.session_present));
        match self.protocol_version {
            ProtocolVersion::V5 => {
                buf.put_u8(u8::from(self.reason_code));
                self.properties.encode(buf)?;
            }
            ProtocolVersion::V311 => {
                buf.put_u8(self.v311_return_code());
            }
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        Self::decode_body_with_version(buf, fixed_header, ProtocolVersion::V5)
    }
}
