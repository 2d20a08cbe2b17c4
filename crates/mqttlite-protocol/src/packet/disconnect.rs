use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::ProtocolVersion;
use crate::v5::properties::Properties;
use bytes::{Buf, BufMut};
use crate::v5::reason_codes::ReasonCode;

/// DISCONNECT. The 3.1.1 form is an empty body; the v5 form carries a
/// reason code and optionally session-expiry/reason-string/user properties.
#[derive(Debug, Clone)]
pub struct DisconnectPacket {
    pub reason_code: ReasonCode,
    pub properties: Properties,
    pub protocol_version: ProtocolVersion,
}

impl DisconnectPacket {
    #[must_use]
    pub fn new(reason_code: ReasonCode) -> Self {
        Self {
            reason_code,
            properties: Properties::default(),
            protocol_version: ProtocolVersion::V5,
        }
    }

    #[must_use]
    pub fn new_v311() -> Self {
        Self {
            reason_code: ReasonCode::Success,
            properties: Properties::default(),
            protocol_version: ProtocolVersion::V311,
        }
    }

    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties = properties;
        self
    }

    pub fn decode_body_with_version<B: Buf>(
        buf: &mut B,
        _fixed_header: &FixedHeader,
        version: ProtocolVersion,
    ) -> Result<Self> {
        if !version.is_v5() {
            if buf.has_remaining() {
                return Err(MqttError::MalformedPacket(
                    "Non-empty 3.1.1 DISCONNECT body".to_string(),
                ));
            }
            return Ok(Self::new_v311());
        }

        if !buf.has_remaining() {
            // remaining length 0 means normal disconnection
            return Ok(Self::new(ReasonCode::Success));
        }

        let code_byte = buf.get_u8();
        let reason_code =
            ReasonCode::from_u8(code_byte).ok_or(MqttError::InvalidReasonCode(code_byte))?;

        let properties = if buf.has_remaining() {
            Properties::decode(buf)?
        } else {
            Properties::default()
        };

        Ok(Self {
            reason_code,
            properties,
            protocol_version: version,
        })
    }
}

impl MqttPacket for DisconnectPacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Disconnect
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.protocol_version.is_v5() {
            buf.put_u8(u8::from(self.reason_code));
            if !self.properties.is_empty() {
                self.properties.encode(buf)?;
            }
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        Self::decode_body_with_version(buf, fixed_header, ProtocolVersion::V5)
    }
}
