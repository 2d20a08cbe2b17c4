use crate::encoding::{decode_string, encode_string};
use crate::error::{MqttError, Result};
use crate::packet::{FixedHeader, MqttPacket, PacketType};
use crate::types::ProtocolVersion;
use crate::v5::properties::Properties;
use bytes::{Buf, BufMut};

#[derive(Debug, Clone)]
pub struct UnsubscribePacket {
    pub packet_id: u16,
    pub filters: Vec<String>,
    pub properties: Properties,
    pub protocol_version: ProtocolVersion,
}

impl UnsubscribePacket {
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
    pub fn add_filter(mut self, filter: impl Into<String>) -> Self {
        self.filters.push(filter.into());
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
                "Invalid UNSUBSCRIBE flags: expected 0x02, got 0x{:02X}",
                fixed_header.flags
            )));
        }

        if buf.remaining() < 2 {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE missing packet identifier".to_string(),
            ));
        }
        let packet_id = buf.get_u16();
        if packet_id == 0 {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE with zero packet identifier".to_string(),
            ));
        }

        let properties = if version.is_v5() {
            Properties::decode(buf)?
        } else {
            Properties::default()
        };

        if !buf.has_remaining() {
            return Err(MqttError::MalformedPacket(
                "UNSUBSCRIBE without topic filters".to_string(),
            ));
        }

        let mut filters = Vec::new();
        while buf.has_remaining() {
            filters.push(decode_string(buf)?);
        }

        Ok(Self {
            packet_id,
            filters,
            properties,
            protocol_version: version,
        })
    }
}

impl MqttPacket for UnsubscribePacket {
    fn packet_type(&self) -> PacketType {
        PacketType::Unsubscribe
    }

    fn flags(&self) -> u8 {
        0x02
    }

    fn encode_body<B: BufMut>(&self, buf: &mut B) -> Result<()> {
        if self.filters.is_empty() {
            return Err(MqttError::ProtocolError(
                "UNSUBSCRIBE requires at least one topic filter".to_string(),
            ));
        }

        buf.put_u16(self.packet_id);
        if self.protocol_version.is_v5() {
            self.properties.encode(buf)?;
        }
        for filter in &self.filters {
            encode_string(buf, filter)?;
        }
        Ok(())
    }

    fn decode_body<B: Buf>(buf: &mut B, fixed_header: &FixedHeader) -> Result<Self> {
        Self::decode_body_with_version(buf, fixed_header, ProtocolVersion::V5)
    }
}
