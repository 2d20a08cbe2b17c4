use super::ack_common::{define_ack_packet, is_valid_pubrel_reason_code};
use crate::packet::PacketType;

define_ack_packet! {
    /// PUBREL (second half of the QoS 2 sender handshake); reserved flags
    /// are fixed at 0x02.
    pub struct PubRelPacket;
    packet_type = PacketType::PubRel;
    flags = 0x02;
    validator = is_valid_pubrel_reason_code;
    error_prefix = "PUBREL";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::{FixedHeader, MqttPacket};
    use crate::v5::reason_codes::ReasonCode;
    use bytes::BytesMut;

    #[test]
    fn test_pubrel_carries_flag_bits() {
        let packet = PubRelPacket::new(5);

        let mut buf = BytesMut::new();
        packet.encode(&mut buf).unwrap();
        assert_eq!(buf[0], 0x62);

        let fixed_header = FixedHeader::decode(&mut buf).unwrap();
        assert_eq!(fixed_header.flags, 0x02);

        let decoded = PubRelPacket::decode_body(&mut buf, &fixed_header).unwrap();
        assert_eq!(decoded.packet_id, 5);
        assert_eq!(decoded.reason_code, ReasonCode::Success);
    }
}
