use super::ack_common::{define_ack_packet, is_valid_publish_ack_reason_code};
use crate::packet::PacketType;

define_ack_packet! {
    /// PUBACK (QoS 1 publish acknowledgement).
    pub struct PubAckPacket;
    packet_type = PacketType::PubAck;
    flags = 0x00;
    validator = is_valid_publish_ack_reason_code;
    error_prefix = "PUBACK";
}
