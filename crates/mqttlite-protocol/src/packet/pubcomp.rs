use super::ack_common::{define_ack_packet, is_valid_pubrel_reason_code};
use crate::packet::PacketType;

define_ack_packet! {
    /// PUBCOMP (final packet of the QoS 2 exchange).
    pub struct PubCompPacket;
    packet_type = PacketType::PubComp;
    flags = 0x00;
    validator = is_valid_pubrel_reason_code;
    error_prefix = "PUBCOMP";
}
