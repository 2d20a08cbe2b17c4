use crate::connection::DisconnectReason;
use crate::packet::{Packet, SubAckReasonCode, UnsubAckReasonCode};
use crate::types::{Message, ProtocolVersion};
use crate::v5::reason_codes::ReasonCode;

use super::state::ClientState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutId {
    ConnAck,
    PingResp,
    PubAck(u16),
    PubRec(u16),
    PubComp(u16),
    SubAck(u16),
    UnsubAck(u16),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckKind {
    SubAck,
    UnsubAck,
    PubAck,
    PubRec,
    PubComp,
}

/// One step for the I/O layer to perform. The engine never performs I/O
/// itself; every externally visible effect is one of these.
#[derive(Debug, Clone)]
pub enum ProtocolAction {
    SendPacket(Packet),
    DeliverMessage(Message),
    StateTransition(ClientState),
    TrackPendingAck {
        packet_id: u16,
        kind: AckKind,
    },
    RemovePendingAck {
        packet_id: u16,
        kind: AckKind,
    },
    UpdateServerLimits {
        receive_maximum: u16,
        max_packet_size: u32,
        topic_alias_maximum: u16,
    },
    ScheduleTimeout {
        timeout_id: TimeoutId,
        duration_ms: u32,
    },
    CancelTimeout {
        timeout_id: TimeoutId,
    },
    ConnectionComplete {
        session_present: bool,
        server_keep_alive: Option<u16>,
    },
    SubscribeComplete {
        packet_id: u16,
        codes: Vec<SubAckReasonCode>,
    },
    UnsubscribeComplete {
        packet_id: u16,
        codes: Vec<UnsubAckReasonCode>,
    },
    PublishComplete {
        packet_id: u16,
        reason_code: ReasonCode,
    },
    /// A request's acknowledgement never arrived within the ack window.
    RequestTimeout {
        packet_id: u16,
        kind: AckKind,
    },
    /// A request was still in flight when the connection closed.
    RequestAborted {
        packet_id: u16,
        kind: AckKind,
    },
    /// The broker rejected MQTT 5.0; the I/O layer must reconnect the
    /// transport and re-run the handshake, now framed at 3.1.1.
    Downgrade {
        version: ProtocolVersion,
    },
    Error {
        code: ReasonCode,
        message: String,
    },
    Disconnect {
        reason: DisconnectReason,
    },
}

impl ProtocolAction {
    #[must_use]
    pub fn send_packet(packet: Packet) -> Self {
        Self::SendPacket(packet)
    }

    #[must_use]
    pub fn state_transition(state: ClientState) -> Self {
        Self::StateTransition(state)
    }

    #[must_use]
    pub fn schedule_timeout(timeout_id: TimeoutId, duration_ms: u32) -> Self {
        Self::ScheduleTimeout {
            timeout_id,
            duration_ms,
        }
    }

    #[must_use]
    pub fn cancel_timeout(timeout_id: TimeoutId) -> Self {
        Self::CancelTimeout { timeout_id }
    }

    #[must_use]
    pub fn error(code: ReasonCode, message: impl Into<String>) -> Self {
        Self::Error {
            code,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error { .. })
    }

    #[must_use]
    pub fn is_send_packet(&self) -> bool {
        matches!(self, Self::SendPacket(_))
    }
}
