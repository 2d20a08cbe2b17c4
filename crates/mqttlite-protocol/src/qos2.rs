//! QoS 2 exactly-once flow logic as pure decision functions. Each takes
//! the relevant piece of session state and returns the steps to perform,
//! which keeps the handshake rules testable without a connection.

use crate::v5::reason_codes::ReasonCode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QoS2Action {
    /// Acknowledge receipt of an inbound QoS 2 publish.
    SendPubRec {
        packet_id: u16,
        reason_code: ReasonCode,
    },
    /// Release our outbound publish; mandatory on receiving PUBREC.
    SendPubRel { packet_id: u16 },
    /// Complete the inbound flow in response to the peer's PUBREL.
    SendPubComp {
        packet_id: u16,
        reason_code: ReasonCode,
    },
    TrackAwaitingPubComp { packet_id: u16 },
    RemoveAwaitingPubComp { packet_id: u16 },
    TrackInboundPubRec { packet_id: u16 },
    RemoveInboundPubRec { packet_id: u16 },
    DeliverMessage { packet_id: u16 },
    CompleteFlow { packet_id: u16 },
    ErrorFlow {
        packet_id: u16,
        reason_code: ReasonCode,
    },
}

/// PUBREC arrived for one of our QoS 2 publishes. A success code advances
/// the flow by sending PUBREL immediately; completion waits for PUBCOMP.
#[must_use]
pub fn handle_incoming_pubrec(
    packet_id: u16,
    reason_code: ReasonCode,
    has_pending_publish: bool,
) -> Vec<QoS2Action> {
    if !has_pending_publish {
        return vec![QoS2Action::ErrorFlow {
            packet_id,
            reason_code: ReasonCode::PacketIdentifierNotFound,
        }];
    }

    if reason_code.is_error() {
        return vec![QoS2Action::ErrorFlow {
            packet_id,
            reason_code,
        }];
    }

    vec![
        QoS2Action::SendPubRel { packet_id },
        QoS2Action::TrackAwaitingPubComp { packet_id },
    ]
}

/// PUBCOMP arrived; the flow completes only now, never on PUBREC alone.
#[must_use]
pub fn handle_incoming_pubcomp(
    packet_id: u16,
    reason_code: ReasonCode,
    has_pending_pubrel: bool,
) -> Vec<QoS2Action> {
    if !has_pending_pubrel {
        return Vec::new();
    }

    vec![
        QoS2Action::RemoveAwaitingPubComp { packet_id },
        if reason_code.is_error() {
            QoS2Action::ErrorFlow {
                packet_id,
                reason_code,
            }
        } else {
            QoS2Action::CompleteFlow { packet_id }
        },
    ]
}

/// An inbound QoS 2 publish. Duplicates re-acknowledge without a second
/// delivery.
#[must_use]
pub fn handle_incoming_publish_qos2(packet_id: u16, is_duplicate: bool) -> Vec<QoS2Action> {
    if is_duplicate {
        vec![QoS2Action::SendPubRec {
            packet_id,
            reason_code: ReasonCode::Success,
        }]
    } else {
        vec![
            QoS2Action::DeliverMessage { packet_id },
            QoS2Action::SendPubRec {
                packet_id,
                reason_code: ReasonCode::Success,
            },
            QoS2Action::TrackInboundPubRec { packet_id },
        ]
    }
}

/// The peer released an inbound publish; reply PUBCOMP either way, with
/// `PacketIdentifierNotFound` when we never saw the publish.
#[must_use]
pub fn handle_incoming_pubrel(packet_id: u16, has_pending_pubrec: bool) -> Vec<QoS2Action> {
    if has_pending_pubrec {
        vec![
            QoS2Action::RemoveInboundPubRec { packet_id },
            QoS2Action::SendPubComp {
                packet_id,
                reason_code: ReasonCode::Success,
            },
        ]
    } else {
        vec![QoS2Action::SendPubComp {
            packet_id,
            reason_code: ReasonCode::PacketIdentifierNotFound,
        }]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pubrec_success_sends_pubrel() {
        let actions = handle_incoming_pubrec(123, ReasonCode::Success, true);
        assert_eq!(actions[0], QoS2Action::SendPubRel { packet_id: 123 });
        assert_eq!(
            actions[1],
            QoS2Action::TrackAwaitingPubComp { packet_id: 123 }
        );
    }

    #[test]
    fn test_pubrec_never_completes_flow() {
        let actions = handle_incoming_pubrec(123, ReasonCode::Success, true);
        assert!(!actions
            .iter()
            .any(|a| matches!(a, QoS2Action::CompleteFlow { .. })));
    }

    #[test]
    fn test_pubrec_error_reason_aborts() {
        let actions = handle_incoming_pubrec(123, ReasonCode::QuotaExceeded, true);
        assert_eq!(
            actions,
            vec![QoS2Action::ErrorFlow {
                packet_id: 123,
                reason_code: ReasonCode::QuotaExceeded
            }]
        );
    }

    #[test]
    fn test_pubrec_unknown_id() {
        let actions = handle_incoming_pubrec(123, ReasonCode::Success, false);
        assert_eq!(
            actions,
            vec![QoS2Action::ErrorFlow {
                packet_id: 123,
                reason_code: ReasonCode::PacketIdentifierNotFound
            }]
        );
    }

    #[test]
    fn test_pubcomp_completes_flow() {
        let actions = handle_incoming_pubcomp(123, ReasonCode::Success, true);
        assert_eq!(
            actions,
            vec![
                QoS2Action::RemoveAwaitingPubComp { packet_id: 123 },
                QoS2Action::CompleteFlow { packet_id: 123 },
            ]
        );
    }

    #[test]
    fn test_pubcomp_without_pending_is_ignored() {
        assert!(handle_incoming_pubcomp(123, ReasonCode::Success, false).is_empty());
    }

    #[test]
    fn test_inbound_publish_delivers_then_acks() {
        let actions = handle_incoming_publish_qos2(7, false);
        assert_eq!(actions.len(), 3);
        assert_eq!(actions[0], QoS2Action::DeliverMessage { packet_id: 7 });
        assert!(matches!(actions[1], QoS2Action::SendPubRec { .. }));
    }

    #[test]
    fn test_inbound_duplicate_skips_delivery() {
        let actions = handle_incoming_publish_qos2(7, true);
        assert_eq!(actions.len(), 1);
        assert!(matches!(actions[0], QoS2Action::SendPubRec { .. }));
    }

    #[test]
    fn test_pubrel_with_and_without_pubrec() {
        let known = handle_incoming_pubrel(9, true);
        assert_eq!(
            known[1],
            QoS2Action::SendPubComp {
                packet_id: 9,
                reason_code: ReasonCode::Success
            }
        );

        let unknown = handle_incoming_pubrel(9, false);
        assert_eq!(
            unknown,
            vec![QoS2Action::SendPubComp {
                packet_id: 9,
                reason_code: ReasonCode::PacketIdentifierNotFound
            }]
        );
    }
}
