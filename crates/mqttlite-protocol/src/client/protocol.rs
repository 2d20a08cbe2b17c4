use crate::connection::DisconnectReason;
use crate::packet::{
    ConnAckPacket, ConnectPacket, DisconnectPacket, Packet, PubAckPacket, PubCompPacket,
    PubRecPacket, PubRelPacket, PublishPacket, SubAckPacket, SubscribePacket, SubscriptionOptions,
    TopicFilter, UnsubAckPacket, UnsubscribePacket,
};
use crate::qos2;
use crate::session::SessionConfig;
use crate::types::{ConnectOptions, Message, MessageProperties, ProtocolVersion, QoS, ServerProperties};
use crate::v5::properties::Properties;
use crate::v5::reason_codes::ReasonCode;
use bytes::Bytes;

use super::actions::{AckKind, ProtocolAction, TimeoutId};
use super::state::{ClientSession, ClientState, PendingPublish, PendingSubscribe, PendingUnsubscribe};

const DEFAULT_ACK_TIMEOUT_MS: u32 = 30_000;

/// The connection lifecycle and QoS delivery state machines, sans-io.
/// Every entry point returns the actions the I/O layer must perform, in
/// order. The engine starts in MQTT 5.0 mode and downgrades itself to
/// 3.1.1 exactly once if the broker rejects the protocol level.
#[derive(Debug)]
pub struct ClientProtocol {
    session: ClientSession,
    config: SessionConfig,
    protocol_version: ProtocolVersion,
    connect_options: Option<ConnectOptions>,
    downgrade_done: bool,
    ack_timeout_ms: u32,
}

impl ClientProtocol {
    #[must_use]
    pub fn new(client_id: &str) -> Self {
        Self {
            session: ClientSession::new(client_id),
            config: SessionConfig::new(),
            protocol_version: ProtocolVersion::V5,
            connect_options: None,
            downgrade_done: false,
            ack_timeout_ms: DEFAULT_ACK_TIMEOUT_MS,
        }
    }

    #[must_use]
    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    #[must_use]
    pub fn with_ack_timeout(mut self, timeout_ms: u32) -> Self {
        self.ack_timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn with_max_inflight(mut self, max: usize) -> Self {
        self.session.set_max_inflight(max);
        self
    }

    #[must_use]
    pub fn state(&self) -> &ClientState {
        self.session.state()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self.session.state(), ClientState::Connected { .. })
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        self.session.client_id()
    }

    #[must_use]
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.protocol_version
    }

    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut SessionConfig {
        &mut self.config
    }

    #[must_use]
    pub fn session(&self) -> &ClientSession {
        &self.session
    }

    /// Begins a connection attempt: remembers the options (the downgrade
    /// path re-sends them unchanged) and moves to the TCP-connecting
    /// state. The I/O layer opens the transport next.
    #[must_use]
    pub fn start_connect(&mut self, options: &ConnectOptions) -> Vec<ProtocolAction> {
        if !matches!(self.session.state(), ClientState::Disconnected) {
            return vec![ProtocolAction::error(
                ReasonCode::ProtocolError,
                "Cannot connect: not in disconnected state",
            )];
        }

        self.connect_options = Some(options.clone());
        self.session.set_state(ClientState::TcpConnecting);
        vec![ProtocolAction::state_transition(ClientState::TcpConnecting)]
    }

    /// Re-issues the stored connect request, used by the downgrade path
    /// and by auto-reconnection.
    #[must_use]
    pub fn retry_connect(&mut self) -> Vec<ProtocolAction> {
        let Some(options) = self.connect_options.clone() else {
            return vec![ProtocolAction::error(
                ReasonCode::ProtocolError,
                "Cannot reconnect: no prior connect request",
            )];
        };
        self.start_connect(&options)
    }

    /// The transport reported an established connection; send CONNECT in
    /// the current protocol mode and start the CONNACK window.
    #[must_use]
    pub fn transport_connected(&mut self) -> Vec<ProtocolAction> {
        if !matches!(self.session.state(), ClientState::TcpConnecting) {
            return vec![ProtocolAction::error(
                ReasonCode::ProtocolError,
                "Transport connected in unexpected state",
            )];
        }
        let Some(options) = self.connect_options.clone() else {
            return vec![ProtocolAction::error(
                ReasonCode::ProtocolError,
                "Transport connected without a connect request",
            )];
        };

        self.session.set_state(ClientState::MqttConnecting);
        vec![
            ProtocolAction::state_transition(ClientState::MqttConnecting),
            ProtocolAction::send_packet(Packet::Connect(Box::new(ConnectPacket::new(
                options,
                self.protocol_version,
            )))),
            ProtocolAction::schedule_timeout(TimeoutId::ConnAck, self.ack_timeout_ms),
        ]
    }

    #[must_use]
    pub fn handle_connack(&mut self, packet: &ConnAckPacket) -> Vec<ProtocolAction> {
        if !matches!(self.session.state(), ClientState::MqttConnecting) {
            return vec![ProtocolAction::error(
                ReasonCode::ProtocolError,
                "Received CONNACK in unexpected state",
            )];
        }

        let mut actions = vec![ProtocolAction::cancel_timeout(TimeoutId::ConnAck)];

        if packet.reason_code != ReasonCode::Success {
            if self.protocol_version.is_v5()
                && packet.reason_code == ReasonCode::UnsupportedProtocolVersion
                && !self.downgrade_done
            {
                // One-time automatic fallback: drop the v5 session config,
                // switch framing to 3.1.1, and redo the handshake from the
                // top. Anything staged but unsent is discarded with it.
                self.downgrade_done = true;
                self.protocol_version = ProtocolVersion::V311;
                self.config.reset();
                self.session.reset();
                actions.push(ProtocolAction::state_transition(ClientState::Disconnected));
                actions.push(ProtocolAction::Downgrade {
                    version: ProtocolVersion::V311,
                });
                return actions;
            }

            self.session.set_state(ClientState::Disconnected);
            actions.push(ProtocolAction::state_transition(ClientState::Disconnected));
            actions.push(ProtocolAction::error(
                packet.reason_code,
                "Connection refused",
            ));
            actions.push(ProtocolAction::Disconnect {
                reason: DisconnectReason::Refused(packet.reason_code),
            });
            return actions;
        }

        self.config.server = ServerProperties::from_connack_properties(&packet.properties);

        let advertised_alias_max = self
            .connect_options
            .as_ref()
            .and_then(|o| o.properties.topic_alias_maximum)
            .unwrap_or(0);
        self.session
            .alias_table_mut()
            .set_maximum(advertised_alias_max);

        let state = ClientState::Connected {
            session_present: packet.session_present,
        };
        self.session.set_state(state.clone());
        actions.push(ProtocolAction::state_transition(state));
        actions.push(ProtocolAction::UpdateServerLimits {
            receive_maximum: self.config.server.receive_maximum,
            max_packet_size: self.config.server.maximum_packet_size,
            topic_alias_maximum: self.config.server.topic_alias_maximum,
        });
        actions.push(ProtocolAction::ConnectionComplete {
            session_present: packet.session_present,
            server_keep_alive: self.config.server.server_keep_alive,
        });

        actions
    }

    #[must_use]
    pub fn publish(
        &mut self,
        topic: &str,
        payload: &[u8],
        qos: QoS,
        retain: bool,
    ) -> Vec<ProtocolAction> {
        if !self.is_connected() {
            return vec![ProtocolAction::error(
                ReasonCode::ProtocolError,
                "Cannot publish: not connected",
            )];
        }

        let properties = if self.protocol_version.is_v5() {
            self.config
                .publish
                .to_properties(self.config.server.response_information.as_deref())
        } else {
            Properties::default()
        };

        let mut packet = PublishPacket::new(topic, payload.to_vec(), qos)
            .with_retain(retain)
            .with_properties(properties)
            .with_protocol_version(self.protocol_version);

        if qos == QoS::AtMostOnce {
            return vec![ProtocolAction::send_packet(Packet::Publish(packet))];
        }

        if !self.session.has_capacity() {
            return vec![ProtocolAction::error(
                ReasonCode::QuotaExceeded,
                "Request pool exhausted",
            )];
        }

        let packet_id = self.session.next_packet_id();
        packet = packet.with_packet_id(packet_id);

        let pending = PendingPublish {
            topic: topic.to_string(),
            qos,
            retransmit: None,
        };

        let (kind, timeout_id) = match qos {
            QoS::AtLeastOnce => {
                self.session.track_pending_puback(packet_id, pending);
                (AckKind::PubAck, TimeoutId::PubAck(packet_id))
            }
            QoS::ExactlyOnce => {
                self.session.track_pending_pubrec(packet_id, pending);
                (AckKind::PubRec, TimeoutId::PubRec(packet_id))
            }
            QoS::AtMostOnce => unreachable!(),
        };

        vec![
            ProtocolAction::send_packet(Packet::Publish(packet)),
            ProtocolAction::TrackPendingAck { packet_id, kind },
            ProtocolAction::schedule_timeout(timeout_id, self.ack_timeout_ms),
        ]
    }

    /// Stores the staged-bytes snapshot of a QoS>0 publish, captured by
    /// the I/O layer right after encoding into the output buffer.
    pub fn attach_retransmit(&mut self, packet_id: u16, bytes: Bytes) {
        self.session.attach_retransmit(packet_id, bytes);
    }

    #[must_use]
    pub fn handle_puback(&mut self, packet: &PubAckPacket) -> Vec<ProtocolAction> {
        if self
            .session
            .remove_pending_puback(packet.packet_id)
            .is_none()
        {
            return Vec::new();
        }

        vec![
            ProtocolAction::cancel_timeout(TimeoutId::PubAck(packet.packet_id)),
            ProtocolAction::RemovePendingAck {
                packet_id: packet.packet_id,
                kind: AckKind::PubAck,
            },
            ProtocolAction::PublishComplete {
                packet_id: packet.packet_id,
                reason_code: packet.reason_code,
            },
        ]
    }

    #[must_use]
    pub fn handle_pubrec(&mut self, packet: &PubRecPacket) -> Vec<ProtocolAction> {
        let mut actions = Vec::new();
        let has_pending = self.session.has_pending_pubrec(packet.packet_id);

        for step in qos2::handle_incoming_pubrec(packet.packet_id, packet.reason_code, has_pending)
        {
            match step {
                qos2::QoS2Action::SendPubRel { packet_id } => {
                    let Some(pending) = self.session.remove_pending_pubrec(packet_id) else {
                        continue;
                    };
                    actions.push(ProtocolAction::cancel_timeout(TimeoutId::PubRec(packet_id)));
                    actions.push(ProtocolAction::RemovePendingAck {
                        packet_id,
                        kind: AckKind::PubRec,
                    });
                    actions.push(ProtocolAction::send_packet(Packet::PubRel(
                        PubRelPacket::new(packet_id),
                    )));
                    self.session.track_pending_pubcomp(packet_id, pending);
                }
                qos2::QoS2Action::TrackAwaitingPubComp { packet_id } => {
                    actions.push(ProtocolAction::TrackPendingAck {
                        packet_id,
                        kind: AckKind::PubComp,
                    });
                    actions.push(ProtocolAction::schedule_timeout(
                        TimeoutId::PubComp(packet_id),
                        self.ack_timeout_ms,
                    ));
                }
                qos2::QoS2Action::ErrorFlow {
                    packet_id,
                    reason_code,
                } => {
                    self.session.remove_pending_pubrec(packet_id);
                    actions.push(ProtocolAction::cancel_timeout(TimeoutId::PubRec(packet_id)));
                    actions.push(ProtocolAction::PublishComplete {
                        packet_id,
                        reason_code,
                    });
                }
                _ => {}
            }
        }

        actions
    }

    #[must_use]
    pub fn handle_pubcomp(&mut self, packet: &PubCompPacket) -> Vec<ProtocolAction> {
        let mut actions = Vec::new();
        let has_pending = self.session.has_pending_pubcomp(packet.packet_id);

        for step in qos2::handle_incoming_pubcomp(packet.packet_id, packet.reason_code, has_pending)
        {
            match step {
                qos2::QoS2Action::RemoveAwaitingPubComp { packet_id } => {
                    self.session.remove_pending_pubcomp(packet_id);
                    actions.push(ProtocolAction::cancel_timeout(TimeoutId::PubComp(packet_id)));
                    actions.push(ProtocolAction::RemovePendingAck {
                        packet_id,
                        kind: AckKind::PubComp,
                    });
                }
                qos2::QoS2Action::CompleteFlow { packet_id } => {
                    actions.push(ProtocolAction::PublishComplete {
                        packet_id,
                        reason_code: ReasonCode::Success,
                    });
                }
                qos2::QoS2Action::ErrorFlow {
                    packet_id,
                    reason_code,
                } => {
                    actions.push(ProtocolAction::PublishComplete {
                        packet_id,
                        reason_code,
                    });
                }
                _ => {}
            }
        }

        actions
    }

    #[must_use]
    pub fn handle_publish(&mut self, packet: &PublishPacket) -> Vec<ProtocolAction> {
        let topic = match self.resolve_publish_topic(packet) {
            Ok(topic) => topic,
            Err(alias) => {
                let mut actions = vec![ProtocolAction::error(
                    ReasonCode::TopicAliasInvalid,
                    format!("Publish with unresolvable topic alias {alias}"),
                )];
                actions.extend(self.connection_lost(DisconnectReason::ProtocolError(format!(
                    "unresolvable topic alias {alias}"
                ))));
                return actions;
            }
        };

        let message = Message {
            topic,
            payload: packet.payload.to_vec(),
            qos: packet.qos,
            retain: packet.retain,
            properties: MessageProperties::from(&packet.properties),
        };

        match packet.qos {
            QoS::AtMostOnce => vec![ProtocolAction::DeliverMessage(message)],
            QoS::AtLeastOnce => {
                let Some(packet_id) = packet.packet_id else {
                    return Vec::new();
                };
                vec![
                    ProtocolAction::DeliverMessage(message),
                    ProtocolAction::send_packet(Packet::PubAck(PubAckPacket::new(packet_id))),
                ]
            }
            QoS::ExactlyOnce => {
                let Some(packet_id) = packet.packet_id else {
                    return Vec::new();
                };
                let mut actions = Vec::new();
                for step in qos2::handle_incoming_publish_qos2(packet_id, packet.dup) {
                    match step {
                        qos2::QoS2Action::DeliverMessage { .. } => {
                            actions.push(ProtocolAction::DeliverMessage(message.clone()));
                        }
                        qos2::QoS2Action::SendPubRec {
                            packet_id,
                            reason_code,
                        } => {
                            actions.push(ProtocolAction::send_packet(Packet::PubRec(
                                PubRecPacket::new_with_reason(packet_id, reason_code),
                            )));
                        }
                        qos2::QoS2Action::TrackInboundPubRec { packet_id } => {
                            self.session.track_inbound_pubrec(packet_id);
                        }
                        _ => {}
                    }
                }
                actions
            }
        }
    }

    /// Resolves the delivery topic through the alias table. Returns the
    /// offending alias on failure.
    fn resolve_publish_topic(&mut self, packet: &PublishPacket) -> Result<String, u16> {
        if !self.protocol_version.is_v5() {
            return Ok(packet.topic_name.clone());
        }

        match packet.properties.topic_alias() {
            None => Ok(packet.topic_name.clone()),
            Some(alias) if packet.topic_name.is_empty() => self
                .session
                .alias_table()
                .resolve(alias)
                .map(ToString::to_string)
                .map_err(|_| alias),
            Some(alias) => {
                self.session
                    .alias_table_mut()
                    .bind(alias, &packet.topic_name)
                    .map_err(|_| alias)?;
                Ok(packet.topic_name.clone())
            }
        }
    }

    #[must_use]
    pub fn handle_pubrel(&mut self, packet: &PubRelPacket) -> Vec<ProtocolAction> {
        let mut actions = Vec::new();
        let has_pending = self.session.has_inbound_pubrec(packet.packet_id);

        for step in qos2::handle_incoming_pubrel(packet.packet_id, has_pending) {
            match step {
                qos2::QoS2Action::RemoveInboundPubRec { packet_id } => {
                    self.session.remove_inbound_pubrec(packet_id);
                }
                qos2::QoS2Action::SendPubComp {
                    packet_id,
                    reason_code,
                } => {
                    actions.push(ProtocolAction::send_packet(Packet::PubComp(
                        PubCompPacket::new_with_reason(packet_id, reason_code),
                    )));
                }
                _ => {}
            }
        }

        actions
    }

    #[must_use]
    pub fn subscribe(
        &mut self,
        filters: &[(String, SubscriptionOptions)],
    ) -> Vec<ProtocolAction> {
        if !self.is_connected() {
            return vec![ProtocolAction::error(
                ReasonCode::ProtocolError,
                "Cannot subscribe: not connected",
            )];
        }
        if filters.is_empty() {
            return vec![ProtocolAction::error(
                ReasonCode::ProtocolError,
                "Cannot subscribe: no filters provided",
            )];
        }
        if !self.session.has_capacity() {
            return vec![ProtocolAction::error(
                ReasonCode::QuotaExceeded,
                "Request pool exhausted",
            )];
        }

        let packet_id = self.session.next_packet_id();
        let mut packet = SubscribePacket::new(packet_id, self.protocol_version);

        let mut topic_filters = Vec::with_capacity(filters.len());
        for (filter, options) in filters {
            let filter = if self.protocol_version.is_v5() {
                self.config.subscribe.apply_share_group(filter)
            } else {
                filter.clone()
            };
            packet = packet.add_filter_with_options(TopicFilter::with_options(
                filter.clone(),
                *options,
            ));
            topic_filters.push(filter);
        }

        if self.protocol_version.is_v5() {
            packet = packet.with_properties(self.config.subscribe.to_properties());
        }

        self.session
            .track_pending_suback(packet_id, PendingSubscribe { topic_filters });

        vec![
            ProtocolAction::send_packet(Packet::Subscribe(packet)),
            ProtocolAction::TrackPendingAck {
                packet_id,
                kind: AckKind::SubAck,
            },
            ProtocolAction::schedule_timeout(TimeoutId::SubAck(packet_id), self.ack_timeout_ms),
        ]
    }

    #[must_use]
    pub fn handle_suback(&mut self, packet: &SubAckPacket) -> Vec<ProtocolAction> {
        if self
            .session
            .remove_pending_suback(packet.packet_id)
            .is_none()
        {
            return vec![ProtocolAction::error(
                ReasonCode::PacketIdentifierNotFound,
                "Received SUBACK for unknown packet ID",
            )];
        }

        vec![
            ProtocolAction::cancel_timeout(TimeoutId::SubAck(packet.packet_id)),
            ProtocolAction::RemovePendingAck {
                packet_id: packet.packet_id,
                kind: AckKind::SubAck,
            },
            ProtocolAction::SubscribeComplete {
                packet_id: packet.packet_id,
                codes: packet.reason_codes.clone(),
            },
        ]
    }

    #[must_use]
    pub fn unsubscribe(&mut self, filters: &[String]) -> Vec<ProtocolAction> {
        if !self.is_connected() {
            return vec![ProtocolAction::error(
                ReasonCode::ProtocolError,
                "Cannot unsubscribe: not connected",
            )];
        }
        if filters.is_empty() {
            return vec![ProtocolAction::error(
                ReasonCode::ProtocolError,
                "Cannot unsubscribe: no filters provided",
            )];
        }
        if !self.session.has_capacity() {
            return vec![ProtocolAction::error(
                ReasonCode::QuotaExceeded,
                "Request pool exhausted",
            )];
        }

        let packet_id = self.session.next_packet_id();
        let mut packet = UnsubscribePacket::new(packet_id, self.protocol_version);

        let mut topic_filters = Vec::with_capacity(filters.len());
        for filter in filters {
            let filter = if self.protocol_version.is_v5() {
                self.config.unsubscribe.apply_share_group(filter)
            } else {
                filter.clone()
            };
            packet = packet.add_filter(filter.clone());
            topic_filters.push(filter);
        }

        if self.protocol_version.is_v5() {
            packet = packet.with_properties(self.config.unsubscribe.to_properties());
        }

        self.session
            .track_pending_unsuback(packet_id, PendingUnsubscribe { topic_filters });

        vec![
            ProtocolAction::send_packet(Packet::Unsubscribe(packet)),
            ProtocolAction::TrackPendingAck {
                packet_id,
                kind: AckKind::UnsubAck,
            },
            ProtocolAction::schedule_timeout(TimeoutId::UnsubAck(packet_id), self.ack_timeout_ms),
        ]
    }

    #[must_use]
    pub fn handle_unsuback(&mut self, packet: &UnsubAckPacket) -> Vec<ProtocolAction> {
        if self
            .session
            .remove_pending_unsuback(packet.packet_id)
            .is_none()
        {
            return vec![ProtocolAction::error(
                ReasonCode::PacketIdentifierNotFound,
                "Received UNSUBACK for unknown packet ID",
            )];
        }

        vec![
            ProtocolAction::cancel_timeout(TimeoutId::UnsubAck(packet.packet_id)),
            ProtocolAction::RemovePendingAck {
                packet_id: packet.packet_id,
                kind: AckKind::UnsubAck,
            },
            ProtocolAction::UnsubscribeComplete {
                packet_id: packet.packet_id,
                codes: packet.reason_codes.clone(),
            },
        ]
    }

    #[must_use]
    pub fn ping(&mut self) -> Vec<ProtocolAction> {
        if !self.is_connected() {
            return Vec::new();
        }
        vec![
            ProtocolAction::send_packet(Packet::PingReq),
            ProtocolAction::schedule_timeout(TimeoutId::PingResp, self.ack_timeout_ms),
        ]
    }

    #[must_use]
    pub fn handle_pingresp(&mut self) -> Vec<ProtocolAction> {
        vec![ProtocolAction::cancel_timeout(TimeoutId::PingResp)]
    }

    /// Caller-initiated disconnect: DISCONNECT goes out while connected
    /// (the v5 variant with the session's disconnect property template),
    /// then teardown with a failure completion per in-flight request.
    #[must_use]
    pub fn disconnect(&mut self) -> Vec<ProtocolAction> {
        if matches!(self.session.state(), ClientState::Disconnected) {
            return Vec::new();
        }

        let mut actions = Vec::new();
        if self.is_connected() {
            self.session.set_state(ClientState::Disconnecting);
            actions.push(ProtocolAction::state_transition(ClientState::Disconnecting));

            let packet = if self.protocol_version.is_v5() {
                DisconnectPacket::new(ReasonCode::Success)
                    .with_properties(self.config.disconnect.to_properties())
            } else {
                DisconnectPacket::new_v311()
            };
            actions.push(ProtocolAction::send_packet(Packet::Disconnect(packet)));
        }

        self.session.set_state(ClientState::Disconnected);
        actions.push(ProtocolAction::state_transition(ClientState::Disconnected));
        self.drain_into(&mut actions);
        actions.push(ProtocolAction::Disconnect {
            reason: DisconnectReason::ClientInitiated,
        });
        actions
    }

    #[must_use]
    pub fn handle_server_disconnect(&mut self, packet: &DisconnectPacket) -> Vec<ProtocolAction> {
        let mut actions = Vec::new();
        if packet.reason_code != ReasonCode::Success {
            actions.push(ProtocolAction::error(
                packet.reason_code,
                "Server closed the connection",
            ));
        }
        actions.extend(self.connection_lost(DisconnectReason::ServerClosed));
        actions
    }

    /// Protocol-driven close: transport failure, watchdog expiry, parse
    /// error, or server DISCONNECT. Fires the connection-status path once
    /// and a failure completion per in-flight request.
    #[must_use]
    pub fn connection_lost(&mut self, reason: DisconnectReason) -> Vec<ProtocolAction> {
        if matches!(self.session.state(), ClientState::Disconnected) {
            return Vec::new();
        }

        self.session.set_state(ClientState::Disconnected);
        let mut actions = vec![ProtocolAction::state_transition(ClientState::Disconnected)];
        self.drain_into(&mut actions);
        actions.push(ProtocolAction::Disconnect { reason });
        actions
    }

    fn drain_into(&mut self, actions: &mut Vec<ProtocolAction>) {
        let drained = self.session.drain();
        let groups: [(&[u16], AckKind, fn(u16) -> TimeoutId); 5] = [
            (&drained.pubacks, AckKind::PubAck, TimeoutId::PubAck),
            (&drained.pubrecs, AckKind::PubRec, TimeoutId::PubRec),
            (&drained.pubcomps, AckKind::PubComp, TimeoutId::PubComp),
            (&drained.subscribes, AckKind::SubAck, TimeoutId::SubAck),
            (&drained.unsubscribes, AckKind::UnsubAck, TimeoutId::UnsubAck),
        ];
        for (ids, kind, timeout) in groups {
            for &packet_id in ids {
                actions.push(ProtocolAction::cancel_timeout(timeout(packet_id)));
                actions.push(ProtocolAction::RequestAborted { packet_id, kind });
            }
        }
    }

    #[must_use]
    pub fn handle_timeout(&mut self, timeout_id: TimeoutId) -> Vec<ProtocolAction> {
        match timeout_id {
            TimeoutId::ConnAck => {
                if matches!(self.session.state(), ClientState::MqttConnecting) {
                    self.connection_lost(DisconnectReason::ConnectTimeout)
                } else {
                    Vec::new()
                }
            }
            TimeoutId::PingResp => self.connection_lost(DisconnectReason::KeepAliveTimeout),
            TimeoutId::PubAck(packet_id) => {
                self.request_timed_out(packet_id, AckKind::PubAck)
            }
            TimeoutId::PubRec(packet_id) => {
                self.request_timed_out(packet_id, AckKind::PubRec)
            }
            TimeoutId::PubComp(packet_id) => {
                self.request_timed_out(packet_id, AckKind::PubComp)
            }
            TimeoutId::SubAck(packet_id) => {
                self.request_timed_out(packet_id, AckKind::SubAck)
            }
            TimeoutId::UnsubAck(packet_id) => {
                self.request_timed_out(packet_id, AckKind::UnsubAck)
            }
        }
    }

    fn request_timed_out(&mut self, packet_id: u16, kind: AckKind) -> Vec<ProtocolAction> {
        let removed = match kind {
            AckKind::PubAck => self.session.remove_pending_puback(packet_id).is_some(),
            AckKind::PubRec => self.session.remove_pending_pubrec(packet_id).is_some(),
            AckKind::PubComp => self.session.remove_pending_pubcomp(packet_id).is_some(),
            AckKind::SubAck => self.session.remove_pending_suback(packet_id).is_some(),
            AckKind::UnsubAck => self.session.remove_pending_unsuback(packet_id).is_some(),
        };
        if removed {
            vec![ProtocolAction::RequestTimeout { packet_id, kind }]
        } else {
            Vec::new()
        }
    }

    /// Single inbound dispatch point for the I/O layer. Packets a broker
    /// must never send terminate the connection.
    #[must_use]
    pub fn handle_packet(&mut self, packet: &Packet) -> Vec<ProtocolAction> {
        match packet {
            Packet::ConnAck(p) => self.handle_connack(p),
            Packet::Publish(p) => self.handle_publish(p),
            Packet::PubAck(p) => self.handle_puback(p),
            Packet::PubRec(p) => self.handle_pubrec(p),
            Packet::PubRel(p) => self.handle_pubrel(p),
            Packet::PubComp(p) => self.handle_pubcomp(p),
            Packet::SubAck(p) => self.handle_suback(p),
            Packet::UnsubAck(p) => self.handle_unsuback(p),
            Packet::PingResp => self.handle_pingresp(),
            Packet::Disconnect(p) => self.handle_server_disconnect(p),
            Packet::Connect(_)
            | Packet::Subscribe(_)
            | Packet::Unsubscribe(_)
            | Packet::PingReq => self.connection_lost(DisconnectReason::ProtocolError(format!(
                "Unexpected {:?} from server",
                packet.packet_type()
            ))),
        }
    }
}
