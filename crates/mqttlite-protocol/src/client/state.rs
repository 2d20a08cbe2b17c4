use crate::packet_id::PacketIdGenerator;
use crate::session::TopicAliasTable;
use crate::types::QoS;
use bytes::Bytes;
use std::collections::HashMap;

/// Default bound on concurrently in-flight acknowledgement-awaiting
/// requests (publishes, subscribes, unsubscribes combined).
pub const DEFAULT_MAX_INFLIGHT: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClientState {
    #[default]
    Disconnected,
    TcpConnecting,
    MqttConnecting,
    Connected {
        session_present: bool,
    },
    Disconnecting,
}

#[derive(Debug, Clone)]
pub struct PendingSubscribe {
    pub topic_filters: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PendingUnsubscribe {
    pub topic_filters: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PendingPublish {
    pub topic: String,
    pub qos: QoS,
    /// Byte-exact copy of the staged packet, captured at send time, so a
    /// retransmission never has to re-derive topic or property encoding.
    pub retransmit: Option<Bytes>,
}

/// Outbound requests drained when the connection closes, so each can fire
/// its failure completion.
#[derive(Debug, Default)]
pub struct DrainedRequests {
    pub pubacks: Vec<u16>,
    pub pubrecs: Vec<u16>,
    pub pubcomps: Vec<u16>,
    pub subscribes: Vec<u16>,
    pub unsubscribes: Vec<u16>,
}

impl DrainedRequests {
    #[must_use]
    pub fn len(&self) -> usize {
        self.pubacks.len()
            + self.pubrecs.len()
            + self.pubcomps.len()
            + self.subscribes.len()
            + self.unsubscribes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The request tracker plus connection-scoped session state: a bounded
/// pool of in-flight requests keyed by packet id, and the peer topic-alias
/// table. A packet id is reused only after its request retires.
#[derive(Debug)]
pub struct ClientSession {
    state: ClientState,
    client_id: String,
    id_gen: PacketIdGenerator,
    max_inflight: usize,
    pending_subacks: HashMap<u16, PendingSubscribe>,
    pending_unsubacks: HashMap<u16, PendingUnsubscribe>,
    pending_pubacks: HashMap<u16, PendingPublish>,
    pending_pubrecs: HashMap<u16, PendingPublish>,
    pending_pubcomps: HashMap<u16, PendingPublish>,
    /// Inbound QoS 2 publishes we have PUBREC'd, awaiting the peer PUBREL.
    inbound_pubrecs: HashMap<u16, ()>,
    alias_table: TopicAliasTable,
}

impl ClientSession {
    #[must_use]
    pub fn new(client_id: &str) -> Self {
        Self {
            state: ClientState::Disconnected,
            client_id: String::from(client_id),
            id_gen: PacketIdGenerator::new(),
            max_inflight: DEFAULT_MAX_INFLIGHT,
            pending_subacks: HashMap::new(),
            pending_unsubacks: HashMap::new(),
            pending_pubacks: HashMap::new(),
            pending_pubrecs: HashMap::new(),
            pending_pubcomps: HashMap::new(),
            inbound_pubrecs: HashMap::new(),
            alias_table: TopicAliasTable::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &ClientState {
        &self.state
    }

    pub fn set_state(&mut self, state: ClientState) {
        self.state = state;
    }

    #[must_use]
    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn set_max_inflight(&mut self, max: usize) {
        self.max_inflight = max;
    }

    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.pending_subacks.len()
            + self.pending_unsubacks.len()
            + self.pending_pubacks.len()
            + self.pending_pubrecs.len()
            + self.pending_pubcomps.len()
    }

    #[must_use]
    pub fn has_capacity(&self) -> bool {
        self.in_flight() < self.max_inflight
    }

    #[must_use]
    fn id_in_flight(&self, id: u16) -> bool {
        self.pending_subacks.contains_key(&id)
            || self.pending_unsubacks.contains_key(&id)
            || self.pending_pubacks.contains_key(&id)
            || self.pending_pubrecs.contains_key(&id)
            || self.pending_pubcomps.contains_key(&id)
    }

    /// Allocates a packet id distinct from every in-flight request's.
    pub fn next_packet_id(&mut self) -> u16 {
        loop {
            let id = self.id_gen.next();
            if !self.id_in_flight(id) {
                return id;
            }
        }
    }

    #[must_use]
    pub fn alias_table(&self) -> &TopicAliasTable {
        &self.alias_table
    }

    pub fn alias_table_mut(&mut self) -> &mut TopicAliasTable {
        &mut self.alias_table
    }

    pub fn track_pending_suback(&mut self, packet_id: u16, pending: PendingSubscribe) {
        self.pending_subacks.insert(packet_id, pending);
    }

    pub fn remove_pending_suback(&mut self, packet_id: u16) -> Option<PendingSubscribe> {
        self.pending_subacks.remove(&packet_id)
    }

    pub fn track_pending_unsuback(&mut self, packet_id: u16, pending: PendingUnsubscribe) {
        self.pending_unsubacks.insert(packet_id, pending);
    }

    pub fn remove_pending_unsuback(&mut self, packet_id: u16) -> Option<PendingUnsubscribe> {
        self.pending_unsubacks.remove(&packet_id)
    }

    pub fn track_pending_puback(&mut self, packet_id: u16, pending: PendingPublish) {
        self.pending_pubacks.insert(packet_id, pending);
    }

    pub fn remove_pending_puback(&mut self, packet_id: u16) -> Option<PendingPublish> {
        self.pending_pubacks.remove(&packet_id)
    }

    pub fn track_pending_pubrec(&mut self, packet_id: u16, pending: PendingPublish) {
        self.pending_pubrecs.insert(packet_id, pending);
    }

    pub fn remove_pending_pubrec(&mut self, packet_id: u16) -> Option<PendingPublish> {
        self.pending_pubrecs.remove(&packet_id)
    }

    #[must_use]
    pub fn has_pending_pubrec(&self, packet_id: u16) -> bool {
        self.pending_pubrecs.contains_key(&packet_id)
    }

    pub fn track_pending_pubcomp(&mut self, packet_id: u16, pending: PendingPublish) {
        self.pending_pubcomps.insert(packet_id, pending);
    }

    pub fn remove_pending_pubcomp(&mut self, packet_id: u16) -> Option<PendingPublish> {
        self.pending_pubcomps.remove(&packet_id)
    }

    #[must_use]
    pub fn has_pending_pubcomp(&self, packet_id: u16) -> bool {
        self.pending_pubcomps.contains_key(&packet_id)
    }

    pub fn track_inbound_pubrec(&mut self, packet_id: u16) {
        self.inbound_pubrecs.insert(packet_id, ());
    }

    pub fn remove_inbound_pubrec(&mut self, packet_id: u16) -> bool {
        self.inbound_pubrecs.remove(&packet_id).is_some()
    }

    #[must_use]
    pub fn has_inbound_pubrec(&self, packet_id: u16) -> bool {
        self.inbound_pubrecs.contains_key(&packet_id)
    }

    /// Attaches the staged-bytes snapshot to a QoS>0 publish request.
    pub fn attach_retransmit(&mut self, packet_id: u16, bytes: Bytes) {
        if let Some(pending) = self.pending_pubacks.get_mut(&packet_id) {
            pending.retransmit = Some(bytes);
        } else if let Some(pending) = self.pending_pubrecs.get_mut(&packet_id) {
            pending.retransmit = Some(bytes);
        }
    }

    #[must_use]
    pub fn retransmit_snapshot(&self, packet_id: u16) -> Option<&Bytes> {
        self.pending_pubacks
            .get(&packet_id)
            .or_else(|| self.pending_pubrecs.get(&packet_id))
            .and_then(|p| p.retransmit.as_ref())
    }

    /// Empties the request pool, returning every outbound request so the
    /// caller can fire its failure completion. Inbound QoS 2 state and the
    /// alias table are dropped silently.
    pub fn drain(&mut self) -> DrainedRequests {
        let mut drained = DrainedRequests::default();
        drained.pubacks.extend(self.pending_pubacks.keys());
        drained.pubrecs.extend(self.pending_pubrecs.keys());
        drained.pubcomps.extend(self.pending_pubcomps.keys());
        drained.subscribes.extend(self.pending_subacks.keys());
        drained.unsubscribes.extend(self.pending_unsubacks.keys());

        self.pending_pubacks.clear();
        self.pending_pubrecs.clear();
        self.pending_pubcomps.clear();
        self.pending_subacks.clear();
        self.pending_unsubacks.clear();
        self.inbound_pubrecs.clear();
        self.alias_table.clear();

        drained
    }

    pub fn reset(&mut self) {
        self.state = ClientState::Disconnected;
        let _ = self.drain();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pending_publish(qos: QoS) -> PendingPublish {
        PendingPublish {
            topic: "t".to_string(),
            qos,
            retransmit: None,
        }
    }

    #[test]
    fn test_packet_ids_unique_among_in_flight() {
        let mut session = ClientSession::new("test");

        let mut ids = Vec::new();
        for _ in 0..10 {
            let id = session.next_packet_id();
            session.track_pending_puback(id, pending_publish(QoS::AtLeastOnce));
            ids.push(id);
        }

        let mut deduped = ids.clone();
        deduped.sort_unstable();
        deduped.dedup();
        assert_eq!(deduped.len(), ids.len());
        assert!(ids.iter().all(|id| *id != 0));
    }

    #[test]
    fn test_id_reuse_after_retire() {
        let mut session = ClientSession::new("test");
        let id = session.next_packet_id();
        session.track_pending_puback(id, pending_publish(QoS::AtLeastOnce));
        assert!(session.id_in_flight(id));

        session.remove_pending_puback(id).unwrap();
        assert!(!session.id_in_flight(id));
    }

    #[test]
    fn test_capacity_bound() {
        let mut session = ClientSession::new("test");
        session.set_max_inflight(2);

        let a = session.next_packet_id();
        session.track_pending_puback(a, pending_publish(QoS::AtLeastOnce));
        assert!(session.has_capacity());

        let b = session.next_packet_id();
        session.track_pending_suback(
            b,
            PendingSubscribe {
                topic_filters: vec!["t".to_string()],
            },
        );
        assert!(!session.has_capacity());
    }

    #[test]
    fn test_drain_returns_everything_and_empties_pool() {
        let mut session = ClientSession::new("test");
        let p1 = session.next_packet_id();
        session.track_pending_puback(p1, pending_publish(QoS::AtLeastOnce));
        let p2 = session.next_packet_id();
        session.track_pending_pubrec(p2, pending_publish(QoS::ExactlyOnce));
        let s1 = session.next_packet_id();
        session.track_pending_suback(
            s1,
            PendingSubscribe {
                topic_filters: vec!["a".to_string()],
            },
        );
        session.track_inbound_pubrec(100);

        let drained = session.drain();
        assert_eq!(drained.len(), 3);
        assert_eq!(drained.pubacks, vec![p1]);
        assert_eq!(drained.pubrecs, vec![p2]);
        assert_eq!(drained.subscribes, vec![s1]);
        assert_eq!(session.in_flight(), 0);
        assert!(!session.has_inbound_pubrec(100));
    }

    #[test]
    fn test_retransmit_snapshot_attach() {
        let mut session = ClientSession::new("test");
        let id = session.next_packet_id();
        session.track_pending_pubrec(id, pending_publish(QoS::ExactlyOnce));

        session.attach_retransmit(id, Bytes::from_static(b"staged"));
        assert_eq!(
            session.retransmit_snapshot(id).unwrap().as_ref(),
            b"staged"
        );
    }
}
