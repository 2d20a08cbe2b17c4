//! Callback surface toward the embedding application. Observers run on
//! the protocol task and must not block.

use mqttlite_protocol::connection::DisconnectReason;
use mqttlite_protocol::ReasonCode;

pub trait ConnectionObserver: Send + Sync {
    fn on_connected(&self, _session_present: bool) {}

    fn on_refused(&self, _reason: ReasonCode) {}

    fn on_disconnected(&self, _reason: &DisconnectReason) {}
}

pub trait PublishObserver: Send + Sync {
    /// Topic of an inbound publish, before its payload arrives.
    fn on_topic(&self, _topic: &str) {}

    /// Payload bytes of an inbound publish. `last` marks the final
    /// fragment of the message.
    fn on_payload(&self, chunk: &[u8], last: bool, retain: bool);
}

/// Drop-in observer for embeddings that only care about payloads or
/// nothing at all.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ConnectionObserver for NullObserver {}

impl PublishObserver for NullObserver {
    fn on_payload(&self, _chunk: &[u8], _last: bool, _retain: bool) {}
}
