//! Application intents queued toward the protocol task, and the
//! completion surface each request resolves through.

use mqttlite_protocol::packet::SubAckReasonCode;
use mqttlite_protocol::types::QoS;
use mqttlite_protocol::ReasonCode;
use tokio::sync::oneshot;

#[derive(Debug, Clone)]
pub struct PublishCommand {
    pub topic: String,
    pub payload: Vec<u8>,
    pub qos: QoS,
    pub retain: bool,
}

impl PublishCommand {
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            qos: QoS::AtMostOnce,
            retain: false,
        }
    }

    #[must_use]
    pub fn with_qos(mut self, qos: QoS) -> Self {
        self.qos = qos;
        self
    }

    #[must_use]
    pub fn with_retain(mut self, retain: bool) -> Self {
        self.retain = retain;
        self
    }
}

/// Subscribe when `subscribe` is true, unsubscribe otherwise — the same
/// one-flag shape the device shell queues.
#[derive(Debug, Clone)]
pub struct SubscribeCommand {
    pub topic: String,
    pub qos: QoS,
    pub subscribe: bool,
}

impl SubscribeCommand {
    #[must_use]
    pub fn subscribe(topic: impl Into<String>, qos: QoS) -> Self {
        Self {
            topic: topic.into(),
            qos,
            subscribe: true,
        }
    }

    #[must_use]
    pub fn unsubscribe(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            qos: QoS::AtMostOnce,
            subscribe: false,
        }
    }
}

/// Terminal outcome of one queued request. Every queued command resolves
/// exactly once with one of these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionStatus {
    /// Acknowledged (QoS 0: flushed to the transport).
    Ok,
    /// SUBACK granted/failed codes, one per filter.
    Granted(Vec<SubAckReasonCode>),
    /// The broker or engine refused the request.
    Refused(ReasonCode),
    /// No acknowledgement within the ack window.
    Timeout,
    /// The connection closed while the request was in flight.
    NotConnected,
}

impl CompletionStatus {
    #[must_use]
    pub fn is_success(&self) -> bool {
        match self {
            Self::Ok => true,
            Self::Granted(codes) => codes.iter().all(SubAckReasonCode::is_success),
            _ => false,
        }
    }
}

pub(crate) type CompletionSender = oneshot::Sender<CompletionStatus>;

/// Awaitable handle for one queued request.
#[derive(Debug)]
pub struct CompletionHandle {
    pub(crate) rx: oneshot::Receiver<CompletionStatus>,
}

impl CompletionHandle {
    /// Resolves when the request completes. A dropped protocol task
    /// counts as a connection loss.
    pub async fn wait(self) -> CompletionStatus {
        self.rx.await.unwrap_or(CompletionStatus::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builders() {
        let publish = PublishCommand::new("t", b"payload".to_vec())
            .with_qos(QoS::AtLeastOnce)
            .with_retain(true);
        assert_eq!(publish.qos, QoS::AtLeastOnce);
        assert!(publish.retain);

        let sub = SubscribeCommand::subscribe("t/#", QoS::ExactlyOnce);
        assert!(sub.subscribe);
        let unsub = SubscribeCommand::unsubscribe("t/#");
        assert!(!unsub.subscribe);
    }

    #[test]
    fn test_completion_status_success() {
        assert!(CompletionStatus::Ok.is_success());
        assert!(CompletionStatus::Granted(vec![SubAckReasonCode::GrantedQoS1]).is_success());
        assert!(!CompletionStatus::Granted(vec![SubAckReasonCode::NotAuthorized]).is_success());
        assert!(!CompletionStatus::Timeout.is_success());
        assert!(!CompletionStatus::NotConnected.is_success());
    }

    #[tokio::test]
    async fn test_dropped_sender_resolves_not_connected() {
        let (tx, rx) = oneshot::channel();
        drop(tx);
        let handle = CompletionHandle { rx };
        assert_eq!(handle.wait().await, CompletionStatus::NotConnected);
    }
}
