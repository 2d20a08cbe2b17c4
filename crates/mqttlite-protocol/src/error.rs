use crate::v5::reason_codes::ReasonCode;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, MqttError>;

#[derive(Debug, Clone, Error)]
pub enum MqttError {
    #[error("IO error: {0}")]
    Io(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Connection refused: {0:?}")]
    ConnectionRefused(ReasonCode),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Malformed packet: {0}")]
    MalformedPacket(String),

    #[error("Packet too large: size {size} exceeds maximum {max}")]
    PacketTooLarge { size: usize, max: usize },

    #[error("Output buffer full: {needed} bytes needed, {available} available")]
    BufferFull { needed: usize, available: usize },

    #[error("Not connected")]
    NotConnected,

    #[error("Already connected")]
    AlreadyConnected,

    #[error("Timeout")]
    Timeout,

    #[error("Keep alive timeout")]
    KeepAliveTimeout,

    #[error("Connection closed by peer")]
    ConnectionClosedByPeer,

    #[error("Client closed connection")]
    ClientClosed,

    #[error("Packet identifier not found: {0}")]
    PacketIdNotFound(u16),

    #[error("Packet identifier already in use: {0}")]
    PacketIdInUse(u16),

    #[error("Request pool exhausted: {0} requests already in flight")]
    RequestPoolExhausted(usize),

    #[error("Invalid QoS: {0}")]
    InvalidQoS(u8),

    #[error("Invalid packet type: {0}")]
    InvalidPacketType(u8),

    #[error("Invalid reason code: {0}")]
    InvalidReasonCode(u8),

    #[error("Invalid property ID: {0}")]
    InvalidPropertyId(u8),

    #[error("Duplicate property ID: {0}")]
    DuplicatePropertyId(u8),

    #[error("Topic alias invalid: {0}")]
    TopicAliasInvalid(u16),

    #[error("Unsupported protocol version")]
    UnsupportedProtocolVersion,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid topic name: {0}")]
    InvalidTopicName(String),

    #[error("Invalid client ID: {0}")]
    InvalidClientId(String),

    #[error("String too long: {0} bytes exceeds maximum of 65535")]
    StringTooLong(usize),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl MqttError {
    #[must_use]
    pub fn is_normal_disconnect(&self) -> bool {
        matches!(self, Self::ClientClosed | Self::ConnectionClosedByPeer)
    }
}

impl From<std::io::Error> for MqttError {
    fn from(err: std::io::Error) -> Self {
        MqttError::Io(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MqttError::PacketTooLarge {
            size: 1000,
            max: 500,
        };
        assert_eq!(
            err.to_string(),
            "Packet too large: size 1000 exceeds maximum 500"
        );

        let err = MqttError::ConnectionRefused(ReasonCode::BadUsernameOrPassword);
        assert_eq!(err.to_string(), "Connection refused: BadUsernameOrPassword");
    }

    #[test]
    fn test_error_from_io() {
        use std::io;
        let io_err = io::Error::new(io::ErrorKind::ConnectionRefused, "test");
        let mqtt_err: MqttError = io_err.into();
        match mqtt_err {
            MqttError::Io(e) => assert!(e.contains("test")),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_normal_disconnect_classification() {
        assert!(MqttError::ClientClosed.is_normal_disconnect());
        assert!(MqttError::ConnectionClosedByPeer.is_normal_disconnect());
        assert!(!MqttError::Timeout.is_normal_disconnect());
    }
}
