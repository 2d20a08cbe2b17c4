mod connect;
mod message;
mod publish;
mod subscribe;

pub use connect::{ConnectOptions, ConnectProperties, DisconnectProperties, ServerProperties};
pub use message::{Message, MessageProperties, WillMessage, WillProperties};
pub use publish::PublishProperties;
pub use subscribe::{SubscribeProperties, UnsubscribeProperties};

pub use crate::v5::reason_codes::ReasonCode;

/// Wire protocol level: 4 for MQTT 3.1.1, 5 for MQTT 5.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProtocolVersion {
    V311,
    #[default]
    V5,
}

impl ProtocolVersion {
    #[must_use]
    pub fn as_u8(self) -> u8 {
        match self {
            ProtocolVersion::V311 => 4,
            ProtocolVersion::V5 => 5,
        }
    }

    #[must_use]
    pub fn is_v5(self) -> bool {
        matches!(self, ProtocolVersion::V5)
    }
}

impl From<ProtocolVersion> for u8 {
    fn from(version: ProtocolVersion) -> Self {
        version.as_u8()
    }
}

impl TryFrom<u8> for ProtocolVersion {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(ProtocolVersion::V311),
            5 => Ok(ProtocolVersion::V5),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum QoS {
    AtMostOnce = 0,
    AtLeastOnce = 1,
    ExactlyOnce = 2,
}

impl QoS {
    /// Strict conversion; use for values arriving off the wire.
    pub fn try_from_u8(value: u8) -> crate::error::Result<Self> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(crate::error::MqttError::InvalidQoS(other)),
        }
    }
}

impl From<u8> for QoS {
    fn from(value: u8) -> Self {
        match value {
            1 => QoS::AtLeastOnce,
            2 => QoS::ExactlyOnce,
            _ => QoS::AtMostOnce,
        }
    }
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> Self {
        qos as u8
    }
}
