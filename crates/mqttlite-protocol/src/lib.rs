#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::cast_lossless)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod connection;
pub mod decoder;
pub mod encoding;
pub mod error;
pub mod keepalive;
pub mod output;
pub mod packet;
pub mod packet_id;
pub mod qos2;
pub mod session;
pub mod types;
pub mod v5;

pub use connection::{DisconnectReason, ReconnectConfig};
pub use decoder::PacketDecoder;
pub use error::{MqttError, Result};
pub use keepalive::{KeepaliveConfig, KeepaliveEvent, KeepaliveTracker};
pub use output::OutputBuffer;
pub use packet::{FixedHeader, MqttPacket, Packet, PacketType};
pub use v5::properties::{Properties, PropertyId, PropertyValue, PropertyValueType};
pub use v5::reason_codes::ReasonCode;
pub use types::{
    ConnectOptions, ConnectProperties, Message, MessageProperties, ProtocolVersion,
    PublishProperties, QoS, ServerProperties, SubscribeProperties, UnsubscribeProperties,
    WillMessage, WillProperties,
};
