#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod client;
pub mod command;
pub mod observer;
mod task;
pub mod transport;

pub use client::{ClientConfig, MqttClient};
pub use command::{CompletionHandle, CompletionStatus, PublishCommand, SubscribeCommand};
pub use observer::{ConnectionObserver, PublishObserver};
pub use transport::{EncryptionMode, TcpTransport, Transport};

pub use mqttlite_protocol as protocol;
