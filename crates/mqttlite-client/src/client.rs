//! Application-facing client handle. Producers queue publish and
//! subscribe intents from any task; a single protocol task per client
//! drains them, owns the transport, and drives the engine.

use crate::command::{
    CompletionHandle, CompletionSender, PublishCommand, SubscribeCommand,
};
use crate::observer::{ConnectionObserver, PublishObserver};
use crate::task::{self, TaskContext};
use crate::transport::Transport;
use mqttlite_protocol::connection::ReconnectConfig;
use mqttlite_protocol::decoder::DEFAULT_MAX_PACKET_SIZE;
use mqttlite_protocol::error::{MqttError, Result};
use mqttlite_protocol::keepalive::KeepaliveConfig;
use mqttlite_protocol::session::SessionConfig;
use mqttlite_protocol::types::{ConnectOptions, ProtocolVersion};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Notify};

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub connect: ConnectOptions,
    /// Initial protocol mode; the engine may still downgrade to 3.1.1.
    pub protocol_version: ProtocolVersion,
    pub reconnect: ReconnectConfig,
    pub session: SessionConfig,
    pub keepalive: KeepaliveConfig,
    /// Upper bound on one connect attempt, CONNECT through CONNACK.
    pub connect_timeout: Duration,
    pub output_capacity: usize,
    pub max_packet_size: u32,
}

impl ClientConfig {
    #[must_use]
    pub fn new(connect: ConnectOptions) -> Self {
        Self {
            connect,
            protocol_version: ProtocolVersion::V5,
            reconnect: ReconnectConfig::default(),
            session: SessionConfig::default(),
            keepalive: KeepaliveConfig::default(),
            connect_timeout: Duration::from_secs(10),
            output_capacity: 8 * 1024,
            max_packet_size: DEFAULT_MAX_PACKET_SIZE,
        }
    }

    #[must_use]
    pub fn with_reconnect(mut self, reconnect: ReconnectConfig) -> Self {
        self.reconnect = reconnect;
        self
    }

    #[must_use]
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }
}

pub struct MqttClient {
    publish_tx: mpsc::UnboundedSender<(PublishCommand, CompletionSender)>,
    subscribe_tx: mpsc::UnboundedSender<(SubscribeCommand, CompletionSender)>,
    wake: Arc<Notify>,
    run: Arc<AtomicBool>,
    connected: Arc<AtomicBool>,
    auto_reconnect: Arc<AtomicBool>,
    task: tokio::task::JoinHandle<()>,
}

impl MqttClient {
    /// Starts the protocol task and begins connecting. Exactly one task
    /// owns the transport for the client's lifetime.
    pub fn connect<T>(
        transport: T,
        config: ClientConfig,
        connection_observer: Arc<dyn ConnectionObserver>,
        publish_observer: Arc<dyn PublishObserver>,
    ) -> Self
    where
        T: Transport + 'static,
    {
        let (publish_tx, publish_rx) = mpsc::unbounded_channel();
        let (subscribe_tx, subscribe_rx) = mpsc::unbounded_channel();
        let wake = Arc::new(Notify::new());
        let run = Arc::new(AtomicBool::new(true));
        let connected = Arc::new(AtomicBool::new(false));
        let auto_reconnect = Arc::new(AtomicBool::new(config.reconnect.enabled));

        let ctx = TaskContext {
            config,
            publish_rx,
            subscribe_rx,
            wake: Arc::clone(&wake),
            run: Arc::clone(&run),
            connected: Arc::clone(&connected),
            auto_reconnect: Arc::clone(&auto_reconnect),
            connection_observer,
            publish_observer,
        };

        let task = tokio::spawn(task::run_client(transport, ctx));

        Self {
            publish_tx,
            subscribe_tx,
            wake,
            run,
            connected,
            auto_reconnect,
            task,
        }
    }

    /// Queues a publish intent. Accepted even while disconnected when
    /// auto-reconnect is active; the task processes it after the session
    /// is re-established.
    pub fn publish(&self, command: PublishCommand) -> Result<CompletionHandle> {
        let (tx, rx) = oneshot::channel();
        self.publish_tx
            .send((command, tx))
            .map_err(|_| MqttError::NotConnected)?;
        self.wake.notify_one();
        Ok(CompletionHandle { rx })
    }

    /// Queues a subscribe or unsubscribe intent.
    pub fn subscribe(&self, command: SubscribeCommand) -> Result<CompletionHandle> {
        let (tx, rx) = oneshot::channel();
        self.subscribe_tx
            .send((command, tx))
            .map_err(|_| MqttError::NotConnected)?;
        self.wake.notify_one();
        Ok(CompletionHandle { rx })
    }

    /// Requests teardown. The task observes the flag at the top of its
    /// next cycle; nothing is aborted mid-packet.
    pub fn disconnect(&self) {
        self.run.store(false, Ordering::SeqCst);
        self.wake.notify_one();
    }

    pub fn set_auto_reconnect(&self, enabled: bool) {
        self.auto_reconnect.store(enabled, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Waits for the protocol task to finish its teardown.
    pub async fn closed(self) {
        let _ = self.task.await;
    }
}
