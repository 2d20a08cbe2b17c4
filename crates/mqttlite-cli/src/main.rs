//! `mqttlite` — publish/subscribe front end mirroring the device shell:
//! connect parameters (server, port, encryption mode, credentials), a
//! publish verb and a subscribe/unsubscribe verb, auto-reconnect, and a
//! client-id override.

use anyhow::{bail, Result};
use clap::{Args, Parser, Subcommand};
use mqttlite_client::protocol::connection::{DisconnectReason, ReconnectConfig};
use mqttlite_client::protocol::types::{ConnectOptions, ProtocolVersion, QoS};
use mqttlite_client::protocol::ReasonCode;
use mqttlite_client::{
    ClientConfig, CompletionStatus, ConnectionObserver, EncryptionMode, MqttClient,
    PublishCommand, PublishObserver, SubscribeCommand, TcpTransport,
};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tracing::debug;

/// The device shell caps client ids at 20 characters.
const MAX_CLIENT_ID_LEN: usize = 20;

#[derive(Parser)]
#[command(name = "mqttlite", version, about = "MQTT 3.1.1 / 5.0 client")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable debug logging
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Publish a message to a topic
    Pub(PubArgs),
    /// Subscribe to a topic filter and print incoming messages
    Sub(SubArgs),
}

#[derive(Args)]
struct ConnectArgs {
    /// Broker host
    #[arg(long, short = 'H', default_value = "localhost")]
    host: String,

    /// Broker port
    #[arg(long, short, default_value = "1883")]
    port: u16,

    /// Encryption: 0 none, 1 TLS-PSK, 2 one-way certificate, 3 two-way
    /// certificate
    #[arg(long, short, default_value = "0")]
    encryption: u8,

    /// Client identifier (max 20 characters)
    #[arg(long, short, value_parser = parse_client_id)]
    client_id: Option<String>,

    /// Username for authentication
    #[arg(long, short)]
    username: Option<String>,

    /// Password for authentication
    #[arg(long, short = 'P')]
    password: Option<String>,

    /// Keep-alive interval in seconds
    #[arg(long, default_value = "120")]
    keep_alive: u64,

    /// Reconnect automatically after the connection drops
    #[arg(long)]
    auto_reconnect: bool,

    /// Start in MQTT 3.1.1 instead of 5.0
    #[arg(long)]
    v311: bool,
}

#[derive(Args)]
struct PubArgs {
    #[command(flatten)]
    connect: ConnectArgs,

    /// Topic to publish to
    #[arg(long, short)]
    topic: String,

    /// Message payload
    #[arg(long, short)]
    message: String,

    /// Quality of service (0-2)
    #[arg(long, short, default_value = "0", value_parser = parse_qos)]
    qos: u8,

    /// Ask the broker to retain the message
    #[arg(long, short)]
    retain: bool,
}

#[derive(Args)]
struct SubArgs {
    #[command(flatten)]
    connect: ConnectArgs,

    /// Topic filter
    #[arg(long, short)]
    topic: String,

    /// Maximum quality of service (0-2)
    #[arg(long, short, default_value = "0", value_parser = parse_qos)]
    qos: u8,

    /// Send an UNSUBSCRIBE instead of a SUBSCRIBE
    #[arg(long)]
    unsubscribe: bool,

    /// Exit after this many messages (default: until ctrl-c)
    #[arg(long, short = 'n')]
    count: Option<u32>,
}

fn parse_qos(s: &str) -> Result<u8, String> {
    match s.parse::<u8>() {
        Ok(qos @ 0..=2) => Ok(qos),
        _ => Err("QoS must be 0, 1 or 2".to_string()),
    }
}

fn parse_client_id(s: &str) -> Result<String, String> {
    if s.is_empty() {
        return Err("client id must not be empty".to_string());
    }
    if s.len() > MAX_CLIENT_ID_LEN {
        return Err(format!("client id len must <= {MAX_CLIENT_ID_LEN}"));
    }
    Ok(s.to_string())
}

struct ShellObserver {
    messages_seen: AtomicU32,
    limit: Option<u32>,
    done: Notify,
}

impl ShellObserver {
    fn new(limit: Option<u32>) -> Self {
        Self {
            messages_seen: AtomicU32::new(0),
            limit,
            done: Notify::new(),
        }
    }
}

impl ConnectionObserver for ShellObserver {
    fn on_connected(&self, session_present: bool) {
        debug!(session_present, "session established");
        println!("MQTT: successfully connected to server");
    }

    fn on_refused(&self, reason: ReasonCode) {
        println!(
            "MQTT: connection refused, reason is {}, id is {}",
            reason.description(),
            u8::from(reason)
        );
        self.done.notify_one();
    }

    fn on_disconnected(&self, reason: &DisconnectReason) {
        match reason {
            DisconnectReason::ClientInitiated => println!("MQTT: disconnect with server"),
            other => println!("MQTT: connection lost: {other:?}"),
        }
        self.done.notify_one();
    }
}

impl PublishObserver for ShellObserver {
    fn on_topic(&self, topic: &str) {
        println!("MQTT: received message on topic '{topic}'");
    }

    fn on_payload(&self, chunk: &[u8], last: bool, _retain: bool) {
        println!("  {}", String::from_utf8_lossy(chunk));
        if last {
            let seen = self.messages_seen.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(limit) = self.limit {
                if seen >= limit {
                    self.done.notify_one();
                }
            }
        }
    }
}

fn build_client(
    connect: &ConnectArgs,
    observer: Arc<ShellObserver>,
) -> Result<MqttClient> {
    let mode = EncryptionMode::try_from(connect.encryption)
        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
    if mode != EncryptionMode::None {
        bail!(
            "encryption mode {} requires a TLS transport from the embedding application",
            connect.encryption
        );
    }

    let client_id = connect
        .client_id
        .clone()
        .unwrap_or_else(|| "mqttlite-client".to_string());

    let mut options = ConnectOptions::new(client_id)
        .with_keep_alive(Duration::from_secs(connect.keep_alive));
    if let (Some(username), Some(password)) = (&connect.username, &connect.password) {
        options = options.with_credentials(username.clone(), password.as_bytes());
    }

    let mut config = ClientConfig::new(options);
    if connect.v311 {
        config.protocol_version = ProtocolVersion::V311;
    }
    if connect.auto_reconnect {
        config.reconnect = ReconnectConfig::enabled();
    }

    let transport = TcpTransport::new(connect.host.clone(), connect.port);
    Ok(MqttClient::connect(
        transport,
        config,
        observer.clone(),
        observer,
    ))
}

async fn wait_connected(client: &MqttClient, observer: &ShellObserver) -> Result<()> {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(15);
    while !client.is_connected() {
        if tokio::time::Instant::now() >= deadline {
            bail!("MQTT: connection timed out");
        }
        tokio::select! {
            () = observer.done.notified() => bail!("MQTT: connect to server failed"),
            () = tokio::time::sleep(Duration::from_millis(50)) => {}
        }
    }
    Ok(())
}

async fn run_pub(args: PubArgs) -> Result<()> {
    let observer = Arc::new(ShellObserver::new(None));
    let client = build_client(&args.connect, observer.clone())?;
    wait_connected(&client, &observer).await?;

    let command = PublishCommand::new(args.topic.clone(), args.message.into_bytes())
        .with_qos(QoS::from(args.qos))
        .with_retain(args.retain);
    let handle = client.publish(command)?;

    match handle.wait().await {
        CompletionStatus::Ok => println!("MQTT: published to '{}'", args.topic),
        status => bail!("MQTT: publish failed: {status:?}"),
    }

    client.disconnect();
    client.closed().await;
    Ok(())
}

async fn run_sub(args: SubArgs) -> Result<()> {
    let observer = Arc::new(ShellObserver::new(args.count));
    let client = build_client(&args.connect, observer.clone())?;
    wait_connected(&client, &observer).await?;

    let command = if args.unsubscribe {
        SubscribeCommand::unsubscribe(args.topic.clone())
    } else {
        SubscribeCommand::subscribe(args.topic.clone(), QoS::from(args.qos))
    };
    let handle = client.subscribe(command)?;

    match handle.wait().await {
        status if status.is_success() => {
            if args.unsubscribe {
                println!("MQTT: unsubscribed from '{}'", args.topic);
                client.disconnect();
                client.closed().await;
                return Ok(());
            }
            println!("MQTT: subscribed to '{}'", args.topic);
        }
        status => bail!("MQTT: subscribe failed: {status:?}"),
    }

    tokio::select! {
        _ = signal::ctrl_c() => println!("\nMQTT: interrupted"),
        () = observer.done.notified() => {}
    }

    client.disconnect();
    client.closed().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    match cli.command {
        Command::Pub(args) => run_pub(args).await,
        Command::Sub(args) => run_sub(args).await,
    }
}
