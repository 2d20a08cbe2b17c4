//! End-to-end client scenarios against a scripted broker: the broker side
//! of each exchange is played back over a real TCP socket.

use mqttlite_client::observer::{ConnectionObserver, PublishObserver};
use mqttlite_client::protocol::connection::{DisconnectReason, ReconnectConfig};
use mqttlite_client::protocol::decoder::PacketDecoder;
use mqttlite_client::protocol::packet::{
    ConnAckPacket, MqttPacket, Packet, PubAckPacket, SubAckPacket, SubAckReasonCode,
};
use mqttlite_client::protocol::types::{ConnectOptions, ProtocolVersion, QoS};
use mqttlite_client::protocol::ReasonCode;
use mqttlite_client::{
    ClientConfig, CompletionStatus, MqttClient, PublishCommand, SubscribeCommand, TcpTransport,
};
use bytes::BytesMut;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug)]
enum Observed {
    Connected(bool),
    Refused(ReasonCode),
    Disconnected(DisconnectReason),
    Topic(String),
    Payload(Vec<u8>, bool, bool),
}

struct ChannelObserver(mpsc::UnboundedSender<Observed>);

impl ConnectionObserver for ChannelObserver {
    fn on_connected(&self, session_present: bool) {
        let _ = self.0.send(Observed::Connected(session_present));
    }

    fn on_refused(&self, reason: ReasonCode) {
        let _ = self.0.send(Observed::Refused(reason));
    }

    fn on_disconnected(&self, reason: &DisconnectReason) {
        let _ = self.0.send(Observed::Disconnected(reason.clone()));
    }
}

impl PublishObserver for ChannelObserver {
    fn on_topic(&self, topic: &str) {
        let _ = self.0.send(Observed::Topic(topic.to_string()));
    }

    fn on_payload(&self, chunk: &[u8], last: bool, retain: bool) {
        let _ = self.0.send(Observed::Payload(chunk.to_vec(), last, retain));
    }
}

struct BrokerConn {
    socket: TcpStream,
    decoder: PacketDecoder,
}

impl BrokerConn {
    async fn accept(listener: &TcpListener, version: ProtocolVersion) -> Self {
        let (socket, _) = listener.accept().await.unwrap();
        Self {
            socket,
            decoder: PacketDecoder::new(version),
        }
    }

    async fn read_packet(&mut self) -> Packet {
        let mut buf = [0u8; 4096];
        loop {
            if let Some(packet) = self.decoder.next_packet().unwrap() {
                return packet;
            }
            let n = self.socket.read(&mut buf).await.unwrap();
            assert_ne!(n, 0, "client closed while broker expected a packet");
            self.decoder.feed(&buf[..n]);
        }
    }

    async fn send_packet(&mut self, packet: &Packet) {
        let mut bytes = BytesMut::new();
        packet.encode(&mut bytes).unwrap();
        self.socket.write_all(&bytes).await.unwrap();
    }

    async fn send_raw<P: MqttPacket>(&mut self, packet: &P) {
        let mut bytes = BytesMut::new();
        packet.encode(&mut bytes).unwrap();
        self.socket.write_all(&bytes).await.unwrap();
    }
}

struct Harness {
    client: MqttClient,
    events: mpsc::UnboundedReceiver<Observed>,
}

async fn start_client(port: u16, config: ClientConfig) -> Harness {
    let (tx, events) = mpsc::unbounded_channel();
    let observer = Arc::new(ChannelObserver(tx));
    let transport = TcpTransport::new("127.0.0.1", port);
    let client = MqttClient::connect(transport, config, observer.clone(), observer);
    Harness { client, events }
}

fn base_config() -> ClientConfig {
    ClientConfig::new(
        ConnectOptions::new("dev1").with_keep_alive(Duration::from_secs(120)),
    )
}

async fn expect_connected(harness: &mut Harness) {
    match timeout(TEST_TIMEOUT, harness.events.recv()).await.unwrap() {
        Some(Observed::Connected(_)) => {}
        other => panic!("expected Connected event, got {other:?}"),
    }
}

#[tokio::test]
async fn connect_accepted_scenario() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let mut conn = BrokerConn::accept(&listener, ProtocolVersion::V5).await;
        let connect = match conn.read_packet().await {
            Packet::Connect(p) => p,
            other => panic!("expected CONNECT, got {other:?}"),
        };
        assert_eq!(connect.options.client_id, "dev1");
        assert_eq!(connect.options.keep_alive_secs(), 120);
        assert_eq!(connect.protocol_version, ProtocolVersion::V5);

        conn.send_raw(&ConnAckPacket::new(false, ReasonCode::Success))
            .await;
        conn
    });

    let mut harness = start_client(port, base_config()).await;
    expect_connected(&mut harness).await;
    assert!(harness.client.is_connected());

    let _conn = broker.await.unwrap();
    harness.client.disconnect();
    harness.client.closed().await;
}

#[tokio::test]
async fn qos1_publish_completes_on_matching_puback() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let mut conn = BrokerConn::accept(&listener, ProtocolVersion::V5).await;
        let _ = conn.read_packet().await; // CONNECT
        conn.send_raw(&ConnAckPacket::new(false, ReasonCode::Success))
            .await;

        let publish = match conn.read_packet().await {
            Packet::Publish(p) => p,
            other => panic!("expected PUBLISH, got {other:?}"),
        };
        assert_eq!(publish.topic_name, "t");
        assert_eq!(publish.payload.as_ref(), b"hi");
        assert_eq!(publish.qos, QoS::AtLeastOnce);
        let packet_id = publish.packet_id.unwrap();

        conn.send_raw(&PubAckPacket::new(packet_id)).await;
        conn
    });

    let mut harness = start_client(port, base_config()).await;
    expect_connected(&mut harness).await;

    let handle = harness
        .client
        .publish(PublishCommand::new("t", b"hi".to_vec()).with_qos(QoS::AtLeastOnce))
        .unwrap();
    let status = timeout(TEST_TIMEOUT, handle.wait()).await.unwrap();
    assert_eq!(status, CompletionStatus::Ok);

    let _conn = broker.await.unwrap();
    harness.client.disconnect();
    harness.client.closed().await;
}

#[tokio::test]
async fn qos0_publish_completes_on_flush() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let mut conn = BrokerConn::accept(&listener, ProtocolVersion::V5).await;
        let _ = conn.read_packet().await;
        conn.send_raw(&ConnAckPacket::new(false, ReasonCode::Success))
            .await;
        let publish = match conn.read_packet().await {
            Packet::Publish(p) => p,
            other => panic!("expected PUBLISH, got {other:?}"),
        };
        assert!(publish.packet_id.is_none());
        conn
    });

    let mut harness = start_client(port, base_config()).await;
    expect_connected(&mut harness).await;

    let handle = harness
        .client
        .publish(PublishCommand::new("t", b"fire-and-forget".to_vec()))
        .unwrap();
    let status = timeout(TEST_TIMEOUT, handle.wait()).await.unwrap();
    assert_eq!(status, CompletionStatus::Ok);

    let _conn = broker.await.unwrap();
    harness.client.disconnect();
    harness.client.closed().await;
}

#[tokio::test]
async fn subscribe_granted_codes_surface() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let mut conn = BrokerConn::accept(&listener, ProtocolVersion::V5).await;
        let _ = conn.read_packet().await;
        conn.send_raw(&ConnAckPacket::new(false, ReasonCode::Success))
            .await;

        let subscribe = match conn.read_packet().await {
            Packet::Subscribe(p) => p,
            other => panic!("expected SUBSCRIBE, got {other:?}"),
        };
        assert_eq!(subscribe.filters[0].filter, "sensors/#");

        conn.send_raw(&SubAckPacket::new(
            subscribe.packet_id,
            vec![SubAckReasonCode::GrantedQoS1],
        ))
        .await;
        conn
    });

    let mut harness = start_client(port, base_config()).await;
    expect_connected(&mut harness).await;

    let handle = harness
        .client
        .subscribe(SubscribeCommand::subscribe("sensors/#", QoS::AtLeastOnce))
        .unwrap();
    let status = timeout(TEST_TIMEOUT, handle.wait()).await.unwrap();
    assert_eq!(
        status,
        CompletionStatus::Granted(vec![SubAckReasonCode::GrantedQoS1])
    );
    assert!(status.is_success());

    let _conn = broker.await.unwrap();
    harness.client.disconnect();
    harness.client.closed().await;
}

#[tokio::test]
async fn subscribe_aborted_when_connection_drops_before_suback() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let mut conn = BrokerConn::accept(&listener, ProtocolVersion::V5).await;
        let _ = conn.read_packet().await;
        conn.send_raw(&ConnAckPacket::new(false, ReasonCode::Success))
            .await;

        // read the SUBSCRIBE, then drop the connection without answering
        let _ = conn.read_packet().await;
        drop(conn);
    });

    let mut harness = start_client(port, base_config()).await;
    expect_connected(&mut harness).await;

    let handle = harness
        .client
        .subscribe(SubscribeCommand::subscribe("t", QoS::AtLeastOnce))
        .unwrap();
    let status = timeout(TEST_TIMEOUT, handle.wait()).await.unwrap();
    assert_eq!(status, CompletionStatus::NotConnected);

    broker.await.unwrap();
    harness.client.disconnect();
    harness.client.closed().await;
}

#[tokio::test]
async fn downgrade_reconnects_once_with_v311_framing() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        // first connection: refuse the v5 CONNECT with a version mismatch
        let mut conn = BrokerConn::accept(&listener, ProtocolVersion::V5).await;
        let connect = match conn.read_packet().await {
            Packet::Connect(p) => p,
            other => panic!("expected CONNECT, got {other:?}"),
        };
        assert_eq!(connect.protocol_version, ProtocolVersion::V5);
        conn.send_raw(&ConnAckPacket::new(
            false,
            ReasonCode::UnsupportedProtocolVersion,
        ))
        .await;
        drop(conn);

        // second connection: same identity, now framed at 3.1.1
        let mut conn = BrokerConn::accept(&listener, ProtocolVersion::V311).await;
        let connect = match conn.read_packet().await {
            Packet::Connect(p) => p,
            other => panic!("expected CONNECT, got {other:?}"),
        };
        assert_eq!(connect.protocol_version, ProtocolVersion::V311);
        assert_eq!(connect.options.client_id, "dev1");
        assert_eq!(connect.options.keep_alive_secs(), 120);

        conn.send_raw(&ConnAckPacket::new_v311(false, ReasonCode::Success))
            .await;
        conn
    });

    let mut harness = start_client(port, base_config()).await;
    expect_connected(&mut harness).await;
    assert!(harness.client.is_connected());

    let _conn = broker.await.unwrap();
    harness.client.disconnect();
    harness.client.closed().await;
}

#[tokio::test]
async fn inbound_qos1_publish_is_delivered_and_acked() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let mut conn = BrokerConn::accept(&listener, ProtocolVersion::V5).await;
        let _ = conn.read_packet().await;
        conn.send_raw(&ConnAckPacket::new(false, ReasonCode::Success))
            .await;

        let publish = mqttlite_client::protocol::packet::PublishPacket::new(
            "news/today",
            &b"headline"[..],
            QoS::AtLeastOnce,
        )
        .with_packet_id(42)
        .with_retain(true);
        conn.send_packet(&Packet::Publish(publish)).await;

        let puback = match conn.read_packet().await {
            Packet::PubAck(p) => p,
            other => panic!("expected PUBACK, got {other:?}"),
        };
        assert_eq!(puback.packet_id, 42);
        conn
    });

    let mut harness = start_client(port, base_config()).await;
    expect_connected(&mut harness).await;

    let mut topic = None;
    let mut payload = None;
    while payload.is_none() {
        match timeout(TEST_TIMEOUT, harness.events.recv()).await.unwrap() {
            Some(Observed::Topic(t)) => topic = Some(t),
            Some(Observed::Payload(bytes, last, retain)) => {
                assert!(last);
                assert!(retain);
                payload = Some(bytes);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(topic.as_deref(), Some("news/today"));
    assert_eq!(payload.unwrap(), b"headline");

    let _conn = broker.await.unwrap();
    harness.client.disconnect();
    harness.client.closed().await;
}

#[tokio::test]
async fn refused_connect_reports_reason_and_stops_without_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let mut conn = BrokerConn::accept(&listener, ProtocolVersion::V5).await;
        let _ = conn.read_packet().await;
        conn.send_raw(&ConnAckPacket::new(false, ReasonCode::NotAuthorized))
            .await;
        drop(conn);
    });

    let mut harness = start_client(port, base_config()).await;
    match timeout(TEST_TIMEOUT, harness.events.recv()).await.unwrap() {
        Some(Observed::Refused(reason)) => assert_eq!(reason, ReasonCode::NotAuthorized),
        other => panic!("expected Refused event, got {other:?}"),
    }

    broker.await.unwrap();
    assert!(!harness.client.is_connected());
    harness.client.closed().await;
}

#[tokio::test]
async fn keepalive_pings_when_idle() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        let mut conn = BrokerConn::accept(&listener, ProtocolVersion::V5).await;
        let _ = conn.read_packet().await;
        conn.send_raw(&ConnAckPacket::new(false, ReasonCode::Success))
            .await;

        let packet = conn.read_packet().await;
        assert!(matches!(packet, Packet::PingReq));
        conn.send_packet(&Packet::PingResp).await;
        conn
    });

    let config = ClientConfig::new(
        ConnectOptions::new("dev1").with_keep_alive(Duration::from_secs(1)),
    );
    let mut harness = start_client(port, config).await;
    expect_connected(&mut harness).await;

    let _conn = timeout(TEST_TIMEOUT, broker).await.unwrap().unwrap();
    harness.client.disconnect();
    harness.client.closed().await;
}

#[tokio::test]
async fn reconnect_budget_after_loss_then_gives_up() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    let broker = tokio::spawn(async move {
        // accept once, complete the handshake, then vanish: later
        // reconnect attempts hit a dead port
        let mut conn = BrokerConn::accept(&listener, ProtocolVersion::V5).await;
        let _ = conn.read_packet().await;
        conn.send_raw(&ConnAckPacket::new(false, ReasonCode::Success))
            .await;
        drop(conn);
        drop(listener);
    });

    let mut config = base_config().with_reconnect(ReconnectConfig {
        enabled: true,
        base_delay: Duration::from_millis(10),
        max_attempts: 2,
    });
    config.connect_timeout = Duration::from_millis(500);

    let mut harness = start_client(port, config).await;
    expect_connected(&mut harness).await;
    broker.await.unwrap();

    // the loss plus one failure per budgeted retry, then the task exits
    let mut connected = 0;
    let mut failures = 0;
    while let Some(event) = timeout(TEST_TIMEOUT, harness.events.recv())
        .await
        .expect("client task should give up within the budget")
    {
        match event {
            Observed::Connected(_) => connected += 1,
            Observed::Disconnected(_) => failures += 1,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(connected, 0);
    assert_eq!(failures, 3);
    harness.client.closed().await;
}

#[tokio::test]
async fn initial_connect_failure_is_terminal() {
    // nobody listens: the first attempt fails and the task must give up
    // without consuming the reconnect budget
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let config = base_config().with_reconnect(ReconnectConfig {
        enabled: true,
        base_delay: Duration::from_millis(10),
        max_attempts: 5,
    });

    let mut harness = start_client(port, config).await;

    let mut failures = 0;
    while let Some(event) = timeout(TEST_TIMEOUT, harness.events.recv())
        .await
        .expect("client task should exit after the initial failure")
    {
        match event {
            Observed::Disconnected(_) => failures += 1,
            other => panic!("unexpected event: {other:?}"),
        }
    }
    assert_eq!(failures, 1);
    harness.client.closed().await;
}
