//! The protocol task: one per client, sole owner of the transport and
//! the engine. Each cycle drains the publish queue, then the subscribe
//! queue, then waits for inbound bytes, the one-second keep-alive tick,
//! or a producer wake-up. Teardown happens at the top of a cycle, never
//! mid-packet.

use crate::client::ClientConfig;
use crate::command::{CompletionSender, CompletionStatus, PublishCommand, SubscribeCommand};
use crate::observer::{ConnectionObserver, PublishObserver};
use crate::transport::Transport;
use mqttlite_protocol::client::{ClientProtocol, ProtocolAction};
use mqttlite_protocol::connection::DisconnectReason;
use mqttlite_protocol::decoder::PacketDecoder;
use mqttlite_protocol::error::MqttError;
use mqttlite_protocol::keepalive::{KeepaliveEvent, KeepaliveTracker};
use mqttlite_protocol::output::OutputBuffer;
use mqttlite_protocol::packet::{Packet, SubscriptionOptions, UnsubAckReasonCode};
use mqttlite_protocol::types::QoS;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tracing::{debug, error, trace, warn};

pub(crate) struct TaskContext {
    pub config: ClientConfig,
    pub publish_rx: mpsc::UnboundedReceiver<(PublishCommand, CompletionSender)>,
    pub subscribe_rx: mpsc::UnboundedReceiver<(SubscribeCommand, CompletionSender)>,
    pub wake: Arc<Notify>,
    pub run: Arc<AtomicBool>,
    pub connected: Arc<AtomicBool>,
    pub auto_reconnect: Arc<AtomicBool>,
    pub connection_observer: Arc<dyn ConnectionObserver>,
    pub publish_observer: Arc<dyn PublishObserver>,
}

/// Outbound staging and per-request completion channels, owned by the
/// task across reconnect attempts.
struct ClientIo {
    output: OutputBuffer,
    completions: HashMap<u16, CompletionSender>,
    /// QoS 0 publishes complete on flush, in send order.
    qos0_flush_queue: Vec<CompletionSender>,
}

impl ClientIo {
    fn new(output_capacity: usize) -> Self {
        Self {
            output: OutputBuffer::new(output_capacity),
            completions: HashMap::new(),
            qos0_flush_queue: Vec::new(),
        }
    }
}

enum LoopExit {
    /// Caller requested teardown; finish cleanly.
    Teardown,
    /// The connection died; reconnect policy decides what happens next.
    Lost,
}

pub(crate) async fn run_client<T: Transport>(mut transport: T, mut ctx: TaskContext) {
    let mut protocol = ClientProtocol::new(&ctx.config.connect.client_id)
        .with_protocol_version(ctx.config.protocol_version);
    *protocol.config_mut() = ctx.config.session.clone();

    let mut io = ClientIo::new(ctx.config.output_capacity);
    let mut attempt: u8 = 0;
    // retries are a recovery policy: the budget opens only after the
    // first successful connection, as on the device
    let mut ever_connected = false;

    while ctx.run.load(Ordering::SeqCst) {
        match establish(&mut transport, &mut protocol, &mut io, &ctx).await {
            Ok(mut decoder) => {
                debug!("MQTT: successfully connected to server");
                attempt = 0;
                ever_connected = true;
                ctx.connected.store(true, Ordering::SeqCst);
                let exit =
                    connected_loop(&mut transport, &mut protocol, &mut decoder, &mut io, &mut ctx)
                        .await;
                ctx.connected.store(false, Ordering::SeqCst);
                let _ = transport.close().await;
                if matches!(exit, LoopExit::Teardown) {
                    break;
                }
            }
            Err(reason) => {
                debug!(?reason, "MQTT: connect attempt failed");
                match &reason {
                    DisconnectReason::Refused(code) => ctx.connection_observer.on_refused(*code),
                    other => ctx.connection_observer.on_disconnected(other),
                }
            }
        }

        if !ctx.run.load(Ordering::SeqCst) {
            break;
        }
        let retry = ever_connected
            && ctx.auto_reconnect.load(Ordering::SeqCst)
            && attempt < ctx.config.reconnect.max_attempts;
        if !retry {
            break;
        }
        let delay = ctx.config.reconnect.delay(attempt);
        attempt = attempt.saturating_add(1);
        if !delay.is_zero() {
            debug!(?delay, attempt, "MQTT: waiting before reconnect");
            tokio::time::sleep(delay).await;
        }
    }

    teardown(&mut transport, &mut protocol, &mut io, &mut ctx).await;
}

/// One full connect handshake: open transport, send CONNECT, await
/// CONNACK within the connect time limit. Runs the handshake a second
/// time in 3.1.1 framing when the engine downgrades.
async fn establish<T: Transport>(
    transport: &mut T,
    protocol: &mut ClientProtocol,
    io: &mut ClientIo,
    ctx: &TaskContext,
) -> Result<PacketDecoder, DisconnectReason> {
    'attempt: loop {
        // anything staged for a previous connection is stale
        io.output.clear();

        let actions = protocol.start_connect(&ctx.config.connect);
        if actions.iter().any(ProtocolAction::is_error) {
            return Err(DisconnectReason::ProtocolError(
                "connect refused by engine state".to_string(),
            ));
        }

        debug!(
            version = ?protocol.protocol_version(),
            "MQTT: linking server"
        );
        if let Err(e) = transport.connect().await {
            let _ = protocol.connection_lost(DisconnectReason::NetworkError(e.to_string()));
            return Err(DisconnectReason::NetworkError(e.to_string()));
        }

        let mut decoder = PacketDecoder::new(protocol.protocol_version())
            .with_max_packet_size(ctx.config.max_packet_size);

        for action in protocol.transport_connected() {
            if let ProtocolAction::SendPacket(packet) = action {
                if let Err(e) = io.output.append_packet(&packet) {
                    let _ = protocol.connection_lost(DisconnectReason::ProtocolError(e.to_string()));
                    let _ = transport.close().await;
                    return Err(DisconnectReason::ProtocolError(e.to_string()));
                }
            }
        }
        if let Err(e) = flush(transport, io).await {
            let _ = protocol.connection_lost(DisconnectReason::NetworkError(e.to_string()));
            let _ = transport.close().await;
            return Err(DisconnectReason::NetworkError(e.to_string()));
        }

        let deadline = Instant::now() + ctx.config.connect_timeout;
        let mut rbuf = vec![0u8; 4096];

        loop {
            let now = Instant::now();
            if now >= deadline {
                let _ = protocol.connection_lost(DisconnectReason::ConnectTimeout);
                let _ = transport.close().await;
                return Err(DisconnectReason::ConnectTimeout);
            }

            let read = timeout(deadline - now, transport.read(&mut rbuf)).await;
            let n = match read {
                Err(_) => {
                    let _ = protocol.connection_lost(DisconnectReason::ConnectTimeout);
                    let _ = transport.close().await;
                    return Err(DisconnectReason::ConnectTimeout);
                }
                Ok(Err(e)) => {
                    let _ = protocol.connection_lost(DisconnectReason::NetworkError(e.to_string()));
                    let _ = transport.close().await;
                    return Err(DisconnectReason::NetworkError(e.to_string()));
                }
                Ok(Ok(0)) => {
                    let _ = protocol.connection_lost(DisconnectReason::ServerClosed);
                    let _ = transport.close().await;
                    return Err(DisconnectReason::ServerClosed);
                }
                Ok(Ok(n)) => n,
            };
            decoder.feed(&rbuf[..n]);

            loop {
                let packet = match decoder.next_packet() {
                    Ok(Some(packet)) => packet,
                    Ok(None) => break,
                    Err(e) => {
                        error!("malformed packet during connect: {e}");
                        let reason = DisconnectReason::ProtocolError(e.to_string());
                        let _ = protocol.connection_lost(reason.clone());
                        let _ = transport.close().await;
                        return Err(reason);
                    }
                };

                let mut downgraded = false;
                let mut refused = None;
                let mut complete = false;

                for action in protocol.handle_packet(&packet) {
                    match action {
                        ProtocolAction::ConnectionComplete {
                            session_present, ..
                        } => {
                            complete = true;
                            ctx.connection_observer.on_connected(session_present);
                        }
                        ProtocolAction::Downgrade { version } => {
                            warn!(
                                ?version,
                                "MQTT: server does not support version 5.0, switching to 3.1.1"
                            );
                            downgraded = true;
                        }
                        ProtocolAction::Disconnect { reason } => refused = Some(reason),
                        ProtocolAction::SendPacket(packet) => {
                            let _ = io.output.append_packet(&packet);
                        }
                        ProtocolAction::Error { code, message } => {
                            debug!(?code, message, "handshake error");
                        }
                        _ => {}
                    }
                }

                if downgraded {
                    let _ = transport.close().await;
                    continue 'attempt;
                }
                if let Some(reason) = refused {
                    let _ = transport.close().await;
                    return Err(reason);
                }
                if complete {
                    if let Err(e) = flush(transport, io).await {
                        let reason = DisconnectReason::NetworkError(e.to_string());
                        let _ = protocol.connection_lost(reason.clone());
                        let _ = transport.close().await;
                        return Err(reason);
                    }
                    return Ok(decoder);
                }
            }
        }
    }
}

enum Event {
    Read(usize),
    ReadError(MqttError),
    Tick,
    Wake,
}

async fn connected_loop<T: Transport>(
    transport: &mut T,
    protocol: &mut ClientProtocol,
    decoder: &mut PacketDecoder,
    io: &mut ClientIo,
    ctx: &mut TaskContext,
) -> LoopExit {
    let keep_alive_secs = protocol
        .config()
        .server
        .server_keep_alive
        .unwrap_or_else(|| ctx.config.connect.keep_alive_secs());
    let mut keepalive = KeepaliveTracker::with_config(keep_alive_secs, ctx.config.keepalive);

    let mut tick = tokio::time::interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
    tick.tick().await;

    let mut rbuf = vec![0u8; 4096];

    loop {
        if !ctx.run.load(Ordering::SeqCst) {
            return LoopExit::Teardown;
        }

        while let Ok((command, tx)) = ctx.publish_rx.try_recv() {
            let qos0 = command.qos == QoS::AtMostOnce;
            let actions =
                protocol.publish(&command.topic, &command.payload, command.qos, command.retain);
            submit_command(protocol, io, &*ctx, actions, qos0, tx);
        }
        while let Ok((command, tx)) = ctx.subscribe_rx.try_recv() {
            let actions = if command.subscribe {
                protocol.subscribe(&[(
                    command.topic.clone(),
                    SubscriptionOptions::new(command.qos),
                )])
            } else {
                protocol.unsubscribe(&[command.topic.clone()])
            };
            submit_command(protocol, io, &*ctx, actions, false, tx);
        }

        if !io.output.is_empty() {
            match flush(transport, io).await {
                Ok(()) => keepalive.record_outbound(),
                Err(e) => {
                    let actions =
                        protocol.connection_lost(DisconnectReason::NetworkError(e.to_string()));
                    let _ = process_actions(protocol, io, &*ctx, actions);
                    return LoopExit::Lost;
                }
            }
        }

        if !protocol.is_connected() {
            return LoopExit::Lost;
        }

        let event = tokio::select! {
            result = transport.read(&mut rbuf) => match result {
                Ok(n) => Event::Read(n),
                Err(e) => Event::ReadError(e),
            },
            _ = tick.tick() => Event::Tick,
            () = ctx.wake.notified() => Event::Wake,
        };

        match event {
            Event::Read(0) => {
                let actions = protocol.connection_lost(DisconnectReason::ServerClosed);
                let _ = process_actions(protocol, io, &*ctx, actions);
                return LoopExit::Lost;
            }
            Event::Read(n) => {
                keepalive.record_inbound();
                decoder.feed(&rbuf[..n]);
                loop {
                    match decoder.next_packet() {
                        Ok(Some(packet)) => {
                            trace!(packet_type = ?packet.packet_type(), "received packet");
                            let actions = protocol.handle_packet(&packet);
                            if !process_actions(protocol, io, &*ctx, actions) {
                                return LoopExit::Lost;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            error!("malformed packet: {e}");
                            let actions = protocol
                                .connection_lost(DisconnectReason::ProtocolError(e.to_string()));
                            let _ = process_actions(protocol, io, &*ctx, actions);
                            return LoopExit::Lost;
                        }
                    }
                }
            }
            Event::ReadError(e) => {
                let actions =
                    protocol.connection_lost(DisconnectReason::NetworkError(e.to_string()));
                let _ = process_actions(protocol, io, &*ctx, actions);
                return LoopExit::Lost;
            }
            Event::Tick => match keepalive.on_tick() {
                KeepaliveEvent::SendPing => {
                    trace!("keep-alive interval reached, sending PINGREQ");
                    let actions = protocol.ping();
                    if !process_actions(protocol, io, &*ctx, actions) {
                        return LoopExit::Lost;
                    }
                }
                KeepaliveEvent::Timeout => {
                    warn!("MQTT: server watchdog expired");
                    let actions = protocol.connection_lost(DisconnectReason::KeepAliveTimeout);
                    let _ = process_actions(protocol, io, &*ctx, actions);
                    return LoopExit::Lost;
                }
                KeepaliveEvent::None => {}
            },
            Event::Wake => {}
        }
    }
}

/// Routes a queued command's actions: an engine refusal resolves the
/// completion immediately, an acknowledged request parks it under its
/// packet id, and a QoS 0 publish waits for the next flush.
fn submit_command(
    protocol: &mut ClientProtocol,
    io: &mut ClientIo,
    ctx: &TaskContext,
    actions: Vec<ProtocolAction>,
    fire_on_flush: bool,
    tx: CompletionSender,
) {
    let mut tx = Some(tx);

    for action in &actions {
        match action {
            ProtocolAction::Error { code, .. } => {
                if let Some(tx) = tx.take() {
                    let _ = tx.send(CompletionStatus::Refused(*code));
                }
            }
            ProtocolAction::TrackPendingAck { packet_id, .. } => {
                if let Some(tx) = tx.take() {
                    io.completions.insert(*packet_id, tx);
                }
            }
            _ => {}
        }
    }

    let _ = process_actions(protocol, io, ctx, actions);

    if let Some(tx) = tx {
        if fire_on_flush {
            io.qos0_flush_queue.push(tx);
        } else {
            let _ = tx.send(CompletionStatus::NotConnected);
        }
    }
}

/// Performs a batch of engine actions. Returns false once the connection
/// is down and the caller should leave the connected loop.
fn process_actions(
    protocol: &mut ClientProtocol,
    io: &mut ClientIo,
    ctx: &TaskContext,
    actions: Vec<ProtocolAction>,
) -> bool {
    let mut alive = true;

    for action in actions {
        match action {
            ProtocolAction::SendPacket(packet) => stage_packet(protocol, io, &packet),
            ProtocolAction::DeliverMessage(message) => {
                ctx.publish_observer.on_topic(&message.topic);
                ctx.publish_observer
                    .on_payload(&message.payload, true, message.retain);
            }
            ProtocolAction::PublishComplete {
                packet_id,
                reason_code,
            } => {
                let status = if reason_code.is_success() {
                    CompletionStatus::Ok
                } else {
                    CompletionStatus::Refused(reason_code)
                };
                complete(io, packet_id, status);
            }
            ProtocolAction::SubscribeComplete { packet_id, codes } => {
                complete(io, packet_id, CompletionStatus::Granted(codes));
            }
            ProtocolAction::UnsubscribeComplete { packet_id, codes } => {
                // an empty code list is the 3.1.1 blanket success
                let ok = codes.iter().all(UnsubAckReasonCode::is_success);
                let status = if ok {
                    CompletionStatus::Ok
                } else {
                    CompletionStatus::Refused(
                        mqttlite_protocol::ReasonCode::UnspecifiedError,
                    )
                };
                complete(io, packet_id, status);
            }
            ProtocolAction::RequestTimeout { packet_id, .. } => {
                complete(io, packet_id, CompletionStatus::Timeout);
            }
            ProtocolAction::RequestAborted { packet_id, .. } => {
                complete(io, packet_id, CompletionStatus::NotConnected);
            }
            ProtocolAction::ConnectionComplete {
                session_present, ..
            } => {
                ctx.connection_observer.on_connected(session_present);
            }
            ProtocolAction::Disconnect { reason } => {
                match &reason {
                    DisconnectReason::Refused(code) => ctx.connection_observer.on_refused(*code),
                    other => ctx.connection_observer.on_disconnected(other),
                }
                alive = false;
            }
            ProtocolAction::Downgrade { .. } => {
                // only valid during the handshake, which handles it itself
                warn!("downgrade outside connect handshake");
                alive = false;
            }
            ProtocolAction::Error { code, message } => {
                debug!(?code, message, "protocol engine error");
            }
            ProtocolAction::StateTransition(state) => {
                trace!(?state, "state transition");
            }
            ProtocolAction::TrackPendingAck { .. }
            | ProtocolAction::RemovePendingAck { .. }
            | ProtocolAction::ScheduleTimeout { .. }
            | ProtocolAction::CancelTimeout { .. }
            | ProtocolAction::UpdateServerLimits { .. } => {}
        }
    }

    alive
}

fn stage_packet(protocol: &mut ClientProtocol, io: &mut ClientIo, packet: &Packet) {
    match io.output.append_packet(packet) {
        Ok(range) => {
            if let Packet::Publish(publish) = packet {
                if let Some(packet_id) = publish.packet_id {
                    let snapshot = io.output.snapshot(range);
                    protocol.attach_retransmit(packet_id, snapshot);
                }
            }
        }
        Err(e) => warn!("failed to stage {:?}: {e}", packet.packet_type()),
    }
}

fn complete(io: &mut ClientIo, packet_id: u16, status: CompletionStatus) {
    if let Some(tx) = io.completions.remove(&packet_id) {
        let _ = tx.send(status);
    }
}

/// Hands staged bytes to the transport, then fires queued QoS 0
/// completions in send order.
async fn flush<T: Transport>(transport: &mut T, io: &mut ClientIo) -> Result<(), MqttError> {
    if io.output.is_empty() {
        return Ok(());
    }
    let bytes = io.output.take();
    transport.write(&bytes).await?;
    for tx in io.qos0_flush_queue.drain(..) {
        let _ = tx.send(CompletionStatus::Ok);
    }
    Ok(())
}

async fn teardown<T: Transport>(
    transport: &mut T,
    protocol: &mut ClientProtocol,
    io: &mut ClientIo,
    ctx: &mut TaskContext,
) {
    let actions = protocol.disconnect();
    let _ = process_actions(protocol, io, &*ctx, actions);
    if let Err(e) = flush(transport, io).await {
        debug!("teardown flush failed: {e}");
    }
    let _ = transport.close().await;

    while let Ok((_, tx)) = ctx.publish_rx.try_recv() {
        let _ = tx.send(CompletionStatus::NotConnected);
    }
    while let Ok((_, tx)) = ctx.subscribe_rx.try_recv() {
        let _ = tx.send(CompletionStatus::NotConnected);
    }
    for (_, tx) in io.completions.drain() {
        let _ = tx.send(CompletionStatus::NotConnected);
    }
    for tx in io.qos0_flush_queue.drain(..) {
        let _ = tx.send(CompletionStatus::NotConnected);
    }

    debug!("MQTT: disconnected from server");
}
