//! Inbound path: framing failures, capability registration, routing and hydration

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use codec::{build_for_send, encode_frame, BodyBuilder};
use network::test_utils::CollectorSink;
use network::{
    start_hydrate_stage, ChannelError, Direction, FactoryError, MemoryNetworkLayer, MessageChannel,
    MessageFactory, MessageMapping, MessageRouter, MessageStatsMonitor, NetworkLayer,
    NullMessageMonitor, PingMessage, PongMessage, RouteError, ServerMessageChannel,
};
use types::{ChannelId, ConnectionId, MessageType};

const WAIT: Duration = Duration::from_secs(5);

struct Endpoint {
    channel: Arc<ServerMessageChannel>,
    transport: Arc<MemoryNetworkLayer>,
    router: Arc<MessageRouter>,
}

async fn endpoint(factory: MessageFactory) -> Endpoint {
    let transport = MemoryNetworkLayer::new(ConnectionId::new(11));
    let router = Arc::new(MessageRouter::new());
    let channel = ServerMessageChannel::new(
        ChannelId::new(11),
        transport.clone(),
        Arc::new(factory),
        router.clone(),
    );
    transport.open().await.unwrap();
    Endpoint {
        channel,
        transport,
        router,
    }
}

fn full_factory() -> MessageFactory {
    let factory = MessageFactory::new(Arc::new(NullMessageMonitor));
    factory
        .add_class_mapping(MessageType::Ping, MessageMapping::of::<PingMessage>())
        .unwrap();
    factory
        .add_class_mapping(MessageType::Pong, MessageMapping::of::<PongMessage>())
        .unwrap();
    factory
}

fn ping_frame(sequence: u64, payload: &str) -> Bytes {
    let mut body = BodyBuilder::new();
    body.put_u64(sequence).put_str(payload);
    encode_frame(build_for_send(MessageType::Ping, 0), body.as_slice())
}

async fn wait_closed(channel: &ServerMessageChannel) -> bool {
    let deadline = tokio::time::Instant::now() + WAIT;
    while tokio::time::Instant::now() < deadline {
        if channel.is_closed() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}

#[tokio::test]
async fn test_wrong_header_length_closes_channel() {
    let endpoint = endpoint(full_factory()).await;
    let sink = CollectorSink::new();
    endpoint.router.route_message_type(MessageType::Ping, sink.clone());

    let mut raw = ping_frame(1, "x").to_vec();
    raw[1] = 3;
    endpoint.transport.inject(vec![Bytes::from(raw)]);

    assert!(endpoint.channel.is_closed());
    assert_eq!(sink.received_count(), 0);
}

#[tokio::test]
async fn test_unknown_type_code_closes_channel() {
    let endpoint = endpoint(full_factory()).await;
    let mut raw = ping_frame(1, "x").to_vec();
    raw[2] = 0xFF;
    raw[3] = 0xFF;
    endpoint.transport.inject(vec![Bytes::from(raw)]);
    assert!(endpoint.channel.is_closed());
}

#[tokio::test]
async fn test_split_segments_parse() {
    let endpoint = endpoint(full_factory()).await;
    let sink = CollectorSink::new();
    endpoint.router.route_message_type(MessageType::Ping, sink.clone());

    // header alone in the first segment, body split over two more
    let frame = ping_frame(5, "segmented");
    endpoint.transport.inject(vec![
        frame.slice(..8),
        frame.slice(8..12),
        frame.slice(12..),
    ]);

    let mut message = sink.take_messages().remove(0);
    message.hydrate().unwrap();
    let ping = message.downcast_ref::<PingMessage>().unwrap();
    assert_eq!((ping.sequence, ping.payload.as_str()), (5, "segmented"));
}

#[tokio::test]
async fn test_inbound_only_type() {
    let factory = MessageFactory::new(Arc::new(NullMessageMonitor));
    factory
        .add_class_mapping(MessageType::Ping, MessageMapping::inbound_only::<PingMessage>())
        .unwrap();
    let endpoint = endpoint(factory).await;
    let sink = CollectorSink::new();
    endpoint.router.route_message_type(MessageType::Ping, sink.clone());

    let err = endpoint.channel.create_message(MessageType::Ping).unwrap_err();
    assert!(matches!(
        err,
        ChannelError::Factory(FactoryError::UnsupportedOperation {
            message_type: MessageType::Ping,
            direction: Direction::Outbound,
        })
    ));

    endpoint.transport.inject(vec![ping_frame(3, "in")]);
    assert_eq!(sink.received_count(), 1);
    assert!(endpoint.channel.is_open());
}

#[tokio::test]
async fn test_unmapped_type_closes_channel() {
    let factory = MessageFactory::new(Arc::new(NullMessageMonitor));
    let endpoint = endpoint(factory).await;

    assert!(matches!(
        endpoint.channel.create_message(MessageType::Ping),
        Err(ChannelError::Factory(FactoryError::NoMapping { .. }))
    ));
    endpoint.transport.inject(vec![ping_frame(1, "x")]);
    assert!(endpoint.channel.is_closed());
}

#[tokio::test]
async fn test_unrouted_type_is_an_error() {
    let endpoint = endpoint(full_factory()).await;
    let message = endpoint.channel.create_message(MessageType::Pong).unwrap();

    let err = endpoint.router.put_message(message).unwrap_err();
    assert_eq!(
        err,
        RouteError::UnsupportedMessageType {
            message_type: MessageType::Pong,
            channel: ChannelId::new(11),
        }
    );

    // received without a route: reported, channel stays up
    endpoint.transport.inject(vec![ping_frame(1, "x")]);
    assert!(endpoint.channel.is_open());
}

#[tokio::test]
async fn test_unroute_restores_default() {
    let endpoint = endpoint(full_factory()).await;
    let sink = CollectorSink::new();
    endpoint.router.route_message_type(MessageType::Ping, sink.clone());
    assert!(endpoint.router.is_routed(MessageType::Ping));

    assert!(endpoint.router.unroute_message_type(MessageType::Ping));
    assert!(!endpoint.router.unroute_message_type(MessageType::Ping));

    let message = endpoint.channel.create_message(MessageType::Ping).unwrap();
    assert!(endpoint.router.put_message(message).is_err());
    assert_eq!(sink.received_count(), 0);
}

#[tokio::test]
async fn test_hydrated_route_delivers_decoded_message() {
    let endpoint = endpoint(full_factory()).await;
    let stage = start_hydrate_stage(2);
    let sink = CollectorSink::new();
    endpoint
        .router
        .route_message_type_with_hydration(MessageType::Ping, sink.clone(), stage.clone());

    for sequence in 0..10 {
        endpoint.transport.inject(vec![ping_frame(sequence, "hydrate")]);
    }
    assert!(sink.wait_for(10, WAIT).await);

    let sequences: Vec<u64> = sink
        .take_messages()
        .iter()
        .map(|message| {
            assert!(message.is_hydrated());
            message.downcast_ref::<PingMessage>().unwrap().sequence
        })
        .collect();
    // a single source channel always maps to the same worker
    assert_eq!(sequences, (0..10).collect::<Vec<_>>());
    stage.stop().await;
}

#[tokio::test]
async fn test_hydration_failure_closes_channel() {
    let endpoint = endpoint(full_factory()).await;
    let stage = start_hydrate_stage(1);
    let sink = CollectorSink::new();
    endpoint
        .router
        .route_message_type_with_hydration(MessageType::Ping, sink.clone(), stage.clone());

    // valid header, truncated body
    let frame = encode_frame(build_for_send(MessageType::Ping, 0), &[0, 0, 1]);
    endpoint.transport.inject(vec![frame]);

    assert!(wait_closed(&endpoint.channel).await);
    assert_eq!(sink.received_count(), 0);
    assert!(endpoint.transport.is_closed());
    stage.stop().await;
}

#[tokio::test]
async fn test_monitor_counts_both_directions() {
    let monitor = Arc::new(MessageStatsMonitor::new());
    let factory = MessageFactory::new(monitor.clone());
    factory
        .add_class_mapping(MessageType::Ping, MessageMapping::of::<PingMessage>())
        .unwrap();
    let endpoint = endpoint(factory).await;
    endpoint
        .router
        .route_message_type(MessageType::Ping, CollectorSink::new());

    let frame = ping_frame(1, "abc");
    endpoint.transport.inject(vec![frame.clone()]);

    let mut outbound = endpoint.channel.create_message(MessageType::Ping).unwrap();
    outbound.downcast_mut::<PingMessage>().unwrap().set(1, "abc");
    endpoint.channel.send(outbound).await.unwrap();

    let inbound = monitor.stats(Direction::Inbound, MessageType::Ping);
    let sent = monitor.stats(Direction::Outbound, MessageType::Ping);
    assert_eq!(inbound.messages, 1);
    assert_eq!(inbound.bytes, frame.len() as u64);
    assert_eq!(sent.messages, 1);
    assert_eq!(sent.bytes, frame.len() as u64);
}
