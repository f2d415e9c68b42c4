//! Client channel lifecycle, session fencing and message flow over in-memory transports

use std::sync::Arc;

use codec::BodyBuilder;
use network::test_utils::{CollectorSink, RecordingListener};
use network::{
    register_builtin_messages, ChannelError, ChannelEventType, ChannelLifecycle,
    ClientMessageChannel, MemoryNetworkLayer, MessageChannel, MessageFactory, MessageRouter,
    NetworkLayer, NullMessageMonitor, PingMessage, ServerMessageChannel,
};
use types::{ChannelId, ConnectionId, MessageType, SessionId};

struct Pair {
    client: Arc<ClientMessageChannel>,
    client_transport: Arc<MemoryNetworkLayer>,
    server: Arc<ServerMessageChannel>,
    server_transport: Arc<MemoryNetworkLayer>,
    received: Arc<CollectorSink>,
}

fn factory() -> Arc<MessageFactory> {
    let factory = MessageFactory::new(Arc::new(NullMessageMonitor));
    register_builtin_messages(&factory).unwrap();
    Arc::new(factory)
}

fn pair(id: u64) -> Pair {
    let (client_transport, server_transport) = MemoryNetworkLayer::pair(ConnectionId::new(id));

    let server_router = Arc::new(MessageRouter::new());
    let received = CollectorSink::new();
    server_router.route_message_type(MessageType::Ping, received.clone());
    let server = ServerMessageChannel::new(
        ChannelId::new(id),
        server_transport.clone(),
        factory(),
        server_router,
    );

    let client = ClientMessageChannel::new(
        client_transport.clone(),
        factory(),
        Arc::new(MessageRouter::new()),
    );

    Pair {
        client,
        client_transport,
        server,
        server_transport,
        received,
    }
}

async fn connect(pair: &Pair) -> ChannelId {
    pair.server_transport.open().await.unwrap();
    pair.client.open().await.unwrap()
}

async fn send_ping(channel: &ClientMessageChannel, sequence: u64) -> Result<(), ChannelError> {
    let mut message = channel.create_message(MessageType::Ping)?;
    message
        .downcast_mut::<PingMessage>()
        .unwrap()
        .set(sequence, "ping");
    channel.send(message).await
}

#[tokio::test]
async fn test_open_assigns_channel_id_once() {
    let pair = pair(42);
    assert_eq!(pair.client.lifecycle(), ChannelLifecycle::Init);
    assert!(pair.client.channel_id().is_null());

    let id = connect(&pair).await;
    assert_eq!(id, ChannelId::new(42));
    assert_eq!(pair.client.lifecycle(), ChannelLifecycle::Open);
    assert_eq!(pair.client.connect_count(), 1);
    assert_eq!(pair.client.connect_attempt_count(), 1);
    assert!(pair.server.is_open());

    // a second open is a lifecycle violation
    let err = pair.client.open().await.unwrap_err();
    assert!(matches!(
        err,
        ChannelError::IllegalTransition {
            state: ChannelLifecycle::Open,
            ..
        }
    ));
}

#[tokio::test]
async fn test_message_reaches_server_sink() {
    let pair = pair(1);
    connect(&pair).await;

    send_ping(&pair.client, 7).await.unwrap();
    assert_eq!(pair.client_transport.sent_count(), 1);

    let mut messages = pair.received.take_messages();
    assert_eq!(messages.len(), 1);
    let mut message = messages.remove(0);
    assert!(!message.is_hydrated());
    assert_eq!(message.channel_id(), ChannelId::new(1));

    message.hydrate().unwrap();
    let ping = message.downcast_ref::<PingMessage>().unwrap();
    assert_eq!(ping.sequence, 7);
    assert_eq!(ping.payload, "ping");
}

#[tokio::test]
async fn test_send_before_open_and_after_close() {
    let pair = pair(2);
    let message = pair.client.create_message(MessageType::Ping).unwrap();
    assert!(matches!(
        pair.client.send(message).await,
        Err(ChannelError::NotOpen { .. })
    ));

    connect(&pair).await;
    pair.client.close();

    assert!(matches!(
        pair.client.create_message(MessageType::Ping),
        Err(ChannelError::Closed { .. })
    ));
    assert!(matches!(send_ping(&pair.client, 1).await, Err(ChannelError::Closed { .. })));
    assert!(pair.client_transport.is_closed());
}

#[tokio::test]
async fn test_stale_session_message_never_sent() {
    let pair = pair(3);
    connect(&pair).await;
    assert_eq!(pair.client.session_id(), SessionId::NULL);

    let mut stale = pair.client.create_message(MessageType::Ping).unwrap();
    stale.downcast_mut::<PingMessage>().unwrap().set(1, "stale");
    assert_eq!(stale.session_id(), SessionId::NULL);

    // connection lost, then re-established
    pair.client_transport.drop_connection();
    assert_eq!(pair.client.session_id(), SessionId::new(1));
    pair.client.reset().unwrap();
    pair.server_transport.open().await.unwrap();
    pair.client.open().await.unwrap();

    // dropped silently
    pair.client.send(stale).await.unwrap();
    assert_eq!(pair.client_transport.sent_count(), 0);
    assert_eq!(pair.received.message_count(), 0);

    send_ping(&pair.client, 2).await.unwrap();
    assert_eq!(pair.client_transport.sent_count(), 1);
    assert_eq!(pair.received.message_count(), 1);

    assert_eq!(pair.client.channel_id(), ChannelId::new(3));
    assert_eq!(pair.client.connect_count(), 2);
}

#[tokio::test]
async fn test_session_bump_alone_fences_send() {
    let pair = pair(4);
    connect(&pair).await;

    let message = pair.client.create_message(MessageType::Ping).unwrap();
    pair.client_transport.drop_connection();

    // the channel is still OPEN; the stale message is dropped rather than failing
    assert!(pair.client.is_open());
    pair.client.send(message).await.unwrap();
    assert_eq!(pair.client_transport.sent_count(), 0);
}

#[tokio::test]
async fn test_disconnect_events_and_reset() {
    let pair = pair(5);
    let listener = RecordingListener::new();
    pair.client.add_listener(listener.clone());
    connect(&pair).await;

    pair.client_transport.drop_connection();
    pair.client.reset().unwrap();
    assert_eq!(pair.client.lifecycle(), ChannelLifecycle::Init);

    assert_eq!(
        listener.events(),
        vec![
            (ChannelEventType::TransportConnected, ChannelId::new(5)),
            (ChannelEventType::TransportDisconnected, ChannelId::new(5)),
        ]
    );

    pair.client.close();
    assert!(pair.client.reset().is_err());
    assert_eq!(listener.count(ChannelEventType::ChannelClosed), 1);
}

#[test]
fn test_concurrent_close_single_side_effect() {
    let pair = pair(6);
    let listener = RecordingListener::new();
    pair.client.add_listener(listener.clone());

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let channel = pair.client.clone();
            std::thread::spawn(move || channel.close())
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pair.client.lifecycle(), ChannelLifecycle::Closed);
    assert_eq!(listener.count(ChannelEventType::ChannelClosed), 1);
    assert!(pair.client_transport.is_closed());
}

#[tokio::test]
async fn test_attachments() {
    let pair = pair(7);
    let previous = pair
        .server
        .add_attachment("session-state", Arc::new(String::from("first")), false);
    assert!(previous.is_none());

    let kept = pair
        .server
        .add_attachment("session-state", Arc::new(String::from("second")), false)
        .unwrap();
    assert_eq!(kept.downcast_ref::<String>().map(String::as_str), Some("first"));

    let replaced = pair
        .server
        .add_attachment("session-state", Arc::new(String::from("third")), true)
        .unwrap();
    assert_eq!(replaced.downcast_ref::<String>().map(String::as_str), Some("first"));
    assert!(pair.server.remove_attachment("session-state").is_some());
    assert!(pair.server.get_attachment("session-state").is_none());
}

#[tokio::test]
async fn test_server_replies_on_same_channel() {
    let pair = pair(8);
    connect(&pair).await;

    let mut pong = pair.server.create_message(MessageType::Pong).unwrap();
    pong.downcast_mut::<network::PongMessage>()
        .unwrap()
        .set(9, "pong");
    pair.server.send(pong).await.unwrap();
    assert_eq!(pair.server_transport.sent_count(), 1);

    // the frame carries the PONG header followed by the encoded body
    let frame = pair.server_transport.sent_frames().remove(0);
    let mut body = BodyBuilder::new();
    body.put_u64(9).put_str("pong");
    assert_eq!(&frame[8..], body.as_slice());
    assert_eq!(&frame[..4], &[1, 2, 0, 2]);
}
