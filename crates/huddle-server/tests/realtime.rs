//! End-to-end tests over a real WebSocket connection.

use futures_util::{SinkExt, StreamExt};
use huddle_protocol::{codec, codes, ChatEvent, EventKind, Frame, PROTOCOL_VERSION};
use huddle_server::{serve, AppState, Config};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start() -> (SocketAddr, Arc<AppState>) {
    start_with(Config::default()).await
}

async fn start_with(mut config: Config) -> (SocketAddr, Arc<AppState>) {
    config.metrics.enabled = false;
    let state = Arc::new(AppState::new(config));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve(listener, state.clone()));
    (addr, state)
}

async fn connect(addr: SocketAddr) -> Client {
    let (client, _) = connect_async(format!("ws://{addr}/ws")).await.unwrap();
    client
}

async fn send_json(client: &mut Client, frame: &Frame) {
    let text = codec::encode_text(frame).unwrap();
    client.send(Message::Text(text)).await.unwrap();
}

async fn next_frame(client: &mut Client) -> Frame {
    loop {
        let msg = timeout(Duration::from_secs(2), client.next())
            .await
            .expect("timed out waiting for frame")
            .expect("connection closed")
            .unwrap();
        match msg {
            Message::Text(text) => return codec::decode_text(&text).unwrap(),
            Message::Binary(data) => return codec::decode(&data).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message: {other:?}"),
        }
    }
}

/// Read frames until one matches, skipping the rest.
async fn wait_for(client: &mut Client, pred: impl Fn(&Frame) -> bool) -> Frame {
    loop {
        let frame = next_frame(client).await;
        if pred(&frame) {
            return frame;
        }
    }
}

fn is_event(kind: EventKind, sender: &str) -> impl Fn(&Frame) -> bool + '_ {
    move |frame| matches!(frame, Frame::Event { event, .. } if event.kind == kind && event.sender == sender)
}

#[tokio::test]
async fn chat_round_trip_over_json() {
    let (addr, state) = start().await;
    let room = state
        .members
        .registry()
        .create_room("ALPHA", 2, "hostA")
        .unwrap();
    let topic = format!("room/{}", room.id);

    let mut a = connect(addr).await;
    let mut b = connect(addr).await;

    send_json(&mut a, &Frame::connect(PROTOCOL_VERSION)).await;
    assert!(matches!(next_frame(&mut a).await, Frame::Connected { .. }));

    for client in [&mut a, &mut b] {
        send_json(client, &Frame::subscribe(1, &topic)).await;
        assert_eq!(next_frame(client).await, Frame::ack(1));
    }

    let add_user = format!("chat/{}/addUser", room.id);
    send_json(&mut a, &Frame::send_with_ack(2, &add_user, ChatEvent::join("userA"))).await;
    wait_for(&mut a, |f| *f == Frame::ack(2)).await;

    let send_message = format!("/app/chat/{}/sendMessage", room.id);
    send_json(
        &mut a,
        &Frame::send(&send_message, ChatEvent::chat("userA", "hi")),
    )
    .await;

    wait_for(&mut b, is_event(EventKind::Join, "userA")).await;
    match wait_for(&mut b, is_event(EventKind::Chat, "userA")).await {
        Frame::Event { topic: t, event } => {
            assert_eq!(t, topic);
            assert_eq!(event.content.as_deref(), Some("hi"));
        }
        other => panic!("unexpected frame {other:?}"),
    }

    assert_eq!(
        state.members.registry().get_room(&room.id).unwrap().current_members,
        1
    );
}

#[tokio::test]
async fn binary_clients_get_binary_replies() {
    let (addr, _) = start().await;
    let mut client = connect(addr).await;

    let data = codec::encode(&Frame::subscribe(5, "public")).unwrap();
    client.send(Message::Binary(data.to_vec())).await.unwrap();

    let msg = timeout(Duration::from_secs(2), client.next())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    match msg {
        Message::Binary(data) => assert_eq!(codec::decode(&data).unwrap(), Frame::ack(5)),
        other => panic!("expected binary reply, got {other:?}"),
    }
}

#[tokio::test]
async fn garbage_gets_an_error_frame() {
    let (addr, _) = start().await;
    let mut client = connect(addr).await;

    client
        .send(Message::Text("{\"type\":\"shout\"}".to_string()))
        .await
        .unwrap();
    match next_frame(&mut client).await {
        Frame::Error { code, .. } => assert_eq!(code, codes::INVALID_FRAME),
        other => panic!("expected error frame, got {other:?}"),
    }

    // The connection survives
    send_json(&mut client, &Frame::ping()).await;
    assert!(matches!(next_frame(&mut client).await, Frame::Pong { .. }));
}

#[tokio::test]
async fn disconnect_broadcasts_leave() {
    let (addr, state) = start().await;
    let room = state
        .members
        .registry()
        .create_room("ALPHA", 4, "hostA")
        .unwrap();
    let topic = format!("room/{}", room.id);

    let mut watcher = connect(addr).await;
    send_json(&mut watcher, &Frame::subscribe(1, &topic)).await;
    assert_eq!(next_frame(&mut watcher).await, Frame::ack(1));

    let mut a = connect(addr).await;
    let add_user = format!("chat/{}/addUser", room.id);
    send_json(&mut a, &Frame::send_with_ack(1, &add_user, ChatEvent::join("userA"))).await;
    assert_eq!(next_frame(&mut a).await, Frame::ack(1));
    wait_for(&mut watcher, is_event(EventKind::Join, "userA")).await;

    a.close(None).await.unwrap();
    drop(a);

    wait_for(&mut watcher, is_event(EventKind::Leave, "userA")).await;
    assert_eq!(
        state.members.registry().get_room(&room.id).unwrap().current_members,
        0
    );
}

#[tokio::test]
async fn upgrades_past_the_limit_are_refused() {
    let mut config = Config::default();
    config.limits.max_connections = 1;
    let (addr, state) = start_with(config).await;

    let mut first = connect(addr).await;
    send_json(&mut first, &Frame::ping()).await;
    assert!(matches!(next_frame(&mut first).await, Frame::Pong { .. }));

    match connect_async(format!("ws://{addr}/ws")).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status(), 503);
        }
        Err(other) => panic!("unexpected error: {other:?}"),
        Ok(_) => panic!("second connection should be refused"),
    }
    assert_eq!(state.gateway.connection_count(), 1);
}
