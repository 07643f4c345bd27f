//! `WsConnector` against a real WebSocket server on the loopback interface.

#![allow(clippy::unwrap_used)]

mod support;

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use axum::routing::get;
use gunshot_stream::{ConnectionManager, ConnectionSettings, Connector, StreamError, WsConnector};
use gunshot_types::{ConnectionState, MicId, StreamMessage};
use serde_json::json;
use support::{legacy_event, roster_frame};

async fn serve_frames(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(push_then_close)
}

async fn push_then_close(mut socket: WebSocket) {
    let frames = [
        roster_frame(&[(1, 42.33, -83.04), (2, 42.34, -83.05)]),
        "garbage".to_owned(),
        json!([legacy_event(7, 1.0, 1.0, 1_700_000_000_000_000)]).to_string(),
    ];
    for frame in frames {
        if socket.send(Message::Text(frame.into())).await.is_err() {
            return;
        }
    }
    let _ = socket.send(Message::Close(None)).await;
}

/// Accepts the upgrade, then never reads or writes: a half-open peer.
async fn serve_silence(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|socket| async move {
        let _socket = socket;
        std::future::pending::<()>().await;
    })
}

/// Reads (so pings are answered) but never sends data.
async fn serve_quiet(ws: WebSocketUpgrade) -> Response {
    ws.on_upgrade(|mut socket| async move {
        while let Some(Ok(_)) = socket.recv().await {}
    })
}

async fn spawn_backend() -> SocketAddr {
    let app = Router::new()
        .route("/ws", get(serve_frames))
        .route("/silent", get(serve_silence))
        .route("/quiet", get(serve_quiet));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

#[tokio::test]
async fn frames_arrive_decoded_and_close_triggers_reconnect() {
    let addr = spawn_backend().await;
    let connector = WsConnector::new(format!("ws://{addr}/ws"));
    let mut manager = ConnectionManager::new(
        connector,
        ConnectionSettings {
            backoff: Duration::from_secs(30),
            channel_capacity: 8,
        },
    );
    let mut messages = manager.messages().unwrap();
    let mut state = manager.watch_state();
    manager.connect();

    let roster = tokio::time::timeout(Duration::from_secs(5), messages.recv())
        .await
        .unwrap()
        .unwrap();
    let ids: Vec<MicId> = match roster {
        StreamMessage::Roster(sensors) => sensors.iter().map(|s| s.mic_id).collect(),
        StreamMessage::Events(_) => Vec::new(),
    };
    assert_eq!(ids, vec![MicId(1), MicId(2)]);

    let events = tokio::time::timeout(Duration::from_secs(5), messages.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(events, StreamMessage::Events(ref e) if e.len() == 1));

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::ReconnectWait),
    )
    .await
    .unwrap()
    .unwrap();

    manager.close().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn refused_handshake_is_a_handshake_error() {
    // Bind then drop to get a port nobody listens on.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let connector = WsConnector::new(format!("ws://{addr}/ws"));
    let result = connector.connect().await;
    assert!(matches!(result, Err(StreamError::Handshake(_))));
}

fn short_timeouts(url: String) -> WsConnector {
    WsConnector::new(url).with_timeouts(
        Duration::from_millis(200),
        Duration::from_millis(50),
        Duration::from_millis(250),
    )
}

fn manager(connector: WsConnector) -> ConnectionManager {
    ConnectionManager::new(
        connector,
        ConnectionSettings {
            backoff: Duration::from_secs(30),
            channel_capacity: 8,
        },
    )
}

#[tokio::test]
async fn silent_peer_is_detected_as_lost() {
    let addr = spawn_backend().await;
    let mut manager = manager(short_timeouts(format!("ws://{addr}/silent")));
    let mut state = manager.watch_state();
    manager.connect();

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Open),
    )
    .await
    .unwrap()
    .unwrap();
    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::ReconnectWait),
    )
    .await
    .unwrap()
    .unwrap();

    manager.close().await;
    assert_eq!(manager.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn quiet_peer_answering_pings_stays_open() {
    let addr = spawn_backend().await;
    let mut manager = manager(short_timeouts(format!("ws://{addr}/quiet")));
    let mut state = manager.watch_state();
    manager.connect();

    tokio::time::timeout(
        Duration::from_secs(5),
        state.wait_for(|s| *s == ConnectionState::Open),
    )
    .await
    .unwrap()
    .unwrap();
    // Several idle timeouts with no data frames.
    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(manager.state(), ConnectionState::Open);

    manager.close().await;
}

#[tokio::test]
async fn stalled_handshake_times_out() {
    // Accepts TCP connections and never answers the upgrade request.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _socket = socket;
                std::future::pending::<()>().await;
            });
        }
    });

    let connector = short_timeouts(format!("ws://{addr}/ws"));
    let result = tokio::time::timeout(Duration::from_secs(5), connector.connect())
        .await
        .unwrap();
    assert!(matches!(result, Err(StreamError::Handshake(_))));
}
