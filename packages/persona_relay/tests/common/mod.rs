#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use persona_relay::protocol::ServerMessage;
use persona_relay::ws::ConnectionLimits;
use persona_relay::{AppState, PacingPolicy, PacingUnit, build_router};
use responses_stream::ScriptedUpstream;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve the full router on an ephemeral port, pacing by character without delay
pub async fn spawn_server(upstream: ScriptedUpstream) -> (SocketAddr, AppState) {
    let pacing = PacingPolicy::new(PacingUnit::Character, Duration::ZERO);
    spawn_server_with(upstream, pacing, ConnectionLimits::default()).await
}

pub async fn spawn_server_with(
    upstream: ScriptedUpstream,
    pacing: PacingPolicy,
    limits: ConnectionLimits,
) -> (SocketAddr, AppState) {
    let state = AppState::new(Arc::new(upstream), pacing, limits);
    let app = build_router(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

pub async fn connect(addr: SocketAddr) -> Client {
    let (ws, _) = connect_async(format!("ws://{}/ws", addr)).await.unwrap();
    ws
}

pub async fn send_json(ws: &mut Client, value: serde_json::Value) {
    ws.send(Message::text(value.to_string())).await.unwrap();
}

/// Next outbound frame, decoded
pub async fn next_frame(ws: &mut Client) -> ServerMessage {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        match msg {
            Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame {:?}", other),
        }
    }
}

/// Frames up to and including the first one matching `done`
pub async fn frames_until(
    ws: &mut Client,
    done: impl Fn(&ServerMessage) -> bool,
) -> Vec<ServerMessage> {
    let mut frames = Vec::new();
    loop {
        let frame = next_frame(ws).await;
        let stop = done(&frame);
        frames.push(frame);
        if stop {
            return frames;
        }
    }
}

pub fn is_response(frame: &ServerMessage) -> bool {
    matches!(frame, ServerMessage::Response { .. })
}

pub fn is_terminal(frame: &ServerMessage) -> bool {
    matches!(
        frame,
        ServerMessage::Response { .. } | ServerMessage::Error { .. }
    )
}
