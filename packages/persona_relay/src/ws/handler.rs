//! WebSocket Handler
//!
//! One task per connection. A reader task feeds inbound frames into a bounded
//! queue, the dispatch loop relays them one at a time, and a writer task owns
//! the socket's sending half. Messages that arrive while the queue is full are
//! answered with an `error` frame and dropped.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::metrics::ServerMetrics;
use crate::protocol::ServerMessage;
use crate::relay::Relay;
use crate::session::SessionStore;

use super::registry::ConnectionRegistry;

/// Serve one WebSocket connection until the client goes away
pub async fn handle_connection(
    socket: WebSocket,
    relay: Arc<Relay>,
    registry: Arc<ConnectionRegistry>,
    metrics: Arc<ServerMetrics>,
) {
    let (handle, mut rx) = registry.register().await;
    let conn_id = handle.id();
    metrics.connection_opened();
    info!(conn_id = %conn_id, "WebSocket connection opened");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let closed = CancellationToken::new();

    // Writer: one JSON text frame per message, in queue order
    let metrics_out = metrics.clone();
    let closed_out = closed.clone();
    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                closed_out.cancel();
                break;
            }
            metrics_out.frame_sent();
        }
    });

    // Reader: forward text frames, cancel the token when the socket closes
    let capacity = registry.limits().inbound_queue_capacity;
    let (inbound_tx, mut inbound_rx) = mpsc::channel::<String>(capacity);
    let closed_in = closed.clone();
    let busy_out = handle.clone();
    let metrics_in = metrics.clone();
    let reader_task = tokio::spawn(async move {
        while let Some(msg) = ws_receiver.next().await {
            match msg {
                Ok(Message::Text(text)) => match inbound_tx.try_send(text.to_string()) {
                    Ok(()) => {}
                    Err(TrySendError::Full(_)) => {
                        metrics_in.message_rejected();
                        warn!(conn_id = %conn_id, "Inbound queue full, dropping message");
                        busy_out.try_send(ServerMessage::error(format!(
                            "Server busy: {} messages already pending, message dropped",
                            capacity
                        )));
                    }
                    Err(TrySendError::Closed(_)) => break,
                },
                Ok(Message::Close(_)) => break,
                Ok(Message::Binary(_)) => debug!(conn_id = %conn_id, "Ignoring binary frame"),
                Ok(_) => {}
                Err(e) => {
                    warn!(conn_id = %conn_id, "WebSocket receive error: {}", e);
                    break;
                }
            }
        }
        closed_in.cancel();
    });

    let mut sessions = SessionStore::new();
    loop {
        let text = tokio::select! {
            biased;
            _ = closed.cancelled() => break,
            next = inbound_rx.recv() => match next {
                Some(text) => text,
                None => break,
            },
        };
        metrics.message_received();

        tokio::select! {
            result = relay.dispatch(&handle, &mut sessions, &text) => {
                if result.is_err() {
                    break;
                }
            }
            _ = closed.cancelled() => {
                info!(conn_id = %conn_id, "Client disconnected mid-relay, dropping stream");
                break;
            }
        }
    }

    registry.unregister(conn_id).await;
    drop(handle);
    reader_task.abort();
    let _ = reader_task.await;
    if let Err(e) = sender_task.await {
        if !e.is_cancelled() {
            warn!(conn_id = %conn_id, "Writer task failed: {}", e);
        }
    }

    metrics.connection_closed();
    info!(
        conn_id = %conn_id,
        sessions = sessions.len(),
        "WebSocket connection closed"
    );
}
