//! Landmark WebSocket
//!
//! Each connection gets its own `StreamSession`. The session pushes into a
//! bounded queue; a writer task drains it onto the socket in order and
//! watches the inbound half for the client going away. When the writer
//! stops, the queue closes and the session winds down.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{Sink, SinkExt, Stream, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::error::StreamError;
use crate::stream::{StreamMessage, StreamSession};
use crate::AppState;

/// `GET /ws/landmarks`
pub async fn landmarks_socket(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_client(socket, state))
}

/// Stream landmarks to one connected client until it disconnects
pub async fn serve_client(socket: WebSocket, state: Arc<AppState>) {
    let config = state.config.read().await.clone();
    let registration = state.begin_session();
    let id = registration.id();

    tracing::info!("WebSocket client connected (session {})", id);

    let (tx, rx) = mpsc::channel(config.stream.queue_capacity);
    let (sink, inbound) = socket.split();
    let writer = tokio::spawn(forward_messages(sink, inbound, rx, id));

    let session = StreamSession::new(id, &config);
    let summary = session
        .run(state.backend(), tx, state.subscribe_shutdown())
        .await;

    if writer.await.is_err() {
        tracing::warn!("Session {} writer task panicked", id);
    }

    tracing::info!(
        "WebSocket connection closed (session {}). Total frames processed: {}",
        id,
        summary.frames_processed
    );
}

/// Serialize a message as a WebSocket text frame
pub fn encode(message: &StreamMessage) -> Result<Message, StreamError> {
    serde_json::to_string(message)
        .map(Message::Text)
        .map_err(|e| StreamError::Encode(e.to_string()))
}

/// Drain the session queue onto the socket until either side goes away.
///
/// Returning drops `rx`, which is what tells the session its client is gone.
async fn forward_messages<Tx, Rx>(
    mut sink: Tx,
    mut inbound: Rx,
    mut rx: mpsc::Receiver<StreamMessage>,
    id: u64,
) where
    Tx: Sink<Message> + Unpin,
    Rx: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        tokio::select! {
            outgoing = rx.recv() => {
                let Some(message) = outgoing else {
                    break;
                };
                let frame = match encode(&message) {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("Session {}: {}", id, e);
                        continue;
                    }
                };
                if sink.send(frame).await.is_err() {
                    tracing::info!("Session {}: client disconnected", id);
                    break;
                }
            }
            incoming = inbound.next() => match incoming {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => {
                    tracing::info!("Session {}: client disconnected", id);
                    break;
                }
                // The client has nothing to say after connecting
                Some(Ok(_)) => {}
            }
        }
    }

    drop(rx);
    let _ = sink.close().await;
}
