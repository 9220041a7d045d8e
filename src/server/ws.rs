//! WebSocket viewer/controller connections
//!
//! Each connection is a push subscriber: frames travel from the broadcaster
//! through a small per-connection channel to the socket writer, so a slow
//! viewer only skips frames and never holds up the others. Text messages from
//! the client are command submissions.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, trace, warn};

use super::ServerState;
use crate::bridge::Bridge;
use crate::distributor::FrameSink;
use crate::types::{CommandToken, VideoFrame};
use crate::{BridgeError, Result};

/// [`FrameSink`] feeding one WebSocket connection.
pub struct WsFrameSink {
    connection: u64,
    tx: mpsc::Sender<VideoFrame>,
}

impl WsFrameSink {
    pub fn new(connection: u64, tx: mpsc::Sender<VideoFrame>) -> Self {
        Self { connection, tx }
    }
}

#[async_trait::async_trait]
impl FrameSink for WsFrameSink {
    async fn send_frame(&self, frame: VideoFrame) -> Result<()> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(frame)) => {
                trace!(connection = self.connection, seq = frame.seq, "Viewer lagging, frame skipped");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(BridgeError::sink(self.connection, "connection closed")),
        }
    }
}

/// Turn a client text message into a queued command.
///
/// Returns the reply for the client, or `None` when the message was ignored.
pub(crate) fn submit_command(bridge: &Bridge, text: &str) -> Option<String> {
    let token = match CommandToken::from_message(text) {
        Ok(token) => token,
        Err(e) => {
            warn!("Ignoring client message: {}", e);
            return None;
        }
    };

    let reply = format!("Server: command {token} queued");
    match bridge.submit(token) {
        Ok(()) => Some(reply),
        Err(e) => {
            warn!("Command not queued: {}", e);
            None
        }
    }
}

/// WebSocket upgrade handler
pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<ServerState>>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<ServerState>) {
    let connection = state.next_connection();
    let bridge = &state.bridge;

    let (frame_tx, mut frame_rx) = mpsc::channel(bridge.config().video.broadcast_depth.max(1));
    let subscriber = bridge.add_subscriber(Arc::new(WsFrameSink::new(connection, frame_tx)));
    let cancel = bridge.cancellation_token();

    let (mut sender, mut receiver) = socket.split();
    info!(connection, "WebSocket client connected");

    let mut closed = false;
    let mut frames_sent = 0u64;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,

            frame = frame_rx.recv() => {
                let Some(frame) = frame else { break };
                if sender.send(Message::Binary(frame.as_bytes().to_vec())).await.is_err() {
                    debug!(connection, "Failed to send frame, client disconnected");
                    break;
                }
                frames_sent += 1;
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = submit_command(bridge, &text) {
                            if sender.send(Message::Text(reply)).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sender.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        debug!(connection, "WebSocket client requested close");
                        closed = true;
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(connection, "WebSocket receive error: {}", e);
                        break;
                    }
                    None => break,
                }
            }
        }
    }

    bridge.remove_subscriber(subscriber);
    if !closed {
        let _ = sender.send(Message::Close(None)).await;
    }

    info!(connection, frames_sent, "WebSocket client disconnected");
}
