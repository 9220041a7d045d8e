//! HTTP/WebSocket surface over the bridge engine
//!
//! | Route       | Purpose                                                  |
//! |-------------|----------------------------------------------------------|
//! | `/ws`       | Binary JPEG frames out, JSON `{"command": n}` text in    |
//! | `/snapshot` | Latest frame as `image/jpeg`, 503 while video is absent   |
//! | `/health`   | JSON status: readiness, device address, counters         |

mod http;
mod ws;

pub use http::HealthResponse;
pub use ws::WsFrameSink;

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::routing::get;
use tokio::net::TcpListener;
use tracing::info;

use crate::bridge::Bridge;
use crate::{BridgeError, Result};

/// Shared state for all handlers.
pub struct ServerState {
    pub bridge: Arc<Bridge>,
    connections: AtomicU64,
}

impl ServerState {
    pub fn new(bridge: Arc<Bridge>) -> Self {
        Self { bridge, connections: AtomicU64::new(0) }
    }

    fn next_connection(&self) -> u64 {
        self.connections.fetch_add(1, Ordering::Relaxed)
    }
}

/// Build the router with all routes.
pub fn router(bridge: Arc<Bridge>) -> Router {
    let state = Arc::new(ServerState::new(bridge));
    Router::new()
        .route("/ws", get(ws::ws_handler))
        .route("/snapshot", get(http::snapshot))
        .route("/health", get(http::health))
        .with_state(state)
}

/// Serve on `addr` until the bridge shuts down.
pub async fn serve(bridge: Arc<Bridge>, addr: SocketAddr) -> Result<()> {
    let listener = TcpListener::bind(addr).await.map_err(|e| BridgeError::bind_failed("http", addr, e))?;
    serve_on(listener, bridge).await
}

/// Serve on an already bound listener until the bridge shuts down.
pub async fn serve_on(listener: TcpListener, bridge: Arc<Bridge>) -> Result<()> {
    let local = listener.local_addr().map_err(|e| BridgeError::io("http listener address", e))?;
    info!("WebSocket server listening on http://{}", local);

    let cancel = bridge.cancellation_token();
    axum::serve(listener, router(bridge))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await
        .map_err(|e| BridgeError::io("serving http", e))?;

    info!("WebSocket server stopped");
    Ok(())
}
