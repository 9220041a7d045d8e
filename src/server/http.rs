//! Snapshot and health endpoints

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ServerState;
use crate::BridgeError;

const NOT_READY_BODY: &str = "Service Unavailable: video source not ready.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub ready: bool,
    pub device: Option<String>,
    pub subscribers: usize,
    pub frames: u64,
}

/// Single JPEG from the pull path.
///
/// Waits for the first frame up to the configured grace period, then for the
/// next queued frame up to the same bound.
pub async fn snapshot(State(state): State<Arc<ServerState>>) -> Response {
    let bridge = &state.bridge;
    let grace = bridge.config().video.ready_grace();

    let consumer = match bridge.attach_consumer_within(grace).await {
        Ok(consumer) => consumer,
        Err(e @ BridgeError::NotReady { .. }) => {
            debug!("Snapshot rejected: {}", e);
            return (StatusCode::SERVICE_UNAVAILABLE, NOT_READY_BODY).into_response();
        }
        Err(e) => {
            warn!("Snapshot failed: {}", e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    match tokio::time::timeout(grace, consumer.next_frame()).await {
        Ok(Some(frame)) => {
            ([(header::CONTENT_TYPE, "image/jpeg")], frame.as_bytes().to_vec()).into_response()
        }
        Ok(None) => (StatusCode::SERVICE_UNAVAILABLE, BridgeError::Shutdown.to_string()).into_response(),
        Err(_) => {
            debug!("Snapshot rejected: {}", BridgeError::Timeout { duration: grace });
            (StatusCode::SERVICE_UNAVAILABLE, NOT_READY_BODY).into_response()
        }
    }
}

pub async fn health(State(state): State<Arc<ServerState>>) -> Json<HealthResponse> {
    let bridge = &state.bridge;
    Json(HealthResponse {
        ready: bridge.is_ready(),
        device: bridge.device_endpoint().map(|addr| addr.to_string()),
        subscribers: bridge.subscriber_count(),
        frames: bridge.frames_published(),
    })
}
