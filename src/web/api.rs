//! JSON endpoints

use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::stream::message::unix_timestamp;
use crate::AppState;

/// Service banner
pub async fn root() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "message": "Jewelry AR Mirror API",
        "version": crate::VERSION,
        "status": "running",
    }))
}

/// Liveness check
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "timestamp": unix_timestamp(),
    }))
}

/// Status response
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub version: String,
    pub active_sessions: usize,
    pub sessions_served: u64,
    pub camera_device: u32,
    pub frame_width: u32,
    pub frame_height: u32,
}

/// Get current status
pub async fn get_status(State(state): State<Arc<AppState>>) -> Json<StatusResponse> {
    let config = state.config.read().await;

    Json(StatusResponse {
        version: crate::VERSION.to_string(),
        active_sessions: state.active_sessions(),
        sessions_served: state.sessions_served(),
        camera_device: config.camera.device_id,
        frame_width: config.camera.width,
        frame_height: config.camera.height,
    })
}
