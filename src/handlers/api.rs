use std::sync::Arc;

use axum::{Json, extract::State};
use serde::Serialize;

use crate::core::translate::supported_models;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub models: Vec<&'static str>,
    pub vendor_sessions: usize,
    pub websocket_connections: usize,
}

/// Public liveness probe.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "OK",
        version: env!("CARGO_PKG_VERSION"),
        models: supported_models().collect(),
        vendor_sessions: state.vendor_manager.session_count(),
        websocket_connections: state.ws_connection_count(),
    })
}
