//! WebSocket connection limits.
//!
//! Enforces the global and per-IP WebSocket caps held in [`AppState`]. A reserved
//! slot travels to the handler as a [`ClientIp`] extension; the handler releases it
//! when the socket closes. If the upgrade never happens (auth failure, unsupported
//! model, malformed handshake) the slot is released here.

use axum::{
    Json,
    body::Body,
    extract::{ConnectInfo, State},
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::state::{AppState, ConnectionLimitError};

/// Client address of a request holding a WebSocket slot.
#[derive(Clone, Copy, Debug)]
pub struct ClientIp(pub IpAddr);

/// Reserve a connection slot for WebSocket upgrade requests.
///
/// Returns 503 when the global limit is reached and 429 when the per-IP limit is
/// reached. Requests without an `Upgrade: websocket` header pass through untouched.
pub async fn connection_limit_middleware(
    State(state): State<Arc<AppState>>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let is_ws_upgrade = request
        .headers()
        .get("upgrade")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.eq_ignore_ascii_case("websocket"))
        .unwrap_or(false);

    if !is_ws_upgrade {
        return next.run(request).await;
    }

    let client_ip = addr.ip();

    match state.try_acquire_connection(client_ip) {
        Ok(()) => {
            request.extensions_mut().insert(ClientIp(client_ip));
            let response = next.run(request).await;
            if response.status() != StatusCode::SWITCHING_PROTOCOLS {
                tracing::debug!(
                    ip = %client_ip,
                    status = %response.status(),
                    "Upgrade did not happen, releasing connection slot"
                );
                state.release_connection(client_ip);
            }
            response
        }
        Err(err) => {
            let status = match err {
                ConnectionLimitError::GlobalLimitReached => StatusCode::SERVICE_UNAVAILABLE,
                ConnectionLimitError::PerIpLimitReached => StatusCode::TOO_MANY_REQUESTS,
            };
            tracing::warn!(ip = %client_ip, error = %err, "Rejecting WebSocket connection");
            let body = json!({
                "error": {
                    "message": err.to_string(),
                    "type": "rate_limit_error",
                    "code": "connection_limit_reached",
                }
            });
            (status, Json(body)).into_response()
        }
    }
}
