//! Realtime WebSocket route configuration

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::handlers::realtime::realtime_handler;
use crate::state::AppState;
use std::sync::Arc;

/// Create the Realtime WebSocket router
///
/// # Endpoint
///
/// `GET /realtime?model=<model>` - WebSocket upgrade, sub-protocol `realtime`
///
/// # Protocol
///
/// On open the server sends `session.created` and `conversation.created`. Clients then
/// send JSON events (`session.update`, `input_audio_buffer.append`,
/// `input_audio_buffer.commit`, `conversation.item.create`, `response.create`, ...)
/// and may send binary frames, which are appended to the input audio buffer as PCM16.
///
/// Server events include `response.audio.delta` (base64 audio),
/// `response.audio_transcript.delta`, `response.done` and `error`.
///
/// # Example
///
/// ```json
/// // Client
/// {"type": "conversation.item.create", "item": {"type": "message", "role": "user",
///  "content": [{"type": "input_text", "text": "Hello"}]}}
/// {"type": "response.create"}
///
/// // Server
/// {"type": "response.created", "event_id": "event_...", "response": {...}}
/// {"type": "response.audio.delta", "event_id": "event_...", "delta": "UklGR..."}
/// {"type": "response.done", "event_id": "event_...", "response": {"status": "completed", ...}}
/// ```
///
/// # Authentication
///
/// Uses the same auth middleware as REST endpoints; browsers may pass `?token=`.
pub fn create_realtime_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/realtime", get(realtime_handler))
        .layer(TraceLayer::new_for_http())
}
