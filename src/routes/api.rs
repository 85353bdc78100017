use axum::{Router, routing::post};
use tower_http::trace::TraceLayer;

use crate::handlers::speech;
use crate::state::AppState;
use std::sync::Arc;

/// Create the API router with protected routes
///
/// Authentication middleware is applied by the caller once state is available.
pub fn create_api_router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/v1/audio/speech", post(speech::speech_handler))
        .layer(TraceLayer::new_for_http())
}
