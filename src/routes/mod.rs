//! Route assembly.

pub mod api;
pub mod realtime;

use std::sync::Arc;

use axum::{Router, middleware, routing::get};

use crate::handlers::api::health_check;
use crate::middleware::{auth_middleware, connection_limit_middleware};
use crate::state::AppState;

/// Every route with its auth and connection-limit layers, bound to `state`.
///
/// Layer order on the realtime route (outer to inner): connection limit, auth,
/// handler. Cross-cutting layers (CORS, rate limiting, security headers) are added by
/// the binary.
pub fn create_app_router(state: Arc<AppState>) -> Router {
    let protected_routes = api::create_api_router().layer(middleware::from_fn_with_state(
        state.clone(),
        auth_middleware,
    ));

    let realtime_routes = realtime::create_realtime_router()
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            connection_limit_middleware,
        ));

    let public_routes = Router::new().route("/", get(health_check));

    public_routes
        .merge(protected_routes)
        .merge(realtime_routes)
        .with_state(state)
}
