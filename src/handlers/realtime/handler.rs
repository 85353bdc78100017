//! Realtime WebSocket handler
//!
//! Validates the caller and the requested model before the upgrade, then runs one
//! [`RealtimeConnection`] for the lifetime of the socket.

use std::net::IpAddr;
use std::sync::Arc;

use axum::{
    Extension,
    extract::{
        Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade, rejection::WebSocketUpgradeRejection},
    },
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::{select, time::Duration};
use tracing::{debug, error, info, warn};

use crate::auth::Auth;
use crate::core::translate::{DEFAULT_REALTIME_MODEL, RealtimeModel};
use crate::errors::app_error::AppError;
use crate::errors::auth_error::AuthError;
use crate::middleware::ClientIp;
use crate::state::AppState;

use super::connection::{EventSender, RealtimeConnection};
use super::messages::{ErrorDetail, OutboundEvent, RealtimeMessageRoute, ServerEvent};

/// Sub-protocol selected on upgrade.
pub const REALTIME_SUBPROTOCOL: &str = "realtime";

/// Channel buffer between the connection and the socket writer
const CHANNEL_BUFFER_SIZE: usize = 1024;

/// Maximum WebSocket frame size (16 MB)
const MAX_WS_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Maximum WebSocket message size (16 MB)
const MAX_WS_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// How often the idle check runs
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

/// Connections with no client frame for this long are closed
const IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Grace period for the writer to flush the close frame
const SENDER_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Debug, Default, Deserialize)]
pub struct RealtimeQuery {
    pub model: Option<String>,
}

/// Realtime WebSocket handler
///
/// Rejects before any socket work when the caller is not authenticated (401) or the
/// `model` query parameter is not on the allow-list (400). A missing `model` selects
/// the default synthesis model.
pub async fn realtime_handler(
    State(state): State<Arc<AppState>>,
    auth: Option<Extension<Auth>>,
    client_ip: Option<Extension<ClientIp>>,
    Query(query): Query<RealtimeQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let auth = auth.map(|Extension(auth)| auth).unwrap_or_default();
    let client_ip = client_ip.map(|Extension(ClientIp(ip))| ip);

    if state.config.auth_required && !auth.is_authenticated() {
        return AuthError::MissingAuthHeader.into_response();
    }

    let requested = query.model.as_deref().unwrap_or(DEFAULT_REALTIME_MODEL);
    let Some(model) = RealtimeModel::lookup(requested) else {
        warn!(model = requested, "Rejecting realtime upgrade for unsupported model");
        return AppError::UnsupportedModel(requested.to_string()).into_response();
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    info!(
        auth_id = ?auth.id,
        model = model.name,
        "Realtime WebSocket connection upgrade requested"
    );

    ws.protocols([REALTIME_SUBPROTOCOL])
        .max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_realtime_socket(socket, state, model, client_ip))
}

/// Handle the realtime WebSocket connection
async fn handle_realtime_socket(
    socket: WebSocket,
    app_state: Arc<AppState>,
    model: &'static RealtimeModel,
    client_ip: Option<IpAddr>,
) {
    let (mut sender, mut receiver) = socket.split();
    let (message_tx, mut message_rx) = mpsc::channel::<RealtimeMessageRoute>(CHANNEL_BUFFER_SIZE);

    // Sender task for outgoing messages
    let mut sender_task = tokio::spawn(async move {
        while let Some(route) = message_rx.recv().await {
            let result = match route {
                RealtimeMessageRoute::Outgoing(event) => match serde_json::to_string(&event) {
                    Ok(json) => sender.send(Message::Text(json.into())).await,
                    Err(e) => {
                        error!("Failed to serialize outgoing event: {}", e);
                        continue;
                    }
                },
                RealtimeMessageRoute::Close => {
                    let _ = sender.send(Message::Close(None)).await;
                    break;
                }
            };

            if let Err(e) = result {
                debug!("Failed to send WebSocket message: {}", e);
                break;
            }
        }
    });

    let events = EventSender::new(message_tx.clone());
    let connection = RealtimeConnection::new(model, app_state.realtime_services(), events);
    let session_id = connection.session_id();

    info!(
        session_id = %session_id,
        model = model.name,
        "Realtime WebSocket connection established"
    );
    connection.start().await;

    let mut last_activity = tokio::time::Instant::now();

    loop {
        select! {
            msg_result = receiver.next() => {
                last_activity = tokio::time::Instant::now();

                match msg_result {
                    Some(Ok(Message::Text(text))) => connection.handle_text(text.as_str()).await,
                    Some(Ok(Message::Binary(data))) => connection.handle_audio(&data).await,
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!(session_id = %session_id, "Realtime WebSocket close received");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(session_id = %session_id, "Realtime WebSocket error: {}", e);
                        break;
                    }
                    None => {
                        info!(session_id = %session_id, "Realtime WebSocket connection closed by client");
                        break;
                    }
                }
            }
            _ = tokio::time::sleep(IDLE_CHECK_INTERVAL) => {
                if last_activity.elapsed() > IDLE_TIMEOUT {
                    warn!(
                        session_id = %session_id,
                        "Realtime WebSocket connection idle for {}s, closing",
                        last_activity.elapsed().as_secs()
                    );
                    let idle = ServerEvent::error(ErrorDetail::new(
                        "idle_timeout",
                        "Connection closed due to inactivity",
                    ));
                    let _ = message_tx
                        .send(RealtimeMessageRoute::Outgoing(OutboundEvent::new(idle)))
                        .await;
                    break;
                }
            }
        }
    }

    // Cleanup
    connection.close().await;
    drop(connection);
    let _ = message_tx.send(RealtimeMessageRoute::Close).await;
    drop(message_tx);

    if tokio::time::timeout(SENDER_SHUTDOWN_GRACE, &mut sender_task)
        .await
        .is_err()
    {
        sender_task.abort();
    }

    if let Some(ip) = client_ip {
        app_state.release_connection(ip);
    }

    info!(session_id = %session_id, "Realtime WebSocket connection terminated");
}
