//! Control endpoints and the viewer WebSocket.
//!
//! Thin layer over the core: every handler calls straight into the
//! scheduler or fetchers and echoes the resulting polling state. The
//! WebSocket handler only shuttles hub messages onto the socket; the
//! payload shapes are owned by `pixcontrol`.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, warn};

use pixcontrol::{BroadcastHub, Poller, PollingState, Snapshot};

#[derive(Clone)]
pub struct AppState {
    pub poller: Arc<Poller>,
    pub hub: Arc<BroadcastHub>,
}

#[derive(Serialize)]
struct ControlResponse {
    status: &'static str,
    polling: PollingState,
}

#[derive(Serialize)]
struct ForceUpdateResponse {
    status: &'static str,
    timestamp: chrono::DateTime<Utc>,
}

pub fn router(state: AppState) -> Router {
    // Dashboards are served from arbitrary origins on the venue LAN.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/status", get(status))
        .route("/api/polling/state", get(polling_state))
        .route("/api/polling/enable", post(enable_polling))
        .route("/api/polling/disable", post(disable_polling))
        .route("/api/force_update", post(force_update))
        .route("/ws", get(viewer_socket))
        .layer(cors)
        .with_state(state)
}

async fn status(State(state): State<AppState>) -> Json<Snapshot> {
    Json(state.poller.mirror().store().snapshot().await)
}

async fn polling_state(State(state): State<AppState>) -> Json<PollingState> {
    Json(state.poller.state().await)
}

async fn enable_polling(State(state): State<AppState>) -> Json<ControlResponse> {
    // The scheduler reports whether this call made the transition, so
    // the tag stays truthful under concurrent requests.
    match state.poller.enable().await {
        Some(polling) => Json(ControlResponse {
            status: "enabled",
            polling,
        }),
        None => Json(ControlResponse {
            status: "already_enabled",
            polling: state.poller.state().await,
        }),
    }
}

async fn disable_polling(State(state): State<AppState>) -> Json<ControlResponse> {
    match state.poller.disable().await {
        Some(polling) => Json(ControlResponse {
            status: "disabled",
            polling,
        }),
        None => Json(ControlResponse {
            status: "already_disabled",
            polling: state.poller.state().await,
        }),
    }
}

async fn force_update(State(state): State<AppState>) -> Json<ForceUpdateResponse> {
    state.poller.force_update().await;
    Json(ForceUpdateResponse {
        status: "force updated",
        timestamp: Utc::now(),
    })
}

async fn viewer_socket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| serve_viewer(socket, state))
}

/// Forward hub messages to one viewer until either side goes away.
/// Dropping the receiver is enough; the hub prunes the dead sender on
/// its next broadcast.
async fn serve_viewer(mut socket: WebSocket, state: AppState) {
    let initial = state.poller.mirror().store().snapshot_payload().await;
    let mut updates = state.hub.register(&initial);
    debug!("Viewer connected");

    // While polling is off the hub stays silent, so idle viewers get a
    // fresh snapshot once a second instead.
    let mut idle_refresh = tokio::time::interval(Duration::from_secs(1));
    idle_refresh.tick().await;

    loop {
        tokio::select! {
            update = updates.recv() => {
                let Some(text) = update else { break };
                if socket.send(Message::Text(text.into())).await.is_err() {
                    break;
                }
            }
            _ = idle_refresh.tick() => {
                if state.poller.state().await.enabled {
                    continue;
                }
                let payload = state.poller.mirror().store().snapshot_payload().await;
                match serde_json::to_string(&payload) {
                    Ok(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(err) => warn!("Failed to encode snapshot payload: {}", err),
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    // Viewers only listen; ignore anything they send.
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    debug!("Viewer disconnected");
}
