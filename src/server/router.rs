// src/server/router.rs

//! HTTP routes: the WebSocket gateway plus the small JSON endpoints the web
//! client reads before it opens a socket.

use crate::config::IceServers;
use crate::connection::ConnectionHandler;
use crate::core::metrics;
use crate::core::state::ServerState;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing::{info, warn};

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub state: Arc<ServerState>,
    pub shutdown_tx: broadcast::Sender<()>,
}

/// Presence counts served at `/api/users/stats`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub online_users: usize,
    pub waiting_video: usize,
    pub waiting_text: usize,
    pub active_video_pairs: usize,
    pub active_text_pairs: usize,
    /// Sockets accepted since startup.
    pub total_connections: u64,
    /// Pairs formed since startup, across both modalities.
    pub total_matches: u64,
    /// Inbound events processed since startup.
    pub total_events: u64,
}

/// Build the Axum router with all routes.
pub fn build_router(app: AppState) -> Router {
    let cors = cors_layer(&app.state.config.allowed_origins);
    Router::new()
        .route("/", get(root_handler))
        .route("/ws", get(ws_handler))
        .route("/api/webrtc/ice-servers", get(ice_servers_handler))
        .route("/api/users/turnCredentials", get(ice_servers_handler))
        .route("/api/users/stats", get(stats_handler))
        .with_state(app)
        .layer(cors)
}

/// Allows the configured origins, or any origin when none are configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin '{}'.", origin);
                None
            }
        })
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed))
        .allow_methods([Method::GET, Method::OPTIONS])
        .allow_headers(Any)
}

async fn root_handler() -> &'static str {
    "Voodo relay is running"
}

/// WebSocket upgrade handler. Refuses the upgrade once `max_clients` sockets are live.
async fn ws_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    State(app): State<AppState>,
) -> Response {
    let permit = match app.state.connection_permits.clone().try_acquire_owned() {
        Ok(permit) => permit,
        Err(_) => {
            metrics::CONNECTIONS_REJECTED_TOTAL.inc();
            warn!("Refusing connection from {}: client limit reached.", addr);
            return (StatusCode::SERVICE_UNAVAILABLE, "Too many connections").into_response();
        }
    };
    let global_shutdown_rx = app.shutdown_tx.subscribe();

    ws.on_upgrade(move |socket| async move {
        info!("Accepted new connection from: {}", addr);
        metrics::CONNECTIONS_RECEIVED_TOTAL.inc();
        let handler = ConnectionHandler::new(socket, addr, app.state, permit, global_shutdown_rx);
        if let Err(e) = handler.run().await {
            warn!("Connection from {} terminated unexpectedly: {}", addr, e);
        }
    })
}

async fn ice_servers_handler(State(app): State<AppState>) -> Json<IceServers> {
    Json(app.state.ice_servers.clone())
}

async fn stats_handler(State(app): State<AppState>) -> Json<UserStats> {
    let snapshot = app.state.presence();
    let stats = app.state.dispatcher.stats();
    Json(UserStats {
        online_users: stats.online(),
        waiting_video: snapshot.waiting_video,
        waiting_text: snapshot.waiting_text,
        active_video_pairs: snapshot.active_video_pairs,
        active_text_pairs: snapshot.active_text_pairs,
        total_connections: stats.get_total_connections(),
        total_matches: stats.get_total_matches(),
        total_events: stats.get_total_events(),
    })
}
