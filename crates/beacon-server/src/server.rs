//! `HubServer` — Axum HTTP + WebSocket server.

use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::ServerConfig;
use crate::health::{self, HealthResponse};
use crate::shutdown::ShutdownCoordinator;
use crate::ws::broadcast::Broadcaster;
use crate::ws::dispatcher::run_session;
use crate::ws::registry::SessionRegistry;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// Session registry (identity assignment + lookup).
    pub registry: Arc<SessionRegistry>,
    /// Peer fan-out.
    pub broadcaster: Arc<Broadcaster>,
    /// Shutdown coordinator.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// Tracks spawned session tasks so shutdown can drain them.
    pub tasks: TaskTracker,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// When the server started.
    pub start_time: Instant,
}

/// The presence hub server: wires registry, dispatcher, and broadcaster
/// together per accepted connection.
pub struct HubServer {
    state: AppState,
}

impl HubServer {
    /// Create a server from configuration.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let broadcaster = Arc::new(Broadcaster::new(registry.clone(), config.max_send_drops));
        Self {
            state: AppState {
                registry,
                broadcaster,
                shutdown: Arc::new(ShutdownCoordinator::new()),
                tasks: TaskTracker::new(),
                config: Arc::new(config),
                start_time: Instant::now(),
            },
        }
    }

    /// Build the Axum router with all routes.
    #[must_use]
    pub fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// The session registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.state.registry
    }

    /// The shutdown coordinator.
    #[must_use]
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.state.shutdown
    }

    /// The session task tracker (drained at shutdown).
    #[must_use]
    pub fn tasks(&self) -> &TaskTracker {
        &self.state.tasks
    }

    /// The server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.state.config
    }
}

/// GET /ws — WebSocket upgrade.
///
/// The Origin allow-list is a pre-condition of session construction:
/// requests from unlisted origins are refused before any upgrade.
async fn ws_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|value| value.to_str().ok());
    if !state.config.origin_allowed(origin) {
        warn!(origin, "upgrade refused, origin not allowed");
        return StatusCode::FORBIDDEN.into_response();
    }

    let config = state.config.clone();
    let tracker = state.tasks.clone();
    let shutdown = state.shutdown.token();
    ws.max_message_size(config.max_message_size)
        .on_upgrade(move |socket| {
            tracker.track_future(run_session(
                socket,
                state.registry,
                state.broadcaster,
                config,
                shutdown,
            ))
        })
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(health::health_check(
        state.start_time,
        state.registry.len(),
    ))
}
