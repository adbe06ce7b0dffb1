//! HTTP adapters.
//!
//! Mounts the WebSocket endpoint and a health probe on one router.
//!
//! # Routes
//! - `GET /ws` - WebSocket upgrade (see [`crate::adapters::websocket::handler`])
//! - `GET /health` - Liveness plus live counters

use std::sync::Arc;

use axum::{extract::FromRef, extract::State, routing::get, Json, Router};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::adapters::collaboration::CollaborationCoordinator;
use crate::adapters::events::EventBus;
use crate::adapters::websocket::{websocket_router, WebSocketState};
use crate::domain::foundation::NodeId;

/// Shared state for every HTTP route.
#[derive(Clone)]
pub struct AppState {
    pub node_id: NodeId,
    pub websocket: WebSocketState,
    pub bus: Arc<EventBus>,
    pub collaboration: Arc<CollaborationCoordinator>,
}

impl FromRef<AppState> for WebSocketState {
    fn from_ref(state: &AppState) -> Self {
        state.websocket.clone()
    }
}

/// Body of `GET /health`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub node_id: String,
    pub connections: usize,
    pub in_flight_events: usize,
    pub subscriptions: usize,
    pub collaboration_sessions: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        node_id: state.node_id.to_string(),
        connections: state.websocket.connections.connection_count(),
        in_flight_events: state.bus.in_flight(),
        subscriptions: state.bus.subscription_count(),
        collaboration_sessions: state.collaboration.session_count(),
    })
}

/// Create the application router with request tracing.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .merge(websocket_router())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
