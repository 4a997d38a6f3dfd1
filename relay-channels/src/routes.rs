//! HTTP routes for health and session statistics.

use axum::{extract::State, response::IntoResponse, routing::get, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::session::SessionOrchestrator;

/// Shared state for the HTTP server.
pub struct RelayState {
    /// One orchestrator per enabled channel
    pub orchestrators: Vec<Arc<SessionOrchestrator>>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    service: &'static str,
    version: &'static str,
}

/// Point-in-time view of the session engine.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatsResponse {
    /// Users with a stored conversation
    pub sessions: usize,
    /// Users with a backend call in flight
    pub in_flight: usize,
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "healthy",
        service: "relay-channels",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn stats(State(state): State<Arc<RelayState>>) -> impl IntoResponse {
    let orchestrators = &state.orchestrators;
    Json(StatsResponse {
        sessions: orchestrators.iter().map(|o| o.store().len()).sum(),
        in_flight: orchestrators
            .iter()
            .map(|o| o.serializer().in_flight_count())
            .sum(),
    })
}

/// Build the HTTP router.
pub fn build_router(state: Arc<RelayState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/stats", get(stats))
        .with_state(state)
}
