use axum::{extract::State, Json};
use std::sync::Arc;
use tracing::debug;

use crate::models::HealthResponse;
use crate::AppState;

/// Health check endpoint
pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        service: state.config.cloud_service_name.clone(),
        status: "ok".to_string(),
        message: "Server is running".to_string(),
    })
}

/// Readiness check endpoint. The hub lives in memory, so once routes are
/// served it can take subscribers.
pub async fn ready_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    debug!("Readiness check requested");
    let topics = state.hub.stats().n_topics;
    Json(HealthResponse {
        service: state.config.cloud_service_name.clone(),
        status: "ok".to_string(),
        message: format!("Service is ready ({} open topics)", topics),
    })
}
