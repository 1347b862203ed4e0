//! Operator view of the response cache.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use tracing::info;

use super::AppState;

/// Number of cached responses and the TTL new entries receive.
pub async fn cache_stats_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let orchestrator = &state.orchestrator;
    Json(json!({
        "entries": orchestrator.cache().len(),
        "ttl_secs": orchestrator.config().default_ttl.as_secs(),
    }))
}

/// Drops every cached response.
pub async fn cache_clear_handler(State(state): State<AppState>) -> StatusCode {
    let dropped = state.orchestrator.cache().len();
    state.orchestrator.cache().clear();
    info!(dropped, "response cache cleared");
    StatusCode::NO_CONTENT
}
