//! Read-only views of the lifecycle registry.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use opwatch_core::Operation;

use super::AppState;

/// Active operations addressed to `scope`, oldest first.
pub async fn scope_operations_handler(
    State(state): State<AppState>,
    Path(scope): Path<String>,
) -> Json<Vec<Operation>> {
    Json(state.lifecycle.active_for_scope(&scope))
}

/// One operation, active or archived.
///
/// # Errors
///
/// Returns 404 when the id is neither active nor in the history.
pub async fn operation_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Operation>, StatusCode> {
    state
        .lifecycle
        .find(&id)
        .map(Json)
        .ok_or(StatusCode::NOT_FOUND)
}
