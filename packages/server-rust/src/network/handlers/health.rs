//! Health, liveness, and readiness endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;

use super::AppState;

/// Detailed health as JSON.
///
/// Always 200; the `state` field says whether the server is actually
/// accepting work, so monitors can tell "draining" from "down".
pub async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(json!({
        "state": state.shutdown.health_state(),
        "subscribers": state.hub.count(),
        "active_operations": state.lifecycle.active_count(),
        "cached_responses": state.orchestrator.cache().len(),
        "in_flight": state.shutdown.in_flight_count(),
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}

/// Liveness check: 200 while the process is responsive.
pub async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Readiness check: 200 when ready, 503 while starting or draining.
pub async fn readiness_handler(State(state): State<AppState>) -> StatusCode {
    if state.shutdown.health_state().is_accepting() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

#[cfg(test)]
mod tests {
    use opwatch_core::OperationKind;

    use super::*;
    use crate::network::handlers::test_state::app_state;
    use crate::network::ConnectionConfig;

    #[tokio::test]
    async fn health_reports_every_field() {
        let state = app_state();
        state.shutdown.set_ready();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "ready");
        assert_eq!(json["subscribers"], 0);
        assert_eq!(json["active_operations"], 0);
        assert_eq!(json["cached_responses"], 0);
        assert_eq!(json["in_flight"], 0);
        assert!(json["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn health_counts_subscribers_and_operations() {
        let state = app_state();
        let (_handle, _rx) = state.hub.register("v1", &ConnectionConfig::default());
        state
            .lifecycle
            .start("op", OperationKind::Backup, "v1", 3, "nightly")
            .unwrap();
        let _guard = state.shutdown.in_flight_guard();

        let json = health_handler(State(state)).await.0;
        assert_eq!(json["state"], "starting");
        assert_eq!(json["subscribers"], 1);
        assert_eq!(json["active_operations"], 1);
        assert_eq!(json["in_flight"], 1);
    }

    #[tokio::test]
    async fn health_reports_draining() {
        let state = app_state();
        state.shutdown.set_ready();
        state.shutdown.trigger_shutdown();
        assert_eq!(health_handler(State(state)).await.0["state"], "draining");
    }

    #[tokio::test]
    async fn liveness_is_always_ok() {
        assert_eq!(liveness_handler().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn readiness_follows_health_state() {
        let state = app_state();
        assert_eq!(
            readiness_handler(State(state.clone())).await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.shutdown.set_ready();
        assert_eq!(readiness_handler(State(state.clone())).await, StatusCode::OK);

        state.shutdown.trigger_shutdown();
        assert_eq!(
            readiness_handler(State(state)).await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }
}
